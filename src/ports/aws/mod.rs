//! # AWS Port Adapters
//!
//! Concrete implementations of the ports in `ports::mod` backed by the AWS
//! SDK: S3 for `ObjectStore`, SSM Parameter Store for `ParameterStore`,
//! CodeBuild/CodePipeline for `Builder`/`Pipeline`, CloudWatch Logs for
//! `LogStream`, and EventBridge Scheduler for `Scheduler`. The `Notifier`
//! is a plain webhook over `reqwest` since notification delivery has no
//! cloud-specific shape worth wrapping an SDK around.

mod log_stream;
mod notifier;
mod object_store;
mod parameter_store;
mod pipeline;
mod scheduler;

pub use log_stream::{CloudWatchLogStream, CloudWatchLogStreamFactory};
pub use notifier::WebhookNotifier;
pub use object_store::S3ObjectStore;
pub use parameter_store::SsmParameterStore;
pub use pipeline::CodePipelineDriver;
pub use scheduler::EventBridgeScheduler;

use aws_config::{BehaviorVersion, SdkConfig};

/// Load the default AWS SDK configuration for the given region, honouring
/// the standard credential chain (env vars, IRSA/IMDS, profile files).
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}
