//! EventBridge Scheduler-backed `Scheduler`.
//!
//! The core's `schedule.update_cron` is a plain cron string; EventBridge
//! Scheduler expects `cron(...)` / `rate(...)` expressions, so this
//! adapter wraps the source string as needed.

use crate::errors::{CoreResult, TransportError};
use crate::ports::Scheduler;
use async_trait::async_trait;

#[derive(Debug)]
pub struct EventBridgeScheduler {
    client: aws_sdk_scheduler::Client,
    schedule_group: String,
}

impl EventBridgeScheduler {
    pub fn new(client: aws_sdk_scheduler::Client, schedule_group: impl Into<String>) -> Self {
        Self {
            client,
            schedule_group: schedule_group.into(),
        }
    }

    pub async fn from_region(region: &str, schedule_group: impl Into<String>) -> Self {
        let sdk_config = super::load_sdk_config(region).await;
        Self::new(aws_sdk_scheduler::Client::new(&sdk_config), schedule_group)
    }

    fn wrap_cron(cron: &str) -> String {
        if cron.starts_with("cron(") || cron.starts_with("rate(") {
            cron.to_string()
        } else {
            format!("cron({cron})")
        }
    }
}

#[async_trait]
impl Scheduler for EventBridgeScheduler {
    async fn get_schedule(&self, name: &str) -> CoreResult<Option<String>> {
        match self
            .client
            .get_schedule()
            .name(name)
            .group_name(&self.schedule_group)
            .send()
            .await
        {
            Ok(out) => Ok(out.schedule_expression().map(str::to_string)),
            Err(e) => {
                if format!("{e:?}").contains("ResourceNotFoundException") {
                    Ok(None)
                } else {
                    Err(TransportError::new(format!("scheduler get_schedule {name} failed: {e}")).into())
                }
            }
        }
    }

    async fn create_schedule(&self, name: &str, cron: &str, target: &str) -> CoreResult<()> {
        self.client
            .create_schedule()
            .name(name)
            .group_name(&self.schedule_group)
            .schedule_expression(Self::wrap_cron(cron))
            .target(
                aws_sdk_scheduler::types::Target::builder()
                    .arn(target)
                    .role_arn(target)
                    .build()
                    .map_err(|e| TransportError::new(format!("invalid schedule target: {e}")))?,
            )
            .flexible_time_window(
                aws_sdk_scheduler::types::FlexibleTimeWindow::builder()
                    .mode(aws_sdk_scheduler::types::FlexibleTimeWindowMode::Off)
                    .build()
                    .map_err(|e| TransportError::new(format!("invalid flexible time window: {e}")))?,
            )
            .send()
            .await
            .map_err(|e| TransportError::new(format!("scheduler create_schedule {name} failed: {e}")))?;
        Ok(())
    }

    async fn update_schedule(&self, name: &str, cron: &str, target: &str) -> CoreResult<()> {
        self.client
            .update_schedule()
            .name(name)
            .group_name(&self.schedule_group)
            .schedule_expression(Self::wrap_cron(cron))
            .target(
                aws_sdk_scheduler::types::Target::builder()
                    .arn(target)
                    .role_arn(target)
                    .build()
                    .map_err(|e| TransportError::new(format!("invalid schedule target: {e}")))?,
            )
            .flexible_time_window(
                aws_sdk_scheduler::types::FlexibleTimeWindow::builder()
                    .mode(aws_sdk_scheduler::types::FlexibleTimeWindowMode::Off)
                    .build()
                    .map_err(|e| TransportError::new(format!("invalid flexible time window: {e}")))?,
            )
            .send()
            .await
            .map_err(|e| TransportError::new(format!("scheduler update_schedule {name} failed: {e}")))?;
        Ok(())
    }

    async fn delete_schedule(&self, name: &str) -> CoreResult<()> {
        self.client
            .delete_schedule()
            .name(name)
            .group_name(&self.schedule_group)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("scheduler delete_schedule {name} failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_bare_cron_expressions() {
        assert_eq!(EventBridgeScheduler::wrap_cron("0 3 * * ? *"), "cron(0 3 * * ? *)");
        assert_eq!(EventBridgeScheduler::wrap_cron("cron(0 3 * * ? *)"), "cron(0 3 * * ? *)");
        assert_eq!(EventBridgeScheduler::wrap_cron("rate(1 hour)"), "rate(1 hour)");
    }
}
