//! SSM Parameter Store-backed `ParameterStore`.
//!
//! Outputs land under `/entigo-infralib/<prefix>-<step>-<module>/<key>`;
//! this adapter is agnostic to the naming scheme itself — callers pass
//! the full parameter name.

use crate::errors::{CoreResult, TransportError};
use crate::ports::{Parameter, ParameterStore, ParameterType};
use async_trait::async_trait;
use aws_sdk_ssm::types::ParameterType as SsmParameterType;
use aws_sdk_ssm::Client;
use tracing::debug;

#[derive(Debug)]
pub struct SsmParameterStore {
    client: Client,
    /// Optional CMK used to encrypt `SecureString` parameters; when unset,
    /// parameters are written as plain `String`/`StringList`.
    encryption_key_id: Option<String>,
}

impl SsmParameterStore {
    pub fn new(client: Client, encryption_key_id: Option<String>) -> Self {
        Self {
            client,
            encryption_key_id,
        }
    }

    pub async fn from_region(region: &str, encryption_key_id: Option<String>) -> Self {
        let sdk_config = super::load_sdk_config(region).await;
        Self::new(Client::new(&sdk_config), encryption_key_id)
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get(&self, name: &str) -> CoreResult<Option<Parameter>> {
        match self.client.get_parameter().name(name).with_decryption(true).send().await {
            Ok(out) => {
                let Some(param) = out.parameter() else {
                    return Ok(None);
                };
                let param_type = match param.r#type() {
                    Some(SsmParameterType::StringList) => ParameterType::StringList,
                    _ => ParameterType::String,
                };
                Ok(Some(Parameter {
                    value: param.value().unwrap_or_default().to_string(),
                    param_type,
                }))
            }
            Err(e) => {
                if format!("{e:?}").contains("ParameterNotFound") {
                    Ok(None)
                } else {
                    Err(TransportError::new(format!("ssm get_parameter {name} failed: {e}")).into())
                }
            }
        }
    }

    async fn put(&self, name: &str, value: &str, param_type: ParameterType) -> CoreResult<()> {
        debug!(name, "ssm.put");
        let mut request = self
            .client
            .put_parameter()
            .name(name)
            .value(value)
            .overwrite(true)
            .r#type(match (param_type, &self.encryption_key_id) {
                (_, Some(_)) => SsmParameterType::SecureString,
                (ParameterType::StringList, None) => SsmParameterType::StringList,
                (ParameterType::String, None) => SsmParameterType::String,
            });
        if let Some(key_id) = &self.encryption_key_id {
            request = request.key_id(key_id);
        }
        request
            .send()
            .await
            .map_err(|e| TransportError::new(format!("ssm put_parameter {name} failed: {e}")))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> CoreResult<()> {
        self.client
            .delete_parameter()
            .name(name)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("ssm delete_parameter {name} failed: {e}")))?;
        Ok(())
    }

    async fn list_tagged(&self) -> CoreResult<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token = None;
        loop {
            let mut request = self.client.describe_parameters();
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }
            let output = request
                .send()
                .await
                .map_err(|e| TransportError::new(format!("ssm describe_parameters failed: {e}")))?;
            for param in output.parameters() {
                if let Some(name) = param.name() {
                    names.push(name.to_string());
                }
            }
            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(names)
    }
}
