//! CloudWatch Logs-backed `LogStream`.

use crate::errors::{CoreResult, TransportError};
use crate::ports::LogStream;
use async_trait::async_trait;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct CloudWatchLogStream {
    client: aws_sdk_cloudwatchlogs::Client,
    log_group: String,
    log_stream: String,
    next_token: Option<String>,
    buffer: VecDeque<String>,
    exhausted: bool,
}

impl CloudWatchLogStream {
    pub fn new(client: aws_sdk_cloudwatchlogs::Client, log_group: impl Into<String>, log_stream: impl Into<String>) -> Self {
        Self {
            client,
            log_group: log_group.into(),
            log_stream: log_stream.into(),
            next_token: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub async fn from_region(region: &str, log_group: impl Into<String>, log_stream: impl Into<String>) -> Self {
        let sdk_config = super::load_sdk_config(region).await;
        Self::new(aws_sdk_cloudwatchlogs::Client::new(&sdk_config), log_group, log_stream)
    }

    async fn fill_buffer(&mut self) -> CoreResult<()> {
        let mut request = self
            .client
            .get_log_events()
            .log_group_name(&self.log_group)
            .log_stream_name(&self.log_stream)
            .start_from_head(true);
        if let Some(token) = &self.next_token {
            request = request.next_token(token);
        }

        let output = request.send().await.map_err(|e| {
            TransportError::new(format!(
                "cloudwatch logs get_log_events {}/{} failed: {e}",
                self.log_group, self.log_stream
            ))
        })?;

        let new_token = output.next_forward_token().map(str::to_string);
        let made_progress = new_token != self.next_token;
        self.next_token = new_token;

        for event in output.events() {
            if let Some(message) = event.message() {
                self.buffer.push_back(message.to_string());
            }
        }

        // CloudWatch returns the same forward token when there is nothing
        // new to read; treat that as end-of-stream for this poll.
        if !made_progress {
            self.exhausted = true;
        }
        Ok(())
    }
}

#[async_trait]
impl LogStream for CloudWatchLogStream {
    async fn next_line(&mut self) -> CoreResult<Option<String>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill_buffer().await?;
        }
        Ok(self.buffer.pop_front())
    }
}

/// Opens a fresh `CloudWatchLogStream` per pipeline execution, sharing one
/// SDK client across the agent's lifetime.
#[derive(Debug)]
pub struct CloudWatchLogStreamFactory {
    client: aws_sdk_cloudwatchlogs::Client,
}

impl CloudWatchLogStreamFactory {
    pub fn new(client: aws_sdk_cloudwatchlogs::Client) -> Self {
        Self { client }
    }

    pub async fn from_region(region: &str) -> Self {
        let sdk_config = super::load_sdk_config(region).await;
        Self::new(aws_sdk_cloudwatchlogs::Client::new(&sdk_config))
    }
}

#[async_trait]
impl crate::ports::LogStreamFactory for CloudWatchLogStreamFactory {
    async fn open(&self, log_group: &str, log_stream: &str) -> CoreResult<Box<dyn LogStream>> {
        Ok(Box::new(CloudWatchLogStream::new(self.client.clone(), log_group, log_stream)))
    }
}
