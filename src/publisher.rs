//! Out-of-context broadcast publisher.
//!
//! Code that is not serving a WebSocket frame has no invocation context to
//! broadcast through, so it posts to the app's own ingress instead; the
//! fan-out is then identical to an in-process channel invocation.  The
//! call completes when the POST returns.

use crate::config::Config;
use sa_protocol::{BroadcastRequest, Payload};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("ingress transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("channel '{0}' is not registered")]
    UnknownChannel(String),
    #[error("ingress rejected this peer")]
    Rejected,
    #[error("ingress returned unexpected status {0}")]
    Unexpected(u16),
}

/// Cheap cloneable handle posting broadcasts to the app's own ingress.
#[derive(Clone)]
pub struct Publisher {
    client: reqwest::Client,
    url: String,
}

impl Publisher {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("http://{}:{}/broadcast", config.host, config.port),
        }
    }

    /// Fan `data` out to every current subscriber of `channel`.
    pub async fn publish(&self, channel: &str, data: Payload) -> Result<(), PublishError> {
        let request = BroadcastRequest {
            channel: channel.to_owned(),
            data,
        };
        let response = self.client.post(&self.url).json(&request).send().await?;
        match response.status().as_u16() {
            200 => Ok(()),
            403 => Err(PublishError::Rejected),
            404 => Err(PublishError::UnknownChannel(channel.to_owned())),
            status => Err(PublishError::Unexpected(status)),
        }
    }
}
