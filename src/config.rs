//! Application configuration.
//!
//! All options are supplied at construction; the core consumes no
//! environment variables.

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Config {
    /// Host the out-of-context publisher posts back to.
    pub host: String,
    /// Port for the same.
    pub port: u16,
    /// Peer addresses permitted to use the broadcast ingress.  The literal
    /// `localhost` admits any loopback peer.
    pub broadcast_allowed_hosts: HashSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8000,
            broadcast_allowed_hosts: ["127.0.0.1", "::1", "localhost"]
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
        }
    }
}
