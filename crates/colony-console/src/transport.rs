//! NATS push transport feeding the channel multiplexer.
//!
//! The backend publishes every push notification as a JSON [`Message`] on a
//! subject under the configured prefix. The transport subscribes to
//! `{prefix}.>` and hands each decoded message to
//! [`ChannelMux::dispatch`]. Payloads that do not decode are logged and
//! skipped; reconnection is left to the NATS client.

use colony_sync::ChannelMux;
use colony_types::Message;
use futures::StreamExt as _;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::TransportConfig;

/// Errors that can occur in the push transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connecting to the NATS server failed.
    #[error("failed to connect to NATS at {url}: {message}")]
    Connect {
        /// The server URL.
        url: String,
        /// The connection failure.
        message: String,
    },

    /// Subscribing to the push subject failed.
    #[error("failed to subscribe to {subject}: {message}")]
    Subscribe {
        /// The wildcard subject.
        subject: String,
        /// The subscription failure.
        message: String,
    },
}

/// Decode a push payload.
pub fn decode(payload: &[u8]) -> Result<Message, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Connected push transport.
pub struct NatsTransport {
    client: async_nats::Client,
    subject: String,
}

impl NatsTransport {
    /// Connect to the NATS server named in `config`.
    pub async fn connect(config: &TransportConfig) -> Result<Self, TransportError> {
        let url = config.nats_url.as_str();
        info!(url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| TransportError::Connect {
                url: url.to_owned(),
                message: e.to_string(),
            })?;
        info!("NATS connection established");
        Ok(Self {
            client,
            subject: config.subject(),
        })
    }

    /// Subscribe and start forwarding messages to `mux` on a background
    /// task. The task runs until the subscription ends or it is aborted.
    pub async fn spawn(self, mux: ChannelMux) -> Result<JoinHandle<()>, TransportError> {
        let mut subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| TransportError::Subscribe {
                subject: self.subject.clone(),
                message: e.to_string(),
            })?;
        info!(subject = %self.subject, "subscribed to push messages");

        let client = self.client;
        let handle = tokio::spawn(async move {
            // Held for the lifetime of the subscription.
            let _client = client;
            while let Some(nats_message) = subscriber.next().await {
                deliver(&mux, nats_message.subject.as_str(), &nats_message.payload);
            }
            warn!("push subscription ended");
        });
        Ok(handle)
    }
}

impl std::fmt::Debug for NatsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsTransport")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Decode one payload and dispatch it. Returns the number of handlers
/// reached, or `None` when the payload was dropped.
fn deliver(mux: &ChannelMux, subject: &str, payload: &[u8]) -> Option<usize> {
    match decode(payload) {
        Ok(message) => {
            let delivered = mux.dispatch(&message);
            trace!(subject, channel = %message.channel, delivered, "push message delivered");
            Some(delivered)
        }
        Err(e) => {
            debug!(subject, error = %e, "dropping undecodable push payload");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn decodes_wire_messages() {
        let message = decode(br#"{"channel":"room:4","type":"vote:cast","data":{"vote":"yes"}}"#)
            .unwrap();
        assert_eq!(message.channel, "room:4");
        assert_eq!(message.kind, "vote:cast");
        assert_eq!(message.data["vote"], "yes");
    }

    #[test]
    fn rejects_payloads_without_channel_or_type() {
        assert!(decode(b"").is_err());
        assert!(decode(b"not json").is_err());
        assert!(decode(br#"{"type":"vote:cast"}"#).is_err());
        assert!(decode(br#"{"channel":"room:1"}"#).is_err());
    }

    #[test]
    fn deliver_dispatches_good_payloads_and_drops_bad_ones() {
        let mux = ChannelMux::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _sub = mux.subscribe("runs", move |m| log.lock().unwrap().push(m.kind.clone()));

        assert_eq!(deliver(&mux, "colony.runs", b"{garbage"), None);
        assert_eq!(
            deliver(&mux, "colony.runs", br#"{"channel":"runs","type":"run:started"}"#),
            Some(1)
        );
        assert_eq!(
            deliver(&mux, "colony.room", br#"{"channel":"room:9","type":"vote:cast"}"#),
            Some(0)
        );
        assert_eq!(*seen.lock().unwrap(), vec!["run:started"]);
    }
}
