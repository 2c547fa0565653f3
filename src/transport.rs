use crate::types::{DispatchBatch, Peer};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;

/// Path every pod exposes for receiving replicated events.
pub const REMOTE_EVENTS_PATH: &str = "/api/v1/remote/events";

/// Header carrying the hex-encoded HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Podsync-Signature";

/// Result of one batched send to one pod.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Sends a signed batch of payloads to a single pod.
///
/// Implementations own confidentiality and origin authentication of the
/// payload in transit, plus their own per-send timeout. The dispatch
/// round never distinguishes transport errors from bad status codes;
/// both are `Failed`.
#[async_trait]
pub trait SecureTransport: Send + Sync {
    async fn send(&self, peer: &Peer, batch: &DispatchBatch) -> DeliveryOutcome;
}

#[derive(Serialize)]
struct RemoteEventsBody<'a> {
    data: &'a [serde_json::Value],
}

/// HTTP transport: POST to the pod's federation endpoint over TLS, body
/// signed with a shared HMAC key.
pub struct HttpTransport {
    http_client: reqwest::Client,
    signing_key: String,
}

impl HttpTransport {
    pub fn new(signing_key: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            signing_key,
        }
    }

    fn sign(&self, body: &[u8]) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.signing_key.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl SecureTransport for HttpTransport {
    async fn send(&self, peer: &Peer, batch: &DispatchBatch) -> DeliveryOutcome {
        let url = format!("{}{}", peer.url, REMOTE_EVENTS_PATH);

        let body = match serde_json::to_vec(&RemoteEventsBody {
            data: &batch.payloads,
        }) {
            Ok(body) => body,
            Err(e) => {
                return DeliveryOutcome::Failed {
                    reason: format!("Failed to serialize batch: {}", e),
                }
            }
        };

        let signature = self.sign(&body);

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                // Same success set the pods agree on: 200, 201, 204
                if matches!(status, 200 | 201 | 204) {
                    DeliveryOutcome::Delivered
                } else {
                    DeliveryOutcome::Failed {
                        reason: format!("Status code not 20x: {}", status),
                    }
                }
            }
            Err(e) => DeliveryOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}
