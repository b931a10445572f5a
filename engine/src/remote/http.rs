//! HTTP implementation of the remote store.
//!
//! Speaks the REST dialect of a tree-structured realtime database: each
//! node is addressed as `{base}/{principal}/notes/{id}.json`, the subtree
//! is fetched in one `GET`, and the subscription is a `text/event-stream`
//! response kept open by the server. Every server-sent change event
//! triggers a fresh subtree read, so subscribers always receive full
//! snapshots; merges downstream are idempotent, which makes the occasional
//! duplicate snapshot harmless.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, StatusCode};
use tokio::sync::mpsc;

use super::{ListenerGuard, RemoteStore, Snapshot, Subscription};
use crate::error::{RemoteError, RemoteResult};
use crate::identity::Principal;
use crate::mapper::{decode_subtree, WireNote};

/// REST adapter for a realtime-database-style remote.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base: String,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Build an adapter for the given base URL. The URL must carry an
    /// `http://` or `https://` scheme; a trailing slash is tolerated.
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        let base = base_url.into().trim().trim_end_matches('/').to_string();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(RemoteError::Unavailable(format!(
                "invalid remote base url '{base}'"
            )));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Ok(Self { base, client })
    }

    fn subtree_url(&self, principal: &Principal) -> String {
        format!("{}/{}/notes.json", self.base, principal)
    }

    fn node_url(&self, principal: &Principal, id: &str) -> String {
        format!("{}/{}/notes/{}.json", self.base, principal, id)
    }

    fn status_error(status: StatusCode, principal: &Principal) -> RemoteError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            RemoteError::PermissionDenied(principal.as_str().to_string())
        } else {
            RemoteError::Unavailable(format!("HTTP {status}"))
        }
    }

    fn check_status(status: StatusCode, principal: &Principal) -> RemoteResult<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::status_error(status, principal))
        }
    }

    /// Forward change events into the subscription channel until the
    /// stream ends, the namespace is revoked, or the receiver goes away.
    async fn pump_events(
        &self,
        response: reqwest::Response,
        principal: Principal,
        tx: mpsc::UnboundedSender<RemoteResult<Snapshot>>,
    ) {
        // Current snapshot first; the server's initial `put` event may
        // duplicate it, which the idempotent merge absorbs.
        match self.read_all(&principal).await {
            Ok(snapshot) => {
                if tx.send(Ok(snapshot)).is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err));
                return;
            }
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = tx.send(Err(RemoteError::Unavailable(err.to_string())));
                    return;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));

            for event in drain_events(&mut buffer) {
                match event.as_str() {
                    "put" | "patch" => match self.read_all(&principal).await {
                        Ok(snapshot) => {
                            if tx.send(Ok(snapshot)).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = tx.send(Err(err));
                            return;
                        }
                    },
                    "keep-alive" => {}
                    "cancel" | "auth_revoked" => {
                        let _ = tx.send(Err(RemoteError::PermissionDenied(
                            principal.as_str().to_string(),
                        )));
                        return;
                    }
                    other => {
                        tracing::trace!(event = other, "ignoring unknown stream event");
                    }
                }
            }
        }

        let _ = tx.send(Err(RemoteError::Unavailable("event stream closed".into())));
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn write(&self, principal: &Principal, note: &WireNote) -> RemoteResult<()> {
        let response = self
            .client
            .put(self.node_url(principal, &note.id))
            .json(note)
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Self::check_status(response.status(), principal)
    }

    async fn remove(&self, principal: &Principal, id: &str) -> RemoteResult<()> {
        let response = self
            .client
            .delete(self.node_url(principal, id))
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Self::check_status(response.status(), principal)
    }

    async fn read_all(&self, principal: &Principal) -> RemoteResult<Snapshot> {
        let response = self
            .client
            .get(self.subtree_url(principal))
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Self::check_status(response.status(), principal)?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Ok(decode_subtree(&value))
    }

    async fn subscribe(&self, principal: &Principal) -> RemoteResult<Subscription> {
        let response = self
            .client
            .get(self.subtree_url(principal))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Self::check_status(response.status(), principal)?;

        tracing::debug!(namespace = %principal, "event stream opened");

        let (tx, rx) = mpsc::unbounded_channel();
        let this = self.clone();
        let principal = principal.clone();
        let handle = tokio::spawn(async move {
            this.pump_events(response, principal, tx).await;
        });

        // Aborting the pump drops the response, which closes the
        // server-side listener.
        let guard = ListenerGuard::new(move || handle.abort());

        Ok(Subscription::new(rx, guard))
    }
}

/// Pull complete server-sent event blocks out of `buffer`, returning their
/// event names and leaving any partial block in place.
fn drain_events(buffer: &mut String) -> Vec<String> {
    if buffer.contains('\r') {
        *buffer = buffer.replace('\r', "");
    }

    let mut events = Vec::new();

    while let Some(boundary) = buffer.find("\n\n") {
        let block = buffer[..boundary].to_string();
        buffer.drain(..boundary + 2);

        for line in block.lines() {
            if let Some(name) = line.strip_prefix("event:") {
                events.push(name.trim().to_string());
            }
        }
    }

    events
}
