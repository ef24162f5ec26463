// src/mirror.rs
//! Best-effort remote copy of persisted values. Nothing on the session's
//! critical path waits for, or depends on, a mirror request; only `flush`
//! blocks, and the CLI calls it once before exiting.

use crate::db::StorageKey;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on a single mirror request, connect included.
pub const MIRROR_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote mirror of the key-value store. `push` and `delete_entry` return
/// immediately.
pub trait RemoteMirror {
    fn push(&self, key: StorageKey, value: &Value);
    fn delete_entry(&self, entry_id: &str);
    /// Blocks until every request issued so far has completed or timed out.
    fn flush(&self) {}
}

#[derive(Serialize, Debug, Clone)]
pub struct MirrorPayload {
    pub key: String,
    pub value: Value,
}

/// Mirror over a small JSON HTTP API:
/// `PUT {base}/kv/{key}` and `DELETE {base}/history/{id}`.
pub struct HttpMirror {
    http_client: Client,
    server_url: String,
    pending: RefCell<Vec<JoinHandle<()>>>,
}

impl HttpMirror {
    /// # Errors
    /// Returns `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(server_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        let http_client = Client::builder().timeout(MIRROR_TIMEOUT).build()?;
        info!("Mirroring writes to {}", server_url);
        Ok(Self {
            http_client,
            server_url,
            pending: RefCell::new(Vec::new()),
        })
    }

    fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        let mut pending = self.pending.borrow_mut();
        pending.retain(|handle| !handle.is_finished());
        pending.push(thread::spawn(job));
    }
}

impl RemoteMirror for HttpMirror {
    fn push(&self, key: StorageKey, value: &Value) {
        let url = format!("{}/kv/{}", self.server_url, key);
        let payload = MirrorPayload {
            key: key.to_string(),
            value: value.clone(),
        };
        let client = self.http_client.clone();
        self.spawn(move || {
            debug!("Sending PUT to {}", url);
            match client.put(&url).json(&payload).send() {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Mirror accepted '{}'", payload.key);
                }
                Ok(resp) => warn!(
                    "Mirror PUT {} failed with status {}; keeping local copy only",
                    url,
                    resp.status()
                ),
                Err(e) => warn!("Mirror PUT {} failed: {}", url, e),
            }
        });
    }

    fn delete_entry(&self, entry_id: &str) {
        let url = format!("{}/history/{}", self.server_url, entry_id);
        let client = self.http_client.clone();
        self.spawn(move || {
            debug!("Sending DELETE to {}", url);
            match client.delete(&url).send() {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => warn!("Mirror DELETE {} failed with status {}", url, resp.status()),
                Err(e) => warn!("Mirror DELETE {} failed: {}", url, e),
            }
        });
    }

    fn flush(&self) {
        let pending: Vec<JoinHandle<()>> = self.pending.borrow_mut().drain(..).collect();
        if !pending.is_empty() {
            debug!("Waiting for {} mirror request(s)", pending.len());
        }
        for handle in pending {
            if handle.join().is_err() {
                warn!("Mirror request thread panicked");
            }
        }
    }
}

impl Drop for HttpMirror {
    fn drop(&mut self) {
        self.flush();
    }
}
