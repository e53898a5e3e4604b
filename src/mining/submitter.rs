//! Where winning candidates go: the in-process ledger or a remote node.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::{Block, ChainTip, LedgerStore};
use crate::error::MiningError;

/// Source of templates and sink for winning candidates.
pub trait BlockSubmitter: Send + Sync {
    fn tip(&self) -> Result<ChainTip, MiningError>;

    /// Returns the block as stored by the ledger.
    fn submit(&self, candidate: &Block) -> Result<Block, MiningError>;

    fn describe(&self) -> String;
}

pub struct LocalSubmitter {
    ledger: Arc<LedgerStore>,
}

impl LocalSubmitter {
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self { ledger }
    }
}

impl BlockSubmitter for LocalSubmitter {
    fn tip(&self) -> Result<ChainTip, MiningError> {
        Ok(self.ledger.tip())
    }

    fn submit(&self, candidate: &Block) -> Result<Block, MiningError> {
        Ok(self.ledger.append(candidate.clone())?)
    }

    fn describe(&self) -> String {
        "local ledger".to_string()
    }
}

/// Body of `POST /api/v1/mining/submit/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub accepted: bool,
    pub block: Option<Block>,
    pub reason: Option<String>,
}

/// Submits to another node's mining API. Every failure, network or
/// validation, is a `RemoteLedgerFailure`.
///
/// Each call runs on its own short-lived actix system, so it must be called
/// from a plain thread (the coordinator thread), never from inside a runtime.
pub struct RemoteSubmitter {
    base_url: String,
    timeout: Duration,
}

impl RemoteSubmitter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/mining/{path}", self.base_url)
    }

    fn call<T, F, Fut>(&self, request: F) -> Result<T, MiningError>
    where
        F: FnOnce(awc::Client) -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let timeout = self.timeout;
        actix_rt::System::new()
            .block_on(async move {
                let client = awc::Client::builder().timeout(timeout).finish();
                request(client).await
            })
            .map_err(MiningError::RemoteLedgerFailure)
    }
}

impl BlockSubmitter for RemoteSubmitter {
    fn tip(&self) -> Result<ChainTip, MiningError> {
        let url = self.url("tip/");
        self.call(|client| async move {
            let mut resp = client
                .get(url.as_str())
                .send()
                .await
                .map_err(|e| format!("GET {url}: {e}"))?;
            if !resp.status().is_success() {
                return Err(format!("GET {url}: HTTP {}", resp.status()));
            }
            resp.json::<ChainTip>()
                .await
                .map_err(|e| format!("GET {url}: bad body: {e}"))
        })
    }

    fn submit(&self, candidate: &Block) -> Result<Block, MiningError> {
        let url = self.url("submit/");
        self.call(|client| async move {
            let mut resp = client
                .post(url.as_str())
                .send_json(candidate)
                .await
                .map_err(|e| format!("POST {url}: {e}"))?;
            let status = resp.status();
            let outcome = resp
                .json::<SubmitOutcome>()
                .await
                .map_err(|e| format!("POST {url}: HTTP {status}, bad body: {e}"))?;
            match outcome {
                SubmitOutcome {
                    accepted: true,
                    block: Some(block),
                    ..
                } => Ok(block),
                SubmitOutcome { reason, .. } => Err(format!(
                    "rejected by {url}: {}",
                    reason.unwrap_or_else(|| format!("HTTP {status}"))
                )),
            }
        })
    }

    fn describe(&self) -> String {
        format!("remote ledger at {}", self.base_url)
    }
}
