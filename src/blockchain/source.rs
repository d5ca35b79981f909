//! Chain head sources.
//!
//! # Responsibilities
//! - Query a backend's latest block over JSON-RPC
//! - Bound every call with a timeout
//! - Map transport failures onto [`PollError`]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::providers::{Provider, ProviderBuilder};
use futures_util::future::{BoxFuture, FutureExt};
use tokio::time::timeout;
use url::Url;

use crate::blockchain::types::{BlockHead, PollError, PollResult};

/// Something that can report a backend's current chain head.
pub trait BlockSource: Send + Sync + fmt::Debug {
    /// Fetch the block tagged `latest`.
    fn latest_block(&self) -> BoxFuture<'_, PollResult<BlockHead>>;
}

/// JSON-RPC block source backed by an alloy HTTP provider.
#[derive(Clone)]
pub struct RpcBlockSource {
    url: Url,
    provider: Arc<dyn Provider + Send + Sync>,
    timeout_duration: Duration,
}

impl RpcBlockSource {
    /// Create a source for `url`. No connection is made until the first poll.
    pub fn new(url: Url, timeout_duration: Duration) -> Self {
        let provider = Arc::new(ProviderBuilder::new().connect_http(url.clone()))
            as Arc<dyn Provider + Send + Sync>;
        Self {
            url,
            provider,
            timeout_duration,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl BlockSource for RpcBlockSource {
    fn latest_block(&self) -> BoxFuture<'_, PollResult<BlockHead>> {
        async move {
            let fut = self.provider.get_block_by_number(BlockNumberOrTag::Latest);
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(Some(block))) => Ok(BlockHead::new(block.header.number, block.header.hash)),
                Ok(Ok(None)) => Err(PollError::Malformed("latest block not returned".to_string())),
                Ok(Err(e)) => Err(PollError::Rpc(e.to_string())),
                Err(_) => Err(PollError::Timeout(self.timeout_duration)),
            }
        }
        .boxed()
    }
}

impl fmt::Debug for RpcBlockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcBlockSource")
            .field("url", &self.url.as_str())
            .field("timeout", &self.timeout_duration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_backend_is_an_error() {
        // Nothing listens on port 1; the call must fail rather than panic.
        let url: Url = "http://127.0.0.1:1".parse().unwrap();
        let source = RpcBlockSource::new(url, Duration::from_secs(2));
        let result = source.latest_block().await;
        assert!(matches!(
            result,
            Err(PollError::Rpc(_)) | Err(PollError::Timeout(_))
        ));
    }

    #[test]
    fn test_debug_shows_url() {
        let url: Url = "http://node1.internal:8545".parse().unwrap();
        let source = RpcBlockSource::new(url, Duration::from_secs(5));
        assert!(format!("{:?}", source).contains("node1.internal"));
    }
}
