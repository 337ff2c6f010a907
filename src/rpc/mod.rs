//! JSON-RPC access for the chain monitors.
//!
//! Monitors talk to a narrow [`RpcClient`] trait rather than a concrete
//! provider, so the polling engine is transport-agnostic and testable.
//! [`AlloyConnector`] is the production implementation: it picks the
//! transport from the URL scheme (http(s) request-response, ws(s)
//! persistent socket) and applies the advisory per-call timeout.

use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::Transaction as TxEnvelope;
use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionResponse;
use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::BlockTransactions;
use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// A transaction as the monitor needs to see it: enough to detect a
/// contract creation and derive the deployed address.
#[derive(Debug, Clone)]
pub struct TxView {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
}

impl TxView {
    /// True when the transaction has no destination, i.e. deploys code.
    pub fn creates_contract(&self) -> bool {
        self.to.is_none()
    }
}

/// A block with its transactions in declared order.
#[derive(Debug, Clone)]
pub struct BlockView {
    pub number: u64,
    pub transactions: Vec<TxView>,
}

/// The capability set the monitors require from a provider.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Current head block number. Doubles as the startup probe.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Block `number` with full transactions, `None` if not yet mined.
    async fn block_with_transactions(&self, number: u64) -> Result<Option<BlockView>, RpcError>;

    /// Deployed code at `address`; empty bytes when the node has no
    /// post-state for it yet.
    async fn code_at(&self, address: Address) -> Result<Bytes, RpcError>;

    /// The endpoint URL this client is bound to.
    fn endpoint(&self) -> &str;
}

/// Builds an [`RpcClient`] for an endpoint URL. A separate seam from the
/// client itself so startup fail-over can be exercised without a network.
#[async_trait]
pub trait RpcConnect: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn RpcClient>, RpcError>;
}

/// Production connector backed by alloy providers.
pub struct AlloyConnector {
    call_timeout: Duration,
}

impl AlloyConnector {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }
}

#[async_trait]
impl RpcConnect for AlloyConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn RpcClient>, RpcError> {
        let supported = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| url.starts_with(scheme));
        if !supported {
            return Err(RpcError::UnsupportedScheme(url.to_string()));
        }

        debug!(url = %url, "connecting RPC provider");
        let provider = ProviderBuilder::new()
            .connect(url)
            .await
            .map_err(|e| RpcError::Connect(e.to_string()))?
            .erased();

        Ok(Arc::new(AlloyClient {
            provider,
            endpoint: url.to_string(),
            call_timeout: self.call_timeout,
        }))
    }
}

struct AlloyClient {
    provider: DynProvider,
    endpoint: String,
    call_timeout: Duration,
}

impl AlloyClient {
    async fn bounded<T, E, F>(&self, fut: F) -> Result<T, RpcError>
    where
        E: std::fmt::Display,
        F: std::future::IntoFuture<Output = Result<T, E>>,
    {
        match timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RpcError::Request(e.to_string())),
            Err(_) => Err(RpcError::Timeout(self.call_timeout)),
        }
    }
}

#[async_trait]
impl RpcClient for AlloyClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.bounded(self.provider.get_block_number()).await
    }

    async fn block_with_transactions(&self, number: u64) -> Result<Option<BlockView>, RpcError> {
        let block = self
            .bounded(
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .full(),
            )
            .await?;

        Ok(block.map(|block| {
            let transactions = match &block.transactions {
                BlockTransactions::Full(txs) => txs
                    .iter()
                    .map(|tx| TxView {
                        hash: tx.tx_hash(),
                        from: TransactionResponse::from(tx),
                        to: TxEnvelope::to(tx),
                        nonce: TxEnvelope::nonce(tx),
                    })
                    .collect(),
                _ => Vec::new(),
            };
            BlockView {
                number: block.header.number,
                transactions,
            }
        }))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, RpcError> {
        self.bounded(self.provider.get_code_at(address)).await
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// The address a CREATE deployment lands at: `keccak256(rlp([sender,
/// nonce]))[12..]`.
pub fn deployment_address(sender: Address, nonce: u64) -> Address {
    let mut payload = Vec::with_capacity(30);
    rlp_append_bytes(&mut payload, sender.as_slice());
    rlp_append_u64(&mut payload, nonce);

    // payload is at most 29 bytes, always a short list
    let mut list = Vec::with_capacity(1 + payload.len());
    list.push(0xc0 + payload.len() as u8);
    list.extend_from_slice(&payload);

    Address::from_slice(&keccak256(&list)[12..])
}

fn rlp_append_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(0x80 + bytes.len() as u8);
    out.extend_from_slice(bytes);
}

fn rlp_append_u64(out: &mut Vec<u8>, value: u64) {
    if value == 0 {
        out.push(0x80);
    } else if value < 0x80 {
        out.push(value as u8);
    } else {
        let be = value.to_be_bytes();
        let first = be.iter().position(|b| *b != 0).unwrap_or(7);
        let slice = &be[first..];
        out.push(0x80 + slice.len() as u8);
        out.extend_from_slice(slice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // Canonical sender/nonce vectors replicated across ecosystem libraries.
    #[test]
    fn deployment_address_matches_known_vectors() {
        let sender = Address::from_str("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap();

        let cases = [
            (0u64, "0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d"),
            (1, "0x343c43a37d37dff08ae8c4a11544c718abb4fcf8"),
            (2, "0xf778b86fa74e846c4f0a1fbd1335fe81c00a0c91"),
            (3, "0xfffd933a0bc612844eaf0c6fe3e5b8e9b6c1d19c"),
        ];
        for (nonce, expected) in cases {
            assert_eq!(
                deployment_address(sender, nonce),
                Address::from_str(expected).unwrap(),
                "nonce {nonce}"
            );
        }
    }

    #[test]
    fn deployment_address_handles_multi_byte_nonces() {
        let sender = Address::from_str("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap();

        // 0x7f is the last single-byte nonce encoding; 0x80 and beyond use a
        // length prefix. The derivation must stay injective across the
        // boundary.
        let a = deployment_address(sender, 0x7f);
        let b = deployment_address(sender, 0x80);
        let c = deployment_address(sender, 0x1_0000);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn connector_rejects_unknown_schemes() {
        let connector = AlloyConnector::new(Duration::from_millis(100));
        let err = connector.connect("ipc:///tmp/geth.ipc").await.err().unwrap();
        assert!(matches!(err, RpcError::UnsupportedScheme(_)));
    }
}
