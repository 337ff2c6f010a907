//! Interfaces to the verification pipeline collaborators.
//!
//! The monitors only ever discover work; assembling sources, matching them
//! against on-chain bytecode, and persisting matches all live behind these
//! seams. Every implementation must be safe under concurrent calls from
//! all chain monitors.

use std::collections::BTreeMap;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use thiserror::Error;

use crate::metadata::SourceAddress;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("source material not found: {0}")]
    NotFound(String),
    #[error("source assembly failed: {0}")]
    Assembly(String),
    #[error("source fetching is not available")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("verification failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("persisting match failed: {0}")]
    Failed(String),
}

/// A contract reconstituted from its fetched source material, ready for
/// verification against on-chain bytecode.
#[derive(Debug, Clone)]
pub struct CheckedContract {
    pub name: String,
    pub source: SourceAddress,
    /// Source files by path.
    pub files: BTreeMap<String, String>,
}

/// How closely the recompiled contract matched the deployed bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchQuality {
    /// Bytecode and metadata hash both match.
    Perfect,
    /// Bytecode matches, metadata hash differs.
    Partial,
}

/// Match result plus the storage receipt the repository issued for it.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub chain_id: u64,
    pub address: Address,
    pub quality: MatchQuality,
    /// Service-specific receipt payload; opaque to the monitors.
    pub receipt: serde_json::Value,
}

/// Retrieves source files from content-addressed locations and assembles a
/// checked contract. Shared by every chain monitor.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn assemble(&self, source: SourceAddress) -> Result<CheckedContract, FetchError>;

    /// Drain outstanding work; no new fetches are accepted afterwards.
    async fn stop(&self);
}

/// Checks a reconstituted contract against the chain.
#[async_trait]
pub trait VerificationService: Send + Sync {
    async fn verify_deployed(
        &self,
        contract: &CheckedContract,
        chain_id: u64,
        address: Address,
        creator_tx: B256,
    ) -> Result<VerificationOutcome, VerifyError>;
}

/// Persists verified matches and answers "already verified?".
#[async_trait]
pub trait RepositoryService: Send + Sync {
    /// Existing matches for the pair; non-empty means already verified.
    async fn check_by_chain_and_address(
        &self,
        address: Address,
        chain_id: u64,
    ) -> Vec<VerificationOutcome>;

    async fn store_match(
        &self,
        contract: &CheckedContract,
        outcome: &VerificationOutcome,
    ) -> Result<(), StoreError>;
}
