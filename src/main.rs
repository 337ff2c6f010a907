//! bytewatch: always-on worker that watches chains for newly deployed
//! contracts, extracts their metadata pointers, and feeds them to a
//! source-verification pipeline.
//!
//! The pipeline collaborators (source fetcher, verification service,
//! repository) are external services; this binary wires logging stand-ins
//! so the monitoring engine runs end-to-end on its own.

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use bytewatch::chains;
use bytewatch::config::MonitorConfig;
use bytewatch::events::EventBus;
use bytewatch::metadata::SourceAddress;
use bytewatch::rpc::AlloyConnector;
use bytewatch::services::{
    CheckedContract, FetchError, MatchQuality, RepositoryService, SourceFetcher, StoreError,
    VerificationOutcome, VerificationService, VerifyError,
};
use bytewatch::supervisor::MonitorSupervisor;

/// Stand-in fetcher: logs the pointer it was handed and reports the source
/// as unavailable. Real assembly lives in the external fetcher service.
struct LoggingFetcher;

#[async_trait]
impl SourceFetcher for LoggingFetcher {
    async fn assemble(&self, source: SourceAddress) -> Result<CheckedContract, FetchError> {
        info!(source = %source, "source pointer discovered (no fetcher wired)");
        Err(FetchError::Unavailable)
    }

    async fn stop(&self) {
        debug!("fetcher drained");
    }
}

struct LoggingVerifier;

#[async_trait]
impl VerificationService for LoggingVerifier {
    async fn verify_deployed(
        &self,
        contract: &CheckedContract,
        chain_id: u64,
        address: Address,
        _creator_tx: B256,
    ) -> Result<VerificationOutcome, VerifyError> {
        info!(contract = %contract.name, chain_id, address = %address, "verify requested");
        Ok(VerificationOutcome {
            chain_id,
            address,
            quality: MatchQuality::Partial,
            receipt: serde_json::Value::Null,
        })
    }
}

struct LoggingRepository;

#[async_trait]
impl RepositoryService for LoggingRepository {
    async fn check_by_chain_and_address(
        &self,
        _address: Address,
        _chain_id: u64,
    ) -> Vec<VerificationOutcome> {
        Vec::new()
    }

    async fn store_match(
        &self,
        contract: &CheckedContract,
        outcome: &VerificationOutcome,
    ) -> Result<(), StoreError> {
        info!(
            contract = %contract.name,
            address = %outcome.address,
            quality = ?outcome.quality,
            "match stored"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Default to `info` when RUST_LOG is unset or invalid.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let tuning = MonitorConfig::from_env()?;
    let chain_set = chains::load_registry()?;
    info!(chains = chain_set.len(), "loaded chain registry");

    let events = EventBus::default();
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            debug!(event = %event, "monitor event");
        }
    });

    let connector = Arc::new(AlloyConnector::new(tuning.provider_timeout));
    let supervisor = MonitorSupervisor::new(
        chain_set,
        tuning,
        connector,
        Arc::new(LoggingFetcher),
        Arc::new(LoggingVerifier),
        Arc::new(LoggingRepository),
        events,
    );

    let mut signals = supervisor.subscribe();
    tokio::spawn(async move {
        while let Ok(signal) = signals.recv().await {
            info!(signal = %signal, "lifecycle signal");
        }
    });

    supervisor.start().await;
    info!("monitors running, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    supervisor.stop().await;

    Ok(())
}
