//! Lifecycle fan-out across all chain monitors.
//!
//! The supervisor owns one [`ChainMonitor`] per configured chain plus the
//! shared source fetcher. It starts and stops them as a group and re-emits
//! each monitor's lifecycle signals unchanged on a single broadcast
//! channel.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::chains::{self, ChainDescriptor};
use crate::config::{self, MonitorConfig};
use crate::events::{ChainSignal, EventBus};
use crate::monitor::ChainMonitor;
use crate::rpc::RpcConnect;
use crate::services::{RepositoryService, SourceFetcher, VerificationService};

pub struct MonitorSupervisor {
    monitors: Vec<ChainMonitor>,
    fetcher: Arc<dyn SourceFetcher>,
    signals: broadcast::Sender<ChainSignal>,
}

impl MonitorSupervisor {
    /// Build one monitor per chain, all wired to the shared fetcher and
    /// services. An empty `chains` list means the registry's default set.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_set: Vec<ChainDescriptor>,
        tuning: MonitorConfig,
        connector: Arc<dyn RpcConnect>,
        fetcher: Arc<dyn SourceFetcher>,
        verifier: Arc<dyn VerificationService>,
        repository: Arc<dyn RepositoryService>,
        events: EventBus,
    ) -> Self {
        let chain_set = if chain_set.is_empty() {
            chains::default_chains()
        } else {
            chain_set
        };

        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let (signals, _) = broadcast::channel(64);

        let monitors = chain_set
            .into_iter()
            .map(|chain| {
                let start_override = config::start_block_override(chain.chain_id);
                ChainMonitor::new(
                    chain,
                    tuning.clone(),
                    start_override,
                    connector.clone(),
                    fetcher.clone(),
                    verifier.clone(),
                    repository.clone(),
                    events.clone(),
                    signal_tx.clone(),
                )
            })
            .collect();

        // Forward monitor signals unchanged to the public channel. The task
        // ends once every monitor (each holding a sender clone) is dropped.
        let forward = signals.clone();
        tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                let _ = forward.send(signal);
            }
        });

        Self {
            monitors,
            fetcher,
            signals,
        }
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Re-emitted `contract-verified-successfully` / `contract-already-
    /// verified` signals from every monitor.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainSignal> {
        self.signals.subscribe()
    }

    /// Start every monitor concurrently; returns once each has either
    /// scheduled its polling loop or given up on all its endpoints.
    pub async fn start(&self) {
        info!(monitors = self.monitors.len(), "starting chain monitors");
        join_all(self.monitors.iter().map(|monitor| monitor.start())).await;
    }

    /// Stop the monitors first, the shared fetcher last, so no new fetch is
    /// enqueued after the fetcher begins draining.
    pub async fn stop(&self) {
        info!(monitors = self.monitors.len(), "stopping chain monitors");
        for monitor in &self.monitors {
            monitor.stop().await;
        }
        self.fetcher.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{BlockView, RpcClient, RpcError, TxView};
    use crate::services::{
        CheckedContract, FetchError, MatchQuality, StoreError, VerificationOutcome, VerifyError,
    };
    use alloy::primitives::{Address, B256, Bytes};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    struct StaticClient {
        endpoint: String,
        block: BlockView,
    }

    #[async_trait]
    impl RpcClient for StaticClient {
        async fn block_number(&self) -> Result<u64, RpcError> {
            Ok(self.block.number)
        }

        async fn block_with_transactions(
            &self,
            number: u64,
        ) -> Result<Option<BlockView>, RpcError> {
            if number == self.block.number {
                Ok(Some(self.block.clone()))
            } else {
                Ok(None)
            }
        }

        async fn code_at(&self, _address: Address) -> Result<Bytes, RpcError> {
            Ok(Bytes::new())
        }

        fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    struct StaticConnector;

    #[async_trait]
    impl RpcConnect for StaticConnector {
        async fn connect(&self, url: &str) -> Result<Arc<dyn RpcClient>, RpcError> {
            Ok(Arc::new(StaticClient {
                endpoint: url.to_string(),
                block: BlockView {
                    number: 10,
                    transactions: vec![TxView {
                        hash: B256::repeat_byte(0x22),
                        from: Address::repeat_byte(0x33),
                        to: None,
                        nonce: 0,
                    }],
                },
            }))
        }
    }

    struct IdleFetcher {
        stopped: AtomicBool,
    }

    #[async_trait]
    impl SourceFetcher for IdleFetcher {
        async fn assemble(
            &self,
            _source: crate::metadata::SourceAddress,
        ) -> Result<CheckedContract, FetchError> {
            Err(FetchError::Unavailable)
        }

        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct UnusedVerifier;

    #[async_trait]
    impl VerificationService for UnusedVerifier {
        async fn verify_deployed(
            &self,
            _contract: &CheckedContract,
            _chain_id: u64,
            _address: Address,
            _creator_tx: B256,
        ) -> Result<VerificationOutcome, VerifyError> {
            Err(VerifyError::Failed("unused".to_string()))
        }
    }

    /// Reports every address as already verified, so monitors raise the
    /// `contract-already-verified` signal without touching bytecode.
    struct EverythingVerifiedRepo;

    #[async_trait]
    impl RepositoryService for EverythingVerifiedRepo {
        async fn check_by_chain_and_address(
            &self,
            address: Address,
            chain_id: u64,
        ) -> Vec<VerificationOutcome> {
            vec![VerificationOutcome {
                chain_id,
                address,
                quality: MatchQuality::Perfect,
                receipt: serde_json::Value::Null,
            }]
        }

        async fn store_match(
            &self,
            _contract: &CheckedContract,
            _outcome: &VerificationOutcome,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn fast_tuning() -> MonitorConfig {
        MonitorConfig {
            block_pause_factor: 1.1,
            block_pause_upper_limit: Duration::from_millis(100),
            block_pause_lower_limit: Duration::from_millis(5),
            provider_timeout: Duration::from_millis(500),
            get_bytecode_retry_pause: Duration::from_millis(5),
            get_block_pause: Duration::from_millis(10),
            initial_get_bytecode_tries: 3,
        }
    }

    fn supervisor(chain_set: Vec<ChainDescriptor>) -> (MonitorSupervisor, Arc<IdleFetcher>) {
        let fetcher = Arc::new(IdleFetcher {
            stopped: AtomicBool::new(false),
        });
        let supervisor = MonitorSupervisor::new(
            chain_set,
            fast_tuning(),
            Arc::new(StaticConnector),
            fetcher.clone(),
            Arc::new(UnusedVerifier),
            Arc::new(EverythingVerifiedRepo),
            EventBus::new(64),
        );
        (supervisor, fetcher)
    }

    fn two_chains() -> Vec<ChainDescriptor> {
        vec![
            ChainDescriptor::new(1, "one", vec!["http://one".to_string()]),
            ChainDescriptor::new(2, "two", vec!["http://two".to_string()]),
        ]
    }

    #[tokio::test]
    async fn empty_chain_set_falls_back_to_defaults() {
        let (supervisor, _) = supervisor(Vec::new());
        assert_eq!(
            supervisor.monitor_count(),
            crate::chains::default_chains().len()
        );
    }

    #[tokio::test]
    async fn signals_are_reemitted_from_every_chain() {
        let (supervisor, _) = supervisor(two_chains());
        let mut signals = supervisor.subscribe();

        supervisor.start().await;

        let mut chains_seen = std::collections::HashSet::new();
        while chains_seen.len() < 2 {
            match timeout(Duration::from_secs(2), signals.recv())
                .await
                .expect("timed out waiting for signals")
                .expect("signal channel closed")
            {
                ChainSignal::AlreadyVerified { chain_id, .. } => {
                    chains_seen.insert(chain_id);
                }
                ChainSignal::Verified { chain_id, .. } => {
                    chains_seen.insert(chain_id);
                }
            }
        }
        assert!(chains_seen.contains(&1));
        assert!(chains_seen.contains(&2));

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn stop_halts_monitors_then_drains_the_fetcher() {
        let (supervisor, fetcher) = supervisor(two_chains());
        supervisor.start().await;

        supervisor.stop().await;

        assert!(fetcher.stopped.load(Ordering::SeqCst));
        // A second stop is harmless.
        supervisor.stop().await;
    }
}
