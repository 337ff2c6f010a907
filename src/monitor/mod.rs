//! Per-chain monitoring engine.
//!
//! One `ChainMonitor` per network. It owns the RPC provider for that chain,
//! polls blocks strictly in ascending order with adaptive pacing, detects
//! contract-creating transactions, retrieves deployed bytecode with a
//! bounded retry budget, and hands decoded source pointers to the
//! fetcher/verification pipeline. All mid-run failures are recovered
//! locally and surfaced as events; nothing propagates past the monitor.

pub mod pacing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use dashmap::DashSet;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::chains::ChainDescriptor;
use crate::config::MonitorConfig;
use crate::events::{ChainSignal, EventBus, MonitorEvent};
use crate::metadata;
use crate::rpc::{deployment_address, RpcClient, RpcConnect};
use crate::services::{
    CheckedContract, RepositoryService, SourceFetcher, VerificationService,
};

use pacing::BlockPause;

/// Monitors a single chain for contract deployments. Cloning shares all
/// state; clones exist so spawned tasks can own a handle.
#[derive(Clone)]
pub struct ChainMonitor {
    chain: ChainDescriptor,
    tuning: MonitorConfig,
    start_override: Option<u64>,
    connector: Arc<dyn RpcConnect>,
    fetcher: Arc<dyn SourceFetcher>,
    verifier: Arc<dyn VerificationService>,
    repository: Arc<dyn RepositoryService>,
    events: EventBus,
    signals: mpsc::UnboundedSender<ChainSignal>,
    /// Gates every reschedule; cleared by `stop`.
    running: Arc<AtomicBool>,
    /// The one retained provider between a successful start and stop.
    client: Arc<Mutex<Option<Arc<dyn RpcClient>>>>,
    /// Addresses already handed to the pipeline in this epoch.
    seen: Arc<DashSet<Address>>,
}

impl ChainMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: ChainDescriptor,
        tuning: MonitorConfig,
        start_override: Option<u64>,
        connector: Arc<dyn RpcConnect>,
        fetcher: Arc<dyn SourceFetcher>,
        verifier: Arc<dyn VerificationService>,
        repository: Arc<dyn RepositoryService>,
        events: EventBus,
        signals: mpsc::UnboundedSender<ChainSignal>,
    ) -> Self {
        Self {
            chain,
            tuning,
            start_override,
            connector,
            fetcher,
            verifier,
            repository,
            events,
            signals,
            running: Arc::new(AtomicBool::new(false)),
            client: Arc::new(Mutex::new(None)),
            seen: Arc::new(DashSet::new()),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.chain_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Try each RPC endpoint in listed order; on the first whose head probe
    /// succeeds, retain it and schedule the polling loop. Per-endpoint
    /// failures are logged, never raised. With no working endpoint the
    /// monitor stays idle and emits `CantStart`.
    pub async fn start(&self) {
        if self.is_running() {
            warn!(chain = %self.chain.name, "monitor already running, ignoring start");
            return;
        }

        for url in &self.chain.rpc_urls {
            let client = match self.connector.connect(url).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(
                        chain = %self.chain.name,
                        url = %url,
                        error = %e,
                        "endpoint connect failed, trying next"
                    );
                    continue;
                }
            };

            let head = match client.block_number().await {
                Ok(head) => head,
                Err(e) => {
                    warn!(
                        chain = %self.chain.name,
                        url = %url,
                        error = %e,
                        "endpoint probe failed, trying next"
                    );
                    continue;
                }
            };

            let start_block = self.start_override.unwrap_or(head);
            *self.client.lock().await = Some(client.clone());
            self.seen.clear();
            self.running.store(true, Ordering::SeqCst);

            info!(
                chain = %self.chain.name,
                chain_id = self.chain.chain_id,
                url = %url,
                start_block = start_block,
                "monitor started"
            );
            self.events.publish(MonitorEvent::Started {
                chain_id: self.chain.chain_id,
                chain_name: self.chain.name.clone(),
                provider_url: url.clone(),
                start_block,
            });

            let monitor = self.clone();
            tokio::spawn(async move { monitor.block_loop(client, start_block).await });
            return;
        }

        error!(
            chain = %self.chain.name,
            chain_id = self.chain.chain_id,
            "no working RPC endpoint, monitor not started"
        );
        self.events.publish(MonitorEvent::CantStart {
            chain_id: self.chain.chain_id,
        });
    }

    /// Mark the monitor not-running. Pending timers observe the cleared
    /// flag and become no-ops; in-flight requests settle naturally.
    /// Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.client.lock().await.take();
        info!(chain = %self.chain.name, chain_id = self.chain.chain_id, "monitor stopped");
        self.events.publish(MonitorEvent::Stopped {
            chain_id: self.chain.chain_id,
        });
    }

    /// The polling loop. Blocks are processed strictly in ascending order:
    /// the cursor advances only after a non-null fetch, so a null or failed
    /// fetch retries the same block on the next tick.
    async fn block_loop(self, client: Arc<dyn RpcClient>, start_block: u64) {
        let mut pause = BlockPause::new(
            self.tuning.get_block_pause,
            self.tuning.block_pause_factor,
            self.tuning.block_pause_lower_limit,
            self.tuning.block_pause_upper_limit,
        );
        let mut cursor = start_block;

        while self.is_running() {
            match client.block_with_transactions(cursor).await {
                Ok(Some(block)) => {
                    pause.decrease();
                    self.events.publish(MonitorEvent::ProcessingBlock {
                        chain_id: self.chain.chain_id,
                        block_number: cursor,
                        pause_ms: pause.current_ms(),
                    });
                    debug!(
                        chain = %self.chain.name,
                        block = cursor,
                        txs = block.transactions.len(),
                        pause_ms = pause.current_ms(),
                        "processing block"
                    );

                    for tx in &block.transactions {
                        if tx.creates_contract() {
                            self.handle_creation(&client, tx.hash, tx.from, tx.nonce).await;
                        }
                    }
                    cursor += 1;
                }
                Ok(None) => {
                    pause.increase();
                    debug!(
                        chain = %self.chain.name,
                        block = cursor,
                        pause_ms = pause.current_ms(),
                        "block not yet mined"
                    );
                }
                Err(e) => {
                    warn!(
                        chain = %self.chain.name,
                        block = cursor,
                        error = %e,
                        "block fetch failed, will retry"
                    );
                    self.events.publish(MonitorEvent::ProcessingBlockError {
                        chain_id: self.chain.chain_id,
                        block_number: cursor,
                        reason: e.to_string(),
                    });
                }
            }

            if !self.is_running() {
                break;
            }
            tokio::time::sleep(pause.current()).await;
        }
    }

    /// A contract-creating transaction: derive the deployed address, short-
    /// circuit through the repository, otherwise launch a bytecode task.
    async fn handle_creation(
        &self,
        client: &Arc<dyn RpcClient>,
        creator_tx: B256,
        sender: Address,
        nonce: u64,
    ) {
        let address = deployment_address(sender, nonce);

        if !self.seen.insert(address) {
            debug!(
                chain = %self.chain.name,
                address = %address,
                "address already handled this epoch"
            );
            return;
        }

        let existing = self
            .repository
            .check_by_chain_and_address(address, self.chain.chain_id)
            .await;
        if !existing.is_empty() {
            info!(
                chain = %self.chain.name,
                address = %address,
                "contract already verified"
            );
            self.events.publish(MonitorEvent::AlreadyVerified {
                chain_id: self.chain.chain_id,
                address,
            });
            let _ = self.signals.send(ChainSignal::AlreadyVerified {
                chain_id: self.chain.chain_id,
                address,
            });
            return;
        }

        info!(
            chain = %self.chain.name,
            address = %address,
            creator_tx = %creator_tx,
            "new contract detected"
        );
        self.events.publish(MonitorEvent::NewContract {
            chain_id: self.chain.chain_id,
            address,
            creator_tx,
        });

        let monitor = self.clone();
        let client = Arc::clone(client);
        tokio::spawn(async move {
            monitor.bytecode_task(client, creator_tx, address).await;
        });
    }

    /// Retrieve deployed bytecode with a bounded budget. The budget is
    /// spent before each attempt, so a task never makes more than
    /// `initial_get_bytecode_tries` RPC calls; exhaustion is silent. Empty
    /// code and transport errors both retry after the configured pause,
    /// since the node may simply not have the post-state yet.
    async fn bytecode_task(
        self,
        client: Arc<dyn RpcClient>,
        creator_tx: B256,
        address: Address,
    ) {
        let mut retries_left = self.tuning.initial_get_bytecode_tries;

        loop {
            if !self.is_running() {
                return;
            }
            if retries_left == 0 {
                debug!(
                    chain = %self.chain.name,
                    address = %address,
                    "bytecode retry budget exhausted"
                );
                return;
            }
            retries_left -= 1;

            match client.code_at(address).await {
                Ok(code) if code.is_empty() => {
                    debug!(
                        chain = %self.chain.name,
                        address = %address,
                        retries_left = retries_left,
                        "empty bytecode, node may lag post-state"
                    );
                }
                Ok(code) => {
                    self.dispatch_source(creator_tx, address, &code).await;
                    return;
                }
                Err(e) => {
                    warn!(
                        chain = %self.chain.name,
                        address = %address,
                        retries_left = retries_left,
                        error = %e,
                        "bytecode fetch failed"
                    );
                    self.events.publish(MonitorEvent::GettingBytecodeError {
                        chain_id: self.chain.chain_id,
                        address,
                        reason: e.to_string(),
                    });
                }
            }

            tokio::time::sleep(self.tuning.get_bytecode_retry_pause).await;
        }
    }

    /// Bytecode in hand: decode the metadata trailer and hand the source
    /// pointer to the fetcher. A malformed trailer drops the task: the
    /// code is present but unverifiable. Assembly failures belong to the
    /// fetcher.
    async fn dispatch_source(&self, creator_tx: B256, address: Address, code: &[u8]) {
        let source = match metadata::decode_source_address(code) {
            Ok(source) => source,
            Err(e) => {
                warn!(
                    chain = %self.chain.name,
                    address = %address,
                    error = %e,
                    "metadata trailer did not decode"
                );
                self.events.publish(MonitorEvent::ProcessingBytecodeError {
                    chain_id: self.chain.chain_id,
                    address,
                    reason: e.to_string(),
                });
                return;
            }
        };

        debug!(
            chain = %self.chain.name,
            address = %address,
            source = %source,
            "decoded source pointer"
        );

        match self.fetcher.assemble(source).await {
            Ok(contract) => self.verify_and_store(contract, address, creator_tx).await,
            Err(e) => {
                debug!(
                    chain = %self.chain.name,
                    address = %address,
                    error = %e,
                    "source assembly failed"
                );
            }
        }
    }

    async fn verify_and_store(&self, contract: CheckedContract, address: Address, creator_tx: B256) {
        let outcome = match self
            .verifier
            .verify_deployed(&contract, self.chain.chain_id, address, creator_tx)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    chain = %self.chain.name,
                    address = %address,
                    error = %e,
                    "verification failed"
                );
                self.events.publish(MonitorEvent::VerifyError {
                    chain_id: self.chain.chain_id,
                    address,
                    reason: e.to_string(),
                });
                return;
            }
        };

        if let Err(e) = self.repository.store_match(&contract, &outcome).await {
            warn!(
                chain = %self.chain.name,
                address = %address,
                error = %e,
                "storing match failed"
            );
            self.events.publish(MonitorEvent::VerifyError {
                chain_id: self.chain.chain_id,
                address,
                reason: e.to_string(),
            });
            return;
        }

        info!(
            chain = %self.chain.name,
            address = %address,
            quality = ?outcome.quality,
            "contract verified and stored"
        );
        let _ = self.signals.send(ChainSignal::Verified {
            chain_id: self.chain.chain_id,
            address,
        });
    }
}
