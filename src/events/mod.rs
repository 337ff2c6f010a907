//! Telemetry events and upward lifecycle signals.
//!
//! `MonitorEvent` is the fire-and-forget telemetry stream every monitor
//! publishes; `ChainSignal` is the narrow pair of lifecycle signals the
//! supervisor re-emits to its own subscribers.

use alloy::primitives::{Address, B256};
use tokio::sync::broadcast;

/// Telemetry emitted by the chain monitors. Consumers subscribe through
/// the [`EventBus`]; publishing never blocks and never fails.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A monitor found a working RPC endpoint and scheduled its first block.
    Started {
        chain_id: u64,
        chain_name: String,
        provider_url: String,
        start_block: u64,
    },
    /// A monitor was told to stop; pending timers become no-ops.
    Stopped { chain_id: u64 },
    /// Every RPC endpoint failed its startup probe.
    CantStart { chain_id: u64 },
    /// A block arrived and its transactions are being scanned.
    ProcessingBlock {
        chain_id: u64,
        block_number: u64,
        pause_ms: u64,
    },
    /// A contract-creating transaction was detected and queued for
    /// bytecode retrieval.
    NewContract {
        chain_id: u64,
        address: Address,
        creator_tx: B256,
    },
    /// The repository already holds a match for this address.
    AlreadyVerified { chain_id: u64, address: Address },
    /// The block fetch failed; the same block will be retried.
    ProcessingBlockError {
        chain_id: u64,
        block_number: u64,
        reason: String,
    },
    /// Bytecode was retrieved but its metadata trailer did not decode.
    ProcessingBytecodeError {
        chain_id: u64,
        address: Address,
        reason: String,
    },
    /// The bytecode fetch itself failed; the task will retry while its
    /// budget lasts.
    GettingBytecodeError {
        chain_id: u64,
        address: Address,
        reason: String,
    },
    /// Verification or persistence failed; the task is dropped.
    VerifyError {
        chain_id: u64,
        address: Address,
        reason: String,
    },
}

impl std::fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started {
                chain_id,
                provider_url,
                start_block,
                ..
            } => write!(
                f,
                "Started(chain={chain_id}, url={provider_url}, from={start_block})"
            ),
            Self::Stopped { chain_id } => write!(f, "Stopped(chain={chain_id})"),
            Self::CantStart { chain_id } => write!(f, "CantStart(chain={chain_id})"),
            Self::ProcessingBlock {
                chain_id,
                block_number,
                pause_ms,
            } => write!(
                f,
                "ProcessingBlock(chain={chain_id}, block={block_number}, pause={pause_ms}ms)"
            ),
            Self::NewContract {
                chain_id, address, ..
            } => write!(f, "NewContract(chain={chain_id}, addr={address})"),
            Self::AlreadyVerified { chain_id, address } => {
                write!(f, "AlreadyVerified(chain={chain_id}, addr={address})")
            }
            Self::ProcessingBlockError {
                chain_id,
                block_number,
                reason,
            } => write!(
                f,
                "ProcessingBlockError(chain={chain_id}, block={block_number}: {reason})"
            ),
            Self::ProcessingBytecodeError {
                chain_id,
                address,
                reason,
            } => write!(
                f,
                "ProcessingBytecodeError(chain={chain_id}, addr={address}: {reason})"
            ),
            Self::GettingBytecodeError {
                chain_id,
                address,
                reason,
            } => write!(
                f,
                "GettingBytecodeError(chain={chain_id}, addr={address}: {reason})"
            ),
            Self::VerifyError {
                chain_id,
                address,
                reason,
            } => write!(f, "VerifyError(chain={chain_id}, addr={address}: {reason})"),
        }
    }
}

/// Lifecycle signals a monitor raises per contract address. The supervisor
/// forwards these unchanged to its subscribers.
#[derive(Debug, Clone)]
pub enum ChainSignal {
    /// The contract was verified and its match stored.
    Verified { chain_id: u64, address: Address },
    /// The repository already held a match for the address.
    AlreadyVerified { chain_id: u64, address: Address },
}

impl std::fmt::Display for ChainSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verified { chain_id, address } => {
                write!(f, "contract-verified-successfully(chain={chain_id}, addr={address})")
            }
            Self::AlreadyVerified { chain_id, address } => {
                write!(f, "contract-already-verified(chain={chain_id}, addr={address})")
            }
        }
    }
}

/// Process-wide telemetry fan-out. Cloning shares the underlying channel.
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget publish. A bus with no subscribers drops the event.
    pub fn publish(&self, event: MonitorEvent) {
        let _ = self.sender.send(event);
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(MonitorEvent::Stopped { chain_id: 5 });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            MonitorEvent::Stopped { chain_id: 5 }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            MonitorEvent::Stopped { chain_id: 5 }
        ));
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(8);
        bus.publish(MonitorEvent::CantStart { chain_id: 1 });
    }

    #[test]
    fn signal_display_names_match_the_wire_names() {
        let signal = ChainSignal::Verified {
            chain_id: 1,
            address: Address::ZERO,
        };
        assert!(signal
            .to_string()
            .starts_with("contract-verified-successfully"));
    }
}
