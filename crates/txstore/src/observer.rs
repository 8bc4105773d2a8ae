//! Injected sink for the ledger's tolerated inconsistencies and invariant checks.

use std::fmt;
use std::sync::Mutex;

use wledger_log::{log_fields, Level};
use wledger_primitives::{hash256_to_hex, Hash256, OutPoint};

use crate::script::WalletId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LedgerEvent {
    /// A block lists a transaction whose record is gone.
    MissingTxRecord { hash: Hash256, height: u64 },
    /// A debit or history row points at a credit that no longer exists.
    MissingCredit { outpoint: OutPoint, height: u64 },
    /// A history row refers to a height without a block record.
    MissingBlock { height: u64 },
    /// An unspent entry whose backing credit is gone.
    UnspentWithoutCredit { wallet: WalletId, outpoint: OutPoint },
    /// A credit that is marked spent while its unspent entry still exists.
    UnspentAlreadySpent { wallet: WalletId, outpoint: OutPoint },
    /// Spending an outpoint the wallet has no unspent entry for.
    MissingUnspent { wallet: WalletId, outpoint: OutPoint },
    /// A credit's script hash resolves to no wallet.
    UnknownOwner { outpoint: OutPoint, script_hash: Hash256 },
    /// A credit being moved back to unmined is still marked spent.
    SpentCreditRolledBack { outpoint: OutPoint, height: u64 },
    BalanceUnderflow { wallet: WalletId, balance: i64, delta: i128 },
    BalanceOverflow { wallet: WalletId, balance: i64, delta: i128 },
    BlockHashMismatch {
        height: u64,
        stored: Hash256,
        incoming: Hash256,
    },
}

impl LedgerEvent {
    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            LedgerEvent::MissingTxRecord { hash, height } => vec![
                ("tx", hash256_to_hex(hash)),
                ("height", height.to_string()),
            ],
            LedgerEvent::MissingCredit { outpoint, height }
            | LedgerEvent::SpentCreditRolledBack { outpoint, height } => vec![
                ("outpoint", outpoint_label(outpoint)),
                ("height", height.to_string()),
            ],
            LedgerEvent::MissingBlock { height } => vec![("height", height.to_string())],
            LedgerEvent::UnspentWithoutCredit { wallet, outpoint }
            | LedgerEvent::UnspentAlreadySpent { wallet, outpoint }
            | LedgerEvent::MissingUnspent { wallet, outpoint } => vec![
                ("wallet", wallet.to_string()),
                ("outpoint", outpoint_label(outpoint)),
            ],
            LedgerEvent::UnknownOwner {
                outpoint,
                script_hash,
            } => vec![
                ("outpoint", outpoint_label(outpoint)),
                ("script", hash256_to_hex(script_hash)),
            ],
            LedgerEvent::BalanceUnderflow {
                wallet,
                balance,
                delta,
            }
            | LedgerEvent::BalanceOverflow {
                wallet,
                balance,
                delta,
            } => vec![
                ("wallet", wallet.to_string()),
                ("balance", balance.to_string()),
                ("delta", delta.to_string()),
            ],
            LedgerEvent::BlockHashMismatch {
                height,
                stored,
                incoming,
            } => vec![
                ("height", height.to_string()),
                ("stored", hash256_to_hex(stored)),
                ("incoming", hash256_to_hex(incoming)),
            ],
        }
    }

    /// Level used when the event is tolerated rather than treated as corruption.
    pub fn tolerated_severity(&self) -> Severity {
        match self {
            LedgerEvent::UnspentWithoutCredit { .. } => Severity::Info,
            _ => Severity::Warn,
        }
    }
}

fn outpoint_label(outpoint: &OutPoint) -> String {
    format!("{}:{}", hash256_to_hex(&outpoint.hash), outpoint.index)
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LedgerEvent::MissingTxRecord { .. } => "transaction record missing",
            LedgerEvent::MissingCredit { .. } => "credit missing",
            LedgerEvent::MissingBlock { .. } => "block record missing",
            LedgerEvent::UnspentWithoutCredit { .. } => "unspent entry without credit",
            LedgerEvent::UnspentAlreadySpent { .. } => "unspent entry points at a spent credit",
            LedgerEvent::MissingUnspent { .. } => "spent outpoint has no unspent entry",
            LedgerEvent::UnknownOwner { .. } => "credit script has no owning wallet",
            LedgerEvent::SpentCreditRolledBack { .. } => "rolled back credit still marked spent",
            LedgerEvent::BalanceUnderflow { .. } => "mined balance would go negative",
            LedgerEvent::BalanceOverflow { .. } => "mined balance would overflow",
            LedgerEvent::BlockHashMismatch { .. } => "block hash differs from stored record",
        };
        f.write_str(text)
    }
}

pub trait LedgerObserver: Send + Sync {
    /// Expected transient inconsistency; the caller skips the record and continues.
    fn tolerated(&self, event: &LedgerEvent);

    /// Storage corruption signal. The caller decides whether to abort.
    fn invariant_violation(&self, event: &LedgerEvent);

    fn rollback_block(&self, _height: u64, _hash: &Hash256, _tx_count: usize) {}

    fn conflict_removed(&self, _hash: &Hash256) {}

    /// A mined transaction went back to the unmined pool.
    fn mined_unmined(&self, _hash: &Hash256, _height: u64) {}
}

/// Forwards every event to the process logger.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl LedgerObserver for LogObserver {
    fn tolerated(&self, event: &LedgerEvent) {
        let level = match event.tolerated_severity() {
            Severity::Info => Level::Info,
            _ => Level::Warn,
        };
        log_fields!(level, event.fields(), "{event}");
    }

    fn invariant_violation(&self, event: &LedgerEvent) {
        log_fields!(Level::Error, event.fields(), "{event}");
    }

    fn rollback_block(&self, height: u64, hash: &Hash256, tx_count: usize) {
        log_fields!(
            Level::Info,
            [
                ("height", height.to_string()),
                ("block", hash256_to_hex(hash)),
                ("txs", tx_count.to_string()),
            ],
            "rolled back block"
        );
    }

    fn conflict_removed(&self, hash: &Hash256) {
        log_fields!(
            Level::Debug,
            [("tx", hash256_to_hex(hash))],
            "removed conflicting unmined transaction"
        );
    }

    fn mined_unmined(&self, hash: &Hash256, height: u64) {
        log_fields!(
            Level::Info,
            [("tx", hash256_to_hex(hash)), ("height", height.to_string())],
            "transaction moved back to unmined"
        );
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Recorded {
    Event(Severity, LedgerEvent),
    RollbackBlock(u64),
    ConflictRemoved(Hash256),
    MinedUnmined(Hash256),
}

/// Collects everything it is told; used by tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    records: Mutex<Vec<Recorded>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: Recorded) {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(record);
        }
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn events(&self, severity: Severity) -> Vec<LedgerEvent> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Recorded::Event(level, event) if level == severity => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn conflicts_removed(&self) -> Vec<Hash256> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Recorded::ConflictRemoved(hash) => Some(hash),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.records.lock() {
            guard.clear();
        }
    }
}

impl LedgerObserver for RecordingObserver {
    fn tolerated(&self, event: &LedgerEvent) {
        self.push(Recorded::Event(event.tolerated_severity(), event.clone()));
    }

    fn invariant_violation(&self, event: &LedgerEvent) {
        self.push(Recorded::Event(Severity::Error, event.clone()));
    }

    fn rollback_block(&self, height: u64, _hash: &Hash256, _tx_count: usize) {
        self.push(Recorded::RollbackBlock(height));
    }

    fn conflict_removed(&self, hash: &Hash256) {
        self.push(Recorded::ConflictRemoved(*hash));
    }

    fn mined_unmined(&self, hash: &Hash256, _height: u64) {
        self.push(Recorded::MinedUnmined(*hash));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_observer_routes_by_severity() {
        wledger_log::set_stderr_enabled(false);
        wledger_log::enable_capture(64);
        wledger_log::clear_captured_logs();

        let observer = LogObserver;
        let wallet = WalletId::from_array([b'x'; 42]);
        observer.tolerated(&LedgerEvent::MissingBlock { height: 12 });
        observer.invariant_violation(&LedgerEvent::BalanceUnderflow {
            wallet,
            balance: 5,
            delta: -9,
        });

        let logs = wledger_log::capture_snapshot(64);
        let missing = logs
            .iter()
            .find(|log| log.msg == "block record missing")
            .expect("missing block log");
        assert_eq!(missing.level, Level::Warn);
        assert_eq!(missing.field("height"), Some("12"));
        let underflow = logs
            .iter()
            .find(|log| log.msg == "mined balance would go negative")
            .expect("underflow log");
        assert_eq!(underflow.level, Level::Error);
        assert_eq!(underflow.field("delta"), Some("-9"));
    }

    #[test]
    fn recording_observer_keeps_severity() {
        let observer = RecordingObserver::new();
        let wallet = WalletId::from_array([b'y'; 42]);
        let outpoint = OutPoint::new([1; 32], 0);
        observer.tolerated(&LedgerEvent::UnspentWithoutCredit { wallet, outpoint });
        observer.tolerated(&LedgerEvent::MissingBlock { height: 1 });
        observer.conflict_removed(&[7; 32]);
        assert_eq!(observer.events(Severity::Info).len(), 1);
        assert_eq!(observer.events(Severity::Warn).len(), 1);
        assert_eq!(observer.conflicts_removed(), vec![[7; 32]]);
    }
}
