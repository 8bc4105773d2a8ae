use std::fmt;

use wledger_primitives::encoding::DecodeError;
use wledger_primitives::transaction::TransactionDecodeError;
use wledger_primitives::{hash256_to_hex, Hash256, OutPoint};
use wledger_storage::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The proposed height does not advance past the current cursor.
    TooSmall { current: u64, proposed: u64 },
    /// The proposed height skips at least one block.
    TooGreater { current: u64, proposed: u64 },
    /// A marker already exists directly above the proposed height.
    AlreadyRecorded { height: u64 },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::TooSmall { current, proposed } => write!(
                f,
                "syncedTo is smaller than last synced block (last {current}, new {proposed})"
            ),
            SyncError::TooGreater { current, proposed } => write!(
                f,
                "syncedTo is too greater than last synced block (last {current}, new {proposed})"
            ),
            SyncError::AlreadyRecorded { height } => {
                write!(f, "block already recorded at height {height}")
            }
        }
    }
}

impl std::error::Error for SyncError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    Store(StoreError),
    Decode(DecodeError),
    Transaction(TransactionDecodeError),
    NotFound(&'static str),
    ChainReorg {
        height: u64,
        stored: Hash256,
        incoming: Hash256,
    },
    CoinbaseUnmined(Hash256),
    DuplicateCredit(OutPoint),
    MissingUnspent(OutPoint),
    AlreadyMined(Hash256),
    RelevantIndex { tx: Hash256, index: u32 },
    Corrupt(String),
    Sync(SyncError),
    InvalidWalletId,
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Store(err) => write!(f, "{err}"),
            LedgerError::Decode(err) => write!(f, "{err}"),
            LedgerError::Transaction(err) => write!(f, "{err}"),
            LedgerError::NotFound(what) => write!(f, "{what} not found"),
            LedgerError::ChainReorg {
                height,
                stored,
                incoming,
            } => write!(
                f,
                "chain reorg at height {height}: stored block {} differs from {}",
                hash256_to_hex(stored),
                hash256_to_hex(incoming)
            ),
            LedgerError::CoinbaseUnmined(hash) => write!(
                f,
                "coinbase transaction {} cannot be inserted as unmined",
                hash256_to_hex(hash)
            ),
            LedgerError::DuplicateCredit(outpoint) => write!(
                f,
                "duplicate credit for {}:{}",
                hash256_to_hex(&outpoint.hash),
                outpoint.index
            ),
            LedgerError::MissingUnspent(outpoint) => write!(
                f,
                "input spends {}:{} which has no unspent entry",
                hash256_to_hex(&outpoint.hash),
                outpoint.index
            ),
            LedgerError::AlreadyMined(hash) => write!(
                f,
                "transaction {} is already mined",
                hash256_to_hex(hash)
            ),
            LedgerError::RelevantIndex { tx, index } => write!(
                f,
                "relevant index {index} out of range for transaction {}",
                hash256_to_hex(tx)
            ),
            LedgerError::Corrupt(message) => write!(f, "ledger corruption: {message}"),
            LedgerError::Sync(err) => write!(f, "{err}"),
            LedgerError::InvalidWalletId => write!(f, "invalid wallet id"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::Store(err)
    }
}

impl From<DecodeError> for LedgerError {
    fn from(err: DecodeError) -> Self {
        LedgerError::Decode(err)
    }
}

impl From<TransactionDecodeError> for LedgerError {
    fn from(err: TransactionDecodeError) -> Self {
        LedgerError::Transaction(err)
    }
}

impl From<SyncError> for LedgerError {
    fn from(err: SyncError) -> Self {
        LedgerError::Sync(err)
    }
}
