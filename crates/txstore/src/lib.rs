//! Wallet-side transaction and UTXO ledger.
//!
//! Tracks, per logical wallet, spendable outputs, running mined balances and
//! the staking/binding deposit history, and keeps all of it reorg-safe.

pub mod chain;
pub mod error;
pub mod history;
pub mod keys;
pub mod ledger;
pub mod observer;
pub mod params;
pub mod record;
mod remove;
mod rollback;
pub mod script;
pub mod sync;
pub mod utxo;

pub use chain::ChainFetcher;
pub use error::{LedgerError, SyncError};
pub use history::{LgDirection, LgHistoryDetail, LgKind};
pub use keys::{BlockRecord, Incidence};
pub use ledger::{TxDetails, TxLedger, UtxoStatus};
pub use observer::{
    LedgerEvent, LedgerObserver, LogObserver, Recorded, RecordingObserver, Severity,
};
pub use params::{ledger_params, LedgerParams, Network};
pub use record::{BalanceDeltas, BlockLocation, BlockMeta, TxRecord};
pub use script::{
    AddressClass, AddressManager, ClassifiedScript, OutputClass, OwnerMap, PkScript, RelevantMeta,
    ScriptOwners, WalletId, WalletScripts,
};
pub use sync::WALLET_SYNCED;
pub use utxo::{Credit, ScriptBalance, UnspentScanner, UtxoIndex};
