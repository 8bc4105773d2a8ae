//! Historical chain access consumed by the block driver.
//!
//! The ledger never calls this itself; drivers use it while building the
//! relevant input/output lists they hand to [`crate::TxLedger`].

use wledger_primitives::{Hash256, Transaction};

use crate::error::LedgerError;
use crate::record::BlockMeta;

pub trait ChainFetcher: Send + Sync {
    fn fetch_tx_by_sha(&self, hash: &Hash256) -> Result<Option<Transaction>, LedgerError>;

    /// Latest copy of `hash` confirmed at or below `height`.
    fn fetch_last_tx_until_height(
        &self,
        hash: &Hash256,
        height: u64,
    ) -> Result<Option<(Transaction, BlockMeta)>, LedgerError>;

    fn fetch_block_by_height(
        &self,
        height: u64,
    ) -> Result<Option<(BlockMeta, Vec<Transaction>)>, LedgerError>;

    fn fetch_block_by_sha(
        &self,
        hash: &Hash256,
    ) -> Result<Option<(BlockMeta, Vec<Transaction>)>, LedgerError>;
}
