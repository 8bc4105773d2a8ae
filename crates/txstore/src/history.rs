//! Staking and binding deposit/withdraw history.

use std::cmp::Reverse;

use wledger_primitives::{Hash256, OutPoint, Transaction};
use wledger_storage::{Column, StoreTx};

use crate::error::LedgerError;
use crate::keys::{
    decode_lg_indexes, decode_tx_value, height_key, BlockRecord, CreditValue, DebitValue,
    Incidence, LgHistoryKey, TxRecordKey, UnspentKey,
};
use crate::observer::LedgerEvent;
use crate::record::BlockLocation;
use crate::script::WalletId;
use crate::utxo::UtxoIndex;

pub use crate::keys::{LgDirection, LgKind};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LgHistoryDetail {
    pub tx_hash: Hash256,
    /// `None` for unmined rows.
    pub block_height: Option<u64>,
    pub kind: LgKind,
    pub direction: LgDirection,
    /// Output index for deposits, input index for withdrawals.
    pub index: u32,
    /// The staking/binding output this row is about.
    pub outpoint: OutPoint,
    pub amount: i64,
    pub frozen_period: u32,
    pub script_hash: Hash256,
    pub spent: bool,
    pub spent_by_unmined: bool,
}

impl UtxoIndex {
    pub fn get_staking_history_detail(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<Vec<LgHistoryDetail>, LedgerError> {
        let mut details = self.mined_history(tx, wallet, LgKind::Staking)?;
        details.sort_by_key(|detail| {
            Reverse(detail.block_height.unwrap_or(0) + u64::from(detail.frozen_period))
        });
        Ok(details)
    }

    pub fn get_binding_history_detail(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<Vec<LgHistoryDetail>, LedgerError> {
        let mut details = self.mined_history(tx, wallet, LgKind::Binding)?;
        details.sort_by_key(|detail| Reverse(detail.block_height.unwrap_or(0)));
        Ok(details)
    }

    pub fn get_unmined_staking_history_detail(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<Vec<LgHistoryDetail>, LedgerError> {
        self.unmined_history(tx, wallet, LgKind::Staking)
    }

    pub fn get_unmined_binding_history_detail(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<Vec<LgHistoryDetail>, LedgerError> {
        self.unmined_history(tx, wallet, LgKind::Binding)
    }

    fn mined_history(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
        kind: LgKind,
    ) -> Result<Vec<LgHistoryDetail>, LedgerError> {
        let mut details = Vec::new();
        for (key, value) in tx.scan_prefix(Column::LgHistory, &LgHistoryKey::prefix(wallet, kind))? {
            let key = LgHistoryKey::decode(&key)?;
            let Some(height) = key.height else {
                continue;
            };
            let Some(raw_block) = tx.get(Column::Block, &height_key(height))? else {
                self.observer()
                    .tolerated(&LedgerEvent::MissingBlock { height });
                continue;
            };
            let block = BlockRecord::decode(&raw_block)?.location(height);
            for index in decode_lg_indexes(&value)? {
                let detail = match key.direction {
                    LgDirection::Deposit => self.mined_deposit(tx, &key, block, index)?,
                    LgDirection::Withdraw => self.mined_withdraw(tx, &key, block, index)?,
                };
                if let Some(detail) = detail {
                    details.push(detail);
                }
            }
        }
        Ok(details)
    }

    fn mined_deposit(
        &self,
        tx: &StoreTx<'_>,
        key: &LgHistoryKey,
        block: BlockLocation,
        index: u32,
    ) -> Result<Option<LgHistoryDetail>, LedgerError> {
        let outpoint = OutPoint::new(key.tx_hash, index);
        let Some(credit) = self.credit(tx, &Incidence::new(key.tx_hash, block, index))? else {
            self.observer().tolerated(&LedgerEvent::MissingCredit {
                outpoint,
                height: block.height,
            });
            return Ok(None);
        };
        let spent_by_unmined = !credit.flags.spent && self.is_spent_by_unmined(tx, &outpoint)?;
        Ok(Some(detail(key, Some(block.height), index, outpoint, &credit, spent_by_unmined)))
    }

    fn mined_withdraw(
        &self,
        tx: &StoreTx<'_>,
        key: &LgHistoryKey,
        block: BlockLocation,
        index: u32,
    ) -> Result<Option<LgHistoryDetail>, LedgerError> {
        let debit_key = Incidence::new(key.tx_hash, block, index);
        let Some(raw) = tx.get(Column::Debit, &debit_key.encode())? else {
            self.observer().tolerated(&LedgerEvent::MissingCredit {
                outpoint: debit_key.outpoint(),
                height: block.height,
            });
            return Ok(None);
        };
        let debit = DebitValue::decode(&raw)?;
        let outpoint = debit.credit.outpoint();
        let Some(credit) = self.credit(tx, &debit.credit)? else {
            self.observer().tolerated(&LedgerEvent::MissingCredit {
                outpoint,
                height: debit.credit.block.height,
            });
            return Ok(None);
        };
        Ok(Some(detail(key, Some(block.height), index, outpoint, &credit, false)))
    }

    fn unmined_history(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
        kind: LgKind,
    ) -> Result<Vec<LgHistoryDetail>, LedgerError> {
        let mut details = Vec::new();
        let prefix = LgHistoryKey::prefix(wallet, kind);
        for (key, value) in tx.scan_prefix(Column::UnminedLgHistory, &prefix)? {
            let key = LgHistoryKey::decode(&key)?;
            for index in decode_lg_indexes(&value)? {
                let detail = match key.direction {
                    LgDirection::Deposit => self.unmined_deposit(tx, &key, index)?,
                    LgDirection::Withdraw => self.unmined_withdraw(tx, &key, index)?,
                };
                if let Some(detail) = detail {
                    details.push(detail);
                }
            }
        }
        Ok(details)
    }

    fn unmined_deposit(
        &self,
        tx: &StoreTx<'_>,
        key: &LgHistoryKey,
        index: u32,
    ) -> Result<Option<LgHistoryDetail>, LedgerError> {
        let outpoint = OutPoint::new(key.tx_hash, index);
        let Some(credit) = self.unmined_credit(tx, &outpoint)? else {
            self.observer()
                .tolerated(&LedgerEvent::MissingCredit { outpoint, height: 0 });
            return Ok(None);
        };
        let spent_by_unmined = self.is_spent_by_unmined(tx, &outpoint)?;
        Ok(Some(detail(key, None, index, outpoint, &credit, spent_by_unmined)))
    }

    /// The withdrawn output is either still a mined unspent credit or, for a
    /// chain of mempool transactions, an unmined credit.
    fn unmined_withdraw(
        &self,
        tx: &StoreTx<'_>,
        key: &LgHistoryKey,
        index: u32,
    ) -> Result<Option<LgHistoryDetail>, LedgerError> {
        let Some(raw) = tx.get(Column::UnminedTx, &key.tx_hash)? else {
            self.observer().tolerated(&LedgerEvent::MissingTxRecord {
                hash: key.tx_hash,
                height: 0,
            });
            return Ok(None);
        };
        let (_, raw_tx) = decode_tx_value(&raw)?;
        let spending = Transaction::consensus_decode(raw_tx)?;
        let Some(input) = spending.vin.get(index as usize) else {
            return Err(LedgerError::RelevantIndex {
                tx: key.tx_hash,
                index,
            });
        };
        let outpoint = input.prevout;

        let unspent = UnspentKey::new(key.wallet, outpoint).encode();
        let credit = match tx.get(Column::Unspent, &unspent)? {
            Some(location) => {
                let block = BlockLocation::decode(&location)?;
                self.credit(tx, &Incidence::new(outpoint.hash, block, outpoint.index))?
            }
            None => self.unmined_credit(tx, &outpoint)?,
        };
        let Some(credit) = credit else {
            self.observer()
                .tolerated(&LedgerEvent::MissingCredit { outpoint, height: 0 });
            return Ok(None);
        };
        Ok(Some(detail(key, None, index, outpoint, &credit, true)))
    }
}

fn detail(
    key: &LgHistoryKey,
    block_height: Option<u64>,
    index: u32,
    outpoint: OutPoint,
    credit: &CreditValue,
    spent_by_unmined: bool,
) -> LgHistoryDetail {
    LgHistoryDetail {
        tx_hash: key.tx_hash,
        block_height,
        kind: key.kind,
        direction: key.direction,
        index,
        outpoint,
        amount: credit.amount,
        frozen_period: credit.maturity,
        script_hash: credit.script_hash,
        spent: credit.flags.spent,
        spent_by_unmined,
    }
}
