//! Transaction records, block records and the mined/unmined transitions.

use std::sync::Arc;

use wledger_primitives::{Hash256, OutPoint, Transaction};
use wledger_storage::{Column, StoreTx};

use crate::error::LedgerError;
use crate::keys::{
    decode_height, decode_spenders, decode_tx_value, encode_spenders, encode_tx_value, height_key,
    outpoint_key, BlockRecord, Incidence, TxRecordKey, UnspentKey,
};
use crate::observer::{LedgerEvent, LedgerObserver, LogObserver};
use crate::params::LedgerParams;
use crate::record::{BalanceDeltas, BlockLocation, BlockMeta, TxRecord};
use crate::script::{OutputClass, ScriptOwners, WalletId};
use crate::sync;
use crate::utxo::UtxoIndex;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UtxoStatus {
    pub spent: bool,
    pub spent_by_unmined: bool,
    pub is_unmined: bool,
    pub class: OutputClass,
}

/// A stored transaction and, when mined, the block holding it.
#[derive(Clone, Debug)]
pub struct TxDetails {
    pub record: TxRecord,
    pub block: Option<BlockLocation>,
}

pub struct TxLedger {
    utxo: UtxoIndex,
    owners: Arc<dyn ScriptOwners>,
    observer: Arc<dyn LedgerObserver>,
}

impl TxLedger {
    pub fn new(
        params: LedgerParams,
        owners: Arc<dyn ScriptOwners>,
        observer: Arc<dyn LedgerObserver>,
    ) -> Self {
        Self {
            utxo: UtxoIndex::new(params, Arc::clone(&observer)),
            owners,
            observer,
        }
    }

    pub fn with_log_observer(params: LedgerParams, owners: Arc<dyn ScriptOwners>) -> Self {
        Self::new(params, owners, Arc::new(LogObserver))
    }

    pub fn utxo(&self) -> &UtxoIndex {
        &self.utxo
    }

    pub fn params(&self) -> &LedgerParams {
        self.utxo.params()
    }

    pub(crate) fn owners(&self) -> &dyn ScriptOwners {
        self.owners.as_ref()
    }

    pub(crate) fn observer(&self) -> &dyn LedgerObserver {
        self.observer.as_ref()
    }

    /// Stores `rec` as mined in `block`, or as unmined when `block` is `None`.
    /// Returns `false` when the record was already present.
    pub fn insert_tx(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        rec: &TxRecord,
        block: Option<&BlockMeta>,
    ) -> Result<bool, LedgerError> {
        match block {
            Some(block) => self.insert_mined_tx(tx, deltas, rec, block),
            None => self.insert_mem_pool_tx(tx, rec),
        }
    }

    /// Inserts `rec` and, if it was new, credits its relevant outputs.
    pub fn add_relevant_tx(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        rec: &TxRecord,
        block: Option<&BlockMeta>,
    ) -> Result<bool, LedgerError> {
        if !self.insert_tx(tx, deltas, rec, block)? {
            return Ok(false);
        }
        self.utxo.add_credits(tx, deltas, rec, block)?;
        Ok(true)
    }

    /// Bulk-import counterpart of [`Self::add_relevant_tx`] for mined history.
    pub fn add_relevant_tx_for_importing(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        rec: &TxRecord,
        block: &BlockMeta,
    ) -> Result<bool, LedgerError> {
        if !self.insert_mined_tx_for_importing(tx, deltas, rec, block)? {
            return Ok(false);
        }
        self.utxo.add_credits(tx, deltas, rec, Some(block))?;
        Ok(true)
    }

    pub fn insert_mem_pool_tx(
        &self,
        tx: &mut StoreTx<'_>,
        rec: &TxRecord,
    ) -> Result<bool, LedgerError> {
        if rec.is_coinbase() {
            return Err(LedgerError::CoinbaseUnmined(rec.hash));
        }
        if tx.exists(Column::UnminedTx, &rec.hash)? || self.exists_tx(tx, &rec.hash)? {
            return Ok(false);
        }
        tx.put(
            Column::UnminedTx,
            &rec.hash,
            &encode_tx_value(rec.received, &rec.serialized),
        )?;
        link_unmined_inputs(tx, &rec.hash, &rec.tx)?;
        self.utxo.record_unmined_withdrawals(tx, rec)?;
        Ok(true)
    }

    pub fn insert_mined_tx(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        rec: &TxRecord,
        block: &BlockMeta,
    ) -> Result<bool, LedgerError> {
        let key = TxRecordKey::new(rec.hash, block.location()).encode();
        if tx.exists(Column::MinedTx, &key)? {
            return Ok(false);
        }

        let mut record = match self.block_record(tx, block.height)? {
            Some(record) if record.hash != block.hash => {
                self.observer
                    .invariant_violation(&LedgerEvent::BlockHashMismatch {
                        height: block.height,
                        stored: record.hash,
                        incoming: block.hash,
                    });
                return Err(LedgerError::Corrupt(format!(
                    "block record at height {} belongs to another block",
                    block.height
                )));
            }
            Some(record) => record,
            None => BlockRecord::new(block.hash, block.timestamp),
        };
        record.tx_hashes.push(rec.hash);
        tx.put(Column::Block, &height_key(block.height), &record.encode())?;
        tx.put(
            Column::MinedTx,
            &key,
            &encode_tx_value(rec.received, &rec.serialized),
        )?;

        self.utxo.spend_credits(tx, deltas, rec, block)?;

        if tx.exists(Column::UnminedTx, &rec.hash)? {
            self.drop_unmined_copy(tx, rec)?;
        }
        self.remove_double_spends(tx, rec)?;
        Ok(true)
    }

    /// Like [`Self::insert_mined_tx`] but refuses a different block at an
    /// already recorded height and never duplicates block entries. No unmined
    /// pool exists during import, so no conflict cleanup runs.
    pub fn insert_mined_tx_for_importing(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        rec: &TxRecord,
        block: &BlockMeta,
    ) -> Result<bool, LedgerError> {
        let mut record = match self.block_record(tx, block.height)? {
            Some(record) if record.hash != block.hash => {
                return Err(LedgerError::ChainReorg {
                    height: block.height,
                    stored: record.hash,
                    incoming: block.hash,
                });
            }
            Some(record) => record,
            None => BlockRecord::new(block.hash, block.timestamp),
        };

        let key = TxRecordKey::new(rec.hash, block.location()).encode();
        if tx.exists(Column::MinedTx, &key)? {
            return Ok(false);
        }
        if !record.tx_hashes.contains(&rec.hash) {
            record.tx_hashes.push(rec.hash);
            tx.put(Column::Block, &height_key(block.height), &record.encode())?;
        }
        tx.put(
            Column::MinedTx,
            &key,
            &encode_tx_value(rec.received, &rec.serialized),
        )?;
        self.utxo.spend_credits(tx, deltas, rec, block)?;
        if tx.exists(Column::UnminedTx, &rec.hash)? {
            self.drop_unmined_copy(tx, rec)?;
        }
        Ok(true)
    }

    /// Removes the mempool copy of a transaction that just got mined.
    fn drop_unmined_copy(&self, tx: &mut StoreTx<'_>, rec: &TxRecord) -> Result<(), LedgerError> {
        tx.delete(Column::UnminedTx, &rec.hash)?;
        unlink_unmined_inputs(tx, &rec.hash, &rec.tx)?;
        self.utxo.remove_unmined_credits(tx, &rec.hash)?;
        self.utxo.delete_unmined_lg_rows(tx, &rec.hash)?;
        Ok(())
    }

    /// Removes every unmined transaction that spends an input of the newly
    /// mined `rec`, together with all of its unmined descendants.
    fn remove_double_spends(&self, tx: &mut StoreTx<'_>, rec: &TxRecord) -> Result<(), LedgerError> {
        if rec.is_coinbase() {
            return Ok(());
        }
        for input in &rec.tx.vin {
            let key = outpoint_key(&input.prevout);
            let Some(raw) = tx.get(Column::UnminedInput, &key)? else {
                continue;
            };
            for spender in decode_spenders(&raw)? {
                if spender != rec.hash {
                    self.remove_conflict(tx, &spender)?;
                }
            }
        }
        Ok(())
    }

    /// Deletes an unmined transaction and, transitively, every unmined
    /// transaction spending its outputs. Uses an explicit work stack.
    pub(crate) fn remove_conflict(
        &self,
        tx: &mut StoreTx<'_>,
        root: &Hash256,
    ) -> Result<(), LedgerError> {
        let mut pending = vec![*root];
        while let Some(hash) = pending.pop() {
            let Some(raw) = tx.get(Column::UnminedTx, &hash)? else {
                continue;
            };
            let (_, raw_tx) = decode_tx_value(&raw)?;
            let conflict = Transaction::consensus_decode(raw_tx)?;

            for index in 0..conflict.vout.len() as u32 {
                let key = outpoint_key(&OutPoint::new(hash, index));
                if let Some(spenders) = tx.get(Column::UnminedInput, &key)? {
                    pending.extend(decode_spenders(&spenders)?);
                }
            }
            unlink_unmined_inputs(tx, &hash, &conflict)?;
            self.utxo.remove_unmined_credits(tx, &hash)?;
            self.utxo.delete_unmined_lg_rows(tx, &hash)?;
            tx.delete(Column::UnminedTx, &hash)?;
            self.observer.conflict_removed(&hash);
        }
        Ok(())
    }

    /// Applies one block: every relevant transaction, the resulting balance
    /// deltas, then the sync cursor.
    pub fn connect_block(
        &self,
        tx: &mut StoreTx<'_>,
        block: &BlockMeta,
        records: &[TxRecord],
    ) -> Result<BalanceDeltas, LedgerError> {
        let mut deltas = BalanceDeltas::new();
        for rec in records {
            self.add_relevant_tx(tx, &mut deltas, rec, Some(block))?;
        }
        self.utxo.update_mined_balances(tx, &deltas)?;
        sync::set_synced_to(tx, block)?;
        Ok(deltas)
    }

    pub fn update_mined_balances(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &BalanceDeltas,
    ) -> Result<(), LedgerError> {
        self.utxo.update_mined_balances(tx, deltas)
    }

    pub fn exist_unmined_tx(&self, tx: &StoreTx<'_>, hash: &Hash256) -> Result<bool, LedgerError> {
        Ok(tx.exists(Column::UnminedTx, hash)?)
    }

    pub fn exists_tx(&self, tx: &StoreTx<'_>, hash: &Hash256) -> Result<bool, LedgerError> {
        Ok(!tx.scan_prefix(Column::MinedTx, hash)?.is_empty())
    }

    /// Reports the state of `outpoint` for `wallet`, checking the unspent
    /// index, then spent mined credits, then unmined credits.
    pub fn exists_utxo(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
        outpoint: &OutPoint,
    ) -> Result<UtxoStatus, LedgerError> {
        let spent_by_unmined = self.utxo.is_spent_by_unmined(tx, outpoint)?;

        if let Some(raw) = tx.get(Column::Unspent, &UnspentKey::new(*wallet, *outpoint).encode())? {
            let block = BlockLocation::decode(&raw)?;
            let key = Incidence::new(outpoint.hash, block, outpoint.index);
            let Some(credit) = self.utxo.credit(tx, &key)? else {
                self.observer
                    .invariant_violation(&LedgerEvent::UnspentWithoutCredit {
                        wallet: *wallet,
                        outpoint: *outpoint,
                    });
                return Err(LedgerError::Corrupt(
                    "unspent entry without a backing credit".to_string(),
                ));
            };
            return Ok(UtxoStatus {
                spent: false,
                spent_by_unmined,
                is_unmined: false,
                class: credit.flags.class,
            });
        }

        for (_, credit) in self.utxo.mined_credits_for(tx, outpoint)? {
            if credit.flags.spent && self.owners.wallet_of(&credit.script_hash) == Some(*wallet) {
                return Ok(UtxoStatus {
                    spent: true,
                    spent_by_unmined: false,
                    is_unmined: false,
                    class: credit.flags.class,
                });
            }
        }

        if let Some(credit) = self.utxo.unmined_credit(tx, outpoint)? {
            if self.owners.wallet_of(&credit.script_hash) == Some(*wallet) {
                return Ok(UtxoStatus {
                    spent: false,
                    spent_by_unmined,
                    is_unmined: true,
                    class: credit.flags.class,
                });
            }
        }

        Err(LedgerError::NotFound("utxo"))
    }

    pub fn block_record(
        &self,
        tx: &StoreTx<'_>,
        height: u64,
    ) -> Result<Option<BlockRecord>, LedgerError> {
        match tx.get(Column::Block, &height_key(height))? {
            Some(raw) => Ok(Some(BlockRecord::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Highest height with a block record.
    pub fn top_block_height(&self, tx: &StoreTx<'_>) -> Result<Option<u64>, LedgerError> {
        match tx.scan_prefix(Column::Block, &[])?.last() {
            Some((key, _)) => Ok(Some(decode_height(key)?)),
            None => Ok(None),
        }
    }

    pub fn unmined_txs(&self, tx: &StoreTx<'_>) -> Result<Vec<TxRecord>, LedgerError> {
        let mut records = Vec::new();
        for (_, value) in tx.scan_prefix(Column::UnminedTx, &[])? {
            let (received, raw) = decode_tx_value(&value)?;
            records.push(TxRecord::from_raw(raw, received)?);
        }
        Ok(records)
    }

    /// The stored copy of `hash`, preferring the highest mined block.
    pub fn tx_details(
        &self,
        tx: &StoreTx<'_>,
        hash: &Hash256,
    ) -> Result<Option<TxDetails>, LedgerError> {
        if let Some((key, value)) = tx.scan_prefix(Column::MinedTx, hash)?.pop() {
            let key = TxRecordKey::decode(&key)?;
            let (received, raw) = decode_tx_value(&value)?;
            return Ok(Some(TxDetails {
                record: TxRecord::from_raw(raw, received)?,
                block: Some(key.block),
            }));
        }
        match tx.get(Column::UnminedTx, hash)? {
            Some(value) => {
                let (received, raw) = decode_tx_value(&value)?;
                Ok(Some(TxDetails {
                    record: TxRecord::from_raw(raw, received)?,
                    block: None,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn mined_balance(&self, tx: &StoreTx<'_>, wallet: &WalletId) -> Result<i64, LedgerError> {
        self.utxo.mined_balance(tx, wallet)
    }
}

/// Appends `hash` to the spender list of every outpoint `spending` consumes.
pub(crate) fn link_unmined_inputs(
    tx: &mut StoreTx<'_>,
    hash: &Hash256,
    spending: &Transaction,
) -> Result<(), LedgerError> {
    if spending.is_coinbase() {
        return Ok(());
    }
    for input in &spending.vin {
        let key = outpoint_key(&input.prevout);
        let mut spenders = match tx.get(Column::UnminedInput, &key)? {
            Some(raw) => decode_spenders(&raw)?,
            None => Vec::new(),
        };
        if !spenders.contains(hash) {
            spenders.push(*hash);
            tx.put(Column::UnminedInput, &key, &encode_spenders(&spenders))?;
        }
    }
    Ok(())
}

/// Removes `hash` from the spender lists of its inputs, deleting emptied lists.
pub(crate) fn unlink_unmined_inputs(
    tx: &mut StoreTx<'_>,
    hash: &Hash256,
    spending: &Transaction,
) -> Result<(), LedgerError> {
    for input in &spending.vin {
        let key = outpoint_key(&input.prevout);
        let Some(raw) = tx.get(Column::UnminedInput, &key)? else {
            continue;
        };
        let mut spenders = decode_spenders(&raw)?;
        spenders.retain(|spender| spender != hash);
        if spenders.is_empty() {
            tx.delete(Column::UnminedInput, &key)?;
        } else {
            tx.put(Column::UnminedInput, &key, &encode_spenders(&spenders))?;
        }
    }
    Ok(())
}
