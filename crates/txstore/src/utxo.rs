//! Credits, debits, the per-wallet unspent index and mined balances.
//!
//! Writers run inside the caller's [`StoreTx`] and are serialized by it. The
//! two long unspent-index scans are only reachable through an
//! [`UnspentScanner`], which holds the index's scan lock for its lifetime.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use wledger_primitives::{Hash256, OutPoint};
use wledger_storage::{Column, StoreTx};

use crate::error::LedgerError;
use crate::keys::{
    decode_amount, decode_height, decode_lg_indexes, encode_amount, encode_lg_indexes,
    height_key, index_key, index_target, outpoint_key, AddressKey, CreditFlags, CreditValue,
    DebitValue, Incidence, LgDirection, LgHistoryKey, LgIndexes, LgKind, UnspentKey, HASH_LEN,
};
use crate::observer::{LedgerEvent, LedgerObserver};
use crate::params::LedgerParams;
use crate::record::{BalanceDeltas, BlockLocation, BlockMeta, TxRecord};
use crate::script::{OutputClass, RelevantMeta, WalletId};

/// A mined, unspent output as seen by balance and coin-selection queries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credit {
    pub outpoint: OutPoint,
    pub block: BlockLocation,
    pub amount: i64,
    pub maturity: u32,
    pub script_hash: Hash256,
    pub class: OutputClass,
    pub is_change: bool,
    pub spent_by_unmined: bool,
}

impl Credit {
    pub fn confirmations(&self, sync_height: u64) -> u64 {
        if self.block.height > sync_height {
            0
        } else {
            sync_height - self.block.height + 1
        }
    }

    pub fn is_mature(&self, sync_height: u64) -> bool {
        self.confirmations(sync_height) >= u64::from(self.maturity)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScriptBalance {
    pub total: i64,
    pub spendable: i64,
    pub withdrawable_staking: i64,
    pub withdrawable_binding: i64,
}

pub struct UtxoIndex {
    params: LedgerParams,
    observer: Arc<dyn LedgerObserver>,
    scan_lock: Mutex<()>,
}

impl UtxoIndex {
    pub fn new(params: LedgerParams, observer: Arc<dyn LedgerObserver>) -> Self {
        Self {
            params,
            observer,
            scan_lock: Mutex::new(()),
        }
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    pub(crate) fn observer(&self) -> &dyn LedgerObserver {
        self.observer.as_ref()
    }

    /// Records the relevant outputs of `rec`.
    ///
    /// Mined outputs become credits with an unspent entry and raise the owning
    /// wallet's balance delta. Unmined outputs become unmined credits and leave
    /// balances alone.
    pub fn add_credits(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        rec: &TxRecord,
        block: Option<&BlockMeta>,
    ) -> Result<(), LedgerError> {
        match block {
            Some(block) => self.add_mined_credits(tx, deltas, rec, block),
            None => self.add_unmined_credits(tx, rec),
        }
    }

    fn add_mined_credits(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        rec: &TxRecord,
        block: &BlockMeta,
    ) -> Result<(), LedgerError> {
        let location = block.location();
        let coinbase = rec.is_coinbase();
        for meta in &rec.relevant_outputs {
            let output = rec.output(meta.index)?;
            let outpoint = OutPoint::new(rec.hash, meta.index);
            let key = Incidence::new(rec.hash, location, meta.index);
            let key_bytes = key.encode();
            if tx.exists(Column::Credit, &key_bytes)? {
                return Err(LedgerError::DuplicateCredit(outpoint));
            }

            let maturity = if coinbase {
                self.params.coinbase_maturity
            } else {
                meta.pk_script.maturity()
            };
            let class = meta.pk_script.output_class();
            self.record_address_use(tx, meta, block.height)?;

            let value = CreditValue {
                amount: output.value,
                flags: CreditFlags {
                    spent: false,
                    change: meta.is_change,
                    class,
                },
                maturity,
                script_hash: meta.pk_script.std_script_address(),
                spender: None,
            };
            tx.put(Column::Credit, &key_bytes, &value.encode())?;
            tx.put(
                Column::Unspent,
                &UnspentKey::new(meta.wallet_id, outpoint).encode(),
                &location.encode(),
            )?;
            deltas.add(meta.wallet_id, output.value);

            if let Some(kind) = LgKind::from_class(class) {
                let lg = LgHistoryKey {
                    wallet: meta.wallet_id,
                    kind,
                    direction: LgDirection::Deposit,
                    tx_hash: rec.hash,
                    height: Some(block.height),
                };
                append_lg_index(tx, &lg, meta.index)?;
            }
        }
        Ok(())
    }

    fn add_unmined_credits(&self, tx: &mut StoreTx<'_>, rec: &TxRecord) -> Result<(), LedgerError> {
        for meta in &rec.relevant_outputs {
            let output = rec.output(meta.index)?;
            let outpoint = OutPoint::new(rec.hash, meta.index);
            let key = outpoint_key(&outpoint);
            if tx.exists(Column::UnminedCredit, &key)? {
                return Err(LedgerError::DuplicateCredit(outpoint));
            }
            // the block confirming it was applied while the mempool copy was in flight
            if self.has_mined_credit(tx, &outpoint)? {
                return Err(LedgerError::AlreadyMined(rec.hash));
            }

            let class = meta.pk_script.output_class();
            let value = CreditValue {
                amount: output.value,
                flags: CreditFlags {
                    spent: false,
                    change: meta.is_change,
                    class,
                },
                maturity: meta.pk_script.maturity(),
                script_hash: meta.pk_script.std_script_address(),
                spender: None,
            };
            tx.put(Column::UnminedCredit, &key, &value.encode())?;

            if let Some(kind) = LgKind::from_class(class) {
                let lg = LgHistoryKey {
                    wallet: meta.wallet_id,
                    kind,
                    direction: LgDirection::Deposit,
                    tx_hash: rec.hash,
                    height: None,
                };
                append_lg_index(tx, &lg, meta.index)?;
            }
        }
        Ok(())
    }

    /// Marks the credits consumed by the relevant inputs of a mined `rec` as
    /// spent, writing one debit per input and lowering the balance delta.
    pub fn spend_credits(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        rec: &TxRecord,
        block: &BlockMeta,
    ) -> Result<(), LedgerError> {
        let location = block.location();
        for meta in &rec.relevant_inputs {
            let input = rec
                .tx
                .vin
                .get(meta.index as usize)
                .ok_or(LedgerError::RelevantIndex {
                    tx: rec.hash,
                    index: meta.index,
                })?;
            let prevout = input.prevout;
            let unspent_key = UnspentKey::new(meta.wallet_id, prevout).encode();
            let Some(owner_block) = tx.get(Column::Unspent, &unspent_key)? else {
                self.observer.invariant_violation(&LedgerEvent::MissingUnspent {
                    wallet: meta.wallet_id,
                    outpoint: prevout,
                });
                return Err(LedgerError::MissingUnspent(prevout));
            };
            let owner_block = BlockLocation::decode(&owner_block)?;
            let credit_key = Incidence::new(prevout.hash, owner_block, prevout.index);
            let credit_bytes = credit_key.encode();
            let Some(raw) = tx.get(Column::Credit, &credit_bytes)? else {
                self.observer
                    .invariant_violation(&LedgerEvent::UnspentWithoutCredit {
                        wallet: meta.wallet_id,
                        outpoint: prevout,
                    });
                return Err(LedgerError::Corrupt(
                    "unspent entry without a backing credit".to_string(),
                ));
            };
            let mut credit = CreditValue::decode(&raw)?;
            if credit.flags.spent {
                self.observer
                    .invariant_violation(&LedgerEvent::UnspentAlreadySpent {
                        wallet: meta.wallet_id,
                        outpoint: prevout,
                    });
                return Err(LedgerError::Corrupt(
                    "unspent entry points at a spent credit".to_string(),
                ));
            }

            let debit_key = Incidence::new(rec.hash, location, meta.index);
            credit.mark_spent(debit_key);
            tx.put(Column::Credit, &credit_bytes, &credit.encode())?;
            let debit = DebitValue {
                amount: credit.amount,
                credit: credit_key,
            };
            tx.put(Column::Debit, &debit_key.encode(), &debit.encode())?;
            tx.delete(Column::Unspent, &unspent_key)?;
            deltas.add(meta.wallet_id, -credit.amount);

            if let Some(kind) = LgKind::from_class(credit.flags.class) {
                let lg = LgHistoryKey {
                    wallet: meta.wallet_id,
                    kind,
                    direction: LgDirection::Withdraw,
                    tx_hash: rec.hash,
                    height: Some(block.height),
                };
                append_lg_index(tx, &lg, meta.index)?;
            }
        }
        Ok(())
    }

    /// Unmined withdraw history rows for the staking/binding inputs of `rec`.
    pub fn record_unmined_withdrawals(
        &self,
        tx: &mut StoreTx<'_>,
        rec: &TxRecord,
    ) -> Result<(), LedgerError> {
        for meta in &rec.relevant_inputs {
            if let Some(kind) = LgKind::from_class(meta.pk_script.output_class()) {
                let lg = LgHistoryKey {
                    wallet: meta.wallet_id,
                    kind,
                    direction: LgDirection::Withdraw,
                    tx_hash: rec.hash,
                    height: None,
                };
                append_lg_index(tx, &lg, meta.index)?;
            }
        }
        Ok(())
    }

    fn record_address_use(
        &self,
        tx: &mut StoreTx<'_>,
        meta: &RelevantMeta,
        height: u64,
    ) -> Result<(), LedgerError> {
        let key = AddressKey::new(
            meta.wallet_id,
            meta.pk_script.address_class(),
            meta.pk_script.encoded_address(),
        )
        .encode();
        if !tx.exists(Column::Address, &key)? {
            tx.put(Column::Address, &key, &height_key(height))?;
            tx.put(Column::AddressHeight, &index_key(&height_key(height), &key), &[])?;
        }
        Ok(())
    }

    pub fn address_first_use(
        &self,
        tx: &StoreTx<'_>,
        key: &AddressKey,
    ) -> Result<Option<u64>, LedgerError> {
        match tx.get(Column::Address, &key.encode())? {
            Some(raw) => Ok(Some(decode_height(&raw)?)),
            None => Ok(None),
        }
    }

    /// Drops every address record first used at `height`.
    pub fn delete_addresses_first_used_at(
        &self,
        tx: &mut StoreTx<'_>,
        height: u64,
    ) -> Result<usize, LedgerError> {
        let prefix = height_key(height);
        let entries = tx.scan_prefix(Column::AddressHeight, &prefix)?;
        for (entry, _) in &entries {
            tx.delete(Column::Address, index_target(entry, prefix.len())?)?;
            tx.delete(Column::AddressHeight, entry)?;
        }
        Ok(entries.len())
    }

    pub fn mined_balance(&self, tx: &StoreTx<'_>, wallet: &WalletId) -> Result<i64, LedgerError> {
        match tx.get(Column::MinedBalance, wallet.as_bytes())? {
            Some(raw) => Ok(decode_amount(&raw)?),
            None => Ok(0),
        }
    }

    /// Applies accumulated deltas to the persisted mined balances.
    pub fn update_mined_balances(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &BalanceDeltas,
    ) -> Result<(), LedgerError> {
        for (wallet, delta) in deltas.iter() {
            if *delta == 0 {
                continue;
            }
            let balance = self.mined_balance(tx, wallet)?;
            let updated = i128::from(balance) + delta;
            if updated < 0 {
                self.observer
                    .invariant_violation(&LedgerEvent::BalanceUnderflow {
                        wallet: *wallet,
                        balance,
                        delta: *delta,
                    });
                return Err(LedgerError::Corrupt(format!(
                    "mined balance of {wallet} would become {updated}"
                )));
            }
            let Ok(updated) = i64::try_from(updated) else {
                self.observer
                    .invariant_violation(&LedgerEvent::BalanceOverflow {
                        wallet: *wallet,
                        balance,
                        delta: *delta,
                    });
                return Err(LedgerError::Corrupt(format!(
                    "mined balance of {wallet} overflows applying {delta}"
                )));
            };
            tx.put(Column::MinedBalance, wallet.as_bytes(), &encode_amount(updated))?;
        }
        Ok(())
    }

    /// Sums the wallet's unspent mined credits by walking the unspent index.
    pub fn recompute_mined_balance(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<i64, LedgerError> {
        let scanner = self.scanner();
        let mut total = 0i64;
        scanner.for_each_unspent(tx, wallet, |credit| {
            total = total.checked_add(credit.amount).ok_or_else(|| {
                LedgerError::Corrupt(format!("unspent credits of {wallet} overflow"))
            })?;
            Ok(true)
        })?;
        Ok(total)
    }

    /// Overwrites the persisted balance with [`Self::recompute_mined_balance`].
    pub fn rebuild_mined_balance(
        &self,
        tx: &mut StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<i64, LedgerError> {
        let total = self.recompute_mined_balance(tx, wallet)?;
        tx.put(Column::MinedBalance, wallet.as_bytes(), &encode_amount(total))?;
        Ok(total)
    }

    pub fn credit(
        &self,
        tx: &StoreTx<'_>,
        key: &Incidence,
    ) -> Result<Option<CreditValue>, LedgerError> {
        match tx.get(Column::Credit, &key.encode())? {
            Some(raw) => Ok(Some(CreditValue::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Every mined credit row for `outpoint`, across whichever blocks hold it.
    pub fn mined_credits_for(
        &self,
        tx: &StoreTx<'_>,
        outpoint: &OutPoint,
    ) -> Result<Vec<(Incidence, CreditValue)>, LedgerError> {
        let mut credits = Vec::new();
        for (key, value) in tx.scan_prefix(Column::Credit, &outpoint.hash)? {
            let incidence = Incidence::decode(&key)?;
            if incidence.index == outpoint.index {
                credits.push((incidence, CreditValue::decode(&value)?));
            }
        }
        Ok(credits)
    }

    pub fn has_mined_credit(
        &self,
        tx: &StoreTx<'_>,
        outpoint: &OutPoint,
    ) -> Result<bool, LedgerError> {
        Ok(!self.mined_credits_for(tx, outpoint)?.is_empty())
    }

    pub fn unmined_credit(
        &self,
        tx: &StoreTx<'_>,
        outpoint: &OutPoint,
    ) -> Result<Option<CreditValue>, LedgerError> {
        match tx.get(Column::UnminedCredit, &outpoint_key(outpoint))? {
            Some(raw) => Ok(Some(CreditValue::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn is_spent_by_unmined(
        &self,
        tx: &StoreTx<'_>,
        outpoint: &OutPoint,
    ) -> Result<bool, LedgerError> {
        Ok(tx.exists(Column::UnminedInput, &outpoint_key(outpoint))?)
    }

    pub fn remove_unmined_credits(
        &self,
        tx: &mut StoreTx<'_>,
        hash: &Hash256,
    ) -> Result<usize, LedgerError> {
        Ok(tx.delete_prefix(Column::UnminedCredit, hash)?)
    }

    /// Deletes every unmined staking/binding row written for transaction `hash`.
    pub fn delete_unmined_lg_rows(
        &self,
        tx: &mut StoreTx<'_>,
        hash: &Hash256,
    ) -> Result<usize, LedgerError> {
        let entries = tx.scan_prefix(Column::UnminedLgTx, hash)?;
        for (entry, _) in &entries {
            tx.delete(Column::UnminedLgHistory, index_target(entry, HASH_LEN)?)?;
            tx.delete(Column::UnminedLgTx, entry)?;
        }
        Ok(entries.len())
    }

    pub fn lg_rows_at_height(
        &self,
        tx: &StoreTx<'_>,
        height: u64,
    ) -> Result<Vec<(LgHistoryKey, LgIndexes)>, LedgerError> {
        let prefix = height_key(height);
        let mut rows = Vec::new();
        for (entry, _) in tx.scan_prefix(Column::LgHeight, &prefix)? {
            let key = index_target(&entry, prefix.len())?;
            let Some(value) = tx.get(Column::LgHistory, key)? else {
                continue;
            };
            rows.push((LgHistoryKey::decode(key)?, decode_lg_indexes(&value)?));
        }
        Ok(rows)
    }

    /// Moves mined history rows back to the unmined table. Rows of
    /// transactions in `dropped` are deleted outright.
    pub fn move_lg_rows_to_unmined(
        &self,
        tx: &mut StoreTx<'_>,
        rows: Vec<(LgHistoryKey, LgIndexes)>,
        dropped: &HashSet<Hash256>,
    ) -> Result<(), LedgerError> {
        for (key, indexes) in rows {
            delete_lg_row(tx, &key)?;
            if dropped.contains(&key.tx_hash) {
                continue;
            }
            let unmined = key.unmined();
            for index in indexes {
                append_lg_index(tx, &unmined, index)?;
            }
        }
        Ok(())
    }

    pub fn remove_unspent_by_wallet(
        &self,
        tx: &mut StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<usize, LedgerError> {
        Ok(tx.delete_prefix(Column::Unspent, &UnspentKey::prefix(wallet))?)
    }

    pub fn remove_address_by_wallet(
        &self,
        tx: &mut StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<usize, LedgerError> {
        let rows = tx.scan_prefix(Column::Address, wallet.as_bytes())?;
        for (key, value) in &rows {
            let first_use = height_key(decode_height(value)?);
            tx.delete(Column::AddressHeight, &index_key(&first_use, key))?;
            tx.delete(Column::Address, key)?;
        }
        Ok(rows.len())
    }

    pub fn remove_lg_history_by_wallet(
        &self,
        tx: &mut StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<usize, LedgerError> {
        let mut removed = 0;
        for column in [Column::LgHistory, Column::UnminedLgHistory] {
            for (key, _) in tx.scan_prefix(column, wallet.as_bytes())? {
                delete_lg_row(tx, &LgHistoryKey::decode(&key)?)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn remove_mined_balance(
        &self,
        tx: &mut StoreTx<'_>,
        wallet: &WalletId,
    ) -> Result<(), LedgerError> {
        Ok(tx.delete(Column::MinedBalance, wallet.as_bytes())?)
    }

    /// Takes the scan lock. Balance and unspent enumeration are only available
    /// on the returned handle.
    pub fn scanner(&self) -> UnspentScanner<'_> {
        UnspentScanner {
            index: self,
            _guard: self
                .scan_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn script_address_balance(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
        scripts: &[Hash256],
        min_conf: u32,
        sync_height: u64,
    ) -> Result<BTreeMap<Hash256, ScriptBalance>, LedgerError> {
        self.scanner()
            .script_address_balance(tx, wallet, scripts, min_conf, sync_height)
    }

    pub fn script_address_unspents<F>(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
        scripts: &[Hash256],
        sync_height: u64,
        filter: F,
    ) -> Result<Vec<Credit>, LedgerError>
    where
        F: FnMut(&Credit) -> (bool, bool),
    {
        self.scanner()
            .script_address_unspents(tx, wallet, scripts, sync_height, filter)
    }
}

/// History table and reverse-index entry of a row. Mined rows are indexed
/// by height, unmined rows by transaction.
fn lg_locations(key: &LgHistoryKey) -> (Vec<u8>, Column, Column, Vec<u8>) {
    let encoded = key.encode();
    match key.height {
        Some(height) => {
            let entry = index_key(&height_key(height), &encoded);
            (encoded, Column::LgHistory, Column::LgHeight, entry)
        }
        None => {
            let entry = index_key(&key.tx_hash, &encoded);
            (encoded, Column::UnminedLgHistory, Column::UnminedLgTx, entry)
        }
    }
}

fn delete_lg_row(tx: &mut StoreTx<'_>, key: &LgHistoryKey) -> Result<(), LedgerError> {
    let (encoded, column, index_column, entry) = lg_locations(key);
    tx.delete(column, &encoded)?;
    tx.delete(index_column, &entry)?;
    Ok(())
}

fn append_lg_index(
    tx: &mut StoreTx<'_>,
    key: &LgHistoryKey,
    index: u32,
) -> Result<(), LedgerError> {
    let (key, column, index_column, entry) = lg_locations(key);
    let mut indexes = match tx.get(column, &key)? {
        Some(raw) => decode_lg_indexes(&raw)?,
        None => LgIndexes::new(),
    };
    if !indexes.contains(&index) {
        indexes.push(index);
        indexes.sort_unstable();
    }
    tx.put(column, &key, &encode_lg_indexes(&indexes))?;
    tx.put(index_column, &entry, &[])?;
    Ok(())
}

/// Holds the unspent-index scan lock; dropped when the scan is done.
pub struct UnspentScanner<'a> {
    index: &'a UtxoIndex,
    _guard: MutexGuard<'a, ()>,
}

impl UnspentScanner<'_> {
    /// Visits the wallet's unspent credits in key order until `visit` returns
    /// `false`. Entries whose credit is missing are reported and skipped.
    fn for_each_unspent<F>(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
        mut visit: F,
    ) -> Result<(), LedgerError>
    where
        F: FnMut(Credit) -> Result<bool, LedgerError>,
    {
        let observer = self.index.observer();
        for (key, value) in tx.scan_prefix(Column::Unspent, &UnspentKey::prefix(wallet))? {
            let outpoint = UnspentKey::decode(&key)?.outpoint;
            let block = BlockLocation::decode(&value)?;
            let credit_key = Incidence::new(outpoint.hash, block, outpoint.index);
            let Some(raw) = tx.get(Column::Credit, &credit_key.encode())? else {
                observer.tolerated(&LedgerEvent::UnspentWithoutCredit {
                    wallet: *wallet,
                    outpoint,
                });
                continue;
            };
            let credit = CreditValue::decode(&raw)?;
            if credit.flags.spent {
                observer.invariant_violation(&LedgerEvent::UnspentAlreadySpent {
                    wallet: *wallet,
                    outpoint,
                });
                continue;
            }
            let credit = Credit {
                outpoint,
                block,
                amount: credit.amount,
                maturity: credit.maturity,
                script_hash: credit.script_hash,
                class: credit.flags.class,
                is_change: credit.flags.change,
                spent_by_unmined: tx.exists(Column::UnminedInput, &outpoint_key(&outpoint))?,
            };
            if !visit(credit)? {
                break;
            }
        }
        Ok(())
    }

    /// Per-script totals of the wallet's unspent outputs at `sync_height`.
    ///
    /// An output counts toward `spendable` (or the withdrawable bucket of its
    /// class) once it has both `min_conf` confirmations and its own maturity,
    /// and no unmined transaction spends it.
    pub fn script_address_balance(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
        scripts: &[Hash256],
        min_conf: u32,
        sync_height: u64,
    ) -> Result<BTreeMap<Hash256, ScriptBalance>, LedgerError> {
        let mut balances: BTreeMap<Hash256, ScriptBalance> = scripts
            .iter()
            .map(|script| (*script, ScriptBalance::default()))
            .collect();
        self.for_each_unspent(tx, wallet, |credit| {
            // zero-subsidy coinbases leave empty outputs behind
            if credit.amount == 0 {
                return Ok(true);
            }
            let Some(entry) = balances.get_mut(&credit.script_hash) else {
                return Ok(true);
            };
            let confs = credit.confirmations(sync_height);
            if confs == 0 {
                return Ok(true);
            }
            entry.total = entry.total.saturating_add(credit.amount);
            let usable = confs >= u64::from(min_conf)
                && credit.is_mature(sync_height)
                && !credit.spent_by_unmined;
            if usable {
                let bucket = match credit.class {
                    OutputClass::Standard => &mut entry.spendable,
                    OutputClass::Staking => &mut entry.withdrawable_staking,
                    OutputClass::Binding => &mut entry.withdrawable_binding,
                };
                *bucket = bucket.saturating_add(credit.amount);
            }
            Ok(true)
        })?;
        Ok(balances)
    }

    /// Hands each unspent credit of `scripts` to `filter`, which answers
    /// `(stop, select)`. Selected credits are returned in key order.
    pub fn script_address_unspents<F>(
        &self,
        tx: &StoreTx<'_>,
        wallet: &WalletId,
        scripts: &[Hash256],
        sync_height: u64,
        mut filter: F,
    ) -> Result<Vec<Credit>, LedgerError>
    where
        F: FnMut(&Credit) -> (bool, bool),
    {
        let wanted: HashSet<Hash256> = scripts.iter().copied().collect();
        let mut selected = Vec::new();
        self.for_each_unspent(tx, wallet, |credit| {
            if !wanted.contains(&credit.script_hash) || credit.confirmations(sync_height) == 0 {
                return Ok(true);
            }
            let (stop, select) = filter(&credit);
            if select {
                selected.push(credit);
            }
            Ok(!stop)
        })?;
        Ok(selected)
    }
}
