use std::collections::HashSet;

use wledger_primitives::{Hash256, OutPoint, Transaction};
use wledger_storage::{Column, StoreTx};

use crate::error::LedgerError;
use crate::keys::{
    decode_spenders, decode_tx_value, encode_tx_value, height_key, outpoint_key, CreditValue,
    DebitValue, Incidence, TxRecordKey, UnspentKey,
};
use crate::ledger::{link_unmined_inputs, TxLedger};
use crate::observer::LedgerEvent;
use crate::record::{BalanceDeltas, BlockLocation};
use crate::sync;

impl TxLedger {
    /// Undoes every block from the current sync height down to and including
    /// `to_height`. Surviving transactions go back to the unmined pool; coinbase
    /// outputs disappear. Records already removed by an earlier, interrupted
    /// rollback are reported to the observer and skipped. A `to_height` above
    /// everything recorded leaves the store untouched.
    pub fn rollback(&self, tx: &mut StoreTx<'_>, to_height: u64) -> Result<(), LedgerError> {
        let synced = sync::synced_to(tx)?.map(|meta| meta.height);
        let top = self.top_block_height(tx)?;
        let Some(start) = synced.max(top).filter(|start| *start >= to_height) else {
            return Ok(());
        };

        let mut deltas = BalanceDeltas::new();
        let mut vanished = Vec::new();
        for height in (to_height..=start).rev() {
            self.rollback_block(tx, &mut deltas, &mut vanished, height)?;
        }

        for outpoint in vanished {
            let key = outpoint_key(&outpoint);
            if let Some(raw) = tx.get(Column::UnminedInput, &key)? {
                for spender in decode_spenders(&raw)? {
                    self.remove_conflict(tx, &spender)?;
                }
            }
        }

        self.utxo().update_mined_balances(tx, &deltas)?;
        let floor = to_height.checked_sub(1);
        sync::reset_synced_to(tx, floor)?;
        sync::clamp_wallet_statuses(tx, floor)?;
        Ok(())
    }

    fn rollback_block(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        vanished: &mut Vec<OutPoint>,
        height: u64,
    ) -> Result<(), LedgerError> {
        let Some(block) = self.block_record(tx, height)? else {
            return Ok(());
        };
        let location = block.location(height);
        let lg_rows = self.utxo().lg_rows_at_height(tx, height)?;

        let mut dropped = HashSet::new();
        for hash in block.tx_hashes.iter().rev() {
            if !self.rollback_tx(tx, deltas, vanished, hash, location)? {
                dropped.insert(*hash);
            }
        }

        self.utxo().move_lg_rows_to_unmined(tx, lg_rows, &dropped)?;
        self.utxo().delete_addresses_first_used_at(tx, height)?;
        tx.delete(Column::Block, &height_key(height))?;
        self.observer()
            .rollback_block(height, &block.hash, block.tx_hashes.len());
        Ok(())
    }

    /// Returns whether the rolled back transaction went back to the unmined
    /// pool. Coinbases and transactions whose record is gone do not.
    fn rollback_tx(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        vanished: &mut Vec<OutPoint>,
        hash: &Hash256,
        location: BlockLocation,
    ) -> Result<bool, LedgerError> {
        let key = TxRecordKey::new(*hash, location).encode();
        let stored = match tx.get(Column::MinedTx, &key)? {
            Some(value) => {
                let (received, raw) = decode_tx_value(&value)?;
                let mined = Transaction::consensus_decode(raw)?;
                tx.delete(Column::MinedTx, &key)?;
                Some((received, raw.to_vec(), mined))
            }
            None => {
                self.observer().tolerated(&LedgerEvent::MissingTxRecord {
                    hash: *hash,
                    height: location.height,
                });
                None
            }
        };
        let coinbase = stored
            .as_ref()
            .map_or(false, |(_, _, mined)| mined.is_coinbase());
        // without the raw transaction nothing can be re-queued
        let requeue = stored.is_some() && !coinbase;

        // credit and debit keys both extend the tx record key with an index
        for (credit_key, raw_credit) in tx.scan_prefix(Column::Credit, &key)? {
            let incidence = Incidence::decode(&credit_key)?;
            let mut credit = CreditValue::decode(&raw_credit)?;
            let outpoint = incidence.outpoint();
            if credit.flags.spent {
                self.observer()
                    .tolerated(&LedgerEvent::SpentCreditRolledBack {
                        outpoint,
                        height: location.height,
                    });
                if let Some(spender) = credit.spender {
                    tx.delete(Column::Debit, &spender.encode())?;
                }
            } else {
                match self.owners().wallet_of(&credit.script_hash) {
                    Some(wallet) => {
                        tx.delete(Column::Unspent, &UnspentKey::new(wallet, outpoint).encode())?;
                        deltas.add(wallet, -credit.amount);
                    }
                    None => self.observer().tolerated(&LedgerEvent::UnknownOwner {
                        outpoint,
                        script_hash: credit.script_hash,
                    }),
                }
            }
            tx.delete(Column::Credit, &credit_key)?;

            if requeue {
                credit.mark_unspent();
                tx.put(Column::UnminedCredit, &outpoint_key(&outpoint), &credit.encode())?;
            } else {
                vanished.push(outpoint);
            }
        }

        for (debit_key, raw_debit) in tx.scan_prefix(Column::Debit, &key)? {
            tx.delete(Column::Debit, &debit_key)?;
            self.restore_spent_credit(tx, deltas, DebitValue::decode(&raw_debit)?)?;
        }

        if let Some((received, raw, mined)) = stored.filter(|_| requeue) {
            link_unmined_inputs(tx, hash, &mined)?;
            tx.put(Column::UnminedTx, hash, &encode_tx_value(received, &raw))?;
            self.observer().mined_unmined(hash, location.height);
        }
        Ok(requeue)
    }

    /// Marks the credit consumed by a deleted debit unspent again.
    fn restore_spent_credit(
        &self,
        tx: &mut StoreTx<'_>,
        deltas: &mut BalanceDeltas,
        debit: DebitValue,
    ) -> Result<(), LedgerError> {
        let credit_bytes = debit.credit.encode();
        let Some(raw_credit) = tx.get(Column::Credit, &credit_bytes)? else {
            self.observer().tolerated(&LedgerEvent::MissingCredit {
                outpoint: debit.credit.outpoint(),
                height: debit.credit.block.height,
            });
            return Ok(());
        };
        let mut credit = CreditValue::decode(&raw_credit)?;
        credit.mark_unspent();
        tx.put(Column::Credit, &credit_bytes, &credit.encode())?;

        let outpoint = debit.credit.outpoint();
        match self.owners().wallet_of(&credit.script_hash) {
            Some(wallet) => {
                tx.put(
                    Column::Unspent,
                    &UnspentKey::new(wallet, outpoint).encode(),
                    &debit.credit.block.encode(),
                )?;
                deltas.add(wallet, credit.amount);
            }
            None => self.observer().tolerated(&LedgerEvent::UnknownOwner {
                outpoint,
                script_hash: credit.script_hash,
            }),
        }
        Ok(())
    }
}
