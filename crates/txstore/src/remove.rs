use wledger_primitives::{Hash256, Transaction};
use wledger_storage::{Column, StoreTx};

use crate::error::LedgerError;
use crate::keys::{decode_tx_value, height_key, CreditValue, TxRecordKey};
use crate::ledger::{unlink_unmined_inputs, TxLedger};
use crate::record::BlockLocation;
use crate::script::AddressManager;
use crate::sync;

impl TxLedger {
    /// Purges everything the ledger holds for the wallet behind `manager`.
    ///
    /// The wallet's credits are always deleted. A transaction record is only
    /// deleted when every one of its outputs is a credit of this wallet, so
    /// transactions shared with other wallets survive. Returns the hashes of
    /// the deleted transaction records.
    pub fn remove_relevant_tx(
        &self,
        tx: &mut StoreTx<'_>,
        manager: &dyn AddressManager,
    ) -> Result<Vec<Hash256>, LedgerError> {
        let mut removed = self.remove_mined_for(tx, manager)?;
        removed.extend(self.remove_unmined_for(tx, manager)?);

        let wallet = manager.wallet_id();
        let utxo = self.utxo();
        utxo.remove_unspent_by_wallet(tx, &wallet)?;
        utxo.remove_address_by_wallet(tx, &wallet)?;
        utxo.remove_lg_history_by_wallet(tx, &wallet)?;
        utxo.remove_mined_balance(tx, &wallet)?;
        sync::delete_wallet_status(tx, &wallet)?;
        Ok(removed)
    }

    /// Deletes the wallet's mined credits first, then every transaction whose
    /// outputs were all the wallet's and which no longer debits another
    /// wallet's credit.
    fn remove_mined_for(
        &self,
        tx: &mut StoreTx<'_>,
        manager: &dyn AddressManager,
    ) -> Result<Vec<Hash256>, LedgerError> {
        let mut candidates = Vec::new();
        for (key, value) in tx.scan_prefix(Column::MinedTx, &[])? {
            let (_, raw) = decode_tx_value(&value)?;
            let outputs = Transaction::consensus_decode(raw)?.vout.len();

            let mut owned = 0;
            for (credit_key, raw_credit) in tx.scan_prefix(Column::Credit, &key)? {
                let credit = CreditValue::decode(&raw_credit)?;
                if !manager.owns_script(&credit.script_hash) {
                    continue;
                }
                if let Some(spender) = credit.spender {
                    tx.delete(Column::Debit, &spender.encode())?;
                }
                tx.delete(Column::Credit, &credit_key)?;
                owned += 1;
            }
            if owned > 0 && owned == outputs {
                candidates.push(key);
            }
        }

        let mut removed = Vec::new();
        for key in candidates {
            if !tx.scan_prefix(Column::Debit, &key)?.is_empty() {
                continue;
            }
            let record_key = TxRecordKey::decode(&key)?;
            tx.delete(Column::MinedTx, &key)?;
            self.detach_from_block(tx, &record_key.hash, record_key.block)?;
            removed.push(record_key.hash);
        }
        Ok(removed)
    }

    fn detach_from_block(
        &self,
        tx: &mut StoreTx<'_>,
        hash: &Hash256,
        block: BlockLocation,
    ) -> Result<(), LedgerError> {
        let Some(mut record) = self.block_record(tx, block.height)? else {
            return Ok(());
        };
        record.tx_hashes.retain(|stored| stored != hash);
        if record.tx_hashes.is_empty() {
            tx.delete(Column::Block, &height_key(block.height))?;
        } else {
            tx.put(Column::Block, &height_key(block.height), &record.encode())?;
        }
        Ok(())
    }

    fn remove_unmined_for(
        &self,
        tx: &mut StoreTx<'_>,
        manager: &dyn AddressManager,
    ) -> Result<Vec<Hash256>, LedgerError> {
        let mut removed = Vec::new();
        for (key, value) in tx.scan_prefix(Column::UnminedTx, &[])? {
            let Ok(hash) = <Hash256>::try_from(key.as_slice()) else {
                return Err(LedgerError::Corrupt("unmined tx key is not a hash".to_string()));
            };
            let (_, raw) = decode_tx_value(&value)?;
            let unmined = Transaction::consensus_decode(raw)?;

            let mut owned = 0;
            for (credit_key, raw_credit) in tx.scan_prefix(Column::UnminedCredit, &hash)? {
                let credit = CreditValue::decode(&raw_credit)?;
                if manager.owns_script(&credit.script_hash) {
                    tx.delete(Column::UnminedCredit, &credit_key)?;
                    owned += 1;
                }
            }

            if owned == 0 || owned != unmined.vout.len() {
                continue;
            }
            unlink_unmined_inputs(tx, &hash, &unmined)?;
            self.utxo().delete_unmined_lg_rows(tx, &hash)?;
            tx.delete(Column::UnminedTx, &hash)?;
            removed.push(hash);
        }
        Ok(removed)
    }
}
