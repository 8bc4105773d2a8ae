#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use wledger_primitives::{sha256, Hash256, OutPoint, Transaction, TxIn, TxOut};
use wledger_storage::memory::MemoryStore;
use wledger_storage::{update, view, Column, KeyValueStore, StoreTx};
use wledger_txstore::keys::CreditValue;
use wledger_txstore::{
    ledger_params, BalanceDeltas, BlockMeta, ChainFetcher, ClassifiedScript, LedgerError,
    Network, OutputClass, OwnerMap, RecordingObserver, RelevantMeta, ScriptOwners, TxLedger,
    TxRecord, WalletId,
};

pub const MEMPOOL_RECEIVED: i64 = 1_700_000_000;

pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 33
    }

    pub fn gen_range(&mut self, max: usize) -> usize {
        if max == 0 {
            0
        } else {
            (self.next_u64() % max as u64) as usize
        }
    }
}

pub fn wallet(tag: u8) -> WalletId {
    WalletId::from_array([tag; 42])
}

/// Known transactions and blocks, standing in for the node's chain database.
#[derive(Default)]
pub struct MemoryChain {
    txs: Mutex<HashMap<Hash256, (Transaction, Option<BlockMeta>)>>,
    blocks: Mutex<BTreeMap<u64, (BlockMeta, Vec<Transaction>)>>,
}

impl MemoryChain {
    pub fn add_block(&self, meta: BlockMeta, txs: &[Transaction]) {
        let mut known = self.txs.lock().expect("txs");
        for tx in txs {
            known.insert(tx.txid(), (tx.clone(), Some(meta)));
        }
        self.blocks
            .lock()
            .expect("blocks")
            .insert(meta.height, (meta, txs.to_vec()));
    }

    pub fn add_loose(&self, tx: &Transaction) {
        self.txs
            .lock()
            .expect("txs")
            .entry(tx.txid())
            .or_insert_with(|| (tx.clone(), None));
    }
}

impl ChainFetcher for MemoryChain {
    fn fetch_tx_by_sha(&self, hash: &Hash256) -> Result<Option<Transaction>, LedgerError> {
        Ok(self
            .txs
            .lock()
            .expect("txs")
            .get(hash)
            .map(|(tx, _)| tx.clone()))
    }

    fn fetch_last_tx_until_height(
        &self,
        hash: &Hash256,
        height: u64,
    ) -> Result<Option<(Transaction, BlockMeta)>, LedgerError> {
        Ok(match self.txs.lock().expect("txs").get(hash) {
            Some((tx, Some(meta))) if meta.height <= height => Some((tx.clone(), *meta)),
            _ => None,
        })
    }

    fn fetch_block_by_height(
        &self,
        height: u64,
    ) -> Result<Option<(BlockMeta, Vec<Transaction>)>, LedgerError> {
        Ok(self.blocks.lock().expect("blocks").get(&height).cloned())
    }

    fn fetch_block_by_sha(
        &self,
        hash: &Hash256,
    ) -> Result<Option<(BlockMeta, Vec<Transaction>)>, LedgerError> {
        Ok(self
            .blocks
            .lock()
            .expect("blocks")
            .values()
            .find(|(meta, _)| meta.hash == *hash)
            .cloned())
    }
}

/// A ledger over a memory store plus the block driver that feeds it.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub owners: Arc<OwnerMap>,
    pub observer: Arc<RecordingObserver>,
    pub ledger: TxLedger,
    pub chain: MemoryChain,
    scripts: HashMap<Vec<u8>, Arc<ClassifiedScript>>,
    next_script: u32,
    next_foreign: u32,
}

impl Harness {
    pub fn new() -> Self {
        let owners = Arc::new(OwnerMap::new());
        let observer = Arc::new(RecordingObserver::new());
        let ledger = TxLedger::new(
            ledger_params(Network::Regtest),
            owners.clone(),
            observer.clone(),
        );
        Self {
            store: Arc::new(MemoryStore::new()),
            owners,
            observer,
            ledger,
            chain: MemoryChain::default(),
            scripts: HashMap::new(),
            next_script: 0,
            next_foreign: 0,
        }
    }

    /// Registers a fresh output script owned by `owner` and returns its bytes.
    pub fn script(&mut self, owner: WalletId, class: OutputClass, maturity: u32) -> Vec<u8> {
        self.next_script += 1;
        let mut pk_script = vec![0x51, class as u8];
        pk_script.extend_from_slice(&self.next_script.to_be_bytes());
        let hash = sha256(&pk_script);
        let address = format!("addr{}", self.next_script);
        let classified = match class {
            OutputClass::Standard => ClassifiedScript::standard(hash, address),
            OutputClass::Staking => ClassifiedScript::staking(hash, address, maturity),
            OutputClass::Binding => ClassifiedScript::binding(hash, address, maturity),
        };
        self.owners.insert(hash, owner);
        self.scripts.insert(pk_script.clone(), Arc::new(classified));
        pk_script
    }

    pub fn standard(&mut self, owner: WalletId) -> Vec<u8> {
        self.script(owner, OutputClass::Standard, 0)
    }

    pub fn foreign_script() -> Vec<u8> {
        vec![0x6a, 0x00]
    }

    pub fn foreign_outpoint(&mut self) -> OutPoint {
        self.next_foreign += 1;
        OutPoint::new(sha256(&self.next_foreign.to_le_bytes()), 0)
    }

    pub fn coinbase(height: u64, outputs: Vec<(Vec<u8>, i64)>) -> Transaction {
        let mut input = TxIn::new(OutPoint::null());
        input.witness.push(height.to_le_bytes().to_vec());
        Transaction::new(vec![input], tx_outs(outputs))
    }

    pub fn spend(inputs: &[OutPoint], outputs: Vec<(Vec<u8>, i64)>) -> Transaction {
        Transaction::new(
            inputs.iter().map(|prevout| TxIn::new(*prevout)).collect(),
            tx_outs(outputs),
        )
    }

    /// Pays `outputs` from a fresh outpoint nobody tracks.
    pub fn fund(&mut self, outputs: Vec<(Vec<u8>, i64)>) -> Transaction {
        let prevout = self.foreign_outpoint();
        Self::spend(&[prevout], outputs)
    }

    pub fn block_meta(height: u64, fork: u8) -> BlockMeta {
        let mut seed = height.to_be_bytes().to_vec();
        seed.push(fork);
        BlockMeta::new(height, sha256(&seed), 1_600_000_000 + height as i64 * 60)
    }

    fn meta(&self, index: u32, pk_script: &[u8]) -> Option<RelevantMeta> {
        let script = self.scripts.get(pk_script)?;
        let owner = self.owners.wallet_of(&script.script_hash)?;
        Some(RelevantMeta::new(index, script.clone(), owner))
    }

    /// Finds the wallet-relevant inputs and outputs, looking previous outputs
    /// up through the chain.
    pub fn classify(&self, tx: Transaction, received: i64) -> TxRecord {
        let mut inputs = Vec::new();
        if !tx.is_coinbase() {
            for (index, input) in tx.vin.iter().enumerate() {
                let Some(prev) = self
                    .chain
                    .fetch_tx_by_sha(&input.prevout.hash)
                    .expect("chain lookup")
                else {
                    continue;
                };
                let Some(spent) = prev.vout.get(input.prevout.index as usize) else {
                    continue;
                };
                if let Some(meta) = self.meta(index as u32, &spent.pk_script) {
                    inputs.push(meta);
                }
            }
        }
        let outputs = tx
            .vout
            .iter()
            .enumerate()
            .filter_map(|(index, output)| self.meta(index as u32, &output.pk_script))
            .collect();
        TxRecord::new(tx, received).with_relevant(inputs, outputs)
    }

    pub fn connect(
        &self,
        height: u64,
        fork: u8,
        txs: Vec<Transaction>,
    ) -> Result<BlockMeta, LedgerError> {
        let meta = Self::block_meta(height, fork);
        self.chain.add_block(meta, &txs);
        let records: Vec<TxRecord> = txs
            .into_iter()
            .map(|tx| self.classify(tx, meta.timestamp))
            .collect();
        update(self.store.as_ref(), |db| {
            self.ledger.connect_block(db, &meta, &records)
        })?;
        Ok(meta)
    }

    pub fn mempool(&self, tx: Transaction) -> Result<bool, LedgerError> {
        self.chain.add_loose(&tx);
        let record = self.classify(tx, MEMPOOL_RECEIVED);
        update(self.store.as_ref(), |db| {
            let mut deltas = BalanceDeltas::new();
            self.ledger.add_relevant_tx(db, &mut deltas, &record, None)
        })
    }

    pub fn rollback(&self, to_height: u64) -> Result<(), LedgerError> {
        update(self.store.as_ref(), |db| self.ledger.rollback(db, to_height))
    }

    pub fn read<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T, LedgerError>) -> T {
        view(self.store.as_ref(), f).expect("read")
    }

    pub fn count(&self, column: Column) -> usize {
        self.store.len(column)
    }

    pub fn balance(&self, owner: WalletId) -> i64 {
        self.read(|db| self.ledger.mined_balance(db, &owner))
    }

    /// Brute-force sum of unspent mined credits whose script maps to `owner`.
    pub fn oracle_balance(&self, owner: WalletId) -> i64 {
        self.store
            .scan_prefix(Column::Credit, &[])
            .expect("scan credits")
            .into_iter()
            .map(|(_, raw)| CreditValue::decode(&raw).expect("credit"))
            .filter(|credit| {
                !credit.flags.spent && self.owners.wallet_of(&credit.script_hash) == Some(owner)
            })
            .map(|credit| credit.amount)
            .sum()
    }

    pub fn dump(&self) -> Vec<(Column, Vec<(Vec<u8>, Vec<u8>)>)> {
        Column::ALL
            .iter()
            .map(|column| {
                (
                    *column,
                    self.store.scan_prefix(*column, &[]).expect("scan column"),
                )
            })
            .collect()
    }
}

fn tx_outs(outputs: Vec<(Vec<u8>, i64)>) -> Vec<TxOut> {
    outputs
        .into_iter()
        .map(|(pk_script, value)| TxOut { value, pk_script })
        .collect()
}
