mod common;

use common::{wallet, Harness, Lcg};
use wledger_primitives::{OutPoint, Transaction};
use wledger_storage::{update, Column, StoreTx};
use wledger_txstore::keys::TxRecordKey;
use wledger_txstore::{
    sync, LedgerError, LedgerEvent, OutputClass, Recorded, Severity, WalletId, WALLET_SYNCED,
};

const UNMINED_COLUMNS: [Column; 5] = [
    Column::UnminedTx,
    Column::UnminedCredit,
    Column::UnminedInput,
    Column::UnminedLgHistory,
    Column::UnminedLgTx,
];

struct ChainDriver {
    lcg: Lcg,
    wallets: Vec<WalletId>,
    scripts: Vec<Vec<u8>>,
    pool: Vec<(OutPoint, i64)>,
    blocks: Vec<Vec<Transaction>>,
}

impl ChainDriver {
    fn new(h: &mut Harness, seed: u64) -> Self {
        let wallets = vec![wallet(b'a'), wallet(b'b'), wallet(b'c')];
        let mut scripts = Vec::new();
        for owner in &wallets {
            scripts.push(h.standard(*owner));
            scripts.push(h.standard(*owner));
        }
        scripts.push(h.script(wallets[0], OutputClass::Staking, 4));
        scripts.push(h.script(wallets[1], OutputClass::Binding, 2));
        Self {
            lcg: Lcg::new(seed),
            wallets,
            scripts,
            pool: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn pick_script(&mut self) -> Vec<u8> {
        // roughly one output in eight leaves the wallets
        if self.lcg.gen_range(8) == 0 {
            return Harness::foreign_script();
        }
        let index = self.lcg.gen_range(self.scripts.len());
        self.scripts[index].clone()
    }

    fn outputs(&mut self, total: i64) -> Vec<(Vec<u8>, i64)> {
        let count = 1 + self.lcg.gen_range(3);
        let mut left = total;
        let mut outputs = Vec::with_capacity(count);
        for i in 0..count {
            let value = if i + 1 == count {
                left
            } else {
                let share = self.lcg.gen_range(left.max(1) as usize) as i64;
                left -= share;
                share
            };
            outputs.push((self.pick_script(), value));
        }
        outputs
    }

    /// Builds the next block: a coinbase, some spends of earlier outputs and
    /// an occasional payment from outside.
    fn next_block(&mut self, h: &mut Harness, height: u64) -> Vec<Transaction> {
        let reward = 1_000 + self.lcg.gen_range(4_000) as i64;
        let outputs = self.outputs(reward);
        let mut txs = vec![Harness::coinbase(height, outputs)];

        for _ in 0..self.lcg.gen_range(4) {
            if self.pool.is_empty() {
                break;
            }
            let mut inputs = Vec::new();
            let mut total = 0;
            for _ in 0..1 + self.lcg.gen_range(2) {
                if self.pool.is_empty() {
                    break;
                }
                let index = self.lcg.gen_range(self.pool.len());
                let (outpoint, value) = self.pool.swap_remove(index);
                inputs.push(outpoint);
                total += value;
            }
            let fee = (total / 100).min(10);
            let outputs = self.outputs(total - fee);
            txs.push(Harness::spend(&inputs, outputs));
        }

        if self.lcg.gen_range(3) == 0 {
            let amount = 500 + self.lcg.gen_range(500) as i64;
            let outputs = self.outputs(amount);
            txs.push(h.fund(outputs));
        }

        let foreign = Harness::foreign_script();
        for tx in &txs {
            let hash = tx.txid();
            for (index, output) in tx.vout.iter().enumerate() {
                if output.pk_script != foreign {
                    self.pool.push((OutPoint::new(hash, index as u32), output.value));
                }
            }
        }
        txs
    }

    /// Connects `count` blocks, checking after each one that every stored
    /// balance equals the sum of the wallet's unspent credits.
    fn run(&mut self, h: &mut Harness, count: u64) {
        for height in 1..=count {
            let txs = self.next_block(h, height);
            self.blocks.push(txs.clone());
            h.connect(height, 0, txs).expect("connect");
            for owner in &self.wallets {
                assert_eq!(
                    h.balance(*owner),
                    h.oracle_balance(*owner),
                    "balance drift at height {height}"
                );
            }
        }
    }
}

fn mined_dump(h: &Harness) -> Vec<(Column, Vec<(Vec<u8>, Vec<u8>)>)> {
    h.dump()
        .into_iter()
        .filter(|(column, _)| {
            !UNMINED_COLUMNS.contains(column) && *column != Column::MinedBalance
        })
        .collect()
}

#[test]
fn rollback_matches_a_store_that_never_saw_the_blocks() {
    const TIP: u64 = 24;
    let mut seeds = Lcg::new(0x5eed);
    for _ in 0..6 {
        let seed = seeds.next_u64();
        let keep = seeds.gen_range(TIP as usize) as u64;

        let mut full = Harness::new();
        let mut driver = ChainDriver::new(&mut full, seed);
        driver.run(&mut full, TIP);
        full.rollback(keep + 1).expect("rollback");

        let mut direct = Harness::new();
        let mut reference = ChainDriver::new(&mut direct, seed);
        reference.run(&mut direct, keep);

        assert_eq!(mined_dump(&full), mined_dump(&direct), "seed {seed} keep {keep}");
        for owner in &driver.wallets {
            assert_eq!(full.balance(*owner), direct.balance(*owner));
            assert_eq!(full.balance(*owner), full.oracle_balance(*owner));
        }

        let unmined = full.read(|db| full.ledger.unmined_txs(db));
        assert!(unmined.iter().all(|rec| !rec.is_coinbase()));
        for rec in &unmined {
            assert!(!full.read(|db| full.ledger.exists_tx(db, &rec.hash)));
        }
        assert!(full
            .observer
            .events(Severity::Error)
            .is_empty());
    }
}

#[test]
fn replaying_rolled_back_blocks_restores_the_store() {
    const TIP: u64 = 16;
    let mut h = Harness::new();
    let mut driver = ChainDriver::new(&mut h, 77);
    driver.run(&mut h, TIP);
    let before = h.dump();
    let mined_before = h.count(Column::MinedTx);

    h.rollback(9).expect("rollback");
    assert!(h.count(Column::MinedTx) < mined_before);

    for (offset, txs) in driver.blocks[8..].iter().enumerate() {
        h.connect(9 + offset as u64, 0, txs.clone()).expect("replay");
    }
    for column in UNMINED_COLUMNS {
        assert_eq!(h.count(column), 0, "{column:?} left behind");
    }
    assert_eq!(h.dump(), before);
}

#[test]
fn rollback_rewinds_cursor_and_clamps_wallet_progress() {
    let mut h = Harness::new();
    let mut driver = ChainDriver::new(&mut h, 3);
    let (synced, importing, behind) = (wallet(b'x'), wallet(b'y'), wallet(b'z'));
    update(h.store.as_ref(), |db| {
        sync::put_wallet_status(db, &synced, WALLET_SYNCED)?;
        sync::put_wallet_status(db, &importing, 8)?;
        sync::put_wallet_status(db, &behind, 3)
    })
    .expect("statuses");
    driver.run(&mut h, 10);

    h.rollback(6).expect("rollback to 6");
    let cursor = h.read(|db| sync::synced_to(db)).expect("cursor");
    assert_eq!(cursor, Harness::block_meta(5, 0));
    assert_eq!(h.read(|db| h.ledger.top_block_height(db)), Some(5));
    let status = |wallet: WalletId| {
        h.read(|db| sync::fetch_wallet_status(db, &wallet))
            .expect("status")
    };
    assert_eq!(status(synced), WALLET_SYNCED);
    assert_eq!(status(importing), 5);
    assert_eq!(status(behind), 3);
    let rolled: Vec<u64> = h
        .observer
        .records()
        .into_iter()
        .filter_map(|record| match record {
            Recorded::RollbackBlock(height) => Some(height),
            _ => None,
        })
        .collect();
    assert_eq!(rolled, vec![10, 9, 8, 7, 6]);

    h.rollback(1).expect("rollback to 1");
    assert_eq!(h.read(|db| sync::synced_to(db)), None);
    assert_eq!(h.count(Column::SyncBlock), 0);
    assert_eq!(h.count(Column::Block), 0);
    assert_eq!(status(synced), WALLET_SYNCED);
    assert_eq!(status(importing), 0);
    assert_eq!(status(behind), 0);

    // an empty store accepts any starting height again
    let funding = h.fund(vec![(Harness::foreign_script(), 1)]);
    h.connect(40, 0, vec![funding]).expect("restart");
}

#[test]
fn rollback_above_the_tip_changes_nothing() {
    let mut h = Harness::new();
    let alice = wallet(b'a');
    let importing = wallet(b'i');
    let script = h.standard(alice);
    update(h.store.as_ref(), |db| sync::put_wallet_status(db, &importing, 3))
        .expect("status");
    for height in 1..=3 {
        let funding = h.fund(vec![(script.clone(), 10)]);
        h.connect(height, 0, vec![funding]).expect("connect");
    }
    let before = h.dump();

    for to_height in [4, 10] {
        h.rollback(to_height).expect("rollback");
        assert_eq!(h.dump(), before, "rollback to {to_height}");
    }
    let cursor = h.read(|db| sync::synced_to(db)).expect("cursor");
    assert_eq!(cursor, Harness::block_meta(3, 0));
    assert_eq!(h.balance(alice), 30);
    assert!(!h
        .observer
        .records()
        .iter()
        .any(|record| matches!(record, Recorded::RollbackBlock(_))));

    // the cursor still only moves one block at a time
    let gap = h.fund(vec![(script.clone(), 10)]);
    let err = h.connect(7, 0, vec![gap]).expect_err("gap");
    assert!(matches!(err, LedgerError::Sync(_)));
    let next = h.fund(vec![(script, 10)]);
    h.connect(4, 0, vec![next]).expect("block 4");
}

#[test]
fn rollback_tolerates_a_missing_tx_record() {
    let mut h = Harness::new();
    let alice = wallet(b'a');
    let bob = wallet(b'b');
    let to_alice = h.standard(alice);
    let to_bob = h.standard(bob);
    let stake = h.script(alice, OutputClass::Staking, 6);

    let funding = h.fund(vec![(to_alice, 600)]);
    let funding_hash = funding.txid();
    h.connect(1, 0, vec![funding]).expect("block 1");
    let payment = Harness::spend(
        &[OutPoint::new(funding_hash, 0)],
        vec![(to_bob, 540), (stake, 50)],
    );
    let payment_hash = payment.txid();
    let block = h.connect(2, 0, vec![payment]).expect("block 2");

    let key = TxRecordKey::new(payment_hash, block.location()).encode();
    update(h.store.as_ref(), |db: &mut StoreTx<'_>| {
        db.delete(Column::MinedTx, &key)?;
        Ok::<_, LedgerError>(())
    })
    .expect("delete record");

    h.rollback(2).expect("rollback");
    let warnings = h.observer.events(Severity::Warn);
    assert!(warnings.contains(&LedgerEvent::MissingTxRecord {
        hash: payment_hash,
        height: 2,
    }));

    // the debit was still undone, the orphaned credit is gone for good
    assert_eq!(h.balance(alice), 600);
    assert_eq!(h.balance(bob), 0);
    assert_eq!(h.oracle_balance(alice), 600);
    assert_eq!(h.count(Column::Debit), 0);
    assert_eq!(h.count(Column::Credit), 1);
    assert!(!h.read(|db| h.ledger.exist_unmined_tx(db, &payment_hash)));

    // the staking deposit of the lost transaction leaves no history behind
    for column in [
        Column::LgHistory,
        Column::LgHeight,
        Column::UnminedLgHistory,
        Column::UnminedLgTx,
    ] {
        assert_eq!(h.count(column), 0, "{column:?} left behind");
    }
    assert!(h
        .read(|db| h.ledger.utxo().get_unmined_staking_history_detail(db, &alice))
        .is_empty());
}

#[test]
fn vanished_coinbase_takes_its_unmined_descendants_along() {
    let mut h = Harness::new();
    let alice = wallet(b'a');
    let bob = wallet(b'b');
    let carol = wallet(b'c');
    let to_alice = h.standard(alice);
    let to_bob = h.standard(bob);
    let to_carol = h.standard(carol);

    let coinbase = Harness::coinbase(1, vec![(to_alice, 5_000)]);
    let coinbase_hash = coinbase.txid();
    h.connect(1, 0, vec![coinbase]).expect("block 1");
    let payment = Harness::spend(&[OutPoint::new(coinbase_hash, 0)], vec![(to_bob, 4_900)]);
    let payment_hash = payment.txid();
    h.connect(2, 0, vec![payment]).expect("block 2");
    let child = Harness::spend(&[OutPoint::new(payment_hash, 0)], vec![(to_carol, 4_800)]);
    let child_hash = child.txid();
    assert!(h.mempool(child).expect("mempool"));

    h.rollback(1).expect("rollback");

    let removed = h.observer.conflicts_removed();
    assert!(removed.contains(&payment_hash));
    assert!(removed.contains(&child_hash));
    assert!(h
        .observer
        .records()
        .contains(&Recorded::MinedUnmined(payment_hash)));
    for column in UNMINED_COLUMNS {
        assert_eq!(h.count(column), 0, "{column:?} left behind");
    }
    assert_eq!(h.count(Column::Credit), 0);
    assert_eq!(h.count(Column::MinedTx), 0);
    for owner in [alice, bob, carol] {
        assert_eq!(h.balance(owner), 0);
    }
}

#[test]
fn rolled_back_spend_returns_to_the_mempool() {
    let mut h = Harness::new();
    let alice = wallet(b'a');
    let bob = wallet(b'b');
    let to_alice = h.standard(alice);
    let to_bob = h.standard(bob);

    let funding = h.fund(vec![(to_alice, 1_000)]);
    let funding_hash = funding.txid();
    h.connect(1, 0, vec![funding]).expect("block 1");
    let funded = OutPoint::new(funding_hash, 0);
    let payment = Harness::spend(&[funded], vec![(to_bob, 990)]);
    let payment_hash = payment.txid();
    h.connect(2, 0, vec![payment]).expect("block 2");

    h.rollback(2).expect("rollback");
    assert!(h.read(|db| h.ledger.exist_unmined_tx(db, &payment_hash)));
    assert!(!h.read(|db| h.ledger.exists_tx(db, &payment_hash)));
    assert_eq!(h.balance(alice), 1_000);
    assert_eq!(h.balance(bob), 0);
    assert!(h.read(|db| h.ledger.utxo().is_spent_by_unmined(db, &funded)));
    let details = h
        .read(|db| h.ledger.tx_details(db, &payment_hash))
        .expect("details");
    assert_eq!(details.block, None);
    assert_eq!(details.record.hash, payment_hash);
}
