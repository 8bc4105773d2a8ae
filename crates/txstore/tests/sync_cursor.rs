use wledger_primitives::sha256;
use wledger_storage::memory::MemoryStore;
use wledger_storage::{update, view, Column, StoreTx};
use wledger_txstore::keys::{encode_sync_block, height_key, SYNCED_TO_KEY};
use wledger_txstore::{sync, BlockMeta, LedgerError, SyncError, WalletId, WALLET_SYNCED};

fn block(height: u64) -> BlockMeta {
    BlockMeta::new(height, sha256(&height.to_le_bytes()), 1_000 + height as i64)
}

fn advance(store: &MemoryStore, height: u64) -> Result<(), LedgerError> {
    update(store, |db| sync::set_synced_to(db, &block(height)))
}

fn cursor(store: &MemoryStore) -> Option<u64> {
    view(store, |db| sync::synced_to(db))
        .expect("cursor")
        .map(|meta| meta.height)
}

#[test]
fn cursor_moves_one_block_at_a_time() {
    let store = MemoryStore::new();
    assert_eq!(cursor(&store), None);
    advance(&store, 5).expect("first block");
    assert_eq!(cursor(&store), Some(5));

    let err = advance(&store, 5).expect_err("same height");
    assert_eq!(
        err,
        LedgerError::Sync(SyncError::TooSmall {
            current: 5,
            proposed: 5,
        })
    );
    assert_eq!(
        err.to_string(),
        "syncedTo is smaller than last synced block (last 5, new 5)"
    );

    let err = advance(&store, 7).expect_err("gap");
    assert_eq!(
        err,
        LedgerError::Sync(SyncError::TooGreater {
            current: 5,
            proposed: 7,
        })
    );
    assert_eq!(
        err.to_string(),
        "syncedTo is too greater than last synced block (last 5, new 7)"
    );

    advance(&store, 6).expect("next block");
    let stamp = view(&store, |db| sync::synced_to(db))
        .expect("cursor")
        .expect("set");
    assert_eq!(stamp, block(6));
    assert_eq!(
        view(&store, |db| sync::block_hash(db, 5)).expect("hash"),
        Some(block(5).hash)
    );
}

#[test]
fn stale_marker_above_the_cursor_is_refused() {
    let store = MemoryStore::new();
    advance(&store, 1).expect("block 1");
    advance(&store, 2).expect("block 2");
    update(&store, |db: &mut StoreTx<'_>| {
        db.put(
            Column::SyncBlock,
            &height_key(4),
            &encode_sync_block(&block(4).hash, 0),
        )?;
        Ok::<_, LedgerError>(())
    })
    .expect("stale marker");

    let err = advance(&store, 3).expect_err("marker at 4");
    assert_eq!(err, LedgerError::Sync(SyncError::AlreadyRecorded { height: 4 }));
    assert_eq!(cursor(&store), Some(2));
}

#[test]
fn reset_rewinds_or_clears_the_cursor() {
    let store = MemoryStore::new();
    for height in 3..=9 {
        advance(&store, height).expect("advance");
    }

    update(&store, |db| sync::reset_synced_to(db, Some(6))).expect("reset to 6");
    assert_eq!(cursor(&store), Some(6));
    assert_eq!(store.len(Column::SyncBlock), 4);
    advance(&store, 7).expect("resume after reset");

    // resetting above the cursor keeps it where it is
    update(&store, |db| sync::reset_synced_to(db, Some(20))).expect("reset above");
    assert_eq!(cursor(&store), Some(7));
    assert_eq!(store.len(Column::SyncBlock), 5);
    advance(&store, 8).expect("resume after reset above");

    // no marker at 2: the cursor is dropped and any height is accepted again
    update(&store, |db| sync::reset_synced_to(db, Some(2))).expect("reset below");
    assert_eq!(cursor(&store), None);
    assert_eq!(store.len(Column::SyncBlock), 0);
    advance(&store, 100).expect("fresh start");

    update(&store, |db| sync::reset_synced_to(db, None)).expect("clear");
    assert_eq!(cursor(&store), None);
    assert_eq!(store.len(Column::SyncMeta), 0);
}

#[test]
fn cursor_without_marker_is_corruption() {
    let store = MemoryStore::new();
    update(&store, |db: &mut StoreTx<'_>| {
        db.put(Column::SyncMeta, SYNCED_TO_KEY, &height_key(12))?;
        Ok::<_, LedgerError>(())
    })
    .expect("dangling cursor");
    let err = view(&store, |db| sync::synced_to(db)).expect_err("no marker");
    assert!(matches!(err, LedgerError::Corrupt(_)));
}

#[test]
fn wallet_statuses_clamp_below_the_sentinel() {
    let store = MemoryStore::new();
    let synced = WalletId::from_array([b's'; 42]);
    let importing = WalletId::from_array([b'i'; 42]);
    update(&store, |db| {
        sync::put_wallet_status(db, &synced, WALLET_SYNCED)?;
        sync::put_wallet_status(db, &importing, 40)?;
        sync::clamp_wallet_statuses(db, Some(25))
    })
    .expect("clamp");

    let statuses = view(&store, |db| sync::wallet_statuses(db)).expect("statuses");
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains(&(synced, WALLET_SYNCED)));
    assert!(statuses.contains(&(importing, 25)));

    update(&store, |db| sync::delete_wallet_status(db, &importing)).expect("delete");
    assert_eq!(
        view(&store, |db| sync::fetch_wallet_status(db, &importing)).expect("fetch"),
        None
    );
}
