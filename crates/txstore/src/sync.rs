//! Store-wide sync cursor and per-wallet sync progress.

use wledger_primitives::Hash256;
use wledger_storage::{Column, StoreTx};

use crate::error::{LedgerError, SyncError};
use crate::keys::{
    decode_height, decode_sync_block, encode_sync_block, height_key, SYNCED_TO_KEY,
};
use crate::record::BlockMeta;
use crate::script::WalletId;

/// Wallet status value meaning the wallet follows the store cursor.
pub const WALLET_SYNCED: u64 = u64::MAX;

/// The block the store is synced to, if any.
pub fn synced_to(tx: &StoreTx<'_>) -> Result<Option<BlockMeta>, LedgerError> {
    let Some(raw) = tx.get(Column::SyncMeta, SYNCED_TO_KEY)? else {
        return Ok(None);
    };
    let height = decode_height(&raw)?;
    match block_stamp(tx, height)? {
        Some(meta) => Ok(Some(meta)),
        None => Err(LedgerError::Corrupt(format!(
            "sync cursor at {height} has no block marker"
        ))),
    }
}

/// Advances the cursor by exactly one block.
pub fn set_synced_to(tx: &mut StoreTx<'_>, block: &BlockMeta) -> Result<(), LedgerError> {
    if let Some(raw) = tx.get(Column::SyncMeta, SYNCED_TO_KEY)? {
        let current = decode_height(&raw)?;
        if block.height <= current {
            return Err(SyncError::TooSmall {
                current,
                proposed: block.height,
            }
            .into());
        }
        if block.height > current + 1 {
            return Err(SyncError::TooGreater {
                current,
                proposed: block.height,
            }
            .into());
        }
    }
    if let Some(next) = block.height.checked_add(1) {
        if tx.exists(Column::SyncBlock, &height_key(next))? {
            return Err(SyncError::AlreadyRecorded { height: next }.into());
        }
    }
    tx.put(
        Column::SyncBlock,
        &height_key(block.height),
        &encode_sync_block(&block.hash, block.timestamp),
    )?;
    tx.put(Column::SyncMeta, SYNCED_TO_KEY, &height_key(block.height))?;
    Ok(())
}

/// Drops every block marker above `height` and rewinds the cursor to it.
/// A cursor already at or below `height` is kept. `None` clears the cursor
/// entirely.
pub fn reset_synced_to(tx: &mut StoreTx<'_>, height: Option<u64>) -> Result<(), LedgerError> {
    let current = match tx.get(Column::SyncMeta, SYNCED_TO_KEY)? {
        Some(raw) => Some(decode_height(&raw)?),
        None => None,
    };
    for (key, _) in tx.scan_prefix(Column::SyncBlock, &[])? {
        let marker = decode_height(&key)?;
        if height.map_or(true, |height| marker > height) {
            tx.delete(Column::SyncBlock, &key)?;
        }
    }
    let Some(height) = height else {
        tx.delete(Column::SyncMeta, SYNCED_TO_KEY)?;
        return Ok(());
    };
    if current.is_some_and(|current| current <= height) {
        return Ok(());
    }
    if tx.exists(Column::SyncBlock, &height_key(height))? {
        tx.put(Column::SyncMeta, SYNCED_TO_KEY, &height_key(height))?;
    } else {
        tx.delete(Column::SyncMeta, SYNCED_TO_KEY)?;
    }
    Ok(())
}

pub fn block_stamp(tx: &StoreTx<'_>, height: u64) -> Result<Option<BlockMeta>, LedgerError> {
    match tx.get(Column::SyncBlock, &height_key(height))? {
        Some(raw) => {
            let (hash, timestamp) = decode_sync_block(&raw)?;
            Ok(Some(BlockMeta::new(height, hash, timestamp)))
        }
        None => Ok(None),
    }
}

pub fn block_hash(tx: &StoreTx<'_>, height: u64) -> Result<Option<Hash256>, LedgerError> {
    Ok(block_stamp(tx, height)?.map(|meta| meta.hash))
}

pub fn put_wallet_status(
    tx: &mut StoreTx<'_>,
    wallet: &WalletId,
    synced_height: u64,
) -> Result<(), LedgerError> {
    tx.put(Column::WalletStatus, wallet.as_bytes(), &height_key(synced_height))?;
    Ok(())
}

pub fn fetch_wallet_status(
    tx: &StoreTx<'_>,
    wallet: &WalletId,
) -> Result<Option<u64>, LedgerError> {
    match tx.get(Column::WalletStatus, wallet.as_bytes())? {
        Some(raw) => Ok(Some(decode_height(&raw)?)),
        None => Ok(None),
    }
}

pub fn delete_wallet_status(tx: &mut StoreTx<'_>, wallet: &WalletId) -> Result<(), LedgerError> {
    tx.delete(Column::WalletStatus, wallet.as_bytes())?;
    Ok(())
}

pub fn wallet_statuses(tx: &StoreTx<'_>) -> Result<Vec<(WalletId, u64)>, LedgerError> {
    let mut statuses = Vec::new();
    for (key, value) in tx.scan_prefix(Column::WalletStatus, &[])? {
        statuses.push((WalletId::from_bytes(&key)?, decode_height(&value)?));
    }
    Ok(statuses)
}

/// Lowers every importing wallet's progress to at most `height`; fully
/// synced wallets keep the sentinel.
pub fn clamp_wallet_statuses(tx: &mut StoreTx<'_>, height: Option<u64>) -> Result<(), LedgerError> {
    let ceiling = height.unwrap_or(0);
    for (wallet, synced) in wallet_statuses(tx)? {
        if synced != WALLET_SYNCED && synced > ceiling {
            put_wallet_status(tx, &wallet, ceiling)?;
        }
    }
    Ok(())
}
