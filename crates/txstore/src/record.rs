//! In-memory records handed to and returned by the ledger.

use std::collections::BTreeMap;

use wledger_primitives::encoding::{require_len, DecodeError, Decoder, Encoder};
use wledger_primitives::{sha256d, Hash256, Transaction, TxOut};

use crate::error::LedgerError;
use crate::script::{RelevantMeta, WalletId};

pub const BLOCK_LOCATION_LEN: usize = 40;

/// Chain position anchoring a mined record: `height(8) ‖ hash(32)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BlockLocation {
    pub height: u64,
    pub hash: Hash256,
}

impl BlockLocation {
    pub fn new(height: u64, hash: Hash256) -> Self {
        Self { height, hash }
    }

    pub fn encode_into(&self, encoder: &mut Encoder) {
        encoder.write_u64_be(self.height);
        encoder.write_bytes(&self.hash);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(BLOCK_LOCATION_LEN);
        self.encode_into(&mut encoder);
        encoder.into_inner()
    }

    pub fn decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let height = decoder.read_u64_be()?;
        let hash = decoder.read_fixed()?;
        Ok(Self { height, hash })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len("block location", bytes, BLOCK_LOCATION_LEN)?;
        Self::decode_from(&mut Decoder::new(bytes))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockMeta {
    pub height: u64,
    pub hash: Hash256,
    pub timestamp: i64,
}

impl BlockMeta {
    pub fn new(height: u64, hash: Hash256, timestamp: i64) -> Self {
        Self {
            height,
            hash,
            timestamp,
        }
    }

    pub fn location(&self) -> BlockLocation {
        BlockLocation::new(self.height, self.hash)
    }
}

/// A transaction together with the wallet-relevant inputs and outputs found by
/// the classifier. Only `received ‖ serialized` is persisted.
#[derive(Clone, Debug)]
pub struct TxRecord {
    pub hash: Hash256,
    pub tx: Transaction,
    pub serialized: Vec<u8>,
    /// Unix seconds at which the wallet first saw the transaction.
    pub received: i64,
    pub relevant_inputs: Vec<RelevantMeta>,
    pub relevant_outputs: Vec<RelevantMeta>,
    pub has_binding_in: bool,
    pub has_binding_out: bool,
}

impl TxRecord {
    pub fn new(tx: Transaction, received: i64) -> Self {
        let serialized = tx.consensus_encode();
        let hash = sha256d(&serialized);
        Self {
            hash,
            tx,
            serialized,
            received,
            relevant_inputs: Vec::new(),
            relevant_outputs: Vec::new(),
            has_binding_in: false,
            has_binding_out: false,
        }
    }

    pub fn from_raw(raw: &[u8], received: i64) -> Result<Self, LedgerError> {
        let tx = Transaction::consensus_decode(raw)?;
        Ok(Self {
            hash: sha256d(raw),
            tx,
            serialized: raw.to_vec(),
            received,
            relevant_inputs: Vec::new(),
            relevant_outputs: Vec::new(),
            has_binding_in: false,
            has_binding_out: false,
        })
    }

    pub fn with_relevant(mut self, inputs: Vec<RelevantMeta>, outputs: Vec<RelevantMeta>) -> Self {
        self.has_binding_in = inputs.iter().any(|meta| meta.pk_script.is_binding());
        self.has_binding_out = outputs.iter().any(|meta| meta.pk_script.is_binding());
        self.relevant_inputs = inputs;
        self.relevant_outputs = outputs;
        self
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx.is_coinbase()
    }

    pub fn output(&self, index: u32) -> Result<&TxOut, LedgerError> {
        self.tx
            .vout
            .get(index as usize)
            .ok_or(LedgerError::RelevantIndex {
                tx: self.hash,
                index,
            })
    }
}

/// Net mined-balance change per wallet, accumulated over one store transaction.
/// Sums are kept wide so that only the final balance can overflow.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BalanceDeltas(BTreeMap<WalletId, i128>);

impl BalanceDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, wallet: WalletId, amount: i64) {
        *self.0.entry(wallet).or_insert(0) += i128::from(amount);
    }

    pub fn get(&self, wallet: &WalletId) -> i128 {
        self.0.get(wallet).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WalletId, &i128)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|delta| *delta == 0)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
