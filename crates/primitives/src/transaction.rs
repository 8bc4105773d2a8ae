//! Wallet-side transaction type and its consensus serialization.

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;
use crate::Hash256;

pub const TX_VERSION: u32 = 1;

const MAX_TX_INPUTS: u64 = 100_000;
const MAX_TX_OUTPUTS: u64 = 100_000;
const MAX_WITNESS_ITEMS: u64 = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub witness: Vec<Vec<u8>>,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(prevout: OutPoint) -> Self {
        Self {
            prevout,
            witness: Vec::new(),
            sequence: u32::MAX,
        }
    }
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_varint(self.witness.len() as u64);
        for item in &self.witness {
            encoder.write_var_bytes(item);
        }
        encoder.write_u32_le(self.sequence);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let items = decoder.read_varint()?;
        if items > MAX_WITNESS_ITEMS {
            return Err(DecodeError::SizeTooLarge);
        }
        let mut witness = Vec::with_capacity(items as usize);
        for _ in 0..items {
            witness.push(decoder.read_var_bytes()?);
        }
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            witness,
            sequence,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub pk_script: Vec<u8>,
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.pk_script);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let pk_script = decoder.read_var_bytes()?;
        Ok(Self { value, pk_script })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionDecodeError {
    Decode(DecodeError),
    NoInputs,
}

impl std::fmt::Display for TransactionDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionDecodeError::Decode(err) => write!(f, "{err}"),
            TransactionDecodeError::NoInputs => write!(f, "transaction has no inputs"),
        }
    }
}

impl std::error::Error for TransactionDecodeError {}

impl From<DecodeError> for TransactionDecodeError {
    fn from(err: DecodeError) -> Self {
        TransactionDecodeError::Decode(err)
    }
}

impl Transaction {
    pub fn new(vin: Vec<TxIn>, vout: Vec<TxOut>) -> Self {
        Self {
            version: TX_VERSION,
            vin,
            vout,
            lock_time: 0,
            payload: Vec::new(),
        }
    }

    /// A coinbase spends the null outpoint with its first input.
    pub fn is_coinbase(&self) -> bool {
        self.vin
            .first()
            .map(|input| input.prevout.is_null())
            .unwrap_or(false)
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(64 + self.vout.len() * 40);
        encoder.write_u32_le(self.version);
        encoder.write_varint(self.vin.len() as u64);
        for input in &self.vin {
            input.consensus_encode(&mut encoder);
        }
        encoder.write_varint(self.vout.len() as u64);
        for output in &self.vout {
            output.consensus_encode(&mut encoder);
        }
        encoder.write_u64_le(self.lock_time);
        encoder.write_var_bytes(&self.payload);
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, TransactionDecodeError> {
        let mut decoder = Decoder::new(bytes);
        let version = decoder.read_u32_le()?;
        let vin_len = decoder.read_varint()?;
        if vin_len == 0 {
            return Err(TransactionDecodeError::NoInputs);
        }
        if vin_len > MAX_TX_INPUTS {
            return Err(DecodeError::SizeTooLarge.into());
        }
        let mut vin = Vec::with_capacity(vin_len as usize);
        for _ in 0..vin_len {
            vin.push(TxIn::consensus_decode(&mut decoder)?);
        }
        let vout_len = decoder.read_varint()?;
        if vout_len > MAX_TX_OUTPUTS {
            return Err(DecodeError::SizeTooLarge.into());
        }
        let mut vout = Vec::with_capacity(vout_len as usize);
        for _ in 0..vout_len {
            vout.push(TxOut::consensus_decode(&mut decoder)?);
        }
        let lock_time = decoder.read_u64_le()?;
        let payload = decoder.read_var_bytes()?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes.into());
        }
        Ok(Self {
            version,
            vin,
            vout,
            lock_time,
            payload,
        })
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }
}
