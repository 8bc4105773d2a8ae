//! Byte layouts of every ledger table key and value.
//!
//! All integers are big-endian so that key order in the store is numeric order.
//! Decoders check the documented minimum length up front and return
//! [`DecodeError::ShortRead`] instead of parsing a truncated value.

use smallvec::SmallVec;
use wledger_primitives::encoding::{require_len, DecodeError, Decoder, Encoder};
use wledger_primitives::{Hash256, OutPoint};

use crate::record::{BlockLocation, BLOCK_LOCATION_LEN};
use crate::script::{OutputClass, WalletId, WALLET_ID_LEN};

pub const HASH_LEN: usize = 32;
pub const OUTPOINT_KEY_LEN: usize = HASH_LEN + 4;
pub const TX_RECORD_KEY_LEN: usize = HASH_LEN + BLOCK_LOCATION_LEN;
pub const TX_VALUE_MIN_LEN: usize = 8;
pub const BLOCK_RECORD_MIN_LEN: usize = HASH_LEN + 8 + 4;
pub const UNSPENT_KEY_LEN: usize = WALLET_ID_LEN + OUTPOINT_KEY_LEN;
pub const INCIDENCE_LEN: usize = TX_RECORD_KEY_LEN + 4;
pub const CREDIT_VALUE_LEN: usize = 8 + 1 + 4 + HASH_LEN;
pub const SPENT_CREDIT_VALUE_LEN: usize = CREDIT_VALUE_LEN + INCIDENCE_LEN;
pub const DEBIT_VALUE_LEN: usize = 8 + INCIDENCE_LEN;
pub const ADDRESS_KEY_MIN_LEN: usize = WALLET_ID_LEN + 2;
pub const LG_UNMINED_KEY_LEN: usize = WALLET_ID_LEN + 2 + HASH_LEN;
pub const LG_MINED_KEY_LEN: usize = LG_UNMINED_KEY_LEN + 8;

pub const SYNCED_TO_KEY: &[u8] = b"syncedto";
pub const SYNC_BLOCK_VALUE_LEN: usize = HASH_LEN + 8;

const FLAG_SPENT: u8 = 0x01;
const FLAG_CHANGE: u8 = 0x02;
const CLASS_SHIFT: u8 = 2;
const CLASS_MASK: u8 = 0x0c;

fn read_wallet(decoder: &mut Decoder) -> Result<WalletId, DecodeError> {
    Ok(WalletId::from_array(decoder.read_fixed()?))
}

pub fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

pub fn decode_height(bytes: &[u8]) -> Result<u64, DecodeError> {
    require_len("height", bytes, 8)?;
    Decoder::new(bytes).read_u64_be()
}

pub fn encode_amount(amount: i64) -> [u8; 8] {
    amount.to_be_bytes()
}

pub fn decode_amount(bytes: &[u8]) -> Result<i64, DecodeError> {
    require_len("amount", bytes, 8)?;
    Decoder::new(bytes).read_i64_be()
}

/// `txHash(32) ‖ index(4)`, used by unmined credits and the unmined-input index.
pub fn outpoint_key(outpoint: &OutPoint) -> [u8; OUTPOINT_KEY_LEN] {
    let mut key = [0u8; OUTPOINT_KEY_LEN];
    key[..HASH_LEN].copy_from_slice(&outpoint.hash);
    key[HASH_LEN..].copy_from_slice(&outpoint.index.to_be_bytes());
    key
}

pub fn decode_outpoint_key(bytes: &[u8]) -> Result<OutPoint, DecodeError> {
    require_len("outpoint key", bytes, OUTPOINT_KEY_LEN)?;
    let mut decoder = Decoder::new(bytes);
    let hash = decoder.read_fixed()?;
    let index = decoder.read_u32_be()?;
    Ok(OutPoint::new(hash, index))
}

/// Mined transaction key: `hash(32) ‖ height(8) ‖ blockHash(32)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxRecordKey {
    pub hash: Hash256,
    pub block: BlockLocation,
}

impl TxRecordKey {
    pub fn new(hash: Hash256, block: BlockLocation) -> Self {
        Self { hash, block }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(TX_RECORD_KEY_LEN);
        encoder.write_bytes(&self.hash);
        self.block.encode_into(&mut encoder);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len("tx record key", bytes, TX_RECORD_KEY_LEN)?;
        let mut decoder = Decoder::new(bytes);
        let hash = decoder.read_fixed()?;
        let block = BlockLocation::decode_from(&mut decoder)?;
        Ok(Self { hash, block })
    }
}

/// Value shared by mined and unmined transaction rows: `received(8) ‖ rawTx`.
pub fn encode_tx_value(received: i64, raw: &[u8]) -> Vec<u8> {
    let mut encoder = Encoder::with_capacity(TX_VALUE_MIN_LEN + raw.len());
    encoder.write_i64_be(received);
    encoder.write_bytes(raw);
    encoder.into_inner()
}

pub fn decode_tx_value(bytes: &[u8]) -> Result<(i64, &[u8]), DecodeError> {
    require_len("tx record value", bytes, TX_VALUE_MIN_LEN)?;
    let mut decoder = Decoder::new(bytes);
    let received = decoder.read_i64_be()?;
    Ok((received, decoder.rest()))
}

/// Block row: `blockHash(32) ‖ ts(8) ‖ numTx(4) ‖ hash×numTx`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockRecord {
    pub hash: Hash256,
    pub timestamp: i64,
    pub tx_hashes: Vec<Hash256>,
}

impl BlockRecord {
    pub fn new(hash: Hash256, timestamp: i64) -> Self {
        Self {
            hash,
            timestamp,
            tx_hashes: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder =
            Encoder::with_capacity(BLOCK_RECORD_MIN_LEN + self.tx_hashes.len() * HASH_LEN);
        encoder.write_bytes(&self.hash);
        encoder.write_i64_be(self.timestamp);
        encoder.write_u32_be(self.tx_hashes.len() as u32);
        for hash in &self.tx_hashes {
            encoder.write_bytes(hash);
        }
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len("block record", bytes, BLOCK_RECORD_MIN_LEN)?;
        let mut decoder = Decoder::new(bytes);
        let hash = decoder.read_fixed()?;
        let timestamp = decoder.read_i64_be()?;
        let count = decoder.read_u32_be()? as usize;
        require_len("block record", bytes, BLOCK_RECORD_MIN_LEN + count * HASH_LEN)?;
        let mut tx_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            tx_hashes.push(decoder.read_fixed()?);
        }
        Ok(Self {
            hash,
            timestamp,
            tx_hashes,
        })
    }

    pub fn location(&self, height: u64) -> BlockLocation {
        BlockLocation::new(height, self.hash)
    }
}

/// Unspent index key: `walletId(42) ‖ txHash(32) ‖ index(4)`.
/// The value is the owning [`BlockLocation`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnspentKey {
    pub wallet: WalletId,
    pub outpoint: OutPoint,
}

impl UnspentKey {
    pub fn new(wallet: WalletId, outpoint: OutPoint) -> Self {
        Self { wallet, outpoint }
    }

    pub fn prefix(wallet: &WalletId) -> Vec<u8> {
        wallet.as_bytes().to_vec()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(UNSPENT_KEY_LEN);
        encoder.write_bytes(self.wallet.as_bytes());
        encoder.write_bytes(&outpoint_key(&self.outpoint));
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len("unspent key", bytes, UNSPENT_KEY_LEN)?;
        let mut decoder = Decoder::new(bytes);
        let wallet = read_wallet(&mut decoder)?;
        let outpoint = decode_outpoint_key(decoder.rest())?;
        Ok(Self { wallet, outpoint })
    }
}

/// One input or output of a mined transaction:
/// `txHash(32) ‖ height(8) ‖ blockHash(32) ‖ index(4)`.
///
/// Keys the credit and debit tables and is appended to a spent credit as the
/// spender reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Incidence {
    pub tx_hash: Hash256,
    pub block: BlockLocation,
    pub index: u32,
}

impl Incidence {
    pub fn new(tx_hash: Hash256, block: BlockLocation, index: u32) -> Self {
        Self {
            tx_hash,
            block,
            index,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_hash, self.index)
    }

    pub fn encode_into(&self, encoder: &mut Encoder) {
        encoder.write_bytes(&self.tx_hash);
        self.block.encode_into(encoder);
        encoder.write_u32_be(self.index);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(INCIDENCE_LEN);
        self.encode_into(&mut encoder);
        encoder.into_inner()
    }

    fn decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let tx_hash = decoder.read_fixed()?;
        let block = BlockLocation::decode_from(decoder)?;
        let index = decoder.read_u32_be()?;
        Ok(Self {
            tx_hash,
            block,
            index,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len("incidence key", bytes, INCIDENCE_LEN)?;
        Self::decode_from(&mut Decoder::new(bytes))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CreditFlags {
    pub spent: bool,
    pub change: bool,
    pub class: OutputClass,
}

impl CreditFlags {
    pub fn to_byte(self) -> u8 {
        let mut flags = (self.class as u8) << CLASS_SHIFT;
        if self.spent {
            flags |= FLAG_SPENT;
        }
        if self.change {
            flags |= FLAG_CHANGE;
        }
        flags
    }

    pub fn from_byte(raw: u8) -> Result<Self, DecodeError> {
        let class = OutputClass::from_u8((raw & CLASS_MASK) >> CLASS_SHIFT)
            .ok_or(DecodeError::InvalidData("unknown credit class"))?;
        Ok(Self {
            spent: raw & FLAG_SPENT != 0,
            change: raw & FLAG_CHANGE != 0,
            class,
        })
    }
}

/// Credit row value:
/// `amount(8) ‖ flags(1) ‖ maturity(4) ‖ scriptHash(32) [‖ spender(76)]`.
///
/// Unmined credits use the same layout without a spender.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CreditValue {
    pub amount: i64,
    pub flags: CreditFlags,
    pub maturity: u32,
    pub script_hash: Hash256,
    pub spender: Option<Incidence>,
}

impl CreditValue {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(SPENT_CREDIT_VALUE_LEN);
        encoder.write_i64_be(self.amount);
        encoder.write_u8(self.flags.to_byte());
        encoder.write_u32_be(self.maturity);
        encoder.write_bytes(&self.script_hash);
        if let Some(spender) = &self.spender {
            spender.encode_into(&mut encoder);
        }
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len("credit value", bytes, CREDIT_VALUE_LEN)?;
        let mut decoder = Decoder::new(bytes);
        let amount = decoder.read_i64_be()?;
        let flags = CreditFlags::from_byte(decoder.read_u8()?)?;
        let maturity = decoder.read_u32_be()?;
        let script_hash = decoder.read_fixed()?;
        let spender = if flags.spent {
            require_len("spent credit value", bytes, SPENT_CREDIT_VALUE_LEN)?;
            Some(Incidence::decode_from(&mut decoder)?)
        } else {
            None
        };
        Ok(Self {
            amount,
            flags,
            maturity,
            script_hash,
            spender,
        })
    }

    pub fn mark_spent(&mut self, spender: Incidence) {
        self.flags.spent = true;
        self.spender = Some(spender);
    }

    pub fn mark_unspent(&mut self) {
        self.flags.spent = false;
        self.spender = None;
    }
}

/// Debit row value: `amount(8) ‖ creditKey(76)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DebitValue {
    pub amount: i64,
    pub credit: Incidence,
}

impl DebitValue {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(DEBIT_VALUE_LEN);
        encoder.write_i64_be(self.amount);
        self.credit.encode_into(&mut encoder);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len("debit value", bytes, DEBIT_VALUE_LEN)?;
        let mut decoder = Decoder::new(bytes);
        let amount = decoder.read_i64_be()?;
        let credit = Incidence::decode_from(&mut decoder)?;
        Ok(Self { amount, credit })
    }
}

/// Unmined-input value: the hashes of every unmined transaction spending the
/// keyed outpoint, in insertion order.
pub fn encode_spenders(spenders: &[Hash256]) -> Vec<u8> {
    let mut encoder = Encoder::with_capacity(spenders.len() * HASH_LEN);
    for hash in spenders {
        encoder.write_bytes(hash);
    }
    encoder.into_inner()
}

pub fn decode_spenders(bytes: &[u8]) -> Result<Vec<Hash256>, DecodeError> {
    require_len("unmined input value", bytes, HASH_LEN)?;
    if bytes.len() % HASH_LEN != 0 {
        return Err(DecodeError::InvalidData(
            "unmined input value is not a whole number of hashes",
        ));
    }
    let mut decoder = Decoder::new(bytes);
    let mut spenders = Vec::with_capacity(bytes.len() / HASH_LEN);
    while !decoder.is_empty() {
        spenders.push(decoder.read_fixed()?);
    }
    Ok(spenders)
}

/// Address usage key: `walletId(42) ‖ class(2) ‖ encodedAddress`.
/// The value is the first-use height.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressKey {
    pub wallet: WalletId,
    pub class: u16,
    pub address: String,
}

impl AddressKey {
    pub fn new(wallet: WalletId, class: u16, address: impl Into<String>) -> Self {
        Self {
            wallet,
            class,
            address: address.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(ADDRESS_KEY_MIN_LEN + self.address.len());
        encoder.write_bytes(self.wallet.as_bytes());
        encoder.write_u16_be(self.class);
        encoder.write_bytes(self.address.as_bytes());
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len("address key", bytes, ADDRESS_KEY_MIN_LEN)?;
        let mut decoder = Decoder::new(bytes);
        let wallet = read_wallet(&mut decoder)?;
        let class = decoder.read_u16_be()?;
        let address = String::from_utf8(decoder.rest().to_vec())
            .map_err(|_| DecodeError::InvalidData("address is not utf-8"))?;
        Ok(Self {
            wallet,
            class,
            address,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum LgKind {
    Staking = 0,
    Binding = 1,
}

impl LgKind {
    pub fn from_class(class: OutputClass) -> Option<Self> {
        match class {
            OutputClass::Staking => Some(Self::Staking),
            OutputClass::Binding => Some(Self::Binding),
            OutputClass::Standard => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum LgDirection {
    Deposit = 0,
    Withdraw = 1,
}

/// Staking/binding history key:
/// `walletId(42) ‖ binding(1) ‖ withdraw(1) ‖ txHash(32) [‖ height(8)]`.
///
/// Mined rows carry the height; unmined rows do not.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LgHistoryKey {
    pub wallet: WalletId,
    pub kind: LgKind,
    pub direction: LgDirection,
    pub tx_hash: Hash256,
    pub height: Option<u64>,
}

impl LgHistoryKey {
    pub fn prefix(wallet: &WalletId, kind: LgKind) -> Vec<u8> {
        let mut prefix = wallet.as_bytes().to_vec();
        prefix.push(kind as u8);
        prefix
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(LG_MINED_KEY_LEN);
        encoder.write_bytes(self.wallet.as_bytes());
        encoder.write_u8(self.kind as u8);
        encoder.write_u8(self.direction as u8);
        encoder.write_bytes(&self.tx_hash);
        if let Some(height) = self.height {
            encoder.write_u64_be(height);
        }
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len("lg history key", bytes, LG_UNMINED_KEY_LEN)?;
        let mut decoder = Decoder::new(bytes);
        let wallet = read_wallet(&mut decoder)?;
        let kind = match decoder.read_u8()? {
            0 => LgKind::Staking,
            1 => LgKind::Binding,
            _ => return Err(DecodeError::InvalidData("unknown lg history kind")),
        };
        let direction = match decoder.read_u8()? {
            0 => LgDirection::Deposit,
            1 => LgDirection::Withdraw,
            _ => return Err(DecodeError::InvalidData("unknown lg history direction")),
        };
        let tx_hash = decoder.read_fixed()?;
        let height = if decoder.is_empty() {
            None
        } else {
            require_len("mined lg history key", bytes, LG_MINED_KEY_LEN)?;
            Some(decoder.read_u64_be()?)
        };
        Ok(Self {
            wallet,
            kind,
            direction,
            tx_hash,
            height,
        })
    }

    pub fn unmined(self) -> Self {
        Self {
            height: None,
            ..self
        }
    }
}

pub type LgIndexes = SmallVec<[u32; 4]>;

/// Staking/binding history value: `count(4) ‖ index(4)×count`.
pub fn encode_lg_indexes(indexes: &[u32]) -> Vec<u8> {
    let mut encoder = Encoder::with_capacity(4 + indexes.len() * 4);
    encoder.write_u32_be(indexes.len() as u32);
    for index in indexes {
        encoder.write_u32_be(*index);
    }
    encoder.into_inner()
}

pub fn decode_lg_indexes(bytes: &[u8]) -> Result<LgIndexes, DecodeError> {
    require_len("lg history value", bytes, 4)?;
    let mut decoder = Decoder::new(bytes);
    let count = decoder.read_u32_be()? as usize;
    require_len("lg history value", bytes, 4 + count * 4)?;
    let mut indexes = LgIndexes::with_capacity(count);
    for _ in 0..count {
        indexes.push(decoder.read_u32_be()?);
    }
    Ok(indexes)
}

/// Per-height sync marker value: `blockHash(32) ‖ ts(8)`.
pub fn encode_sync_block(hash: &Hash256, timestamp: i64) -> Vec<u8> {
    let mut encoder = Encoder::with_capacity(SYNC_BLOCK_VALUE_LEN);
    encoder.write_bytes(hash);
    encoder.write_i64_be(timestamp);
    encoder.into_inner()
}

pub fn decode_sync_block(bytes: &[u8]) -> Result<(Hash256, i64), DecodeError> {
    require_len("sync block", bytes, SYNC_BLOCK_VALUE_LEN)?;
    let mut decoder = Decoder::new(bytes);
    let hash = decoder.read_fixed()?;
    let timestamp = decoder.read_i64_be()?;
    Ok((hash, timestamp))
}

/// Reverse-index key: a lookup prefix (a height or a tx hash) followed by the
/// primary key it points at. Reverse-index values are empty.
pub fn index_key(prefix: &[u8], primary: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + primary.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(primary);
    key
}

/// The primary key behind a reverse-index key with a `prefix_len` byte prefix.
pub fn index_target(bytes: &[u8], prefix_len: usize) -> Result<&[u8], DecodeError> {
    require_len("index key", bytes, prefix_len + 1)?;
    Ok(&bytes[prefix_len..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> WalletId {
        WalletId::from_array([b'w'; WALLET_ID_LEN])
    }

    fn location(height: u64) -> BlockLocation {
        BlockLocation::new(height, [0xbb; 32])
    }

    #[test]
    fn heights_sort_numerically() {
        let low = TxRecordKey::new([1; 32], location(255)).encode();
        let high = TxRecordKey::new([1; 32], location(256)).encode();
        assert!(low < high);
        assert!(height_key(9) < height_key(10));
    }

    #[test]
    fn key_layouts_are_byte_exact() {
        let incidence = Incidence::new([0xaa; 32], location(0x0102), 7);
        let bytes = incidence.encode();
        assert_eq!(bytes.len(), INCIDENCE_LEN);
        assert_eq!(&bytes[..32], &[0xaa; 32]);
        assert_eq!(&bytes[32..40], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        assert_eq!(&bytes[40..72], &[0xbb; 32]);
        assert_eq!(&bytes[72..], &[0, 0, 0, 7]);

        let unspent = UnspentKey::new(wallet(), OutPoint::new([3; 32], 1)).encode();
        assert_eq!(unspent.len(), UNSPENT_KEY_LEN);
        assert_eq!(&unspent[..WALLET_ID_LEN], wallet().as_bytes());
        assert_eq!(&unspent[74..], &[0, 0, 0, 1]);

        let lg = LgHistoryKey {
            wallet: wallet(),
            kind: LgKind::Binding,
            direction: LgDirection::Withdraw,
            tx_hash: [4; 32],
            height: Some(3),
        };
        let bytes = lg.encode();
        assert_eq!(bytes.len(), LG_MINED_KEY_LEN);
        assert_eq!(bytes[42], 1);
        assert_eq!(bytes[43], 1);
        assert_eq!(LgHistoryKey::decode(&bytes).expect("lg key"), lg);
        assert_eq!(lg.unmined().encode().len(), LG_UNMINED_KEY_LEN);
    }

    #[test]
    fn credit_value_carries_spender() {
        let mut value = CreditValue {
            amount: 5_000,
            flags: CreditFlags {
                spent: false,
                change: true,
                class: OutputClass::Staking,
            },
            maturity: 30,
            script_hash: [9; 32],
            spender: None,
        };
        assert_eq!(value.encode().len(), CREDIT_VALUE_LEN);
        assert_eq!(value.encode()[8], FLAG_CHANGE | (1 << CLASS_SHIFT));

        value.mark_spent(Incidence::new([5; 32], location(4), 2));
        let bytes = value.encode();
        assert_eq!(bytes.len(), SPENT_CREDIT_VALUE_LEN);
        assert_eq!(CreditValue::decode(&bytes).expect("credit"), value);
    }

    #[test]
    fn short_values_are_rejected() {
        let err = CreditValue::decode(&[0u8; CREDIT_VALUE_LEN - 1]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortRead {
                what: "credit value",
                expected: CREDIT_VALUE_LEN,
                actual: CREDIT_VALUE_LEN - 1,
            }
        );

        // spent flag set but no spender appended
        let mut truncated = vec![0u8; CREDIT_VALUE_LEN];
        truncated[8] = FLAG_SPENT;
        assert!(matches!(
            CreditValue::decode(&truncated),
            Err(DecodeError::ShortRead { .. })
        ));

        assert!(matches!(
            DebitValue::decode(&[0u8; 83]),
            Err(DecodeError::ShortRead { .. })
        ));
        assert!(matches!(
            UnspentKey::decode(&[0u8; 77]),
            Err(DecodeError::ShortRead { .. })
        ));
        assert!(matches!(
            decode_height(&[0u8; 7]),
            Err(DecodeError::ShortRead { .. })
        ));

        let mut block = BlockRecord::new([1; 32], 10);
        block.tx_hashes.push([2; 32]);
        let bytes = block.encode();
        assert!(matches!(
            BlockRecord::decode(&bytes[..bytes.len() - 1]),
            Err(DecodeError::ShortRead { .. })
        ));
        assert_eq!(BlockRecord::decode(&bytes).expect("block"), block);

        let lg = encode_lg_indexes(&[1, 2, 3]);
        assert!(decode_lg_indexes(&lg[..lg.len() - 4]).is_err());
        assert_eq!(decode_lg_indexes(&lg).expect("lg").as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn spender_list_must_be_whole_hashes() {
        let list = encode_spenders(&[[1; 32], [2; 32]]);
        assert_eq!(decode_spenders(&list).expect("spenders").len(), 2);
        assert!(decode_spenders(&list[..40]).is_err());
        assert!(decode_spenders(&[]).is_err());
    }

    #[test]
    fn index_keys_group_by_prefix() {
        let lg = LgHistoryKey {
            wallet: wallet(),
            kind: LgKind::Binding,
            direction: LgDirection::Deposit,
            tx_hash: [4; 32],
            height: Some(12),
        }
        .encode();
        let key = index_key(&height_key(12), &lg);
        assert!(key.starts_with(&height_key(12)));
        assert!(key < index_key(&height_key(13), &lg));
        assert_eq!(index_target(&key, 8).expect("target"), lg.as_slice());
        assert!(matches!(
            index_target(&height_key(12), 8),
            Err(DecodeError::ShortRead { .. })
        ));
    }

    #[test]
    fn invalid_class_bits_fail() {
        assert!(CreditFlags::from_byte(0x0c).is_err());
        let flags = CreditFlags::from_byte(FLAG_SPENT | (2 << CLASS_SHIFT)).expect("flags");
        assert!(flags.spent);
        assert_eq!(flags.class, OutputClass::Binding);
    }
}
