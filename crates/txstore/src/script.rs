//! Contracts with the wallet's script classifier and key manager.
//!
//! Script parsing and address derivation happen outside the ledger; it only
//! sees the classification results through [`PkScript`] and resolves script
//! hashes to wallets through [`ScriptOwners`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use wledger_primitives::Hash256;

use crate::error::LedgerError;

pub const WALLET_ID_LEN: usize = 42;

/// Fixed-width wallet identifier as stored in every per-wallet key.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct WalletId([u8; WALLET_ID_LEN]);

impl WalletId {
    pub const fn from_array(raw: [u8; WALLET_ID_LEN]) -> Self {
        Self(raw)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        let raw: [u8; WALLET_ID_LEN] = bytes
            .try_into()
            .map_err(|_| LedgerError::InvalidWalletId)?;
        Ok(Self(raw))
    }

    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        if !raw.is_ascii() {
            return Err(LedgerError::InvalidWalletId);
        }
        Self::from_bytes(raw.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; WALLET_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletId({self})")
    }
}

pub type AddressClass = u16;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum OutputClass {
    Standard = 0,
    Staking = 1,
    Binding = 2,
}

impl OutputClass {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Standard),
            1 => Some(Self::Staking),
            2 => Some(Self::Binding),
            _ => None,
        }
    }

    pub fn is_lg(self) -> bool {
        !matches!(self, OutputClass::Standard)
    }
}

/// Classification of one output script, supplied by the wallet.
pub trait PkScript: Send + Sync + fmt::Debug {
    /// Confirmations required before the output can be spent or withdrawn.
    fn maturity(&self) -> u32;
    fn address_class(&self) -> AddressClass;
    fn std_script_address(&self) -> Hash256;
    /// Encoded address string recorded in the address-usage table.
    fn encoded_address(&self) -> String;
    fn is_staking(&self) -> bool;
    fn is_binding(&self) -> bool;

    fn output_class(&self) -> OutputClass {
        if self.is_staking() {
            OutputClass::Staking
        } else if self.is_binding() {
            OutputClass::Binding
        } else {
            OutputClass::Standard
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassifiedScript {
    pub script_hash: Hash256,
    pub address: String,
    pub address_class: AddressClass,
    pub maturity: u32,
    pub class: OutputClass,
}

impl ClassifiedScript {
    pub fn standard(script_hash: Hash256, address: impl Into<String>) -> Self {
        Self {
            script_hash,
            address: address.into(),
            address_class: 0,
            maturity: 0,
            class: OutputClass::Standard,
        }
    }

    pub fn staking(script_hash: Hash256, address: impl Into<String>, frozen_period: u32) -> Self {
        Self {
            script_hash,
            address: address.into(),
            address_class: 1,
            maturity: frozen_period,
            class: OutputClass::Staking,
        }
    }

    pub fn binding(script_hash: Hash256, address: impl Into<String>, maturity: u32) -> Self {
        Self {
            script_hash,
            address: address.into(),
            address_class: 2,
            maturity,
            class: OutputClass::Binding,
        }
    }
}

impl PkScript for ClassifiedScript {
    fn maturity(&self) -> u32 {
        self.maturity
    }

    fn address_class(&self) -> AddressClass {
        self.address_class
    }

    fn std_script_address(&self) -> Hash256 {
        self.script_hash
    }

    fn encoded_address(&self) -> String {
        self.address.clone()
    }

    fn is_staking(&self) -> bool {
        self.class == OutputClass::Staking
    }

    fn is_binding(&self) -> bool {
        self.class == OutputClass::Binding
    }
}

/// One wallet-relevant input or output of a transaction.
///
/// For outputs `index` is the output index; for inputs it is the input index
/// and `pk_script` classifies the previous output being spent.
#[derive(Clone, Debug)]
pub struct RelevantMeta {
    pub index: u32,
    pub pk_script: Arc<dyn PkScript>,
    pub wallet_id: WalletId,
    pub is_change: bool,
}

impl RelevantMeta {
    pub fn new(index: u32, pk_script: Arc<dyn PkScript>, wallet_id: WalletId) -> Self {
        Self {
            index,
            pk_script,
            wallet_id,
            is_change: false,
        }
    }

    pub fn change(mut self) -> Self {
        self.is_change = true;
        self
    }
}

/// Resolves the wallet that owns a script hash.
pub trait ScriptOwners: Send + Sync {
    fn wallet_of(&self, script_hash: &Hash256) -> Option<WalletId>;
}

/// The script-hash set of one wallet being decommissioned.
pub trait AddressManager {
    fn wallet_id(&self) -> WalletId;
    fn owns_script(&self, script_hash: &Hash256) -> bool;
}

/// In-memory script-hash to wallet map.
#[derive(Default)]
pub struct OwnerMap {
    inner: RwLock<HashMap<Hash256, WalletId>>,
}

impl OwnerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, script_hash: Hash256, wallet: WalletId) {
        if let Ok(mut guard) = self.inner.write() {
            guard.insert(script_hash, wallet);
        }
    }

    pub fn remove_wallet(&self, wallet: &WalletId) {
        if let Ok(mut guard) = self.inner.write() {
            guard.retain(|_, owner| owner != wallet);
        }
    }

    pub fn wallet_scripts(&self, wallet: &WalletId) -> WalletScripts {
        let scripts = match self.inner.read() {
            Ok(guard) => guard
                .iter()
                .filter(|(_, owner)| *owner == wallet)
                .map(|(script, _)| *script)
                .collect(),
            Err(_) => HashSet::new(),
        };
        WalletScripts {
            wallet: *wallet,
            scripts,
        }
    }
}

impl ScriptOwners for OwnerMap {
    fn wallet_of(&self, script_hash: &Hash256) -> Option<WalletId> {
        self.inner.read().ok()?.get(script_hash).copied()
    }
}

#[derive(Clone, Debug)]
pub struct WalletScripts {
    pub wallet: WalletId,
    pub scripts: HashSet<Hash256>,
}

impl AddressManager for WalletScripts {
    fn wallet_id(&self) -> WalletId {
        self.wallet
    }

    fn owns_script(&self, script_hash: &Hash256) -> bool {
        self.scripts.contains(script_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(tag: char) -> WalletId {
        WalletId::parse(&tag.to_string().repeat(WALLET_ID_LEN)).expect("wallet id")
    }

    #[test]
    fn wallet_id_must_be_42_bytes() {
        assert!(WalletId::parse("short").is_err());
        let id = wallet('a');
        assert_eq!(id.to_string().len(), WALLET_ID_LEN);
    }

    #[test]
    fn owner_map_partitions_scripts() {
        let owners = OwnerMap::new();
        owners.insert([1u8; 32], wallet('a'));
        owners.insert([2u8; 32], wallet('a'));
        owners.insert([3u8; 32], wallet('b'));

        let scripts = owners.wallet_scripts(&wallet('a'));
        assert!(scripts.owns_script(&[1u8; 32]));
        assert!(!scripts.owns_script(&[3u8; 32]));

        owners.remove_wallet(&wallet('a'));
        assert_eq!(owners.wallet_of(&[1u8; 32]), None);
        assert_eq!(owners.wallet_of(&[3u8; 32]), Some(wallet('b')));
    }

    #[test]
    fn output_class_follows_script_flags() {
        let staking = ClassifiedScript::staking([9u8; 32], "addr", 100);
        assert_eq!(staking.output_class(), OutputClass::Staking);
        assert!(staking.output_class().is_lg());
        let plain = ClassifiedScript::standard([9u8; 32], "addr");
        assert_eq!(plain.output_class(), OutputClass::Standard);
        assert_eq!(OutputClass::from_u8(3), None);
    }
}
