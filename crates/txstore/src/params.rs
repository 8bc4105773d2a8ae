//! Ledger parameter presets.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Some(Self::Mainnet),
            "testnet" | "test" => Some(Self::Testnet),
            "regtest" => Some(Self::Regtest),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LedgerParams {
    pub network: Network,
    /// Confirmations before a coinbase output is spendable, regardless of its script.
    pub coinbase_maturity: u32,
    /// Minimum confirmations used when a caller does not pass its own.
    pub default_min_conf: u32,
}

pub fn ledger_params(network: Network) -> LedgerParams {
    match network {
        Network::Mainnet => LedgerParams {
            network,
            coinbase_maturity: 1000,
            default_min_conf: 1,
        },
        Network::Testnet => LedgerParams {
            network,
            coinbase_maturity: 1000,
            default_min_conf: 1,
        },
        Network::Regtest => LedgerParams {
            network,
            coinbase_maturity: 10,
            default_min_conf: 1,
        },
    }
}

impl Default for LedgerParams {
    fn default() -> Self {
        ledger_params(Network::Mainnet)
    }
}
