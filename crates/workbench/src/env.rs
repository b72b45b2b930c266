//! The chain snapshot file the sandbox boots from.

use std::{
    collections::BTreeMap,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use alloy_primitives::{
    Address,
    B256,
    U256,
    address,
    keccak256,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use tracing::{
    debug,
    info,
};

pub const DEFAULT_ACCOUNT: Address = address!("cd2a3d9f938e13cd947ec05abc7fe734df8dd826");
pub const DEFAULT_ACCOUNT_NAME: &str = "fellow-1";
/// 10^24 wei.
pub const DEFAULT_BALANCE: U256 = U256::from_limbs([0x1bce_cced_a100_0000, 0xd3c2, 0, 0]);
pub const DEFAULT_NONCE: u64 = 1430;
pub const DEFAULT_PKEY_SEED: &str = "cow";
pub const DEFAULT_DIFFICULTY: U256 = U256::from_limbs([0x0100, 0, 0, 0]);
pub const DEFAULT_GAS_LIMIT: u64 = 314_159_200;
pub const DEFAULT_GAS_PRICE: u128 = 600_000_000;
pub const CONTRACTS_FIELD: &str = "contracts";

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("Failed to access environment file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid environment file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level shape of the environment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub contracts: String,
    pub env: ChainEnvironment,
}

impl EnvironmentSnapshot {
    pub fn new(env: ChainEnvironment) -> Self {
        Self {
            contracts: CONTRACTS_FIELD.to_string(),
            env,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEnvironment {
    pub block: BlockParams,
    pub accounts: BTreeMap<Address, AccountSpec>,
}

impl ChainEnvironment {
    /// The account flagged `default`, if any.
    pub fn default_account(&self) -> Option<Address> {
        self.accounts
            .iter()
            .find(|(_, account)| account.default)
            .map(|(address, _)| *address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockParams {
    pub coinbase: Address,
    pub difficulty: U256,
    #[serde(deserialize_with = "number_or_string")]
    pub gas_limit: u64,
    #[serde(deserialize_with = "number_or_string")]
    pub gas_price: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSpec {
    pub name: String,
    pub balance: U256,
    #[serde(deserialize_with = "number_or_string")]
    pub nonce: u64,
    /// Seed the account's private key is derived from.
    pub pkey: String,
    #[serde(default)]
    pub default: bool,
}

impl AccountSpec {
    /// `keccak256(pkey)`.
    pub fn private_key(&self) -> B256 {
        keccak256(self.pkey.as_bytes())
    }
}

/// Inputs to [`ensure_environment`].
#[derive(Debug, Clone, Default)]
pub struct EnvironmentOptions {
    /// Replaces whatever is persisted.
    pub initial_state: Option<ChainEnvironment>,
    /// Funded account of a synthesized default environment.
    pub default_from: Option<Address>,
}

/// The environment written when nothing is persisted yet.
pub fn default_environment(from: Option<Address>) -> ChainEnvironment {
    let account = from.unwrap_or(DEFAULT_ACCOUNT);
    ChainEnvironment {
        block: BlockParams {
            coinbase: account,
            difficulty: DEFAULT_DIFFICULTY,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: DEFAULT_GAS_PRICE,
        },
        accounts: BTreeMap::from([(
            account,
            AccountSpec {
                name: DEFAULT_ACCOUNT_NAME.to_string(),
                balance: DEFAULT_BALANCE,
                nonce: DEFAULT_NONCE,
                pkey: DEFAULT_PKEY_SEED.to_string(),
                default: true,
            },
        )]),
    }
}

/// Makes sure a snapshot exists at `path`.
///
/// An `initial_state` always overwrites. Without one, an existing file is left
/// untouched and a missing one is synthesized from [`default_environment`].
pub fn ensure_environment(options: &EnvironmentOptions, path: &Path) -> Result<(), EnvironmentError> {
    if let Some(initial_state) = &options.initial_state {
        write_snapshot(path, &EnvironmentSnapshot::new(initial_state.clone()))?;
        info!(target: "workbench::env", path = %path.display(), "Wrote initial state");
        return Ok(());
    }

    if path.exists() {
        debug!(target: "workbench::env", path = %path.display(), "Environment already present");
        return Ok(());
    }

    let snapshot = EnvironmentSnapshot::new(default_environment(options.default_from));
    write_snapshot(path, &snapshot)?;
    info!(target: "workbench::env", path = %path.display(), "Wrote default environment");
    Ok(())
}

pub fn load_environment(path: &Path) -> Result<EnvironmentSnapshot, EnvironmentError> {
    let contents = fs::read_to_string(path).map_err(|source| {
        EnvironmentError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_snapshot(path: &Path, snapshot: &EnvironmentSnapshot) -> Result<(), EnvironmentError> {
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json).map_err(|source| {
        EnvironmentError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Accepts `1430` as well as `"1430"` or `"0x596"`.
fn number_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u128>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => u128::from(n),
        Raw::Text(text) => {
            let parsed = match text.strip_prefix("0x") {
                Some(hex) => u128::from_str_radix(hex, 16),
                None => text.parse(),
            };
            parsed.map_err(serde::de::Error::custom)?
        }
    };
    T::try_from(value).map_err(|_| serde::de::Error::custom(format!("{value} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_balance_is_10_pow_24() {
        assert_eq!(DEFAULT_BALANCE, U256::from(10).pow(U256::from(24)));
    }

    #[test]
    fn test_ensure_environment_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ethereum.json");

        ensure_environment(&EnvironmentOptions::default(), &path).unwrap();
        let first = fs::read(&path).unwrap();
        ensure_environment(&EnvironmentOptions::default(), &path).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);

        let snapshot = load_environment(&path).unwrap();
        assert_eq!(snapshot.contracts, "contracts");
        assert_eq!(snapshot.env.default_account(), Some(DEFAULT_ACCOUNT));
        let account = &snapshot.env.accounts[&DEFAULT_ACCOUNT];
        assert_eq!(account.name, "fellow-1");
        assert_eq!(account.nonce, 1430);
        assert_eq!(account.private_key(), keccak256("cow"));
        assert_eq!(snapshot.env.block.coinbase, DEFAULT_ACCOUNT);
        assert_eq!(snapshot.env.block.gas_limit, 314_159_200);
    }

    #[test]
    fn test_written_default_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ethereum.json");

        ensure_environment(&EnvironmentOptions::default(), &path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"gasLimit\": 314159200"));

        let snapshot = load_environment(&path).unwrap();
        assert_eq!(snapshot, EnvironmentSnapshot::new(default_environment(None)));
        assert_eq!(snapshot.env.block.gas_price, DEFAULT_GAS_PRICE);
    }

    #[test]
    fn test_plain_number_quantities_are_accepted() {
        let account: AccountSpec = serde_json::from_str(
            r#"{"name": "fellow-2", "balance": "1", "nonce": 7, "pkey": "dog"}"#,
        )
        .unwrap();
        assert_eq!(account.nonce, 7);
        assert!(!account.default);
    }

    #[test]
    fn test_existing_file_is_left_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ethereum.json");
        fs::write(&path, "{\"hand\": \"written\"}").unwrap();

        ensure_environment(&EnvironmentOptions::default(), &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"hand\": \"written\"}");
    }

    #[test]
    fn test_initial_state_always_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ethereum.json");
        ensure_environment(&EnvironmentOptions::default(), &path).unwrap();

        let other = Address::repeat_byte(0x42);
        let options = EnvironmentOptions {
            initial_state: Some(default_environment(Some(other))),
            default_from: None,
        };
        ensure_environment(&options, &path).unwrap();

        let snapshot = load_environment(&path).unwrap();
        assert_eq!(snapshot.env.default_account(), Some(other));
        assert!(!snapshot.env.accounts.contains_key(&DEFAULT_ACCOUNT));
    }

    #[test]
    fn test_default_from_funds_that_account() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ethereum.json");
        let from = Address::repeat_byte(0x11);

        let options = EnvironmentOptions {
            initial_state: None,
            default_from: Some(from),
        };
        ensure_environment(&options, &path).unwrap();

        let snapshot = load_environment(&path).unwrap();
        assert_eq!(snapshot.env.block.coinbase, from);
        assert_eq!(snapshot.env.accounts[&from].balance, DEFAULT_BALANCE);
    }

    #[test]
    fn test_loads_string_quantities() {
        let json = r#"{
            "contracts": "contracts",
            "env": {
                "block": {
                    "coinbase": "0xcd2a3d9f938e13cd947ec05abc7fe734df8dd826",
                    "difficulty": "0x0100",
                    "gasLimit": 314159200,
                    "gasPrice": "600000000"
                },
                "accounts": {
                    "0xcd2a3d9f938e13cd947ec05abc7fe734df8dd826": {
                        "name": "fellow-1",
                        "balance": "0xd3c21bcecceda1000000",
                        "nonce": "1430",
                        "pkey": "cow",
                        "default": true
                    }
                }
            }
        }"#;
        let snapshot: EnvironmentSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.env, default_environment(None));
    }
}
