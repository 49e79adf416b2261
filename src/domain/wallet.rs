//! Profile wallets
//!
//! Deterministic keypair derivation from a BIP-39 seed phrase. Keys live only
//! in memory; nothing in this module writes them anywhere.

use std::fmt;

use ethers::signers::{coins_bip39::English, LocalWallet, MnemonicBuilder, Signer};
use ethers::types::Address;
use ethers::utils::hex;
use thiserror::Error;

/// Standard Ethereum derivation path (first account)
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("Invalid seed phrase: {0}")]
    InvalidMnemonic(String),
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
}

/// Mnemonic read from the credential store. Redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedPhrase(String);

impl SeedPhrase {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self(phrase.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }
}

impl fmt::Debug for SeedPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeedPhrase({} words)", self.word_count())
    }
}

/// Keypair owned by the profile currently being processed
#[derive(Clone)]
pub struct Wallet {
    signer: LocalWallet,
}

impl Wallet {
    /// Derive the wallet at [`DEFAULT_DERIVATION_PATH`]
    pub fn from_seed_phrase(seed: &SeedPhrase) -> Result<Self, DerivationError> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(seed.expose().trim())
            .derivation_path(DEFAULT_DERIVATION_PATH)
            .map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))?
            .build()
            .map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))?;

        Ok(Self { signer })
    }

    /// Load from a raw hex private key (with or without 0x prefix)
    pub fn from_private_key(key: &str) -> Result<Self, DerivationError> {
        let signer: LocalWallet = key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|e: ethers::signers::WalletError| {
                DerivationError::InvalidPrivateKey(e.to_string())
            })?;

        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Hex-encoded private key, 0x-prefixed
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.signer().to_bytes()))
    }

    /// Signer bound to a specific chain (EIP-155 replay protection)
    pub fn signer_for_chain(&self, chain_id: u64) -> LocalWallet {
        self.signer.clone().with_chain_id(chain_id)
    }

    pub fn signer(&self) -> &LocalWallet {
        &self.signer
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Wallet {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    const HARDHAT_MNEMONIC: &str = "test test test test test test test test test test test junk";

    #[test]
    fn test_derivation_is_deterministic() {
        let seed = SeedPhrase::new(HARDHAT_MNEMONIC);
        let first = Wallet::from_seed_phrase(&seed).unwrap();
        let second = Wallet::from_seed_phrase(&seed).unwrap();

        assert_eq!(first.address(), second.address());
        assert_eq!(first.private_key_hex(), second.private_key_hex());
    }

    #[test]
    fn test_known_vector() {
        let wallet = Wallet::from_seed_phrase(&SeedPhrase::new(HARDHAT_MNEMONIC)).unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();

        assert_eq!(wallet.address(), expected);
        assert_eq!(
            wallet.private_key_hex(),
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        );
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let padded = SeedPhrase::new(format!("  {}\n", HARDHAT_MNEMONIC));
        let plain = SeedPhrase::new(HARDHAT_MNEMONIC);

        assert_eq!(
            Wallet::from_seed_phrase(&padded).unwrap().address(),
            Wallet::from_seed_phrase(&plain).unwrap().address()
        );
    }

    #[test]
    fn test_malformed_seed_rejected() {
        let result = Wallet::from_seed_phrase(&SeedPhrase::new("definitely not a mnemonic"));
        assert!(matches!(result, Err(DerivationError::InvalidMnemonic(_))));
    }

    #[test]
    fn test_private_key_roundtrip() {
        let wallet = Wallet::from_seed_phrase(&SeedPhrase::new(HARDHAT_MNEMONIC)).unwrap();
        let restored = Wallet::from_private_key(&wallet.private_key_hex()).unwrap();
        assert_eq!(wallet, restored);
    }

    #[test]
    fn test_private_key_format() {
        let wallet = Wallet::from_seed_phrase(&SeedPhrase::new(HARDHAT_MNEMONIC)).unwrap();
        let re = Regex::new(r"^0x[0-9a-f]{64}$").unwrap();
        assert!(re.is_match(&wallet.private_key_hex()));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let seed = SeedPhrase::new(HARDHAT_MNEMONIC);
        assert_eq!(format!("{:?}", seed), "SeedPhrase(12 words)");

        let wallet = Wallet::from_seed_phrase(&seed).unwrap();
        let debug = format!("{:?}", wallet);
        assert!(!debug.contains("ac0974bec39a17e3"));
        assert!(debug.contains("Wallet"));
    }
}
