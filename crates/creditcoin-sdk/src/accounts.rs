//! Account creation and import

use creditcoin_core::{Keypair, Result};

use crate::CreditcoinClient;

impl CreditcoinClient {
    /// Fresh BIP-39 phrase of `word_count` words (12, 15, 18, 21 or 24)
    pub fn generate_mnemonic(&self, word_count: usize) -> Result<String> {
        self.keys.generate_mnemonic(word_count)
    }

    /// New account from a freshly generated mnemonic
    pub fn create_account(&self, word_count: usize) -> Result<Keypair> {
        let phrase = self.generate_mnemonic(word_count)?;
        let keypair = self.import_account_from_mnemonic(&phrase)?;
        tracing::info!(address = %keypair.address, words = word_count, "Created account");
        Ok(keypair)
    }

    pub fn import_account_from_mnemonic(&self, phrase: &str) -> Result<Keypair> {
        self.keys
            .derive_from_mnemonic(phrase, self.config.address_format)
    }

    /// Import from a hex secret; the resulting keypair carries no mnemonic
    pub fn import_account_from_private_key(&self, private_key: &str) -> Result<Keypair> {
        self.keys
            .derive_from_private_key(private_key, self.config.address_format)
    }

    /// Import from a secret URI such as `//Alice`
    pub fn import_account_from_uri(&self, suri: &str) -> Result<Keypair> {
        self.keys.derive_from_uri(suri, self.config.address_format)
    }

    /// True when `address` is a well-formed address in the configured format
    pub fn validate_address(&self, address: &str) -> bool {
        self.keys
            .validate_address(address, self.config.address_format)
    }
}
