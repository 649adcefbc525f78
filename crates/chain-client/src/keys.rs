//! Key backend: mnemonics, sr25519 key derivation, and SS58 addresses

use bip39::Mnemonic;
use creditcoin_core::{Address, AddressFormat, Keypair, KeypairError, Result};
use rand::RngCore;
use sp_core::crypto::{ByteArray, Ss58AddressFormat, Ss58Codec};
use sp_core::{sr25519, Pair};

/// Word counts accepted by BIP-39
pub const VALID_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// Cryptographic keypair library used by the SDK
pub trait KeyBackend: Send + Sync {
    /// Generate a fresh English BIP-39 phrase
    fn generate_mnemonic(&self, word_count: usize) -> Result<String>;

    fn derive_from_mnemonic(&self, phrase: &str, format: AddressFormat) -> Result<Keypair>;

    /// Accepts hex with or without `0x`: a 32-byte mini secret or a 64-byte secret key
    fn derive_from_private_key(&self, private_key: &str, format: AddressFormat)
        -> Result<Keypair>;

    /// Secret URI such as `//Alice` or `<phrase>//hard/soft`
    fn derive_from_uri(&self, suri: &str, format: AddressFormat) -> Result<Keypair>;

    /// Decode an SS58 address into its public key and format
    fn decode_address(&self, address: &str) -> Result<(Vec<u8>, AddressFormat)>;

    fn sign(&self, keypair: &Keypair, payload: &[u8]) -> Result<Vec<u8>>;

    /// True when `address` decodes and carries `format`. Never errors.
    fn validate_address(&self, address: &str, format: AddressFormat) -> bool {
        match self.decode_address(address) {
            Ok((_, decoded)) => decoded == format,
            Err(_) => false,
        }
    }
}

/// sr25519 backend over `sp-core` and `bip39`
#[derive(Debug, Clone, Copy, Default)]
pub struct Sr25519Backend;

impl Sr25519Backend {
    fn keypair_from_pair(pair: &sr25519::Pair, mnemonic: String, format: AddressFormat) -> Keypair {
        let public = pair.public();
        let address = public.to_ss58check_with_version(Ss58AddressFormat::custom(format.0));
        Keypair {
            mnemonic,
            private_key: pair.to_raw_vec(),
            public_key: public.to_raw_vec(),
            address: Address::new(address),
            address_format: format,
        }
    }

    fn pair_from_keypair(keypair: &Keypair) -> Result<sr25519::Pair> {
        sr25519::Pair::from_seed_slice(&keypair.private_key).map_err(|e| {
            KeypairError::InvalidPrivateKey(format!("{:?}", e)).into()
        })
    }
}

impl KeyBackend for Sr25519Backend {
    fn generate_mnemonic(&self, word_count: usize) -> Result<String> {
        if !VALID_WORD_COUNTS.contains(&word_count) {
            return Err(KeypairError::InvalidWordCount(word_count).into());
        }

        // 12 words <-> 16 bytes of entropy, 3 words per 4 bytes
        let mut entropy = vec![0u8; word_count / 3 * 4];
        rand::thread_rng().fill_bytes(&mut entropy);

        let mnemonic = Mnemonic::from_entropy(&entropy)
            .map_err(|e| KeypairError::InvalidMnemonic(e.to_string()))?;
        Ok(mnemonic.to_string())
    }

    fn derive_from_mnemonic(&self, phrase: &str, format: AddressFormat) -> Result<Keypair> {
        let words = phrase.split_whitespace().count();
        if !VALID_WORD_COUNTS.contains(&words) {
            return Err(KeypairError::InvalidWordCount(words).into());
        }

        let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let (pair, _seed) = sr25519::Pair::from_phrase(&normalized, None)
            .map_err(|e| KeypairError::InvalidMnemonic(format!("{:?}", e)))?;

        Ok(Self::keypair_from_pair(&pair, normalized, format))
    }

    fn derive_from_private_key(
        &self,
        private_key: &str,
        format: AddressFormat,
    ) -> Result<Keypair> {
        let trimmed = private_key.trim();
        let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(hex_str)
            .map_err(|e| KeypairError::InvalidPrivateKey(format!("not valid hex: {}", e)))?;

        if bytes.len() != 32 && bytes.len() != 64 {
            return Err(KeypairError::InvalidPrivateKey(format!(
                "expected 32 or 64 bytes, got {}",
                bytes.len()
            ))
            .into());
        }

        let pair = sr25519::Pair::from_seed_slice(&bytes)
            .map_err(|e| KeypairError::InvalidPrivateKey(format!("{:?}", e)))?;

        Ok(Self::keypair_from_pair(&pair, String::new(), format))
    }

    fn derive_from_uri(&self, suri: &str, format: AddressFormat) -> Result<Keypair> {
        let pair = sr25519::Pair::from_string(suri, None)
            .map_err(|e| KeypairError::InvalidUri(format!("{:?}", e)))?;

        Ok(Self::keypair_from_pair(&pair, String::new(), format))
    }

    fn decode_address(&self, address: &str) -> Result<(Vec<u8>, AddressFormat)> {
        let (public, version) = sr25519::Public::from_ss58check_with_version(address)
            .map_err(|e| KeypairError::InvalidAddress {
                address: address.to_string(),
                reason: format!("{:?}", e),
            })?;

        Ok((public.to_raw_vec(), AddressFormat(u16::from(version))))
    }

    fn sign(&self, keypair: &Keypair, payload: &[u8]) -> Result<Vec<u8>> {
        let pair = Self::pair_from_keypair(keypair)?;
        if pair.public().to_raw_vec() != keypair.public_key {
            return Err(KeypairError::InvalidPrivateKey(
                "private key does not match public key".into(),
            )
            .into());
        }

        let signature = pair.sign(payload);
        let bytes: &[u8] = signature.as_ref();
        Ok(bytes.to_vec())
    }
}
