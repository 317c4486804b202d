//! Receipt signing key hierarchy.
//!
//! One process-wide anchor secret (the ledger writer's Ed25519 seed) is the
//! HKDF-SHA-256 master. Each receipt kind signs with its own subkey, derived
//! with an empty salt and a distinct info string, so a timestamp receipt
//! signature can never be replayed as a work-proof receipt or vice versa.
//!
//! Receipts are signed over the canonical JSON of the payload (the receipt
//! object minus its `signature` field). A third party re-renders the same
//! canonical bytes and verifies against the published public key; nothing in
//! a response is needed beyond the payload and `/key`.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::canonical::to_canonical_bytes;
use crate::constants::{TIMESTAMP_RECEIPT_CONTEXT, WORK_PROOF_CONTEXT};

/// Errors from loading the anchor secret.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The secret did not decode as base58.
    #[error("anchor secret is not valid base58")]
    NotBase58,

    /// The decoded secret is neither a 32-byte seed nor a 64-byte keypair.
    #[error("anchor secret decodes to {len} bytes, expected 32 or 64")]
    BadLength {
        /// Decoded length.
        len: usize,
    },
}

/// The process-wide anchor secret.
///
/// Owns the 32-byte Ed25519 seed used both as the ledger writer key and as
/// the HKDF input key material for the receipt subkeys.
pub struct AnchorSecret {
    seed: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for AnchorSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorSecret").field("seed", &"<redacted>").finish()
    }
}

impl AnchorSecret {
    /// Loads the secret from its base58 encoding.
    ///
    /// Accepts a bare 32-byte seed or a 64-byte keypair (seed followed by
    /// public key); only the first 32 bytes are retained.
    ///
    /// # Errors
    ///
    /// Fails on malformed base58 or an unexpected decoded length.
    pub fn from_base58(encoded: &str) -> Result<Self, KeyError> {
        let decoded = Zeroizing::new(
            bs58::decode(encoded.trim())
                .into_vec()
                .map_err(|_| KeyError::NotBase58)?,
        );
        if decoded.len() != 32 && decoded.len() != 64 {
            return Err(KeyError::BadLength { len: decoded.len() });
        }
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&decoded[..32]);
        Ok(Self { seed })
    }

    /// Builds the secret directly from a seed (test key material).
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            seed: Zeroizing::new(seed),
        }
    }

    /// The ledger writer's signing key.
    #[must_use]
    pub fn writer_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.seed)
    }

    /// The ledger writer's address in base58.
    #[must_use]
    pub fn writer_address(&self) -> String {
        bs58::encode(self.writer_key().verifying_key().to_bytes()).into_string()
    }

    /// Derives the receipt signing hierarchy.
    #[must_use]
    pub fn receipt_signer(&self) -> ReceiptSigner {
        ReceiptSigner {
            timestamp: ReceiptKey::derive(&self.seed, TIMESTAMP_RECEIPT_CONTEXT),
            work_proof: ReceiptKey::derive(&self.seed, WORK_PROOF_CONTEXT),
        }
    }
}

/// A derived subkey bound to one signing context.
pub struct ReceiptKey {
    signing_key: SigningKey,
    context: &'static str,
}

impl ReceiptKey {
    fn derive(master: &[u8; 32], context: &'static str) -> Self {
        let hk = Hkdf::<Sha256>::new(None, master);
        let mut okm = Zeroizing::new([0u8; 32]);
        // 32 bytes from HKDF-SHA-256 can never exceed the expand limit.
        hk.expand(context.as_bytes(), okm.as_mut_slice())
            .expect("32-byte HKDF expansion");
        Self {
            signing_key: SigningKey::from_bytes(&okm),
            context,
        }
    }

    /// The HKDF info string this key was derived under.
    #[must_use]
    pub const fn context(&self) -> &'static str {
        self.context
    }

    /// Raw public key, hex-encoded.
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Raw public key, base58-encoded.
    #[must_use]
    pub fn public_key_base58(&self) -> String {
        bs58::encode(self.signing_key.verifying_key().to_bytes()).into_string()
    }

    /// Signs the canonical JSON rendering of `payload`, returning the
    /// signature hex-encoded.
    #[must_use]
    pub fn sign_value(&self, payload: &Value) -> String {
        let signature = self.signing_key.sign(&to_canonical_bytes(payload));
        hex::encode(signature.to_bytes())
    }
}

/// The two receipt subkeys.
pub struct ReceiptSigner {
    /// Signs timestamp and anchor receipts.
    pub timestamp: ReceiptKey,

    /// Signs work-proof receipts.
    pub work_proof: ReceiptKey,
}

/// Verifies a receipt signature the way a third party would: re-render the
/// payload canonically and check against a published public key.
#[must_use]
pub fn verify_receipt_signature(public_key_hex: &str, payload: &Value, signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_array) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    verifying_key
        .verify(&to_canonical_bytes(payload), &Signature::from_bytes(&sig_array))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn test_secret() -> AnchorSecret {
        AnchorSecret::from_seed([42u8; 32])
    }

    #[test]
    fn loads_32_byte_seed() {
        let encoded = bs58::encode([1u8; 32]).into_string();
        let secret = AnchorSecret::from_base58(&encoded).unwrap();
        assert_eq!(secret.writer_key().to_bytes(), [1u8; 32]);
    }

    #[test]
    fn loads_64_byte_keypair() {
        let seed = [3u8; 32];
        let public = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
        let mut keypair = Vec::new();
        keypair.extend_from_slice(&seed);
        keypair.extend_from_slice(&public);
        let encoded = bs58::encode(&keypair).into_string();

        let secret = AnchorSecret::from_base58(&encoded).unwrap();
        assert_eq!(secret.writer_key().to_bytes(), seed);
    }

    #[test]
    fn rejects_bad_encodings() {
        assert_eq!(
            AnchorSecret::from_base58("0OIl").unwrap_err(),
            KeyError::NotBase58
        );
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(matches!(
            AnchorSecret::from_base58(&short).unwrap_err(),
            KeyError::BadLength { len: 16 }
        ));
    }

    #[test]
    fn subkeys_are_separated() {
        let signer = test_secret().receipt_signer();
        assert_ne!(
            signer.timestamp.public_key_hex(),
            signer.work_proof.public_key_hex()
        );
        // And neither equals the writer key.
        let writer_hex = hex::encode(test_secret().writer_key().verifying_key().to_bytes());
        assert_ne!(signer.timestamp.public_key_hex(), writer_hex);
        assert_ne!(signer.work_proof.public_key_hex(), writer_hex);
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = test_secret().receipt_signer();
        let b = test_secret().receipt_signer();
        assert_eq!(a.timestamp.public_key_hex(), b.timestamp.public_key_hex());
        assert_eq!(a.work_proof.public_key_base58(), b.work_proof.public_key_base58());
    }

    #[test]
    fn signature_verifies_over_canonical_json() {
        let signer = test_secret().receipt_signer();
        let payload = json!({"type": "timestamp", "hash": "ab", "utc": 5});
        let signature = signer.timestamp.sign_value(&payload);

        // Key order in the reconstructed payload does not matter.
        let reordered = json!({"utc": 5, "hash": "ab", "type": "timestamp"});
        assert!(verify_receipt_signature(
            &signer.timestamp.public_key_hex(),
            &reordered,
            &signature
        ));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let signer = test_secret().receipt_signer();
        let payload = json!({"type": "timestamp", "hash": "ab", "utc": 5});
        let signature = signer.timestamp.sign_value(&payload);

        let tampered = json!({"type": "timestamp", "hash": "ab", "utc": 6});
        assert!(!verify_receipt_signature(
            &signer.timestamp.public_key_hex(),
            &tampered,
            &signature
        ));
    }

    #[test]
    fn cross_context_signatures_fail() {
        let signer = test_secret().receipt_signer();
        let payload = json!({"type": "work_proof", "beats_computed": 10});
        let signature = signer.work_proof.sign_value(&payload);
        assert!(!verify_receipt_signature(
            &signer.timestamp.public_key_hex(),
            &payload,
            &signature
        ));
    }

    #[test]
    fn contexts_are_published_strings() {
        let signer = test_secret().receipt_signer();
        assert_eq!(
            signer.timestamp.context(),
            "provenonce:beats:timestamp-receipt:v1"
        );
        assert_eq!(signer.work_proof.context(), "provenonce:beats:work-proof:v1");
    }
}
