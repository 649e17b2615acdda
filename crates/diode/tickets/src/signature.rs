//! secp256k1 signatures over ticket digests

use alloy_primitives::{keccak256, Address, B256, U256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::{hash, TicketError};

/// An Ethereum style `(r, s, v)` signature with `v` in {27, 28}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketSignature {
    /// R scalar
    pub r: B256,
    /// S scalar
    pub s: B256,
    /// Recovery byte, 27 or 28
    pub v: u8,
}

impl TicketSignature {
    /// Build a signature from its three wire words, normalizing `v` to {27, 28}
    pub fn from_words(r: B256, s: B256, v: B256) -> Result<Self, TicketError> {
        let raw = hash::word_to_u256(&v);
        let v = match u8::try_from(raw) {
            Ok(v @ (0 | 1)) => v + 27,
            Ok(v @ (27 | 28)) => v,
            _ => return Err(TicketError::InvalidRecoveryId(raw)),
        };
        Ok(Self { r, s, v })
    }

    /// The three wire words `r, s, v`
    pub fn to_words(&self) -> [B256; 3] {
        [self.r, self.s, hash::word_from_u64(u64::from(self.v))]
    }

    /// Recover the signer address of `digest`
    ///
    /// High-`s` signatures are accepted and normalized the same way `ecrecover`
    /// treats them.
    pub fn recover(&self, digest: &B256) -> Result<Address, TicketError> {
        let mut recovery_id = match self.v {
            27 => RecoveryId::new(false, false),
            28 => RecoveryId::new(true, false),
            other => return Err(TicketError::InvalidRecoveryId(U256::from(other))),
        };

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(self.r.as_slice());
        bytes[32..].copy_from_slice(self.s.as_slice());
        let mut signature =
            Signature::from_slice(&bytes).map_err(|_| TicketError::InvalidSignature)?;

        if let Some(normalized) = signature.normalize_s() {
            signature = normalized;
            recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
        }

        let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
            .map_err(|_| TicketError::InvalidSignature)?;
        Ok(public_key_address(&key))
    }
}

/// Ethereum address of a secp256k1 public key
pub fn public_key_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Signs ticket digests with a device or client key
#[derive(Clone)]
pub struct TicketSigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for TicketSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketSigner").field("address", &self.address).finish_non_exhaustive()
    }
}

impl TicketSigner {
    /// Load a signer from 32 secret key bytes
    pub fn from_slice(secret: &[u8]) -> Result<Self, TicketError> {
        let key = SigningKey::from_slice(secret).map_err(|_| TicketError::InvalidKey)?;
        let address = public_key_address(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Load a signer from a hex encoded secret key
    pub fn from_hex(secret: &str) -> Result<Self, TicketError> {
        let bytes = alloy_primitives::hex::decode(secret.trim())
            .map_err(|e| TicketError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Derive a deterministic signer from an arbitrary seed
    ///
    /// Used by simulations and tests; the secret is `keccak256(seed)`.
    pub fn from_seed(seed: impl AsRef<[u8]>) -> Result<Self, TicketError> {
        Self::from_slice(keccak256(seed.as_ref()).as_slice())
    }

    /// Address controlled by this signer
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest
    pub fn sign_digest(&self, digest: &B256) -> Result<TicketSignature, TicketError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|_| TicketError::InvalidSignature)?;
        let bytes = signature.to_bytes();

        Ok(TicketSignature {
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..]),
            v: 27 + u8::from(recovery_id.is_y_odd()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signer(seed: &str) -> TicketSigner {
        TicketSigner::from_seed(seed).unwrap()
    }

    #[test]
    fn test_sign_and_recover() {
        let signer = signer("device-1");
        let digest = keccak256(b"ticket");
        let signature = signer.sign_digest(&digest).unwrap();

        assert!(signature.v == 27 || signature.v == 28);
        assert_eq!(signature.recover(&digest).unwrap(), signer.address());
    }

    #[test]
    fn test_known_key_address() {
        // Private key 1 maps to the well known generator address
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let signer = TicketSigner::from_slice(&secret).unwrap();

        assert_eq!(
            signer.address(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_v_normalization() {
        let r = B256::repeat_byte(1);
        let s = B256::repeat_byte(2);

        let sig = TicketSignature::from_words(r, s, hash::word_from_u64(1)).unwrap();
        assert_eq!(sig.v, 28);

        let sig = TicketSignature::from_words(r, s, hash::word_from_u64(27)).unwrap();
        assert_eq!(sig.v, 27);

        let err = TicketSignature::from_words(r, s, hash::word_from_u64(29)).unwrap_err();
        assert!(matches!(err, TicketError::InvalidRecoveryId(_)));
    }

    #[test]
    fn test_zero_signature_fails() {
        let sig = TicketSignature { r: B256::ZERO, s: B256::ZERO, v: 27 };
        assert_eq!(sig.recover(&B256::repeat_byte(9)), Err(TicketError::InvalidSignature));
    }

    #[test]
    fn test_high_s_is_normalized() {
        // secp256k1 group order
        let order = U256::from_str_radix(
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
            16,
        )
        .unwrap();

        let signer = signer("device-high-s");
        let digest = keccak256(b"malleable");
        let low = signer.sign_digest(&digest).unwrap();

        let high_s = order - U256::from_be_bytes(low.s.0);
        let high = TicketSignature {
            r: low.r,
            s: B256::from(high_s.to_be_bytes::<32>()),
            v: if low.v == 27 { 28 } else { 27 },
        };

        assert_eq!(high.recover(&digest).unwrap(), signer.address());
    }

    #[test]
    fn test_words_roundtrip() {
        let signature = signer("words").sign_digest(&keccak256(b"x")).unwrap();
        let [r, s, v] = signature.to_words();
        assert_eq!(TicketSignature::from_words(r, s, v).unwrap(), signature);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_perturbed_digest_changes_signer(byte in 0usize..32, flip in 1u8..=255) {
            let signer = signer("prop-device");
            let digest = keccak256(b"prop-ticket");
            let signature = signer.sign_digest(&digest).unwrap();

            let mut perturbed = digest;
            perturbed.0[byte] ^= flip;

            match signature.recover(&perturbed) {
                Ok(address) => prop_assert_ne!(address, signer.address()),
                Err(err) => prop_assert_eq!(err, TicketError::InvalidSignature),
            }
        }
    }
}
