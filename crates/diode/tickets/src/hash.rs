//! Fixed-width word encoding and ticket digests.
//!
//! Every field is one 32-byte big-endian word. Addresses sit right-aligned in
//! the low 20 bytes. Reordering or re-padding any word changes the digest and
//! breaks every signature made over it.

use alloy_primitives::{Address, B256, Keccak256, U256};

use crate::TicketError;

/// Hash the raw concatenation of `words` with keccak256
pub fn hash_words(words: &[B256]) -> B256 {
    let mut hasher = Keccak256::new();
    for word in words {
        hasher.update(word);
    }
    hasher.finalize()
}

/// Encode a `u64` as a right-aligned word
pub fn word_from_u64(value: u64) -> B256 {
    word_from_u256(U256::from(value))
}

/// Encode a `U256` as a big-endian word
pub fn word_from_u256(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// Encode an address right-aligned in a word
pub fn word_from_address(address: Address) -> B256 {
    address.into_word()
}

/// Decode a big-endian word
pub fn word_to_u256(word: &B256) -> U256 {
    U256::from_be_bytes(word.0)
}

/// Decode a block height word
pub fn word_to_height(word: &B256) -> Result<u64, TicketError> {
    let value = word_to_u256(word);
    u64::try_from(value).map_err(|_| TicketError::HeightOutOfRange(value))
}

/// Decode an address word, rejecting words with dirty upper bytes
pub fn word_to_address(word: &B256) -> Result<Address, TicketError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(TicketError::InvalidAddressWord(*word));
    }
    Ok(Address::from_word(*word))
}
