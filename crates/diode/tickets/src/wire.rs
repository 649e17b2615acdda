//! Wire format v1: flat arrays of 32-byte words

use alloy_primitives::{hex, B256};

use crate::{
    hash::{word_to_address, word_to_height, word_to_u256},
    ConnectionTicket, DeviceTicket, Ticket, TicketAnchor, TicketError, TicketKind, TicketSignature,
    TrafficTicket,
};

/// Version of the word layouts in this module
pub const WIRE_VERSION: u8 = 1;

fn decode_anchor(words: &[B256]) -> Result<TicketAnchor, TicketError> {
    Ok(TicketAnchor {
        block_height: word_to_height(&words[0])?,
        fleet: word_to_address(&words[1])?,
        node: word_to_address(&words[2])?,
    })
}

/// Decode exactly one ticket of `kind` from `words`
pub fn decode_ticket(kind: TicketKind, words: &[B256]) -> Result<Ticket, TicketError> {
    let expected = kind.word_count();
    if words.len() != expected {
        return Err(TicketError::Truncated { expected, actual: words.len() });
    }

    let anchor = decode_anchor(words)?;
    let ticket = match kind {
        TicketKind::Device => Ticket::Device(DeviceTicket {
            anchor,
            total_connections: word_to_u256(&words[3]),
            total_bytes: word_to_u256(&words[4]),
            local_address: words[5],
            signature: TicketSignature::from_words(words[6], words[7], words[8])?,
        }),
        TicketKind::Connection => Ticket::Connection(ConnectionTicket {
            anchor,
            total_connections: word_to_u256(&words[3]),
            local_address: words[4],
            signature: TicketSignature::from_words(words[5], words[6], words[7])?,
        }),
        TicketKind::Traffic => Ticket::Traffic(TrafficTicket {
            anchor,
            total_bytes: word_to_u256(&words[3]),
            destination_id: words[4],
            device_signature: TicketSignature::from_words(words[5], words[6], words[7])?,
            client_signature: TicketSignature::from_words(words[8], words[9], words[10])?,
        }),
    };
    Ok(ticket)
}

/// Split a batch into back-to-back tickets of `kind` and decode each one
///
/// Every chunk is decoded independently; a trailing partial chunk comes back
/// as [`TicketError::Truncated`] without affecting the chunks before it.
pub fn decode_batch(kind: TicketKind, words: &[B256]) -> Vec<Result<Ticket, TicketError>> {
    words.chunks(kind.word_count()).map(|chunk| decode_ticket(kind, chunk)).collect()
}

/// Concatenate the wire words of `tickets`
pub fn encode_batch<'a>(tickets: impl IntoIterator<Item = &'a Ticket>) -> Vec<B256> {
    tickets.into_iter().flat_map(Ticket::to_words).collect()
}

/// Parse one hex word, left-padding values shorter than 32 bytes
pub fn parse_word(input: &str) -> Result<B256, TicketError> {
    let digits = input.trim();
    let digits = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits);
    if digits.len() > 64 {
        return Err(TicketError::InvalidHex(input.to_string()));
    }

    let padded = format!("{digits:0>64}");
    let bytes = hex::decode(&padded).map_err(|_| TicketError::InvalidHex(input.to_string()))?;
    Ok(B256::from_slice(&bytes))
}

/// Parse a list of hex words
pub fn parse_words<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<B256>, TicketError> {
    inputs.iter().map(|s| parse_word(s.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TicketSigner;
    use alloy_primitives::{keccak256, Address, U256};
    use proptest::prelude::*;

    fn connection(total: u64) -> Ticket {
        let device = TicketSigner::from_seed("wire-device").unwrap();
        let anchor = TicketAnchor::new(7, Address::repeat_byte(1), Address::repeat_byte(2));
        ConnectionTicket::sign(anchor, keccak256(b"b7"), U256::from(total), B256::ZERO, &device)
            .unwrap()
            .into()
    }

    #[test]
    fn test_batch_decodes_in_order() {
        let tickets = [connection(1), connection(2)];
        let words = encode_batch(&tickets);
        assert_eq!(words.len(), 16);

        let decoded = decode_batch(TicketKind::Connection, &words);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].as_ref().unwrap(), &tickets[0]);
        assert_eq!(decoded[1].as_ref().unwrap(), &tickets[1]);
    }

    #[test]
    fn test_trailing_chunk_is_isolated() {
        let mut words = connection(1).to_words();
        words.extend_from_slice(&[B256::ZERO; 3]);

        let decoded = decode_batch(TicketKind::Connection, &words);
        assert!(decoded[0].is_ok());
        assert_eq!(decoded[1], Err(TicketError::Truncated { expected: 8, actual: 3 }));
    }

    #[test]
    fn test_dirty_fleet_word_rejected() {
        let mut words = connection(1).to_words();
        words[1] = B256::repeat_byte(0xee);

        let result = decode_ticket(TicketKind::Connection, &words);
        assert!(matches!(result, Err(TicketError::InvalidAddressWord(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_flipped_field_breaks_device_recovery(word in 1usize..5, byte in 0usize..32, flip in 1u8..=255) {
            let device = TicketSigner::from_seed("wire-device").unwrap().address();
            let mut words = connection(3).to_words();
            words[word].0[byte] ^= flip;

            // Address words with dirty padding never decode
            if let Ok(ticket) = decode_ticket(TicketKind::Connection, &words) {
                prop_assert_ne!(ticket.recover_device(keccak256(b"b7")).ok(), Some(device));
            }
        }
    }

    #[test]
    fn test_parse_word_pads() {
        let word = parse_word("0xff").unwrap();
        assert_eq!(word[31], 0xff);
        assert_eq!(&word[..31], &[0u8; 31]);

        assert_eq!(parse_word("1").unwrap()[31], 1);
        assert!(parse_word("0xzz").is_err());
        assert!(parse_word(&"f".repeat(65)).is_err());
    }
}
