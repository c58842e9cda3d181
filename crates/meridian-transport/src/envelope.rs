//! Canonical envelope encoding.
//!
//! The signed bytes of every envelope are exactly:
//!
//! ```text
//! 0x0A  varint(len(type_tag))  type_tag (UTF-8)
//! 0x12  varint(len(payload))   payload
//! ```
//!
//! This is the protobuf encoding of a two-field message with both
//! length-delimited fields always present. [`decode`] accepts only what
//! [`encode`] produces: both fields exactly once, in order, minimal varints,
//! no trailing bytes. A peer that re-encodes differently cannot produce bytes
//! that verify.

use meridian_types::{SignedEnvelope, WireEnvelope};

use crate::{Result, TransportError};

/// Field 1, wire type 2.
const TYPE_TAG_KEY: u8 = 0x0A;
/// Field 2, wire type 2.
const PAYLOAD_KEY: u8 = 0x12;
/// A `u64` varint never exceeds ten bytes.
const MAX_VARINT_LEN: usize = 10;

/// Encode `(type_tag, payload)` canonically.
pub fn encode(type_tag: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 2 * MAX_VARINT_LEN + type_tag.len() + payload.len());
    out.push(TYPE_TAG_KEY);
    write_varint(&mut out, type_tag.len() as u64);
    out.extend_from_slice(type_tag.as_bytes());
    out.push(PAYLOAD_KEY);
    write_varint(&mut out, payload.len() as u64);
    out.extend_from_slice(payload);
    out
}

/// Decode canonical bytes into `(type_tag, payload)`.
///
/// # Errors
///
/// Returns [`TransportError::MalformedEnvelope`] for anything [`encode`]
/// would not have produced.
pub fn decode(bytes: &[u8]) -> Result<(String, Vec<u8>)> {
    let mut reader = Reader { bytes, pos: 0 };

    reader.expect_key(TYPE_TAG_KEY, "type_tag")?;
    let tag = reader.length_delimited()?;
    let type_tag = std::str::from_utf8(tag)
        .map_err(|_| malformed("type_tag is not UTF-8"))?
        .to_string();

    reader.expect_key(PAYLOAD_KEY, "payload")?;
    let payload = reader.length_delimited()?.to_vec();

    if reader.pos != bytes.len() {
        return Err(malformed(format!(
            "{} trailing bytes",
            bytes.len() - reader.pos
        )));
    }
    Ok((type_tag, payload))
}

/// The form an envelope takes on a connection.
pub fn to_wire(signed: &SignedEnvelope) -> WireEnvelope {
    WireEnvelope {
        envelope: encode(&signed.type_tag, &signed.payload),
        signature: signed.signature.clone(),
    }
}

/// Strictly decode a received envelope. Does not check the signature.
pub fn from_wire(wire: &WireEnvelope) -> Result<SignedEnvelope> {
    let (type_tag, payload) = decode(&wire.envelope)?;
    Ok(SignedEnvelope {
        type_tag,
        payload,
        signature: wire.signature.clone(),
    })
}

fn malformed(reason: impl Into<String>) -> TransportError {
    TransportError::MalformedEnvelope(reason.into())
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn expect_key(&mut self, key: u8, field: &str) -> Result<()> {
        let Some(&found) = self.bytes.get(self.pos) else {
            return Err(malformed(format!("missing {field}")));
        };
        if found != key {
            return Err(match found {
                TYPE_TAG_KEY | PAYLOAD_KEY => {
                    malformed(format!("field key {found:#04x} out of order or repeated"))
                }
                other => malformed(format!("unknown field key {other:#04x}")),
            });
        }
        self.pos += 1;
        Ok(())
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self
                .bytes
                .get(self.pos)
                .ok_or_else(|| malformed("truncated varint"))?;
            self.pos += 1;

            let bits = u64::from(byte & 0x7F);
            if i == MAX_VARINT_LEN - 1 && bits > 1 {
                return Err(malformed("varint overflows u64"));
            }
            value |= bits << (7 * i);

            if byte & 0x80 == 0 {
                if i > 0 && byte == 0 {
                    return Err(malformed("non-minimal varint"));
                }
                return Ok(value);
            }
        }
        Err(malformed("overlong varint"))
    }

    fn length_delimited(&mut self) -> Result<&'a [u8]> {
        let len = self.varint()?;
        let remaining = self.bytes.len() - self.pos;
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= remaining)
            .ok_or_else(|| malformed(format!("length {len} exceeds {remaining} remaining bytes")))?;
        let field = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_layout() {
        let bytes = encode("ab", &[1, 2, 3]);
        assert_eq!(bytes, vec![0x0A, 0x02, b'a', b'b', 0x12, 0x03, 1, 2, 3]);
    }

    #[test]
    fn test_empty_fields_still_encoded() {
        let bytes = encode("", &[]);
        assert_eq!(bytes, vec![0x0A, 0x00, 0x12, 0x00]);
        let (tag, payload) = decode(&bytes).expect("decode");
        assert!(tag.is_empty());
        assert!(payload.is_empty());
    }

    #[test]
    fn test_long_payload_uses_multibyte_varint() {
        let payload = vec![0xAB; 300];
        let bytes = encode("t", &payload);
        // 300 = 0b10_0101100 -> 0xAC 0x02
        assert_eq!(&bytes[3..6], &[0x12, 0xAC, 0x02]);
        let (_, decoded) = decode(&bytes).expect("decode");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_rejects_duplicate_payload() {
        let mut bytes = encode("t", &[1]);
        bytes.extend_from_slice(&[0x12, 0x01, 2]);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_swapped_fields() {
        let bytes = vec![0x12, 0x01, 9, 0x0A, 0x01, b't'];
        let err = decode(&bytes).expect_err("swapped");
        assert!(err.to_string().contains("out of order"));
    }

    #[test]
    fn test_rejects_missing_payload() {
        let bytes = vec![0x0A, 0x01, b't'];
        let err = decode(&bytes).expect_err("missing");
        assert!(err.to_string().contains("missing payload"));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode("t", &[1, 2]);
        bytes.push(0);
        let err = decode(&bytes).expect_err("trailing");
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_rejects_non_minimal_varint() {
        // Length 1 written as 0x81 0x00.
        let bytes = vec![0x0A, 0x81, 0x00, b't', 0x12, 0x00];
        let err = decode(&bytes).expect_err("non-minimal");
        assert!(err.to_string().contains("non-minimal"));
    }

    #[test]
    fn test_rejects_overlong_varint() {
        let mut bytes = vec![0x0A];
        bytes.extend_from_slice(&[0xFF; 11]);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_length_past_end() {
        let bytes = vec![0x0A, 0x05, b't', 0x12, 0x00];
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_unknown_key_and_wire_type() {
        // Field 3, wire type 2.
        assert!(decode(&[0x1A, 0x00]).is_err());
        // Field 1, wire type 0.
        assert!(decode(&[0x08, 0x00, 0x12, 0x00]).is_err());
    }

    #[test]
    fn test_rejects_non_utf8_tag() {
        let bytes = vec![0x0A, 0x01, 0xFF, 0x12, 0x00];
        let err = decode(&bytes).expect_err("utf8");
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_wire_form_carries_exact_bytes() {
        let signed = SignedEnvelope {
            type_tag: "t".to_string(),
            payload: vec![4, 5],
            signature: meridian_types::Signature {
                signer: meridian_types::AccountAddress::default(),
                scheme: meridian_types::SignatureScheme::SchnorrPallasSha3,
                public_key: vec![1],
                signature: vec![2],
            },
        };
        let mut wire = to_wire(&signed);
        assert_eq!(wire.envelope, encode("t", &[4, 5]));
        assert_eq!(from_wire(&wire).expect("canonical"), signed);

        // Payload field repeated after a valid envelope.
        wire.envelope.extend_from_slice(&[0x12, 0x00]);
        assert!(matches!(from_wire(&wire), Err(TransportError::MalformedEnvelope(_))));
    }

    proptest! {
        /// Property: decode inverts encode.
        #[test]
        fn decode_inverts_encode(tag in ".{0,40}", payload in proptest::collection::vec(any::<u8>(), 0..600)) {
            let bytes = encode(&tag, &payload);
            let (decoded_tag, decoded_payload) = decode(&bytes).expect("canonical bytes decode");
            prop_assert_eq!(decoded_tag, tag);
            prop_assert_eq!(decoded_payload, payload);
        }

        /// Property: whatever decodes re-encodes to the same bytes.
        #[test]
        fn accepted_bytes_are_canonical(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            if let Ok((tag, payload)) = decode(&bytes) {
                prop_assert_eq!(encode(&tag, &payload), bytes);
            }
        }

        /// Property: appending anything to a valid envelope breaks it.
        #[test]
        fn suffix_is_rejected(payload in proptest::collection::vec(any::<u8>(), 0..64), extra in proptest::collection::vec(any::<u8>(), 1..8)) {
            let mut bytes = encode("meridian.v1.Test", &payload);
            bytes.extend_from_slice(&extra);
            prop_assert!(decode(&bytes).is_err());
        }
    }
}
