//! MsgPack codec using `rmp-serde`.
//!
//! Structs are encoded with `to_vec_named` (map format, field names on
//! the wire) rather than `to_vec` (positional arrays). Stored documents
//! outlive the code that wrote them; the map format keeps old documents
//! decodable when a record type grows a field.
//!
//! # Example
//!
//! ```
//! use callwire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Payload {
//!     number: i64,
//! }
//!
//! let payload = Payload { number: 42 };
//! let encoded = MsgPackCodec::encode(&payload).unwrap();
//! let decoded: Payload = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, payload);
//! ```

use crate::error::Result;

/// MessagePack codec for structured data.
///
/// Uses `rmp_serde::to_vec_named` so structs serialize as maps keyed by
/// field name.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be deserialized to type `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Record {
        author_id: String,
        title: String,
        content: String,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Record {
            author_id: "a-17".to_string(),
            title: "first post".to_string(),
            content: "hello".to_string(),
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Record = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_struct_encodes_as_map() {
        let record = Record {
            author_id: "a".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
        };

        let encoded = MsgPackCodec::encode(&record).unwrap();

        // fixmap with 3 entries is 0x83; positional encoding would be a
        // fixarray (0x93) and would break forward-compatible decoding.
        assert_eq!(encoded[0], 0x83, "expected map format, got {:02X}", encoded[0]);
    }

    #[test]
    fn test_encode_decode_primitives() {
        let n: i64 = -12345;
        let encoded = MsgPackCodec::encode(&n).unwrap();
        let decoded: i64 = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, n);

        let f: f64 = 2.5;
        let encoded = MsgPackCodec::encode(&f).unwrap();
        let decoded: f64 = MsgPackCodec::decode(&encoded).unwrap();
        assert!((decoded - f).abs() < f64::EPSILON);
    }

    #[test]
    fn test_encode_decode_unit() {
        // The list operation's request payload is `()`.
        let encoded = MsgPackCodec::encode(&()).unwrap();
        let _: () = MsgPackCodec::decode(&encoded).unwrap();
    }

    #[test]
    fn test_encode_decode_option() {
        let some: Option<String> = Some("id".to_string());
        let encoded = MsgPackCodec::encode(&some).unwrap();
        let decoded: Option<String> = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, some);

        let none: Option<String> = None;
        let encoded = MsgPackCodec::encode(&none).unwrap();
        let decoded: Option<String> = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, none);
    }

    #[test]
    fn test_decode_error_on_truncated_data() {
        let record = Record {
            author_id: "a".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
        };
        let encoded = MsgPackCodec::encode(&record).unwrap();

        let result: Result<Record> = MsgPackCodec::decode(&encoded[..encoded.len() / 2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_error_on_wrong_shape() {
        let encoded = MsgPackCodec::encode(&"just a string").unwrap();
        let result: Result<Record> = MsgPackCodec::decode(&encoded);
        assert!(result.is_err());
    }

    #[test]
    fn test_binary_payload() {
        let data: Vec<u8> = vec![0x01, 0x02, 0x03, 0x04, 0x05];
        let encoded = MsgPackCodec::encode(&serde_bytes::Bytes::new(&data)).unwrap();

        // bin8 format marker.
        assert_eq!(encoded[0], 0xc4);

        let decoded: serde_bytes::ByteBuf = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), &data);
    }
}
