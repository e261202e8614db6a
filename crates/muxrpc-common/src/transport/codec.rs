use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;

/// Registered tag of the MessagePack codec (the default).
pub const MSGPACK_TYPE: &str = "application/msgpack";

/// Registered tag of the JSON codec.
pub const JSON_TYPE: &str = "application/json";

/// Codec for encoding/decoding message headers and bodies.
///
/// The enum is the codec registry: the handshake carries a string tag and
/// [`BodyCodec::from_type`] resolves it. Both codecs are self-describing, so
/// a body can be decoded into a discard slot without knowing its real type.
///
/// MessagePack encodes with named fields (`to_vec_named`) so that struct
/// bodies survive field reordering, mirroring the JSON behavior.
///
/// # Example
///
/// ```
/// use muxrpc_common::BodyCodec;
///
/// let codec = BodyCodec::from_type("application/json").unwrap();
/// let encoded = codec.encode(&(3, 4)).unwrap();
/// let decoded: (i32, i32) = codec.decode(&encoded).unwrap();
/// assert_eq!(decoded, (3, 4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyCodec {
    /// Binary self-describing encoding (the default)
    #[default]
    Msgpack,
    /// Text encoding, also used for the handshake frame
    Json,
}

impl BodyCodec {
    /// Looks up a codec by its registered tag. Returns `None` for unknown
    /// tags; the server closes the connection in that case.
    pub fn from_type(codec_type: &str) -> Option<Self> {
        match codec_type {
            MSGPACK_TYPE => Some(BodyCodec::Msgpack),
            JSON_TYPE => Some(BodyCodec::Json),
            _ => None,
        }
    }

    /// The registered tag for this codec.
    pub fn type_tag(&self) -> &'static str {
        match self {
            BodyCodec::Msgpack => MSGPACK_TYPE,
            BodyCodec::Json => JSON_TYPE,
        }
    }

    /// Encode a value to bytes.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            BodyCodec::Msgpack => Ok(rmp_serde::encode::to_vec_named(value)?),
            BodyCodec::Json => Ok(serde_json::to_vec(value)?),
        }
    }

    /// Decode a value from bytes.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            BodyCodec::Msgpack => Ok(rmp_serde::decode::from_slice(data)?),
            BodyCodec::Json => Ok(serde_json::from_slice(data)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Args {
        num1: i64,
        num2: i64,
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!(BodyCodec::from_type(MSGPACK_TYPE), Some(BodyCodec::Msgpack));
        assert_eq!(BodyCodec::from_type(JSON_TYPE), Some(BodyCodec::Json));
        assert_eq!(BodyCodec::from_type("application/gob"), None);
        assert_eq!(BodyCodec::default().type_tag(), MSGPACK_TYPE);
    }

    #[test]
    fn test_header_round_trip_both_codecs() {
        let header = Header {
            service_method: "Foo.Sum".to_string(),
            seq: 42,
            error: "some failure".to_string(),
        };

        for codec in [BodyCodec::Msgpack, BodyCodec::Json] {
            let encoded = codec.encode(&header).unwrap();
            let decoded: Header = codec.decode(&encoded).unwrap();
            assert_eq!(decoded, header, "codec {:?}", codec);
        }
    }

    #[test]
    fn test_body_round_trip_both_codecs() {
        let args = Args { num1: 3, num2: 4 };

        for codec in [BodyCodec::Msgpack, BodyCodec::Json] {
            let encoded = codec.encode(&args).unwrap();
            let decoded: Args = codec.decode(&encoded).unwrap();
            assert_eq!(decoded, args, "codec {:?}", codec);
        }
    }

    #[test]
    fn test_invalid_data_returns_error() {
        let garbage = [0xc1u8, 0xff, 0xff];
        assert!(BodyCodec::Msgpack.decode::<Header>(&garbage).is_err());
        assert!(BodyCodec::Json.decode::<Header>(&garbage).is_err());
    }

    #[test]
    fn test_placeholder_body_decodes_as_unit() {
        // Error responses carry an encoded `()` as their body.
        for codec in [BodyCodec::Msgpack, BodyCodec::Json] {
            let encoded = codec.encode(&()).unwrap();
            codec.decode::<()>(&encoded).unwrap();
        }
    }
}
