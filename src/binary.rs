use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{
    de::{Deserialize, Deserializer, Error, MapAccess, Unexpected, Visitor},
    ser::{SerializeMap, Serializer},
    Serialize,
};
use serde_bytes::ByteBuf;

pub(crate) const BINARY_KEY: &str = "$binary";

/// The subtype byte attached to every binary payload.
///
/// Only a handful of subtypes have names; see [`name`](Self::name). Any other byte is still a
/// valid subtype, it just has no name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BinarySubtype(pub u8);

impl BinarySubtype {
    pub const GENERIC: BinarySubtype = BinarySubtype(0x00);
    pub const FUNCTION: BinarySubtype = BinarySubtype(0x01);
    pub const OLD: BinarySubtype = BinarySubtype(0x02);
    pub const UUID: BinarySubtype = BinarySubtype(0x03);
    pub const MD5: BinarySubtype = BinarySubtype(0x05);
    pub const USER: BinarySubtype = BinarySubtype(0x80);

    pub fn to_u8(self) -> u8 {
        self.0
    }

    /// Look up the subtype's name. Fails if it's not a recognized subtype.
    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            0x00 => Some("generic"),
            0x01 => Some("function"),
            0x02 => Some("old"),
            0x03 => Some("UUID"),
            0x05 => Some("MD5"),
            0x80 => Some("user"),
            _ => None,
        }
    }
}

impl From<u8> for BinarySubtype {
    fn from(v: u8) -> Self {
        BinarySubtype(v)
    }
}

impl fmt::Display for BinarySubtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

/// A binary payload with its subtype byte.
///
/// Human-readable host format is `{"$binary": {"base64": "...", "subType": "03"}}`. Other
/// serializers get the raw bytes and the subtype as an integer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn new(subtype: u8, bytes: Vec<u8>) -> Self {
        Self {
            subtype: BinarySubtype(subtype),
            bytes,
        }
    }

    pub fn with_subtype(subtype: BinarySubtype, bytes: Vec<u8>) -> Self {
        Self { subtype, bytes }
    }

    pub fn generic(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_subtype(BinarySubtype::GENERIC, bytes.into())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Serialize)]
struct ReadableBody {
    base64: String,
    #[serde(rename = "subType")]
    sub_type: String,
}

#[derive(Serialize)]
struct CompactBody<'a> {
    #[serde(with = "serde_bytes")]
    bytes: &'a [u8],
    #[serde(rename = "subType")]
    sub_type: u8,
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let readable = serializer.is_human_readable();
        let mut map = serializer.serialize_map(Some(1))?;
        if readable {
            let body = ReadableBody {
                base64: STANDARD.encode(&self.bytes),
                sub_type: self.subtype.to_string(),
            };
            map.serialize_entry(BINARY_KEY, &body)?;
        } else {
            let body = CompactBody {
                bytes: &self.bytes,
                sub_type: self.subtype.0,
            };
            map.serialize_entry(BINARY_KEY, &body)?;
        }
        map.end()
    }
}

/// Subtype as a 1 or 2 digit hex string, or as an integer.
struct SubtypeMember(BinarySubtype);

impl<'de> Deserialize<'de> for SubtypeMember {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SubtypeVisitor;

        impl<'de> Visitor<'de> for SubtypeVisitor {
            type Value = SubtypeMember;

            fn expecting(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt.write_str("a binary subtype byte")
            }

            fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
                u8::try_from(v)
                    .map(|v| SubtypeMember(BinarySubtype(v)))
                    .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
                u8::try_from(v)
                    .map(|v| SubtypeMember(BinarySubtype(v)))
                    .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
            }

            fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
                let padded = match v.len() {
                    1 => format!("0{}", v),
                    2 => v.to_string(),
                    _ => return Err(E::invalid_value(Unexpected::Str(v), &self)),
                };
                let mut byte = [0u8; 1];
                hex::decode_to_slice(padded, &mut byte)
                    .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))?;
                Ok(SubtypeMember(BinarySubtype(byte[0])))
            }
        }

        deserializer.deserialize_any(SubtypeVisitor)
    }
}

/// The `$binary` member, in either of the two encodings.
pub(crate) struct BinaryMember(pub(crate) Binary);

impl<'de> Deserialize<'de> for BinaryMember {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BodyVisitor;

        impl<'de> Visitor<'de> for BodyVisitor {
            type Value = BinaryMember;

            fn expecting(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt.write_str("a binary body with a payload and a subType")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut bytes: Option<Vec<u8>> = None;
                let mut subtype: Option<BinarySubtype> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "base64" => {
                            let enc: String = map.next_value()?;
                            let dec = STANDARD.decode(enc.as_bytes()).map_err(|_| {
                                A::Error::invalid_value(Unexpected::Str(&enc), &"base64 data")
                            })?;
                            bytes = Some(dec);
                        }
                        "bytes" => {
                            let raw: ByteBuf = map.next_value()?;
                            bytes = Some(raw.into_vec());
                        }
                        "subType" => {
                            let SubtypeMember(v) = map.next_value()?;
                            subtype = Some(v);
                        }
                        _ => {
                            return Err(A::Error::unknown_field(
                                key.as_str(),
                                &["base64", "bytes", "subType"],
                            ))
                        }
                    }
                }
                let bytes = bytes.ok_or_else(|| A::Error::missing_field("base64"))?;
                let subtype = subtype.ok_or_else(|| A::Error::missing_field("subType"))?;
                Ok(BinaryMember(Binary { subtype, bytes }))
            }
        }

        deserializer.deserialize_map(BodyVisitor)
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BinVisitor;

        impl<'de> Visitor<'de> for BinVisitor {
            type Value = Binary;

            fn expecting(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(fmt, "a map with a single {} member", BINARY_KEY)
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut bin = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key != BINARY_KEY {
                        return Err(A::Error::unknown_field(key.as_str(), &[BINARY_KEY]));
                    }
                    let BinaryMember(v) = map.next_value()?;
                    bin = Some(v);
                }
                bin.ok_or_else(|| A::Error::missing_field(BINARY_KEY))
            }
        }

        deserializer.deserialize_map(BinVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn subtype_names() {
        let named = [
            (0x00, "generic"),
            (0x01, "function"),
            (0x02, "old"),
            (0x03, "UUID"),
            (0x05, "MD5"),
            (0x80, "user"),
        ];
        for (byte, name) in named.iter() {
            assert_eq!(BinarySubtype(*byte).name(), Some(*name));
        }
        let named: Vec<u8> = named.iter().map(|(b, _)| *b).collect();
        for byte in 0..=u8::MAX {
            if !named.contains(&byte) {
                assert_eq!(BinarySubtype(byte).name(), None, "subtype {:#04x}", byte);
            }
        }
    }

    #[test]
    fn host_format() {
        let bin = Binary::with_subtype(BinarySubtype::UUID, vec![0xde, 0xad, 0xbe, 0xef]);
        let enc = serde_json::to_string(&bin).unwrap();
        assert_eq!(enc, r#"{"$binary":{"base64":"3q2+7w==","subType":"03"}}"#);
        let dec: Binary = serde_json::from_str(&enc).unwrap();
        assert_eq!(dec, bin);
    }

    #[test]
    fn subtype_as_integer() {
        let dec: Binary =
            serde_json::from_str(r#"{"$binary":{"base64":"","subType":153}}"#).unwrap();
        assert_eq!(dec.subtype, BinarySubtype(0x99));
        assert!(dec.is_empty());
    }

    #[test]
    fn subtype_strings() {
        let good = [("3", 0x03), ("03", 0x03), ("0A", 0x0a), ("80", 0x80), ("ff", 0xff)];
        for (index, (sub, byte)) in good.iter().enumerate() {
            println!("Test #{}: {:?}", index, sub);
            let json = format!(r#"{{"$binary":{{"base64":"","subType":"{}"}}}}"#, sub);
            let dec: Binary = serde_json::from_str(&json).unwrap();
            assert_eq!(dec.subtype, BinarySubtype(*byte));
        }
        let bad = ["+3", "-1", " 3", "g0", "", "0x"];
        for (index, sub) in bad.iter().enumerate() {
            println!("Test #{}: {:?}", index, sub);
            let json = format!(r#"{{"$binary":{{"base64":"","subType":"{}"}}}}"#, sub);
            assert!(serde_json::from_str::<Binary>(&json).is_err());
        }
    }

    #[test]
    fn malformed() {
        assert!(serde_json::from_str::<Binary>(r#"{"$binary":{"base64":"@@","subType":"00"}}"#).is_err());
        assert!(serde_json::from_str::<Binary>(r#"{"$binary":{"base64":"AA=="}}"#).is_err());
        assert!(serde_json::from_str::<Binary>(r#"{"$binary":{"base64":"AA==","subType":"100"}}"#).is_err());
        assert!(serde_json::from_str::<Binary>(r#"{"$binary":{"base64":"AA==","subType":256}}"#).is_err());
    }
}
