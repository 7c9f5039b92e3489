use std::fmt;
use std::str::FromStr;

use byteorder::{BigEndian, ReadBytesExt};
use serde::{
    de::{Deserialize, Deserializer, Error as DeError, MapAccess, Unexpected, Visitor},
    ser::{Serialize, SerializeMap, Serializer},
};

use crate::error::Error;
use crate::Timestamp;

pub(crate) const OID_KEY: &str = "$oid";

/// Number of raw bytes in an ObjectId.
pub const OID_BYTES: usize = 12;

/// The document store's opaque reference id.
///
/// The first 4 bytes are a big-endian creation time in seconds; the rest is opaque. Displayed and
/// parsed as 24 lower-case hex digits. In the host's document format this is
/// `{"$oid": "<hex>"}`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    bytes: [u8; OID_BYTES],
}

impl ObjectId {
    pub fn from_bytes(bytes: [u8; OID_BYTES]) -> ObjectId {
        ObjectId { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; OID_BYTES] {
        &self.bytes
    }

    /// Creation time embedded in the id, with second precision.
    pub fn timestamp(&self) -> Timestamp {
        let mut raw = &self.bytes[..4];
        // Can't fail, the slice is exactly 4 bytes long
        let secs = raw.read_u32::<BigEndian>().unwrap_or(0);
        Timestamp::from_sec(secs as i64)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != OID_BYTES * 2 {
            return Err(Error::BadObjectId(format!(
                "expected {} hex digits, got {} characters",
                OID_BYTES * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; OID_BYTES];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::BadObjectId(format!("{:?}: {}", s, e)))?;
        Ok(ObjectId { bytes })
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(OID_KEY, &self.to_hex())?;
        map.end()
    }
}

/// The `$oid` member: a hex string.
pub(crate) struct OidMember(pub(crate) ObjectId);

impl<'de> Deserialize<'de> for OidMember {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<ObjectId>()
            .map(OidMember)
            .map_err(|_| D::Error::invalid_value(Unexpected::Str(&s), &"24 hex digits"))
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OidVisitor;

        impl<'de> Visitor<'de> for OidVisitor {
            type Value = ObjectId;

            fn expecting(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(fmt, "a map with a single {} member", OID_KEY)
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut id = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key != OID_KEY {
                        return Err(A::Error::unknown_field(key.as_str(), &[OID_KEY]));
                    }
                    let OidMember(oid) = map.next_value()?;
                    id = Some(oid);
                }
                id.ok_or_else(|| A::Error::missing_field(OID_KEY))
            }
        }

        deserializer.deserialize_map(OidVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const HEX: &str = "5331a4c0e4b0a0a1b2c3d4e5";

    #[test]
    fn hex_roundtrip() {
        let oid: ObjectId = HEX.parse().unwrap();
        assert_eq!(oid.to_hex(), HEX);
        assert_eq!(format!("{}", oid), HEX);
        assert_eq!(oid.as_bytes()[0], 0x53);
        assert_eq!(oid.as_bytes()[11], 0xe5);
    }

    #[test]
    fn upper_case_accepted() {
        let oid: ObjectId = HEX.to_uppercase().parse().unwrap();
        assert_eq!(oid.to_hex(), HEX);
    }

    #[test]
    fn bad_hex() {
        assert!(matches!("abc".parse::<ObjectId>(), Err(Error::BadObjectId(_))));
        assert!(matches!(
            "zz31a4c0e4b0a0a1b2c3d4e5".parse::<ObjectId>(),
            Err(Error::BadObjectId(_))
        ));
        // 24 bytes, but not 24 ASCII characters
        assert!("ééééééééééé31".parse::<ObjectId>().is_err());
    }

    #[test]
    fn signs_are_not_hex() {
        let cases = ["+f31a4c0e4b0a0a1b2c3d4e5", "5331a4c0e4b0a0a1b2c3d4-5", " 331a4c0e4b0a0a1b2c3d4e5"];
        for (index, case) in cases.iter().enumerate() {
            println!("Test #{}: {:?}", index, case);
            assert!(matches!(case.parse::<ObjectId>(), Err(Error::BadObjectId(_))));
        }
        let res = serde_json::from_str::<ObjectId>(r#"{"$oid":"+f31a4c0e4b0a0a1b2c3d4e5"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn embedded_time() {
        let oid: ObjectId = HEX.parse().unwrap();
        assert_eq!(oid.timestamp(), Timestamp::from_sec(0x5331a4c0));
    }

    #[test]
    fn host_format() {
        let oid: ObjectId = HEX.parse().unwrap();
        let enc = serde_json::to_string(&oid).unwrap();
        assert_eq!(enc, format!(r#"{{"$oid":"{}"}}"#, HEX));
        let dec: ObjectId = serde_json::from_str(&enc).unwrap();
        assert_eq!(dec, oid);
        assert!(serde_json::from_str::<ObjectId>(r#"{"$oid":"12"}"#).is_err());
    }
}
