//! Type classification of single values.
//!
//! Every value except [`Value::Undefined`] maps to exactly one [`TypeTag`]. Tags are written the
//! way the store's shell names them: capitalized for scalars and special values, lower-case
//! `null`, and `BinData-<subtype>` for binary payloads.
//!
//! ```
//! # use schema_variety::{classify, doc, Binary, TypeTag};
//! # fn main() -> schema_variety::Result<()> {
//! assert_eq!(classify(&doc!(42))?.to_string(), "Number");
//! assert_eq!(classify(&doc!(null))?.to_string(), "null");
//! assert_eq!(classify(&doc!(Binary::new(0x99, vec![])))?.to_string(), "BinData-undefined");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::trace;

use crate::error::{Error, Result};
use crate::{BinarySubtype, Value};

/// Name half of a `BinData-<name>` tag.
///
/// Subtypes without a name all collapse into `Undefined`, so unmapped payloads show up in a
/// report as `BinData-undefined` instead of vanishing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinDataKind {
    Generic,
    Function,
    Old,
    Uuid,
    Md5,
    User,
    Undefined,
}

impl BinDataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinDataKind::Generic => "generic",
            BinDataKind::Function => "function",
            BinDataKind::Old => "old",
            BinDataKind::Uuid => "UUID",
            BinDataKind::Md5 => "MD5",
            BinDataKind::User => "user",
            BinDataKind::Undefined => "undefined",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "generic" => BinDataKind::Generic,
            "function" => BinDataKind::Function,
            "old" => BinDataKind::Old,
            "UUID" => BinDataKind::Uuid,
            "MD5" => BinDataKind::Md5,
            "user" => BinDataKind::User,
            "undefined" => BinDataKind::Undefined,
            _ => return None,
        })
    }
}

impl From<BinarySubtype> for BinDataKind {
    fn from(subtype: BinarySubtype) -> Self {
        match subtype.name() {
            Some(name) => BinDataKind::from_name(name).unwrap_or(BinDataKind::Undefined),
            None => BinDataKind::Undefined,
        }
    }
}

/// The canonical label of a value's kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeTag {
    Boolean,
    Number,
    String,
    Array,
    Null,
    Date,
    ObjectId,
    BinData(BinDataKind),
    Object,
}

impl TypeTag {
    pub fn name(&self) -> std::borrow::Cow<'static, str> {
        use std::borrow::Cow;
        match self {
            TypeTag::Boolean => Cow::Borrowed("Boolean"),
            TypeTag::Number => Cow::Borrowed("Number"),
            TypeTag::String => Cow::Borrowed("String"),
            TypeTag::Array => Cow::Borrowed("Array"),
            TypeTag::Null => Cow::Borrowed("null"),
            TypeTag::Date => Cow::Borrowed("Date"),
            TypeTag::ObjectId => Cow::Borrowed("ObjectId"),
            TypeTag::BinData(kind) => Cow::Owned(format!("BinData-{}", kind.as_str())),
            TypeTag::Object => Cow::Borrowed("Object"),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for TypeTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tag = match s {
            "Boolean" => TypeTag::Boolean,
            "Number" => TypeTag::Number,
            "String" => TypeTag::String,
            "Array" => TypeTag::Array,
            "null" => TypeTag::Null,
            "Date" => TypeTag::Date,
            "ObjectId" => TypeTag::ObjectId,
            "Object" => TypeTag::Object,
            _ => {
                let kind = s
                    .strip_prefix("BinData-")
                    .and_then(BinDataKind::from_name)
                    .ok_or_else(|| {
                        Error::MalformedProfile(format!("unrecognized type tag {:?}", s))
                    })?;
                TypeTag::BinData(kind)
            }
        };
        Ok(tag)
    }
}

impl Serialize for TypeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for TypeTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        let s = std::borrow::Cow::<str>::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Classify a single value.
///
/// Fails only on [`Value::Undefined`], which marks an absent value rather than a present one.
pub fn classify(value: &Value) -> Result<TypeTag> {
    let tag = match value {
        Value::Undefined => return Err(Error::Undefined),
        Value::Bool(_) => TypeTag::Boolean,
        Value::Int(_) | Value::F64(_) => TypeTag::Number,
        Value::Str(_) => TypeTag::String,
        Value::Array(_) => TypeTag::Array,
        Value::Null => TypeTag::Null,
        Value::Timestamp(_) => TypeTag::Date,
        Value::ObjectId(_) => TypeTag::ObjectId,
        Value::Bin(bin) => {
            let kind = BinDataKind::from(bin.subtype);
            if kind == BinDataKind::Undefined {
                trace!(subtype = %bin.subtype, "binary subtype has no name");
            }
            TypeTag::BinData(kind)
        }
        Value::Map(_) => TypeTag::Object,
    };
    Ok(tag)
}
