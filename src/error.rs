use std::fmt;

use serde::{de, ser};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Occurs when the absent marker ([`Value::Undefined`][crate::Value::Undefined]) is handed to
    /// the classifier. Absent values are a caller error, not a type.
    Undefined,
    /// Occurs when a partial profile handed to a reduce step is missing its `types` or
    /// `occurrences` field, or when either field has the wrong shape.
    MalformedProfile(String),
    /// Occurs when job options or a scope string can't be parsed.
    BadOption(String),
    /// Occurs when an ObjectId is built from something other than 24 hex digits.
    BadObjectId(String),
    /// Occurs when serde serialization or deserialization fails
    SerdeFail(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Undefined => f.write_str("Can't classify an undefined value"),
            Error::MalformedProfile(ref err) => write!(f, "Malformed partial profile: {}", err),
            Error::BadOption(ref err) => write!(f, "Bad job option: {}", err),
            Error::BadObjectId(ref err) => write!(f, "Bad ObjectId: {}", err),
            Error::SerdeFail(ref msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}

impl ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::SerdeFail(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::SerdeFail(msg.to_string())
    }
}
