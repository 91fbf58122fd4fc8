use crate::compress::CompressionError;
use crate::value::ValueType;
use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    /// Occurs when a value's runtime type doesn't match the type its Definition node expects.
    TypeConflict {
        path: String,
        expected: ValueType,
        actual: ValueType,
    },
    /// Occurs when a value is absent at a Definition node that isn't nullable.
    NotNullable { path: String },
    /// An Object value holds a field its Definition doesn't list.
    UnknownField { path: String, field: String },
    /// The encoded message is malformed: bad magic, an unknown pool name, an out-of-range pool
    /// index, a negative length, invalid UTF-8, or trailing bytes.
    FormatError(String),
    /// A primitive read went past the end of the buffer.
    UnexpectedEof { step: &'static str },
    /// A free-form value carried a type tag that doesn't name any value type.
    UnknownTypeTag(i64),
    /// The Definition failed validation while building a Schema.
    SchemaValidation(String),
    /// The declarative Definition couldn't be parsed.
    SchemaParse(String),
    /// Decoding hit some parsing limit: nesting depth, or the decoded-size budget.
    ParseLimit(String),
    /// Post-compression or decompression of a finished message failed.
    Compression(CompressionError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::TypeConflict {
                ref path,
                expected,
                actual,
            } => write!(
                f,
                "Value & definition type conflict at [{}]: expected {}, got {}",
                path, expected, actual
            ),
            Error::NotNullable { ref path } => {
                write!(f, "Value at [{}] is absent but not nullable", path)
            }
            Error::UnknownField {
                ref path,
                ref field,
            } => write!(f, "Object at [{}] has unknown field `{}`", path, field),
            Error::FormatError(ref err) => write!(f, "Malformed message: {}", err),
            Error::UnexpectedEof { step } => {
                write!(f, "Message ended early while reading {}", step)
            }
            Error::UnknownTypeTag(tag) => write!(f, "Unknown free-form type tag {}", tag),
            Error::SchemaValidation(ref err) => write!(f, "Invalid definition: {}", err),
            Error::SchemaParse(ref err) => write!(f, "Couldn't parse definition: {}", err),
            Error::ParseLimit(ref err) => write!(f, "Hit parsing limit: {}", err),
            Error::Compression(ref err) => write!(f, "Compression failure: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Compression(ref err) => Some(err),
            _ => None,
        }
    }
}

impl std::convert::From<CompressionError> for Error {
    fn from(e: CompressionError) -> Self {
        Self::Compression(e)
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::SchemaParse(e.to_string())
    }
}
