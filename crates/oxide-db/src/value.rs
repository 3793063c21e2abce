//! Parameter and column values.
//!
//! [`Value`] is the closed set of runtime types a statement parameter or a
//! fetched column can take. Each value maps to exactly one [`WireType`], the
//! coarse category the driver needs to bind it.

use std::borrow::Cow;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::dialect::Dialect;

/// A parameter or column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Integer (booleans are stored here as 0/1).
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    Text(String),
    /// Binary data.
    Blob(Vec<u8>),
}

/// Bind type category of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    /// Integer tag.
    Integer,
    /// Floating point tag.
    Float,
    /// Binary tag.
    Blob,
    /// String tag.
    Text,
}

impl WireType {
    /// Single-character tag in the classic `i`/`d`/`b`/`s` notation.
    #[must_use]
    pub fn tag(self) -> char {
        match self {
            Self::Integer => 'i',
            Self::Float => 'd',
            Self::Blob => 'b',
            Self::Text => 's',
        }
    }
}

/// Returns the wire types for a parameter list, in order.
#[must_use]
pub fn wire_types(params: &[Value]) -> Vec<WireType> {
    params.iter().map(Value::wire_type).collect()
}

impl Value {
    /// Maps the value to its bind type. Anything that is not an integer,
    /// float or blob binds as a string, NULL included.
    #[must_use]
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Int(_) => WireType::Integer,
            Self::Float(_) => WireType::Float,
            Self::Blob(_) => WireType::Blob,
            Self::Text(_) | Self::Null => WireType::Text,
        }
    }

    /// Builds a text value from raw bytes of unknown encoding.
    ///
    /// Valid UTF-8 is kept as is. Bytes that look like Latin-1 (no C1 control
    /// range) are converted. Anything else cannot be identified and is passed
    /// through untouched as a blob.
    #[must_use]
    pub fn text_from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(err) => {
                let bytes = err.into_bytes();
                if bytes.iter().any(|b| (0x80..0xA0).contains(b)) {
                    Self::Blob(bytes)
                } else {
                    Self::Text(bytes.iter().map(|&b| char::from(b)).collect())
                }
            }
        }
    }

    /// Returns true for NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of the value. Text is parsed.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of the value. Blobs are decoded as (lossy) UTF-8 since
    /// several catalog queries report their columns as binary strings.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::Int(i) => Some(Cow::Owned(i.to_string())),
            Self::Float(f) => Some(Cow::Owned(f.to_string())),
            Self::Text(s) => Some(Cow::Borrowed(s)),
            Self::Blob(b) => Some(String::from_utf8_lossy(b)),
        }
    }

    /// Renders the value as a SQL literal for the given dialect.
    #[must_use]
    pub fn to_sql_literal(&self, dialect: &dyn Dialect) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Int(i) => dialect.quote_literal(&i.to_string()),
            Self::Float(f) => dialect.quote_literal(&f.to_string()),
            Self::Text(s) => dialect.quote_literal(s),
            Self::Blob(b) => format!(
                "X'{}'",
                b.iter().map(|byte| format!("{byte:02X}")).collect::<String>()
            ),
        }
    }
}

/// Canonical form for text parameters: strips a leading byte-order mark.
pub(crate) fn normalize_text(text: &str) -> &str {
    text.strip_prefix('\u{FEFF}').unwrap_or(text)
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Int(i64::from(value))
    }
}

macro_rules! int_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::Int(i64::from(value))
            }
        })*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A fetched row: column names mapped to values, in the order the driver
/// reported the columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column.
    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.entries.push((column.into(), value));
    }

    /// Looks a value up by column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Looks a value up by position.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).map(|(_, value)| value)
    }

    /// Text of a named column, `None` for NULL or a missing column.
    #[must_use]
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column)
            .and_then(Value::as_text)
            .map(Cow::into_owned)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Values in order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    /// Column/value pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
