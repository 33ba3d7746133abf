//! Typed Property Values
//!
//! A property is a named value (or ordered list of values) of exactly one
//! [`PropertyType`]. Values are a tagged union so every encode/decode path is
//! an exhaustive match over the supported types.
//!
//! # Change State
//!
//! Each property carries a [`PropertyState`]:
//!
//! - `New`: created in memory, never persisted
//! - `Modified`: loaded from the store and changed since
//! - `Clean`: loaded from the store and untouched
//!
//! The single-property update path only writes `New` and `Modified`
//! properties; whole-node writes ignore the state.
//!
//! # Examples
//!
//! ```rust
//! use treestore_core::models::{Property, PropertyType, Value};
//!
//! let title = Property::new("title", Value::from("Home"));
//! assert_eq!(title.property_type(), PropertyType::String);
//! assert!(!title.is_multiple());
//!
//! let tags = Property::multiple(
//!     "tags",
//!     PropertyType::String,
//!     vec![Value::from("a"), Value::from("b")],
//! )
//! .unwrap();
//! assert_eq!(tags.values().len(), 2);
//! ```

use crate::models::NodeId;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Property value errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    #[error("Property {name} expects values of type {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: PropertyType,
        found: PropertyType,
    },

    #[error("Invalid decimal literal: {0}")]
    InvalidDecimal(String),

    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("Instant out of range: {0} seconds since epoch")]
    InstantOutOfRange(i64),

    #[error("Unknown property type: {0}")]
    UnknownType(String),
}

/// Supported property types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    String,
    Boolean,
    Long,
    Double,
    Decimal,
    Date,
    Name,
    Path,
    Uri,
    Binary,
    Reference,
    WeakReference,
}

impl PropertyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Long => "Long",
            Self::Double => "Double",
            Self::Decimal => "Decimal",
            Self::Date => "Date",
            Self::Name => "Name",
            Self::Path => "Path",
            Self::Uri => "Uri",
            Self::Binary => "Binary",
            Self::Reference => "Reference",
            Self::WeakReference => "WeakReference",
        }
    }

    /// Reference and weak reference values point at node identities
    pub fn is_reference(self) -> bool {
        matches!(self, Self::Reference | Self::WeakReference)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = PropertyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "boolean" => Self::Boolean,
            "long" => Self::Long,
            "double" => Self::Double,
            "decimal" => Self::Decimal,
            "date" => Self::Date,
            "name" => Self::Name,
            "path" => Self::Path,
            "uri" => Self::Uri,
            "binary" => Self::Binary,
            "reference" => Self::Reference,
            "weakreference" => Self::WeakReference,
            _ => return Err(PropertyError::UnknownType(s.to_string())),
        };
        Ok(ty)
    }
}

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("decimal pattern is valid")
    })
}

/// Arbitrary-precision decimal
///
/// Held normalized as sign, significant digits and point position
/// (`0.<digits> x 10^point`), so `5`, `5.0` and `0.5e1` are the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    negative: bool,
    /// No leading or trailing zeros; empty for zero
    digits: String,
    point: i64,
}

/// Plain notation is used while the padding stays below this many zeros
const PLAIN_NOTATION_PADDING: i64 = 32;

impl Decimal {
    pub fn parse(literal: &str) -> Result<Self, PropertyError> {
        let literal = literal.trim();
        let invalid = || PropertyError::InvalidDecimal(literal.to_string());
        if !decimal_pattern().is_match(literal) {
            return Err(invalid());
        }

        let (negative, unsigned) = match literal.as_bytes()[0] {
            b'-' => (true, &literal[1..]),
            b'+' => (false, &literal[1..]),
            _ => (false, literal),
        };
        let (mantissa, exponent) = match unsigned.find(|c: char| c == 'e' || c == 'E') {
            Some(idx) => (
                &unsigned[..idx],
                unsigned[idx + 1..].parse::<i64>().map_err(|_| invalid())?,
            ),
            None => (unsigned, 0),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

        let all_digits = format!("{}{}", int_part, frac_part);
        let leading = all_digits.len() - all_digits.trim_start_matches('0').len();
        let digits = all_digits.trim_matches('0').to_string();
        if digits.is_empty() {
            return Ok(Self {
                negative: false,
                digits,
                point: 0,
            });
        }

        let point = (int_part.len() as i64)
            .checked_add(exponent)
            .and_then(|p| p.checked_sub(leading as i64))
            .ok_or_else(invalid)?;
        Ok(Self {
            negative,
            digits,
            point,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    /// Canonical text: plain notation, or `d.dddE±n` for extreme magnitudes
    pub fn to_canonical(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        let len = self.digits.len() as i64;
        let sign = if self.negative { "-" } else { "" };
        let body = if self.point > 0 && self.point <= len {
            let (int_part, frac_part) = self.digits.split_at(self.point as usize);
            if frac_part.is_empty() {
                int_part.to_string()
            } else {
                format!("{}.{}", int_part, frac_part)
            }
        } else if self.point > len && self.point - len <= PLAIN_NOTATION_PADDING {
            format!("{}{}", self.digits, "0".repeat((self.point - len) as usize))
        } else if self.point <= 0 && -self.point < PLAIN_NOTATION_PADDING {
            format!("0.{}{}", "0".repeat((-self.point) as usize), self.digits)
        } else {
            let (first, rest) = self.digits.split_at(1);
            let mantissa = if rest.is_empty() {
                first.to_string()
            } else {
                format!("{}.{}", first, rest)
            };
            format!("{}E{}", mantissa, self.point - 1)
        };
        format!("{}{}", sign, body)
    }

    /// Text whose byte order is the numeric order of the values
    ///
    /// Sign class first (`0` negative, `1` zero, `2` positive), then the
    /// biased point position as 20 digits, then the digits. Negative values
    /// invert the position and complement the digits, with a `~` terminator
    /// so that a shorter digit run sorts after its extensions.
    pub fn sort_key(&self) -> String {
        if self.is_zero() {
            return "1".to_string();
        }
        let biased = (self.point as u64) ^ (1 << 63);
        if self.negative {
            let complement: String = self
                .digits
                .bytes()
                .map(|d| char::from(b'9' - (d - b'0')))
                .collect();
            format!("0{:020}{}~", u64::MAX - biased, complement)
        } else {
            format!("2{:020}{}", biased, self.digits)
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

/// An instant paired with the named time zone it was recorded in
///
/// Precision is whole seconds. Two values are equal only when both the
/// instant and the zone name agree, so `Europe/Paris` and `Europe/Berlin`
/// at the same instant are distinct.
#[derive(Debug, Clone)]
pub struct DateValue(DateTime<Tz>);

impl DateValue {
    /// Build from an instant and zone (sub-second precision is dropped)
    pub fn new(instant: DateTime<Utc>, zone: Tz) -> Self {
        let seconds = zone.timestamp_opt(instant.timestamp(), 0).single();
        match seconds {
            Some(dt) => Self(dt),
            None => Self(instant.with_timezone(&zone)),
        }
    }

    /// Build from epoch seconds and an IANA zone name
    pub fn from_epoch_seconds(seconds: i64, zone_name: &str) -> Result<Self, PropertyError> {
        let zone: Tz = zone_name
            .parse()
            .map_err(|_| PropertyError::UnknownTimeZone(zone_name.to_string()))?;
        let instant = DateTime::from_timestamp(seconds, 0)
            .ok_or(PropertyError::InstantOutOfRange(seconds))?;
        Ok(Self(instant.with_timezone(&zone)))
    }

    pub fn epoch_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn zone_name(&self) -> &'static str {
        self.0.timezone().name()
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }

    pub fn as_datetime(&self) -> &DateTime<Tz> {
        &self.0
    }
}

impl PartialEq for DateValue {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.zone_name() == other.zone_name()
    }
}

/// A binary payload
///
/// `Inline` bytes exist only in memory before a write. After decoding, only
/// the stored length is known; the bytes are fetched from the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binary {
    Inline(Vec<u8>),
    Stored { length: u64 },
}

impl Binary {
    pub fn len(&self) -> u64 {
        match self {
            Self::Inline(bytes) => bytes.len() as u64,
            Self::Stored { length } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Inline(bytes) => Some(bytes),
            Self::Stored { .. } => None,
        }
    }
}

/// A single typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Boolean(bool),
    Long(i64),
    Double(f64),
    Decimal(Decimal),
    Date(DateValue),
    Name(String),
    Path(String),
    Uri(String),
    Binary(Binary),
    Reference(NodeId),
    WeakReference(NodeId),
}

impl Value {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Long(_) => PropertyType::Long,
            Self::Double(_) => PropertyType::Double,
            Self::Decimal(_) => PropertyType::Decimal,
            Self::Date(_) => PropertyType::Date,
            Self::Name(_) => PropertyType::Name,
            Self::Path(_) => PropertyType::Path,
            Self::Uri(_) => PropertyType::Uri,
            Self::Binary(_) => PropertyType::Binary,
            Self::Reference(_) => PropertyType::Reference,
            Self::WeakReference(_) => PropertyType::WeakReference,
        }
    }

    /// Text of string-like values
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Name(s) | Self::Path(s) | Self::Uri(s) => Some(s),
            _ => None,
        }
    }

    /// Target of reference and weak reference values
    pub fn as_reference(&self) -> Option<NodeId> {
        match self {
            Self::Reference(id) | Self::WeakReference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Binary(Binary::Inline(bytes.into()))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Double(n)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<DateValue> for Value {
    fn from(d: DateValue) -> Self {
        Self::Date(d)
    }
}

/// Change state relative to the stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyState {
    New,
    Modified,
    Clean,
}

/// A named, typed, single- or multi-valued property
///
/// Equality ignores the change state.
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    property_type: PropertyType,
    multiple: bool,
    values: Vec<Value>,
    state: PropertyState,
}

impl Property {
    /// Create a new single-valued property
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            property_type: value.property_type(),
            multiple: false,
            values: vec![value],
            state: PropertyState::New,
        }
    }

    /// Create a new multi-valued property; every value must match `property_type`
    pub fn multiple(
        name: impl Into<String>,
        property_type: PropertyType,
        values: Vec<Value>,
    ) -> Result<Self, PropertyError> {
        let name = name.into();
        check_types(&name, property_type, &values)?;
        Ok(Self {
            name,
            property_type,
            multiple: true,
            values,
            state: PropertyState::New,
        })
    }

    /// Rebuild a property from stored parts
    pub(crate) fn from_parts(
        name: String,
        property_type: PropertyType,
        multiple: bool,
        values: Vec<Value>,
        state: PropertyState,
    ) -> Result<Self, PropertyError> {
        check_types(&name, property_type, &values)?;
        Ok(Self {
            name,
            property_type,
            multiple,
            values,
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// First value (the only one for single-valued properties)
    pub fn value(&self) -> Option<&Value> {
        self.values.first()
    }

    pub fn state(&self) -> PropertyState {
        self.state
    }

    pub fn is_new(&self) -> bool {
        self.state == PropertyState::New
    }

    pub fn is_modified(&self) -> bool {
        self.state == PropertyState::Modified
    }

    pub fn is_clean(&self) -> bool {
        self.state == PropertyState::Clean
    }

    /// Replace the value with a single value of any type
    pub fn set_value(&mut self, value: Value) {
        self.property_type = value.property_type();
        self.multiple = false;
        self.values = vec![value];
        self.touch();
    }

    /// Replace the values with a typed list
    pub fn set_values(
        &mut self,
        property_type: PropertyType,
        values: Vec<Value>,
    ) -> Result<(), PropertyError> {
        check_types(&self.name, property_type, &values)?;
        self.property_type = property_type;
        self.multiple = true;
        self.values = values;
        self.touch();
        Ok(())
    }

    /// Multi-valued `Name` property; cannot fail since every value is a name
    pub fn names(name: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            name: name.into(),
            property_type: PropertyType::Name,
            multiple: true,
            values: names.into_iter().map(Value::Name).collect(),
            state: PropertyState::New,
        }
    }

    /// Replace the values with `names`, making this a multi-valued `Name`
    pub(crate) fn set_names(&mut self, names: Vec<String>) {
        self.property_type = PropertyType::Name;
        self.multiple = true;
        self.values = names.into_iter().map(Value::Name).collect();
        self.touch();
    }

    /// Mark a property that overwrites a stored one
    pub(crate) fn mark_replacing(&mut self) {
        self.state = PropertyState::Modified;
    }

    pub(crate) fn touch(&mut self) {
        if self.state == PropertyState::Clean {
            self.state = PropertyState::Modified;
        }
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.property_type == other.property_type
            && self.multiple == other.multiple
            && self.values == other.values
    }
}

fn check_types(
    name: &str,
    property_type: PropertyType,
    values: &[Value],
) -> Result<(), PropertyError> {
    match values.iter().find(|v| v.property_type() != property_type) {
        Some(mismatch) => Err(PropertyError::TypeMismatch {
            name: name.to_string(),
            expected: property_type,
            found: mismatch.property_type(),
        }),
        None => Ok(()),
    }
}
