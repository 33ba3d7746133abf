//! Document Model and Store-Native Predicates
//!
//! Documents are JSON objects. [`Filter`] is the predicate language every
//! [`DocumentStore`](crate::db::DocumentStore) understands, modelled on the
//! query operators of common document databases:
//!
//! - comparisons on dotted field paths, where a path that crosses an array
//!   matches when any element matches
//! - `In`, `Exists`, `StartsWith`, `Regex`
//! - `ElemMatch`: an array field contains one element satisfying a nested
//!   filter
//! - `And` / `Or` / `Not`
//!
//! [`UpdateOp`] covers the field-level mutations the repository needs (set a
//! field, push/pull an array element, replace the first matching element).
//!
//! The evaluation functions here back the in-memory store and double as the
//! reference semantics for other backends.

use crate::db::DatabaseError;
use regex::RegexBuilder;
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;

/// A stored document
pub type Document = Map<String, Json>;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
        }
    }
}

/// Store-native predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document
    All,
    Compare {
        field: String,
        op: CompareOp,
        value: Json,
    },
    In {
        field: String,
        values: Vec<Json>,
    },
    Exists {
        field: String,
        exists: bool,
    },
    StartsWith {
        field: String,
        prefix: String,
    },
    Regex {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    ElemMatch {
        field: String,
        filter: Box<Filter>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Json>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: &str, value: impl Into<Json>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn compare(field: &str, op: CompareOp, value: impl Into<Json>) -> Self {
        Self::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn in_values(field: &str, values: Vec<Json>) -> Self {
        Self::In {
            field: field.to_string(),
            values,
        }
    }

    pub fn exists(field: &str) -> Self {
        Self::Exists {
            field: field.to_string(),
            exists: true,
        }
    }

    pub fn starts_with(field: &str, prefix: impl Into<String>) -> Self {
        Self::StartsWith {
            field: field.to_string(),
            prefix: prefix.into(),
        }
    }

    pub fn regex(field: &str, pattern: impl Into<String>, case_insensitive: bool) -> Self {
        Self::Regex {
            field: field.to_string(),
            pattern: pattern.into(),
            case_insensitive,
        }
    }

    pub fn elem_match(field: &str, filter: Filter) -> Self {
        Self::ElemMatch {
            field: field.to_string(),
            filter: Box::new(filter),
        }
    }

    pub fn negate(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Matches nothing
    pub fn none() -> Self {
        Self::negate(Self::All)
    }

    /// Evaluate against a document
    pub fn matches(&self, doc: &Document) -> Result<bool, DatabaseError> {
        match self {
            Self::All => Ok(true),
            Self::Compare { field, op, value } => {
                let candidates = resolve(doc, field);
                let matched = match op {
                    CompareOp::Eq => candidates.iter().any(|c| json_eq(c, value)),
                    CompareOp::Ne => !candidates.iter().any(|c| json_eq(c, value)),
                    _ => candidates
                        .iter()
                        .any(|c| compare_json(c, value).is_some_and(|ord| op.accepts(ord))),
                };
                Ok(matched)
            }
            Self::In { field, values } => Ok(resolve(doc, field)
                .iter()
                .any(|c| values.iter().any(|v| json_eq(c, v)))),
            Self::Exists { field, exists } => Ok(!lookup(doc, field).is_empty() == *exists),
            Self::StartsWith { field, prefix } => Ok(resolve(doc, field)
                .iter()
                .filter_map(|c| c.as_str())
                .any(|s| s.starts_with(prefix.as_str()))),
            Self::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(*case_insensitive)
                    .build()
                    .map_err(|e| {
                        DatabaseError::invalid_filter(format!("bad pattern {}: {}", pattern, e))
                    })?;
                Ok(resolve(doc, field)
                    .iter()
                    .filter_map(|c| c.as_str())
                    .any(|s| re.is_match(s)))
            }
            Self::ElemMatch { field, filter } => {
                for value in lookup(doc, field) {
                    let Json::Array(items) = value else {
                        continue;
                    };
                    for item in items {
                        if let Json::Object(element) = item {
                            if filter.matches(element)? {
                                return Ok(true);
                            }
                        }
                    }
                }
                Ok(false)
            }
            Self::And(filters) => {
                for filter in filters {
                    if !filter.matches(doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(filters) => {
                for filter in filters {
                    if filter.matches(doc)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(filter) => Ok(!filter.matches(doc)?),
        }
    }
}

/// Values at a dotted path, descending through arrays of objects
fn lookup<'a>(doc: &'a Document, field: &str) -> Vec<&'a Json> {
    let mut segments = field.split('.');
    let mut current: Vec<&Json> = match segments.next() {
        Some(first) => doc.get(first).into_iter().collect(),
        None => Vec::new(),
    };
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Json::Object(map) => next.extend(map.get(segment)),
                Json::Array(items) => {
                    for item in items {
                        if let Json::Object(map) = item {
                            next.extend(map.get(segment));
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// `lookup` plus the elements of any terminal array
fn resolve<'a>(doc: &'a Document, field: &str) -> Vec<&'a Json> {
    let mut out = Vec::new();
    for value in lookup(doc, field) {
        out.push(value);
        if let Json::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn json_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(_), Json::Number(_)) => compare_json(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn compare_json(a: &Json, b: &Json) -> Option<Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Json::String(x), Json::String(y)) => Some(x.cmp(y)),
        (Json::Bool(x), Json::Bool(y)) => Some(x.cmp(y)),
        (Json::Null, Json::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: Option<&Json>) -> u8 {
    match value {
        None | Some(Json::Null) => 0,
        Some(Json::Number(_)) => 1,
        Some(Json::String(_)) => 2,
        Some(Json::Object(_)) => 3,
        Some(Json::Array(_)) => 4,
        Some(Json::Bool(_)) => 5,
    }
}

/// Total order used for sorting: missing < numbers < strings < objects <
/// arrays < booleans
///
/// Objects compare entry by entry in key order, arrays element by element.
fn sort_order(a: Option<&Json>, b: Option<&Json>) -> Ordering {
    match type_rank(a).cmp(&type_rank(b)) {
        Ordering::Equal => match (a, b) {
            (Some(Json::Object(x)), Some(Json::Object(y))) => {
                for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
                    let ordering = kx.cmp(ky).then_with(|| sort_order(Some(vx), Some(vy)));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                x.len().cmp(&y.len())
            }
            (Some(Json::Array(x)), Some(Json::Array(y))) => {
                for (vx, vy) in x.iter().zip(y.iter()) {
                    let ordering = sort_order(Some(vx), Some(vy));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                x.len().cmp(&y.len())
            }
            (Some(a), Some(b)) => compare_json(a, b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// What a sort key reads from a document
#[derive(Debug, Clone, PartialEq)]
pub enum SortTarget {
    /// A top-level or dotted field
    Field(String),
    /// `value_field` of the first element of `array` whose `key_field`
    /// equals `key` (first value when that is itself a list)
    Element {
        array: String,
        key_field: String,
        key: Json,
        value_field: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub target: SortTarget,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn field(field: &str, direction: SortDirection) -> Self {
        Self {
            target: SortTarget::Field(field.to_string()),
            direction,
        }
    }

    fn extract<'a>(&self, doc: &'a Document) -> Option<&'a Json> {
        match &self.target {
            SortTarget::Field(field) => lookup(doc, field).into_iter().next(),
            SortTarget::Element {
                array,
                key_field,
                key,
                value_field,
            } => {
                let element = doc.get(array)?.as_array()?.iter().find(|item| {
                    item.get(key_field.as_str())
                        .is_some_and(|candidate| json_eq(candidate, key))
                })?;
                match element.get(value_field.as_str())? {
                    Json::Array(items) => items.first(),
                    other => Some(other),
                }
            }
        }
    }
}

/// Compare two documents by a list of sort keys
pub fn compare_documents(keys: &[SortKey], a: &Document, b: &Document) -> Ordering {
    for key in keys {
        let ordering = sort_order(key.extract(a), key.extract(b));
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Sorting and pagination for `find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort.push(SortKey::field(field, direction));
        self
    }

    pub fn sort_by_key(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Field-level update operators
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Set a top-level field
    Set { field: String, value: Json },
    /// Append to an array field (created when missing)
    Push { field: String, value: Json },
    /// Remove every array element matching `filter`
    Pull { field: String, filter: Filter },
    /// Replace the first array element matching `filter`
    SetElement {
        field: String,
        filter: Filter,
        value: Json,
    },
}

impl UpdateOp {
    pub fn set(field: &str, value: impl Into<Json>) -> Self {
        Self::Set {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn push(field: &str, value: Json) -> Self {
        Self::Push {
            field: field.to_string(),
            value,
        }
    }

    pub fn pull(field: &str, filter: Filter) -> Self {
        Self::Pull {
            field: field.to_string(),
            filter,
        }
    }

    pub fn set_element(field: &str, filter: Filter, value: Json) -> Self {
        Self::SetElement {
            field: field.to_string(),
            filter,
            value,
        }
    }

    /// Apply to a document in place
    pub fn apply(&self, doc: &mut Document) -> Result<(), DatabaseError> {
        match self {
            Self::Set { field, value } => {
                doc.insert(field.clone(), value.clone());
                Ok(())
            }
            Self::Push { field, value } => {
                match doc
                    .entry(field.clone())
                    .or_insert_with(|| Json::Array(Vec::new()))
                {
                    Json::Array(items) => {
                        items.push(value.clone());
                        Ok(())
                    }
                    _ => Err(DatabaseError::invalid_update(format!(
                        "can not push to non-array field {}",
                        field
                    ))),
                }
            }
            Self::Pull { field, filter } => {
                let Some(Json::Array(items)) = doc.get_mut(field) else {
                    return Ok(());
                };
                let mut kept = Vec::with_capacity(items.len());
                for item in items.drain(..) {
                    let remove = match &item {
                        Json::Object(element) => filter.matches(element)?,
                        _ => false,
                    };
                    if !remove {
                        kept.push(item);
                    }
                }
                *items = kept;
                Ok(())
            }
            Self::SetElement {
                field,
                filter,
                value,
            } => {
                let Some(Json::Array(items)) = doc.get_mut(field) else {
                    return Err(DatabaseError::invalid_update(format!(
                        "field {} is not an array",
                        field
                    )));
                };
                for item in items.iter_mut() {
                    if let Json::Object(element) = item {
                        if filter.matches(element)? {
                            *item = value.clone();
                            return Ok(());
                        }
                    }
                }
                Err(DatabaseError::invalid_update(format!(
                    "no element of {} matches",
                    field
                )))
            }
        }
    }
}
