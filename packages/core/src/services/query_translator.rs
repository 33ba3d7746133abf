//! Query Translator
//!
//! Lowers a [`QueryObjectModel`] into a store-native [`Filter`] plus
//! [`FindOptions`], runs it, and shapes the matching documents into result
//! rows.
//!
//! # Lowering
//!
//! - selector `T` matches `type = T` or `jcr:mixinTypes` containing `T`;
//!   `nt:base` matches every node
//! - property comparisons become an element match on `props` (name plus
//!   value predicate); dates compare on `value.epoch_seconds`, numeric
//!   literals on the plain number or on a decimal's `value.sort_key`
//! - `jcr:primaryType`, `jcr:path` and `jcr:uuid` address the node-level
//!   fields directly
//! - `LIKE` becomes an anchored regex (`%` is `.*`, `_` is `.`)
//! - node names match a regex on the last path segment
//! - `LOWER`/`UPPER` with `=` or `LIKE` become case-insensitive regexes
//! - `ISSAMENODE`, `ISCHILDNODE` and `ISDESCENDANTNODE` compare `path` or
//!   `parent`
//!
//! The workspace predicate is always conjoined. Full-text search is not
//! supported and every score is `0.0`.

use crate::db::schema::{
    FIELD_ID, FIELD_PARENT, FIELD_PATH, FIELD_PROPS, FIELD_TYPE, FIELD_WORKSPACE, PROP_NAME,
    PROP_VALUE, DATE_EPOCH_SECONDS, DECIMAL_SORT_KEY,
};
use crate::db::{
    CompareOp, DocumentStore, Filter, FindOptions, NodeDocument, SortDirection, SortKey,
    SortTarget,
};
use crate::models::node_type::{JCR_MIXIN_TYPES, JCR_PATH, JCR_PRIMARY_TYPE, JCR_UUID, NT_BASE};
use crate::models::query::{
    Constraint, DynamicOperand, Operator, Order, QueryLanguage, QueryObjectModel, StaticOperand,
};
use crate::models::{Decimal, NodeId, NormalizedPath, Property, Value, WorkspaceId};
use crate::services::error::{RepositoryError, RepositoryResult};
use crate::services::property_codec::PropertyCodec;
use anyhow::Context;
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One matching node
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub id: NodeId,
    pub path: NormalizedPath,
    pub primary_type: String,
    /// Always `0.0`; relevance scoring is not supported
    pub score: f64,
    /// Column values in [`QueryResult::columns`] order; `None` when the node
    /// lacks the property
    pub values: Vec<Option<Property>>,
}

/// Rows plus the column labels their values line up with
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<QueryRow>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.path.as_str()).collect()
    }
}

/// Node-level field a pseudo-property maps to
fn node_field(property: &str) -> Option<&'static str> {
    match property {
        JCR_PRIMARY_TYPE => Some(FIELD_TYPE),
        JCR_PATH => Some(FIELD_PATH),
        JCR_UUID => Some(FIELD_ID),
        _ => None,
    }
}

/// Anchored regex equivalent of a `LIKE` pattern
///
/// `%` matches any run, `_` any single character, and `\` escapes the next
/// character.
pub fn like_to_regex(pattern: &str) -> String {
    format!("^{}$", like_body(pattern, ".*", "."))
}

/// Unanchored `LIKE` translation with the wildcard expansions supplied
fn like_body(pattern: &str, any_run: &str, any_char: &str) -> String {
    let mut regex = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(any_run),
            '_' => regex.push_str(any_char),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    regex.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex
}

pub struct QueryTranslator {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl QueryTranslator {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Lower `query` to a filter and find options scoped to `workspace`
    pub fn translate(
        &self,
        workspace: WorkspaceId,
        query: &QueryObjectModel,
    ) -> RepositoryResult<(Filter, FindOptions)> {
        if query.language == QueryLanguage::JcrJqom {
            return Err(RepositoryError::unimplemented(
                "queries in the JCR-JQOM language",
            ));
        }

        let mut clauses = vec![Filter::eq(FIELD_WORKSPACE, workspace.as_i64())];
        if let Some(selector) = selector_filter(&query.selector.node_type) {
            clauses.push(selector);
        }
        if let Some(constraint) = &query.constraint {
            clauses.push(lower_constraint(constraint, &query.bind_values)?);
        }

        let mut options = FindOptions::new();
        for ordering in &query.orderings {
            let direction = match ordering.order {
                Order::Ascending => SortDirection::Ascending,
                Order::Descending => SortDirection::Descending,
            };
            options = options.sort_by_key(sort_key(&ordering.operand, direction)?);
        }
        if let Some(offset) = query.offset {
            options = options.skip(offset);
        }
        if let Some(limit) = query.limit {
            options = options.limit(limit);
        }

        Ok((Filter::And(clauses), options))
    }

    /// Run `query` and build result rows
    pub async fn execute(
        &self,
        workspace: WorkspaceId,
        query: &QueryObjectModel,
    ) -> RepositoryResult<QueryResult> {
        let (filter, options) = self.translate(workspace, query)?;
        debug!("Executing query against {}: {:?}", self.collection, filter);

        let documents = self
            .store
            .find(&self.collection, &filter, &options)
            .await
            .context("Failed to execute query")?;

        let columns: Vec<String> = query.columns.iter().map(|c| c.label().to_string()).collect();
        let mut rows = Vec::with_capacity(documents.len());
        for document in documents {
            let node = NodeDocument::from_document(document)?;
            let values = query
                .columns
                .iter()
                .map(|column| column_value(&node, &column.property))
                .collect::<RepositoryResult<Vec<_>>>()?;
            rows.push(QueryRow {
                id: node.id,
                path: node.path,
                primary_type: node.primary_type,
                score: 0.0,
                values,
            });
        }

        Ok(QueryResult { columns, rows })
    }
}

fn selector_filter(node_type: &str) -> Option<Filter> {
    if node_type == NT_BASE {
        return None;
    }
    Some(Filter::Or(vec![
        Filter::eq(FIELD_TYPE, node_type),
        Filter::elem_match(
            FIELD_PROPS,
            Filter::And(vec![
                Filter::eq(PROP_NAME, JCR_MIXIN_TYPES),
                Filter::eq(PROP_VALUE, node_type),
            ]),
        ),
    ]))
}

fn resolve_operand<'a>(
    operand: &'a StaticOperand,
    bind_values: &'a HashMap<String, Value>,
) -> RepositoryResult<&'a Value> {
    match operand {
        StaticOperand::Literal(value) => Ok(value),
        StaticOperand::BindVariable(name) => bind_values
            .get(name)
            .ok_or_else(|| RepositoryError::invalid_query(format!("unbound variable ${}", name))),
    }
}

fn lower_constraint(
    constraint: &Constraint,
    bind_values: &HashMap<String, Value>,
) -> RepositoryResult<Filter> {
    let filter = match constraint {
        Constraint::And(left, right) => Filter::And(vec![
            lower_constraint(left, bind_values)?,
            lower_constraint(right, bind_values)?,
        ]),
        Constraint::Or(left, right) => Filter::Or(vec![
            lower_constraint(left, bind_values)?,
            lower_constraint(right, bind_values)?,
        ]),
        Constraint::Not(inner) => Filter::negate(lower_constraint(inner, bind_values)?),
        Constraint::Comparison {
            operand1,
            operator,
            operand2,
        } => {
            let literal = resolve_operand(operand2, bind_values)?;
            lower_comparison(operand1, *operator, literal)?
        }
        Constraint::PropertyExistence { property } => match node_field(property) {
            Some(_) => Filter::All,
            None => Filter::elem_match(FIELD_PROPS, Filter::eq(PROP_NAME, property.as_str())),
        },
        Constraint::SameNode { path } => {
            Filter::eq(FIELD_PATH, NormalizedPath::validate(path)?.as_str())
        }
        Constraint::ChildNode { parent_path } => {
            Filter::eq(FIELD_PARENT, NormalizedPath::validate(parent_path)?.as_str())
        }
        Constraint::DescendantNode { ancestor_path } => NormalizedPath::validate(ancestor_path)?
            .prefix_predicate()
            .descendants_filter(FIELD_PATH),
        Constraint::FullTextSearch { .. } => {
            return Err(RepositoryError::unimplemented("full-text search"));
        }
    };
    Ok(filter)
}

fn lower_comparison(
    operand: &DynamicOperand,
    operator: Operator,
    literal: &Value,
) -> RepositoryResult<Filter> {
    match operand {
        DynamicOperand::PropertyValue { property } => {
            let stored = PropertyCodec::encode_value(literal)?;
            if let Some(field) = node_field(property) {
                return compare_filter(field, operator, stored, false);
            }
            if operator != Operator::Like {
                if let Some((number, key)) = numeric_forms(literal) {
                    return Ok(property_match(property, numeric_filter(operator, number, key)?));
                }
            }
            let (value_field, stored) = match (literal, stored) {
                (Value::Date(_), Json::Object(mut date)) => (
                    format!("{}.{}", PROP_VALUE, DATE_EPOCH_SECONDS),
                    date.remove(DATE_EPOCH_SECONDS).unwrap_or(Json::Null),
                ),
                (_, stored) => (PROP_VALUE.to_string(), stored),
            };
            Ok(property_match(
                property,
                compare_filter(&value_field, operator, stored, false)?,
            ))
        }
        DynamicOperand::NodeName | DynamicOperand::NodeLocalName => {
            name_filter(operand, operator, literal, false)
        }
        DynamicOperand::LowerCase(inner) | DynamicOperand::UpperCase(inner) => {
            case_insensitive_filter(inner, operator, literal)
        }
        DynamicOperand::FullTextSearchScore => {
            Err(RepositoryError::unimplemented("full-text search score"))
        }
    }
}

/// A numeric literal as a JSON number and as a decimal sort key
fn numeric_forms(literal: &Value) -> Option<(Json, String)> {
    let (number, decimal) = match literal {
        Value::Long(n) => (json!(n), Decimal::parse(&n.to_string()).ok()?),
        Value::Double(n) => (
            Json::Number(serde_json::Number::from_f64(*n)?),
            Decimal::parse(&n.to_string()).ok()?,
        ),
        Value::Decimal(d) => {
            let approx = d.to_canonical().parse::<f64>().ok()?;
            (Json::Number(serde_json::Number::from_f64(approx)?), d.clone())
        }
        _ => return None,
    };
    Some((number, decimal.sort_key()))
}

/// Compares against both numeric stored shapes: plain JSON numbers for
/// longs and doubles, `value.sort_key` for decimals
fn numeric_filter(operator: Operator, number: Json, key: String) -> RepositoryResult<Filter> {
    let key_field = format!("{}.{}", PROP_VALUE, DECIMAL_SORT_KEY);
    let as_number = compare_filter(PROP_VALUE, operator, number, false)?;
    let as_decimal = compare_filter(&key_field, operator, json!(key), false)?;
    Ok(match operator {
        Operator::NotEqualTo => Filter::And(vec![as_number, as_decimal]),
        _ => Filter::Or(vec![as_number, as_decimal]),
    })
}

/// `props` holds an element named `property` that satisfies `value_filter`
fn property_match(property: &str, value_filter: Filter) -> Filter {
    Filter::elem_match(
        FIELD_PROPS,
        Filter::And(vec![Filter::eq(PROP_NAME, property), value_filter]),
    )
}

fn compare_filter(
    field: &str,
    operator: Operator,
    value: Json,
    case_insensitive: bool,
) -> RepositoryResult<Filter> {
    let filter = match operator {
        Operator::EqualTo if case_insensitive => {
            Filter::regex(field, format!("^{}$", regex::escape(text_of(&value)?)), true)
        }
        Operator::NotEqualTo if case_insensitive => Filter::negate(Filter::regex(
            field,
            format!("^{}$", regex::escape(text_of(&value)?)),
            true,
        )),
        Operator::EqualTo => Filter::eq(field, value),
        Operator::NotEqualTo => Filter::ne(field, value),
        Operator::LessThan => Filter::compare(field, CompareOp::Lt, value),
        Operator::LessThanOrEqualTo => Filter::compare(field, CompareOp::Lte, value),
        Operator::GreaterThan => Filter::compare(field, CompareOp::Gt, value),
        Operator::GreaterThanOrEqualTo => Filter::compare(field, CompareOp::Gte, value),
        Operator::Like => Filter::regex(field, like_to_regex(text_of(&value)?), case_insensitive),
    };
    Ok(filter)
}

fn text_of(value: &Json) -> RepositoryResult<&str> {
    value
        .as_str()
        .ok_or_else(|| RepositoryError::invalid_query(format!("{} is not a text literal", value)))
}

/// Regex on the last path segment
fn name_filter(
    operand: &DynamicOperand,
    operator: Operator,
    literal: &Value,
    case_insensitive: bool,
) -> RepositoryResult<Filter> {
    let name = literal.as_text().ok_or_else(|| {
        RepositoryError::invalid_query("node names compare against text literals")
    })?;
    let body = match operator {
        Operator::EqualTo | Operator::NotEqualTo => regex::escape(name),
        // Wildcards stay within the last segment
        Operator::Like => like_body(name, "[^/]*", "[^/]"),
        other => {
            return Err(RepositoryError::invalid_query(format!(
                "{:?} is not supported on node names",
                other
            )));
        }
    };
    // Local names drop the namespace prefix
    let prefix = match operand {
        DynamicOperand::NodeLocalName => "([^/:]*:)?",
        _ => "",
    };
    let filter = Filter::regex(
        FIELD_PATH,
        format!("^(.*/)?{}{}$", prefix, body),
        case_insensitive,
    );
    Ok(match operator {
        Operator::NotEqualTo => Filter::negate(filter),
        _ => filter,
    })
}

fn case_insensitive_filter(
    inner: &DynamicOperand,
    operator: Operator,
    literal: &Value,
) -> RepositoryResult<Filter> {
    if !matches!(
        operator,
        Operator::EqualTo | Operator::NotEqualTo | Operator::Like
    ) {
        return Err(RepositoryError::invalid_query(
            "LOWER/UPPER only support =, <> and LIKE",
        ));
    }
    match inner {
        DynamicOperand::PropertyValue { property } => {
            let text = Json::String(
                literal
                    .as_text()
                    .ok_or_else(|| {
                        RepositoryError::invalid_query("LOWER/UPPER compare against text literals")
                    })?
                    .to_string(),
            );
            match node_field(property) {
                Some(field) => compare_filter(field, operator, text, true),
                None => Ok(property_match(
                    property,
                    compare_filter(PROP_VALUE, operator, text, true)?,
                )),
            }
        }
        DynamicOperand::NodeName | DynamicOperand::NodeLocalName => {
            name_filter(inner, operator, literal, true)
        }
        DynamicOperand::LowerCase(nested) | DynamicOperand::UpperCase(nested) => {
            case_insensitive_filter(nested, operator, literal)
        }
        DynamicOperand::FullTextSearchScore => {
            Err(RepositoryError::unimplemented("full-text search score"))
        }
    }
}

fn sort_key(operand: &DynamicOperand, direction: SortDirection) -> RepositoryResult<SortKey> {
    let target = match operand {
        DynamicOperand::PropertyValue { property } => match node_field(property) {
            Some(field) => SortTarget::Field(field.to_string()),
            None => SortTarget::Element {
                array: FIELD_PROPS.to_string(),
                key_field: PROP_NAME.to_string(),
                key: json!(property),
                value_field: PROP_VALUE.to_string(),
            },
        },
        // Paths order siblings by name
        DynamicOperand::NodeName | DynamicOperand::NodeLocalName => {
            SortTarget::Field(FIELD_PATH.to_string())
        }
        DynamicOperand::LowerCase(inner) | DynamicOperand::UpperCase(inner) => {
            return sort_key(inner, direction);
        }
        DynamicOperand::FullTextSearchScore => {
            return Err(RepositoryError::unimplemented("ordering by score"));
        }
    };
    Ok(SortKey { target, direction })
}

fn column_value(node: &NodeDocument, property: &str) -> RepositoryResult<Option<Property>> {
    let value = match property {
        JCR_PATH => Some(Property::new(JCR_PATH, Value::Path(node.path.to_string()))),
        JCR_PRIMARY_TYPE => Some(Property::new(
            JCR_PRIMARY_TYPE,
            Value::Name(node.primary_type.clone()),
        )),
        JCR_UUID => Some(Property::new(JCR_UUID, Value::String(node.id.to_string()))),
        name => node
            .props
            .iter()
            .find(|p| p.name == name)
            .map(PropertyCodec::decode)
            .transpose()?,
    };
    Ok(value)
}

#[cfg(test)]
#[path = "query_translator_test.rs"]
mod query_translator_test;
