//! Query Object Model
//!
//! Structured form of a parsed query statement: one selector, an optional
//! constraint tree, columns, orderings and pagination. Parsing statements
//! into this model happens outside the crate; the repository only lowers
//! and executes it.
//!
//! # Examples
//!
//! ```rust
//! use treestore_core::models::query::{Constraint, QueryObjectModel};
//!
//! // SELECT * FROM [nt:unstructured] WHERE ISDESCENDANTNODE('/x') LIMIT 10
//! let query = QueryObjectModel::new("nt:unstructured")
//!     .with_constraint(Constraint::descendant_node("/x"))
//!     .with_limit(10);
//! assert_eq!(query.limit, Some(10));
//! ```

use crate::models::Value;
use std::collections::HashMap;

/// Input language of the statement the model was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryLanguage {
    #[default]
    JcrSql2,
    JcrJqom,
}

/// Node type the query selects from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub node_type: String,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    EqualTo,
    NotEqualTo,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    Like,
}

/// Left-hand side of a comparison, evaluated per node
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicOperand {
    PropertyValue { property: String },
    NodeName,
    NodeLocalName,
    LowerCase(Box<DynamicOperand>),
    UpperCase(Box<DynamicOperand>),
    FullTextSearchScore,
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum StaticOperand {
    Literal(Value),
    BindVariable(String),
}

/// Constraint tree
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    And(Box<Constraint>, Box<Constraint>),
    Or(Box<Constraint>, Box<Constraint>),
    Not(Box<Constraint>),
    Comparison {
        operand1: DynamicOperand,
        operator: Operator,
        operand2: StaticOperand,
    },
    PropertyExistence { property: String },
    SameNode { path: String },
    ChildNode { parent_path: String },
    DescendantNode { ancestor_path: String },
    FullTextSearch {
        property: Option<String>,
        expression: String,
    },
}

impl Constraint {
    pub fn and(self, other: Constraint) -> Constraint {
        Constraint::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Constraint) -> Constraint {
        Constraint::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Constraint {
        Constraint::Not(Box::new(self))
    }

    /// `[property] <operator> literal`
    pub fn property(property: &str, operator: Operator, literal: impl Into<Value>) -> Constraint {
        Constraint::Comparison {
            operand1: DynamicOperand::PropertyValue {
                property: property.to_string(),
            },
            operator,
            operand2: StaticOperand::Literal(literal.into()),
        }
    }

    pub fn descendant_node(ancestor_path: &str) -> Constraint {
        Constraint::DescendantNode {
            ancestor_path: ancestor_path.to_string(),
        }
    }

    pub fn child_node(parent_path: &str) -> Constraint {
        Constraint::ChildNode {
            parent_path: parent_path.to_string(),
        }
    }
}

/// A property selected into the result rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub property: String,
    pub column_name: Option<String>,
}

impl Column {
    /// Name the column is reported under
    pub fn label(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.property)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub operand: DynamicOperand,
    pub order: Order,
}

/// A complete parsed query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryObjectModel {
    pub language: QueryLanguage,
    pub selector: Selector,
    pub constraint: Option<Constraint>,
    pub columns: Vec<Column>,
    pub orderings: Vec<Ordering>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub bind_values: HashMap<String, Value>,
}

impl QueryObjectModel {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            language: QueryLanguage::default(),
            selector: Selector {
                node_type: node_type.into(),
            },
            constraint: None,
            columns: Vec::new(),
            orderings: Vec::new(),
            limit: None,
            offset: None,
            bind_values: HashMap::new(),
        }
    }

    pub fn with_language(mut self, language: QueryLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn with_column(mut self, property: &str) -> Self {
        self.columns.push(Column {
            property: property.to_string(),
            column_name: None,
        });
        self
    }

    pub fn order_by(mut self, property: &str, order: Order) -> Self {
        self.orderings.push(Ordering {
            operand: DynamicOperand::PropertyValue {
                property: property.to_string(),
            },
            order,
        });
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.bind_values.insert(name.to_string(), value.into());
        self
    }
}
