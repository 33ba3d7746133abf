//! Property Codec
//!
//! Converts between in-memory [`Property`] values and their stored shape
//! ([`EncodedProperty`]).
//!
//! # Stored shapes
//!
//! | Type | Stored as |
//! |---|---|
//! | String, Name, Path, Uri | JSON string |
//! | Boolean, Long, Double | JSON scalar |
//! | Decimal | `{"sort_key": "<numeric-order key>", "text": "<canonical decimal>"}` |
//! | Date | `{"epoch_seconds": i64, "timezone": "<IANA name>"}` |
//! | Binary | byte length; bytes go to the [`BinaryStore`] |
//! | Reference, WeakReference | target id as a hyphenated UUID string |
//!
//! Multi-valued properties store a JSON array of the element shapes.
//!
//! # Multiplicity
//!
//! The effective property definition is looked up through the node-type
//! catalog (primary type, mixins, supertypes; residual definitions last).
//! A single value written to a property declared multiple is promoted to a
//! one-element list. A list written to a property declared single fails.

use crate::db::schema::{DATE_EPOCH_SECONDS, DATE_TIMEZONE, DECIMAL_SORT_KEY, DECIMAL_TEXT};
use crate::db::{BinaryStore, BlobKey, EncodedProperty, NodeDocument};
use crate::models::node_type::{
    effective_property_definition, is_node_type, JCR_PRIMARY_TYPE, JCR_UUID, MIX_REFERENCEABLE,
};
use crate::models::{
    Binary, DateValue, Decimal, Node, NodeId, NodeTypeCatalog, NormalizedPath, Property,
    PropertyState, PropertyType, Value, WorkspaceId,
};
use crate::services::error::{RepositoryError, RepositoryResult};
use serde_json::{json, Value as Json};
use std::sync::Arc;
use tracing::debug;

/// Whether the whole node is being written or a single property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// Every property is encoded
    WholeNode,
    /// Properties unchanged since load are skipped
    SingleProperty,
}

/// Names stored as node-level fields instead of property entries
pub fn is_protected(name: &str) -> bool {
    name == JCR_UUID || name == JCR_PRIMARY_TYPE
}

pub struct PropertyCodec {
    catalog: Arc<dyn NodeTypeCatalog>,
    binaries: Arc<dyn BinaryStore>,
}

impl PropertyCodec {
    pub fn new(catalog: Arc<dyn NodeTypeCatalog>, binaries: Arc<dyn BinaryStore>) -> Self {
        Self { catalog, binaries }
    }

    pub fn catalog(&self) -> &dyn NodeTypeCatalog {
        self.catalog.as_ref()
    }

    /// True when `mix:referenceable` is reachable from the node's primary
    /// type or mixins
    pub fn is_referenceable(&self, node: &Node) -> bool {
        self.is_referenceable_type(&node.type_names())
    }

    pub fn is_referenceable_type(&self, type_names: &[&str]) -> bool {
        is_node_type(self.catalog.as_ref(), type_names, MIX_REFERENCEABLE)
    }

    /// Encode one property of `node`
    ///
    /// Returns `None` for protected names and, in
    /// [`EncodeMode::SingleProperty`], for clean properties. Binary bytes are
    /// written to the blob store as a side effect.
    pub async fn encode(
        &self,
        node: &Node,
        property: &Property,
        mode: EncodeMode,
    ) -> RepositoryResult<Option<EncodedProperty>> {
        if is_protected(property.name()) {
            return Ok(None);
        }
        if mode == EncodeMode::SingleProperty && property.is_clean() {
            debug!("Skipping unmodified property {}", property.name());
            return Ok(None);
        }

        let type_names = node.type_names();
        let definition = effective_property_definition(
            self.catalog.as_ref(),
            &type_names,
            property.name(),
            property.is_multiple(),
        );

        let multiple = match &definition {
            Some(def) if def.multiple => true,
            Some(def) if property.is_multiple() => {
                return Err(RepositoryError::value_format(format!(
                    "{} is declared single-valued by {} but has multiple values",
                    property.name(),
                    def.declaring_type
                )));
            }
            _ => property.is_multiple(),
        };

        if let Some(required) = definition.as_ref().and_then(|def| def.required_type) {
            if required != property.property_type() {
                return Err(RepositoryError::value_format(format!(
                    "{} requires {} values, got {}",
                    property.name(),
                    required,
                    property.property_type()
                )));
            }
        }

        if property.property_type().is_reference() && !self.is_referenceable(node) {
            return Err(RepositoryError::value_format(format!(
                "{} holds a reference but {} is not referenceable",
                property.name(),
                node.path
            )));
        }

        let property_path = node.path.property_path(property.name());
        let mut stored = Vec::with_capacity(property.values().len());
        for (index, value) in property.values().iter().enumerate() {
            let encoded = match value {
                Value::Binary(Binary::Inline(bytes)) => {
                    let key = BlobKey::new(property_path.clone(), node.workspace, index as u32);
                    self.binaries.put(&key, bytes).await?;
                    debug!("Stored {} bytes at {}", bytes.len(), key);
                    json!(bytes.len() as u64)
                }
                other => Self::encode_value(other)?,
            };
            stored.push(encoded);
        }

        let value = if multiple {
            Json::Array(stored)
        } else {
            stored.into_iter().next().unwrap_or(Json::Null)
        };

        Ok(Some(EncodedProperty {
            name: property.name().to_string(),
            property_type: property.property_type(),
            multiple,
            value,
        }))
    }

    /// Encode every property of `node` in whole-node mode
    pub async fn encode_node(&self, node: &Node) -> RepositoryResult<Vec<EncodedProperty>> {
        let mut encoded = Vec::with_capacity(node.properties().len());
        for property in node.properties() {
            if let Some(entry) = self.encode(node, property, EncodeMode::WholeNode).await? {
                encoded.push(entry);
            }
        }
        Ok(encoded)
    }

    /// Stored shape of a single value
    ///
    /// Binary values encode to their length without touching the blob store,
    /// which is what query literals need.
    pub fn encode_value(value: &Value) -> RepositoryResult<Json> {
        let encoded = match value {
            Value::String(s) | Value::Name(s) | Value::Path(s) | Value::Uri(s) => json!(s),
            Value::Boolean(b) => json!(b),
            Value::Long(n) => json!(n),
            Value::Double(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .ok_or_else(|| {
                    RepositoryError::value_format(format!("{} can not be stored as a double", n))
                })?,
            Value::Decimal(d) => json!({
                DECIMAL_SORT_KEY: d.sort_key(),
                DECIMAL_TEXT: d.to_canonical(),
            }),
            Value::Date(d) => json!({
                DATE_EPOCH_SECONDS: d.epoch_seconds(),
                DATE_TIMEZONE: d.zone_name(),
            }),
            Value::Binary(b) => json!(b.len()),
            Value::Reference(id) | Value::WeakReference(id) => json!(id.to_string()),
        };
        Ok(encoded)
    }

    /// Decode a stored property; the result is marked clean
    pub fn decode(encoded: &EncodedProperty) -> RepositoryResult<Property> {
        let values = if encoded.multiple {
            let Json::Array(items) = &encoded.value else {
                return Err(RepositoryError::value_format(format!(
                    "multi-valued property {} is not stored as a list",
                    encoded.name
                )));
            };
            items
                .iter()
                .map(|item| decode_value(encoded.property_type, item))
                .collect::<RepositoryResult<Vec<_>>>()?
        } else {
            vec![decode_value(encoded.property_type, &encoded.value)?]
        };

        Ok(Property::from_parts(
            encoded.name.clone(),
            encoded.property_type,
            encoded.multiple,
            values,
            PropertyState::Clean,
        )?)
    }

    /// Rebuild a node from its document
    pub fn decode_node(document: &NodeDocument) -> RepositoryResult<Node> {
        let mut node = Node::with_id(
            document.id,
            document.workspace,
            document.path.clone(),
            document.primary_type.clone(),
        );
        for encoded in &document.props {
            node.push_loaded_property(Self::decode(encoded)?);
        }
        Ok(node)
    }

    /// Bytes of one binary value
    pub async fn fetch_binary(
        &self,
        workspace: WorkspaceId,
        node_path: &NormalizedPath,
        property_name: &str,
        index: u32,
    ) -> RepositoryResult<Option<Vec<u8>>> {
        let key = BlobKey::new(node_path.property_path(property_name), workspace, index);
        Ok(self.binaries.get(&key).await?)
    }

    /// Copy the blobs of every binary property of `source` to the same
    /// property names under `target_path` in `target_workspace`
    ///
    /// The source blobs stay in place.
    pub async fn relocate_binaries(
        &self,
        source: &NodeDocument,
        target_path: &NormalizedPath,
        target_workspace: WorkspaceId,
    ) -> RepositoryResult<usize> {
        let mut relocated = 0;
        for encoded in source
            .props
            .iter()
            .filter(|p| p.property_type == PropertyType::Binary)
        {
            let count = match &encoded.value {
                Json::Array(items) if encoded.multiple => items.len(),
                _ => 1,
            };
            for index in 0..count as u32 {
                let from = BlobKey::new(
                    source.path.property_path(&encoded.name),
                    source.workspace,
                    index,
                );
                let Some(bytes) = self.binaries.get(&from).await? else {
                    continue;
                };
                let to = BlobKey::new(
                    target_path.property_path(&encoded.name),
                    target_workspace,
                    index,
                );
                self.binaries.put(&to, &bytes).await?;
                relocated += 1;
            }
        }
        Ok(relocated)
    }
}

fn decode_value(property_type: PropertyType, stored: &Json) -> RepositoryResult<Value> {
    let malformed = || {
        RepositoryError::value_format(format!(
            "stored value {} is not a valid {}",
            stored, property_type
        ))
    };

    let value = match property_type {
        PropertyType::String => Value::String(stored.as_str().ok_or_else(malformed)?.to_string()),
        PropertyType::Name => Value::Name(stored.as_str().ok_or_else(malformed)?.to_string()),
        PropertyType::Path => Value::Path(stored.as_str().ok_or_else(malformed)?.to_string()),
        PropertyType::Uri => Value::Uri(stored.as_str().ok_or_else(malformed)?.to_string()),
        PropertyType::Boolean => Value::Boolean(stored.as_bool().ok_or_else(malformed)?),
        PropertyType::Long => Value::Long(stored.as_i64().ok_or_else(malformed)?),
        PropertyType::Double => Value::Double(stored.as_f64().ok_or_else(malformed)?),
        PropertyType::Decimal => {
            let literal = match stored {
                Json::Object(fields) => fields
                    .get(DECIMAL_TEXT)
                    .and_then(Json::as_str)
                    .ok_or_else(malformed)?
                    .to_string(),
                Json::String(s) => s.clone(),
                Json::Number(n) => n.to_string(),
                _ => return Err(malformed()),
            };
            Value::Decimal(Decimal::parse(&literal)?)
        }
        PropertyType::Date => {
            let seconds = stored
                .get(DATE_EPOCH_SECONDS)
                .and_then(Json::as_i64)
                .ok_or_else(malformed)?;
            let zone = stored
                .get(DATE_TIMEZONE)
                .and_then(Json::as_str)
                .unwrap_or("UTC");
            Value::Date(DateValue::from_epoch_seconds(seconds, zone)?)
        }
        PropertyType::Binary => Value::Binary(Binary::Stored {
            length: stored.as_u64().ok_or_else(malformed)?,
        }),
        PropertyType::Reference | PropertyType::WeakReference => {
            let id = stored
                .as_str()
                .and_then(|s| NodeId::parse(s).ok())
                .ok_or_else(malformed)?;
            if property_type == PropertyType::Reference {
                Value::Reference(id)
            } else {
                Value::WeakReference(id)
            }
        }
    };
    Ok(value)
}
