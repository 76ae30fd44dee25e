//! Inbound request envelope.

use crate::entity::{Document, EntityType, value_to_key};
use base64::engine::general_purpose::STANDARD;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One entity operation as submitted by a caller.
///
/// ```rust
/// use crud_ledger::service::ServiceRequest;
/// use serde_json::json;
///
/// let request: ServiceRequest = serde_json::from_value(json!({
///     "entityId": 0,
///     "data": {"name": "Quarterly"},
///     "blobs": {"logo": "aGVsbG8="}
/// })).unwrap();
/// assert_eq!(request.entity_id, None);
/// assert_eq!(request.blobs["logo"], b"hello".to_vec());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceRequest {
    /// Key of the target record. Empty strings and numbers below 1 mean none.
    #[serde(deserialize_with = "deserialize_entity_id")]
    pub entity_id: Option<String>,
    pub data: Option<Document>,
    /// Echoed confirmation code from a previous `WARNING` response.
    pub action_code: Option<String>,
    #[serde(with = "base64_blobs")]
    pub blobs: BTreeMap<String, Vec<u8>>,
    pub paging: Option<PageInfo>,
    /// Free-form values made available to service hooks.
    pub context: Map<String, Value>,
}

impl ServiceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity_id(mut self, id: impl Into<Value>) -> Self {
        self.entity_id = normalize_entity_id(&id.into());
        self
    }

    /// Attach a payload. Anything other than a JSON object is ignored.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    pub fn with_action_code(mut self, code: impl Into<String>) -> Self {
        self.action_code = Some(code.into());
        self
    }

    pub fn with_blob(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.blobs.insert(name.into(), bytes);
        self
    }

    pub fn with_paging(mut self, paging: PageInfo) -> Self {
        self.paging = Some(paging);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// The entity id typed for `entity_type`'s key column.
    pub fn typed_entity_id(&self, entity_type: &EntityType) -> Option<Value> {
        self.entity_id
            .as_deref()
            .map(|id| typed_key(entity_type, id))
    }

    /// Whether the caller echoed `code` back.
    pub fn confirms(&self, code: &str) -> bool {
        self.action_code.as_deref() == Some(code)
    }
}

/// Typed key value: numbers for sequence-keyed types, strings otherwise.
pub(crate) fn typed_key(entity_type: &EntityType, id: &str) -> Value {
    if entity_type.has_numeric_key() {
        if let Ok(number) = id.trim().parse::<i64>() {
            return Value::from(number);
        }
    }
    Value::String(id.to_string())
}

fn normalize_entity_id(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(number) => number.as_i64().filter(|id| *id >= 1).map(|id| id.to_string()),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<i64>() {
                Ok(id) if id < 1 => None,
                _ => Some(trimmed.to_string()),
            }
        }
        other => Some(value_to_key(other)),
    }
}

fn deserialize_entity_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    match value {
        Value::Null | Value::Number(_) | Value::String(_) => Ok(normalize_entity_id(&value)),
        other => Err(D::Error::custom(format!(
            "entityId must be a string or number, got {}",
            other
        ))),
    }
}

mod base64_blobs {
    use super::{BTreeMap, Deserialize, Deserializer, STANDARD, Serialize, Serializer};
    use base64::Engine as _;
    use serde::de::Error as _;

    pub fn serialize<S>(blobs: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: BTreeMap<&str, String> = blobs
            .iter()
            .map(|(name, bytes)| (name.as_str(), STANDARD.encode(bytes)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default();
        encoded
            .into_iter()
            .map(|(name, text)| {
                STANDARD
                    .decode(text.as_bytes())
                    .map(|bytes| (name.clone(), bytes))
                    .map_err(|e| D::Error::custom(format!("blob '{}' is not valid base64: {}", name, e)))
            })
            .collect()
    }
}

/// Paging, sorting and filtering for list requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInfo {
    pub limit: Option<usize>,
    /// One-based page number, used when `start` is absent.
    pub page: Option<usize>,
    pub start: Option<usize>,
    pub sorters: Vec<SortSpec>,
    pub filters: Vec<FilterSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub property: String,
    #[serde(default = "default_direction")]
    pub direction: String,
}

fn default_direction() -> String {
    "ASC".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub property: String,
    #[serde(default)]
    pub value: Value,
}

impl PageInfo {
    pub fn new(start: usize, limit: usize) -> Self {
        Self {
            start: Some(start),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn sort(mut self, property: impl Into<String>, direction: impl Into<String>) -> Self {
        self.sorters.push(SortSpec {
            property: property.into(),
            direction: direction.into(),
        });
        self
    }

    pub fn filter(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FilterSpec {
            property: property.into(),
            value: value.into(),
        });
        self
    }

    /// First row of the page.
    pub fn offset(&self) -> usize {
        match (self.start, self.page, self.limit) {
            (Some(start), _, _) => start,
            (None, Some(page), Some(limit)) => page.saturating_sub(1).saturating_mul(limit),
            _ => 0,
        }
    }

    /// Sorters as ordered `(field, direction)` pairs.
    pub fn sorter_pairs(&self) -> Vec<(String, String)> {
        self.sorters
            .iter()
            .map(|sorter| (sorter.property.clone(), sorter.direction.clone()))
            .collect()
    }

    /// Filters as ordered `(field, value)` pairs.
    ///
    /// A property filtered more than once keeps its first position and
    /// collects every value, joined with `|`.
    pub fn filter_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for filter in &self.filters {
            let value = match &filter.value {
                Value::Null => String::new(),
                other => value_to_key(other),
            };
            match pairs.iter_mut().find(|(field, _)| field == &filter.property) {
                Some((_, existing)) if existing.is_empty() => *existing = value,
                Some((_, existing)) => {
                    if !value.is_empty() {
                        existing.push('|');
                        existing.push_str(&value);
                    }
                }
                None => pairs.push((filter.property.clone(), value)),
            }
        }
        pairs
    }
}
