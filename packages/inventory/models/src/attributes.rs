//! Typed passthrough attributes with declared, versioned schemas.
//!
//! Every entity carries its source properties split in two: values whose
//! key and JSON type match the entity's [`AttributeSchema`] are stored as
//! typed [`AttributeValue`]s, and everything else lands in an opaque
//! `extra` map that is copied through untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

/// Current schema version for footprint attributes.
pub const FOOTPRINT_SCHEMA_VERSION: u32 = 1;

/// Current schema version for parcel attributes.
pub const PARCEL_SCHEMA_VERSION: u32 = 1;

/// Which entity a schema describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    /// A building footprint.
    Footprint,
    /// A property parcel.
    Parcel,
}

/// The declared type of an attribute.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttributeKind {
    Text,
    Integer,
    Float,
    Boolean,
}

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Converts a JSON value into a typed value of the given kind.
    ///
    /// Returns `None` when the JSON type does not fit `kind`. `null` is
    /// accepted for every kind. Integers are accepted where a float is
    /// declared.
    #[must_use]
    pub fn from_json(value: &Value, kind: AttributeKind) -> Option<Self> {
        match (kind, value) {
            (_, Value::Null) => Some(Self::Null),
            (AttributeKind::Text, Value::String(s)) => Some(Self::Text(s.clone())),
            (AttributeKind::Integer, Value::Number(n)) => n.as_i64().map(Self::Integer),
            (AttributeKind::Float, Value::Number(n)) => n.as_f64().map(Self::Float),
            (AttributeKind::Boolean, Value::Bool(b)) => Some(Self::Boolean(*b)),
            _ => None,
        }
    }

    /// Converts back to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

/// A declared attribute field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: AttributeKind,
}

const fn field(name: &'static str, kind: AttributeKind) -> FieldDef {
    FieldDef { name, kind }
}

/// The declared attribute schema of one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSchema {
    pub entity: EntityKind,
    pub version: u32,
    pub fields: &'static [FieldDef],
}

impl AttributeSchema {
    /// Looks up a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Structure-detail fields carried on every footprint.
pub const FOOTPRINT_SCHEMA: AttributeSchema = AttributeSchema {
    entity: EntityKind::Footprint,
    version: FOOTPRINT_SCHEMA_VERSION,
    fields: &[
        field("roof_shape_majority", AttributeKind::Text),
        field("roof_material_majority", AttributeKind::Text),
        field("roof_condition_general", AttributeKind::Text),
        field("roof_tree_overlap_pct", AttributeKind::Float),
        field("is_primary", AttributeKind::Boolean),
        field("vexcel_collection_name", AttributeKind::Text),
    ],
};

/// Property-feature fields carried on every parcel.
pub const PARCEL_SCHEMA: AttributeSchema = AttributeSchema {
    entity: EntityKind::Parcel,
    version: PARCEL_SCHEMA_VERSION,
    fields: &[
        field("has_pool", AttributeKind::Boolean),
        field("pools_total_area", AttributeKind::Float),
        field("has_trampoline", AttributeKind::Boolean),
        field("trampoline_ct", AttributeKind::Integer),
        field("has_wooden_deck", AttributeKind::Boolean),
        field("wooden_deck_area", AttributeKind::Float),
        field("has_enclosure", AttributeKind::Boolean),
        field("enclosure_area", AttributeKind::Float),
        field("has_tennis_court", AttributeKind::Boolean),
        field("tennis_court_ct", AttributeKind::Integer),
        field("has_basketball_court", AttributeKind::Boolean),
        field("basketball_court_ct", AttributeKind::Integer),
        field("has_sport_pitch", AttributeKind::Boolean),
        field("sport_pitch_ct", AttributeKind::Integer),
    ],
};

/// Passthrough attributes of one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    /// Version of the schema `declared` was validated against.
    pub schema_version: u32,
    /// Values matching a declared field and its kind.
    pub declared: BTreeMap<String, AttributeValue>,
    /// Undeclared keys and values of the wrong type. Never interpreted.
    pub extra: BTreeMap<String, Value>,
}

impl Attributes {
    /// Creates an empty attribute set for `schema`.
    #[must_use]
    pub const fn empty(schema: &AttributeSchema) -> Self {
        Self {
            schema_version: schema.version,
            declared: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Splits raw properties into declared and extra values.
    ///
    /// Keys listed in `skip` (typically the id and join-key fields, which
    /// the entity already holds) are left out entirely.
    #[must_use]
    pub fn from_properties(
        schema: &AttributeSchema,
        properties: &serde_json::Map<String, Value>,
        skip: &[&str],
    ) -> Self {
        let mut attrs = Self::empty(schema);

        for (key, value) in properties {
            if skip.contains(&key.as_str()) {
                continue;
            }
            let typed = schema
                .field(key)
                .and_then(|def| AttributeValue::from_json(value, def.kind));
            match typed {
                Some(typed) => {
                    attrs.declared.insert(key.clone(), typed);
                }
                None => {
                    attrs.extra.insert(key.clone(), value.clone());
                }
            }
        }

        attrs
    }

    /// Returns a declared value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.declared.get(name)
    }

    /// Total number of carried keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declared.len() + self.extra.len()
    }

    /// Whether no keys are carried.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty() && self.extra.is_empty()
    }

    /// Flattens back into a JSON property map, prefixing every key with
    /// `prefix`.
    #[must_use]
    pub fn to_properties(&self, prefix: &str) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.declared {
            map.insert(format!("{prefix}{key}"), value.to_json());
        }
        for (key, value) in &self.extra {
            map.insert(format!("{prefix}{key}"), value.clone());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn splits_declared_and_extra() {
        let properties = props(serde_json::json!({
            "structure_id": "s-1",
            "roof_shape_majority": "hip",
            "roof_tree_overlap_pct": 12,
            "is_primary": "yes",
            "sensor": "ultracam",
        }));

        let attrs = Attributes::from_properties(&FOOTPRINT_SCHEMA, &properties, &["structure_id"]);

        assert_eq!(attrs.schema_version, FOOTPRINT_SCHEMA_VERSION);
        assert_eq!(
            attrs.get("roof_shape_majority"),
            Some(&AttributeValue::Text("hip".to_string()))
        );
        assert_eq!(
            attrs.get("roof_tree_overlap_pct"),
            Some(&AttributeValue::Float(12.0))
        );
        // Wrong type for a declared field goes to extra, not dropped.
        assert!(attrs.get("is_primary").is_none());
        assert_eq!(attrs.extra.get("is_primary"), Some(&Value::from("yes")));
        assert_eq!(attrs.extra.get("sensor"), Some(&Value::from("ultracam")));
        assert!(!attrs.declared.contains_key("structure_id"));
        assert!(!attrs.extra.contains_key("structure_id"));
        assert_eq!(attrs.len(), 4);
    }

    #[test]
    fn null_is_accepted_for_any_kind() {
        assert_eq!(
            AttributeValue::from_json(&Value::Null, AttributeKind::Integer),
            Some(AttributeValue::Null)
        );
    }

    #[test]
    fn integer_rejects_fractional_numbers() {
        let value = serde_json::json!(2.5);
        assert!(AttributeValue::from_json(&value, AttributeKind::Integer).is_none());
    }

    #[test]
    fn prefixes_flattened_properties() {
        let properties = props(serde_json::json!({ "has_pool": true, "zoning": "R2" }));
        let attrs = Attributes::from_properties(&PARCEL_SCHEMA, &properties, &[]);
        let flat = attrs.to_properties("parcel_");

        assert_eq!(flat.get("parcel_has_pool"), Some(&Value::Bool(true)));
        assert_eq!(flat.get("parcel_zoning"), Some(&Value::from("R2")));
    }
}
