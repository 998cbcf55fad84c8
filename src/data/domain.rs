//! Core data definitions: attribute schema, values and instances.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::{PrequelError, PrequelResult};

/// Opaque identifier for chunks. Issued once, never reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub u64);

impl ChunkId {
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// The id issued right after this one.
    pub fn next(&self) -> Self {
        ChunkId(self.0 + 1)
    }
}

impl From<u64> for ChunkId {
    fn from(value: u64) -> Self {
        ChunkId(value)
    }
}

impl From<ChunkId> for u64 {
    fn from(value: ChunkId) -> Self {
        value.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared type of an attribute field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Integer,
    Bigint,
    Smallint,
    Real,
    Text,
    TextId,
}

impl FieldType {
    /// Whether `value` may be stored in a field of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Smallint, Value::Int(v)) => i16::try_from(*v).is_ok(),
            (FieldType::Integer, Value::Int(v)) => i32::try_from(*v).is_ok(),
            (FieldType::Bigint, Value::Int(_)) => true,
            (FieldType::Real, Value::Real(v)) => v.is_finite(),
            (FieldType::Real, Value::Int(_)) => true,
            (FieldType::Text | FieldType::TextId, Value::Text(_)) => true,
            _ => false,
        }
    }

    /// Parse a raw cell into a value of this type.
    pub fn parse(&self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match self {
            FieldType::Smallint => raw.parse::<i16>().ok().map(|v| Value::Int(v.into())),
            FieldType::Integer => raw.parse::<i32>().ok().map(|v| Value::Int(v.into())),
            FieldType::Bigint => raw.parse().ok().map(Value::Int),
            FieldType::Real => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Real),
            FieldType::Text | FieldType::TextId => Some(Value::Text(raw.to_string())),
        }
    }
}

/// Single field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Numeric view, `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// Value of the designated label field, in canonical text form.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub String);

impl Label {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Value> for Label {
    fn from(value: &Value) -> Self {
        Label(value.to_string())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Feature values keyed by field name.
pub type FeatureMap = BTreeMap<String, Value>;

/// Labeled instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub features: FeatureMap,
    pub label: Label,
}

impl Instance {
    pub fn new(features: FeatureMap, label: impl Into<String>) -> Self {
        Self {
            features,
            label: Label::new(label),
        }
    }
}

/// Attribute schema: declared fields, the feature subset and the label field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub revision: i64,
    pub fields: BTreeMap<String, FieldType>,
    pub x: Vec<String>,
    pub y: Option<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            revision: 0,
            fields: BTreeMap::new(),
            x: Vec::new(),
            y: None,
        }
    }
}

fn good_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl Schema {
    /// Check the declaration itself before any chunk references it.
    pub fn validate(&self) -> PrequelResult<()> {
        let mut seen = BTreeSet::new();
        for name in self.fields.keys() {
            if name.eq_ignore_ascii_case("id") {
                return Err(PrequelError::schema("`id` is a reserved field name"));
            }
            if !good_name(name) {
                return Err(PrequelError::schema(format!("invalid field name: {name}")));
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(PrequelError::schema(format!("duplicated field name: {name}")));
            }
        }

        let y = self
            .y
            .as_deref()
            .ok_or_else(|| PrequelError::schema("label field `y` is not declared"))?;
        if !self.fields.contains_key(y) {
            return Err(PrequelError::schema(format!("label field `{y}` is not a declared field")));
        }
        if self.x.is_empty() {
            return Err(PrequelError::schema("no feature fields in `x`"));
        }
        let mut xs = BTreeSet::new();
        for name in &self.x {
            if !self.fields.contains_key(name) {
                return Err(PrequelError::schema(format!("feature `{name}` is not a declared field")));
            }
            if name == y {
                return Err(PrequelError::schema(format!("`{name}` cannot be both feature and label")));
            }
            if !xs.insert(name.as_str()) {
                return Err(PrequelError::schema(format!("feature `{name}` listed twice")));
            }
        }
        Ok(())
    }

    /// Label field name. Only valid on a validated schema.
    pub fn label_field(&self) -> PrequelResult<&str> {
        self.y
            .as_deref()
            .ok_or_else(|| PrequelError::schema("label field `y` is not declared"))
    }

    /// Instance must carry exactly the declared features, each well typed,
    /// and a label that parses as the declared type of `y`.
    pub fn check_instance(&self, instance: &Instance) -> PrequelResult<()> {
        self.check_features(&instance.features)?;
        self.parse_cell(self.label_field()?, instance.label.as_str())?;
        if instance.features.len() != self.x.len() {
            let extra: Vec<&str> = instance
                .features
                .keys()
                .filter(|k| !self.x.contains(k))
                .map(String::as_str)
                .collect();
            return Err(PrequelError::schema(format!(
                "undeclared field(s): {}",
                extra.join(",")
            )));
        }
        Ok(())
    }

    /// Every declared feature must be present and well typed. Extra keys are ignored.
    pub fn check_features(&self, features: &FeatureMap) -> PrequelResult<()> {
        for name in &self.x {
            let value = features
                .get(name)
                .ok_or_else(|| PrequelError::schema(format!("missing field: {name}")))?;
            let ty = self
                .fields
                .get(name)
                .ok_or_else(|| PrequelError::schema(format!("feature `{name}` is not declared")))?;
            if !ty.accepts(value) {
                return Err(PrequelError::schema(format!(
                    "field `{name}` expects {ty:?}, got `{value}`"
                )));
            }
        }
        Ok(())
    }

    /// Parse one raw cell of field `name`.
    pub fn parse_cell(&self, name: &str, raw: &str) -> PrequelResult<Value> {
        let ty = self
            .fields
            .get(name)
            .ok_or_else(|| PrequelError::schema(format!("undeclared field: {name}")))?;
        ty.parse(raw)
            .ok_or_else(|| PrequelError::schema(format!("field `{name}`: cannot parse `{raw}` as {ty:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        let mut fields = BTreeMap::new();
        fields.insert("age".to_string(), FieldType::Integer);
        fields.insert("salary".to_string(), FieldType::Real);
        fields.insert("group".to_string(), FieldType::TextId);
        Schema {
            revision: 0,
            fields,
            x: vec!["age".into(), "salary".into()],
            y: Some("group".into()),
        }
    }

    fn features(age: i64, salary: f64) -> FeatureMap {
        let mut f = FeatureMap::new();
        f.insert("age".into(), Value::Int(age));
        f.insert("salary".into(), Value::Real(salary));
        f
    }

    #[test]
    fn valid_schema_passes() {
        schema().validate().unwrap();
    }

    #[test]
    fn schema_rejects_reserved_and_bad_names() {
        let mut s = schema();
        s.fields.insert("ID".into(), FieldType::Integer);
        assert!(s.validate().is_err());

        let mut s = schema();
        s.fields.insert("bad name".into(), FieldType::Integer);
        assert!(s.validate().is_err());
    }

    #[test]
    fn schema_rejects_label_in_features() {
        let mut s = schema();
        s.x.push("group".into());
        assert!(s.validate().is_err());
    }

    #[test]
    fn schema_requires_label() {
        let mut s = schema();
        s.y = None;
        assert!(matches!(s.validate(), Err(PrequelError::Schema(_))));
    }

    #[test]
    fn check_instance_flags_missing_and_undeclared_fields() {
        let s = schema();
        let ok = Instance::new(features(30, 1.5), "a");
        s.check_instance(&ok).unwrap();

        let mut missing = features(30, 1.5);
        missing.remove("salary");
        assert!(s.check_instance(&Instance::new(missing, "a")).is_err());

        let mut extra = features(30, 1.5);
        extra.insert("zip".into(), Value::Text("x".into()));
        let err = s.check_instance(&Instance::new(extra, "a")).unwrap_err();
        assert!(err.to_string().contains("zip"));
    }

    #[test]
    fn check_instance_types_the_label() {
        let mut s = schema();
        s.fields.insert("group".into(), FieldType::Integer);
        s.check_instance(&Instance::new(features(30, 1.5), "3")).unwrap();
        let err = s
            .check_instance(&Instance::new(features(30, 1.5), "not-an-int"))
            .unwrap_err();
        assert!(matches!(err, PrequelError::Schema(_)));
        assert!(err.to_string().contains("group"));
    }

    #[test]
    fn integer_widths_are_enforced() {
        assert_eq!(FieldType::Smallint.parse("32767"), Some(Value::Int(32767)));
        assert_eq!(FieldType::Smallint.parse("32768"), None);
        assert_eq!(FieldType::Integer.parse("2147483648"), None);
        assert_eq!(FieldType::Bigint.parse("2147483648"), Some(Value::Int(2_147_483_648)));

        assert!(!FieldType::Smallint.accepts(&Value::Int(40_000)));
        assert!(FieldType::Integer.accepts(&Value::Int(40_000)));
        assert!(!FieldType::Integer.accepts(&Value::Int(i64::MAX)));
        assert!(FieldType::Bigint.accepts(&Value::Int(i64::MAX)));
    }

    #[test]
    fn real_field_accepts_integer_but_not_text() {
        let s = schema();
        let mut f = features(30, 1.0);
        f.insert("salary".into(), Value::Int(2));
        s.check_features(&f).unwrap();
        f.insert("salary".into(), Value::Text("2".into()));
        assert!(s.check_features(&f).is_err());
    }

    #[test]
    fn parse_cell_by_type() {
        let s = schema();
        assert_eq!(s.parse_cell("age", " 41 ").unwrap(), Value::Int(41));
        assert_eq!(s.parse_cell("salary", "2.5").unwrap(), Value::Real(2.5));
        assert!(s.parse_cell("age", "old").is_err());
        assert!(s.parse_cell("salary", "NaN").is_err());
        assert!(s.parse_cell("nope", "1").is_err());
    }

    #[test]
    fn untagged_values_roundtrip_through_json() {
        let json = serde_json::to_string(&features(3, 0.5)).unwrap();
        assert_eq!(json, r#"{"age":3,"salary":0.5}"#);
        let back: FeatureMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back["age"], Value::Int(3));
    }
}
