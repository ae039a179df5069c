//! Record schema: ordered input names and their type tags
//!
//! Supported type tags:
//! - int: integer number
//! - float: any number
//! - str: UTF-8 string
//! - boolean: bool
//! - list / vector / nparray: JSON array
//! - image_array / gray16_array / image: string reference to an external asset
//!
//! `null` is accepted for every tag. Inputs may be omitted from a record,
//! undeclared fields may not.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{TubError, TubResult};

/// Prefix reserved for system fields such as `_index`
pub const SYSTEM_FIELD_PREFIX: char = '_';

/// Type tag of one input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Float,
    Str,
    Boolean,
    List,
    Vector,
    #[serde(rename = "nparray")]
    NdArray,
    ImageArray,
    #[serde(rename = "gray16_array")]
    Gray16Array,
    Image,
}

impl FieldType {
    /// Returns the tag as stored in the manifest
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Str => "str",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Vector => "vector",
            FieldType::NdArray => "nparray",
            FieldType::ImageArray => "image_array",
            FieldType::Gray16Array => "gray16_array",
            FieldType::Image => "image",
        }
    }

    /// Whether values of this type reference an externally stored asset
    pub fn is_asset(&self) -> bool {
        matches!(
            self,
            FieldType::ImageArray | FieldType::Gray16Array | FieldType::Image
        )
    }

    /// Whether `value` is acceptable for this type
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Str => value.is_string(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::List | FieldType::Vector | FieldType::NdArray => value.is_array(),
            FieldType::ImageArray | FieldType::Gray16Array | FieldType::Image => {
                value.is_string()
            }
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = TubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(FieldType::Int),
            "float" => Ok(FieldType::Float),
            "str" => Ok(FieldType::Str),
            "boolean" => Ok(FieldType::Boolean),
            "list" => Ok(FieldType::List),
            "vector" => Ok(FieldType::Vector),
            "nparray" => Ok(FieldType::NdArray),
            "image_array" => Ok(FieldType::ImageArray),
            "gray16_array" => Ok(FieldType::Gray16Array),
            "image" => Ok(FieldType::Image),
            other => Err(TubError::invalid_schema(format!("Unknown type tag: '{}'", other))),
        }
    }
}

/// Ordered inputs with one type tag each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    inputs: Vec<String>,
    types: Vec<FieldType>,
}

impl Schema {
    /// Builds a schema from parallel input and type lists.
    ///
    /// # Errors
    ///
    /// `TUB_INVALID_SCHEMA` if the lists differ in length, an input is
    /// empty, duplicated or starts with `_`.
    pub fn new(inputs: Vec<String>, types: Vec<FieldType>) -> TubResult<Self> {
        if inputs.len() != types.len() {
            return Err(TubError::invalid_schema(format!(
                "{} inputs but {} types",
                inputs.len(),
                types.len()
            )));
        }

        let mut seen = HashSet::with_capacity(inputs.len());
        for name in &inputs {
            if name.is_empty() {
                return Err(TubError::invalid_schema("Empty input name"));
            }
            if name.starts_with(SYSTEM_FIELD_PREFIX) {
                return Err(TubError::invalid_schema(format!(
                    "Input '{}' uses the reserved '_' prefix",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(TubError::invalid_schema(format!("Duplicate input '{}'", name)));
            }
        }

        Ok(Self { inputs, types })
    }

    /// Builds a schema from string slices, parsing the type tags
    pub fn parse<S: AsRef<str>, T: AsRef<str>>(inputs: &[S], types: &[T]) -> TubResult<Self> {
        let types = types
            .iter()
            .map(|t| t.as_ref().parse::<FieldType>())
            .collect::<TubResult<Vec<_>>>()?;
        let inputs = inputs.iter().map(|s| s.as_ref().to_string()).collect();
        Self::new(inputs, types)
    }

    /// Ordered input names
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Ordered type tags
    pub fn types(&self) -> &[FieldType] {
        &self.types
    }

    /// Type tag of a named input
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.inputs
            .iter()
            .position(|input| input == name)
            .map(|i| self.types[i])
    }

    /// Number of inputs
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Whether the schema has no inputs
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Checks record fields against the schema.
    ///
    /// # Errors
    ///
    /// `TUB_INVALID_RECORD` on a reserved or undeclared field name, or a
    /// value that does not fit its type tag.
    pub fn validate_fields(&self, fields: &Map<String, Value>) -> TubResult<()> {
        for (name, value) in fields {
            if name.starts_with(SYSTEM_FIELD_PREFIX) {
                return Err(TubError::invalid_record(format!(
                    "Field '{}' is reserved for the system",
                    name
                )));
            }
            let field_type = self.field_type(name).ok_or_else(|| {
                TubError::invalid_record(format!("Field '{}' is not a declared input", name))
            })?;
            if !field_type.accepts(value) {
                return Err(TubError::invalid_record(format!(
                    "Field '{}' expects {}, got {}",
                    name,
                    field_type,
                    json_type_name(value)
                )));
            }
        }
        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn driving_schema() -> Schema {
        Schema::parse(
            &["cam/image_array", "user/angle", "user/mode"],
            &["image_array", "float", "str"],
        )
        .unwrap()
    }

    #[test]
    fn test_type_tags_roundtrip_through_strings() {
        for tag in ["int", "float", "str", "boolean", "list", "vector", "nparray",
                    "image_array", "gray16_array", "image"] {
            let parsed: FieldType = tag.parse().unwrap();
            assert_eq!(parsed.as_str(), tag);
            assert_eq!(serde_json::to_value(parsed).unwrap(), json!(tag));
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = "complex".parse::<FieldType>().unwrap_err();
        assert_eq!(err.code().code(), "TUB_INVALID_SCHEMA");
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Schema::parse(&["a", "b"], &["int"]).unwrap_err();
        assert_eq!(err.code().code(), "TUB_INVALID_SCHEMA");
    }

    #[test]
    fn test_duplicate_and_reserved_inputs_rejected() {
        assert!(Schema::parse(&["a", "a"], &["int", "int"]).is_err());
        assert!(Schema::parse(&["_index"], &["int"]).is_err());
        assert!(Schema::parse(&[""], &["int"]).is_err());
    }

    #[test]
    fn test_asset_types() {
        assert!(FieldType::ImageArray.is_asset());
        assert!(FieldType::Gray16Array.is_asset());
        assert!(!FieldType::NdArray.is_asset());
        assert_eq!(driving_schema().field_type("cam/image_array"), Some(FieldType::ImageArray));
    }

    #[test]
    fn test_valid_record_accepted() {
        let schema = driving_schema();
        schema
            .validate_fields(&fields(json!({
                "cam/image_array": "0_cam_image_array_.jpg",
                "user/angle": 0.25,
                "user/mode": "user"
            })))
            .unwrap();
    }

    #[test]
    fn test_missing_and_null_fields_accepted() {
        let schema = driving_schema();
        schema.validate_fields(&fields(json!({"user/angle": null}))).unwrap();
        schema.validate_fields(&Map::new()).unwrap();
    }

    #[test]
    fn test_int_accepts_only_integers() {
        let schema = Schema::parse(&["input"], &["int"]).unwrap();
        schema.validate_fields(&fields(json!({"input": 3}))).unwrap();
        assert!(schema.validate_fields(&fields(json!({"input": 3.5}))).is_err());
        assert!(schema.validate_fields(&fields(json!({"input": "3"}))).is_err());
    }

    #[test]
    fn test_undeclared_and_system_fields_rejected() {
        let schema = driving_schema();
        let err = schema
            .validate_fields(&fields(json!({"user/throttle": 0.1})))
            .unwrap_err();
        assert_eq!(err.code().code(), "TUB_INVALID_RECORD");
        assert!(schema.validate_fields(&fields(json!({"_index": 4}))).is_err());
    }
}
