//! Typed scalar values and the JSON envelope they are stored as.
//!
//! A value column holds `{"value": <json>, "type": <tag>}`. The tag names the
//! original scalar kind so a number stored as generic JSON comes back with its
//! original width.

use crate::error::OfflineStoreError;
use anyhow::Result;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value as JsonValue};

pub const INT_TAG: &str = "int";
pub const INT8_TAG: &str = "int8";
pub const INT16_TAG: &str = "int16";
pub const INT32_TAG: &str = "int32";
pub const INT64_TAG: &str = "int64";
pub const FLOAT32_TAG: &str = "float32";
pub const FLOAT64_TAG: &str = "float64";
pub const STRING_TAG: &str = "string";
pub const BOOL_TAG: &str = "bool";
pub const NULL_TAG: &str = "null";
/// Tag given to passthrough values built from raw JSON.
pub const JSON_TAG: &str = "json";

const RESERVED_TAGS: [&str; 10] = [
    INT_TAG,
    INT8_TAG,
    INT16_TAG,
    INT32_TAG,
    INT64_TAG,
    FLOAT32_TAG,
    FLOAT64_TAG,
    STRING_TAG,
    BOOL_TAG,
    NULL_TAG,
];

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Int(i64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bool(bool),
    /// Value whose tag is outside the fixed set. Decoded as-is; a reserved
    /// tag here is rejected by [`encode`].
    Other { type_name: String, value: JsonValue },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValueEnvelope {
    pub value: JsonValue,
    #[serde(rename = "type")]
    pub item_type: String,
}

impl ScalarValue {
    pub fn type_name(&self) -> &str {
        match self {
            ScalarValue::Null => NULL_TAG,
            ScalarValue::Int(_) => INT_TAG,
            ScalarValue::Int8(_) => INT8_TAG,
            ScalarValue::Int16(_) => INT16_TAG,
            ScalarValue::Int32(_) => INT32_TAG,
            ScalarValue::Int64(_) => INT64_TAG,
            ScalarValue::Float32(_) => FLOAT32_TAG,
            ScalarValue::Float64(_) => FLOAT64_TAG,
            ScalarValue::String(_) => STRING_TAG,
            ScalarValue::Bool(_) => BOOL_TAG,
            ScalarValue::Other { type_name, .. } => type_name,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Parses `text` as a value of the scalar kind named by `tag`.
    pub fn parse(tag: &str, text: &str) -> Result<Self> {
        fn parse_as<T: std::str::FromStr>(tag: &str, text: &str) -> Result<T> {
            text.parse::<T>().map_err(|_| {
                OfflineStoreError::codec(format!("'{}' is not a valid {}", text, tag)).into()
            })
        }

        let value = match tag {
            NULL_TAG => ScalarValue::Null,
            INT_TAG => ScalarValue::Int(parse_as(tag, text)?),
            INT8_TAG => ScalarValue::Int8(parse_as(tag, text)?),
            INT16_TAG => ScalarValue::Int16(parse_as(tag, text)?),
            INT32_TAG => ScalarValue::Int32(parse_as(tag, text)?),
            INT64_TAG => ScalarValue::Int64(parse_as(tag, text)?),
            FLOAT32_TAG => ScalarValue::Float32(parse_as(tag, text)?),
            FLOAT64_TAG => ScalarValue::Float64(parse_as(tag, text)?),
            STRING_TAG => ScalarValue::String(text.to_owned()),
            BOOL_TAG => ScalarValue::Bool(parse_as(tag, text)?),
            other => ScalarValue::Other {
                type_name: other.to_owned(),
                value: serde_json::from_str(text)
                    .map_err(|e| OfflineStoreError::codec(format!("invalid json value: {}", e)))?,
            },
        };
        Ok(value)
    }

    fn to_json(&self) -> Result<JsonValue> {
        fn float(tag: &str, f: f64) -> Result<JsonValue> {
            Number::from_f64(f).map(JsonValue::Number).ok_or_else(|| {
                OfflineStoreError::codec(format!("non-finite {} value {}", tag, f)).into()
            })
        }

        let json = match self {
            ScalarValue::Null => JsonValue::Null,
            ScalarValue::Int(i) | ScalarValue::Int64(i) => JsonValue::from(*i),
            ScalarValue::Int8(i) => JsonValue::from(*i),
            ScalarValue::Int16(i) => JsonValue::from(*i),
            ScalarValue::Int32(i) => JsonValue::from(*i),
            ScalarValue::Float32(f) => float(FLOAT32_TAG, f64::from(*f))?,
            ScalarValue::Float64(f) => float(FLOAT64_TAG, *f)?,
            ScalarValue::String(s) => JsonValue::String(s.clone()),
            ScalarValue::Bool(b) => JsonValue::Bool(*b),
            ScalarValue::Other { type_name, value } => {
                if RESERVED_TAGS.contains(&type_name.as_str()) {
                    return Err(OfflineStoreError::codec(format!(
                        "passthrough value cannot use reserved type '{}'",
                        type_name
                    ))
                    .into());
                }
                value.clone()
            }
        };
        Ok(json)
    }
}

impl From<JsonValue> for ScalarValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => ScalarValue::Null,
            value => ScalarValue::Other {
                type_name: JSON_TAG.to_owned(),
                value,
            },
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ScalarValue::Null => serializer.serialize_none(),
            ScalarValue::Int(i) | ScalarValue::Int64(i) => serializer.serialize_i64(*i),
            ScalarValue::Int8(i) => serializer.serialize_i8(*i),
            ScalarValue::Int16(i) => serializer.serialize_i16(*i),
            ScalarValue::Int32(i) => serializer.serialize_i32(*i),
            ScalarValue::Float32(f) => serializer.serialize_f32(*f),
            ScalarValue::Float64(f) => serializer.serialize_f64(*f),
            ScalarValue::String(s) => serializer.serialize_str(s),
            ScalarValue::Bool(b) => serializer.serialize_bool(*b),
            ScalarValue::Other { value, .. } => value.serialize(serializer),
        }
    }
}

/// Wraps `value` in its typed envelope.
pub fn encode(value: &ScalarValue) -> Result<TypedValueEnvelope> {
    Ok(TypedValueEnvelope {
        value: value.to_json()?,
        item_type: value.type_name().to_owned(),
    })
}

/// Restores the original scalar from a stored envelope document.
pub fn decode(document: JsonValue) -> Result<ScalarValue> {
    let envelope: TypedValueEnvelope = serde_json::from_value(document)
        .map_err(|e| OfflineStoreError::codec(format!("malformed value envelope: {}", e)))?;
    decode_envelope(envelope)
}

pub fn decode_envelope(envelope: TypedValueEnvelope) -> Result<ScalarValue> {
    let TypedValueEnvelope { value, item_type } = envelope;
    let scalar = match item_type.as_str() {
        INT_TAG => ScalarValue::Int(narrow_int(&item_type, &value)?),
        INT8_TAG => ScalarValue::Int8(narrow_int(&item_type, &value)?),
        INT16_TAG => ScalarValue::Int16(narrow_int(&item_type, &value)?),
        INT32_TAG => ScalarValue::Int32(narrow_int(&item_type, &value)?),
        INT64_TAG => ScalarValue::Int64(narrow_int(&item_type, &value)?),
        FLOAT32_TAG => ScalarValue::Float32(narrow_f32(&item_type, &value)?),
        FLOAT64_TAG => ScalarValue::Float64(as_f64(&item_type, &value)?),
        STRING_TAG => match value {
            JsonValue::String(s) => ScalarValue::String(s),
            other => return Err(mismatch(&item_type, &other)),
        },
        BOOL_TAG => match value {
            JsonValue::Bool(b) => ScalarValue::Bool(b),
            other => return Err(mismatch(&item_type, &other)),
        },
        NULL_TAG => ScalarValue::Null,
        _ => ScalarValue::Other {
            type_name: item_type,
            value,
        },
    };
    Ok(scalar)
}

fn mismatch(tag: &str, value: &JsonValue) -> anyhow::Error {
    OfflineStoreError::codec(format!("value {} does not match type '{}'", value, tag)).into()
}

fn as_f64(tag: &str, value: &JsonValue) -> Result<f64> {
    value.as_f64().ok_or_else(|| mismatch(tag, value))
}

fn narrow_f32(tag: &str, value: &JsonValue) -> Result<f32> {
    let wide = as_f64(tag, value)?;
    let narrow = wide as f32;
    if !narrow.is_finite() {
        return Err(OfflineStoreError::codec(format!(
            "value {} out of range for type '{}'",
            wide, tag
        ))
        .into());
    }
    Ok(narrow)
}

// Exact integers are read directly; integral floats written by float-only
// encoders are truncated toward zero before narrowing.
fn narrow_int<T: TryFrom<i64>>(tag: &str, value: &JsonValue) -> Result<T> {
    let wide = match value.as_i64() {
        Some(i) => i,
        None => {
            let f = as_f64(tag, value)?;
            if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
                return Err(mismatch(tag, value));
            }
            f.trunc() as i64
        }
    };
    T::try_from(wide).map_err(|_| {
        OfflineStoreError::codec(format!("value {} out of range for type '{}'", wide, tag)).into()
    })
}
