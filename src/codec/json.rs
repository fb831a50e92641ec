//! JSON payload codec.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::codec::{CodecError, ContractCodec};
use crate::routing::shape::RecordShape;
use crate::routing::ValueType;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// [`ContractCodec`] backed by `serde_json`.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indent serialized results.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    fn coerce_record(&self, shape: &RecordShape, mut map: Map<String, Value>) -> Result<Value, CodecError> {
        let mut out = Map::new();
        for member in shape.fields.iter().chain(shape.properties.iter()) {
            if let Some(value) = map.remove(&member.name) {
                out.insert(member.name.clone(), self.coerce(value, &member.ty)?);
            }
        }
        out.extend(map);
        Ok(Value::Object(out))
    }
}

impl ContractCodec for JsonCodec {
    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn serialize(&self, value: &Value, ty: &ValueType) -> Result<Vec<u8>, CodecError> {
        let integral = integral_number(value, ty);
        let value = integral.as_ref().unwrap_or(value);
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }

    fn deserialize(&self, raw: &str, ty: &ValueType) -> Result<Value, CodecError> {
        let text = raw.trim();
        match ty {
            ValueType::String => Ok(Value::String(raw.to_owned())),
            ValueType::Bool => {
                if text.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(CodecError::invalid(ty, raw))
                }
            }
            ValueType::Int => text
                .parse::<i32>()
                .map(Value::from)
                .map_err(|_| CodecError::invalid(ty, raw)),
            ValueType::Long => text
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| CodecError::invalid(ty, raw)),
            ValueType::Float => {
                let parsed = text.parse::<f64>().map_err(|_| CodecError::invalid(ty, raw))?;
                if (parsed as f32).is_infinite() {
                    return Err(CodecError::invalid(ty, raw));
                }
                number(parsed, ty, raw)
            }
            ValueType::Double | ValueType::Decimal => {
                let parsed = text.parse::<f64>().map_err(|_| CodecError::invalid(ty, raw))?;
                number(parsed, ty, raw)
            }
            ValueType::DateTime => parse_datetime(text)
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
                .ok_or_else(|| CodecError::invalid(ty, raw)),
            ValueType::Object => self.deserialize_open(raw),
            ValueType::Record(_) => {
                let value: Value = serde_json::from_str(text)?;
                self.coerce(value, ty)
            }
            ValueType::Bytes | ValueType::Stream => Err(CodecError::Unsupported(ty.name())),
        }
    }

    fn deserialize_open(&self, raw: &str) -> Result<Value, CodecError> {
        if raw.is_empty() || is_json_date(raw) || !looks_like_json(raw) {
            return Ok(Value::String(raw.to_owned()));
        }
        Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned())))
    }

    fn coerce(&self, value: Value, ty: &ValueType) -> Result<Value, CodecError> {
        match (ty, value) {
            (ValueType::Object, value) => Ok(value),
            (ValueType::Bytes | ValueType::Stream, _) => Err(CodecError::Unsupported(ty.name())),
            (ValueType::String, Value::String(s)) => Ok(Value::String(s)),
            (ValueType::String, value @ (Value::Number(_) | Value::Bool(_))) => {
                Ok(Value::String(value.to_string()))
            }
            (ValueType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ValueType::Int, Value::Number(n)) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::from)
                .ok_or_else(|| CodecError::invalid(ty, n.to_string())),
            (ValueType::Long, Value::Number(n)) => n
                .as_i64()
                .map(Value::from)
                .ok_or_else(|| CodecError::invalid(ty, n.to_string())),
            (ValueType::Float | ValueType::Double | ValueType::Decimal, Value::Number(n)) => {
                Ok(Value::Number(n))
            }
            (ValueType::Record(shape), Value::Object(map)) => self.coerce_record(shape, map),
            (_, Value::String(s)) => self.deserialize(&s, ty),
            (_, other) => Err(CodecError::invalid(ty, other.to_string())),
        }
    }
}

fn number(value: f64, ty: &ValueType, raw: &str) -> Result<Value, CodecError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| CodecError::invalid(ty, raw))
}

/// Whole decimals are written without a fractional part (`2`, not `2.0`).
fn integral_number(value: &Value, ty: &ValueType) -> Option<Value> {
    const EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;

    if !matches!(ty, ValueType::Float | ValueType::Double | ValueType::Decimal) {
        return None;
    }
    let Value::Number(n) = value else {
        return None;
    };
    if n.is_i64() || n.is_u64() {
        return None;
    }
    let float = n.as_f64()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() < EXACT_LIMIT {
        Some(Value::from(float as i64))
    } else {
        None
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

/// `yyyy-MM-ddTHH:mm:ss.fffZ`
fn is_json_date(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if bytes.len() != 24 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => *b == b'T',
        13 | 16 => *b == b':',
        19 => true,
        23 => *b == b'Z',
        _ => b.is_ascii_digit(),
    })
}

fn looks_like_json(raw: &str) -> bool {
    let text = raw.trim();
    matches!(text, "true" | "false" | "null")
        || text
            .chars()
            .next()
            .is_some_and(|c| matches!(c, '"' | '{' | '[' | '-') || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn scalars_decode_to_declared_type() {
        let codec = JsonCodec::new();
        assert_eq!(codec.deserialize("true", &ValueType::Bool).unwrap(), json!(true));
        assert_eq!(codec.deserialize("-1", &ValueType::Int).unwrap(), json!(-1));
        assert_eq!(codec.deserialize("0.2", &ValueType::Double).unwrap(), json!(0.2));
        assert_eq!(codec.deserialize("test", &ValueType::String).unwrap(), json!("test"));
        assert!(codec.deserialize("abc", &ValueType::Int).is_err());
        assert!(codec.deserialize("3000000000", &ValueType::Int).is_err());
        assert!(codec.deserialize("3000000000", &ValueType::Long).is_ok());
    }

    #[test]
    fn whole_decimals_drop_the_fraction() {
        let codec = JsonCodec::new();
        assert_eq!(codec.serialize(&json!(2.0), &ValueType::Decimal).unwrap(), b"2");
        assert_eq!(codec.serialize(&json!(-4.0), &ValueType::Double).unwrap(), b"-4");
        assert_eq!(codec.serialize(&json!(2.5), &ValueType::Decimal).unwrap(), b"2.5");
        assert_eq!(codec.serialize(&json!(2.0), &ValueType::Object).unwrap(), b"2.0");
        assert_eq!(codec.serialize(&json!(1e300), &ValueType::Double).unwrap(), b"1e300");
    }

    #[test]
    fn float_round_trips_through_f32() {
        let codec = JsonCodec::new();
        let value = codec.deserialize("0.1", &ValueType::Float).unwrap();
        let back: f32 = serde_json::from_value(value).unwrap();
        assert_eq!(back, 0.1f32);
    }

    #[test]
    fn datetimes_normalize_to_utc_millis() {
        let codec = JsonCodec::new();
        assert_eq!(
            codec.deserialize("2018-08-17T06:30:29.542Z", &ValueType::DateTime).unwrap(),
            json!("2018-08-17T06:30:29.542Z")
        );
        assert_eq!(
            codec.deserialize("2018-08-17T08:30:29+02:00", &ValueType::DateTime).unwrap(),
            json!("2018-08-17T06:30:29.000Z")
        );
        assert!(codec.deserialize("yesterday", &ValueType::DateTime).is_err());
    }

    #[test]
    fn open_decoding_keeps_plain_text() {
        let codec = JsonCodec::new();
        assert_eq!(codec.deserialize_open("hello").unwrap(), json!("hello"));
        assert_eq!(codec.deserialize_open("42").unwrap(), json!(42));
        assert_eq!(codec.deserialize_open("{\"a\":1}").unwrap(), json!({"a": 1}));
        assert_eq!(
            codec.deserialize_open("2018-08-17T06:30:29.542Z").unwrap(),
            json!("2018-08-17T06:30:29.542Z")
        );
        assert_eq!(codec.deserialize_open("0123abc").unwrap(), json!("0123abc"));
    }

    #[test]
    fn coerce_record_members() {
        let codec = JsonCodec::new();
        let shape = Arc::new(
            RecordShape::class("Sample")
                .field("n", ValueType::Int)
                .field("when", ValueType::DateTime),
        );
        let value = codec
            .coerce(json!({"n": "7", "when": "2020-01-01", "extra": true}), &ValueType::Record(shape))
            .unwrap();
        assert_eq!(value, json!({"n": 7, "when": "2020-01-01T00:00:00.000Z", "extra": true}));
    }

    #[test]
    fn pretty_serialization_indents() {
        let bytes = JsonCodec::pretty().serialize(&json!({"a": 1}), &ValueType::Object).unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains('\n'));
    }
}
