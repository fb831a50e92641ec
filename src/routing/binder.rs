//! Parameter binding.
//!
//! # Responsibilities
//! - Reconcile an operation's declared parameters with the values extracted
//!   from a request (query, template captures, form or structured body)
//! - Pick exactly one strategy from the shape of the parameter list
//!
//! # Strategies
//! ```text
//! no extracted values        → []
//! no parameters              → []
//! one scalar                 → [decode(values[name], type)]
//! one open map               → [{ key: decode_open(value) for every key }]
//! one class record           → fields if count matches, else properties, else error
//! one struct record          → fields if count matches, else error
//! several parameters         → [decode(values[name], type) for each]
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

use crate::codec::{CodecError, ContractCodec};
use crate::error::DispatchError;
use crate::routing::call::Arg;
use crate::routing::contract::{Param, ValueType};
use crate::routing::matcher::ExtractedValues;
use crate::routing::shape::{Field, RecordKind, RecordShape};

/// A parameter list that cannot be reconciled with the extracted values.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("no value supplied for parameter '{0}'")]
    MissingValue(String),

    #[error("{record} takes {fields} fields or {properties} properties, {supplied} values supplied")]
    Cardinality {
        record: &'static str,
        fields: usize,
        properties: usize,
        supplied: usize,
    },

    #[error("parameter '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: CodecError,
    },
}

/// Values extracted from one request.
#[derive(Debug)]
pub enum Extracted {
    /// Raw text values from a query, a template or a form body.
    Text(ExtractedValues),
    /// Members of a body already decoded by the codec.
    Structured(Map<String, Value>),
}

enum Entry<'a> {
    Raw(&'a str),
    Decoded(&'a Value),
}

impl Extracted {
    pub fn len(&self) -> usize {
        match self {
            Extracted::Text(values) => values.len(),
            Extracted::Structured(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn names(&self) -> Vec<&str> {
        match self {
            Extracted::Text(values) => values.names(),
            Extracted::Structured(map) => map.keys().map(String::as_str).collect(),
        }
    }

    fn lookup(&self, name: &str) -> Option<Entry<'_>> {
        match self {
            Extracted::Text(values) => values.get(name).map(Entry::Raw),
            Extracted::Structured(map) => map
                .get(name)
                .or_else(|| {
                    map.iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(name))
                        .map(|(_, value)| value)
                })
                .map(Entry::Decoded),
        }
    }
}

/// Bind `params` against `source`.
pub fn bind(
    params: &[Param],
    source: &Extracted,
    codec: &dyn ContractCodec,
) -> Result<Vec<Arg>, DispatchError> {
    if source.is_empty() || params.is_empty() {
        return Ok(Vec::new());
    }

    if let [param] = params {
        let value = match &param.ty {
            ValueType::Object => bind_open_map(source, codec)?,
            ValueType::Record(shape) => bind_record(shape, source, codec)?,
            ty if ty.is_raw_body() => {
                return Err(DispatchError::UnsupportedType(format!(
                    "parameter '{}' of type {ty} needs a raw request body",
                    param.name
                )))
            }
            ty => decode_named(&param.name, ty, source, codec)?,
        };
        return Ok(vec![Arg::Value(value)]);
    }

    params
        .iter()
        .map(|param| {
            if param.ty.is_raw_body() {
                return Err(DispatchError::UnsupportedType(format!(
                    "parameter '{}' of type {} cannot share the request with other parameters",
                    param.name, param.ty
                )));
            }
            Ok(Arg::Value(decode_named(&param.name, &param.ty, source, codec)?))
        })
        .collect()
}

fn decode_named(
    name: &str,
    ty: &ValueType,
    source: &Extracted,
    codec: &dyn ContractCodec,
) -> Result<Value, BindingError> {
    let entry = source
        .lookup(name)
        .ok_or_else(|| BindingError::MissingValue(name.to_owned()))?;
    let decoded = match entry {
        Entry::Raw(raw) => codec.deserialize(raw, ty),
        Entry::Decoded(value) => codec.coerce(value.clone(), ty),
    };
    decoded.map_err(|source| BindingError::Decode {
        name: name.to_owned(),
        source,
    })
}

fn bind_open_map(source: &Extracted, codec: &dyn ContractCodec) -> Result<Value, BindingError> {
    let mut map = Map::new();
    for name in source.names() {
        let value = match source.lookup(name) {
            Some(Entry::Raw(raw)) => codec.deserialize_open(raw).map_err(|source| BindingError::Decode {
                name: name.to_owned(),
                source,
            })?,
            Some(Entry::Decoded(value)) => value.clone(),
            None => continue,
        };
        map.insert(name.to_owned(), value);
    }
    Ok(Value::Object(map))
}

fn bind_record(
    shape: &RecordShape,
    source: &Extracted,
    codec: &dyn ContractCodec,
) -> Result<Value, BindingError> {
    let supplied = source.len();
    let members: &[Field] = if shape.fields.len() == supplied {
        &shape.fields
    } else if shape.kind == RecordKind::Class && shape.properties.len() == supplied {
        &shape.properties
    } else {
        return Err(BindingError::Cardinality {
            record: shape.name,
            fields: shape.fields.len(),
            properties: match shape.kind {
                RecordKind::Class => shape.properties.len(),
                RecordKind::Struct => 0,
            },
            supplied,
        });
    };

    let mut map = Map::new();
    for member in members {
        let value = decode_named(&member.name, &member.ty, source, codec)?;
        map.insert(member.name.clone(), value);
    }
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::routing::shape::RecordShape;
    use serde_json::json;
    use std::sync::Arc;

    fn param(name: &str, ty: ValueType) -> Param {
        Param {
            name: name.to_owned(),
            ty,
        }
    }

    fn query(q: &str) -> Extracted {
        Extracted::Text(ExtractedValues::from_query(q))
    }

    fn values(args: Vec<Arg>) -> Vec<Value> {
        args.into_iter()
            .map(|arg| match arg {
                Arg::Value(value) => value,
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    fn sample_shape(kind: RecordKind) -> Arc<RecordShape> {
        let base = match kind {
            RecordKind::Class => RecordShape::class("Sample"),
            RecordKind::Struct => RecordShape::structure("Sample"),
        };
        Arc::new(
            base.field("b", ValueType::Bool)
                .field("i", ValueType::Int)
                .field("s", ValueType::String)
                .property("b", ValueType::Bool)
                .property("s", ValueType::String),
        )
    }

    #[test]
    fn zero_parameters_ignore_values() {
        let args = bind(&[], &query("a=1&b=2"), &JsonCodec::new()).unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn no_values_bind_nothing() {
        let params = [param("a", ValueType::Int)];
        let args = bind(&params, &query(""), &JsonCodec::new()).unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn single_scalar_by_name() {
        let params = [param("when", ValueType::DateTime)];
        let args = bind(&params, &query("when=2018-08-17T06:30:29.542Z"), &JsonCodec::new()).unwrap();
        assert_eq!(values(args), [json!("2018-08-17T06:30:29.542Z")]);
    }

    #[test]
    fn multiple_parameters_by_name_and_type() {
        let params = [
            param("b", ValueType::Bool),
            param("i", ValueType::Int),
            param("f", ValueType::Float),
            param("d", ValueType::Double),
            param("m", ValueType::Decimal),
            param("dt", ValueType::DateTime),
            param("s", ValueType::String),
        ];
        let source = query("b=true&i=-1&f=0.1&d=0.2&m=0.3&dt=2018-08-17T06:30:29.542Z&s=test");
        let bound = values(bind(&params, &source, &JsonCodec::new()).unwrap());

        assert_eq!(bound.len(), 7);
        assert_eq!(bound[0], json!(true));
        assert_eq!(bound[1], json!(-1));
        assert_eq!(bound[6], json!("test"));
    }

    #[test]
    fn missing_name_fails() {
        let params = [param("a", ValueType::Int), param("b", ValueType::Int)];
        let err = bind(&params, &query("a=1"), &JsonCodec::new()).unwrap_err();
        assert!(matches!(err, DispatchError::Binding(BindingError::MissingValue(name)) if name == "b"));
    }

    #[test]
    fn undecodable_value_fails() {
        let params = [param("a", ValueType::Int)];
        let err = bind(&params, &query("a=x"), &JsonCodec::new()).unwrap_err();
        assert!(matches!(err, DispatchError::Binding(BindingError::Decode { .. })));
    }

    #[test]
    fn open_map_decodes_every_key() {
        let params = [param("all", ValueType::Object)];
        let bound = values(bind(&params, &query("n=5&s=text&flag=true"), &JsonCodec::new()).unwrap());
        assert_eq!(bound, [json!({"n": 5, "s": "text", "flag": true})]);
    }

    #[test]
    fn record_binds_fields_when_count_matches() {
        let params = [param("x", ValueType::Record(sample_shape(RecordKind::Class)))];
        let bound = values(bind(&params, &query("B=true&I=3&S=hi"), &JsonCodec::new()).unwrap());
        assert_eq!(bound, [json!({"b": true, "i": 3, "s": "hi"})]);
    }

    #[test]
    fn class_record_falls_back_to_properties() {
        let params = [param("x", ValueType::Record(sample_shape(RecordKind::Class)))];
        let bound = values(bind(&params, &query("b=false&s=hi"), &JsonCodec::new()).unwrap());
        assert_eq!(bound, [json!({"b": false, "s": "hi"})]);
    }

    #[test]
    fn struct_record_uses_fields_only() {
        let params = [param("x", ValueType::Record(sample_shape(RecordKind::Struct)))];
        let err = bind(&params, &query("b=false&s=hi"), &JsonCodec::new()).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Binding(BindingError::Cardinality { supplied: 2, properties: 0, .. })
        ));
    }

    #[test]
    fn record_with_other_cardinality_fails() {
        let params = [param("x", ValueType::Record(sample_shape(RecordKind::Class)))];
        let err = bind(&params, &query("b=true"), &JsonCodec::new()).unwrap_err();
        assert!(matches!(err, DispatchError::Binding(BindingError::Cardinality { supplied: 1, .. })));
    }

    #[test]
    fn structured_body_members_are_coerced() {
        let params = [param("s", ValueType::String), param("i", ValueType::Long)];
        let body = json!({"s": "abc", "i": "12"});
        let Value::Object(map) = body else { unreachable!() };
        let bound = values(bind(&params, &Extracted::Structured(map), &JsonCodec::new()).unwrap());
        assert_eq!(bound, [json!("abc"), json!(12)]);
    }

    #[test]
    fn raw_body_types_need_a_body() {
        let params = [param("data", ValueType::Stream)];
        let err = bind(&params, &query("a=1"), &JsonCodec::new()).unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedType(_)));
    }
}
