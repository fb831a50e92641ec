//! Record shapes for composite parameters.
//!
//! # Responsibilities
//! - Describe the fields and properties of a composite parameter type
//! - Cache one shape per Rust type, built once at registration
//!
//! # Design Decisions
//! - Types opt in through the [`Record`] trait; nothing is discovered at runtime
//! - Shapes are shared via `Arc` between every descriptor that uses the type
//! - Struct-kind records bind through fields only

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::routing::contract::ValueType;

/// Whether a record binds like a class (fields, then properties) or a struct (fields only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Class,
    Struct,
}

/// A named, typed member of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: ValueType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Binding metadata of a composite type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordShape {
    pub name: &'static str,
    pub kind: RecordKind,
    pub fields: Vec<Field>,
    pub properties: Vec<Field>,
}

impl RecordShape {
    /// Start a class-kind shape.
    pub fn class(name: &'static str) -> Self {
        Self {
            name,
            kind: RecordKind::Class,
            fields: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Start a struct-kind shape.
    pub fn structure(name: &'static str) -> Self {
        Self {
            kind: RecordKind::Struct,
            ..Self::class(name)
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.push(Field::new(name, ty));
        self
    }

    /// Add a property. Ignored for struct-kind shapes when binding.
    pub fn property(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.properties.push(Field::new(name, ty));
        self
    }
}

/// A Rust type that can be bound from named request values.
///
/// The binder produces a JSON object keyed by member name; the handler then
/// deserializes it into the concrete type with serde.
pub trait Record: 'static {
    fn shape() -> RecordShape;
}

/// Registry mapping a type identifier to its shape.
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    shapes: HashMap<TypeId, Arc<RecordShape>>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the shape of `T`, building it on first use.
    pub fn resolve<T: Record>(&mut self) -> Arc<RecordShape> {
        self.resolve_with(TypeId::of::<T>(), T::shape)
    }

    pub(crate) fn resolve_with(&mut self, id: TypeId, build: fn() -> RecordShape) -> Arc<RecordShape> {
        Arc::clone(self.shapes.entry(id).or_insert_with(|| Arc::new(build())))
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Point;

    impl Record for Point {
        fn shape() -> RecordShape {
            RecordShape::structure("Point")
                .field("x", ValueType::Int)
                .field("y", ValueType::Int)
        }
    }

    #[test]
    fn registry_builds_each_shape_once() {
        let mut registry = ShapeRegistry::new();
        let first = registry.resolve::<Point>();
        let second = registry.resolve::<Point>();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(first.kind, RecordKind::Struct);
        assert_eq!(first.fields.len(), 2);
    }
}
