use crate::error::{QueryError, Result};
use crate::expr::ValueKind;
use std::collections::HashMap;

/// Declared field type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    BigInt,
    Integer,
    Double,
    Text,
    Boolean,
}

impl FieldType {
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldType::BigInt | FieldType::Integer => ValueKind::Int,
            FieldType::Double => ValueKind::Float,
            FieldType::Text => ValueKind::Text,
            FieldType::Boolean => ValueKind::Bool,
        }
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl FieldDef {
    pub const fn new(name: &'static str, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name,
            field_type,
            nullable,
        }
    }
}

/// Cardinality of a declared relationship, seen from the owning entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    ManyToOne,
    OneToMany,
}

/// Relationship definition.
///
/// A `ManyToOne` relation owns the foreign key (`local_field` points at
/// `target_field` of `target_entity`). A `OneToMany` relation is the inverse view:
/// `target_field` on the target entity holds this entity's `local_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub name: &'static str,
    pub kind: RelationKind,
    pub local_field: &'static str,
    pub target_entity: &'static str,
    pub target_field: &'static str,
}

/// Entity schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub name: &'static str,
    pub fields: Vec<FieldDef>,
    pub relations: Vec<RelationDef>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Relations that carry a foreign key on this entity
    pub fn foreign_keys(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.kind == RelationKind::ManyToOne)
    }
}

/// Schema registry
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: HashMap<&'static str, EntitySchema>,
    order: Vec<&'static str>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity schema
    pub fn register(&mut self, schema: EntitySchema) -> Result<()> {
        if self.entities.contains_key(schema.name) {
            return Err(QueryError::Schema(format!(
                "Entity {} already registered",
                schema.name
            )));
        }

        if schema.field("id").is_none() {
            return Err(QueryError::Schema(format!(
                "Entity {} has no id field",
                schema.name
            )));
        }

        self.order.push(schema.name);
        self.entities.insert(schema.name, schema);

        Ok(())
    }

    /// Check that every relation points at a registered entity and existing fields
    pub fn validate(&self) -> Result<()> {
        for schema in self.entities.values() {
            for relation in &schema.relations {
                self.field(schema.name, relation.local_field)?;
                self.field(relation.target_entity, relation.target_field)?;
            }
        }

        Ok(())
    }

    /// Get schema by entity name
    pub fn get(&self, entity: &str) -> Result<&EntitySchema> {
        self.entities
            .get(entity)
            .ok_or_else(|| QueryError::Schema(format!("Entity not registered: {}", entity)))
    }

    /// Resolve a field of a registered entity
    pub fn field(&self, entity: &str, field: &str) -> Result<&FieldDef> {
        self.get(entity)?.field(field).ok_or_else(|| {
            QueryError::Schema(format!("Entity {} has no field {}", entity, field))
        })
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    /// List registered entity names in registration order
    pub fn list_entities(&self) -> Vec<&'static str> {
        self.order.clone()
    }
}
