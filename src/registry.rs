//! Identifier registry: document ids → typed handles.
//!
//! Every element with an `id` is registered once during the stub pass.
//! Later lookups name the kind they expect, so a role id used where an
//! object type belongs is caught as a [`RegistryError::KindMismatch`]
//! rather than silently linking the wrong entity.

use crate::error::{Defect, DefectKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub fn new(index: usize) -> Self {
                Self(index as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle!(
    /// Handle to an [`ObjectType`](crate::model::ObjectType).
    ObjectTypeId
);
handle!(
    /// Handle to a [`FactType`](crate::model::FactType).
    FactTypeId
);
handle!(
    /// Handle to a [`Role`](crate::model::Role).
    RoleId
);
handle!(
    /// Handle to a [`Constraint`](crate::model::Constraint).
    ConstraintId
);
handle!(
    /// Handle to a [`DataType`](crate::model::DataType).
    DataTypeId
);
handle!(
    /// Handle to a [`ReferenceModeKind`](crate::model::ReferenceModeKind).
    ReferenceModeKindId
);

/// Entity kinds that carry document identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    ObjectType,
    FactType,
    Role,
    /// A constraint-local role entry that stands in for a canonical role.
    RoleProxy,
    Constraint,
    DataType,
    ReferenceModeKind,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::ObjectType => "object type",
            EntityKind::FactType => "fact type",
            EntityKind::Role => "role",
            EntityKind::RoleProxy => "role proxy",
            EntityKind::Constraint => "constraint",
            EntityKind::DataType => "data type",
            EntityKind::ReferenceModeKind => "reference mode kind",
        };
        f.write_str(name)
    }
}

/// A registered entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    ObjectType(ObjectTypeId),
    FactType(FactTypeId),
    Role(RoleId),
    /// Proxy entry, owned by the constraint whose role sequence holds it.
    RoleProxy(ConstraintId),
    Constraint(ConstraintId),
    DataType(DataTypeId),
    ReferenceModeKind(ReferenceModeKindId),
}

impl EntityRef {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::ObjectType(_) => EntityKind::ObjectType,
            EntityRef::FactType(_) => EntityKind::FactType,
            EntityRef::Role(_) => EntityKind::Role,
            EntityRef::RoleProxy(_) => EntityKind::RoleProxy,
            EntityRef::Constraint(_) => EntityKind::Constraint,
            EntityRef::DataType(_) => EntityKind::DataType,
            EntityRef::ReferenceModeKind(_) => EntityKind::ReferenceModeKind,
        }
    }
}

/// Registry lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("identifier '{id}' is already registered as a {existing}")]
    DuplicateIdentifier { id: String, existing: EntityKind },

    #[error("identifier '{id}' does not name any {expected}")]
    UnresolvedReference { id: String, expected: EntityKind },

    #[error("identifier '{id}' names a {found}, expected a {expected}")]
    KindMismatch {
        id: String,
        expected: EntityKind,
        found: EntityKind,
    },
}

impl RegistryError {
    pub fn defect_kind(&self) -> DefectKind {
        match self {
            RegistryError::DuplicateIdentifier { .. } => DefectKind::DuplicateIdentifier,
            RegistryError::UnresolvedReference { .. } => DefectKind::UnresolvedReference,
            RegistryError::KindMismatch { .. } => DefectKind::KindMismatch,
        }
    }

    /// Attribute this failure to the entity holding the reference.
    pub fn into_defect(self, holder: &str, context: &str) -> Defect {
        let kind = self.defect_kind();
        Defect::new(kind, holder, format!("{}: {}", context, self))
    }
}

/// Maps document identifiers to typed handles for one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
    entries: HashMap<String, EntityRef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`. Fails if the id is already taken in this document.
    pub fn register(&mut self, id: &str, entity: EntityRef) -> Result<(), RegistryError> {
        if let Some(existing) = self.entries.get(id) {
            return Err(RegistryError::DuplicateIdentifier {
                id: id.to_string(),
                existing: existing.kind(),
            });
        }
        self.entries.insert(id.to_string(), entity);
        Ok(())
    }

    /// Resolve `id`, requiring it to name an entity of `expected` kind.
    pub fn resolve(&self, id: &str, expected: EntityKind) -> Result<EntityRef, RegistryError> {
        match self.entries.get(id) {
            None => Err(RegistryError::UnresolvedReference {
                id: id.to_string(),
                expected,
            }),
            Some(entity) if entity.kind() == expected => Ok(*entity),
            Some(entity) => Err(RegistryError::KindMismatch {
                id: id.to_string(),
                expected,
                found: entity.kind(),
            }),
        }
    }

    /// Untyped lookup.
    pub fn get(&self, id: &str) -> Option<EntityRef> {
        self.entries.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn object_type(&self, id: &str) -> Result<ObjectTypeId, RegistryError> {
        match self.resolve(id, EntityKind::ObjectType)? {
            EntityRef::ObjectType(handle) => Ok(handle),
            other => Err(mismatch(id, EntityKind::ObjectType, other)),
        }
    }

    pub fn fact_type(&self, id: &str) -> Result<FactTypeId, RegistryError> {
        match self.resolve(id, EntityKind::FactType)? {
            EntityRef::FactType(handle) => Ok(handle),
            other => Err(mismatch(id, EntityKind::FactType, other)),
        }
    }

    pub fn role(&self, id: &str) -> Result<RoleId, RegistryError> {
        match self.resolve(id, EntityKind::Role)? {
            EntityRef::Role(handle) => Ok(handle),
            other => Err(mismatch(id, EntityKind::Role, other)),
        }
    }

    pub fn constraint(&self, id: &str) -> Result<ConstraintId, RegistryError> {
        match self.resolve(id, EntityKind::Constraint)? {
            EntityRef::Constraint(handle) => Ok(handle),
            other => Err(mismatch(id, EntityKind::Constraint, other)),
        }
    }

    pub fn data_type(&self, id: &str) -> Result<DataTypeId, RegistryError> {
        match self.resolve(id, EntityKind::DataType)? {
            EntityRef::DataType(handle) => Ok(handle),
            other => Err(mismatch(id, EntityKind::DataType, other)),
        }
    }
}

fn mismatch(id: &str, expected: EntityKind, found: EntityRef) -> RegistryError {
    RegistryError::KindMismatch {
        id: id.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Typed lookup used by [`Reference`](crate::model::Reference).
pub trait Resolvable: Copy {
    const KIND: EntityKind;

    fn lookup(registry: &Registry, id: &str) -> Result<Self, RegistryError>;
}

impl Resolvable for ObjectTypeId {
    const KIND: EntityKind = EntityKind::ObjectType;

    fn lookup(registry: &Registry, id: &str) -> Result<Self, RegistryError> {
        registry.object_type(id)
    }
}

impl Resolvable for FactTypeId {
    const KIND: EntityKind = EntityKind::FactType;

    fn lookup(registry: &Registry, id: &str) -> Result<Self, RegistryError> {
        registry.fact_type(id)
    }
}

impl Resolvable for RoleId {
    const KIND: EntityKind = EntityKind::Role;

    fn lookup(registry: &Registry, id: &str) -> Result<Self, RegistryError> {
        registry.role(id)
    }
}

impl Resolvable for ConstraintId {
    const KIND: EntityKind = EntityKind::Constraint;

    fn lookup(registry: &Registry, id: &str) -> Result<Self, RegistryError> {
        registry.constraint(id)
    }
}

impl Resolvable for DataTypeId {
    const KIND: EntityKind = EntityKind::DataType;

    fn lookup(registry: &Registry, id: &str) -> Result<Self, RegistryError> {
        registry.data_type(id)
    }
}
