//! Schema graph entities.
//!
//! Entities live in flat arenas inside [`SchemaGraph`] and point at each
//! other through typed handles. Every cross-entity link keeps the raw
//! document identifier next to the resolved handle so the validator can
//! re-check references after a partial build.

use crate::config::RoleLabel;
use crate::datatype::DataTypeKind;
use crate::registry::{
    ConstraintId, DataTypeId, FactTypeId, ObjectTypeId, Registry, RegistryError, Resolvable,
    RoleId,
};
use serde::Serialize;

// ============================================================================
// References
// ============================================================================

/// A document reference: the raw id plus its handle when it resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference<H> {
    pub raw: String,
    pub target: Option<H>,
}

impl<H: Resolvable> Reference<H> {
    /// Resolve `raw` through the registry. The reference is kept even when
    /// resolution fails.
    pub fn resolve(raw: &str, registry: &Registry) -> (Self, Option<RegistryError>) {
        match H::lookup(registry, raw) {
            Ok(handle) => (
                Self {
                    raw: raw.to_string(),
                    target: Some(handle),
                },
                None,
            ),
            Err(err) => (
                Self {
                    raw: raw.to_string(),
                    target: None,
                },
                Some(err),
            ),
        }
    }

    /// Re-run the lookup against `registry`.
    pub fn recheck(&self, registry: &Registry) -> Result<H, RegistryError> {
        H::lookup(registry, &self.raw)
    }
}

impl<H> Reference<H> {
    /// Positional stand-in for an entry that carried no `ref`.
    pub fn missing() -> Self {
        Self {
            raw: String::new(),
            target: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.raw.is_empty()
    }
}

// ============================================================================
// Object types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ObjectType {
    pub id: String,
    pub name: String,
    pub kind: ObjectTypeKind,
    /// `IsIndependent`
    pub independent: bool,
    /// `IsImplicitBooleanValue`: created by NORMA when binarizing a unary fact.
    pub implicit: bool,
    /// `_ReferenceMode`, e.g. `id` or `.nr`.
    pub reference_mode: Option<String>,
    pub preferred_identifier: Option<Reference<ConstraintId>>,
    /// `PlayedRoles` as listed by the document.
    pub played_roles: Vec<Reference<RoleId>>,
}

#[derive(Debug, Clone, Serialize)]
pub enum ObjectTypeKind {
    Entity {
        /// Set for objectified types (`NestedPredicate`).
        objectifies: Option<Reference<FactTypeId>>,
    },
    Value {
        data_type: Option<ConceptualDataType>,
        value_restriction: Option<ValueRestriction>,
    },
}

impl ObjectType {
    pub(crate) fn stub(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            kind: ObjectTypeKind::Entity { objectifies: None },
            independent: false,
            implicit: false,
            reference_mode: None,
            preferred_identifier: None,
            played_roles: Vec::new(),
        }
    }

    pub fn is_value_type(&self) -> bool {
        matches!(self.kind, ObjectTypeKind::Value { .. })
    }

    pub fn value_restriction(&self) -> Option<&ValueRestriction> {
        match &self.kind {
            ObjectTypeKind::Value {
                value_restriction, ..
            } => value_restriction.as_ref(),
            ObjectTypeKind::Entity { .. } => None,
        }
    }

    pub fn data_type(&self) -> Option<&ConceptualDataType> {
        match &self.kind {
            ObjectTypeKind::Value { data_type, .. } => data_type.as_ref(),
            ObjectTypeKind::Entity { .. } => None,
        }
    }
}

/// `ConceptualDataType` of a value type.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptualDataType {
    pub data_type: Reference<DataTypeId>,
    pub length: Option<u32>,
    pub scale: Option<u32>,
}

// ============================================================================
// Value restrictions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueRestriction {
    /// Id of the `ValueConstraint` element, if it had one.
    pub id: Option<String>,
    pub name: Option<String>,
    pub ranges: Vec<ValueRange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Inclusion {
    #[default]
    NotSet,
    Open,
    Closed,
}

impl Inclusion {
    pub fn from_attr(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("") | Some("NotSet") => Some(Self::NotSet),
            Some("Open") => Some(Self::Open),
            Some("Closed") => Some(Self::Closed),
            Some(_) => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Inclusion::Open)
    }
}

/// One value range. `None` bounds are unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValueRange {
    pub min: Option<String>,
    pub max: Option<String>,
    pub min_inclusion: Inclusion,
    pub max_inclusion: Inclusion,
    pub invariant_min: Option<String>,
    pub invariant_max: Option<String>,
}

impl ValueRange {
    /// Every bound that is present, author bounds first.
    pub fn bounds(&self) -> impl Iterator<Item = &str> {
        [&self.min, &self.max, &self.invariant_min, &self.invariant_max]
            .into_iter()
            .filter_map(|b| b.as_deref())
    }
}

// ============================================================================
// Fact types and roles
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Multiplicity {
    #[default]
    Unspecified,
    Indeterminate,
    ZeroToOne,
    ZeroToMany,
    ExactlyOne,
    OneToMany,
}

impl Multiplicity {
    pub fn from_attr(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("") | Some("Unspecified") => Some(Self::Unspecified),
            Some("Indeterminate") => Some(Self::Indeterminate),
            Some("ZeroToOne") => Some(Self::ZeroToOne),
            Some("ZeroToMany") => Some(Self::ZeroToMany),
            Some("ExactlyOne") => Some(Self::ExactlyOne),
            Some("OneToMany") => Some(Self::OneToMany),
            Some(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoleKind {
    Plain,
    SubtypeMeta,
    SupertypeMeta,
}

impl RoleKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Role" => Some(Self::Plain),
            "SubtypeMetaRole" => Some(Self::SubtypeMeta),
            "SupertypeMetaRole" => Some(Self::SupertypeMeta),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub id: String,
    pub name: Option<String>,
    pub kind: RoleKind,
    /// Owning fact type.
    pub fact_type: FactTypeId,
    pub player: Option<Reference<ObjectTypeId>>,
    /// `_IsMandatory` as written by the document.
    pub mandatory_flag: bool,
    /// `_Multiplicity`; advisory only.
    pub multiplicity: Multiplicity,
    pub value_restriction: Option<ValueRestriction>,
}

impl Role {
    pub(crate) fn stub(id: &str, kind: RoleKind, fact_type: FactTypeId) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            kind,
            fact_type,
            player: None,
            mandatory_flag: false,
            multiplicity: Multiplicity::Unspecified,
            value_restriction: None,
        }
    }

    pub fn player_id(&self) -> Option<ObjectTypeId> {
        self.player.as_ref().and_then(|p| p.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FactTypeKind {
    Fact,
    Subtype { preferred_identification_path: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct FactType {
    pub id: String,
    pub name: String,
    pub kind: FactTypeKind,
    /// Owned roles in document order.
    pub roles: Vec<RoleId>,
    pub reading_orders: Vec<ReadingOrder>,
    /// Constraints whose whole scope lies in this fact type.
    pub internal_constraints: Vec<ConstraintId>,
    /// `InternalConstraints` as listed by the document.
    pub declared_internal_constraints: Vec<Reference<ConstraintId>>,
}

impl FactType {
    pub(crate) fn stub(id: &str, kind: FactTypeKind) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            kind,
            roles: Vec::new(),
            reading_orders: Vec::new(),
            internal_constraints: Vec::new(),
            declared_internal_constraints: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.roles.len()
    }
}

/// One resolved `SubtypeFact`: `subtype` is a kind of `supertype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtypeEdge {
    pub fact_type: FactTypeId,
    pub subtype: ObjectTypeId,
    pub supertype: ObjectTypeId,
    pub preferred_identification_path: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadingOrder {
    pub id: Option<String>,
    /// Permutation of the fact type's roles.
    pub role_sequence: Vec<Reference<RoleId>>,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub id: Option<String>,
    /// Template text with `{n}` placeholders.
    pub text: String,
    pub role_text: Vec<RoleText>,
}

/// Hyphen-binding decoration around one placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleText {
    pub role_index: usize,
    pub pre_bound_text: String,
    pub following_text: String,
}

// ============================================================================
// Constraints
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrequencyMax {
    Bounded(u32),
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConstraintKind {
    Mandatory {
        /// `IsSimple`
        simple: bool,
    },
    Uniqueness {
        /// `IsInternal`
        internal: bool,
        preferred_identifier_for: Option<Reference<ObjectTypeId>>,
    },
    Frequency {
        min: u32,
        max: FrequencyMax,
    },
    Subset,
    Equality,
    Exclusion,
    Ring {
        ring_type: Option<String>,
    },
    ValueComparison {
        operator: Option<String>,
    },
}

impl ConstraintKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConstraintKind::Mandatory { .. } => "mandatory",
            ConstraintKind::Uniqueness { .. } => "uniqueness",
            ConstraintKind::Frequency { .. } => "frequency",
            ConstraintKind::Subset => "subset",
            ConstraintKind::Equality => "equality",
            ConstraintKind::Exclusion => "exclusion",
            ConstraintKind::Ring { .. } => "ring",
            ConstraintKind::ValueComparison { .. } => "value comparison",
        }
    }

    /// Set-comparison kinds carry several role sequences.
    pub fn is_set_comparison(&self) -> bool {
        matches!(
            self,
            ConstraintKind::Subset | ConstraintKind::Equality | ConstraintKind::Exclusion
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleSequence {
    /// Canonical roles, proxies already discarded.
    pub roles: Vec<Reference<RoleId>>,
    /// A `JoinRule` was present; the path itself is not modeled.
    pub join_path: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImpliedBy {
    ObjectType(Reference<ObjectTypeId>),
    Constraint(Reference<ConstraintId>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Provenance {
    Simple,
    Implied(ImpliedBy),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Modality {
    #[default]
    Alethic,
    Deontic,
}

#[derive(Debug, Clone, Serialize)]
pub struct Constraint {
    pub id: String,
    pub name: String,
    pub kind: ConstraintKind,
    pub scope: Vec<RoleSequence>,
    pub provenance: Provenance,
    pub modality: Modality,
}

impl Constraint {
    pub(crate) fn stub(id: &str, kind: ConstraintKind) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            kind,
            scope: Vec::new(),
            provenance: Provenance::Simple,
            modality: Modality::Alethic,
        }
    }

    /// Every resolved role in scope, across all sequences, in order.
    pub fn scoped_roles(&self) -> impl Iterator<Item = RoleId> + '_ {
        self.scope
            .iter()
            .flat_map(|seq| seq.roles.iter())
            .filter_map(|r| r.target)
    }

    pub fn covers(&self, role: RoleId) -> bool {
        self.scoped_roles().any(|r| r == role)
    }

    pub fn is_implied(&self) -> bool {
        matches!(self.provenance, Provenance::Implied(_))
    }
}

// ============================================================================
// Leaf entities
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DataType {
    pub id: String,
    pub kind: DataTypeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReferenceModeType {
    General,
    Popular,
    UnitBased,
}

impl ReferenceModeType {
    pub fn from_attr(value: Option<&str>) -> Option<Self> {
        match value {
            Some("General") => Some(Self::General),
            Some("Popular") => Some(Self::Popular),
            Some("UnitBased") => Some(Self::UnitBased),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceModeKind {
    pub id: String,
    pub format_string: String,
    pub mode_type: ReferenceModeType,
}

// ============================================================================
// Graph
// ============================================================================

/// The built model of one document. Immutable once the builder returns it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaGraph {
    pub(crate) name: String,
    #[serde(skip)]
    pub(crate) registry: Registry,
    pub(crate) object_types: Vec<ObjectType>,
    pub(crate) fact_types: Vec<FactType>,
    pub(crate) roles: Vec<Role>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) data_types: Vec<DataType>,
    pub(crate) reference_mode_kinds: Vec<ReferenceModeKind>,
}

impl SchemaGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn object_type(&self, id: ObjectTypeId) -> &ObjectType {
        &self.object_types[id.index()]
    }

    pub fn fact_type(&self, id: FactTypeId) -> &FactType {
        &self.fact_types[id.index()]
    }

    pub fn role(&self, id: RoleId) -> &Role {
        &self.roles[id.index()]
    }

    pub fn constraint(&self, id: ConstraintId) -> &Constraint {
        &self.constraints[id.index()]
    }

    pub fn data_type(&self, id: DataTypeId) -> &DataType {
        &self.data_types[id.index()]
    }

    pub fn object_types(&self) -> impl Iterator<Item = (ObjectTypeId, &ObjectType)> {
        self.object_types
            .iter()
            .enumerate()
            .map(|(i, o)| (ObjectTypeId::new(i), o))
    }

    pub fn fact_types(&self) -> impl Iterator<Item = (FactTypeId, &FactType)> {
        self.fact_types
            .iter()
            .enumerate()
            .map(|(i, f)| (FactTypeId::new(i), f))
    }

    pub fn roles(&self) -> impl Iterator<Item = (RoleId, &Role)> {
        self.roles
            .iter()
            .enumerate()
            .map(|(i, r)| (RoleId::new(i), r))
    }

    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintId, &Constraint)> {
        self.constraints
            .iter()
            .enumerate()
            .map(|(i, c)| (ConstraintId::new(i), c))
    }

    pub fn data_types(&self) -> impl Iterator<Item = (DataTypeId, &DataType)> {
        self.data_types
            .iter()
            .enumerate()
            .map(|(i, d)| (DataTypeId::new(i), d))
    }

    pub fn reference_mode_kinds(&self) -> &[ReferenceModeKind] {
        &self.reference_mode_kinds
    }

    /// Look up an object type by its document id.
    pub fn object_type_by_id(&self, id: &str) -> Option<&ObjectType> {
        self.registry.object_type(id).ok().map(|h| self.object_type(h))
    }

    pub fn fact_type_by_id(&self, id: &str) -> Option<&FactType> {
        self.registry.fact_type(id).ok().map(|h| self.fact_type(h))
    }

    pub fn role_by_id(&self, id: &str) -> Option<&Role> {
        self.registry.role(id).ok().map(|h| self.role(h))
    }

    pub fn constraint_by_id(&self, id: &str) -> Option<&Constraint> {
        self.registry.constraint(id).ok().map(|h| self.constraint(h))
    }

    /// Roles whose resolved player is `object_type`, in role order.
    pub fn roles_played_by(&self, object_type: ObjectTypeId) -> Vec<RoleId> {
        self.roles()
            .filter(|(_, role)| role.player_id() == Some(object_type))
            .map(|(id, _)| id)
            .collect()
    }

    /// Data type kind of a value type, following its conceptual data type.
    pub fn value_kind(&self, object_type: ObjectTypeId) -> Option<DataTypeKind> {
        self.object_type(object_type)
            .data_type()
            .and_then(|cdt| cdt.data_type.target)
            .map(|dt| self.data_type(dt).kind)
    }

    /// Subtype facts whose two meta roles both have resolved players.
    pub fn subtype_edges(&self) -> Vec<SubtypeEdge> {
        self.fact_types()
            .filter_map(|(fact_id, fact)| {
                let FactTypeKind::Subtype {
                    preferred_identification_path,
                } = fact.kind
                else {
                    return None;
                };
                let player_of = |kind: RoleKind| {
                    fact.roles
                        .iter()
                        .map(|r| self.role(*r))
                        .find(|role| role.kind == kind)
                        .and_then(Role::player_id)
                };
                Some(SubtypeEdge {
                    fact_type: fact_id,
                    subtype: player_of(RoleKind::SubtypeMeta)?,
                    supertype: player_of(RoleKind::SupertypeMeta)?,
                    preferred_identification_path,
                })
            })
            .collect()
    }

    /// Data type kind that identifies instances of `object_type`.
    ///
    /// A value type answers with its own data type. An entity type follows
    /// its preferred identifier when that covers a single role, or else the
    /// subtype fact marked as its preferred identification path. Composite
    /// identifiers have no single data type.
    pub fn identifying_value_kind(&self, object_type: ObjectTypeId) -> Option<DataTypeKind> {
        let edges = self.subtype_edges();
        let mut visited = Vec::new();
        let mut current = object_type;
        loop {
            if visited.contains(&current) {
                return None;
            }
            visited.push(current);

            let ot = self.object_type(current);
            if ot.is_value_type() {
                return self.value_kind(current);
            }
            current = match ot.preferred_identifier.as_ref().and_then(|p| p.target) {
                Some(uniqueness) => {
                    let mut roles = self.constraint(uniqueness).scoped_roles();
                    match (roles.next(), roles.next()) {
                        (Some(role), None) => self.role(role).player_id()?,
                        _ => return None,
                    }
                }
                None => {
                    edges
                        .iter()
                        .find(|e| e.subtype == current && e.preferred_identification_path)?
                        .supertype
                }
            };
        }
    }

    /// Display label for a role.
    ///
    /// `R<n>` is the 1-based position of the role in its fact type.
    pub fn role_label(&self, id: RoleId, preference: RoleLabel) -> String {
        let role = self.role(id);
        let role_name = role.name.clone().filter(|n| !n.is_empty());
        let player_name = role
            .player_id()
            .map(|p| self.object_type(p).name.clone())
            .filter(|n| !n.is_empty());

        let first = match preference {
            RoleLabel::RoleName => role_name.or(player_name),
            RoleLabel::PlayerName => player_name.or(role_name),
        };
        first.unwrap_or_else(|| {
            let position = self
                .fact_type(role.fact_type)
                .roles
                .iter()
                .position(|r| *r == id)
                .unwrap_or(0);
            format!("R{}", position + 1)
        })
    }
}
