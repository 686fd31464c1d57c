//! Schema graph builder.
//!
//! Two passes over the `<orm:ORMModel>` subtree:
//! 1. Stub pass: register every identified element (object types, facts
//!    and their roles, constraints and their role proxies, data types,
//!    reference mode kinds) so forward references resolve regardless of
//!    document order.
//! 2. Link pass: fill in attributes and resolve references through the
//!    registry. Constraint bodies are handed to the [`resolver`](crate::resolver).
//!
//! The builder never stops early. Defects are collected and the
//! best-effort graph is returned alongside them.

use crate::datatype::DataTypeKind;
use crate::document::{Element, OrmDocument};
use crate::error::{Defect, DefectKind};
use crate::model::{
    ConceptualDataType, Constraint, DataType, FactType, FactTypeKind, Inclusion, Multiplicity,
    ObjectType, ObjectTypeKind, Reading, ReadingOrder, Reference, ReferenceModeKind,
    ReferenceModeType, Role, RoleKind, RoleText, SchemaGraph, ValueRange, ValueRestriction,
};
use crate::registry::{
    ConstraintId, DataTypeId, EntityRef, FactTypeId, ObjectTypeId, ReferenceModeKindId, Registry,
    Resolvable, RoleId,
};
use crate::resolver;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of building one document.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub graph: SchemaGraph,
    /// Reference, duplicate and structural defects found while building.
    pub defects: Vec<Defect>,
    /// Document features that were read but deliberately not modeled.
    pub omissions: Vec<String>,
}

/// Build a schema graph from a parsed document.
pub fn build(document: &OrmDocument) -> BuildOutcome {
    build_model(document.model())
}

/// Build a schema graph from an `<orm:ORMModel>` element.
pub fn build_model(model: &Element) -> BuildOutcome {
    let mut builder = GraphBuilder::new(model);
    builder.register_stubs();
    builder.link();
    builder.finish()
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Defect and omission collector shared by the builder and resolver.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    pub defects: Vec<Defect>,
    pub omissions: Vec<String>,
}

impl Diagnostics {
    pub fn push(&mut self, kind: DefectKind, entity: &str, message: impl Into<String>) {
        let defect = Defect::new(kind, entity, message);
        debug!("{}", defect);
        self.defects.push(defect);
    }

    /// Record a subtree that could not be read.
    pub fn malformed(&mut self, entity: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(entity, "Malformed element: {}", message);
        self.defects
            .push(Defect::new(DefectKind::MalformedElement, entity, message));
    }

    pub fn omit(&mut self, note: impl Into<String>) {
        let note = note.into();
        debug!("Omitted: {}", note);
        self.omissions.push(note);
    }

    /// Resolve `raw` held by `holder`, recording a defect on failure.
    pub fn link<H: Resolvable>(
        &mut self,
        registry: &Registry,
        holder: &str,
        context: &str,
        raw: &str,
    ) -> Reference<H> {
        let (reference, err) = Reference::resolve(raw, registry);
        if let Some(err) = err {
            self.defects.push(err.into_defect(holder, context));
        }
        reference
    }

    /// Resolve the `ref` attribute of `node`, if the node exists.
    pub fn link_child<H: Resolvable>(
        &mut self,
        registry: &Registry,
        holder: &str,
        context: &str,
        node: Option<&Element>,
    ) -> Option<Reference<H>> {
        let node = node?;
        match node.reference() {
            Some(raw) => Some(self.link(registry, holder, context, raw)),
            None => {
                self.malformed(holder, format!("<{}> has no ref attribute", node.name));
                None
            }
        }
    }
}

/// Best identifier for a defect about `node`.
pub(crate) fn describe(node: &Element) -> String {
    node.id()
        .or_else(|| node.non_empty_attr("Name"))
        .map(str::to_string)
        .unwrap_or_else(|| format!("<{}>", node.name))
}

// ============================================================================
// Builder
// ============================================================================

struct GraphBuilder<'a> {
    model: &'a Element,
    graph: SchemaGraph,
    diag: Diagnostics,
    // Source elements, index-aligned with the graph arenas.
    object_nodes: Vec<&'a Element>,
    fact_nodes: Vec<&'a Element>,
    role_nodes: Vec<&'a Element>,
    constraint_nodes: Vec<&'a Element>,
}

impl<'a> GraphBuilder<'a> {
    fn new(model: &'a Element) -> Self {
        let graph = SchemaGraph {
            name: model.attr("Name").unwrap_or_default().to_string(),
            ..SchemaGraph::default()
        };
        Self {
            model,
            graph,
            diag: Diagnostics::default(),
            object_nodes: Vec::new(),
            fact_nodes: Vec::new(),
            role_nodes: Vec::new(),
            constraint_nodes: Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Pass 1
    // ------------------------------------------------------------------------

    fn register_stubs(&mut self) {
        let model = self.model;
        for section in &model.children {
            match section.name.as_str() {
                "Objects" => section
                    .children
                    .iter()
                    .for_each(|node| self.stub_object_type(node)),
                "Facts" => section.children.iter().for_each(|node| self.stub_fact(node)),
                "Constraints" => section
                    .children
                    .iter()
                    .for_each(|node| self.stub_constraint(node)),
                "DataTypes" => section
                    .children
                    .iter()
                    .for_each(|node| self.stub_data_type(node)),
                "ReferenceModeKinds" => section
                    .children
                    .iter()
                    .for_each(|node| self.stub_reference_mode_kind(node)),
                other => debug!("Skipping model section <{}>", other),
            }
        }
        debug!(identifiers = self.graph.registry.len(), "Stub pass complete");
    }

    /// Register `node`'s id. Returns the id when registration succeeded.
    fn register(&mut self, node: &Element, entity: EntityRef) -> Option<String> {
        let Some(id) = node.id() else {
            self.diag
                .malformed(&describe(node), format!("<{}> has no id", node.name));
            return None;
        };
        match self.graph.registry.register(id, entity) {
            Ok(()) => Some(id.to_string()),
            Err(err) => {
                let context = format!("<{}>", node.name);
                self.diag.defects.push(err.into_defect(id, &context));
                None
            }
        }
    }

    fn stub_object_type(&mut self, node: &'a Element) {
        if !matches!(
            node.name.as_str(),
            "EntityType" | "ValueType" | "ObjectifiedType"
        ) {
            self.diag
                .omit(format!("Object element <{}> {}", node.name, describe(node)));
            return;
        }
        let handle = ObjectTypeId::new(self.graph.object_types.len());
        if let Some(id) = self.register(node, EntityRef::ObjectType(handle)) {
            self.graph.object_types.push(ObjectType::stub(&id));
            self.object_nodes.push(node);
        }
    }

    fn stub_fact(&mut self, node: &'a Element) {
        let kind = match node.name.as_str() {
            "Fact" => FactTypeKind::Fact,
            "SubtypeFact" => FactTypeKind::Subtype {
                preferred_identification_path: node.flag("PreferredIdentificationPath"),
            },
            "ImpliedFact" => {
                self.diag.omit(format!("Implied fact {}", describe(node)));
                return;
            }
            other => {
                self.diag
                    .omit(format!("Fact element <{}> {}", other, describe(node)));
                return;
            }
        };

        let fact = FactTypeId::new(self.graph.fact_types.len());
        let Some(id) = self.register(node, EntityRef::FactType(fact)) else {
            return;
        };
        self.graph.fact_types.push(FactType::stub(&id, kind));
        self.fact_nodes.push(node);

        let Some(fact_roles) = node.child("FactRoles") else {
            return;
        };
        for role_node in &fact_roles.children {
            let Some(role_kind) = RoleKind::from_tag(&role_node.name) else {
                self.diag.omit(format!(
                    "Role element <{}> in fact {}",
                    role_node.name, id
                ));
                continue;
            };
            let role = RoleId::new(self.graph.roles.len());
            if let Some(role_id) = self.register(role_node, EntityRef::Role(role)) {
                self.graph.roles.push(Role::stub(&role_id, role_kind, fact));
                self.graph.fact_types[fact.index()].roles.push(role);
                self.role_nodes.push(role_node);
            }
        }
    }

    fn stub_constraint(&mut self, node: &'a Element) {
        let Some(kind) = resolver::kind_for_tag(&node.name) else {
            self.diag
                .omit(format!("Constraint element <{}> {}", node.name, describe(node)));
            return;
        };
        let constraint = ConstraintId::new(self.graph.constraints.len());
        let Some(id) = self.register(node, EntityRef::Constraint(constraint)) else {
            return;
        };
        self.graph.constraints.push(Constraint::stub(&id, kind));
        self.constraint_nodes.push(node);

        // Role proxies share the document's id space.
        for sequence in resolver::sequence_nodes(node) {
            for entry in sequence.children_named("Role") {
                if entry.id().is_some() {
                    self.register(entry, EntityRef::RoleProxy(constraint));
                }
            }
        }
    }

    fn stub_data_type(&mut self, node: &'a Element) {
        let handle = DataTypeId::new(self.graph.data_types.len());
        let Some(id) = self.register(node, EntityRef::DataType(handle)) else {
            return;
        };
        let kind = DataTypeKind::from_tag(&node.name).unwrap_or_else(|| {
            self.diag.malformed(
                &id,
                format!("unknown data type <{}>, treated as unspecified", node.name),
            );
            DataTypeKind::Unspecified
        });
        self.graph.data_types.push(DataType { id, kind });
    }

    fn stub_reference_mode_kind(&mut self, node: &'a Element) {
        let handle = ReferenceModeKindId::new(self.graph.reference_mode_kinds.len());
        let Some(id) = self.register(node, EntityRef::ReferenceModeKind(handle)) else {
            return;
        };
        let mode_type = ReferenceModeType::from_attr(node.attr("ReferenceModeType"))
            .unwrap_or_else(|| {
                self.diag.malformed(
                    &id,
                    format!(
                        "unknown reference mode type '{}'",
                        node.attr("ReferenceModeType").unwrap_or_default()
                    ),
                );
                ReferenceModeType::General
            });
        self.graph.reference_mode_kinds.push(ReferenceModeKind {
            id,
            format_string: node.attr("FormatString").unwrap_or_default().to_string(),
            mode_type,
        });
    }

    // ------------------------------------------------------------------------
    // Pass 2
    // ------------------------------------------------------------------------

    fn link(&mut self) {
        for index in 0..self.object_nodes.len() {
            let object_type = self.link_object_type(index);
            self.graph.object_types[index] = object_type;
        }
        for index in 0..self.role_nodes.len() {
            self.link_role(index);
        }
        for index in 0..self.fact_nodes.len() {
            self.link_fact(index);
        }
        for index in 0..self.constraint_nodes.len() {
            let node = self.constraint_nodes[index];
            let stub = &self.graph.constraints[index];
            let resolved =
                resolver::resolve_constraint(node, stub, &self.graph.registry, &mut self.diag);
            self.graph.constraints[index] = resolved;
        }

        resolver::link_internal_constraints(&mut self.graph);
        for (id, _) in self.graph.constraints() {
            if let Some(defect) = resolver::implied_defect(&self.graph, id) {
                self.diag.defects.push(defect);
            }
        }
    }

    fn link_object_type(&mut self, index: usize) -> ObjectType {
        let node = self.object_nodes[index];
        let registry = &self.graph.registry;
        let diag = &mut self.diag;
        let id = self.graph.object_types[index].id.clone();

        let mut implicit = node.flag("IsImplicitBooleanValue");
        let kind = match node.name.as_str() {
            "ValueType" => ObjectTypeKind::Value {
                data_type: node
                    .child("ConceptualDataType")
                    .map(|cdt| conceptual_data_type(&id, cdt, registry, diag)),
                value_restriction: node
                    .descend(&["ValueRestriction", "ValueConstraint"])
                    .map(|vc| value_restriction(&id, vc, diag)),
            },
            _ => {
                let nested = node.child("NestedPredicate");
                if nested.is_some_and(|n| n.flag("IsImplied")) {
                    implicit = true;
                }
                ObjectTypeKind::Entity {
                    objectifies: diag.link_child(registry, &id, "objectified fact type", nested),
                }
            }
        };

        let played_roles = node
            .child("PlayedRoles")
            .map(|played| {
                played
                    .children
                    .iter()
                    .filter_map(|r| diag.link_child(registry, &id, "played role", Some(r)))
                    .collect()
            })
            .unwrap_or_default();

        for rule in ["SubtypeDerivationRule", "DerivationRule"] {
            if node.child(rule).is_some() {
                diag.omit(format!("{} for {}", rule, id));
            }
        }

        ObjectType {
            name: node.attr("Name").unwrap_or_default().to_string(),
            kind,
            independent: node.flag("IsIndependent"),
            implicit,
            reference_mode: node.non_empty_attr("_ReferenceMode").map(str::to_string),
            preferred_identifier: diag.link_child(
                registry,
                &id,
                "preferred identifier",
                node.child("PreferredIdentifier"),
            ),
            played_roles,
            id,
        }
    }

    fn link_role(&mut self, index: usize) {
        let node = self.role_nodes[index];
        let registry = &self.graph.registry;
        let diag = &mut self.diag;
        let id = self.graph.roles[index].id.clone();

        let player = match node.child("RolePlayer") {
            Some(player) => diag.link_child(registry, &id, "role player", Some(player)),
            None => {
                diag.malformed(&id, "role has no <RolePlayer>");
                None
            }
        };
        let multiplicity =
            Multiplicity::from_attr(node.attr("_Multiplicity")).unwrap_or_else(|| {
                diag.malformed(
                    &id,
                    format!(
                        "unknown multiplicity '{}'",
                        node.attr("_Multiplicity").unwrap_or_default()
                    ),
                );
                Multiplicity::Unspecified
            });
        let restriction = node
            .descend(&["ValueRestriction", "RoleValueConstraint"])
            .map(|vc| value_restriction(&id, vc, diag));

        let role = &mut self.graph.roles[index];
        role.name = node.non_empty_attr("Name").map(str::to_string);
        role.player = player;
        role.mandatory_flag = node.flag("_IsMandatory");
        role.multiplicity = multiplicity;
        role.value_restriction = restriction;
    }

    fn link_fact(&mut self, index: usize) {
        let node = self.fact_nodes[index];
        let registry = &self.graph.registry;
        let diag = &mut self.diag;
        let id = self.graph.fact_types[index].id.clone();

        let reading_orders = node
            .child("ReadingOrders")
            .map(|orders| {
                orders
                    .children_named("ReadingOrder")
                    .map(|order| reading_order(&id, order, registry, diag))
                    .collect()
            })
            .unwrap_or_default();

        let declared = node
            .child("InternalConstraints")
            .map(|internal| {
                internal
                    .children
                    .iter()
                    .filter_map(|c| diag.link_child(registry, &id, "internal constraint", Some(c)))
                    .collect()
            })
            .unwrap_or_default();

        for rule in ["DerivationRule", "DerivationSource"] {
            if node.child(rule).is_some() {
                diag.omit(format!("{} for fact {}", rule, id));
            }
        }

        let fact = &mut self.graph.fact_types[index];
        fact.name = node.attr("_Name").unwrap_or_default().to_string();
        fact.reading_orders = reading_orders;
        fact.declared_internal_constraints = declared;
    }

    fn finish(self) -> BuildOutcome {
        let graph = self.graph;
        info!(
            object_types = graph.object_types.len(),
            fact_types = graph.fact_types.len(),
            roles = graph.roles.len(),
            constraints = graph.constraints.len(),
            defects = self.diag.defects.len(),
            omissions = self.diag.omissions.len(),
            "Built schema graph '{}'",
            graph.name
        );
        BuildOutcome {
            graph,
            defects: self.diag.defects,
            omissions: self.diag.omissions,
        }
    }
}

// ============================================================================
// Element readers
// ============================================================================

fn conceptual_data_type(
    holder: &str,
    node: &Element,
    registry: &Registry,
    diag: &mut Diagnostics,
) -> ConceptualDataType {
    let raw = node.reference().unwrap_or_default();
    if raw.is_empty() {
        diag.malformed(holder, "<ConceptualDataType> has no ref attribute");
    }
    ConceptualDataType {
        data_type: diag.link(registry, holder, "conceptual data type", raw),
        length: parse_size(holder, node, "Length", diag),
        scale: parse_size(holder, node, "Scale", diag),
    }
}

fn parse_size(holder: &str, node: &Element, attr: &str, diag: &mut Diagnostics) -> Option<u32> {
    let value = node.non_empty_attr(attr)?;
    match value.parse::<u32>() {
        Ok(0) => None,
        Ok(size) => Some(size),
        Err(_) => {
            diag.malformed(holder, format!("{} '{}' is not a size", attr, value));
            None
        }
    }
}

fn value_restriction(owner: &str, node: &Element, diag: &mut Diagnostics) -> ValueRestriction {
    let entity = node.id().unwrap_or(owner).to_string();
    let ranges = node
        .child("ValueRanges")
        .map(|ranges| {
            ranges
                .children_named("ValueRange")
                .map(|range| value_range(&entity, range, diag))
                .collect()
        })
        .unwrap_or_default();
    ValueRestriction {
        id: node.id().map(str::to_string),
        name: node.non_empty_attr("Name").map(str::to_string),
        ranges,
    }
}

fn value_range(entity: &str, node: &Element, diag: &mut Diagnostics) -> ValueRange {
    let mut inclusion = |attr: &str| {
        Inclusion::from_attr(node.attr(attr)).unwrap_or_else(|| {
            diag.malformed(
                entity,
                format!(
                    "{} '{}' is not NotSet, Open or Closed",
                    attr,
                    node.attr(attr).unwrap_or_default()
                ),
            );
            Inclusion::NotSet
        })
    };
    let min_inclusion = inclusion("MinInclusion");
    let max_inclusion = inclusion("MaxInclusion");
    let bound = |attr: &str| node.non_empty_attr(attr).map(str::to_string);
    ValueRange {
        min: bound("MinValue"),
        max: bound("MaxValue"),
        min_inclusion,
        max_inclusion,
        invariant_min: bound("InvariantMinValue"),
        invariant_max: bound("InvariantMaxValue"),
    }
}

fn reading_order(
    fact: &str,
    node: &Element,
    registry: &Registry,
    diag: &mut Diagnostics,
) -> ReadingOrder {
    let role_sequence = node
        .child("RoleSequence")
        .map(|seq| {
            // Placeholders keep their position even when an entry is unusable.
            seq.children
                .iter()
                .map(|r| {
                    diag.link_child(registry, fact, "reading order role", Some(r))
                        .unwrap_or_else(Reference::missing)
                })
                .collect()
        })
        .unwrap_or_default();

    let readings = node
        .child("Readings")
        .map(|readings| {
            readings
                .children_named("Reading")
                .map(|reading| Reading {
                    id: reading.id().map(str::to_string),
                    text: reading
                        .child("Data")
                        .map(|d| d.text.clone())
                        .unwrap_or_default(),
                    role_text: role_text(fact, reading, diag),
                })
                .collect()
        })
        .unwrap_or_default();

    ReadingOrder {
        id: node.id().map(str::to_string),
        role_sequence,
        readings,
    }
}

fn role_text(fact: &str, reading: &Element, diag: &mut Diagnostics) -> Vec<RoleText> {
    let Some(expanded) = reading.child("ExpandedData") else {
        return Vec::new();
    };
    expanded
        .children_named("RoleText")
        .filter_map(|text| {
            let raw = text.attr("RoleIndex").unwrap_or_default();
            match raw.parse::<usize>() {
                Ok(role_index) => Some(RoleText {
                    role_index,
                    pre_bound_text: text.attr("PreBoundText").unwrap_or_default().to_string(),
                    following_text: text.attr("FollowingText").unwrap_or_default().to_string(),
                }),
                Err(_) => {
                    diag.malformed(fact, format!("RoleIndex '{}' is not an index", raw));
                    None
                }
            }
        })
        .collect()
}
