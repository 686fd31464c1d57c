//! Consistency validation for built schema graphs.
//!
//! Runs six independent checks over the whole graph:
//! 1. Reference integrity (every stored reference resolves to the right kind)
//! 2. Role ownership (arity ≥ 2, each role owned by exactly one fact type)
//! 3. Constraint scope validity (internal uniqueness, frequency bounds,
//!    value range brackets, declared internal constraints, reading orders)
//! 4. Mandatory coverage of roles flagged `_IsMandatory`
//! 5. Implied-constraint provenance
//! 6. Subtype graph shape (one root per graph, no cycles)
//!
//! Checks only read the graph. The report lists defects in check order,
//! then entity order within each check.

use crate::config::{CheckConfig, RoleLabel};
use crate::datatype::{DataTypeCategory, ValueOrdering};
use crate::error::{Defect, DefectKind};
use crate::model::{
    ConstraintKind, FactType, FrequencyMax, ImpliedBy, ObjectTypeKind, Provenance, ReadingOrder,
    Reference, SchemaGraph, ValueRange, ValueRestriction,
};
use crate::registry::{FactTypeId, ObjectTypeId, Resolvable, RoleId};
use crate::resolver;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Ordered list of defects found in one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    defects: Vec<Defect>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defects(defects: Vec<Defect>) -> Self {
        Self { defects }
    }

    /// `true` when no defects were found.
    pub fn is_clean(&self) -> bool {
        self.defects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.defects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defects.is_empty()
    }

    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    pub fn iter(&self) -> impl Iterator<Item = &Defect> {
        self.defects.iter()
    }

    /// Number of defects of `kind`.
    pub fn count_of(&self, kind: DefectKind) -> usize {
        self.defects.iter().filter(|d| d.kind == kind).count()
    }

    pub fn into_defects(self) -> Vec<Defect> {
        self.defects
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for defect in &self.defects {
            writeln!(f, "{}", defect)?;
        }
        Ok(())
    }
}

/// A validator check: total over the graph, read-only.
pub type Check = fn(&SchemaGraph) -> Vec<Defect>;

/// The checks in report order.
pub const CHECKS: [(&str, Check); 6] = [
    ("reference integrity", check_references),
    ("role ownership", check_ownership),
    ("constraint scope", check_constraint_scopes),
    ("mandatory coverage", check_mandatory_coverage),
    ("implied provenance", check_implied_provenance),
    ("subtype graph", check_subtype_graph),
];

/// Validate a graph with the checks run one after another.
pub fn validate(graph: &SchemaGraph) -> Report {
    validate_with(graph, &CheckConfig::default())
}

/// Validate a graph, running the checks on the rayon pool when
/// `parallel_checks` is set. Report order does not depend on the mode.
pub fn validate_with(graph: &SchemaGraph, config: &CheckConfig) -> Report {
    let checks: &[(&str, Check)] = &CHECKS;
    let per_check: Vec<Vec<Defect>> = if config.parallel_checks {
        checks
            .par_iter()
            .map(|(name, check)| run_check(graph, name, *check))
            .collect()
    } else {
        checks
            .iter()
            .map(|(name, check)| run_check(graph, name, *check))
            .collect()
    };

    let report = Report::from_defects(per_check.into_iter().flatten().collect());
    info!(
        defects = report.len(),
        parallel = config.parallel_checks,
        "Validated schema graph '{}'",
        graph.name()
    );
    report
}

fn run_check(graph: &SchemaGraph, name: &str, check: Check) -> Vec<Defect> {
    let defects = check(graph);
    debug!(check = name, defects = defects.len(), "Check complete");
    defects
}

// ============================================================================
// 1. Reference integrity
// ============================================================================

/// Re-resolve every stored reference through the registry.
pub fn check_references(graph: &SchemaGraph) -> Vec<Defect> {
    let mut defects = Vec::new();
    let mut recheck = |holder: &str, context: &str, reference: &dyn Recheck| {
        if let Some(defect) = reference.recheck_defect(graph, holder, context) {
            defects.push(defect);
        }
    };

    for (_, ot) in graph.object_types() {
        if let Some(pid) = &ot.preferred_identifier {
            recheck(&ot.id, "preferred identifier", pid);
        }
        for role in &ot.played_roles {
            recheck(&ot.id, "played role", role);
        }
        match &ot.kind {
            ObjectTypeKind::Entity {
                objectifies: Some(fact),
            } => recheck(&ot.id, "objectified fact type", fact),
            ObjectTypeKind::Value {
                data_type: Some(cdt),
                ..
            } => recheck(&ot.id, "conceptual data type", &cdt.data_type),
            _ => {}
        }
    }

    for (_, role) in graph.roles() {
        if let Some(player) = &role.player {
            recheck(&role.id, "role player", player);
        }
    }

    for (_, fact) in graph.fact_types() {
        for order in &fact.reading_orders {
            // Entries with no ref were already reported by the builder.
            for role in order.role_sequence.iter().filter(|r| !r.is_missing()) {
                recheck(&fact.id, "reading order role", role);
            }
        }
        for constraint in &fact.declared_internal_constraints {
            recheck(&fact.id, "internal constraint", constraint);
        }
    }

    for (_, constraint) in graph.constraints() {
        for role in constraint.scope.iter().flat_map(|seq| seq.roles.iter()) {
            recheck(&constraint.id, "constraint role", role);
        }
        if let ConstraintKind::Uniqueness {
            preferred_identifier_for: Some(ot),
            ..
        } = &constraint.kind
        {
            recheck(&constraint.id, "preferred identifier for", ot);
        }
        match &constraint.provenance {
            Provenance::Implied(ImpliedBy::ObjectType(ot)) => {
                recheck(&constraint.id, "implying object type", ot)
            }
            Provenance::Implied(ImpliedBy::Constraint(c)) => {
                recheck(&constraint.id, "implying constraint", c)
            }
            Provenance::Simple => {}
        }
    }

    defects
}

/// Object-safe view over `Reference<H>` for any handle type.
trait Recheck {
    fn recheck_defect(&self, graph: &SchemaGraph, holder: &str, context: &str) -> Option<Defect>;
}

impl<H: Resolvable> Recheck for Reference<H> {
    fn recheck_defect(&self, graph: &SchemaGraph, holder: &str, context: &str) -> Option<Defect> {
        self.recheck(graph.registry())
            .err()
            .map(|err| err.into_defect(holder, context))
    }
}

// ============================================================================
// 2. Role ownership
// ============================================================================

pub fn check_ownership(graph: &SchemaGraph) -> Vec<Defect> {
    let mut defects = Vec::new();
    let mut owners = vec![None; graph.roles.len()];

    for (fact_id, fact) in graph.fact_types() {
        if fact.arity() < 2 {
            defects.push(Defect::new(
                DefectKind::DegenerateFactType,
                &fact.id,
                format!("fact type has {} role(s), expected at least 2", fact.arity()),
            ));
        }
        for &role_id in &fact.roles {
            let role = graph.role(role_id);
            let previous = owners[role_id.index()];
            match previous {
                Some(other) if other != fact_id => defects.push(Defect::new(
                    DefectKind::RoleOwnershipConflict,
                    &role.id,
                    format!(
                        "role is listed by fact types {} and {}",
                        graph.fact_type(other).id,
                        fact.id
                    ),
                )),
                _ => owners[role_id.index()] = Some(fact_id),
            }
            if role.fact_type != fact_id {
                defects.push(Defect::new(
                    DefectKind::RoleOwnershipConflict,
                    &role.id,
                    format!(
                        "role is listed by fact type {} but belongs to {}",
                        fact.id,
                        graph.fact_type(role.fact_type).id
                    ),
                ));
            }
        }
    }

    for (role_id, role) in graph.roles() {
        if owners[role_id.index()].is_none() {
            defects.push(Defect::new(
                DefectKind::RoleOwnershipConflict,
                &role.id,
                format!(
                    "role is not listed by its fact type {}",
                    graph.fact_type(role.fact_type).id
                ),
            ));
        }
    }

    for (ot_id, ot) in graph.object_types() {
        for played in &ot.played_roles {
            let Some(role_id) = played.target else {
                continue;
            };
            let role = graph.role(role_id);
            if role.player_id() != Some(ot_id) {
                let player = role
                    .player_id()
                    .map(|p| graph.object_type(p).id.as_str())
                    .unwrap_or("no object type");
                defects.push(Defect::new(
                    DefectKind::RoleOwnershipConflict,
                    &ot.id,
                    format!("lists played role {} which is played by {}", role.id, player),
                ));
            }
        }
    }

    defects
}

// ============================================================================
// 3. Constraint scope validity
// ============================================================================

pub fn check_constraint_scopes(graph: &SchemaGraph) -> Vec<Defect> {
    let mut defects = Vec::new();

    for (_, constraint) in graph.constraints() {
        let scope_error = |message: String| {
            Defect::new(DefectKind::InvalidConstraintScope, &constraint.id, message)
        };
        match &constraint.kind {
            ConstraintKind::Uniqueness { internal: true, .. } => {
                let facts = fact_types_in_scope(graph, constraint.scoped_roles());
                if facts.len() > 1 {
                    defects.push(scope_error(format!(
                        "internal uniqueness constraint spans {} fact types",
                        facts.len()
                    )));
                }
            }
            ConstraintKind::Frequency { min, max } => {
                if let Some(message) = frequency_problem(*min, *max) {
                    defects.push(Defect::new(
                        DefectKind::InvalidFrequencyRange,
                        &constraint.id,
                        message,
                    ));
                }
            }
            ConstraintKind::Mandatory { simple: true } => {
                let count = constraint.scoped_roles().count();
                if count > 1 {
                    defects.push(scope_error(format!(
                        "simple mandatory constraint covers {} roles",
                        count
                    )));
                }
            }
            kind if kind.is_set_comparison() => {
                let lengths: BTreeSet<usize> =
                    constraint.scope.iter().map(|seq| seq.roles.len()).collect();
                if lengths.len() > 1 {
                    defects.push(scope_error(format!(
                        "{} constraint compares role sequences of unequal length",
                        kind.label()
                    )));
                }
            }
            _ => {}
        }
    }

    for (fact_id, fact) in graph.fact_types() {
        for declared in &fact.declared_internal_constraints {
            let Some(cid) = declared.target else {
                continue;
            };
            let constraint = graph.constraint(cid);
            let outside: Vec<&str> = constraint
                .scoped_roles()
                .filter(|r| graph.role(*r).fact_type != fact_id)
                .map(|r| graph.role(r).id.as_str())
                .collect();
            if !outside.is_empty() {
                defects.push(Defect::new(
                    DefectKind::InvalidConstraintScope,
                    &fact.id,
                    format!(
                        "internal constraint {} covers roles outside the fact type: {}",
                        constraint.id,
                        outside.join(", ")
                    ),
                ));
            }
        }
    }

    for (_, fact) in graph.fact_types() {
        for order in &fact.reading_orders {
            if let Some(defect) = reading_order_problem(graph, fact, order) {
                defects.push(defect);
            }
        }
    }

    for (ot_id, ot) in graph.object_types() {
        if let Some(restriction) = ot.value_restriction() {
            check_restriction(graph, &ot.id, restriction, Some(ot_id), &mut defects);
        }
    }
    for (_, role) in graph.roles() {
        if let Some(restriction) = &role.value_restriction {
            check_restriction(graph, &role.id, restriction, role.player_id(), &mut defects);
        }
    }

    defects
}

/// `1 ≤ min ≤ max`, with an unbounded max accepting any min.
pub fn frequency_problem(min: u32, max: FrequencyMax) -> Option<String> {
    if min < 1 {
        return Some(format!("min frequency {} is below 1", min));
    }
    match max {
        FrequencyMax::Bounded(max) if min > max => Some(format!(
            "min frequency {} exceeds max frequency {}",
            min, max
        )),
        _ => None,
    }
}

fn fact_types_in_scope(
    graph: &SchemaGraph,
    roles: impl Iterator<Item = RoleId>,
) -> BTreeSet<FactTypeId> {
    roles.map(|r| graph.role(r).fact_type).collect()
}

/// A reading order must list each of its fact type's roles exactly once.
fn reading_order_problem(
    graph: &SchemaGraph,
    fact: &FactType,
    order: &ReadingOrder,
) -> Option<Defect> {
    // Dangling refs belong to check 1.
    if order
        .role_sequence
        .iter()
        .any(|r| r.target.is_none() && !r.is_missing())
    {
        return None;
    }
    let mut listed: Vec<RoleId> = order.role_sequence.iter().filter_map(|r| r.target).collect();
    let missing = order.role_sequence.len() - listed.len();
    listed.sort();
    let mut owned = fact.roles.clone();
    owned.sort();
    if missing == 0 && listed == owned {
        return None;
    }

    let names = |roles: &[RoleId]| {
        roles
            .iter()
            .map(|r| graph.role(*r).id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let entity = order.id.as_deref().unwrap_or(&fact.id);
    let mut message = format!(
        "reading order of fact type {} lists [{}] but the fact type has [{}]",
        fact.id,
        names(&listed),
        names(&owned)
    );
    if missing > 0 {
        message.push_str(&format!(" ({} entry without a role)", missing));
    }
    Some(Defect::new(DefectKind::MalformedRoleSequence, entity, message))
}

fn check_restriction(
    graph: &SchemaGraph,
    owner: &str,
    restriction: &ValueRestriction,
    player: Option<ObjectTypeId>,
    defects: &mut Vec<Defect>,
) {
    let declared = player
        .and_then(|ot| graph.identifying_value_kind(ot))
        .filter(|kind| kind.category() != DataTypeCategory::Unspecified)
        .map(|kind| kind.ordering());
    let entity = restriction.id.as_deref().unwrap_or(owner);

    for range in &restriction.ranges {
        let ordering = declared.unwrap_or_else(|| ValueOrdering::infer(range.bounds()));
        for message in range_problems(range, ordering) {
            defects.push(Defect::new(
                DefectKind::InvalidValueRangeBracket,
                entity,
                message,
            ));
        }
    }
}

/// Every problem with one range.
pub fn range_problems(range: &ValueRange, ordering: ValueOrdering) -> Vec<String> {
    let mut problems = Vec::new();

    if let (Some(min), Some(max)) = (&range.min, &range.max) {
        match ordering.compare(min, max) {
            Err(message) => problems.push(message),
            Ok(Ordering::Greater) => {
                problems.push(format!("min value {} exceeds max value {}", min, max))
            }
            Ok(Ordering::Equal) if range.min_inclusion.is_open() || range.max_inclusion.is_open() => {
                problems.push(format!("range {}..{} with an open end is empty", min, max))
            }
            Ok(_) => {}
        }
    }

    if let Some(invariant) = &range.invariant_min {
        match &range.min {
            None => problems.push(format!(
                "invariant min {} is tighter than the unbounded min",
                invariant
            )),
            Some(min) => match ordering.compare(invariant, min) {
                Err(message) => problems.push(message),
                Ok(Ordering::Greater) => {
                    problems.push(format!("invariant min {} exceeds min {}", invariant, min))
                }
                Ok(_) => {}
            },
        }
    }

    if let Some(invariant) = &range.invariant_max {
        match &range.max {
            None => problems.push(format!(
                "invariant max {} is tighter than the unbounded max",
                invariant
            )),
            Some(max) => match ordering.compare(invariant, max) {
                Err(message) => problems.push(message),
                Ok(Ordering::Less) => {
                    problems.push(format!("invariant max {} is below max {}", invariant, max))
                }
                Ok(_) => {}
            },
        }
    }

    // A bad bound fails every comparison it takes part in; say so once.
    let mut seen = BTreeSet::new();
    problems.retain(|p| seen.insert(p.clone()));
    problems
}

// ============================================================================
// 4. Mandatory coverage
// ============================================================================

pub fn check_mandatory_coverage(graph: &SchemaGraph) -> Vec<Defect> {
    let covered: BTreeSet<RoleId> = graph
        .constraints()
        .filter(|(_, c)| matches!(c.kind, ConstraintKind::Mandatory { .. }))
        .flat_map(|(_, c)| c.scoped_roles())
        .collect();

    graph
        .roles()
        .filter(|(id, role)| role.mandatory_flag && !covered.contains(id))
        .map(|(id, role)| {
            Defect::new(
                DefectKind::MissingMandatoryConstraint,
                &role.id,
                format!(
                    "role '{}' is marked mandatory but no mandatory constraint covers it",
                    graph.role_label(id, RoleLabel::RoleName)
                ),
            )
        })
        .collect()
}

// ============================================================================
// 5. Implied provenance
// ============================================================================

pub fn check_implied_provenance(graph: &SchemaGraph) -> Vec<Defect> {
    graph
        .constraints()
        .filter_map(|(id, _)| resolver::implied_defect(graph, id))
        .collect()
}

// ============================================================================
// 6. Subtype graph
// ============================================================================

/// Every subtype graph has exactly one root and no cycles.
///
/// A multiple-root defect names the object type where two graphs meet;
/// its own subtypes inherit the problem and are not reported again. A
/// cycle is reported once, on its first member in document order.
pub fn check_subtype_graph(graph: &SchemaGraph) -> Vec<Defect> {
    let mut supertypes: BTreeMap<ObjectTypeId, BTreeSet<ObjectTypeId>> = BTreeMap::new();
    for edge in graph.subtype_edges() {
        supertypes.entry(edge.subtype).or_default().insert(edge.supertype);
    }
    let direct = |ot: ObjectTypeId| supertypes.get(&ot).into_iter().flatten().copied();
    let ancestors = |ot: ObjectTypeId| {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<ObjectTypeId> = direct(ot).collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(direct(next));
            }
        }
        seen
    };
    let roots_of = |ot: ObjectTypeId| -> BTreeSet<ObjectTypeId> {
        let mut above = ancestors(ot);
        above.insert(ot);
        above.into_iter().filter(|a| !supertypes.contains_key(a)).collect()
    };

    let mut defects = Vec::new();
    for &ot in supertypes.keys() {
        let above = ancestors(ot);
        if above.contains(&ot) {
            let first = above
                .iter()
                .copied()
                .filter(|member| ancestors(*member).contains(&ot))
                .chain(std::iter::once(ot))
                .min();
            if first == Some(ot) {
                defects.push(Defect::new(
                    DefectKind::InvalidSubtypeGraph,
                    &graph.object_type(ot).id,
                    format!(
                        "'{}' is its own supertype through a subtype cycle",
                        graph.object_type(ot).name
                    ),
                ));
            }
            continue;
        }

        let roots = roots_of(ot);
        let inherited = direct(ot).any(|parent| roots_of(parent).len() > 1);
        if roots.len() > 1 && !inherited {
            let names: Vec<&str> = roots
                .iter()
                .map(|r| graph.object_type(*r).name.as_str())
                .collect();
            defects.push(Defect::new(
                DefectKind::InvalidSubtypeGraph,
                &graph.object_type(ot).id,
                format!(
                    "subtype graph containing '{}' has more than one root type: {}",
                    graph.object_type(ot).name,
                    names.join(", ")
                ),
            ));
        }
    }
    defects
}
