//! Constraint resolver.
//!
//! Turns a constraint element into a [`Constraint`]: classifies it by tag,
//! maps each role-sequence entry from its constraint-local proxy to the
//! canonical role named by `ref`, and derives provenance from `IsImplied`
//! and the `ImpliedBy*` back-references.

use crate::builder::{describe, Diagnostics};
use crate::document::Element;
use crate::error::{Defect, DefectKind};
use crate::model::{
    Constraint, ConstraintKind, FrequencyMax, ImpliedBy, Modality, Provenance, RoleSequence,
    SchemaGraph,
};
use crate::registry::{ConstraintId, FactTypeId, Registry};
use std::collections::BTreeSet;
use tracing::debug;

/// Constraint kind for an element tag, with default kind-specific fields.
pub fn kind_for_tag(tag: &str) -> Option<ConstraintKind> {
    let kind = match tag {
        "MandatoryConstraint" => ConstraintKind::Mandatory { simple: false },
        "UniquenessConstraint" => ConstraintKind::Uniqueness {
            internal: false,
            preferred_identifier_for: None,
        },
        "FrequencyConstraint" => ConstraintKind::Frequency {
            min: 1,
            max: FrequencyMax::Unbounded,
        },
        "SubsetConstraint" => ConstraintKind::Subset,
        "EqualityConstraint" => ConstraintKind::Equality,
        "ExclusionConstraint" => ConstraintKind::Exclusion,
        "RingConstraint" => ConstraintKind::Ring { ring_type: None },
        "ValueComparisonConstraint" => ConstraintKind::ValueComparison { operator: None },
        _ => return None,
    };
    Some(kind)
}

/// `RoleSequence` elements of a constraint, single or under `RoleSequences`.
pub(crate) fn sequence_nodes(node: &Element) -> Vec<&Element> {
    let direct = node.children_named("RoleSequence");
    let nested = node
        .child("RoleSequences")
        .into_iter()
        .flat_map(|seqs| seqs.children_named("RoleSequence"));
    direct.chain(nested).collect()
}

/// Resolve the body of a constraint registered as `stub`.
pub(crate) fn resolve_constraint(
    node: &Element,
    stub: &Constraint,
    registry: &Registry,
    diag: &mut Diagnostics,
) -> Constraint {
    let id = stub.id.as_str();
    let name = node.attr("Name").unwrap_or_default().to_string();

    let kind = match &stub.kind {
        ConstraintKind::Mandatory { .. } => ConstraintKind::Mandatory {
            simple: node.flag("IsSimple"),
        },
        ConstraintKind::Uniqueness { .. } => ConstraintKind::Uniqueness {
            internal: node.flag("IsInternal"),
            preferred_identifier_for: diag.link_child(
                registry,
                id,
                "preferred identifier for",
                node.child("PreferredIdentifierFor"),
            ),
        },
        ConstraintKind::Frequency { .. } => frequency(id, node, diag),
        ConstraintKind::Ring { .. } => ConstraintKind::Ring {
            ring_type: node.non_empty_attr("Type").map(str::to_string),
        },
        ConstraintKind::ValueComparison { .. } => ConstraintKind::ValueComparison {
            operator: node.non_empty_attr("Operator").map(str::to_string),
        },
        other => other.clone(),
    };

    let scope: Vec<RoleSequence> = sequence_nodes(node)
        .into_iter()
        .map(|seq| role_sequence(id, &name, seq, registry, diag))
        .collect();
    check_sequence_count(id, &kind, &scope, diag);

    let modality = match node.attr("Modality") {
        Some("Deontic") => Modality::Deontic,
        _ => Modality::Alethic,
    };

    Constraint {
        id: id.to_string(),
        provenance: provenance(id, node, registry, diag),
        name,
        kind,
        scope,
        modality,
    }
}

fn frequency(id: &str, node: &Element, diag: &mut Diagnostics) -> ConstraintKind {
    let mut bound = |attr: &str, default: u32| match node.non_empty_attr(attr) {
        None => default,
        Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
            diag.malformed(id, format!("{} '{}' is not a non-negative integer", attr, raw));
            default
        }),
    };
    let min = bound("MinFrequency", 1);
    let max = match bound("MaxFrequency", 0) {
        0 => FrequencyMax::Unbounded,
        n => FrequencyMax::Bounded(n),
    };
    ConstraintKind::Frequency { min, max }
}

fn role_sequence(
    id: &str,
    name: &str,
    node: &Element,
    registry: &Registry,
    diag: &mut Diagnostics,
) -> RoleSequence {
    let mut sequence = RoleSequence::default();
    for entry in &node.children {
        match entry.name.as_str() {
            "Role" => {
                if entry.child("ProjectedFrom").is_some() {
                    diag.push(
                        DefectKind::MalformedRoleSequence,
                        id,
                        format!("role entry {} uses deprecated <ProjectedFrom>", describe(entry)),
                    );
                    continue;
                }
                match entry.reference() {
                    Some(raw) => sequence
                        .roles
                        .push(diag.link(registry, id, "constraint role", raw)),
                    None => diag.push(
                        DefectKind::MalformedRoleSequence,
                        id,
                        format!("role entry {} has no canonical ref", describe(entry)),
                    ),
                }
            }
            "JoinRule" | "JoinPath" => {
                sequence.join_path = true;
                let label = if name.is_empty() { id } else { name };
                diag.omit(format!("Join path for {}", label));
            }
            other => diag.push(
                DefectKind::MalformedRoleSequence,
                id,
                format!("unexpected <{}> in role sequence", other),
            ),
        }
    }
    sequence
}

fn check_sequence_count(
    id: &str,
    kind: &ConstraintKind,
    scope: &[RoleSequence],
    diag: &mut Diagnostics,
) {
    let count = scope.len();
    let problem = match kind {
        ConstraintKind::Subset if count != 2 => Some(format!(
            "subset constraint needs exactly two role sequences, found {}",
            count
        )),
        k if k.is_set_comparison() && count < 2 => Some(format!(
            "{} constraint needs at least two role sequences, found {}",
            k.label(),
            count
        )),
        k if !k.is_set_comparison() && count != 1 => Some(format!(
            "{} constraint needs one role sequence, found {}",
            k.label(),
            count
        )),
        _ if scope.iter().all(|seq| seq.roles.is_empty()) => {
            Some("constraint scope is empty".to_string())
        }
        _ => None,
    };
    if let Some(message) = problem {
        diag.push(DefectKind::MalformedRoleSequence, id, message);
    }
}

fn provenance(id: &str, node: &Element, registry: &Registry, diag: &mut Diagnostics) -> Provenance {
    let by_object = diag.link_child(
        registry,
        id,
        "implying object type",
        node.child("ImpliedByObjectType"),
    );
    let by_constraint = diag.link_child(
        registry,
        id,
        "implying constraint",
        node.child("ImpliedByConstraint"),
    );

    match (by_object, by_constraint) {
        (Some(object), _) => Provenance::Implied(ImpliedBy::ObjectType(object)),
        (None, Some(constraint)) => Provenance::Implied(ImpliedBy::Constraint(constraint)),
        (None, None) if node.flag("IsImplied") => {
            diag.push(
                DefectKind::MalformedImpliedConstraint,
                id,
                "IsImplied is set but no implying entity is referenced",
            );
            Provenance::Simple
        }
        (None, None) => Provenance::Simple,
    }
}

/// Link single-fact Mandatory, Uniqueness and Frequency constraints into
/// their fact type's internal-constraints list.
pub(crate) fn link_internal_constraints(graph: &mut SchemaGraph) {
    let mut links: Vec<(FactTypeId, ConstraintId)> = Vec::new();
    for (id, constraint) in graph.constraints() {
        let eligible = matches!(
            constraint.kind,
            ConstraintKind::Mandatory { .. }
                | ConstraintKind::Uniqueness { .. }
                | ConstraintKind::Frequency { .. }
        );
        if !eligible {
            continue;
        }
        if let Some(fact) = single_fact_type(graph, constraint) {
            links.push((fact, id));
        }
    }
    debug!(count = links.len(), "Linking internal constraints");
    for (fact, constraint) in links {
        graph.fact_types[fact.index()]
            .internal_constraints
            .push(constraint);
    }
}

/// The one fact type owning every role in scope, if all roles resolved
/// and they share a fact type.
pub fn single_fact_type(graph: &SchemaGraph, constraint: &Constraint) -> Option<FactTypeId> {
    let mut facts = BTreeSet::new();
    for sequence in &constraint.scope {
        for role in &sequence.roles {
            facts.insert(graph.role(role.target?).fact_type);
        }
    }
    match facts.len() {
        1 => facts.into_iter().next(),
        _ => None,
    }
}

/// Check that an implied constraint is justified by its implying entity.
///
/// An object-type-implied constraint must be a mandatory constraint over
/// exactly the one role that object type plays. A constraint-implied one
/// must be covered by the implying constraint's scope. Returns at most one
/// defect per constraint.
pub fn implied_defect(graph: &SchemaGraph, id: ConstraintId) -> Option<Defect> {
    let constraint = graph.constraint(id);
    let Provenance::Implied(implied_by) = &constraint.provenance else {
        return None;
    };
    let defect = |message: String| {
        Some(Defect::new(
            DefectKind::MalformedImpliedConstraint,
            constraint.id.clone(),
            message,
        ))
    };

    match implied_by {
        ImpliedBy::ObjectType(reference) => {
            let Some(object_type) = reference.target else {
                return defect(format!(
                    "implying object type '{}' does not exist",
                    reference.raw
                ));
            };
            if !matches!(constraint.kind, ConstraintKind::Mandatory { .. }) {
                return defect(format!(
                    "{} constraint cannot be implied by an object type",
                    constraint.kind.label()
                ));
            }
            let name = &graph.object_type(object_type).name;
            let played = graph.roles_played_by(object_type);
            if played.len() != 1 {
                return defect(format!(
                    "implying object type '{}' plays {} roles, expected exactly one",
                    name,
                    played.len()
                ));
            }
            let scope: Vec<_> = constraint
                .scope
                .iter()
                .flat_map(|seq| seq.roles.iter().map(|r| r.target))
                .collect();
            if scope != [Some(played[0])] {
                return defect(format!(
                    "scope must be exactly role {} played by '{}'",
                    graph.role(played[0]).id,
                    name
                ));
            }
            None
        }
        ImpliedBy::Constraint(reference) => {
            let Some(implying) = reference.target else {
                return defect(format!(
                    "implying constraint '{}' does not exist",
                    reference.raw
                ));
            };
            if implying == id {
                return defect("constraint is implied by itself".to_string());
            }
            let implying = graph.constraint(implying);
            let uncovered: Vec<&str> = constraint
                .scoped_roles()
                .filter(|role| !implying.covers(*role))
                .map(|role| graph.role(role).id.as_str())
                .collect();
            if !uncovered.is_empty() {
                return defect(format!(
                    "roles {} are outside the scope of implying constraint {}",
                    uncovered.join(", "),
                    implying.id
                ));
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_model;
    use crate::model::FrequencyMax;

    fn el(name: &str) -> Element {
        Element::new(name)
    }

    fn seq(entries: &[(&str, &str)]) -> Element {
        entries.iter().fold(el("RoleSequence"), |seq, (id, r)| {
            seq.with_child(el("Role").with_attr("id", *id).with_attr("ref", *r))
        })
    }

    fn fact(id: &str, roles: &[(&str, &str)]) -> Element {
        let fact_roles = roles.iter().fold(el("FactRoles"), |fr, (rid, player)| {
            fr.with_child(
                el("Role")
                    .with_attr("id", *rid)
                    .with_child(el("RolePlayer").with_attr("ref", *player)),
            )
        });
        el("Fact").with_attr("id", id).with_child(fact_roles)
    }

    /// Person plays _R1 only; Company plays _R2 and _S2.
    fn model_with(constraints: Element) -> Element {
        el("ORMModel")
            .with_child(
                el("Objects")
                    .with_child(el("EntityType").with_attr("id", "_Person").with_attr("Name", "Person"))
                    .with_child(el("EntityType").with_attr("id", "_Company").with_attr("Name", "Company")),
            )
            .with_child(
                el("Facts")
                    .with_child(fact("_F1", &[("_R1", "_Person"), ("_R2", "_Company")]))
                    .with_child(fact("_F2", &[("_S1", "_Person"), ("_S2", "_Company")])),
            )
            .with_child(constraints)
    }

    #[test]
    fn proxies_resolve_to_canonical_roles() {
        let outcome = build_model(&model_with(el("Constraints").with_child(
            el("UniquenessConstraint")
                .with_attr("id", "_UC")
                .with_attr("IsInternal", "true")
                .with_child(seq(&[("_P1", "_R1")])),
        )));
        assert!(outcome.defects.is_empty(), "{:?}", outcome.defects);
        let graph = &outcome.graph;
        let uc = graph.constraint_by_id("_UC").unwrap();
        assert_eq!(
            uc.scoped_roles().collect::<Vec<_>>(),
            vec![graph.registry().role("_R1").unwrap()]
        );
        assert_eq!(uc.provenance, Provenance::Simple);
        assert!(graph.registry().get("_P1").is_some());
    }

    #[test]
    fn missing_ref_is_malformed_sequence() {
        let outcome = build_model(&model_with(el("Constraints").with_child(
            el("MandatoryConstraint")
                .with_attr("id", "_MC")
                .with_child(el("RoleSequence").with_child(el("Role").with_attr("id", "_P1"))),
        )));
        let kinds: Vec<_> = outcome.defects.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DefectKind::MalformedRoleSequence));
        assert!(outcome.defects.iter().all(|d| d.entity == "_MC"));
    }

    #[test]
    fn proxy_used_as_canonical_is_kind_mismatch() {
        let outcome = build_model(&model_with(
            el("Constraints")
                .with_child(
                    el("MandatoryConstraint")
                        .with_attr("id", "_MC1")
                        .with_child(seq(&[("_P1", "_R1")])),
                )
                .with_child(
                    el("MandatoryConstraint")
                        .with_attr("id", "_MC2")
                        .with_child(seq(&[("_P2", "_P1")])),
                ),
        ));
        assert!(outcome
            .defects
            .iter()
            .any(|d| d.kind == DefectKind::KindMismatch && d.entity == "_MC2"));
    }

    #[test]
    fn implied_by_object_type_playing_one_role_is_accepted() {
        let outcome = build_model(&model_with(el("Constraints").with_child(
            el("MandatoryConstraint")
                .with_attr("id", "_IMC")
                .with_attr("IsImplied", "true")
                .with_child(seq(&[("_P1", "_R1")]))
                .with_child(el("ImpliedByObjectType").with_attr("ref", "_Person")),
        )));
        // Person plays _R1 and _S1, so this is rejected.
        assert_eq!(
            outcome
                .defects
                .iter()
                .filter(|d| d.kind == DefectKind::MalformedImpliedConstraint)
                .count(),
            1
        );

        let single = el("ORMModel")
            .with_child(el("Objects").with_child(el("EntityType").with_attr("id", "_Solo")))
            .with_child(el("Objects").with_child(el("EntityType").with_attr("id", "_Other")))
            .with_child(el("Facts").with_child(fact("_F", &[("_R1", "_Solo"), ("_R2", "_Other")])))
            .with_child(
                el("Constraints").with_child(
                    el("MandatoryConstraint")
                        .with_attr("id", "_IMC")
                        .with_attr("IsImplied", "true")
                        .with_child(seq(&[("_P1", "_R1")]))
                        .with_child(el("ImpliedByObjectType").with_attr("ref", "_Solo")),
                ),
            );
        let outcome = build_model(&single);
        assert!(outcome.defects.is_empty(), "{:?}", outcome.defects);
        let imc = outcome.graph.constraint_by_id("_IMC").unwrap();
        assert!(imc.is_implied());
    }

    #[test]
    fn implied_flag_without_back_reference() {
        let outcome = build_model(&model_with(el("Constraints").with_child(
            el("MandatoryConstraint")
                .with_attr("id", "_MC")
                .with_attr("IsImplied", "true")
                .with_child(seq(&[("_P1", "_R1")])),
        )));
        assert_eq!(outcome.defects.len(), 1);
        assert_eq!(outcome.defects[0].kind, DefectKind::MalformedImpliedConstraint);
        let mc = outcome.graph.constraint_by_id("_MC").unwrap();
        assert_eq!(mc.provenance, Provenance::Simple);
    }

    #[test]
    fn implied_by_constraint_must_be_covered() {
        let outcome = build_model(&model_with(
            el("Constraints")
                .with_child(
                    el("UniquenessConstraint")
                        .with_attr("id", "_UC")
                        .with_child(seq(&[("_P1", "_R1")])),
                )
                .with_child(
                    el("MandatoryConstraint")
                        .with_attr("id", "_MC")
                        .with_child(seq(&[("_P2", "_R1"), ("_P3", "_R2")]))
                        .with_child(el("ImpliedByConstraint").with_attr("ref", "_UC")),
                ),
        ));
        let implied: Vec<_> = outcome
            .defects
            .iter()
            .filter(|d| d.kind == DefectKind::MalformedImpliedConstraint)
            .collect();
        assert_eq!(implied.len(), 1);
        assert!(implied[0].message.contains("_R2"));
    }

    #[test]
    fn frequency_zero_max_is_unbounded() {
        let outcome = build_model(&model_with(el("Constraints").with_child(
            el("FrequencyConstraint")
                .with_attr("id", "_FC")
                .with_attr("MinFrequency", "2")
                .with_attr("MaxFrequency", "0")
                .with_child(seq(&[("_P1", "_R1")])),
        )));
        assert!(outcome.defects.is_empty(), "{:?}", outcome.defects);
        assert_eq!(
            outcome.graph.constraint_by_id("_FC").unwrap().kind,
            ConstraintKind::Frequency {
                min: 2,
                max: FrequencyMax::Unbounded
            }
        );
    }

    #[test]
    fn negative_frequency_is_malformed() {
        let outcome = build_model(&model_with(el("Constraints").with_child(
            el("FrequencyConstraint")
                .with_attr("id", "_FC")
                .with_attr("MinFrequency", "-1")
                .with_attr("MaxFrequency", "3")
                .with_child(seq(&[("_P1", "_R1")])),
        )));
        assert_eq!(outcome.defects.len(), 1);
        assert_eq!(outcome.defects[0].kind, DefectKind::MalformedElement);
    }

    #[test]
    fn set_comparison_sequences() {
        let outcome = build_model(&model_with(
            el("Constraints")
                .with_child(
                    el("SubsetConstraint").with_attr("id", "_SC").with_child(
                        el("RoleSequences")
                            .with_child(seq(&[("_P1", "_R1")]))
                            .with_child(seq(&[("_P2", "_S1")])),
                    ),
                )
                .with_child(
                    el("ExclusionConstraint")
                        .with_attr("id", "_XC")
                        .with_child(el("RoleSequences").with_child(seq(&[("_P3", "_R2")]))),
                ),
        ));
        let graph = &outcome.graph;
        assert_eq!(graph.constraint_by_id("_SC").unwrap().scope.len(), 2);
        assert_eq!(outcome.defects.len(), 1, "{:?}", outcome.defects);
        assert_eq!(outcome.defects[0].entity, "_XC");
        assert_eq!(outcome.defects[0].kind, DefectKind::MalformedRoleSequence);
    }

    #[test]
    fn join_rule_is_an_omission() {
        let outcome = build_model(&model_with(el("Constraints").with_child(
            el("UniquenessConstraint")
                .with_attr("id", "_EUC")
                .with_attr("Name", "ExternalUniquenessConstraint1")
                .with_child(seq(&[("_P1", "_R2"), ("_P2", "_S2")]).with_child(el("JoinRule"))),
        )));
        assert!(outcome.defects.is_empty(), "{:?}", outcome.defects);
        assert_eq!(
            outcome.omissions,
            vec!["Join path for ExternalUniquenessConstraint1".to_string()]
        );
        let euc = outcome.graph.constraint_by_id("_EUC").unwrap();
        assert!(euc.scope[0].join_path);
        // Spans two fact types, so it is not internal to either.
        assert!(outcome
            .graph
            .fact_types()
            .all(|(_, f)| f.internal_constraints.is_empty()));
    }

    #[test]
    fn modality_and_ring_attributes() {
        let outcome = build_model(&model_with(el("Constraints").with_child(
            el("RingConstraint")
                .with_attr("id", "_RC")
                .with_attr("Type", "Irreflexive")
                .with_attr("Modality", "Deontic")
                .with_child(seq(&[("_P1", "_R1"), ("_P2", "_R2")])),
        )));
        let rc = outcome.graph.constraint_by_id("_RC").unwrap();
        assert_eq!(rc.modality, Modality::Deontic);
        assert_eq!(
            rc.kind,
            ConstraintKind::Ring {
                ring_type: Some("Irreflexive".to_string())
            }
        );
    }
}
