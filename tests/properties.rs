//! Property tests for frequency bounds, reading templates and the
//! build/validate pipeline on generated models.

use orm_check::document::Element;
use orm_check::model::{ConstraintKind, FrequencyMax};
use orm_check::reading::{ReadingTemplate, Segment};
use orm_check::validate::frequency_problem;
use orm_check::{build, validate, DefectKind, OrmDocument};
use proptest::prelude::*;

fn el(name: &str) -> Element {
    Element::new(name)
}

/// A binary fact type over `_A` and `_B` with one constraint.
fn binary_with(constraint: Element) -> OrmDocument {
    let role = |id: &str, player: &str| {
        el("Role")
            .with_attr("id", id)
            .with_child(el("RolePlayer").with_attr("ref", player))
    };
    OrmDocument::from_model(
        el("ORMModel")
            .with_child(
                el("Objects")
                    .with_child(el("EntityType").with_attr("id", "_A").with_attr("Name", "A"))
                    .with_child(el("EntityType").with_attr("id", "_B").with_attr("Name", "B")),
            )
            .with_child(
                el("Facts").with_child(
                    el("Fact").with_attr("id", "_F").with_child(
                        el("FactRoles")
                            .with_child(role("_R0", "_A"))
                            .with_child(role("_R1", "_B")),
                    ),
                ),
            )
            .with_child(el("Constraints").with_child(constraint)),
    )
}

fn frequency_constraint(min: u32, max: u32) -> Element {
    el("FrequencyConstraint")
        .with_attr("id", "_FC")
        .with_attr("MinFrequency", min.to_string())
        .with_attr("MaxFrequency", max.to_string())
        .with_child(
            el("RoleSequence").with_child(el("Role").with_attr("id", "_P").with_attr("ref", "_R0")),
        )
}

fn arb_word() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

proptest! {
    #[test]
    fn frequency_problem_matches_bounds(min in 0u32..50, max in 1u32..50) {
        let bounded = frequency_problem(min, FrequencyMax::Bounded(max));
        prop_assert_eq!(bounded.is_some(), min < 1 || min > max);

        let unbounded = frequency_problem(min, FrequencyMax::Unbounded);
        prop_assert_eq!(unbounded.is_some(), min < 1);
    }

    /// Bounds read from the document come back unchanged, max 0 meaning
    /// unbounded, and the validator flags exactly the invalid pairs.
    #[test]
    fn frequency_bounds_load_and_validate(min in 0u32..20, max in 0u32..20) {
        let outcome = build(&binary_with(frequency_constraint(min, max)));
        prop_assert!(outcome.defects.is_empty(), "{:?}", outcome.defects);

        let expected_max = if max == 0 {
            FrequencyMax::Unbounded
        } else {
            FrequencyMax::Bounded(max)
        };
        let constraint = outcome.graph.constraint_by_id("_FC").unwrap();
        prop_assert_eq!(
            &constraint.kind,
            &ConstraintKind::Frequency { min, max: expected_max }
        );

        let report = validate(&outcome.graph);
        let invalid = min < 1 || (max != 0 && min > max);
        prop_assert_eq!(
            report.count_of(DefectKind::InvalidFrequencyRange),
            usize::from(invalid)
        );
        prop_assert_eq!(report.len(), usize::from(invalid));
    }

    /// Validating the same graph twice gives the same report.
    #[test]
    fn validation_is_repeatable(min in 0u32..5, max in 0u32..5) {
        let graph = build(&binary_with(frequency_constraint(min, max))).graph;
        prop_assert_eq!(validate(&graph), validate(&graph));
    }

    /// Every placeholder is replaced by its label; literal words survive.
    #[test]
    fn template_substitutes_every_placeholder(
        words in prop::collection::vec(arb_word(), 1..5),
        labels in prop::collection::vec("[A-Z][a-z]{0,6}", 1..5),
    ) {
        let template_text: String = words
            .iter()
            .enumerate()
            .map(|(i, word)| format!("{{{}}} {} ", i % labels.len(), word))
            .collect();
        let template = ReadingTemplate::parse(&template_text);
        let placeholders = template
            .segments()
            .iter()
            .filter(|s| matches!(s, Segment::Placeholder(_)))
            .count();
        prop_assert_eq!(placeholders, words.len());

        let rendered = template.render(|i| labels.get(i).cloned()).unwrap();
        let expected: String = words
            .iter()
            .enumerate()
            .map(|(i, word)| format!("{} {} ", labels[i % labels.len()], word))
            .collect();
        prop_assert_eq!(rendered, expected);
    }

    /// An index past the last label is reported, never rendered.
    #[test]
    fn template_rejects_missing_index(count in 0usize..4, extra in 0usize..3) {
        let index = count + extra;
        let template = ReadingTemplate::parse(&format!("x {{{}}} y", index));
        prop_assert_eq!(template.max_index(), Some(index));
        let labels: Vec<String> = (0..count).map(|i| format!("L{}", i)).collect();
        prop_assert_eq!(template.render(|i| labels.get(i).cloned()), Err(index));
    }

    /// Text without a `{digits}` group is one literal.
    #[test]
    fn template_keeps_braces_without_index(text in "[a-z {}]{0,20}") {
        let template = ReadingTemplate::parse(&text);
        prop_assert_eq!(template.max_index(), None);
        prop_assert_eq!(template.render(|_| None).unwrap(), text);
    }
}
