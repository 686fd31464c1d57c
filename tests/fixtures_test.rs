//! End-to-end checks of whole `.orm` documents.
//!
//! The clean fixtures are NORMA models that must produce no defects from
//! any stage. Each defect fixture carries exactly one problem.

use std::io::Write;
use std::path::PathBuf;

use orm_check::model::{ConstraintKind, FactTypeKind, FrequencyMax, RoleKind};
use orm_check::{check_document, check_file, validate, Analysis, CheckConfig, DefectKind, LoadError};
use pretty_assertions::assert_eq;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load(name: &str) -> Analysis {
    check_file(fixture_dir().join(name), &CheckConfig::default())
        .unwrap_or_else(|err| panic!("failed to load {}: {}", name, err))
}

fn texts(analysis: &Analysis) -> Vec<&str> {
    analysis.readings.iter().map(|r| r.text.as_str()).collect()
}

#[test]
fn test_clean_fixtures_have_no_defects() {
    for name in ["paper_has_author.orm", "employee_dependents.orm"] {
        let analysis = load(name);
        assert!(
            analysis.is_clean(),
            "{} should be clean, got:\n{:#?}",
            name,
            analysis.defects()
        );
        assert!(analysis.omissions.is_empty(), "{}: {:?}", name, analysis.omissions);
        assert_eq!(analysis.diagram_elements, 1, "{}", name);
    }
}

#[test]
fn test_paper_has_author_readings() {
    let analysis = load("paper_has_author.orm");
    assert_eq!(
        texts(&analysis),
        vec![
            "Paper has Paper_id",
            "Paper_id is of Paper",
            "Author has Author_name",
            "Paper has Author",
            "Author wrote Paper",
        ]
    );
}

#[test]
fn test_paper_has_author_graph_shape() {
    let analysis = load("paper_has_author.orm");
    let graph = &analysis.graph;

    assert_eq!(graph.name(), "PaperHasAuthor");
    assert_eq!(graph.object_types().count(), 4);
    assert_eq!(graph.fact_types().count(), 3);
    assert_eq!(graph.roles().count(), 6);
    assert_eq!(graph.constraints().count(), 10);
    assert_eq!(graph.data_types().count(), 2);
    assert_eq!(graph.reference_mode_kinds().len(), 3);

    let paper = graph
        .object_type_by_id("_E1A0B3C2-6A44-4F2E-8E41-0C9D1B2A3F10")
        .unwrap();
    assert_eq!(paper.name, "Paper");
    assert_eq!(paper.reference_mode.as_deref(), Some("id"));
    assert_eq!(paper.played_roles.len(), 2);
    assert!(paper.preferred_identifier.as_ref().unwrap().target.is_some());

    let author_name = graph
        .object_type_by_id("_V1A0B3C2-6A44-4F2E-8E41-0C9D1B2A3F23")
        .unwrap();
    assert_eq!(author_name.data_type().unwrap().length, Some(50));

    let implied = graph
        .constraint_by_id("_M1A0B3C2-6A44-4F2E-8E41-0C9D1B2A3F1D")
        .unwrap();
    assert!(implied.is_implied());
}

#[test]
fn test_every_constraint_role_is_owned_by_a_fact_type() {
    for name in ["paper_has_author.orm", "employee_dependents.orm"] {
        let analysis = load(name);
        let graph = &analysis.graph;
        for (_, constraint) in graph.constraints() {
            assert!(!constraint.scope.is_empty(), "{} has no scope", constraint.id);
            for reference in constraint.scope.iter().flat_map(|seq| seq.roles.iter()) {
                let role = reference
                    .target
                    .unwrap_or_else(|| panic!("{} -> {} unresolved", constraint.id, reference.raw));
                let owner = graph.fact_type(graph.role(role).fact_type);
                assert!(
                    owner.roles.contains(&role),
                    "{}: role {} not listed by {}",
                    name,
                    reference.raw,
                    owner.id
                );
            }
        }
    }
}

#[test]
fn test_frequency_bounds_survive_loading() {
    let analysis = load("employee_dependents.orm");
    let graph = &analysis.graph;

    let frequency = graph
        .constraint_by_id("_5B7E0A10-2C3D-4E5F-8A9B-0C1D2E3F4C13")
        .unwrap();
    assert_eq!(
        frequency.kind,
        ConstraintKind::Frequency {
            min: 2,
            max: FrequencyMax::Bounded(3)
        }
    );

    let fact = graph
        .fact_type_by_id("_5B7E0A10-2C3D-4E5F-8A9B-0C1D2E3F4E02")
        .unwrap();
    let internal: Vec<&str> = fact
        .internal_constraints
        .iter()
        .map(|c| graph.constraint(*c).id.as_str())
        .collect();
    assert!(internal.contains(&"_5B7E0A10-2C3D-4E5F-8A9B-0C1D2E3F4C13"));
}

#[test]
fn test_employee_dependents_subtype_and_external_uniqueness() {
    let analysis = load("employee_dependents.orm");
    let graph = &analysis.graph;

    let subtype = graph
        .fact_type_by_id("_5B7E0A10-2C3D-4E5F-8A9B-0C1D2E3F4E04")
        .unwrap();
    assert_eq!(
        subtype.kind,
        FactTypeKind::Subtype {
            preferred_identification_path: true
        }
    );
    let kinds: Vec<RoleKind> = subtype.roles.iter().map(|r| graph.role(*r).kind).collect();
    assert_eq!(kinds, vec![RoleKind::SubtypeMeta, RoleKind::SupertypeMeta]);

    // Spans two fact types, so it is not internal to either.
    let external = graph
        .registry()
        .constraint("_5B7E0A10-2C3D-4E5F-8A9B-0C1D2E3F4C40")
        .unwrap();
    assert!(graph
        .fact_types()
        .all(|(_, fact)| !fact.internal_constraints.contains(&external)));

    let employee_nr = graph
        .object_type_by_id("_5B7E0A10-2C3D-4E5F-8A9B-0C1D2E3F4A02")
        .unwrap();
    let restriction = employee_nr.value_restriction().unwrap();
    assert_eq!(restriction.ranges.len(), 1);
    assert_eq!(restriction.ranges[0].max.as_deref(), Some("99999"));

    assert_eq!(
        texts(&analysis),
        vec![
            "Employee has Employee_nr",
            "Employee has Dependent",
            "Dependent depends on Employee",
            "Dependent has DependentName",
        ]
    );
}

#[test]
fn test_missing_mandatory_is_reported_once() {
    let analysis = load("missing_mandatory.orm");
    assert!(analysis.build_defects.is_empty(), "{:?}", analysis.build_defects);
    assert_eq!(analysis.report.len(), 1);

    let defect = &analysis.report.defects()[0];
    assert_eq!(defect.kind, DefectKind::MissingMandatoryConstraint);
    assert_eq!(defect.entity, "_PersonDrivesCar_Person");
    assert!(defect.message.contains("driver"), "{}", defect.message);
}

#[test]
fn test_inverted_frequency_is_reported_once() {
    let analysis = load("bad_frequency.orm");
    assert!(analysis.build_defects.is_empty(), "{:?}", analysis.build_defects);
    assert_eq!(analysis.report.len(), 1);
    assert_eq!(analysis.report.count_of(DefectKind::InvalidFrequencyRange), 1);
    assert_eq!(analysis.report.defects()[0].entity, "_PersonDrivesCar_FC");
}

#[test]
fn test_implied_by_object_type_with_two_roles() {
    let analysis = load("implied_two_roles.orm");
    assert_eq!(analysis.report.len(), 1);
    assert_eq!(
        analysis.report.count_of(DefectKind::MalformedImpliedConstraint),
        1
    );
    assert_eq!(analysis.report.defects()[0].entity, "_Person_IMC");

    // The builder notices the same problem; the merged list keeps one.
    let merged = analysis.defects();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].kind, DefectKind::MalformedImpliedConstraint);
}

#[test]
fn test_inverted_role_value_range_is_reported_once() {
    let analysis = load("inverted_value_range.orm");
    assert!(analysis.build_defects.is_empty(), "{:?}", analysis.build_defects);
    assert_eq!(analysis.report.len(), 1, "{}", analysis.report);

    // The Employee role's 9..10000 range is numeric through Employee_nr.
    let defect = &analysis.report.defects()[0];
    assert_eq!(defect.kind, DefectKind::InvalidValueRangeBracket);
    assert_eq!(defect.entity, "_EmployeeHasAge_Age_RVC");
    assert_eq!(defect.message, "min value 65 exceeds max value 18");

    let employee_role = analysis
        .graph
        .role_by_id("_EmployeeHasAge_Employee")
        .unwrap();
    let range = &employee_role.value_restriction.as_ref().unwrap().ranges[0];
    assert_eq!(range.min.as_deref(), Some("9"));
    assert_eq!(range.max.as_deref(), Some("10000"));
}

#[test]
fn test_employee_subtype_graph_has_one_root() {
    let analysis = load("employee_dependents.orm");
    let graph = &analysis.graph;
    let edges = graph.subtype_edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(graph.object_type(edges[0].subtype).name, "Manager");
    assert_eq!(graph.object_type(edges[0].supertype).name, "Employee");
    assert_eq!(analysis.report.count_of(DefectKind::InvalidSubtypeGraph), 0);
}

#[test]
fn test_validation_is_idempotent() {
    for name in [
        "paper_has_author.orm",
        "employee_dependents.orm",
        "missing_mandatory.orm",
        "bad_frequency.orm",
        "implied_two_roles.orm",
        "inverted_value_range.orm",
    ] {
        let analysis = load(name);
        let first = serde_json::to_string(&validate(&analysis.graph)).unwrap();
        let second = serde_json::to_string(&validate(&analysis.graph)).unwrap();
        assert_eq!(first, second, "{}", name);
        assert_eq!(
            first,
            serde_json::to_string(&analysis.report).unwrap(),
            "{}",
            name
        );
    }
}

#[test]
fn test_parallel_checks_match_sequential() {
    let parallel = CheckConfig {
        parallel_checks: true,
        ..CheckConfig::default()
    };
    for name in ["employee_dependents.orm", "missing_mandatory.orm"] {
        let sequential = load(name);
        let concurrent = check_file(fixture_dir().join(name), &parallel).unwrap();
        assert_eq!(sequential.report, concurrent.report, "{}", name);
    }
}

#[test]
fn test_yaml_config_changes_reading_labels() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "readings:").unwrap();
    writeln!(file, "  role_label: PlayerName").unwrap();
    let config = CheckConfig::from_yaml_file(file.path()).unwrap();

    let path = fixture_dir().join("missing_mandatory.orm");
    let by_role = check_file(&path, &CheckConfig::default()).unwrap();
    let by_player = check_file(&path, &config).unwrap();

    assert_eq!(texts(&by_role), vec!["driver drives Car"]);
    assert_eq!(texts(&by_player), vec!["Person drives Car"]);
}

#[test]
fn test_unreadable_documents_are_load_errors() {
    let config = CheckConfig::default();

    assert!(matches!(
        check_document("<Schema />", &config),
        Err(LoadError::UnexpectedRoot { .. })
    ));
    assert!(matches!(
        check_document("", &config),
        Err(LoadError::EmptyDocument)
    ));
    assert!(matches!(
        check_document("<ormRoot:ORM2 xmlns:ormRoot=\"http://schemas.neumont.edu/ORM/2006-04/ORMRoot\">", &config),
        Err(LoadError::Xml { .. })
    ));
    assert!(matches!(
        check_document(
            "<ormRoot:ORM2 xmlns:ormRoot=\"http://schemas.neumont.edu/ORM/2006-04/ORMRoot\"></ormRoot:ORM2>",
            &config
        ),
        Err(LoadError::MissingModel)
    ));
}
