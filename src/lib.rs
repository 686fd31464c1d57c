//! Schema graph builder and consistency checker for NORMA `.orm` documents.
//!
//! The pipeline for one document:
//!
//! ```text
//! .orm XML ──► document ──► builder (+ resolver) ──► SchemaGraph
//!                                                      │
//!                                   reading ◄──────────┤
//!                                   validate ◄─────────┘──► Report
//! ```
//!
//! Every stage returns its result together with the defects it found;
//! only an unreadable document is an error.
//!
//! # Example
//!
//! ```no_run
//! use orm_check::{check_file, CheckConfig};
//!
//! let analysis = check_file("model.orm", &CheckConfig::default())?;
//! for defect in analysis.defects() {
//!     eprintln!("{}", defect);
//! }
//! # Ok::<(), orm_check::LoadError>(())
//! ```

pub mod builder;
pub mod config;
pub mod datatype;
pub mod document;
pub mod error;
pub mod model;
pub mod reading;
pub mod registry;
pub mod resolver;
pub mod validate;

pub use builder::{build, BuildOutcome};
pub use config::{CheckConfig, RoleLabel};
pub use document::OrmDocument;
pub use error::{Defect, DefectKind, LoadError};
pub use model::SchemaGraph;
pub use reading::ExpandedReading;
pub use registry::{EntityKind, Registry, RegistryError};
pub use validate::{validate, validate_with, Report};

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Everything learned about one document.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// The built graph, for downstream consumers.
    #[serde(skip)]
    pub graph: SchemaGraph,
    pub build_defects: Vec<Defect>,
    pub reading_defects: Vec<Defect>,
    pub report: Report,
    pub readings: Vec<ExpandedReading>,
    pub omissions: Vec<String>,
    pub diagram_elements: usize,
    #[serde(skip)]
    dedupe: bool,
}

impl Analysis {
    /// All defects: build, then readings, then validation.
    ///
    /// With `dedupe_defects` set, a validator defect identical to one the
    /// builder reported is not repeated. Defects from the same stage are
    /// never merged.
    pub fn defects(&self) -> Vec<Defect> {
        let built: HashSet<&Defect> = if self.dedupe {
            self.build_defects.iter().collect()
        } else {
            HashSet::new()
        };
        self.build_defects
            .iter()
            .chain(&self.reading_defects)
            .chain(self.report.iter().filter(|d| !built.contains(d)))
            .cloned()
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.build_defects.is_empty() && self.reading_defects.is_empty() && self.report.is_clean()
    }
}

/// Parse, build, expand readings and validate one document.
pub fn check_document(xml: &str, config: &CheckConfig) -> Result<Analysis, LoadError> {
    let document = OrmDocument::parse(xml, &config.namespaces)?;
    let outcome = build(&document);
    let (readings, reading_defects) = reading::assemble_all(&outcome.graph, &config.readings);
    let report = validate_with(&outcome.graph, config);

    info!(
        build_defects = outcome.defects.len(),
        reading_defects = reading_defects.len(),
        report_defects = report.len(),
        "Checked model '{}'",
        outcome.graph.name()
    );

    Ok(Analysis {
        graph: outcome.graph,
        build_defects: outcome.defects,
        reading_defects,
        report,
        readings,
        omissions: outcome.omissions,
        diagram_elements: document.diagram_elements(),
        dedupe: config.dedupe_defects,
    })
}

/// Read and check a `.orm` file.
pub fn check_file(path: impl AsRef<Path>, config: &CheckConfig) -> Result<Analysis, LoadError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    check_document(&xml, config)
}
