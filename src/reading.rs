//! Reading assembler.
//!
//! Expands reading templates such as `"{0} has {1}"` into sentences by
//! substituting the label of the role at each position of the reading
//! order's role sequence.

use crate::config::ReadingConfig;
use crate::error::{Defect, DefectKind};
use crate::model::{FactType, Reading, ReadingOrder, SchemaGraph};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed template piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(usize),
}

/// A reading template split into literal text and `{n}` placeholders.
///
/// Braces that do not enclose a decimal index are kept as literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingTemplate {
    segments: Vec<Segment>,
}

impl ReadingTemplate {
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let placeholder = after.find('}').and_then(|close| {
                let digits = &after[..close];
                let is_index = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
                if is_index {
                    digits.parse::<usize>().ok().map(|i| (i, close))
                } else {
                    None
                }
            });
            match placeholder {
                Some((index, close)) => {
                    literal.push_str(&rest[..open]);
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(index));
                    rest = &after[close + 1..];
                }
                None => {
                    literal.push_str(&rest[..=open]);
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Highest placeholder index, if any.
    pub fn max_index(&self) -> Option<usize> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(i) => Some(*i),
                Segment::Literal(_) => None,
            })
            .max()
    }

    /// Substitute placeholders. Fails with the first index `label` cannot
    /// supply.
    pub fn render<F>(&self, mut label: F) -> Result<String, usize>
    where
        F: FnMut(usize) -> Option<String>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(index) => out.push_str(&label(*index).ok_or(*index)?),
            }
        }
        Ok(out)
    }
}

/// One expanded reading sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedReading {
    pub fact_type: String,
    pub reading: Option<String>,
    pub text: String,
}

impl fmt::Display for ExpandedReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.fact_type, self.text)
    }
}

/// Lazily expand every reading of one fact type.
pub fn expand_fact_type<'g>(
    graph: &'g SchemaGraph,
    fact: &'g FactType,
    config: &'g ReadingConfig,
) -> impl Iterator<Item = Result<ExpandedReading, Defect>> + 'g {
    fact.reading_orders.iter().flat_map(move |order| {
        order
            .readings
            .iter()
            .map(move |reading| expand_reading(graph, fact, order, reading, config))
    })
}

/// Lazily expand every reading in the graph, fact types in document order.
pub fn expand_all<'g>(
    graph: &'g SchemaGraph,
    config: &'g ReadingConfig,
) -> impl Iterator<Item = Result<ExpandedReading, Defect>> + 'g {
    graph
        .fact_types()
        .flat_map(move |(_, fact)| expand_fact_type(graph, fact, config))
}

/// Expand everything, splitting sentences from defects.
pub fn assemble_all(
    graph: &SchemaGraph,
    config: &ReadingConfig,
) -> (Vec<ExpandedReading>, Vec<Defect>) {
    let mut readings = Vec::new();
    let mut defects = Vec::new();
    for item in expand_all(graph, config) {
        match item {
            Ok(reading) => readings.push(reading),
            Err(defect) => defects.push(defect),
        }
    }
    (readings, defects)
}

fn expand_reading(
    graph: &SchemaGraph,
    fact: &FactType,
    order: &ReadingOrder,
    reading: &Reading,
    config: &ReadingConfig,
) -> Result<ExpandedReading, Defect> {
    let template = ReadingTemplate::parse(&reading.text);
    let label = |index: usize| {
        let reference = order.role_sequence.get(index)?;
        let base = match reference.target {
            Some(role) => graph.role_label(role, config.role_label),
            None => format!("R{}", index + 1),
        };
        let decoration = reading.role_text.iter().find(|t| t.role_index == index);
        Some(match decoration {
            Some(t) => format!("{}{}{}", t.pre_bound_text, base, t.following_text),
            None => base,
        })
    };

    let text = template.render(label).map_err(|index| {
        let entity = reading.id.clone().unwrap_or_else(|| fact.id.clone());
        Defect::new(
            DefectKind::PlaceholderIndexOutOfRange,
            entity,
            format!(
                "reading '{}' of fact type {} uses {{{}}} but its role sequence has {} roles",
                reading.text,
                fact.id,
                index,
                order.role_sequence.len()
            ),
        )
    })?;

    Ok(ExpandedReading {
        fact_type: fact.id.clone(),
        reading: reading.id.clone(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_model;
    use crate::config::RoleLabel;
    use crate::document::Element;
    use pretty_assertions::assert_eq;

    fn el(name: &str) -> Element {
        Element::new(name)
    }

    fn model(template: &str, role_names: [&str; 2]) -> Element {
        el("ORMModel")
            .with_child(
                el("Objects")
                    .with_child(el("EntityType").with_attr("id", "_Paper").with_attr("Name", "Paper"))
                    .with_child(el("EntityType").with_attr("id", "_Person").with_attr("Name", "Person")),
            )
            .with_child(
                el("Facts").with_child(
                    el("Fact")
                        .with_attr("id", "_F")
                        .with_child(
                            el("FactRoles")
                                .with_child(
                                    el("Role")
                                        .with_attr("id", "_R0")
                                        .with_attr("Name", role_names[0])
                                        .with_child(el("RolePlayer").with_attr("ref", "_Paper")),
                                )
                                .with_child(
                                    el("Role")
                                        .with_attr("id", "_R1")
                                        .with_attr("Name", role_names[1])
                                        .with_child(el("RolePlayer").with_attr("ref", "_Person")),
                                ),
                        )
                        .with_child(
                            el("ReadingOrders").with_child(
                                el("ReadingOrder")
                                    .with_attr("id", "_RO")
                                    .with_child(
                                        el("Readings").with_child(
                                            el("Reading")
                                                .with_attr("id", "_RD")
                                                .with_child(el("Data").with_text(template)),
                                        ),
                                    )
                                    .with_child(
                                        el("RoleSequence")
                                            .with_child(el("Role").with_attr("ref", "_R0"))
                                            .with_child(el("Role").with_attr("ref", "_R1")),
                                    ),
                            ),
                        ),
                ),
            )
    }

    #[test]
    fn expands_role_names() {
        let graph = build_model(&model("{0} has {1}", ["Paper", "Author"])).graph;
        let (readings, defects) = assemble_all(&graph, &ReadingConfig::default());
        assert!(defects.is_empty());
        assert_eq!(
            readings,
            vec![ExpandedReading {
                fact_type: "_F".to_string(),
                reading: Some("_RD".to_string()),
                text: "Paper has Author".to_string(),
            }]
        );
    }

    #[test]
    fn falls_back_to_player_names() {
        let graph = build_model(&model("{0} was written by {1}", ["", ""])).graph;
        let (readings, _) = assemble_all(&graph, &ReadingConfig::default());
        assert_eq!(readings[0].text, "Paper was written by Person");

        let graph = build_model(&model("{0} has {1}", ["Paper", "Author"])).graph;
        let config = ReadingConfig {
            role_label: RoleLabel::PlayerName,
        };
        let (readings, _) = assemble_all(&graph, &config);
        assert_eq!(readings[0].text, "Paper has Person");
    }

    #[test]
    fn out_of_range_placeholder_is_reported() {
        let graph = build_model(&model("{0} has {2}", ["Paper", "Author"])).graph;
        let items: Vec<_> = expand_all(&graph, &ReadingConfig::default()).collect();
        assert_eq!(items.len(), 1);
        let defect = items[0].clone().unwrap_err();
        assert_eq!(defect.kind, DefectKind::PlaceholderIndexOutOfRange);
        assert_eq!(defect.entity, "_RD");
        assert!(defect.message.contains("{2}"));
    }

    #[test]
    fn template_parsing() {
        let template = ReadingTemplate::parse("{1} is {0}'s {x} and {}{10}");
        assert_eq!(
            template.segments(),
            &[
                Segment::Placeholder(1),
                Segment::Literal(" is ".to_string()),
                Segment::Placeholder(0),
                Segment::Literal("'s {x} and {}".to_string()),
                Segment::Placeholder(10),
            ]
        );
        assert_eq!(template.max_index(), Some(10));
        assert_eq!(ReadingTemplate::parse("no roles").max_index(), None);
    }

    #[test]
    fn role_text_decorates_label() {
        let template = ReadingTemplate::parse("{0} has {1}");
        let rendered = template.render(|i| match i {
            0 => Some("Paper".to_string()),
            1 => Some("co-Author".to_string()),
            _ => None,
        });
        assert_eq!(rendered, Ok("Paper has co-Author".to_string()));
        assert_eq!(ReadingTemplate::parse("{3}").render(|_| None), Err(3));
    }
}
