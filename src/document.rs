//! Document reader: turns `.orm` XML into an element tree.
//!
//! Only the semantic subtree under `<orm:ORMModel>` is kept. Diagram
//! elements are skipped without being materialized, and elements from
//! any namespace other than the core vocabulary are pruned from the model.

use crate::config::NamespaceConfig;
use crate::error::LoadError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use tracing::debug;

/// A namespace-resolved XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name (prefix stripped).
    pub name: String,
    /// Resolved namespace URI, if bound.
    pub namespace: Option<String>,
    /// Attributes by local name, in document order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated text content.
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute value, treating an empty string as absent.
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).filter(|value| !value.is_empty())
    }

    /// `true` only when the attribute is literally `"true"`.
    pub fn flag(&self, name: &str) -> bool {
        self.attr(name) == Some("true")
    }

    /// The document identifier (`id` attribute).
    pub fn id(&self) -> Option<&str> {
        self.non_empty_attr("id")
    }

    /// The reference target (`ref` attribute).
    pub fn reference(&self) -> Option<&str> {
        self.non_empty_attr("ref")
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a path of child names from this element.
    pub fn descend(&self, path: &[&str]) -> Option<&Element> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Builder-style child setter.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Builder-style text setter.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Drop every descendant whose namespace does not satisfy `keep`.
    fn retain_namespaces(&mut self, keep: &dyn Fn(Option<&str>) -> bool) -> usize {
        let before = self.children.len();
        self.children.retain(|c| keep(c.namespace.as_deref()));
        let mut pruned = before - self.children.len();
        for child in &mut self.children {
            pruned += child.retain_namespaces(keep);
        }
        pruned
    }
}

/// The semantic part of an `.orm` document.
#[derive(Debug, Clone)]
pub struct OrmDocument {
    model: Element,
    diagram_elements: usize,
    pruned_elements: usize,
}

impl OrmDocument {
    /// Parse `.orm` text and locate the `<orm:ORMModel>` element.
    pub fn parse(xml: &str, namespaces: &NamespaceConfig) -> Result<Self, LoadError> {
        let (root, diagram_elements) = read_tree(xml, namespaces)?;
        let mut model = locate_model(root, namespaces)?;

        let pruned_elements = model.retain_namespaces(&|ns| namespaces.is_core(ns));
        debug!(
            diagram_elements,
            pruned_elements, "Read ORM model '{}'", model.attr("Name").unwrap_or_default()
        );

        Ok(Self {
            model,
            diagram_elements,
            pruned_elements,
        })
    }

    /// Wrap an already-built model element (no namespace checks).
    pub fn from_model(model: Element) -> Self {
        Self {
            model,
            diagram_elements: 0,
            pruned_elements: 0,
        }
    }

    pub fn model(&self) -> &Element {
        &self.model
    }

    /// Number of diagram-namespace subtrees skipped while reading.
    pub fn diagram_elements(&self) -> usize {
        self.diagram_elements
    }

    /// Number of non-core elements removed from the model subtree.
    pub fn pruned_elements(&self) -> usize {
        self.pruned_elements
    }
}

fn locate_model(root: Element, namespaces: &NamespaceConfig) -> Result<Element, LoadError> {
    match root.name.as_str() {
        "ORM2" => {
            if !namespaces.is_root(root.namespace.as_deref()) {
                return Err(LoadError::UnsupportedNamespace {
                    element: root.name,
                    namespace: root.namespace.unwrap_or_default(),
                });
            }
            let model = root
                .children
                .into_iter()
                .find(|c| c.name == "ORMModel")
                .ok_or(LoadError::MissingModel)?;
            check_core(model, namespaces)
        }
        "ORMModel" => check_core(root, namespaces),
        _ => Err(LoadError::UnexpectedRoot { found: root.name }),
    }
}

fn check_core(model: Element, namespaces: &NamespaceConfig) -> Result<Element, LoadError> {
    if namespaces.is_core(model.namespace.as_deref()) {
        Ok(model)
    } else {
        Err(LoadError::UnsupportedNamespace {
            element: model.name,
            namespace: model.namespace.unwrap_or_default(),
        })
    }
}

/// Read the whole document into a tree, skipping diagram subtrees.
fn read_tree(xml: &str, namespaces: &NamespaceConfig) -> Result<(Element, usize), LoadError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut skipped = 0usize;

    loop {
        let next = reader
            .read_resolved_event()
            .map(|(ns, event)| (namespace_uri(&ns), event));
        let (namespace, event) = match next {
            Ok(pair) => pair,
            Err(err) => return Err(xml_error(reader.buffer_position() as u64, err)),
        };

        match event {
            Event::Start(start) => {
                if namespaces.is_diagram(namespace.as_deref()) {
                    reader
                        .read_to_end(start.name())
                        .map_err(|err| xml_error(reader.buffer_position() as u64, err))?;
                    skipped += 1;
                    continue;
                }
                let element = element_from(&start, namespace)
                    .map_err(|err| xml_error(reader.buffer_position() as u64, err))?;
                stack.push(element);
            }
            Event::Empty(start) => {
                if namespaces.is_diagram(namespace.as_deref()) {
                    skipped += 1;
                    continue;
                }
                let element = element_from(&start, namespace)
                    .map_err(|err| xml_error(reader.buffer_position() as u64, err))?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|err| xml_error(reader.buffer_position() as u64, err))?;
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(LoadError::Xml {
            position: xml.len() as u64,
            message: format!("unclosed element <{}>", open.name),
        });
    }

    root.map(|root| (root, skipped))
        .ok_or(LoadError::EmptyDocument)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn element_from(
    start: &BytesStart<'_>,
    namespace: Option<String>,
) -> Result<Element, quick_xml::Error> {
    let mut element = Element {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        namespace,
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn namespace_uri(ns: &ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

fn xml_error(position: u64, err: quick_xml::Error) -> LoadError {
    LoadError::Xml {
        position,
        message: err.to_string(),
    }
}
