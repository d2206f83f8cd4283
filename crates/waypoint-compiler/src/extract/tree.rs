//! Handler tree: one node per annotated declaration site, plus the
//! non-owning dependency edges the linker discovers.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use waypoint_common::{AnnotationDefinition, BindingKind, DescriptorRef, HttpMethod, Span};

use super::route;
use crate::catalog::keys;
use crate::unit::AttributeArg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Class,
    Method,
    Parameter,
    Constructor,
}

/// A recognized annotation with its raw arguments.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedAnnotation {
    pub name: String,
    #[serde(skip)]
    pub definition: Arc<AnnotationDefinition>,
    pub args: Vec<AttributeArg>,
    pub span: Span,
}

impl AppliedAnnotation {
    /// Argument at `position` as a name (identifier or string literal).
    pub fn str_arg(&self, position: usize) -> Option<&str> {
        self.args.get(position).and_then(|a| a.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HandlerTreeNode {
    pub kind: NodeKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    pub span: Span,
    pub annotations: Vec<AppliedAnnotation>,
    /// Parameter type, or method return type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<DescriptorRef>,
    pub metadata: IndexMap<String, serde_json::Value>,
    /// Signature position of a parameter.
    pub position: usize,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HandlerTreeNode>,
}

impl HandlerTreeNode {
    pub fn new(kind: NodeKind, name: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            name: name.into(),
            qualified_name: None,
            span,
            annotations: Vec::new(),
            descriptor: None,
            metadata: IndexMap::new(),
            position: 0,
            required: true,
            default: None,
            doc: None,
            children: Vec::new(),
        }
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a.name == name)
    }

    /// The route annotation and the verb it exposes. A `method` metadata value
    /// overrides the definition's verb.
    pub fn route(&self) -> Option<(HttpMethod, &AppliedAnnotation)> {
        let applied = self
            .annotations
            .iter()
            .find(|a| a.definition.route_verb().is_some())?;
        let verb = self
            .metadata_str(keys::METHOD)
            .and_then(HttpMethod::parse)
            .or_else(|| applied.definition.route_verb())?;
        Some((verb, applied))
    }

    pub fn binding(&self) -> Option<(BindingKind, &AppliedAnnotation)> {
        self.annotations
            .iter()
            .find_map(|a| a.definition.binding().map(|kind| (kind, a)))
    }

    /// External name of a bound parameter: the `name` metadata when given,
    /// the declared name otherwise.
    pub fn binding_name(&self) -> &str {
        self.metadata_str(keys::NAME).unwrap_or(&self.name)
    }

    /// Provider tags this declaration contributes.
    pub fn provides(&self) -> Vec<&str> {
        let mut tags = Vec::new();
        for a in &self.annotations {
            tags.extend(a.definition.provides.iter().map(String::as_str));
            if let Some(tag) = a.definition.provides_argument.and_then(|i| a.str_arg(i)) {
                tags.push(tag);
            }
        }
        tags
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn description(&self) -> Option<String> {
        self.metadata_str(keys::DESCRIPTION)
            .map(str::to_string)
            .or_else(|| self.doc.clone())
    }

    pub fn methods(&self) -> impl Iterator<Item = (usize, &HandlerTreeNode)> {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == NodeKind::Method)
    }
}

/// Index path of a node from the forest root: `[class, method, parameter]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root(index: usize) -> Self {
        NodePath(vec![index])
    }

    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        NodePath(path)
    }

    pub fn parent(&self) -> Option<NodePath> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(NodePath(self.0[..n - 1].to_vec())),
        }
    }

    /// Prefix of this path with `depth` components.
    pub fn truncate(&self, depth: usize) -> NodePath {
        NodePath(self.0[..depth.min(self.0.len())].to_vec())
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

/// What a dependency asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "value")]
pub enum Requirement {
    Annotation(String),
    Provider(String),
    Declaration(String),
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Requirement::Annotation(name) => write!(f, "a declaration annotated @{}", name),
            Requirement::Provider(tag) => write!(f, "provider `{}`", tag),
            Requirement::Declaration(name) => write!(f, "declaration `{}`", name),
        }
    }
}

/// A resolved dependency edge. Neither end owns the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyLink {
    pub source: NodePath,
    pub target: NodePath,
    /// Annotation that declared the dependency.
    pub annotation: String,
    pub requirement: Requirement,
}

/// Output of the linker: the surviving forest and its dependency edges.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkedTree {
    pub roots: Vec<HandlerTreeNode>,
    pub links: Vec<DependencyLink>,
}

impl LinkedTree {
    pub fn node(&self, path: &NodePath) -> Option<&HandlerTreeNode> {
        find_node(&self.roots, path)
    }

    pub fn links_from<'a>(&'a self, path: &'a NodePath) -> impl Iterator<Item = &'a DependencyLink> + 'a {
        self.links.iter().filter(move |l| &l.source == path)
    }

    /// Links declared on `path` or anywhere beneath it.
    pub fn links_within<'a>(&'a self, path: &'a NodePath) -> impl Iterator<Item = &'a DependencyLink> + 'a {
        self.links.iter().filter(move |l| l.source.starts_with(path))
    }
}

pub(crate) fn find_node<'a>(roots: &'a [HandlerTreeNode], path: &NodePath) -> Option<&'a HandlerTreeNode> {
    let (first, rest) = path.indices().split_first()?;
    let mut node = roots.get(*first)?;
    for i in rest {
        node = node.children.get(*i)?;
    }
    Some(node)
}

/// Full route of a method under its class: `basePath` joined with `path`.
pub fn handler_route(class: &HandlerTreeNode, method: &HandlerTreeNode) -> String {
    route::join(
        class.metadata_str(keys::BASE_PATH).unwrap_or(""),
        method.metadata_str(keys::PATH).unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_path_navigation() {
        let p = NodePath::root(2).child(0).child(3);
        assert_eq!(p.to_string(), "/2/0/3");
        assert_eq!(p.parent(), Some(NodePath::root(2).child(0)));
        assert_eq!(p.truncate(1), NodePath::root(2));
        assert!(p.starts_with(&NodePath::root(2)));
        assert!(!p.starts_with(&NodePath::root(1)));
        assert_eq!(NodePath::root(0).parent(), None);
    }

    #[test]
    fn lookup_by_path() {
        let mut class = HandlerTreeNode::new(NodeKind::Class, "Pets", Span::dummy());
        let mut method = HandlerTreeNode::new(NodeKind::Method, "list", Span::dummy());
        method
            .children
            .push(HandlerTreeNode::new(NodeKind::Parameter, "page", Span::dummy()));
        class.children.push(method);
        let tree = LinkedTree {
            roots: vec![class],
            links: Vec::new(),
        };
        let path = NodePath::root(0).child(0).child(0);
        assert_eq!(tree.node(&path).unwrap().name, "page");
        assert!(tree.node(&NodePath::root(0).child(4)).is_none());
    }
}
