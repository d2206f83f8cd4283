//! Second pass: resolve annotation dependencies across the forest and check
//! path bindings against their routes.
//!
//! A failed dependency removes the enclosing method, or the whole class when
//! the failure sits on the class or its constructor. Removal can strand other
//! dependencies, so linking repeats until a pass removes nothing.

use tracing::{debug, warn};
use waypoint_common::annotation::{DependencyScope, DependencyTarget};
use waypoint_common::{BindingKind, Diagnostic, DiagnosticBag, ErrorKind};

use super::route;
use super::tree::{
    find_node, handler_route, DependencyLink, HandlerTreeNode, LinkedTree, NodeKind, NodePath,
    Requirement,
};

pub fn link(mut roots: Vec<HandlerTreeNode>) -> (LinkedTree, DiagnosticBag) {
    let mut diagnostics = DiagnosticBag::new();
    loop {
        let pass = LinkPass::run(&roots);
        if pass.failures.is_empty() {
            report_unused_tokens(&roots, &mut diagnostics);
            return (
                LinkedTree {
                    roots,
                    links: pass.links,
                },
                diagnostics,
            );
        }
        let mut removals = Vec::with_capacity(pass.failures.len());
        for (path, diagnostic) in pass.failures {
            diagnostics.report(diagnostic);
            removals.push(path);
        }
        prune(&mut roots, removals);
    }
}

#[derive(Default)]
struct LinkPass {
    links: Vec<DependencyLink>,
    /// Node to remove, with the reason.
    failures: Vec<(NodePath, Diagnostic)>,
}

impl LinkPass {
    fn run(roots: &[HandlerTreeNode]) -> Self {
        let mut pass = LinkPass::default();
        let mut nodes = Vec::new();
        for (i, root) in roots.iter().enumerate() {
            collect(root, NodePath::root(i), &mut nodes);
        }
        for (path, node) in &nodes {
            pass.link_node(roots, path, node);
        }
        for (ci, class) in roots.iter().enumerate() {
            for (mi, method) in class.methods() {
                pass.check_path_bindings(class, method, NodePath::root(ci).child(mi));
            }
        }
        pass
    }

    fn link_node(&mut self, roots: &[HandlerTreeNode], path: &NodePath, node: &HandlerTreeNode) {
        for applied in &node.annotations {
            for dep in &applied.definition.dependencies {
                let requirement = match &dep.target {
                    DependencyTarget::Annotation(name) => Requirement::Annotation(name.clone()),
                    DependencyTarget::Provider(tag) => Requirement::Provider(tag.clone()),
                    DependencyTarget::ProviderArgument(i) => match applied.str_arg(*i) {
                        Some(tag) => Requirement::Provider(tag.to_string()),
                        None => continue,
                    },
                    DependencyTarget::DeclarationArgument(i) => match applied.str_arg(*i) {
                        Some(name) => Requirement::Declaration(name.to_string()),
                        None => continue,
                    },
                };

                let found = candidates(roots, path, dep.scope)
                    .into_iter()
                    .find(|p| find_node(roots, p).is_some_and(|n| satisfies(n, &requirement)));

                match found {
                    Some(target) => self.links.push(DependencyLink {
                        source: path.clone(),
                        target,
                        annotation: applied.name.clone(),
                        requirement,
                    }),
                    None => {
                        let place = match dep.scope {
                            DependencyScope::Enclosing => "in an enclosing declaration",
                            DependencyScope::Peer => "among its peers",
                        };
                        let owner = describe(roots, path);
                        debug!(owner = %owner, requirement = %requirement, "unresolved dependency");
                        let diagnostic = Diagnostic::error(
                            ErrorKind::DependencyResolution,
                            format!(
                                "@{} on `{}` requires {} {}, but none was found",
                                applied.name, owner, requirement, place
                            ),
                        )
                        .with_span(applied.span.clone());
                        self.failures.push((removal_scope(roots, path), diagnostic));
                    }
                }
            }
        }
    }

    fn check_path_bindings(&mut self, class: &HandlerTreeNode, method: &HandlerTreeNode, path: NodePath) {
        let route = handler_route(class, method);
        let tokens = route::tokens(&route);
        for param in &method.children {
            let Some((BindingKind::Path, applied)) = param.binding() else {
                continue;
            };
            let name = param.binding_name();
            if tokens.iter().any(|t| t == name) {
                continue;
            }
            let diagnostic = Diagnostic::error(
                ErrorKind::DependencyResolution,
                format!(
                    "path parameter `{}` of `{}.{}` does not appear in route `{}`",
                    name, class.name, method.name, route
                ),
            )
            .with_span(applied.span.clone())
            .with_suggestion(format!("add `{{{}}}` to the route", name));
            self.failures.push((path.clone(), diagnostic));
        }
    }
}

fn collect<'a>(node: &'a HandlerTreeNode, path: NodePath, out: &mut Vec<(NodePath, &'a HandlerTreeNode)>) {
    for (i, child) in node.children.iter().enumerate() {
        collect(child, path.child(i), out);
    }
    out.push((path, node));
}

/// Paths searched for a dependency of `path`, nearest first.
fn candidates(roots: &[HandlerTreeNode], path: &NodePath, scope: DependencyScope) -> Vec<NodePath> {
    match scope {
        DependencyScope::Enclosing => (1..path.depth()).rev().map(|d| path.truncate(d)).collect(),
        DependencyScope::Peer => {
            let Some(&own) = path.indices().last() else {
                return Vec::new();
            };
            match path.parent() {
                Some(parent) => {
                    let count = find_node(roots, &parent).map_or(0, |p| p.children.len());
                    (0..count)
                        .filter(|i| *i != own)
                        .map(|i| parent.child(i))
                        .collect()
                }
                None => (0..roots.len())
                    .filter(|i| *i != own)
                    .map(NodePath::root)
                    .collect(),
            }
        }
    }
}

fn satisfies(node: &HandlerTreeNode, requirement: &Requirement) -> bool {
    match requirement {
        Requirement::Annotation(name) => node.has_annotation(name),
        Requirement::Provider(tag) => node.provides().contains(&tag.as_str()),
        Requirement::Declaration(name) => node.name == *name || node.binding_name() == name,
    }
}

/// The method containing `path`, or its class for class and constructor
/// level declarations.
fn removal_scope(roots: &[HandlerTreeNode], path: &NodePath) -> NodePath {
    if path.depth() >= 2 {
        let method = path.truncate(2);
        if find_node(roots, &method).is_some_and(|n| n.kind == NodeKind::Method) {
            return method;
        }
    }
    path.truncate(1)
}

fn describe(roots: &[HandlerTreeNode], path: &NodePath) -> String {
    let names: Vec<&str> = (1..=path.depth())
        .filter_map(|d| find_node(roots, &path.truncate(d)))
        .map(|n| n.name.as_str())
        .collect();
    match names.as_slice() {
        [class] => class.to_string(),
        [class, member] => format!("{}.{}", class, member),
        [class, member, param, ..] => format!("{}.{}({})", class, member, param),
        [] => path.to_string(),
    }
}

/// Remove failed methods and classes, then classes left without methods.
fn prune(roots: &mut Vec<HandlerTreeNode>, mut paths: Vec<NodePath>) {
    paths.sort();
    paths.dedup();
    let outermost: Vec<NodePath> = paths
        .iter()
        .filter(|p| !paths.iter().any(|q| q != *p && p.starts_with(q)))
        .cloned()
        .collect();
    for path in outermost.iter().rev() {
        match path.indices() {
            [class] if *class < roots.len() => {
                roots.remove(*class);
            }
            [class, member] => {
                if let Some(c) = roots.get_mut(*class) {
                    if *member < c.children.len() {
                        c.children.remove(*member);
                    }
                }
            }
            _ => {}
        }
    }
    roots.retain(|c| c.methods().next().is_some());
}

fn report_unused_tokens(roots: &[HandlerTreeNode], diagnostics: &mut DiagnosticBag) {
    for class in roots {
        for (_, method) in class.methods() {
            let route = handler_route(class, method);
            let bound: Vec<&str> = method
                .children
                .iter()
                .filter(|p| matches!(p.binding(), Some((BindingKind::Path, _))))
                .map(|p| p.binding_name())
                .collect();
            for token in route::tokens(&route) {
                if !bound.contains(&token.as_str()) {
                    warn!(route = %route, token = %token, "unbound path token");
                    diagnostics.warning(
                        format!(
                            "route `{}` of `{}.{}` has no parameter bound to `{{{}}}`",
                            route, class.name, method.name, token
                        ),
                        method.span.clone(),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AnnotationCatalog;
    use crate::extract::tree::AppliedAnnotation;
    use crate::unit::AttributeArg;
    use waypoint_common::Span;

    fn applied(catalog: &AnnotationCatalog, name: &str, args: Vec<AttributeArg>) -> AppliedAnnotation {
        AppliedAnnotation {
            name: name.to_string(),
            definition: catalog.lookup(name).unwrap(),
            args,
            span: Span::dummy(),
        }
    }

    fn method(catalog: &AnnotationCatalog, name: &str, path: &str, params: Vec<HandlerTreeNode>) -> HandlerTreeNode {
        let mut m = HandlerTreeNode::new(NodeKind::Method, name, Span::dummy());
        m.annotations
            .push(applied(catalog, "Get", vec![AttributeArg::string(path)]));
        m.metadata.insert("path".into(), serde_json::json!(path));
        m.children = params;
        m
    }

    fn param(name: &str, annotations: Vec<AppliedAnnotation>) -> HandlerTreeNode {
        let mut p = HandlerTreeNode::new(NodeKind::Parameter, name, Span::dummy());
        let external = annotations
            .iter()
            .find(|a| a.definition.binding().is_some())
            .and_then(|a| a.str_arg(0))
            .map(str::to_string);
        if let Some(n) = external {
            p.metadata.insert("name".into(), serde_json::json!(n));
        }
        p.annotations = annotations;
        p
    }

    fn class(name: &str, children: Vec<HandlerTreeNode>) -> HandlerTreeNode {
        let mut c = HandlerTreeNode::new(NodeKind::Class, name, Span::dummy());
        c.children = children;
        c
    }

    #[test]
    fn peer_dependency_links_to_sibling() {
        let cat = AnnotationCatalog::with_builtins();
        let page = param("page", vec![applied(&cat, "Query", vec![])]);
        let size = param(
            "size",
            vec![
                applied(&cat, "Query", vec![]),
                applied(&cat, "DependsOn", vec![AttributeArg::string("page")]),
            ],
        );
        let roots = vec![class("Pets", vec![method(&cat, "list", "/pets", vec![page, size])])];
        let (tree, diags) = link(roots);
        assert!(diags.is_empty(), "{:?}", diags.diagnostics());
        assert_eq!(tree.links.len(), 1);
        let link = &tree.links[0];
        assert_eq!(link.source, NodePath::root(0).child(0).child(1));
        assert_eq!(link.target, NodePath::root(0).child(0).child(0));
        assert_eq!(link.requirement, Requirement::Declaration("page".into()));
    }

    #[test]
    fn missing_provider_removes_method_only() {
        let cat = AnnotationCatalog::with_builtins();
        let mut uses = method(&cat, "list", "/pets", vec![]);
        uses.annotations
            .push(applied(&cat, "Uses", vec![AttributeArg::string("db")]));
        let plain = method(&cat, "ping", "/ping", vec![]);
        let (tree, diags) = link(vec![class("Pets", vec![uses, plain])]);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.diagnostics()[0].kind, Some(ErrorKind::DependencyResolution));
        assert!(diags.diagnostics()[0].message.contains("provider `db`"));
        assert_eq!(tree.roots.len(), 1);
        let names: Vec<&str> = tree.roots[0].children.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["ping"]);
    }

    #[test]
    fn enclosing_provider_resolves() {
        let cat = AnnotationCatalog::with_builtins();
        let mut uses = method(&cat, "list", "/pets", vec![]);
        uses.annotations
            .push(applied(&cat, "Uses", vec![AttributeArg::string("db")]));
        let mut c = class("Pets", vec![uses]);
        c.annotations
            .push(applied(&cat, "Provide", vec![AttributeArg::identifier("db")]));
        let (tree, diags) = link(vec![c]);
        assert!(diags.is_empty());
        assert_eq!(tree.links[0].target, NodePath::root(0));
        assert_eq!(tree.links[0].requirement, Requirement::Provider("db".into()));
    }

    #[test]
    fn constructor_failure_removes_class() {
        let cat = AnnotationCatalog::with_builtins();
        let mut ctor = HandlerTreeNode::new(NodeKind::Constructor, "constructor", Span::dummy());
        ctor.children.push(param(
            "repo",
            vec![applied(&cat, "Inject", vec![AttributeArg::identifier("Repo")])],
        ));
        let c = class("Pets", vec![ctor, method(&cat, "list", "/pets", vec![])]);
        let other = class("Health", vec![method(&cat, "ping", "/ping", vec![])]);
        let (tree, diags) = link(vec![c, other]);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.roots[0].name, "Health");
    }

    #[test]
    fn path_binding_must_match_route_token() {
        let cat = AnnotationCatalog::with_builtins();
        let id = param("id", vec![applied(&cat, "Path", vec![])]);
        let (tree, diags) = link(vec![class("Pets", vec![method(&cat, "get", "/pets", vec![id])])]);
        assert_eq!(diags.error_count(), 1);
        assert!(diags.diagnostics()[0].message.contains("does not appear in route `/pets`"));
        assert!(tree.roots.is_empty());
    }

    #[test]
    fn unbound_route_token_warns() {
        let cat = AnnotationCatalog::with_builtins();
        let (tree, diags) = link(vec![class("Pets", vec![method(&cat, "get", "/pets/{id}", vec![])])]);
        assert!(!diags.has_errors());
        assert_eq!(diags.len(), 1);
        assert_eq!(tree.roots.len(), 1);
        assert!(diags.diagnostics()[0].message.contains("`{id}`"));
    }
}
