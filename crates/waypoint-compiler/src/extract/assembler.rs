//! Final pass: one [`ExtractedApiDefinition`] per (verb, route), grouped by
//! route-reduction key.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;
use waypoint_common::api::{HandlerRef, ParameterBinding};
use waypoint_common::{
    Diagnostic, DiagnosticBag, ErrorKind, ExtractedApiDefinition, HttpMethod, Primitive,
    RouteGroup, TypeDescriptor,
};

use super::route;
use super::tree::{handler_route, HandlerTreeNode, LinkedTree, NodeKind, NodePath, Requirement};
use crate::catalog::keys;

pub fn assemble(tree: &LinkedTree) -> (Vec<ExtractedApiDefinition>, Vec<RouteGroup>, DiagnosticBag) {
    let mut diagnostics = DiagnosticBag::new();

    let mut candidates = Vec::new();
    for (ci, class) in tree.roots.iter().enumerate() {
        for (mi, method) in class.methods() {
            if let Some(def) = build_definition(tree, class, method, NodePath::root(ci).child(mi)) {
                candidates.push(def);
            }
        }
    }

    // (verb, route key) → first candidate claiming it.
    let mut claimed: IndexMap<(HttpMethod, String), usize> = IndexMap::new();
    let mut excluded: HashSet<usize> = HashSet::new();
    for (i, def) in candidates.iter().enumerate() {
        let key = (def.verb, def.route_key.clone());
        match claimed.get(&key) {
            Some(&first) => {
                let original = &candidates[first];
                diagnostics.report(
                    Diagnostic::error(
                        ErrorKind::DuplicateRoute,
                        format!(
                            "{} {} is handled by both `{}` and `{}`",
                            def.verb, def.route, original.handler, def.handler
                        ),
                    )
                    .with_span(def.location.clone())
                    .with_related(
                        original.location.clone(),
                        format!("`{}` declared here", original.handler),
                    ),
                );
                excluded.insert(first);
                excluded.insert(i);
            }
            None => {
                claimed.insert(key, i);
            }
        }
    }

    let definitions: Vec<ExtractedApiDefinition> = candidates
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !excluded.contains(i))
        .map(|(_, d)| d)
        .collect();
    if !excluded.is_empty() {
        debug!(count = excluded.len(), "excluded duplicate handlers");
    }

    let routes = group_routes(&definitions);
    (definitions, routes, diagnostics)
}

fn build_definition(
    tree: &LinkedTree,
    class: &HandlerTreeNode,
    method: &HandlerTreeNode,
    path: NodePath,
) -> Option<ExtractedApiDefinition> {
    let (verb, _) = method.route()?;
    let route = handler_route(class, method);
    let return_type = method
        .descriptor
        .clone()
        .unwrap_or_else(|| TypeDescriptor::primitive(Primitive::Void));

    let parameters = method
        .children
        .iter()
        .enumerate()
        .filter(|(_, p)| p.kind == NodeKind::Parameter)
        .filter_map(|(pi, p)| binding(tree, p, &path.child(pi)))
        .collect();

    let mut providers: Vec<String> = Vec::new();
    for link in tree.links_within(&path) {
        if let Requirement::Provider(tag) = &link.requirement {
            if !providers.contains(tag) {
                providers.push(tag.clone());
            }
        }
    }

    Some(ExtractedApiDefinition {
        verb,
        route_key: route::route_key(&route),
        route,
        handler: HandlerRef {
            class: class.name.clone(),
            qualified_class: class
                .qualified_name
                .clone()
                .unwrap_or_else(|| class.name.clone()),
            method: method.name.clone(),
        },
        is_async: return_type.is_promise(),
        return_type,
        parameters,
        providers,
        status: method
            .metadata
            .get(keys::STATUS)
            .and_then(|v| v.as_u64())
            .and_then(|c| u16::try_from(c).ok()),
        description: method.description(),
        location: method.span.clone(),
    })
}

fn binding(tree: &LinkedTree, param: &HandlerTreeNode, path: &NodePath) -> Option<ParameterBinding> {
    let (kind, _) = param.binding()?;
    let descriptor = param.descriptor.clone()?;
    let depends_on = tree
        .links_from(path)
        .filter(|l| matches!(l.requirement, Requirement::Declaration(_)))
        .filter_map(|l| tree.node(&l.target))
        .map(|n| n.name.clone())
        .collect();
    Some(ParameterBinding {
        name: param.binding_name().to_string(),
        parameter: param.name.clone(),
        position: param.position,
        kind,
        descriptor,
        required: param.required,
        default: param.default.clone(),
        validator: param.metadata_str(keys::VALIDATOR).map(str::to_string),
        depends_on,
        description: param.description(),
    })
}

/// Group definitions by route key. Specific verbs come first; `ANY` is kept
/// last as the fallback.
fn group_routes(definitions: &[ExtractedApiDefinition]) -> Vec<RouteGroup> {
    let mut groups: IndexMap<String, RouteGroup> = IndexMap::new();
    for (i, def) in definitions.iter().enumerate() {
        let group = groups
            .entry(def.route_key.clone())
            .or_insert_with(|| RouteGroup {
                route_key: def.route_key.clone(),
                route: def.route.clone(),
                verbs: Vec::new(),
                definitions: Vec::new(),
            });
        group.verbs.push(def.verb);
        group.definitions.push(i);
    }
    groups
        .into_values()
        .map(|mut g| {
            let (specific, fallback): (Vec<_>, Vec<_>) = g
                .verbs
                .iter()
                .copied()
                .zip(g.definitions.iter().copied())
                .partition(|(verb, _)| *verb != HttpMethod::Any);
            let ordered: Vec<(HttpMethod, usize)> = specific.into_iter().chain(fallback).collect();
            g.verbs = ordered.iter().map(|(v, _)| *v).collect();
            g.definitions = ordered.iter().map(|(_, d)| *d).collect();
            g
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AnnotationCatalog;
    use crate::extract::tree::AppliedAnnotation;
    use crate::unit::AttributeArg;
    use waypoint_common::Span;

    fn handler(cat: &AnnotationCatalog, name: &str, verb: &str, path: &str) -> HandlerTreeNode {
        let mut m = HandlerTreeNode::new(NodeKind::Method, name, Span::at("pets.ts", 3, 5));
        m.annotations.push(AppliedAnnotation {
            name: verb.to_string(),
            definition: cat.lookup(verb).unwrap(),
            args: vec![AttributeArg::string(path)],
            span: Span::dummy(),
        });
        m.metadata.insert(keys::PATH.into(), serde_json::json!(path));
        m
    }

    fn class(name: &str, base: &str, methods: Vec<HandlerTreeNode>) -> HandlerTreeNode {
        let mut c = HandlerTreeNode::new(NodeKind::Class, name, Span::dummy());
        c.metadata.insert(keys::BASE_PATH.into(), serde_json::json!(base));
        c.children = methods;
        c
    }

    fn tree(roots: Vec<HandlerTreeNode>) -> LinkedTree {
        LinkedTree {
            roots,
            links: Vec::new(),
        }
    }

    #[test]
    fn joins_base_path() {
        let cat = AnnotationCatalog::with_builtins();
        let t = tree(vec![class("Pets", "/pets/", vec![handler(&cat, "get", "Get", "/:id")])]);
        let (defs, routes, diags) = assemble(&t);
        assert!(diags.is_empty());
        assert_eq!(defs[0].route, "/pets/{id}");
        assert_eq!(defs[0].route_key, "/pets/{}");
        assert_eq!(defs[0].handler.to_string(), "Pets.get");
        assert_eq!(routes.len(), 1);
        assert!(defs[0].return_type.is_primitive(Primitive::Void));
    }

    #[test]
    fn duplicate_routes_excluded_and_named() {
        let cat = AnnotationCatalog::with_builtins();
        let t = tree(vec![
            class("Pets", "", vec![handler(&cat, "byId", "Get", "/pets/{id}")]),
            class("Animals", "", vec![
                handler(&cat, "byName", "Get", "/pets/{name}"),
                handler(&cat, "remove", "Delete", "/pets/{name}"),
            ]),
        ]);
        let (defs, routes, diags) = assemble(&t);
        assert_eq!(diags.error_count(), 1);
        let d = &diags.diagnostics()[0];
        assert_eq!(d.kind, Some(ErrorKind::DuplicateRoute));
        assert!(d.message.contains("Pets.byId"));
        assert!(d.message.contains("Animals.byName"));
        assert_eq!(d.related.len(), 1);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].verb, HttpMethod::Delete);
        assert_eq!(routes[0].verbs, vec![HttpMethod::Delete]);
    }

    #[test]
    fn any_is_fallback() {
        let cat = AnnotationCatalog::with_builtins();
        let mut any = handler(&cat, "fallback", "Route", "/pets");
        any.annotations[0].args.insert(0, AttributeArg::string("*"));
        any.metadata.insert(keys::METHOD.into(), serde_json::json!("*"));
        let t = tree(vec![class("Pets", "", vec![
            any,
            handler(&cat, "list", "Get", "/pets"),
            handler(&cat, "create", "Post", "/pets"),
        ])]);
        let (defs, routes, diags) = assemble(&t);
        assert!(diags.is_empty());
        assert_eq!(defs.len(), 3);
        assert_eq!(routes.len(), 1);
        assert_eq!(
            routes[0].verbs,
            vec![HttpMethod::Get, HttpMethod::Post, HttpMethod::Any]
        );
        assert_eq!(routes[0].definitions, vec![1, 2, 0]);
        assert!(routes[0].has_fallback());
    }
}
