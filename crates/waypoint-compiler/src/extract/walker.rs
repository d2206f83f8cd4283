//! First pass: classes → route methods → parameters, producing handler tree
//! nodes with resolved types and extracted metadata.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, trace};
use waypoint_common::annotation::{permits, TypeResolution};
use waypoint_common::{AnnotationTarget, BindingKind, Diagnostic, DiagnosticBag, ErrorKind};

use super::tree::{AppliedAnnotation, HandlerTreeNode, NodeKind};
use super::InternalError;
use crate::catalog::AnnotationCatalog;
use crate::resolver::{ResolutionContext, ResolveError, TypeResolver};
use crate::unit::{Attribute, ClassDecl, DeclSite, MethodDecl, ParamDecl, TypeInference, TypeRef};

pub struct Walker<'a, 'u> {
    catalog: &'a AnnotationCatalog,
    types: &'u dyn TypeInference,
    resolver: &'a mut TypeResolver<'u>,
    diagnostics: DiagnosticBag,
}

impl<'a, 'u> Walker<'a, 'u> {
    pub fn new(
        catalog: &'a AnnotationCatalog,
        types: &'u dyn TypeInference,
        resolver: &'a mut TypeResolver<'u>,
    ) -> Self {
        Self {
            catalog,
            types,
            resolver,
            diagnostics: DiagnosticBag::new(),
        }
    }

    /// Walk every class. Classes without surviving route methods produce no
    /// node; recoverable problems end up in the returned diagnostics.
    pub fn walk(
        mut self,
        classes: &[ClassDecl],
    ) -> Result<(Vec<HandlerTreeNode>, DiagnosticBag), InternalError> {
        let mut roots = Vec::new();
        for class in classes {
            if let Some(node) = self.walk_class(class)? {
                roots.push(node);
            }
        }
        Ok((roots, self.diagnostics))
    }

    fn walk_class(&mut self, class: &ClassDecl) -> Result<Option<HandlerTreeNode>, InternalError> {
        let routed: Vec<&MethodDecl> = class
            .methods
            .iter()
            .filter(|m| self.has_route(m))
            .collect();
        if routed.is_empty() {
            trace!(class = %class.name, "no route methods");
            return Ok(None);
        }

        let mut node = HandlerTreeNode::new(NodeKind::Class, &class.name, class.span.clone());
        node.qualified_name = Some(class.qualified_name.clone());
        let Some(annotations) = self.apply(&class.annotations, AnnotationTarget::Class) else {
            debug!(class = %class.name, "dropping class with invalid annotations");
            return Ok(None);
        };
        node.metadata = collect_metadata(&annotations);
        node.annotations = annotations;

        if let Some(ctor) = &class.constructor {
            let mut ctor_node = HandlerTreeNode::new(NodeKind::Constructor, "constructor", ctor.span.clone());
            let mut failed = false;
            for (position, param) in ctor.params.iter().enumerate() {
                if param.annotations.is_empty() {
                    continue;
                }
                let owner = format!("{}.constructor", class.name);
                match self.walk_param(&owner, position, param, AnnotationTarget::Constructor)? {
                    Some(p) => ctor_node.children.push(p),
                    None => failed = true,
                }
            }
            if failed {
                debug!(class = %class.name, "dropping class with invalid constructor parameters");
                return Ok(None);
            }
            if !ctor_node.children.is_empty() {
                node.children.push(ctor_node);
            }
        }

        for method in routed {
            if let Some(m) = self.walk_method(class, method)? {
                node.children.push(m);
            }
        }
        if node.methods().next().is_none() {
            debug!(class = %class.name, "no method survived");
            return Ok(None);
        }
        Ok(Some(node))
    }

    fn has_route(&self, method: &MethodDecl) -> bool {
        method.annotations.iter().any(|a| {
            self.catalog
                .lookup(&a.name)
                .is_some_and(|d| d.route_verb().is_some())
        })
    }

    fn walk_method(
        &mut self,
        class: &ClassDecl,
        method: &MethodDecl,
    ) -> Result<Option<HandlerTreeNode>, InternalError> {
        let handler = format!("{}.{}", class.name, method.name);
        let mut failed = false;

        let annotations = match self.apply(&method.annotations, AnnotationTarget::Method) {
            Some(a) => a,
            None => {
                failed = true;
                Vec::new()
            }
        };
        let routes: Vec<&AppliedAnnotation> = annotations
            .iter()
            .filter(|a| a.definition.route_verb().is_some())
            .collect();
        if routes.len() > 1 {
            let names: Vec<String> = routes.iter().map(|a| format!("@{}", a.name)).collect();
            self.diagnostics.report(
                Diagnostic::error(
                    ErrorKind::ConflictingBinding,
                    format!(
                        "method `{}` has more than one route annotation ({})",
                        handler,
                        names.join(", ")
                    ),
                )
                .with_span(routes[1].span.clone())
                .with_related(routes[0].span.clone(), "first route annotation"),
            );
            failed = true;
        }

        let return_ty = self
            .types
            .declared_type(DeclSite::Return(method))
            .unwrap_or_else(|| TypeRef::keyword("void"));
        let mut ctx = ResolutionContext::new(format!("{}(return)", handler));
        let return_type = match self.resolver.resolve(&return_ty, &mut ctx) {
            Ok(d) => Some(d),
            Err(ResolveError::Unsupported(e)) => {
                self.diagnostics.error(
                    ErrorKind::UnsupportedType,
                    format!("cannot resolve return type of `{}`: {}", handler, e),
                    method.span.clone(),
                );
                failed = true;
                None
            }
            Err(ResolveError::Internal(message)) => {
                return Err(InternalError::Resolver {
                    site: ctx.origin().to_string(),
                    message,
                })
            }
        };

        let mut node = HandlerTreeNode::new(NodeKind::Method, &method.name, method.span.clone());
        node.doc = method.doc.clone();
        for (position, param) in method.params.iter().enumerate() {
            match self.walk_param(&handler, position, param, AnnotationTarget::Parameter)? {
                Some(p) => node.children.push(p),
                None => failed = true,
            }
        }

        let bodies: Vec<&HandlerTreeNode> = node
            .children
            .iter()
            .filter(|p| matches!(p.binding(), Some((BindingKind::Body, _))))
            .collect();
        if bodies.len() > 1 {
            self.diagnostics.report(
                Diagnostic::error(
                    ErrorKind::ConflictingBinding,
                    format!(
                        "method `{}` binds the request body to both `{}` and `{}`",
                        handler, bodies[0].name, bodies[1].name
                    ),
                )
                .with_span(bodies[1].span.clone())
                .with_related(bodies[0].span.clone(), "body already bound here"),
            );
            failed = true;
        }

        if failed {
            debug!(handler = %handler, "dropping method");
            return Ok(None);
        }
        node.metadata = collect_metadata(&annotations);
        node.annotations = annotations;
        node.descriptor = return_type;
        Ok(Some(node))
    }

    fn walk_param(
        &mut self,
        owner: &str,
        position: usize,
        param: &ParamDecl,
        target: AnnotationTarget,
    ) -> Result<Option<HandlerTreeNode>, InternalError> {
        let Some(annotations) = self.apply(&param.annotations, target) else {
            return Ok(None);
        };

        let bindings: Vec<&AppliedAnnotation> = annotations
            .iter()
            .filter(|a| a.definition.binding().is_some())
            .collect();
        let binding = match bindings.as_slice() {
            [one] => *one,
            [] => {
                self.diagnostics.report(
                    Diagnostic::error(
                        ErrorKind::MissingBinding,
                        format!(
                            "parameter `{}` of `{}` has no binding annotation",
                            param.name, owner
                        ),
                    )
                    .with_span(param.span.clone())
                    .with_suggestion("bind it with @Query, @Path, @Header, @Body, or @Inject"),
                );
                return Ok(None);
            }
            [first, second, ..] => {
                self.diagnostics.report(
                    Diagnostic::error(
                        ErrorKind::ConflictingBinding,
                        format!(
                            "parameter `{}` of `{}` is bound by both @{} and @{}",
                            param.name, owner, first.name, second.name
                        ),
                    )
                    .with_span(second.span.clone())
                    .with_related(first.span.clone(), "first binding"),
                );
                return Ok(None);
            }
        };

        let declared = self
            .types
            .declared_type(DeclSite::Parameter(param))
            .unwrap_or_else(|| TypeRef::keyword("any"));
        let (ty, had_undefined) = declared.strip_undefined();
        let site = format!("{}({})", owner, param.name);

        let descriptor = match binding.definition.resolution {
            TypeResolution::Opaque => self.resolver.resolve_opaque(&ty),
            TypeResolution::Full => {
                let mut ctx = ResolutionContext::new(site.clone());
                match self.resolver.resolve(&ty, &mut ctx) {
                    Ok(d) => d,
                    Err(ResolveError::Unsupported(e)) => {
                        self.diagnostics.error(
                            ErrorKind::UnsupportedType,
                            format!(
                                "cannot resolve type of parameter `{}` of `{}`: {}",
                                param.name, owner, e
                            ),
                            param.span.clone(),
                        );
                        return Ok(None);
                    }
                    Err(ResolveError::Internal(message)) => {
                        return Err(InternalError::Resolver { site, message })
                    }
                }
            }
        };

        let restrictions = &binding.definition.restrictions;
        if !permits(restrictions, &descriptor) {
            let allowed: Vec<String> = restrictions.iter().map(|r| r.to_string()).collect();
            self.diagnostics.report(
                Diagnostic::error(
                    ErrorKind::TypeRestriction,
                    format!(
                        "parameter `{}` of `{}` has type `{}`, which @{} does not accept",
                        param.name,
                        owner,
                        descriptor.display_name(),
                        binding.name
                    ),
                )
                .with_span(param.span.clone())
                .with_suggestion(format!("use one of: {}", allowed.join(", "))),
            );
            return Ok(None);
        }

        let mut node = HandlerTreeNode::new(NodeKind::Parameter, &param.name, param.span.clone());
        node.position = position;
        node.required = !(param.optional || param.default.is_some() || had_undefined);
        node.default = param.default.clone();
        node.doc = param.doc.clone();
        node.descriptor = Some(descriptor);
        node.metadata = collect_metadata(&annotations);
        node.annotations = annotations;
        Ok(Some(node))
    }

    /// Match attributes against the catalog for `target`. Unknown names are
    /// ignored; any misplaced, malformed, or illegally repeated annotation
    /// makes the whole set invalid (`None`) after reporting every problem.
    fn apply(
        &mut self,
        attributes: &[Attribute],
        target: AnnotationTarget,
    ) -> Option<Vec<AppliedAnnotation>> {
        let mut applied = Vec::with_capacity(attributes.len());
        let mut seen: HashSet<&str> = HashSet::new();
        let mut ok = true;

        for attr in attributes {
            let Some(definition) = self.catalog.lookup(&attr.name) else {
                debug!(annotation = %attr.name, "ignoring unrecognized annotation");
                continue;
            };
            if !definition.applies_to(target) {
                let allowed: Vec<String> = definition.targets.iter().map(|t| t.to_string()).collect();
                self.diagnostics.report(
                    Diagnostic::error(
                        ErrorKind::MisplacedAnnotation,
                        format!("@{} cannot be applied to a {}", attr.name, target),
                    )
                    .with_span(attr.span.clone())
                    .with_suggestion(format!("@{} applies to: {}", attr.name, allowed.join(", "))),
                );
                ok = false;
                continue;
            }
            if !seen.insert(attr.name.as_str()) && !definition.repeatable {
                self.diagnostics.error(
                    ErrorKind::ConflictingBinding,
                    format!("@{} may only appear once on a declaration", attr.name),
                    attr.span.clone(),
                );
                ok = false;
                continue;
            }
            if let Err(e) = self.catalog.validate_arguments(&definition, &attr.args) {
                self.diagnostics
                    .error(ErrorKind::ArgumentShape, e.to_string(), attr.span.clone());
                ok = false;
                continue;
            }
            applied.push(AppliedAnnotation {
                name: attr.name.clone(),
                definition,
                args: attr.args.clone(),
                span: attr.span.clone(),
            });
        }
        ok.then_some(applied)
    }
}

/// Metadata declared by argument specs. Omitted arguments record their spec
/// default; repeatable annotations accumulate into an array.
fn collect_metadata(annotations: &[AppliedAnnotation]) -> IndexMap<String, serde_json::Value> {
    let mut metadata = IndexMap::new();
    for a in annotations {
        for (i, spec) in a.definition.arguments.iter().enumerate() {
            let Some(key) = &spec.metadata else { continue };
            let value = match a.args.get(i) {
                Some(arg) => arg.to_value(),
                None => match &spec.default {
                    Some(d) => d.clone(),
                    None => continue,
                },
            };
            if a.definition.repeatable {
                let entry = metadata
                    .entry(key.clone())
                    .or_insert_with(|| serde_json::Value::Array(Vec::new()));
                if let serde_json::Value::Array(items) = entry {
                    items.push(value);
                }
            } else {
                metadata.insert(key.clone(), value);
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverOptions;
    use crate::unit::{AttributeArg, CompiledUnit};
    use serde_json::json;
    use waypoint_common::Span;

    fn applied(catalog: &AnnotationCatalog, name: &str, args: Vec<AttributeArg>) -> AppliedAnnotation {
        AppliedAnnotation {
            name: name.to_string(),
            definition: catalog.lookup(name).unwrap(),
            args,
            span: Span::dummy(),
        }
    }

    #[test]
    fn metadata_defaults_and_repeats() {
        let cat = AnnotationCatalog::with_builtins();
        let metadata = collect_metadata(&[
            applied(&cat, "Get", vec![]),
            applied(&cat, "Status", vec![AttributeArg::Literal(json!(204))]),
        ]);
        assert_eq!(metadata["path"], json!(""));
        assert_eq!(metadata["status"], json!(204));

        let mut custom = AnnotationCatalog::new();
        custom
            .register(
                waypoint_common::AnnotationDefinition::new("Tag", &[AnnotationTarget::Method])
                    .argument(
                        waypoint_common::annotation::ArgumentSpec::required(
                            "tag",
                            waypoint_common::annotation::ArgumentType::String,
                        )
                        .metadata("tags"),
                    )
                    .repeatable(),
            )
            .unwrap();
        let tags = collect_metadata(&[
            applied(&custom, "Tag", vec![AttributeArg::string("pets")]),
            applied(&custom, "Tag", vec![AttributeArg::string("admin")]),
        ]);
        assert_eq!(tags["tags"], json!(["pets", "admin"]));
    }

    #[test]
    fn constructor_injection_becomes_node() {
        let unit: CompiledUnit = serde_json::from_value(json!({
            "classes": [{
                "name": "Pets", "qualified_name": "pets.ts#Pets",
                "constructor": { "params": [
                    { "name": "repo", "annotations": [{ "name": "Inject", "args": [{ "identifier": "Repo" }] }],
                      "type": { "kind": "reference", "name": "Repo" } },
                    { "name": "plain", "type": { "kind": "keyword", "name": "string" } }
                ] },
                "methods": [{ "name": "list", "annotations": [{ "name": "Get", "args": ["/pets"] }] }]
            }]
        }))
        .unwrap();
        let cat = AnnotationCatalog::with_builtins();
        let mut resolver = TypeResolver::new(&unit, ResolverOptions::default());
        let (roots, diags) = Walker::new(&cat, &unit, &mut resolver).walk(&unit.classes).unwrap();
        assert!(diags.is_empty());
        let class = &roots[0];
        assert_eq!(class.children[0].kind, NodeKind::Constructor);
        assert_eq!(class.children[0].children.len(), 1);
        assert_eq!(class.children[0].children[0].binding_name(), "Repo");
        assert_eq!(class.children[1].kind, NodeKind::Method);
    }

    #[test]
    fn non_repeatable_annotation_twice_conflicts() {
        let unit: CompiledUnit = serde_json::from_value(json!({
            "classes": [{
                "name": "Pets", "qualified_name": "pets.ts#Pets",
                "methods": [{ "name": "list", "annotations": [
                    { "name": "Get", "args": ["/pets"] },
                    { "name": "Status", "args": [200] },
                    { "name": "Status", "args": [201] }
                ] }]
            }]
        }))
        .unwrap();
        let cat = AnnotationCatalog::with_builtins();
        let mut resolver = TypeResolver::new(&unit, ResolverOptions::default());
        let (roots, diags) = Walker::new(&cat, &unit, &mut resolver).walk(&unit.classes).unwrap();
        assert!(roots.is_empty());
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.diagnostics()[0].kind, Some(ErrorKind::ConflictingBinding));
    }
}
