//! Table of recognized annotation kinds.
//!
//! The catalog is filled before a pass (built-ins plus any `[[annotations]]`
//! from `Waypoint.toml`) and only borrowed immutably while extracting.

mod builtins;

use std::sync::Arc;

use indexmap::IndexMap;
use waypoint_common::annotation::{ArgumentSpec, ArgumentType, ArgumentValidator};
use waypoint_common::{AnnotationDefinition, HttpMethod};

use crate::unit::AttributeArg;

pub use builtins::{builtin_definitions, keys};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("annotation `{0}` is already registered")]
    Duplicate(String),

    #[error("annotation `{name}` is malformed: {reason}")]
    Invalid { name: String, reason: String },
}

/// One argument position that does not fit its [`ArgumentSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentMismatch {
    pub position: usize,
    pub reason: String,
}

/// Annotation arguments that do not match the definition's argument shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid arguments for @{annotation}: {}", render_mismatches(.mismatches))]
pub struct ArgumentShapeError {
    pub annotation: String,
    pub mismatches: Vec<ArgumentMismatch>,
}

fn render_mismatches(mismatches: &[ArgumentMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| format!("argument {}: {}", m.position + 1, m.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationCatalog {
    definitions: IndexMap<String, Arc<AnnotationDefinition>>,
}

impl AnnotationCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the built-in route, binding, and marker annotations.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for def in builtin_definitions() {
            catalog.definitions.insert(def.name.clone(), Arc::new(def));
        }
        catalog
    }

    /// Add a definition. Names are unique and the definition must be
    /// internally consistent.
    pub fn register(&mut self, definition: AnnotationDefinition) -> Result<(), CatalogError> {
        if self.definitions.contains_key(&definition.name) {
            return Err(CatalogError::Duplicate(definition.name));
        }
        definition.check().map_err(|reason| CatalogError::Invalid {
            name: definition.name.clone(),
            reason,
        })?;
        self.definitions
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<AnnotationDefinition>> {
        self.definitions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &AnnotationDefinition> {
        self.definitions.values().map(|d| d.as_ref())
    }

    /// Check `args` against the definition's argument shape, reporting every
    /// mismatched position at once.
    pub fn validate_arguments(
        &self,
        definition: &AnnotationDefinition,
        args: &[AttributeArg],
    ) -> Result<(), ArgumentShapeError> {
        let mut mismatches = Vec::new();

        for (position, spec) in definition.arguments.iter().enumerate() {
            match args.get(position) {
                Some(arg) => {
                    if let Err(reason) = check_argument(spec, arg) {
                        mismatches.push(ArgumentMismatch { position, reason });
                    }
                }
                None if !spec.optional => mismatches.push(ArgumentMismatch {
                    position,
                    reason: format!("missing required argument `{}`", spec.name),
                }),
                None => {}
            }
        }
        for position in definition.arguments.len()..args.len() {
            mismatches.push(ArgumentMismatch {
                position,
                reason: format!(
                    "unexpected argument (@{} takes at most {})",
                    definition.name,
                    definition.arguments.len()
                ),
            });
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(ArgumentShapeError {
                annotation: definition.name.clone(),
                mismatches,
            })
        }
    }
}

fn check_argument(spec: &ArgumentSpec, arg: &AttributeArg) -> Result<(), String> {
    use serde_json::Value;

    let type_ok = match (spec.ty, arg) {
        (ArgumentType::Any, _) => true,
        (ArgumentType::Identifier, AttributeArg::Identifier { .. }) => true,
        (ArgumentType::Identifier, AttributeArg::Literal(Value::String(_))) => true,
        (ArgumentType::String, AttributeArg::Literal(Value::String(_))) => true,
        (ArgumentType::Number, AttributeArg::Literal(Value::Number(_))) => true,
        (ArgumentType::Boolean, AttributeArg::Literal(Value::Bool(_))) => true,
        (ArgumentType::Object, AttributeArg::Literal(Value::Object(_))) => true,
        _ => false,
    };
    if !type_ok {
        return Err(format!(
            "`{}` expects {}, found {}",
            spec.name,
            spec.ty,
            arg.describe()
        ));
    }

    match spec.validator {
        Some(validator) => check_value(validator, arg).map_err(|e| format!("`{}` {}", spec.name, e)),
        None => Ok(()),
    }
}

fn check_value(validator: ArgumentValidator, arg: &AttributeArg) -> Result<(), String> {
    match validator {
        ArgumentValidator::RoutePath => match arg.as_str() {
            Some(path) => check_route_path(path),
            None => Err("must be a route string".to_string()),
        },
        ArgumentValidator::HttpMethod => match arg.as_str().and_then(HttpMethod::parse) {
            Some(_) => Ok(()),
            None => Err("is not an HTTP method".to_string()),
        },
        ArgumentValidator::HttpStatus => match arg.to_value().as_u64() {
            Some(code) if (100..=599).contains(&code) => Ok(()),
            _ => Err("must be an integer status code between 100 and 599".to_string()),
        },
        ArgumentValidator::NonEmpty => match arg.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(()),
            _ => Err("must not be empty".to_string()),
        },
    }
}

fn check_route_path(path: &str) -> Result<(), String> {
    if !path.is_empty() && !path.starts_with('/') {
        return Err(format!("route `{}` must start with `/`", path));
    }
    let mut open = false;
    let mut token_len = 0;
    for c in path.chars() {
        match c {
            '{' if open => return Err(format!("route `{}` nests `{{`", path)),
            '{' => {
                open = true;
                token_len = 0;
            }
            '}' if !open => return Err(format!("route `{}` has an unmatched `}}`", path)),
            '}' => {
                if token_len == 0 {
                    return Err(format!("route `{}` has an empty path token", path));
                }
                open = false;
            }
            _ if open => {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    return Err(format!("route `{}` has an invalid path token", path));
                }
                token_len += 1;
            }
            _ => {}
        }
    }
    if open {
        return Err(format!("route `{}` has an unclosed `{{`", path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waypoint_common::annotation::{AnnotationRole, DependencyScope, DependencyTarget};
    use waypoint_common::{AnnotationTarget, BindingKind};

    fn lit(v: serde_json::Value) -> AttributeArg {
        AttributeArg::Literal(v)
    }

    #[test]
    fn builtins_cover_routes_and_bindings() {
        let catalog = AnnotationCatalog::with_builtins();
        for verb in ["Get", "Post", "Put", "Patch", "Delete", "Head", "Options", "Route"] {
            let def = catalog.lookup(verb).unwrap();
            assert!(matches!(def.role, AnnotationRole::Route(_)), "{}", verb);
        }
        assert_eq!(catalog.lookup("Query").unwrap().binding(), Some(BindingKind::Query));
        assert_eq!(catalog.lookup("Inject").unwrap().binding(), Some(BindingKind::Dependency));
        assert!(catalog.lookup("Inject").unwrap().applies_to(AnnotationTarget::Constructor));
        assert!(catalog.lookup("Frobnicate").is_none());
        for def in catalog.iter() {
            assert!(def.check().is_ok(), "{}: {:?}", def.name, def.check());
        }
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut catalog = AnnotationCatalog::with_builtins();
        let err = catalog
            .register(AnnotationDefinition::new("Get", &[AnnotationTarget::Method]))
            .unwrap_err();
        assert_eq!(err, CatalogError::Duplicate("Get".into()));
    }

    #[test]
    fn register_rejects_inconsistent_definition() {
        let mut catalog = AnnotationCatalog::new();
        let def = AnnotationDefinition::new("Tenant", &[AnnotationTarget::Class])
            .role(AnnotationRole::Binding(BindingKind::Header));
        assert!(matches!(
            catalog.register(def),
            Err(CatalogError::Invalid { .. })
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn register_custom_annotation() {
        let mut catalog = AnnotationCatalog::with_builtins();
        let before = catalog.len();
        let def = AnnotationDefinition::new("Tenant", &[AnnotationTarget::Parameter])
            .role(AnnotationRole::Binding(BindingKind::Header))
            .depends_on(DependencyTarget::Provider("tenancy".into()), DependencyScope::Enclosing);
        catalog.register(def).unwrap();
        assert_eq!(catalog.len(), before + 1);
        assert!(catalog.contains("Tenant"));
    }

    #[test]
    fn validate_accepts_optional_omission() {
        let catalog = AnnotationCatalog::with_builtins();
        let get = catalog.lookup("Get").unwrap();
        assert!(catalog.validate_arguments(&get, &[]).is_ok());
        assert!(catalog
            .validate_arguments(&get, &[AttributeArg::string("/pets/{id}")])
            .is_ok());
    }

    #[test]
    fn validate_lists_every_mismatch() {
        let catalog = AnnotationCatalog::with_builtins();
        let route = catalog.lookup("Route").unwrap();
        let err = catalog
            .validate_arguments(
                &route,
                &[lit(json!("FETCH")), lit(json!(42)), lit(json!(true))],
            )
            .unwrap_err();
        let positions: Vec<usize> = err.mismatches.iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert!(err.to_string().starts_with("invalid arguments for @Route"));
    }

    #[test]
    fn validate_reports_missing_required() {
        let catalog = AnnotationCatalog::with_builtins();
        let header = catalog.lookup("Header").unwrap();
        let err = catalog.validate_arguments(&header, &[]).unwrap_err();
        assert_eq!(err.mismatches.len(), 1);
        assert!(err.mismatches[0].reason.contains("missing required"));
    }

    #[test]
    fn status_code_range() {
        let catalog = AnnotationCatalog::with_builtins();
        let status = catalog.lookup("Status").unwrap();
        assert!(catalog.validate_arguments(&status, &[lit(json!(201))]).is_ok());
        assert!(catalog.validate_arguments(&status, &[lit(json!(99))]).is_err());
        assert!(catalog.validate_arguments(&status, &[lit(json!(2.5))]).is_err());
    }

    #[test]
    fn identifiers_accept_strings() {
        let catalog = AnnotationCatalog::with_builtins();
        let inject = catalog.lookup("Inject").unwrap();
        assert!(catalog
            .validate_arguments(&inject, &[AttributeArg::identifier("PetRepository")])
            .is_ok());
        assert!(catalog
            .validate_arguments(&inject, &[AttributeArg::string("repo")])
            .is_ok());
        assert!(catalog.validate_arguments(&inject, &[lit(json!(1))]).is_err());
    }

    #[test]
    fn route_path_validation() {
        assert!(check_route_path("").is_ok());
        assert!(check_route_path("/pets/{id}/toys/:toy").is_ok());
        assert!(check_route_path("pets").is_err());
        assert!(check_route_path("/pets/{").is_err());
        assert!(check_route_path("/pets/{}").is_err());
        assert!(check_route_path("/pets/{a-b}").is_err());
        assert!(check_route_path("/pets/}").is_err());
    }
}
