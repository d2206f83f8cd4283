//! Normalizes host type references into [`TypeDescriptor`] trees.
//!
//! Named declarations are expanded once per distinct type-argument tuple and
//! memoized in a [`DescriptorCache`]; re-entering a declaration that is still
//! being expanded yields a recursive reference instead of another expansion.

pub mod cache;
pub mod context;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};
use waypoint_common::descriptor::{FieldDescriptor, LiteralValue, ObjectShape};
use waypoint_common::manifest::{ResolverSection, DEFAULT_MAX_DEPTH};
use waypoint_common::{DescriptorRef, Primitive, TypeDescriptor};

use crate::unit::{FieldDecl, TypeDecl, TypeDeclKind, TypeInference, TypeRef};

pub use cache::DescriptorCache;
pub use context::ResolutionContext;

/// A type construct with no normalized representation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported type `{ty}`: {reason}")]
pub struct UnsupportedTypeError {
    pub ty: String,
    pub reason: String,
}

impl UnsupportedTypeError {
    fn new(ty: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedTypeError),

    /// The resolver's own invariants broke; the pass must stop.
    #[error("type resolver invariant violated: {0}")]
    Internal(String),
}

/// Resolver settings, usually taken from the `[resolver]` manifest section.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Names resolved to `opaque` without lookup.
    pub opaque_types: HashSet<String>,
    /// Bound on nested generic instantiations.
    pub max_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            opaque_types: HashSet::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl From<&ResolverSection> for ResolverOptions {
    fn from(section: &ResolverSection) -> Self {
        Self {
            opaque_types: section.opaque_types.iter().cloned().collect(),
            max_depth: section.max_depth,
        }
    }
}

/// Type resolver for one compilation. The cache lives exactly as long as the
/// resolver, which borrows that compilation's type information.
pub struct TypeResolver<'u> {
    types: &'u dyn TypeInference,
    options: ResolverOptions,
    cache: DescriptorCache,
}

impl<'u> TypeResolver<'u> {
    pub fn new(types: &'u dyn TypeInference, options: ResolverOptions) -> Self {
        Self {
            types,
            options,
            cache: DescriptorCache::new(),
        }
    }

    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    /// Drop every memoized descriptor.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    /// Resolve `ty` to a normalized descriptor.
    pub fn resolve(
        &mut self,
        ty: &TypeRef,
        ctx: &mut ResolutionContext,
    ) -> Result<DescriptorRef, ResolveError> {
        let depth = ctx.depth();
        let result = self.resolve_type(ty, ctx);
        if ctx.depth() != depth {
            return Err(ResolveError::Internal(format!(
                "identity stack unbalanced after resolving `{}` ({} -> {})",
                ty.display_name(),
                depth,
                ctx.depth()
            )));
        }
        result
    }

    /// Describe `ty` by name only.
    pub fn resolve_opaque(&self, ty: &TypeRef) -> DescriptorRef {
        TypeDescriptor::opaque(ty.display_name())
    }

    fn resolve_type(
        &mut self,
        ty: &TypeRef,
        ctx: &mut ResolutionContext,
    ) -> Result<DescriptorRef, ResolveError> {
        match ty {
            TypeRef::Keyword { name } => Ok(resolve_keyword(name)?),
            TypeRef::Literal { value } => match LiteralValue::from_json(value) {
                Some(lit) => Ok(TypeDescriptor::literal(lit)),
                None if value.is_null() => Ok(TypeDescriptor::primitive(Primitive::Null)),
                None => Err(UnsupportedTypeError::new(
                    value.to_string(),
                    "only string, number, and boolean literal types are supported",
                )
                .into()),
            },
            TypeRef::Array { element } => {
                ctx.field_path.push("[]".to_string());
                let element = self.resolve_type(element, ctx);
                ctx.field_path.pop();
                Ok(TypeDescriptor::array(element?))
            }
            TypeRef::Tuple { elements } => {
                if elements.is_empty() {
                    return Err(UnsupportedTypeError::new("[]", "empty tuple").into());
                }
                let mut members = Vec::with_capacity(elements.len());
                for e in elements {
                    members.push(self.resolve_type(e, ctx)?);
                }
                Ok(TypeDescriptor::array(TypeDescriptor::union(members)))
            }
            TypeRef::Union { members } => {
                let mut resolved = Vec::with_capacity(members.len());
                for m in members {
                    resolved.push(self.resolve_type(m, ctx)?);
                }
                Ok(TypeDescriptor::union(resolved))
            }
            TypeRef::Intersection { members } => self.resolve_intersection(ty, members, ctx),
            TypeRef::TypeParameter { name } => match ctx.env.get(name) {
                Some(bound) => Ok(bound.clone()),
                None => Ok(TypeDescriptor::generic_reference(name.clone(), Vec::new())),
            },
            TypeRef::Reference {
                name,
                type_arguments,
            } => self.resolve_reference(name, type_arguments, ctx),
            TypeRef::Object { fields } => {
                let identity = ctx.anonymous_identity();
                let fields = self.resolve_fields(fields, ctx)?;
                Ok(Arc::new(TypeDescriptor::Object(ObjectShape {
                    identity,
                    name: None,
                    type_arguments: Vec::new(),
                    fields,
                })))
            }
            TypeRef::Function { .. } => Err(UnsupportedTypeError::new(
                ty.display_name(),
                "function types have no serializable representation",
            )
            .into()),
        }
    }

    fn resolve_reference(
        &mut self,
        name: &str,
        args: &[TypeRef],
        ctx: &mut ResolutionContext,
    ) -> Result<DescriptorRef, ResolveError> {
        if args.is_empty() {
            if let Some(bound) = ctx.env.get(name) {
                return Ok(bound.clone());
            }
        }
        if self.options.opaque_types.contains(name) {
            return Ok(TypeDescriptor::opaque(name));
        }
        let types = self.types;
        if let Some(decl) = types.lookup_type(name) {
            return self.resolve_declaration(decl, args, ctx);
        }
        self.resolve_builtin(name, args, ctx)
    }

    fn resolve_builtin(
        &mut self,
        name: &str,
        args: &[TypeRef],
        ctx: &mut ResolutionContext,
    ) -> Result<DescriptorRef, ResolveError> {
        let expected = match name {
            "Date" | "String" | "Number" | "Boolean" => 0,
            "Promise" | "Array" | "ReadonlyArray" | "Set" => 1,
            "Record" | "Map" => 2,
            _ => {
                return Err(UnsupportedTypeError::new(name, "no declaration with this name").into())
            }
        };
        if args.len() != expected {
            return Err(UnsupportedTypeError::new(
                name,
                format!("expects {} type argument(s), got {}", expected, args.len()),
            )
            .into());
        }
        let mut resolved = Vec::with_capacity(args.len());
        for a in args {
            resolved.push(self.resolve_type(a, ctx)?);
        }
        Ok(match name {
            "Date" => TypeDescriptor::primitive(Primitive::Date),
            "String" => TypeDescriptor::primitive(Primitive::String),
            "Number" => TypeDescriptor::primitive(Primitive::Number),
            "Boolean" => TypeDescriptor::primitive(Primitive::Boolean),
            "Promise" => TypeDescriptor::promise(resolved.remove(0)),
            "Array" | "ReadonlyArray" | "Set" => TypeDescriptor::array(resolved.remove(0)),
            _ => TypeDescriptor::generic_reference(name, resolved),
        })
    }

    fn resolve_declaration(
        &mut self,
        decl: &TypeDecl,
        args: &[TypeRef],
        ctx: &mut ResolutionContext,
    ) -> Result<DescriptorRef, ResolveError> {
        let params = &decl.type_parameters;
        if args.len() > params.len() {
            return Err(UnsupportedTypeError::new(
                &decl.name,
                format!(
                    "expects at most {} type argument(s), got {}",
                    params.len(),
                    args.len()
                ),
            )
            .into());
        }

        // Arguments resolve in the caller's environment, defaults in the
        // callee's so they may refer to earlier parameters. Parameters left
        // unbound stay out of the environment.
        let mut env: HashMap<String, DescriptorRef> = HashMap::new();
        let mut arg_descriptors = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let bound = match (args.get(i), &param.default) {
                (Some(arg), _) => Some(self.resolve_type(arg, ctx)?),
                (None, Some(default)) => {
                    let caller = std::mem::replace(&mut ctx.env, env.clone());
                    let resolved = self.resolve_type(default, ctx);
                    ctx.env = caller;
                    Some(resolved?)
                }
                (None, None) => None,
            };
            match bound {
                Some(bound) => {
                    env.insert(param.name.clone(), bound.clone());
                    arg_descriptors.push(bound);
                }
                None => arg_descriptors.push(TypeDescriptor::generic_reference(
                    param.name.clone(),
                    Vec::new(),
                )),
            }
        }

        let generic = !params.is_empty();
        let identity = if generic {
            let keys: Vec<String> = arg_descriptors.iter().map(|d| canonical_key(d)).collect();
            format!("{}<{}>", decl.qualified_name, keys.join(", "))
        } else {
            decl.qualified_name.clone()
        };

        if ctx.is_expanding(&identity) {
            trace!(identity = %identity, "recursive reference");
            return Ok(TypeDescriptor::recursive(identity));
        }
        if let Some(hit) = self.cache.get(&identity)? {
            trace!(identity = %identity, "descriptor cache hit");
            return Ok(hit);
        }
        if generic && ctx.generic_depth() >= self.options.max_depth {
            return Err(UnsupportedTypeError::new(
                &decl.name,
                format!(
                    "type instantiation is excessively deep (more than {} nested generic instances)",
                    self.options.max_depth
                ),
            )
            .into());
        }

        debug!(identity = %identity, origin = ctx.origin(), "expanding declaration");
        let saved = ctx.enter(identity.clone(), generic, env);
        let expanded = self.expand_declaration(decl, &identity, arg_descriptors, ctx);
        ctx.exit(saved);
        let (descriptor, cacheable) = expanded?;

        if cacheable && descriptor.open_references().is_empty() {
            self.cache.insert(identity, descriptor.clone())?;
        }
        Ok(descriptor)
    }

    /// Expand a declaration already pushed on the context. The flag tells
    /// whether the result may be cached under the declaration's identity.
    fn expand_declaration(
        &mut self,
        decl: &TypeDecl,
        identity: &str,
        type_arguments: Vec<DescriptorRef>,
        ctx: &mut ResolutionContext,
    ) -> Result<(DescriptorRef, bool), ResolveError> {
        match &decl.kind {
            TypeDeclKind::Interface { extends, fields } => {
                let mut merged: Vec<FieldDescriptor> = Vec::new();
                for base in extends {
                    let resolved = self.resolve_type(base, ctx)?;
                    match resolved.as_ref() {
                        TypeDescriptor::Object(shape) => {
                            for f in &shape.fields {
                                merge_field(&mut merged, f.clone());
                            }
                        }
                        _ => {
                            return Err(UnsupportedTypeError::new(
                                &decl.name,
                                format!(
                                    "base type `{}` is not an object shape",
                                    base.display_name()
                                ),
                            )
                            .into())
                        }
                    }
                }
                for f in self.resolve_fields(fields, ctx)? {
                    merge_field(&mut merged, f);
                }
                let shape = ObjectShape {
                    identity: identity.to_string(),
                    name: Some(decl.name.clone()),
                    type_arguments,
                    fields: merged,
                };
                Ok((Arc::new(TypeDescriptor::Object(shape)), true))
            }
            TypeDeclKind::Alias {
                target: TypeRef::Object { fields },
            } => {
                let shape = ObjectShape {
                    identity: identity.to_string(),
                    name: Some(decl.name.clone()),
                    type_arguments,
                    fields: self.resolve_fields(fields, ctx)?,
                };
                Ok((Arc::new(TypeDescriptor::Object(shape)), true))
            }
            TypeDeclKind::Alias { target } => {
                let resolved = self.resolve_type(target, ctx)?;
                if resolved.open_references().contains(identity) {
                    return Err(UnsupportedTypeError::new(
                        &decl.name,
                        "a recursive alias must be an object shape",
                    )
                    .into());
                }
                Ok((resolved, false))
            }
            TypeDeclKind::Enum { members } => {
                let mut literals = Vec::with_capacity(members.len());
                for m in members {
                    let value = LiteralValue::from_json(&m.value).ok_or_else(|| {
                        UnsupportedTypeError::new(
                            &decl.name,
                            format!("enum member `{}` is not a string or number", m.name),
                        )
                    })?;
                    literals.push(TypeDescriptor::literal(value));
                }
                if literals.is_empty() {
                    return Err(UnsupportedTypeError::new(&decl.name, "enum has no members").into());
                }
                Ok((TypeDescriptor::union(literals), true))
            }
        }
    }

    fn resolve_fields(
        &mut self,
        fields: &[FieldDecl],
        ctx: &mut ResolutionContext,
    ) -> Result<Vec<FieldDescriptor>, ResolveError> {
        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            let (ty, had_undefined) = field.ty.strip_undefined();
            ctx.field_path.push(field.name.clone());
            let descriptor = self.resolve_type(&ty, ctx);
            ctx.field_path.pop();
            out.push(FieldDescriptor {
                name: field.name.clone(),
                descriptor: descriptor?,
                required: !(field.optional || field.default.is_some() || had_undefined),
                description: field.description.clone(),
            });
        }
        Ok(out)
    }

    fn resolve_intersection(
        &mut self,
        ty: &TypeRef,
        members: &[TypeRef],
        ctx: &mut ResolutionContext,
    ) -> Result<DescriptorRef, ResolveError> {
        let mut merged: Vec<FieldDescriptor> = Vec::new();
        let mut identities = Vec::with_capacity(members.len());
        let mut names = Vec::with_capacity(members.len());
        for m in members {
            let resolved = self.resolve_type(m, ctx)?;
            match resolved.as_ref() {
                TypeDescriptor::Object(shape) => {
                    identities.push(shape.identity.clone());
                    names.push(resolved.display_name());
                    for f in &shape.fields {
                        merge_field(&mut merged, f.clone());
                    }
                }
                _ => {
                    return Err(UnsupportedTypeError::new(
                        ty.display_name(),
                        "only intersections of object shapes are supported",
                    )
                    .into())
                }
            }
        }
        Ok(Arc::new(TypeDescriptor::Object(ObjectShape {
            identity: identities.join(" & "),
            name: Some(names.join(" & ")),
            type_arguments: Vec::new(),
            fields: merged,
        })))
    }
}

fn resolve_keyword(name: &str) -> Result<DescriptorRef, UnsupportedTypeError> {
    let primitive = match name {
        "string" => Primitive::String,
        "number" => Primitive::Number,
        "boolean" => Primitive::Boolean,
        "null" => Primitive::Null,
        "undefined" | "void" => Primitive::Void,
        "any" | "unknown" | "object" => Primitive::Any,
        "never" | "symbol" | "bigint" => {
            return Err(UnsupportedTypeError::new(
                name,
                "no serializable representation",
            ))
        }
        other => {
            return Err(UnsupportedTypeError::new(other, "unknown keyword type"));
        }
    };
    Ok(TypeDescriptor::primitive(primitive))
}

/// Later declarations of a field replace earlier ones in place.
fn merge_field(fields: &mut Vec<FieldDescriptor>, field: FieldDescriptor) {
    match fields.iter_mut().find(|f| f.name == field.name) {
        Some(existing) => *existing = field,
        None => fields.push(field),
    }
}

/// Rendering used inside generic identity keys: like the display name, but
/// objects are named by identity so same-named types from different modules
/// never collide.
fn canonical_key(descriptor: &TypeDescriptor) -> String {
    match descriptor {
        // Inline shapes share their site's identity, so key them by structure.
        TypeDescriptor::Object(shape) if shape.name.is_none() => {
            let fields: Vec<String> = shape
                .fields
                .iter()
                .map(|f| {
                    let marker = if f.required { "" } else { "?" };
                    format!("{}{}: {}", f.name, marker, canonical_key(&f.descriptor))
                })
                .collect();
            format!("{{ {} }}", fields.join("; "))
        }
        TypeDescriptor::Object(shape) => shape.identity.clone(),
        TypeDescriptor::Array { element } => format!("{}[]", canonical_key(element)),
        TypeDescriptor::Union { members } => {
            let parts: Vec<String> = members.iter().map(|m| canonical_key(m)).collect();
            format!("({})", parts.join(" | "))
        }
        TypeDescriptor::Promise { inner } => format!("Promise<{}>", canonical_key(inner)),
        TypeDescriptor::GenericReference {
            name,
            type_arguments,
        } if !type_arguments.is_empty() => {
            let parts: Vec<String> = type_arguments.iter().map(|a| canonical_key(a)).collect();
            format!("{}<{}>", name, parts.join(", "))
        }
        other => other.display_name(),
    }
}
