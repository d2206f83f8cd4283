//! The extraction pipeline: walk annotated declarations, link their
//! dependencies, assemble API definitions.

pub mod assembler;
pub mod linker;
pub mod route;
pub mod tree;
pub mod walker;

use tracing::info;
use waypoint_common::{ApiManifest, Diagnostic, ExtractedApiDefinition, RouteGroup};

use crate::catalog::AnnotationCatalog;
use crate::resolver::{ResolverOptions, TypeResolver};
use crate::unit::{ClassDecl, CompiledUnit, TypeInference};

pub use tree::{DependencyLink, HandlerTreeNode, LinkedTree, NodeKind, NodePath, Requirement};
pub use walker::Walker;

/// Version stamped into emitted manifests.
pub const MANIFEST_VERSION: &str = "1";

/// A broken internal invariant. Aborts the pass; nothing partial is returned.
#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    #[error("type resolution failed internally at {site}: {message}")]
    Resolver { site: String, message: String },
}

/// Result of one extraction pass.
#[derive(Debug)]
pub struct Extraction {
    pub definitions: Vec<ExtractedApiDefinition>,
    pub routes: Vec<RouteGroup>,
    pub diagnostics: Vec<Diagnostic>,
    /// The linked handler tree the definitions were assembled from.
    pub tree: LinkedTree,
}

impl Extraction {
    /// No error diagnostics were produced.
    pub fn is_success(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.is_error())
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn into_manifest(self, project: Option<String>) -> ApiManifest {
        ApiManifest {
            version: MANIFEST_VERSION.to_string(),
            project,
            definitions: self.definitions,
            routes: self.routes,
        }
    }
}

/// One compilation scope: the catalog in use, the unit's declarations, and a
/// type resolver whose descriptor cache is reused across runs until
/// [`Extractor::reset`].
pub struct Extractor<'a> {
    catalog: &'a AnnotationCatalog,
    classes: &'a [ClassDecl],
    types: &'a dyn TypeInference,
    resolver: TypeResolver<'a>,
}

impl<'a> Extractor<'a> {
    pub fn new(catalog: &'a AnnotationCatalog, unit: &'a CompiledUnit, options: ResolverOptions) -> Self {
        Self::with_types(catalog, &unit.classes, unit, options)
    }

    /// Extract from `classes` with type information from another source.
    pub fn with_types(
        catalog: &'a AnnotationCatalog,
        classes: &'a [ClassDecl],
        types: &'a dyn TypeInference,
        options: ResolverOptions,
    ) -> Self {
        Self {
            catalog,
            classes,
            types,
            resolver: TypeResolver::new(types, options),
        }
    }

    pub fn resolver(&self) -> &TypeResolver<'a> {
        &self.resolver
    }

    /// Clear the descriptor cache.
    pub fn reset(&mut self) {
        self.resolver.reset();
    }

    pub fn run(&mut self) -> Result<Extraction, InternalError> {
        let walker = Walker::new(self.catalog, self.types, &mut self.resolver);
        let (forest, mut diagnostics) = walker.walk(self.classes)?;
        let (tree, link_diagnostics) = linker::link(forest);
        diagnostics.extend(link_diagnostics);
        let (definitions, routes, assemble_diagnostics) = assembler::assemble(&tree);
        diagnostics.extend(assemble_diagnostics);

        info!(
            definitions = definitions.len(),
            errors = diagnostics.error_count(),
            cached_types = self.resolver.cache().len(),
            "extraction finished"
        );
        Ok(Extraction {
            definitions,
            routes,
            diagnostics: diagnostics.into_diagnostics(),
            tree,
        })
    }
}

/// Run a single extraction over `unit` with a fresh descriptor cache.
pub fn extract(
    unit: &CompiledUnit,
    catalog: &AnnotationCatalog,
    options: ResolverOptions,
) -> Result<Extraction, InternalError> {
    Extractor::new(catalog, unit, options).run()
}
