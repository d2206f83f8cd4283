//! Waypoint compiler: turns annotated handler classes into API definitions.
//!
//! The pipeline runs in three passes over a [`unit::CompiledUnit`]:
//!  1. the walker matches annotations against the [`catalog`] and resolves
//!     parameter and return types through the [`resolver`],
//!  2. the linker resolves annotation dependencies across the tree,
//!  3. the assembler emits one definition per verb and route.

pub mod catalog;
pub mod extract;
pub mod resolver;
pub mod unit;

pub use catalog::AnnotationCatalog;
pub use extract::{extract, Extraction, Extractor, InternalError};
pub use resolver::{ResolverOptions, TypeResolver};
pub use unit::CompiledUnit;
