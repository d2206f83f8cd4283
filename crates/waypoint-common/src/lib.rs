pub mod annotation;
pub mod api;
pub mod descriptor;
pub mod errors;
pub mod manifest;
pub mod span;

pub use annotation::{AnnotationDefinition, AnnotationTarget, TypeRestriction};
pub use api::{ApiManifest, BindingKind, ExtractedApiDefinition, HttpMethod, RouteGroup};
pub use descriptor::{DescriptorRef, Primitive, TypeDescriptor};
pub use errors::{Diagnostic, DiagnosticBag, ErrorKind, Severity};
pub use span::{Position, Span};
