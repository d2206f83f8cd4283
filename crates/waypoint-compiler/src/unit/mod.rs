//! In-memory representation of source already parsed and type-checked by the
//! host compiler front end.
//!
//! The front end serializes one [`CompiledUnit`] per compilation; the
//! extraction pass reads it and never touches the filesystem itself.

pub mod nodes;
pub mod types;

use serde::{Deserialize, Serialize};

pub use nodes::*;
pub use types::{EnumMember, FieldDecl, TypeDecl, TypeDeclKind, TypeParam, TypeRef};

/// A declaration site whose static type the pass may ask for.
#[derive(Debug, Clone, Copy)]
pub enum DeclSite<'a> {
    Parameter(&'a ParamDecl),
    Return(&'a MethodDecl),
}

/// Static type query facility supplied by the host compiler.
pub trait TypeInference {
    /// The statically inferred type of a declaration site, if the host knows it.
    fn declared_type(&self, site: DeclSite<'_>) -> Option<TypeRef>;

    /// Look up a named type declaration by qualified or simple name.
    fn lookup_type(&self, name: &str) -> Option<&TypeDecl>;
}

/// All declarations of one compilation, as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
    #[serde(default)]
    pub types: Vec<TypeDecl>,
}

impl CompiledUnit {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl TypeInference for CompiledUnit {
    fn declared_type(&self, site: DeclSite<'_>) -> Option<TypeRef> {
        match site {
            DeclSite::Parameter(param) => param.ty.clone(),
            DeclSite::Return(method) => method.return_type.clone(),
        }
    }

    /// Qualified names win; a simple name matches the first declaration with it.
    fn lookup_type(&self, name: &str) -> Option<&TypeDecl> {
        self.types
            .iter()
            .find(|t| t.qualified_name == name)
            .or_else(|| self.types.iter().find(|t| t.name == name))
    }
}
