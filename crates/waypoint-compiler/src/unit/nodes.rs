use serde::{Deserialize, Serialize};
use waypoint_common::Span;

use super::types::TypeRef;

// ============================================================================
// Annotations
// ============================================================================

/// An annotation as attached in source: `@Name` or `@Name(args)`.
///
/// ```text
/// @Get("/pets/{id}")
/// @Query("page") page: number = 1
/// @Inject(PetRepository) repo: PetRepository
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub args: Vec<AttributeArg>,
    #[serde(default)]
    pub span: Span,
}

/// A literal argument expression of an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeArg {
    /// Bare identifier: `@Inject(PetRepository)`.
    Identifier { identifier: String },
    /// Any literal: strings, numbers, booleans, `null`, arrays, object literals.
    Literal(serde_json::Value),
}

impl AttributeArg {
    pub fn string(value: &str) -> Self {
        AttributeArg::Literal(serde_json::Value::String(value.to_string()))
    }

    pub fn identifier(name: &str) -> Self {
        AttributeArg::Identifier {
            identifier: name.to_string(),
        }
    }

    /// Identifier name or string literal contents.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeArg::Identifier { identifier } => Some(identifier),
            AttributeArg::Literal(serde_json::Value::String(s)) => Some(s),
            AttributeArg::Literal(_) => None,
        }
    }

    /// Value recorded in node metadata; identifiers become their name.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            AttributeArg::Identifier { identifier } => serde_json::Value::String(identifier.clone()),
            AttributeArg::Literal(v) => v.clone(),
        }
    }

    /// Kind of expression, for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            AttributeArg::Identifier { .. } => "identifier",
            AttributeArg::Literal(serde_json::Value::String(_)) => "string",
            AttributeArg::Literal(serde_json::Value::Number(_)) => "number",
            AttributeArg::Literal(serde_json::Value::Bool(_)) => "boolean",
            AttributeArg::Literal(serde_json::Value::Null) => "null",
            AttributeArg::Literal(serde_json::Value::Array(_)) => "array",
            AttributeArg::Literal(serde_json::Value::Object(_)) => "object",
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// A class that may expose handler methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub qualified_name: String,
    #[serde(default)]
    pub annotations: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<ConstructorDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorDecl {
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub annotations: Vec<Attribute>,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    /// Declared or inferred return type; absent means `void`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(default)]
    pub annotations: Vec<Attribute>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeRef>,
    /// Declared with `?`.
    #[serde(default)]
    pub optional: bool,
    /// Default initializer literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default)]
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_args_distinguish_identifiers() {
        let attr: Attribute = serde_json::from_value(serde_json::json!({
            "name": "Inject",
            "args": [{ "identifier": "PetRepository" }, "tag", 3, { "optional": true }]
        }))
        .unwrap();
        assert_eq!(attr.args[0], AttributeArg::identifier("PetRepository"));
        assert_eq!(attr.args[1].as_str(), Some("tag"));
        assert_eq!(attr.args[2].describe(), "number");
        assert_eq!(attr.args[3].describe(), "object");
        assert_eq!(attr.args[0].to_value(), serde_json::json!("PetRepository"));
    }
}
