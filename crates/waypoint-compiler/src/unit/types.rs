
use serde::{Deserialize, Serialize};
use waypoint_common::Span;

/// A type as reported by the host type checker (e.g. `string`, `User[]`,
/// `Promise<Page<Pet>>`, `"asc" | "desc"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TypeRef {
    /// Built-in keyword type: `string`, `number`, `boolean`, `null`,
    /// `undefined`, `void`, `any`, `unknown`, `object`, `never`, ...
    Keyword { name: String },

    /// Literal type: `"admin"`, `42`, `true`.
    Literal { value: serde_json::Value },

    /// Array shorthand: `T[]`.
    Array { element: Box<TypeRef> },

    /// Tuple: `[string, number]`.
    Tuple { elements: Vec<TypeRef> },

    /// Union: `A | B`.
    Union { members: Vec<TypeRef> },

    /// Intersection: `A & B`.
    Intersection { members: Vec<TypeRef> },

    /// Named type, optionally instantiated: `User`, `Page<User>`, `Promise<T>`.
    Reference {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        type_arguments: Vec<TypeRef>,
    },

    /// A type parameter of the enclosing generic declaration: `T`.
    TypeParameter { name: String },

    /// Inline object literal type: `{ id: string; tags?: string[] }`.
    Object { fields: Vec<FieldDecl> },

    /// Function type: `(err: Error) => void`.
    Function {
        #[serde(default)]
        params: Vec<TypeRef>,
        return_type: Box<TypeRef>,
    },
}

impl TypeRef {
    pub fn keyword(name: &str) -> Self {
        TypeRef::Keyword {
            name: name.to_string(),
        }
    }

    pub fn named(name: &str) -> Self {
        TypeRef::Reference {
            name: name.to_string(),
            type_arguments: Vec::new(),
        }
    }

    pub fn generic(name: &str, type_arguments: Vec<TypeRef>) -> Self {
        TypeRef::Reference {
            name: name.to_string(),
            type_arguments,
        }
    }

    pub fn array(element: TypeRef) -> Self {
        TypeRef::Array {
            element: Box::new(element),
        }
    }

    pub fn union(members: Vec<TypeRef>) -> Self {
        TypeRef::Union { members }
    }

    /// `undefined` and `void` only express absence.
    pub fn is_undefined(&self) -> bool {
        matches!(self, TypeRef::Keyword { name } if name == "undefined" || name == "void")
    }

    /// Split off `undefined` members of a union.
    ///
    /// Returns the remaining type and whether `undefined` was present.
    pub fn strip_undefined(&self) -> (TypeRef, bool) {
        match self {
            TypeRef::Union { members } if members.iter().any(TypeRef::is_undefined) => {
                let mut rest: Vec<TypeRef> =
                    members.iter().filter(|m| !m.is_undefined()).cloned().collect();
                let ty = match rest.len() {
                    0 => TypeRef::keyword("undefined"),
                    1 => rest.remove(0),
                    _ => TypeRef::Union { members: rest },
                };
                (ty, true)
            }
            other => (other.clone(), false),
        }
    }

    /// Short rendering for diagnostics.
    pub fn display_name(&self) -> String {
        match self {
            TypeRef::Keyword { name } => name.clone(),
            TypeRef::Literal { value } => value.to_string(),
            TypeRef::Array { element } => format!("{}[]", element.display_name()),
            TypeRef::Tuple { elements } => {
                let parts: Vec<_> = elements.iter().map(|e| e.display_name()).collect();
                format!("[{}]", parts.join(", "))
            }
            TypeRef::Union { members } => {
                let parts: Vec<_> = members.iter().map(|m| m.display_name()).collect();
                parts.join(" | ")
            }
            TypeRef::Intersection { members } => {
                let parts: Vec<_> = members.iter().map(|m| m.display_name()).collect();
                parts.join(" & ")
            }
            TypeRef::Reference {
                name,
                type_arguments,
            } => {
                if type_arguments.is_empty() {
                    name.clone()
                } else {
                    let parts: Vec<_> = type_arguments.iter().map(|a| a.display_name()).collect();
                    format!("{}<{}>", name, parts.join(", "))
                }
            }
            TypeRef::TypeParameter { name } => name.clone(),
            TypeRef::Object { .. } => "{ ... }".to_string(),
            TypeRef::Function { .. } => "function".to_string(),
        }
    }
}

/// A field of an interface, DTO class, or inline object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    /// Declared with `?`.
    #[serde(default)]
    pub optional: bool,
    /// Initializer literal (class properties).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub span: Span,
}

/// A generic parameter of a type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<TypeRef>,
}

/// One member of an enum declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    pub value: serde_json::Value,
}

/// A named type declaration visible to the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    /// Fully qualified name, e.g. `src/models/user.ts#User`.
    pub qualified_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_parameters: Vec<TypeParam>,
    #[serde(flatten)]
    pub kind: TypeDeclKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TypeDeclKind {
    /// Interfaces and classes used as data shapes.
    Interface {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extends: Vec<TypeRef>,
        #[serde(default)]
        fields: Vec<FieldDecl>,
    },
    /// `type Name<T> = ...`
    Alias { target: TypeRef },
    Enum { members: Vec<EnumMember> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_undefined_from_union() {
        let ty = TypeRef::union(vec![TypeRef::keyword("string"), TypeRef::keyword("undefined")]);
        let (rest, had) = ty.strip_undefined();
        assert!(had);
        assert_eq!(rest, TypeRef::keyword("string"));

        let (same, had) = TypeRef::keyword("number").strip_undefined();
        assert!(!had);
        assert_eq!(same, TypeRef::keyword("number"));
    }

    #[test]
    fn deserialize_interface_declaration() {
        let decl: TypeDecl = serde_json::from_value(serde_json::json!({
            "name": "Page",
            "qualified_name": "models.ts#Page",
            "type_parameters": [{ "name": "T" }],
            "kind": "interface",
            "fields": [
                { "name": "items", "type": { "kind": "array", "element": { "kind": "type-parameter", "name": "T" } } },
                { "name": "next", "type": { "kind": "keyword", "name": "string" }, "optional": true }
            ]
        }))
        .unwrap();
        assert_eq!(decl.type_parameters.len(), 1);
        match decl.kind {
            TypeDeclKind::Interface { fields, extends } => {
                assert!(extends.is_empty());
                assert_eq!(fields.len(), 2);
                assert!(fields[1].optional);
            }
            other => panic!("expected interface, got {:?}", other),
        }
    }
}
