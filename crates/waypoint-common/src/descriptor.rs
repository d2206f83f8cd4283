use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Shared handle to a normalized type. Descriptors are immutable once built and
/// are shared between every definition that references the same declaration.
pub type DescriptorRef = Arc<TypeDescriptor>;

/// Scalar types with a direct wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    String,
    Number,
    Boolean,
    Date,
    Null,
    /// No value (`void` / `undefined`); mostly seen on return types.
    Void,
    /// Dynamic escape hatch (`any`, `unknown`, `object`).
    Any,
}

impl Primitive {
    pub fn display_name(self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Number => "number",
            Primitive::Boolean => "boolean",
            Primitive::Date => "Date",
            Primitive::Null => "null",
            Primitive::Void => "void",
            Primitive::Any => "any",
        }
    }
}

/// Value of a literal type (`"admin"`, `42`, `true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl LiteralValue {
    /// The primitive this literal widens to.
    pub fn primitive(&self) -> Primitive {
        match self {
            LiteralValue::Boolean(_) => Primitive::Boolean,
            LiteralValue::Number(_) => Primitive::Number,
            LiteralValue::String(_) => Primitive::String,
        }
    }

    /// Convert a JSON literal; objects, arrays, and null have no literal type.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(LiteralValue::Boolean(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(LiteralValue::Number),
            serde_json::Value::String(s) => Some(LiteralValue::String(s.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiteralValue::Boolean(b) => write!(f, "{}", b),
            LiteralValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            LiteralValue::Number(n) => write!(f, "{}", n),
            LiteralValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// One field of an object shape, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub descriptor: DescriptorRef,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An object-like shape (interface, DTO class, inline object literal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectShape {
    /// Stable identity: qualified declaration name plus the canonical
    /// type-argument tuple, or `<owner>.<field path>` for inline shapes.
    pub identity: String,
    /// Declared name; `None` for inline object literals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_arguments: Vec<DescriptorRef>,
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectShape {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Normalized, language-agnostic description of a static type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TypeDescriptor {
    Primitive {
        primitive: Primitive,
    },
    Literal {
        value: LiteralValue,
    },
    Array {
        element: DescriptorRef,
    },
    Object(ObjectShape),
    Union {
        members: Vec<DescriptorRef>,
    },
    /// Unbound type parameter, or a built-in dictionary shape with no fields.
    GenericReference {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        type_arguments: Vec<DescriptorRef>,
    },
    /// The value arrives asynchronously.
    Promise {
        inner: DescriptorRef,
    },
    /// Resolution deliberately not pursued.
    Opaque {
        name: String,
    },
    /// Back-pointer to the enclosing object with this identity.
    RecursiveReference {
        identity: String,
    },
}

impl TypeDescriptor {
    pub fn primitive(primitive: Primitive) -> DescriptorRef {
        Arc::new(TypeDescriptor::Primitive { primitive })
    }

    pub fn literal(value: LiteralValue) -> DescriptorRef {
        Arc::new(TypeDescriptor::Literal { value })
    }

    pub fn array(element: DescriptorRef) -> DescriptorRef {
        Arc::new(TypeDescriptor::Array { element })
    }

    pub fn promise(inner: DescriptorRef) -> DescriptorRef {
        Arc::new(TypeDescriptor::Promise { inner })
    }

    pub fn opaque(name: impl Into<String>) -> DescriptorRef {
        Arc::new(TypeDescriptor::Opaque { name: name.into() })
    }

    pub fn recursive(identity: impl Into<String>) -> DescriptorRef {
        Arc::new(TypeDescriptor::RecursiveReference {
            identity: identity.into(),
        })
    }

    pub fn generic_reference(
        name: impl Into<String>,
        type_arguments: Vec<DescriptorRef>,
    ) -> DescriptorRef {
        Arc::new(TypeDescriptor::GenericReference {
            name: name.into(),
            type_arguments,
        })
    }

    /// Build a union from already-resolved members.
    ///
    /// Nested unions are flattened, structurally equal members collapse to the
    /// first occurrence, and `true | false` widens to `boolean`. A union left
    /// with a single member is that member.
    pub fn union(members: impl IntoIterator<Item = DescriptorRef>) -> DescriptorRef {
        let mut flat: Vec<DescriptorRef> = Vec::new();
        for member in members {
            match member.as_ref() {
                TypeDescriptor::Union { members: nested } => {
                    for m in nested {
                        push_unique(&mut flat, m.clone());
                    }
                }
                _ => push_unique(&mut flat, member),
            }
        }

        let has_true = flat.iter().any(|m| m.is_literal(&LiteralValue::Boolean(true)));
        let has_false = flat.iter().any(|m| m.is_literal(&LiteralValue::Boolean(false)));
        if has_true && has_false {
            let boolean = TypeDescriptor::primitive(Primitive::Boolean);
            let mut widened = Vec::with_capacity(flat.len());
            for m in flat {
                if matches!(m.as_ref(), TypeDescriptor::Literal { value: LiteralValue::Boolean(_) }) {
                    push_unique(&mut widened, boolean.clone());
                } else {
                    push_unique(&mut widened, m);
                }
            }
            flat = widened;
        }

        if flat.len() == 1 {
            return flat.remove(0);
        }
        Arc::new(TypeDescriptor::Union { members: flat })
    }

    pub fn is_primitive(&self, primitive: Primitive) -> bool {
        matches!(self, TypeDescriptor::Primitive { primitive: p } if *p == primitive)
    }

    pub fn is_literal(&self, value: &LiteralValue) -> bool {
        matches!(self, TypeDescriptor::Literal { value: v } if v == value)
    }

    pub fn as_object(&self) -> Option<&ObjectShape> {
        match self {
            TypeDescriptor::Object(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn is_promise(&self) -> bool {
        matches!(self, TypeDescriptor::Promise { .. })
    }

    /// Visit this descriptor and every nested descriptor, depth-first.
    pub fn walk(&self, visit: &mut impl FnMut(&TypeDescriptor)) {
        visit(self);
        match self {
            TypeDescriptor::Array { element } => element.walk(visit),
            TypeDescriptor::Promise { inner } => inner.walk(visit),
            TypeDescriptor::Union { members } => {
                for m in members {
                    m.walk(visit);
                }
            }
            TypeDescriptor::GenericReference { type_arguments, .. } => {
                for a in type_arguments {
                    a.walk(visit);
                }
            }
            TypeDescriptor::Object(shape) => {
                for a in &shape.type_arguments {
                    a.walk(visit);
                }
                for f in &shape.fields {
                    f.descriptor.walk(visit);
                }
            }
            TypeDescriptor::Primitive { .. }
            | TypeDescriptor::Literal { .. }
            | TypeDescriptor::Opaque { .. }
            | TypeDescriptor::RecursiveReference { .. } => {}
        }
    }

    /// Identities of recursive references that point outside this descriptor.
    ///
    /// Empty for every descriptor that is safe to share out of context.
    pub fn open_references(&self) -> BTreeSet<String> {
        let mut open = BTreeSet::new();
        self.collect_open(&mut open);
        open
    }

    fn collect_open(&self, open: &mut BTreeSet<String>) {
        match self {
            TypeDescriptor::RecursiveReference { identity } => {
                open.insert(identity.clone());
            }
            TypeDescriptor::Object(shape) => {
                let mut inner = BTreeSet::new();
                for a in &shape.type_arguments {
                    a.collect_open(&mut inner);
                }
                for f in &shape.fields {
                    f.descriptor.collect_open(&mut inner);
                }
                inner.remove(&shape.identity);
                open.extend(inner);
            }
            TypeDescriptor::Array { element } => element.collect_open(open),
            TypeDescriptor::Promise { inner } => inner.collect_open(open),
            TypeDescriptor::Union { members } => {
                for m in members {
                    m.collect_open(open);
                }
            }
            TypeDescriptor::GenericReference { type_arguments, .. } => {
                for a in type_arguments {
                    a.collect_open(open);
                }
            }
            TypeDescriptor::Primitive { .. }
            | TypeDescriptor::Literal { .. }
            | TypeDescriptor::Opaque { .. } => {}
        }
    }

    /// Canonical human-readable rendering, also used to key generic instances.
    pub fn display_name(&self) -> String {
        match self {
            TypeDescriptor::Primitive { primitive } => primitive.display_name().to_string(),
            TypeDescriptor::Literal { value } => value.to_string(),
            TypeDescriptor::Array { element } => match element.as_ref() {
                TypeDescriptor::Union { .. } => format!("({})[]", element.display_name()),
                _ => format!("{}[]", element.display_name()),
            },
            TypeDescriptor::Object(shape) => match &shape.name {
                Some(name) => with_arguments(name, &shape.type_arguments),
                None => {
                    let fields: Vec<String> = shape
                        .fields
                        .iter()
                        .map(|f| {
                            let mark = if f.required { "" } else { "?" };
                            format!("{}{}: {}", f.name, mark, f.descriptor.display_name())
                        })
                        .collect();
                    format!("{{ {} }}", fields.join("; "))
                }
            },
            TypeDescriptor::Union { members } => {
                let parts: Vec<String> = members.iter().map(|m| m.display_name()).collect();
                parts.join(" | ")
            }
            TypeDescriptor::GenericReference {
                name,
                type_arguments,
            } => with_arguments(name, type_arguments),
            TypeDescriptor::Promise { inner } => format!("Promise<{}>", inner.display_name()),
            TypeDescriptor::Opaque { name } => name.clone(),
            TypeDescriptor::RecursiveReference { identity } => identity.clone(),
        }
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}

fn push_unique(members: &mut Vec<DescriptorRef>, candidate: DescriptorRef) {
    if !members.iter().any(|m| *m == candidate) {
        members.push(candidate);
    }
}

fn with_arguments(name: &str, args: &[DescriptorRef]) -> String {
    if args.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = args.iter().map(|a| a.display_name()).collect();
    format!("{}<{}>", name, rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string() -> DescriptorRef {
        TypeDescriptor::primitive(Primitive::String)
    }

    fn number() -> DescriptorRef {
        TypeDescriptor::primitive(Primitive::Number)
    }

    fn node_shape() -> DescriptorRef {
        Arc::new(TypeDescriptor::Object(ObjectShape {
            identity: "tree.ts#Node".into(),
            name: Some("Node".into()),
            type_arguments: Vec::new(),
            fields: vec![
                FieldDescriptor {
                    name: "value".into(),
                    descriptor: string(),
                    required: true,
                    description: None,
                },
                FieldDescriptor {
                    name: "children".into(),
                    descriptor: TypeDescriptor::array(TypeDescriptor::recursive("tree.ts#Node")),
                    required: false,
                    description: None,
                },
            ],
        }))
    }

    #[test]
    fn union_flattens_and_dedups() {
        let inner = TypeDescriptor::union(vec![string(), number()]);
        let outer = TypeDescriptor::union(vec![number(), inner, string()]);
        assert_eq!(outer.display_name(), "number | string");
    }

    #[test]
    fn union_of_one_is_the_member() {
        let u = TypeDescriptor::union(vec![string(), string()]);
        assert!(u.is_primitive(Primitive::String));
    }

    #[test]
    fn boolean_literals_widen() {
        let u = TypeDescriptor::union(vec![
            TypeDescriptor::literal(LiteralValue::Boolean(true)),
            TypeDescriptor::literal(LiteralValue::Boolean(false)),
            string(),
        ]);
        assert_eq!(u.display_name(), "boolean | string");
    }

    #[test]
    fn open_references_closed_by_owner() {
        let node = node_shape();
        assert!(node.open_references().is_empty());

        let dangling = TypeDescriptor::array(TypeDescriptor::recursive("tree.ts#Node"));
        assert_eq!(
            dangling.open_references().into_iter().collect::<Vec<_>>(),
            vec!["tree.ts#Node".to_string()]
        );
    }

    #[test]
    fn display_names() {
        let arr = TypeDescriptor::array(TypeDescriptor::union(vec![string(), number()]));
        assert_eq!(arr.display_name(), "(string | number)[]");
        assert_eq!(TypeDescriptor::promise(node_shape()).display_name(), "Promise<Node>");
        assert_eq!(
            TypeDescriptor::literal(LiteralValue::Number(1.0)).display_name(),
            "1"
        );
        assert_eq!(
            TypeDescriptor::literal(LiteralValue::String("a".into())).display_name(),
            "\"a\""
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(TypeDescriptor::array(string())).unwrap();
        assert_eq!(json["kind"], "array");
        assert_eq!(json["element"]["kind"], "primitive");
        assert_eq!(json["element"]["primitive"], "string");
    }

    #[test]
    fn walk_visits_nested() {
        let mut recursive = 0;
        node_shape().walk(&mut |d| {
            if matches!(d, TypeDescriptor::RecursiveReference { .. }) {
                recursive += 1;
            }
        });
        assert_eq!(recursive, 1);
    }

    fn member() -> impl proptest::strategy::Strategy<Value = DescriptorRef> {
        use proptest::prelude::*;
        prop_oneof![
            Just(string()),
            Just(number()),
            Just(TypeDescriptor::primitive(Primitive::Null)),
            any::<bool>().prop_map(|b| TypeDescriptor::literal(LiteralValue::Boolean(b))),
            (0u8..4).prop_map(|n| TypeDescriptor::literal(LiteralValue::Number(f64::from(n)))),
            Just(TypeDescriptor::union([string(), number()])),
        ]
    }

    proptest::proptest! {
        #[test]
        fn union_is_flat_and_distinct(members in proptest::collection::vec(member(), 1..8)) {
            let union = TypeDescriptor::union(members);
            if let TypeDescriptor::Union { members } = union.as_ref() {
                for (i, m) in members.iter().enumerate() {
                    let nested_union = matches!(m.as_ref(), TypeDescriptor::Union { .. });
                    proptest::prop_assert!(!nested_union);
                    proptest::prop_assert!(!members[i + 1..].contains(m));
                }
            }
            let again = match union.as_ref() {
                TypeDescriptor::Union { members } => TypeDescriptor::union(members.iter().cloned()),
                _ => TypeDescriptor::union([union.clone()]),
            };
            proptest::prop_assert_eq!(again, union);
        }
    }
}
