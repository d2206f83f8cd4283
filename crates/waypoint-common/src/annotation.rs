use serde::{Deserialize, Serialize};

use crate::api::{BindingKind, HttpMethod};
use crate::descriptor::{Primitive, TypeDescriptor};

/// Declaration kinds an annotation may be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationTarget {
    Class,
    Method,
    Parameter,
    /// A constructor parameter (dependency injection sites).
    Constructor,
}

impl std::fmt::Display for AnnotationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnnotationTarget::Class => "class",
            AnnotationTarget::Method => "method",
            AnnotationTarget::Parameter => "parameter",
            AnnotationTarget::Constructor => "constructor parameter",
        };
        f.write_str(s)
    }
}

/// Semantic type of one annotation argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgumentType {
    String,
    Number,
    Boolean,
    Object,
    /// A bare identifier (class or token reference); string literals also accepted.
    Identifier,
    #[default]
    Any,
}

impl std::fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArgumentType::String => "string",
            ArgumentType::Number => "number",
            ArgumentType::Boolean => "boolean",
            ArgumentType::Object => "object",
            ArgumentType::Identifier => "identifier",
            ArgumentType::Any => "any",
        };
        f.write_str(s)
    }
}

/// Value checks applied to an argument after its semantic type matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgumentValidator {
    /// A route template: empty or starting with `/`, balanced `{token}`s.
    RoutePath,
    /// An HTTP verb name.
    HttpMethod,
    /// An integer status code in 100..=599.
    HttpStatus,
    /// A non-empty string.
    NonEmpty,
}

/// Shape of one positional annotation argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: ArgumentType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<ArgumentValidator>,
    /// Metadata key the argument value is extracted under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    /// Value recorded under `metadata` when the argument is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ArgumentSpec {
    pub fn required(name: impl Into<String>, ty: ArgumentType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            validator: None,
            metadata: None,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ArgumentType) -> Self {
        Self {
            optional: true,
            ..Self::required(name, ty)
        }
    }

    pub fn validator(mut self, validator: ArgumentValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>) -> Self {
        self.metadata = Some(key.into());
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// What a dependency must find.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyTarget {
    /// A declaration carrying the named annotation.
    Annotation(String),
    /// A declaration providing the tag.
    Provider(String),
    /// A declaration providing the tag given by the argument at this position.
    ProviderArgument(usize),
    /// A declaration whose name is given by the argument at this position.
    DeclarationArgument(usize),
}

/// Where a dependency is searched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyScope {
    /// The enclosing declarations (parent, grandparent, ...).
    #[default]
    #[serde(alias = "parent")]
    Enclosing,
    /// Siblings under the same parent.
    Peer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationDependency {
    pub target: DependencyTarget,
    #[serde(default)]
    pub scope: DependencyScope,
}

/// The role an annotation plays on its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationRole {
    /// Exposes a method as a handler. A `method` metadata value overrides the verb.
    Route(HttpMethod),
    /// Declares where a parameter's value comes from.
    Binding(BindingKind),
    /// Adds metadata only.
    #[default]
    Marker,
}

/// How the annotated declaration's type is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeResolution {
    #[default]
    Full,
    /// Record the type's name only (services, transport handles, callbacks).
    Opaque,
}

/// A permitted shape for a bound parameter's resolved type.
///
/// Written as `string`, `number`, `boolean`, `date`, `object`, `opaque`, or
/// `array<...>` in manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeRestriction {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Opaque,
    ArrayOf(Box<TypeRestriction>),
}

impl TypeRestriction {
    pub fn array_of(element: TypeRestriction) -> Self {
        TypeRestriction::ArrayOf(Box::new(element))
    }

    /// Whether a single (non-union) descriptor satisfies this restriction.
    pub fn matches(&self, descriptor: &TypeDescriptor) -> bool {
        match (self, descriptor) {
            (_, TypeDescriptor::Primitive { primitive: Primitive::Any }) => true,
            (TypeRestriction::String, d) => widens_to(d, Primitive::String),
            (TypeRestriction::Number, d) => widens_to(d, Primitive::Number),
            (TypeRestriction::Boolean, d) => widens_to(d, Primitive::Boolean),
            (TypeRestriction::Date, d) => d.is_primitive(Primitive::Date),
            (
                TypeRestriction::Object,
                TypeDescriptor::Object(_)
                | TypeDescriptor::GenericReference { .. }
                | TypeDescriptor::RecursiveReference { .. },
            ) => true,
            (TypeRestriction::Opaque, TypeDescriptor::Opaque { .. }) => true,
            (TypeRestriction::ArrayOf(inner), TypeDescriptor::Array { element }) => {
                permits(std::slice::from_ref(inner.as_ref()), element)
            }
            _ => false,
        }
    }
}

/// Whether `descriptor` satisfies at least one restriction. Every member of a
/// union must be permitted; `null` and `void` members are ignored since they
/// only express optionality, but at least one other member must remain.
pub fn permits(restrictions: &[TypeRestriction], descriptor: &TypeDescriptor) -> bool {
    if restrictions.is_empty() {
        return true;
    }
    match descriptor {
        TypeDescriptor::Union { members } => {
            let mut valued = members
                .iter()
                .filter(|m| !m.is_primitive(Primitive::Null) && !m.is_primitive(Primitive::Void))
                .peekable();
            valued.peek().is_some() && valued.all(|m| restrictions.iter().any(|r| r.matches(m)))
        }
        other => restrictions.iter().any(|r| r.matches(other)),
    }
}

fn widens_to(descriptor: &TypeDescriptor, primitive: Primitive) -> bool {
    match descriptor {
        TypeDescriptor::Primitive { primitive: p } => *p == primitive,
        TypeDescriptor::Literal { value } => value.primitive() == primitive,
        _ => false,
    }
}

impl std::fmt::Display for TypeRestriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRestriction::String => f.write_str("string"),
            TypeRestriction::Number => f.write_str("number"),
            TypeRestriction::Boolean => f.write_str("boolean"),
            TypeRestriction::Date => f.write_str("date"),
            TypeRestriction::Object => f.write_str("object"),
            TypeRestriction::Opaque => f.write_str("opaque"),
            TypeRestriction::ArrayOf(inner) => write!(f, "array<{}>", inner),
        }
    }
}

impl std::str::FromStr for TypeRestriction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s
            .strip_prefix("array<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return Ok(TypeRestriction::array_of(inner.parse()?));
        }
        match s {
            "string" => Ok(TypeRestriction::String),
            "number" => Ok(TypeRestriction::Number),
            "boolean" => Ok(TypeRestriction::Boolean),
            "date" => Ok(TypeRestriction::Date),
            "object" => Ok(TypeRestriction::Object),
            "opaque" => Ok(TypeRestriction::Opaque),
            other => Err(format!("unknown type restriction `{}`", other)),
        }
    }
}

impl TryFrom<String> for TypeRestriction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TypeRestriction> for String {
    fn from(value: TypeRestriction) -> Self {
        value.to_string()
    }
}

/// Static description of one recognized annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDefinition {
    pub name: String,
    pub targets: Vec<AnnotationTarget>,
    #[serde(default)]
    pub role: AnnotationRole,
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
    #[serde(default)]
    pub dependencies: Vec<AnnotationDependency>,
    /// Provider tags contributed by the annotated declaration.
    #[serde(default)]
    pub provides: Vec<String>,
    /// Position of an argument whose value is also a provider tag.
    #[serde(default)]
    pub provides_argument: Option<usize>,
    #[serde(default)]
    pub restrictions: Vec<TypeRestriction>,
    #[serde(default)]
    pub resolution: TypeResolution,
    #[serde(default)]
    pub repeatable: bool,
}

impl AnnotationDefinition {
    pub fn new(name: impl Into<String>, targets: &[AnnotationTarget]) -> Self {
        Self {
            name: name.into(),
            targets: targets.to_vec(),
            role: AnnotationRole::Marker,
            arguments: Vec::new(),
            dependencies: Vec::new(),
            provides: Vec::new(),
            provides_argument: None,
            restrictions: Vec::new(),
            resolution: TypeResolution::Full,
            repeatable: false,
        }
    }

    pub fn role(mut self, role: AnnotationRole) -> Self {
        self.role = role;
        self
    }

    pub fn argument(mut self, spec: ArgumentSpec) -> Self {
        self.arguments.push(spec);
        self
    }

    pub fn depends_on(mut self, target: DependencyTarget, scope: DependencyScope) -> Self {
        self.dependencies.push(AnnotationDependency { target, scope });
        self
    }

    pub fn provides(mut self, tag: impl Into<String>) -> Self {
        self.provides.push(tag.into());
        self
    }

    pub fn provides_argument(mut self, position: usize) -> Self {
        self.provides_argument = Some(position);
        self
    }

    pub fn restrict(mut self, restrictions: Vec<TypeRestriction>) -> Self {
        self.restrictions = restrictions;
        self
    }

    pub fn opaque(mut self) -> Self {
        self.resolution = TypeResolution::Opaque;
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn applies_to(&self, target: AnnotationTarget) -> bool {
        self.targets.contains(&target)
    }

    pub fn binding(&self) -> Option<BindingKind> {
        match self.role {
            AnnotationRole::Binding(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn route_verb(&self) -> Option<HttpMethod> {
        match self.role {
            AnnotationRole::Route(verb) => Some(verb),
            _ => None,
        }
    }

    /// Number of arguments that must be supplied.
    pub fn required_arguments(&self) -> usize {
        self.arguments.iter().filter(|a| !a.optional).count()
    }

    /// Check internal consistency; used for definitions loaded from manifests.
    pub fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("annotation name must not be empty".to_string());
        }
        if self.targets.is_empty() {
            return Err("at least one target is required".to_string());
        }
        let mut seen_optional = false;
        for arg in &self.arguments {
            if arg.optional {
                seen_optional = true;
            } else if seen_optional {
                return Err(format!(
                    "required argument `{}` follows an optional argument",
                    arg.name
                ));
            }
        }
        let arity = self.arguments.len();
        let positions = self
            .dependencies
            .iter()
            .filter_map(|d| match d.target {
                DependencyTarget::ProviderArgument(i) | DependencyTarget::DeclarationArgument(i) => {
                    Some(i)
                }
                _ => None,
            })
            .chain(self.provides_argument);
        for position in positions {
            if position >= arity {
                return Err(format!(
                    "argument position {} is out of range ({} arguments declared)",
                    position, arity
                ));
            }
        }
        match self.role {
            AnnotationRole::Binding(_)
                if !self.applies_to(AnnotationTarget::Parameter)
                    && !self.applies_to(AnnotationTarget::Constructor) =>
            {
                Err("binding annotations must target parameters".to_string())
            }
            AnnotationRole::Route(_) if !self.applies_to(AnnotationTarget::Method) => {
                Err("route annotations must target methods".to_string())
            }
            AnnotationRole::Marker if !self.restrictions.is_empty() => {
                Err("type restrictions require a binding role".to_string())
            }
            _ => Ok(()),
        }
    }
}
