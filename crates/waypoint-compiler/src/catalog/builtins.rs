use serde_json::json;
use waypoint_common::annotation::{
    AnnotationRole, ArgumentSpec, ArgumentType, ArgumentValidator, DependencyScope,
    DependencyTarget,
};
use waypoint_common::{AnnotationDefinition, AnnotationTarget, BindingKind, HttpMethod, TypeRestriction};

use AnnotationTarget::{Class, Constructor, Method, Parameter};

/// Metadata keys the walker and assembler read.
pub mod keys {
    pub const BASE_PATH: &str = "basePath";
    pub const PATH: &str = "path";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const DESCRIPTION: &str = "description";
    pub const NAME: &str = "name";
    pub const VALIDATOR: &str = "validator";
}

fn route_path() -> ArgumentSpec {
    ArgumentSpec::optional("path", ArgumentType::String)
        .validator(ArgumentValidator::RoutePath)
        .metadata(keys::PATH)
        .default_value(json!(""))
}

fn binding_name(optional: bool) -> ArgumentSpec {
    let spec = if optional {
        ArgumentSpec::optional("name", ArgumentType::String)
    } else {
        ArgumentSpec::required("name", ArgumentType::String)
    };
    spec.validator(ArgumentValidator::NonEmpty).metadata(keys::NAME)
}

fn verb(name: &str, method: HttpMethod) -> AnnotationDefinition {
    AnnotationDefinition::new(name, &[Method])
        .role(AnnotationRole::Route(method))
        .argument(route_path())
}

pub fn builtin_definitions() -> Vec<AnnotationDefinition> {
    use TypeRestriction as R;

    let scalar = || vec![R::String, R::Number, R::Boolean, R::Date];

    let mut query = scalar();
    query.extend(scalar().into_iter().map(R::array_of));

    vec![
        AnnotationDefinition::new("Api", &[Class])
            .provides("api")
            .argument(
                ArgumentSpec::optional("basePath", ArgumentType::String)
                    .validator(ArgumentValidator::RoutePath)
                    .metadata(keys::BASE_PATH)
                    .default_value(json!("")),
            ),
        AnnotationDefinition::new("Provide", &[Class])
            .argument(
                ArgumentSpec::required("tag", ArgumentType::Identifier)
                    .validator(ArgumentValidator::NonEmpty),
            )
            .provides_argument(0)
            .repeatable(),
        verb("Get", HttpMethod::Get),
        verb("Post", HttpMethod::Post),
        verb("Put", HttpMethod::Put),
        verb("Patch", HttpMethod::Patch),
        verb("Delete", HttpMethod::Delete),
        verb("Head", HttpMethod::Head),
        verb("Options", HttpMethod::Options),
        AnnotationDefinition::new("Route", &[Method])
            .role(AnnotationRole::Route(HttpMethod::Any))
            .argument(
                ArgumentSpec::required("method", ArgumentType::Identifier)
                    .validator(ArgumentValidator::HttpMethod)
                    .metadata(keys::METHOD),
            )
            .argument(route_path()),
        AnnotationDefinition::new("Status", &[Method]).argument(
            ArgumentSpec::required("code", ArgumentType::Number)
                .validator(ArgumentValidator::HttpStatus)
                .metadata(keys::STATUS),
        ),
        AnnotationDefinition::new("Description", &[Class, Method, Parameter]).argument(
            ArgumentSpec::required("text", ArgumentType::String).metadata(keys::DESCRIPTION),
        ),
        AnnotationDefinition::new("Uses", &[Method])
            .argument(
                ArgumentSpec::required("tag", ArgumentType::Identifier)
                    .validator(ArgumentValidator::NonEmpty),
            )
            .depends_on(DependencyTarget::ProviderArgument(0), DependencyScope::Enclosing)
            .repeatable(),
        AnnotationDefinition::new("Query", &[Parameter])
            .role(AnnotationRole::Binding(BindingKind::Query))
            .argument(binding_name(true))
            .restrict(query),
        AnnotationDefinition::new("Path", &[Parameter])
            .role(AnnotationRole::Binding(BindingKind::Path))
            .argument(binding_name(true))
            .restrict(vec![R::String, R::Number, R::Date]),
        AnnotationDefinition::new("Header", &[Parameter])
            .role(AnnotationRole::Binding(BindingKind::Header))
            .argument(binding_name(false))
            .restrict(vec![R::String, R::Number, R::Boolean]),
        AnnotationDefinition::new("Body", &[Parameter])
            .role(AnnotationRole::Binding(BindingKind::Body)),
        AnnotationDefinition::new("Callback", &[Parameter])
            .role(AnnotationRole::Binding(BindingKind::Callback))
            .argument(binding_name(true))
            .opaque(),
        AnnotationDefinition::new("Transport", &[Parameter])
            .role(AnnotationRole::Binding(BindingKind::Transport))
            .opaque(),
        AnnotationDefinition::new("Inject", &[Parameter, Constructor])
            .role(AnnotationRole::Binding(BindingKind::Dependency))
            .argument(
                ArgumentSpec::optional("token", ArgumentType::Identifier)
                    .validator(ArgumentValidator::NonEmpty)
                    .metadata(keys::NAME),
            )
            .depends_on(DependencyTarget::ProviderArgument(0), DependencyScope::Enclosing)
            .opaque(),
        AnnotationDefinition::new("DependsOn", &[Parameter])
            .argument(
                ArgumentSpec::required("parameter", ArgumentType::Identifier)
                    .validator(ArgumentValidator::NonEmpty),
            )
            .depends_on(DependencyTarget::DeclarationArgument(0), DependencyScope::Peer)
            .repeatable(),
        AnnotationDefinition::new("Validate", &[Parameter]).argument(
            ArgumentSpec::required("validator", ArgumentType::Identifier)
                .validator(ArgumentValidator::NonEmpty)
                .metadata(keys::VALIDATOR),
        ),
    ]
}
