use serde::{Deserialize, Serialize};

use crate::descriptor::DescriptorRef;
use crate::span::Span;

/// HTTP verb of a handler. `Any` matches every verb not claimed by a more
/// specific handler on the same route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Any,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
        HttpMethod::Any,
    ];

    /// Parse a verb case-insensitively (`"get"`, `"GET"`, `"*"` for any).
    pub fn parse(verb: &str) -> Option<Self> {
        if verb == "*" {
            return Some(HttpMethod::Any);
        }
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(verb))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Any => "ANY",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter's runtime value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    Query,
    Body,
    Path,
    Header,
    Callback,
    Transport,
    Dependency,
}

impl std::fmt::Display for BindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BindingKind::Query => "query",
            BindingKind::Body => "body",
            BindingKind::Path => "path",
            BindingKind::Header => "header",
            BindingKind::Callback => "callback",
            BindingKind::Transport => "transport",
            BindingKind::Dependency => "dependency",
        };
        f.write_str(s)
    }
}

/// One bound handler parameter, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterBinding {
    /// External name (query key, header name, path token, injection token).
    pub name: String,
    /// Declared parameter name in the handler signature.
    pub parameter: String,
    /// Zero-based position in the handler signature.
    pub position: usize,
    pub kind: BindingKind,
    #[serde(rename = "type")]
    pub descriptor: DescriptorRef,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    /// Peer parameters this binding is only meaningful together with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The annotated method backing a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRef {
    pub class: String,
    pub qualified_class: String,
    pub method: String,
}

impl std::fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.class, self.method)
    }
}

/// One exposed API operation: a unique (verb, route) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedApiDefinition {
    pub verb: HttpMethod,
    /// Normalized route with `{name}` path tokens.
    pub route: String,
    /// Route with every token replaced by `{}`; shared by handlers that a
    /// router must dispatch together.
    pub route_key: String,
    pub handler: HandlerRef,
    pub return_type: DescriptorRef,
    pub is_async: bool,
    pub parameters: Vec<ParameterBinding>,
    /// Provider tags the handler requires from its class.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: Span,
}

impl ExtractedApiDefinition {
    pub fn parameter(&self, name: &str) -> Option<&ParameterBinding> {
        self.parameters.iter().find(|p| p.parameter == name)
    }
}

/// Handlers sharing one route-reduction key, for combined dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteGroup {
    pub route_key: String,
    /// Route of the first handler registered under this key.
    pub route: String,
    /// Verbs in registration order; `ANY` is always the fallback.
    pub verbs: Vec<HttpMethod>,
    /// Indices into the definition list.
    pub definitions: Vec<usize>,
}

impl RouteGroup {
    pub fn has_fallback(&self) -> bool {
        self.verbs.contains(&HttpMethod::Any)
    }
}

/// Everything downstream generators consume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiManifest {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub definitions: Vec<ExtractedApiDefinition>,
    pub routes: Vec<RouteGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_verbs() {
        assert_eq!(HttpMethod::parse("get"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("DELETE"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("*"), Some(HttpMethod::Any));
        assert_eq!(HttpMethod::parse("fetch"), None);
    }

    #[test]
    fn verbs_serialize_uppercase() {
        let json = serde_json::to_string(&HttpMethod::Patch).unwrap();
        assert_eq!(json, "\"PATCH\"");
        let kind = serde_json::to_string(&BindingKind::Dependency).unwrap();
        assert_eq!(kind, "\"dependency\"");
    }
}
