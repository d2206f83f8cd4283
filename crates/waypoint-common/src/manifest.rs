use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::annotation::AnnotationDefinition;

/// Default bound on nested generic instantiation while resolving types.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// The parsed Waypoint.toml manifest.
#[derive(Debug, Clone)]
pub struct WaypointManifest {
    pub project: ProjectSection,
    pub resolver: ResolverSection,
    /// User-defined annotations, registered after the built-ins.
    pub annotations: Vec<AnnotationDefinition>,
    /// The directory containing the Waypoint.toml file.
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSection {
    /// Type names never expanded (transport handles, framework contexts).
    #[serde(default)]
    pub opaque_types: Vec<String>,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            opaque_types: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Raw TOML structure for deserialization.
#[derive(Deserialize)]
struct RawManifest {
    project: ProjectSection,
    #[serde(default)]
    resolver: ResolverSection,
    #[serde(default)]
    annotations: Vec<AnnotationDefinition>,
}

/// Errors that can occur when loading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no Waypoint.toml found (searched from {0})")]
    NotFound(String),
    #[error("failed to read Waypoint.toml: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid Waypoint.toml: {0}")]
    ParseError(String),
    #[error("invalid Waypoint.toml: [resolver] max_depth must be at least 1")]
    ZeroDepth,
    #[error("invalid Waypoint.toml: annotation `{0}`: {1}")]
    InvalidAnnotation(String, String),
    #[error("invalid Waypoint.toml: annotation `{0}` is declared more than once")]
    DuplicateAnnotation(String),
}

/// Walk up from `start_dir` looking for `Waypoint.toml`.
/// Returns the path to the manifest file if found.
pub fn find_manifest(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join("Waypoint.toml");
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load and validate a Waypoint.toml manifest from a file path.
pub fn load_manifest(path: &Path) -> Result<WaypointManifest, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    let root_dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    parse_manifest(&content, root_dir)
}

/// Parse and validate a Waypoint.toml manifest from a string.
pub fn parse_manifest(content: &str, root_dir: PathBuf) -> Result<WaypointManifest, ManifestError> {
    let raw: RawManifest =
        toml::from_str(content).map_err(|e| ManifestError::ParseError(e.to_string()))?;

    if raw.resolver.max_depth == 0 {
        return Err(ManifestError::ZeroDepth);
    }

    let mut names = std::collections::HashSet::new();
    for def in &raw.annotations {
        def.check()
            .map_err(|reason| ManifestError::InvalidAnnotation(def.name.clone(), reason))?;
        if !names.insert(def.name.as_str()) {
            return Err(ManifestError::DuplicateAnnotation(def.name.clone()));
        }
    }

    Ok(WaypointManifest {
        project: raw.project,
        resolver: raw.resolver,
        annotations: raw.annotations,
        root_dir,
    })
}

/// Find and load the manifest starting from an input file's directory.
pub fn find_and_load_manifest(input_file: &Path) -> Result<WaypointManifest, ManifestError> {
    let start_dir = input_file.parent().unwrap_or_else(|| Path::new("."));
    let manifest_path = find_manifest(start_dir)
        .ok_or_else(|| ManifestError::NotFound(start_dir.display().to_string()))?;
    load_manifest(&manifest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationRole, DependencyScope, DependencyTarget, TypeRestriction};
    use crate::api::BindingKind;

    #[test]
    fn parse_minimal_manifest() {
        let toml = r#"
[project]
name = "petstore"
"#;
        let manifest = parse_manifest(toml, PathBuf::from(".")).unwrap();
        assert_eq!(manifest.project.name, "petstore");
        assert!(manifest.project.version.is_none());
        assert_eq!(manifest.resolver.max_depth, DEFAULT_MAX_DEPTH);
        assert!(manifest.resolver.opaque_types.is_empty());
        assert!(manifest.annotations.is_empty());
    }

    #[test]
    fn parse_full_manifest() {
        let toml = r#"
[project]
name = "petstore"
version = "1.2.0"

[resolver]
opaque_types = ["APIGatewayProxyEvent", "LambdaContext"]
max_depth = 8

[[annotations]]
name = "Tenant"
targets = ["parameter"]
role = { binding = "header" }
restrictions = ["string"]
arguments = [{ name = "header", type = "string", optional = true, metadata = "name" }]

[[annotations]]
name = "Audited"
targets = ["method"]
repeatable = true
dependencies = [{ target = { provider = "audit-log" }, scope = "parent" }]
"#;
        let manifest = parse_manifest(toml, PathBuf::from("/project")).unwrap();
        assert_eq!(manifest.project.version.as_deref(), Some("1.2.0"));
        assert_eq!(manifest.resolver.max_depth, 8);
        assert_eq!(manifest.resolver.opaque_types.len(), 2);
        assert_eq!(manifest.annotations.len(), 2);

        let tenant = &manifest.annotations[0];
        assert_eq!(tenant.role, AnnotationRole::Binding(BindingKind::Header));
        assert_eq!(tenant.restrictions, vec![TypeRestriction::String]);
        assert_eq!(tenant.arguments[0].metadata.as_deref(), Some("name"));

        let audited = &manifest.annotations[1];
        assert!(audited.repeatable);
        assert_eq!(
            audited.dependencies[0].target,
            DependencyTarget::Provider("audit-log".into())
        );
        assert_eq!(audited.dependencies[0].scope, DependencyScope::Enclosing);
    }

    #[test]
    fn missing_project_section_fails() {
        let toml = r#"
[resolver]
max_depth = 4
"#;
        let err = parse_manifest(toml, PathBuf::from(".")).unwrap_err().to_string();
        assert!(err.contains("invalid Waypoint.toml"), "got: {}", err);
    }

    #[test]
    fn zero_depth_rejected() {
        let toml = r#"
[project]
name = "x"

[resolver]
max_depth = 0
"#;
        let err = parse_manifest(toml, PathBuf::from(".")).unwrap_err();
        assert!(matches!(err, ManifestError::ZeroDepth));
    }

    #[test]
    fn unknown_restriction_rejected() {
        let toml = r#"
[project]
name = "x"

[[annotations]]
name = "Weird"
targets = ["parameter"]
role = { binding = "query" }
restrictions = ["tuple"]
"#;
        let err = parse_manifest(toml, PathBuf::from(".")).unwrap_err().to_string();
        assert!(err.contains("tuple"), "got: {}", err);
    }

    #[test]
    fn restrictions_on_marker_rejected() {
        let toml = r#"
[project]
name = "x"

[[annotations]]
name = "Note"
targets = ["parameter"]
restrictions = ["string"]
"#;
        let err = parse_manifest(toml, PathBuf::from(".")).unwrap_err().to_string();
        assert!(err.contains("annotation `Note`"), "got: {}", err);
    }

    #[test]
    fn duplicate_annotation_rejected() {
        let toml = r#"
[project]
name = "x"

[[annotations]]
name = "Note"
targets = ["method"]

[[annotations]]
name = "Note"
targets = ["class"]
"#;
        let err = parse_manifest(toml, PathBuf::from(".")).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateAnnotation(ref n) if n == "Note"));
    }

    #[test]
    fn find_manifest_walks_up() {
        let tmp = std::env::temp_dir().join("waypoint_test_manifest");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(tmp.join("build/units")).unwrap();
        std::fs::write(tmp.join("Waypoint.toml"), "[project]\nname = \"test\"\n").unwrap();

        let found = find_manifest(&tmp.join("build/units"));
        assert_eq!(found, Some(tmp.join("Waypoint.toml")));

        let loaded = find_and_load_manifest(&tmp.join("build/units/api.json")).unwrap();
        assert_eq!(loaded.project.name, "test");
        assert_eq!(loaded.root_dir, tmp);

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
