//! Route template normalization.
//!
//! Routes are `/`-separated segments with `{name}` path tokens. `:name`
//! segments are accepted on input and rewritten to `{name}`.

/// Normalize a route: leading `/`, no empty segments, no trailing `/`
/// (except the root itself), `:name` segments as `{name}`.
pub fn normalize(path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{}}}", name),
            _ => s.to_string(),
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Join a class base path and a method path into a normalized route.
pub fn join(base: &str, path: &str) -> String {
    normalize(&format!("{}/{}", base, path))
}

/// Route-reduction key: every `{token}` replaced by `{}`, so `/pets/{id}` and
/// `/pets/{petId}` dispatch through the same route.
pub fn route_key(route: &str) -> String {
    let mut key = String::with_capacity(route.len());
    let mut in_token = false;
    for c in route.chars() {
        match c {
            '{' => {
                in_token = true;
                key.push_str("{}");
            }
            '}' if in_token => in_token = false,
            _ if in_token => {}
            _ => key.push(c),
        }
    }
    key
}

/// Path token names in order of appearance.
pub fn tokens(route: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = route;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                out.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    out
}
