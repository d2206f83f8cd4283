use std::collections::HashMap;

use waypoint_common::DescriptorRef;

/// Per-call resolution state: which declarations are being expanded, the
/// generic environment of the innermost one, and where inline shapes sit.
#[derive(Debug)]
pub struct ResolutionContext {
    /// Label of the declaration site that started resolution, e.g.
    /// `PetController.create(body)`. Owns inline shapes outside any declaration.
    origin: String,
    /// Identity keys currently being expanded, outermost first.
    pub(crate) stack: Vec<Frame>,
    /// Type parameter bindings of the innermost declaration.
    pub(crate) env: HashMap<String, DescriptorRef>,
    /// Field names walked since the innermost declaration.
    pub(crate) field_path: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub identity: String,
    pub generic: bool,
}

/// State swapped out while a declaration is expanded.
pub(crate) struct Saved {
    env: HashMap<String, DescriptorRef>,
    field_path: Vec<String>,
}

impl ResolutionContext {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            stack: Vec::new(),
            env: HashMap::new(),
            field_path: Vec::new(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether `identity` is an ancestor of the current resolution point.
    pub fn is_expanding(&self, identity: &str) -> bool {
        self.stack.iter().any(|f| f.identity == identity)
    }

    /// Number of nested generic instantiations on the stack.
    pub fn generic_depth(&self) -> usize {
        self.stack.iter().filter(|f| f.generic).count()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn enter(
        &mut self,
        identity: String,
        generic: bool,
        env: HashMap<String, DescriptorRef>,
    ) -> Saved {
        self.stack.push(Frame { identity, generic });
        Saved {
            env: std::mem::replace(&mut self.env, env),
            field_path: std::mem::take(&mut self.field_path),
        }
    }

    pub(crate) fn exit(&mut self, saved: Saved) {
        self.stack.pop();
        self.env = saved.env;
        self.field_path = saved.field_path;
    }

    /// Identity for an inline object literal at the current field path.
    pub(crate) fn anonymous_identity(&self) -> String {
        let owner = self
            .stack
            .last()
            .map(|f| f.identity.as_str())
            .unwrap_or(&self.origin);
        if self.field_path.is_empty() {
            owner.to_string()
        } else {
            format!("{}.{}", owner, self.field_path.join("."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_common::{Primitive, TypeDescriptor};

    #[test]
    fn enter_and_exit_restore_state() {
        let mut ctx = ResolutionContext::new("Api.get(q)");
        ctx.field_path.push("outer".into());
        let mut env = HashMap::new();
        env.insert("T".to_string(), TypeDescriptor::primitive(Primitive::String));

        let saved = ctx.enter("m.ts#Box<string>".into(), true, env);
        assert!(ctx.is_expanding("m.ts#Box<string>"));
        assert_eq!(ctx.generic_depth(), 1);
        assert!(ctx.field_path.is_empty());
        assert!(ctx.env.contains_key("T"));

        ctx.exit(saved);
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.env.is_empty());
        assert_eq!(ctx.field_path, vec!["outer".to_string()]);
    }

    #[test]
    fn anonymous_identity_uses_owner_and_path() {
        let mut ctx = ResolutionContext::new("Api.create(body)");
        assert_eq!(ctx.anonymous_identity(), "Api.create(body)");
        ctx.field_path.push("meta".into());
        assert_eq!(ctx.anonymous_identity(), "Api.create(body).meta");

        let saved = ctx.enter("m.ts#Page".into(), false, HashMap::new());
        ctx.field_path.push("links".into());
        assert_eq!(ctx.anonymous_identity(), "m.ts#Page.links");
        ctx.exit(saved);
    }
}
