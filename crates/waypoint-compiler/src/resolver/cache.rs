use std::collections::HashMap;
use std::sync::Arc;

use waypoint_common::{DescriptorRef, TypeDescriptor};

use super::ResolveError;

/// Memoized descriptors for one compilation, keyed by identity plus the
/// canonical type-argument tuple.
///
/// Only closed descriptors are stored: a cached descriptor never contains a
/// recursive reference to something outside itself.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: HashMap<String, DescriptorRef>,
    hits: usize,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key`, checking that an object entry carries that identity.
    pub fn get(&mut self, key: &str) -> Result<Option<DescriptorRef>, ResolveError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        if let TypeDescriptor::Object(shape) = entry.as_ref() {
            if shape.identity != key {
                return Err(ResolveError::Internal(format!(
                    "cache entry `{}` holds object `{}`",
                    key, shape.identity
                )));
            }
        }
        self.hits += 1;
        Ok(Some(Arc::clone(entry)))
    }

    /// Store a fully resolved descriptor.
    pub fn insert(&mut self, key: String, descriptor: DescriptorRef) -> Result<(), ResolveError> {
        let open = descriptor.open_references();
        if !open.is_empty() {
            return Err(ResolveError::Internal(format!(
                "refusing to cache `{}` with unterminated recursive references to {:?}",
                key, open
            )));
        }
        self.entries.insert(key, descriptor);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_common::descriptor::{ObjectShape, Primitive};

    fn object(identity: &str) -> DescriptorRef {
        Arc::new(TypeDescriptor::Object(ObjectShape {
            identity: identity.into(),
            name: Some("X".into()),
            type_arguments: Vec::new(),
            fields: Vec::new(),
        }))
    }

    #[test]
    fn hit_returns_shared_instance() {
        let mut cache = DescriptorCache::new();
        let d = object("a.ts#X");
        cache.insert("a.ts#X".into(), d.clone()).unwrap();
        let hit = cache.get("a.ts#X").unwrap().unwrap();
        assert!(Arc::ptr_eq(&d, &hit));
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn mismatched_identity_is_internal_error() {
        let mut cache = DescriptorCache::new();
        cache.insert("a.ts#Y".into(), object("a.ts#X")).unwrap();
        assert!(matches!(cache.get("a.ts#Y"), Err(ResolveError::Internal(_))));
    }

    #[test]
    fn open_descriptor_rejected() {
        let mut cache = DescriptorCache::new();
        let dangling = TypeDescriptor::array(TypeDescriptor::recursive("a.ts#X"));
        assert!(cache.insert("k".into(), dangling).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_resets() {
        let mut cache = DescriptorCache::new();
        cache
            .insert("p".into(), TypeDescriptor::primitive(Primitive::String))
            .unwrap();
        cache.clear();
        assert!(!cache.contains("p"));
        assert_eq!(cache.hits(), 0);
    }
}
