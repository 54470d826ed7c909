//! Attribute-indexed, process-scoped resource store.
//!
//! The store is intentionally schema-less: callers choose key names and
//! all parsing/validation of attribute values lives above this crate.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Instance,
    Volume,
    LaunchTemplate,
    LaunchTemplateVersion,
    AutoScalingGroup,
    SpotInstancesRequest,
    NetworkInterface,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instance",
            ResourceKind::Volume => "volume",
            ResourceKind::LaunchTemplate => "launch-template",
            ResourceKind::LaunchTemplateVersion => "launch-template-version",
            ResourceKind::AutoScalingGroup => "auto-scaling-group",
            ResourceKind::SpotInstancesRequest => "spot-instances-request",
            ResourceKind::NetworkInterface => "network-interface",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("resource {0} not found")]
    NotFound(String),
    #[error("resource {0} already exists")]
    AlreadyExists(String),
}

const TAG_PREFIX: &str = "tag:";

#[derive(Debug, Clone, Default)]
struct Entry {
    kind: ResourceKind,
    attrs: BTreeMap<String, Vec<String>>,
}

impl Default for ResourceKind {
    fn default() -> Self {
        ResourceKind::Instance
    }
}

#[derive(Clone, Default)]
pub struct ResourceStore {
    inner: Arc<RwLock<BTreeMap<String, Entry>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_resource(&self, kind: ResourceKind, id: &str) -> Result<(), StoreError> {
        let mut map = self.inner.write().unwrap();
        if map.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        map.insert(
            id.to_string(),
            Entry {
                kind,
                attrs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub fn remove_resource(&self, id: &str) -> Result<(), StoreError> {
        let mut map = self.inner.write().unwrap();
        map.remove(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().unwrap().contains_key(id)
    }

    /// Returns resources of `kind` in insertion order. Only meaningful where
    /// the caller doesn't need a stable sort of its own.
    pub fn registered_resources(&self, kind: ResourceKind) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.kind == kind)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Upsert. For each key present in `attrs`, all prior values for that
    /// key are replaced by the values supplied here. A tag key (`tag:...`)
    /// is truncated to its single latest value.
    pub fn set_resource_attributes(
        &self,
        id: &str,
        attrs: &[(String, String)],
    ) -> Result<(), StoreError> {
        let mut map = self.inner.write().unwrap();
        let entry = map.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut by_key: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in attrs {
            let values = by_key.entry(k.clone()).or_default();
            if !values.contains(v) {
                values.push(v.clone());
            }
        }
        for (key, mut values) in by_key {
            if key.starts_with(TAG_PREFIX) {
                values.truncate(0);
                values.push(
                    attrs
                        .iter()
                        .rev()
                        .find(|(k, _)| *k == key)
                        .map(|(_, v)| v.clone())
                        .unwrap(),
                );
            }
            entry.attrs.insert(key, values);
        }
        Ok(())
    }

    /// If a removal's value is empty, removes every attribute under that
    /// key. Otherwise removes only the exact `(key, value)` match. Missing
    /// keys are a no-op.
    pub fn remove_resource_attributes(
        &self,
        id: &str,
        attrs: &[(String, String)],
    ) -> Result<(), StoreError> {
        let mut map = self.inner.write().unwrap();
        let entry = map.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        for (key, value) in attrs {
            let Some(values) = entry.attrs.get_mut(key) else {
                continue;
            };
            if value.is_empty() {
                entry.attrs.remove(key);
            } else {
                values.retain(|v| v != value);
                if values.is_empty() {
                    entry.attrs.remove(key);
                }
            }
        }
        Ok(())
    }

    /// Snapshot read of every `(key, value)` pair for a resource. A
    /// multi-valued key is expanded into one pair per value, in insertion
    /// order.
    pub fn resource_attributes(&self, id: &str) -> Result<Vec<(String, String)>, StoreError> {
        let map = self.inner.read().unwrap();
        let entry = map.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(entry
            .attrs
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.clone(), v.clone())))
            .collect())
    }

    /// Convenience: the first (and for single-valued keys, only) value.
    pub fn resource_attribute(&self, id: &str, key: &str) -> Result<Option<String>, StoreError> {
        let map = self.inner.read().unwrap();
        let entry = map.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(entry.attrs.get(key).and_then(|vs| vs.first().cloned()))
    }

    pub fn resource_attribute_values(&self, id: &str, key: &str) -> Result<Vec<String>, StoreError> {
        let map = self.inner.read().unwrap();
        let entry = map.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(entry.attrs.get(key).cloned().unwrap_or_default())
    }

    pub fn resource_kind(&self, id: &str) -> Result<ResourceKind, StoreError> {
        let map = self.inner.read().unwrap();
        map.get(id).map(|e| e.kind).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// Common attribute key names used across lifecycle components. Kept here
/// (rather than scattered as string literals in `dc2-engine`) because the
/// store has no schema of its own and these are effectively its schema.
pub mod keys {
    pub const INSTANCE_STATE: &str = "InstanceState";
    pub const INSTANCE_LAUNCH_TIME: &str = "InstanceLaunchTime";
    pub const SPOT_REQUEST_STATE: &str = "SpotRequestState";
    pub const WARM_POOL_LIFECYCLE_STATE: &str = "WarmPoolLifecycleState";
    pub const STATE_TRANSITION_REASON: &str = "StateTransitionReason";
    pub const STATE_REASON_CODE: &str = "StateReasonCode";
    pub const DELETE_ON_TERMINATION: &str = "DeleteOnTermination";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_duplicate_fails() {
        let store = ResourceStore::new();
        store.register_resource(ResourceKind::Instance, "i-1").unwrap();
        assert_eq!(
            store.register_resource(ResourceKind::Instance, "i-1"),
            Err(StoreError::AlreadyExists("i-1".to_string()))
        );
    }

    #[test]
    fn tag_keys_keep_a_single_value() {
        let store = ResourceStore::new();
        store.register_resource(ResourceKind::Instance, "i-1").unwrap();
        store
            .set_resource_attributes(&"i-1".to_string(), &[("tag:foo".into(), "bar".into())])
            .unwrap();
        store
            .set_resource_attributes(&"i-1".to_string(), &[("tag:foo".into(), "baz".into())])
            .unwrap();
        let attrs = store.resource_attributes("i-1").unwrap();
        assert_eq!(attrs, vec![("tag:foo".to_string(), "baz".to_string())]);
    }

    #[test]
    fn remove_with_empty_value_clears_key() {
        let store = ResourceStore::new();
        store.register_resource(ResourceKind::Instance, "i-1").unwrap();
        store
            .set_resource_attributes("i-1", &[("tag:foo".into(), "bar".into())])
            .unwrap();
        store
            .remove_resource_attributes("i-1", &[("tag:foo".into(), "".into())])
            .unwrap();
        assert!(store.resource_attributes("i-1").unwrap().is_empty());
    }

    #[test]
    fn remove_exact_value_match_only() {
        let store = ResourceStore::new();
        store.register_resource(ResourceKind::Instance, "i-1").unwrap();
        store
            .set_resource_attributes("i-1", &[("Attachments".into(), "a".into())])
            .unwrap();
        store
            .remove_resource_attributes("i-1", &[("Attachments".into(), "b".into())])
            .unwrap();
        assert_eq!(
            store.resource_attribute("i-1", "Attachments").unwrap(),
            Some("a".to_string())
        );
    }

    #[test]
    fn missing_resource_is_not_found() {
        let store = ResourceStore::new();
        assert!(matches!(
            store.resource_attributes("i-nope"),
            Err(StoreError::NotFound(_))
        ));
    }
}
