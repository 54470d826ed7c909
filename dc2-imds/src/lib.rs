//! IMDS Proxy Controller: serves per-instance metadata and the spot
//! interruption signal on the link-local metadata endpoint. The real
//! per-container network plumbing that makes `169.254.169.254:80` reachable
//! only from inside an instance's own container is out of scope (`spec.md`
//! §1); this crate provides the trait `dc2-engine` drives plus an
//! in-memory implementation and an axum router serving the paths in
//! `spec.md` §6 at the fidelity needed to exercise the engine end-to-end.

mod router;

pub use router::{ImdsRouterState, imds_router};

use std::collections::BTreeMap;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotAction {
    pub action: &'static str,
    /// RFC3339 reclaim time.
    pub time: String,
}

#[derive(Debug, Clone, Default)]
pub struct InstanceIdentity {
    pub instance_id: String,
    pub instance_type: String,
    pub availability_zone: String,
    pub ami_id: String,
    pub local_ipv4: String,
    pub public_ipv4: Option<String>,
    pub mac: String,
    pub hostname: String,
    pub user_data: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImdsError {
    #[error("no identity registered for instance")]
    NotRegistered,
}

/// Everything `dc2-engine` needs to drive the metadata proxy for a single
/// simulated fleet.
#[async_trait]
pub trait ImdsProxy: Send + Sync {
    async fn register_instance(&self, identity: InstanceIdentity);
    async fn deregister_instance(&self, instance_id: &str);
    async fn set_metadata_enabled(&self, instance_id: &str, enabled: bool);
    async fn set_spot_action(&self, instance_id: &str, action: SpotAction);
    async fn clear_spot_action(&self, instance_id: &str);
}

struct InstanceEntry {
    identity: InstanceIdentity,
    metadata_enabled: bool,
    /// Bumped whenever metadata is disabled; invalidates outstanding tokens.
    token_generation: u64,
    spot_action: Option<SpotAction>,
}

struct TokenEntry {
    instance_id: String,
    generation: u64,
    expires_at: std::time::Instant,
}

/// In-memory proxy state, shared between the engine (which registers and
/// mutates identities) and the axum router (which answers instance-side
/// reads).
#[derive(Clone, Default)]
pub struct InMemoryImdsProxy {
    inner: std::sync::Arc<std::sync::RwLock<BTreeMap<String, InstanceEntry>>>,
    tokens: std::sync::Arc<std::sync::RwLock<BTreeMap<String, TokenEntry>>>,
}

impl InMemoryImdsProxy {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(&self, instance_id: &str, f: impl FnOnce(&InstanceEntry) -> T) -> Option<T> {
        self.inner.read().unwrap().get(instance_id).map(f)
    }

    pub(crate) fn snapshot(&self, instance_id: &str) -> Option<(InstanceIdentity, bool, u64, Option<SpotAction>)> {
        self.with_entry(instance_id, |e| {
            (e.identity.clone(), e.metadata_enabled, e.token_generation, e.spot_action.clone())
        })
    }

    /// Issues an opaque token for `instance_id` valid for `ttl_secs`.
    /// Returns `None` if the instance is unregistered or metadata access is
    /// currently disabled.
    pub(crate) fn issue_token(&self, instance_id: &str, ttl_secs: u64) -> Option<String> {
        let generation = {
            let map = self.inner.read().unwrap();
            let entry = map.get(instance_id)?;
            if !entry.metadata_enabled {
                return None;
            }
            entry.token_generation
        };
        let token = {
            use rand::RngCore;
            let mut buf = [0u8; 20];
            rand::rng().fill_bytes(&mut buf);
            buf.iter().map(|b| format!("{b:02x}")).collect::<String>()
        };
        self.tokens.write().unwrap().insert(
            token.clone(),
            TokenEntry {
                instance_id: instance_id.to_string(),
                generation,
                expires_at: std::time::Instant::now() + std::time::Duration::from_secs(ttl_secs),
            },
        );
        Some(token)
    }

    /// Validates a token against the instance's current generation and
    /// expiry, returning the instance id it was issued for.
    pub(crate) fn validate_token(&self, token: &str) -> Option<String> {
        let tokens = self.tokens.read().unwrap();
        let entry = tokens.get(token)?;
        if entry.expires_at < std::time::Instant::now() {
            return None;
        }
        let map = self.inner.read().unwrap();
        let instance = map.get(&entry.instance_id)?;
        if !instance.metadata_enabled || instance.token_generation != entry.generation {
            return None;
        }
        Some(entry.instance_id.clone())
    }
}

#[async_trait]
impl ImdsProxy for InMemoryImdsProxy {
    async fn register_instance(&self, identity: InstanceIdentity) {
        let mut map = self.inner.write().unwrap();
        map.insert(
            identity.instance_id.clone(),
            InstanceEntry {
                identity,
                metadata_enabled: true,
                token_generation: 0,
                spot_action: None,
            },
        );
    }

    async fn deregister_instance(&self, instance_id: &str) {
        self.inner.write().unwrap().remove(instance_id);
    }

    async fn set_metadata_enabled(&self, instance_id: &str, enabled: bool) {
        let mut map = self.inner.write().unwrap();
        if let Some(entry) = map.get_mut(instance_id) {
            if entry.metadata_enabled && !enabled {
                entry.token_generation += 1;
            }
            entry.metadata_enabled = enabled;
        }
    }

    async fn set_spot_action(&self, instance_id: &str, action: SpotAction) {
        let mut map = self.inner.write().unwrap();
        if let Some(entry) = map.get_mut(instance_id) {
            entry.spot_action = Some(action);
        }
    }

    async fn clear_spot_action(&self, instance_id: &str) {
        let mut map = self.inner.write().unwrap();
        if let Some(entry) = map.get_mut(instance_id) {
            entry.spot_action = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabling_metadata_bumps_token_generation() {
        let proxy = InMemoryImdsProxy::new();
        proxy
            .register_instance(InstanceIdentity {
                instance_id: "i-1".into(),
                ..Default::default()
            })
            .await;
        let (_, _, gen0, _) = proxy.snapshot("i-1").unwrap();
        assert_eq!(gen0, 0);
        proxy.set_metadata_enabled("i-1", false).await;
        let (_, enabled, gen1, _) = proxy.snapshot("i-1").unwrap();
        assert!(!enabled);
        assert_eq!(gen1, 1);
    }

    #[tokio::test]
    async fn spot_action_round_trips() {
        let proxy = InMemoryImdsProxy::new();
        proxy
            .register_instance(InstanceIdentity { instance_id: "i-1".into(), ..Default::default() })
            .await;
        proxy
            .set_spot_action("i-1", SpotAction { action: "terminate", time: "2026-01-01T00:00:00Z".into() })
            .await;
        let (_, _, _, action) = proxy.snapshot("i-1").unwrap();
        assert_eq!(action.unwrap().action, "terminate");
        proxy.clear_spot_action("i-1").await;
        let (_, _, _, action) = proxy.snapshot("i-1").unwrap();
        assert!(action.is_none());
    }
}
