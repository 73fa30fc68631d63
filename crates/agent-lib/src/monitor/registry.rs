//! Registration store
//!
//! Registrations are keyed by owning channel and service. Several channels
//! may register the same service; it is still monitored by a single loop,
//! which notifies every owner. The store can be backed by a JSON state file
//! so that monitoring resumes after a restart.

use crate::error::{MonitorError, MonitorResult};
use crate::models::{ChannelRef, Registration, ServiceRef};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

type RegistrationKey = (ChannelRef, ServiceRef);

/// Source of truth for which services are monitored
#[async_trait]
pub trait Registry: Send + Sync {
    /// Add a registration; fails with `AlreadyRegistered` if this channel already owns the service
    async fn insert(&self, registration: Registration) -> MonitorResult<()>;

    /// Remove a registration owned by `channel`; fails with `NotFound` otherwise
    async fn remove(&self, channel: &ChannelRef, service: &ServiceRef)
        -> MonitorResult<Registration>;

    /// Every registration of a service, one per owning channel
    async fn owners(&self, service: &ServiceRef) -> MonitorResult<Vec<Registration>>;

    /// True while at least one channel owns the service
    async fn is_registered(&self, service: &ServiceRef) -> MonitorResult<bool> {
        Ok(!self.owners(service).await?.is_empty())
    }

    async fn list(&self) -> MonitorResult<Vec<Registration>>;
}

/// In-process registry with optional file persistence
pub struct ServiceRegistry {
    entries: DashMap<RegistrationKey, Registration>,
    state_path: Option<PathBuf>,
    /// Serializes writes of the state file
    write_lock: Mutex<()>,
}

impl ServiceRegistry {
    pub fn in_memory() -> Self {
        Self {
            entries: DashMap::new(),
            state_path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Open a file-backed registry, loading existing registrations if the file exists
    pub async fn open(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = DashMap::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let stored: Vec<Registration> = serde_json::from_slice(&bytes).map_err(|e| {
                    MonitorError::Registry(format!("corrupt state file {}: {}", path.display(), e))
                })?;
                for registration in stored {
                    entries.insert(key_of(&registration), registration);
                }
                info!(
                    path = %path.display(),
                    registrations = entries.len(),
                    "Loaded registrations"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file yet, starting empty");
            }
            Err(e) => {
                return Err(MonitorError::Registry(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        Ok(Self {
            entries,
            state_path: Some(path),
            write_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn snapshot(&self) -> Vec<Registration> {
        let mut all: Vec<Registration> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| {
            a.service
                .cmp(&b.service)
                .then_with(|| a.channel.cmp(&b.channel))
        });
        all
    }

    /// Write the current registrations to the state file, if any
    async fn persist(&self) -> MonitorResult<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;

        let body = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|e| MonitorError::Registry(format!("failed to encode state: {}", e)))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| MonitorError::Registry(format!("failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| MonitorError::Registry(format!("failed to replace {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl Registry for ServiceRegistry {
    async fn insert(&self, registration: Registration) -> MonitorResult<()> {
        let key = key_of(&registration);
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => return Err(MonitorError::AlreadyRegistered(key.1)),
            Entry::Vacant(slot) => {
                slot.insert(registration);
            }
        }

        if let Err(e) = self.persist().await {
            self.entries.remove(&key);
            return Err(e);
        }
        Ok(())
    }

    async fn remove(
        &self,
        channel: &ChannelRef,
        service: &ServiceRef,
    ) -> MonitorResult<Registration> {
        let key = (channel.clone(), service.clone());
        let (key, removed) = self
            .entries
            .remove(&key)
            .ok_or_else(|| MonitorError::NotFound(service.clone()))?;

        if let Err(e) = self.persist().await {
            self.entries.insert(key, removed);
            return Err(e);
        }
        Ok(removed)
    }

    async fn owners(&self, service: &ServiceRef) -> MonitorResult<Vec<Registration>> {
        let mut owners: Vec<Registration> = self
            .entries
            .iter()
            .filter(|e| e.key().1 == *service)
            .map(|e| e.value().clone())
            .collect();
        owners.sort_by(|a, b| a.channel.cmp(&b.channel));
        Ok(owners)
    }

    async fn list(&self) -> MonitorResult<Vec<Registration>> {
        Ok(self.snapshot())
    }
}

fn key_of(registration: &Registration) -> RegistrationKey {
    (registration.channel.clone(), registration.service.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registration(service: &str, channel: &str) -> Registration {
        Registration::new(
            ServiceRef::new("us-central1", "demo", service),
            ChannelRef::new("guild", channel),
        )
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let registry = ServiceRegistry::in_memory();
        let reg = registration("api", "ops");

        registry.insert(reg.clone()).await.unwrap();

        assert!(registry.is_registered(&reg.service).await.unwrap());
        assert_eq!(registry.owners(&reg.service).await.unwrap(), vec![reg]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = ServiceRegistry::in_memory();
        registry.insert(registration("api", "ops")).await.unwrap();

        let err = registry.insert(registration("api", "ops")).await.unwrap_err();
        assert!(matches!(err, MonitorError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn test_service_shared_between_channels() {
        let registry = ServiceRegistry::in_memory();
        let ops = registration("api", "ops");
        let dev = registration("api", "dev");
        registry.insert(ops.clone()).await.unwrap();
        registry.insert(dev.clone()).await.unwrap();

        let owners = registry.owners(&ops.service).await.unwrap();
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].channel.channel_id, "dev");
        assert_eq!(owners[1].channel.channel_id, "ops");

        registry.remove(&ops.channel, &ops.service).await.unwrap();
        assert!(registry.is_registered(&ops.service).await.unwrap());
        assert_eq!(registry.owners(&ops.service).await.unwrap(), vec![dev.clone()]);

        registry.remove(&dev.channel, &dev.service).await.unwrap();
        assert!(!registry.is_registered(&dev.service).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_requires_owning_channel() {
        let registry = ServiceRegistry::in_memory();
        let reg = registration("api", "ops");
        registry.insert(reg.clone()).await.unwrap();

        let err = registry
            .remove(&ChannelRef::new("guild", "dev"), &reg.service)
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::NotFound(_)));
        assert!(registry.is_registered(&reg.service).await.unwrap());

        let removed = registry.remove(&reg.channel, &reg.service).await.unwrap();
        assert_eq!(removed.service, reg.service);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_service() {
        let registry = ServiceRegistry::in_memory();
        let reg = registration("api", "ops");
        let err = registry.remove(&reg.channel, &reg.service).await.unwrap_err();
        assert!(matches!(err, MonitorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_state_file_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registrations.json");

        {
            let registry = ServiceRegistry::open(&path).await.unwrap();
            registry.insert(registration("api", "ops")).await.unwrap();
            registry.insert(registration("web", "ops")).await.unwrap();
            registry
                .remove(&ChannelRef::new("guild", "ops"), &ServiceRef::new("us-central1", "demo", "web"))
                .await
                .unwrap();
        }

        let reopened = ServiceRegistry::open(&path).await.unwrap();
        let all = reopened.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].service.service_name, "api");
        assert_eq!(all[0].channel.channel_id, "ops");
    }

    #[tokio::test]
    async fn test_corrupt_state_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registrations.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = ServiceRegistry::open(&path).await.err().unwrap();
        assert!(matches!(err, MonitorError::Registry(_)));
    }
}
