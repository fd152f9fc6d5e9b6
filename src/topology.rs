//! Topology lifecycle hooks
//!
//! The CRUD layer persists topologies through a [`TopologyRepository`] and
//! calls into [`TopologyService`], which keeps the alert engine's rules in
//! step with every saved graph.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::engine::AlertEngine;
use crate::graph::Graph;
use crate::rules::{ExtractError, TopologyId};

pub type OwnerId = u64;

/// A persisted topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub id: TopologyId,
    pub owner_id: OwnerId,
    pub name: String,
    /// Raw graph JSON as drawn in the editor
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence for topologies
#[async_trait]
pub trait TopologyRepository: Send + Sync {
    /// Store a new topology and assign its id
    async fn create(
        &self,
        owner_id: OwnerId,
        name: &str,
        data: &str,
    ) -> Result<Topology, TopologyError>;
    async fn find(&self, id: TopologyId, owner_id: OwnerId) -> Result<Topology, TopologyError>;
    async fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Topology>, TopologyError>;
    async fn find_all(&self) -> Result<Vec<Topology>, TopologyError>;
    async fn update(&self, topology: &Topology) -> Result<(), TopologyError>;
    async fn delete(&self, id: TopologyId, owner_id: OwnerId) -> Result<(), TopologyError>;
}

/// In-process repository
pub struct MemoryTopologyRepository {
    topologies: DashMap<TopologyId, Topology>,
    next_id: AtomicU64,
}

impl MemoryTopologyRepository {
    pub fn new() -> Self {
        Self {
            topologies: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryTopologyRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopologyRepository for MemoryTopologyRepository {
    async fn create(
        &self,
        owner_id: OwnerId,
        name: &str,
        data: &str,
    ) -> Result<Topology, TopologyError> {
        let now = Utc::now();
        let topology = Topology {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            owner_id,
            name: name.to_string(),
            data: data.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.topologies.insert(topology.id, topology.clone());
        Ok(topology)
    }

    async fn find(&self, id: TopologyId, owner_id: OwnerId) -> Result<Topology, TopologyError> {
        self.topologies
            .get(&id)
            .filter(|t| t.owner_id == owner_id)
            .map(|t| t.clone())
            .ok_or(TopologyError::NotFound(id))
    }

    async fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Topology>, TopologyError> {
        let mut found: Vec<Topology> = self
            .topologies
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .map(|t| t.clone())
            .collect();
        found.sort_by_key(|t| t.id);
        Ok(found)
    }

    async fn find_all(&self) -> Result<Vec<Topology>, TopologyError> {
        let mut all: Vec<Topology> = self.topologies.iter().map(|t| t.clone()).collect();
        all.sort_by_key(|t| t.id);
        Ok(all)
    }

    async fn update(&self, topology: &Topology) -> Result<(), TopologyError> {
        match self.topologies.get_mut(&topology.id) {
            Some(mut existing) if existing.owner_id == topology.owner_id => {
                *existing = Topology {
                    updated_at: Utc::now(),
                    ..topology.clone()
                };
                Ok(())
            }
            _ => Err(TopologyError::NotFound(topology.id)),
        }
    }

    async fn delete(&self, id: TopologyId, owner_id: OwnerId) -> Result<(), TopologyError> {
        self.topologies
            .remove_if(&id, |_, t| t.owner_id == owner_id)
            .map(|_| ())
            .ok_or(TopologyError::NotFound(id))
    }
}

/// Keeps alert rules in step with topology writes.
///
/// Writes to one topology are serialized, so its installed rules always
/// come from the graph that was stored last.
pub struct TopologyService {
    repo: Arc<dyn TopologyRepository>,
    engine: Arc<AlertEngine>,
    write_locks: DashMap<TopologyId, Arc<Mutex<()>>>,
}

impl TopologyService {
    pub fn new(repo: Arc<dyn TopologyRepository>, engine: Arc<AlertEngine>) -> Self {
        Self {
            repo,
            engine,
            write_locks: DashMap::new(),
        }
    }

    fn write_lock(&self, id: TopologyId) -> Arc<Mutex<()>> {
        Arc::clone(&self.write_locks.entry(id).or_default())
    }

    /// Persist a new topology and install its rules
    pub async fn save(
        &self,
        owner_id: OwnerId,
        name: &str,
        data: &str,
    ) -> Result<Topology, TopologyError> {
        validate(name, data)?;

        let topology = self.repo.create(owner_id, name, data).await?;

        let lock = self.write_lock(topology.id);
        let _guard = lock.lock().await;
        self.sync_rules(topology.id, owner_id).await?;
        Ok(topology)
    }

    /// Replace a topology's name and graph and re-derive its rules
    pub async fn update(
        &self,
        id: TopologyId,
        owner_id: OwnerId,
        name: &str,
        data: &str,
    ) -> Result<Topology, TopologyError> {
        validate(name, data)?;

        let lock = self.write_lock(id);
        let _guard = lock.lock().await;

        let mut topology = self.repo.find(id, owner_id).await?;
        topology.name = name.to_string();
        topology.data = data.to_string();
        self.repo.update(&topology).await?;

        self.sync_rules(id, owner_id).await
    }

    /// Delete a topology and disable its rules
    pub async fn delete(&self, id: TopologyId, owner_id: OwnerId) -> Result<(), TopologyError> {
        let lock = self.write_lock(id);
        let _guard = lock.lock().await;

        self.repo.delete(id, owner_id).await?;
        self.engine.remove_topology(id);
        self.write_locks.remove(&id);
        Ok(())
    }

    pub async fn get(&self, id: TopologyId, owner_id: OwnerId) -> Result<Topology, TopologyError> {
        self.repo.find(id, owner_id).await
    }

    pub async fn list(&self, owner_id: OwnerId) -> Result<Vec<Topology>, TopologyError> {
        self.repo.find_by_owner(owner_id).await
    }

    /// Derive rules for every stored topology; run once at startup.
    ///
    /// A topology whose stored graph no longer parses is logged and skipped.
    pub async fn load_rules(&self) -> Result<usize, TopologyError> {
        let topologies = self.repo.find_all().await?;
        let mut total = 0;

        for topology in &topologies {
            match self.engine.apply_topology(topology.id, &topology.data) {
                Ok(count) => total += count,
                Err(e) => tracing::warn!(
                    topology_id = topology.id,
                    error = %e,
                    "Skipping stored topology with unreadable graph"
                ),
            }
        }

        tracing::info!(
            topologies = topologies.len(),
            rules = total,
            "Loaded alert rules from stored topologies"
        );
        Ok(total)
    }

    /// Install rules from the stored graph. Caller holds the write lock.
    async fn sync_rules(
        &self,
        id: TopologyId,
        owner_id: OwnerId,
    ) -> Result<Topology, TopologyError> {
        match self.repo.find(id, owner_id).await {
            Ok(topology) => {
                self.engine.apply_topology(topology.id, &topology.data)?;
                Ok(topology)
            }
            Err(e) => {
                self.engine.remove_topology(id);
                Err(e)
            }
        }
    }
}

fn validate(name: &str, data: &str) -> Result<(), TopologyError> {
    if name.trim().is_empty() {
        return Err(TopologyError::EmptyName);
    }
    Graph::parse(data).map_err(|e| TopologyError::InvalidGraph(ExtractError::MalformedGraph(e)))?;
    Ok(())
}

/// Topology errors
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("Topology {0} not found")]
    NotFound(TopologyId),

    #[error("Topology name is required")]
    EmptyName,

    #[error("Invalid topology graph: {0}")]
    InvalidGraph(#[from] ExtractError),

    #[error("Repository error: {0}")]
    Repository(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::notifier::RecordingMailer;
    use crate::metric::MetricSample;
    use serde_json::json;

    fn graph(device: &str) -> String {
        json!({
            "nodes": [
                {"id": "d", "type": "device", "data": {"label": device}},
                {"id": "a", "type": "action", "data": {"threshold": 50}},
                {"id": "e", "type": "email", "data": {"to": "ops@x.com", "cooldown": "5m"}}
            ],
            "edges": [
                {"source": "d", "target": "a"},
                {"source": "a", "target": "e"}
            ]
        })
        .to_string()
    }

    fn service() -> (TopologyService, Arc<AlertEngine>, Arc<MemoryTopologyRepository>) {
        let engine = Arc::new(
            AlertEngine::builder()
                .mailer(Arc::new(RecordingMailer::default()))
                .build(),
        );
        let repo = Arc::new(MemoryTopologyRepository::new());
        let service = TopologyService::new(repo.clone(), Arc::clone(&engine));
        (service, engine, repo)
    }

    #[tokio::test]
    async fn test_save_installs_rules() {
        let (service, engine, _) = service();
        let topology = service.save(1, "lab", &graph("srv1")).await.unwrap();

        let rules = engine.rules_for(topology.id);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].device_id, "srv1");
    }

    #[tokio::test]
    async fn test_update_replaces_rules() {
        let (service, engine, _) = service();
        let topology = service.save(1, "lab", &graph("srv1")).await.unwrap();
        let updated = service
            .update(topology.id, 1, "lab v2", &graph("srv2"))
            .await
            .unwrap();

        assert_eq!(updated.name, "lab v2");
        let rules = engine.rules_for(topology.id);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].device_id, "srv2");
    }

    #[tokio::test]
    async fn test_malformed_graph_rejected_before_write() {
        let (service, engine, repo) = service();
        let topology = service.save(1, "lab", &graph("srv1")).await.unwrap();

        let err = service
            .update(topology.id, 1, "lab", "{broken")
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidGraph(_)));

        let stored = repo.find(topology.id, 1).await.unwrap();
        assert_eq!(stored.data, graph("srv1"));
        assert_eq!(engine.rules_for(topology.id)[0].device_id, "srv1");

        assert!(matches!(
            service.save(1, "", &graph("srv1")).await,
            Err(TopologyError::EmptyName)
        ));
    }

    #[tokio::test]
    async fn test_delete_clears_rules() {
        let (service, engine, _) = service();
        let topology = service.save(1, "lab", &graph("srv1")).await.unwrap();
        service.delete(topology.id, 1).await.unwrap();

        assert!(engine.rules_for(topology.id).is_empty());
        assert!(engine
            .evaluate(&MetricSample::new("srv1").with_cpu(99.0))
            .is_empty());
        assert!(matches!(
            service.get(topology.id, 1).await,
            Err(TopologyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let (service, _, _) = service();
        let topology = service.save(1, "lab", &graph("srv1")).await.unwrap();

        assert!(service.get(topology.id, 2).await.is_err());
        assert!(service.delete(topology.id, 2).await.is_err());
        assert!(service.list(2).await.unwrap().is_empty());
        assert_eq!(service.list(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_rules_at_startup() {
        let (_, engine, repo) = service();
        repo.create(1, "a", &graph("srv1")).await.unwrap();
        repo.create(2, "b", &graph("srv2")).await.unwrap();
        repo.create(2, "broken", "{oops").await.unwrap();

        let service = TopologyService::new(repo, Arc::clone(&engine));
        assert_eq!(service.load_rules().await.unwrap(), 2);
        assert_eq!(engine.registry().topology_count(), 2);
    }

    /// Repository that stalls reads of topologies with a given name
    struct StallingRepository {
        inner: MemoryTopologyRepository,
        stall_name: &'static str,
    }

    #[async_trait]
    impl TopologyRepository for StallingRepository {
        async fn create(
            &self,
            owner_id: OwnerId,
            name: &str,
            data: &str,
        ) -> Result<Topology, TopologyError> {
            self.inner.create(owner_id, name, data).await
        }

        async fn find(&self, id: TopologyId, owner_id: OwnerId) -> Result<Topology, TopologyError> {
            let found = self.inner.find(id, owner_id).await;
            if matches!(&found, Ok(t) if t.name == self.stall_name) {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            found
        }

        async fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Topology>, TopologyError> {
            self.inner.find_by_owner(owner_id).await
        }

        async fn find_all(&self) -> Result<Vec<Topology>, TopologyError> {
            self.inner.find_all().await
        }

        async fn update(&self, topology: &Topology) -> Result<(), TopologyError> {
            self.inner.update(topology).await
        }

        async fn delete(&self, id: TopologyId, owner_id: OwnerId) -> Result<(), TopologyError> {
            self.inner.delete(id, owner_id).await
        }
    }

    fn stalling_service() -> (TopologyService, Arc<AlertEngine>) {
        let engine = Arc::new(
            AlertEngine::builder()
                .mailer(Arc::new(RecordingMailer::default()))
                .build(),
        );
        let repo = Arc::new(StallingRepository {
            inner: MemoryTopologyRepository::new(),
            stall_name: "slow",
        });
        (TopologyService::new(repo, Arc::clone(&engine)), engine)
    }

    #[tokio::test]
    async fn test_concurrent_updates_install_last_stored_graph() {
        let (service, engine) = stalling_service();
        let id = service.save(1, "lab", &graph("srv0")).await.unwrap().id;

        let slow_graph = graph("srvA");
        let slow = service.update(id, 1, "slow", &slow_graph);
        let fast = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            service.update(id, 1, "fast", &graph("srvB")).await
        };
        let (slow, fast) = tokio::join!(slow, fast);
        slow.unwrap();
        fast.unwrap();

        assert_eq!(service.get(id, 1).await.unwrap().name, "fast");
        assert_eq!(engine.rules_for(id)[0].device_id, "srvB");
    }

    #[tokio::test]
    async fn test_delete_during_update_leaves_no_rules() {
        let (service, engine) = stalling_service();
        let id = service.save(1, "lab", &graph("srv0")).await.unwrap().id;

        let slow_graph = graph("srvA");
        let slow = service.update(id, 1, "slow", &slow_graph);
        let delete = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            service.delete(id, 1).await
        };
        let (slow, delete) = tokio::join!(slow, delete);
        slow.unwrap();
        delete.unwrap();

        assert!(engine.rules_for(id).is_empty());
        assert!(service.get(id, 1).await.is_err());
    }
}
