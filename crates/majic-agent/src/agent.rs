//! The caching agent: install, activate, intercept.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use majic_core::{AgentConfig, Config, NetworkError};
use parking_lot::Mutex;
use tokio::task::{JoinError, JoinSet};
use tokio_util::task::TaskTracker;
use tracing::instrument;

use crate::error::AgentError;
use crate::network::{AgentRequest, HttpNetwork, Network, NetworkResponse};
use crate::notify::{ClientRegistry, UpdateNotification};
use crate::store::{CachedResponse, PartitionStore};
use crate::version::AgentVersion;

/// Lifecycle of one agent build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Installing,
    Waiting,
    Activating,
    Active,
    /// Failed to install, or replaced by a newer build. Never intercepts.
    Redundant,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Installing => "installing",
            AgentState::Waiting => "waiting",
            AgentState::Activating => "activating",
            AgentState::Active => "active",
            AgentState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Paths precached into the static partition at install time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    assets: Vec<String>,
}

impl AssetManifest {
    pub fn new<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            assets: assets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.assets.iter().cloned())
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Primary partition hit. A refresh may still be running.
    Cache,
    Network,
    /// Offline snapshot, served because the network failed.
    Offline,
}

/// What a page gets back for an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl AgentResponse {
    fn stored(entry: CachedResponse, source: ResponseSource) -> Self {
        Self {
            status: entry.status,
            content_type: entry.content_type,
            body: entry.body,
            source,
        }
    }

    fn network(response: NetworkResponse) -> Self {
        Self {
            status: response.status,
            content_type: response.content_type,
            body: response.body,
            source: ResponseSource::Network,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Outcome of activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// Partitions removed because they belong to other builds.
    pub deleted: Vec<String>,
    /// Pages now controlled by this build.
    pub claimed: usize,
}

/// One build of the caching agent.
///
/// Cloning is cheap; clones share state, storage and background tasks.
pub struct CacheAgent<N> {
    inner: Arc<Inner<N>>,
}

impl<N> Clone for CacheAgent<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<N> {
    version: AgentVersion,
    api_path: String,
    store: Arc<PartitionStore>,
    network: N,
    clients: Arc<ClientRegistry>,
    state: Mutex<AgentState>,
    tasks: TaskTracker,
}

impl<N: Network> CacheAgent<N> {
    pub fn new(
        version: AgentVersion,
        api_path: impl Into<String>,
        store: Arc<PartitionStore>,
        network: N,
        clients: Arc<ClientRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                version,
                api_path: api_path.into(),
                store,
                network,
                clients,
                state: Mutex::new(AgentState::Installing),
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn from_config(
        config: &AgentConfig,
        store: Arc<PartitionStore>,
        network: N,
        clients: Arc<ClientRegistry>,
    ) -> Self {
        Self::new(
            AgentVersion::from_config(config),
            &config.api_path,
            store,
            network,
            clients,
        )
    }

    pub fn version(&self) -> &AgentVersion {
        &self.inner.version
    }

    pub fn state(&self) -> AgentState {
        *self.inner.state.lock()
    }

    fn set_state(&self, next: AgentState) {
        let mut state = self.inner.state.lock();
        let from = *state;
        tracing::info!(build = self.inner.version.build(), %from, to = %next, "Agent state change");
        *state = next;
    }

    fn require(&self, expected: AgentState, action: &'static str) -> Result<(), AgentError> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(AgentError::InvalidState { action, state })
        }
    }

    /// Precache every manifest asset into the static partition.
    ///
    /// All or nothing: one failed asset leaves the static partition untouched
    /// and the agent `Redundant`.
    #[instrument(skip(self, manifest), fields(build = self.inner.version.build(), assets = manifest.len()))]
    pub async fn install(&self, manifest: &AssetManifest) -> Result<(), AgentError> {
        self.require(AgentState::Installing, "install")?;

        match self.precache(manifest).await {
            Ok(count) => {
                tracing::info!(count, "Static assets precached");
                self.set_state(AgentState::Waiting);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Install failed");
                self.set_state(AgentState::Redundant);
                Err(e)
            }
        }
    }

    async fn precache(&self, manifest: &AssetManifest) -> Result<usize, AgentError> {
        let mut fetches = JoinSet::new();
        for asset in manifest.assets() {
            let inner = Arc::clone(&self.inner);
            let request = AgentRequest::get(asset.as_str());
            fetches.spawn(async move {
                let result = inner.network.fetch(&request).await;
                (request.path, result)
            });
        }

        let mut responses = Vec::with_capacity(manifest.len());
        while let Some(joined) = fetches.join_next().await {
            let (asset, result) = joined.map_err(|e| AgentError::InstallFailed {
                asset: "<precache task>".to_string(),
                reason: e.to_string(),
            })?;
            let response = result.map_err(|e| AgentError::InstallFailed {
                asset: asset.clone(),
                reason: e.to_string(),
            })?;
            if !response.is_success() {
                return Err(AgentError::InstallFailed {
                    asset,
                    reason: format!("HTTP {}", response.status),
                });
            }
            responses.push((asset, response));
        }

        self.inner
            .store
            .put_all(&self.inner.version.static_tag(), &responses)?;
        Ok(responses.len())
    }

    /// Take over from older builds.
    ///
    /// Drops every partition this build does not own, except the offline
    /// snapshot, then announces itself and claims all open pages.
    #[instrument(skip(self), fields(build = self.inner.version.build()))]
    pub fn activate(&self) -> Result<ActivationReport, AgentError> {
        self.require(AgentState::Waiting, "activate")?;
        self.set_state(AgentState::Activating);

        let deleted = self.remove_foreign_partitions().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Partition cleanup failed");
            Vec::new()
        });

        self.inner.clients.broadcast(UpdateNotification::new_version());
        let claimed = self.inner.clients.claim(self.inner.version.build());
        self.set_state(AgentState::Active);

        tracing::info!(?deleted, claimed, "Agent active");
        Ok(ActivationReport { deleted, claimed })
    }

    fn remove_foreign_partitions(&self) -> Result<Vec<String>, AgentError> {
        let mut deleted = Vec::new();
        for name in self.inner.store.partition_names()? {
            if self.inner.version.retains(&name) {
                continue;
            }
            if self.inner.store.delete_partition(&name)? {
                tracing::info!(partition = %name, "Deleted stale partition");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Step down in favor of a newer build. Pending refreshes are awaited;
    /// the successor's activation claims the pages.
    pub async fn supersede(&self) {
        self.set_state(AgentState::Redundant);
        self.settle().await;
    }

    /// Answer an intercepted request.
    ///
    /// A primary-partition hit is returned immediately while the network copy
    /// is fetched and stored in the background. Without a hit the network
    /// answer is awaited, and the offline snapshot covers network failures.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn handle(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        self.require(AgentState::Active, "handle requests")?;

        if !request.is_get() {
            let response = self.inner.network.fetch(&request).await?;
            return Ok(AgentResponse::network(response));
        }

        let is_api = self.inner.is_api(&request.path);
        let primary = if is_api {
            self.inner.version.dynamic_tag()
        } else {
            self.inner.version.static_tag()
        };

        let network = {
            let inner = Arc::clone(&self.inner);
            let request = request.clone();
            self.inner
                .tasks
                .spawn(async move { inner.network.fetch(&request).await })
        };

        let key = request.path;
        let cached = self.inner.store.get(&primary, &key).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Cache lookup failed, treating as miss");
            None
        });

        if let Some(entry) = cached {
            tracing::debug!(partition = %primary, "Served from cache");
            let inner = Arc::clone(&self.inner);
            let previous = entry.content_hash.clone();
            self.inner.tasks.spawn(async move {
                let outcome = joined(network.await);
                inner.revalidate(outcome, &primary, &key, is_api, &previous);
            });
            return Ok(AgentResponse::stored(entry, ResponseSource::Cache));
        }

        match joined(network.await) {
            Ok(response) if response.is_success() => {
                self.inner.commit(&primary, &key, &response, is_api);
                Ok(AgentResponse::network(response))
            }
            Ok(response) => {
                tracing::debug!(status = response.status, "Network answered with an error status");
                Ok(self
                    .inner
                    .offline_fallback(&key)
                    .unwrap_or_else(|| AgentResponse::network(response)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Network request failed");
                self.inner.offline_fallback(&key).ok_or(AgentError::Network(e))
            }
        }
    }

    /// Clear this build's static and dynamic partitions ahead of a reload.
    /// The offline snapshot survives.
    pub fn clear_for_update(&self) -> Result<Vec<String>, AgentError> {
        let mut cleared = Vec::new();
        for name in self.inner.store.partition_names()? {
            if self.inner.version.is_offline_partition(&name) {
                continue;
            }
            if self.inner.store.delete_partition(&name)? {
                cleared.push(name);
            }
        }
        tracing::info!(?cleared, "Partitions cleared for update");
        Ok(cleared)
    }

    /// Wait for every background fetch and refresh started so far.
    pub async fn settle(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.len()
    }
}

impl CacheAgent<HttpNetwork> {
    /// Agent for the configured origin, backed by the on-disk partition store.
    pub fn open(config: &Config, clients: Arc<ClientRegistry>) -> Result<Self, AgentError> {
        let store = PartitionStore::new(config.agent_cache_path())?;
        let network = HttpNetwork::from_config(&config.agent)?;
        Ok(Self::from_config(&config.agent, Arc::new(store), network, clients))
    }
}

impl<N> Inner<N> {
    fn is_api(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        path.starts_with(&self.api_path)
    }

    fn revalidate(
        &self,
        outcome: Result<NetworkResponse, NetworkError>,
        partition: &str,
        key: &str,
        is_api: bool,
        previous_hash: &str,
    ) {
        match outcome {
            Ok(response) if response.is_success() => {
                let changed = response.content_hash() != previous_hash;
                self.commit(partition, key, &response, is_api);
                if changed {
                    let delivered = self.clients.broadcast(UpdateNotification::new_version());
                    tracing::info!(%key, delivered, "Content changed, clients notified");
                } else {
                    tracing::debug!(%key, "Content unchanged");
                }
            }
            Ok(response) => {
                tracing::debug!(%key, status = response.status, "Refresh not stored");
            }
            Err(e) => {
                tracing::debug!(%key, error = %e, "Refresh failed, cached copy stands");
            }
        }
    }

    /// Store a successful response in its primary partition, and in the
    /// offline snapshot when it is an API response.
    fn commit(&self, partition: &str, key: &str, response: &NetworkResponse, is_api: bool) {
        if let Err(e) = self.store.put(partition, key, response) {
            tracing::warn!(%partition, %key, error = %e, "Failed to store response");
        }
        if is_api {
            let offline = self.version.offline_tag();
            if let Err(e) = self.store.put(&offline, key, response) {
                tracing::warn!(partition = %offline, %key, error = %e, "Failed to store offline snapshot");
            }
        }
    }

    fn offline_fallback(&self, key: &str) -> Option<AgentResponse> {
        let entry = self
            .store
            .get(&self.version.offline_tag(), key)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Offline snapshot lookup failed");
                None
            })?;

        let delivered = self.clients.broadcast(UpdateNotification::offline());
        tracing::info!(%key, delivered, stored_at = %entry.stored_at, "Served offline snapshot");
        Some(AgentResponse::stored(entry, ResponseSource::Offline))
    }
}

fn joined(
    result: Result<Result<NetworkResponse, NetworkError>, JoinError>,
) -> Result<NetworkResponse, NetworkError> {
    result.unwrap_or_else(|e| Err(NetworkError::ConnectionFailed(format!("network task failed: {}", e))))
}
