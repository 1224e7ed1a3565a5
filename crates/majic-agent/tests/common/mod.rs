#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use majic_agent::{
    AgentRequest, AgentVersion, AssetManifest, CacheAgent, ClientRegistry, Network,
    NetworkResponse, PartitionStore, UpdateNotification,
};
use majic_core::NetworkError;
use parking_lot::Mutex;

pub const API: &str = "/api/calendar";

pub fn manifest() -> AssetManifest {
    AssetManifest::new(["/", "/style.css", "/app.js"])
}

#[derive(Default)]
struct Shared {
    routes: Mutex<HashMap<String, Result<NetworkResponse, NetworkError>>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

/// In-memory network whose answers can be changed between requests.
#[derive(Clone, Default)]
pub struct ScriptedNetwork {
    shared: Arc<Shared>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network that serves every manifest asset.
    pub fn with_assets() -> Self {
        let network = Self::new();
        for asset in manifest().assets() {
            network.ok(asset, &format!("asset {}", asset));
        }
        network
    }

    pub fn ok(&self, path: &str, body: &str) {
        self.reply(path, Ok(NetworkResponse::new(200, Some("text/plain"), body.as_bytes().to_vec())));
    }

    pub fn status(&self, path: &str, status: u16, body: &str) {
        self.reply(path, Ok(NetworkResponse::new(status, None, body.as_bytes().to_vec())));
    }

    pub fn fail(&self, path: &str) {
        self.reply(path, Err(NetworkError::ConnectionFailed("network is down".into())));
    }

    pub fn reply(&self, path: &str, reply: Result<NetworkResponse, NetworkError>) {
        self.shared.routes.lock().insert(path.to_string(), reply);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.shared.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }
}

impl Network for ScriptedNetwork {
    fn fetch(
        &self,
        request: &AgentRequest,
    ) -> impl Future<Output = Result<NetworkResponse, NetworkError>> + Send {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .shared
            .routes
            .lock()
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| Err(NetworkError::ConnectionFailed(format!("no route for {}", request.path))));
        let delay = *self.shared.delay.lock();

        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply
        }
    }
}

pub struct Harness {
    pub store: Arc<PartitionStore>,
    pub clients: Arc<ClientRegistry>,
    pub network: ScriptedNetwork,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(PartitionStore::in_memory().unwrap()),
            clients: Arc::new(ClientRegistry::new()),
            network: ScriptedNetwork::with_assets(),
        }
    }

    pub fn agent(&self, build: &str) -> CacheAgent<ScriptedNetwork> {
        CacheAgent::new(
            AgentVersion::new("majic", build),
            API,
            Arc::clone(&self.store),
            self.network.clone(),
            Arc::clone(&self.clients),
        )
    }

    /// Installed and activated agent for `build`.
    pub async fn active(&self, build: &str) -> CacheAgent<ScriptedNetwork> {
        let agent = self.agent(build);
        agent.install(&manifest()).await.unwrap();
        agent.activate().unwrap();
        agent
    }
}

pub fn count_new_version(received: &[UpdateNotification]) -> usize {
    received
        .iter()
        .filter(|n| matches!(n, UpdateNotification::NewVersionAvailable { .. }))
        .count()
}

pub fn count_offline(received: &[UpdateNotification]) -> usize {
    received
        .iter()
        .filter(|n| matches!(n, UpdateNotification::OfflineMode { .. }))
        .count()
}
