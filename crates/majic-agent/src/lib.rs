//! Client-resident caching agent.
//!
//! Sits between the foreground application and the network: serves cached
//! responses immediately, refreshes them in the background, tells open pages
//! when content actually changed, and falls back to the offline snapshot when
//! the network is gone.

pub mod agent;
pub mod error;
pub mod network;
pub mod notify;
pub mod store;
pub mod version;

pub use agent::{ActivationReport, AgentResponse, AgentState, AssetManifest, CacheAgent, ResponseSource};
pub use error::AgentError;
pub use network::{AgentRequest, HttpNetwork, Network, NetworkResponse};
pub use notify::{ClientConnection, ClientId, ClientRegistry, UpdateNotification};
pub use store::{content_hash, CachedResponse, PartitionStore};
pub use version::AgentVersion;
