//! The protocol adapter seam.
//!
//! Each proxy protocol has one adapter that knows how to express a generic provisioning request in the settings
//! format the panel expects, how to read the panel's answer back, and how to print the subscription link a client
//! application can import. The rest of the pipeline is polymorphic over [`ProtocolAdapter`]; the only place protocol
//! identity is inspected is the [`AdapterRegistry`] lookup.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use log::debug;
use ppg_common::Protocol;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    adapters::{HttpAdapter, ShadowsocksAdapter, TrojanAdapter, VlessAdapter, VmessAdapter, WireguardAdapter},
    error::PanelClientError,
};

//--------------------------------------     Credential     ----------------------------------------------------------
/// The credential issued to a provisioned client. UUID-keyed protocols get a random v4 UUID; user/pass protocols
/// get a random username and password. Generation is collision-resistant by construction, so concurrent workers
/// never need to coordinate identifier allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Uuid(Uuid),
    UserPass { username: String, password: String },
}

impl Credential {
    pub fn generate(protocol: Protocol) -> Self {
        if protocol.uses_user_pass() {
            let username = format!("u{}", random_alnum(8));
            let password = random_alnum(16);
            Credential::UserPass { username, password }
        } else {
            Credential::Uuid(Uuid::new_v4())
        }
    }

    /// The primary identifier: the UUID, or the username for user/pass credentials.
    pub fn identifier(&self) -> String {
        match self {
            Credential::Uuid(id) => id.to_string(),
            Credential::UserPass { username, .. } => username.clone(),
        }
    }

    pub fn secret(&self) -> Option<&str> {
        match self {
            Credential::Uuid(_) => None,
            Credential::UserPass { password, .. } => Some(password.as_str()),
        }
    }
}

fn random_alnum(len: usize) -> String {
    thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

//--------------------------------------  ProvisionRequest  ----------------------------------------------------------
/// A generic client-provisioning request, before any protocol translation.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Panel-side label for the client. Also used as the link remark.
    pub remark: String,
    pub credential: Credential,
    pub expires_at: DateTime<Utc>,
    /// Traffic ceiling in bytes. Zero means unlimited.
    pub traffic_limit_bytes: i64,
    /// Maximum number of concurrent source IPs. Zero means unlimited.
    pub ip_limit: u32,
}

impl ProvisionRequest {
    /// Expiry in the panel's wire format: a millisecond epoch timestamp.
    pub fn expiry_millis(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }
}

//--------------------------------------   InboundProfile   ----------------------------------------------------------
/// The slice of an inbound's configuration an adapter needs to build settings and subscription links.
#[derive(Debug, Clone)]
pub struct InboundProfile {
    pub protocol: Protocol,
    /// Hostname customers connect to (may differ from the panel API host).
    pub host: String,
    pub port: u16,
    /// The inbound's numeric id on the panel.
    pub remote_id: i64,
    /// Transport header camouflage, e.g. "http". None means plain.
    pub header_type: Option<String>,
}

//--------------------------------------     RemoteClient   ----------------------------------------------------------
/// What the panel acknowledged: the identifier under which the client now exists remotely.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    pub identifier: String,
    /// The label the panel tracks traffic under.
    pub email: String,
}

//--------------------------------------   ProtocolAdapter  ----------------------------------------------------------
pub trait ProtocolAdapter: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Builds the protocol-specific settings payload the panel's `addClient` endpoint expects.
    fn build_settings(&self, req: &ProvisionRequest) -> Result<Value, PanelClientError>;

    /// Reads the panel's `obj` payload back into a generic result. Panels frequently return a null `obj` on
    /// success, in which case the result is reconstructed from the request.
    fn parse_provision_result(&self, req: &ProvisionRequest, obj: &Value) -> Result<RemoteClient, PanelClientError> {
        let identifier = obj
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| req.credential.identifier());
        let email =
            obj.get("email").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| req.remark.clone());
        Ok(RemoteClient { identifier, email })
    }

    /// The subscription URI a client application imports. Must round-trip into a working configuration.
    fn subscription_link(&self, profile: &InboundProfile, req: &ProvisionRequest) -> String;
}

//--------------------------------------   AdapterRegistry  ----------------------------------------------------------
/// Protocol → adapter table, built once at startup. An unknown protocol is a configuration error surfaced at
/// registry lookup or [`AdapterRegistry::validate`] time, never a silent default.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Protocol, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self { adapters: HashMap::new() }
    }

    /// A registry covering every protocol this crate ships an adapter for.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VlessAdapter));
        registry.register(Arc::new(VmessAdapter));
        registry.register(Arc::new(TrojanAdapter));
        registry.register(Arc::new(ShadowsocksAdapter::default()));
        registry.register(Arc::new(WireguardAdapter));
        registry.register(Arc::new(HttpAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProtocolAdapter>) {
        debug!("🧩️ Registered protocol adapter for {}", adapter.protocol());
        self.adapters.insert(adapter.protocol(), adapter);
    }

    pub fn get(&self, protocol: Protocol) -> Result<&Arc<dyn ProtocolAdapter>, PanelClientError> {
        self.adapters.get(&protocol).ok_or(PanelClientError::UnsupportedProtocol(protocol))
    }

    /// Startup-time validation: every protocol the catalogue references must have an adapter.
    pub fn validate<I: IntoIterator<Item = Protocol>>(&self, protocols: I) -> Result<(), PanelClientError> {
        for p in protocols {
            self.get(p)?;
        }
        Ok(())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
