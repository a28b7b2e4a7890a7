use chrono::Utc;
use log::*;
use panel_client::{
    render_qr_svg,
    AdapterRegistry,
    Credential,
    PanelApi,
    PanelClient,
    PanelClientError,
    PanelConfig,
    ProvisionRequest,
};
use ppg_common::Secret;

use crate::{
    db_types::{Inbound, NewProvisionedClient, Plan, ProvisionedClient, ServerRecord},
    provisioning::ProvisioningError,
    traits::PipelineDatabase,
};

//--------------------------------------   PanelConnector    ---------------------------------------------------------
/// Produces a panel API handle for a server record. The production connector builds an HTTP client; tests
/// substitute fakes here.
pub trait PanelConnector: Clone + Send + Sync + 'static {
    type Api: PanelApi;

    fn connect(&self, server: &ServerRecord) -> Result<Self::Api, PanelClientError>;
}

#[derive(Clone, Default)]
pub struct HttpPanelConnector;

impl PanelConnector for HttpPanelConnector {
    type Api = PanelClient;

    fn connect(&self, server: &ServerRecord) -> Result<Self::Api, PanelClientError> {
        let config = PanelConfig::new(&server.panel_url, &server.username, Secret::new(server.password.clone()));
        PanelClient::new(config)
    }
}

//--------------------------------------    ClientRequest    ---------------------------------------------------------
/// Everything needed to provision one unit on one inbound.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub line_item_id: i64,
    pub unit_index: i64,
    pub plan: Plan,
    pub inbound: Inbound,
    /// Hostname embedded in the subscription link.
    pub sub_host: String,
}

impl ClientRequest {
    /// Panel-side label for the client. Unique per unit, stable across retries.
    pub fn remark(&self) -> String {
        format!("item{}-u{}", self.line_item_id, self.unit_index)
    }
}

//--------------------------------------  ClientProvisioner  ---------------------------------------------------------
/// Provisions a single client: generates a credential, pushes it to the panel through the protocol adapter,
/// renders the subscription artifacts and persists the record.
///
/// The remote call and the local insert cannot share a transaction. The order chosen here makes the remote
/// side the source of truth: the panel client is created first, and if the local insert then fails, the
/// remote client is deleted again so no orphan credential stays live.
#[derive(Clone)]
pub struct ClientProvisioner<B> {
    db: B,
    adapters: AdapterRegistry,
}

impl<B> ClientProvisioner<B>
where B: PipelineDatabase
{
    pub fn new(db: B, adapters: AdapterRegistry) -> Self {
        Self { db, adapters }
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub async fn provision<A: PanelApi>(
        &self,
        api: &A,
        req: &ClientRequest,
    ) -> Result<ProvisionedClient, ProvisioningError> {
        let protocol = req.plan.protocol;
        let adapter = self.adapters.get(protocol)?;
        let credential = Credential::generate(protocol);
        let provision_request = ProvisionRequest {
            remark: req.remark(),
            credential: credential.clone(),
            expires_at: req.plan.expiry_from(Utc::now()),
            traffic_limit_bytes: req.plan.traffic_limit_bytes(),
            ip_limit: req.plan.ip_limit as u32,
        };
        let settings = adapter.build_settings(&provision_request)?;
        let obj = api.add_client(req.inbound.remote_id, &settings).await?;
        let remote = adapter.parse_provision_result(&provision_request, &obj)?;
        debug!("🛠️ Panel acknowledged client {} for {}", remote.identifier, provision_request.remark);

        let profile = req.inbound.profile(&req.sub_host);
        let link = adapter.subscription_link(&profile, &provision_request);
        let qr_svg = render_qr_svg(&link)?;
        let record = NewProvisionedClient {
            line_item_id: req.line_item_id,
            unit_index: req.unit_index,
            inbound_id: req.inbound.id,
            protocol,
            credential_id: credential.identifier(),
            credential_secret: credential.secret().map(str::to_string),
            expires_at: provision_request.expires_at,
            traffic_limit_bytes: provision_request.traffic_limit_bytes,
            subscription_link: link,
            qr_svg,
        };
        let client = match self.db.insert_provisioned_client(record).await {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    "🛠️ Could not persist client {} for {}. Rolling back the panel-side client. {e}",
                    remote.identifier,
                    provision_request.remark
                );
                if let Err(del) = api.delete_client(req.inbound.remote_id, &remote.identifier).await {
                    error!(
                        "🛠️ Compensating delete of client {} on inbound #{} failed: {del}. Manual cleanup needed",
                        remote.identifier, req.inbound.remote_id
                    );
                }
                return Err(e.into());
            },
        };
        self.db.increment_inbound_clients(req.inbound.id).await?;
        info!(
            "🛠️ Provisioned {} client {} (item {}, unit {}) on inbound #{}",
            protocol, client.credential_id, req.line_item_id, req.unit_index, req.inbound.remote_id
        );
        Ok(client)
    }
}
