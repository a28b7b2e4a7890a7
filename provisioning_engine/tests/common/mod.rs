//! Hand-rolled in-memory fakes for the pipeline traits and the panel API.
//!
//! The fakes mirror the idempotency contracts of the real backends (conditional paid transition, partial
//! unique guards) so the orchestration logic can be exercised without a database or a live panel.
#![allow(dead_code)]
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use panel_client::{ClientTraffic, InboundSpec, PanelApi, PanelClientError};
use ppg_common::{Money, Protocol};
use provisioning_engine::{
    PanelConnector,
    db_types::{
        Inbound,
        NewLineItem,
        NewOrder,
        NewProvisionedClient,
        NewWalletTransaction,
        Order,
        OrderId,
        OrderLineItem,
        OrderStatus,
        PaymentStatus,
        Plan,
        ProvisionedClient,
        ServerRecord,
        WalletTransaction,
    },
    traits::{JobQueue, JobStatus, PipelineDatabase, PipelineError, ProvisioningJob, WalletError, WalletLedger},
};
use serde_json::{json, Value};

//--------------------------------------    FakeDatabase     ---------------------------------------------------------

#[derive(Default)]
pub struct State {
    pub orders: Vec<Order>,
    pub items: Vec<OrderLineItem>,
    pub plans: HashMap<i64, Plan>,
    pub servers: HashMap<i64, ServerRecord>,
    pub inbounds: Vec<Inbound>,
    pub clients: Vec<ProvisionedClient>,
    pub failures: HashMap<(i64, i64), String>,
    pub referrers: HashMap<String, Option<String>>,
    pub wallet_txs: Vec<WalletTransaction>,
    pub balances: HashMap<String, i64>,
    pub jobs: Vec<ProvisioningJob>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<State>>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_plan(&self, plan: Plan) {
        self.state().plans.insert(plan.id, plan);
    }

    pub fn add_server(&self, server: ServerRecord) {
        self.state().servers.insert(server.id, server);
    }

    pub fn add_inbound(&self, inbound: Inbound) {
        self.state().inbounds.push(inbound);
    }

    pub fn add_customer(&self, customer_id: &str, referrer: Option<&str>) {
        self.state().referrers.insert(customer_id.to_string(), referrer.map(str::to_string));
    }

    pub fn referral_credits(&self) -> Vec<WalletTransaction> {
        self.state().wallet_txs.iter().filter(|t| t.is_referral).cloned().collect()
    }

    pub fn active_jobs(&self) -> usize {
        self.state().jobs.iter().filter(|j| matches!(j.status, JobStatus::Queued | JobStatus::Running)).count()
    }
}

impl PipelineDatabase for FakeDatabase {
    async fn insert_order(&self, order: NewOrder, items: &[NewLineItem]) -> Result<Order, PipelineError> {
        let mut state = self.state();
        let id = state.next_id();
        let now = Utc::now();
        let record = Order {
            id,
            order_id: order.order_id,
            customer_id: order.customer_id,
            total_price: order.total_price,
            currency: order.currency,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::New,
            external_ref: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.push(record.clone());
        for item in items {
            let item_id = state.next_id();
            state.items.push(OrderLineItem { id: item_id, order_id: id, plan_id: item.plan_id, quantity: item.quantity });
        }
        Ok(record)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError> {
        Ok(self.state().orders.iter().find(|o| &o.order_id == order_id).cloned())
    }

    async fn mark_order_paid(&self, order_id: &OrderId, external_ref: &str) -> Result<Option<Order>, PipelineError> {
        let mut state = self.state();
        let Some(order) = state.orders.iter_mut().find(|o| &o.order_id == order_id) else {
            return Ok(None);
        };
        if order.payment_status != PaymentStatus::Pending {
            return Ok(None);
        }
        order.payment_status = PaymentStatus::Paid;
        order.external_ref = Some(external_ref.to_string());
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn update_order_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<Order, PipelineError> {
        let mut state = self.state();
        let order = state
            .orders
            .iter_mut()
            .find(|o| &o.order_id == order_id)
            .ok_or_else(|| PipelineError::OrderNotFound(order_id.clone()))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn fetch_line_items(&self, order: &Order) -> Result<Vec<OrderLineItem>, PipelineError> {
        Ok(self.state().items.iter().filter(|i| i.order_id == order.id).cloned().collect())
    }

    async fn fetch_plan(&self, plan_id: i64) -> Result<Plan, PipelineError> {
        self.state().plans.get(&plan_id).cloned().ok_or(PipelineError::PlanNotFound(plan_id))
    }

    async fn fetch_server(&self, server_id: i64) -> Result<ServerRecord, PipelineError> {
        self.state()
            .servers
            .get(&server_id)
            .filter(|s| s.active)
            .cloned()
            .ok_or(PipelineError::ServerNotFound(server_id))
    }

    async fn select_inbound(&self, server_id: i64, protocol: Protocol) -> Result<Inbound, PipelineError> {
        self.state()
            .inbounds
            .iter()
            .filter(|i| i.server_id == server_id && i.protocol == protocol && i.active && i.has_capacity())
            .min_by_key(|i| i.client_count)
            .cloned()
            .ok_or_else(|| PipelineError::NoInboundAvailable(protocol.to_string(), server_id))
    }

    async fn increment_inbound_clients(&self, inbound_id: i64) -> Result<(), PipelineError> {
        let mut state = self.state();
        if let Some(inbound) = state.inbounds.iter_mut().find(|i| i.id == inbound_id) {
            inbound.client_count += 1;
        }
        Ok(())
    }

    async fn fetch_provisioned_unit(
        &self,
        line_item_id: i64,
        unit_index: i64,
    ) -> Result<Option<ProvisionedClient>, PipelineError> {
        Ok(self
            .state()
            .clients
            .iter()
            .find(|c| c.line_item_id == line_item_id && c.unit_index == unit_index)
            .cloned())
    }

    async fn insert_provisioned_client(
        &self,
        client: NewProvisionedClient,
    ) -> Result<ProvisionedClient, PipelineError> {
        let mut state = self.state();
        if state.clients.iter().any(|c| c.line_item_id == client.line_item_id && c.unit_index == client.unit_index) {
            return Err(PipelineError::DatabaseError("UNIQUE constraint failed: (line_item_id, unit_index)".into()));
        }
        let id = state.next_id();
        let record = ProvisionedClient {
            id,
            line_item_id: client.line_item_id,
            unit_index: client.unit_index,
            inbound_id: client.inbound_id,
            protocol: client.protocol,
            credential_id: client.credential_id,
            credential_secret: client.credential_secret,
            expires_at: client.expires_at,
            traffic_limit_bytes: client.traffic_limit_bytes,
            subscription_link: client.subscription_link,
            qr_svg: client.qr_svg,
            created_at: Utc::now(),
        };
        state.clients.push(record.clone());
        Ok(record)
    }

    async fn fetch_clients_for_order(&self, order: &Order) -> Result<Vec<ProvisionedClient>, PipelineError> {
        let state = self.state();
        let item_ids: Vec<i64> = state.items.iter().filter(|i| i.order_id == order.id).map(|i| i.id).collect();
        Ok(state.clients.iter().filter(|c| item_ids.contains(&c.line_item_id)).cloned().collect())
    }

    async fn record_unit_failure(&self, line_item_id: i64, unit_index: i64, reason: &str) -> Result<(), PipelineError> {
        self.state().failures.insert((line_item_id, unit_index), reason.to_string());
        Ok(())
    }

    async fn clear_unit_failure(&self, line_item_id: i64, unit_index: i64) -> Result<(), PipelineError> {
        self.state().failures.remove(&(line_item_id, unit_index));
        Ok(())
    }

    async fn fetch_referrer(&self, customer_id: &str) -> Result<Option<String>, PipelineError> {
        Ok(self.state().referrers.get(customer_id).cloned().flatten())
    }

    async fn count_referrals(&self, customer_id: &str) -> Result<i64, PipelineError> {
        // Only referred customers with at least one paid order qualify for the tier.
        let state = self.state();
        let count = state
            .referrers
            .iter()
            .filter(|(_, r)| r.as_deref() == Some(customer_id))
            .filter(|(referred, _)| {
                state
                    .orders
                    .iter()
                    .any(|o| &o.customer_id == *referred && o.payment_status == PaymentStatus::Paid)
            })
            .count();
        Ok(count as i64)
    }
}

impl WalletLedger for FakeDatabase {
    async fn balance(&self, customer_id: &str) -> Result<Money, WalletError> {
        Ok(Money::from_cents(self.state().balances.get(customer_id).copied().unwrap_or_default()))
    }

    async fn post_transaction(&self, tx: NewWalletTransaction) -> Result<WalletTransaction, WalletError> {
        let mut state = self.state();
        let id = state.next_id();
        let entry = WalletTransaction {
            id,
            customer_id: tx.customer_id.clone(),
            amount: tx.amount,
            tx_type: tx.tx_type,
            order_id: tx.order_id.map(|o| o.as_str().to_string()),
            is_referral: tx.is_referral,
            memo: tx.memo,
            created_at: Utc::now(),
        };
        *state.balances.entry(tx.customer_id).or_default() += tx.amount.value();
        state.wallet_txs.push(entry.clone());
        Ok(entry)
    }

    async fn post_referral_credit(
        &self,
        tx: NewWalletTransaction,
        order_id: &OrderId,
    ) -> Result<Option<WalletTransaction>, WalletError> {
        {
            let state = self.state();
            let exists = state
                .wallet_txs
                .iter()
                .any(|t| t.is_referral && t.order_id.as_deref() == Some(order_id.as_str()));
            if exists {
                return Ok(None);
            }
        }
        self.post_transaction(tx).await.map(Some)
    }

    async fn history(&self, customer_id: &str) -> Result<Vec<WalletTransaction>, WalletError> {
        Ok(self.state().wallet_txs.iter().filter(|t| t.customer_id == customer_id).cloned().collect())
    }
}

impl JobQueue for FakeDatabase {
    async fn enqueue(&self, order_id: &OrderId) -> Result<Option<ProvisioningJob>, PipelineError> {
        let mut state = self.state();
        let active = state
            .jobs
            .iter()
            .any(|j| j.order_id == *order_id && matches!(j.status, JobStatus::Queued | JobStatus::Running));
        if active {
            return Ok(None);
        }
        let id = state.next_id();
        let now = Utc::now();
        let job = ProvisioningJob {
            id,
            order_id: order_id.clone(),
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.push(job.clone());
        Ok(Some(job))
    }

    async fn claim_next_job(&self) -> Result<Option<ProvisioningJob>, PipelineError> {
        let mut state = self.state();
        let job = state.jobs.iter_mut().filter(|j| j.status == JobStatus::Queued).min_by_key(|j| j.id);
        Ok(job.map(|j| {
            j.status = JobStatus::Running;
            j.attempts += 1;
            j.updated_at = Utc::now();
            j.clone()
        }))
    }

    async fn complete_job(&self, job_id: i64) -> Result<(), PipelineError> {
        let mut state = self.state();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Done;
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: i64, error: &str, max_attempts: i64) -> Result<(), PipelineError> {
        let mut state = self.state();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            job.last_error = Some(error.to_string());
            job.status = if job.attempts >= max_attempts { JobStatus::Failed } else { JobStatus::Queued };
        }
        Ok(())
    }
}

//--------------------------------------      FakePanel      ---------------------------------------------------------

#[derive(Default)]
pub struct PanelState {
    pub add_calls: u32,
    /// 1-based call numbers that should fail.
    pub fail_on: Vec<u32>,
    pub added: Vec<(i64, Value)>,
    pub deleted: Vec<(i64, String)>,
}

#[derive(Clone, Default)]
pub struct FakePanel {
    state: Arc<Mutex<PanelState>>,
}

impl FakePanel {
    pub fn failing_on(calls: &[u32]) -> Self {
        let panel = Self::default();
        panel.state.lock().unwrap().fail_on = calls.to_vec();
        panel
    }

    pub fn state(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap()
    }
}

impl PanelApi for FakePanel {
    async fn add_client(&self, inbound_id: i64, settings: &Value) -> Result<Value, PanelClientError> {
        let mut state = self.state();
        state.add_calls += 1;
        if state.fail_on.contains(&state.add_calls) {
            return Err(PanelClientError::Transient { status: 503, message: "panel busy".into() });
        }
        state.added.push((inbound_id, settings.clone()));
        Ok(json!({}))
    }

    async fn update_client(&self, _: i64, _: &str, _: &Value) -> Result<Value, PanelClientError> {
        Ok(json!({}))
    }

    async fn delete_client(&self, inbound_id: i64, client_id: &str) -> Result<(), PanelClientError> {
        self.state().deleted.push((inbound_id, client_id.to_string()));
        Ok(())
    }

    async fn get_client_traffic(&self, _: &str) -> Result<Option<ClientTraffic>, PanelClientError> {
        Ok(None)
    }

    async fn create_inbound(&self, _: &InboundSpec) -> Result<Value, PanelClientError> {
        Ok(json!({}))
    }
}

#[derive(Clone)]
pub struct FakeConnector {
    pub panel: FakePanel,
}

impl PanelConnector for FakeConnector {
    type Api = FakePanel;

    fn connect(&self, _: &ServerRecord) -> Result<Self::Api, PanelClientError> {
        Ok(self.panel.clone())
    }
}

//--------------------------------------      Fixtures       ---------------------------------------------------------

pub fn test_server(id: i64) -> ServerRecord {
    ServerRecord {
        id,
        name: format!("node-{id}"),
        panel_url: "https://panel.test:2053".into(),
        username: "admin".into(),
        password: "secret".into(),
        sub_host: "sub.test".into(),
        active: true,
    }
}

pub fn test_inbound(id: i64, server_id: i64, protocol: Protocol) -> Inbound {
    Inbound {
        id,
        server_id,
        remote_id: 100 + id,
        protocol,
        port: 40000 + id,
        header_type: None,
        max_clients: 0,
        client_count: 0,
        active: true,
    }
}

pub fn test_plan(id: i64, server_id: i64, protocol: Protocol) -> Plan {
    Plan { id, name: format!("plan-{id}"), protocol, traffic_gb: 50, duration_days: 30, ip_limit: 2, server_id }
}
