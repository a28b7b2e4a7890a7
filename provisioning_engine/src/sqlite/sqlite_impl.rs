//! `SqliteDatabase` is a concrete implementation of a pipeline backend.
//!
//! Unsurprisingly, it uses SQLite and implements all the traits defined in the [`crate::traits`] module on a
//! single connection pool, so the order tables, the wallet ledger and the job queue share one database file.
use std::fmt::Debug;

use log::debug;
use ppg_common::{Money, Protocol};
use sqlx::SqlitePool;

use super::db::{catalog, clients, jobs, orders, wallet};
use crate::{
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
        Plan,
        ProvisionedClient,
        ServerRecord,
        WalletTransaction,
    },
    traits::{JobQueue, PipelineDatabase, PipelineError, ProvisioningJob, WalletError, WalletLedger},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database at `url`, running any pending migrations.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, PipelineError> {
        let pool = super::db::new_pool(url, max_connections)
            .await
            .map_err(|e| PipelineError::Initialization(e.to_string()))?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| PipelineError::Initialization(e.to_string()))?;
        debug!("🗃️ Database ready at {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    //-------------------------------  Catalogue administration  -----------------------------------------------------
    // The storefront's admin side owns these records; they are exposed here for setup and seeding.

    pub async fn insert_server(&self, server: &ServerRecord) -> Result<i64, PipelineError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
                INSERT INTO servers (name, panel_url, username, password, sub_host, active)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id;
            "#,
        )
        .bind(&server.name)
        .bind(&server.panel_url)
        .bind(&server.username)
        .bind(&server.password)
        .bind(&server.sub_host)
        .bind(server.active)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn insert_inbound(&self, inbound: &Inbound) -> Result<i64, PipelineError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
                INSERT INTO inbounds (server_id, remote_id, protocol, port, header_type, max_clients, client_count, active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id;
            "#,
        )
        .bind(inbound.server_id)
        .bind(inbound.remote_id)
        .bind(inbound.protocol)
        .bind(inbound.port)
        .bind(&inbound.header_type)
        .bind(inbound.max_clients)
        .bind(inbound.client_count)
        .bind(inbound.active)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn insert_plan(&self, plan: &Plan) -> Result<i64, PipelineError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
                INSERT INTO plans (name, protocol, traffic_gb, duration_days, ip_limit, server_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id;
            "#,
        )
        .bind(&plan.name)
        .bind(plan.protocol)
        .bind(plan.traffic_gb)
        .bind(plan.duration_days)
        .bind(plan.ip_limit)
        .bind(plan.server_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn upsert_customer(&self, customer_id: &str, referrer_id: Option<&str>) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        catalog::upsert_customer(customer_id, referrer_id, &mut conn).await
    }
}

impl PipelineDatabase for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder, items: &[NewLineItem]) -> Result<Order, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        for item in items {
            orders::insert_line_item(order.id, *item, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order #{} saved with id {}", order.order_id, order.id);
        Ok(order)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_order_id(order_id, &mut conn).await?)
    }

    async fn mark_order_paid(&self, order_id: &OrderId, external_ref: &str) -> Result<Option<Order>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_order_paid(order_id, external_ref, &mut conn).await
    }

    async fn update_order_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<Order, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order_status(order_id, status, &mut conn).await
    }

    async fn fetch_line_items(&self, order: &Order) -> Result<Vec<OrderLineItem>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_line_items(order.id, &mut conn).await?)
    }

    async fn fetch_plan(&self, plan_id: i64) -> Result<Plan, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        catalog::fetch_plan(plan_id, &mut conn).await
    }

    async fn fetch_server(&self, server_id: i64) -> Result<ServerRecord, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        catalog::fetch_server(server_id, &mut conn).await
    }

    async fn select_inbound(&self, server_id: i64, protocol: Protocol) -> Result<Inbound, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        catalog::select_inbound(server_id, protocol, &mut conn).await
    }

    async fn increment_inbound_clients(&self, inbound_id: i64) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        catalog::increment_inbound_clients(inbound_id, &mut conn).await
    }

    async fn fetch_provisioned_unit(
        &self,
        line_item_id: i64,
        unit_index: i64,
    ) -> Result<Option<ProvisionedClient>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(clients::fetch_provisioned_unit(line_item_id, unit_index, &mut conn).await?)
    }

    async fn insert_provisioned_client(
        &self,
        client: NewProvisionedClient,
    ) -> Result<ProvisionedClient, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        clients::insert_provisioned_client(client, &mut conn).await
    }

    async fn fetch_clients_for_order(&self, order: &Order) -> Result<Vec<ProvisionedClient>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(clients::fetch_clients_for_order(order.id, &mut conn).await?)
    }

    async fn record_unit_failure(&self, line_item_id: i64, unit_index: i64, reason: &str) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        clients::record_unit_failure(line_item_id, unit_index, reason, &mut conn).await
    }

    async fn clear_unit_failure(&self, line_item_id: i64, unit_index: i64) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        clients::clear_unit_failure(line_item_id, unit_index, &mut conn).await
    }

    async fn fetch_referrer(&self, customer_id: &str) -> Result<Option<String>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        catalog::fetch_referrer(customer_id, &mut conn).await
    }

    async fn count_referrals(&self, customer_id: &str) -> Result<i64, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        catalog::count_referrals(customer_id, &mut conn).await
    }
}

impl WalletLedger for SqliteDatabase {
    async fn balance(&self, customer_id: &str) -> Result<Money, WalletError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WalletError::DatabaseError(e.to_string()))?;
        wallet::balance(customer_id, &mut conn).await
    }

    async fn post_transaction(&self, tx: NewWalletTransaction) -> Result<WalletTransaction, WalletError> {
        let mut dbtx = self.pool.begin().await.map_err(|e| WalletError::DatabaseError(e.to_string()))?;
        let entry = wallet::post_transaction(tx, &mut dbtx).await?;
        dbtx.commit().await.map_err(|e| WalletError::DatabaseError(e.to_string()))?;
        Ok(entry)
    }

    async fn post_referral_credit(
        &self,
        tx: NewWalletTransaction,
        order_id: &OrderId,
    ) -> Result<Option<WalletTransaction>, WalletError> {
        let mut dbtx = self.pool.begin().await.map_err(|e| WalletError::DatabaseError(e.to_string()))?;
        let entry = wallet::post_referral_credit(tx, order_id, &mut dbtx).await?;
        dbtx.commit().await.map_err(|e| WalletError::DatabaseError(e.to_string()))?;
        Ok(entry)
    }

    async fn history(&self, customer_id: &str) -> Result<Vec<WalletTransaction>, WalletError> {
        let mut conn = self.pool.acquire().await.map_err(|e| WalletError::DatabaseError(e.to_string()))?;
        wallet::history(customer_id, &mut conn).await
    }
}

impl JobQueue for SqliteDatabase {
    async fn enqueue(&self, order_id: &OrderId) -> Result<Option<ProvisioningJob>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        jobs::enqueue(order_id, &mut conn).await
    }

    async fn claim_next_job(&self) -> Result<Option<ProvisioningJob>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        jobs::claim_next_job(&mut conn).await
    }

    async fn complete_job(&self, job_id: i64) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        jobs::complete_job(job_id, &mut conn).await
    }

    async fn fail_job(&self, job_id: i64, error: &str, max_attempts: i64) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        jobs::fail_job(job_id, error, max_attempts, &mut conn).await
    }
}
