use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use chrono::{DateTime, Duration, Utc};
use log::error;
use panel_client::InboundProfile;
use ppg_common::{gb_to_bytes, Money, Protocol};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    PaymentStatus      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// No verified payment has been received yet.
    Pending,
    /// A verified payment covered the order in full. This state is entered exactly once.
    Paid,
    /// The gateway reported a definitive payment failure.
    Failed,
    /// The payment was refunded via an explicit ledger operation.
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Paid => write!(f, "Paid"),
            PaymentStatus::Failed => write!(f, "Failed"),
            PaymentStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct StatusConversionError(String);

impl StatusConversionError {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }
}

impl FromStr for PaymentStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            "Refunded" => Ok(Self::Refunded),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------     OrderStatus       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created at checkout; nothing has happened yet.
    New,
    /// Payment received, provisioning under way (or awaiting a retried job).
    Processing,
    /// Every unit was provisioned.
    Completed,
    /// Some units provisioned, some failed. A valid terminal state; succeeded units stay usable.
    PartiallyFailed,
    Cancelled,
    Dispute,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::New => write!(f, "New"),
            OrderStatus::Processing => write!(f, "Processing"),
            OrderStatus::Completed => write!(f, "Completed"),
            OrderStatus::PartiallyFailed => write!(f, "PartiallyFailed"),
            OrderStatus::Cancelled => write!(f, "Cancelled"),
            OrderStatus::Dispute => write!(f, "Dispute"),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to New");
            OrderStatus::New
        })
    }
}

impl FromStr for OrderStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "PartiallyFailed" => Ok(Self::PartiallyFailed),
            "Cancelled" => Ok(Self::Cancelled),
            "Dispute" => Ok(Self::Dispute),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    pub total_price: Money,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    /// The gateway-side payment identifier, recorded when the order is marked paid.
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_id: String,
    pub total_price: Money,
    pub currency: String,
}

impl NewOrder {
    pub fn new(order_id: OrderId, customer_id: String, total_price: Money) -> Self {
        Self { order_id, customer_id, total_price, currency: "USD".to_string() }
    }
}

//--------------------------------------    OrderLineItem      -------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct OrderLineItem {
    pub id: i64,
    /// Internal id of the owning order.
    pub order_id: i64,
    pub plan_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct NewLineItem {
    pub plan_id: i64,
    pub quantity: i64,
}

//--------------------------------------         Plan          -------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub protocol: Protocol,
    /// Traffic ceiling in GB. Zero means unlimited.
    pub traffic_gb: i64,
    pub duration_days: i64,
    pub ip_limit: i64,
    pub server_id: i64,
}

impl Plan {
    pub fn traffic_limit_bytes(&self) -> i64 {
        gb_to_bytes(self.traffic_gb)
    }

    pub fn expiry_from(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + Duration::days(self.duration_days)
    }
}

//--------------------------------------     ServerRecord      -------------------------------------------------------
/// A provisioning target. Owned centrally by the storefront's admin side; the pipeline only reads these.
#[derive(Clone, FromRow)]
pub struct ServerRecord {
    pub id: i64,
    pub name: String,
    /// Base URL of the panel API, e.g. "https://panel1.example.net:2053"
    pub panel_url: String,
    pub username: String,
    pub password: String,
    /// Hostname embedded in subscription links. Often differs from the panel API host.
    pub sub_host: String,
    pub active: bool,
}

impl Debug for ServerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServerRecord {{ id: {}, name: {}, panel_url: {}, password: **** }}", self.id, self.name, self.panel_url)
    }
}

//--------------------------------------       Inbound         -------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Inbound {
    pub id: i64,
    pub server_id: i64,
    /// The inbound's numeric id on the remote panel.
    pub remote_id: i64,
    pub protocol: Protocol,
    pub port: i64,
    pub header_type: Option<String>,
    /// Zero means unbounded.
    pub max_clients: i64,
    pub client_count: i64,
    pub active: bool,
}

impl Inbound {
    pub fn has_capacity(&self) -> bool {
        self.max_clients == 0 || self.client_count < self.max_clients
    }

    pub fn profile(&self, sub_host: &str) -> InboundProfile {
        InboundProfile {
            protocol: self.protocol,
            host: sub_host.to_string(),
            port: self.port as u16,
            remote_id: self.remote_id,
            header_type: self.header_type.clone(),
        }
    }
}

//--------------------------------------  ProvisionedClient    -------------------------------------------------------
/// The credential/config record issued for one purchased unit. Created only by the provisioning pipeline; deleted
/// only by explicit revocation, never by the pipeline itself.
#[derive(Debug, Clone, FromRow)]
pub struct ProvisionedClient {
    pub id: i64,
    pub line_item_id: i64,
    pub unit_index: i64,
    pub inbound_id: i64,
    pub protocol: Protocol,
    /// UUID, or username for user/pass protocols.
    pub credential_id: String,
    pub credential_secret: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub traffic_limit_bytes: i64,
    pub subscription_link: String,
    /// SVG QR artifact rendered from the subscription link.
    pub qr_svg: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProvisionedClient {
    pub line_item_id: i64,
    pub unit_index: i64,
    pub inbound_id: i64,
    pub protocol: Protocol,
    pub credential_id: String,
    pub credential_secret: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub traffic_limit_bytes: i64,
    pub subscription_link: String,
    pub qr_svg: String,
}

//--------------------------------------   TransactionType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionType {
    ReferralCommission,
    Refund,
    Deposit,
    Purchase,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::ReferralCommission => write!(f, "ReferralCommission"),
            TransactionType::Refund => write!(f, "Refund"),
            TransactionType::Deposit => write!(f, "Deposit"),
            TransactionType::Purchase => write!(f, "Purchase"),
        }
    }
}

//--------------------------------------  WalletTransaction    -------------------------------------------------------
/// One entry in a customer's append-only wallet ledger. The `order_id` + `is_referral` metadata pair is what the
/// referral idempotency check keys on.
#[derive(Debug, Clone, FromRow)]
pub struct WalletTransaction {
    pub id: i64,
    pub customer_id: String,
    pub amount: Money,
    pub tx_type: TransactionType,
    pub order_id: Option<String>,
    pub is_referral: bool,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWalletTransaction {
    pub customer_id: String,
    pub amount: Money,
    pub tx_type: TransactionType,
    pub order_id: Option<OrderId>,
    pub is_referral: bool,
    pub memo: Option<String>,
}
