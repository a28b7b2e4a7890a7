use ppg_common::Protocol;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every panel endpoint answers with the same envelope. `obj` carries the endpoint-specific payload and may be
/// absent or null for mutating calls.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    #[serde(default = "Option::default")]
    pub obj: Option<T>,
}

/// Traffic counters for a single client, as reported by the panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTraffic {
    pub email: String,
    pub up: i64,
    pub down: i64,
    pub total: i64,
    pub expiry_time: i64,
    pub enable: bool,
}

impl ClientTraffic {
    pub fn used(&self) -> i64 {
        self.up + self.down
    }
}

/// Definition for a new inbound listener on the panel.
#[derive(Debug, Clone, Serialize)]
pub struct InboundSpec {
    pub remark: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Protocol-specific settings blob; the panel expects it serialized as a JSON string.
    pub settings: Value,
}
