//! The six protocol adapters.
//!
//! Each adapter emits the `settings` fragment the panel's `addClient` endpoint expects for its protocol, and prints
//! the matching subscription URI. Traffic ceilings arrive here already converted to bytes and expiries as
//! millisecond epochs; adapters never do unit arithmetic themselves.

use ppg_common::Protocol;
use serde_json::{json, Value};
use urlencoding::encode;

use crate::{
    error::PanelClientError,
    protocol::{Credential, InboundProfile, ProtocolAdapter, ProvisionRequest},
};

fn require_uuid(req: &ProvisionRequest, protocol: Protocol) -> Result<String, PanelClientError> {
    match &req.credential {
        Credential::Uuid(id) => Ok(id.to_string()),
        Credential::UserPass { .. } => Err(PanelClientError::Validation(format!(
            "{protocol} clients are keyed by UUID, but a username/password credential was supplied"
        ))),
    }
}

fn require_user_pass(req: &ProvisionRequest, protocol: Protocol) -> Result<(String, String), PanelClientError> {
    match &req.credential {
        Credential::UserPass { username, password } => Ok((username.clone(), password.clone())),
        Credential::Uuid(_) => Err(PanelClientError::Validation(format!(
            "{protocol} clients are keyed by username/password, but a UUID credential was supplied"
        ))),
    }
}

//--------------------------------------       VLESS        ----------------------------------------------------------
pub struct VlessAdapter;

impl ProtocolAdapter for VlessAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Vless
    }

    fn build_settings(&self, req: &ProvisionRequest) -> Result<Value, PanelClientError> {
        let id = require_uuid(req, Protocol::Vless)?;
        Ok(json!({
            "clients": [{
                "id": id,
                "email": req.remark,
                "flow": "",
                "limitIp": req.ip_limit,
                "totalGB": req.traffic_limit_bytes,
                "expiryTime": req.expiry_millis(),
                "enable": true,
            }]
        }))
    }

    fn subscription_link(&self, profile: &InboundProfile, req: &ProvisionRequest) -> String {
        let header = profile.header_type.as_deref().unwrap_or("none");
        format!(
            "vless://{}@{}:{}?type=tcp&headerType={}&security=none#{}",
            req.credential.identifier(),
            profile.host,
            profile.port,
            header,
            encode(&req.remark)
        )
    }
}

//--------------------------------------       VMess        ----------------------------------------------------------
pub struct VmessAdapter;

impl ProtocolAdapter for VmessAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Vmess
    }

    fn build_settings(&self, req: &ProvisionRequest) -> Result<Value, PanelClientError> {
        let id = require_uuid(req, Protocol::Vmess)?;
        Ok(json!({
            "clients": [{
                "id": id,
                "email": req.remark,
                "alterId": 0,
                "limitIp": req.ip_limit,
                "totalGB": req.traffic_limit_bytes,
                "expiryTime": req.expiry_millis(),
                "enable": true,
            }]
        }))
    }

    fn subscription_link(&self, profile: &InboundProfile, req: &ProvisionRequest) -> String {
        // VMess links carry the whole client config as base64 JSON
        let config = json!({
            "v": "2",
            "ps": req.remark,
            "add": profile.host,
            "port": profile.port.to_string(),
            "id": req.credential.identifier(),
            "aid": "0",
            "net": "tcp",
            "type": profile.header_type.as_deref().unwrap_or("none"),
            "tls": "none",
        });
        format!("vmess://{}", base64::encode(config.to_string()))
    }
}

//--------------------------------------       Trojan       ----------------------------------------------------------
pub struct TrojanAdapter;

impl ProtocolAdapter for TrojanAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Trojan
    }

    fn build_settings(&self, req: &ProvisionRequest) -> Result<Value, PanelClientError> {
        let password = require_uuid(req, Protocol::Trojan)?;
        Ok(json!({
            "clients": [{
                "password": password,
                "email": req.remark,
                "limitIp": req.ip_limit,
                "totalGB": req.traffic_limit_bytes,
                "expiryTime": req.expiry_millis(),
                "enable": true,
            }]
        }))
    }

    fn subscription_link(&self, profile: &InboundProfile, req: &ProvisionRequest) -> String {
        format!(
            "trojan://{}@{}:{}?security=tls&type=tcp#{}",
            req.credential.identifier(),
            profile.host,
            profile.port,
            encode(&req.remark)
        )
    }
}

//--------------------------------------    Shadowsocks     ----------------------------------------------------------
pub struct ShadowsocksAdapter {
    method: String,
}

impl Default for ShadowsocksAdapter {
    fn default() -> Self {
        Self { method: "chacha20-ietf-poly1305".to_string() }
    }
}

impl ProtocolAdapter for ShadowsocksAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Shadowsocks
    }

    fn build_settings(&self, req: &ProvisionRequest) -> Result<Value, PanelClientError> {
        let (username, password) = require_user_pass(req, Protocol::Shadowsocks)?;
        Ok(json!({
            "clients": [{
                "method": self.method,
                "password": password,
                "email": username,
                "limitIp": req.ip_limit,
                "totalGB": req.traffic_limit_bytes,
                "expiryTime": req.expiry_millis(),
                "enable": true,
            }]
        }))
    }

    fn subscription_link(&self, profile: &InboundProfile, req: &ProvisionRequest) -> String {
        let password = req.credential.secret().unwrap_or_default();
        let userinfo = base64::encode(format!("{}:{}", self.method, password));
        format!("ss://{}@{}:{}#{}", userinfo, profile.host, profile.port, encode(&req.remark))
    }
}

//--------------------------------------     WireGuard      ----------------------------------------------------------
pub struct WireguardAdapter;

impl ProtocolAdapter for WireguardAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Wireguard
    }

    fn build_settings(&self, req: &ProvisionRequest) -> Result<Value, PanelClientError> {
        // The panel derives the peer keypair itself; our UUID identifies the peer slot.
        let id = require_uuid(req, Protocol::Wireguard)?;
        Ok(json!({
            "peers": [{
                "id": id,
                "email": req.remark,
                "totalGB": req.traffic_limit_bytes,
                "expiryTime": req.expiry_millis(),
                "enable": true,
            }]
        }))
    }

    fn subscription_link(&self, profile: &InboundProfile, req: &ProvisionRequest) -> String {
        format!(
            "wireguard://{}@{}:{}#{}",
            req.credential.identifier(),
            profile.host,
            profile.port,
            encode(&req.remark)
        )
    }
}

//--------------------------------------        HTTP        ----------------------------------------------------------
pub struct HttpAdapter;

impl ProtocolAdapter for HttpAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn build_settings(&self, req: &ProvisionRequest) -> Result<Value, PanelClientError> {
        let (username, password) = require_user_pass(req, Protocol::Http)?;
        Ok(json!({
            "accounts": [{
                "user": username,
                "pass": password,
            }],
            "allowTransparent": false,
        }))
    }

    fn subscription_link(&self, profile: &InboundProfile, req: &ProvisionRequest) -> String {
        let user = req.credential.identifier();
        let pass = req.credential.secret().unwrap_or_default();
        format!("http://{}:{}@{}:{}#{}", user, pass, profile.host, profile.port, encode(&req.remark))
    }
}
