use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------      Protocol      ----------------------------------------------------------
/// The proxy wire protocols the pipeline can provision. Adding a protocol here requires a matching adapter in the
/// panel client's adapter registry; nothing else in the system branches on protocol identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vless,
    Vmess,
    Trojan,
    Shadowsocks,
    Wireguard,
    Http,
}

impl Protocol {
    pub const ALL: [Protocol; 6] =
        [Protocol::Vless, Protocol::Vmess, Protocol::Trojan, Protocol::Shadowsocks, Protocol::Wireguard, Protocol::Http];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vless => "vless",
            Protocol::Vmess => "vmess",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Wireguard => "wireguard",
            Protocol::Http => "http",
        }
    }

    /// True for protocols whose credential is a username and password pair rather than a single UUID.
    pub fn uses_user_pass(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Shadowsocks)
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown proxy protocol: {0}")]
pub struct ProtocolParseError(String);

impl FromStr for Protocol {
    type Err = ProtocolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vless" => Ok(Protocol::Vless),
            "vmess" => Ok(Protocol::Vmess),
            "trojan" => Ok(Protocol::Trojan),
            "shadowsocks" | "ss" => Ok(Protocol::Shadowsocks),
            "wireguard" | "wg" => Ok(Protocol::Wireguard),
            "http" => Ok(Protocol::Http),
            other => Err(ProtocolParseError(other.to_string())),
        }
    }
}
