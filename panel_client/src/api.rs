use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    config::PanelConfig,
    data_objects::{ClientTraffic, InboundSpec, PanelResponse},
    error::PanelClientError,
};

const MAX_ATTEMPTS: u32 = 4;
const BACKOFF_BASE_MS: u64 = 500;

/// The operations a remote panel exposes. [`PanelClient`] is the production implementation; the provisioning
/// engine and its tests substitute fakes through this seam.
#[allow(async_fn_in_trait)]
pub trait PanelApi {
    /// Attaches a new client to the given inbound. `settings` is the protocol-specific payload built by an adapter.
    async fn add_client(&self, inbound_id: i64, settings: &Value) -> Result<Value, PanelClientError>;

    async fn update_client(&self, inbound_id: i64, client_id: &str, settings: &Value)
        -> Result<Value, PanelClientError>;

    async fn delete_client(&self, inbound_id: i64, client_id: &str) -> Result<(), PanelClientError>;

    /// Fetches traffic counters for a client by its panel-side label. `None` if the panel does not know the client.
    async fn get_client_traffic(&self, email: &str) -> Result<Option<ClientTraffic>, PanelClientError>;

    /// Creates a new inbound listener, returning the panel's record of it.
    async fn create_inbound(&self, spec: &InboundSpec) -> Result<Value, PanelClientError>;
}

/// Stateless wrapper around one panel server's HTTP API. Owns the session cookie and the retry policy: transient
/// failures (network, 5xx) are retried with bounded exponential backoff, authentication and validation failures
/// fail immediately.
#[derive(Clone)]
pub struct PanelClient {
    config: PanelConfig,
    client: Arc<Client>,
    logged_in: Arc<AtomicBool>,
}

impl PanelClient {
    pub fn new(config: PanelConfig) -> Result<Self, PanelClientError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .build()
            .map_err(|e| PanelClientError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), logged_in: Arc::new(AtomicBool::new(false)) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Authenticates against the panel's session endpoint. The session cookie lives in the client's cookie store.
    pub async fn login(&self) -> Result<(), PanelClientError> {
        trace!("🛰️ Logging in to panel at {}", self.config.base_url);
        let body = [("username", self.config.username.as_str()), ("password", self.config.password.reveal().as_str())];
        let response = self
            .client
            .post(self.url("/login"))
            .form(&body)
            .send()
            .await
            .map_err(|e| PanelClientError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PanelClientError::Authentication(format!("Login endpoint returned {status}")));
        }
        let result: PanelResponse<Value> =
            response.json().await.map_err(|e| PanelClientError::Json(e.to_string()))?;
        if !result.success {
            return Err(PanelClientError::Authentication(result.msg));
        }
        self.logged_in.store(true, Ordering::SeqCst);
        debug!("🛰️ Panel session established for {}", self.config.base_url);
        Ok(())
    }

    async fn ensure_session(&self) -> Result<(), PanelClientError> {
        if !self.logged_in.load(Ordering::SeqCst) {
            self.login().await?;
        }
        Ok(())
    }

    /// One raw request/response cycle, classified into the error taxonomy. No retries here.
    async fn request_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<PanelResponse<T>, PanelClientError> {
        let mut req = self.client.request(method, self.url(path));
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await.map_err(|e| PanelClientError::Network(e.to_string()))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.logged_in.store(false, Ordering::SeqCst);
            return Err(PanelClientError::Authentication(format!("Panel returned {status} for {path}")));
        }
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(PanelClientError::Transient { status: status.as_u16(), message });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PanelClientError::Validation(format!("Panel returned {status} for {path}: {message}")));
        }
        response.json::<PanelResponse<T>>().await.map_err(|e| PanelClientError::Json(e.to_string()))
    }

    /// Issues a panel call with the retry policy applied, unwrapping the response envelope. A `success: false`
    /// envelope is a validation failure and is never retried.
    async fn call(&self, op: &str, path: &str, body: Option<Value>) -> Result<Value, PanelClientError> {
        self.ensure_session().await?;
        let result = with_retry(op, || async {
            let response = self.request_once::<Value>(Method::POST, path, body.as_ref()).await?;
            unwrap_envelope(response)
        })
        .await;
        // One re-login attempt when the session has expired mid-flight
        if matches!(result, Err(PanelClientError::Authentication(_))) {
            warn!("🛰️ Panel session expired during '{op}'. Re-authenticating once.");
            self.login().await?;
            let response = self.request_once::<Value>(Method::POST, path, body.as_ref()).await?;
            return unwrap_envelope(response);
        }
        result
    }
}

fn unwrap_envelope(response: PanelResponse<Value>) -> Result<Value, PanelClientError> {
    if response.success {
        Ok(response.obj.unwrap_or(Value::Null))
    } else {
        Err(PanelClientError::Validation(response.msg))
    }
}

/// Runs `f` up to [`MAX_ATTEMPTS`] times, sleeping `BACKOFF_BASE_MS * 2^(attempt-1)` between attempts. Only
/// transient errors are retried.
async fn with_retry<T, Fut>(op: &str, mut f: impl FnMut() -> Fut) -> Result<T, PanelClientError>
where Fut: Future<Output = Result<T, PanelClientError>> {
    let mut last_error = String::new();
    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            let delay = BACKOFF_BASE_MS * (1 << (attempt - 1));
            trace!("🛰️ Retrying '{op}' (attempt {}) after {delay}ms", attempt + 1);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() => {
                warn!("🛰️ Transient failure in '{op}' on attempt {}: {e}", attempt + 1);
                last_error = e.to_string();
            },
            Err(e) => return Err(e),
        }
    }
    Err(PanelClientError::RetriesExhausted { op: op.to_string(), attempts: MAX_ATTEMPTS, last_error })
}

impl PanelApi for PanelClient {
    async fn add_client(&self, inbound_id: i64, settings: &Value) -> Result<Value, PanelClientError> {
        let body = json!({ "id": inbound_id, "settings": settings.to_string() });
        debug!("🛰️ Adding client to inbound #{inbound_id}");
        let obj = self.call("addClient", "/panel/api/inbounds/addClient", Some(body)).await?;
        info!("🛰️ Client added to inbound #{inbound_id}");
        Ok(obj)
    }

    async fn update_client(
        &self,
        inbound_id: i64,
        client_id: &str,
        settings: &Value,
    ) -> Result<Value, PanelClientError> {
        let body = json!({ "id": inbound_id, "settings": settings.to_string() });
        let path = format!("/panel/api/inbounds/updateClient/{client_id}");
        debug!("🛰️ Updating client {client_id} on inbound #{inbound_id}");
        self.call("updateClient", &path, Some(body)).await
    }

    async fn delete_client(&self, inbound_id: i64, client_id: &str) -> Result<(), PanelClientError> {
        let path = format!("/panel/api/inbounds/{inbound_id}/delClient/{client_id}");
        debug!("🛰️ Deleting client {client_id} from inbound #{inbound_id}");
        self.call("deleteClient", &path, None).await?;
        info!("🛰️ Client {client_id} deleted from inbound #{inbound_id}");
        Ok(())
    }

    async fn get_client_traffic(&self, email: &str) -> Result<Option<ClientTraffic>, PanelClientError> {
        self.ensure_session().await?;
        let path = format!("/panel/api/inbounds/getClientTraffics/{email}");
        let response = with_retry("getClientTraffic", || async {
            self.request_once::<ClientTraffic>(Method::GET, &path, None).await
        })
        .await?;
        if !response.success {
            return Err(PanelClientError::Validation(response.msg));
        }
        Ok(response.obj)
    }

    async fn create_inbound(&self, spec: &InboundSpec) -> Result<Value, PanelClientError> {
        let body = json!({
            "remark": spec.remark,
            "port": spec.port,
            "protocol": spec.protocol,
            "settings": spec.settings.to_string(),
            "enable": true,
        });
        debug!("🛰️ Creating {} inbound '{}' on port {}", spec.protocol, spec.remark, spec.port);
        let obj = self.call("createInbound", "/panel/api/inbounds/add", Some(body)).await?;
        info!("🛰️ Inbound '{}' created", spec.remark);
        Ok(obj)
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU32;

    use super::*;

    #[tokio::test]
    async fn retry_gives_up_after_bounded_attempts() {
        tokio::time::pause();
        let calls = AtomicU32::new(0);
        let fut = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(PanelClientError::Transient { status: 503, message: "busy".into() }) }
        });
        let err = fut.await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
        assert!(matches!(err, PanelClientError::RetriesExhausted { attempts: MAX_ATTEMPTS, .. }));
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(PanelClientError::Validation("bad settings".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, PanelClientError::Validation(_)));
    }

    #[tokio::test]
    async fn transient_failure_then_success_recovers() {
        tokio::time::pause();
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(PanelClientError::Network("connection reset".into()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn envelope_failure_is_validation() {
        let response: PanelResponse<Value> =
            serde_json::from_str(r#"{"success": false, "msg": "client exists", "obj": null}"#).unwrap();
        let err = unwrap_envelope(response).unwrap_err();
        assert!(matches!(err, PanelClientError::Validation(m) if m == "client exists"));
    }

    #[test]
    fn envelope_success_yields_obj() {
        let response: PanelResponse<Value> =
            serde_json::from_str(r#"{"success": true, "msg": "", "obj": {"id": 3}}"#).unwrap();
        let obj = unwrap_envelope(response).unwrap();
        assert_eq!(obj["id"].as_i64().unwrap(), 3);
    }
}
