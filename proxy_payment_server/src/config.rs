use std::env;

use log::*;
use ppg_common::{helpers::parse_boolean_flag, Secret};

const DEFAULT_PPG_HOST: &str = "127.0.0.1";
const DEFAULT_PPG_PORT: u16 = 8360;
const DEFAULT_WORKER_POLL_SECS: u64 = 5;
const DEFAULT_JOB_MAX_ATTEMPTS: i64 = 5;
const DEFAULT_ZARINPAL_VERIFY_URL: &str = "https://api.zarinpal.com/pg/v4/payment/verify.json";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub nowpayments: NowPaymentsConfig,
    pub zarinpal: ZarinpalConfig,
    pub worker: WorkerConfig,
}

#[derive(Clone, Debug, Default)]
pub struct NowPaymentsConfig {
    /// Key for the IPN HMAC-SHA512 signature check.
    pub ipn_secret: Secret<String>,
    /// If false, signature checks are skipped. Never disable this outside of local development.
    pub signature_checks: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ZarinpalConfig {
    pub merchant_id: String,
    pub verify_url: String,
}

#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    /// How often the provisioning worker polls the job queue when it is empty.
    pub poll_interval_secs: u64,
    /// A job is parked in `Failed` after this many attempts.
    pub max_attempts: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { poll_interval_secs: DEFAULT_WORKER_POLL_SECS, max_attempts: DEFAULT_JOB_MAX_ATTEMPTS }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PPG_HOST.to_string(),
            port: DEFAULT_PPG_PORT,
            database_url: String::default(),
            nowpayments: NowPaymentsConfig::default(),
            zarinpal: ZarinpalConfig {
                merchant_id: String::default(),
                verify_url: DEFAULT_ZARINPAL_VERIFY_URL.to_string(),
            },
            worker: WorkerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PPG_HOST").ok().unwrap_or_else(|| DEFAULT_PPG_HOST.into());
        let port = env::var("PPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for PPG_PORT. {e} Using the default, {DEFAULT_PPG_PORT}, instead."
                    );
                    DEFAULT_PPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PPG_PORT);
        let database_url = env::var("PPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PPG_DATABASE_URL is not set. Please set it to the URL for the pipeline database.");
            String::default()
        });
        let ipn_secret = env::var("PPG_NOWPAYMENTS_IPN_SECRET").map(Secret::new).unwrap_or_else(|_| {
            warn!("🪛️ PPG_NOWPAYMENTS_IPN_SECRET is not set. IPN signatures cannot be verified.");
            Secret::default()
        });
        let signature_checks = !parse_boolean_flag(env::var("PPG_DISABLE_IPN_SIGNATURE_CHECKS").ok(), false);
        if !signature_checks {
            warn!("🪛️ IPN signature checks are DISABLED. Anyone can mark orders as paid. Never do this in production.");
        }
        let merchant_id = env::var("PPG_ZARINPAL_MERCHANT_ID").ok().unwrap_or_default();
        let verify_url =
            env::var("PPG_ZARINPAL_VERIFY_URL").ok().unwrap_or_else(|| DEFAULT_ZARINPAL_VERIFY_URL.to_string());
        let poll_interval_secs = env::var("PPG_WORKER_POLL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_WORKER_POLL_SECS);
        let max_attempts = env::var("PPG_JOB_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_JOB_MAX_ATTEMPTS);
        Self {
            host,
            port,
            database_url,
            nowpayments: NowPaymentsConfig { ipn_secret, signature_checks },
            zarinpal: ZarinpalConfig { merchant_id, verify_url },
            worker: WorkerConfig { poll_interval_secs, max_attempts },
        }
    }
}
