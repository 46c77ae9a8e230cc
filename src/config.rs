//! Session configuration.

use serde::Deserialize;
use std::time::Duration;

/// Configuration for one session against a query node.
///
/// Immutable after the session is created. Defaults mirror the server's
/// documented tuning: generous network timeout, 5000-row batches, one-hour
/// query time-to-live, 10 s long-poll period.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hostname of the query node.
    pub host: String,
    /// Port of the query node.
    pub port: u16,
    /// Username for basic authentication.
    pub username: String,
    /// Password for basic authentication.
    pub password: String,
    /// Socket/connect timeout per HTTP call, in milliseconds.
    pub network_timeout_millis: u64,
    /// Seconds of inactivity after which the server drops query state; sent
    /// with every submission.
    pub query_time_to_live_secs: u64,
    /// Rows requested per fetch.
    pub batch_size: u32,
    /// Per-retry wait hint sent to the server (`longPollTimeout`) and the
    /// local budget decrement, in milliseconds.
    pub polling_period_millis: u64,
    /// Overall local retry budget for one fetch, in seconds. `None` falls
    /// back to the query time-to-live.
    pub polling_timeout_secs: Option<u64>,
    /// Cap on concurrently outstanding operations; also sizes the transport
    /// connection pool.
    pub concurrent_statements: usize,
    /// Use TLS. Disable only for local development or tests against a
    /// plain-HTTP server; the trust options are ignored when off.
    pub use_tls: bool,
    /// TLS trust options, exactly one mechanism must be configured when
    /// `use_tls` is set.
    pub tls: TlsOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 9681,
            username: String::new(),
            password: String::new(),
            network_timeout_millis: 600_000,
            query_time_to_live_secs: 3600,
            batch_size: 5000,
            polling_period_millis: 10_000,
            polling_timeout_secs: None,
            concurrent_statements: 30,
            use_tls: true,
            tls: TlsOptions::default(),
        }
    }
}

impl SessionConfig {
    pub(crate) fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_millis)
    }

    /// Overall long-poll budget for a single fetch task.
    pub(crate) fn polling_timeout(&self) -> Duration {
        Duration::from_secs(
            self.polling_timeout_secs
                .unwrap_or(self.query_time_to_live_secs),
        )
    }

    pub(crate) fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// TLS trust options. The three trust mechanisms are mutually exclusive and
/// resolved in order: fingerprints, then trust store, then insecure mode.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// Comma-separated list of accepted certificate fingerprints, each as
    /// `algorithm:hex-bytes`, e.g. `SHA-256:AB:0F:...`.
    pub accepted_certificate_fingerprints: Option<String>,
    /// Path to a PEM bundle of trusted CA certificates.
    pub trust_store_path: Option<String>,
    /// Trust-store password. Required alongside the path for the trust-store
    /// mechanism to be selected; PEM bundles are not encrypted, so the value
    /// itself is not used for decryption.
    pub trust_store_password: Option<String>,
    /// Accept every certificate and skip hostname verification.
    pub insecure_mode: bool,
    /// Skip hostname verification while still validating the chain.
    pub no_hostname_verification: bool,
}

impl TlsOptions {
    /// Whether hostname verification is disabled, independently of the
    /// trust mechanism.
    pub(crate) fn verify_hostname(&self) -> bool {
        !(self.insecure_mode || self.no_hostname_verification)
    }
}
