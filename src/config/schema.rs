//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Pre-shared credential check.
    pub auth: AuthConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Per-upstream circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Retry and per-try timeout policy for upstream calls.
    pub forwarder: ForwarderConfig,

    /// Request size limits.
    pub security: SecurityConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Asynchronous audit event delivery.
    pub audit: AuditConfig,

    /// Route definitions mapping path prefixes to upstreams.
    pub routes: Vec<RouteConfig>,
}

/// Placeholder key shipped in the defaults. Change this in production.
pub const DEFAULT_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Credential check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Reject requests that do not carry the configured key.
    pub enabled: bool,

    /// Header carrying the key.
    pub header: String,

    /// Expected key value.
    pub api_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header: "X-API-Key".to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests allowed per client per window.
    pub capacity: u32,

    /// Window length in seconds. Buckets are refilled in full once it elapses.
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 5,
            window_secs: 10,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker open.
    pub failure_threshold: u32,

    /// Seconds to fail fast before allowing a trial call.
    pub cooldown_secs: u64,
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 10,
        }
    }
}

/// Retry and timeout policy for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Timeout applied to each individual attempt, in milliseconds.
    pub per_try_timeout_ms: u64,

    /// Base delay for exponential backoff between attempts (0 disables).
    pub base_delay_ms: u64,

    /// Maximum backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Headers stamped on every outbound call (service identity markers).
    pub identity_headers: BTreeMap<String, String>,
}

impl ForwarderConfig {
    pub fn per_try_timeout(&self) -> Duration {
        Duration::from_millis(self.per_try_timeout_ms)
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            per_try_timeout_ms: 300,
            base_delay_ms: 0,
            max_delay_ms: 1000,
            identity_headers: BTreeMap::new(),
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum buffered body size in bytes, inbound and upstream.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Where audit events are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    /// Emit each event as a structured log line.
    #[default]
    Log,
    /// POST each event as JSON to `endpoint`.
    Http,
}

/// Audit event delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub sink: AuditSinkKind,

    /// Collector URL for the http sink (e.g. "http://localhost:9000/logs").
    pub endpoint: Option<String>,

    /// Events buffered before new ones are dropped.
    pub queue_capacity: usize,

    /// Delivery attempts per event before it is dropped.
    pub max_attempts: u32,

    /// Timeout per delivery attempt in milliseconds.
    pub timeout_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sink: AuditSinkKind::Log,
            endpoint: None,
            queue_capacity: 1024,
            max_attempts: 3,
            timeout_ms: 1000,
        }
    }
}

/// Route configuration mapping a path prefix to an upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Upstream base address (e.g., "http://localhost:7001").
    pub upstream: String,

    /// Remove the matched prefix before forwarding.
    #[serde(default = "default_strip_prefix")]
    pub strip_prefix: bool,

    /// Degraded response served while the upstream's circuit is open.
    #[serde(default)]
    pub fallback: Option<FallbackConfig>,
}

fn default_strip_prefix() -> bool {
    true
}

/// Static response served instead of failing fast.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_status")]
    pub status: u16,
    pub body: String,
}

fn default_fallback_status() -> u16 {
    200
}
