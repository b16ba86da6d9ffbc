//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and route
//! consistency. All errors are collected, not just the first.

use std::collections::HashSet;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::{AuditSinkKind, GatewayConfig, RouteConfig};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.enabled && config.auth.api_key.is_empty() {
        errors.push(ValidationError::new("auth.api_key", "must not be empty when auth is enabled"));
    }
    if config.auth.enabled && config.auth.header.is_empty() {
        errors.push(ValidationError::new("auth.header", "must not be empty"));
    }

    if config.rate_limit.capacity == 0 {
        errors.push(ValidationError::new("rate_limit.capacity", "must be greater than 0"));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be greater than 0"));
    }
    if config.breaker.cooldown_secs == 0 {
        errors.push(ValidationError::new("breaker.cooldown_secs", "must be greater than 0"));
    }

    if config.forwarder.per_try_timeout_ms == 0 {
        errors.push(ValidationError::new("forwarder.per_try_timeout_ms", "must be greater than 0"));
    }
    if config.forwarder.max_delay_ms < config.forwarder.base_delay_ms {
        errors.push(ValidationError::new("forwarder.max_delay_ms", "must not be below base_delay_ms"));
    }
    for (name, value) in &config.forwarder.identity_headers {
        let field = format!("forwarder.identity_headers.{name}");
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(field, "invalid header name"));
        } else if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(field, "invalid header value"));
        }
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if config.audit.enabled {
        if config.audit.queue_capacity == 0 {
            errors.push(ValidationError::new("audit.queue_capacity", "must be greater than 0"));
        }
        if config.audit.max_attempts == 0 {
            errors.push(ValidationError::new("audit.max_attempts", "must be greater than 0"));
        }
        if config.audit.sink == AuditSinkKind::Http {
            match config.audit.endpoint.as_deref().map(Url::parse) {
                Some(Ok(_)) => {}
                Some(Err(e)) => errors.push(ValidationError::new("audit.endpoint", e.to_string())),
                None => errors.push(ValidationError::new("audit.endpoint", "required for the http sink")),
            }
        }
    }

    validate_routes(&config.routes, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_routes(routes: &[RouteConfig], errors: &mut Vec<ValidationError>) {
    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();

    for (i, route) in routes.iter().enumerate() {
        let field = |name: &str| format!("routes[{i}].{name}");

        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(field("name"), format!("duplicate route name '{}'", route.name)));
        }

        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(field("path_prefix"), "must start with '/'"));
        } else if !prefixes.insert(route.path_prefix.as_str()) {
            errors.push(ValidationError::new(
                field("path_prefix"),
                format!("duplicate prefix '{}'", route.path_prefix),
            ));
        }

        match Url::parse(&route.upstream) {
            Ok(url) if url.scheme() != "http" => {
                errors.push(ValidationError::new(field("upstream"), "only http upstreams are supported"));
            }
            Ok(url) if url.host_str().is_none() => {
                errors.push(ValidationError::new(field("upstream"), "missing host"));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new(field("upstream"), e.to_string())),
        }

        if let Some(fallback) = &route.fallback {
            if !(100..=599).contains(&fallback.status) {
                errors.push(ValidationError::new(field("fallback.status"), "not a valid HTTP status"));
            }
        }
    }
}
