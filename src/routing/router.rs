//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Look up the route for a request path
//! - Build the upstream URI for a matched route
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest prefix wins; equal lengths go to the route registered first
//! - O(n) prefix scan (acceptable for typical route counts)
//! - Explicit no-match rather than a silent default

use axum::body::Bytes;
use axum::http::{StatusCode, Uri};
use url::{Position, Url};

use crate::config::RouteConfig;
use crate::routing::matcher::{Matcher, PathPrefixMatcher};

/// Error building the route table.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("route '{route}': invalid upstream '{upstream}': {source}")]
    InvalidUpstream {
        route: String,
        upstream: String,
        source: url::ParseError,
    },

    #[error("route '{route}': invalid fallback status {status}")]
    InvalidFallback { route: String, status: u16 },
}

/// Degraded response served while a route's upstream circuit is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub status: StatusCode,
    pub body: Bytes,
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    matcher: PathPrefixMatcher,
    upstream: Url,
    pub strip_prefix: bool,
    pub fallback: Option<Fallback>,
}

impl Route {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, upstream: Url) -> Self {
        Self {
            name: name.into(),
            matcher: PathPrefixMatcher::new(prefix),
            upstream,
            strip_prefix: true,
            fallback: None,
        }
    }

    pub fn from_config(config: &RouteConfig) -> Result<Self, RouterError> {
        let upstream = Url::parse(&config.upstream).map_err(|source| RouterError::InvalidUpstream {
            route: config.name.clone(),
            upstream: config.upstream.clone(),
            source,
        })?;

        let fallback = match &config.fallback {
            Some(fb) => Some(Fallback {
                status: StatusCode::from_u16(fb.status).map_err(|_| RouterError::InvalidFallback {
                    route: config.name.clone(),
                    status: fb.status,
                })?,
                body: Bytes::from(fb.body.clone()),
            }),
            None => None,
        };

        Ok(Self {
            strip_prefix: config.strip_prefix,
            fallback,
            ..Self::new(&config.name, &config.path_prefix, upstream)
        })
    }

    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }

    /// Key identifying the upstream: its origin (scheme, host, port).
    /// Routes reaching the same origin share a breaker, whatever their base path.
    pub fn upstream_key(&self) -> &str {
        &self.upstream[..Position::BeforePath]
    }

    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Build the outbound URI for an inbound path and query.
    pub fn upstream_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, axum::http::uri::InvalidUri> {
        let rest = if self.strip_prefix {
            self.matcher.remainder(path).unwrap_or(path)
        } else {
            path
        };

        let origin = &self.upstream[..Position::BeforePath];
        let path = join_paths(self.upstream.path(), rest);
        let uri = match query {
            Some(q) if !q.is_empty() => format!("{origin}{path}?{q}"),
            _ => format!("{origin}{path}"),
        };
        uri.parse()
    }
}

fn join_paths(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    match (base.is_empty(), rest.is_empty()) {
        (true, true) => "/".to_string(),
        (false, true) => base.to_string(),
        _ => format!("{base}/{rest}"),
    }
}

/// Immutable route table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RouterError> {
        let routes = configs.iter().map(Route::from_config).collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(routes))
    }

    /// Find the route for `path`, if any.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let mut best: Option<&Route> = None;
        for route in &self.routes {
            if !route.matcher.matches(path) {
                continue;
            }
            match best {
                Some(current) if current.matcher.specificity() >= route.matcher.specificity() => {}
                _ => best = Some(route),
            }
        }
        best
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Distinct upstream keys, in registration order.
    pub fn upstream_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for route in &self.routes {
            if !keys.contains(&route.upstream_key()) {
                keys.push(route.upstream_key());
            }
        }
        keys
    }
}
