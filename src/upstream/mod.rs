//! Outbound calls to upstream services.
//!
//! The forwarder only depends on the [`Upstream`] trait; `client.rs` provides
//! the hyper-based implementation used in production.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};

pub use client::HyperUpstream;

/// A fully buffered outbound request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream answered {0}")]
    ServerError(StatusCode),

    /// The upstream answered, but with a body over the relay limit.
    #[error("response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

/// Something that can carry one request to an upstream and bring back its response.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Perform a single call. Retries and timeouts are applied by the caller.
    async fn call(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process upstream that plays back a fixed script of outcomes.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub enum Scripted {
        Status(u16),
        TransportError,
        /// Answer with the status after sleeping.
        Delay(Duration, u16),
        /// Answer with a body over the relay limit.
        Oversized,
    }

    #[derive(Default)]
    pub struct ScriptedUpstream {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicU32,
        requests: Mutex<Vec<UpstreamRequest>>,
    }

    impl ScriptedUpstream {
        pub fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<UpstreamRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        async fn call(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            let next = self.script.lock().unwrap().pop_front();

            match next {
                Some(Scripted::Status(code)) => Ok(UpstreamResponse::new(status(code), "")),
                Some(Scripted::Delay(delay, code)) => {
                    tokio::time::sleep(delay).await;
                    Ok(UpstreamResponse::new(status(code), ""))
                }
                Some(Scripted::Oversized) => Err(UpstreamError::ResponseTooLarge { limit: 16 }),
                Some(Scripted::TransportError) => Err(UpstreamError::Transport("connection refused".into())),
                None => Err(UpstreamError::Transport("script exhausted".into())),
            }
        }
    }

    fn status(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap()
    }
}
