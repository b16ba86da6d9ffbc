//! Hyper-based upstream client.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use futures_util::StreamExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::upstream::{Upstream, UpstreamError, UpstreamRequest, UpstreamResponse};

/// Pooled HTTP/1.1 + HTTP/2 client.
#[derive(Clone)]
pub struct HyperUpstream {
    client: Client<HttpConnector, Body>,
    max_body_size: usize,
}

impl HyperUpstream {
    pub fn new(max_body_size: usize) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            max_body_size,
        }
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn call(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let mut builder = hyper::Request::builder().method(request.method).uri(request.uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let req = builder
            .body(Body::from(request.body))
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = read_bounded(Body::new(body), self.max_body_size).await?;

        Ok(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

/// Buffer a response body, giving up with `ResponseTooLarge` once it grows past `limit`.
async fn read_bounded(body: Body, limit: usize) -> Result<Bytes, UpstreamError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UpstreamError::Transport(format!("reading body: {e}")))?;
        if buf.len() + chunk.len() > limit {
            return Err(UpstreamError::ResponseTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}
