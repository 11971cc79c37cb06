use anyhow::Context as _;
use reqwest::{Client, Method, header, redirect};

use crate::domain::repository::DeliveryClient;
use crate::domain::types::{OutboundRequest, OutboundResponse};
use crate::error::DeliveryError;

/// Outbound calls to destinations. Redirects are not followed, so a
/// destination cannot bounce the gateway onto another host.
#[derive(Clone)]
pub struct HttpDeliveryClient {
    pub client: Client,
}

impl HttpDeliveryClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(concat!("hooki-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build delivery http client")?;
        Ok(Self { client })
    }
}

impl DeliveryClient for HttpDeliveryClient {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, DeliveryError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| DeliveryError::InvalidRequest(format!("method {}", request.method)))?;
        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                DeliveryError::Timeout(request.timeout)
            } else if e.is_builder() {
                DeliveryError::InvalidRequest(e.to_string())
            } else {
                DeliveryError::Network(e.to_string())
            }
        };
        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(classify)?;
        Ok(OutboundResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}
