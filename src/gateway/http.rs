//! JSON-over-HTTP gateway

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::submission::OrderSubmission;
use super::{page_count, GatewayError, ListQuery, OrderGateway, OrderPage, TokenProvider};

#[derive(Clone, Debug)]
pub struct HttpGatewayConfig {
    /// e.g. `https://api.example.com/api`; `/orders` is appended.
    pub base_url: String,
    pub timeout: Duration,
}

impl HttpGatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), timeout: Duration::from_secs(30) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct ListEnvelope {
    data: Vec<Order>,
    #[serde(default)]
    total: u64,
    #[serde(default, rename = "totalPages", alias = "total_pages")]
    total_pages: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderEnvelope {
    Wrapped { data: Order },
    Bare(Order),
}

impl OrderEnvelope {
    fn into_order(self) -> Order {
        match self { Self::Wrapped { data } | Self::Bare(data) => data }
    }
}

/// Body of a 400/422 response.
#[derive(Deserialize, Default)]
struct ValidationBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, Vec<String>>,
}

#[derive(Clone)]
pub struct HttpOrderGateway {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for HttpOrderGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOrderGateway").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl HttpOrderGateway {
    pub fn new(config: &HttpGatewayConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_string(), tokens })
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    fn url(&self, path: &str) -> String { format!("{}/{}", self.base_url, path.trim_start_matches('/')) }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, subject: &str) -> Result<T, GatewayError> {
        let response = self.authorize(request).send().await?;
        Self::handle_response(response, subject).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response, subject: &str) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return Ok(serde_json::from_slice(&body)?);
        }
        match status {
            StatusCode::UNAUTHORIZED => Err(GatewayError::Unauthorized),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound(subject.to_string())),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let parsed: ValidationBody = serde_json::from_slice(&body).unwrap_or_default();
                let message = parsed.message.unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
                Err(GatewayError::ServerValidation { message, fields: parsed.errors })
            }
            _ => Err(GatewayError::Server { status: status.as_u16(), body: String::from_utf8_lossy(&body).into_owned() }),
        }
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    #[tracing::instrument(skip(self), err(Display))]
    async fn list_orders(&self, query: ListQuery) -> Result<OrderPage, GatewayError> {
        let request = self.client.get(self.url("orders")).query(&[
            ("page", query.page.to_string()),
            ("limit", query.page_size.to_string()),
            ("sort_by", "created_at".to_string()),
            ("order", query.sort.as_query().to_string()),
        ]);
        let envelope: ListEnvelope = self.send(request, "orders").await?;
        let total_pages = envelope.total_pages.unwrap_or_else(|| page_count(envelope.total, query.page_size)).max(1);
        tracing::debug!(count = envelope.data.len(), total = envelope.total, total_pages, "listed orders");
        Ok(OrderPage { items: envelope.data, total: envelope.total, total_pages })
    }

    #[tracing::instrument(skip_all, fields(customer_id = %submission.customer_id, lines = submission.items.len()), err(Display))]
    async fn create_order(&self, submission: &OrderSubmission) -> Result<Order, GatewayError> {
        let request = self.client.post(self.url("orders")).json(submission);
        let envelope: OrderEnvelope = self.send(request, "new order").await?;
        Ok(envelope.into_order())
    }

    #[tracing::instrument(skip(self), err(Display))]
    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<Order, GatewayError> {
        let request = self.client.put(self.url(&format!("orders/{id}"))).json(&serde_json::json!({ "status": status }));
        let envelope: OrderEnvelope = self.send(request, id).await?;
        Ok(envelope.into_order())
    }
}
