use crate::domain::entities::account::AccountRef;
use crate::domain::entities::history::{value_to_f64, value_to_string, HistoryPayload};
use crate::domain::entities::instrument::InstrumentDetails;
use crate::domain::errors::BrokerError;
use crate::domain::repositories::broker_client::{BrokerClient, BrokerResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Broker REST API configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub api_base: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

/// HTTP client for the broker's history and instrument endpoints
pub struct HttpBrokerClient {
    client: Client,
    base: Url,
}

impl HttpBrokerClient {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let mut base = Url::parse(&config.api_base)
            .map_err(|e| BrokerError::InvalidResponse(format!("Invalid API base: {}", e)))?;
        // Url::join drops the last segment unless the base ends with a slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("tradepulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BrokerError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BrokerError> {
        self.base
            .join(path)
            .map_err(|e| BrokerError::InvalidResponse(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn get_json(&self, account: &AccountRef, url: Url) -> BrokerResult<Value> {
        debug!(account_id = %account.account_id, url = %url, "Broker GET");

        let response = self
            .client
            .get(url)
            .bearer_auth(&account.access_token)
            .header("accNum", &account.account_number)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Unauthorized(format!("{} - {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            BrokerError::InvalidResponse(format!("Failed to parse broker response: {}", e))
        })
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn fetch_history(&self, account: &AccountRef) -> BrokerResult<HistoryPayload> {
        let url = self.endpoint(&format!(
            "trade/accounts/{}/ordersHistory",
            account.account_id
        ))?;
        let body = self.get_json(account, url).await?;
        let payload = HistoryPayload::sniff(&body).map_err(BrokerError::InvalidResponse)?;

        info!(
            account_id = %account.account_id,
            records = payload.len(),
            grouped = matches!(payload, HistoryPayload::Grouped(_)),
            "Fetched order history"
        );
        Ok(payload)
    }

    async fn fetch_instrument(
        &self,
        account: &AccountRef,
        instrument_id: &str,
        route_id: &str,
    ) -> BrokerResult<InstrumentDetails> {
        let mut url = self.endpoint(&format!("trade/instruments/{}", instrument_id))?;
        url.query_pairs_mut().append_pair("routeId", route_id);

        let body = self.get_json(account, url).await?;
        Ok(parse_instrument(&body))
    }
}

/// Pull `name` and `lotSize` out of `details.d`, `d` or the root object
fn parse_instrument(body: &Value) -> InstrumentDetails {
    let root = body.get("details").unwrap_or(body);
    let data = root.get("d").unwrap_or(root);

    InstrumentDetails {
        name: data.get("name").and_then(value_to_string),
        lot_size: data.get("lotSize").and_then(value_to_f64),
    }
}
