use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::external::energy_provider::{EnergyProvider, ExternalHourPoint, ProviderError};
use crate::models::TimeRange;

const TIBBER_API_URL: &str = "https://api.tibber.com/v1-beta/gql";

// `after` is a base64-encoded cursor of the interval start; `first` counts
// hours forward from it.
const CONSUMPTION_RANGE_QUERY: &str = r#"
query ConsumptionRange($homeId: ID!, $resolution: EnergyResolution!, $after: String!, $first: Int!) {
  viewer {
    home(id: $homeId) {
      consumption(resolution: $resolution, after: $after, first: $first) {
        nodes {
          from
          to
          consumption
          cost
          unitPrice
          currency
        }
      }
    }
  }
}
"#;

pub struct TibberProvider {
    client: reqwest::Client,
    token: String,
    home_id: String,
}

impl TibberProvider {
    pub fn new(token: String, home_id: String) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            client,
            token,
            home_id,
        })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let token = std::env::var("TIBBER_TOKEN")
            .map_err(|_| ProviderError::Auth("TIBBER_TOKEN not set".into()))?;
        let home_id = std::env::var("TIBBER_HOME_ID")
            .map_err(|_| ProviderError::BadRequest("TIBBER_HOME_ID not set".into()))?;
        Self::new(token, home_id)
    }

    fn after_cursor(start: DateTime<Utc>) -> String {
        BASE64.encode(start.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GqlResponse {
    data: Option<GqlData>,
    errors: Option<Vec<GqlError>>,
}

#[derive(Debug, Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GqlData {
    viewer: GqlViewer,
}

#[derive(Debug, Deserialize)]
struct GqlViewer {
    home: Option<GqlHome>,
}

#[derive(Debug, Deserialize)]
struct GqlHome {
    consumption: Option<GqlConsumption>,
}

#[derive(Debug, Deserialize)]
struct GqlConsumption {
    nodes: Vec<GqlConsumptionNode>,
}

#[derive(Debug, Deserialize)]
struct GqlConsumptionNode {
    from: DateTime<Utc>,
    consumption: Option<BigDecimal>,
    cost: Option<BigDecimal>,
    #[serde(rename = "unitPrice")]
    unit_price: Option<BigDecimal>,
    currency: Option<String>,
}

#[async_trait]
impl EnergyProvider for TibberProvider {
    async fn fetch_hours(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<ExternalHourPoint>, ProviderError> {
        let body = serde_json::json!({
            "query": CONSUMPTION_RANGE_QUERY,
            "variables": {
                "homeId": self.home_id,
                "resolution": "HOURLY",
                "after": Self::after_cursor(range.start),
                "first": range.hours(),
            }
        });

        let resp = self
            .client
            .post(TIBBER_API_URL)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::Auth(body),
                429 => ProviderError::RateLimited,
                400 => ProviderError::BadRequest(body),
                s if s >= 500 => ProviderError::Server { status: s, body },
                s => ProviderError::BadRequest(format!("unexpected status {}: {}", s, body)),
            });
        }

        let payload = resp
            .json::<GqlResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        // Tibber reports out-of-range and bad-argument queries as GraphQL
        // errors on an HTTP 200.
        if let Some(errors) = payload.errors {
            let messages = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(if messages.to_lowercase().contains("not available") {
                ProviderError::RangeUnavailable(messages)
            } else {
                ProviderError::BadRequest(messages)
            });
        }

        let nodes = payload
            .data
            .and_then(|d| d.viewer.home)
            .and_then(|h| h.consumption)
            .map(|c| c.nodes)
            .unwrap_or_default();

        Ok(nodes
            .into_iter()
            .map(|n| ExternalHourPoint {
                hour_ts: n.from,
                consumption: n.consumption,
                cost: n.cost,
                unit_price: n.unit_price,
                currency: n.currency,
            })
            .collect())
    }
}
