//! API client for communicating with the Price Estimator API

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Cities served by `/predict/<city>`
pub const SUPPORTED_CITIES: [&str; 2] = ["lille", "bordeaux"];

/// API client for the Price Estimator API
pub struct ApiClient {
    client: Client,
    base_url: Url,
    credentials: Option<(String, String)>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, credentials: Option<(String, String)>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .authorize(self.client.post(url).json(body))
            .send()
            .await
            .context("Failed to send request")?;

        parse_response(response).await
    }

    /// Estimate the price per m² of a property
    pub async fn predict(&self, city: &str, request: &PredictRequest) -> Result<PredictionResponse> {
        let city = city.to_lowercase();
        if !SUPPORTED_CITIES.contains(&city.as_str()) {
            anyhow::bail!(
                "Unsupported city: {} (expected one of: {})",
                city,
                SUPPORTED_CITIES.join(", ")
            );
        }
        self.post(&format!("predict/{}", city), request).await
    }

    /// Fetch component health; a 503 still carries a health report
    pub async fn health(&self) -> Result<HealthReport> {
        let url = self.base_url.join("health").context("Invalid path")?;

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return response.json().await.context("Failed to parse response");
        }
        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.detail)
            .unwrap_or(body);
        anyhow::bail!("API error ({}): {}", status, message);
    }

    response.json().await.context("Failed to parse response")
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub surface_bati: f64,
    pub nombre_pieces: u32,
    pub type_local: String,
    pub surface_terrain: f64,
    pub nombre_lots: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prix_m2_estime: f64,
    pub ville_modele: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: BTreeMap<String, ComponentReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
