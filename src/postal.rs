use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::circuit_breaker::{create_provider_circuit_breaker, Breaker};
use crate::errors::LookupError;
use crate::lookup_cache::{LookupCache, LookupKey};
use crate::models::AddressFields;

/// One external source of address data by postal code (CEP).
///
/// `Ok(None)` is an explicit "not found" from the provider; `Err` is a
/// failure that makes the service try the next provider.
#[async_trait]
pub trait PostalProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, postal_code: &str) -> Result<Option<AddressFields>, LookupError>;
}

#[derive(Debug, Clone, Copy)]
enum PostalApi {
    ViaCep,
    BrasilApi,
}

/// Postal provider reached over HTTP (ViaCEP or BrasilAPI).
pub struct HttpPostalProvider {
    api: PostalApi,
    client: Client,
    base_url: String,
    breaker: Arc<dyn Breaker>,
}

impl HttpPostalProvider {
    /// `GET {base_url}/ws/{cep}/json/`
    pub fn viacep(base_url: &str, timeout: Duration) -> Self {
        Self::build(PostalApi::ViaCep, base_url, timeout)
    }

    /// `GET {base_url}/api/cep/v1/{cep}`
    pub fn brasilapi(base_url: &str, timeout: Duration) -> Self {
        Self::build(PostalApi::BrasilApi, base_url, timeout)
    }

    fn build(api: PostalApi, base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            breaker: create_provider_circuit_breaker(),
        }
    }

    fn url_for(&self, postal_code: &str) -> String {
        match self.api {
            PostalApi::ViaCep => format!("{}/ws/{}/json/", self.base_url, postal_code),
            PostalApi::BrasilApi => format!("{}/api/cep/v1/{}", self.base_url, postal_code),
        }
    }

    async fn request(&self, postal_code: &str) -> Result<Option<AddressFields>, LookupError> {
        let response = self.client.get(self.url_for(postal_code)).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let data: Value =
            serde_json::from_str(&body).map_err(|e| LookupError::Decode(e.to_string()))?;

        Ok(parse_postal_payload(&data, postal_code))
    }
}

#[async_trait]
impl PostalProvider for HttpPostalProvider {
    fn name(&self) -> &str {
        match self.api {
            PostalApi::ViaCep => "viacep",
            PostalApi::BrasilApi => "brasilapi",
        }
    }

    async fn fetch(&self, postal_code: &str) -> Result<Option<AddressFields>, LookupError> {
        if !self.breaker.is_call_permitted() {
            return Err(LookupError::CircuitOpen);
        }

        let result = self.request(postal_code).await;
        self.breaker.record(result.is_ok());
        result
    }
}

fn text_of(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| data.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Maps a ViaCEP or BrasilAPI body onto the canonical field set.
///
/// Returns `None` for the providers' not-found signals (`"erro"` key,
/// `"status": "ERROR"`) and for bodies without a `cep` key.
pub fn parse_postal_payload(data: &Value, postal_code: &str) -> Option<AddressFields> {
    let object = data.as_object()?;
    if object.contains_key("erro")
        || data.get("status").and_then(|v| v.as_str()) == Some("ERROR")
        || !object.contains_key("cep")
    {
        return None;
    }

    Some(AddressFields {
        street: text_of(data, &["logradouro", "street"]),
        number: None,
        // ViaCEP's "complemento" describes the CEP range ("lado ímpar"), not the address.
        complement: None,
        neighborhood: text_of(data, &["bairro", "neighborhood"]),
        city: text_of(data, &["localidade", "city"]),
        state: text_of(data, &["uf", "state"]),
        postal_code: Some(postal_code.to_string()),
    })
}

/// Address lookup by postal code: cache first, then providers in priority order.
pub struct PostalLookupService {
    providers: Vec<Arc<dyn PostalProvider>>,
    cache: Arc<dyn LookupCache>,
    ttl: Duration,
}

impl PostalLookupService {
    pub fn new(
        providers: Vec<Arc<dyn PostalProvider>>,
        cache: Arc<dyn LookupCache>,
        ttl: Duration,
    ) -> Self {
        Self {
            providers,
            cache,
            ttl,
        }
    }

    /// Resolves an 8-digit postal code. `None` is a normal outcome: every
    /// provider failed or reported not found. Nothing is cached in that case.
    pub async fn resolve(&self, postal_code: &str) -> Option<AddressFields> {
        let key = LookupKey::PostalCode(postal_code.to_string());

        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_str::<AddressFields>(&cached) {
                Ok(fields) => {
                    tracing::debug!("Postal lookup cache hit for {}", postal_code);
                    return Some(fields);
                }
                Err(e) => tracing::warn!("Ignoring unreadable cached postal payload: {}", e),
            }
        }

        for provider in &self.providers {
            match provider.fetch(postal_code).await {
                Ok(Some(fields)) => {
                    tracing::info!(
                        "Postal code {} resolved by {}",
                        postal_code,
                        provider.name()
                    );
                    match serde_json::to_string(&fields) {
                        Ok(payload) => self.cache.put(&key, payload, self.ttl).await,
                        Err(e) => tracing::warn!("Could not cache postal payload: {}", e),
                    }
                    return Some(fields);
                }
                Ok(None) => {
                    tracing::warn!(
                        "Postal code {} not found by {}, trying next provider",
                        postal_code,
                        provider.name()
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Postal provider {} failed for {}: {}",
                        provider.name(),
                        postal_code,
                        e
                    );
                }
            }
        }

        tracing::warn!("Postal code {} not resolved by any provider", postal_code);
        None
    }
}
