use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::circuit_breaker::{create_provider_circuit_breaker, Breaker};
use crate::errors::LookupError;
use crate::lookup_cache::{LookupCache, LookupKey};
use crate::models::OrgFields;
use crate::normalizer::normalize_text;

/// One external source of organization data by CNPJ.
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, national_id: &str) -> Result<Option<OrgFields>, LookupError>;
}

#[derive(Debug, Clone, Copy)]
enum RegistryApi {
    Cnpja,
    CnpjWs,
}

/// Registry provider reached over HTTP (CNPJá open API or CNPJ.ws public API).
pub struct HttpRegistryProvider {
    api: RegistryApi,
    client: Client,
    base_url: String,
    breaker: Arc<dyn Breaker>,
}

impl HttpRegistryProvider {
    /// `GET {base_url}/office/{cnpj}`
    pub fn cnpja(base_url: &str, timeout: Duration) -> Self {
        Self::build(RegistryApi::Cnpja, base_url, timeout)
    }

    /// `GET {base_url}/cnpj/{cnpj}`
    pub fn cnpjws(base_url: &str, timeout: Duration) -> Self {
        Self::build(RegistryApi::CnpjWs, base_url, timeout)
    }

    fn build(api: RegistryApi, base_url: &str, timeout: Duration) -> Self {
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

    fn url_for(&self, national_id: &str) -> String {
        match self.api {
            RegistryApi::Cnpja => format!("{}/office/{}", self.base_url, national_id),
            RegistryApi::CnpjWs => format!("{}/cnpj/{}", self.base_url, national_id),
        }
    }

    async fn request(&self, national_id: &str) -> Result<Option<OrgFields>, LookupError> {
        let response = self.client.get(self.url_for(national_id)).send().await?;

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

        Ok(parse_registry_payload(&data))
    }
}

#[async_trait]
impl RegistryProvider for HttpRegistryProvider {
    fn name(&self) -> &str {
        match self.api {
            RegistryApi::Cnpja => "cnpja",
            RegistryApi::CnpjWs => "cnpjws",
        }
    }

    async fn fetch(&self, national_id: &str) -> Result<Option<OrgFields>, LookupError> {
        if !self.breaker.is_call_permitted() {
            return Err(LookupError::CircuitOpen);
        }

        let result = self.request(national_id).await;
        self.breaker.record(result.is_ok());
        result
    }
}

/// String at `path`, trimmed; anything missing or non-string is empty.
fn str_at(data: &Value, path: &[&str]) -> String {
    let mut current = data;
    for key in path {
        match current.get(*key) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    match current {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn array_at<'a>(data: &'a Value, path: &[&str]) -> &'a [Value] {
    let mut current = data;
    for key in path {
        match current.get(*key) {
            Some(next) => current = next,
            None => return &[],
        }
    }
    current.as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty() && s != "false",
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        _ => false,
    }
}

/// CNPJá: `company`, `alias`, `address`, `registrations[]`.
fn parse_cnpja(data: &Value) -> OrgFields {
    let registration_number = array_at(data, &["registrations"])
        .iter()
        .find(|reg| {
            is_truthy(reg.get("enabled")) && str_at(reg, &["type", "text"]) == "IE Normal"
        })
        .map(|reg| str_at(reg, &["number"]))
        .unwrap_or_default();

    OrgFields {
        legal_name: normalize_text(&str_at(data, &["company", "name"])),
        trade_name: normalize_text(&str_at(data, &["alias"])),
        street: str_at(data, &["address", "street"]),
        number: str_at(data, &["address", "number"]),
        complement: str_at(data, &["address", "details"]),
        neighborhood: str_at(data, &["address", "district"]),
        city: str_at(data, &["address", "city"]),
        state: str_at(data, &["address", "state"]),
        postal_code: str_at(data, &["address", "zip"]),
        registration_number,
    }
}

/// CNPJ.ws: `razao_social` plus everything else under `estabelecimento`.
fn parse_cnpjws(data: &Value) -> OrgFields {
    let est = data.get("estabelecimento").unwrap_or(&Value::Null);

    let registration_number = array_at(est, &["inscricoes_estaduais"])
        .iter()
        .find(|ie| is_truthy(ie.get("ativo")))
        .map(|ie| str_at(ie, &["inscricao_estadual"]))
        .unwrap_or_default();

    let street = format!(
        "{} {}",
        str_at(est, &["tipo_logradouro"]),
        str_at(est, &["logradouro"])
    )
    .trim()
    .to_string();

    OrgFields {
        legal_name: normalize_text(&str_at(data, &["razao_social"])),
        trade_name: normalize_text(&str_at(est, &["nome_fantasia"])),
        street,
        number: str_at(est, &["numero"]),
        complement: str_at(est, &["complemento"]),
        neighborhood: str_at(est, &["bairro"]),
        city: str_at(est, &["cidade", "nome"]),
        state: str_at(est, &["estado", "sigla"]),
        postal_code: str_at(est, &["cep"]),
        registration_number,
    }
}

/// Detects which of the two known registry shapes `data` has and maps it.
///
/// Returns `None` for not-found signals and unknown shapes.
pub fn parse_registry_payload(data: &Value) -> Option<OrgFields> {
    let object = data.as_object()?;
    if object.contains_key("erro") || data.get("status").and_then(|v| v.as_str()) == Some("ERROR")
    {
        return None;
    }

    if object.contains_key("company") && object.contains_key("address") {
        Some(parse_cnpja(data))
    } else if object.contains_key("estabelecimento") {
        Some(parse_cnpjws(data))
    } else {
        None
    }
}

/// Organization lookup by CNPJ, same cache/fallback shape as postal lookups.
pub struct RegistryLookupService {
    providers: Vec<Arc<dyn RegistryProvider>>,
    cache: Arc<dyn LookupCache>,
    ttl: Duration,
}

impl RegistryLookupService {
    pub fn new(
        providers: Vec<Arc<dyn RegistryProvider>>,
        cache: Arc<dyn LookupCache>,
        ttl: Duration,
    ) -> Self {
        Self {
            providers,
            cache,
            ttl,
        }
    }

    pub async fn resolve(&self, national_id: &str) -> Option<OrgFields> {
        let key = LookupKey::NationalId(national_id.to_string());

        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_str::<OrgFields>(&cached) {
                Ok(org) => {
                    tracing::debug!("Registry lookup cache hit for {}", national_id);
                    return Some(org);
                }
                Err(e) => tracing::warn!("Ignoring unreadable cached registry payload: {}", e),
            }
        }

        for provider in &self.providers {
            match provider.fetch(national_id).await {
                Ok(Some(org)) => {
                    tracing::info!("CNPJ {} resolved by {}", national_id, provider.name());
                    match serde_json::to_string(&org) {
                        Ok(payload) => self.cache.put(&key, payload, self.ttl).await,
                        Err(e) => tracing::warn!("Could not cache registry payload: {}", e),
                    }
                    return Some(org);
                }
                Ok(None) => {
                    tracing::warn!(
                        "CNPJ {} not found by {}, trying next provider",
                        national_id,
                        provider.name()
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Registry provider {} failed for {}: {}",
                        provider.name(),
                        national_id,
                        e
                    );
                }
            }
        }

        tracing::warn!("CNPJ {} not resolved by any provider", national_id);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_cnpja_shape() {
        let body = json!({
            "taxId": "11222333000181",
            "alias": "PADARIA BOM PÃO",
            "company": {"name": "BOM PAO COMERCIO DE ALIMENTOS LTDA"},
            "address": {
                "street": "Rua Augusta",
                "number": "1500",
                "details": "Loja 2",
                "district": "Consolação",
                "city": "São Paulo",
                "state": "SP",
                "zip": "01304001"
            },
            "registrations": [
                {"number": "000111", "enabled": false, "type": {"text": "IE Normal"}},
                {"number": "123456789", "enabled": true, "type": {"text": "IE Normal"}}
            ]
        });
        let org = parse_registry_payload(&body).unwrap();

        assert_eq!(org.legal_name, "Bom Pao Comercio De Alimentos Ltda");
        assert_eq!(org.trade_name, "Padaria Bom Pão");
        assert_eq!(org.street, "Rua Augusta");
        assert_eq!(org.complement, "Loja 2");
        assert_eq!(org.neighborhood, "Consolação");
        assert_eq!(org.postal_code, "01304001");
        assert_eq!(org.registration_number, "123456789");
    }

    #[test]
    fn test_parse_cnpjws_shape() {
        let body = json!({
            "razao_social": "ACME INDUSTRIA S.A.",
            "estabelecimento": {
                "nome_fantasia": "ACME",
                "tipo_logradouro": "AVENIDA",
                "logradouro": "PAULISTA",
                "numero": "1000",
                "complemento": null,
                "bairro": "BELA VISTA",
                "cep": "01310100",
                "cidade": {"nome": "São Paulo"},
                "estado": {"sigla": "SP"},
                "inscricoes_estaduais": [
                    {"inscricao_estadual": "987654", "ativo": true}
                ]
            }
        });
        let org = parse_registry_payload(&body).unwrap();

        assert_eq!(org.legal_name, "Acme Industria S.A.");
        assert_eq!(org.street, "AVENIDA PAULISTA");
        assert_eq!(org.complement, "");
        assert_eq!(org.city, "São Paulo");
        assert_eq!(org.state, "SP");
        assert_eq!(org.registration_number, "987654");
    }

    #[test]
    fn test_missing_sub_objects_map_to_empty() {
        let body = json!({"razao_social": "SO NOME LTDA", "estabelecimento": {}});
        let org = parse_registry_payload(&body).unwrap();

        assert_eq!(org.legal_name, "So Nome Ltda");
        assert_eq!(org.city, "");
        assert_eq!(org.state, "");
        assert_eq!(org.registration_number, "");
        assert!(!org.address_fields().has_any_value());
    }

    #[test]
    fn test_unknown_shapes_and_errors() {
        assert!(parse_registry_payload(&json!({"message": "not found"})).is_none());
        assert!(parse_registry_payload(&json!({"erro": true})).is_none());
        assert!(parse_registry_payload(&json!({"status": "ERROR", "estabelecimento": {}})).is_none());
        assert!(parse_registry_payload(&json!("text")).is_none());
    }
}
