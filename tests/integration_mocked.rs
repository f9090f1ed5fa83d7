/// Postal and registry lookups against mocked provider APIs.
/// Exercises fallback order, not-found signals, timeouts and caching without
/// hitting the real services.
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_store_api::lookup_cache::MokaLookupCache;
use rust_store_api::models::AddressFields;
use rust_store_api::postal::{HttpPostalProvider, PostalLookupService, PostalProvider};
use rust_store_api::registry::{HttpRegistryProvider, RegistryLookupService, RegistryProvider};
use rust_store_api::resolver::AddressResolver;

const TIMEOUT: Duration = Duration::from_millis(500);

fn postal_service(viacep: &MockServer, brasilapi: &MockServer) -> PostalLookupService {
    let providers: Vec<Arc<dyn PostalProvider>> = vec![
        Arc::new(HttpPostalProvider::viacep(&viacep.uri(), TIMEOUT)),
        Arc::new(HttpPostalProvider::brasilapi(&brasilapi.uri(), TIMEOUT)),
    ];
    PostalLookupService::new(
        providers,
        Arc::new(MokaLookupCache::new(100)),
        Duration::from_secs(60),
    )
}

fn registry_service(cnpja: &MockServer, cnpjws: &MockServer) -> RegistryLookupService {
    let providers: Vec<Arc<dyn RegistryProvider>> = vec![
        Arc::new(HttpRegistryProvider::cnpja(&cnpja.uri(), TIMEOUT)),
        Arc::new(HttpRegistryProvider::cnpjws(&cnpjws.uri(), TIMEOUT)),
    ];
    RegistryLookupService::new(
        providers,
        Arc::new(MokaLookupCache::new(100)),
        Duration::from_secs(60),
    )
}

fn viacep_body() -> serde_json::Value {
    json!({
        "cep": "01001-000",
        "logradouro": "Praça da Sé",
        "complemento": "lado ímpar",
        "bairro": "Sé",
        "localidade": "São Paulo",
        "uf": "SP"
    })
}

fn brasilapi_body() -> serde_json::Value {
    json!({
        "cep": "01001000",
        "state": "SP",
        "city": "São Paulo",
        "neighborhood": "Sé",
        "street": "Praca da Se",
        "service": "correios"
    })
}

#[tokio::test]
async fn test_viacep_success() {
    let viacep = MockServer::start().await;
    let brasilapi = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(viacep_body()))
        .mount(&viacep)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(brasilapi_body()))
        .expect(0)
        .mount(&brasilapi)
        .await;

    let fields = postal_service(&viacep, &brasilapi)
        .resolve("01001000")
        .await
        .expect("address found");

    assert_eq!(fields.street.as_deref(), Some("Praça da Sé"));
    // The CEP range description is not part of the owner's address.
    assert_eq!(fields.complement, None);
    assert_eq!(fields.neighborhood.as_deref(), Some("Sé"));
    assert_eq!(fields.city.as_deref(), Some("São Paulo"));
    assert_eq!(fields.state.as_deref(), Some("SP"));
    assert_eq!(fields.postal_code.as_deref(), Some("01001000"));
    assert_eq!(fields.number, None);
}

#[tokio::test]
async fn test_viacep_erro_falls_back_to_brasilapi() {
    let viacep = MockServer::start().await;
    let brasilapi = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "erro": true })))
        .mount(&viacep)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/cep/v1/01001000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(brasilapi_body()))
        .expect(1)
        .mount(&brasilapi)
        .await;

    let fields = postal_service(&viacep, &brasilapi)
        .resolve("01001000")
        .await
        .expect("address found");

    assert_eq!(fields.street.as_deref(), Some("Praca da Se"));
    assert_eq!(fields.city.as_deref(), Some("São Paulo"));
}

#[tokio::test]
async fn test_server_error_falls_back() {
    let viacep = MockServer::start().await;
    let brasilapi = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&viacep)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/cep/v1/01001000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(brasilapi_body()))
        .mount(&brasilapi)
        .await;

    let fields = postal_service(&viacep, &brasilapi).resolve("01001000").await;

    assert_eq!(
        fields.and_then(|f| f.neighborhood).as_deref(),
        Some("Sé")
    );
}

#[tokio::test]
async fn test_slow_provider_times_out_and_falls_back() {
    let viacep = MockServer::start().await;
    let brasilapi = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(viacep_body())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&viacep)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/cep/v1/01001000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(brasilapi_body()))
        .mount(&brasilapi)
        .await;

    let fields = postal_service(&viacep, &brasilapi)
        .resolve("01001000")
        .await
        .expect("address found");

    assert_eq!(fields.street.as_deref(), Some("Praca da Se"));
}

#[tokio::test]
async fn test_completion_keeps_cep_range_out_of_complement() {
    let viacep = MockServer::start().await;
    let brasilapi = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(viacep_body()))
        .mount(&viacep)
        .await;

    let resolver = AddressResolver::new(Arc::new(postal_service(&viacep, &brasilapi)));
    let current = AddressFields {
        number: Some("10".to_string()),
        postal_code: Some("01001-000".to_string()),
        ..Default::default()
    };

    let merged = resolver
        .resolve_partial(&current, current.postal_code.as_deref())
        .await
        .unwrap();

    assert_eq!(merged.street.as_deref(), Some("Praça Da Sé"));
    assert_eq!(merged.number.as_deref(), Some("10"));
    assert_eq!(merged.complement, None);
    assert_eq!(merged.postal_code.as_deref(), Some("01001000"));
}

#[tokio::test]
async fn test_second_lookup_served_from_cache() {
    let viacep = MockServer::start().await;
    let brasilapi = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01001000/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(viacep_body()))
        .expect(1)
        .mount(&viacep)
        .await;

    let service = postal_service(&viacep, &brasilapi);
    let first = service.resolve("01001000").await;
    let second = service.resolve("01001000").await;

    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_not_found_everywhere_is_none_and_not_cached() {
    let viacep = MockServer::start().await;
    let brasilapi = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&viacep)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&brasilapi)
        .await;

    let service = postal_service(&viacep, &brasilapi);
    assert!(service.resolve("99999999").await.is_none());
    assert!(service.resolve("99999999").await.is_none());
}

#[tokio::test]
async fn test_cnpja_shape() {
    let cnpja = MockServer::start().await;
    let cnpjws = MockServer::start().await;

    let body = json!({
        "taxId": "11222333000181",
        "alias": "LOJA TESTE",
        "company": { "name": "EMPRESA TESTE LTDA" },
        "address": {
            "street": "Avenida Paulista",
            "number": "1000",
            "details": "Andar 5",
            "district": "Bela Vista",
            "city": "São Paulo",
            "state": "SP",
            "zip": "01310100"
        },
        "registrations": [
            { "number": "000000000", "enabled": false, "type": { "text": "IE Normal" } },
            { "number": "123456789", "enabled": true, "type": { "text": "IE Normal" } }
        ]
    });

    Mock::given(method("GET"))
        .and(path("/office/11222333000181"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&cnpja)
        .await;

    let org = registry_service(&cnpja, &cnpjws)
        .resolve("11222333000181")
        .await
        .expect("organization found");

    assert_eq!(org.legal_name, "Empresa Teste Ltda");
    assert_eq!(org.trade_name, "Loja Teste");
    assert_eq!(org.street, "Avenida Paulista");
    assert_eq!(org.number, "1000");
    assert_eq!(org.complement, "Andar 5");
    assert_eq!(org.neighborhood, "Bela Vista");
    assert_eq!(org.city, "São Paulo");
    assert_eq!(org.state, "SP");
    assert_eq!(org.postal_code, "01310100");
    assert_eq!(org.registration_number, "123456789");
}

#[tokio::test]
async fn test_cnpjws_shape_used_after_primary_failure() {
    let cnpja = MockServer::start().await;
    let cnpjws = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&cnpja)
        .await;

    let body = json!({
        "razao_social": "EMPRESA TESTE LTDA",
        "estabelecimento": {
            "nome_fantasia": "LOJA TESTE",
            "tipo_logradouro": "Rua",
            "logradouro": "das Flores",
            "numero": "42",
            "complemento": "",
            "bairro": "Centro",
            "cep": "13010000",
            "cidade": { "nome": "Campinas" },
            "estado": { "sigla": "SP" },
            "inscricoes_estaduais": [
                { "inscricao_estadual": "987654321", "ativo": true }
            ]
        }
    });
    Mock::given(method("GET"))
        .and(path("/cnpj/11222333000181"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&cnpjws)
        .await;

    let org = registry_service(&cnpja, &cnpjws)
        .resolve("11222333000181")
        .await
        .expect("organization found");

    assert_eq!(org.legal_name, "Empresa Teste Ltda");
    assert_eq!(org.trade_name, "Loja Teste");
    assert_eq!(org.street, "Rua das Flores");
    assert_eq!(org.number, "42");
    assert_eq!(org.complement, "");
    assert_eq!(org.city, "Campinas");
    assert_eq!(org.state, "SP");
    assert_eq!(org.registration_number, "987654321");
}

#[tokio::test]
async fn test_registry_missing_sub_objects_yield_empty_fields() {
    let cnpja = MockServer::start().await;
    let cnpjws = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&cnpja)
        .await;
    Mock::given(method("GET"))
        .and(path("/cnpj/11222333000181"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "razao_social": "EMPRESA SEM ENDERECO",
            "estabelecimento": {}
        })))
        .mount(&cnpjws)
        .await;

    let org = registry_service(&cnpja, &cnpjws)
        .resolve("11222333000181")
        .await
        .expect("organization found");

    assert_eq!(org.legal_name, "Empresa Sem Endereco");
    assert_eq!(org.street, "");
    assert_eq!(org.city, "");
    assert_eq!(org.registration_number, "");
    assert!(!org.address_fields().has_any_value());
}

#[tokio::test]
async fn test_registry_not_found_everywhere() {
    let cnpja = MockServer::start().await;
    let cnpjws = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&cnpja)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ERROR" })))
        .mount(&cnpjws)
        .await;

    assert!(registry_service(&cnpja, &cnpjws)
        .resolve("11222333000181")
        .await
        .is_none());
}
