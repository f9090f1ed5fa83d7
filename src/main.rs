use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_store_api::config::Config;
use rust_store_api::db::Database;
use rust_store_api::db_storage::PgOwnerStore;
use rust_store_api::handlers::{self, AppState};
use rust_store_api::lookup_cache::{LookupCache, MokaLookupCache};
use rust_store_api::orchestrator::OwnerSaveOrchestrator;
use rust_store_api::postal::{HttpPostalProvider, PostalLookupService, PostalProvider};
use rust_store_api::registry::{HttpRegistryProvider, RegistryLookupService, RegistryProvider};
use rust_store_api::resolver::AddressResolver;
use rust_store_api::tax_id::ChecksumTaxIdValidator;

/// Starts the owner/address API.
///
/// Wires configuration, the Postgres pool, the shared lookup cache, the
/// postal and registry providers (in fallback order) and the save
/// orchestrator, then serves the routes behind tracing, CORS, a body-size
/// limit and per-IP rate limiting.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_store_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    db.ensure_schema().await?;
    tracing::info!("Database connection pool established");

    // Postal codes and CNPJs share one cache; keys are prefixed per kind.
    let cache: Arc<dyn LookupCache> = Arc::new(MokaLookupCache::new(config.lookup_cache_capacity));
    tracing::info!(
        "Lookup cache initialized ({}s TTL, {} capacity)",
        config.lookup_cache_ttl_secs,
        config.lookup_cache_capacity
    );

    let timeout = config.lookup_timeout();
    let postal_providers: Vec<Arc<dyn PostalProvider>> = vec![
        Arc::new(HttpPostalProvider::viacep(&config.viacep_base_url, timeout)),
        Arc::new(HttpPostalProvider::brasilapi(&config.brasilapi_base_url, timeout)),
    ];
    let registry_providers: Vec<Arc<dyn RegistryProvider>> = vec![
        Arc::new(HttpRegistryProvider::cnpja(&config.cnpja_base_url, timeout)),
        Arc::new(HttpRegistryProvider::cnpjws(&config.cnpjws_base_url, timeout)),
    ];

    let postal = Arc::new(PostalLookupService::new(
        postal_providers,
        Arc::clone(&cache),
        config.lookup_cache_ttl(),
    ));
    let registry = Arc::new(RegistryLookupService::new(
        registry_providers,
        Arc::clone(&cache),
        config.lookup_cache_ttl(),
    ));
    let resolver = Arc::new(AddressResolver::new(Arc::clone(&postal)));

    let orchestrator = Arc::new(OwnerSaveOrchestrator::new(
        Arc::new(PgOwnerStore::new(db.pool.clone())),
        Arc::clone(&registry),
        resolver,
        Arc::new(ChecksumTaxIdValidator),
    ));

    let app_state = Arc::new(AppState {
        orchestrator,
        postal,
        registry,
    });

    // 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let protected_routes = handlers::routes().layer(
        ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
