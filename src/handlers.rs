use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    AddressFields, AddressIntent, AddressRecord, OrgFields, Owner, OwnerRef, OwnerType, PartyKind,
    SaveOutcome,
};
use crate::normalizer::{clean_postal_code, digits_only};
use crate::orchestrator::OwnerSaveOrchestrator;
use crate::postal::PostalLookupService;
use crate::registry::RegistryLookupService;

/// Application state shared across all request handlers.
pub struct AppState {
    pub orchestrator: Arc<OwnerSaveOrchestrator>,
    pub postal: Arc<PostalLookupService>,
    pub registry: Arc<RegistryLookupService>,
}

/// Owner creation body. `address` absent or `null` leaves the address alone,
/// `{}` removes it, any other object is applied as explicit data.
#[derive(Debug, Deserialize)]
pub struct CreateOwnerRequest {
    pub owner_type: OwnerType,
    pub party_kind: PartyKind,
    #[serde(default)]
    pub national_id: String,
    pub full_name: String,
    pub preferred_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub state_registration: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub address: Option<AddressFields>,
}

/// Owner update body; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateOwnerRequest {
    pub party_kind: Option<PartyKind>,
    pub national_id: Option<String>,
    pub full_name: Option<String>,
    pub preferred_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub state_registration: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub address: Option<AddressFields>,
}

impl UpdateOwnerRequest {
    fn apply_to(self, owner: &mut Owner) -> AddressIntent {
        if let Some(kind) = self.party_kind {
            owner.party_kind = kind;
        }
        if let Some(national_id) = self.national_id {
            owner.national_id = national_id;
        }
        if let Some(full_name) = self.full_name {
            owner.full_name = full_name;
        }
        if self.preferred_name.is_some() {
            owner.preferred_name = self.preferred_name;
        }
        if self.phone.is_some() {
            owner.phone = self.phone;
        }
        if self.email.is_some() {
            owner.email = self.email;
        }
        if self.state_registration.is_some() {
            owner.state_registration = self.state_registration;
        }
        if let Some(active) = self.is_active {
            owner.is_active = active;
        }
        AddressIntent::from_payload(self.address)
    }
}

#[derive(Debug, Serialize)]
pub struct OwnerView {
    pub owner: Owner,
    pub display_name: String,
    pub formatted_national_id: String,
    pub formatted_phone: String,
    pub address: Option<AddressRecord>,
    pub formatted_address: Option<String>,
    pub address_complete: bool,
}

impl OwnerView {
    fn new(owner: Owner, address: Option<AddressRecord>) -> Self {
        Self {
            display_name: owner.display_name(),
            formatted_national_id: owner.formatted_national_id(),
            formatted_phone: owner.formatted_phone(),
            formatted_address: address.as_ref().map(AddressRecord::formatted_address),
            address_complete: address.as_ref().map(AddressRecord::is_complete).unwrap_or(false),
            owner,
            address,
        }
    }
}

/// Routes served by the API, without middleware.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/lookup/postal-code/:postal_code",
            get(lookup_postal_code),
        )
        .route("/api/v1/lookup/registry/:national_id", get(lookup_registry))
        .route("/api/v1/owners", post(create_owner))
        .route(
            "/api/v1/owners/:owner_type/:id",
            get(get_owner).put(update_owner),
        )
        .route(
            "/api/v1/owners/:owner_type/:id/address/complete",
            post(complete_address),
        )
}

/// GET /health
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-store-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/lookup/postal-code/:postal_code
pub async fn lookup_postal_code(
    State(state): State<Arc<AppState>>,
    Path(postal_code): Path<String>,
) -> Result<Json<AddressFields>, AppError> {
    let cep = clean_postal_code(Some(&postal_code))
        .map_err(|e| AppError::BadRequest(e.message))?
        .ok_or_else(|| AppError::BadRequest("CEP não informado.".to_string()))?;

    tracing::info!("GET /lookup/postal-code/{}", cep);
    state
        .postal
        .resolve(&cep)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("CEP {} não encontrado", cep)))
}

/// GET /api/v1/lookup/registry/:national_id
pub async fn lookup_registry(
    State(state): State<Arc<AppState>>,
    Path(national_id): Path<String>,
) -> Result<Json<OrgFields>, AppError> {
    let cnpj = digits_only(&national_id);
    if cnpj.len() != 14 {
        return Err(AppError::BadRequest(
            "CNPJ deve conter 14 dígitos.".to_string(),
        ));
    }

    tracing::info!("GET /lookup/registry/{}", cnpj);
    state
        .registry
        .resolve(&cnpj)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("CNPJ {} não encontrado", cnpj)))
}

/// POST /api/v1/owners
pub async fn create_owner(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOwnerRequest>,
) -> Result<(StatusCode, Json<SaveOutcome>), AppError> {
    tracing::info!("POST /owners - {}", payload.owner_type);

    let mut owner = Owner::new(
        payload.owner_type,
        payload.party_kind,
        payload.national_id,
        payload.full_name,
    );
    owner.preferred_name = payload.preferred_name;
    owner.phone = payload.phone;
    owner.email = payload.email;
    owner.state_registration = payload.state_registration;
    owner.is_active = payload.is_active.unwrap_or(true);

    let outcome = state
        .orchestrator
        .save(owner, AddressIntent::from_payload(payload.address))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn load_owner(state: &AppState, owner_ref: OwnerRef) -> Result<Owner, AppError> {
    state
        .orchestrator
        .store()
        .find_owner(owner_ref)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", owner_ref)))
}

/// PUT /api/v1/owners/:owner_type/:id
pub async fn update_owner(
    State(state): State<Arc<AppState>>,
    Path((owner_type, id)): Path<(OwnerType, Uuid)>,
    Json(payload): Json<UpdateOwnerRequest>,
) -> Result<Json<SaveOutcome>, AppError> {
    let owner_ref = OwnerRef::new(owner_type, id);
    tracing::info!("PUT /owners/{}", owner_ref);

    let mut owner = load_owner(&state, owner_ref).await?;
    let intent = payload.apply_to(&mut owner);

    let outcome = state.orchestrator.save(owner, intent).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/owners/:owner_type/:id
pub async fn get_owner(
    State(state): State<Arc<AppState>>,
    Path((owner_type, id)): Path<(OwnerType, Uuid)>,
) -> Result<Json<OwnerView>, AppError> {
    let owner_ref = OwnerRef::new(owner_type, id);
    let owner = load_owner(&state, owner_ref).await?;
    let address = state.orchestrator.store().find_address(owner_ref).await?;
    Ok(Json(OwnerView::new(owner, address)))
}

/// POST /api/v1/owners/:owner_type/:id/address/complete
pub async fn complete_address(
    State(state): State<Arc<AppState>>,
    Path((owner_type, id)): Path<(OwnerType, Uuid)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let owner_ref = OwnerRef::new(owner_type, id);
    load_owner(&state, owner_ref).await?;

    let change = state.orchestrator.complete_existing_address(owner_ref).await;
    let address = state.orchestrator.store().find_address(owner_ref).await?;
    Ok(Json(json!({ "address_change": change, "address": address })))
}
