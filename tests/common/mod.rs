//! Shared fakes for orchestrator and resolver tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use rust_store_api::db_storage::{OwnerStore, OwnerTransaction};
use rust_store_api::errors::{AppError, LookupError};
use rust_store_api::lookup_cache::MokaLookupCache;
use rust_store_api::memory_storage::InMemoryOwnerStore;
use rust_store_api::models::{AddressFields, AddressRecord, OrgFields, Owner, OwnerRef, PartyKind};
use rust_store_api::orchestrator::OwnerSaveOrchestrator;
use rust_store_api::postal::{PostalLookupService, PostalProvider};
use rust_store_api::registry::{RegistryLookupService, RegistryProvider};
use rust_store_api::resolver::AddressResolver;
use rust_store_api::tax_id::TaxIdValidator;

pub const VALID_CPF: &str = "10585278008";
pub const VALID_CNPJ: &str = "11222333000181";

/// Postal provider returning a fixed answer and counting calls.
pub struct CountingPostal {
    pub calls: AtomicUsize,
    pub answer: Option<AddressFields>,
}

impl CountingPostal {
    pub fn new(answer: Option<AddressFields>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            answer,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostalProvider for CountingPostal {
    fn name(&self) -> &str {
        "counting-postal"
    }

    async fn fetch(&self, _postal_code: &str) -> Result<Option<AddressFields>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

/// Registry provider returning a fixed answer (or failing) and counting calls.
pub struct CountingRegistry {
    pub calls: AtomicUsize,
    pub answer: Option<OrgFields>,
    pub fail: bool,
}

impl CountingRegistry {
    pub fn new(answer: Option<OrgFields>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            answer,
            fail: false,
        })
    }

    /// Every call fails like an unavailable upstream.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            answer: None,
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryProvider for CountingRegistry {
    fn name(&self) -> &str {
        "counting-registry"
    }

    async fn fetch(&self, _national_id: &str) -> Result<Option<OrgFields>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LookupError::Status(503));
        }
        Ok(self.answer.clone())
    }
}

/// Tax id validator that accepts everything and records its inputs.
#[derive(Default)]
pub struct RecordingValidator {
    pub seen: Mutex<Vec<(PartyKind, String)>>,
}

impl TaxIdValidator for RecordingValidator {
    fn validate_tax_id(&self, kind: PartyKind, digits: &str) -> bool {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((kind, digits.to_string()));
        }
        true
    }
}

/// Wraps the in-memory store; when `fail_address_writes` is set every
/// address insert/update/delete fails like a violated constraint.
#[derive(Clone)]
pub struct FailingStore {
    pub inner: InMemoryOwnerStore,
    pub fail_address_writes: Arc<AtomicBool>,
}

impl FailingStore {
    pub fn new(inner: InMemoryOwnerStore) -> Self {
        Self {
            inner,
            fail_address_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail(&self) {
        self.fail_address_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OwnerStore for FailingStore {
    async fn begin(&self) -> Result<Box<dyn OwnerTransaction>, AppError> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin().await?,
            fail: self.fail_address_writes.load(Ordering::SeqCst),
        }))
    }

    async fn find_owner(&self, owner: OwnerRef) -> Result<Option<Owner>, AppError> {
        self.inner.find_owner(owner).await
    }

    async fn find_address(&self, owner: OwnerRef) -> Result<Option<AddressRecord>, AppError> {
        self.inner.find_address(owner).await
    }
}

struct FailingTransaction {
    inner: Box<dyn OwnerTransaction>,
    fail: bool,
}

impl FailingTransaction {
    fn check(&self) -> Result<(), AppError> {
        if self.fail {
            Err(AppError::AddressPersistence(
                "simulated constraint violation".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OwnerTransaction for FailingTransaction {
    async fn save_owner(&mut self, owner: &Owner) -> Result<Owner, AppError> {
        self.inner.save_owner(owner).await
    }

    async fn first_address(&mut self, owner: OwnerRef) -> Result<Option<AddressRecord>, AppError> {
        self.inner.first_address(owner).await
    }

    async fn insert_address(&mut self, record: &AddressRecord) -> Result<(), AppError> {
        self.check()?;
        self.inner.insert_address(record).await
    }

    async fn update_address(&mut self, record: &AddressRecord) -> Result<(), AppError> {
        self.check()?;
        self.inner.update_address(record).await
    }

    async fn delete_address(&mut self, id: Uuid) -> Result<(), AppError> {
        self.check()?;
        self.inner.delete_address(id).await
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        self.inner.rollback().await
    }
}

pub fn postal_service(provider: Arc<CountingPostal>) -> Arc<PostalLookupService> {
    Arc::new(PostalLookupService::new(
        vec![provider],
        Arc::new(MokaLookupCache::new(1_000)),
        Duration::from_secs(60),
    ))
}

pub fn resolver(provider: Arc<CountingPostal>) -> AddressResolver {
    AddressResolver::new(postal_service(provider))
}

/// Orchestrator over the given store with counting providers.
pub struct Harness {
    pub orchestrator: OwnerSaveOrchestrator,
    pub postal: Arc<CountingPostal>,
    pub registry: Arc<CountingRegistry>,
}

pub fn harness_with(
    store: Arc<dyn OwnerStore>,
    postal_answer: Option<AddressFields>,
    registry_answer: Option<OrgFields>,
    tax_ids: Arc<dyn TaxIdValidator>,
) -> Harness {
    harness_from(
        store,
        CountingPostal::new(postal_answer),
        CountingRegistry::new(registry_answer),
        tax_ids,
    )
}

pub fn harness_from(
    store: Arc<dyn OwnerStore>,
    postal: Arc<CountingPostal>,
    registry: Arc<CountingRegistry>,
    tax_ids: Arc<dyn TaxIdValidator>,
) -> Harness {
    let registry_service = Arc::new(RegistryLookupService::new(
        vec![registry.clone()],
        Arc::new(MokaLookupCache::new(1_000)),
        Duration::from_secs(60),
    ));
    let resolver = Arc::new(resolver(postal.clone()));

    Harness {
        orchestrator: OwnerSaveOrchestrator::new(store, registry_service, resolver, tax_ids),
        postal,
        registry,
    }
}

pub fn address(pairs: &[(&str, &str)]) -> AddressFields {
    let mut fields = AddressFields::default();
    for (name, value) in pairs {
        let value = Some(value.to_string());
        match *name {
            "street" => fields.street = value,
            "number" => fields.number = value,
            "complement" => fields.complement = value,
            "neighborhood" => fields.neighborhood = value,
            "city" => fields.city = value,
            "state" => fields.state = value,
            "postal_code" => fields.postal_code = value,
            other => panic!("unknown address field {}", other),
        }
    }
    fields
}
