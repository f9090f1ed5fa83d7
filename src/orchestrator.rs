//! Saves an owner and reconciles its address in one unit of work.
//!
//! External lookups (registry, postal) run before the transaction opens;
//! the transaction then re-reads the owner's current address before writing.
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

use crate::db_storage::{OwnerStore, OwnerTransaction};
use crate::errors::{AppError, FieldErrors};
use crate::models::{
    AddressChange, AddressFields, AddressIntent, AddressRecord, AddressSource, OrgFields, Owner,
    OwnerRef, OwnerType, PartyKind, SaveOutcome,
};
use crate::normalizer::digits_only;
use crate::registry::RegistryLookupService;
use crate::resolver::AddressResolver;
use crate::tax_id::TaxIdValidator;

/// Progress of one save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Validating,
    OwnerPersisted,
    AddressResolved,
    Committed,
    RolledBack,
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveState::Validating => "VALIDATING",
            SaveState::OwnerPersisted => "OWNER_PERSISTED",
            SaveState::AddressResolved => "ADDRESS_RESOLVED",
            SaveState::Committed => "COMMITTED",
            SaveState::RolledBack => "ROLLED_BACK",
        };
        f.write_str(name)
    }
}

/// Address action decided before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressAction {
    Upsert {
        fields: AddressFields,
        source: AddressSource,
    },
    DeleteIfExists,
    NoOp,
}

impl AddressAction {
    /// Log form naming the fields involved but none of their values.
    pub fn summary(&self) -> String {
        match self {
            AddressAction::Upsert { fields, source } => {
                format!("upsert from {:?} with [{}]", source, fields.present_fields().join(", "))
            }
            AddressAction::DeleteIfExists => "delete if exists".to_string(),
            AddressAction::NoOp => "no-op".to_string(),
        }
    }
}

/// Tracks and logs state transitions of a single save.
struct SaveTrace {
    label: String,
    state: SaveState,
}

impl SaveTrace {
    fn new(owner: &Owner) -> Self {
        let label = match owner.id {
            Some(id) => format!("{}:{}", owner.owner_type, id),
            None => format!("{}:new", owner.owner_type),
        };
        tracing::debug!("Owner save {} entered {}", label, SaveState::Validating);
        Self {
            label,
            state: SaveState::Validating,
        }
    }

    fn advance(&mut self, next: SaveState) {
        tracing::debug!("Owner save {}: {} -> {}", self.label, self.state, next);
        self.state = next;
    }
}

pub struct OwnerSaveOrchestrator {
    store: Arc<dyn OwnerStore>,
    registry: Arc<RegistryLookupService>,
    resolver: Arc<AddressResolver>,
    tax_ids: Arc<dyn TaxIdValidator>,
}

impl OwnerSaveOrchestrator {
    pub fn new(
        store: Arc<dyn OwnerStore>,
        registry: Arc<RegistryLookupService>,
        resolver: Arc<AddressResolver>,
        tax_ids: Arc<dyn TaxIdValidator>,
    ) -> Self {
        Self {
            store,
            registry,
            resolver,
            tax_ids,
        }
    }

    pub fn store(&self) -> &Arc<dyn OwnerStore> {
        &self.store
    }

    /// Validates and persists `owner`, then applies `intent` to its address.
    ///
    /// Either both the owner row and the address change are committed, or
    /// neither is. Validation failures are returned before anything is written.
    pub async fn save(
        &self,
        mut owner: Owner,
        intent: AddressIntent,
    ) -> Result<SaveOutcome, AppError> {
        let mut trace = SaveTrace::new(&owner);

        let org = self.apply_registry_data(&mut owner).await;

        if let Err(errors) = owner.validate(self.tax_ids.as_ref()) {
            tracing::warn!("Owner {} rejected: {}", trace.label, errors);
            trace.advance(SaveState::RolledBack);
            return Err(AppError::Validation(errors));
        }

        let action = match self.plan_address(&owner, intent, org.as_ref()).await {
            Ok(action) => action,
            Err(errors) => {
                tracing::warn!("Address of {} rejected: {}", trace.label, errors);
                trace.advance(SaveState::RolledBack);
                return Err(AppError::Validation(errors));
            }
        };
        tracing::debug!(
            "Owner save {} planned address action: {}",
            trace.label,
            action.summary()
        );

        let mut tx = self.store.begin().await?;
        let persisted = self.persist(tx.as_mut(), &owner, action, &mut trace).await;
        match persisted {
            Ok(outcome) => {
                tx.commit().await?;
                trace.advance(SaveState::Committed);
                tracing::info!(
                    "Saved {} {} (address {:?})",
                    outcome.owner.owner_type,
                    outcome.owner.id.map(|id| id.to_string()).unwrap_or_default(),
                    outcome.address_change
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback of {} failed: {}", trace.label, rollback_err);
                }
                trace.advance(SaveState::RolledBack);
                tracing::error!("Owner save {} rolled back: {}", trace.label, e);
                Err(e)
            }
        }
    }

    /// Organizations take legal and trade names (and, for suppliers, the
    /// state registration) from the registry. Returns the registry data so the
    /// address step can reuse it without a second lookup.
    async fn apply_registry_data(&self, owner: &mut Owner) -> Option<OrgFields> {
        if owner.party_kind != PartyKind::Organization {
            return None;
        }
        let national_id = digits_only(&owner.national_id);
        if national_id.len() != 14 {
            return None;
        }

        let org = self.registry.resolve(&national_id).await?;

        if !org.legal_name.is_empty() {
            owner.full_name = org.legal_name.clone();
        }
        if !org.trade_name.is_empty() {
            owner.preferred_name = Some(org.trade_name.clone());
        }
        if owner.owner_type == OwnerType::Supplier && !org.registration_number.is_empty() {
            owner.state_registration = Some(org.registration_number.clone());
        }
        Some(org)
    }

    /// First match wins: explicit data, clear, registry data (organizations),
    /// otherwise leave the address alone.
    pub async fn plan_address(
        &self,
        owner: &Owner,
        intent: AddressIntent,
        org: Option<&OrgFields>,
    ) -> Result<AddressAction, FieldErrors> {
        match intent {
            AddressIntent::Explicit(fields) if fields.has_any_value() => {
                let fields = AddressResolver::normalize(&fields)?;
                Ok(upsert_or_noop(fields, AddressSource::Caller))
            }
            AddressIntent::Explicit(_) => Ok(AddressAction::NoOp),
            AddressIntent::Clear => Ok(AddressAction::DeleteIfExists),
            AddressIntent::Unspecified if owner.party_kind == PartyKind::Organization => {
                let Some(org) = org else {
                    return Ok(AddressAction::NoOp);
                };
                let from_registry = org.address_fields();
                if !from_registry.has_any_value() {
                    return Ok(AddressAction::NoOp);
                }
                let fields = self
                    .resolver
                    .resolve_partial(&from_registry, from_registry.postal_code.as_deref())
                    .await?;
                Ok(upsert_or_noop(fields, AddressSource::Registry))
            }
            AddressIntent::Unspecified => Ok(AddressAction::NoOp),
        }
    }

    async fn persist(
        &self,
        tx: &mut dyn OwnerTransaction,
        owner: &Owner,
        action: AddressAction,
        trace: &mut SaveTrace,
    ) -> Result<SaveOutcome, AppError> {
        let saved = tx.save_owner(owner).await?;
        let owner_ref = saved
            .owner_ref()
            .ok_or_else(|| AppError::InternalError("saved owner has no id".to_string()))?;
        trace.label = owner_ref.to_string();
        trace.advance(SaveState::OwnerPersisted);

        let existing = tx.first_address(owner_ref).await?;

        let (address, address_change, address_source) = match action {
            AddressAction::Upsert { fields, source } => match existing {
                Some(mut record) => {
                    record.fields.overlay(&fields);
                    record.updated_at = Utc::now();
                    tx.update_address(&record).await?;
                    (Some(record), AddressChange::Updated, Some(source))
                }
                None => {
                    let record = AddressRecord::new(owner_ref, fields);
                    tx.insert_address(&record).await?;
                    (Some(record), AddressChange::Created, Some(source))
                }
            },
            AddressAction::DeleteIfExists => match existing {
                Some(record) => {
                    tx.delete_address(record.id).await?;
                    (None, AddressChange::Deleted, None)
                }
                None => (None, AddressChange::Unchanged, None),
            },
            AddressAction::NoOp => (existing, AddressChange::Unchanged, None),
        };
        trace.advance(SaveState::AddressResolved);

        Ok(SaveOutcome {
            owner: saved,
            address,
            address_change,
            address_source,
        })
    }

    /// Fills the gaps of an owner's stored address from its postal code.
    ///
    /// Never fails: problems are logged and reported as `Unchanged`, and the
    /// owner row is not touched.
    pub async fn complete_existing_address(&self, owner: OwnerRef) -> AddressChange {
        match self.try_complete_existing_address(owner).await {
            Ok(change) => change,
            Err(e) => {
                tracing::warn!("Could not complete address of {}: {}", owner, e);
                AddressChange::Unchanged
            }
        }
    }

    async fn try_complete_existing_address(
        &self,
        owner: OwnerRef,
    ) -> Result<AddressChange, AppError> {
        let Some(record) = self.store.find_address(owner).await? else {
            return Ok(AddressChange::Unchanged);
        };
        let postal_code = match record.fields.postal_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => return Ok(AddressChange::Unchanged),
        };
        if record.fields.is_manually_complete() {
            return Ok(AddressChange::Unchanged);
        }

        let resolved = self
            .resolver
            .resolve_partial(&record.fields, Some(&postal_code))
            .await?;
        if resolved == record.fields {
            return Ok(AddressChange::Unchanged);
        }

        let mut tx = self.store.begin().await?;
        let result: Result<AddressChange, AppError> = async {
            match tx.first_address(owner).await? {
                Some(mut current) if current.id == record.id => {
                    current.fields.fill_missing_from(&resolved);
                    current.updated_at = Utc::now();
                    tx.update_address(&current).await?;
                    Ok(AddressChange::Updated)
                }
                _ => Ok(AddressChange::Unchanged),
            }
        }
        .await;

        match result {
            Ok(change) => {
                tx.commit().await?;
                if change == AddressChange::Updated {
                    tracing::info!("Completed address of {} from CEP {}", owner, postal_code);
                }
                Ok(change)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback for {} failed: {}", owner, rollback_err);
                }
                Err(e)
            }
        }
    }
}

fn upsert_or_noop(fields: AddressFields, source: AddressSource) -> AddressAction {
    if fields.has_any_value() {
        AddressAction::Upsert { fields, source }
    } else {
        AddressAction::NoOp
    }
}
