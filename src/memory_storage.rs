//! In-process `OwnerStore` with the same constraints as the Postgres schema.
//!
//! A transaction reads and writes a private copy of the store and records
//! each change. Commit replays the changes onto the current shared state
//! under the lock, so concurrent transactions never overwrite each other's
//! committed rows; a rolled back transaction leaves no trace.
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::db_storage::{duplicate_national_id, OwnerStore, OwnerTransaction};
use crate::errors::AppError;
use crate::models::{AddressRecord, Owner, OwnerRef};

#[derive(Debug, Clone, Default)]
struct StoreState {
    owners: HashMap<Uuid, Owner>,
    /// Insertion order; the first match per owner is authoritative.
    addresses: Vec<AddressRecord>,
}

/// One write of a transaction, replayed on commit.
#[derive(Debug, Clone)]
enum Change {
    Owner { owner: Owner, created: bool },
    InsertAddress(AddressRecord),
    UpdateAddress(AddressRecord),
    DeleteAddress(Uuid),
}

fn check_address(record: &AddressRecord) -> Result<(), AppError> {
    match record.constraint_violation() {
        Some(violation) => Err(AppError::AddressPersistence(violation)),
        None => Ok(()),
    }
}

impl StoreState {
    fn first_address(&self, owner: OwnerRef) -> Option<&AddressRecord> {
        self.addresses.iter().find(|a| a.owner == owner)
    }

    fn existing_owner(&self, owner: &Owner, id: Uuid) -> Result<&Owner, AppError> {
        self.owners
            .get(&id)
            .filter(|o| o.owner_type == owner.owner_type)
            .ok_or_else(|| AppError::NotFound(format!("{} {}", owner.owner_type, id)))
    }

    fn apply(&mut self, change: &Change) -> Result<(), AppError> {
        match change {
            Change::Owner { owner, created } => {
                let id = owner
                    .id
                    .ok_or_else(|| AppError::InternalError("owner without id".to_string()))?;
                let duplicate = !owner.national_id.is_empty()
                    && self.owners.values().any(|other| {
                        other.owner_type == owner.owner_type
                            && other.national_id == owner.national_id
                            && other.id != owner.id
                    });
                if duplicate {
                    return Err(duplicate_national_id());
                }
                if !created {
                    self.existing_owner(owner, id)?;
                }
                self.owners.insert(id, owner.clone());
            }
            Change::InsertAddress(record) => {
                check_address(record)?;
                self.addresses.push(record.clone());
            }
            Change::UpdateAddress(record) => {
                check_address(record)?;
                let slot = self
                    .addresses
                    .iter_mut()
                    .find(|a| a.id == record.id)
                    .ok_or_else(|| {
                        AppError::AddressPersistence(format!(
                            "address {} does not exist",
                            record.id
                        ))
                    })?;
                *slot = record.clone();
            }
            Change::DeleteAddress(id) => self.addresses.retain(|a| a.id != *id),
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOwnerStore {
    state: Arc<Mutex<StoreState>>,
}

fn lock(state: &Mutex<StoreState>) -> Result<MutexGuard<'_, StoreState>, AppError> {
    state
        .lock()
        .map_err(|_| AppError::InternalError("owner store lock poisoned".to_string()))
}

impl InMemoryOwnerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of address rows stored for `owner`, duplicates included.
    pub fn address_count(&self, owner: OwnerRef) -> usize {
        lock(&self.state)
            .map(|state| state.addresses.iter().filter(|a| a.owner == owner).count())
            .unwrap_or(0)
    }

    pub fn owner_count(&self) -> usize {
        lock(&self.state).map(|state| state.owners.len()).unwrap_or(0)
    }
}

#[async_trait]
impl OwnerStore for InMemoryOwnerStore {
    async fn begin(&self) -> Result<Box<dyn OwnerTransaction>, AppError> {
        let working = lock(&self.state)?.clone();
        Ok(Box::new(InMemoryTransaction {
            shared: Arc::clone(&self.state),
            working: Some(working),
            changes: Vec::new(),
        }))
    }

    async fn find_owner(&self, owner: OwnerRef) -> Result<Option<Owner>, AppError> {
        let state = lock(&self.state)?;
        Ok(state
            .owners
            .get(&owner.owner_id)
            .filter(|o| o.owner_type == owner.owner_type)
            .cloned())
    }

    async fn find_address(&self, owner: OwnerRef) -> Result<Option<AddressRecord>, AppError> {
        Ok(lock(&self.state)?.first_address(owner).cloned())
    }
}

struct InMemoryTransaction {
    shared: Arc<Mutex<StoreState>>,
    working: Option<StoreState>,
    changes: Vec<Change>,
}

impl InMemoryTransaction {
    fn working(&mut self) -> Result<&mut StoreState, AppError> {
        self.working
            .as_mut()
            .ok_or_else(|| AppError::InternalError("transaction already finished".to_string()))
    }

    fn record(&mut self, change: Change) -> Result<(), AppError> {
        self.working()?.apply(&change)?;
        self.changes.push(change);
        Ok(())
    }
}

#[async_trait]
impl OwnerTransaction for InMemoryTransaction {
    async fn save_owner(&mut self, owner: &Owner) -> Result<Owner, AppError> {
        let now = Utc::now();
        let mut stored = owner.clone();
        let created = match owner.id {
            None => {
                stored.id = Some(Uuid::new_v4());
                stored.created_at = Some(now);
                true
            }
            Some(id) => {
                stored.created_at = self.working()?.existing_owner(owner, id)?.created_at;
                false
            }
        };
        stored.updated_at = Some(now);

        self.record(Change::Owner {
            owner: stored.clone(),
            created,
        })?;
        Ok(stored)
    }

    async fn first_address(&mut self, owner: OwnerRef) -> Result<Option<AddressRecord>, AppError> {
        Ok(self.working()?.first_address(owner).cloned())
    }

    async fn insert_address(&mut self, record: &AddressRecord) -> Result<(), AppError> {
        self.record(Change::InsertAddress(record.clone()))
    }

    async fn update_address(&mut self, record: &AddressRecord) -> Result<(), AppError> {
        self.record(Change::UpdateAddress(record.clone()))
    }

    async fn delete_address(&mut self, id: Uuid) -> Result<(), AppError> {
        self.record(Change::DeleteAddress(id))
    }

    /// Replays the recorded changes onto the current shared state. A change
    /// that conflicts with a concurrent commit fails the whole commit and
    /// nothing is published.
    async fn commit(&mut self) -> Result<(), AppError> {
        if self.working.take().is_none() {
            return Ok(());
        }
        let changes = std::mem::take(&mut self.changes);

        let mut shared = lock(&self.shared)?;
        let mut next = shared.clone();
        for change in &changes {
            next.apply(change)?;
        }
        *shared = next;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        self.working = None;
        self.changes.clear();
        Ok(())
    }
}
