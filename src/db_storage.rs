use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::errors::{AppError, FieldErrors, ResultExt, ValidationKind};
use crate::models::{AddressFields, AddressRecord, Owner, OwnerRef};

/// Persistence boundary for owners and their generically owned address.
#[async_trait]
pub trait OwnerStore: Send + Sync {
    /// Opens the unit of work used by one save.
    async fn begin(&self) -> Result<Box<dyn OwnerTransaction>, AppError>;
    async fn find_owner(&self, owner: OwnerRef) -> Result<Option<Owner>, AppError>;
    /// First address by owner; authoritative when duplicates exist.
    async fn find_address(&self, owner: OwnerRef) -> Result<Option<AddressRecord>, AppError>;
}

/// Writes made through a transaction become visible only on `commit`.
///
/// Address writes that violate a stored constraint fail with
/// `AppError::AddressPersistence`.
#[async_trait]
pub trait OwnerTransaction: Send {
    /// Inserts a new owner (no id) or updates an existing one. Returns the
    /// stored row with id and timestamps set.
    async fn save_owner(&mut self, owner: &Owner) -> Result<Owner, AppError>;
    async fn first_address(&mut self, owner: OwnerRef) -> Result<Option<AddressRecord>, AppError>;
    async fn insert_address(&mut self, record: &AddressRecord) -> Result<(), AppError>;
    async fn update_address(&mut self, record: &AddressRecord) -> Result<(), AppError>;
    async fn delete_address(&mut self, id: Uuid) -> Result<(), AppError>;
    async fn commit(&mut self) -> Result<(), AppError>;
    async fn rollback(&mut self) -> Result<(), AppError>;
}

pub(crate) fn duplicate_national_id() -> AppError {
    AppError::Validation(FieldErrors::single(
        "national_id",
        ValidationKind::Duplicate,
        "Já existe um cadastro com este documento.",
    ))
}

#[derive(sqlx::FromRow)]
struct OwnerRow {
    id: Uuid,
    owner_type: String,
    party_kind: String,
    national_id: String,
    full_name: String,
    preferred_name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    state_registration: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OwnerRow> for Owner {
    type Error = AppError;

    fn try_from(row: OwnerRow) -> Result<Self, Self::Error> {
        Ok(Owner {
            id: Some(row.id),
            owner_type: row.owner_type.parse().map_err(AppError::InternalError)?,
            party_kind: row.party_kind.parse().map_err(AppError::InternalError)?,
            national_id: row.national_id,
            full_name: row.full_name,
            preferred_name: row.preferred_name,
            phone: row.phone,
            email: row.email,
            state_registration: row.state_registration,
            is_active: row.is_active,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid,
    owner_type: String,
    owner_id: Uuid,
    street: Option<String>,
    number: Option<String>,
    complement: Option<String>,
    neighborhood: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AddressRow> for AddressRecord {
    type Error = AppError;

    fn try_from(row: AddressRow) -> Result<Self, Self::Error> {
        Ok(AddressRecord {
            id: row.id,
            owner: OwnerRef::new(
                row.owner_type.parse().map_err(AppError::InternalError)?,
                row.owner_id,
            ),
            fields: AddressFields {
                street: row.street,
                number: row.number,
                complement: row.complement,
                neighborhood: row.neighborhood,
                city: row.city,
                state: row.state,
                postal_code: row.postal_code,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const OWNER_COLUMNS: &str = "id, owner_type, party_kind, national_id, full_name, preferred_name, \
     phone, email, state_registration, is_active, created_at, updated_at";

const ADDRESS_COLUMNS: &str = "id, owner_type, owner_id, street, number, complement, \
     neighborhood, city, state, postal_code, created_at, updated_at";

/// Postgres implementation over `core.owners` and `core.addresses`.
pub struct PgOwnerStore {
    pool: PgPool,
}

impl PgOwnerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnerStore for PgOwnerStore {
    async fn begin(&self) -> Result<Box<dyn OwnerTransaction>, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to open owner transaction")?;
        Ok(Box::new(PgOwnerTransaction { tx: Some(tx) }))
    }

    async fn find_owner(&self, owner: OwnerRef) -> Result<Option<Owner>, AppError> {
        let row = sqlx::query_as::<_, OwnerRow>(&format!(
            "SELECT {} FROM core.owners WHERE id = $1 AND owner_type = $2",
            OWNER_COLUMNS
        ))
        .bind(owner.owner_id)
        .bind(owner.owner_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load owner {}", owner))?;

        row.map(Owner::try_from).transpose()
    }

    async fn find_address(&self, owner: OwnerRef) -> Result<Option<AddressRecord>, AppError> {
        let row = sqlx::query_as::<_, AddressRow>(&format!(
            "SELECT {} FROM core.addresses WHERE owner_type = $1 AND owner_id = $2 \
             ORDER BY created_at, id LIMIT 1",
            ADDRESS_COLUMNS
        ))
        .bind(owner.owner_type.as_str())
        .bind(owner.owner_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load address of {}", owner))?;

        row.map(AddressRecord::try_from).transpose()
    }
}

pub struct PgOwnerTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgOwnerTransaction {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, AppError> {
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::InternalError("transaction already finished".to_string()))
    }
}

fn map_owner_write_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return duplicate_national_id();
        }
    }
    AppError::DatabaseError(err)
}

fn map_address_write_error(err: sqlx::Error) -> AppError {
    AppError::AddressPersistence(err.to_string())
}

#[async_trait]
impl OwnerTransaction for PgOwnerTransaction {
    async fn save_owner(&mut self, owner: &Owner) -> Result<Owner, AppError> {
        let tx = self.tx()?;

        let sql = match owner.id {
            None => format!(
                "INSERT INTO core.owners (id, owner_type, party_kind, national_id, full_name, \
                 preferred_name, phone, email, state_registration, is_active) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
                OWNER_COLUMNS
            ),
            Some(_) => format!(
                "UPDATE core.owners SET owner_type = $2, party_kind = $3, national_id = $4, \
                 full_name = $5, preferred_name = $6, phone = $7, email = $8, \
                 state_registration = $9, is_active = $10, updated_at = NOW() \
                 WHERE id = $1 AND owner_type = $2 RETURNING {}",
                OWNER_COLUMNS
            ),
        };

        let row = sqlx::query_as::<_, OwnerRow>(&sql)
            .bind(owner.id.unwrap_or_else(Uuid::new_v4))
            .bind(owner.owner_type.as_str())
            .bind(owner.party_kind.as_str())
            .bind(&owner.national_id)
            .bind(&owner.full_name)
            .bind(&owner.preferred_name)
            .bind(&owner.phone)
            .bind(&owner.email)
            .bind(&owner.state_registration)
            .bind(owner.is_active)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_owner_write_error)?;

        match row {
            Some(row) => Owner::try_from(row),
            None => Err(AppError::NotFound(format!(
                "{} {}",
                owner.owner_type,
                owner.id.map(|id| id.to_string()).unwrap_or_default()
            ))),
        }
    }

    async fn first_address(&mut self, owner: OwnerRef) -> Result<Option<AddressRecord>, AppError> {
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, AddressRow>(&format!(
            "SELECT {} FROM core.addresses WHERE owner_type = $1 AND owner_id = $2 \
             ORDER BY created_at, id LIMIT 1",
            ADDRESS_COLUMNS
        ))
        .bind(owner.owner_type.as_str())
        .bind(owner.owner_id)
        .fetch_optional(&mut **tx)
        .await
        .with_context(|| format!("Failed to read address of {}", owner))?;

        row.map(AddressRecord::try_from).transpose()
    }

    async fn insert_address(&mut self, record: &AddressRecord) -> Result<(), AppError> {
        let tx = self.tx()?;
        let f = &record.fields;
        sqlx::query(
            "INSERT INTO core.addresses (id, owner_type, owner_id, street, number, complement, \
             neighborhood, city, state, postal_code, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(record.id)
        .bind(record.owner.owner_type.as_str())
        .bind(record.owner.owner_id)
        .bind(&f.street)
        .bind(&f.number)
        .bind(&f.complement)
        .bind(&f.neighborhood)
        .bind(&f.city)
        .bind(&f.state)
        .bind(&f.postal_code)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(map_address_write_error)?;
        Ok(())
    }

    async fn update_address(&mut self, record: &AddressRecord) -> Result<(), AppError> {
        let tx = self.tx()?;
        let f = &record.fields;
        sqlx::query(
            "UPDATE core.addresses SET street = $2, number = $3, complement = $4, \
             neighborhood = $5, city = $6, state = $7, postal_code = $8, updated_at = $9 \
             WHERE id = $1",
        )
        .bind(record.id)
        .bind(&f.street)
        .bind(&f.number)
        .bind(&f.complement)
        .bind(&f.neighborhood)
        .bind(&f.city)
        .bind(&f.state)
        .bind(&f.postal_code)
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(map_address_write_error)?;
        Ok(())
    }

    async fn delete_address(&mut self, id: Uuid) -> Result<(), AppError> {
        let tx = self.tx()?;
        sqlx::query("DELETE FROM core.addresses WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(map_address_write_error)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.context("Failed to commit owner transaction"),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.context("Failed to roll back owner transaction"),
            None => Ok(()),
        }
    }
}
