use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::normalizer::{format_national_id, format_phone, format_postal_code, is_valid_state};

// ============ Owner Model ============

/// Concrete entity type owning an address; the discriminator half of [`OwnerRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Customer,
    Supplier,
    Employee,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Customer => "customer",
            OwnerType::Supplier => "supplier",
            OwnerType::Employee => "employee",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(OwnerType::Customer),
            "supplier" => Ok(OwnerType::Supplier),
            "employee" => Ok(OwnerType::Employee),
            other => Err(format!("unknown owner type '{}'", other)),
        }
    }
}

/// Legal nature of an owner: individual (CPF, 11 digits) or organization (CNPJ, 14 digits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyKind {
    Individual,
    Organization,
}

impl PartyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyKind::Individual => "INDIVIDUAL",
            PartyKind::Organization => "ORGANIZATION",
        }
    }

    /// Digit count of a national id for this kind.
    pub fn national_id_len(&self) -> usize {
        match self {
            PartyKind::Individual => 11,
            PartyKind::Organization => 14,
        }
    }
}

impl FromStr for PartyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INDIVIDUAL" => Ok(PartyKind::Individual),
            "ORGANIZATION" => Ok(PartyKind::Organization),
            other => Err(format!("unknown party kind '{}'", other)),
        }
    }
}

/// Generic owner reference stored on the address table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub owner_type: OwnerType,
    pub owner_id: Uuid,
}

impl OwnerRef {
    pub fn new(owner_type: OwnerType, owner_id: Uuid) -> Self {
        Self {
            owner_type,
            owner_id,
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_type, self.owner_id)
    }
}

/// A customer, supplier or employee, with pending changes applied in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    /// `None` until the first save.
    pub id: Option<Uuid>,
    pub owner_type: OwnerType,
    pub party_kind: PartyKind,
    /// CPF or CNPJ; cleaned to digits by validation.
    pub national_id: String,
    /// Full name (individuals) or legal name (organizations).
    pub full_name: String,
    /// Nickname or trade name.
    pub preferred_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// State registration (IE), mostly relevant for suppliers.
    pub state_registration: Option<String>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Owner {
    /// New unsaved owner with the mandatory fields set.
    pub fn new(
        owner_type: OwnerType,
        party_kind: PartyKind,
        national_id: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            owner_type,
            party_kind,
            national_id: national_id.into(),
            full_name: full_name.into(),
            preferred_name: None,
            phone: None,
            email: None,
            state_registration: None,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    /// Reference usable on the address table, once the owner has an id.
    pub fn owner_ref(&self) -> Option<OwnerRef> {
        self.id.map(|id| OwnerRef::new(self.owner_type, id))
    }

    /// Preferred name, else full name.
    pub fn display_name(&self) -> String {
        match self.preferred_name.as_deref().map(str::trim) {
            Some(preferred) if !preferred.is_empty() => preferred.to_string(),
            _ => self.full_name.clone(),
        }
    }

    pub fn formatted_national_id(&self) -> String {
        format_national_id(&self.national_id)
    }

    pub fn formatted_phone(&self) -> String {
        self.phone.as_deref().map(format_phone).unwrap_or_default()
    }
}

// ============ Address Model ============

/// Canonical address field set shared by callers, providers and storage.
///
/// `None` means the field was not supplied at all; `Some("")` means it was
/// supplied empty. Merge decisions treat both as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressFields {
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

/// Field names in storage order, used for logging and error maps.
pub const ADDRESS_FIELD_NAMES: [&str; 7] = [
    "street",
    "number",
    "complement",
    "neighborhood",
    "city",
    "state",
    "postal_code",
];

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn fill_if_empty(target: &mut Option<String>, source: &Option<String>) {
    if !has_text(target) && has_text(source) {
        *target = source.clone();
    }
}

fn overlay_if_present(target: &mut Option<String>, source: &Option<String>) {
    if has_text(source) {
        *target = source.clone();
    }
}

impl AddressFields {
    fn slots(&self) -> [&Option<String>; 7] {
        [
            &self.street,
            &self.number,
            &self.complement,
            &self.neighborhood,
            &self.city,
            &self.state,
            &self.postal_code,
        ]
    }

    /// True when every field is absent (`None`), i.e. an empty payload `{}`.
    pub fn is_absent(&self) -> bool {
        self.slots().iter().all(|slot| slot.is_none())
    }

    /// True when at least one field carries non-blank text.
    pub fn has_any_value(&self) -> bool {
        self.slots().iter().any(|slot| has_text(slot))
    }

    /// Street, neighborhood, city and state are all filled: the caller typed
    /// the address and a postal-code lookup must not touch it.
    pub fn is_manually_complete(&self) -> bool {
        has_text(&self.street)
            && has_text(&self.neighborhood)
            && has_text(&self.city)
            && has_text(&self.state)
    }

    /// Copies each field of `other` only where `self` is empty.
    pub fn fill_missing_from(&mut self, other: &AddressFields) {
        fill_if_empty(&mut self.street, &other.street);
        fill_if_empty(&mut self.number, &other.number);
        fill_if_empty(&mut self.complement, &other.complement);
        fill_if_empty(&mut self.neighborhood, &other.neighborhood);
        fill_if_empty(&mut self.city, &other.city);
        fill_if_empty(&mut self.state, &other.state);
        fill_if_empty(&mut self.postal_code, &other.postal_code);
    }

    /// Partial update: every non-blank field of `incoming` replaces the current
    /// value, everything else is preserved.
    pub fn overlay(&mut self, incoming: &AddressFields) {
        overlay_if_present(&mut self.street, &incoming.street);
        overlay_if_present(&mut self.number, &incoming.number);
        overlay_if_present(&mut self.complement, &incoming.complement);
        overlay_if_present(&mut self.neighborhood, &incoming.neighborhood);
        overlay_if_present(&mut self.city, &incoming.city);
        overlay_if_present(&mut self.state, &incoming.state);
        overlay_if_present(&mut self.postal_code, &incoming.postal_code);
    }

    /// Names of the fields holding non-blank text.
    pub fn present_fields(&self) -> Vec<&'static str> {
        ADDRESS_FIELD_NAMES
            .iter()
            .zip(self.slots())
            .filter(|(_, slot)| has_text(slot))
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Persisted postal address, owned generically through [`OwnerRef`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: Uuid,
    pub owner: OwnerRef,
    #[serde(flatten)]
    pub fields: AddressFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AddressRecord {
    pub fn new(owner: OwnerRef, fields: AddressFields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// `NNNNN-NNN`, or the stored value when it is not 8 digits.
    pub fn formatted_postal_code(&self) -> String {
        self.fields
            .postal_code
            .as_deref()
            .map(format_postal_code)
            .unwrap_or_default()
    }

    pub fn formatted_address(&self) -> String {
        let f = &self.fields;
        let text = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").to_string();
        let mut parts = Vec::new();

        let street = text(&f.street);
        if !street.is_empty() {
            let number = text(&f.number);
            let number = if number.is_empty() { "S/N".to_string() } else { number };
            parts.push(format!("{}, {}", street, number));
        }
        let complement = text(&f.complement);
        if !complement.is_empty() {
            parts.push(format!("Compl: {}", complement));
        }
        let neighborhood = text(&f.neighborhood);
        if !neighborhood.is_empty() {
            parts.push(neighborhood);
        }
        let city_state: Vec<String> = [text(&f.city), text(&f.state)]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        if !city_state.is_empty() {
            parts.push(city_state.join("-"));
        }
        if has_text(&f.postal_code) {
            parts.push(format!("CEP: {}", self.formatted_postal_code()));
        }

        if parts.is_empty() {
            "Endereço não fornecido".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Postal code, street, number, neighborhood, city and state all filled.
    pub fn is_complete(&self) -> bool {
        let f = &self.fields;
        has_text(&f.postal_code) && has_text(&f.number) && f.is_manually_complete()
    }

    /// First stored-constraint violation of this record, if any.
    pub fn constraint_violation(&self) -> Option<String> {
        let f = &self.fields;
        if !f.has_any_value() {
            return Some("address has no data".to_string());
        }
        if let Some(code) = f.postal_code.as_deref() {
            if code.len() != 8 || !code.chars().all(|c| c.is_ascii_digit()) {
                return Some(format!("postal_code '{}' is not 8 digits", code));
            }
        }
        if let Some(state) = f.state.as_deref() {
            if !is_valid_state(state) {
                return Some(format!("state '{}' is not a known code", state));
            }
        }
        None
    }
}

// ============ Registry Model ============

/// Organization data returned by a national registry lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgFields {
    pub legal_name: String,
    pub trade_name: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    /// Active state registration (IE), empty when none is enabled.
    pub registration_number: String,
}

impl OrgFields {
    /// Address portion of the registry data; empty strings become absent.
    pub fn address_fields(&self) -> AddressFields {
        let opt = |v: &str| {
            let v = v.trim();
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        };
        AddressFields {
            street: opt(&self.street),
            number: opt(&self.number),
            complement: opt(&self.complement),
            neighborhood: opt(&self.neighborhood),
            city: opt(&self.city),
            state: opt(&self.state),
            postal_code: opt(&self.postal_code),
        }
    }
}

// ============ Save Intent ============

/// What the caller asked for regarding the owner's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressIntent {
    /// No instruction: keep the current address (organizations may be filled from the registry).
    Unspecified,
    /// Caller-supplied address fields.
    Explicit(AddressFields),
    /// Caller sent an empty payload: remove the address.
    Clear,
}

impl AddressIntent {
    /// Maps a request payload: absent → `Unspecified`, `{}` → `Clear`, anything else → `Explicit`.
    pub fn from_payload(payload: Option<AddressFields>) -> Self {
        match payload {
            None => AddressIntent::Unspecified,
            Some(fields) if fields.is_absent() => AddressIntent::Clear,
            Some(fields) => AddressIntent::Explicit(fields),
        }
    }
}

/// Where the address data of an upsert came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    Caller,
    Registry,
}

/// Address change applied by a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressChange {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

/// Result of a successful owner save.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub owner: Owner,
    pub address: Option<AddressRecord>,
    pub address_change: AddressChange,
    pub address_source: Option<AddressSource>,
}
