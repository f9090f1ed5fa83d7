use std::sync::Arc;

use crate::errors::FieldErrors;
use crate::models::AddressFields;
use crate::normalizer::{clean_postal_code, normalize_state, normalize_text};
use crate::postal::PostalLookupService;

/// Turns partial address data into the best complete address available,
/// never replacing a value the caller supplied.
pub struct AddressResolver {
    postal: Arc<PostalLookupService>,
}

fn normalized_text(value: Option<&str>) -> Option<String> {
    value.map(normalize_text).filter(|v| !v.is_empty())
}

impl AddressResolver {
    pub fn new(postal: Arc<PostalLookupService>) -> Self {
        Self { postal }
    }

    /// Canonical form of an address without any lookup: postal code cleaned
    /// to 8 digits, free text title-cased, state upper-cased and checked.
    /// Blank fields become `None`.
    pub fn normalize(fields: &AddressFields) -> Result<AddressFields, FieldErrors> {
        let mut errors = FieldErrors::new();

        let postal_code = match clean_postal_code(fields.postal_code.as_deref()) {
            Ok(code) => code,
            Err(e) => {
                errors.add("postal_code", e.kind, e.message);
                None
            }
        };

        let state = match fields.state.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => match normalize_state(raw) {
                Ok(code) => Some(code),
                Err(e) => {
                    errors.add("state", e.kind, e.message);
                    None
                }
            },
            _ => None,
        };

        errors.into_result()?;

        Ok(AddressFields {
            street: normalized_text(fields.street.as_deref()),
            number: normalized_text(fields.number.as_deref()),
            complement: normalized_text(fields.complement.as_deref()),
            neighborhood: normalized_text(fields.neighborhood.as_deref()),
            city: normalized_text(fields.city.as_deref()),
            state,
            postal_code,
        })
    }

    /// Fills the empty fields of `current` from a postal-code lookup, then
    /// normalizes the result.
    ///
    /// A manually complete address (street, neighborhood, city and state
    /// set) is only normalized; no provider is consulted.
    pub async fn resolve_partial(
        &self,
        current: &AddressFields,
        postal_code: Option<&str>,
    ) -> Result<AddressFields, FieldErrors> {
        if current.is_manually_complete() {
            tracing::debug!("Address is manually complete, skipping postal lookup");
            return Self::normalize(current);
        }

        let cleaned = clean_postal_code(postal_code)
            .map_err(|e| FieldErrors::single("postal_code", e.kind, e.message))?;

        let mut merged = current.clone();
        if let Some(cep) = cleaned {
            match self.postal.resolve(&cep).await {
                Some(fetched) => merged.fill_missing_from(&fetched),
                None => tracing::warn!("Postal code {} not found, keeping address as given", cep),
            }
            merged.fill_missing_from(&AddressFields {
                postal_code: Some(cep),
                ..Default::default()
            });
        }

        Self::normalize(&merged)
    }
}
