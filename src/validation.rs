//! Owner field validation, run before any write.
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

use crate::errors::{FieldErrors, ValidationKind};
use crate::models::{Owner, OwnerType, PartyKind};
use crate::normalizer::digits_only;
use crate::tax_id::TaxIdValidator;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    // RFC 5322 simplified: local@domain.tld
    EMAIL.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("email pattern compiles")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 {
        return false;
    }
    email_regex().is_match(email)
}

/// Validates a Brazilian phone number.
///
/// Returns the E.164 form (`+5511987654321`) when valid.
pub fn validate_br_phone(raw: &str) -> Option<String> {
    match phonenumber::parse(Some(CountryId::BR), raw) {
        Ok(number) if phonenumber::is_valid(&number) => {
            Some(number.format().mode(Mode::E164).to_string())
        }
        Ok(_) => {
            tracing::debug!("Rejected BR phone number: {}", raw);
            None
        }
        Err(e) => {
            tracing::debug!("Failed to parse BR phone '{}': {:?}", raw, e);
            None
        }
    }
}

fn trimmed_or_none(value: &mut Option<String>) {
    *value = value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
}

impl Owner {
    /// Cleans fields in place and collects every rule violation.
    ///
    /// `national_id` and `phone` are reduced to digits and `email` is
    /// lower-cased even when other fields fail.
    pub fn validate(&mut self, tax_ids: &dyn TaxIdValidator) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        self.full_name = self.full_name.trim().to_string();
        if self.full_name.is_empty() {
            errors.add("full_name", ValidationKind::Required, "Nome é obrigatório.");
        }
        trimmed_or_none(&mut self.preferred_name);
        trimmed_or_none(&mut self.state_registration);

        self.national_id = digits_only(&self.national_id);
        self.validate_national_id(tax_ids, &mut errors);

        trimmed_or_none(&mut self.phone);
        if let Some(phone) = self.phone.take() {
            let digits = digits_only(&phone);
            if !(10..=11).contains(&digits.len()) || validate_br_phone(&digits).is_none() {
                errors.add(
                    "phone",
                    ValidationKind::InvalidFormat,
                    "Telefone inválido. Informe DDD + número (10 ou 11 dígitos).",
                );
            }
            self.phone = Some(digits);
        }

        trimmed_or_none(&mut self.email);
        if let Some(email) = self.email.take() {
            let email = email.to_lowercase();
            if !is_valid_email(&email) {
                errors.add("email", ValidationKind::InvalidFormat, "E-mail inválido.");
            }
            self.email = Some(email);
        }

        errors.into_result()
    }

    fn validate_national_id(&self, tax_ids: &dyn TaxIdValidator, errors: &mut FieldErrors) {
        let label = match self.party_kind {
            PartyKind::Individual => "CPF",
            PartyKind::Organization => "CNPJ",
        };

        if self.national_id.is_empty() {
            if self.owner_type != OwnerType::Employee {
                errors.add(
                    "national_id",
                    ValidationKind::Required,
                    format!("{} é obrigatório.", label),
                );
            }
            return;
        }

        let expected = self.party_kind.national_id_len();
        if self.national_id.len() != expected {
            errors.add(
                "national_id",
                ValidationKind::TaxIdInvalid,
                format!("{} deve conter {} dígitos.", label, expected),
            );
            return;
        }

        if !tax_ids.validate_tax_id(self.party_kind, &self.national_id) {
            errors.add(
                "national_id",
                ValidationKind::TaxIdInvalid,
                format!("{} inválido.", label),
            );
        }
    }
}
