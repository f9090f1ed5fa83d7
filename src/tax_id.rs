use crate::models::PartyKind;

/// Checksum validation of a cleaned national id (CPF or CNPJ digits).
pub trait TaxIdValidator: Send + Sync {
    fn validate_tax_id(&self, kind: PartyKind, digits: &str) -> bool;
}

impl<F> TaxIdValidator for F
where
    F: Fn(PartyKind, &str) -> bool + Send + Sync,
{
    fn validate_tax_id(&self, kind: PartyKind, digits: &str) -> bool {
        self(kind, digits)
    }
}

/// Mod-11 check digits for CPF and CNPJ.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumTaxIdValidator;

impl TaxIdValidator for ChecksumTaxIdValidator {
    fn validate_tax_id(&self, kind: PartyKind, digits: &str) -> bool {
        if digits.len() != kind.national_id_len() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        let nums: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
        // 000.000.000-00 and friends pass the arithmetic but are not issued
        if nums.iter().all(|d| *d == nums[0]) {
            return false;
        }

        match kind {
            PartyKind::Individual => valid_cpf(&nums),
            PartyKind::Organization => valid_cnpj(&nums),
        }
    }
}

fn cpf_digit(nums: &[u32]) -> u32 {
    let weight_start = nums.len() as u32 + 1;
    let sum: u32 = nums
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    let rest = (sum * 10) % 11;
    if rest == 10 {
        0
    } else {
        rest
    }
}

fn valid_cpf(nums: &[u32]) -> bool {
    cpf_digit(&nums[..9]) == nums[9] && cpf_digit(&nums[..10]) == nums[10]
}

const CNPJ_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

fn cnpj_digit(nums: &[u32]) -> u32 {
    let weights = &CNPJ_WEIGHTS[CNPJ_WEIGHTS.len() - nums.len()..];
    let sum: u32 = nums.iter().zip(weights).map(|(d, w)| d * w).sum();
    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        11 - rest
    }
}

fn valid_cnpj(nums: &[u32]) -> bool {
    cnpj_digit(&nums[..12]) == nums[12] && cnpj_digit(&nums[..13]) == nums[13]
}
