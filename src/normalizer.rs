//! Pure cleaning and validation helpers for address and document fields.
use crate::errors::{FieldError, ValidationKind};

/// The 27 Brazilian federative units accepted in `state`.
pub const BRAZILIAN_STATES: [(&str, &str); 27] = [
    ("AC", "Acre"),
    ("AL", "Alagoas"),
    ("AP", "Amapá"),
    ("AM", "Amazonas"),
    ("BA", "Bahia"),
    ("CE", "Ceará"),
    ("DF", "Distrito Federal"),
    ("ES", "Espírito Santo"),
    ("GO", "Goiás"),
    ("MA", "Maranhão"),
    ("MT", "Mato Grosso"),
    ("MS", "Mato Grosso do Sul"),
    ("MG", "Minas Gerais"),
    ("PA", "Pará"),
    ("PB", "Paraíba"),
    ("PR", "Paraná"),
    ("PE", "Pernambuco"),
    ("PI", "Piauí"),
    ("RJ", "Rio de Janeiro"),
    ("RN", "Rio Grande do Norte"),
    ("RS", "Rio Grande do Sul"),
    ("RO", "Rondônia"),
    ("RR", "Roraima"),
    ("SC", "Santa Catarina"),
    ("SP", "São Paulo"),
    ("SE", "Sergipe"),
    ("TO", "Tocantins"),
];

/// Keeps only ASCII digits.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strips formatting from a postal code (CEP).
///
/// Returns `Ok(None)` for absent or blank input, `Ok(Some(digits))` for exactly
/// eight digits and `InvalidFormat` for anything else.
pub fn clean_postal_code(raw: Option<&str>) -> Result<Option<String>, FieldError> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let cleaned = digits_only(raw);
    if cleaned.is_empty() && raw.trim().is_empty() {
        return Ok(None);
    }
    if cleaned.len() == 8 {
        return Ok(Some(cleaned));
    }

    Err(FieldError {
        kind: ValidationKind::InvalidFormat,
        message: "CEP inválido. Deve conter 8 dígitos numéricos.".to_string(),
    })
}

/// `12345678` → `12345-678`; any other value is returned as given.
pub fn format_postal_code(postal_code: &str) -> String {
    if postal_code.len() == 8 && postal_code.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}", &postal_code[..5], &postal_code[5..])
    } else {
        postal_code.to_string()
    }
}

/// Trims, collapses whitespace runs and title-cases every word.
///
/// A letter is upper-cased when the previously written character is not a
/// letter, and lower-cased otherwise, so `"RUA D'ÁVILA"` becomes
/// `"Rua D'Ávila"`. Deciding on the written output keeps the function
/// idempotent even for characters whose case mapping expands.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn emit(out: &mut String, c: char, prev_is_letter: &mut bool) {
    out.push(c);
    *prev_is_letter = c.is_alphabetic();
}

fn title_case_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev_is_letter = false;

    for c in word.chars() {
        if !c.is_alphabetic() {
            emit(&mut out, c, &mut prev_is_letter);
        } else if prev_is_letter {
            for lower in c.to_lowercase() {
                emit(&mut out, lower, &mut prev_is_letter);
            }
        } else {
            // Multi-char uppercase mappings (ß → SS) keep only the head capitalised.
            let mut upper = c.to_uppercase();
            if let Some(head) = upper.next() {
                emit(&mut out, head, &mut prev_is_letter);
            }
            for rest in upper {
                for lower in rest.to_lowercase() {
                    emit(&mut out, lower, &mut prev_is_letter);
                }
            }
        }
    }

    out
}

/// Upper-cases a state code and checks it against [`BRAZILIAN_STATES`].
pub fn normalize_state(raw: &str) -> Result<String, FieldError> {
    let code = raw.trim().to_uppercase();
    if is_valid_state(&code) {
        Ok(code)
    } else {
        Err(FieldError {
            kind: ValidationKind::InvalidState,
            message: format!("UF inválida: '{}'", raw.trim()),
        })
    }
}

pub fn is_valid_state(code: &str) -> bool {
    BRAZILIAN_STATES.iter().any(|(uf, _)| *uf == code)
}

fn is_ascii_digits(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii_digit())
}

/// `10585278008` → `105.852.780-08`, `11222333000181` → `11.222.333/0001-81`.
/// Anything that is not a plain digit string is returned as given.
pub fn format_national_id(digits: &str) -> String {
    if !is_ascii_digits(digits) {
        return digits.to_string();
    }
    match digits.len() {
        11 => format!(
            "{}.{}.{}-{}",
            &digits[..3],
            &digits[3..6],
            &digits[6..9],
            &digits[9..]
        ),
        14 => format!(
            "{}.{}.{}/{}-{}",
            &digits[..2],
            &digits[2..5],
            &digits[5..8],
            &digits[8..12],
            &digits[12..]
        ),
        _ => digits.to_string(),
    }
}

/// `1133334444` → `(11) 3333-4444`, `11987654321` → `(11) 98765-4321`.
pub fn format_phone(digits: &str) -> String {
    if !is_ascii_digits(digits) {
        return digits.to_string();
    }
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[..2], &digits[2..6], &digits[6..]),
        11 => format!("({}) {}-{}", &digits[..2], &digits[2..7], &digits[7..]),
        _ => digits.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_postal_code_strips_mask() {
        assert_eq!(
            clean_postal_code(Some("12345-678")).unwrap(),
            Some("12345678".to_string())
        );
        assert_eq!(
            clean_postal_code(Some(" 01.001-000 ")).unwrap(),
            Some("01001000".to_string())
        );
    }

    #[test]
    fn test_clean_postal_code_empty_is_none() {
        assert_eq!(clean_postal_code(None).unwrap(), None);
        assert_eq!(clean_postal_code(Some("")).unwrap(), None);
        assert_eq!(clean_postal_code(Some("   ")).unwrap(), None);
    }

    #[test]
    fn test_clean_postal_code_rejects_wrong_length() {
        let err = clean_postal_code(Some("12345")).unwrap_err();
        assert_eq!(err.kind, ValidationKind::InvalidFormat);
        assert!(clean_postal_code(Some("123456789")).is_err());
        assert!(clean_postal_code(Some("abc")).is_err());
    }

    #[test]
    fn test_format_postal_code() {
        assert_eq!(format_postal_code("12345678"), "12345-678");
        assert_eq!(format_postal_code("1234"), "1234");
    }

    #[test]
    fn test_normalize_text_title_cases_and_collapses() {
        assert_eq!(normalize_text("  rua   das FLORES "), "Rua Das Flores");
        assert_eq!(normalize_text("SÃO JOÃO"), "São João");
        assert_eq!(normalize_text("d'ávila"), "D'Ávila");
        assert_eq!(normalize_text("bloco 2a"), "Bloco 2A");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_normalize_text_sharp_s_is_stable() {
        let once = normalize_text("ßtraße");
        assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn test_normalize_state() {
        assert_eq!(normalize_state("sp").unwrap(), "SP");
        assert_eq!(normalize_state(" rj ").unwrap(), "RJ");
        let err = normalize_state("XX").unwrap_err();
        assert_eq!(err.kind, ValidationKind::InvalidState);
        assert!(normalize_state("").is_err());
    }

    #[test]
    fn test_state_enumeration_has_27_unique_codes() {
        let mut codes: Vec<&str> = BRAZILIAN_STATES.iter().map(|(uf, _)| *uf).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 27);
    }

    #[test]
    fn test_format_national_id_and_phone() {
        assert_eq!(format_national_id("10585278008"), "105.852.780-08");
        assert_eq!(format_national_id("11222333000181"), "11.222.333/0001-81");
        assert_eq!(format_phone("1133334444"), "(11) 3333-4444");
        assert_eq!(format_phone("11987654321"), "(11) 98765-4321");
    }

    #[test]
    fn test_formatting_leaves_non_digit_values_alone() {
        // Multi-byte characters at the slice positions must not panic.
        assert_eq!(format_national_id("çã1234567"), "çã1234567");
        assert_eq!(format_national_id("123.456.78"), "123.456.78");
        assert_eq!(format_phone("aç1234567"), "aç1234567");
        assert_eq!(format_phone("(11) 9876"), "(11) 9876");
    }
}
