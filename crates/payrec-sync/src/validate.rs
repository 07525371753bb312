//! Format validation for inbound entity data.
//!
//! Validation failures are data-quality findings, not transient conditions:
//! workers turn them into skipped outcomes and never retry them.

/// A failed format check, carrying the offending field and a reason suitable
/// for a skip message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationIssue {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.field, self.reason)
    }
}

/// Check the basic shape of an email address.
pub fn validate_email(email: &str) -> Result<(), ValidationIssue> {
    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => {
            return Err(ValidationIssue::new(
                "email",
                format!("'{email}' must contain exactly one '@'"),
            ))
        }
    };

    if local.is_empty() || domain.is_empty() {
        return Err(ValidationIssue::new(
            "email",
            format!("'{email}' has an empty local part or domain"),
        ));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(ValidationIssue::new(
            "email",
            format!("'{email}' has a malformed domain"),
        ));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(ValidationIssue::new(
            "email",
            format!("'{email}' contains whitespace"),
        ));
    }
    Ok(())
}

/// Validate a tax identifier via its mod-11 checksum.
///
/// Accepts the 11-digit (person) and 14-digit (company) forms, with or
/// without punctuation. Repeated-digit sequences pass the checksum but are
/// not real identifiers, so they are rejected.
pub fn validate_tax_id(tax_id: &str) -> Result<(), ValidationIssue> {
    let digits: Vec<u32> = tax_id.chars().filter_map(|c| c.to_digit(10)).collect();

    match digits.len() {
        11 => validate_person_tax_id(&digits),
        14 => validate_company_tax_id(&digits),
        n => Err(ValidationIssue::new(
            "tax_id",
            format!("expected 11 or 14 digits, got {n}"),
        )),
    }
}

fn all_same(digits: &[u32]) -> bool {
    digits.iter().all(|&d| d == digits[0])
}

fn mod11_check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let rem = sum % 11;
    if rem < 2 {
        0
    } else {
        11 - rem
    }
}

fn validate_person_tax_id(digits: &[u32]) -> Result<(), ValidationIssue> {
    if all_same(digits) {
        return Err(ValidationIssue::new("tax_id", "repeated-digit sequence"));
    }

    let w1: Vec<u32> = (2..=10).rev().collect();
    let w2: Vec<u32> = (2..=11).rev().collect();

    if mod11_check_digit(&digits[..9], &w1) != digits[9]
        || mod11_check_digit(&digits[..10], &w2) != digits[10]
    {
        return Err(ValidationIssue::new("tax_id", "checksum mismatch"));
    }
    Ok(())
}

fn validate_company_tax_id(digits: &[u32]) -> Result<(), ValidationIssue> {
    if all_same(digits) {
        return Err(ValidationIssue::new("tax_id", "repeated-digit sequence"));
    }

    let w1 = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    let w2 = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    if mod11_check_digit(&digits[..12], &w1) != digits[12]
        || mod11_check_digit(&digits[..13], &w2) != digits[13]
    {
        return Err(ValidationIssue::new("tax_id", "checksum mismatch"));
    }
    Ok(())
}

/// Validate a phone number by digit count (10 or 11 digits, area code
/// included), ignoring punctuation.
pub fn validate_phone(phone: &str) -> Result<(), ValidationIssue> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if (10..=11).contains(&digits) {
        Ok(())
    } else {
        Err(ValidationIssue::new(
            "phone",
            format!("expected 10 or 11 digits, got {digits}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_accepts_plain_addresses() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("first.last+tag@mail.example.org").is_ok());
    }

    #[test]
    fn test_email_rejects_malformed() {
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@nodot").is_err());
        assert!(validate_email("user@domain.").is_err());
        assert!(validate_email("user name@example.com").is_err());
    }

    #[test]
    fn test_person_tax_id_checksum() {
        assert!(validate_tax_id("52998224725").is_ok());
        assert!(validate_tax_id("529.982.247-25").is_ok());

        assert!(validate_tax_id("52998224726").is_err());
        assert!(validate_tax_id("12345678900").is_err());
    }

    #[test]
    fn test_company_tax_id_checksum() {
        assert!(validate_tax_id("11222333000181").is_ok());
        assert!(validate_tax_id("11.222.333/0001-81").is_ok());

        assert!(validate_tax_id("11222333000182").is_err());
    }

    #[test]
    fn test_tax_id_rejects_repeated_digits() {
        assert!(validate_tax_id("11111111111").is_err());
        assert!(validate_tax_id("00000000000000").is_err());
    }

    #[test]
    fn test_tax_id_rejects_wrong_length() {
        assert!(validate_tax_id("123").is_err());
        assert!(validate_tax_id("").is_err());
        assert!(validate_tax_id("529982247251234567").is_err());
    }

    #[test]
    fn test_phone_digit_length() {
        assert!(validate_phone("11987654321").is_ok());
        assert!(validate_phone("(11) 98765-4321").is_ok());
        assert!(validate_phone("1187654321").is_ok());

        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("123456789012").is_err());
    }

    #[test]
    fn test_issue_display() {
        let issue = validate_email("bad").unwrap_err();
        assert!(issue.to_string().starts_with("invalid email:"));
    }
}
