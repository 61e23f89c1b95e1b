use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Name length bounds in characters, not bytes.
const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 50;

/// Bounds on the number of digits in a normalized phone number.
/// Covers local numbers through full international form with country code.
const PHONE_MIN_DIGITS: usize = 9;
const PHONE_MAX_DIGITS: usize = 15;

/// A person the user tracks debts with.
///
/// `id` is server-assigned and empty until the contact has been created
/// on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub full_name: String,
    pub phone_number: String,
    pub email: Option<String>,
}

impl Contact {
    /// Just the digits of the phone number, country code included.
    pub fn normalized_phone_digits(&self) -> String {
        phone_digits(&self.phone_number)
    }
}

/// Client-side input for creating or updating a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub full_name: String,
    pub phone_number: String,
    pub email: Option<String>,
}

impl NewContact {
    /// Validate all fields, collecting every failure rather than stopping
    /// at the first one.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut fields = Vec::new();

        let name_chars = self.full_name.trim().chars().count();
        if name_chars < NAME_MIN_CHARS {
            fields.push(FieldError::new(
                "full_name",
                format!("must be at least {} characters", NAME_MIN_CHARS),
            ));
        } else if name_chars > NAME_MAX_CHARS {
            fields.push(FieldError::new(
                "full_name",
                format!("must be at most {} characters", NAME_MAX_CHARS),
            ));
        }

        let digits = phone_digits(&self.phone_number);
        if digits.len() < PHONE_MIN_DIGITS || digits.len() > PHONE_MAX_DIGITS {
            fields.push(FieldError::new(
                "phone_number",
                format!(
                    "must contain {} to {} digits",
                    PHONE_MIN_DIGITS, PHONE_MAX_DIGITS
                ),
            ));
        }

        if let Some(ref email) = self.email {
            if !email.trim().is_empty() && !looks_like_email(email.trim()) {
                fields.push(FieldError::new("email", "not a valid email address"));
            }
        }

        if fields.is_empty() {
            Ok(())
        } else {
            Err(fields)
        }
    }
}

/// Extract just the digits from a phone number in any input format.
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Structural email check: one `@`, non-empty local part, dotted domain.
/// Deliberately loose - the backend owns real address verification.
fn looks_like_email(s: &str) -> bool {
    if s.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && !host.starts_with('.')
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, phone: &str, email: Option<&str>) -> NewContact {
        NewContact {
            full_name: name.to_string(),
            phone_number: phone.to_string(),
            email: email.map(|e| e.to_string()),
        }
    }

    #[test]
    fn test_valid_contact_passes() {
        assert!(input("Ana Li", "+998901234567", None).validate().is_ok());
        assert!(input("Ana Li", "90 123 45 67 89", Some("ana@example.com"))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_name_bounds() {
        let err = input("A", "+998901234567", None).validate().unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].field, "full_name");

        let long = "x".repeat(51);
        let err = input(&long, "+998901234567", None).validate().unwrap_err();
        assert_eq!(err[0].field, "full_name");

        // 50 chars is still fine
        let edge = "x".repeat(50);
        assert!(input(&edge, "+998901234567", None).validate().is_ok());
    }

    #[test]
    fn test_phone_digit_bounds() {
        // 8 digits: too few
        let err = input("Ana Li", "12345678", None).validate().unwrap_err();
        assert_eq!(err[0].field, "phone_number");

        // 16 digits: too many
        let err = input("Ana Li", "1234567890123456", None)
            .validate()
            .unwrap_err();
        assert_eq!(err[0].field, "phone_number");

        // Formatting characters are ignored
        assert!(input("Ana Li", "(+998) 90-123-45-67", None).validate().is_ok());
    }

    #[test]
    fn test_email_shape() {
        assert!(looks_like_email("ana@example.com"));
        assert!(looks_like_email("a.b+tag@sub.example.co"));
        assert!(!looks_like_email("ana"));
        assert!(!looks_like_email("ana@"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("ana@example"));
        assert!(!looks_like_email("ana @example.com"));
        assert!(!looks_like_email("ana@exa mple.com"));
    }

    #[test]
    fn test_empty_email_is_treated_as_absent() {
        assert!(input("Ana Li", "+998901234567", Some("")).validate().is_ok());
    }

    #[test]
    fn test_all_failures_are_collected() {
        let err = input("A", "123", Some("nope")).validate().unwrap_err();
        let fields: Vec<_> = err.iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["full_name", "phone_number", "email"]);
    }

    #[test]
    fn test_normalized_phone_digits() {
        let contact = Contact {
            id: "c1".to_string(),
            full_name: "Ana Li".to_string(),
            phone_number: "+998 (90) 123-45-67".to_string(),
            email: None,
        };
        assert_eq!(contact.normalized_phone_digits(), "998901234567");
    }
}
