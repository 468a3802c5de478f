//! # Validation Module
//!
//! Input validation for order numbers, logins and withdrawal amounts.
//!
//! ## Order Number Checksum
//! Order numbers carry a Luhn check digit. Walking right to left, every
//! second digit (starting with the one left of the check digit) is doubled;
//! doubled values above 9 have 9 subtracted. The number is valid when the
//! digit sum is divisible by 10.
//!
//! ```text
//!   7  9  9  2  7  3  9  8  7  1  3     ← "79927398713"
//!   .  x2 .  x2 .  x2 .  x2 .  x2 .     (x2 = doubled)
//!   7  9  9  4  7  6  9  7  7  2  3     (9*2=18 → 9, 8*2=16 → 7)
//!   sum = 70  →  70 % 10 == 0  ✓
//! ```
//!
//! ## Usage
//! ```rust
//! use loyalty_core::validation::{is_valid_order_number, validate_order_number};
//!
//! assert!(is_valid_order_number("79927398713"));
//! assert!(!is_valid_order_number("79927398714"));
//!
//! let number = validate_order_number(" 79927398713\n").unwrap();
//! assert_eq!(number, "79927398713");
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::points::Points;
use crate::MAX_LOGIN_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Order Numbers
// =============================================================================

/// Checks an order number against the Luhn checksum.
///
/// ## Rules
/// - Must be non-empty
/// - Must contain only ASCII digits
/// - Digit sum after doubling must be divisible by 10
pub fn is_valid_order_number(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    for (position, byte) in number.bytes().rev().enumerate() {
        if !byte.is_ascii_digit() {
            return false;
        }
        let mut digit = u32::from(byte - b'0');
        if position % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }

    sum % 10 == 0
}

/// Trims surrounding whitespace and checks the checksum.
///
/// ## Returns
/// The trimmed order number, ready to store.
///
/// ## Errors
/// `CoreError::InvalidOrderNumber` carrying the raw input.
pub fn validate_order_number(raw: &str) -> CoreResult<&str> {
    let number = raw.trim();
    if is_valid_order_number(number) {
        Ok(number)
    } else {
        Err(CoreError::InvalidOrderNumber(raw.to_string()))
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Validates a login.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most `MAX_LOGIN_LENGTH` characters
/// - No whitespace inside
pub fn validate_login(login: &str) -> ValidationResult<&str> {
    let login = login.trim();

    if login.is_empty() {
        return Err(ValidationError::Required {
            field: "login".to_string(),
        });
    }

    if login.chars().count() > MAX_LOGIN_LENGTH {
        return Err(ValidationError::TooLong {
            field: "login".to_string(),
            max: MAX_LOGIN_LENGTH,
        });
    }

    if login.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "login".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(login)
}

/// Validates a password. Only emptiness is rejected.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::Required {
            field: "password".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Amounts
// =============================================================================

/// Validates a withdrawal amount.
///
/// ## Rules
/// - Must be positive (> 0). A zero withdrawal would append a row that
///   moves nothing.
pub fn validate_withdrawal_amount(amount: Points) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "sum".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_luhn_numbers() {
        assert!(is_valid_order_number("79927398713"));
        assert!(is_valid_order_number("4561261212345467"));
        assert!(is_valid_order_number("0"));
        assert!(is_valid_order_number("18"));

        assert!(!is_valid_order_number("79927398714"));
        assert!(!is_valid_order_number("4561261212345464"));
        assert!(!is_valid_order_number("1"));
    }

    #[test]
    fn test_non_numeric_is_invalid() {
        assert!(!is_valid_order_number(""));
        assert!(!is_valid_order_number("7992-7398-713"));
        assert!(!is_valid_order_number("79927398713 "));
        assert!(!is_valid_order_number("abc"));
        assert!(!is_valid_order_number("٣"));
    }

    #[test]
    fn test_single_digit_alteration_detected() {
        let valid = "79927398713";
        for position in 0..valid.len() {
            for replacement in b'0'..=b'9' {
                let mut bytes = valid.as_bytes().to_vec();
                if bytes[position] == replacement {
                    continue;
                }
                bytes[position] = replacement;
                let altered = String::from_utf8(bytes).unwrap();
                assert!(
                    !is_valid_order_number(&altered),
                    "alteration {altered} passed the checksum"
                );
            }
        }
    }

    #[test]
    fn test_validate_order_number_trims() {
        assert_eq!(validate_order_number("  79927398713\n").unwrap(), "79927398713");

        let err = validate_order_number("79927398714").unwrap_err();
        assert_eq!(err, CoreError::InvalidOrderNumber("79927398714".to_string()));
    }

    #[test]
    fn test_validate_login() {
        assert_eq!(validate_login(" alice ").unwrap(), "alice");
        assert!(validate_login("").is_err());
        assert!(validate_login("   ").is_err());
        assert!(validate_login("al ice").is_err());
        assert!(validate_login(&"a".repeat(MAX_LOGIN_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_withdrawal_amount() {
        assert!(validate_withdrawal_amount(Points::from_hundredths(1)).is_ok());
        assert!(validate_withdrawal_amount(Points::ZERO).is_err());
        assert!(validate_withdrawal_amount(Points::from_whole(-5)).is_err());
    }
}
