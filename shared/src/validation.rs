//! Validation utilities for the Warehouse Management Platform
//!
//! Includes the Colombian tax-identifier checks required on electronic
//! invoices.

use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Catalog Validations
// ============================================================================

/// Validate SKU format (2-50 chars, uppercase alphanumeric, '-' or '_')
pub fn validate_sku(sku: &str) -> Result<(), &'static str> {
    if sku.len() < 2 {
        return Err("SKU must be at least 2 characters");
    }
    if sku.len() > 50 {
        return Err("SKU must be at most 50 characters");
    }
    if !sku
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err("SKU must be uppercase alphanumeric, '-' or '_'");
    }
    Ok(())
}

/// Validate a barcode (EAN-8, UPC-A, EAN-13 or GTIN-14, digits only)
pub fn validate_barcode(barcode: &str) -> Result<(), &'static str> {
    if !barcode.chars().all(|c| c.is_ascii_digit()) {
        return Err("Barcode must contain digits only");
    }
    if !matches!(barcode.len(), 8 | 12 | 13 | 14) {
        return Err("Barcode must be 8, 12, 13 or 14 digits");
    }
    Ok(())
}

/// Validate a percentage in 0..=100 (tax rates, discounts)
pub fn validate_percentage(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO || value > Decimal::from(100) {
        return Err("Percentage must be between 0 and 100");
    }
    Ok(())
}

/// Largest amount a NUMERIC(14, 2) money column holds
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// Validate a monetary amount is not negative and fits a money column
pub fn validate_non_negative_amount(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    if value > max_amount() {
        return Err("Amount exceeds 999999999999.99");
    }
    Ok(())
}

/// `quantity × unit`, refused when it leaves the money column range
pub fn line_amount(field: &str, quantity: i32, unit: Decimal) -> DomainResult<Decimal> {
    Decimal::from(quantity)
        .checked_mul(unit)
        .filter(|amount| amount.abs() <= max_amount())
        .ok_or_else(|| DomainError::validation(field, "Line amount exceeds 999999999999.99"))
}

/// Require a strictly positive line quantity
pub fn require_positive_quantity(field: &str, quantity: i32) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation(field, "Quantity must be positive"));
    }
    Ok(())
}

/// Require a counted / target quantity that is zero or more
pub fn require_non_negative_quantity(field: &str, quantity: i32) -> DomainResult<()> {
    if quantity < 0 {
        return Err(DomainError::validation(field, "Quantity cannot be negative"));
    }
    Ok(())
}

/// Require a non-blank string
pub fn require_present(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "Value is required"));
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && email.len() >= 5 => {
            Ok(())
        }
        _ => Err("Invalid email format"),
    }
}

/// Validate phone number (7-15 digits, allowing +, spaces, dashes and parentheses)
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'))
    {
        return Err("Phone number contains invalid characters");
    }
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if !(7..=15).contains(&digits) {
        return Err("Phone number must have between 7 and 15 digits");
    }
    Ok(())
}

// ============================================================================
// Colombia-Specific Validations
// ============================================================================

/// Prime weights applied right-to-left when computing a NIT check digit
const NIT_WEIGHTS: [u32; 15] = [3, 7, 13, 17, 19, 23, 29, 37, 41, 43, 47, 53, 59, 67, 71];

/// Compute the verification digit (DV) of a Colombian NIT
pub fn nit_check_digit(nit: &str) -> Option<u32> {
    let digits: Vec<u32> = nit.chars().map(|c| c.to_digit(10)).collect::<Option<_>>()?;
    if digits.is_empty() || digits.len() > NIT_WEIGHTS.len() {
        return None;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .zip(NIT_WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum();
    let remainder = sum % 11;
    Some(if remainder < 2 { remainder } else { 11 - remainder })
}

/// Validate a Colombian NIT with verification digit
/// Accepts: 800197268-4, 800.197.268-4
pub fn validate_nit(nit: &str) -> Result<(), &'static str> {
    let (number, dv) = nit
        .rsplit_once('-')
        .ok_or("NIT must include the verification digit (e.g. 800197268-4)")?;
    let number: String = number.chars().filter(|c| *c != '.').collect();
    let dv = dv
        .trim()
        .parse::<u32>()
        .map_err(|_| "Invalid NIT verification digit")?;

    match nit_check_digit(&number) {
        Some(expected) if expected == dv => Ok(()),
        Some(_) => Err("Invalid NIT verification digit"),
        None => Err("Invalid NIT format"),
    }
}

/// Customer identity document types accepted on invoices
pub const DOCUMENT_TYPES: &[(&str, &str)] = &[
    ("CC", "Cédula de ciudadanía"),
    ("CE", "Cédula de extranjería"),
    ("NIT", "Número de identificación tributaria"),
    ("TI", "Tarjeta de identidad"),
    ("PP", "Pasaporte"),
    ("RC", "Registro civil"),
    ("TE", "Tarjeta de extranjería"),
    ("DIE", "Documento de identificación extranjero"),
];

/// Validate a document type code
pub fn validate_document_type(code: &str) -> Result<(), &'static str> {
    if DOCUMENT_TYPES.iter().any(|(c, _)| *c == code) {
        Ok(())
    } else {
        Err("Unknown document type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Catalog Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_sku_valid() {
        assert!(validate_sku("SKU-001").is_ok());
        assert!(validate_sku("AB_12").is_ok());
    }

    #[test]
    fn test_validate_sku_invalid() {
        assert!(validate_sku("a").is_err());
        assert!(validate_sku("lower-case").is_err());
        assert!(validate_sku(&"X".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("7701234567890").is_ok());
        assert!(validate_barcode("12345").is_err());
        assert!(validate_barcode("77012345678AB").is_err());
    }

    #[test]
    fn test_validate_percentage() {
        assert!(validate_percentage(Decimal::from(19)).is_ok());
        assert!(validate_percentage(Decimal::ZERO).is_ok());
        assert!(validate_percentage(Decimal::from(101)).is_err());
        assert!(validate_percentage(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_amounts_bounded_to_money_column() {
        assert!(validate_non_negative_amount(max_amount()).is_ok());
        assert!(validate_non_negative_amount(max_amount() + Decimal::new(1, 2)).is_err());
        assert!(validate_non_negative_amount(Decimal::MAX).is_err());
    }

    #[test]
    fn test_line_amount_refuses_overflow() {
        assert_eq!(
            line_amount("unit_price", 3, Decimal::new(1250, 2)).unwrap(),
            Decimal::new(3750, 2)
        );
        assert_eq!(
            line_amount("unit_cost", -2, Decimal::from(5)).unwrap(),
            Decimal::from(-10)
        );
        // Decimal's own multiplication panics on this pair
        let huge = Decimal::from_i128_with_scale(79_228_162_514_264_337_593_543_950, 0);
        assert!(matches!(
            line_amount("unit_cost", 100_000, huge),
            Err(DomainError::Validation { .. })
        ));
        assert!(line_amount("unit_price", i32::MAX, max_amount()).is_err());
    }

    #[test]
    fn test_require_positive_quantity() {
        assert!(require_positive_quantity("quantity", 1).is_ok());
        assert!(require_positive_quantity("quantity", 0).is_err());
        assert!(require_non_negative_quantity("counted", 0).is_ok());
        assert!(require_non_negative_quantity("counted", -1).is_err());
    }

    // ========================================================================
    // General Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ventas@tienda.co").is_ok());
        assert!(validate_email("@tienda.co").is_err());
        assert!(validate_email("ventas.tienda.co").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+57 300 123 4567").is_ok());
        assert!(validate_phone("601-555-0101").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("300abc4567").is_err());
    }

    // ========================================================================
    // Colombia-Specific Validation Tests
    // ========================================================================

    #[test]
    fn test_nit_check_digit() {
        assert_eq!(nit_check_digit("800197268"), Some(4));
        assert_eq!(nit_check_digit("900373115"), Some(3));
        assert_eq!(nit_check_digit("890903938"), Some(8));
        assert_eq!(nit_check_digit(""), None);
        assert_eq!(nit_check_digit("12a"), None);
    }

    #[test]
    fn test_validate_nit() {
        assert!(validate_nit("800197268-4").is_ok());
        assert!(validate_nit("800.197.268-4").is_ok());
        assert!(validate_nit("800197268-5").is_err());
        assert!(validate_nit("800197268").is_err());
    }

    #[test]
    fn test_validate_document_type() {
        assert!(validate_document_type("CC").is_ok());
        assert!(validate_document_type("NIT").is_ok());
        assert!(validate_document_type("XX").is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn any_decimal() -> impl Strategy<Value = Decimal> {
            (any::<i64>(), 0..=10u32).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Any quantity and unit either multiply into the money range or are refused
            #[test]
            fn prop_line_amount_stays_in_range(quantity in any::<i32>(), unit in any_decimal()) {
                match line_amount("unit_cost", quantity, unit) {
                    Ok(amount) => prop_assert!(amount.abs() <= max_amount()),
                    Err(err) => prop_assert!(matches!(err, DomainError::Validation { .. }), "expected validation error"),
                }
            }
        }
    }
}
