//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates a finish-round package: exactly three values, each 20 or 30.
///
/// # Examples
///
/// ```ignore
/// validate_package_values(&[20, 30, 30]) // Ok
/// validate_package_values(&[20, 30])     // Err - two slots
/// validate_package_values(&[20, 25, 30]) // Err - 25 is not a tier
/// ```
pub fn validate_package_values(values: &[u8]) -> Result<(), ValidationError> {
    if values.len() != 3 {
        let mut err = ValidationError::new("package_length");
        err.message = Some(format!("A package has exactly 3 values (got {})", values.len()).into());
        return Err(err);
    }

    if values.iter().any(|value| !matches!(value, 20 | 30)) {
        let mut err = ValidationError::new("package_value");
        err.message = Some("Package values must be 20 or 30".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a free-text field is not only whitespace.
pub fn validate_not_blank(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates the seat numbers of a match roster: 1 to 4, no duplicates.
pub fn validate_seats(seats: &[u8]) -> Result<(), ValidationError> {
    if seats.iter().any(|seat| !(1..=4).contains(seat)) {
        let mut err = ValidationError::new("seat_range");
        err.message = Some("Seats are numbered 1 to 4".into());
        return Err(err);
    }

    let mut sorted = seats.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != seats.len() {
        let mut err = ValidationError::new("seat_duplicate");
        err.message = Some("Each seat can only be taken once".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_package_values_valid() {
        assert!(validate_package_values(&[20, 20, 20]).is_ok());
        assert!(validate_package_values(&[30, 20, 30]).is_ok());
    }

    #[test]
    fn test_validate_package_values_invalid() {
        assert!(validate_package_values(&[20, 30]).is_err()); // too short
        assert!(validate_package_values(&[20, 30, 30, 20]).is_err()); // too long
        assert!(validate_package_values(&[20, 10, 30]).is_err()); // unknown tier
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("oops").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }

    #[test]
    fn test_validate_seats() {
        assert!(validate_seats(&[1, 2, 3, 4]).is_ok());
        assert!(validate_seats(&[1, 1]).is_err()); // duplicate
        assert!(validate_seats(&[0, 2]).is_err()); // out of range
        assert!(validate_seats(&[5]).is_err());
    }
}
