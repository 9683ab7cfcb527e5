//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest room identifier accepted on the wire.
pub const MAX_ROOM_ID_LEN: usize = 64;

/// True for `#RGB` and `#RRGGBB` hex colors (either case).
pub fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validates that a room identifier is 1 to 64 characters of `[A-Za-z0-9_-]`.
pub fn validate_room_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_ROOM_ID_LEN {
        let mut err = ValidationError::new("room_id_length");
        err.message = Some(
            format!(
                "Room ID must be between 1 and {MAX_ROOM_ID_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("room_id_format");
        err.message =
            Some("Room ID must contain only letters, digits, dashes and underscores".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hex_color() {
        assert!(is_hex_color("#1E90FF"));
        assert!(is_hex_color("#abcdef"));
        assert!(is_hex_color("#FFF"));
        assert!(!is_hex_color("1E90FF")); // missing hash
        assert!(!is_hex_color("#1E90F")); // five digits
        assert!(!is_hex_color("#GGGGGG"));
        assert!(!is_hex_color(""));
    }

    #[test]
    fn test_validate_room_id() {
        assert!(validate_room_id("default").is_ok());
        assert!(validate_room_id("salle_2-bis").is_ok());
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id("a b").is_err());
        assert!(validate_room_id("../etc").is_err());
        assert!(validate_room_id(&"x".repeat(65)).is_err());
    }
}
