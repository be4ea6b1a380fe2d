//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_IDENTIFIER_LENGTH: usize = 64;
/// Upper bound in code points; covers ZWJ sequences and skin-tone modifiers.
const MAX_EMOJI_CODEPOINTS: usize = 16;

/// Opaque client/user identifiers: 1 to 64 visible ASCII characters.
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_IDENTIFIER_LENGTH {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!(
                "Identifier must be 1 to {MAX_IDENTIFIER_LENGTH} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id.chars().all(|c| c.is_ascii_graphic()) {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some("Identifier must contain only visible ASCII characters".into());
        return Err(err);
    }

    Ok(())
}

/// Free text that must contain something besides whitespace and stay under `max` characters.
pub fn validate_text(text: &str, max: usize) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        let mut err = ValidationError::new("text_blank");
        err.message = Some("Text must not be blank".into());
        return Err(err);
    }

    let length = text.trim().chars().count();
    if length > max {
        let mut err = ValidationError::new("text_length");
        err.message = Some(format!("Text must be at most {max} characters (got {length})").into());
        return Err(err);
    }

    Ok(())
}

/// A single emoji: no letters, digits or whitespace, bounded length.
pub fn validate_emoji(emoji: &str) -> Result<(), ValidationError> {
    let count = emoji.chars().count();
    if count == 0 || count > MAX_EMOJI_CODEPOINTS {
        let mut err = ValidationError::new("emoji_length");
        err.message = Some("Emoji must be a single emoji".into());
        return Err(err);
    }

    if emoji
        .chars()
        .any(|c| c.is_ascii_alphabetic() || c.is_whitespace() || c.is_control())
    {
        let mut err = ValidationError::new("emoji_format");
        err.message = Some("Emoji must not contain letters or whitespace".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("user-42").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier(&"x".repeat(65)).is_err());
        assert!(validate_identifier("has space").is_err());
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("  what a goal  ", 20).is_ok());
        assert!(validate_text("   ", 20).is_err());
        assert!(validate_text("", 20).is_err());
        assert!(validate_text("abcdef", 5).is_err());
        assert!(validate_text("   abcde   ", 5).is_ok());
    }

    #[test]
    fn test_validate_emoji() {
        assert!(validate_emoji("🔥").is_ok());
        assert!(validate_emoji("❤️").is_ok());
        assert!(validate_emoji("👨‍👩‍👧‍👦").is_ok());
        assert!(validate_emoji("").is_err());
        assert!(validate_emoji("lol").is_err());
        assert!(validate_emoji("🔥 ").is_err());
    }
}
