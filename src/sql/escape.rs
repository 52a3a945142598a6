//! Identifier and literal escaping for emitted SQL.
//!
//! Every builder in this crate goes through these functions; centralizing
//! escaping here is the sole injection defense for generated statement text.
//! The escaping rules follow PostgreSQL: identifiers are double-quoted with
//! embedded quotes doubled, literals are single-quoted with quotes and
//! backslashes doubled, and a literal that contains backslashes is emitted
//! in the `E'...'` form so the engine interprets the doubling.

use unicode_normalization::UnicodeNormalization;

use crate::error::EscapeError;

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

fn check_for_control_chars(s: &str) -> Result<(), EscapeError> {
    if s.chars().any(|c| c <= '\u{1F}' || c == '\u{7F}') {
        return Err(EscapeError::ControlCharacter);
    }
    Ok(())
}

fn is_valid_table_name(s: &str) -> bool {
    let mut parts = s.split('.');
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, _) => valid_part(name),
        (Some(schema), Some(name), None) => valid_part(schema) && valid_part(name),
        _ => false,
    }
}

/// Validates an identifier without escaping it.
///
/// Rejects empty strings, control characters and identifiers longer than
/// 63 bytes. With `is_table_name` set, additionally enforces the
/// letter-start, alnum/underscore pattern (optionally schema-qualified
/// with one dot).
pub fn validate_identifier(s: &str, is_table_name: bool) -> Result<(), EscapeError> {
    if s.is_empty() {
        return Err(EscapeError::Empty);
    }

    if s.len() > MAX_IDENTIFIER_LENGTH {
        return Err(EscapeError::TooLong {
            max: MAX_IDENTIFIER_LENGTH,
        });
    }

    check_for_control_chars(s)?;

    if is_table_name && !is_valid_table_name(s) {
        return Err(EscapeError::InvalidTableName);
    }

    Ok(())
}

/// Escapes an identifier for interpolation into statement text.
///
/// The input is NFC-normalized first so visually-identical names escape
/// identically, then wrapped in double quotes with embedded quotes doubled.
pub fn escape_identifier(s: &str) -> Result<String, EscapeError> {
    validate_identifier(s, false)?;

    let normalized: String = s.nfc().collect();

    Ok(format!("\"{}\"", normalized.replace('"', "\"\"")))
}

/// Escapes a string literal for interpolation into statement text.
///
/// Single quotes and backslashes are doubled; if any backslash was doubled
/// the result is prefixed with `E` so the engine applies backslash-escape
/// interpretation and the literal round-trips to the original value.
pub fn escape_literal(s: &str) -> Result<String, EscapeError> {
    if s.is_empty() {
        return Err(EscapeError::Empty);
    }

    check_for_control_chars(s)?;

    let normalized: String = s.nfc().collect();

    let mut has_backslash = false;
    let mut escaped = String::with_capacity(normalized.len() + 2);
    escaped.push('\'');

    for c in normalized.chars() {
        match c {
            '\'' => escaped.push_str("''"),
            '\\' => {
                escaped.push_str("\\\\");
                has_backslash = true;
            }
            _ => escaped.push(c),
        }
    }

    escaped.push('\'');

    if has_backslash {
        escaped.insert(0, 'E');
    }

    Ok(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escapes_plain_identifier() {
        assert_eq!(escape_identifier("events").unwrap(), "\"events\"");
    }

    #[test]
    fn doubles_embedded_quotes_in_identifiers() {
        assert_eq!(escape_identifier("my\"view").unwrap(), "\"my\"\"view\"");
    }

    #[test]
    fn rejects_empty_identifier() {
        assert_eq!(escape_identifier("").unwrap_err(), EscapeError::Empty);
    }

    #[test]
    fn rejects_control_characters() {
        assert_eq!(
            escape_identifier("bad\x01name").unwrap_err(),
            EscapeError::ControlCharacter
        );
        assert_eq!(
            escape_literal("bad\x7fvalue").unwrap_err(),
            EscapeError::ControlCharacter
        );
    }

    #[test]
    fn identifier_length_boundary_is_63_bytes() {
        let ok = "a".repeat(63);
        let too_long = "a".repeat(64);
        assert!(validate_identifier(&ok, true).is_ok());
        assert_eq!(
            validate_identifier(&too_long, true).unwrap_err(),
            EscapeError::TooLong { max: 63 }
        );
    }

    #[test]
    fn length_is_measured_in_utf8_bytes() {
        // 22 three-byte characters: 66 bytes, 22 chars
        let s = "\u{65e5}".repeat(22);
        assert_eq!(
            validate_identifier(&s, false).unwrap_err(),
            EscapeError::TooLong { max: 63 }
        );
    }

    #[test]
    fn table_name_pattern() {
        assert!(validate_identifier("valid_table_name", true).is_ok());
        assert!(validate_identifier("public.valid_table_name", true).is_ok());
        assert_eq!(
            validate_identifier("2invalid", true).unwrap_err(),
            EscapeError::InvalidTableName
        );
        assert_eq!(
            validate_identifier("a.b.c", true).unwrap_err(),
            EscapeError::InvalidTableName
        );
        assert_eq!(
            validate_identifier("has space", true).unwrap_err(),
            EscapeError::InvalidTableName
        );
    }

    #[test]
    fn escapes_literal_with_quotes() {
        assert_eq!(escape_literal("it's").unwrap(), "'it''s'");
    }

    #[test]
    fn backslash_literals_get_e_prefix() {
        assert_eq!(escape_literal("a\\b").unwrap(), "E'a\\\\b'");
    }

    #[test]
    fn literal_unescapes_to_original() {
        // For strings with single quotes, unescaping the produced literal
        // yields the input value.
        let input = "o'clock at 5 o'clock";
        let escaped = escape_literal(input).unwrap();
        let inner = &escaped[1..escaped.len() - 1];
        assert_eq!(inner.replace("''", "'"), input);
    }

    #[test]
    fn normalizes_to_nfc_before_escaping() {
        // "é" composed vs decomposed escape to the same text
        let composed = "caf\u{e9}";
        let decomposed = "cafe\u{301}";
        assert_eq!(
            escape_identifier(composed).unwrap(),
            escape_identifier(decomposed).unwrap()
        );
        assert_eq!(
            escape_literal(composed).unwrap(),
            escape_literal(decomposed).unwrap()
        );
    }
}
