//! Validated text primitives shared across the community health workspace.
//!
//! Each type checks its invariant once at construction so that services and wire models can
//! accept it without re-validating.

use std::fmt;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The trimmed input exceeded the permitted number of characters
    #[error("Text cannot be longer than {max} characters")]
    TooLong { max: usize },

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Phone number must be between 10 and 15 characters")]
    InvalidPhone,
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Creates a `NonEmptyText` that is also at most `max` characters long.
    ///
    /// Length is counted in characters, not bytes, after trimming.
    pub fn bounded(input: impl AsRef<str>, max: usize) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        if text.0.chars().count() > max {
            return Err(TextError::TooLong { max });
        }
        Ok(text)
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for NonEmptyText {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// An email address with a plausible `local@domain.tld` shape.
///
/// The stored form is trimmed and the domain part lowercased. Uniqueness checks should use
/// [`EmailAddress::normalised`], which lowercases the whole address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    const MAX_LEN: usize = 120;

    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(TextError::TooLong { max: Self::MAX_LEN });
        }

        let (local, domain) = trimmed.split_once('@').ok_or(TextError::InvalidEmail)?;
        let domain_ok = !domain.is_empty()
            && !domain.contains('@')
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.');
        if local.is_empty() || !domain_ok || trimmed.chars().any(char::is_whitespace) {
            return Err(TextError::InvalidEmail);
        }

        Ok(Self(format!("{local}@{}", domain.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form used as a uniqueness key.
    pub fn normalised(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for EmailAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for EmailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EmailAddress::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A mobile number in Kenyan international form (`+254...`).
///
/// Construction strips everything except digits and then normalises the prefix:
///
/// - `2547...` becomes `+2547...`
/// - `07...` becomes `+2547...`
/// - anything else is treated as a local number and prefixed with `+254`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    const MIN_INPUT_LEN: usize = 10;
    const MAX_INPUT_LEN: usize = 15;

    /// Normalises a phone number as entered on a payment form.
    ///
    /// The raw input (before normalisation) must be 10 to 15 characters long, which accepts
    /// `0712345678`, `254712345678` and `+254712345678`.
    pub fn kenyan(input: impl AsRef<str>) -> Result<Self, TextError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(TextError::Empty);
        }
        let len = raw.chars().count();
        if !(Self::MIN_INPUT_LEN..=Self::MAX_INPUT_LEN).contains(&len) {
            return Err(TextError::InvalidPhone);
        }

        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(TextError::InvalidPhone);
        }

        let normalised = if digits.starts_with("254") {
            format!("+{digits}")
        } else if let Some(rest) = digits.strip_prefix('0') {
            format!("+254{rest}")
        } else {
            format!("+254{digits}")
        };

        Ok(Self(normalised))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for PhoneNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PhoneNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PhoneNumber::kenyan(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Kibera  ").unwrap();
        assert_eq!(text.as_str(), "Kibera");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
    }

    #[test]
    fn bounded_counts_characters_not_bytes() {
        assert!(NonEmptyText::bounded("Muranga'ñ", 9).is_ok());
        assert_eq!(
            NonEmptyText::bounded("abcdef", 5),
            Err(TextError::TooLong { max: 5 })
        );
    }

    #[test]
    fn email_lowercases_domain_only() {
        let email = EmailAddress::parse("Wanjiru@Clinic.CO.KE").unwrap();
        assert_eq!(email.as_str(), "Wanjiru@clinic.co.ke");
        assert_eq!(email.normalised(), "wanjiru@clinic.co.ke");
    }

    #[test]
    fn email_rejects_malformed_addresses() {
        for bad in ["no-at-sign", "@clinic.ke", "nurse@", "nurse@clinic", "a b@c.ke"] {
            assert_eq!(EmailAddress::parse(bad), Err(TextError::InvalidEmail), "{bad}");
        }
    }

    #[test]
    fn phone_normalises_local_prefix() {
        let phone = PhoneNumber::kenyan("0712345678").unwrap();
        assert_eq!(phone.as_str(), "+254712345678");
    }

    #[test]
    fn phone_keeps_country_code() {
        assert_eq!(
            PhoneNumber::kenyan("254712345678").unwrap().as_str(),
            "+254712345678"
        );
        assert_eq!(
            PhoneNumber::kenyan("+254 712 345678").unwrap().as_str(),
            "+254712345678"
        );
    }

    #[test]
    fn phone_rejects_wrong_length() {
        assert_eq!(PhoneNumber::kenyan("07123"), Err(TextError::InvalidPhone));
        assert_eq!(
            PhoneNumber::kenyan("0712345678901234"),
            Err(TextError::InvalidPhone)
        );
    }
}
