//! Input validation utilities.
//!
//! Form-style inputs are validated field by field. Each check records its message against the
//! field name in a [`FieldErrors`] collector so that one response can report every problem
//! at once; the caller finishes with [`FieldErrors::finish`].

use crate::{RecordError, RecordResult};
use chrono::{DateTime, NaiveDate, Utc};
use chs_types::{EmailAddress, NonEmptyText, PhoneNumber, TextError};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_A_CHOICE: &str = "Not a valid choice.";

/// Field name to messages, ordered by field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }

    /// `Ok(())` when nothing was recorded, otherwise [`RecordError::Validation`].
    pub fn finish(self) -> RecordResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(RecordError::Validation(self))
        }
    }

    /// Required text of at most `max` characters.
    pub fn required(&mut self, field: &str, value: &str, max: usize) -> Option<NonEmptyText> {
        match NonEmptyText::bounded(value, max) {
            Ok(text) => Some(text),
            Err(e) => {
                self.add(field, text_message(&e));
                None
            }
        }
    }

    /// Optional text of at most `max` characters. Blank input is treated as absent.
    pub fn optional(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        match NonEmptyText::bounded(value, max) {
            Ok(text) => Some(text.into_inner()),
            Err(e) => {
                self.add(field, text_message(&e));
                None
            }
        }
    }

    /// Optional free text with no length bound. Blank input is treated as absent.
    pub fn free_text(value: Option<&str>) -> Option<String> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn email(&mut self, field: &str, value: &str) -> Option<EmailAddress> {
        match EmailAddress::parse(value) {
            Ok(email) => Some(email),
            Err(e) => {
                self.add(field, text_message(&e));
                None
            }
        }
    }

    pub fn optional_email(&mut self, field: &str, value: Option<&str>) -> Option<EmailAddress> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        self.email(field, value)
    }

    pub fn phone(&mut self, field: &str, value: &str) -> Option<PhoneNumber> {
        match PhoneNumber::kenyan(value) {
            Ok(phone) => Some(phone),
            Err(e) => {
                self.add(field, text_message(&e));
                None
            }
        }
    }

    /// Parses one of a closed set of wire values.
    pub fn choice<T>(
        &mut self,
        field: &str,
        value: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let value = value.trim();
        if value.is_empty() {
            self.add(field, REQUIRED);
            return None;
        }
        let parsed = parse(value);
        if parsed.is_none() {
            self.add(field, NOT_A_CHOICE);
        }
        parsed
    }

    /// `YYYY-MM-DD`.
    pub fn date(&mut self, field: &str, value: &str) -> Option<NaiveDate> {
        let value = value.trim();
        if value.is_empty() {
            self.add(field, REQUIRED);
            return None;
        }
        match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.add(field, "Not a valid date.");
                None
            }
        }
    }

    pub fn optional_date(&mut self, field: &str, value: Option<&str>) -> Option<NaiveDate> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        self.date(field, value)
    }

    /// RFC 3339 timestamp, normalised to UTC.
    pub fn datetime(&mut self, field: &str, value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if value.is_empty() {
            self.add(field, REQUIRED);
            return None;
        }
        match DateTime::parse_from_rfc3339(value) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                self.add(field, "Not a valid datetime value.");
                None
            }
        }
    }

    pub fn in_range<T>(&mut self, field: &str, value: Option<T>, range: RangeInclusive<T>) -> Option<T>
    where
        T: PartialOrd + Copy + std::fmt::Display,
    {
        let value = value?;
        if range.contains(&value) {
            Some(value)
        } else {
            self.add(
                field,
                format!(
                    "Number must be between {} and {}.",
                    range.start(),
                    range.end()
                ),
            );
            None
        }
    }
}

fn text_message(error: &TextError) -> String {
    match error {
        TextError::Empty => REQUIRED.to_string(),
        TextError::TooLong { max } => format!("Field cannot be longer than {max} characters."),
        TextError::InvalidEmail => "Invalid email address.".to_string(),
        TextError::InvalidPhone => "Field must be between 10 and 15 characters long.".to_string(),
    }
}

/// Validates that a username is safe to use as an index key and in commit trailers.
///
/// Usernames are 3 to 64 ASCII characters drawn from alphanumerics, `.`, `-` and `_`.
pub fn validate_username(username: &str) -> Result<(), String> {
    const MIN_USERNAME_LEN: usize = 3;
    const MAX_USERNAME_LEN: usize = 64;

    let len = username.len();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(format!(
            "Field must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters long."
        ));
    }

    let ok = username
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_'));

    if !ok {
        return Err(
            "Username may contain only letters, digits, '.', '-' and '_'.".to_string(),
        );
    }

    Ok(())
}

/// Blood groups accepted on patient records.
pub const BLOOD_GROUPS: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
