//! Commit authorship.
//!
//! Every change to a patient repository is committed under the acting account. The author's
//! name and role become trailers on the commit, and a clinician's licence number is carried as
//! an `Author-Registration` trailer.

use crate::access::Actor;
use crate::error::{RecordError, RecordResult};
use chs_types::{EmailAddress, NonEmptyText};

/// Authority label for licence numbers recorded at registration.
const LICENSE_AUTHORITY: &str = "License";

/// Represents an author of a commit or record operation.
#[derive(Clone, Debug)]
pub struct Author {
    /// The full name of the author.
    pub name: NonEmptyText,

    /// The role title of the author (e.g., "Doctor", "Community Health Worker").
    pub role: NonEmptyText,

    pub email: EmailAddress,

    /// Professional registrations for the author.
    pub registrations: Vec<AuthorRegistration>,
}

/// A declared professional registration for an author.
///
/// This is rendered in commit trailers as:
///
/// `Author-Registration: <authority> <number>`
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AuthorRegistration {
    pub authority: NonEmptyText,
    pub number: NonEmptyText,
}

impl AuthorRegistration {
    pub fn new(authority: impl Into<String>, number: impl Into<String>) -> RecordResult<Self> {
        let authority_str = authority.into().trim().to_string();
        let number_str = number.into().trim().to_string();

        if authority_str.chars().any(char::is_whitespace)
            || number_str.chars().any(char::is_whitespace)
        {
            return Err(RecordError::InvalidAuthorRegistration);
        }

        let authority =
            NonEmptyText::new(authority_str).map_err(|_| RecordError::InvalidAuthorRegistration)?;
        let number =
            NonEmptyText::new(number_str).map_err(|_| RecordError::InvalidAuthorRegistration)?;

        Ok(Self { authority, number })
    }
}

impl Author {
    /// Build the commit author for an authenticated actor.
    ///
    /// A licence number that cannot be expressed as a single-token registration is left off
    /// the commit rather than failing the write.
    pub fn from_actor(actor: &Actor) -> RecordResult<Self> {
        let name = NonEmptyText::new(&actor.full_name)
            .or_else(|_| NonEmptyText::new(&actor.username))
            .map_err(|_| RecordError::InvalidInput("author name cannot be empty".into()))?;
        let role = NonEmptyText::new(actor.role.title())
            .map_err(|_| RecordError::InvalidInput("author role cannot be empty".into()))?;
        let email = EmailAddress::parse(&actor.email)
            .map_err(|e| RecordError::InvalidInput(format!("author email: {e}")))?;

        let mut registrations = Vec::new();
        if let Some(number) = actor.license_number.as_deref() {
            match AuthorRegistration::new(LICENSE_AUTHORITY, number) {
                Ok(reg) => registrations.push(reg),
                Err(_) => tracing::warn!(
                    "licence number for account {} is not a single token; omitted from commit",
                    actor.id
                ),
            }
        }

        Ok(Self {
            name,
            role,
            email,
            registrations,
        })
    }

    /// Validate that this author contains the mandatory commit author metadata.
    ///
    /// This validation is intended to run before commit creation.
    pub fn validate_commit_author(&self) -> RecordResult<()> {
        for reg in &self.registrations {
            AuthorRegistration::new(reg.authority.as_str(), reg.number.as_str())?;
        }
        Ok(())
    }
}
