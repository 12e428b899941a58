//! Validation of inbound send requests.
//!
//! This is the single place where the external protocol constraints on
//! recipients and message class are enforced. Anything that passes here is
//! turned into queue items without further checks.

use crate::gateway::SmsClass;

/// Characters allowed anywhere in the `recipients` field.
pub const RECIPIENT_CHARS: &str = ";+0123456789 \t";

/// Request validation errors. The display text is shown verbatim to the
/// HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("The message request was missing either recipient or message data.")]
    MissingFields,

    #[error("The recipient data contains an invalid character (\"{0}\").")]
    InvalidRecipientChar(char),

    #[error("The given SMS class is invalid.")]
    InvalidClass,

    #[error("The SMS class can only be either 0, 1 or 2.")]
    ClassOutOfRange(i64),
}

/// A request that passed validation: one body and class fanned out to
/// every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub recipients: Vec<String>,
    pub body: String,
    pub class: SmsClass,
}

/// Validate the raw form fields of a send request.
///
/// Empty values count as absent. Checks run in a fixed order: missing
/// fields, recipient characters, class syntax, class range. The first
/// failing check wins.
pub fn validate_submission(
    recipients: Option<&str>,
    message: Option<&str>,
    class: Option<&str>,
) -> Result<Submission, ValidationError> {
    let recipients = non_empty(recipients).ok_or(ValidationError::MissingFields)?;
    let body = non_empty(message).ok_or(ValidationError::MissingFields)?;

    if let Some(bad) = recipients.chars().find(|c| !RECIPIENT_CHARS.contains(*c)) {
        return Err(ValidationError::InvalidRecipientChar(bad));
    }

    let class = match non_empty(class) {
        Some(raw) => parse_class(raw)?,
        None => SmsClass::default(),
    };

    Ok(Submission {
        recipients: split_recipients(recipients),
        body: body.to_string(),
        class,
    })
}

/// Split a `;`-delimited recipient list into trimmed, non-empty numbers.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_class(raw: &str) -> Result<SmsClass, ValidationError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidClass)?;
    SmsClass::try_from(value).map_err(|_| ValidationError::ClassOutOfRange(value))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
