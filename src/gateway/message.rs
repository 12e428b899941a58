use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::logutil::preview;

/// Timestamp layout used in activity lines and message summaries.
pub const DISPLAY_TIME_FORMAT: &str = "%d/%m/%y %H:%M:%S";

/// SMS delivery class, written into the `AT+CSMP` data coding scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SmsClass {
    /// Class 0: displayed immediately, not stored.
    Flash,
    /// Class 1: stored on the handset.
    #[default]
    Phone,
    /// Class 2: stored on the SIM card.
    Sim,
}

impl SmsClass {
    pub fn digit(self) -> u8 {
        match self {
            SmsClass::Flash => 0,
            SmsClass::Phone => 1,
            SmsClass::Sim => 2,
        }
    }
}

impl TryFrom<i64> for SmsClass {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SmsClass::Flash),
            1 => Ok(SmsClass::Phone),
            2 => Ok(SmsClass::Sim),
            other => Err(other),
        }
    }
}

impl fmt::Display for SmsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digit())
    }
}

/// Opaque token an observer may attach to a message (e.g. a row in a view).
/// The gateway never interprets it, only hands it back on outcome events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DisplayHandle(pub u64);

/// One SMS to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub timestamp: DateTime<Local>,
    pub recipient: String,
    pub class: SmsClass,
    pub body: String,
    /// Address of the HTTP client that submitted the request.
    pub origin: String,
    handle: Option<DisplayHandle>,
}

impl Message {
    pub fn new(
        timestamp: DateTime<Local>,
        recipient: impl Into<String>,
        class: SmsClass,
        body: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            recipient: recipient.into(),
            class,
            body: body.into(),
            origin: origin.into(),
            handle: None,
        }
    }

    pub fn handle(&self) -> Option<DisplayHandle> {
        self.handle
    }

    pub fn attach_handle(&mut self, handle: DisplayHandle) {
        self.handle = Some(handle);
    }

    /// Body on one line, cut to `max_chars`.
    pub fn summary(&self, max_chars: usize) -> String {
        preview(&self.body, max_chars)
    }

    /// `<time> - <origin> - <recipient> - C<class>: <summary>`
    pub fn describe(&self, max_chars: usize) -> String {
        format!(
            "{} - {} - {} - C{}: {}",
            self.timestamp.format(DISPLAY_TIME_FORMAT),
            self.origin,
            self.recipient,
            self.class,
            self.summary(max_chars)
        )
    }
}
