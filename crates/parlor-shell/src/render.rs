//! Plain-text rendering of session events for the line shell.

use chrono::{DateTime, Local, TimeZone, Utc};
use parlor_core::{ChatMessage, MessageClass, SessionEvent};

/// Header naming who a message is from and whether it was private.
pub(crate) fn header(message: &ChatMessage, local_nick: &str) -> String {
    match message.classify(local_nick) {
        MessageClass::PublicMine => "You (public)".to_owned(),
        MessageClass::PublicOther => message.from.clone(),
        MessageClass::PrivateMine => format!("You -> {} (private)", message.to),
        MessageClass::PrivateOther => format!("{} (private)", message.from),
    }
}

/// `HH:MM` in `tz`, or `--:--` when the server sent no usable time.
pub(crate) fn clock<Tz>(timestamp: Option<DateTime<Utc>>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    timestamp.map_or_else(
        || "--:--".to_owned(),
        |ts| ts.with_timezone(tz).format("%H:%M").to_string(),
    )
}

pub(crate) fn message_line(message: &ChatMessage, local_nick: &str) -> String {
    format!(
        "[{}] {}: {}",
        clock(message.timestamp, &Local),
        header(message, local_nick),
        message.body
    )
}

pub(crate) fn contacts_line(nicks: &[String]) -> String {
    if nicks.is_empty() {
        "* no contacts".to_owned()
    } else {
        format!("* contacts: {}", nicks.join(", "))
    }
}

pub(crate) fn event_line(event: &SessionEvent, local_nick: &str) -> String {
    match event {
        SessionEvent::MessageReceived(message) => message_line(message, local_nick),
        SessionEvent::RosterReplaced { nicks } => contacts_line(nicks),
        SessionEvent::ContactAdded { nick } => format!("* {nick} added to contacts"),
        SessionEvent::Reconnecting { attempt } => {
            format!("* connection lost, reconnecting (attempt {attempt})")
        }
        SessionEvent::Reconnected => "* reconnected".to_owned(),
        SessionEvent::SessionClosed { reason } => format!("* {reason}"),
    }
}
