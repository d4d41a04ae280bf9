// src/session/preview.rs — Display helpers for the history list

use chrono::{DateTime, Utc};

use super::Message;

/// Shown for sessions without messages.
pub const EMPTY_PREVIEW: &str = "Empty conversation";

/// Previews longer than this many characters get truncated.
pub const PREVIEW_MAX_CHARS: usize = 50;

/// First user message of a session, truncated to 50 characters plus "...".
pub fn get_session_preview(messages: &[Message]) -> String {
    match messages.first() {
        None => EMPTY_PREVIEW.to_string(),
        Some(first) => truncate_preview(&first.user_message),
    }
}

/// Truncate on character boundaries so multi-byte text never panics.
pub fn truncate_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_MAX_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Relative "time ago" label for `then`, evaluated at `now`.
///
/// Under an hour: minutes. Under a day: hours. Under a week: days.
/// Anything older gets an absolute date.
pub fn get_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    let minutes = elapsed.num_minutes();

    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return plural(minutes, "minute");
    }

    let hours = elapsed.num_hours();
    if hours < 24 {
        return plural(hours, "hour");
    }

    let days = elapsed.num_days();
    if days < 7 {
        return plural(days, "day");
    }

    then.format("%b %-d, %Y").to_string()
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}
