use crate::types::event::Entry;
use crate::{ESCAPE_REPLACEMENT, KEY_DELIMITER};

fn escape_str(value: &mut String) {
    if value.contains(KEY_DELIMITER) {
        *value = value.replace(KEY_DELIMITER, &ESCAPE_REPLACEMENT.to_string());
    }
}

/// Rewrite every key delimiter in the entry's identifying fields.
///
/// Legacy alternative to [`super::verify`]; an escaped entry still needs an
/// origin and named events.
pub fn escape(mut entry: Entry) -> Entry {
    escape_str(&mut entry.origin);
    escape_str(&mut entry.scope);
    for event in &mut entry.events {
        escape_str(&mut event.name);
        escape_str(&mut event.unit);
    }
    entry
}
