use crate::error::ValidationError;
use crate::types::event::Entry;
use crate::KEY_DELIMITER;

fn check_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.contains(KEY_DELIMITER) {
        return Err(ValidationError::IllegalCharacter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Check that an entry can be aggregated without key ambiguity.
pub fn verify(entry: &Entry) -> Result<(), ValidationError> {
    if entry.origin.is_empty() {
        return Err(ValidationError::MissingOrigin);
    }
    check_field("origin", &entry.origin)?;
    check_field("scope", &entry.scope)?;

    for event in &entry.events {
        if event.name.is_empty() {
            return Err(ValidationError::EmptyEventName);
        }
        check_field("event name", &event.name)?;
        check_field("event unit", &event.unit)?;
    }
    Ok(())
}

/// Verify every entry, failing on the first violation.
pub fn verify_all(entries: &[Entry]) -> Result<(), ValidationError> {
    entries.iter().try_for_each(verify)
}
