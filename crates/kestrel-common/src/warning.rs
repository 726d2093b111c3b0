//! Pipeline warnings with deduplication.
//!
//! Style and layout input that cannot be used (a unit we do not understand,
//! a color we cannot parse) is never fatal. It is dropped and reported once
//! through the `log` facade so a page with a thousand bad declarations does
//! not produce a thousand identical lines.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Set of warnings we've already reported (to deduplicate).
static WARNED: Mutex<Option<HashSet<String>>> = Mutex::new(None);

/// Warn about unusable input (reported once per unique message).
///
/// # Example
/// ```ignore
/// warn_once("CSS", "dropping font-size '1.5em'");
/// ```
pub fn warn_once(component: &str, message: &str) {
    let key = format!("[{component}] {message}");
    let should_report = WARNED
        .lock()
        .get_or_insert_with(HashSet::new)
        .insert(key);

    if should_report {
        log::warn!(target: "kestrel", "[{component}] {message}");
    }
}

/// Clear all recorded warnings (call when loading a new document).
pub fn clear_warnings() {
    let mut guard = WARNED.lock();
    if let Some(set) = guard.as_mut() {
        set.clear();
    }
}

/// Whether a given warning has been reported since the last clear.
#[must_use]
pub fn was_warned(component: &str, message: &str) -> bool {
    let key = format!("[{component}] {message}");
    WARNED
        .lock()
        .as_ref()
        .is_some_and(|set| set.contains(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_records_message() {
        warn_once("TEST", "unique message for record test");
        assert!(was_warned("TEST", "unique message for record test"));
        assert!(!was_warned("TEST", "never reported"));
    }

    #[test]
    fn test_repeated_warning_is_recorded_once() {
        warn_once("TEST", "repeated message");
        warn_once("TEST", "repeated message");
        let count = WARNED
            .lock()
            .as_ref()
            .map_or(0, |set| set.iter().filter(|k| k.contains("repeated message")).count());
        assert_eq!(count, 1);
    }
}
