use std::borrow::Cow;

use crate::util::strip_control_chars;

/// Cleans feed-supplied text before it reaches a display or a store.
///
/// Sanitizers are only applied through an explicit [`Feed::sanitize`] or
/// [`Entry::sanitize`] call, never implicitly during fetch or update.
///
/// [`Feed::sanitize`]: crate::feed::Feed::sanitize
/// [`Entry::sanitize`]: crate::feed::Entry::sanitize
pub trait Sanitizer: Send + Sync {
    /// Returns a cleaned copy of `text`.
    fn sanitize(&self, text: &str) -> String;

    /// Cleans `text` in place.
    fn sanitize_in_place(&self, text: &mut String) {
        let clean = self.sanitize(text);
        if clean != *text {
            *text = clean;
        }
    }
}

/// Strips terminal control characters and ANSI escape sequences.
///
/// Markup is left untouched; this is not an HTML sanitizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlCharSanitizer;

impl Sanitizer for ControlCharSanitizer {
    fn sanitize(&self, text: &str) -> String {
        strip_control_chars(text).into_owned()
    }

    fn sanitize_in_place(&self, text: &mut String) {
        if let Cow::Owned(clean) = strip_control_chars(text) {
            *text = clean;
        }
    }
}
