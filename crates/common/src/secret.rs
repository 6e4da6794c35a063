//! Secret wrapper for API credentials

use std::fmt;
use zeroize::Zeroize;

/// Number of leading characters `masked()` keeps visible.
const MASK_VISIBLE_CHARS: usize = 4;

/// Sensitive value - redacted in Debug/Display/logs, zeroed on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Wrap a sensitive value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize + AsRef<str>> Secret<T> {
    /// Short, log-safe prefix of the secret, e.g. `AIza…`.
    ///
    /// Secrets shorter than the visible prefix are fully masked.
    pub fn masked(&self) -> String {
        let value = self.0.as_ref();
        if value.chars().count() <= MASK_VISIBLE_CHARS {
            return "…".to_string();
        }
        let prefix: String = value.chars().take(MASK_VISIBLE_CHARS).collect();
        format!("{prefix}…")
    }
}

impl<T: Zeroize + PartialEq> PartialEq for Secret<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let secret = Secret::new(String::from("AIzaSyExampleKey"));
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn expose_returns_inner_value() {
        let secret = Secret::new(String::from("AIzaSyExampleKey"));
        assert_eq!(secret.expose(), "AIzaSyExampleKey");
    }

    #[test]
    fn masked_keeps_only_prefix() {
        let secret = Secret::new(String::from("AIzaSyExampleKey"));
        assert_eq!(secret.masked(), "AIza…");
        assert!(!secret.masked().contains("Example"));
    }

    #[test]
    fn masked_hides_short_secrets_entirely() {
        let secret = Secret::new(String::from("abc"));
        assert_eq!(secret.masked(), "…");
    }

    #[test]
    fn equality_compares_inner_values() {
        let a = Secret::new(String::from("k1"));
        let b = Secret::new(String::from("k1"));
        let c = Secret::new(String::from("k2"));
        assert!(a == b);
        assert!(a != c);
    }
}
