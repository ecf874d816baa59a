//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] crate types used throughout the tutor.
//! The ephemeral realtime key is the only long-lived secret in this
//! system: it authorizes one voice session against the realtime
//! endpoint and must never appear in logs, `Debug` output, or error
//! messages.
//!
//! `SecretString` implements `Debug` with redaction, so any struct
//! that derives `Debug` while holding one stays safe to log via
//! tracing. The value is zeroized on drop. Reading it requires an
//! explicit [`ExposeSecret::expose_secret`] call, which keeps every
//! use of the raw key greppable.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Credential {
//!     secret: SecretString,
//! }
//!
//! let cred = Credential {
//!     secret: SecretString::from("ek_live_abc123"),
//! };
//!
//! // Redacted: safe to log.
//! let shown = format!("{cred:?}");
//! assert!(!shown.contains("ek_live_abc123"));
//!
//! // Explicit access for the Authorization header.
//! let header = format!("Bearer {}", cred.secret.expose_secret());
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let secret = SecretString::from("ek_test_value");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("ek_test_value"));
    }

    #[test]
    fn expose_secret_returns_inner_value() {
        let secret = SecretString::from("ek_test_value");
        assert_eq!(secret.expose_secret(), "ek_test_value");
    }

    #[test]
    fn struct_holding_secret_is_safe_to_debug() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Credential {
            endpoint: String,
            secret: SecretString,
        }

        let cred = Credential {
            endpoint: "https://example.test/token".to_string(),
            secret: SecretString::from("ek_super_secret"),
        };

        let debug_str = format!("{cred:?}");
        assert!(debug_str.contains("example.test"));
        assert!(!debug_str.contains("ek_super_secret"));
    }
}
