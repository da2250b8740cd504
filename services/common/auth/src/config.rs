use std::fmt;

use crate::error::{AuthError, AuthResult};

/// Upper bound on clock-skew tolerance; larger values are clamped.
pub const MAX_LEEWAY_SECONDS: u64 = 3600;

/// Runtime configuration for HS256 signing and verification.
#[derive(Clone)]
pub struct JwtConfig {
    secret: String,
    leeway_seconds: u64,
}

impl JwtConfig {
    /// Fails when the secret is empty; a process must not start without one.
    pub fn new(secret: impl Into<String>) -> AuthResult<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(AuthError::MissingSecret);
        }
        Ok(Self { secret, leeway_seconds: 0 })
    }

    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds.min(MAX_LEEWAY_SECONDS);
        self
    }

    /// Allowable clock skew in seconds when validating exp.
    pub fn leeway_seconds(&self) -> u64 {
        self.leeway_seconds
    }

    pub fn secret(&self) -> &[u8] {
        self.secret.as_bytes()
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(JwtConfig::new("   "), Err(AuthError::MissingSecret)));
    }

    #[test]
    fn debug_redacts_secret() {
        let cfg = JwtConfig::new("hunter2").unwrap().with_leeway(5);
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("leeway_seconds: 5"));
    }

    #[test]
    fn oversized_leeway_is_clamped() {
        let cfg = JwtConfig::new("s3cret").unwrap().with_leeway(u64::MAX);
        assert_eq!(cfg.leeway_seconds(), MAX_LEEWAY_SECONDS);
    }
}
