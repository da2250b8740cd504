use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::VerifiedClaims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Stateless HS256 verifier; the only state a token carries is its `exp`.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    leeway_seconds: u64,
}

impl JwtVerifier {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.leeway = config.leeway_seconds();
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            decoding_key: DecodingKey::from_secret(config.secret()),
            validation,
            leeway_seconds: config.leeway_seconds(),
        }
    }

    pub fn verify(&self, token: &str) -> AuthResult<VerifiedClaims> {
        let token_data = decode::<Value>(token, &self.decoding_key, &self.validation)?;
        let claims = VerifiedClaims::try_from(token_data.claims)?;

        // jsonwebtoken accepts exp == now; a token is only live while exp > now.
        let cutoff = i64::try_from(self.leeway_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|leeway| Utc::now().checked_sub_signed(leeway))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if claims.expires_at <= cutoff {
            return Err(AuthError::InvalidOrExpired("ExpiredSignature".into()));
        }

        debug!(
            subject_id = claims.principal.subject_id(),
            role = %claims.principal.role(),
            "verified JWT successfully"
        );
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Principal;
    use crate::issuer::{TokenIssuer, TokenLifetimes};
    use crate::roles::Role;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret-please-rotate";

    fn config() -> JwtConfig {
        JwtConfig::new(SECRET).expect("config")
    }

    #[test]
    fn mint_then_verify_preserves_identity_for_every_role() {
        let cfg = config();
        let issuer = TokenIssuer::new(&cfg, TokenLifetimes::default());
        let verifier = JwtVerifier::new(&cfg);

        for principal in [
            Principal::customer(7, "pizzaco"),
            Principal::tenant_admin(3, "pizzaco"),
            Principal::customer(8, "burgerhaus"),
            Principal::tenant_admin(9, "burgerhaus"),
            Principal::super_admin(1),
        ] {
            let issued = issuer.issue(&principal).expect("issue");
            let claims = verifier.verify(&issued.token).expect("verify");
            assert_eq!(claims.principal.subject_id(), principal.subject_id());
            assert_eq!(claims.principal.role(), principal.role());
            assert_eq!(claims.principal.tenant(), principal.tenant());
            assert_eq!(claims.expires_at.timestamp(), issued.expires_at.timestamp());
        }
    }

    #[test]
    fn lifetime_depends_on_role() {
        let cfg = config();
        let issuer = TokenIssuer::new(&cfg, TokenLifetimes::default());
        let now = Utc::now();
        let customer = issuer.issue_at(&Principal::customer(7, "pizzaco"), now).unwrap();
        let admin = issuer.issue_at(&Principal::tenant_admin(3, "pizzaco"), now).unwrap();
        let root = issuer.issue_at(&Principal::super_admin(1), now).unwrap();
        assert_eq!(customer.expires_at - now, Duration::hours(72));
        assert_eq!(admin.expires_at - now, Duration::hours(8));
        assert_eq!(root.expires_at - now, Duration::hours(8));
    }

    #[test]
    fn expired_token_is_rejected() {
        let cfg = config();
        let issuer = TokenIssuer::new(&cfg, TokenLifetimes::default());
        let verifier = JwtVerifier::new(&cfg);
        let issued = issuer
            .issue_at(&Principal::customer(7, "pizzaco"), Utc::now() - Duration::hours(73))
            .unwrap();
        let err = verifier.verify(&issued.token).unwrap_err();
        assert_eq!(err.kind(), "invalid_or_expired");
    }

    #[test]
    fn huge_leeway_is_bounded_and_never_panics() {
        let cfg = config().with_leeway(u64::MAX);
        let issuer = TokenIssuer::new(&cfg, TokenLifetimes::default());
        let verifier = JwtVerifier::new(&cfg);

        let live = issuer.issue(&Principal::customer(7, "pizzaco")).unwrap();
        assert!(verifier.verify(&live.token).is_ok());

        let stale = issuer
            .issue_at(&Principal::customer(7, "pizzaco"), Utc::now() - Duration::hours(73))
            .unwrap();
        assert_eq!(verifier.verify(&stale.token).unwrap_err().kind(), "invalid_or_expired");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = TokenIssuer::new(&JwtConfig::new("other-secret").unwrap(), TokenLifetimes::default());
        let verifier = JwtVerifier::new(&config());
        let issued = issuer.issue(&Principal::super_admin(1)).unwrap();
        let err = verifier.verify(&issued.token).unwrap_err();
        assert_eq!(err.kind(), "invalid_or_expired");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let cfg = config();
        let issuer = TokenIssuer::new(&cfg, TokenLifetimes::default());
        let verifier = JwtVerifier::new(&cfg);
        let mut token = issuer.issue(&Principal::customer(7, "pizzaco")).unwrap().token;
        token.push('x');
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let cfg = config();
        let verifier = JwtVerifier::new(&cfg);
        let now = Utc::now().timestamp();
        let token = encode(
            &Header::new(Algorithm::HS512),
            &json!({"sub": 1, "rol": "SUPER_ADMIN", "iat": now, "exp": now + 60}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(verifier.verify(&token).unwrap_err().kind(), "invalid_or_expired");
    }

    #[test]
    fn signed_token_with_missing_tenant_is_invalid_claims() {
        let cfg = config();
        let verifier = JwtVerifier::new(&cfg);
        let now = Utc::now().timestamp();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": 3, "rol": Role::TenantAdmin, "iat": now, "exp": now + 60}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(verifier.verify(&token).unwrap_err().kind(), "invalid_claims");
    }

    #[test]
    fn signed_token_with_unknown_role_is_invalid_claims() {
        let cfg = config();
        let verifier = JwtVerifier::new(&cfg);
        let now = Utc::now().timestamp();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": 3, "rol": "OWNER", "tid": "pizzaco", "iat": now, "exp": now + 60}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(verifier.verify(&token).unwrap_err().kind(), "invalid_claims");
    }
}
