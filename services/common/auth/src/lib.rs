pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod issuer;
pub mod roles;
pub mod verifier;

pub use claims::{Principal, TokenClaims, VerifiedClaims};
pub use config::{JwtConfig, MAX_LEEWAY_SECONDS};
pub use error::{AuthError, AuthResult};
pub use extractors::{authenticate_header, parse_bearer, AuthContext};
pub use issuer::{IssuedToken, TokenIssuer, TokenLifetimes};
pub use roles::Role;
pub use verifier::JwtVerifier;
