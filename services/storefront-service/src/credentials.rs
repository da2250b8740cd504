use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use common_auth::{AuthError, IssuedToken, Principal, Role, TokenIssuer};
use common_http_errors::ApiError;
use once_cell::sync::Lazy;
use rand_core::OsRng;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::order_repo::is_unique_violation;

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Verified against when no account matches, so both login failures cost one hash check.
static DUMMY_PASSWORD_HASH: Lazy<String> =
    Lazy::new(|| hash_password("storefront-unknown-account").unwrap_or_default());

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub role: Role,
    pub tenant: Option<String>,
    pub password_hash: String,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_tenant_account(&self, tenant: &str, email: &str) -> Result<Option<Account>>;
    async fn find_super_admin(&self, email: &str) -> Result<Option<Account>>;
    /// Stores a new CUSTOMER for `tenant`; the caller has checked that the tenant exists.
    async fn create_customer(&self, registration: &Registration) -> Result<i64, RegisterError>;
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub tenant: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("an account with this email already exists")]
    UserExists,
    #[error("tenant '{0}' not found")]
    UnknownTenant(String),
    #[error("invalid registration field: {0}")]
    Invalid(&'static str),
    #[error("credential store failure: {0}")]
    Store(anyhow::Error),
}

impl RegisterError {
    pub fn into_api_error(self, trace_id: Option<Uuid>) -> ApiError {
        match self {
            RegisterError::UserExists => ApiError::conflict(
                "user_exists",
                "an account with this email already exists for this tenant",
                trace_id,
            ),
            RegisterError::UnknownTenant(_) => ApiError::not_found("tenant_not_found", trace_id),
            RegisterError::Invalid(code) => ApiError::bad_request(code, trace_id),
            RegisterError::Store(err) => ApiError::internal(err, trace_id),
        }
    }
}

impl Registration {
    pub fn new(tenant: &str, email: &str, full_name: &str, password: &str) -> Result<Self, RegisterError> {
        let email = normalize_email(email);
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(RegisterError::Invalid("invalid_email")),
        }
        if password.trim().is_empty() {
            return Err(RegisterError::Invalid("invalid_password"));
        }
        Ok(Self {
            tenant: tenant.to_string(),
            email,
            full_name: full_name.trim().to_string(),
            password: password.to_string(),
        })
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub fn hash_password(password: &str) -> Result<String> {
    if password.trim().is_empty() {
        return Err(anyhow!("Password must not be empty"));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("Failed to hash password: {err}"))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(err) => {
            warn!(error = %err, "stored password hash is not a valid PHC string");
            false
        }
    }
}

// ---------------- Postgres Implementation ----------------

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    tenant_id: String,
    role: String,
    password_hash: String,
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_tenant_account(
        &self,
        tenant: &str,
        email: &str,
        full_name: &str,
        password: &str,
        role: Role,
    ) -> Result<i64, RegisterError> {
        if !role.is_tenant_scoped() {
            return Err(RegisterError::Store(anyhow!("{role} accounts are not tenant accounts")));
        }
        let hash = hash_password(password).map_err(RegisterError::Store)?;
        sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO users (tenant_id, full_name, email, password_hash, role)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(tenant)
        .bind(full_name)
        .bind(normalize_email(email))
        .bind(hash)
        .bind(role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                RegisterError::UserExists
            } else if matches!(
                &err,
                sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION)
            ) {
                RegisterError::UnknownTenant(tenant.to_string())
            } else {
                RegisterError::Store(
                    anyhow::Error::new(err).context(format!("Failed to create {role} account for tenant {tenant}")),
                )
            }
        })
    }

    pub async fn create_super_admin(&self, email: &str, password: &str) -> Result<i64> {
        let hash = hash_password(password)?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO super_admins (email, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(normalize_email(email))
        .bind(hash)
        .fetch_one(&self.db)
        .await
        .context("Failed to create super admin account")?;
        Ok(id)
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_tenant_account(&self, tenant: &str, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, tenant_id, role, password_hash FROM users WHERE tenant_id = $1 AND email = $2",
        )
        .bind(tenant)
        .bind(normalize_email(email))
        .fetch_optional(&self.db)
        .await?;
        row.map(|row| {
            let role = row.role.parse::<Role>().map_err(anyhow::Error::from)?;
            Ok(Account {
                id: row.id,
                role,
                tenant: Some(row.tenant_id),
                password_hash: row.password_hash,
            })
        })
        .transpose()
    }

    async fn find_super_admin(&self, email: &str) -> Result<Option<Account>> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, password_hash FROM super_admins WHERE email = $1")
                .bind(normalize_email(email))
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(|(id, password_hash)| Account {
            id,
            role: Role::SuperAdmin,
            tenant: None,
            password_hash,
        }))
    }

    async fn create_customer(&self, registration: &Registration) -> Result<i64, RegisterError> {
        self.create_tenant_account(
            &registration.tenant,
            &registration.email,
            &registration.full_name,
            &registration.password,
            Role::Customer,
        )
        .await
    }
}

// ---------------- In-Memory Implementation (Tests) ----------------

#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    tenant_accounts: Arc<Mutex<HashMap<(String, String), Account>>>,
    super_admins: Arc<Mutex<HashMap<String, Account>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_tenant_account(&self, id: i64, tenant: &str, email: &str, password: &str, role: Role) -> Result<()> {
        let account = Account {
            id,
            role,
            tenant: Some(tenant.to_string()),
            password_hash: hash_password(password)?,
        };
        self.tenant_accounts
            .lock()
            .await
            .insert((tenant.to_string(), normalize_email(email)), account);
        Ok(())
    }

    pub async fn add_super_admin(&self, id: i64, email: &str, password: &str) -> Result<()> {
        let account = Account {
            id,
            role: Role::SuperAdmin,
            tenant: None,
            password_hash: hash_password(password)?,
        };
        self.super_admins.lock().await.insert(normalize_email(email), account);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_tenant_account(&self, tenant: &str, email: &str) -> Result<Option<Account>> {
        let guard = self.tenant_accounts.lock().await;
        Ok(guard.get(&(tenant.to_string(), normalize_email(email))).cloned())
    }

    async fn find_super_admin(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.super_admins.lock().await.get(&normalize_email(email)).cloned())
    }

    async fn create_customer(&self, registration: &Registration) -> Result<i64, RegisterError> {
        let password_hash = hash_password(&registration.password).map_err(RegisterError::Store)?;
        let mut guard = self.tenant_accounts.lock().await;
        let key = (registration.tenant.clone(), normalize_email(&registration.email));
        if guard.contains_key(&key) {
            return Err(RegisterError::UserExists);
        }
        let id = guard.values().map(|account| account.id).max().unwrap_or(0) + 1;
        guard.insert(
            key,
            Account {
                id,
                role: Role::Customer,
                tenant: Some(registration.tenant.clone()),
                password_hash,
            },
        );
        Ok(id)
    }
}

// ---------------- Login ----------------

#[derive(Debug, Error)]
pub enum LoginError {
    /// Unknown account and wrong password are reported identically.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Token(#[from] AuthError),
    #[error("credential store failure: {0}")]
    Store(anyhow::Error),
}

impl LoginError {
    pub fn into_api_error(self, trace_id: Option<Uuid>) -> ApiError {
        match self {
            LoginError::InvalidCredentials => ApiError::Unauthorized { reason: "invalid_credentials", trace_id },
            LoginError::Token(err) => ApiError::internal(err, trace_id),
            LoginError::Store(err) => ApiError::internal(err, trace_id),
        }
    }
}

/// Verifies passwords and hands verified accounts to the token issuer.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    issuer: Arc<TokenIssuer>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CredentialStore>, issuer: Arc<TokenIssuer>) -> Self {
        Self { store, issuer }
    }

    fn issue_for(&self, account: Account, password: &str) -> Result<IssuedToken, LoginError> {
        if !verify_password(password, &account.password_hash) {
            return Err(LoginError::InvalidCredentials);
        }
        let principal = Principal::new(account.id, account.role, account.tenant)?;
        let token = self.issuer.issue(&principal)?;
        info!(
            subject_id = principal.subject_id(),
            role = %principal.role(),
            tenant = principal.tenant().unwrap_or("-"),
            "login succeeded"
        );
        Ok(token)
    }

    fn reject_unknown(password: &str) -> LoginError {
        let _ = verify_password(password, &DUMMY_PASSWORD_HASH);
        LoginError::InvalidCredentials
    }

    pub async fn login_tenant(&self, tenant: &str, email: &str, password: &str) -> Result<IssuedToken, LoginError> {
        let account = self
            .store
            .find_tenant_account(tenant, email)
            .await
            .map_err(LoginError::Store)?
            .ok_or_else(|| Self::reject_unknown(password))?;
        self.issue_for(account, password)
    }

    pub async fn login_super_admin(&self, email: &str, password: &str) -> Result<IssuedToken, LoginError> {
        let account = self
            .store
            .find_super_admin(email)
            .await
            .map_err(LoginError::Store)?
            .ok_or_else(|| Self::reject_unknown(password))?;
        self.issue_for(account, password)
    }

    pub async fn register_customer(&self, registration: &Registration) -> Result<i64, RegisterError> {
        let id = self.store.create_customer(registration).await?;
        info!(subject_id = id, tenant = %registration.tenant, "customer registered");
        Ok(id)
    }
}
