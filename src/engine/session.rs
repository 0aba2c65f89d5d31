//! Session management: registration, login, per-request authentication,
//! role checks, profile updates and logout.
//!
//! A request is authenticated only when its token both carries a valid
//! signature and is still recorded in the session store. Either check alone
//! is not enough.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::api::metrics::record_auth_attempt;
use crate::db::{self, Role, RoleAssignment, User};
use crate::DbPool;

use super::error::{EngineError, EngineResult};
use super::token::{token_fingerprint, Claims, TokenKeys};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// The authenticated caller: who they are and which roles they hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub roles: Vec<RoleAssignment>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            name: claims.name,
            email: claims.email,
            roles: claims.roles,
        }
    }
}

/// Outcome of authenticating a request.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// No token, an invalid token, or a token without an active session
    Absent,
    /// The session store could not be consulted
    Faulted,
    Authenticated(Identity),
}

impl AuthState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthState::Authenticated(identity) => Some(identity),
            AuthState::Absent | AuthState::Faulted => None,
        }
    }

    /// The identity, or `Unauthorized` when the request is not authenticated.
    pub fn require(&self) -> EngineResult<&Identity> {
        self.identity().ok_or(EngineError::Unauthorized)
    }
}

/// Whether the identity holds `role`, regardless of scope.
pub fn has_role(identity: &Identity, role: Role) -> bool {
    identity.roles.iter().any(|r| r.role == role)
}

/// Fail with `Forbidden(message)` unless the identity holds `role`.
pub fn authorize(identity: &Identity, role: Role, message: &str) -> EngineResult<()> {
    if has_role(identity, role) {
        Ok(())
    } else {
        Err(EngineError::forbidden(message))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

fn password_hash_failed(e: argon2::password_hash::Error) -> EngineError {
    error!(error = %e, "Failed to hash password");
    EngineError::internal("unable to hash password")
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[derive(Clone)]
pub struct SessionManager {
    db: DbPool,
    keys: TokenKeys,
}

impl SessionManager {
    pub fn new(db: DbPool, keys: TokenKeys) -> Self {
        Self { db, keys }
    }

    /// Create a diner account and open a session for it.
    pub async fn register(
        &self,
        name: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> EngineResult<AuthResponse> {
        let (Some(name), Some(email), Some(password)) =
            (present(name), present(email), password.filter(|p| !p.is_empty()))
        else {
            return Err(EngineError::validation(
                "name, email, and password are required",
            ));
        };

        let password_hash = hash_password(password)
            .map_err(password_hash_failed)?;

        let user = db::add_user(
            &self.db,
            name,
            email,
            &password_hash,
            &[RoleAssignment::diner()],
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                EngineError::Conflict("email already registered".to_string())
            } else {
                EngineError::Database(e)
            }
        })?;

        info!(user_id = user.id, "Registered user");
        self.open_session(user).await
    }

    /// Exchange credentials for a new session. Unknown emails and wrong
    /// passwords are reported identically.
    pub async fn login(&self, email: Option<&str>, password: Option<&str>) -> EngineResult<AuthResponse> {
        let (Some(email), Some(password)) = (present(email), password) else {
            record_auth_attempt(false);
            return Err(EngineError::not_found("unknown user"));
        };

        let credentials = db::find_user_by_email(&self.db, email).await?;
        let user = match credentials {
            Some(c) if verify_password(password, &c.password_hash) => c.user,
            _ => {
                record_auth_attempt(false);
                debug!("Login rejected");
                return Err(EngineError::not_found("unknown user"));
            }
        };

        record_auth_attempt(true);
        self.open_session(user).await
    }

    async fn open_session(&self, user: User) -> EngineResult<AuthResponse> {
        let token = self
            .keys
            .mint(&user)
            .map_err(|e| {
                error!(error = %e, "Failed to sign token");
                EngineError::internal("unable to issue token")
            })?;
        db::session::login(&self.db, user.id, &token).await?;
        debug!(user_id = user.id, token = %token_fingerprint(&token), "Session opened");
        Ok(AuthResponse { user, token })
    }

    /// Resolve a bearer token into an [`AuthState`]. Never fails: problems
    /// are folded into `Absent` or `Faulted`.
    pub async fn authenticate(&self, token: Option<&str>) -> AuthState {
        let Some(token) = present(token) else {
            return AuthState::Absent;
        };

        let claims = match self.keys.verify(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, token = %token_fingerprint(token), "Rejected token");
                return AuthState::Absent;
            }
        };

        match db::session::is_active(&self.db, token).await {
            Ok(true) => AuthState::Authenticated(Identity::from(claims)),
            Ok(false) => {
                debug!(
                    user_id = claims.id,
                    token = %token_fingerprint(token),
                    "Token has no active session"
                );
                AuthState::Absent
            }
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                AuthState::Faulted
            }
        }
    }

    /// Close the session for `token`. Absent or unknown tokens are ignored.
    pub async fn logout(&self, token: Option<&str>) -> EngineResult<()> {
        if let Some(token) = present(token) {
            let removed = db::session::logout(&self.db, token).await?;
            debug!(removed, token = %token_fingerprint(token), "Logout");
        }
        Ok(())
    }

    /// Change a user's email and/or password. Allowed for the user themself
    /// and for admins.
    pub async fn update_user(
        &self,
        identity: &Identity,
        target_id: i64,
        email: Option<&str>,
        password: Option<&str>,
    ) -> EngineResult<User> {
        if identity.id != target_id && !has_role(identity, Role::Admin) {
            return Err(EngineError::forbidden("unauthorized"));
        }

        let password_hash = match password.filter(|p| !p.is_empty()) {
            Some(password) => Some(
                hash_password(password)
                    .map_err(password_hash_failed)?,
            ),
            None => None,
        };

        let updated = db::update_user(&self.db, target_id, present(email), password_hash.as_deref())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EngineError::Conflict("email already registered".to_string())
                } else {
                    EngineError::Database(e)
                }
            })?;
        if !updated {
            return Err(EngineError::not_found("unknown user"));
        }

        info!(user_id = target_id, acting_user = identity.id, "Updated user");
        db::get_user(&self.db, target_id)
            .await?
            .ok_or_else(|| EngineError::not_found("unknown user"))
    }

    /// The stored record of the authenticated user.
    pub async fn me(&self, identity: &Identity) -> EngineResult<User> {
        db::get_user(&self.db, identity.id)
            .await?
            .ok_or_else(|| EngineError::not_found("unknown user"))
    }

    /// Create the configured admin account if no user owns that email yet.
    /// Returns whether an account was created.
    pub async fn ensure_admin_user(&self, name: &str, email: &str, password: &str) -> EngineResult<bool> {
        if db::find_user_by_email(&self.db, email).await?.is_some() {
            return Ok(false);
        }

        let password_hash = hash_password(password)
            .map_err(password_hash_failed)?;
        db::add_user(&self.db, name, email, &password_hash, &[RoleAssignment::admin()]).await?;

        info!("Created admin user: {}", email);
        Ok(true)
    }
}
