//! User service
//!
//! Accounts, login and session tokens. Sessions last seven days; an expired
//! session is deleted the first time it is presented.

use crate::config::AdminBootstrap;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, User, UserRole, UserStatus};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Unknown account, wrong password or inactive account
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Credentials submitted to the login endpoint
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginInput {
    #[serde(alias = "username", alias = "email")]
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    /// Create an account after validating and hashing the password
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let username = input.username.trim();
        let email = input.email.trim();
        if username.is_empty() {
            return Err(UserServiceError::ValidationError("Username cannot be empty".to_string()));
        }
        if !email.contains('@') {
            return Err(UserServiceError::ValidationError("Email address is invalid".to_string()));
        }
        if input.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        if self.user_repo.get_by_username(username).await?.is_some() {
            return Err(UserServiceError::UserExists(username.to_string()));
        }
        if self.user_repo.get_by_email(email).await?.is_some() {
            return Err(UserServiceError::UserExists(email.to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: 0,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(&input.password)?,
            role: input.role,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let created = self.user_repo.create(&user).await.context("Failed to create user")?;
        info!(user_id = created.id, role = %created.role, "User created");
        Ok(created)
    }

    /// Create the configured admin account when no users exist yet
    pub async fn bootstrap_admin(&self, admin: &AdminBootstrap) -> Result<Option<User>, UserServiceError> {
        if self.user_repo.count().await? > 0 {
            return Ok(None);
        }
        let user = self
            .create_user(CreateUserInput {
                username: admin.username.clone(),
                email: admin.email.clone(),
                password: admin.password.clone(),
                role: UserRole::Admin,
            })
            .await?;
        Ok(Some(user))
    }

    /// Verify credentials and open a new session
    pub async fn login(&self, input: LoginInput) -> Result<(Session, User), UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let identifier = input.username_or_email.trim();
        let found = if identifier.contains('@') {
            self.user_repo.get_by_email(identifier).await?
        } else {
            self.user_repo.get_by_username(identifier).await?
        };
        let user = found.ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash).context("Failed to verify password")? {
            warn!(user_id = user.id, "Login rejected: wrong password");
            return Err(invalid());
        }
        if !user.is_active() {
            return Err(UserServiceError::AuthenticationError("Account is inactive".to_string()));
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };
        let session = self.session_repo.create(&session).await.context("Failed to create session")?;

        info!(user_id = user.id, "User logged in");
        Ok((session, user))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo.delete(token).await.context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a session token, or `None` for unknown or expired
    /// tokens and inactive accounts
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.session_repo.get_by_id(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self.user_repo.get_by_id(session.user_id).await?;
        Ok(user.filter(User::is_active))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    /// Delete every expired session, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self.session_repo.delete_expired().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, sqlite, DynDatabasePool};

    async fn setup() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    fn input(username: &str, role: UserRole) -> CreateUserInput {
        CreateUserInput {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "long-enough-password".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_create_user_validates() {
        let (_pool, service) = setup().await;

        let mut short = input("alice", UserRole::Author);
        short.password = "short".to_string();
        assert!(matches!(
            service.create_user(short).await,
            Err(UserServiceError::ValidationError(_))
        ));

        service.create_user(input("alice", UserRole::Author)).await.unwrap();
        assert!(matches!(
            service.create_user(input("alice", UserRole::Author)).await,
            Err(UserServiceError::UserExists(_))
        ));
    }

    #[tokio::test]
    async fn test_login_by_username_or_email_and_validate() {
        let (_pool, service) = setup().await;
        let user = service.create_user(input("bob", UserRole::Editor)).await.unwrap();

        let (session, logged_in) = service
            .login(LoginInput::new("bob", "long-enough-password"))
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let (_, by_email) = service
            .login(LoginInput::new("BOB@example.com", "long-enough-password"))
            .await
            .unwrap();
        assert_eq!(by_email.id, user.id);

        let validated = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(validated.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password_and_unknown_user() {
        let (_pool, service) = setup().await;
        service.create_user(input("carol", UserRole::Author)).await.unwrap();

        assert!(matches!(
            service.login(LoginInput::new("carol", "nope-nope-nope")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.login(LoginInput::new("dave", "long-enough-password")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let (pool, service) = setup().await;
        let user = service.create_user(input("erin", UserRole::Author)).await.unwrap();
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES ('old', ?, ?, ?)")
            .bind(user.id)
            .bind(Utc::now() - Duration::hours(1))
            .bind(Utc::now() - Duration::days(8))
            .execute(sqlite(&pool).unwrap())
            .await
            .unwrap();

        assert!(service.validate_session("old").await.unwrap().is_none());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_when_empty() {
        let (_pool, service) = setup().await;
        let admin = AdminBootstrap {
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password: "bootstrap-password".to_string(),
        };

        let created = service.bootstrap_admin(&admin).await.unwrap().unwrap();
        assert_eq!(created.role, UserRole::Admin);
        assert!(service.bootstrap_admin(&admin).await.unwrap().is_none());
    }
}
