//! PostgreSQL user store
//!
//! Connection pooling follows conservative defaults: bounded pool size,
//! connection lifetimes, `test_before_acquire` and TLS required unless
//! configured otherwise.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};

use super::{StoreError, UniqueField, UserStore};
use crate::config::ConfigError;
use crate::model::{NewUser, Preference, User};
use crate::observability::SecurityEvent;
use crate::parse::{parse_count, parse_duration};
use crate::role::Role;

// ============================================================================
// Pool configuration
// ============================================================================

/// SSL/TLS mode for database connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Never use TLS (local development only)
    Disable,
    /// Use TLS if the server offers it
    Prefer,
    /// Require TLS
    #[default]
    Require,
    /// Require TLS and verify the server certificate
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-full" => Ok(Self::VerifyFull),
            other => Err(format!("unknown ssl mode '{other}'")),
        }
    }
}

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL
    pub database_url: String,
    /// Maximum pool size
    pub max_connections: u32,
    /// Idle connections kept open
    pub min_connections: u32,
    /// Wait for a free connection
    pub acquire_timeout: Duration,
    /// Connection recycle age
    pub max_lifetime: Duration,
    /// Idle connection close time
    pub idle_timeout: Duration,
    /// TLS requirement
    pub ssl_mode: SslMode,
}

impl DatabaseConfig {
    /// Defaults for the given URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
            ssl_mode: SslMode::default(),
        }
    }

    /// Load from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL` (required)
    /// - `DB_MAX_CONNECTIONS` (default: 10), `DB_MIN_CONNECTIONS` (default: 1)
    /// - `DB_ACQUIRE_TIMEOUT` (default: "30s")
    /// - `DB_SSL_MODE`: disable|prefer|require|verify-full (default: require)
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::OutOfRange {
            field: "DATABASE_URL",
            message: "must be set when the postgres store is used".to_string(),
        })?;
        let mut config = Self::new(url);

        if let Ok(raw) = std::env::var("DB_MAX_CONNECTIONS") {
            config.max_connections = parse_count(&raw)
                .map_err(|source| ConfigError::InvalidValue { var: "DB_MAX_CONNECTIONS", source })?
                as u32;
        }
        if let Ok(raw) = std::env::var("DB_MIN_CONNECTIONS") {
            config.min_connections = parse_count(&raw)
                .map_err(|source| ConfigError::InvalidValue { var: "DB_MIN_CONNECTIONS", source })?
                as u32;
        }
        if let Ok(raw) = std::env::var("DB_ACQUIRE_TIMEOUT") {
            config.acquire_timeout = parse_duration(&raw)
                .map_err(|source| ConfigError::InvalidValue { var: "DB_ACQUIRE_TIMEOUT", source })?;
        }
        if let Ok(raw) = std::env::var("DB_SSL_MODE") {
            config.ssl_mode = raw.parse().map_err(|message| ConfigError::OutOfRange {
                field: "DB_SSL_MODE",
                message,
            })?;
        }

        Ok(config)
    }
}

/// Open a pool and run a health check.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    info!(
        max_connections = config.max_connections,
        ssl_mode = ?config.ssl_mode,
        "Initializing database connection pool"
    );

    let connect_options = PgConnectOptions::from_str(&config.database_url)
        .map_err(|e| StoreError::Backend(format!("Invalid DATABASE_URL: {}", e)))?
        .ssl_mode(config.ssl_mode.into());

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await?;

    health_check(&pool).await?;

    crate::security_event!(
        SecurityEvent::DatabaseConnected,
        pool_size = pool.size(),
        "Database connection pool initialized"
    );

    Ok(pool)
}

/// Round-trip a trivial query and report whether the session uses TLS.
pub async fn health_check(pool: &PgPool) -> Result<bool, StoreError> {
    let start = std::time::Instant::now();

    let (one,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    if one != 1 {
        return Err(StoreError::Backend("Unexpected health check result".into()));
    }

    let (ssl,): (bool,) = sqlx::query_as(
        "SELECT COALESCE((SELECT ssl FROM pg_stat_ssl WHERE pid = pg_backend_pid()), false)",
    )
    .fetch_one(pool)
    .await
    .unwrap_or((false,));

    let latency = start.elapsed();
    if ssl {
        info!(latency_ms = ?latency.as_millis(), "Database health check passed (SSL enabled)");
    } else {
        warn!(latency_ms = ?latency.as_millis(), "Database health check passed (SSL NOT enabled)");
    }

    Ok(ssl)
}

// ============================================================================
// Store
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    user_id TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    username TEXT NOT NULL CONSTRAINT users_username_key UNIQUE,
    email TEXT NOT NULL CONSTRAINT users_email_key UNIQUE,
    password_hash TEXT NOT NULL,
    profile_image_url TEXT NOT NULL,
    last_login_date TIMESTAMPTZ,
    last_login_date_display TIMESTAMPTZ,
    join_date TIMESTAMPTZ NOT NULL,
    role TEXT NOT NULL,
    authorities TEXT[] NOT NULL,
    active BOOLEAN NOT NULL,
    not_locked BOOLEAN NOT NULL,
    pref_keyword TEXT,
    pref_language TEXT,
    pref_call_time INTEGER
)
"#;

const COLUMNS: &str = "id, user_id, first_name, last_name, username, email, password_hash, \
    profile_image_url, last_login_date, last_login_date_display, join_date, role, authorities, \
    active, not_locked, pref_keyword, pref_language, pref_call_time";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    user_id: String,
    first_name: String,
    last_name: String,
    username: String,
    email: String,
    password_hash: String,
    profile_image_url: String,
    last_login_date: Option<DateTime<Utc>>,
    last_login_date_display: Option<DateTime<Utc>>,
    join_date: DateTime<Utc>,
    role: String,
    authorities: Vec<String>,
    active: bool,
    not_locked: bool,
    pref_keyword: Option<String>,
    pref_language: Option<String>,
    pref_call_time: Option<i32>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e| StoreError::Backend(format!("user {}: {}", row.id, e)))?;

        let preference = match (row.pref_keyword, row.pref_language, row.pref_call_time) {
            (Some(keyword), Some(language), Some(call_time)) => Some(Preference {
                keyword,
                language,
                call_time,
            }),
            _ => None,
        };

        Ok(User {
            id: row.id,
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            profile_image_url: row.profile_image_url,
            last_login_date: row.last_login_date,
            last_login_date_display: row.last_login_date_display,
            join_date: row.join_date,
            role,
            authorities: row.authorities,
            active: row.active,
            not_locked: row.not_locked,
            preference,
        })
    }
}

fn map_unique(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("users_email_key") => UniqueField::Email,
                _ => UniqueField::Username,
            };
            return StoreError::Duplicate { field };
        }
    }
    StoreError::Database(err)
}

/// [`UserStore`] backed by a `users` table.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `users` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE {column} = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email", email).await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM users ORDER BY id");
        sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (user_id, first_name, last_name, username, email, password_hash, \
             profile_image_url, join_date, role, authorities, active, not_locked) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.user_id)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.profile_image_url)
            .bind(user.join_date)
            .bind(user.role.as_str())
            .bind(user.role.authority_list())
            .bind(user.active)
            .bind(user.not_locked)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique)?;
        User::try_from(row)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let preference = user.preference.as_ref();
        let result = sqlx::query(
            "UPDATE users SET user_id = $2, first_name = $3, last_name = $4, username = $5, \
             email = $6, password_hash = $7, profile_image_url = $8, last_login_date = $9, \
             last_login_date_display = $10, role = $11, authorities = $12, active = $13, \
             not_locked = $14, pref_keyword = $15, pref_language = $16, pref_call_time = $17 \
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.user_id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.profile_image_url)
        .bind(user.last_login_date)
        .bind(user.last_login_date_display)
        .bind(user.role.as_str())
        .bind(&user.authorities)
        .bind(user.active)
        .bind(user.not_locked)
        .bind(preference.map(|p| p.keyword.clone()))
        .bind(preference.map(|p| p.language.clone()))
        .bind(preference.map(|p| p.call_time))
        .execute(&self.pool)
        .await
        .map_err(map_unique)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(user.username.clone()));
        }
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(username.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_parse() {
        assert_eq!("require".parse::<SslMode>().unwrap(), SslMode::Require);
        assert_eq!("VERIFY-FULL".parse::<SslMode>().unwrap(), SslMode::VerifyFull);
        assert!("sometimes".parse::<SslMode>().is_err());
        assert_eq!(SslMode::default(), SslMode::Require);
    }

    #[test]
    fn test_database_config_defaults() {
        let config = DatabaseConfig::new("postgres://localhost/warden");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_row_conversion_rejects_unknown_role() {
        let row = UserRow {
            id: 1,
            user_id: "0123456789".into(),
            first_name: "A".into(),
            last_name: "B".into(),
            username: "alice".into(),
            email: "alice@x.com".into(),
            password_hash: "hash".into(),
            profile_image_url: String::new(),
            last_login_date: None,
            last_login_date_display: None,
            join_date: Utc::now(),
            role: "ROLE_ROOT".into(),
            authorities: vec![],
            active: true,
            not_locked: true,
            pref_keyword: None,
            pref_language: None,
            pref_call_time: None,
        };
        assert!(matches!(User::try_from(row), Err(StoreError::Backend(_))));
    }
}
