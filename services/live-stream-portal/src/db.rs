use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{error::SqlState, NoTls, Row};

const SCHEMA: &str = include_str!("../resources/schema.sql");

const USER_COLUMNS: &str =
    "id, username, first_name, last_name, email, password_hash, is_active, date_joined, last_login";

pub const MAX_STREAM_KEY_LEN: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            username: row.get("username"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            is_active: row.get("is_active"),
            date_joined: row.get("date_joined"),
            last_login: row.get("last_login"),
        }
    }

    /// Name shown in page headers.
    pub fn display_name(&self) -> &str {
        if self.first_name.is_empty() {
            &self.username
        } else {
            &self.first_name
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
}

/// The one-to-one extension of a [`User`] holding the stream key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub user_id: i64,
    pub stream_key: String,
}

impl Profile {
    fn from_row(row: &Row) -> Self {
        Self {
            user_id: row.get("user_id"),
            stream_key: row.get("stream_key"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("The database returned an error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("Unable to get a database connection: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("A user with that username already exists.")]
    UsernameTaken,
    #[error("No user with id {0}.")]
    UnknownUser(i64),
    #[error("Stream key is longer than {MAX_STREAM_KEY_LEN} characters.")]
    StreamKeyTooLong,
}
pub type DbResult<T> = Result<T, DbError>;

/// Storage for accounts and their profiles.
#[async_trait::async_trait]
pub trait Database: Send + Sync + 'static {
    /// Insert a new user. Fails with [`DbError::UsernameTaken`] if the
    /// username is in use.
    async fn create_user(&self, user: NewUser) -> DbResult<User>;

    async fn get_user(&self, id: i64) -> DbResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> DbResult<Option<User>>;

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> DbResult<()>;

    async fn get_profile(&self, user_id: i64) -> DbResult<Option<Profile>>;

    /// Create the profile if missing, then overwrite its stream key.
    async fn set_stream_key(&self, user_id: i64, stream_key: &str) -> DbResult<Profile>;
}

fn check_stream_key(stream_key: &str) -> DbResult<()> {
    if stream_key.chars().count() > MAX_STREAM_KEY_LEN {
        return Err(DbError::StreamKeyTooLong);
    }
    Ok(())
}

pub struct PostgresDatabase {
    pool: Pool,
}

impl PostgresDatabase {
    /// Build the connection pool and make sure the schema exists.
    pub async fn connect(config: tokio_postgres::Config, pool_size: usize) -> anyhow::Result<Self> {
        let manager = Manager::from_config(
            config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager).max_size(pool_size).build()?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> DbResult<()> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        tracing::debug!("Database schema is up to date.");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Database for PostgresDatabase {
    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO users (username, first_name, last_name, email, password_hash) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
                ),
                &[
                    &user.username,
                    &user.first_name,
                    &user.last_name,
                    &user.email,
                    &user.password_hash,
                ],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    DbError::UsernameTaken
                } else {
                    DbError::Postgres(e)
                }
            })?;
        Ok(User::from_row(&row))
    }

    async fn get_user(&self, id: i64) -> DbResult<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(User::from_row))
    }

    async fn find_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"),
                &[&username],
            )
            .await?;
        Ok(row.as_ref().map(User::from_row))
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> DbResult<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute("UPDATE users SET last_login = $2 WHERE id = $1", &[&id, &at])
            .await?;
        if updated == 0 {
            return Err(DbError::UnknownUser(id));
        }
        Ok(())
    }

    async fn get_profile(&self, user_id: i64) -> DbResult<Option<Profile>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT user_id, stream_key FROM profiles WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.as_ref().map(Profile::from_row))
    }

    async fn set_stream_key(&self, user_id: i64, stream_key: &str) -> DbResult<Profile> {
        check_stream_key(stream_key)?;
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO profiles (user_id, stream_key) VALUES ($1, $2) ON CONFLICT (user_id) \
                 DO UPDATE SET stream_key = EXCLUDED.stream_key RETURNING user_id, stream_key",
                &[&user_id, &stream_key],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
                    DbError::UnknownUser(user_id)
                } else {
                    DbError::Postgres(e)
                }
            })?;
        Ok(Profile::from_row(&row))
    }
}

#[derive(Default)]
struct MemoryTables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    profiles: BTreeMap<i64, Profile>,
}

/// Non-persistent store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: tokio::sync::Mutex<MemoryTables>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user as active or inactive.
    pub async fn set_active(&self, id: i64, active: bool) -> DbResult<()> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.get_mut(&id).ok_or(DbError::UnknownUser(id))?;
        user.is_active = active;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Database for MemoryDatabase {
    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(DbError::UsernameTaken);
        }
        tables.next_id += 1;
        let user = User {
            id: tables.next_id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            is_active: true,
            date_joined: Utc::now(),
            last_login: None,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> DbResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> DbResult<()> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.get_mut(&id).ok_or(DbError::UnknownUser(id))?;
        user.last_login = Some(at);
        Ok(())
    }

    async fn get_profile(&self, user_id: i64) -> DbResult<Option<Profile>> {
        Ok(self.tables.lock().await.profiles.get(&user_id).cloned())
    }

    async fn set_stream_key(&self, user_id: i64, stream_key: &str) -> DbResult<Profile> {
        check_stream_key(stream_key)?;
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Err(DbError::UnknownUser(user_id));
        }
        let profile = tables.profiles.entry(user_id).or_insert_with(|| Profile {
            user_id,
            stream_key: String::new(),
        });
        profile.stream_key = stream_key.to_string();
        Ok(profile.clone())
    }
}
