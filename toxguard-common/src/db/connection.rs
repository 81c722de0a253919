//! Database connection handle and connection state
//!
//! The service keeps running when the database is unreachable. The handle
//! tracks its own connection state so `/health` can report it, and store
//! operations fail with [`Error::NotConnected`] until a connection exists.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::init::init_schema;
use crate::{Error, Result};

/// Longest pause between background reconnect attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Connection state as reported by `/health`
///
/// Numeric codes follow the ready-state convention existing clients expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbState {
    Disconnected = 0,
    Connected = 1,
    Connecting = 2,
    Disconnecting = 3,
}

impl DbState {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DbState::Disconnected => "disconnected",
            DbState::Connected => "connected",
            DbState::Connecting => "connecting",
            DbState::Disconnecting => "disconnecting",
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => DbState::Connected,
            2 => DbState::Connecting,
            3 => DbState::Disconnecting,
            _ => DbState::Disconnected,
        }
    }
}

struct DatabaseInner {
    url: String,
    state: AtomicU8,
    pool: RwLock<Option<SqlitePool>>,
    /// Set once shutdown begins; no reconnects afterwards
    closed: AtomicBool,
}

/// Shared database handle (cheap to clone)
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Create a disconnected handle for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                url: url.into(),
                state: AtomicU8::new(DbState::Disconnected.code()),
                pool: RwLock::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Current connection state
    pub fn state(&self) -> DbState {
        DbState::from_code(self.inner.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: DbState) {
        self.inner.state.store(state.code(), Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The pool slot guards `closed` and `state` transitions too, so a connect
    /// racing `close` either lands before it or is discarded
    fn lock_slot(&self) -> RwLockWriteGuard<'_, Option<SqlitePool>> {
        self.inner.pool.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set `state` unless shutdown has started
    fn set_state_if_open(&self, state: DbState) -> bool {
        let _slot = self.lock_slot();
        if self.is_closed() {
            return false;
        }
        self.set_state(state);
        true
    }

    /// Open the pool and create the schema
    pub async fn connect(&self) -> Result<()> {
        if self.state() == DbState::Connected && self.pool().is_ok() {
            return Ok(());
        }
        if !self.set_state_if_open(DbState::Connecting) {
            return Err(Error::NotConnected);
        }

        let pool = match open_pool(&self.inner.url).await {
            Ok(pool) => pool,
            Err(e) => {
                self.set_state_if_open(DbState::Disconnected);
                return Err(e);
            }
        };

        let discarded = {
            let mut slot = self.lock_slot();
            if self.is_closed() {
                Some(pool)
            } else {
                *slot = Some(pool);
                self.set_state(DbState::Connected);
                None
            }
        };

        match discarded {
            Some(pool) => {
                // Shutdown started while we were connecting
                pool.close().await;
                Err(Error::NotConnected)
            }
            None => {
                info!("Database connected: {}", self.inner.url);
                Ok(())
            }
        }
    }

    /// Connect, retrying with exponential backoff
    ///
    /// The state stays `Connecting` between attempts.
    pub async fn connect_with_retry(&self, attempts: u32, base_delay: Duration) -> Result<()> {
        let mut delay = base_delay;
        let mut attempt = 1;
        loop {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts || self.is_closed() => return Err(e),
                Err(e) => {
                    warn!(
                        "Database connection attempt {}/{} failed: {} (retrying in {:?})",
                        attempt, attempts, e, delay
                    );
                    self.set_state_if_open(DbState::Connecting);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                    attempt += 1;
                }
            }
        }
    }

    /// Connect in the background
    ///
    /// Makes `attempts` quick attempts, then keeps retrying with backoff
    /// (reporting `Disconnected`) until connected or closed. Abort the
    /// returned handle to stop it early.
    pub fn spawn_connect(&self, attempts: u32, base_delay: Duration) -> JoinHandle<()> {
        let db = self.clone();
        tokio::spawn(async move {
            match db.connect_with_retry(attempts, base_delay).await {
                Ok(()) => return,
                Err(e) if db.is_closed() => {
                    debug!("Database connect abandoned at shutdown: {}", e);
                    return;
                }
                Err(e) => error!("Database connection error: {} (serving in degraded mode)", e),
            }

            let mut delay = base_delay;
            while !db.is_closed() && db.state() != DbState::Connected {
                tokio::time::sleep(delay).await;
                match db.connect().await {
                    Ok(()) => break,
                    Err(e) => {
                        if !db.is_closed() {
                            error!("Database reconnect failed: {}", e);
                        }
                        delay = (delay * 2).min(MAX_RETRY_DELAY);
                    }
                }
            }
        })
    }

    /// Pool for running queries
    pub fn pool(&self) -> Result<SqlitePool> {
        self.inner
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NotConnected)
    }

    /// Close the pool, waiting for checked-out connections to be returned
    ///
    /// After this no connect succeeds.
    pub async fn close(&self) {
        let pool = {
            let mut slot = self.lock_slot();
            self.inner.closed.store(true, Ordering::SeqCst);
            self.set_state(DbState::Disconnecting);
            slot.take()
        };
        if let Some(pool) = pool {
            pool.close().await;
        }

        self.set_state(DbState::Disconnected);
        info!("Database connection closed");
    }
}

async fn open_pool(url: &str) -> Result<SqlitePool> {
    let in_memory = url.contains(":memory:");

    let mut options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    // An in-memory database lives only as long as its single connection
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}
