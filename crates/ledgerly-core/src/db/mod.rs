//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `rates` - Per-diem rate table and location lookup
//! - `trips` - Travel trips and their per-day allowances
//! - `rules` - Transaction rule CRUD
//! - `transactions` - Imported bank/card transactions and their lifecycle
//! - `expenses` - Expenses and spending totals
//! - `policies` - Expense policy CRUD
//! - `receipts` - Receipts with extracted line items
//! - `audit` - Audit log and store statistics

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod audit;
mod expenses;
mod policies;
mod rates;
mod receipts;
mod rules;
mod transactions;
mod trips;

pub use expenses::ExpenseTotals;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "LEDGERLY_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"ledgerly-salt-v1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a stored `YYYY-MM-DD` date column
pub(crate) fn parse_date_column(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Decode a JSON text column
pub(crate) fn parse_json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    s: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Decode an enum stored by its `as_str()` name
pub(crate) fn parse_enum_column<T: std::str::FromStr<Err = String>>(
    idx: usize,
    s: &str,
) -> rusqlite::Result<T> {
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(Error::InvalidData(e)),
        )
    })
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `LEDGERLY_DB_KEY` to be set. The database is encrypted with
    /// SQLCipher using a key derived from the passphrase via Argon2.
    /// Use `new_unencrypted()` for development and tests.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Every pooled connection needs the key before first use
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            let manager =
                manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because each pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "ledgerly_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block writers
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Per-diem rates; location '*' is the country default
            CREATE TABLE IF NOT EXISTS per_diem_rates (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                location TEXT NOT NULL,
                country_code TEXT NOT NULL,
                lodging_rate REAL NOT NULL CHECK (lodging_rate >= 0),
                mie_rate REAL NOT NULL CHECK (mie_rate >= 0),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (organization_id, location, country_code)
            );

            -- Travel trips; rates are snapshotted at creation
            CREATE TABLE IF NOT EXISTS travel_trips (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                location TEXT NOT NULL,
                country_code TEXT NOT NULL,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                status TEXT NOT NULL DEFAULT 'planned',
                mie_rate REAL NOT NULL,
                lodging_rate REAL NOT NULL,
                total_per_diem REAL NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_travel_trips_org ON travel_trips(organization_id, status);

            CREATE TABLE IF NOT EXISTS travel_trip_days (
                id INTEGER PRIMARY KEY,
                trip_id INTEGER NOT NULL REFERENCES travel_trips(id) ON DELETE CASCADE,
                date DATE NOT NULL,
                is_travel_day BOOLEAN NOT NULL DEFAULT 0,
                breakfast_provided BOOLEAN NOT NULL DEFAULT 0,
                lunch_provided BOOLEAN NOT NULL DEFAULT 0,
                dinner_provided BOOLEAN NOT NULL DEFAULT 0,
                adjusted_mie REAL NOT NULL DEFAULT 0,
                UNIQUE (trip_id, date)
            );

            -- Transaction rules; criteria and action are JSON
            CREATE TABLE IF NOT EXISTS transaction_rules (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 100,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                criteria TEXT NOT NULL DEFAULT '{}',
                action TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transaction_rules_org ON transaction_rules(organization_id, priority);

            -- Expenses
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                date DATE NOT NULL,
                merchant TEXT NOT NULL,
                amount REAL NOT NULL,
                category TEXT,
                description TEXT,
                receipt_id INTEGER,
                transaction_id INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_user_date ON expenses(organization_id, user_id, date);

            -- Imported bank/card transactions
            CREATE TABLE IF NOT EXISTS imported_transactions (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                external_id TEXT,
                date DATE NOT NULL,
                description TEXT NOT NULL,
                merchant_name TEXT,
                amount REAL NOT NULL,
                provider_categories TEXT NOT NULL DEFAULT '[]',   -- JSON array
                category TEXT,
                status TEXT NOT NULL DEFAULT 'new',
                matched_rule_id INTEGER REFERENCES transaction_rules(id) ON DELETE SET NULL,
                expense_id INTEGER REFERENCES expenses(id) ON DELETE SET NULL,
                duplicate_of INTEGER REFERENCES imported_transactions(id),
                import_hash TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_imported_transactions_status ON imported_transactions(organization_id, status);
            CREATE INDEX IF NOT EXISTS idx_imported_transactions_hash ON imported_transactions(organization_id, import_hash);

            -- Expense policies; NULL fields defer to lower-ranked policies
            CREATE TABLE IF NOT EXISTS expense_policies (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                scope TEXT NOT NULL DEFAULT 'organization',
                scope_value TEXT,
                max_amount REAL,
                max_daily_total REAL,
                max_monthly_total REAL,
                max_receipt_age_days INTEGER,
                receipt_required BOOLEAN,
                description_required BOOLEAN,
                weekends_allowed BOOLEAN,
                priority INTEGER NOT NULL DEFAULT 100,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_expense_policies_org ON expense_policies(organization_id);

            -- Receipts with OCR output
            CREATE TABLE IF NOT EXISTS receipts (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                expense_id INTEGER REFERENCES expenses(id) ON DELETE SET NULL,
                ocr_text TEXT,
                extracted_line_items TEXT NOT NULL DEFAULT '[]',  -- JSON array
                suggest_split BOOLEAN NOT NULL DEFAULT 0,
                detected_total REAL,
                content_hash TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_org ON receipts(organization_id);
            CREATE INDEX IF NOT EXISTS idx_receipts_hash ON receipts(content_hash);

            -- Audit log
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                user_email TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            "#,
        )?;

        info!("Database migrations complete");
        Ok(())
    }
}
