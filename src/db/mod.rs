//! Database layer
//!
//! SQLite (default, single file) and MySQL behind the `DatabasePool` trait.
//! The driver is selected from `database.driver` in the configuration.
//!
//! ```ignore
//! use blango::config::DatabaseConfig;
//! use blango::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
