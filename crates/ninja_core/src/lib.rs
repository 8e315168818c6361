//! Unit-of-work data mapper for the ninja dojo store.
//! Sessions track ninjas, clans and equipment and flush their net changes
//! to SQLite in one transaction.

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;

pub use config::{AppConfig, ConfigError};
pub use context::{
    DbSet, Entity, EntityState, Entry, Filter, GraphQuery, NinjaContext, NinjaRelation,
    PersistenceError, PersistenceResult, Query,
};
pub use db::{DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::clan::Clan;
pub use model::equipment::{Equipment, EquipmentType};
pub use model::ninja::Ninja;
pub use model::{shared, EntityKey, Shared, ValidationError};
pub use service::walkthrough::{FindTwice, NinjaQueries, NinjaWalkthrough};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
