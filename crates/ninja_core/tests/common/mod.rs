#![allow(dead_code)]

use ninja_core::{Clan, EntityKey, NinjaContext};
use std::path::PathBuf;
use tempfile::TempDir;

/// On-disk store that outlives individual sessions.
pub struct TestStore {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ninja.sqlite3");
        Self { _dir: dir, path }
    }

    pub fn session(&self) -> NinjaContext {
        NinjaContext::open(&self.path).unwrap()
    }

    /// Same store, with one clan already persisted.
    pub fn with_clan() -> (Self, EntityKey) {
        let store = Self::new();
        let mut ctx = store.session();
        let clan = ctx.clans().add(Clan::new("Vermont Clan"));
        ctx.save_changes().unwrap();
        let key = clan.borrow().id;
        (store, key)
    }
}

pub fn ymd(year: i32, month: u32, day: u32) -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
