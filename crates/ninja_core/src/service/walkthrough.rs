//! Walkthrough of the unit-of-work operations over the ninja store.
//!
//! # Responsibility
//! - Run each example operation in its own session(s) against one database.
//! - Hand back the handles each operation touched so callers can inspect them.
//!
//! # Invariants
//! - Every session is opened and dropped inside the operation that needs it.
//! - Failures propagate unchanged; nothing is caught or retried here.
//! - Operations that work on "the first ninja" return `None` for an empty table.

use crate::context::{EntityState, Filter, NinjaContext, NinjaRelation, PersistenceResult};
use crate::model::clan::Clan;
use crate::model::equipment::{Equipment, EquipmentType};
use crate::model::ninja::Ninja;
use crate::model::{EntityKey, Shared};
use chrono::NaiveDate;
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Clan every walkthrough ninja is filed under.
pub const DEFAULT_CLAN_ID: EntityKey = 1;
/// Key looked up by [`NinjaWalkthrough::retrieve_data_with_find`] callers by default.
pub const DEFAULT_FIND_KEY: EntityKey = 4;
/// Stored procedure expected to exist in the target database.
pub const OLD_NINJAS_PROCEDURE: &str = "GetOldNinjas";

/// Result of [`NinjaWalkthrough::simple_ninja_queries`].
#[derive(Debug)]
pub struct NinjaQueries {
    /// Every ninja, ordered by key.
    pub all: Vec<Shared<Ninja>>,
    /// First ninja named exactly `PeterSan`, if any.
    pub peter_san: Option<Shared<Ninja>>,
}

/// Result of [`NinjaWalkthrough::retrieve_data_with_find`].
#[derive(Debug)]
pub struct FindTwice {
    pub first: Option<Shared<Ninja>>,
    pub second: Option<Shared<Ninja>>,
    /// Statements the session sent for both lookups together.
    pub round_trips: u64,
}

/// Example operations, each against a fresh session on `db_path`.
#[derive(Debug, Clone)]
pub struct NinjaWalkthrough {
    db_path: PathBuf,
}

impl NinjaWalkthrough {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Inserts a clan so fixed clan references can be satisfied.
    pub fn insert_clan(&self, clan_name: &str) -> PersistenceResult<Shared<Clan>> {
        self.run("insert_clan", |ctx| {
            let clan = ctx.clans().add(Clan::new(clan_name));
            ctx.save_changes()?;
            Ok(clan)
        })
    }

    pub fn insert_ninja(&self) -> PersistenceResult<Shared<Ninja>> {
        self.run("insert_ninja", |ctx| {
            let ninja = ctx
                .ninjas()
                .add(clan_member("JohnDoeSan", date(1960, 1, 1)));
            ctx.save_changes()?;
            Ok(ninja)
        })
    }

    pub fn insert_multiple_ninjas(&self) -> PersistenceResult<Vec<Shared<Ninja>>> {
        self.run("insert_multiple_ninjas", |ctx| {
            let ninjas = ctx.ninjas().add_range([
                clan_member("Leonardo", date(1984, 1, 1)),
                clan_member("Raphael", date(1985, 1, 1)),
            ]);
            ctx.save_changes()?;
            Ok(ninjas)
        })
    }

    pub fn simple_ninja_queries(&self) -> PersistenceResult<NinjaQueries> {
        self.run("simple_ninja_queries", |ctx| {
            let all = ctx.ninjas().to_list()?;
            let peter_san = ctx
                .ninjas()
                .filter(Filter::eq("name", "PeterSan".to_string()))
                .first_or_default()?;
            Ok(NinjaQueries { all, peter_san })
        })
    }

    /// Toggles `served_in_oniwaban` on the first ninja inside one session.
    pub fn query_and_update_ninja(&self) -> PersistenceResult<Option<Shared<Ninja>>> {
        self.run("query_and_update_ninja", |ctx| {
            let Some(ninja) = ctx.ninjas().first_or_default()? else {
                return Ok(None);
            };
            toggle_oniwaban(&ninja);
            ctx.save_changes()?;
            Ok(Some(ninja))
        })
    }

    /// Loads the first ninja in one session, toggles it with no session
    /// open, then writes every column from a second session.
    pub fn query_and_update_ninja_disconnected(&self) -> PersistenceResult<Option<Shared<Ninja>>> {
        let started_at = Instant::now();
        let Some(ninja) = self.session()?.ninjas().first_or_default()? else {
            log_step("query_and_update_ninja_disconnected", started_at);
            return Ok(None);
        };

        toggle_oniwaban(&ninja);

        let mut ctx = self.session()?;
        ctx.ninjas().attach(&ninja)?;
        ctx.entry(&ninja).set_state(EntityState::Modified)?;
        ctx.save_changes()?;
        log_step("query_and_update_ninja_disconnected", started_at);
        Ok(Some(ninja))
    }

    /// Finds `key` twice in one session; the second lookup is served from
    /// the identity map.
    pub fn retrieve_data_with_find(&self, key: EntityKey) -> PersistenceResult<FindTwice> {
        self.run("retrieve_data_with_find", |ctx| {
            let first = ctx.ninjas().find(key)?;
            let second = ctx.ninjas().find(key)?;
            Ok(FindTwice {
                first,
                second,
                round_trips: ctx.round_trips(),
            })
        })
    }

    pub fn retrieve_data_with_stored_proc(&self) -> PersistenceResult<Vec<Shared<Ninja>>> {
        self.run("retrieve_data_with_stored_proc", |ctx| {
            ctx.ninjas().exec_procedure(OLD_NINJAS_PROCEDURE)
        })
    }

    pub fn delete_ninja(&self) -> PersistenceResult<Option<Shared<Ninja>>> {
        self.run("delete_ninja", |ctx| {
            let Some(ninja) = ctx.ninjas().first_or_default()? else {
                return Ok(None);
            };
            ctx.ninjas().remove(&ninja)?;
            ctx.save_changes()?;
            Ok(Some(ninja))
        })
    }

    /// Deletes the first ninja from a second session without reloading it.
    pub fn delete_ninja_disconnected(&self) -> PersistenceResult<Option<Shared<Ninja>>> {
        let started_at = Instant::now();
        let Some(ninja) = self.session()?.ninjas().first_or_default()? else {
            log_step("delete_ninja_disconnected", started_at);
            return Ok(None);
        };

        let mut ctx = self.session()?;
        ctx.entry(&ninja).set_state(EntityState::Deleted)?;
        ctx.save_changes()?;
        log_step("delete_ninja_disconnected", started_at);
        Ok(Some(ninja))
    }

    /// Adds a ninja and fills its equipment collection; the equipment is
    /// inserted through the tracked ninja.
    pub fn insert_ninja_with_equipment(&self) -> PersistenceResult<Shared<Ninja>> {
        self.run("insert_ninja_with_equipment", |ctx| {
            let ninja = ctx
                .ninjas()
                .add(clan_member("Kacy Catanzaro", date(1990, 1, 14)));
            {
                let mut owner = ninja.borrow_mut();
                owner.own(Equipment::new("Muscles", EquipmentType::Tool));
                owner.own(Equipment::new("Spunk", EquipmentType::Weapon));
            }
            ctx.save_changes()?;
            Ok(ninja)
        })
    }

    /// First ninja whose name starts with `Kacy`, equipment loaded eagerly.
    pub fn simple_ninja_graph_query(&self) -> PersistenceResult<Option<Shared<Ninja>>> {
        self.run("simple_ninja_graph_query", |ctx| {
            ctx.ninjas()
                .include(NinjaRelation::EquipmentOwned)
                .filter(Filter::starts_with("name", "Kacy"))
                .first_or_default()
        })
    }

    fn session(&self) -> PersistenceResult<NinjaContext> {
        NinjaContext::open(&self.db_path)
    }

    fn run<R>(
        &self,
        step: &'static str,
        body: impl FnOnce(&mut NinjaContext) -> PersistenceResult<R>,
    ) -> PersistenceResult<R> {
        let started_at = Instant::now();
        let mut ctx = self.session()?;
        let outcome = body(&mut ctx)?;
        drop(ctx);
        log_step(step, started_at);
        Ok(outcome)
    }
}

fn clan_member(name: &str, date_of_birth: NaiveDate) -> Ninja {
    let mut ninja = Ninja::new(name, date_of_birth);
    ninja.clan_id = Some(DEFAULT_CLAN_ID);
    ninja
}

fn toggle_oniwaban(ninja: &Shared<Ninja>) {
    let mut ninja = ninja.borrow_mut();
    ninja.served_in_oniwaban = !ninja.served_in_oniwaban;
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn log_step(step: &'static str, started_at: Instant) {
    info!(
        "event=walkthrough module=service status=ok step={step} duration_ms={}",
        started_at.elapsed().as_millis()
    );
}
