//! Filtered queries and eager graph loading.
//!
//! # Invariants
//! - Results are ordered by key so `first_or_default` is deterministic.
//! - Column names are checked against the entity mapping before any SQL is
//!   built; values are always bound, never interpolated.
//! - A graph query is one statement: parent rows are selected in a sub-query
//!   and joined to their children.

use super::entity::{Entity, KEY_COLUMN};
use super::error::{PersistenceError, PersistenceResult};
use super::NinjaContext;
use crate::model::equipment::Equipment;
use crate::model::ninja::Ninja;
use crate::model::Shared;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::marker::PhantomData;
use std::rc::Rc;

const PARENT_ALIAS: &str = "n";
const CHILD_ALIAS: &str = "e";
const CHILD_PREFIX: &str = "e_";

/// Column predicate. Multiple filters are combined with `AND`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Exact match.
    Eq { column: &'static str, value: Value },
    /// Text prefix match (ASCII case-insensitive, like SQLite `LIKE`).
    StartsWith { column: &'static str, prefix: String },
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self::Eq {
            column,
            value: value.into(),
        }
    }

    pub fn starts_with(column: &'static str, prefix: impl Into<String>) -> Self {
        Self::StartsWith {
            column,
            prefix: prefix.into(),
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::Eq { column, .. } | Self::StartsWith { column, .. } => *column,
        }
    }
}

/// Relations of [`Ninja`] that can be eagerly loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NinjaRelation {
    EquipmentOwned,
}

/// Query over one entity set.
pub struct Query<'c, T: Entity> {
    ctx: &'c mut NinjaContext,
    filters: Vec<Filter>,
    marker: PhantomData<T>,
}

impl<'c, T: Entity> Query<'c, T> {
    pub(crate) fn new(ctx: &'c mut NinjaContext) -> Self {
        Self {
            ctx,
            filters: Vec::new(),
            marker: PhantomData,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn to_list(self) -> PersistenceResult<Vec<Shared<T>>> {
        self.fetch(None)
    }

    /// First match by key, or `None`. Never an error for "no row".
    pub fn first_or_default(self) -> PersistenceResult<Option<Shared<T>>> {
        Ok(self.fetch(Some(1))?.into_iter().next())
    }

    fn fetch(self, limit: Option<u32>) -> PersistenceResult<Vec<Shared<T>>> {
        let (sql, params) = select_sql::<T>(&self.filters, limit)?;
        let (mut exec, tracker) = self.ctx.parts();
        let rows = exec.query(&sql, params_from_iter(params), |row| T::from_row(row, ""))?;

        let tracker = T::tracker_mut(tracker);
        Ok(rows
            .into_iter()
            .map(|row| tracker.materialize(row))
            .collect())
    }
}

impl<'c> Query<'c, Ninja> {
    /// Turns this query into a graph query that also loads `relation`.
    pub fn include(self, relation: NinjaRelation) -> GraphQuery<'c> {
        GraphQuery {
            ctx: self.ctx,
            filters: self.filters,
            relation,
        }
    }
}

/// Ninja query with an eagerly loaded relation.
pub struct GraphQuery<'c> {
    ctx: &'c mut NinjaContext,
    filters: Vec<Filter>,
    relation: NinjaRelation,
}

impl GraphQuery<'_> {
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn to_list(self) -> PersistenceResult<Vec<Shared<Ninja>>> {
        self.fetch(None)
    }

    pub fn first_or_default(self) -> PersistenceResult<Option<Shared<Ninja>>> {
        Ok(self.fetch(Some(1))?.into_iter().next())
    }

    fn fetch(self, limit: Option<u32>) -> PersistenceResult<Vec<Shared<Ninja>>> {
        match self.relation {
            NinjaRelation::EquipmentOwned => self.fetch_with_equipment(limit),
        }
    }

    fn fetch_with_equipment(self, limit: Option<u32>) -> PersistenceResult<Vec<Shared<Ninja>>> {
        let (parents_sql, params) = select_sql::<Ninja>(&self.filters, limit)?;
        let sql = format!(
            "SELECT {parent_columns}, {child_columns}
             FROM ({parents_sql}) AS {PARENT_ALIAS}
             LEFT JOIN {child_table} AS {CHILD_ALIAS}
               ON {CHILD_ALIAS}.ninja_id = {PARENT_ALIAS}.{KEY_COLUMN}
             ORDER BY {PARENT_ALIAS}.{KEY_COLUMN} ASC, {CHILD_ALIAS}.{KEY_COLUMN} ASC",
            parent_columns = aliased_columns::<Ninja>(PARENT_ALIAS, ""),
            child_columns = aliased_columns::<Equipment>(CHILD_ALIAS, CHILD_PREFIX),
            child_table = Equipment::TABLE,
        );

        let (mut exec, tracker) = self.ctx.parts();
        let rows = exec.query(&sql, params_from_iter(params), |row| {
            let ninja = Ninja::from_row(row, "")?;
            let child_key: Option<i64> = row.get(format!("{CHILD_PREFIX}{KEY_COLUMN}").as_str())?;
            let child = match child_key {
                Some(_) => Some(Equipment::from_row(row, CHILD_PREFIX)?),
                None => None,
            };
            Ok((ninja, child))
        })?;

        let mut parents: Vec<Shared<Ninja>> = Vec::new();
        for (ninja, child) in rows {
            let parent = tracker.ninjas.materialize(ninja);
            if !parents.last().is_some_and(|last| Rc::ptr_eq(last, &parent)) {
                parents.push(Rc::clone(&parent));
            }

            if let Some(child) = child {
                let child = tracker.equipment.materialize(child);
                let mut parent = parent.borrow_mut();
                if !parent
                    .equipment_owned
                    .iter()
                    .any(|owned| Rc::ptr_eq(owned, &child))
                {
                    parent.equipment_owned.push(child);
                }
            }
        }
        Ok(parents)
    }
}

fn select_sql<T: Entity>(
    filters: &[Filter],
    limit: Option<u32>,
) -> PersistenceResult<(String, Vec<Value>)> {
    let mut sql = format!("SELECT {} FROM {}", T::select_list(), T::TABLE);
    let mut params = Vec::new();

    for (index, filter) in filters.iter().enumerate() {
        let column = filter.column();
        if !T::maps_column(column) {
            return Err(PersistenceError::UnknownColumn {
                table: T::TABLE,
                column,
            });
        }

        sql.push_str(if index == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::Eq { value, .. } => {
                sql.push_str(&format!("{column} = ?"));
                params.push(value.clone());
            }
            Filter::StartsWith { prefix, .. } => {
                sql.push_str(&format!("{column} LIKE ? ESCAPE '\\'"));
                params.push(Value::Text(like_prefix_pattern(prefix)));
            }
        }
    }

    sql.push_str(&format!(" ORDER BY {KEY_COLUMN} ASC"));
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        params.push(Value::Integer(i64::from(limit)));
    }
    Ok((sql, params))
}

fn aliased_columns<T: Entity>(alias: &str, prefix: &str) -> String {
    std::iter::once(KEY_COLUMN)
        .chain(T::COLUMNS.iter().copied())
        .map(|column| format!("{alias}.{column} AS {prefix}{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
