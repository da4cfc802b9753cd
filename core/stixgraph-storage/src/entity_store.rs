//! Entity and relation index backed by SQLite.
//!
//! Entities keep their promoted fields as columns and the type-specific
//! remainder as a JSON document in `data`, which SQLite's `json_extract` can
//! reach for filtering and ordering. Relations are a separate table indexed on
//! both endpoints; relation paths (`rel_tagged.internal_id_key`) are answered
//! with `EXISTS` sub-queries over it.

use crate::codec::{checked_field, parse_opt_ts, parse_ts, ts};
use crate::{IN_MEMORY, StorageError, StorageResult, open_connection};
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use stixgraph_model::{
    CountQuery, CountResult, DistributionEntry, DistributionQuery, Entity, EntityFilter, Interval,
    ListQuery, MAX_TIME_SERIES_BUCKETS, OrderMode, Page, Relation, RelationAttribute, StoragePath,
    TimeSeriesEntry, TimeSeriesQuery,
};
use stixgraph_types::{EntityId, EntityType, RelationId, UserId};
use tracing::debug;

const ENTITY_COLUMNS: &str = "e.id, e.entity_type, e.stix_id, e.name, e.description, e.data, \
     e.created, e.modified, e.created_at, e.updated_at, e.created_by";

const RELATION_COLUMNS: &str = "r.id, r.relation_type, r.from_id, r.to_id, r.first_seen, \
     r.last_seen, r.inferred, r.created_at, r.created_by";

/// Joins the far end of relation `r` seen from entity `e` as `t`.
const FAR_END_JOIN: &str =
    "JOIN entities t ON t.id = CASE WHEN r.from_id = e.id THEN r.to_id ELSE r.from_id END";

/// Persistent store for entities and relations.
#[derive(Clone)]
pub struct EntityStore {
    conn: Arc<Mutex<Connection>>,
}

impl EntityStore {
    /// Opens (or creates) an entity store at the given path.
    pub fn open(path: &str) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(open_connection(path)?)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory entity store.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open(IN_MEMORY)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                stix_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT,
                data TEXT NOT NULL,
                created TEXT NOT NULL,
                modified TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                created_by TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
            CREATE INDEX IF NOT EXISTS idx_entities_created_at ON entities(created_at);

            CREATE TABLE IF NOT EXISTS relations (
                id TEXT PRIMARY KEY,
                relation_type TEXT NOT NULL,
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                first_seen TEXT,
                last_seen TEXT,
                inferred INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_relations_from ON relations(from_id, relation_type);
            CREATE INDEX IF NOT EXISTS idx_relations_to ON relations(to_id, relation_type);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    // ── Entities ─────────────────────────────────────────────────

    /// Inserts or updates an entity.
    pub fn save_entity(&self, entity: &Entity) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entities (id, entity_type, stix_id, name, description, data, created,
                                   modified, created_at, updated_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                entity_type = excluded.entity_type,
                stix_id = excluded.stix_id,
                name = excluded.name,
                description = excluded.description,
                data = excluded.data,
                created = excluded.created,
                modified = excluded.modified,
                updated_at = excluded.updated_at",
            params![
                entity.id.to_string(),
                entity.entity_type,
                entity.stix_id,
                entity.name,
                entity.description,
                serde_json::to_string(&entity.data)?,
                ts(&entity.created),
                ts(&entity.modified),
                ts(&entity.created_at),
                ts(&entity.updated_at),
                entity.created_by.to_string(),
            ],
        )?;
        debug!(id = %entity.id, entity_type = %entity.entity_type, "saved entity");
        Ok(())
    }

    pub fn get_entity(&self, id: EntityId) -> StorageResult<Option<Entity>> {
        let conn = self.lock()?;
        load_entity(&conn, id)
    }

    pub fn find_by_stix_id(&self, stix_id: &str) -> StorageResult<Option<Entity>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.stix_id = ?1");
        Ok(query_entities(&conn, &sql, params![stix_id])?.into_iter().next())
    }

    /// The ids in `ids` that have no stored entity.
    pub fn missing_ids(&self, ids: &[EntityId]) -> StorageResult<Vec<EntityId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT 1 FROM entities WHERE id = ?1")?;
        let mut missing = Vec::new();
        for id in ids {
            let found = stmt
                .query_row(params![id.to_string()], |_| Ok(()))
                .optional()?;
            if found.is_none() {
                missing.push(*id);
            }
        }
        Ok(missing)
    }

    /// Deletes an entity and every relation touching it. Returns whether the
    /// entity existed.
    pub fn delete_entity(&self, id: EntityId) -> StorageResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let key = id.to_string();
        let relations = tx.execute(
            "DELETE FROM relations WHERE from_id = ?1 OR to_id = ?1",
            params![key],
        )?;
        let deleted = tx.execute("DELETE FROM entities WHERE id = ?1", params![key])?;
        tx.commit()?;
        debug!(%id, relations, "deleted entity");
        Ok(deleted > 0)
    }

    /// Filtered, ordered, paginated listing.
    pub fn list_entities(&self, query: &ListQuery) -> StorageResult<Page<Entity>> {
        let mut where_args = Vec::new();
        let mut clauses = Vec::new();
        push_types_clause(&query.types, &mut clauses, &mut where_args);

        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
            clauses.push(
                "(LOWER(e.name) LIKE ? ESCAPE '\\' \
                 OR LOWER(COALESCE(e.description, '')) LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            where_args.push(SqlValue::Text(pattern.clone()));
            where_args.push(SqlValue::Text(pattern));
        }

        for filter in query.filters.iter().filter(|f| !f.values.is_empty()) {
            clauses.push(filter_clause(filter, &mut where_args)?);
        }

        let mut order_args = Vec::new();
        let order_key = match &query.order_by {
            None => "e.created_at".to_string(),
            Some(path) => order_expr(path, &mut order_args)?,
        };
        let direction = match query.order_mode {
            OrderMode::Asc => "ASC",
            OrderMode::Desc => "DESC",
        };
        let where_sql = where_sql(&clauses);

        let conn = self.lock()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM entities e{where_sql}"),
            params_from_iter(where_args.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities e{where_sql} \
             ORDER BY {order_key} COLLATE NOCASE {direction}, e.id {direction} \
             LIMIT ? OFFSET ?"
        );
        let mut args = where_args;
        args.extend(order_args);
        args.push(SqlValue::Integer(to_i64(query.first)));
        args.push(SqlValue::Integer(to_i64(query.offset)));
        let items = query_entities(&conn, &sql, params_from_iter(args.iter()))?;

        debug!(
            returned = items.len(),
            total, offset = query.offset, "listed entities"
        );
        Ok(Page {
            items,
            offset: query.offset,
            total: usize::try_from(total).unwrap_or(0),
        })
    }

    /// Number of entities of the given types, overall and up to `end_date`.
    pub fn count(&self, query: &CountQuery) -> StorageResult<CountResult> {
        let mut args = Vec::new();
        let mut clauses = Vec::new();
        push_types_clause(&query.types, &mut clauses, &mut args);

        let conn = self.lock()?;
        let total = count_where(&conn, &clauses, &args)?;
        let count = match &query.end_date {
            Some(end) => {
                clauses.push("e.created_at <= ?".to_string());
                args.push(SqlValue::Text(ts(end)));
                count_where(&conn, &clauses, &args)?
            }
            None => total,
        };
        Ok(CountResult { total, count })
    }

    /// Entity counts per interval between `start_date` and `end_date`, one entry
    /// per bucket including empty ones.
    pub fn time_series(&self, query: &TimeSeriesQuery) -> StorageResult<Vec<TimeSeriesEntry>> {
        if query.start_date > query.end_date {
            return Ok(Vec::new());
        }
        let buckets_needed = query.bucket_count();
        if buckets_needed > MAX_TIME_SERIES_BUCKETS {
            return Err(StorageError::InvalidData(format!(
                "time series spans {buckets_needed} buckets, at most {MAX_TIME_SERIES_BUCKETS} allowed"
            )));
        }
        let column = query.field.column();
        let mut args = Vec::new();
        let mut clauses = Vec::new();
        push_types_clause(&query.types, &mut clauses, &mut args);
        clauses.push(format!("e.{column} >= ?"));
        args.push(SqlValue::Text(ts(&query.start_date)));
        clauses.push(format!("e.{column} <= ?"));
        args.push(SqlValue::Text(ts(&query.end_date)));

        let mut buckets = BTreeMap::new();
        let first = bucket_start(query.start_date, query.interval);
        let last = bucket_start(query.end_date, query.interval);
        let mut cursor = first;
        while let Some(day) = cursor.filter(|d| Some(*d) <= last) {
            buckets.insert(day, 0.0_f64);
            cursor = next_bucket(day, query.interval);
        }

        let conn = self.lock()?;
        let sql = format!("SELECT e.{column} FROM entities e{}", where_sql(&clauses));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| row.get::<_, String>(0))?;
        for row in rows {
            let at = parse_ts(&row?)?;
            if let Some(value) = bucket_start(at, query.interval).and_then(|b| buckets.get_mut(&b)) {
                *value += 1.0;
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(day, value)| TimeSeriesEntry {
                date: day.and_time(NaiveTime::MIN).and_utc(),
                value,
            })
            .collect())
    }

    // ── Relations ────────────────────────────────────────────────

    pub fn save_relation(&self, relation: &Relation) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO relations (id, relation_type, from_id, to_id, first_seen, last_seen,
                                    inferred, created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO NOTHING",
            params![
                relation.id.to_string(),
                relation.relation_type,
                relation.from_id.to_string(),
                relation.to_id.to_string(),
                relation.first_seen.as_ref().map(ts),
                relation.last_seen.as_ref().map(ts),
                relation.inferred,
                ts(&relation.created_at),
                relation.created_by.to_string(),
            ],
        )?;
        debug!(
            id = %relation.id,
            relation_type = %relation.relation_type,
            from = %relation.from_id,
            to = %relation.to_id,
            "saved relation"
        );
        Ok(())
    }

    pub fn get_relation(&self, id: RelationId) -> StorageResult<Option<Relation>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {RELATION_COLUMNS} FROM relations r WHERE r.id = ?1");
        Ok(query_relations(&conn, &sql, params![id.to_string()])?
            .into_iter()
            .next())
    }

    /// The existing relation of `relation_type` from `from_id` to `to_id`, if any.
    pub fn find_relation(
        &self,
        from_id: EntityId,
        to_id: EntityId,
        relation_type: &str,
    ) -> StorageResult<Option<Relation>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {RELATION_COLUMNS} FROM relations r
             WHERE r.from_id = ?1 AND r.to_id = ?2 AND r.relation_type = ?3"
        );
        Ok(query_relations(
            &conn,
            &sql,
            params![from_id.to_string(), to_id.to_string(), relation_type],
        )?
        .into_iter()
        .next())
    }

    pub fn delete_relation(&self, id: RelationId) -> StorageResult<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM relations WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    /// Relations touching `entity_id` in either direction, oldest first.
    pub fn relations_of(
        &self,
        entity_id: EntityId,
        relation_type: Option<&str>,
    ) -> StorageResult<Vec<Relation>> {
        let conn = self.lock()?;
        touching(&conn, Some(entity_id), relation_type, true)
    }

    /// Entities reached from `from_id` through outgoing relations of `relation_type`.
    pub fn targets(&self, from_id: EntityId, relation_type: &str) -> StorageResult<Vec<Entity>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM relations r JOIN entities e ON e.id = r.to_id
             WHERE r.from_id = ?1 AND r.relation_type = ?2
             ORDER BY r.created_at, r.id"
        );
        query_entities(&conn, &sql, params![from_id.to_string(), relation_type])
    }

    /// Counts relations around `from_id`, grouped by a field of the entity on
    /// the other end, sorted by count descending then label.
    pub fn relation_distribution(
        &self,
        query: &DistributionQuery,
    ) -> StorageResult<Vec<DistributionEntry>> {
        let conn = self.lock()?;
        let relation_type = query.relation_type.as_deref();

        let mut ends = Vec::new();
        for relation in touching(&conn, query.from_id, relation_type, query.resolve_inferences)? {
            ends.push(match query.from_id {
                Some(from) => relation.other_end(from).unwrap_or(relation.to_id),
                None => relation.to_id,
            });
        }

        if query.resolve_inferences {
            if let (Some(from), Some(via)) = (query.from_id, query.resolve_relation_type.as_deref()) {
                for hop in touching(&conn, Some(from), Some(via), true)? {
                    let Some(middle) = hop.other_end(from) else {
                        continue;
                    };
                    for relation in touching(&conn, Some(middle), relation_type, true)? {
                        match relation.other_end(middle) {
                            Some(end) if end != from => ends.push(end),
                            _ => {}
                        }
                    }
                }
            }
        }

        let mut loaded: HashMap<EntityId, Option<Entity>> = HashMap::new();
        let mut counts: HashMap<String, f64> = HashMap::new();
        for end in ends {
            let entity = match loaded.entry(end) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => slot.insert(load_entity(&conn, end)?),
            };
            let Some(entity) = entity.as_ref() else {
                continue;
            };
            if !query.to_types.is_empty()
                && !entity.kind().is_some_and(|k| query.to_types.contains(&k))
            {
                continue;
            }
            if let Some(label) = entity.field_label(&query.field) {
                *counts.entry(label).or_default() += 1.0;
            }
        }

        let mut entries: Vec<DistributionEntry> = counts
            .into_iter()
            .map(|(label, value)| DistributionEntry { label, value })
            .collect();
        entries.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.label.cmp(&b.label)));
        debug!(from = ?query.from_id, buckets = entries.len(), "relation distribution");
        Ok(entries)
    }
}

// ── Row mapping ──────────────────────────────────────────────────

struct EntityRow {
    id: String,
    entity_type: String,
    stix_id: String,
    name: String,
    description: Option<String>,
    data: String,
    created: String,
    modified: String,
    created_at: String,
    updated_at: String,
    created_by: String,
}

impl EntityRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            stix_id: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            data: row.get(5)?,
            created: row.get(6)?,
            modified: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            created_by: row.get(10)?,
        })
    }

    fn into_entity(self) -> StorageResult<Entity> {
        Ok(Entity {
            id: EntityId::parse(&self.id)?,
            entity_type: self.entity_type,
            stix_id: self.stix_id,
            name: self.name,
            description: self.description,
            data: serde_json::from_str(&self.data)?,
            created: parse_ts(&self.created)?,
            modified: parse_ts(&self.modified)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            created_by: UserId::parse(&self.created_by)?,
        })
    }
}

struct RelationRow {
    id: String,
    relation_type: String,
    from_id: String,
    to_id: String,
    first_seen: Option<String>,
    last_seen: Option<String>,
    inferred: bool,
    created_at: String,
    created_by: String,
}

impl RelationRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            relation_type: row.get(1)?,
            from_id: row.get(2)?,
            to_id: row.get(3)?,
            first_seen: row.get(4)?,
            last_seen: row.get(5)?,
            inferred: row.get(6)?,
            created_at: row.get(7)?,
            created_by: row.get(8)?,
        })
    }

    fn into_relation(self) -> StorageResult<Relation> {
        Ok(Relation {
            id: RelationId::parse(&self.id)?,
            relation_type: self.relation_type,
            from_id: EntityId::parse(&self.from_id)?,
            to_id: EntityId::parse(&self.to_id)?,
            first_seen: parse_opt_ts(self.first_seen)?,
            last_seen: parse_opt_ts(self.last_seen)?,
            inferred: self.inferred,
            created_at: parse_ts(&self.created_at)?,
            created_by: UserId::parse(&self.created_by)?,
        })
    }
}

fn query_entities<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Vec<Entity>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, EntityRow::read)?;
    let mut entities = Vec::new();
    for row in rows {
        entities.push(row?.into_entity()?);
    }
    Ok(entities)
}

fn query_relations<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Vec<Relation>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, RelationRow::read)?;
    let mut relations = Vec::new();
    for row in rows {
        relations.push(row?.into_relation()?);
    }
    Ok(relations)
}

fn load_entity(conn: &Connection, id: EntityId) -> StorageResult<Option<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id = ?1");
    Ok(query_entities(conn, &sql, params![id.to_string()])?
        .into_iter()
        .next())
}

/// Relations touching `entity_id` (any relation when `None`).
fn touching(
    conn: &Connection,
    entity_id: Option<EntityId>,
    relation_type: Option<&str>,
    include_inferred: bool,
) -> StorageResult<Vec<Relation>> {
    let mut clauses = Vec::new();
    let mut args = Vec::new();
    if let Some(id) = entity_id {
        clauses.push("(r.from_id = ? OR r.to_id = ?)".to_string());
        args.push(SqlValue::Text(id.to_string()));
        args.push(SqlValue::Text(id.to_string()));
    }
    if let Some(relation_type) = relation_type {
        clauses.push("r.relation_type = ?".to_string());
        args.push(SqlValue::Text(relation_type.to_string()));
    }
    if !include_inferred {
        clauses.push("r.inferred = 0".to_string());
    }
    let sql = format!(
        "SELECT {RELATION_COLUMNS} FROM relations r{} ORDER BY r.created_at, r.id",
        where_sql(&clauses)
    );
    query_relations(conn, &sql, params_from_iter(args.iter()))
}

// ── SQL building ─────────────────────────────────────────────────

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_types_clause(types: &[EntityType], clauses: &mut Vec<String>, args: &mut Vec<SqlValue>) {
    if types.is_empty() {
        return;
    }
    clauses.push(format!("e.entity_type IN ({})", placeholders(types.len())));
    args.extend(types.iter().map(|t| SqlValue::Text(t.as_tag().to_string())));
}

fn count_where(conn: &Connection, clauses: &[String], args: &[SqlValue]) -> StorageResult<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM entities e{}", where_sql(clauses)),
        params_from_iter(args.iter()),
        |row| row.get(0),
    )?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// SQL expression reading a logical field of the entity aliased `alias`.
fn field_expr(alias: &str, field: &str) -> StorageResult<String> {
    Ok(match field {
        "id" | "internal_id_key" => format!("{alias}.id"),
        "stix_id" | "stix_id_key" => format!("{alias}.stix_id"),
        "entity_type" | "name" | "description" | "created" | "modified" | "created_at"
        | "updated_at" => format!("{alias}.{field}"),
        "value" | "definition" => {
            format!("COALESCE(json_extract({alias}.data, '$.{field}'), {alias}.name)")
        }
        other => format!("json_extract({alias}.data, '$.{}')", checked_field(other)?),
    })
}

fn filter_clause(filter: &EntityFilter, args: &mut Vec<SqlValue>) -> StorageResult<String> {
    let values = || filter.values.iter().map(|v| SqlValue::Text(v.clone()));
    let slots = placeholders(filter.values.len());
    match &filter.path {
        StoragePath::Field(field) => {
            let expr = field_expr("e", field)?;
            args.extend(values());
            Ok(format!("{expr} IN ({slots})"))
        }
        StoragePath::Relation {
            relation_type,
            attribute: RelationAttribute::InternalId,
        } => {
            args.push(SqlValue::Text(relation_type.clone()));
            args.extend(values());
            args.extend(values());
            Ok(format!(
                "EXISTS (SELECT 1 FROM relations r WHERE r.relation_type = ? AND \
                 ((r.from_id = e.id AND r.to_id IN ({slots})) \
                 OR (r.to_id = e.id AND r.from_id IN ({slots}))))"
            ))
        }
        StoragePath::Relation {
            relation_type,
            attribute: RelationAttribute::Field(field),
        } => {
            let expr = field_expr("t", field)?;
            args.push(SqlValue::Text(relation_type.clone()));
            args.extend(values());
            Ok(format!(
                "EXISTS (SELECT 1 FROM relations r {FAR_END_JOIN} WHERE r.relation_type = ? \
                 AND (r.from_id = e.id OR r.to_id = e.id) AND {expr} IN ({slots}))"
            ))
        }
    }
}

fn order_expr(path: &StoragePath, args: &mut Vec<SqlValue>) -> StorageResult<String> {
    match path {
        StoragePath::Field(field) => field_expr("e", field),
        StoragePath::Relation {
            relation_type,
            attribute,
        } => {
            let expr = match attribute {
                RelationAttribute::InternalId => "t.id".to_string(),
                RelationAttribute::Field(field) => field_expr("t", field)?,
            };
            args.push(SqlValue::Text(relation_type.clone()));
            Ok(format!(
                "(SELECT MIN({expr}) FROM relations r {FAR_END_JOIN} \
                 WHERE r.relation_type = ? AND (r.from_id = e.id OR r.to_id = e.id))"
            ))
        }
    }
}

// ── Time buckets ─────────────────────────────────────────────────

fn bucket_start(at: DateTime<Utc>, interval: Interval) -> Option<NaiveDate> {
    match interval {
        Interval::Day => Some(at.date_naive()),
        Interval::Month => NaiveDate::from_ymd_opt(at.year(), at.month(), 1),
        Interval::Year => NaiveDate::from_ymd_opt(at.year(), 1, 1),
    }
}

fn next_bucket(day: NaiveDate, interval: Interval) -> Option<NaiveDate> {
    match interval {
        Interval::Day => day.succ_opt(),
        Interval::Month => day.checked_add_months(Months::new(1)),
        Interval::Year => day.checked_add_months(Months::new(12)),
    }
}
