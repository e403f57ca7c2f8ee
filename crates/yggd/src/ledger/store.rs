//! SQLite persistence for the Knowledge Ledger.
//!
//! A single connection behind a mutex; SQLite transactions linearize
//! concurrent writers, which gives per-node serialization without a lock
//! table. All public methods map storage errors to `PersistenceFailure`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::Mutex;

use ygg_common::audit::AuditEntry;
use ygg_common::branch::Branch;
use ygg_common::council::CouncilDeliberation;
use ygg_common::graph::{Checkpoint, DependencyEdge, DependencyRelation, NodeSnapshot};
use ygg_common::node::{KnowledgeNode, NodeState, PriorityQueue};
use ygg_common::source::{Source, SourceType};
use ygg_common::{YggError, YggResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS knowledge_nodes (
    id              TEXT PRIMARY KEY,
    statement       TEXT NOT NULL,
    domain          TEXT,
    tags            TEXT NOT NULL DEFAULT '[]',
    branch          TEXT NOT NULL,
    state           TEXT NOT NULL,
    confidence      INTEGER NOT NULL,
    velocity        REAL NOT NULL DEFAULT 0,
    priority_queue  TEXT NOT NULL,
    last_scan       TEXT,
    next_scan       TEXT,
    idle_cycles     INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_entries (
    node_id         TEXT NOT NULL,
    seq             INTEGER NOT NULL,
    entry           TEXT NOT NULL,
    PRIMARY KEY (node_id, seq)
);

CREATE TABLE IF NOT EXISTS knowledge_dependencies (
    source_id       TEXT NOT NULL,
    target_id       TEXT NOT NULL,
    relation        TEXT NOT NULL,
    strength        REAL NOT NULL,
    PRIMARY KEY (source_id, target_id)
);

CREATE TABLE IF NOT EXISTS sources (
    id              TEXT PRIMARY KEY,
    source_type     TEXT NOT NULL,
    identifier      TEXT NOT NULL,
    url             TEXT NOT NULL,
    title           TEXT NOT NULL,
    authors         TEXT NOT NULL DEFAULT '[]',
    trust_score     INTEGER NOT NULL,
    retrieved_at    TEXT NOT NULL,
    UNIQUE (source_type, identifier)
);

CREATE TABLE IF NOT EXISTS node_sources (
    node_id         TEXT NOT NULL,
    source_id       TEXT NOT NULL,
    PRIMARY KEY (node_id, source_id)
);

CREATE TABLE IF NOT EXISTS shapley_attributions (
    node_id         TEXT NOT NULL,
    member          TEXT NOT NULL,
    contribution    REAL NOT NULL,
    PRIMARY KEY (node_id, member)
);

CREATE TABLE IF NOT EXISTS checkpoints (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    label           TEXT NOT NULL,
    description     TEXT,
    state_hash      TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS checkpoint_snapshots (
    checkpoint_id       TEXT NOT NULL,
    node_id             TEXT NOT NULL,
    state               TEXT NOT NULL,
    branch              TEXT NOT NULL,
    confidence          INTEGER NOT NULL,
    velocity            REAL NOT NULL,
    priority_queue      TEXT NOT NULL,
    audit_trail_length  INTEGER NOT NULL,
    PRIMARY KEY (checkpoint_id, node_id)
);

CREATE TABLE IF NOT EXISTS alerts (
    id              TEXT PRIMARY KEY,
    node_id         TEXT NOT NULL,
    kind            TEXT NOT NULL,
    severity        TEXT NOT NULL,
    message         TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deliberations (
    id              TEXT PRIMARY KEY,
    request_id      TEXT NOT NULL,
    record          TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_queue_scan ON knowledge_nodes (priority_queue, next_scan);
CREATE INDEX IF NOT EXISTS idx_nodes_created ON knowledge_nodes (created_at);
CREATE INDEX IF NOT EXISTS idx_deps_source ON knowledge_dependencies (source_id);
CREATE INDEX IF NOT EXISTS idx_node_sources_node ON node_sources (node_id);
"#;

/// Storage handle. Cheap to share behind an `Arc`.
pub struct Store {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> YggError {
    YggError::PersistenceFailure(e.to_string())
}

fn json_err(e: serde_json::Error) -> YggError {
    YggError::PersistenceFailure(format!("corrupt stored json: {}", e))
}

impl Store {
    /// Open (creating if needed) the database at `path` and run the schema.
    pub fn open(path: &str) -> YggResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory().map_err(db_err)?
        } else {
            Connection::open(path).map_err(db_err)?
        };
        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> YggResult<Self> {
        Self::open(":memory:")
    }

    /// Run `f` with the connection. Poisoned locks are unrecoverable here.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> YggResult<T>) -> YggResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| YggError::PersistenceFailure("store mutex poisoned".to_string()))?;
        f(&conn)
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub fn insert_node(&self, node: &KnowledgeNode) -> YggResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO knowledge_nodes
                 (id, statement, domain, tags, branch, state, confidence, velocity,
                  priority_queue, last_scan, next_scan, idle_cycles, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    node.id,
                    node.statement,
                    node.domain,
                    serde_json::to_string(&node.tags).map_err(json_err)?,
                    node.branch.as_str(),
                    node.state.as_str(),
                    node.confidence,
                    node.velocity,
                    node.priority_queue.as_str(),
                    node.last_scan.map(|t| t.to_rfc3339()),
                    node.next_scan.map(|t| t.to_rfc3339()),
                    node.idle_cycles,
                    node.created_at.to_rfc3339(),
                    node.updated_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn update_node(&self, node: &KnowledgeNode) -> YggResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE knowledge_nodes SET
                     statement=?2, domain=?3, tags=?4, branch=?5, state=?6, confidence=?7,
                     velocity=?8, priority_queue=?9, last_scan=?10, next_scan=?11,
                     idle_cycles=?12, updated_at=?13
                     WHERE id=?1",
                    params![
                        node.id,
                        node.statement,
                        node.domain,
                        serde_json::to_string(&node.tags).map_err(json_err)?,
                        node.branch.as_str(),
                        node.state.as_str(),
                        node.confidence,
                        node.velocity,
                        node.priority_queue.as_str(),
                        node.last_scan.map(|t| t.to_rfc3339()),
                        node.next_scan.map(|t| t.to_rfc3339()),
                        node.idle_cycles,
                        node.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(db_err)?;
            if changed == 0 {
                return Err(YggError::NotFound(node.id.clone()));
            }
            Ok(())
        })
    }

    /// Compensation path for a failed create: a node whose CREATE audit
    /// entry could not be written is removed again.
    pub(crate) fn delete_node(&self, id: &str) -> YggResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM node_sources WHERE node_id=?1", params![id])
                .map_err(db_err)?;
            conn.execute("DELETE FROM knowledge_nodes WHERE id=?1", params![id])
                .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn get_node(&self, id: &str) -> YggResult<KnowledgeNode> {
        let mut node = self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, statement, domain, tags, branch, state, confidence, velocity,
                        priority_queue, last_scan, next_scan, idle_cycles, created_at, updated_at
                 FROM knowledge_nodes WHERE id=?1",
                params![id],
                row_to_node,
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| YggError::NotFound(id.to_string()))
        })?;
        node.shapley_attribution = self.shapley_map(id)?;
        Ok(node)
    }

    pub fn node_exists(&self, id: &str) -> YggResult<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM knowledge_nodes WHERE id=?1",
                    params![id],
                    |r| r.get(0),
                )
                .map_err(db_err)?;
            Ok(n > 0)
        })
    }

    pub fn node_count(&self) -> YggResult<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM knowledge_nodes", [], |r| r.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(db_err)
        })
    }

    /// Nodes in `queue` due for a scan, oldest `next_scan` first with NULLs
    /// leading, excluding terminal states.
    pub fn due_for_scan(
        &self,
        queue: PriorityQueue,
        now: DateTime<Utc>,
        limit: usize,
    ) -> YggResult<Vec<KnowledgeNode>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, statement, domain, tags, branch, state, confidence, velocity,
                            priority_queue, last_scan, next_scan, idle_cycles, created_at, updated_at
                     FROM knowledge_nodes
                     WHERE priority_queue=?1
                       AND state NOT IN ('DEPRECATED', 'REJECTED')
                       AND (next_scan IS NULL OR next_scan <= ?2)
                     ORDER BY next_scan IS NOT NULL, next_scan ASC
                     LIMIT ?3",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![queue.as_str(), now.to_rfc3339(), limit as i64], row_to_node)
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
    }

    /// Statement search by keyword fragments, scoped to one branch and a
    /// minimum confidence. Used by the branch handlers.
    pub fn find_nodes_by_keywords(
        &self,
        keywords: &[String],
        branch: Branch,
        min_state: Option<NodeState>,
        limit: usize,
    ) -> YggResult<Vec<KnowledgeNode>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let clauses: Vec<String> = (0..keywords.len())
                .map(|i| format!("statement LIKE ?{} ESCAPE '\\'", i + 1))
                .collect();
            let sql = format!(
                "SELECT id, statement, domain, tags, branch, state, confidence, velocity,
                        priority_queue, last_scan, next_scan, idle_cycles, created_at, updated_at
                 FROM knowledge_nodes
                 WHERE branch='{}'
                   AND state NOT IN ('DEPRECATED', 'REJECTED')
                   AND ({})
                 ORDER BY confidence DESC
                 LIMIT {}",
                branch.as_str(),
                clauses.join(" OR "),
                limit
            );
            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            // Escape LIKE wildcards in user-derived tokens.
            let patterns: Vec<String> = keywords
                .iter()
                .map(|kw| {
                    let escaped = kw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
                    format!("%{}%", escaped)
                })
                .collect();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(patterns), row_to_node)
                .map_err(db_err)?;
            let mut nodes: Vec<KnowledgeNode> =
                rows.collect::<Result<Vec<_>, _>>().map_err(db_err)?;
            if let Some(state) = min_state {
                nodes.retain(|n| n.state == state);
            }
            Ok(nodes)
        })
    }

    /// Ids of nodes created strictly after `ts`.
    pub fn node_ids_created_after(&self, ts: DateTime<Utc>) -> YggResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM knowledge_nodes WHERE created_at > ?1")
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![ts.to_rfc3339()], |r| r.get::<_, String>(0))
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
    }

    // ------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------

    /// Append one audit entry. Entries are immutable once written; the
    /// sequence number is derived inside the insert so appends linearize.
    pub fn append_audit(&self, node_id: &str, entry: &AuditEntry) -> YggResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_entries (node_id, seq, entry)
                 SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2 FROM audit_entries WHERE node_id=?1",
                params![node_id, serde_json::to_string(entry).map_err(json_err)?],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn audit_trail(&self, node_id: &str) -> YggResult<Vec<AuditEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT entry FROM audit_entries WHERE node_id=?1 ORDER BY seq ASC")
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![node_id], |r| r.get::<_, String>(0))
                .map_err(db_err)?;
            let mut entries = Vec::new();
            for raw in rows {
                entries.push(serde_json::from_str(&raw.map_err(db_err)?).map_err(json_err)?);
            }
            Ok(entries)
        })
    }

    pub fn audit_trail_len(&self, node_id: &str) -> YggResult<u64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM audit_entries WHERE node_id=?1",
                params![node_id],
                |r| r.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(db_err)
        })
    }

    // ------------------------------------------------------------------
    // Dependencies
    // ------------------------------------------------------------------

    pub fn upsert_dependency(&self, edge: &DependencyEdge) -> YggResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO knowledge_dependencies (source_id, target_id, relation, strength)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (source_id, target_id)
                 DO UPDATE SET relation=excluded.relation, strength=excluded.strength",
                params![edge.source_id, edge.target_id, edge.relation.as_str(), edge.strength],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    /// Outgoing edges of `source_id` (its dependents).
    pub fn dependents(&self, source_id: &str) -> YggResult<Vec<DependencyEdge>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT source_id, target_id, relation, strength
                     FROM knowledge_dependencies WHERE source_id=?1",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![source_id], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, f64>(3)?,
                    ))
                })
                .map_err(db_err)?;
            let mut edges = Vec::new();
            for row in rows {
                let (source_id, target_id, relation, strength) = row.map_err(db_err)?;
                let relation = DependencyRelation::parse(&relation).ok_or_else(|| {
                    YggError::PersistenceFailure(format!("unknown relation {}", relation))
                })?;
                edges.push(DependencyEdge {
                    source_id,
                    target_id,
                    relation,
                    strength,
                });
            }
            Ok(edges)
        })
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    /// Upsert by `(type, identifier)` and return the stored id.
    pub fn upsert_source(&self, source: &Source) -> YggResult<String> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sources
                 (id, source_type, identifier, url, title, authors, trust_score, retrieved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (source_type, identifier)
                 DO UPDATE SET url=excluded.url, title=excluded.title,
                               trust_score=excluded.trust_score,
                               retrieved_at=excluded.retrieved_at",
                params![
                    source.id,
                    source.source_type.as_str(),
                    source.identifier,
                    source.url,
                    source.title,
                    serde_json::to_string(&source.authors).map_err(json_err)?,
                    source.trust_score,
                    source.retrieved_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            conn.query_row(
                "SELECT id FROM sources WHERE source_type=?1 AND identifier=?2",
                params![source.source_type.as_str(), source.identifier],
                |r| r.get::<_, String>(0),
            )
            .map_err(db_err)
        })
    }

    pub fn link_source(&self, node_id: &str, source_id: &str) -> YggResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO node_sources (node_id, source_id) VALUES (?1, ?2)",
                params![node_id, source_id],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn sources_for(&self, node_id: &str) -> YggResult<Vec<Source>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT s.id, s.source_type, s.identifier, s.url, s.title, s.authors,
                            s.trust_score, s.retrieved_at
                     FROM sources s
                     JOIN node_sources ns ON ns.source_id = s.id
                     WHERE ns.node_id = ?1",
                )
                .map_err(db_err)?;
            let rows = stmt.query_map(params![node_id], row_to_source).map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
    }

    // ------------------------------------------------------------------
    // Shapley
    // ------------------------------------------------------------------

    /// Add `delta` to each member's cumulative contribution.
    pub fn merge_shapley(&self, node_id: &str, deltas: &HashMap<String, f64>) -> YggResult<()> {
        self.with_conn(|conn| {
            for (member, delta) in deltas {
                conn.execute(
                    "INSERT INTO shapley_attributions (node_id, member, contribution)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (node_id, member)
                     DO UPDATE SET contribution = contribution + excluded.contribution",
                    params![node_id, member, delta],
                )
                .map_err(db_err)?;
            }
            Ok(())
        })
    }

    pub fn shapley_map(&self, node_id: &str) -> YggResult<HashMap<String, f64>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT member, contribution FROM shapley_attributions WHERE node_id=?1")
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![node_id], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
                })
                .map_err(db_err)?;
            let mut map = HashMap::new();
            for row in rows {
                let (member, contribution) = row.map_err(db_err)?;
                map.insert(member, contribution);
            }
            Ok(map)
        })
    }

    // ------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------

    pub fn insert_checkpoint(&self, cp: &Checkpoint) -> YggResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (id, user_id, label, description, state_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    cp.id,
                    cp.user_id,
                    cp.label,
                    cp.description,
                    cp.state_hash,
                    cp.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            for snap in &cp.snapshots {
                conn.execute(
                    "INSERT INTO checkpoint_snapshots
                     (checkpoint_id, node_id, state, branch, confidence, velocity,
                      priority_queue, audit_trail_length)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        cp.id,
                        snap.node_id,
                        snap.state.as_str(),
                        snap.branch.as_str(),
                        snap.confidence,
                        snap.velocity,
                        snap.priority_queue.as_str(),
                        snap.audit_trail_length,
                    ],
                )
                .map_err(db_err)?;
            }
            Ok(())
        })
    }

    pub fn get_checkpoint(&self, id: &str) -> YggResult<Checkpoint> {
        let (id, user_id, label, description, state_hash, created_at) = self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, label, description, state_hash, created_at
                 FROM checkpoints WHERE id=?1",
                params![id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, Option<String>>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| YggError::NotFound(id.to_string()))
        })?;

        let snapshots = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT node_id, state, branch, confidence, velocity, priority_queue,
                            audit_trail_length
                     FROM checkpoint_snapshots WHERE checkpoint_id=?1",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![id], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, u8>(3)?,
                        r.get::<_, f64>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, i64>(6)?,
                    ))
                })
                .map_err(db_err)?;
            let mut snaps = Vec::new();
            for row in rows {
                let (node_id, state, branch, confidence, velocity, queue, trail_len) =
                    row.map_err(db_err)?;
                snaps.push(NodeSnapshot {
                    node_id,
                    state: NodeState::parse(&state).ok_or_else(|| {
                        YggError::PersistenceFailure(format!("unknown state {}", state))
                    })?,
                    branch: Branch::parse(&branch).ok_or_else(|| {
                        YggError::PersistenceFailure(format!("unknown branch {}", branch))
                    })?,
                    confidence,
                    velocity,
                    priority_queue: PriorityQueue::parse(&queue).ok_or_else(|| {
                        YggError::PersistenceFailure(format!("unknown queue {}", queue))
                    })?,
                    audit_trail_length: trail_len as u64,
                });
            }
            Ok(snaps)
        })?;

        let member_node_ids = snapshots.iter().map(|s| s.node_id.clone()).collect();
        Ok(Checkpoint {
            id,
            user_id,
            label,
            description,
            state_hash,
            member_node_ids,
            snapshots,
            created_at: parse_ts(&created_at)?,
        })
    }

    // ------------------------------------------------------------------
    // Alerts & deliberations
    // ------------------------------------------------------------------

    pub fn insert_alert(
        &self,
        id: &str,
        node_id: &str,
        kind: &str,
        severity: &str,
        message: &str,
        created_at: DateTime<Utc>,
    ) -> YggResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO alerts (id, node_id, kind, severity, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, node_id, kind, severity, message, created_at.to_rfc3339()],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn insert_deliberation(&self, d: &CouncilDeliberation) -> YggResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO deliberations (id, request_id, record, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    d.id,
                    d.request_id,
                    serde_json::to_string(d).map_err(json_err)?,
                    d.ts.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn get_deliberation(&self, id: &str) -> YggResult<CouncilDeliberation> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    "SELECT record FROM deliberations WHERE id=?1",
                    params![id],
                    |r| r.get::<_, String>(0),
                )
                .optional()
                .map_err(db_err)?
                .ok_or_else(|| YggError::NotFound(id.to_string()))?;
            serde_json::from_str(&raw).map_err(json_err)
        })
    }
}

fn parse_ts(raw: &str) -> YggResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| YggError::PersistenceFailure(format!("bad timestamp {}: {}", raw, e)))
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<KnowledgeNode> {
    let tags: String = row.get(3)?;
    let branch: String = row.get(4)?;
    let state: String = row.get(5)?;
    let queue: String = row.get(8)?;
    let last_scan: Option<String> = row.get(9)?;
    let next_scan: Option<String> = row.get(10)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;

    let bad = |what: &str| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unparseable {}", what).into(),
        )
    };

    Ok(KnowledgeNode {
        id: row.get(0)?,
        statement: row.get(1)?,
        domain: row.get(2)?,
        tags: serde_json::from_str(&tags).map_err(|_| bad("tags"))?,
        branch: Branch::parse(&branch).ok_or_else(|| bad("branch"))?,
        state: NodeState::parse(&state).ok_or_else(|| bad("state"))?,
        confidence: row.get(6)?,
        velocity: row.get(7)?,
        priority_queue: PriorityQueue::parse(&queue).ok_or_else(|| bad("queue"))?,
        last_scan: match last_scan {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|_| bad("last_scan"))?,
            ),
            None => None,
        },
        next_scan: match next_scan {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|_| bad("next_scan"))?,
            ),
            None => None,
        },
        idle_cycles: row.get(11)?,
        shapley_attribution: HashMap::new(),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| bad("created_at"))?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| bad("updated_at"))?,
    })
}

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<Source> {
    let source_type: String = row.get(1)?;
    let authors: String = row.get(5)?;
    let retrieved_at: String = row.get(7)?;
    let bad = |what: &str| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unparseable {}", what).into(),
        )
    };
    Ok(Source {
        id: row.get(0)?,
        source_type: SourceType::parse(&source_type).ok_or_else(|| bad("source_type"))?,
        identifier: row.get(2)?,
        url: row.get(3)?,
        title: row.get(4)?,
        authors: serde_json::from_str(&authors).map_err(|_| bad("authors"))?,
        trust_score: row.get(6)?,
        retrieved_at: DateTime::parse_from_rfc3339(&retrieved_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| bad("retrieved_at"))?,
    })
}
