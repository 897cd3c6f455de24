//! PostgreSQL storage implementation.
//!
//! The production backend. The closure relation lives in a `node_closure`
//! table maintained inside the same transaction as every structural
//! mutation, and the candidate query is a single closure-join regardless
//! of batch size.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{QueryBuilder, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use lifeline_domain::model::{Action, DetailLevel, Node, Policy, Subject};
use lifeline_domain::resolver::PolicyCandidate;

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    validate_policy_set, ClosureEdge, HierarchyStore, MembershipIndex, NewNode, PolicyStore,
};

/// Default query timeout in seconds.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// PostgreSQL configuration options.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum time to wait for a query before it is cancelled and
    /// `StorageError::QueryTimeout` is returned.
    pub query_timeout_secs: u64,
}

// Custom Debug implementation to hide credentials in database_url
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .finish()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/lifeline".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

/// Parses a database row into a Node.
fn row_to_node(row: &PgRow) -> Node {
    Node {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        owner_id: row.get("owner_id"),
        node_type: row.get("node_type"),
        metadata: row.get("meta"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Parses a database row into a Policy, decoding the enum columns.
fn row_to_policy(row: &PgRow) -> StorageResult<Policy> {
    let level: String = row.get("level");
    let action: String = row.get("action");
    let effect: String = row.get("effect");
    let subject_type: String = row.get("subject_type");
    let subject_id: Option<i64> = row.get("subject_id");

    let parse = |message: String| StorageError::SerializationError { message };
    Ok(Policy {
        id: row.get("id"),
        node_id: row.get("node_id"),
        level: level.parse::<DetailLevel>().map_err(parse)?,
        action: action.parse::<Action>().map_err(parse)?,
        subject: Subject::from_parts(&subject_type, subject_id).map_err(parse)?,
        effect: effect.parse().map_err(parse)?,
        granted_by: row.get("granted_by"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

fn query_err(e: sqlx::Error) -> StorageError {
    StorageError::QueryError {
        message: e.to_string(),
    }
}

/// The level names whose recorded grants satisfy a request at `level`.
/// A `Full` grant satisfies an `Overview` request, never the converse.
fn satisfying_level_names(level: DetailLevel) -> Vec<String> {
    [DetailLevel::Overview, DetailLevel::Full]
        .into_iter()
        .filter(|recorded| recorded.satisfies(level))
        .map(|recorded| recorded.as_str().to_string())
        .collect()
}

/// PostgreSQL implementation of all three store traits.
pub struct PostgresBackend {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresBackend {
    /// Creates a backend from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }

    /// Creates a backend from configuration, establishing the pool.
    pub async fn from_config(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: e.to_string(),
            })?;
        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        })
    }

    /// Wraps an async operation with the query timeout and records
    /// duration/timeout metrics.
    async fn execute_with_timeout<T, F>(&self, operation: &str, future: F) -> StorageResult<T>
    where
        F: std::future::Future<Output = StorageResult<T>>,
    {
        let start = std::time::Instant::now();
        let result = tokio::time::timeout(self.query_timeout, future).await;
        let duration = start.elapsed().as_secs_f64();

        let (status, final_result) = match result {
            Ok(Ok(value)) => ("success", Ok(value)),
            Ok(Err(e)) => ("error", Err(e)),
            Err(_elapsed) => (
                "timeout",
                Err(StorageError::QueryTimeout {
                    operation: operation.to_string(),
                    timeout: self.query_timeout,
                }),
            ),
        };

        metrics::histogram!(
            "lifeline_storage_query_duration_seconds",
            "operation" => operation.to_string(),
            "backend" => "postgres",
            "status" => status.to_string()
        )
        .record(duration);

        if status == "timeout" {
            metrics::counter!(
                "lifeline_storage_query_timeout_total",
                "operation" => operation.to_string(),
                "backend" => "postgres"
            )
            .increment(1);
        }

        final_result
    }

    /// Runs database migrations to create required tables.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id UUID PRIMARY KEY,
                parent_id UUID REFERENCES nodes(id) ON DELETE CASCADE,
                owner_id BIGINT NOT NULL,
                node_type VARCHAR(64) NOT NULL,
                meta JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node_closure (
                ancestor_id UUID NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                descendant_id UUID NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                depth INTEGER NOT NULL,
                PRIMARY KEY (ancestor_id, descendant_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_node_closure_descendant \
             ON node_closure (descendant_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node_policies (
                id UUID PRIMARY KEY,
                node_id UUID NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                level VARCHAR(16) NOT NULL,
                action VARCHAR(16) NOT NULL,
                subject_type VARCHAR(16) NOT NULL,
                subject_id BIGINT,
                effect VARCHAR(8) NOT NULL,
                granted_by BIGINT NOT NULL,
                expires_at TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_node_policies_node \
             ON node_policies (node_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS org_members (
                org_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                PRIMARY KEY (org_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    /// Seeds an organization membership. The membership table is owned by
    /// the surrounding application; this is its write path for tests and
    /// embedded deployments.
    pub async fn add_member(&self, org_id: i64, user_id: i64) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO org_members (org_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(org_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    /// Removes an organization membership.
    pub async fn remove_member(&self, org_id: i64, user_id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM org_members WHERE org_id = $1 AND user_id = $2")
            .bind(org_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

#[async_trait]
impl HierarchyStore for PostgresBackend {
    #[instrument(skip(self, new), fields(owner = new.owner_id))]
    async fn create_node(&self, new: NewNode) -> StorageResult<Node> {
        self.execute_with_timeout("create_node", async {
            let id = new.id.unwrap_or_else(Uuid::new_v4);
            let now = Utc::now();

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StorageError::TransactionError {
                    message: format!("Failed to begin transaction: {e}"),
                })?;

            if let Some(parent_id) = new.parent_id {
                let parent = sqlx::query("SELECT 1 FROM nodes WHERE id = $1 FOR SHARE")
                    .bind(parent_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_err)?;
                if parent.is_none() {
                    return Err(StorageError::NodeNotFound { node_id: parent_id });
                }
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO nodes (id, parent_id, owner_id, node_type, meta, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $6)
                "#,
            )
            .bind(id)
            .bind(new.parent_id)
            .bind(new.owner_id)
            .bind(&new.node_type)
            .bind(&new.metadata)
            .bind(now)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return Err(StorageError::NodeExists { node_id: id });
                    }
                }
                return Err(query_err(e));
            }

            // Reflexive row plus one row per ancestor of the parent.
            sqlx::query(
                "INSERT INTO node_closure (ancestor_id, descendant_id, depth) VALUES ($1, $1, 0)",
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

            if let Some(parent_id) = new.parent_id {
                sqlx::query(
                    r#"
                    INSERT INTO node_closure (ancestor_id, descendant_id, depth)
                    SELECT ancestor_id, $1, depth + 1
                    FROM node_closure
                    WHERE descendant_id = $2
                    "#,
                )
                .bind(id)
                .bind(parent_id)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
            }

            tx.commit()
                .await
                .map_err(|e| StorageError::TransactionError {
                    message: format!("Failed to commit transaction: {e}"),
                })?;

            Ok(Node {
                id,
                parent_id: new.parent_id,
                owner_id: new.owner_id,
                node_type: new.node_type,
                metadata: new.metadata,
                created_at: now,
                updated_at: now,
            })
        })
        .await
    }

    async fn get_node(&self, id: Uuid) -> StorageResult<Option<Node>> {
        self.execute_with_timeout("get_node", async {
            let row = sqlx::query("SELECT * FROM nodes WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_err)?;
            Ok(row.map(|r| row_to_node(&r)))
        })
        .await
    }

    async fn get_nodes(&self, ids: &[Uuid]) -> StorageResult<Vec<Node>> {
        self.execute_with_timeout("get_nodes", async {
            let rows = sqlx::query("SELECT * FROM nodes WHERE id = ANY($1)")
                .bind(ids.to_vec())
                .fetch_all(&self.pool)
                .await
                .map_err(query_err)?;
            Ok(rows.iter().map(row_to_node).collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn move_node(&self, id: Uuid, new_parent: Option<Uuid>) -> StorageResult<()> {
        self.execute_with_timeout("move_node", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StorageError::TransactionError {
                    message: format!("Failed to begin transaction: {e}"),
                })?;

            // FOR UPDATE keeps a concurrent move of the same node from
            // interleaving with the closure rewrite.
            let node = sqlx::query("SELECT 1 FROM nodes WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_err)?;
            if node.is_none() {
                return Err(StorageError::NodeNotFound { node_id: id });
            }

            if let Some(parent_id) = new_parent {
                let parent = sqlx::query("SELECT 1 FROM nodes WHERE id = $1 FOR SHARE")
                    .bind(parent_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_err)?;
                if parent.is_none() {
                    return Err(StorageError::NodeNotFound { node_id: parent_id });
                }

                let cycle: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM node_closure \
                     WHERE ancestor_id = $1 AND descendant_id = $2)",
                )
                .bind(id)
                .bind(parent_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(query_err)?;
                if cycle {
                    return Err(StorageError::WouldCreateCycle {
                        node_id: id,
                        new_parent: parent_id,
                    });
                }
            }

            // Drop every row pairing a subtree node with an outside
            // ancestor; rows internal to the subtree survive.
            sqlx::query(
                r#"
                DELETE FROM node_closure
                WHERE descendant_id IN
                      (SELECT descendant_id FROM node_closure WHERE ancestor_id = $1)
                  AND ancestor_id NOT IN
                      (SELECT descendant_id FROM node_closure WHERE ancestor_id = $1)
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

            if let Some(parent_id) = new_parent {
                sqlx::query(
                    r#"
                    INSERT INTO node_closure (ancestor_id, descendant_id, depth)
                    SELECT supertree.ancestor_id,
                           subtree.descendant_id,
                           supertree.depth + subtree.depth + 1
                    FROM node_closure AS supertree
                    CROSS JOIN node_closure AS subtree
                    WHERE subtree.ancestor_id = $1
                      AND supertree.descendant_id = $2
                    "#,
                )
                .bind(id)
                .bind(parent_id)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
            }

            sqlx::query("UPDATE nodes SET parent_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(new_parent)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;

            tx.commit()
                .await
                .map_err(|e| StorageError::TransactionError {
                    message: format!("Failed to commit transaction: {e}"),
                })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_node(&self, id: Uuid) -> StorageResult<()> {
        self.execute_with_timeout("delete_node", async {
            // Closure rows and policies go with the nodes via ON DELETE
            // CASCADE.
            let result = sqlx::query(
                "DELETE FROM nodes WHERE id IN \
                 (SELECT descendant_id FROM node_closure WHERE ancestor_id = $1)",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_err)?;

            if result.rows_affected() == 0 {
                return Err(StorageError::NodeNotFound { node_id: id });
            }
            Ok(())
        })
        .await
    }

    async fn ancestors(&self, id: Uuid) -> StorageResult<Vec<ClosureEdge>> {
        self.execute_with_timeout("ancestors", async {
            let rows = sqlx::query(
                "SELECT ancestor_id, descendant_id, depth FROM node_closure \
                 WHERE descendant_id = $1 ORDER BY depth",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;

            // Every node has at least its reflexive row.
            if rows.is_empty() {
                return Err(StorageError::NodeNotFound { node_id: id });
            }

            Ok(rows
                .iter()
                .map(|row| {
                    let depth: i32 = row.get("depth");
                    ClosureEdge {
                        ancestor_id: row.get("ancestor_id"),
                        descendant_id: row.get("descendant_id"),
                        depth: depth as u32,
                    }
                })
                .collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn rebuild_closure(&self) -> StorageResult<()> {
        self.execute_with_timeout("rebuild_closure", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StorageError::TransactionError {
                    message: format!("Failed to begin transaction: {e}"),
                })?;

            sqlx::query("DELETE FROM node_closure")
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;

            sqlx::query(
                r#"
                INSERT INTO node_closure (ancestor_id, descendant_id, depth)
                WITH RECURSIVE chain (ancestor_id, descendant_id, depth) AS (
                    SELECT id, id, 0 FROM nodes
                    UNION ALL
                    SELECT chain.ancestor_id, n.id, chain.depth + 1
                    FROM chain
                    JOIN nodes n ON n.parent_id = chain.descendant_id
                )
                SELECT ancestor_id, descendant_id, depth FROM chain
                "#,
            )
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

            tx.commit()
                .await
                .map_err(|e| StorageError::TransactionError {
                    message: format!("Failed to commit transaction: {e}"),
                })
        })
        .await
    }
}

#[async_trait]
impl PolicyStore for PostgresBackend {
    #[instrument(skip(self, policies), fields(%node_id, count = policies.len()))]
    async fn replace_policies(&self, node_id: Uuid, policies: Vec<Policy>) -> StorageResult<()> {
        validate_policy_set(node_id, &policies)?;

        self.execute_with_timeout("replace_policies", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StorageError::TransactionError {
                    message: format!("Failed to begin transaction: {e}"),
                })?;

            let node = sqlx::query("SELECT 1 FROM nodes WHERE id = $1 FOR SHARE")
                .bind(node_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_err)?;
            if node.is_none() {
                return Err(StorageError::NodeNotFound { node_id });
            }

            // Delete-then-insert inside one transaction: a concurrent
            // reader sees the old set or the new set, never the gap.
            sqlx::query("DELETE FROM node_policies WHERE node_id = $1")
                .bind(node_id)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;

            if !policies.is_empty() {
                let ids: Vec<Uuid> = policies.iter().map(|p| p.id).collect();
                let levels: Vec<String> =
                    policies.iter().map(|p| p.level.as_str().to_string()).collect();
                let actions: Vec<String> =
                    policies.iter().map(|p| p.action.as_str().to_string()).collect();
                let subject_types: Vec<String> = policies
                    .iter()
                    .map(|p| p.subject.kind_str().to_string())
                    .collect();
                let subject_ids: Vec<Option<i64>> =
                    policies.iter().map(|p| p.subject.id()).collect();
                let effects: Vec<String> =
                    policies.iter().map(|p| p.effect.as_str().to_string()).collect();
                let granted_bys: Vec<i64> = policies.iter().map(|p| p.granted_by).collect();
                let expires_ats: Vec<Option<DateTime<Utc>>> =
                    policies.iter().map(|p| p.expires_at).collect();
                let created_ats: Vec<DateTime<Utc>> =
                    policies.iter().map(|p| p.created_at).collect();

                sqlx::query(
                    r#"
                    INSERT INTO node_policies
                        (id, node_id, level, action, subject_type, subject_id,
                         effect, granted_by, expires_at, created_at, updated_at)
                    SELECT t.id, $1, t.level, t.action, t.subject_type, t.subject_id,
                           t.effect, t.granted_by, t.expires_at, t.created_at, t.created_at
                    FROM UNNEST($2::uuid[], $3::text[], $4::text[], $5::text[], $6::int8[],
                                $7::text[], $8::int8[], $9::timestamptz[], $10::timestamptz[])
                        AS t(id, level, action, subject_type, subject_id,
                             effect, granted_by, expires_at, created_at)
                    "#,
                )
                .bind(node_id)
                .bind(ids)
                .bind(levels)
                .bind(actions)
                .bind(subject_types)
                .bind(subject_ids)
                .bind(effects)
                .bind(granted_bys)
                .bind(expires_ats)
                .bind(created_ats)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
            }

            tx.commit()
                .await
                .map_err(|e| StorageError::TransactionError {
                    message: format!("Failed to commit transaction: {e}"),
                })
        })
        .await
    }

    async fn policies_for_node(&self, node_id: Uuid) -> StorageResult<Vec<Policy>> {
        self.execute_with_timeout("policies_for_node", async {
            let rows = sqlx::query(
                "SELECT * FROM node_policies WHERE node_id = $1 \
                 ORDER BY created_at DESC, id DESC",
            )
            .bind(node_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;
            rows.iter().map(row_to_policy).collect()
        })
        .await
    }

    async fn candidate_policies(
        &self,
        targets: &[Uuid],
        subjects: &[Subject],
        action: Action,
        level: DetailLevel,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<PolicyCandidate>> {
        if targets.is_empty() || subjects.is_empty() {
            return Ok(Vec::new());
        }

        let mut has_public = false;
        let mut user_ids: Vec<i64> = Vec::new();
        let mut org_ids: Vec<i64> = Vec::new();
        for subject in subjects {
            match subject {
                Subject::Public => has_public = true,
                Subject::User(id) => user_ids.push(*id),
                Subject::Organization(id) => org_ids.push(*id),
            }
        }

        self.execute_with_timeout("candidate_policies", async {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                "SELECT c.descendant_id AS target_id, c.depth AS distance, \
                        p.id, p.node_id, p.level, p.action, p.subject_type, p.subject_id, \
                        p.effect, p.granted_by, p.expires_at, p.created_at \
                 FROM node_closure c \
                 JOIN node_policies p ON p.node_id = c.ancestor_id \
                 WHERE c.descendant_id = ANY(",
            );
            builder.push_bind(targets.to_vec());
            builder.push(") AND p.action = ");
            builder.push_bind(action.as_str().to_string());
            builder.push(" AND p.level = ANY(");
            builder.push_bind(satisfying_level_names(level));
            builder.push(") AND (p.expires_at IS NULL OR p.expires_at > ");
            builder.push_bind(now);
            builder.push(") AND (");

            let mut need_or = false;
            if has_public {
                builder.push("p.subject_type = 'public'");
                need_or = true;
            }
            if !user_ids.is_empty() {
                if need_or {
                    builder.push(" OR ");
                }
                builder.push("(p.subject_type = 'user' AND p.subject_id = ANY(");
                builder.push_bind(user_ids);
                builder.push("))");
                need_or = true;
            }
            if !org_ids.is_empty() {
                if need_or {
                    builder.push(" OR ");
                }
                builder.push("(p.subject_type = 'organization' AND p.subject_id = ANY(");
                builder.push_bind(org_ids);
                builder.push("))");
            }
            builder.push(")");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(query_err)?;

            rows.iter()
                .map(|row| {
                    let distance: i32 = row.get("distance");
                    Ok(PolicyCandidate::new(
                        row.get("target_id"),
                        distance as u32,
                        row_to_policy(row)?,
                    ))
                })
                .collect()
        })
        .await
    }
}

#[async_trait]
impl MembershipIndex for PostgresBackend {
    async fn is_member(&self, user_id: i64, org_id: i64) -> StorageResult<bool> {
        self.execute_with_timeout("is_member", async {
            sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM org_members WHERE user_id = $1 AND org_id = $2)",
            )
            .bind(user_id)
            .bind(org_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)
        })
        .await
    }

    async fn organizations_for(&self, user_id: i64) -> StorageResult<Vec<i64>> {
        self.execute_with_timeout("organizations_for", async {
            sqlx::query_scalar("SELECT org_id FROM org_members WHERE user_id = $1 ORDER BY org_id")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(query_err)
        })
        .await
    }
}
