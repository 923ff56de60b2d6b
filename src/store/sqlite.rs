//! SQLite implementation of CrmStore.
//!
//! IDs are stored as TEXT (hyphenated UUIDs), timestamps as fixed-width
//! RFC 3339 TEXT so they compare correctly as strings, tags as a JSON array.

use crate::store::models::*;
use crate::store::traits::CrmStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// SQLite-backed CRM store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. Call [`SqliteStore::init_schema`] before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and initialize the schema
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {}", url))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Each connection to `:memory:` is its own database, so keep exactly one alive
        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", url))?;

        let store = Self::new(pool);
        store.init_schema().await?;
        tracing::info!("Database ready at {}", url);
        Ok(store)
    }

    /// Fresh private in-memory database
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    /// Create tables and indexes if they do not exist
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stages (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                color TEXT NOT NULL,
                position INTEGER NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                id_type TEXT,
                id_number TEXT,
                address TEXT,
                company TEXT,
                occupation TEXT,
                birthday TEXT,
                notes TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                total_spent REAL NOT NULL DEFAULT 0,
                visit_count INTEGER NOT NULL DEFAULT 0,
                average_spent REAL NOT NULL DEFAULT 0,
                last_visit TEXT,
                stage_id TEXT REFERENCES stages(id) ON DELETE SET NULL,
                stage_entered_at TEXT,
                churn_risk REAL,
                loyalty_score INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_clients_stage ON clients(stage_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS interactions (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
                type TEXT NOT NULL,
                amount REAL,
                notes TEXT,
                date TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_interactions_client ON interactions(client_id, date)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_interactions_date ON interactions(date)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                client_id TEXT REFERENCES clients(id) ON DELETE SET NULL,
                stage_id TEXT REFERENCES stages(id) ON DELETE SET NULL,
                due_date TEXT,
                priority TEXT NOT NULL DEFAULT 'medium',
                kind TEXT NOT NULL DEFAULT 'manual',
                completed INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS insights (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Column encoding helpers
// ============================================================================

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in database: {}", s))?
        .with_timezone(&Utc))
}

fn get_uuid(row: &SqliteRow, col: &str) -> Result<Uuid> {
    let s: String = row.try_get(col)?;
    Uuid::parse_str(&s).with_context(|| format!("Invalid UUID in column {}: {}", col, s))
}

fn get_opt_uuid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>> {
    let s: Option<String> = row.try_get(col)?;
    s.map(|s| Uuid::parse_str(&s).with_context(|| format!("Invalid UUID in column {}", col)))
        .transpose()
}

fn get_ts(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    let s: String = row.try_get(col)?;
    parse_ts(&s)
}

fn get_opt_ts(row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.try_get(col)?;
    s.as_deref().map(parse_ts).transpose()
}

fn get_enum<T: FromStr<Err = String>>(row: &SqliteRow, col: &str) -> Result<T> {
    let s: String = row.try_get(col)?;
    s.parse().map_err(anyhow::Error::msg)
}

fn client_from_row(row: &SqliteRow) -> Result<Client> {
    let id_type: Option<String> = row.try_get("id_type")?;
    let birthday: Option<String> = row.try_get("birthday")?;
    let tags: String = row.try_get("tags")?;

    Ok(Client {
        id: get_uuid(row, "id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        id_type: id_type
            .map(|s| s.parse::<IdType>().map_err(anyhow::Error::msg))
            .transpose()?,
        id_number: row.try_get("id_number")?,
        address: row.try_get("address")?,
        company: row.try_get("company")?,
        occupation: row.try_get("occupation")?,
        birthday: birthday
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
            .transpose()
            .context("Invalid birthday in database")?,
        notes: row.try_get("notes")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        total_spent: row.try_get("total_spent")?,
        visit_count: row.try_get("visit_count")?,
        average_spent: row.try_get("average_spent")?,
        last_visit: get_opt_ts(row, "last_visit")?,
        stage_id: get_opt_uuid(row, "stage_id")?,
        stage_entered_at: get_opt_ts(row, "stage_entered_at")?,
        churn_risk: row.try_get("churn_risk")?,
        loyalty_score: row.try_get("loyalty_score")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn stage_from_row(row: &SqliteRow) -> Result<Stage> {
    Ok(Stage {
        id: get_uuid(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        color: row.try_get("color")?,
        order: row.try_get("position")?,
        is_default: row.try_get("is_default")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn interaction_from_row(row: &SqliteRow) -> Result<Interaction> {
    Ok(Interaction {
        id: get_uuid(row, "id")?,
        client_id: get_uuid(row, "client_id")?,
        kind: get_enum(row, "type")?,
        amount: row.try_get("amount")?,
        notes: row.try_get("notes")?,
        date: get_ts(row, "date")?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    Ok(Task {
        id: get_uuid(row, "id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        client_id: get_opt_uuid(row, "client_id")?,
        stage_id: get_opt_uuid(row, "stage_id")?,
        due_date: get_opt_ts(row, "due_date")?,
        priority: get_enum(row, "priority")?,
        kind: get_enum(row, "kind")?,
        completed: row.try_get("completed")?,
        completed_at: get_opt_ts(row, "completed_at")?,
        notes: row.try_get("notes")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

/// Task row joined with `client_name`, `stage_name` and `stage_color`
fn task_details_from_row(row: &SqliteRow) -> Result<TaskDetails> {
    let task = task_from_row(row)?;
    let client_name: Option<String> = row.try_get("client_name")?;
    let stage_name: Option<String> = row.try_get("stage_name")?;
    let stage_color: Option<String> = row.try_get("stage_color")?;

    let client = match (task.client_id, client_name) {
        (Some(id), Some(name)) => Some(ClientRef { id, name }),
        _ => None,
    };
    let stage = match (task.stage_id, stage_name) {
        (Some(id), Some(name)) => Some(StageRef {
            id,
            name,
            color: stage_color.unwrap_or_else(|| DEFAULT_STAGE_COLOR.to_string()),
        }),
        _ => None,
    };
    Ok(TaskDetails {
        task,
        client,
        stage,
    })
}

fn insight_from_row(row: &SqliteRow) -> Result<Insight> {
    let content: String = row.try_get("content")?;
    Ok(Insight {
        id: get_uuid(row, "id")?,
        kind: get_enum(row, "type")?,
        content: serde_json::from_str(&content).context("Invalid insight content")?,
        priority: row.try_get("priority")?,
        created_at: get_ts(row, "created_at")?,
    })
}

/// `%term%` with the LIKE wildcards in `term` escaped; pair with `ESCAPE '\'`
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

const TASK_DETAILS_SELECT: &str = "SELECT t.*, c.name AS client_name, s.name AS stage_name, s.color AS stage_color
     FROM tasks t
     LEFT JOIN clients c ON c.id = t.client_id
     LEFT JOIN stages s ON s.id = t.stage_id";

fn client_sort_column(sort: ClientSort) -> &'static str {
    match sort {
        ClientSort::CreatedAt => "created_at",
        ClientSort::Name => "name COLLATE NOCASE",
        ClientSort::TotalSpent => "total_spent",
        ClientSort::LastVisit => "last_visit",
        ClientSort::VisitCount => "visit_count",
    }
}

#[async_trait]
impl CrmStore for SqliteStore {
    async fn health_check(&self) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS ok").fetch_one(&self.pool).await?;
        let ok: i64 = row.try_get("ok")?;
        Ok(ok == 1)
    }

    // ========================================================================
    // Clients
    // ========================================================================

    async fn create_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            "INSERT INTO clients (
                id, name, email, phone, id_type, id_number, address, company, occupation,
                birthday, notes, tags, total_spent, visit_count, average_spent, last_visit,
                stage_id, stage_entered_at, churn_risk, loyalty_score, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(client.id.to_string())
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(client.id_type.map(|t| t.to_string()))
        .bind(&client.id_number)
        .bind(&client.address)
        .bind(&client.company)
        .bind(&client.occupation)
        .bind(client.birthday.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&client.notes)
        .bind(serde_json::to_string(&client.tags)?)
        .bind(client.total_spent)
        .bind(client.visit_count)
        .bind(client.average_spent)
        .bind(client.last_visit.as_ref().map(ts))
        .bind(client.stage_id.map(|id| id.to_string()))
        .bind(client.stage_entered_at.as_ref().map(ts))
        .bind(client.churn_risk)
        .bind(client.loyalty_score)
        .bind(ts(&client.created_at))
        .bind(ts(&client.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_client(&self, id: Uuid) -> Result<Option<Client>> {
        let row = sqlx::query("SELECT * FROM clients WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(client_from_row).transpose()
    }

    async fn get_clients(&self, ids: &[Uuid]) -> Result<Vec<Client>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM clients WHERE id IN ({}) ORDER BY created_at ASC",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(client_from_row).collect()
    }

    async fn list_clients(&self, filter: &ClientFilter) -> Result<(Vec<Client>, usize)> {
        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(search) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            conditions.push(
                "(name LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\' OR phone LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            let pattern = like_pattern(search);
            binds.extend([pattern.clone(), pattern.clone(), pattern]);
        }
        if let Some(stage_id) = filter.stage_id {
            conditions.push("stage_id = ?".to_string());
            binds.push(stage_id.to_string());
        }
        match filter.in_pipeline {
            Some(true) => conditions.push("stage_id IS NOT NULL".to_string()),
            Some(false) => conditions.push("stage_id IS NULL".to_string()),
            None => {}
        }
        if let Some(tags) = filter.tags.as_ref().filter(|t| !t.is_empty()) {
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM json_each(clients.tags) WHERE lower(json_each.value) IN ({}))",
                placeholders(tags.len())
            ));
            binds.extend(tags.iter().map(|t| t.to_lowercase()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS total FROM clients {}", where_clause);
        let mut count_query = sqlx::query(&count_sql);
        for b in &binds {
            count_query = count_query.bind(b.as_str());
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("total")?;

        let sql = format!(
            "SELECT * FROM clients {} ORDER BY {} {} LIMIT {} OFFSET {}",
            where_clause,
            client_sort_column(filter.sort),
            if filter.descending { "DESC" } else { "ASC" },
            filter.limit,
            filter.offset
        );
        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        let clients = rows.iter().map(client_from_row).collect::<Result<Vec<_>>>()?;

        Ok((clients, total as usize))
    }

    async fn all_clients(&self) -> Result<Vec<Client>> {
        let rows = sqlx::query("SELECT * FROM clients ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(client_from_row).collect()
    }

    async fn clients_in_pipeline(&self) -> Result<Vec<Client>> {
        let rows = sqlx::query(
            "SELECT * FROM clients WHERE stage_id IS NOT NULL ORDER BY stage_entered_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(client_from_row).collect()
    }

    async fn top_clients_by_spent(&self, limit: usize) -> Result<Vec<Client>> {
        let rows = sqlx::query("SELECT * FROM clients ORDER BY total_spent DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(client_from_row).collect()
    }

    async fn count_clients_created_since(&self, since: DateTime<Utc>) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM clients WHERE created_at >= ?")
            .bind(ts(&since))
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as usize)
    }

    async fn update_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            "UPDATE clients SET
                name = ?, email = ?, phone = ?, id_type = ?, id_number = ?, address = ?,
                company = ?, occupation = ?, birthday = ?, notes = ?, tags = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(client.id_type.map(|t| t.to_string()))
        .bind(&client.id_number)
        .bind(&client.address)
        .bind(&client.company)
        .bind(&client.occupation)
        .bind(client.birthday.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&client.notes)
        .bind(serde_json::to_string(&client.tags)?)
        .bind(ts(&client.updated_at))
        .bind(client.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_client(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        // Explicit so the result does not depend on the connection's foreign_keys pragma
        sqlx::query("DELETE FROM interactions WHERE client_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE tasks SET client_id = NULL WHERE client_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_client_stage(
        &self,
        id: Uuid,
        stage_id: Option<Uuid>,
        entered_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE clients SET stage_id = ?, stage_entered_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(stage_id.map(|s| s.to_string()))
        .bind(entered_at.as_ref().map(ts))
        .bind(ts(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_client_scores(
        &self,
        id: Uuid,
        churn_risk: f64,
        loyalty_score: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE clients SET churn_risk = ?, loyalty_score = ?, updated_at = ? WHERE id = ?",
        )
        .bind(churn_risk)
        .bind(loyalty_score)
        .bind(ts(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Stages
    // ========================================================================

    async fn list_stages(&self) -> Result<Vec<StageWithCount>> {
        let rows = sqlx::query(
            "SELECT s.*, (SELECT COUNT(*) FROM clients c WHERE c.stage_id = s.id) AS client_count
             FROM stages s
             ORDER BY s.position ASC, s.created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.try_get("client_count")?;
                Ok(StageWithCount {
                    stage: stage_from_row(row)?,
                    client_count: count as usize,
                })
            })
            .collect()
    }

    async fn get_stage(&self, id: Uuid) -> Result<Option<Stage>> {
        let row = sqlx::query("SELECT * FROM stages WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(stage_from_row).transpose()
    }

    async fn find_stage_by_name(&self, name: &str) -> Result<Option<Stage>> {
        let row = sqlx::query("SELECT * FROM stages WHERE name = ?")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(stage_from_row).transpose()
    }

    async fn create_stage(&self, stage: &Stage) -> Result<()> {
        sqlx::query(
            "INSERT INTO stages (id, name, description, color, position, is_default, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stage.id.to_string())
        .bind(&stage.name)
        .bind(&stage.description)
        .bind(&stage.color)
        .bind(stage.order)
        .bind(stage.is_default)
        .bind(ts(&stage.created_at))
        .bind(ts(&stage.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_stage(&self, stage: &Stage) -> Result<()> {
        sqlx::query(
            "UPDATE stages SET name = ?, description = ?, color = ?, position = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&stage.name)
        .bind(&stage.description)
        .bind(&stage.color)
        .bind(stage.order)
        .bind(ts(&stage.updated_at))
        .bind(stage.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_stage(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM stages WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn max_stage_order(&self) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(position) AS max_order FROM stages")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("max_order")?)
    }

    async fn reorder_stages(&self, ids: &[Uuid]) -> Result<()> {
        let now = ts(&Utc::now());
        let mut tx = self.pool.begin().await?;
        for (index, id) in ids.iter().enumerate() {
            sqlx::query("UPDATE stages SET position = ?, updated_at = ? WHERE id = ?")
                .bind(index as i64)
                .bind(&now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count_clients_in_stage(&self, stage_id: Uuid) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM clients WHERE stage_id = ?")
            .bind(stage_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as usize)
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    async fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        let client_id = interaction.client_id.to_string();
        let date = ts(&interaction.date);
        let now = ts(&Utc::now());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO interactions (id, client_id, type, amount, notes, date)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(interaction.id.to_string())
        .bind(&client_id)
        .bind(interaction.kind.to_string())
        .bind(interaction.amount)
        .bind(&interaction.notes)
        .bind(&date)
        .execute(&mut *tx)
        .await?;

        if let Some(amount) = interaction.sale_amount() {
            sqlx::query(
                "UPDATE clients SET
                    total_spent = total_spent + ?,
                    visit_count = visit_count + 1,
                    last_visit = CASE WHEN last_visit IS NULL OR last_visit < ? THEN ? ELSE last_visit END,
                    average_spent = (
                        SELECT COALESCE(AVG(amount), 0) FROM interactions
                        WHERE client_id = ? AND type = 'purchase' AND amount > 0
                    ),
                    updated_at = ?
                 WHERE id = ?",
            )
            .bind(amount)
            .bind(&date)
            .bind(&date)
            .bind(&client_id)
            .bind(&now)
            .bind(&client_id)
            .execute(&mut *tx)
            .await?;
        } else if interaction.kind == InteractionType::Visit {
            sqlx::query(
                "UPDATE clients SET
                    visit_count = visit_count + 1,
                    last_visit = CASE WHEN last_visit IS NULL OR last_visit < ? THEN ? ELSE last_visit END,
                    updated_at = ?
                 WHERE id = ?",
            )
            .bind(&date)
            .bind(&date)
            .bind(&now)
            .bind(&client_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_client_interactions(
        &self,
        client_id: Uuid,
        kind: Option<InteractionType>,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(
                    "SELECT * FROM interactions WHERE client_id = ? AND type = ?
                     ORDER BY date DESC LIMIT ?",
                )
                .bind(client_id.to_string())
                .bind(kind.to_string())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM interactions WHERE client_id = ? ORDER BY date DESC LIMIT ?",
                )
                .bind(client_id.to_string())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(interaction_from_row).collect()
    }

    async fn list_interactions_since(&self, since: DateTime<Utc>) -> Result<Vec<Interaction>> {
        let rows = sqlx::query("SELECT * FROM interactions WHERE date >= ? ORDER BY date ASC")
            .bind(ts(&since))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(interaction_from_row).collect()
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    async fn create_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (
                id, title, description, client_id, stage_id, due_date, priority, kind,
                completed, completed_at, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.client_id.map(|id| id.to_string()))
        .bind(task.stage_id.map(|id| id.to_string()))
        .bind(task.due_date.as_ref().map(ts))
        .bind(task.priority.to_string())
        .bind(task.kind.to_string())
        .bind(task.completed)
        .bind(task.completed_at.as_ref().map(ts))
        .bind(&task.notes)
        .bind(ts(&task.created_at))
        .bind(ts(&task.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn get_task_details(&self, id: Uuid) -> Result<Option<TaskDetails>> {
        let sql = format!("{} WHERE t.id = ?", TASK_DETAILS_SELECT);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_details_from_row).transpose()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskDetails>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(client_id) = filter.client_id {
            conditions.push("t.client_id = ?");
            binds.push(client_id.to_string());
        }
        if let Some(stage_id) = filter.stage_id {
            conditions.push("t.stage_id = ?");
            binds.push(stage_id.to_string());
        }
        match filter.completed {
            Some(true) => conditions.push("t.completed = 1"),
            Some(false) => conditions.push("t.completed = 0"),
            None => {}
        }
        match filter.scope {
            Some(TaskScope::Client) => conditions.push("t.client_id IS NOT NULL"),
            Some(TaskScope::Template) => conditions.push("t.client_id IS NULL"),
            None => {}
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "{} {} ORDER BY
                t.completed ASC,
                CASE t.priority WHEN 'urgent' THEN 4 WHEN 'high' THEN 3 WHEN 'medium' THEN 2 ELSE 1 END DESC,
                t.due_date IS NULL ASC,
                t.due_date ASC,
                t.created_at DESC",
            TASK_DETAILS_SELECT, where_clause
        );
        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(task_details_from_row).collect()
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET
                title = ?, description = ?, client_id = ?, stage_id = ?, due_date = ?,
                priority = ?, kind = ?, completed = ?, completed_at = ?, notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.client_id.map(|id| id.to_string()))
        .bind(task.stage_id.map(|id| id.to_string()))
        .bind(task.due_date.as_ref().map(ts))
        .bind(task.priority.to_string())
        .bind(task.kind.to_string())
        .bind(task.completed)
        .bind(task.completed_at.as_ref().map(ts))
        .bind(&task.notes)
        .bind(ts(&task.updated_at))
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_tasks_completed(
        &self,
        ids: &[Uuid],
        completed: bool,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE tasks SET completed = ?, completed_at = ?, notes = COALESCE(?, notes), updated_at = ?
             WHERE id IN ({})",
            placeholders(ids.len())
        );
        let completed_at = completed.then(|| ts(&at));
        let mut query = sqlx::query(&sql)
            .bind(completed)
            .bind(completed_at)
            .bind(notes)
            .bind(ts(&at));
        for id in ids {
            query = query.bind(id.to_string());
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    // ========================================================================
    // Insights
    // ========================================================================

    async fn save_insight(&self, insight: &Insight) -> Result<()> {
        sqlx::query(
            "INSERT INTO insights (id, type, content, priority, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(insight.id.to_string())
        .bind(insight.kind.to_string())
        .bind(serde_json::to_string(&insight.content)?)
        .bind(insight.priority)
        .bind(ts(&insight.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_insights(
        &self,
        kind: Option<InsightType>,
        limit: usize,
    ) -> Result<Vec<Insight>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(
                    "SELECT * FROM insights WHERE type = ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(kind.to_string())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM insights ORDER BY created_at DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(insight_from_row).collect()
    }
}
