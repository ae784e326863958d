//! Database repository for catalog and token operations.
//!
//! Every operation is bounded by the configured query timeout.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::errors::AppError;
use crate::models::{calculate_metadata, Drone, Filters, Metadata, Permission, Principal};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl Repository {
    pub fn new(pool: SqlitePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Await a database future, failing with `Timeout` once the deadline passes.
    async fn timed<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::error!(
                    "Database operation exceeded {:?} and was cancelled",
                    self.query_timeout
                );
                Err(AppError::Timeout)
            }
        }
    }

    // ==================== DRONE OPERATIONS ====================

    /// Persist a new drone, filling in its id, creation time and version.
    pub async fn insert_drone(&self, drone: &mut Drone) -> Result<(), AppError> {
        let categories_json = categories_to_json(&drone.categories)?;

        let row = self
            .timed(
                sqlx::query(
                    r#"INSERT INTO drones (created_at, title, year, price, categories, version)
                       VALUES (?, ?, ?, ?, ?, 1)
                       RETURNING id, created_at, version"#,
                )
                .bind(Utc::now())
                .bind(&drone.title)
                .bind(drone.year)
                .bind(drone.price)
                .bind(&categories_json)
                .fetch_one(&self.pool),
            )
            .await?;

        drone.id = row.get("id");
        drone.created_at = row.get("created_at");
        drone.version = row.get("version");
        Ok(())
    }

    /// Get a drone by ID.
    pub async fn get_drone(&self, id: i64) -> Result<Drone, AppError> {
        if id < 1 {
            return Err(AppError::NotFound);
        }

        let row = self
            .timed(
                sqlx::query(
                    "SELECT id, created_at, title, year, price, categories, version FROM drones WHERE id = ?",
                )
                .bind(id)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.as_ref().map(drone_from_row).ok_or(AppError::NotFound)
    }

    /// Update a drone with optimistic concurrency control.
    ///
    /// The row is only written if its stored version still equals
    /// `drone.version`; on success `drone.version` holds the new version.
    pub async fn update_drone(&self, drone: &mut Drone) -> Result<(), AppError> {
        let categories_json = categories_to_json(&drone.categories)?;

        let row = self
            .timed(
                sqlx::query(
                    r#"UPDATE drones
                       SET title = ?, year = ?, price = ?, categories = ?, version = version + 1
                       WHERE id = ? AND version = ?
                       RETURNING version"#,
                )
                .bind(&drone.title)
                .bind(drone.year)
                .bind(drone.price)
                .bind(&categories_json)
                .bind(drone.id)
                .bind(drone.version)
                .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => {
                drone.version = row.get("version");
                Ok(())
            }
            None => Err(AppError::EditConflict),
        }
    }

    /// Delete a drone.
    pub async fn delete_drone(&self, id: i64) -> Result<(), AppError> {
        if id < 1 {
            return Err(AppError::NotFound);
        }

        let result = self
            .timed(
                sqlx::query("DELETE FROM drones WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// List drones matching a title query and containing every given category.
    ///
    /// A blank title or an empty category list does not filter.
    pub async fn list_drones(
        &self,
        title: &str,
        categories: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Drone>, Metadata), AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"SELECT count(*) OVER() AS total_records,
                      id, created_at, title, year, price, categories, version
               FROM drones"#,
        );
        push_drone_predicates(&mut qb, title, categories);

        qb.push(format!(
            " ORDER BY {} {}, id ASC",
            filters.sort.column.as_sql(),
            filters.sort.direction.as_sql()
        ));
        qb.push(" LIMIT ")
            .push_bind(filters.limit())
            .push(" OFFSET ")
            .push_bind(filters.offset());

        let rows = self.timed(qb.build().fetch_all(&self.pool)).await?;

        let total_records = match rows.first() {
            Some(row) => row.get::<i64, _>("total_records"),
            // A page past the end has no rows to carry the window count
            None if filters.page > 1 => self.count_drones(title, categories).await?,
            None => 0,
        };
        let drones = rows.iter().map(drone_from_row).collect();
        let metadata = calculate_metadata(total_records, filters.page, filters.page_size);

        Ok((drones, metadata))
    }

    /// Count drones matching the same title and category filters as `list_drones`.
    async fn count_drones(&self, title: &str, categories: &[String]) -> Result<i64, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT count(*) FROM drones");
        push_drone_predicates(&mut qb, title, categories);

        let row = self.timed(qb.build().fetch_one(&self.pool)).await?;
        Ok(row.get::<i64, _>(0))
    }

    // ==================== TOKEN OPERATIONS ====================

    /// Store a bearer token (hashed) with its permissions, replacing any
    /// previous grant for the same token.
    pub async fn insert_token(
        &self,
        plaintext: &str,
        name: &str,
        permissions: &[Permission],
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let hash = hash_token(plaintext);

        self.timed(async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"INSERT INTO tokens (hash, name, expiry) VALUES (?, ?, ?)
                   ON CONFLICT(hash) DO UPDATE SET name = excluded.name, expiry = excluded.expiry"#,
            )
            .bind(&hash)
            .bind(name)
            .bind(expiry)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM tokens_permissions WHERE token_hash = ?")
                .bind(&hash)
                .execute(&mut *tx)
                .await?;

            for permission in permissions {
                sqlx::query("INSERT INTO tokens_permissions (token_hash, code) VALUES (?, ?)")
                    .bind(&hash)
                    .bind(permission.code())
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok::<_, sqlx::Error>(())
        })
        .await
    }

    /// Resolve a bearer token to its principal. Unknown or expired tokens yield `None`.
    pub async fn principal_for_token(&self, plaintext: &str) -> Result<Option<Principal>, AppError> {
        let hash = hash_token(plaintext);

        let row = self
            .timed(
                sqlx::query("SELECT name, expiry FROM tokens WHERE hash = ?")
                    .bind(&hash)
                    .fetch_optional(&self.pool),
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expiry: Option<DateTime<Utc>> = row.get("expiry");
        if expiry.is_some_and(|at| at <= Utc::now()) {
            return Ok(None);
        }

        let codes = self
            .timed(
                sqlx::query("SELECT code FROM tokens_permissions WHERE token_hash = ? ORDER BY code")
                    .bind(&hash)
                    .fetch_all(&self.pool),
            )
            .await?;

        let permissions = codes
            .iter()
            .filter_map(|r| Permission::from_code(&r.get::<String, _>("code")))
            .collect();

        Ok(Some(Principal::Token {
            name: row.get("name"),
            permissions,
        }))
    }
}

/// SHA-256 of a plaintext token; only the hash is ever stored.
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Append the `WHERE` clause shared by listing and counting.
fn push_drone_predicates(qb: &mut QueryBuilder<'_, Sqlite>, title: &str, categories: &[String]) {
    qb.push(" WHERE 1 = 1");

    if let Some(expr) = title_match_expression(title) {
        qb.push(" AND id IN (SELECT rowid FROM drones_fts WHERE drones_fts MATCH ")
            .push_bind(expr)
            .push(")");
    }

    for category in categories {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(drones.categories) WHERE json_each.value = ")
            .push_bind(category.clone())
            .push(")");
    }
}

/// Turn a free-text title query into an FTS5 expression requiring every word.
///
/// Each whitespace separated chunk becomes a quoted phrase, so FTS5 applies
/// its own tokenizer to the query exactly as it did to the indexed titles and
/// operators such as `OR` or `NEAR` are matched literally. Returns `None`
/// when the query has no searchable words.
pub fn title_match_expression(query: &str) -> Option<String> {
    let phrases: Vec<String> = query
        .split_whitespace()
        .filter(|chunk| chunk.chars().any(char::is_alphanumeric))
        .map(|chunk| format!("\"{}\"", chunk.replace('"', "\"\"")))
        .collect();

    if phrases.is_empty() {
        None
    } else {
        Some(phrases.join(" "))
    }
}

// Helper functions for row conversion

fn drone_from_row(row: &sqlx::sqlite::SqliteRow) -> Drone {
    let categories: String = row.get("categories");
    Drone {
        id: row.get("id"),
        created_at: row.get("created_at"),
        title: row.get("title"),
        year: row.get("year"),
        price: row.get("price"),
        categories: parse_json_array(&categories),
        version: row.get("version"),
    }
}

fn categories_to_json(categories: &[String]) -> Result<String, AppError> {
    serde_json::to_string(categories)
        .map_err(|e| AppError::Internal(format!("Failed to encode categories: {}", e)))
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
