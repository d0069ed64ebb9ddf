use assess_core::model::{ItemOutcome, ResultSummary, SessionId, SummaryHeader};
use assess_core::scoring::Score;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{
    id_i64, item_id_from_i64, parse_mode, parse_outcome, parse_reason, ser, session_id_from_str,
    u8_from_i64, u32_from_i64,
};
use crate::repository::{ResultId, ResultRecorder, ResultRepository, ResultRow, StorageError};

const RESULT_COLUMNS: &str = r"
    id, session_id, mode, completion_reason, pass_threshold, started_at, completed_at,
    correct, incorrect, skipped, unanswered, percentage, passed
";

fn conn_err(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

async fn load_items(
    conn: &mut SqliteConnection,
    result_id: ResultId,
) -> Result<Vec<ItemOutcome>, StorageError> {
    let rows = sqlx::query(
        r"
            SELECT item_id, outcome
            FROM session_result_items
            WHERE result_id = ?1
            ORDER BY position ASC
        ",
    )
    .bind(result_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(conn_err)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(ItemOutcome {
            item_id: item_id_from_i64(row.try_get::<i64, _>("item_id").map_err(ser)?)?,
            outcome: parse_outcome(&row.try_get::<String, _>("outcome").map_err(ser)?)?,
        });
    }
    Ok(out)
}

async fn map_result_row(
    conn: &mut SqliteConnection,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ResultRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let header = SummaryHeader {
        session_id: session_id_from_str(&row.try_get::<String, _>("session_id").map_err(ser)?)?,
        mode: parse_mode(&row.try_get::<String, _>("mode").map_err(ser)?)?,
        completion_reason: parse_reason(
            &row.try_get::<String, _>("completion_reason").map_err(ser)?,
        )?,
        pass_threshold: u8_from_i64(
            "pass_threshold",
            row.try_get::<i64, _>("pass_threshold").map_err(ser)?,
        )?,
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    };
    let score = Score {
        correct: u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
        incorrect: u32_from_i64("incorrect", row.try_get::<i64, _>("incorrect").map_err(ser)?)?,
        skipped: u32_from_i64("skipped", row.try_get::<i64, _>("skipped").map_err(ser)?)?,
        unanswered: u32_from_i64(
            "unanswered",
            row.try_get::<i64, _>("unanswered").map_err(ser)?,
        )?,
        percentage: u8_from_i64(
            "percentage",
            row.try_get::<i64, _>("percentage").map_err(ser)?,
        )?,
        passed: row.try_get::<bool, _>("passed").map_err(ser)?,
    };

    let items = load_items(conn, id).await?;
    let summary = ResultSummary::from_persisted(header, score, items).map_err(ser)?;
    Ok(ResultRow::new(id, summary))
}

async fn find_by_session(
    conn: &mut SqliteConnection,
    session_id: SessionId,
) -> Result<Option<ResultRow>, StorageError> {
    let sql = format!("SELECT {RESULT_COLUMNS} FROM session_results WHERE session_id = ?1");
    let row = sqlx::query(&sql)
        .bind(session_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(conn_err)?;

    match row {
        Some(row) => Ok(Some(map_result_row(conn, &row).await?)),
        None => Ok(None),
    }
}

#[async_trait::async_trait]
impl ResultRecorder for SqliteRepository {
    async fn persist(&self, summary: &ResultSummary) -> Result<ResultId, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        if let Some(existing) = find_by_session(&mut *tx, summary.session_id()).await? {
            return if existing.summary == *summary {
                tracing::debug!(session = %summary.session_id(), id = existing.id, "result already stored");
                Ok(existing.id)
            } else {
                Err(StorageError::Conflict)
            };
        }

        let time_spent = i64::try_from(summary.time_spent_secs())
            .map_err(|_| StorageError::Serialization("time_spent_secs overflow".into()))?;

        let res = sqlx::query(
            r"
                INSERT INTO session_results (
                    session_id, mode, completion_reason, pass_threshold, started_at, completed_at,
                    item_count, correct, incorrect, skipped, unanswered, percentage, passed,
                    time_spent_secs
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ",
        )
        .bind(summary.session_id().to_string())
        .bind(summary.mode().as_str())
        .bind(summary.completion_reason().as_str())
        .bind(i64::from(summary.pass_threshold()))
        .bind(summary.started_at())
        .bind(summary.completed_at())
        .bind(i64::from(summary.item_count()))
        .bind(i64::from(summary.correct_count()))
        .bind(i64::from(summary.incorrect_count()))
        .bind(i64::from(summary.skipped_count()))
        .bind(i64::from(summary.unanswered_count()))
        .bind(i64::from(summary.percentage()))
        .bind(summary.passed())
        .bind(time_spent)
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;
        let result_id = res.last_insert_rowid();

        for (position, item) in summary.per_item_outcomes().iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("position overflow".into()))?;
            sqlx::query(
                r"
                    INSERT INTO session_result_items (result_id, position, item_id, outcome)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(result_id)
            .bind(position)
            .bind(id_i64("item_id", item.item_id.value())?)
            .bind(item.outcome.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn_err)?;
        }

        tx.commit().await.map_err(conn_err)?;
        Ok(result_id)
    }
}

#[async_trait::async_trait]
impl ResultRepository for SqliteRepository {
    async fn get_result(&self, session_id: SessionId) -> Result<ResultRow, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(conn_err)?;
        find_by_session(&mut *conn, session_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn list_results(
        &self,
        completed_from: Option<DateTime<Utc>>,
        completed_until: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let mut sql = format!("SELECT {RESULT_COLUMNS} FROM session_results WHERE 1 = 1");

        let mut bind_index = 1;
        if completed_from.is_some() {
            sql.push_str(" AND completed_at >= ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        if completed_until.is_some() {
            sql.push_str(" AND completed_at <= ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        sql.push_str(" ORDER BY completed_at DESC, id DESC");
        sql.push_str(" LIMIT ?");
        sql.push_str(&bind_index.to_string());

        let mut query = sqlx::query(&sql);
        if let Some(from) = completed_from {
            query = query.bind(from);
        }
        if let Some(until) = completed_until {
            query = query.bind(until);
        }
        query = query.bind(i64::from(limit));

        let mut conn = self.pool.acquire().await.map_err(conn_err)?;
        let rows = query.fetch_all(&mut *conn).await.map_err(conn_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_result_row(&mut *conn, &row).await?);
        }
        Ok(out)
    }
}
