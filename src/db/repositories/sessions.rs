use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_status},
    models::{Session, SessionStatus},
};

fn row_to_session(row: &Row) -> Result<Session> {
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let status: String = row.get("status")?;

    Ok(Session {
        id: row.get("id")?,
        title: row.get("title")?,
        status: parse_status(&status)?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, title, status, started_at, ended_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.title,
                    record.status.as_str(),
                    record.started_at.to_rfc3339(),
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn close_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     ended_at = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    SessionStatus::Closed.as_str(),
                    ended_at.to_rfc3339(),
                    ended_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Put a closed session back in the Open state so listening can
    /// continue into it.
    pub async fn reopen_session(
        &self,
        session_id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     ended_at = NULL,
                     updated_at = ?2
                 WHERE id = ?3",
                params![
                    SessionStatus::Open.as_str(),
                    updated_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Title a session if it does not have one yet. Returns whether the
    /// title was applied.
    pub async fn set_session_title_if_empty(
        &self,
        session_id: &str,
        title: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let session_id = session_id.to_string();
        let title = title.to_string();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET title = ?1,
                     updated_at = ?2
                 WHERE id = ?3 AND title IS NULL",
                params![title, updated_at.to_rfc3339(), session_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// The most recent session left open, e.g. by a crash mid-listen.
    pub async fn get_open_session(&self) -> Result<Option<Session>> {
        self.execute(|conn| {
            let session = conn
                .query_row(
                    "SELECT id, title, status, started_at, ended_at, created_at, updated_at
                     FROM sessions
                     WHERE status = 'Open'
                     ORDER BY started_at DESC
                     LIMIT 1",
                    [],
                    |row| {
                        Ok(row_to_session(row))
                    },
                )
                .optional()?;

            session.transpose()
        })
        .await
    }

    pub async fn list_recent_sessions(&self, limit: u32) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, status, started_at, ended_at, created_at, updated_at
                 FROM sessions
                 ORDER BY started_at DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }
}
