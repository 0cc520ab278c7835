use anyhow::Result;
use rusqlite::params;

use crate::db::{
    connection::Database,
    helpers::parse_datetime,
    models::StoredSegment,
};

impl Database {
    pub async fn insert_segment(&self, segment: &StoredSegment) -> Result<()> {
        let record = segment.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO transcript_segments (session_id, seq, captured_at, text)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.session_id,
                    record.seq,
                    record.captured_at.to_rfc3339(),
                    record.text,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_segments_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<StoredSegment>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, seq, captured_at, text
                 FROM transcript_segments
                 WHERE session_id = ?1
                 ORDER BY seq ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut segments = Vec::new();
            while let Some(row) = rows.next()? {
                let captured_at: String = row.get("captured_at")?;
                segments.push(StoredSegment {
                    session_id: row.get("session_id")?,
                    seq: row.get("seq")?,
                    captured_at: parse_datetime(&captured_at, "captured_at")?,
                    text: row.get("text")?,
                });
            }

            Ok(segments)
        })
        .await
    }

    pub async fn delete_segments_for_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM transcript_segments WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
    }
}
