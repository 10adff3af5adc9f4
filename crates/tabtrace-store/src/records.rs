use rusqlite::OptionalExtension;
use tracing::instrument;

use tabtrace_core::{TabId, TimingRecord};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// One timing record per tab; a new page load overwrites the previous one.
pub struct TimingRecordRepo {
    db: Database,
}

impl TimingRecordRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or overwrite the record for `record.tab_id`.
    #[instrument(skip(self, record), fields(tab_id = %record.tab_id))]
    pub fn put(&self, record: &TimingRecord) -> Result<(), StoreError> {
        let timing = serde_json::to_string(&record.timing)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO timing_records (tab_id, timing, timestamp) VALUES (?1, ?2, ?3)
                 ON CONFLICT(tab_id) DO UPDATE SET timing = excluded.timing, timestamp = excluded.timestamp",
                rusqlite::params![record.tab_id.get(), timing, record.timestamp],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, tab_id: TabId) -> Result<Option<TimingRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT timing, timestamp FROM timing_records WHERE tab_id = ?1",
                    [tab_id.get()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            let Some((raw, timestamp)) = row else {
                return Ok(None);
            };
            let timing = row_helpers::parse_json(&raw, "timing_records", "timing")?;
            Ok(Some(TimingRecord {
                tab_id,
                timing,
                timestamp,
            }))
        })
    }

    /// Remove the record for a tab. Returns whether a row existed.
    #[instrument(skip(self))]
    pub fn delete(&self, tab_id: TabId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM timing_records WHERE tab_id = ?1", [tab_id.get()])?;
            Ok(rows > 0)
        })
    }
}
