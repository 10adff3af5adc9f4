//! Whole-tab removal, expiry sweeps and row counts.

use serde::Serialize;
use tracing::{debug, instrument};

use tabtrace_core::TabId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Rows removed when a tab is closed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabDeletion {
    pub facts: usize,
    pub records: usize,
}

/// Rows currently held in the durable store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub ip_fact_count: usize,
    pub timing_record_count: usize,
    pub total_records: usize,
}

pub struct CleanupRepo {
    db: Database,
}

impl CleanupRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Remove every fact and the timing record of a tab in one transaction.
    #[instrument(skip(self))]
    pub fn delete_tab(&self, tab_id: TabId) -> Result<TabDeletion, StoreError> {
        let deletion = self.db.with_tx(|tx| {
            let facts = tx.execute("DELETE FROM ip_facts WHERE tab_id = ?1", [tab_id.get()])?;
            let records =
                tx.execute("DELETE FROM timing_records WHERE tab_id = ?1", [tab_id.get()])?;
            Ok(TabDeletion { facts, records })
        })?;
        debug!(facts = deletion.facts, records = deletion.records, "tab rows deleted");
        Ok(deletion)
    }

    /// Remove rows captured strictly before `cutoff_ms`. Returns the total
    /// number of rows removed across both tables.
    #[instrument(skip(self))]
    pub fn delete_expired(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
        self.db.with_tx(|tx| {
            let facts = tx.execute("DELETE FROM ip_facts WHERE captured_at < ?1", [cutoff_ms])?;
            let records =
                tx.execute("DELETE FROM timing_records WHERE timestamp < ?1", [cutoff_ms])?;
            Ok(facts + records)
        })
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        self.db.with_conn(|conn| {
            let facts: i64 = conn.query_row("SELECT COUNT(*) FROM ip_facts", [], |row| row.get(0))?;
            let records: i64 =
                conn.query_row("SELECT COUNT(*) FROM timing_records", [], |row| row.get(0))?;
            let ip_fact_count = row_helpers::count(facts);
            let timing_record_count = row_helpers::count(records);
            Ok(StoreStats {
                ip_fact_count,
                timing_record_count,
                total_records: ip_fact_count + timing_record_count,
            })
        })
    }
}
