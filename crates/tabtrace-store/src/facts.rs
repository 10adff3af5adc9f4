use std::collections::HashMap;

use tracing::instrument;

use tabtrace_core::{Fact, TabId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Durable copy of URL -> IP facts, keyed by (tab, url).
pub struct FactRepo {
    db: Database,
}

impl FactRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or overwrite the fact for `(fact.tab_id, fact.url)`.
    #[instrument(skip(self, fact), fields(tab_id = %fact.tab_id, url = %fact.url))]
    pub fn put(&self, fact: &Fact) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ip_facts (tab_id, url, ip, captured_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(tab_id, url) DO UPDATE SET ip = excluded.ip, captured_at = excluded.captured_at",
                rusqlite::params![fact.tab_id.get(), fact.url, fact.ip, fact.captured_at],
            )?;
            Ok(())
        })
    }

    /// All facts for a tab, oldest first.
    #[instrument(skip(self))]
    pub fn list_for_tab(&self, tab_id: TabId) -> Result<Vec<Fact>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT url, ip, captured_at FROM ip_facts WHERE tab_id = ?1 ORDER BY captured_at ASC",
            )?;
            let mut rows = stmt.query([tab_id.get()])?;
            let mut facts = Vec::new();
            while let Some(row) = rows.next()? {
                facts.push(Fact {
                    url: row_helpers::get(row, 0, "ip_facts", "url")?,
                    ip: row_helpers::get(row, 1, "ip_facts", "ip")?,
                    tab_id,
                    captured_at: row_helpers::get(row, 2, "ip_facts", "captured_at")?,
                });
            }
            Ok(facts)
        })
    }

    /// URL -> IP mapping for a tab.
    pub fn map_for_tab(&self, tab_id: TabId) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .list_for_tab(tab_id)?
            .into_iter()
            .map(|fact| (fact.url, fact.ip))
            .collect())
    }

    /// Remove every fact for a tab. Returns the number of rows removed.
    #[instrument(skip(self))]
    pub fn delete_for_tab(&self, tab_id: TabId) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM ip_facts WHERE tab_id = ?1", [tab_id.get()])?;
            Ok(rows)
        })
    }
}
