/// SQL DDL for the tabtrace database.
/// WAL mode enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS timing_records (
    tab_id INTEGER PRIMARY KEY,
    timing TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ip_facts (
    tab_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    ip TEXT NOT NULL,
    captured_at INTEGER NOT NULL,
    PRIMARY KEY (tab_id, url)
);

CREATE INDEX IF NOT EXISTS idx_ip_facts_tab ON ip_facts(tab_id);
CREATE INDEX IF NOT EXISTS idx_ip_facts_captured ON ip_facts(captured_at);
CREATE INDEX IF NOT EXISTS idx_timing_records_timestamp ON timing_records(timestamp);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
