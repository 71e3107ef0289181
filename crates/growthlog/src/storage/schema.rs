//! `SQLite` schema definitions for growthlog.

/// SQL statement to create the plant entries table.
///
/// `AUTOINCREMENT` keeps ids monotonic and prevents reuse.
pub const CREATE_ENTRIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS plant_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) > 0),
    photo TEXT,
    date TEXT NOT NULL,
    height REAL NOT NULL CHECK (height >= 0),
    notes TEXT
)
";

/// SQL statement to create an index on date for ordered listing.
pub const CREATE_DATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_plant_entries_date ON plant_entries(date, id)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ENTRIES_TABLE,
    CREATE_DATE_INDEX,
    CREATE_METADATA_TABLE,
];
