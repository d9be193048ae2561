//! # SQLite Provider Statements
//!
//! SQL strings the SQLite provider runs around a question's statement: the
//! read transaction, and the queries that read the store's own layout.

/// Opens the transaction every question's statement runs in. It is always
/// closed with [`ROLLBACK_SQL`], so nothing a statement does outlives the call.
pub const BEGIN_READ_SQL: &str = "BEGIN TRANSACTION";

pub const ROLLBACK_SQL: &str = "ROLLBACK";

/// Lists user tables, skipping SQLite's internal ones.
pub const LIST_TABLES_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name;";

/// Columns of a table: `cid, name, type, notnull, dflt_value, pk`.
pub fn table_info(table: &str) -> String {
    format!("PRAGMA table_info(\"{}\");", table.replace('"', "\"\""))
}

/// Foreign keys of a table: `id, seq, table, from, to, on_update, on_delete, match`.
pub fn foreign_key_list(table: &str) -> String {
    format!("PRAGMA foreign_key_list(\"{}\");", table.replace('"', "\"\""))
}
