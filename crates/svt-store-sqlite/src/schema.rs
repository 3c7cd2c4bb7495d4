//! SQL schema for the SVT state store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- String items, one row per key (the local-storage namespace).
CREATE TABLE IF NOT EXISTS items (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL    -- ISO 8601 UTC
);

-- Cookie jar. expires_at NULL means the cookie lives until removed.
CREATE TABLE IF NOT EXISTS cookies (
    name        TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    expires_at  TEXT
);

PRAGMA user_version = 1;
";
