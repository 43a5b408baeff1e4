//! SQL schema for the LifeOS SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per document of every collection. The body is the full field map;
-- owner_id mirrors its userId so owner queries can use the index.
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT NOT NULL,
    doc_id      TEXT NOT NULL,
    owner_id    TEXT,              -- NULL for documents without an owner
    body_json   TEXT NOT NULL,
    PRIMARY KEY (collection, doc_id)
);

CREATE INDEX IF NOT EXISTS documents_owner_idx ON documents(collection, owner_id);

CREATE TABLE IF NOT EXISTS users (
    user_id       TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,   -- trimmed, lowercased
    display_name  TEXT NOT NULL,
    password_hash TEXT NOT NULL,          -- argon2 PHC string
    created_at    TEXT NOT NULL
);

PRAGMA user_version = 1;
";
