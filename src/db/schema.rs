pub const SCHEMA: &str = r#"
-- Files table: one row per tracked file
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    size_bytes INTEGER NOT NULL,
    modified_at TEXT,

    -- Image metadata
    width INTEGER,
    height INTEGER,
    taken_at TEXT,
    camera TEXT,
    format TEXT,

    -- Set when the path vanished from disk; rows are never deleted
    missing INTEGER NOT NULL DEFAULT 0,

    scanned_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_files_missing ON files(missing);

-- Fingerprints: one row per analyzed file, nullable hash columns
CREATE TABLE IF NOT EXISTS fingerprints (
    file_id INTEGER PRIMARY KEY,
    fast_hash TEXT NOT NULL,
    sha256 TEXT,
    phash_mean BLOB,
    phash_gradient BLOB,
    phash_dct BLOB,
    signature BLOB,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_fingerprints_fast_hash ON fingerprints(fast_hash);

-- Duplicate groups: rebuilt wholesale on every grouping pass
CREATE TABLE IF NOT EXISTS duplicate_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tier TEXT NOT NULL,              -- 'exact' or 'near'
    original_id INTEGER NOT NULL,
    confidence REAL NOT NULL,
    hash_kind TEXT,                  -- near tier: matched perceptual hash kind
    distance INTEGER,                -- near tier: largest observed distance
    dimension_tolerance REAL,        -- near tier: tolerance in effect
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (original_id) REFERENCES files(id)
);

-- Group membership with per-member role
CREATE TABLE IF NOT EXISTS group_members (
    group_id INTEGER NOT NULL,
    file_id INTEGER NOT NULL,
    role TEXT NOT NULL,              -- 'original', 'duplicate', 'safe_duplicate'
    PRIMARY KEY (group_id, file_id),
    FOREIGN KEY (group_id) REFERENCES duplicate_groups(id) ON DELETE CASCADE,
    FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_group_members_file ON group_members(file_id);

-- Manual overrides: survive group rebuilds, deactivated rather than deleted
CREATE TABLE IF NOT EXISTS overrides (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    preferred_id INTEGER NOT NULL,
    auto_id INTEGER NOT NULL,
    scope TEXT NOT NULL,             -- 'single_group' or 'default_rule'
    reason TEXT NOT NULL,
    notes TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Correctness invariant: at most one active override per group
CREATE UNIQUE INDEX IF NOT EXISTS idx_overrides_one_active
    ON overrides(group_id) WHERE active = 1;

-- Conflict log: divergence between manual and automatic selection
CREATE TABLE IF NOT EXISTS conflicts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    auto_id INTEGER NOT NULL,
    manual_id INTEGER NOT NULL,
    kind TEXT NOT NULL,              -- 'diverges_from_automatic' or 'preferred_file_missing'
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Idempotent migrations for databases created by older versions. Each
/// statement is run with errors ignored (column may already exist).
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE files ADD COLUMN camera TEXT",
    "ALTER TABLE overrides ADD COLUMN notes TEXT",
    "ALTER TABLE fingerprints ADD COLUMN signature BLOB",
];
