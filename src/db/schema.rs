pub const SCHEMA: &str = r#"
-- Targets: organizations tracked on the board
CREATE TABLE IF NOT EXISTS targets (
    organization TEXT PRIMARY KEY,
    address TEXT,
    phone TEXT,
    website TEXT,
    population INTEGER CHECK (population IS NULL OR population >= 0),
    median_income REAL,
    status TEXT DEFAULT 'not-contacted',
    latitude REAL,
    longitude REAL,
    region TEXT,               -- joins zip_data.zip_code
    last_updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_targets_status ON targets(status);
CREATE INDEX IF NOT EXISTS idx_targets_region ON targets(region);

-- ZIP demographics and precomputed geo-clusters
CREATE TABLE IF NOT EXISTS zip_data (
    zip_code TEXT PRIMARY KEY,
    geographic_area TEXT,
    households INTEGER,
    total_pop INTEGER,
    median_income REAL,
    grade TEXT,
    latitude REAL,
    longitude REAL,

    -- Cluster label per grade set and radius, NULL when not clustered
    cluster_a_5mi TEXT,
    cluster_a_10mi TEXT,
    cluster_ab_5mi TEXT,
    cluster_ab_10mi TEXT,
    cluster_abc_5mi TEXT,
    cluster_abc_10mi TEXT,
    cluster_bc_5mi TEXT,
    cluster_bc_10mi TEXT
);

-- Free-text notes per target
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id TEXT NOT NULL,   -- targets.organization, not enforced
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL    -- local time, YYYY-MM-DD HH:MM:SS
);

CREATE INDEX IF NOT EXISTS idx_notes_target ON notes(target_id);

-- Status transitions, append-only
CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization TEXT NOT NULL,
    old_status TEXT,
    new_status TEXT NOT NULL,
    timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_activity_log_timestamp ON activity_log(timestamp);
"#;

/// Column additions for databases created before the column existed.
/// Each statement fails harmlessly when the column is already present.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE targets ADD COLUMN last_updated TIMESTAMP",
    "ALTER TABLE targets ADD COLUMN region TEXT",
];
