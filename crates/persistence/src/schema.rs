//! Database schema definitions

/// SQL to create all tables
/// NOTE: timestamps are stored as epoch seconds (INTEGER), money/scores as REAL
pub const CREATE_TABLES: &str = r#"
-- Users and their rating ledger.
-- legacy_rating is the pre-ledger numeric rating, folded into the structured
-- ledger by the versioned startup migration and cleared afterwards.
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    total_rating REAL NOT NULL DEFAULT 0,
    avg_score REAL NOT NULL DEFAULT 0,
    legacy_rating REAL,
    ledger_total REAL NOT NULL DEFAULT 0,
    from_predictions REAL NOT NULL DEFAULT 0,
    from_badges REAL NOT NULL DEFAULT 0,
    from_shares REAL NOT NULL DEFAULT 0,
    from_referrals REAL NOT NULL DEFAULT 0,
    from_ranks REAL NOT NULL DEFAULT 0,
    prediction_breakdown_json TEXT NOT NULL DEFAULT '{}',
    badge_breakdown_json TEXT NOT NULL DEFAULT '{}',
    rank_breakdown_json TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS followers (
    user_id INTEGER NOT NULL REFERENCES users(id),
    follower_id INTEGER NOT NULL REFERENCES users(id),
    PRIMARY KEY (user_id, follower_id)
);

CREATE TABLE IF NOT EXISTS predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    ticker TEXT NOT NULL,
    target_price REAL NOT NULL,
    price_at_creation REAL,
    currency TEXT NOT NULL DEFAULT 'USD',
    horizon TEXT NOT NULL,
    deadline INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'Active',
    actual_price REAL,
    score REAL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS user_badges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    badge_id TEXT NOT NULL,
    tier INTEGER NOT NULL,
    achieved_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE (user_id, badge_id)
);

-- Append-only audit trail, one row per resolved prediction
CREATE TABLE IF NOT EXISTS assessment_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    prediction_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    username TEXT,
    ticker TEXT NOT NULL,
    horizon TEXT NOT NULL,
    predicted_price REAL NOT NULL,
    actual_price REAL NOT NULL,
    score REAL NOT NULL,
    assessed_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS job_heartbeats (
    job_id TEXT PRIMARY KEY,
    last_attempted_run INTEGER,
    last_completed_run INTEGER
);

-- Outbox for the notification delivery service
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient_id INTEGER NOT NULL,
    sender_id INTEGER,
    kind TEXT NOT NULL,
    message_key TEXT NOT NULL,
    metadata_json TEXT,
    link TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_predictions_due ON predictions(status, deadline);
CREATE INDEX IF NOT EXISTS idx_predictions_user ON predictions(user_id, status);
CREATE INDEX IF NOT EXISTS idx_predictions_ticker ON predictions(ticker);
CREATE INDEX IF NOT EXISTS idx_assessment_log_prediction ON assessment_log(prediction_id);
CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id)
"#;

/// ALTER TABLE migrations for columns added after the initial schema.
/// "duplicate column name" errors are tolerated on subsequent runs.
pub const MIGRATIONS: &[&str] = &[
    // Time-penalty cap recorded at creation; assessment never scores above it
    "ALTER TABLE predictions ADD COLUMN score_cap REAL NOT NULL DEFAULT 100",
    // Whether the target price traded within the prediction window
    "ALTER TABLE predictions ADD COLUMN target_hit INTEGER",
    // One-time admin bonuses joined the ledger after launch
    "ALTER TABLE users ADD COLUMN from_bonus REAL NOT NULL DEFAULT 0",
    "ALTER TABLE users ADD COLUMN share_breakdown_json TEXT NOT NULL DEFAULT '{}'",
];

/// Schema version after the legacy-ledger fold (PRAGMA user_version)
pub const SCHEMA_VERSION: i64 = 1;

/// Folds the pre-ledger numeric rating into the structured ledger shape.
/// Gated on user_version so it runs at most once per database.
pub const FOLD_LEGACY_RATINGS: &str = r#"
UPDATE users SET
    ledger_total = ledger_total + legacy_rating,
    from_predictions = from_predictions + legacy_rating,
    legacy_rating = NULL
WHERE legacy_rating IS NOT NULL
"#;
