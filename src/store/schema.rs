pub const SCHEMA: &str = r#"
-- Registered users; user_key is the lowercased username
CREATE TABLE IF NOT EXISTS users (
    user_key TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    email TEXT NOT NULL,
    email_key TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    registered_at TEXT DEFAULT (datetime('now'))
);

-- Login sessions; only the argon2 hash of the bearer token is kept
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,
    token_lookup TEXT NOT NULL,
    user_key TEXT NOT NULL REFERENCES users(user_key) ON DELETE CASCADE,
    username TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT NOT NULL
);

-- Best-known score per user, written only through upsert-if-higher
CREATE TABLE IF NOT EXISTS leaderboard (
    user_key TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    total_score INTEGER NOT NULL CHECK (total_score >= 0),
    last_updated TEXT DEFAULT (datetime('now'))
);

-- Topic status per user; a missing row means not_started
CREATE TABLE IF NOT EXISTS user_progress (
    user_key TEXT NOT NULL,
    topic_id TEXT NOT NULL,
    status TEXT NOT NULL,
    completed_at TEXT,          -- set on the transition into mastered
    last_accessed TEXT DEFAULT (datetime('now')),
    UNIQUE(user_key, topic_id)
);

-- Syllabus tables, flat unit -> topic depth
CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    order_index INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS topics (
    id TEXT PRIMARY KEY,
    unit_id INTEGER NOT NULL REFERENCES units(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    content_url TEXT,
    content_type TEXT,
    estimated_time_minutes INTEGER,
    order_index INTEGER NOT NULL DEFAULT 0
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_lookup ON sessions(token_lookup);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_key);
CREATE INDEX IF NOT EXISTS idx_leaderboard_score ON leaderboard(total_score DESC, user_key);
CREATE INDEX IF NOT EXISTS idx_units_subject ON units(subject_id);
CREATE INDEX IF NOT EXISTS idx_topics_unit ON topics(unit_id);
"#;
