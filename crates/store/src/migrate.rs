//! Schema creation and in-place migration.
//!
//! Every statement here is idempotent: `CREATE TABLE IF NOT EXISTS` for the
//! base schema, attempt-and-ignore `ALTER TABLE ADD COLUMN` for columns that
//! arrived after the first release, and `INSERT OR IGNORE` seeding.

use chrono::Local;
use rusqlite::Connection;

/// The fixed core trait vocabulary, seeded at 0.5 on first run.
pub const CORE_TRAITS: [&str; 10] = [
    "formality",
    "verbosity",
    "enthusiasm",
    "humor",
    "empathy",
    "technical_depth",
    "creativity",
    "assertiveness",
    "patience",
    "curiosity",
];

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chat_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            platform TEXT NOT NULL DEFAULT 'main_ui',
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            importance_score REAL DEFAULT 0.5,
            emotional_weight REAL DEFAULT 0.5,
            context_tags TEXT,
            user_feedback TEXT,
            ai_version INTEGER
        );

        CREATE TABLE IF NOT EXISTS personality_traits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trait_name TEXT NOT NULL UNIQUE,
            trait_value REAL NOT NULL,
            trait_type TEXT DEFAULT 'core',
            created_date TEXT,
            last_updated TEXT,
            origin_story TEXT,
            is_active INTEGER DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS personality_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            trait_name TEXT NOT NULL,
            old_value REAL,
            new_value REAL,
            change_reason TEXT,
            ai_version INTEGER
        );

        CREATE TABLE IF NOT EXISTS personality_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_name TEXT,
            snapshot_date TEXT NOT NULL,
            snapshot_data TEXT,
            snapshot_type TEXT,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS knowledge_base (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            content TEXT NOT NULL,
            source TEXT,
            confidence REAL DEFAULT 0.5,
            learned_date TEXT,
            last_accessed TEXT,
            access_count INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS episode_summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            week_number INTEGER,
            message_range_start INTEGER,
            message_range_end INTEGER,
            summary TEXT NOT NULL,
            topics TEXT,
            importance REAL DEFAULT 0.5,
            mention_count INTEGER DEFAULT 1,
            committed INTEGER DEFAULT 0,
            archived INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS weekly_synthesis (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            week_start TEXT NOT NULL,
            week_end TEXT NOT NULL,
            iso_week INTEGER,
            synthesis TEXT NOT NULL,
            confirmed_topics TEXT,
            tentative_topics TEXT,
            corrections TEXT,
            knowledge_items_added INTEGER DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS curiosity_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            priority REAL,
            added_date TEXT,
            reason TEXT,
            status TEXT DEFAULT 'pending',
            research_notes TEXT,
            completed_date TEXT
        );

        CREATE TABLE IF NOT EXISTS interests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL UNIQUE,
            interest_level TEXT DEFAULT 'casual',
            mention_count INTEGER DEFAULT 0,
            first_mention TEXT,
            last_activity TEXT
        );

        CREATE TABLE IF NOT EXISTS goals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            goal_name TEXT NOT NULL,
            goal_type TEXT,
            target_value REAL,
            current_value REAL,
            progress REAL,
            deadline TEXT,
            created_date TEXT,
            status TEXT DEFAULT 'active',
            milestones TEXT
        );

        CREATE TABLE IF NOT EXISTS journal_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            created_date TEXT,
            entry_type TEXT NOT NULL,
            title TEXT,
            content TEXT NOT NULL,
            mood TEXT,
            topics TEXT,
            word_count INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS consolidation_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_date TEXT NOT NULL,
            conversations_processed INTEGER DEFAULT 0,
            knowledge_items_added INTEGER DEFAULT 0,
            journal_entries_written INTEGER DEFAULT 0,
            curiosity_topics_processed INTEGER DEFAULT 0,
            duration_seconds REAL DEFAULT 0,
            summary TEXT
        );

        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT,
            type TEXT,
            label TEXT,
            detail TEXT,
            extra TEXT
        );

        CREATE TABLE IF NOT EXISTS self_awareness_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            self_ref_score REAL DEFAULT 0,
            uncertainty_score REAL DEFAULT 0,
            meta_cognition_score REAL DEFAULT 0,
            composite_score REAL DEFAULT 0,
            response_sample TEXT,
            word_count INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS operating_notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            note_key TEXT NOT NULL UNIQUE,
            note_value TEXT NOT NULL,
            created_date TEXT,
            last_updated TEXT,
            update_count INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS mistakes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT,
            topic TEXT,
            correction TEXT,
            behavioral_rule TEXT,
            applied_count INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS user_model (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            attribute TEXT NOT NULL UNIQUE,
            value TEXT NOT NULL,
            confidence REAL DEFAULT 0.5,
            last_updated TEXT,
            evidence_count INTEGER DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS skills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            skill_name TEXT NOT NULL UNIQUE,
            success_rate REAL,
            total_attempts INTEGER,
            skill_level TEXT,
            last_updated TEXT,
            domain TEXT
        );

        CREATE TABLE IF NOT EXISTS skill_observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT,
            domain TEXT,
            topic TEXT,
            confidence_score REAL,
            message_length INTEGER
        );

        CREATE TABLE IF NOT EXISTS ai_values (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            value_statement TEXT NOT NULL,
            priority REAL,
            developed_date TEXT,
            origin_story TEXT,
            influence_count INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS conversation_threads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_name TEXT,
            keywords TEXT,
            message_count INTEGER DEFAULT 0,
            started_at TEXT,
            last_activity TEXT,
            summary TEXT
        );

        CREATE TABLE IF NOT EXISTS thread_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_id INTEGER,
            message_id INTEGER,
            added_at TEXT,
            FOREIGN KEY (thread_id) REFERENCES conversation_threads(id)
        );

        CREATE TABLE IF NOT EXISTS search_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT,
            query TEXT,
            result_count INTEGER,
            source TEXT,
            top_result TEXT
        );

        CREATE TABLE IF NOT EXISTS creative_outputs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT,
            output_type TEXT,
            title TEXT,
            content TEXT,
            language TEXT,
            prompt TEXT,
            run_result TEXT,
            run_success INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS email_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sent_at TEXT NOT NULL,
            recipient TEXT,
            subject TEXT,
            email_type TEXT DEFAULT 'general',
            success INTEGER DEFAULT 0,
            error TEXT
        );

        CREATE TABLE IF NOT EXISTS moltbook_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            action TEXT NOT NULL,
            content TEXT,
            result TEXT,
            post_id TEXT,
            post_url TEXT
        );

        CREATE TABLE IF NOT EXISTS moltbook_feed_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fetched_at TEXT NOT NULL,
            post_id TEXT UNIQUE,
            title TEXT,
            content TEXT,
            author TEXT,
            upvotes INTEGER DEFAULT 0,
            submolt TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_chat_timestamp ON chat_history(timestamp);
        CREATE INDEX IF NOT EXISTS idx_chat_importance ON chat_history(importance_score);
        CREATE INDEX IF NOT EXISTS idx_knowledge_topic ON knowledge_base(topic);
        CREATE INDEX IF NOT EXISTS idx_goals_status ON goals(status);
        CREATE INDEX IF NOT EXISTS idx_journal_type ON journal_entries(entry_type);
        CREATE INDEX IF NOT EXISTS idx_activity_timestamp ON activity_log(timestamp);
        CREATE INDEX IF NOT EXISTS idx_consolidation_date ON consolidation_log(run_date);
        CREATE INDEX IF NOT EXISTS idx_episodes_committed ON episode_summaries(committed, archived);
        CREATE INDEX IF NOT EXISTS idx_curiosity_status ON curiosity_queue(status);
        "#,
    )?;

    // Columns added after the base schema shipped. SQLite has no
    // ADD COLUMN IF NOT EXISTS, so attempt-and-ignore.
    for alter in [
        "ALTER TABLE knowledge_base ADD COLUMN first_seen TEXT",
        "ALTER TABLE knowledge_base ADD COLUMN confirmation_count INTEGER DEFAULT 1",
        "ALTER TABLE knowledge_base ADD COLUMN source_weeks TEXT",
        "ALTER TABLE goals ADD COLUMN authored_by TEXT DEFAULT 'system'",
        "ALTER TABLE goals ADD COLUMN description TEXT",
    ] {
        let _ = conn.execute(alter, []);
    }

    seed_traits(conn)?;
    Ok(())
}

fn seed_traits(conn: &Connection) -> rusqlite::Result<()> {
    let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO personality_traits
            (trait_name, trait_value, trait_type, created_date, last_updated, origin_story)
         VALUES (?1, 0.5, 'core', ?2, ?2, 'Initial neutral state')",
    )?;
    for name in CORE_TRAITS {
        stmt.execute(rusqlite::params![name, timestamp])?;
    }
    Ok(())
}
