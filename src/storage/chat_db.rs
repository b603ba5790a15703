use rusqlite::{OptionalExtension, Result as SqlResult, Row, params};
use std::path::Path;

use super::database::Database;
use super::models::{CURRENT_USER_KEY, Chat, Message, User};

const SCHEMA_VERSION: i64 = 1;

/// Persistent store for the user profile, chats and messages.
///
/// Every `put_*` upserts by primary key. No statement spans two tables, so a
/// message and the chat summary it updates are written independently.
pub struct ChatDatabase {
    db: Database,
}

impl ChatDatabase {
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        Self::from_database(Database::open(path)?)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::from_database(Database::in_memory()?)
    }

    fn from_database(db: Database) -> SqlResult<Self> {
        let chat_db = Self { db };
        chat_db.init_schema()?;
        Ok(chat_db)
    }

    fn init_schema(&self) -> SqlResult<()> {
        let version = self.db.schema_version()?;
        if version > SCHEMA_VERSION {
            log::warn!("Database schema v{version} is newer than supported v{SCHEMA_VERSION}");
        }
        let conn = self.db.connection();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS user (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL DEFAULT '',
                user_id TEXT NOT NULL,
                keypair BLOB NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                peer_id TEXT,
                title TEXT NOT NULL,
                avatar TEXT NOT NULL,
                last_activity INTEGER NOT NULL,
                last_message TEXT,
                unread INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                content TEXT NOT NULL,
                sender TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                is_system INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chats_last_activity ON chats(last_activity)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp)",
            [],
        )?;

        if version < SCHEMA_VERSION {
            self.db.set_schema_version(SCHEMA_VERSION)?;
            log::info!("Initialized database schema v{SCHEMA_VERSION}");
        }
        Ok(())
    }

    // ========== User ==========

    pub fn put_user(&self, user: &User) -> SqlResult<()> {
        self.db.connection().execute(
            "INSERT OR REPLACE INTO user (id, username, user_id, keypair)
             VALUES (?1, ?2, ?3, ?4)",
            params![CURRENT_USER_KEY, user.username, user.user_id, user.keypair],
        )?;
        Ok(())
    }

    pub fn get_user(&self) -> SqlResult<Option<User>> {
        self.db
            .connection()
            .query_row(
                "SELECT id, username, user_id, keypair FROM user WHERE id = ?1",
                params![CURRENT_USER_KEY],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        user_id: row.get(2)?,
                        keypair: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    // ========== Chats ==========

    pub fn put_chat(&self, chat: &Chat) -> SqlResult<()> {
        self.db.connection().execute(
            "INSERT OR REPLACE INTO chats
                (id, peer_id, title, avatar, last_activity, last_message, unread)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                chat.id,
                chat.peer_id,
                chat.title,
                chat.avatar,
                chat.last_activity,
                chat.last_message,
                chat.unread
            ],
        )?;
        Ok(())
    }

    pub fn get_chat(&self, chat_id: &str) -> SqlResult<Option<Chat>> {
        self.db
            .connection()
            .query_row(
                "SELECT id, peer_id, title, avatar, last_activity, last_message, unread
                 FROM chats WHERE id = ?1",
                params![chat_id],
                chat_from_row,
            )
            .optional()
    }

    /// Every chat, most recently active first.
    pub fn all_chats(&self) -> SqlResult<Vec<Chat>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, peer_id, title, avatar, last_activity, last_message, unread
             FROM chats
             ORDER BY last_activity DESC",
        )?;

        let chats = stmt
            .query_map([], chat_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(chats)
    }

    pub fn chat_count(&self) -> SqlResult<usize> {
        let count: i64 =
            self.db
                .connection()
                .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Messages ==========

    pub fn put_message(&self, message: &Message) -> SqlResult<()> {
        self.db.connection().execute(
            "INSERT OR REPLACE INTO messages (id, chat_id, content, sender, timestamp, is_system)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.chat_id,
                message.content,
                message.sender,
                message.timestamp,
                message.is_system
            ],
        )?;
        Ok(())
    }

    /// Messages of one chat, oldest first.
    pub fn messages_for_chat(&self, chat_id: &str) -> SqlResult<Vec<Message>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, content, sender, timestamp, is_system
             FROM messages
             WHERE chat_id = ?1
             ORDER BY timestamp ASC, rowid ASC",
        )?;

        let messages = stmt
            .query_map(params![chat_id], message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    pub fn message_count(&self) -> SqlResult<usize> {
        let count: i64 =
            self.db
                .connection()
                .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
impl ChatDatabase {
    pub fn get_message(&self, message_id: &str) -> SqlResult<Option<Message>> {
        self.db
            .connection()
            .query_row(
                "SELECT id, chat_id, content, sender, timestamp, is_system
                 FROM messages WHERE id = ?1",
                params![message_id],
                message_from_row,
            )
            .optional()
    }

    pub fn all_messages(&self) -> SqlResult<Vec<Message>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, content, sender, timestamp, is_system
             FROM messages
             ORDER BY timestamp ASC, rowid ASC",
        )?;

        let messages = stmt
            .query_map([], message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }
}

fn chat_from_row(row: &Row<'_>) -> SqlResult<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        peer_id: row.get(1)?,
        title: row.get(2)?,
        avatar: row.get(3)?,
        last_activity: row.get(4)?,
        last_message: row.get(5)?,
        unread: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> SqlResult<Message> {
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        content: row.get(2)?,
        sender: row.get(3)?,
        timestamp: row.get(4)?,
        is_system: row.get(5)?,
    })
}
