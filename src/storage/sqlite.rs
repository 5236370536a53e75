//! SQLite storage backend for tagtally

use super::traits::{
    CounterAuditRow, GlobalAuditRow, OpenStore, StorageError, StorageResult, StoreTransaction,
    TagStore,
};
use crate::model::{
    Attribution, Book, BookId, BookTagCounter, Delta, DeltaOutcome, Tag, TagId, TagStatus, UserId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Lock wait before a write transaction gives up with `Contention`
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const TAG_COLUMNS: &str = "id, name, norm_key, status, canonical_id, global_count, created_at";

/// Raw tag columns, converted to a `Tag` outside the rusqlite row closure
type TagRow = (i64, String, String, String, Option<i64>, i64, String);

/// SQLite-backed tag store
///
/// One database file holds books, tags, counters and attributions. A store
/// owns a single connection guarded by a mutex, so its transactions run one
/// at a time; separate stores opened on the same file (one per worker) get
/// concurrent readers under WAL and writers serialized by SQLite's lock,
/// bounded by the busy timeout.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    ///
    /// Every statement is idempotent so reopening an existing file is safe.
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Tag directory. canonical_id carries no foreign key: a dangling
            -- merge target is detected by the resolver.
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                norm_key TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'blocked', 'merged')),
                canonical_id INTEGER,
                global_count INTEGER NOT NULL DEFAULT 0 CHECK (global_count >= 0),
                created_at TEXT NOT NULL,
                CHECK ((status = 'merged') = (canonical_id IS NOT NULL))
            );

            CREATE TABLE IF NOT EXISTS book_tags (
                book_id INTEGER NOT NULL REFERENCES books(id),
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                base_count INTEGER NOT NULL DEFAULT 0 CHECK (base_count >= 0),
                user_count INTEGER NOT NULL DEFAULT 0 CHECK (user_count >= 0),
                tag_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (book_id, tag_id)
            );

            CREATE INDEX IF NOT EXISTS idx_book_tags_tag
                ON book_tags(tag_id);

            CREATE TABLE IF NOT EXISTS attributions (
                user_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL REFERENCES books(id),
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, book_id, tag_id)
            );

            CREATE INDEX IF NOT EXISTS idx_attributions_book_tag
                ON attributions(book_id, tag_id);
            CREATE INDEX IF NOT EXISTS idx_attributions_tag
                ON attributions(tag_id);

            PRAGMA foreign_keys = ON;

            -- Readers do not block the writer
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the guard already rolled back through
        // SqliteTransaction::drop, so the connection is safe to reuse.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, statement: &str) -> StorageResult<Box<dyn StoreTransaction + '_>> {
        let conn = self.lock();
        conn.execute_batch(statement)?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

impl TagStore for SqliteStore {
    fn begin_write(&self) -> StorageResult<Box<dyn StoreTransaction + '_>> {
        // IMMEDIATE takes the write lock up front so two writers never
        // deadlock upgrading from a shared lock.
        self.begin("BEGIN IMMEDIATE")
    }

    fn begin_read(&self) -> StorageResult<Box<dyn StoreTransaction + '_>> {
        self.begin("BEGIN DEFERRED")
    }

    fn set_busy_timeout(&self, timeout: Duration) -> StorageResult<()> {
        self.lock().busy_timeout(timeout)?;
        Ok(())
    }
}

/// Open transaction holding the store's connection
struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback failed");
            }
        }
    }
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| StorageError::DateParse(e.to_string()))?
        .with_timezone(&Utc))
}

/// Counts are CHECK-constrained non-negative in the schema
fn count(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

/// `?start, ?start+1, ...` for an IN list of `n` values
fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_tag_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn row_to_tag(row: TagRow) -> StorageResult<Tag> {
    let (id, name, key, status, canonical_id, global_count, created_at) = row;
    Ok(Tag {
        id: TagId::new(id),
        name,
        key,
        status: TagStatus::from_columns(&status, canonical_id).map_err(StorageError::Corrupt)?,
        global_count: count(global_count),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn read_counter_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookTagCounter> {
    Ok(BookTagCounter {
        book: BookId::new(row.get(0)?),
        tag: TagId::new(row.get(1)?),
        base_count: count(row.get(2)?),
        user_count: count(row.get(3)?),
        tag_count: count(row.get(4)?),
    })
}

impl SqliteTransaction<'_> {
    fn tag_exists(&self, tag: TagId) -> StorageResult<bool> {
        let exists = self
            .conn
            .query_row("SELECT 1 FROM tags WHERE id = ?1", params![tag.get()], |_| Ok(()))
            .optional()?
            .is_some();
        Ok(exists)
    }

    fn counter_exists(&self, book: BookId, tag: TagId) -> StorageResult<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM book_tags WHERE book_id = ?1 AND tag_id = ?2",
                params![book.get(), tag.get()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    fn query_tags(&self, where_clause: &str, param: &dyn rusqlite::ToSql) -> StorageResult<Vec<Tag>> {
        let sql = format!("SELECT {} FROM tags WHERE {} ORDER BY id", TAG_COLUMNS, where_clause);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(&[param], read_tag_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_tag).collect()
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    // === Books ===

    fn book_exists(&self, book: BookId) -> StorageResult<bool> {
        let exists = self
            .conn
            .query_row("SELECT 1 FROM books WHERE id = ?1", params![book.get()], |_| Ok(()))
            .optional()?
            .is_some();
        Ok(exists)
    }

    fn insert_book(&self, book: &Book) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO books (id, title, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![book.id.get(), book.title, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    fn seed_counter(&self, book: BookId, tag: TagId, base_count: u64) -> StorageResult<()> {
        let base = i64::try_from(base_count)
            .map_err(|_| StorageError::Corrupt(format!("base_count {} out of range", base_count)))?;
        self.conn.execute(
            r#"
            INSERT INTO book_tags (book_id, tag_id, base_count, user_count, tag_count)
            VALUES (?1, ?2, ?3, 0, ?3)
            ON CONFLICT(book_id, tag_id) DO UPDATE SET
                base_count = base_count + excluded.base_count,
                tag_count = base_count + excluded.base_count + user_count
            "#,
            params![book.get(), tag.get(), base],
        )?;
        Ok(())
    }

    // === Tag directory ===

    fn load_tag(&self, id: TagId) -> StorageResult<Option<Tag>> {
        Ok(self.query_tags("id = ?1", &id.get())?.into_iter().next())
    }

    fn find_tag_by_key(&self, key: &str) -> StorageResult<Option<Tag>> {
        Ok(self.query_tags("norm_key = ?1", &key)?.into_iter().next())
    }

    fn insert_tag_if_absent(&self, name: &str, key: &str) -> StorageResult<(Tag, bool)> {
        let inserted = self.conn.execute(
            r#"
            INSERT INTO tags (name, norm_key, status, global_count, created_at)
            VALUES (?1, ?2, 'active', 0, ?3)
            ON CONFLICT(norm_key) DO NOTHING
            "#,
            params![name, key, Utc::now().to_rfc3339()],
        )?;
        let tag = self
            .find_tag_by_key(key)?
            .ok_or_else(|| StorageError::Corrupt(format!("tag key '{}' vanished after insert", key)))?;
        Ok((tag, inserted == 1))
    }

    fn set_tag_status(&self, id: TagId, status: TagStatus) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE tags SET status = ?2, canonical_id = ?3 WHERE id = ?1",
            params![id.get(), status.as_str(), status.canonical().map(TagId::get)],
        )?;
        Ok(updated == 1)
    }

    fn merged_tags(&self) -> StorageResult<Vec<Tag>> {
        self.query_tags("status = ?1", &"merged")
    }

    // === Attributions ===

    fn attributed_tags(&self, user: UserId, book: BookId) -> StorageResult<BTreeSet<TagId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag_id FROM attributions WHERE user_id = ?1 AND book_id = ?2")?;
        let tags = stmt
            .query_map(params![user.get(), book.get()], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(TagId::new))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(tags)
    }

    fn insert_attribution(&self, attribution: &Attribution) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT INTO attributions (user_id, book_id, tag_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, book_id, tag_id) DO NOTHING
            "#,
            params![
                attribution.user.get(),
                attribution.book.get(),
                attribution.tag.get(),
                attribution.created_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    fn delete_attribution(&self, user: UserId, book: BookId, tag: TagId) -> StorageResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM attributions WHERE user_id = ?1 AND book_id = ?2 AND tag_id = ?3",
            params![user.get(), book.get(), tag.get()],
        )?;
        Ok(deleted == 1)
    }

    fn count_book_users(&self, book: BookId, tags: &[TagId]) -> StorageResult<u64> {
        if tags.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(DISTINCT user_id) FROM attributions WHERE book_id = ?1 AND tag_id IN ({})",
            placeholders(2, tags.len())
        );
        let values = std::iter::once(book.get()).chain(tags.iter().map(|t| t.get()));
        let users: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count(users))
    }

    fn count_user_books(&self, tags: &[TagId]) -> StorageResult<u64> {
        if tags.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            r#"
            SELECT COUNT(*) FROM (
                SELECT DISTINCT user_id, book_id FROM attributions WHERE tag_id IN ({})
            )
            "#,
            placeholders(1, tags.len())
        );
        let pairs: i64 = self
            .conn
            .query_row(&sql, params_from_iter(tags.iter().map(|t| t.get())), |row| row.get(0))?;
        Ok(count(pairs))
    }

    // === Counters ===

    fn apply_counter_delta(&self, book: BookId, tag: TagId, delta: Delta) -> StorageResult<DeltaOutcome> {
        match delta {
            Delta::Increment => {
                // Column references inside DO UPDATE read the existing row.
                self.conn.execute(
                    r#"
                    INSERT INTO book_tags (book_id, tag_id, base_count, user_count, tag_count)
                    VALUES (?1, ?2, 0, 1, 1)
                    ON CONFLICT(book_id, tag_id) DO UPDATE SET
                        user_count = user_count + 1,
                        tag_count = base_count + user_count + 1
                    "#,
                    params![book.get(), tag.get()],
                )?;
                Ok(DeltaOutcome::Applied)
            }
            Delta::Decrement => {
                let updated = self.conn.execute(
                    r#"
                    UPDATE book_tags SET
                        user_count = user_count - 1,
                        tag_count = base_count + user_count - 1
                    WHERE book_id = ?1 AND tag_id = ?2 AND user_count > 0
                    "#,
                    params![book.get(), tag.get()],
                )?;
                if updated == 1 {
                    Ok(DeltaOutcome::Applied)
                } else if self.counter_exists(book, tag)? {
                    Ok(DeltaOutcome::Floored)
                } else {
                    Ok(DeltaOutcome::Missing)
                }
            }
        }
    }

    fn apply_global_delta(&self, tag: TagId, delta: Delta) -> StorageResult<DeltaOutcome> {
        let sql = match delta {
            Delta::Increment => "UPDATE tags SET global_count = global_count + 1 WHERE id = ?1",
            Delta::Decrement => {
                "UPDATE tags SET global_count = global_count - 1 WHERE id = ?1 AND global_count > 0"
            }
        };
        let updated = self.conn.execute(sql, params![tag.get()])?;
        if updated == 1 {
            Ok(DeltaOutcome::Applied)
        } else if delta == Delta::Decrement && self.tag_exists(tag)? {
            Ok(DeltaOutcome::Floored)
        } else {
            Ok(DeltaOutcome::Missing)
        }
    }

    fn read_counter(&self, book: BookId, tag: TagId) -> StorageResult<Option<BookTagCounter>> {
        let counter = self
            .conn
            .query_row(
                r#"
                SELECT book_id, tag_id, base_count, user_count, tag_count
                FROM book_tags WHERE book_id = ?1 AND tag_id = ?2
                "#,
                params![book.get(), tag.get()],
                read_counter_row,
            )
            .optional()?;
        Ok(counter)
    }

    fn book_counters(&self, book: BookId) -> StorageResult<Vec<BookTagCounter>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT book_id, tag_id, base_count, user_count, tag_count
            FROM book_tags WHERE book_id = ?1 ORDER BY tag_id
            "#,
        )?;
        let counters = stmt
            .query_map(params![book.get()], read_counter_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counters)
    }

    // === Audit ===

    fn counter_audit(&self) -> StorageResult<Vec<CounterAuditRow>> {
        let mut rows = Vec::new();

        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.book_id, c.tag_id, c.base_count, c.user_count, c.tag_count,
                   (SELECT COUNT(*) FROM attributions a
                    WHERE a.book_id = c.book_id AND a.tag_id = c.tag_id)
            FROM book_tags c
            ORDER BY c.book_id, c.tag_id
            "#,
        )?;
        let with_counter = stmt.query_map([], |row| {
            let counter = read_counter_row(row)?;
            Ok(CounterAuditRow {
                book: counter.book,
                tag: counter.tag,
                counter: Some(counter),
                attributions: count(row.get(5)?),
            })
        })?;
        for row in with_counter {
            rows.push(row?);
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT a.book_id, a.tag_id, COUNT(*)
            FROM attributions a
            WHERE NOT EXISTS (
                SELECT 1 FROM book_tags c
                WHERE c.book_id = a.book_id AND c.tag_id = a.tag_id
            )
            GROUP BY a.book_id, a.tag_id
            ORDER BY a.book_id, a.tag_id
            "#,
        )?;
        let orphans = stmt.query_map([], |row| {
            Ok(CounterAuditRow {
                book: BookId::new(row.get(0)?),
                tag: TagId::new(row.get(1)?),
                counter: None,
                attributions: count(row.get(2)?),
            })
        })?;
        for row in orphans {
            rows.push(row?);
        }

        Ok(rows)
    }

    fn global_audit(&self) -> StorageResult<Vec<GlobalAuditRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.id, t.global_count,
                   (SELECT COUNT(*) FROM attributions a WHERE a.tag_id = t.id)
            FROM tags t
            ORDER BY t.id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(GlobalAuditRow {
                    tag: TagId::new(row.get(0)?),
                    global_count: count(row.get(1)?),
                    attributions: count(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}
