//! Tag usage index: how many distinct photos/posts carry each
//! normalized tag, used for autocomplete and trending.

use crate::error::PipelineError;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

/// Aggregate counter over normalized lowercase tag names.
///
/// Callers increment once per newly created (photo, tag) association —
/// [`PhotoStore::merge_tags`](crate::photos::PhotoStore::merge_tags)
/// returns exactly that set — so the count means "distinct items tagged
/// with this", not "times ever attached".
#[derive(Clone)]
pub struct TagUsageIndex {
    db: Arc<Mutex<Connection>>,
}

fn normalize(tag: &str) -> String {
    tag.trim().to_lowercase()
}

impl TagUsageIndex {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PipelineError> {
        self.db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))
    }

    /// Record one new association for a tag. Atomic upsert-and-increment,
    /// safe under concurrent workers.
    pub fn record_use(&self, tag: &str) -> Result<(), PipelineError> {
        let name = normalize(tag);
        if name.is_empty() {
            return Ok(());
        }
        self.conn()?.execute(
            "INSERT INTO tag_usage (name, count) VALUES (?1, 1)
             ON CONFLICT(name) DO UPDATE SET count = count + 1",
            params![name],
        )?;
        Ok(())
    }

    /// Record one new association for each tag.
    pub fn record_uses(&self, tags: &[String]) -> Result<(), PipelineError> {
        for tag in tags {
            self.record_use(tag)?;
        }
        Ok(())
    }

    /// Usage count for a tag, case-insensitive. Unknown tags are 0.
    pub fn count(&self, tag: &str) -> Result<u64, PipelineError> {
        let count: Option<u64> = self
            .conn()?
            .query_row(
                "SELECT count FROM tag_usage WHERE name = ?1",
                params![normalize(tag)],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(count.unwrap_or(0))
    }

    /// Autocomplete: tags starting with `prefix`, most used first, ties
    /// broken alphabetically.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<(String, u64)>, PipelineError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, count FROM tag_usage
             WHERE name LIKE ?1 || '%'
             ORDER BY count DESC, name ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![normalize(prefix), limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

        let mut suggestions = Vec::new();
        for row in rows {
            suggestions.push(row?);
        }
        Ok(suggestions)
    }

    /// Drop a tag from the index entirely (admin path, used after the
    /// tag has been removed from all associated content). Returns `true`
    /// if the tag existed.
    pub fn remove(&self, tag: &str) -> Result<bool, PipelineError> {
        let changed = self.conn()?.execute(
            "DELETE FROM tag_usage WHERE name = ?1",
            params![normalize(tag)],
        )?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_database;

    fn index() -> TagUsageIndex {
        TagUsageIndex::new(open_database(None).unwrap())
    }

    #[test]
    fn counts_accumulate() {
        let index = index();
        index.record_use("betta").unwrap();
        index.record_use("betta").unwrap();
        index.record_use("guppy").unwrap();

        assert_eq!(index.count("betta").unwrap(), 2);
        assert_eq!(index.count("guppy").unwrap(), 1);
        assert_eq!(index.count("unknown").unwrap(), 0);
    }

    #[test]
    fn case_never_creates_duplicate_entries() {
        let index = index();
        index.record_use("Betta").unwrap();
        index.record_use("BETTA").unwrap();
        index.record_use("betta").unwrap();

        assert_eq!(index.count("betta").unwrap(), 3);
        assert_eq!(index.count("BeTtA").unwrap(), 3);
        assert_eq!(index.suggest("bet", 10).unwrap().len(), 1);
    }

    #[test]
    fn suggestions_ordered_by_usage() {
        let index = index();
        for _ in 0..3 {
            index.record_use("planted tank").unwrap();
        }
        index.record_use("platy").unwrap();
        index.record_use("planted wall").unwrap();
        index.record_use("betta").unwrap();

        let suggestions = index.suggest("pla", 10).unwrap();
        let names: Vec<&str> = suggestions.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["planted tank", "planted wall", "platy"]);
        assert_eq!(suggestions[0].1, 3);

        let limited = index.suggest("pla", 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].0, "planted tank");
    }

    #[test]
    fn remove_drops_entry() {
        let index = index();
        index.record_use("betta").unwrap();

        assert!(index.remove("BETTA").unwrap());
        assert!(!index.remove("betta").unwrap());
        assert_eq!(index.count("betta").unwrap(), 0);
    }
}
