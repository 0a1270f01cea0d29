use crate::traits::{Memory, MemoryCategory, MemoryEntry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

const MEMORY_FILE: &str = "memory.json";

/// Memory persisted as a JSON array in `<workspace>/memory.json`.
///
/// Entries are keyed: storing an existing key replaces its content. Recall
/// scores each entry by the share of query terms it contains.
pub struct FileMemory {
    path: PathBuf,
    entries: RwLock<Vec<MemoryEntry>>,
}

impl FileMemory {
    pub async fn open(workspace_dir: &Path) -> Result<Self> {
        let path = workspace_dir.join(MEMORY_FILE);
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => vec![],
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse memory file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![],
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read memory file {}", path.display()));
            }
        };

        debug!(path = %path.display(), entries = entries.len(), "memory opened");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn persist(&self, entries: &[MemoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write memory file {}", self.path.display()))
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of distinct query terms found in the entry's key or content.
fn score(entry: &MemoryEntry, query_terms: &[String]) -> f64 {
    if query_terms.is_empty() {
        return 1.0;
    }
    let haystack = terms(&format!("{} {}", entry.key, entry.content));
    let hits = query_terms
        .iter()
        .filter(|term| haystack.iter().any(|word| word == *term))
        .count();
    hits as f64 / query_terms.len() as f64
}

#[async_trait]
impl Memory for FileMemory {
    fn name(&self) -> &str {
        "file"
    }

    async fn store(
        &self,
        key: &str,
        content: &str,
        category: MemoryCategory,
        session_id: Option<&str>,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        let timestamp = chrono::Local::now().to_rfc3339();

        match entries.iter_mut().find(|e| e.key == key) {
            Some(existing) => {
                existing.content = content.to_string();
                existing.category = category;
                existing.timestamp = timestamp;
                existing.session_id = session_id.map(str::to_string);
            }
            None => entries.push(MemoryEntry {
                id: uuid::Uuid::new_v4().to_string(),
                key: key.to_string(),
                content: content.to_string(),
                category,
                timestamp,
                session_id: session_id.map(str::to_string),
                score: None,
            }),
        }

        self.persist(&entries).await
    }

    async fn recall(
        &self,
        query: &str,
        limit: usize,
        session_id: Option<&str>,
    ) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.read().await;
        let mut query_terms = terms(query);
        query_terms.sort();
        query_terms.dedup();

        let mut scored: Vec<MemoryEntry> = entries
            .iter()
            .filter(|e| session_id.is_none_or(|sid| e.session_id.as_deref() == Some(sid)))
            .filter_map(|e| {
                let s = score(e, &query_terms);
                (s > 0.0).then(|| MemoryEntry {
                    score: Some(s),
                    ..e.clone()
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get(&self, key: &str) -> Result<Option<MemoryEntry>> {
        Ok(self.entries.read().await.iter().find(|e| e.key == key).cloned())
    }

    async fn list(
        &self,
        category: Option<&MemoryCategory>,
        session_id: Option<&str>,
    ) -> Result<Vec<MemoryEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| category.is_none_or(|c| &e.category == c))
            .filter(|e| session_id.is_none_or(|sid| e.session_id.as_deref() == Some(sid)))
            .cloned()
            .collect())
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.key != key);
        let removed = entries.len() != before;
        if removed {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn health_check(&self) -> bool {
        self.path.parent().is_none_or(|dir| dir.exists())
    }

    async fn close(&self) -> Result<()> {
        let entries = self.entries.read().await;
        self.persist(&entries).await?;
        debug!(path = %self.path.display(), "memory closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn store_and_recall_ranks_by_overlap() {
        let tmp = TempDir::new().unwrap();
        let memory = FileMemory::open(tmp.path()).await.unwrap();

        memory
            .store("diet", "User is vegetarian and loves Thai curry", MemoryCategory::Core, None)
            .await
            .unwrap();
        memory
            .store("city", "User lives in Lisbon", MemoryCategory::Core, None)
            .await
            .unwrap();

        let hits = memory.recall("thai curry recipe", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "diet");
        let score = hits[0].score.unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-9);

        assert!(memory.recall("weather", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_key_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let memory = FileMemory::open(tmp.path()).await.unwrap();

        memory.store("name", "Alex", MemoryCategory::Core, None).await.unwrap();
        memory.store("name", "Sam", MemoryCategory::Core, None).await.unwrap();

        assert_eq!(memory.count().await.unwrap(), 1);
        assert_eq!(memory.get("name").await.unwrap().unwrap().content, "Sam");
    }

    #[tokio::test]
    async fn forget_and_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let memory = FileMemory::open(tmp.path()).await.unwrap();
            memory.store("a", "first", MemoryCategory::Daily, Some("s1")).await.unwrap();
            memory.store("b", "second", MemoryCategory::Core, None).await.unwrap();
            assert!(memory.forget("a").await.unwrap());
            assert!(!memory.forget("missing").await.unwrap());
            memory.close().await.unwrap();
        }

        let reopened = FileMemory::open(tmp.path()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let core = reopened.list(Some(&MemoryCategory::Core), None).await.unwrap();
        assert_eq!(core[0].key, "b");
        assert!(reopened.health_check().await);
    }

    #[tokio::test]
    async fn recall_filters_by_session() {
        let tmp = TempDir::new().unwrap();
        let memory = FileMemory::open(tmp.path()).await.unwrap();
        memory.store("x", "tea with milk", MemoryCategory::Daily, Some("one")).await.unwrap();
        memory.store("y", "tea without sugar", MemoryCategory::Daily, Some("two")).await.unwrap();

        let hits = memory.recall("tea", 10, Some("two")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "y");
    }
}
