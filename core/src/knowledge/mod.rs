//! Local document retrieval for the `search_knowledge_base` tool.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MAX_CHUNK_CHARS: usize = 1_200;
const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeChunk {
    pub source: PathBuf,
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct KnowledgeBase {
    chunks: Vec<KnowledgeChunk>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut base = Self::new();

        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
            let path = entry.path();
            let is_document = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| DOCUMENT_EXTENSIONS.contains(&e.to_lowercase().as_str()));
            if !entry.file_type().is_file() || !is_document {
                continue;
            }

            match std::fs::read_to_string(path) {
                Ok(content) => base.add_document(path, &content),
                Err(e) => tracing::warn!("Skipping unreadable document {}: {}", path.display(), e),
            }
        }

        tracing::info!(
            chunks = base.chunks.len(),
            path = %dir.display(),
            "Knowledge base loaded"
        );
        Ok(base)
    }

    pub fn add_document(&mut self, source: &Path, content: &str) {
        for (index, text) in chunk_text(content, MAX_CHUNK_CHARS).into_iter().enumerate() {
            self.chunks.push(KnowledgeChunk {
                source: source.to_path_buf(),
                index,
                text,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks ranked by how often the query terms occur, best first. Chunks
    /// matching more distinct terms always outrank ones matching fewer.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(f64, &KnowledgeChunk)> {
        let query_terms: HashSet<String> = tokenize(query).collect();
        if query_terms.is_empty() {
            return vec![];
        }

        let mut ranked: Vec<(f64, &KnowledgeChunk)> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let words: Vec<String> = tokenize(&chunk.text).collect();
                let distinct = query_terms
                    .iter()
                    .filter(|t| words.iter().any(|w| w == *t))
                    .count();
                if distinct == 0 {
                    return None;
                }
                let frequency = words.iter().filter(|w| query_terms.contains(*w)).count();
                let density = frequency as f64 / (words.len() as f64 + 1.0);
                Some((distinct as f64 + density, chunk))
            })
            .collect();

        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_lowercase)
}

/// Splits on blank lines, then packs paragraphs into chunks of at most
/// `max_chars`. A single oversized paragraph is split on char boundaries.
fn chunk_text(content: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = vec![];
    let mut current = String::new();

    for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if current.chars().count() + paragraph.chars().count() + 2 > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if paragraph.chars().count() > max_chars {
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
