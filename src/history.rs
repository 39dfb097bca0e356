use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::api::SearchHit;

/// One past search and what it returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub result_count: usize,
    pub top_similarity: f64,
    pub timestamp: String,
}

/// Persistent record of recent searches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHistory {
    #[serde(default)]
    pub records: Vec<SearchRecord>,
}

const MAX_RECORDS: usize = 200;

impl SearchHistory {
    /// Directory: ~/.local/share/image-seek/
    fn dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("image-seek")
    }

    fn path() -> PathBuf {
        Self::dir().join("history.json")
    }

    /// Load from disk, returning an empty history if missing.
    pub fn load() -> Self {
        match fs::read_to_string(Self::path()) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let dir = Self::dir();
        fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(), data)?;
        Ok(())
    }

    /// Record a completed search, keeping the most recent entries.
    pub fn record_search(&mut self, query: &str, results: &[SearchHit]) {
        let top_similarity = results.iter().map(|h| h.similarity).fold(0.0, f64::max);
        self.records.push(SearchRecord {
            query: query.to_string(),
            result_count: results.len(),
            top_similarity,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        });
        if self.records.len() > MAX_RECORDS {
            let excess = self.records.len() - MAX_RECORDS;
            self.records.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, similarity: f64) -> SearchHit {
        SearchHit {
            path: path.to_string(),
            similarity,
        }
    }

    #[test]
    fn records_count_and_top_similarity() {
        let mut history = SearchHistory::default();
        history.record_search("sunset", &[hit("a.jpg", 0.4), hit("b.jpg", 0.9)]);
        let record = &history.records[0];
        assert_eq!(record.query, "sunset");
        assert_eq!(record.result_count, 2);
        assert!((record.top_similarity - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn oldest_records_are_dropped_past_the_cap() {
        let mut history = SearchHistory::default();
        for i in 0..MAX_RECORDS + 5 {
            history.record_search(&format!("query {i}"), &[]);
        }
        assert_eq!(history.records.len(), MAX_RECORDS);
        assert_eq!(history.records[0].query, "query 5");
    }
}
