//! In-process click buffer mirroring sorted-set semantics: members are
//! unique, re-adding one updates its score.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{BufferedEvent, ClickBuffer};
use crate::errors::Result;

#[derive(Default)]
pub struct MemoryClickBuffer {
    entries: RwLock<BTreeMap<String, i64>>,
}

impl MemoryClickBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClickBuffer for MemoryClickBuffer {
    async fn append(&self, member: &str, score: i64) -> Result<()> {
        self.entries.write().insert(member.to_string(), score);
        Ok(())
    }

    async fn range(&self, from: i64, to: i64, limit: usize) -> Result<Vec<BufferedEvent>> {
        let guard = self.entries.read();
        let mut hits: Vec<BufferedEvent> = guard
            .iter()
            .filter(|&(_, &score)| score >= from && score <= to)
            .map(|(member, &score)| BufferedEvent {
                member: member.clone(),
                score,
            })
            .collect();
        // Sorted-set order: score ascending, then member lexicographically.
        hits.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| a.member.cmp(&b.member)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn remove(&self, members: &[String]) -> Result<u64> {
        let mut guard = self.entries.write();
        let mut removed = 0;
        for member in members {
            if guard.remove(member).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn depth(&self) -> Result<u64> {
        Ok(self.entries.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_is_member_unique() {
        let buffer = MemoryClickBuffer::new();
        buffer.append("evt-a", 100).await.unwrap();
        buffer.append("evt-a", 200).await.unwrap();

        assert_eq!(buffer.depth().await.unwrap(), 1);
        let events = buffer.range(0, 300, 10).await.unwrap();
        assert_eq!(events[0].score, 200, "re-add updates the score");
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_ordered() {
        let buffer = MemoryClickBuffer::new();
        buffer.append("evt-c", 300).await.unwrap();
        buffer.append("evt-a", 100).await.unwrap();
        buffer.append("evt-b", 200).await.unwrap();
        buffer.append("evt-d", 400).await.unwrap();

        let events = buffer.range(100, 300, 10).await.unwrap();
        let members: Vec<&str> = events.iter().map(|e| e.member.as_str()).collect();
        assert_eq!(members, vec!["evt-a", "evt-b", "evt-c"]);

        let capped = buffer.range(100, 400, 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[1].member, "evt-b");
    }

    #[tokio::test]
    async fn test_remove_counts_only_existing() {
        let buffer = MemoryClickBuffer::new();
        buffer.append("evt-a", 100).await.unwrap();
        buffer.append("evt-b", 200).await.unwrap();

        let removed = buffer
            .remove(&[
                "evt-a".to_string(),
                "evt-b".to_string(),
                "evt-missing".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(buffer.depth().await.unwrap(), 0);
    }
}
