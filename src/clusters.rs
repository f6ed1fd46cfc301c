use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClusterKey {
    subskill: String,
    bucket: i64,
}

#[derive(Debug, Clone)]
struct ClusterStats {
    count: u64,
    avg_response_ms: f64,
    first_seen: u64,
}

/// One (sub-skill, difficulty bucket) group of wrong answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakeBucket {
    pub subskill: String,
    pub bucket: i64,
    pub count: u64,
    pub avg_response_ms: f64,
}

/// Groups incorrect responses by sub-skill and difficulty bucket.
///
/// Shared across all users; counts only ever grow.
#[derive(Debug, Clone)]
pub struct ErrorClusterer {
    bucket_size: f64,
    clusters: HashMap<ClusterKey, ClusterStats>,
    next_seq: u64,
}

impl ErrorClusterer {
    pub fn new(bucket_size: f64) -> Self {
        Self {
            bucket_size,
            clusters: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn bucket_of(&self, difficulty: f64) -> i64 {
        (difficulty / self.bucket_size).floor() as i64
    }

    pub fn add(&mut self, subskill: &str, difficulty: f64, response_ms: f64) {
        let key = ClusterKey {
            subskill: subskill.to_string(),
            bucket: self.bucket_of(difficulty),
        };
        let seq = self.next_seq;
        let stats = self.clusters.entry(key).or_insert_with(|| ClusterStats {
            count: 0,
            avg_response_ms: 0.0,
            first_seen: seq,
        });
        if stats.first_seen == seq {
            self.next_seq += 1;
        }
        stats.count += 1;
        stats.avg_response_ms += (response_ms - stats.avg_response_ms) / stats.count as f64;
    }

    /// Buckets with the highest counts; equal counts keep first-seen order.
    pub fn top_mistake_buckets(&self, limit: usize) -> Vec<MistakeBucket> {
        let mut ranked: Vec<(&ClusterKey, &ClusterStats)> = self.clusters.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.count
                .cmp(&a.1.count)
                .then_with(|| a.1.first_seen.cmp(&b.1.first_seen))
        });
        ranked
            .into_iter()
            .take(limit)
            .map(|(key, stats)| MistakeBucket {
                subskill: key.subskill.clone(),
                bucket: key.bucket,
                count: stats.count,
                avg_response_ms: stats.avg_response_ms,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

impl Default for ErrorClusterer {
    fn default() -> Self {
        Self::new(1.0)
    }
}
