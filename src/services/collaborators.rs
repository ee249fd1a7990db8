use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::models::{EvaluationReport, MatchRecord};

/// Source of per-team match history.
#[async_trait]
pub trait MatchHistory: Send + Sync {
    /// Every recorded match for `team`, ascending by kickoff.
    async fn get_history(&self, team: &str) -> Result<Vec<MatchRecord>>;

    /// The `limit` most recent matches for `team`, ascending by kickoff.
    async fn get_recent_history(&self, team: &str, limit: usize) -> Result<Vec<MatchRecord>> {
        let mut history = self.get_history(team).await?;
        let skip = history.len().saturating_sub(limit);
        Ok(history.split_off(skip))
    }

    async fn get_all_team_histories(&self) -> Result<BTreeMap<String, Vec<MatchRecord>>>;
}

/// Audit destination for evaluation reports.
#[async_trait]
pub trait EvaluationSink: Send + Sync {
    async fn record_evaluation(&self, report: &EvaluationReport) -> Result<()>;
}

#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    histories: BTreeMap<String, Vec<MatchRecord>>,
}

#[cfg(test)]
impl MemoryHistory {
    pub fn new(records: impl IntoIterator<Item = MatchRecord>) -> Self {
        let mut histories: BTreeMap<String, Vec<MatchRecord>> = BTreeMap::new();
        for record in records {
            histories.entry(record.team.clone()).or_default().push(record);
        }
        for matches in histories.values_mut() {
            matches.sort_by_key(|m| m.kickoff);
        }
        Self { histories }
    }
}

#[cfg(test)]
#[async_trait]
impl MatchHistory for MemoryHistory {
    async fn get_history(&self, team: &str) -> Result<Vec<MatchRecord>> {
        Ok(self.histories.get(team).cloned().unwrap_or_default())
    }

    async fn get_all_team_histories(&self) -> Result<BTreeMap<String, Vec<MatchRecord>>> {
        Ok(self.histories.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::features::test_support::record;

    #[tokio::test]
    async fn test_recent_history_keeps_latest_in_ascending_order() {
        let records = (1..=7).map(|day| record("Arsenal", "Chelsea", day, day as u32));
        let history = MemoryHistory::new(records);

        let recent = history.get_recent_history("Arsenal", 5).await.unwrap();
        let goals: Vec<u32> = recent.iter().map(|m| m.stats.goals_for).collect();
        assert_eq!(goals, vec![3, 4, 5, 6, 7]);

        let unknown = history.get_recent_history("Nowhere FC", 5).await.unwrap();
        assert!(unknown.is_empty());
    }
}
