use crate::core::error::PromptgenError;
use crate::core::types::TokenUsage;
use crate::storage::LocalStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const USAGE_KEY: &str = "usage_totals";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
}

impl UsageTotals {
    fn add(&mut self, usage: &TokenUsage, cost: f64) {
        self.requests = self.requests.saturating_add(1);
        self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(usage.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(usage.total_tokens);
        self.cost += cost;
    }

    fn absorb(&mut self, other: &UsageTotals) {
        self.requests = self.requests.saturating_add(other.requests);
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.cost += other.cost;
    }
}

/// Running token and cost counters. Only ever added to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageAccumulator {
    lifetime: UsageTotals,
    /// Keyed by `YYYY-MM` so a new month starts from zero without
    /// subtracting anything.
    monthly: BTreeMap<String, UsageTotals>,
}

fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

impl UsageAccumulator {
    pub fn load(store: &LocalStore) -> Self {
        store.get_or_default(USAGE_KEY)
    }

    pub fn save(&self, store: &LocalStore) -> Result<(), PromptgenError> {
        store.set(USAGE_KEY, self)
    }

    pub fn record(&mut self, usage: &TokenUsage, cost: f64, at: DateTime<Utc>) {
        self.lifetime.add(usage, cost);
        self.monthly.entry(month_key(at)).or_default().add(usage, cost);
    }

    /// Adds everything `other` counted, used when a session folds its
    /// figures into the persisted totals.
    pub fn merge(&mut self, other: &UsageAccumulator) {
        self.lifetime.absorb(&other.lifetime);
        for (month, totals) in &other.monthly {
            self.monthly.entry(month.clone()).or_default().absorb(totals);
        }
    }

    pub fn lifetime(&self) -> &UsageTotals {
        &self.lifetime
    }

    pub fn month(&self, key: &str) -> UsageTotals {
        self.monthly.get(key).copied().unwrap_or_default()
    }

    pub fn current_month(&self, now: DateTime<Utc>) -> UsageTotals {
        self.month(&month_key(now))
    }

    pub fn months(&self) -> impl Iterator<Item = (&str, &UsageTotals)> {
        self.monthly.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn record_adds_to_lifetime_and_month() {
        let mut usage = UsageAccumulator::default();

        usage.record(&TokenUsage::new(10, 5, None), 0.0, at(2025, 3, 1));

        assert_eq!(usage.lifetime().total_tokens, 15);
        assert_eq!(usage.lifetime().requests, 1);
        assert_eq!(usage.month("2025-03").total_tokens, 15);
    }

    #[test]
    fn new_month_starts_from_zero_while_lifetime_keeps_growing() {
        let mut usage = UsageAccumulator::default();
        usage.record(&TokenUsage::new(100, 0, None), 0.5, at(2025, 1, 31));
        usage.record(&TokenUsage::new(1, 1, None), 0.25, at(2025, 2, 1));

        assert_eq!(usage.current_month(at(2025, 2, 15)).total_tokens, 2);
        assert_eq!(usage.month("2025-01").total_tokens, 100);
        assert_eq!(usage.lifetime().total_tokens, 102);
        assert_eq!(usage.lifetime().cost, 0.75);
        assert_eq!(usage.current_month(at(2025, 4, 1)), UsageTotals::default());
    }

    #[test]
    fn merge_is_additive() {
        let mut persisted = UsageAccumulator::default();
        persisted.record(&TokenUsage::new(3, 3, None), 0.0, at(2025, 5, 2));
        let mut session = UsageAccumulator::default();
        session.record(&TokenUsage::new(1, 1, None), 0.0, at(2025, 5, 3));

        persisted.merge(&session);

        assert_eq!(persisted.lifetime().total_tokens, 8);
        assert_eq!(persisted.month("2025-05").requests, 2);
    }

    #[test]
    fn totals_saturate_at_max() {
        let mut persisted = UsageAccumulator::default();
        persisted.record(&TokenUsage::new(u64::MAX, 0, None), 0.0, at(2025, 7, 1));
        let mut session = UsageAccumulator::default();
        session.record(&TokenUsage::new(5, 5, None), 0.0, at(2025, 7, 2));

        persisted.merge(&session);

        assert_eq!(persisted.lifetime().total_tokens, u64::MAX);
        assert_eq!(persisted.month("2025-07").prompt_tokens, u64::MAX);
        assert_eq!(persisted.lifetime().requests, 2);
    }

    #[test]
    fn persists_through_store() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let mut usage = UsageAccumulator::default();
        usage.record(&TokenUsage::new(2, 2, None), 0.0, at(2025, 6, 6));

        usage.save(&store).unwrap();

        assert_eq!(UsageAccumulator::load(&store), usage);
    }
}
