//! Local event log and the aggregates computed from it.
//!
//! Events live in a bounded ring buffer persisted under `analytics_events`.
//! Aggregation rescans the whole buffer each time; the capacity keeps that
//! cheap.

use crate::core::error::PromptgenError;
use crate::storage::LocalStore;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

mod sessions;

pub use sessions::{SessionRecord, SessionTracker};

pub const EVENTS_KEY: &str = "analytics_events";
const POPULAR_CATEGORY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PromptGenerated,
    PromptCopied,
    TemplateUsed,
    ModelSelected,
    ConversationStarted,
    MessageSent,
    ComparisonRun,
    #[serde(other)]
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PromptGenerated => "prompt_generated",
            EventKind::PromptCopied => "prompt_copied",
            EventKind::TemplateUsed => "template_used",
            EventKind::ModelSelected => "model_selected",
            EventKind::ConversationStarted => "conversation_started",
            EventKind::MessageSent => "message_sent",
            EventKind::ComparisonRun => "comparison_run",
            EventKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub kind: EventKind,
    #[serde(default)]
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl AnalyticsEvent {
    pub fn new(kind: EventKind, category: Option<&str>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            category: category.map(str::to_string),
            timestamp,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngagementStats {
    pub events_today: u64,
    pub active_days: usize,
    pub sessions: usize,
    pub average_session_secs: u64,
    pub events_per_session: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_events: usize,
    pub popular_categories: Vec<CategoryCount>,
    pub daily_counts: BTreeMap<NaiveDate, u64>,
    pub events_by_kind: BTreeMap<EventKind, u64>,
    pub engagement: EngagementStats,
}

pub struct EventLog {
    store: LocalStore,
    capacity: usize,
    events: VecDeque<AnalyticsEvent>,
}

impl EventLog {
    /// Loads the persisted buffer; a missing or malformed one starts empty.
    pub fn open(store: LocalStore, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let stored: Vec<AnalyticsEvent> = store.get_or_default(EVENTS_KEY);
        let mut events: VecDeque<AnalyticsEvent> = stored.into();
        while events.len() > capacity {
            events.pop_front();
        }
        Self {
            store,
            capacity,
            events,
        }
    }

    pub fn track(
        &mut self,
        kind: EventKind,
        category: Option<&str>,
    ) -> Result<(), PromptgenError> {
        self.record(AnalyticsEvent::new(kind, category, Utc::now()))
    }

    /// Appends `event`, dropping the oldest entries beyond capacity, and persists.
    pub fn record(&mut self, event: AnalyticsEvent) -> Result<(), PromptgenError> {
        tracing::debug!(kind = event.kind.as_str(), "tracking event");
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), PromptgenError> {
        self.store.set(EVENTS_KEY, &self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn events(&self) -> impl Iterator<Item = &AnalyticsEvent> {
        self.events.iter()
    }

    pub fn load_analytics(
        &self,
        sessions: &[SessionRecord],
        now: DateTime<Utc>,
    ) -> AnalyticsSummary {
        let today = now.date_naive();
        let mut categories: HashMap<&str, u64> = HashMap::new();
        let mut daily_counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        let mut events_by_kind: BTreeMap<EventKind, u64> = BTreeMap::new();
        let mut events_today = 0;

        for event in &self.events {
            if let Some(category) = event.category.as_deref() {
                *categories.entry(category).or_default() += 1;
            }
            let day = event.timestamp.date_naive();
            *daily_counts.entry(day).or_default() += 1;
            *events_by_kind.entry(event.kind).or_default() += 1;
            if day == today {
                events_today += 1;
            }
        }

        let mut popular_categories: Vec<CategoryCount> = categories
            .into_iter()
            .map(|(category, count)| CategoryCount {
                category: category.to_string(),
                count,
            })
            .collect();
        popular_categories.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(&b.category)));
        popular_categories.truncate(POPULAR_CATEGORY_LIMIT);

        let durations: Vec<i64> = sessions
            .iter()
            .filter_map(|s| s.duration())
            .map(|d| d.num_seconds().max(0))
            .collect();
        let average_session_secs = if durations.is_empty() {
            0
        } else {
            (durations.iter().sum::<i64>() / durations.len() as i64) as u64
        };
        let events_per_session = if sessions.is_empty() {
            0.0
        } else {
            self.events.len() as f64 / sessions.len() as f64
        };

        AnalyticsSummary {
            total_events: self.events.len(),
            popular_categories,
            engagement: EngagementStats {
                events_today,
                active_days: daily_counts.len(),
                sessions: sessions.len(),
                average_session_secs,
                events_per_session,
            },
            daily_counts,
            events_by_kind,
        }
    }
}
