//! In-process Data Service
//!
//! Serves seed data from memory. Backs the bridge binary when no remote
//! service is wired in, and lets tests count calls, inject failures and add
//! latency.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{insert_ordered, Course, Highlight, NewHighlight, ProgressRecord, Question, Topic};
use crate::service::DataService;

// == Seed Data ==
/// Rows the in-process service starts with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub progress: Vec<ProgressRecord>,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
}

impl SeedData {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))
    }
}

/// Concurrent calls of one operation: now and at the highest point so far.
#[derive(Debug, Default, Clone, Copy)]
struct Gauge {
    current: usize,
    peak: usize,
}

type Gauges = Mutex<HashMap<&'static str, Gauge>>;

/// Holds one slot of an operation's gauge until dropped.
struct InFlight<'a> {
    gauges: &'a Gauges,
    operation: &'static str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(gauge) = self.gauges.lock().get_mut(self.operation) {
            gauge.current = gauge.current.saturating_sub(1);
        }
    }
}

// == Memory Data Service ==
#[derive(Debug, Default)]
pub struct MemoryDataService {
    data: Mutex<SeedData>,
    calls: Mutex<HashMap<&'static str, usize>>,
    in_flight: Gauges,
    /// `operation` or `operation:argument` entries that fail
    failures: Mutex<HashSet<String>>,
    latency: Mutex<Duration>,
    next_highlight: AtomicU64,
}

impl MemoryDataService {
    pub fn new(seed: SeedData) -> Self {
        Self {
            data: Mutex::new(seed),
            ..Self::default()
        }
    }

    /// Number of calls made to `operation` (e.g. `"list_topics"`).
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().get(operation).copied().unwrap_or(0)
    }

    /// Highest number of `operation` calls that were running at once.
    pub fn peak_in_flight(&self, operation: &str) -> usize {
        self.in_flight.lock().get(operation).map_or(0, |g| g.peak)
    }

    /// Makes `operation` fail, for every argument or only for `argument`.
    pub fn fail_on(&self, operation: &str, argument: Option<&str>) {
        let rule = match argument {
            Some(arg) => format!("{}:{}", operation, arg),
            None => operation.to_string(),
        };
        self.failures.lock().insert(rule);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Delay applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Replaces the stored topics of `course_id`.
    pub fn replace_topics(&self, course_id: &str, topics: Vec<Topic>) {
        let mut data = self.data.lock();
        data.topics.retain(|t| t.course_id != course_id);
        data.topics.extend(topics);
    }

    fn occupy(&self, operation: &'static str) -> InFlight<'_> {
        let mut gauges = self.in_flight.lock();
        let gauge = gauges.entry(operation).or_default();
        gauge.current += 1;
        gauge.peak = gauge.peak.max(gauge.current);
        InFlight {
            gauges: &self.in_flight,
            operation,
        }
    }

    async fn enter(&self, operation: &'static str, argument: &str) -> anyhow::Result<()> {
        *self.calls.lock().entry(operation).or_default() += 1;
        debug!(operation, argument, "data service call");
        let _slot = self.occupy(operation);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failing = {
            let failures = self.failures.lock();
            failures.contains(operation) || failures.contains(&format!("{}:{}", operation, argument))
        };
        if failing {
            bail!("{} failed for '{}'", operation, argument);
        }
        Ok(())
    }
}

#[async_trait]
impl DataService for MemoryDataService {
    async fn list_courses(&self) -> anyhow::Result<Vec<Course>> {
        self.enter("list_courses", "").await?;
        Ok(self.data.lock().courses.clone())
    }

    async fn list_topics(&self, course_id: &str) -> anyhow::Result<Vec<Topic>> {
        self.enter("list_topics", course_id).await?;
        let data = self.data.lock();
        if !data.courses.iter().any(|c| c.id == course_id) {
            bail!("course '{}' does not exist", course_id);
        }
        Ok(data
            .topics
            .iter()
            .filter(|t| t.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn list_questions(&self, topic_id: &str) -> anyhow::Result<Vec<Question>> {
        self.enter("list_questions", topic_id).await?;
        let mut questions: Vec<Question> = self
            .data
            .lock()
            .questions
            .iter()
            .filter(|q| q.topic_id == topic_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.order_index);
        Ok(questions)
    }

    async fn list_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> anyhow::Result<Vec<ProgressRecord>> {
        self.enter("list_progress", course_id).await?;
        let data = self.data.lock();
        let topic_ids: HashSet<&str> = data
            .topics
            .iter()
            .filter(|t| t.course_id == course_id)
            .map(|t| t.id.as_str())
            .collect();
        Ok(data
            .progress
            .iter()
            .filter(|p| p.user_id == user_id && topic_ids.contains(p.topic_id.as_str()))
            .cloned()
            .collect())
    }

    async fn upsert_progress(
        &self,
        user_id: &str,
        topic_id: &str,
        completed: bool,
    ) -> anyhow::Result<ProgressRecord> {
        self.enter("upsert_progress", topic_id).await?;
        let record = ProgressRecord {
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            completed,
            completed_at: completed.then(Utc::now),
        };
        let mut data = self.data.lock();
        match data
            .progress
            .iter_mut()
            .find(|p| p.user_id == user_id && p.topic_id == topic_id)
        {
            Some(existing) => *existing = record.clone(),
            None => data.progress.push(record.clone()),
        }
        Ok(record)
    }

    async fn list_highlights(
        &self,
        topic_id: &str,
        user_id: &str,
    ) -> anyhow::Result<Vec<Highlight>> {
        self.enter("list_highlights", topic_id).await?;
        let mut highlights: Vec<Highlight> = self
            .data
            .lock()
            .highlights
            .iter()
            .filter(|h| h.topic_id == topic_id && h.user_id == user_id)
            .cloned()
            .collect();
        highlights.sort_by_key(|h| h.position_start);
        Ok(highlights)
    }

    async fn insert_highlight(
        &self,
        user_id: &str,
        highlight: NewHighlight,
    ) -> anyhow::Result<Highlight> {
        self.enter("insert_highlight", &highlight.topic_id).await?;
        let id = format!("h-{}", self.next_highlight.fetch_add(1, Ordering::Relaxed) + 1);
        let stored = highlight.into_highlight(id, user_id);
        insert_ordered(&mut self.data.lock().highlights, stored.clone());
        Ok(stored)
    }

    async fn update_highlight(&self, id: &str, note: Option<String>) -> anyhow::Result<Highlight> {
        self.enter("update_highlight", id).await?;
        let mut data = self.data.lock();
        let Some(existing) = data.highlights.iter_mut().find(|h| h.id == id) else {
            bail!("highlight '{}' does not exist", id);
        };
        existing.note = note;
        Ok(existing.clone())
    }

    async fn delete_highlight(&self, id: &str) -> anyhow::Result<()> {
        self.enter("delete_highlight", id).await?;
        let mut data = self.data.lock();
        let before = data.highlights.len();
        data.highlights.retain(|h| h.id != id);
        if data.highlights.len() == before {
            bail!("highlight '{}' does not exist", id);
        }
        Ok(())
    }
}
