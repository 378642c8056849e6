//! Course Loader Module
//!
//! Orchestrates the cache, loading flags, request coordinator, scheduler,
//! circuit breaker and optimistic engine into the operations UI collaborators
//! call: load a course with its progress-annotated topic tree, select a topic,
//! mark progress, and manage highlights.

mod state;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheKind, Invalidate, SessionCache, TtlCache};
use crate::config::Config;
use crate::coordination::{
    CircuitBreaker, Debounced, LoadingState, MutationIntent, OptimisticEngine, RequestCoordinator,
    Scheduler, Throttled,
};
use crate::domain::{
    build_tree, find_topic, find_topic_mut, Course, Highlight, NewHighlight, ProgressRecord,
    ProgressSummary, Question, Topic,
};
use crate::error::{LoaderError, Result};
use crate::service::DataService;

pub use state::{LoadOutcome, ViewState};

/// Breaker resource class for course loads.
pub const COURSE_LOADS: &str = "course_loads";

/// Loading-state keys, one per logical operation.
pub mod ops {
    pub const COURSES: &str = "courses";
    pub const TOPICS: &str = "topics";
    pub const QUESTIONS: &str = "questions";
    pub const COURSE: &str = "course";
    pub const TOPIC: &str = "topic";
    pub const HIGHLIGHTS: &str = "highlights";
}

/// Last failed load, replayed by `retry_operation`.
#[derive(Debug, Clone)]
enum RetryTarget {
    Courses,
    Topics(String),
    Questions(String),
    Course(String),
    Topic(Box<Topic>),
    Highlights(String),
}

/// One-shot first-topic selection, re-armed when the course changes.
#[derive(Debug, Default)]
struct AutoSelect {
    course_id: Option<String>,
    done: bool,
}

struct Inner {
    service: Arc<dyn DataService>,
    cache: Arc<SessionCache>,
    state: Arc<RwLock<ViewState>>,
    loading: LoadingState,
    breaker: CircuitBreaker,
    scheduler: Scheduler,
    engine: OptimisticEngine<ViewState>,

    course_lists: RequestCoordinator<Vec<Course>>,
    topic_lists: RequestCoordinator<Vec<Topic>>,
    question_lists: RequestCoordinator<Vec<Question>>,
    progress_lists: RequestCoordinator<Vec<ProgressRecord>>,
    highlight_lists: RequestCoordinator<Vec<Highlight>>,
    course_loads: RequestCoordinator<Course>,

    refresh: Throttled<String>,
    note_saves: Mutex<HashMap<String, Debounced<Option<String>>>>,
    note_debounce: Duration,

    auto_select: Mutex<AutoSelect>,
    last_failed: Mutex<Option<RetryTarget>>,
    /// Bumped on logout; work started under an older value settles silently
    session: Arc<AtomicU64>,
    placeholders: AtomicU64,
    batch_size: usize,
    user_id: String,
}

// == Course Loader ==
/// Session-scoped orchestrator. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct CourseLoader {
    inner: Arc<Inner>,
}

impl CourseLoader {
    pub fn new(service: Arc<dyn DataService>, config: &Config) -> Self {
        let cache = Arc::new(SessionCache::from_config(config));
        let state = Arc::new(RwLock::new(ViewState::default()));
        let scheduler = Scheduler::new();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let refresh = scheduler.throttle(
                "refresh_course",
                config.refresh_throttle(),
                move |course_id: String| {
                    let weak = weak.clone();
                    async move {
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        let loader = CourseLoader { inner };
                        let session = loader.session();
                        if loader.current_course_id().as_deref() != Some(course_id.as_str()) {
                            debug!(course_id = %course_id, "course no longer current, refresh skipped");
                            return;
                        }
                        let outcome = loader.reload_course(&course_id, session).await;
                        debug!(course_id = %course_id, ?outcome, "course refreshed after mutation");
                    }
                },
            );

            Inner {
                engine: OptimisticEngine::new(
                    Arc::clone(&state),
                    Arc::clone(&cache) as Arc<dyn Invalidate>,
                ),
                service,
                cache,
                state,
                loading: LoadingState::new(),
                breaker: CircuitBreaker::new(config.breaker_ceiling, config.breaker_cooldown()),
                scheduler,
                course_lists: RequestCoordinator::new(),
                topic_lists: RequestCoordinator::new(),
                question_lists: RequestCoordinator::new(),
                progress_lists: RequestCoordinator::new(),
                highlight_lists: RequestCoordinator::new(),
                course_loads: RequestCoordinator::new(),
                refresh,
                note_saves: Mutex::new(HashMap::new()),
                note_debounce: config.note_debounce(),
                auto_select: Mutex::new(AutoSelect::default()),
                last_failed: Mutex::new(None),
                session: Arc::new(AtomicU64::new(0)),
                placeholders: AtomicU64::new(0),
                batch_size: config.fetch_batch_size.max(1),
                user_id: config.user_id.clone(),
            }
        });

        info!(user_id = %config.user_id, "course loader ready");
        Self { inner }
    }

    // == Observable State ==
    /// Snapshot of the view state.
    pub fn state(&self) -> ViewState {
        self.inner.state.read().clone()
    }

    pub fn current_course_id(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .current_course
            .as_ref()
            .map(|c| c.id.clone())
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.read().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.inner.state.write().last_error = None;
    }

    pub fn loading(&self) -> &LoadingState {
        &self.inner.loading
    }

    pub fn cache(&self) -> &SessionCache {
        &self.inner.cache
    }

    /// Owned handle on the session cache, for the background sweep.
    pub fn shared_cache(&self) -> Arc<SessionCache> {
        Arc::clone(&self.inner.cache)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    // == Fetch Operations ==
    pub async fn fetch_courses(&self) -> Result<Vec<Course>> {
        self.clear_error();
        let session = self.session();
        let result = self
            .inner
            .loading
            .with_loading(ops::COURSES, self.courses(session))
            .await;
        self.settle(session, result, || RetryTarget::Courses)
    }

    pub async fn fetch_topics(&self, course_id: &str) -> Result<Vec<Topic>> {
        self.clear_error();
        let session = self.session();
        let result = self
            .inner
            .loading
            .with_loading(ops::TOPICS, self.topics(course_id, session))
            .await;
        self.settle(session, result, || RetryTarget::Topics(course_id.to_string()))
    }

    pub async fn fetch_questions(&self, topic_id: &str) -> Result<Vec<Question>> {
        self.clear_error();
        let session = self.session();
        let result = self
            .inner
            .loading
            .with_loading(ops::QUESTIONS, self.questions(topic_id, session))
            .await;
        self.settle(session, result, || RetryTarget::Questions(topic_id.to_string()))
    }

    // == Load Course ==
    /// Publishes course `course_id` as the current course, assembling it on a
    /// cache miss.
    pub async fn load_course(&self, course_id: &str) -> LoadOutcome {
        self.clear_error();
        self.load(course_id, self.session()).await
    }

    async fn load(&self, course_id: &str, session: u64) -> LoadOutcome {
        let key = CacheKey::course(course_id);

        let (course, outcome) = match self.inner.cache.course.get(&key) {
            Some(course) => {
                debug!(course_id, "course served from cache");
                (course, LoadOutcome::Cached)
            }
            None => {
                if !self.inner.breaker.try_attempt(COURSE_LOADS) {
                    return LoadOutcome::Rejected;
                }
                let loader = self.clone();
                let id = course_id.to_string();
                let assembled = self
                    .inner
                    .loading
                    .with_loading(
                        ops::COURSE,
                        self.inner.course_loads.dedupe(&key, move || async move {
                            loader.assemble_course(&id, session).await
                        }),
                    )
                    .await;
                if !self.is_current(session) {
                    debug!(course_id, "course load outlived its session, discarded");
                    return LoadOutcome::Discarded;
                }
                match assembled {
                    Ok(course) => (course, LoadOutcome::Loaded),
                    Err(err) => {
                        let target = RetryTarget::Course(course_id.to_string());
                        self.record_failure(session, target, &err);
                        return LoadOutcome::Failed;
                    }
                }
            }
        };

        if let Some(first) = self.publish_course(course) {
            debug!(course_id, topic_id = %first.id, "auto-selecting first topic");
            self.show_topic(first, session).await;
        }
        outcome
    }

    /// Drops the cached course and its progress, then loads it again.
    pub async fn refresh_course(&self, course_id: &str) -> LoadOutcome {
        self.clear_error();
        self.reload_course(course_id, self.session()).await
    }

    /// Background refresh: leaves `last_error` alone.
    async fn reload_course(&self, course_id: &str, session: u64) -> LoadOutcome {
        let cache = &self.inner.cache;
        cache.invalidate_key(&CacheKey::course(course_id));
        cache.invalidate_key(&CacheKey::progress(course_id, &self.inner.user_id));
        self.load(course_id, session).await
    }

    async fn assemble_course(&self, course_id: &str, session: u64) -> Result<Course> {
        let header = self
            .courses(session)
            .await?
            .into_iter()
            .find(|c| c.id == course_id)
            .ok_or_else(|| LoaderError::NotFound(format!("course '{}'", course_id)))?;
        let mut flat = self.topics(course_id, session).await?;

        let this = self;
        let topic_ids: Vec<String> = flat.iter().map(|t| t.id.clone()).collect();
        let mut questions: HashMap<String, Vec<Question>> = stream::iter(topic_ids)
            .map(move |topic_id| async move {
                let questions = this.questions_or_empty(&topic_id, session).await;
                (topic_id, questions)
            })
            .buffered(self.inner.batch_size)
            .collect()
            .await;

        let completed: HashSet<String> = match self.progress(course_id, session).await {
            Ok(records) => records
                .into_iter()
                .filter(|r| r.completed)
                .map(|r| r.topic_id)
                .collect(),
            Err(err) => {
                warn!(course_id, error = %err, "progress unavailable, topics shown as not completed");
                HashSet::new()
            }
        };

        for topic in &mut flat {
            topic.questions = questions.remove(&topic.id).unwrap_or_default();
            topic.completed = completed.contains(&topic.id);
        }

        let topics = build_tree(&flat);
        let course = Course {
            progress: ProgressSummary::from_tree(&topics),
            topics,
            ..header
        };
        info!(
            course_id,
            topics = flat.len(),
            completed = course.progress.completed,
            "course assembled"
        );

        if self.is_current(session) {
            self.inner
                .cache
                .course
                .set(CacheKey::course(course_id), course.clone());
        }
        Ok(course)
    }

    async fn questions_or_empty(&self, topic_id: &str, session: u64) -> Vec<Question> {
        match self.questions(topic_id, session).await {
            Ok(questions) => questions,
            Err(err) => {
                warn!(topic_id, error = %err, "questions unavailable, topic loaded without them");
                Vec::new()
            }
        }
    }

    /// Sets `course` as current and returns the topic to auto-select, if any.
    fn publish_course(&self, course: Course) -> Option<Topic> {
        let auto_select = {
            let mut auto = self.inner.auto_select.lock();
            if auto.course_id.as_deref() != Some(course.id.as_str()) {
                auto.course_id = Some(course.id.clone());
                auto.done = false;
            }
            if auto.done {
                None
            } else {
                auto.done = true;
                course.topics.first().cloned()
            }
        };

        let mut state = self.inner.state.write();
        let refreshed = state
            .current_topic
            .as_ref()
            .filter(|t| t.course_id == course.id)
            .and_then(|t| find_topic(&course.topics, &t.id))
            .cloned();
        if refreshed.is_some() {
            state.current_topic = refreshed;
        }
        state.current_course = Some(course);
        auto_select
    }

    // == Topic Selection ==
    /// Makes `topic` current, loading its questions when neither embedded
    /// nor cached, then loads its highlights.
    pub async fn set_current_topic(&self, topic: Topic) -> LoadOutcome {
        self.clear_error();
        self.show_topic(topic, self.session()).await
    }

    async fn show_topic(&self, mut topic: Topic, session: u64) -> LoadOutcome {
        let outcome = if !topic.questions.is_empty() {
            LoadOutcome::Cached
        } else if let Some(questions) = self
            .inner
            .cache
            .questions
            .get(&CacheKey::questions(&topic.id))
        {
            topic.questions = questions;
            LoadOutcome::Cached
        } else {
            let fetched = self
                .inner
                .loading
                .with_loading(ops::TOPIC, self.questions(&topic.id, session))
                .await;
            if !self.is_current(session) {
                return LoadOutcome::Discarded;
            }
            match fetched {
                Ok(questions) => {
                    topic.questions = questions;
                    LoadOutcome::Loaded
                }
                Err(err) => {
                    let target = RetryTarget::Topic(Box::new(topic.clone()));
                    self.record_failure(session, target, &err);
                    LoadOutcome::Failed
                }
            }
        };

        let topic_id = topic.id.clone();
        {
            let mut state = self.inner.state.write();
            if outcome == LoadOutcome::Loaded {
                if let Some(node) = state
                    .current_course
                    .as_mut()
                    .filter(|c| c.id == topic.course_id)
                    .and_then(|c| find_topic_mut(&mut c.topics, &topic_id))
                {
                    node.questions = topic.questions.clone();
                }
            }
            state.current_topic = Some(topic);
        }

        if outcome != LoadOutcome::Failed {
            self.show_highlights(&topic_id, session).await;
        }
        outcome
    }

    /// Selects a topic of the current course by id.
    pub async fn select_topic(&self, topic_id: &str) -> Result<LoadOutcome> {
        let topic = {
            let state = self.inner.state.read();
            state
                .current_course
                .as_ref()
                .and_then(|c| find_topic(&c.topics, topic_id))
                .cloned()
        };
        match topic {
            Some(topic) => Ok(self.set_current_topic(topic).await),
            None => Err(LoaderError::NotFound(format!(
                "topic '{}' in the current course",
                topic_id
            ))),
        }
    }

    // == Progress ==
    /// Marks a topic of the current course completed or not.
    ///
    /// The flag and the course percentage change immediately; a change equal
    /// to the current value does nothing. On success the course is refreshed
    /// through the throttled refresh, on failure the flag is rolled back.
    pub async fn mark_topic_completed(&self, topic_id: &str, completed: bool) -> Result<()> {
        let (course_id, was) = {
            let state = self.inner.state.read();
            let course = state
                .current_course
                .as_ref()
                .ok_or_else(|| LoaderError::NotFound("no course loaded".to_string()))?;
            let topic = find_topic(&course.topics, topic_id)
                .ok_or_else(|| LoaderError::NotFound(format!("topic '{}'", topic_id)))?;
            (course.id.clone(), topic.completed)
        };
        if was == completed {
            debug!(topic_id, completed, "completion unchanged");
            return Ok(());
        }
        let session = self.session();

        let service = Arc::clone(&self.inner.service);
        let user_id = self.inner.user_id.clone();
        let id = topic_id.to_string();
        let (apply_id, rollback_id) = (id.clone(), id.clone());

        let intent = MutationIntent::new("mark_topic_completed", async move {
            service
                .upsert_progress(&user_id, &id, completed)
                .await
                .map_err(LoaderError::mutation)
        })
        .apply(move |state: &mut ViewState| {
            state.set_completion(&apply_id, completed);
        })
        .reconcile(|state: &mut ViewState, record: &ProgressRecord| {
            state.set_completion(&record.topic_id, record.completed);
        })
        .rollback(move |state: &mut ViewState| {
            state.set_completion(&rollback_id, was);
        })
        .invalidate(CacheKey::course(&course_id))
        .invalidate(CacheKey::progress(&course_id, &self.inner.user_id));

        self.run_mutation(session, intent).await?;
        if self.is_current(session) {
            self.inner.refresh.call(course_id);
        }
        Ok(())
    }

    // == Highlights ==
    /// Loads the highlights of `topic_id` into the view.
    pub async fn load_highlights(&self, topic_id: &str) -> LoadOutcome {
        self.clear_error();
        self.show_highlights(topic_id, self.session()).await
    }

    async fn show_highlights(&self, topic_id: &str, session: u64) -> LoadOutcome {
        let key = CacheKey::highlights(topic_id, &self.inner.user_id);

        let (highlights, outcome) = match self.inner.cache.highlights.get(&key) {
            Some(highlights) => (highlights, LoadOutcome::Cached),
            None => {
                let fetched = self
                    .inner
                    .loading
                    .with_loading(ops::HIGHLIGHTS, self.highlights(topic_id, session))
                    .await;
                if !self.is_current(session) {
                    return LoadOutcome::Discarded;
                }
                match fetched {
                    Ok(highlights) => (highlights, LoadOutcome::Loaded),
                    Err(err) => {
                        self.record_failure(
                            session,
                            RetryTarget::Highlights(topic_id.to_string()),
                            &err,
                        );
                        return LoadOutcome::Failed;
                    }
                }
            }
        };

        let mut state = self.inner.state.write();
        state.highlights_topic = Some(topic_id.to_string());
        state.highlights = highlights;
        outcome
    }

    /// Stores a new highlight. A placeholder is shown until the service
    /// assigns the real id.
    pub async fn add_highlight(&self, new: NewHighlight) -> Result<Highlight> {
        if let Some(reason) = new.validate() {
            return Err(LoaderError::InvalidRequest(reason));
        }

        let placeholder_id = format!(
            "pending-{}",
            self.inner.placeholders.fetch_add(1, Ordering::Relaxed) + 1
        );
        let placeholder = new
            .clone()
            .into_highlight(placeholder_id.clone(), self.inner.user_id.clone());
        let key = CacheKey::highlights(&new.topic_id, &self.inner.user_id);
        let session = self.session();

        let service = Arc::clone(&self.inner.service);
        let user_id = self.inner.user_id.clone();
        let reconcile_id = placeholder_id.clone();

        let intent = MutationIntent::new("add_highlight", async move {
            service
                .insert_highlight(&user_id, new)
                .await
                .map_err(LoaderError::mutation)
        })
        .apply(move |state: &mut ViewState| state.insert_highlight(placeholder))
        .reconcile(move |state: &mut ViewState, stored: &Highlight| {
            state.replace_highlight(&reconcile_id, stored.clone());
        })
        .rollback(move |state: &mut ViewState| {
            state.remove_highlight(&placeholder_id);
        })
        .invalidate(key);

        self.run_mutation(session, intent).await
    }

    /// Replaces the note of highlight `id`.
    pub async fn update_highlight(&self, id: &str, note: Option<String>) -> Result<Highlight> {
        let session = self.session();
        let shown = {
            let state = self.inner.state.read();
            state
                .find_highlight(id)
                .map(|h| (h.topic_id.clone(), h.note.clone()))
        };

        let service = Arc::clone(&self.inner.service);
        let highlight_id = id.to_string();
        let local_note = note.clone();
        let mut intent = MutationIntent::new("update_highlight", async move {
            service
                .update_highlight(&highlight_id, note)
                .await
                .map_err(LoaderError::mutation)
        })
        .reconcile(|state: &mut ViewState, stored: &Highlight| {
            state.set_highlight_note(&stored.id, stored.note.clone());
        });

        if let Some((topic_id, previous)) = &shown {
            let (apply_id, rollback_id) = (id.to_string(), id.to_string());
            let previous = previous.clone();
            intent = intent
                .apply(move |state: &mut ViewState| state.set_highlight_note(&apply_id, local_note))
                .rollback(move |state: &mut ViewState| {
                    state.set_highlight_note(&rollback_id, previous)
                })
                .invalidate(CacheKey::highlights(topic_id, &self.inner.user_id));
        }

        let stored = self.run_mutation(session, intent).await?;
        if shown.is_none() && self.is_current(session) {
            self.inner.cache.invalidate_kind(CacheKind::Highlights, Some(&stored.topic_id));
        }
        Ok(stored)
    }

    /// Removes highlight `id`.
    pub async fn delete_highlight(&self, id: &str) -> Result<()> {
        let session = self.session();
        let shown = self.inner.state.read().find_highlight(id).cloned();

        let service = Arc::clone(&self.inner.service);
        let highlight_id = id.to_string();
        let mut intent = MutationIntent::new("delete_highlight", async move {
            service
                .delete_highlight(&highlight_id)
                .await
                .map_err(LoaderError::mutation)
        });

        match shown {
            Some(highlight) => {
                let apply_id = id.to_string();
                let key = CacheKey::highlights(&highlight.topic_id, &self.inner.user_id);
                intent = intent
                    .apply(move |state: &mut ViewState| {
                        state.remove_highlight(&apply_id);
                    })
                    .rollback(move |state: &mut ViewState| state.insert_highlight(highlight))
                    .invalidate(key);
                self.run_mutation(session, intent).await?;
            }
            None => {
                self.run_mutation(session, intent).await?;
                if self.is_current(session) {
                    self.inner.cache.invalidate_kind(CacheKind::Highlights, None);
                }
            }
        }
        self.drop_note_saver(id);
        Ok(())
    }

    /// Saves the note of highlight `id` once edits pause; only the last
    /// note of a burst is sent.
    pub fn update_highlight_note_debounced(&self, id: &str, note: Option<String>) {
        let mut saves = self.inner.note_saves.lock();
        saves
            .entry(id.to_string())
            .or_insert_with(|| self.note_saver(id))
            .call(note);
    }

    /// Forgets the note saver of a removed highlight, with any save it had pending.
    fn drop_note_saver(&self, id: &str) {
        let saver = self.inner.note_saves.lock().remove(id);
        if let Some(saver) = saver {
            if self.inner.scheduler.cancel(saver.key()) {
                debug!(highlight_id = id, "pending note save dropped with its highlight");
            }
        }
    }

    fn note_saver(&self, id: &str) -> Debounced<Option<String>> {
        let weak = Arc::downgrade(&self.inner);
        let highlight_id = id.to_string();
        self.inner.scheduler.debounce(
            format!("highlight_note_{}", id),
            self.inner.note_debounce,
            move |note: Option<String>| {
                let weak = weak.clone();
                let highlight_id = highlight_id.clone();
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let loader = CourseLoader { inner };
                    if let Err(err) = loader.update_highlight(&highlight_id, note).await {
                        warn!(highlight_id = %highlight_id, error = %err, "debounced note save failed");
                    }
                }
            },
        )
    }

    // == Cache Control ==
    /// Invalidates cached entries of `kind`, for one id or the whole class.
    pub fn invalidate_cache(&self, kind: CacheKind, id: Option<&str>) -> usize {
        let removed = self.inner.cache.invalidate_kind(kind, id);
        info!(kind = %kind, id, removed, "cache invalidated");
        removed
    }

    /// Clears the error and re-runs the last failed load. Returns `None`
    /// when nothing failed since the last retry.
    pub async fn retry_operation(&self) -> Option<LoadOutcome> {
        let target = self.inner.last_failed.lock().take()?;
        self.clear_error();
        info!(?target, "retrying failed load");

        let outcome = match target {
            RetryTarget::Courses => Self::outcome(self.fetch_courses().await),
            RetryTarget::Topics(course_id) => Self::outcome(self.fetch_topics(&course_id).await),
            RetryTarget::Questions(topic_id) => {
                Self::outcome(self.fetch_questions(&topic_id).await)
            }
            RetryTarget::Course(course_id) => self.load_course(&course_id).await,
            RetryTarget::Topic(topic) => self.set_current_topic(*topic).await,
            RetryTarget::Highlights(topic_id) => self.load_highlights(&topic_id).await,
        };
        Some(outcome)
    }

    /// Ends the session: pending timers, breaker windows, caches, in-flight
    /// registrations, loading flags and view state are all dropped.
    pub fn logout(&self) {
        let inner = &self.inner;
        inner.session.fetch_add(1, Ordering::AcqRel);
        inner.scheduler.cancel_all();
        inner.note_saves.lock().clear();
        inner.breaker.reset();
        inner.cache.clear();
        inner.loading.clear();
        inner.course_lists.clear();
        inner.topic_lists.clear();
        inner.question_lists.clear();
        inner.progress_lists.clear();
        inner.highlight_lists.clear();
        inner.course_loads.clear();
        *inner.state.write() = ViewState::default();
        *inner.auto_select.lock() = AutoSelect::default();
        *inner.last_failed.lock() = None;
        info!(user_id = %inner.user_id, "session cleared");
    }

    // == Session ==
    fn session(&self) -> u64 {
        self.inner.session.load(Ordering::Acquire)
    }

    fn is_current(&self, session: u64) -> bool {
        self.session() == session
    }

    // == Cached Fetchers ==
    async fn courses(&self, session: u64) -> Result<Vec<Course>> {
        let service = Arc::clone(&self.inner.service);
        self.cached_fetch(
            &self.inner.cache.courses,
            &self.inner.course_lists,
            CacheKey::courses(),
            session,
            move || async move { service.list_courses().await },
        )
        .await
    }

    async fn topics(&self, course_id: &str, session: u64) -> Result<Vec<Topic>> {
        let service = Arc::clone(&self.inner.service);
        let id = course_id.to_string();
        self.cached_fetch(
            &self.inner.cache.topics,
            &self.inner.topic_lists,
            CacheKey::topics(course_id),
            session,
            move || async move { service.list_topics(&id).await },
        )
        .await
    }

    async fn questions(&self, topic_id: &str, session: u64) -> Result<Vec<Question>> {
        let service = Arc::clone(&self.inner.service);
        let id = topic_id.to_string();
        self.cached_fetch(
            &self.inner.cache.questions,
            &self.inner.question_lists,
            CacheKey::questions(topic_id),
            session,
            move || async move { service.list_questions(&id).await },
        )
        .await
    }

    async fn progress(&self, course_id: &str, session: u64) -> Result<Vec<ProgressRecord>> {
        let service = Arc::clone(&self.inner.service);
        let (course, user) = (course_id.to_string(), self.inner.user_id.clone());
        self.cached_fetch(
            &self.inner.cache.progress,
            &self.inner.progress_lists,
            CacheKey::progress(course_id, &self.inner.user_id),
            session,
            move || async move { service.list_progress(&user, &course).await },
        )
        .await
    }

    async fn highlights(&self, topic_id: &str, session: u64) -> Result<Vec<Highlight>> {
        let service = Arc::clone(&self.inner.service);
        let (topic, user) = (topic_id.to_string(), self.inner.user_id.clone());
        self.cached_fetch(
            &self.inner.cache.highlights,
            &self.inner.highlight_lists,
            CacheKey::highlights(topic_id, &self.inner.user_id),
            session,
            move || async move { service.list_highlights(&topic, &user).await },
        )
        .await
    }

    /// Serves `key` from `cache`, or fetches it once for every concurrent
    /// caller. The result is cached only if the session is still `session`.
    async fn cached_fetch<T, F, Fut>(
        &self,
        cache: &TtlCache<T>,
        requests: &RequestCoordinator<T>,
        key: String,
        session: u64,
        fetch: F,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if let Some(hit) = cache.get(&key) {
            return Ok(hit);
        }
        let value = requests
            .dedupe(&key, || fetch().map(|result| result.map_err(LoaderError::fetch)))
            .await?;
        if self.is_current(session) {
            cache.set(key, value.clone());
        } else {
            debug!(key = %key, "fetch outlived its session, not cached");
        }
        Ok(value)
    }

    // == Error Slot ==
    async fn run_mutation<R>(
        &self,
        session: u64,
        intent: MutationIntent<ViewState, R>,
    ) -> Result<R> {
        self.clear_error();
        let generation = Arc::clone(&self.inner.session);
        let intent = intent.while_live(move || generation.load(Ordering::Acquire) == session);
        let result = self.inner.engine.mutate(intent).await;
        if let Err(err) = &result {
            if self.is_current(session) {
                self.inner.state.write().last_error = Some(err.to_string());
            }
        }
        result
    }

    fn settle<T>(
        &self,
        session: u64,
        result: Result<T>,
        target: impl FnOnce() -> RetryTarget,
    ) -> Result<T> {
        if let Err(err) = &result {
            self.record_failure(session, target(), err);
        }
        result
    }

    fn record_failure(&self, session: u64, target: RetryTarget, err: &LoaderError) {
        warn!(?target, error = %err, "load failed");
        if !self.is_current(session) {
            return;
        }
        *self.inner.last_failed.lock() = Some(target);
        self.inner.state.write().last_error = Some(err.to_string());
    }

    fn outcome<T>(result: Result<T>) -> LoadOutcome {
        match result {
            Ok(_) => LoadOutcome::Loaded,
            Err(_) => LoadOutcome::Failed,
        }
    }
}
