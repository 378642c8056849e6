//! Session Cache Module
//!
//! One TTL store per entity class, created with the session and cleared on
//! logout. Short TTLs for mutable per-user data, long ones for near-static data.

use std::time::Duration;

use crate::cache::{CacheKind, CacheStats, TtlCache};
use crate::config::Config;
use crate::domain::{Course, Highlight, ProgressRecord, Question, Topic};

// == Invalidate ==
/// Key-based invalidation target used by the optimistic mutation engine.
pub trait Invalidate: Send + Sync {
    /// Removes one key. Returns whether something was removed.
    fn invalidate_key(&self, key: &str) -> bool;

    /// Removes everything.
    fn invalidate_all(&self);
}

impl<T: Clone + Send> Invalidate for TtlCache<T> {
    fn invalidate_key(&self, key: &str) -> bool {
        self.invalidate(Some(key)) > 0
    }

    fn invalidate_all(&self) {
        self.invalidate(None);
    }
}

// == Session Cache ==
#[derive(Debug)]
pub struct SessionCache {
    pub courses: TtlCache<Vec<Course>>,
    pub course: TtlCache<Course>,
    pub topics: TtlCache<Vec<Topic>>,
    pub questions: TtlCache<Vec<Question>>,
    pub progress: TtlCache<Vec<ProgressRecord>>,
    pub highlights: TtlCache<Vec<Highlight>>,
}

impl SessionCache {
    pub fn from_config(config: &Config) -> Self {
        let secs = Duration::from_secs;
        Self {
            courses: TtlCache::new("courses", secs(config.course_list_ttl)),
            course: TtlCache::new("course", secs(config.course_ttl)),
            topics: TtlCache::new("topics", secs(config.course_ttl)),
            questions: TtlCache::new("questions", secs(config.question_ttl)),
            progress: TtlCache::new("progress", secs(config.progress_ttl)),
            highlights: TtlCache::new("highlights", secs(config.highlight_ttl)),
        }
    }

    fn store(&self, kind: CacheKind) -> &dyn Invalidate {
        match kind {
            CacheKind::Courses => &self.courses,
            CacheKind::Course => &self.course,
            CacheKind::Topics => &self.topics,
            CacheKind::Questions => &self.questions,
            CacheKind::Progress => &self.progress,
            CacheKind::Highlights => &self.highlights,
        }
    }

    // == Invalidate Kind ==
    /// Invalidates the entries of `kind` for `id` (including per-user
    /// variants), or the whole class when `id` is `None`.
    pub fn invalidate_kind(&self, kind: CacheKind, id: Option<&str>) -> usize {
        let Some(id) = id else {
            let removed = self.len_of(kind);
            self.store(kind).invalidate_all();
            return removed;
        };
        let matches = |key: &str| kind.matches(key, id);
        match kind {
            CacheKind::Courses => self.courses.invalidate_where(matches),
            CacheKind::Course => self.course.invalidate_where(matches),
            CacheKind::Topics => self.topics.invalidate_where(matches),
            CacheKind::Questions => self.questions.invalidate_where(matches),
            CacheKind::Progress => self.progress.invalidate_where(matches),
            CacheKind::Highlights => self.highlights.invalidate_where(matches),
        }
    }

    fn len_of(&self, kind: CacheKind) -> usize {
        match kind {
            CacheKind::Courses => self.courses.len(),
            CacheKind::Course => self.course.len(),
            CacheKind::Topics => self.topics.len(),
            CacheKind::Questions => self.questions.len(),
            CacheKind::Progress => self.progress.len(),
            CacheKind::Highlights => self.highlights.len(),
        }
    }

    /// Drops every cached entity (logout).
    pub fn clear(&self) {
        for kind in CacheKind::ALL {
            self.store(kind).invalidate_all();
        }
    }

    /// Sweeps expired entries from every store.
    pub fn cleanup_expired(&self) -> usize {
        self.courses.cleanup_expired()
            + self.course.cleanup_expired()
            + self.topics.cleanup_expired()
            + self.questions.cleanup_expired()
            + self.progress.cleanup_expired()
            + self.highlights.cleanup_expired()
    }

    /// Per-store statistics, in `CacheKind::ALL` order.
    pub fn stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.courses.name(), self.courses.stats()),
            (self.course.name(), self.course.stats()),
            (self.topics.name(), self.topics.stats()),
            (self.questions.name(), self.questions.stats()),
            (self.progress.name(), self.progress.stats()),
            (self.highlights.name(), self.highlights.stats()),
        ]
    }

    pub fn total_stats(&self) -> CacheStats {
        let mut total = CacheStats::new();
        for (_, stats) in self.stats() {
            total.merge(&stats);
        }
        total
    }
}

impl Invalidate for SessionCache {
    fn invalidate_key(&self, key: &str) -> bool {
        match CacheKind::of_key(key) {
            Some(kind) => self.store(kind).invalidate_key(key),
            None => false,
        }
    }

    fn invalidate_all(&self) {
        self.clear();
    }
}
