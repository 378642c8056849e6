//! Cache Keys
//!
//! Deterministic key composition from entity type and identifying parameters.
//! Cache and request coordinator correctness depends only on key uniqueness,
//! so keys are built here and nowhere else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// == Cache Kind ==
/// Entity class a cache key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Courses,
    Course,
    Topics,
    Questions,
    Progress,
    Highlights,
}

impl CacheKind {
    pub const ALL: [CacheKind; 6] = [
        CacheKind::Courses,
        CacheKind::Course,
        CacheKind::Topics,
        CacheKind::Questions,
        CacheKind::Progress,
        CacheKind::Highlights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Courses => "courses",
            CacheKind::Course => "course",
            CacheKind::Topics => "topics",
            CacheKind::Questions => "questions",
            CacheKind::Progress => "progress",
            CacheKind::Highlights => "highlights",
        }
    }

    /// Classifies a key produced by [`CacheKey`].
    pub fn of_key(key: &str) -> Option<Self> {
        if key == CacheKind::Courses.as_str() {
            return Some(CacheKind::Courses);
        }
        let (prefix, _) = key.split_once('_')?;
        match prefix {
            "course" => Some(CacheKind::Course),
            "topics" => Some(CacheKind::Topics),
            "questions" => Some(CacheKind::Questions),
            "progress" => Some(CacheKind::Progress),
            "highlights" => Some(CacheKind::Highlights),
            _ => None,
        }
    }

    /// Whether `key` is the key of this kind for `id`, or one of its
    /// per-user variants (`<kind>_<id>_<user>`).
    pub fn matches(&self, key: &str, id: &str) -> bool {
        if *self == CacheKind::Courses {
            return key == self.as_str();
        }
        let Some(rest) = key
            .strip_prefix(self.as_str())
            .and_then(|r| r.strip_prefix('_'))
        else {
            return false;
        };
        match rest.strip_prefix(id) {
            Some("") => true,
            Some(tail) => tail.starts_with('_'),
            None => false,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown cache kind: {}", s))
    }
}

// == Cache Key ==
/// Key constructors, one per entity class.
pub struct CacheKey;

impl CacheKey {
    pub fn courses() -> String {
        CacheKind::Courses.as_str().to_string()
    }

    pub fn course(course_id: &str) -> String {
        format!("course_{}", course_id)
    }

    pub fn topics(course_id: &str) -> String {
        format!("topics_{}", course_id)
    }

    pub fn questions(topic_id: &str) -> String {
        format!("questions_{}", topic_id)
    }

    pub fn progress(course_id: &str, user_id: &str) -> String {
        format!("progress_{}_{}", course_id, user_id)
    }

    pub fn highlights(topic_id: &str, user_id: &str) -> String {
        format!("highlights_{}_{}", topic_id, user_id)
    }
}
