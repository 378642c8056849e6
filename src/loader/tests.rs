use super::*;
use crate::service::{MemoryDataService, SeedData};
use tokio::time::{advance, sleep};

fn seed() -> SeedData {
    SeedData {
        courses: vec![Course::new("c1", "Rust"), Course::new("c2", "Go")],
        topics: vec![
            Topic::new("t1", "c1", None, "Ownership").with_order(0),
            Topic::new("t2", "c1", Some("t1"), "Borrowing").with_order(0),
            Topic::new("t3", "c1", None, "Lifetimes").with_order(1),
            Topic::new("g1", "c2", None, "Goroutines"),
        ],
        questions: vec![
            Question::new("q1", "t1", "What moves?"),
            Question::new("q2", "t2", "What borrows?"),
            Question::new("q3", "t3", "What outlives?"),
        ],
        progress: vec![ProgressRecord {
            user_id: "u1".to_string(),
            topic_id: "t2".to_string(),
            completed: true,
            completed_at: None,
        }],
        highlights: Vec::new(),
    }
}

fn config() -> Config {
    Config {
        user_id: "u1".to_string(),
        ..Config::default()
    }
}

fn setup_with(config: Config) -> (Arc<MemoryDataService>, CourseLoader) {
    let service = Arc::new(MemoryDataService::new(seed()));
    let loader = CourseLoader::new(service.clone(), &config);
    (service, loader)
}

fn setup() -> (Arc<MemoryDataService>, CourseLoader) {
    setup_with(config())
}

fn new_highlight(start: usize) -> NewHighlight {
    NewHighlight {
        topic_id: "t1".to_string(),
        highlighted_text: "ownership".to_string(),
        position_start: start,
        position_end: start + 9,
        context_before: None,
        context_after: None,
        note: None,
    }
}

fn topic_in_view(loader: &CourseLoader, id: &str) -> Topic {
    let state = loader.state();
    let course = state.current_course.expect("course loaded");
    find_topic(&course.topics, id).cloned().expect("topic in tree")
}

// == Load Course ==

#[tokio::test(start_paused = true)]
async fn test_load_course_assembles_tree_and_auto_selects() {
    let (service, loader) = setup();

    assert_eq!(loader.load_course("c1").await, LoadOutcome::Loaded);

    let state = loader.state();
    let course = state.current_course.unwrap();
    assert_eq!(course.title, "Rust");
    let roots: Vec<_> = course.topics.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(roots, vec!["t1", "t3"]);
    assert_eq!(course.topics[0].children[0].id, "t2");
    assert_eq!(course.topics[0].children[0].level, 1);
    assert!(course.topics[0].children[0].completed);
    assert_eq!(course.topics[0].questions.len(), 1);

    assert_eq!(course.progress.completed, 1);
    assert_eq!(course.progress.total, 3);

    let current = state.current_topic.unwrap();
    assert_eq!(current.id, "t1");
    assert_eq!(state.highlights_topic.as_deref(), Some("t1"));
    assert!(state.last_error.is_none());

    assert_eq!(service.calls("list_questions"), 3);
    assert!(loader.cache().course.contains("course_c1"));
    assert!(!loader.loading().is_any_loading());
}

#[tokio::test(start_paused = true)]
async fn test_second_load_is_served_from_cache() {
    let (service, loader) = setup();
    loader.load_course("c1").await;

    assert_eq!(loader.load_course("c1").await, LoadOutcome::Cached);
    assert_eq!(service.calls("list_topics"), 1);
    assert_eq!(loader.breaker().in_flight(COURSE_LOADS), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_loads_share_one_fetch() {
    let (service, loader) = setup();
    service.set_latency(Duration::from_millis(50));

    let (a, b) = tokio::join!(loader.load_course("c1"), loader.load_course("c1"));

    assert_eq!(a, LoadOutcome::Loaded);
    assert_eq!(b, LoadOutcome::Loaded);
    assert_eq!(service.calls("list_courses"), 1);
    assert_eq!(service.calls("list_topics"), 1);
    assert_eq!(service.calls("list_questions"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_question_fetch_is_isolated_to_its_topic() {
    let (service, loader) = setup();
    service.fail_on("list_questions", Some("t2"));

    assert_eq!(loader.load_course("c1").await, LoadOutcome::Loaded);

    assert!(topic_in_view(&loader, "t2").questions.is_empty());
    assert_eq!(topic_in_view(&loader, "t1").questions.len(), 1);
    assert!(loader.last_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_missing_progress_counts_nothing_completed() {
    let (service, loader) = setup();
    service.fail_on("list_progress", None);

    assert_eq!(loader.load_course("c1").await, LoadOutcome::Loaded);

    let course = loader.state().current_course.unwrap();
    assert_eq!(course.progress.completed, 0);
    assert!(!topic_in_view(&loader, "t2").completed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_load_sets_error_and_retry_recovers() {
    let (service, loader) = setup();
    service.fail_on("list_topics", Some("c1"));

    assert_eq!(loader.load_course("c1").await, LoadOutcome::Failed);
    let error = loader.last_error().unwrap();
    assert!(error.contains("list_topics failed"), "unexpected error: {}", error);
    assert!(!loader.loading().is_loading(ops::COURSE));
    assert!(loader.state().current_course.is_none());

    service.clear_failures();
    assert_eq!(loader.retry_operation().await, Some(LoadOutcome::Loaded));
    assert!(loader.last_error().is_none());
    assert_eq!(loader.current_course_id().as_deref(), Some("c1"));

    // Nothing left to retry
    assert_eq!(loader.retry_operation().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_course_is_not_found() {
    let (_service, loader) = setup();

    assert_eq!(loader.load_course("nope").await, LoadOutcome::Failed);
    assert!(loader.last_error().unwrap().contains("nope"));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_rejects_runaway_reloads_then_heals() {
    let (service, loader) = setup_with(Config {
        breaker_ceiling: 2,
        ..config()
    });
    service.fail_on("list_topics", None);

    assert_eq!(loader.load_course("c1").await, LoadOutcome::Failed);
    assert_eq!(loader.load_course("c1").await, LoadOutcome::Failed);
    assert_eq!(loader.load_course("c1").await, LoadOutcome::Rejected);
    assert_eq!(service.calls("list_topics"), 2);

    service.clear_failures();
    advance(Duration::from_millis(5000)).await;
    assert_eq!(loader.load_course("c1").await, LoadOutcome::Loaded);
}

#[tokio::test(start_paused = true)]
async fn test_auto_selection_is_one_shot_per_course() {
    let (_service, loader) = setup();
    loader.load_course("c1").await;

    let t3 = topic_in_view(&loader, "t3");
    assert_eq!(loader.set_current_topic(t3).await, LoadOutcome::Cached);

    // Same course reloaded: selection kept
    assert_eq!(loader.refresh_course("c1").await, LoadOutcome::Loaded);
    assert_eq!(loader.state().current_topic.unwrap().id, "t3");

    // Course change re-arms it
    loader.load_course("c2").await;
    assert_eq!(loader.state().current_topic.unwrap().id, "g1");
    assert_eq!(loader.load_course("c1").await, LoadOutcome::Cached);
    assert_eq!(loader.state().current_topic.unwrap().id, "t1");
}

// == Topic Selection ==

#[tokio::test(start_paused = true)]
async fn test_topic_question_failure_and_retry() {
    let (service, loader) = setup();
    service.fail_on("list_questions", Some("t3"));
    loader.load_course("c1").await;

    let t3 = topic_in_view(&loader, "t3");
    assert_eq!(loader.set_current_topic(t3).await, LoadOutcome::Failed);
    assert_eq!(loader.state().current_topic.unwrap().id, "t3");
    assert!(loader.last_error().is_some());

    service.clear_failures();
    assert_eq!(loader.retry_operation().await, Some(LoadOutcome::Loaded));

    let state = loader.state();
    assert_eq!(state.current_topic.unwrap().questions.len(), 1);
    assert_eq!(topic_in_view(&loader, "t3").questions.len(), 1);
    assert_eq!(state.highlights_topic.as_deref(), Some("t3"));
}

#[tokio::test(start_paused = true)]
async fn test_select_topic_outside_course() {
    let (_service, loader) = setup();
    assert!(matches!(
        loader.select_topic("t1").await,
        Err(LoaderError::NotFound(_))
    ));

    loader.load_course("c1").await;
    assert_eq!(loader.select_topic("t2").await, Ok(LoadOutcome::Cached));
    assert!(loader.select_topic("g1").await.is_err());
}

// == Progress ==

#[tokio::test(start_paused = true)]
async fn test_mark_topic_completed_twice_recomputes_once() {
    let (service, loader) = setup();
    loader.load_course("c1").await;

    loader.mark_topic_completed("t1", true).await.unwrap();
    loader.mark_topic_completed("t1", true).await.unwrap();

    let state = loader.state();
    assert!(state.current_topic.unwrap().completed);
    assert_eq!(state.progress_revision, 1);
    assert_eq!(service.calls("upsert_progress"), 1);

    let progress = state.current_course.unwrap().progress;
    assert_eq!(progress.completed, 2);
    assert!((progress.percentage - 200.0 / 3.0).abs() < 1e-9);

    // Throttled refresh picks up the stored progress
    sleep(Duration::from_millis(10)).await;
    assert_eq!(service.calls("list_progress"), 2);
    assert!(topic_in_view(&loader, "t1").completed);

    let course = loader.state().current_course.unwrap();
    assert_eq!(course.progress, ProgressSummary::from_tree(&course.topics));
}

#[tokio::test(start_paused = true)]
async fn test_rapid_marks_collapse_into_one_refresh() {
    let (service, loader) = setup();
    loader.load_course("c1").await;

    loader.mark_topic_completed("t1", true).await.unwrap();
    loader.mark_topic_completed("t3", true).await.unwrap();
    loader.mark_topic_completed("t2", false).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(service.calls("upsert_progress"), 3);
    assert_eq!(service.calls("list_progress"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_incremental_progress_matches_recount() {
    let (_service, loader) = setup();
    loader.load_course("c1").await;

    for (id, completed) in [("t1", true), ("t2", false), ("t3", true), ("t1", false)] {
        loader.mark_topic_completed(id, completed).await.unwrap();
        let course = loader.state().current_course.unwrap();
        assert_eq!(course.progress, ProgressSummary::from_tree(&course.topics));
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_mark_rolls_back() {
    let (service, loader) = setup();
    loader.load_course("c1").await;
    service.fail_on("upsert_progress", None);

    let result = loader.mark_topic_completed("t1", true).await;

    assert!(matches!(result, Err(LoaderError::Mutation(_))));
    assert!(!topic_in_view(&loader, "t1").completed);
    let state = loader.state();
    assert_eq!(state.current_course.unwrap().progress.completed, 1);
    assert!(state.last_error.is_some());
    assert!(loader.cache().course.contains("course_c1"));
}

#[tokio::test(start_paused = true)]
async fn test_mark_requires_loaded_topic() {
    let (_service, loader) = setup();
    assert!(matches!(
        loader.mark_topic_completed("t1", true).await,
        Err(LoaderError::NotFound(_))
    ));
}

// == Highlights ==

#[tokio::test(start_paused = true)]
async fn test_add_highlight_shows_placeholder_until_stored() {
    let (service, loader) = setup();
    loader.load_course("c1").await;
    assert!(loader.cache().highlights.contains("highlights_t1_u1"));
    service.set_latency(Duration::from_millis(50));

    let observer = async {
        sleep(Duration::from_millis(10)).await;
        let ids: Vec<_> = loader.state().highlights.into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["pending-1".to_string()]);
    };
    let (stored, ()) = tokio::join!(loader.add_highlight(new_highlight(4)), observer);

    let stored = stored.unwrap();
    assert_eq!(stored.id, "h-1");
    let ids: Vec<_> = loader.state().highlights.into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec!["h-1".to_string()]);
    assert!(!loader.cache().highlights.contains("highlights_t1_u1"));
}

#[tokio::test(start_paused = true)]
async fn test_add_highlight_failure_removes_placeholder() {
    let (service, loader) = setup();
    loader.load_course("c1").await;
    service.fail_on("insert_highlight", None);

    assert!(loader.add_highlight(new_highlight(4)).await.is_err());
    assert!(loader.state().highlights.is_empty());
    assert!(loader.last_error().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_add_highlight_rejects_bad_range() {
    let (service, loader) = setup();
    let mut bad = new_highlight(4);
    bad.position_end = 2;

    assert!(matches!(
        loader.add_highlight(bad).await,
        Err(LoaderError::InvalidRequest(_))
    ));
    assert_eq!(service.calls("insert_highlight"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_highlights_stay_ordered_and_can_be_edited() {
    let (_service, loader) = setup();
    loader.load_course("c1").await;

    let late = loader.add_highlight(new_highlight(40)).await.unwrap();
    let early = loader.add_highlight(new_highlight(2)).await.unwrap();

    let ids: Vec<_> = loader.state().highlights.into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![early.id.clone(), late.id.clone()]);

    let updated = loader
        .update_highlight(&late.id, Some("remember".to_string()))
        .await
        .unwrap();
    assert_eq!(updated.note.as_deref(), Some("remember"));

    loader.delete_highlight(&early.id).await.unwrap();
    let state = loader.state();
    assert_eq!(state.highlights.len(), 1);
    assert_eq!(state.highlights[0].note.as_deref(), Some("remember"));

    // Reload from the service sees the same list
    assert_eq!(loader.load_highlights("t1").await, LoadOutcome::Loaded);
    assert_eq!(loader.state().highlights.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_delete_restores_highlight() {
    let (service, loader) = setup();
    loader.load_course("c1").await;
    let stored = loader.add_highlight(new_highlight(4)).await.unwrap();
    service.fail_on("delete_highlight", None);

    assert!(loader.delete_highlight(&stored.id).await.is_err());
    assert_eq!(loader.state().highlights.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_note_saves_last_edit_once() {
    let (service, loader) = setup();
    loader.load_course("c1").await;
    let stored = loader.add_highlight(new_highlight(4)).await.unwrap();

    for note in ["r", "re", "rem"] {
        loader.update_highlight_note_debounced(&stored.id, Some(note.to_string()));
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(service.calls("update_highlight"), 0);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(service.calls("update_highlight"), 1);
    assert_eq!(loader.state().highlights[0].note.as_deref(), Some("rem"));
}

// == Cache Control ==

#[tokio::test(start_paused = true)]
async fn test_invalidate_cache_forces_refetch() {
    let (service, loader) = setup();
    loader.load_course("c1").await;

    assert_eq!(loader.invalidate_cache(CacheKind::Course, Some("c1")), 1);
    assert_eq!(loader.invalidate_cache(CacheKind::Topics, None), 1);

    assert_eq!(loader.load_course("c1").await, LoadOutcome::Loaded);
    assert_eq!(service.calls("list_topics"), 2);
    // Questions were still cached
    assert_eq!(service.calls("list_questions"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_operations_are_cached() {
    let (service, loader) = setup();

    assert_eq!(loader.fetch_courses().await.unwrap().len(), 2);
    assert_eq!(loader.fetch_courses().await.unwrap().len(), 2);
    assert_eq!(loader.fetch_topics("c1").await.unwrap().len(), 3);
    assert_eq!(loader.fetch_questions("t1").await.unwrap().len(), 1);
    assert_eq!(service.calls("list_courses"), 1);

    service.fail_on("list_topics", None);
    assert!(loader.fetch_topics("c2").await.is_err());
    assert!(loader.last_error().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_logout_resets_session() {
    let (service, loader) = setup();
    loader.load_course("c1").await;
    let stored = loader.add_highlight(new_highlight(4)).await.unwrap();
    loader.update_highlight_note_debounced(&stored.id, Some("pending".to_string()));

    loader.logout();

    let state = loader.state();
    assert!(state.current_course.is_none());
    assert!(state.highlights.is_empty());
    assert_eq!(loader.cache().total_stats().total_entries, 0);
    assert!(loader.cache().course.is_empty());

    // The pending note save was discarded
    sleep(Duration::from_secs(1)).await;
    assert_eq!(service.calls("update_highlight"), 0);

    // A new session auto-selects again
    loader.load_course("c1").await;
    assert_eq!(loader.state().current_topic.unwrap().id, "t1");
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_load_is_not_undone() {
    let (service, loader) = setup();
    service.set_latency(Duration::from_millis(100));

    let pending = tokio::spawn({
        let loader = loader.clone();
        async move { loader.load_course("c1").await }
    });
    // Topics are still in flight
    sleep(Duration::from_millis(150)).await;
    loader.logout();

    assert_eq!(pending.await.unwrap(), LoadOutcome::Discarded);
    let state = loader.state();
    assert!(state.current_course.is_none());
    assert!(state.current_topic.is_none());
    assert!(state.last_error.is_none());
    assert!(loader.cache().course.is_empty());
    assert!(loader.cache().topics.is_empty());
    assert!(loader.cache().questions.is_empty());
    assert!(!loader.loading().is_any_loading());
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_mutation_keeps_new_session_clean() {
    let (service, loader) = setup();
    loader.load_course("c1").await;
    service.set_latency(Duration::from_millis(100));
    service.fail_on("insert_highlight", None);

    let pending = tokio::spawn({
        let loader = loader.clone();
        async move { loader.add_highlight(new_highlight(4)).await }
    });
    sleep(Duration::from_millis(50)).await;
    assert_eq!(loader.state().highlights.len(), 1);
    loader.logout();

    assert!(pending.await.unwrap().is_err());
    assert!(loader.last_error().is_none());
    assert!(loader.state().highlights.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deleting_highlight_drops_its_note_saver() {
    let (service, loader) = setup();
    loader.load_course("c1").await;
    let stored = loader.add_highlight(new_highlight(4)).await.unwrap();
    loader.update_highlight_note_debounced(&stored.id, Some("draft".to_string()));
    assert_eq!(loader.inner.note_saves.lock().len(), 1);

    loader.delete_highlight(&stored.id).await.unwrap();
    assert!(loader.inner.note_saves.lock().is_empty());

    sleep(Duration::from_secs(1)).await;
    assert_eq!(service.calls("update_highlight"), 0);
}

// == Batching and Background Refresh ==

#[tokio::test(start_paused = true)]
async fn test_question_fetches_run_in_bounded_batches() {
    for batch_size in [5, 3] {
        let (service, loader) = setup_with(Config {
            fetch_batch_size: batch_size,
            ..config()
        });
        let topics = (0..12)
            .map(|i| Topic::new(format!("b{i}"), "c1", None, format!("Topic {i}")).with_order(i))
            .collect();
        service.replace_topics("c1", topics);
        service.set_latency(Duration::from_millis(100));

        assert_eq!(loader.load_course("c1").await, LoadOutcome::Loaded);
        assert_eq!(service.calls("list_questions"), 12);
        assert_eq!(service.peak_in_flight("list_questions"), batch_size);
    }
}

#[tokio::test(start_paused = true)]
async fn test_background_refresh_keeps_unseen_error() {
    let (service, loader) = setup();
    loader.load_course("c1").await;
    service.fail_on("list_highlights", None);
    assert_eq!(loader.load_highlights("t3").await, LoadOutcome::Failed);
    let error = loader.last_error().expect("highlight failure recorded");

    let session = loader.session();
    assert_eq!(loader.reload_course("c1", session).await, LoadOutcome::Loaded);

    assert_eq!(loader.last_error(), Some(error));
    assert!(loader.cache().course.contains(&CacheKey::course("c1")));
    assert_eq!(service.calls("list_progress"), 2);
}
