//! Integration tests against live PostgreSQL and Redis.
//!
//! Configure DATABASE_URL and REDIS_URL (plus the other required variables)
//! and run with: cargo test --test integration_test -- --ignored

mod helpers;

use axum::http::StatusCode;
use sqlx::PgPool;
use uuid::Uuid;
use viralspot::app_state::Settings;
use viralspot::config::AppConfig;
use viralspot::db::content_queries::ContentUpsert;
use viralspot::db::profile_queries::{PrimaryProfileUpsert, SecondaryProfileUpsert};
use viralspot::db::{content_queries, profile_queries, queue_queries};
use viralspot::models::queue::{Admission, Priority, QueueEntry, QueueStatus};
use viralspot::services::admission;
use viralspot::services::queue::JobQueue;

use helpers::{live_state, live_state_with, router, send, unique_username};

async fn insert_primary(pool: &PgPool, username: &str) {
    let mut tx = pool.begin().await.unwrap();
    profile_queries::upsert_primary_profile(
        &mut tx,
        &PrimaryProfileUpsert {
            username: username.to_string(),
            followers: 1_000,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
}

async fn queue_rows(pool: &PgPool, username: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM queue WHERE username = $1")
        .bind(username)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn insert_reels(pool: &PgPool, username: &str, count: i64) {
    let mut tx = pool.begin().await.unwrap();
    for i in 0..count {
        content_queries::upsert_content(
            &mut tx,
            &ContentUpsert {
                content_id: format!("{username}-{i}"),
                username: username.to_string(),
                content_type: "reel".to_string(),
                view_count: 100 * (i + 1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }
    tx.commit().await.unwrap();
}

async fn insert_row(pool: &PgPool, username: &str, source: &str, priority: Priority) -> QueueEntry {
    queue_queries::insert_entry(pool, username, source, priority, &admission::new_request_id())
        .await
        .unwrap()
}

async fn reload(pool: &PgPool, entry: &QueueEntry) -> QueueEntry {
    queue_queries::get_by_request_id(pool, &entry.request_id)
        .await
        .unwrap()
        .expect("queue row should exist")
}

/// Move a row's admission time to a fixed minute of 1990 and reload it.
async fn admit_at_minute(pool: &PgPool, entry: &QueueEntry, minute: i32) -> QueueEntry {
    sqlx::query(
        "UPDATE queue SET timestamp = TIMESTAMPTZ '1990-01-01 00:00:00+00' \
         + ($2::int * INTERVAL '1 minute') WHERE id = $1",
    )
    .bind(entry.id)
    .bind(minute)
    .execute(pool)
    .await
    .unwrap();

    reload(pool, entry).await
}

/// Backdate `updated_at` as if the claiming worker died long ago.
async fn age_row(pool: &PgPool, id: Uuid, attempts: i32) {
    sqlx::query(
        "UPDATE queue SET updated_at = NOW() - INTERVAL '2 days', attempts = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(attempts)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn processed_profile_is_never_queued() {
    let state = live_state().await;
    let username = unique_username("done");
    insert_primary(&state.db, &username).await;

    let admission = admission::request_profile(&state.db, &state.queue, &username, "test")
        .await
        .unwrap();

    assert!(matches!(admission, Admission::AlreadyProcessed { .. }));
    assert_eq!(queue_rows(&state.db, &username).await, 0);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn repeated_request_reuses_the_active_row() {
    let state = live_state().await;
    let username = unique_username("fresh");

    let first = admission::request_profile(&state.db, &state.queue, &username, "test")
        .await
        .unwrap();
    let Admission::Queued {
        request_id,
        priority,
        estimated_position,
        ..
    } = first
    else {
        panic!("expected a new queue row, got {first:?}");
    };
    assert_eq!(priority, Priority::High);
    assert!(estimated_position >= 1);

    let second = admission::request_profile(&state.db, &state.queue, &username, "test")
        .await
        .unwrap();
    match second {
        Admission::AlreadyQueued {
            request_id: again,
            status,
            ..
        } => {
            assert_eq!(again, request_id);
            assert_eq!(status, QueueStatus::Pending);
        }
        other => panic!("expected the existing row, got {other:?}"),
    }

    assert_eq!(queue_rows(&state.db, &username).await, 1);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn claim_is_exclusive_and_failures_are_bounded() {
    let state = live_state().await;
    let username = unique_username("retry");
    let entry = queue_queries::insert_entry(
        &state.db,
        &username,
        "test",
        Priority::Low,
        &admission::new_request_id(),
    )
    .await
    .unwrap();

    for attempt in 1..=3 {
        let claimed = queue_queries::claim_entry(&state.db, entry.id)
            .await
            .unwrap()
            .expect("row should be claimable");
        assert_eq!(claimed.attempts, attempt);
        assert!(queue_queries::claim_entry(&state.db, entry.id)
            .await
            .unwrap()
            .is_none());

        let status = queue_queries::fail_attempt(&state.db, entry.id, "scraper timeout", 3)
            .await
            .unwrap();
        let expected = if attempt < 3 {
            QueueStatus::Pending
        } else {
            QueueStatus::Failed
        };
        assert_eq!(status, expected);
    }

    let (status, body) = send(
        router(state.clone()),
        "GET",
        &format!("/api/profile/{username}/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "FAILED");
    assert_eq!(body["data"]["error_message"], "scraper timeout");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn random_pages_do_not_repeat_within_a_session() {
    let state = live_state().await;
    let username = unique_username("feed");
    insert_primary(&state.db, &username).await;

    insert_reels(&state.db, &username, 7).await;

    let session = unique_username("session");
    let uri = format!("/api/reels?sort_by=random&limit=3&username={username}&session_id={session}");
    let mut served = std::collections::HashSet::new();

    for expected in [3, 3, 1, 0] {
        let (status, body) = send(router(state.clone()), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let reels = body["data"]["reels"].as_array().unwrap();
        assert_eq!(reels.len(), expected);
        for reel in reels {
            assert!(served.insert(reel["content_id"].as_str().unwrap().to_string()));
        }
    }
    assert_eq!(served.len(), 7);

    state.sessions.reset(&session).await.unwrap();
    let (_, body) = send(router(state), "GET", &uri, None).await;
    assert_eq!(body["data"]["reels"].as_array().unwrap().len(), 3);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn results_for_unstarted_analysis_have_no_run() {
    let state = live_state().await;
    let (status, body) = send(
        router(state.clone()),
        "POST",
        "/api/viral-ideas/queue",
        Some(serde_json::json!({
            "session_id": "it-session",
            "primary_username": unique_username("creator"),
            "selected_competitors": ["rival_one", "rival_one"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["selected_competitors"].as_array().unwrap().len(), 1);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        router(state),
        "GET",
        &format!("/api/viral-analysis/{id}/results"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["analysis"].is_null());
    assert_eq!(body["data"]["queue"]["status"], "pending");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn random_pages_reach_content_beyond_the_candidate_cap() {
    let state = live_state_with(Settings {
        random_candidate_cap: 3,
        ..Settings::default()
    })
    .await;
    let username = unique_username("capped");
    insert_primary(&state.db, &username).await;
    insert_reels(&state.db, &username, 7).await;

    let session = unique_username("session");
    let uri = format!("/api/reels?sort_by=random&limit=2&username={username}&session_id={session}");
    let mut served = std::collections::HashSet::new();

    for (expected, more) in [(2, true), (2, true), (2, true), (1, false), (0, false)] {
        let (status, body) = send(router(state.clone()), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let reels = body["data"]["reels"].as_array().unwrap();
        assert_eq!(reels.len(), expected);
        assert_eq!(body["data"]["pagination"]["has_more"], more);
        for reel in reels {
            assert!(served.insert(reel["content_id"].as_str().unwrap().to_string()));
        }
    }
    assert_eq!(served.len(), 7);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn stale_processing_row_is_released_for_another_attempt() {
    let state = live_state().await;
    let username = unique_username("crashed");
    let entry = insert_row(&state.db, &username, "test", Priority::High).await;
    queue_queries::claim_entry(&state.db, entry.id)
        .await
        .unwrap()
        .expect("row should be claimable");
    age_row(&state.db, entry.id, 1).await;

    let before = admission::request_profile(&state.db, &state.queue, &username, "test")
        .await
        .unwrap();
    assert!(matches!(
        before,
        Admission::AlreadyQueued {
            status: QueueStatus::Processing,
            ..
        }
    ));

    queue_queries::release_stale_entries(&state.db, 900, 3)
        .await
        .unwrap();
    let row = reload(&state.db, &entry).await;
    assert_eq!(row.status, QueueStatus::Pending);
    assert_eq!(row.error_message.as_deref(), Some("Processing lease expired"));

    // Claimable again, and admission reports the row as waiting
    let after = admission::request_profile(&state.db, &state.queue, &username, "test")
        .await
        .unwrap();
    assert!(matches!(
        after,
        Admission::AlreadyQueued {
            status: QueueStatus::Pending,
            ..
        }
    ));
    let reclaimed = queue_queries::claim_entry(&state.db, entry.id)
        .await
        .unwrap()
        .expect("released row should be claimable");
    assert_eq!(reclaimed.attempts, 2);
    assert_eq!(queue_rows(&state.db, &username).await, 1);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn stale_row_out_of_attempts_fails_and_frees_the_username() {
    let state = live_state().await;
    let username = unique_username("exhausted");
    let entry = insert_row(&state.db, &username, "test", Priority::High).await;
    queue_queries::claim_entry(&state.db, entry.id)
        .await
        .unwrap()
        .expect("row should be claimable");
    age_row(&state.db, entry.id, 3).await;

    queue_queries::release_stale_entries(&state.db, 900, 3)
        .await
        .unwrap();
    let row = reload(&state.db, &entry).await;
    assert_eq!(row.status, QueueStatus::Failed);

    let admission = admission::request_profile(&state.db, &state.queue, &username, "test")
        .await
        .unwrap();
    assert!(matches!(admission, Admission::Queued { .. }));
    assert_eq!(queue_rows(&state.db, &username).await, 2);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn fresh_processing_row_is_left_alone() {
    let state = live_state().await;
    let username = unique_username("busy");
    let entry = insert_row(&state.db, &username, "test", Priority::High).await;
    queue_queries::claim_entry(&state.db, entry.id)
        .await
        .unwrap()
        .unwrap();

    let released = queue_queries::release_stale_entries(&state.db, 900, 3)
        .await
        .unwrap();
    assert!(released.iter().all(|row| row.id != entry.id));
    assert_eq!(reload(&state.db, &entry).await.status, QueueStatus::Processing);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn similar_link_survives_the_target_being_processed() {
    let state = live_state().await;
    let primary = unique_username("anchor");
    let competitor = unique_username("rival");
    insert_primary(&state.db, &primary).await;

    let mut tx = state.db.begin().await.unwrap();
    let linked = profile_queries::replace_similar_profiles(
        &mut tx,
        &primary,
        &[SecondaryProfileUpsert {
            username: competitor.clone(),
            full_name: Some("Rival Kitchen".to_string()),
            followers_count: 500,
            ..Default::default()
        }],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(linked, 1);

    let before = profile_queries::list_similar_profiles(&state.db, &primary, 20)
        .await
        .unwrap();
    assert_eq!(before.len(), 1);
    assert!(!before[0].is_processed);
    assert_eq!(before[0].followers_count, 500);

    insert_primary(&state.db, &competitor).await;

    let after = profile_queries::list_similar_profiles(&state.db, &primary, 20)
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].username, competitor);
    assert!(after[0].is_processed);
    assert_eq!(after[0].followers_count, 1_000);
    assert!(profile_queries::get_secondary_profile(&state.db, &competitor)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore] // Requires Redis
async fn dispatch_drains_high_before_medium_before_low() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let prefix = format!("viralspot:test:{}", Uuid::new_v4().simple());
    let queue = JobQueue::with_prefix(&config.redis_url, &prefix).unwrap();

    let low = Uuid::new_v4();
    let medium = Uuid::new_v4();
    let high = Uuid::new_v4();
    let second_high = Uuid::new_v4();
    queue.enqueue(low, Priority::Low).await.unwrap();
    queue.enqueue(medium, Priority::Medium).await.unwrap();
    queue.enqueue(high, Priority::High).await.unwrap();
    queue.enqueue(second_high, Priority::High).await.unwrap();

    let depth = queue.depth().await.unwrap();
    assert_eq!(depth.high, 2);
    assert_eq!(depth.medium, 1);
    assert_eq!(depth.low, 1);

    let mut popped = Vec::new();
    while let Some(dispatched) = queue.dequeue().await.unwrap() {
        popped.push((dispatched.queue_id, dispatched.priority));
    }
    assert_eq!(
        popped,
        vec![
            (high, Priority::High),
            (second_high, Priority::High),
            (medium, Priority::Medium),
            (low, Priority::Low),
        ]
    );
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn position_counts_only_earlier_rows_of_equal_or_higher_priority() {
    let state = live_state().await;
    let source = "position-test";

    // Rows left active by an earlier run would sit in the same 1990 window.
    sqlx::query("UPDATE queue SET status = 'COMPLETED' WHERE source = $1")
        .bind(source)
        .execute(&state.db)
        .await
        .unwrap();

    let low = insert_row(&state.db, &unique_username("low"), source, Priority::Low).await;
    let low = admit_at_minute(&state.db, &low, 0).await;
    let early_high = insert_row(&state.db, &unique_username("hi1"), source, Priority::High).await;
    let early_high = admit_at_minute(&state.db, &early_high, 1).await;
    let high = insert_row(&state.db, &unique_username("hi2"), source, Priority::High).await;
    let high = admit_at_minute(&state.db, &high, 2).await;
    let medium = insert_row(&state.db, &unique_username("med"), source, Priority::Medium).await;
    let medium = admit_at_minute(&state.db, &medium, 3).await;

    let position = |entry: QueueEntry| {
        let pool = state.db.clone();
        async move { queue_queries::estimate_position(&pool, &entry).await.unwrap() }
    };

    // The earlier LOW row is not ahead of HIGH; the earlier HIGH row is.
    assert_eq!(position(early_high.clone()).await, 1);
    assert_eq!(position(high.clone()).await, 2);
    assert_eq!(position(medium).await, 3);
    assert_eq!(position(low).await, 1);

    // Only active rows count.
    queue_queries::complete_entry(&state.db, early_high.id)
        .await
        .unwrap();
    assert_eq!(position(high).await, 1);

    sqlx::query("UPDATE queue SET status = 'COMPLETED' WHERE source = $1")
        .bind(source)
        .execute(&state.db)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn recent_completion_without_profile_is_queued_again() {
    let state = live_state().await;
    let username = unique_username("vanished");
    let entry = insert_row(&state.db, &username, "test", Priority::High).await;
    queue_queries::complete_entry(&state.db, entry.id)
        .await
        .unwrap();

    let admission = admission::request_profile(&state.db, &state.queue, &username, "test")
        .await
        .unwrap();
    let Admission::Queued { request_id, .. } = admission else {
        panic!("expected a fresh queue row, got {admission:?}");
    };
    assert_ne!(request_id, entry.request_id);
    assert_eq!(queue_rows(&state.db, &username).await, 2);

    // Once the profile shows up the completed row is enough.
    let other = unique_username("landed");
    let done = insert_row(&state.db, &other, "test", Priority::High).await;
    queue_queries::complete_entry(&state.db, done.id).await.unwrap();
    insert_primary(&state.db, &other).await;
    let admission = admission::request_profile(&state.db, &state.queue, &other, "test")
        .await
        .unwrap();
    assert!(matches!(admission, Admission::AlreadyProcessed { .. }));
    assert_eq!(queue_rows(&state.db, &other).await, 1);
}
