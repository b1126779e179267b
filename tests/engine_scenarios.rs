use chrono::{Duration, Utc};
use futures::future::join_all;
use rusqlite::params;
use tempfile::TempDir;

use medcircle::approval::GatedKind;
use medcircle::authority::{Actor, Role};
use medcircle::config::Config;
use medcircle::db;
use medcircle::engine::EngineError;
use medcircle::events::{EventDraft, RegistrationStatus};
use medcircle::feed::{NewPost, PostType};
use medcircle::jobs::{ApplicationStatus, NewJobListing};
use medcircle::lifecycle::ContentKind;
use medcircle::state::{AppState, DbPool};
use medcircle::surveys::{QuestionDraft, QuestionKind, SurveyAnswer};

struct Harness {
    state: AppState,
    pool: DbPool,
    _temp: TempDir,
}

fn harness(users: &[(&str, &str)]) -> Harness {
    let temp = TempDir::new().unwrap();
    let pool = db::create_pool(&temp.path().join("test.db")).unwrap();
    db::run_migrations(&pool).unwrap();

    {
        let conn = pool.get().unwrap();
        for (id, role) in users {
            conn.execute(
                "INSERT INTO users (id, username, role) VALUES (?1, ?1, ?2)",
                params![id, role],
            )
            .unwrap();
        }
    }

    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    Harness {
        state: AppState::new(pool.clone(), config),
        pool,
        _temp: temp,
    }
}

fn organiser() -> Actor {
    Actor::new("organiser", Role::User)
}

fn moderator() -> Actor {
    Actor::new("mo", Role::Moderator)
}

/// Create an event post and publish it through the approval gate
async fn published_event(
    h: &Harness,
    max_participants: Option<u32>,
    event_in_days: i64,
    deadline_in_days: Option<i64>,
) -> String {
    let today = Utc::now().date_naive();
    let iso = |days: i64| (today + Duration::days(days)).format("%Y-%m-%d").to_string();

    let post = h
        .state
        .feed
        .create_post(
            &organiser(),
            NewPost {
                post_type: PostType::Event,
                title: Some("Simulation day".into()),
                body: "Obstetric emergencies drills".into(),
                event: Some(EventDraft {
                    event_date: iso(event_in_days),
                    registration_deadline: deadline_in_days.map(iso),
                    max_participants,
                }),
                questions: Vec::new(),
            },
            Utc::now(),
        )
        .await
        .unwrap();

    h.state
        .approvals
        .approve(&moderator(), GatedKind::Event, post.id.as_str(), Utc::now())
        .await
        .unwrap();
    post.id.to_string()
}

const STAFF: &[(&str, &str)] = &[("organiser", "user"), ("mo", "moderator")];

fn with_members(count: usize) -> Vec<(String, String)> {
    let mut users: Vec<(String, String)> = STAFF
        .iter()
        .map(|(id, role)| (id.to_string(), role.to_string()))
        .collect();
    for i in 0..count {
        users.push((format!("nurse{}", i), "user".to_string()));
    }
    users
}

fn harness_with_members(count: usize) -> Harness {
    let users = with_members(count);
    let refs: Vec<(&str, &str)> = users.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    harness(&refs)
}

#[tokio::test]
async fn capacity_two_rejects_third_approval() {
    let h = harness_with_members(3);
    let event = published_event(&h, Some(2), 30, None).await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let nurse = Actor::new(format!("nurse{}", i), Role::User);
        let reg = h.state.events.register(&nurse, &event, Utc::now()).await.unwrap();
        ids.push(reg.id.to_string());
    }

    let events = &h.state.events;
    assert_eq!(
        events.approve(&organiser(), &ids[0], Utc::now()).await.unwrap().status,
        RegistrationStatus::Approved
    );
    assert_eq!(
        events.approve(&organiser(), &ids[1], Utc::now()).await.unwrap().status,
        RegistrationStatus::Approved
    );
    assert_eq!(
        events.approve(&organiser(), &ids[2], Utc::now()).await.unwrap_err(),
        EngineError::CapacityExceeded
    );

    let roster = events.roster(&organiser(), &event).await.unwrap();
    assert_eq!(roster.approved, 2);
    assert_eq!(roster.pending, 1);
    let third = roster
        .registrations
        .iter()
        .find(|r| r.id.as_str() == ids[2])
        .unwrap();
    assert_eq!(third.status, RegistrationStatus::Pending);
}

#[tokio::test]
async fn concurrent_approvals_never_exceed_capacity() {
    let h = harness_with_members(10);
    let event = published_event(&h, Some(3), 30, None).await;

    let mut ids = Vec::new();
    for i in 0..10 {
        let nurse = Actor::new(format!("nurse{}", i), Role::User);
        let reg = h.state.events.register(&nurse, &event, Utc::now()).await.unwrap();
        ids.push(reg.id.to_string());
    }

    let reviewer = organiser();
    let results = join_all(
        ids.iter()
            .map(|id| h.state.events.approve(&reviewer, id, Utc::now())),
    )
    .await;

    let approved = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(approved, 3);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == EngineError::CapacityExceeded));

    let stored: i64 = h
        .pool
        .get()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = ?1 AND status = 'approved'",
            params![event],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(stored, 3);
}

#[tokio::test]
async fn concurrent_duplicate_registrations_store_one_row() {
    let h = harness_with_members(1);
    let event = published_event(&h, None, 30, None).await;
    let nurse = Actor::new("nurse0", Role::User);

    let results = join_all((0..5).map(|_| h.state.events.register(&nurse, &event, Utc::now()))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == EngineError::AlreadyRegistered));

    let rows: i64 = h
        .pool
        .get()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = ?1",
            params![event],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn registration_deadline_is_inclusive() {
    let h = harness_with_members(2);
    let nurse = Actor::new("nurse0", Role::User);

    let closes_today = published_event(&h, None, 10, Some(0)).await;
    assert!(h.state.events.register(&nurse, &closes_today, Utc::now()).await.is_ok());

    let closed_yesterday = published_event(&h, None, 10, Some(-1)).await;
    assert_eq!(
        h.state
            .events
            .register(&nurse, &closed_yesterday, Utc::now())
            .await
            .unwrap_err(),
        EngineError::RegistrationClosed
    );
}

async fn survey(h: &Harness) -> String {
    let post = h
        .state
        .feed
        .create_post(
            &organiser(),
            NewPost {
                post_type: PostType::Survey,
                title: Some("Rota feedback".into()),
                body: "Tell us about the new rota".into(),
                event: None,
                questions: vec![
                    QuestionDraft {
                        prompt: "Is the new rota better?".into(),
                        kind: QuestionKind::SingleChoice {
                            options: vec!["Yes".into(), "No".into()],
                        },
                        required: true,
                    },
                    QuestionDraft {
                        prompt: "What should change?".into(),
                        kind: QuestionKind::Text,
                        required: true,
                    },
                ],
            },
            Utc::now(),
        )
        .await
        .unwrap();
    post.id.to_string()
}

#[tokio::test]
async fn survey_resubmission_overwrites() {
    let h = harness_with_members(1);
    let post = survey(&h).await;
    let nurse = Actor::new("nurse0", Role::User);
    let surveys = &h.state.surveys;

    surveys
        .submit_answer(&nurse, &post, 0, SurveyAnswer::Options(vec!["Yes".into()]), Utc::now())
        .await
        .unwrap();
    surveys
        .submit_answer(&nurse, &post, 0, SurveyAnswer::Options(vec!["No".into()]), Utc::now())
        .await
        .unwrap();

    let tally = surveys.aggregate(&post).await.unwrap();
    assert_eq!(tally.respondents, 1);
    let first = &tally.questions[0];
    assert_eq!(first.responses, 1);
    let no = first.options.iter().find(|o| o.label == "No").unwrap();
    assert_eq!((no.count, no.percentage), (1, 100));
    let yes = first.options.iter().find(|o| o.label == "Yes").unwrap();
    assert_eq!(yes.count, 0);
}

#[tokio::test]
async fn empty_required_text_writes_nothing() {
    let h = harness_with_members(1);
    let post = survey(&h).await;
    let nurse = Actor::new("nurse0", Role::User);

    let err = h
        .state
        .surveys
        .submit_answer(&nurse, &post, 1, SurveyAnswer::Text("   ".into()), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let rows: i64 = h
        .pool
        .get()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM survey_responses", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn accepting_twice_is_idempotent() {
    let h = harness_with_members(1);
    let listing = h
        .state
        .jobs
        .post_listing(
            &organiser(),
            NewJobListing {
                title: "Ward sister".into(),
                description: "Permanent, full time".into(),
                location: Some("Bristol".into()),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    h.state
        .approvals
        .approve(&moderator(), GatedKind::JobListing, listing.id.as_str(), Utc::now())
        .await
        .unwrap();

    let nurse = Actor::new("nurse0", Role::User);
    let application = h
        .state
        .jobs
        .apply(&nurse, listing.id.as_str(), None, Utc::now())
        .await
        .unwrap();

    for _ in 0..2 {
        let accepted = h
            .state
            .jobs
            .accept(&organiser(), application.id.as_str(), Utc::now())
            .await
            .unwrap();
        assert_eq!(accepted.status, ApplicationStatus::Accepted);
    }
}

#[tokio::test]
async fn admins_cannot_block_or_delete_each_other() {
    let h = harness(&[("root", "admin"), ("other", "admin")]);
    let root = Actor::new("root", Role::Admin);

    assert_eq!(
        h.state.accounts.block(&root, "other").await.unwrap_err(),
        EngineError::Forbidden
    );
    assert_eq!(
        h.state
            .lifecycle
            .soft_delete(&root, ContentKind::Account, "other", None, Utc::now())
            .await
            .unwrap_err(),
        EngineError::Forbidden
    );
}

#[tokio::test]
async fn soft_delete_and_restore_rules() {
    let h = harness(&[("author", "user"), ("root", "admin"), ("mo", "moderator")]);
    let author = Actor::new("author", Role::User);
    let post = h
        .state
        .feed
        .create_post(
            &author,
            NewPost {
                post_type: PostType::Case,
                title: None,
                body: "Unusual ECG".into(),
                event: None,
                questions: Vec::new(),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let id = post.id.as_str();
    let root = Actor::new("root", Role::Admin);
    let lifecycle = &h.state.lifecycle;

    assert_eq!(
        lifecycle.restore(&root, ContentKind::Post, id).await.unwrap_err(),
        EngineError::NotDeleted
    );

    lifecycle
        .soft_delete(&moderator(), ContentKind::Post, id, Some("Identifiable patient".into()), Utc::now())
        .await
        .unwrap();
    assert_eq!(
        lifecycle
            .soft_delete(&moderator(), ContentKind::Post, id, None, Utc::now())
            .await
            .unwrap_err(),
        EngineError::AlreadyDeleted
    );
    assert!(h.state.feed.public_feed(10).await.unwrap().is_empty());

    assert_eq!(
        lifecycle.restore(&moderator(), ContentKind::Post, id).await.unwrap_err(),
        EngineError::Forbidden
    );
    lifecycle.restore(&root, ContentKind::Post, id).await.unwrap();
    assert_eq!(h.state.feed.public_feed(10).await.unwrap().len(), 1);
}
