//! End-to-end round flows through the shared state and the in-memory store.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use balderdash_back::{
    config::AppConfig,
    dao::{
        batch::{Precondition, WriteBatch},
        session_store::{SessionStore, memory::MemorySessionStore},
        storage::StorageResult,
    },
    dto::round::{GroupsRequest, MarksRequest, PromptRequest, RevealRequest},
    error::ServiceError,
    services::{round_service, session_service},
    state::{
        AppState, SharedState,
        handle::Actor,
        session::{RoundState, TRUE_RESPONSE},
        state_machine::Phase,
    },
};
use futures::future::BoxFuture;
use serde_json::{Value, json};

const SESSION: &str = "ABCD";

async fn setup(document: Value) -> (SharedState, MemorySessionStore) {
    let store = MemorySessionStore::new();
    store.insert(SESSION, document).await.unwrap();
    let state = AppState::with_config(AppConfig {
        rng_seed: Some(7),
        ..AppConfig::default()
    });
    state.set_session_store(Arc::new(store.clone())).await;
    (state, store)
}

async fn stored(store: &MemorySessionStore) -> Value {
    store.fetch(SESSION).await.unwrap().unwrap()
}

fn player(name: &str) -> Actor {
    Actor::new(name, None)
}

fn session(current: u32, rounds: Value) -> Value {
    json!({
        "state": "STARTED",
        "current": current,
        "limit": 4,
        "ais": 0,
        "scoreboard": {"P1": 0, "P2": 0, "P3": 0},
        "categories": ["Laws", "Words"],
        "rounds": rounds
    })
}

fn guess(response: &str) -> Value {
    json!({"response": response, "group": "", "correct": false, "automatic": false})
}

#[tokio::test]
async fn two_distinct_decoys_start_the_read_out() {
    let (state, store) = setup(session(
        1,
        json!({"1": {
            "state": "GROUP",
            "dasher": "P1",
            "prompt": "Bumbershoot",
            "response": "An umbrella.",
            "guesses": {"P2": guess("A hat."), "P3": guess("A dance.")}
        }}),
    ))
    .await;

    let groups = GroupsRequest {
        groups: BTreeMap::from([("P2".into(), "x".into()), ("P3".into(), "y".into())]),
    };
    let phase = round_service::submit_groups(&state, SESSION, &player("P1"), groups)
        .await
        .unwrap();
    assert_eq!(phase, Phase::Round(RoundState::Read));

    let doc = stored(&store).await;
    let round = &doc["rounds"]["1"];
    assert_eq!(round["state"], json!("READ"));
    assert_eq!(round["read"]["index"], json!(-1));
    let mut order: Vec<String> = serde_json::from_value(round["read"]["order"].clone()).unwrap();
    order.sort();
    let mut expected = vec!["x".to_string(), "y".to_string(), TRUE_RESPONSE.to_string()];
    expected.sort();
    assert_eq!(order, expected);
}

#[tokio::test]
async fn one_distinct_decoy_without_ai_ends_in_tally() {
    let (state, store) = setup(session(
        1,
        json!({"1": {
            "state": "GROUP",
            "dasher": "P1",
            "prompt": "Bumbershoot",
            "response": "An umbrella.",
            "guesses": {"P2": guess("A hat."), "P3": guess("A cap.")}
        }}),
    ))
    .await;

    let groups = GroupsRequest {
        groups: BTreeMap::from([("P2".into(), "x".into()), ("P3".into(), "x".into())]),
    };
    let phase = round_service::submit_groups(&state, SESSION, &player("P1"), groups)
        .await
        .unwrap();
    assert_eq!(phase, Phase::Round(RoundState::Tally));

    let doc = stored(&store).await;
    assert_eq!(doc["rounds"]["1"]["state"], json!("TALLY"));
    assert!(!doc["rounds"]["1"]["interruption"].as_str().unwrap().is_empty());
    assert_eq!(doc["scoreboard"], json!({"P1": 0, "P2": 0, "P3": 0}));
}

#[tokio::test]
async fn marking_every_guess_correct_scores_and_interrupts() {
    let (state, store) = setup(session(
        1,
        json!({"1": {
            "state": "MARK",
            "dasher": "P1",
            "prompt": "Bumbershoot",
            "response": "An umbrella.",
            "guesses": {"P2": guess("An umbrella."), "P3": guess("A parasol.")}
        }}),
    ))
    .await;

    let marks = MarksRequest {
        marks: BTreeMap::from([("P2".into(), true), ("P3".into(), true)]),
    };
    let phase = round_service::submit_marks(&state, SESSION, &player("P1"), marks)
        .await
        .unwrap();
    assert_eq!(phase, Phase::Round(RoundState::Tally));

    let doc = stored(&store).await;
    assert_eq!(doc["scoreboard"]["P2"], json!(2));
    assert_eq!(doc["scoreboard"]["P3"], json!(2));
    assert_eq!(doc["rounds"]["1"]["guesses"]["P2"]["correct"], json!(true));
}

#[tokio::test]
async fn proceeding_past_the_last_round_finishes_the_game() {
    let (state, store) = setup(session(
        4,
        json!({"4": {"state": "TALLY", "dasher": "P2"}}),
    ))
    .await;

    let phase = round_service::proceed(&state, SESSION, &player("P2"))
        .await
        .unwrap();
    assert_eq!(phase, Phase::Finished);

    let doc = stored(&store).await;
    assert_eq!(doc["state"], json!("FINISHED"));
    assert_eq!(doc["current"], json!(4));
    assert!(doc["rounds"].get("5").is_none());
}

#[tokio::test]
async fn proceeding_seeds_the_next_round_with_a_new_dasher() {
    let (state, store) = setup(session(1, json!({"1": {"state": "TALLY", "dasher": "P1"}}))).await;

    let phase = round_service::proceed(&state, SESSION, &player("P1"))
        .await
        .unwrap();
    assert_eq!(phase, Phase::Round(RoundState::Select));

    let doc = stored(&store).await;
    assert_eq!(doc["current"], json!(2));
    let next = &doc["rounds"]["2"];
    assert_eq!(next["state"], json!("SELECT"));
    let dasher = next["dasher"].as_str().unwrap();
    assert_ne!(dasher, "P1");
    assert!(["P2", "P3"].contains(&dasher));
}

#[tokio::test]
async fn non_dasher_actions_leave_the_session_untouched() {
    let initial = session(
        1,
        json!({"1": {
            "state": "GROUP",
            "dasher": "P1",
            "guesses": {"P2": guess("A hat."), "P3": guess("A dance.")}
        }}),
    );
    let (state, store) = setup(initial.clone()).await;

    let groups = GroupsRequest {
        groups: BTreeMap::from([("P2".into(), "x".into()), ("P3".into(), "y".into())]),
    };
    let err = round_service::submit_groups(&state, SESSION, &player("P2"), groups)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
    assert_eq!(stored(&store).await, initial);
}

#[tokio::test]
async fn out_of_order_actions_are_rejected_as_invalid_state() {
    let (state, _store) = setup(session(1, json!({"1": {"state": "SELECT", "dasher": "P1"}}))).await;

    let err = round_service::reveal(&state, SESSION, &player("P1"), RevealRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

/// Store that lets another writer change the session between the read and the commit.
struct RacingStore {
    inner: MemorySessionStore,
    interference: Mutex<Option<Value>>,
}

impl SessionStore for RacingStore {
    fn fetch(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        self.inner.fetch(id)
    }

    fn commit(
        &self,
        id: &str,
        preconditions: Vec<Precondition>,
        batch: WriteBatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let id = id.to_string();
        let interference = self.interference.lock().unwrap().take();
        Box::pin(async move {
            if let Some(document) = interference {
                inner.insert(&id, document).await?;
            }
            inner.commit(&id, preconditions, batch).await
        })
    }

    fn insert(&self, id: &str, document: Value) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert(id, document)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

#[tokio::test]
async fn concurrent_change_makes_the_commit_stale() {
    let before = session(1, json!({"1": {"state": "SELECT", "dasher": "P1"}}));
    let mut raced = before.clone();
    raced["rounds"]["1"]["state"] = json!("GUESS");

    let inner = MemorySessionStore::new();
    inner.insert(SESSION, before).await.unwrap();
    let state = AppState::with_config(AppConfig::default());
    state
        .set_session_store(Arc::new(RacingStore {
            inner: inner.clone(),
            interference: Mutex::new(Some(raced.clone())),
        }))
        .await;

    let prompt = PromptRequest {
        category: "Laws".into(),
        prompt: "Bumbershoot".into(),
        response: "An umbrella".into(),
        custom: false,
    };
    let err = round_service::submit_prompt(&state, SESSION, &player("P1"), prompt)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(inner.fetch(SESSION).await.unwrap().unwrap(), raced);
}

#[tokio::test]
async fn actions_fail_fast_without_a_store() {
    let state = AppState::new();
    let err = session_service::get_session(&state, SESSION).await.unwrap_err();
    assert!(matches!(err, ServiceError::Degraded));
}

#[tokio::test]
async fn unknown_sessions_are_not_found() {
    let (state, _store) = setup(session(1, json!({}))).await;
    let err = session_service::get_session(&state, "ZZZZ").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
