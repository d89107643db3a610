//! Session controller lifecycle tests with scripted engines.
//!
//! Covers the state machine end to end:
//! - Initialization success and failure, including one-shot notifications
//! - Rejections (blank prompt, no engine, busy) and their effect on state
//! - Reinitialization races: only the latest attempt may commit
//! - Generation success and failure and what reaches history
//! - Web search gating in the composed prompt

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use parley::session::{
    EMPTY_PROMPT_MESSAGE, GENERATING_STATUS, NO_ENGINE_MESSAGE, SEARCHING_STATUS,
};
use parley::store::{KeyValueStore, MemoryStore, keys};
use parley::test_utils::{FakeEngineFactory, FixedSearch};
use parley::{AppConfig, ChatError, SessionController, SessionEvent, SessionState};
use serde_json::Value;

fn session(factory: FakeEngineFactory, search: FixedSearch) -> SessionController {
    SessionController::new(
        AppConfig::default(),
        Arc::new(factory),
        Arc::new(search),
        Arc::new(MemoryStore::new()),
    )
}

async fn ready_session(factory: FakeEngineFactory, search: FixedSearch) -> SessionController {
    let s = session(factory, search);
    s.start();
    assert_eq!(s.wait_until_settled().await, SessionState::Ready(String::new()));
    s
}

fn no_search() -> FixedSearch {
    FixedSearch::new("Web search result: should not be used")
}

/// Memory store whose first history write blocks until the test releases it.
struct GatedHistoryStore {
    values: MemoryStore,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl GatedHistoryStore {
    fn new() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Self {
            values: MemoryStore::new(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        };
        (store, entered_rx, release_tx)
    }
}

impl KeyValueStore for GatedHistoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key)
    }

    fn set(&self, key: &str, value: Value) -> parley::Result<()> {
        if key == keys::CONVERSATION_HISTORY {
            let entered = self.entered.lock().unwrap().take();
            if let Some(entered) = entered {
                entered.send(()).unwrap();
                let release = self.release.lock().unwrap().take().unwrap();
                let _ = release.recv();
            }
        }
        self.values.set(key, value)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Initialization
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn init_failure_sets_error_and_notifies() {
    let s = session(FakeEngineFactory::failing_construction("model file not found"), no_search());
    let mut events = s.events();
    s.start();

    let state = s.wait_until_settled().await;
    let SessionState::Error(message) = state else {
        panic!("expected error state, got {state:?}");
    };
    assert!(message.contains("model file not found"), "{message}");

    match events.recv().await.unwrap() {
        SessionEvent::InitFailed { message: notified } => assert_eq!(notified, message),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn submit_without_engine_is_rejected_with_error_state() {
    let s = session(FakeEngineFactory::failing_construction("no model"), no_search());
    s.start();
    s.wait_until_settled().await;

    let err = s.submit_prompt("hello").unwrap_err();
    assert!(matches!(err, ChatError::Session(_)));
    assert_eq!(s.state(), SessionState::Error(NO_ENGINE_MESSAGE.into()));
    assert!(s.history().is_empty());
}

#[tokio::test]
async fn double_reinitialize_only_latest_commits() {
    let factory = FakeEngineFactory::numbered()
        .with_construct_delays([Duration::from_millis(300), Duration::from_millis(10)]);
    let constructed = factory.construct_counter();
    let s = session(factory, no_search());

    s.reinitialize();
    tokio::time::sleep(Duration::from_millis(20)).await;
    s.reinitialize();

    assert_eq!(s.wait_until_settled().await, SessionState::Ready(String::new()));
    // Give a late first attempt every chance to land.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(s.state(), SessionState::Ready(String::new()));
    assert_eq!(constructed.load(Ordering::SeqCst), 2);

    s.submit_prompt("which engine?").unwrap();
    assert_eq!(
        s.wait_until_settled().await,
        SessionState::Ready("engine 2".into())
    );
}

#[tokio::test]
async fn construction_finishing_after_reinitialize_is_released() {
    let pending: Arc<Mutex<Option<SessionController>>> = Arc::new(Mutex::new(None));
    let hook_slot = Arc::clone(&pending);
    // The first construction completes right after a newer reinitialize.
    let factory = FakeEngineFactory::numbered().with_construct_hook(move |n| {
        if n == 1 {
            let taken = hook_slot.lock().unwrap().take();
            if let Some(controller) = taken {
                controller.reinitialize();
            }
        }
    });
    let constructed = factory.construct_counter();
    let released = factory.release_counter();
    let s = session(factory, no_search());
    *pending.lock().unwrap() = Some(s.clone());

    s.start();
    assert_eq!(s.wait_until_settled().await, SessionState::Ready(String::new()));
    assert_eq!(constructed.load(Ordering::SeqCst), 2);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    s.submit_prompt("which engine?").unwrap();
    assert_eq!(
        s.wait_until_settled().await,
        SessionState::Ready("engine 2".into())
    );
}

#[tokio::test]
async fn reinitialize_releases_previous_engine() {
    let factory = FakeEngineFactory::replying("ok");
    let released = factory.release_counter();
    let s = ready_session(factory, no_search()).await;

    s.reinitialize();
    assert_eq!(s.state(), SessionState::Initializing);
    s.wait_until_settled().await;
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn parameters_apply_only_on_reinitialize() {
    let factory = FakeEngineFactory::replying("ok");
    let params = factory.params_log();
    let s = ready_session(factory, no_search()).await;

    assert_eq!(s.set_temperature(0.2), 0.2);
    assert_eq!(s.set_top_k(5000), 1000);
    assert_eq!(params.lock().unwrap().len(), 1);
    assert_eq!(params.lock().unwrap()[0].temperature, 0.7);

    s.reinitialize();
    s.wait_until_settled().await;
    let log = params.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].temperature, 0.2);
    assert_eq!(log[1].top_k, 1000);
}

// ────────────────────────────────────────────────────────────────────────────
// Generation
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn blank_prompt_sets_error_and_leaves_history() {
    let factory = FakeEngineFactory::replying("ok");
    let prompts = factory.prompt_log();
    let s = ready_session(factory, no_search()).await;

    let err = s.submit_prompt("   \n").unwrap_err();
    assert!(matches!(err, ChatError::Session(_)));
    assert_eq!(s.state(), SessionState::Error(EMPTY_PROMPT_MESSAGE.into()));
    assert!(s.history().is_empty());
    assert!(prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn successful_turn_reaches_history() {
    let s = ready_session(FakeEngineFactory::replying("Four."), no_search()).await;
    let mut events = s.events();

    s.submit_prompt("What is 2+2?").unwrap();
    assert_eq!(s.state(), SessionState::Generating(GENERATING_STATUS.into()));
    assert_eq!(s.wait_until_settled().await, SessionState::Ready("Four.".into()));

    let history = s.history();
    assert_eq!(history.len(), 1);
    let turn = &history.turns()[0];
    assert_eq!(turn.user_message, "What is 2+2?");
    assert_eq!(turn.ai_response, "Four.");
    assert_eq!(turn.personality_name, "Professional Assistant");

    match events.recv().await.unwrap() {
        SessionEvent::TurnCompleted { turn: notified } => assert_eq!(&notified, turn),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn generation_failure_sets_error_and_skips_history() {
    let s = ready_session(FakeEngineFactory::failing_generation("boom"), no_search()).await;

    s.submit_prompt("hello").unwrap();
    let state = s.wait_until_settled().await;
    let SessionState::Error(message) = state else {
        panic!("expected error state, got {state:?}");
    };
    assert!(message.contains("boom"), "{message}");
    assert!(s.history().is_empty());
}

#[tokio::test]
async fn error_state_accepts_a_new_prompt() {
    let s = ready_session(FakeEngineFactory::replying("fine"), no_search()).await;
    let _ = s.submit_prompt("");
    assert!(matches!(s.state(), SessionState::Error(_)));

    s.submit_prompt("try again").unwrap();
    assert_eq!(s.wait_until_settled().await, SessionState::Ready("fine".into()));
}

#[tokio::test]
async fn second_submit_while_generating_is_rejected() {
    let factory =
        FakeEngineFactory::replying("slow").with_generate_delay(Duration::from_millis(200));
    let prompts = factory.prompt_log();
    let s = ready_session(factory, no_search()).await;

    s.submit_prompt("first").unwrap();
    let err = s.submit_prompt("second").unwrap_err();
    assert!(matches!(err, ChatError::Session(_)));
    assert!(matches!(s.state(), SessionState::Generating(_)));

    assert_eq!(s.wait_until_settled().await, SessionState::Ready("slow".into()));
    assert_eq!(prompts.lock().unwrap().len(), 1);
    assert_eq!(s.history().len(), 1);
}

#[tokio::test]
async fn recent_turns_feed_the_next_prompt() {
    let factory = FakeEngineFactory::replying("reply");
    let prompts = factory.prompt_log();
    let s = ready_session(factory, no_search()).await;

    s.submit_prompt("first question").unwrap();
    s.wait_until_settled().await;
    s.submit_prompt("second question").unwrap();
    s.wait_until_settled().await;

    let log = prompts.lock().unwrap();
    assert!(!log[0].contains("Conversation History:"));
    assert!(log[1].contains("Conversation History:\nHuman: first question\nAI: reply"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_history_write_does_not_stall_the_controller() {
    let (store, entered, release) = GatedHistoryStore::new();
    let store = Arc::new(store);
    let s = SessionController::new(
        AppConfig::default(),
        Arc::new(FakeEngineFactory::replying("ok")),
        Arc::new(no_search()),
        store.clone(),
    );
    s.start();
    s.wait_until_settled().await;

    s.submit_prompt("hello").unwrap();
    tokio::task::spawn_blocking(move || entered.recv())
        .await
        .unwrap()
        .unwrap();

    // The write is parked; the turn is already visible and the session busy.
    assert_eq!(s.state(), SessionState::Generating(GENERATING_STATUS.into()));
    assert_eq!(s.history().len(), 1);
    assert!(s.submit_prompt("again").is_err());

    let handle = s.clone();
    let reinit = tokio::time::timeout(
        Duration::from_secs(2),
        tokio::task::spawn_blocking(move || handle.reinitialize()),
    )
    .await;
    release.send(()).unwrap();
    reinit.expect("reinitialize waited on the history write").unwrap();

    assert_eq!(s.wait_until_settled().await, SessionState::Ready(String::new()));
    assert_eq!(s.history().turns()[0].user_message, "hello");
    let persisted = tokio::time::timeout(Duration::from_secs(2), async {
        while store.get_string(keys::CONVERSATION_HISTORY).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(persisted.is_ok());
    assert!(
        store
            .get_string(keys::CONVERSATION_HISTORY)
            .unwrap()
            .contains("hello")
    );
}

#[tokio::test]
async fn reinitialize_during_generation_discards_the_response() {
    let factory =
        FakeEngineFactory::replying("stale").with_generate_delay(Duration::from_millis(150));
    let s = ready_session(factory, no_search()).await;

    s.submit_prompt("hello").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    s.reinitialize();

    assert_eq!(s.wait_until_settled().await, SessionState::Ready(String::new()));
    assert!(s.history().is_empty());
}

// ────────────────────────────────────────────────────────────────────────────
// Web search
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn web_search_result_is_included_when_enabled() {
    let factory = FakeEngineFactory::replying("ok");
    let prompts = factory.prompt_log();
    let search = FixedSearch::new("Web search result: The answer is 42.");
    let calls = search.call_counter();
    let s = ready_session(factory, search).await;
    s.set_use_web_search(true);

    s.submit_prompt("meaning of life").unwrap();
    assert_eq!(s.state(), SessionState::Generating(SEARCHING_STATUS.into()));
    s.wait_until_settled().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let log = prompts.lock().unwrap();
    assert!(log[0].contains("Relevant Information:\nWeb search result: The answer is 42."));
}

#[tokio::test]
async fn search_sentinel_is_filtered_from_prompt() {
    let factory = FakeEngineFactory::replying("ok");
    let prompts = factory.prompt_log();
    let s = ready_session(factory, FixedSearch::new("Web search failed with code: 503")).await;
    s.set_use_web_search(true);

    s.submit_prompt("anything").unwrap();
    assert_eq!(s.wait_until_settled().await, SessionState::Ready("ok".into()));

    let log = prompts.lock().unwrap();
    assert!(!log[0].contains("Relevant Information"));
    assert!(!log[0].contains("503"));
}

#[tokio::test]
async fn search_is_skipped_when_disabled() {
    let search = no_search();
    let calls = search.call_counter();
    let s = ready_session(FakeEngineFactory::replying("ok"), search).await;

    s.submit_prompt("anything").unwrap();
    s.wait_until_settled().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ────────────────────────────────────────────────────────────────────────────
// Facade
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn active_persona_names_the_generation_cue() {
    let factory = FakeEngineFactory::replying("ok");
    let prompts = factory.prompt_log();
    let s = ready_session(factory, no_search()).await;

    let pirate = s.add_custom_personality("Pirate", "Talk like a pirate.").unwrap();
    s.select_personality(pirate.clone());
    s.submit_prompt("ahoy").unwrap();
    s.wait_until_settled().await;

    let log = prompts.lock().unwrap();
    assert!(log[0].contains("Talk like a pirate."));
    assert!(log[0].ends_with("AI (as Pirate):"));
    assert_eq!(s.history().turns()[0].personality_name, "Pirate");

    drop(log);
    assert!(s.remove_custom_personality(&pirate));
    assert_eq!(s.active_personality().id, "professional_assistant");
}

#[tokio::test]
async fn clear_history_empties_and_notifies() {
    let s = ready_session(FakeEngineFactory::replying("ok"), no_search()).await;
    s.submit_prompt("hello").unwrap();
    s.wait_until_settled().await;

    let mut events = s.events();
    s.clear_history();
    assert!(s.history().is_empty());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::HistoryCleared);
}
