//! Session controller: engine lifecycle and generation requests.
//!
//! The controller owns the engine handle and the observable [`SessionState`].
//! Every state transition happens under one lifecycle lock, so two racing
//! submitters can never both move the session out of `Ready`.
//!
//! Each [`SessionController::reinitialize`] bumps an epoch. Initialization and
//! generation tasks remember the epoch they started under and only commit
//! results while it is still current; anything that lands late is dropped
//! (and a late engine handle is released).

use crate::config::AppConfig;
use crate::error::{ChatError, Result};
use crate::history::{ConversationHistory, ConversationTurn, HistoryStore};
use crate::llm::{EngineFactory, EngineHandle, LocalEngineFactory};
use crate::personality::{Personality, PersonalityStore};
use crate::prompt;
use crate::settings::{ModelParameters, Settings, SettingsStore};
use crate::store::{JsonFileStore, KeyValueStore};
use parley_search::{InstantAnswerClient, WebSearch};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Status shown while the web search runs.
pub const SEARCHING_STATUS: &str = "Searching the web...";
/// Status shown while the engine produces the response.
pub const GENERATING_STATUS: &str = "Generating response...";
/// Error state text for a blank submission.
pub const EMPTY_PROMPT_MESSAGE: &str = "Prompt cannot be empty";
/// Error state text when no engine is loaded.
pub const NO_ENGINE_MESSAGE: &str = "Model not loaded";
/// Error state text after [`SessionController::shutdown`].
pub const SESSION_CLOSED_MESSAGE: &str = "Session closed";

const EVENT_CAPACITY: usize = 64;

/// Engine lifecycle state observed by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// An engine is being constructed.
    Initializing,
    /// Idle. Carries the last response (empty right after initialization).
    Ready(String),
    /// A generation is in flight. Carries a status line.
    Generating(String),
    /// The last operation failed.
    Error(String),
}

impl SessionState {
    /// `Ready` or `Error`: the only states that accept a new prompt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready(_) | Self::Error(_))
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => f.write_str("Initializing model..."),
            Self::Ready(_) => f.write_str("Ready"),
            Self::Generating(status) => f.write_str(status),
            Self::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// One-shot notifications, in addition to the state stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Engine construction failed.
    InitFailed { message: String },
    /// An engine finished loading and the session is `Ready`.
    ModelReady,
    /// A turn completed and was appended to history.
    TurnCompleted { turn: ConversationTurn },
    /// History was cleared.
    HistoryCleared,
}

struct Lifecycle {
    epoch: u64,
    init_token: Option<CancellationToken>,
    engine_loaded: bool,
}

struct SessionData {
    settings: SettingsStore,
    personalities: PersonalityStore,
    history: HistoryStore,
}

struct Inner {
    model_path: PathBuf,
    context_turns: usize,
    factory: Arc<dyn EngineFactory>,
    search: Arc<dyn WebSearch>,
    engine: tokio::sync::Mutex<Option<Box<dyn EngineHandle>>>,
    lifecycle: Mutex<Lifecycle>,
    data: Mutex<SessionData>,
    /// Held across a history snapshot and its write so writes land in order.
    history_writes: Mutex<()>,
    state_tx: watch::Sender<SessionState>,
    events_tx: broadcast::Sender<SessionEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle to a chat session. Cloning is cheap.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &*self.inner.state_tx.borrow())
            .field("model_path", &self.inner.model_path)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Restore settings, personalities, and history from `store`.
    ///
    /// No engine is built until [`Self::start`] is called.
    pub fn new(
        config: AppConfig,
        factory: Arc<dyn EngineFactory>,
        search: Arc<dyn WebSearch>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let data = SessionData {
            settings: SettingsStore::load(Arc::clone(&store), config.defaults),
            personalities: PersonalityStore::load(Arc::clone(&store)),
            history: HistoryStore::load(store),
        };
        let (state_tx, _) = watch::channel(SessionState::Initializing);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                model_path: config.engine.model_path,
                context_turns: config.conversation.context_turns,
                factory,
                search,
                engine: tokio::sync::Mutex::new(None),
                lifecycle: Mutex::new(Lifecycle {
                    epoch: 0,
                    init_token: None,
                    engine_loaded: false,
                }),
                data: Mutex::new(data),
                history_writes: Mutex::new(()),
                state_tx,
                events_tx,
            }),
        }
    }

    /// Production wiring: local GGUF engine, instant-answer search, and a JSON
    /// state file at `config.storage.state_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if the search settings are invalid.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let search = InstantAnswerClient::new(config.search.to_search_config())
            .map_err(|e| ChatError::Config(e.to_string()))?;
        let store = JsonFileStore::open(&config.storage.state_path);
        let factory = LocalEngineFactory::new(config.engine.clone());
        Ok(Self::new(
            config,
            Arc::new(factory),
            Arc::new(search),
            Arc::new(store),
        ))
    }

    /// Build the first engine. Same as [`Self::reinitialize`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        self.reinitialize();
    }

    /// Release the current engine and build a new one with the current
    /// parameters. Any initialization still in flight is cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn reinitialize(&self) {
        let (epoch, token) = {
            let mut lifecycle = lock(&self.inner.lifecycle);
            lifecycle.epoch += 1;
            if let Some(previous) = lifecycle.init_token.take() {
                previous.cancel();
            }
            let token = CancellationToken::new();
            lifecycle.init_token = Some(token.clone());
            lifecycle.engine_loaded = false;
            self.inner.state_tx.send_replace(SessionState::Initializing);
            (lifecycle.epoch, token)
        };
        let params = self.model_parameters();
        info!("initializing engine (epoch {epoch})");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.initialize(epoch, token, params).await });
    }

    /// Submit a user prompt.
    ///
    /// Busy sessions (`Initializing` or `Generating`) reject with
    /// [`ChatError::Session`] and keep their state. A blank prompt or a
    /// missing engine also rejects, and moves the session to `Error`.
    /// Otherwise the generation runs in the background and this returns
    /// immediately.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Session`] when the prompt is not accepted.
    pub fn submit_prompt(&self, text: &str) -> Result<()> {
        let use_web_search = lock(&self.inner.data).settings.settings().use_web_search;
        let epoch = {
            let lifecycle = lock(&self.inner.lifecycle);
            match &*self.inner.state_tx.borrow() {
                SessionState::Initializing => {
                    return Err(ChatError::Session("model is still initializing".to_owned()));
                }
                SessionState::Generating(_) => {
                    return Err(ChatError::Session(
                        "a response is already being generated".to_owned(),
                    ));
                }
                SessionState::Ready(_) | SessionState::Error(_) => {}
            }
            let rejection = if text.trim().is_empty() {
                Some(EMPTY_PROMPT_MESSAGE)
            } else if !lifecycle.engine_loaded {
                Some(NO_ENGINE_MESSAGE)
            } else {
                None
            };
            if let Some(message) = rejection {
                self.inner
                    .state_tx
                    .send_replace(SessionState::Error(message.to_owned()));
                return Err(ChatError::Session(message.to_owned()));
            }
            let status = if use_web_search {
                SEARCHING_STATUS
            } else {
                GENERATING_STATUS
            };
            self.inner
                .state_tx
                .send_replace(SessionState::Generating(status.to_owned()));
            lifecycle.epoch
        };

        let inner = Arc::clone(&self.inner);
        let prompt = text.to_owned();
        let worker = tokio::spawn(async move { inner.generate(epoch, prompt).await });
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                error!("generation task failed: {e}");
                inner.commit_if_current(epoch, SessionState::Error(e.to_string()));
            }
        });
        Ok(())
    }

    /// Cancel pending initialization and release the engine.
    ///
    /// Waits for an in-flight generation to finish first. Safe to call more
    /// than once.
    pub async fn shutdown(&self) {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            lifecycle.epoch += 1;
            if let Some(token) = lifecycle.init_token.take() {
                token.cancel();
            }
            lifecycle.engine_loaded = false;
            self.inner
                .state_tx
                .send_replace(SessionState::Error(SESSION_CLOSED_MESSAGE.to_owned()));
        }
        if let Some(mut handle) = self.inner.engine.lock().await.take() {
            handle.release();
        }
        info!("session shut down");
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to one-shot notifications.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Wait until the session is `Ready` or `Error` and return that state.
    pub async fn wait_until_settled(&self) -> SessionState {
        let mut rx = self.subscribe();
        match rx.wait_for(SessionState::is_terminal).await {
            Ok(state) => state.clone(),
            // The sender lives in `inner`, which `self` keeps alive.
            Err(_) => self.state(),
        }
    }

    pub fn personalities(&self) -> Vec<Personality> {
        lock(&self.inner.data).personalities.all()
    }

    pub fn active_personality(&self) -> Personality {
        lock(&self.inner.data).personalities.active().clone()
    }

    pub fn select_personality(&self, personality: Personality) {
        lock(&self.inner.data).personalities.select(personality);
    }

    pub fn add_custom_personality(&self, name: &str, system_prompt: &str) -> Option<Personality> {
        lock(&self.inner.data)
            .personalities
            .add_custom(name, system_prompt)
    }

    pub fn remove_custom_personality(&self, personality: &Personality) -> bool {
        lock(&self.inner.data)
            .personalities
            .remove_custom(personality)
    }

    pub fn settings(&self) -> Settings {
        lock(&self.inner.data).settings.settings()
    }

    pub fn set_use_web_search(&self, enabled: bool) {
        lock(&self.inner.data).settings.set_use_web_search(enabled);
    }

    /// Parameters the next [`Self::reinitialize`] will use.
    pub fn model_parameters(&self) -> ModelParameters {
        lock(&self.inner.data).settings.params()
    }

    /// Takes effect on the next [`Self::reinitialize`].
    pub fn set_temperature(&self, value: f32) -> f32 {
        lock(&self.inner.data).settings.set_temperature(value)
    }

    /// Takes effect on the next [`Self::reinitialize`].
    pub fn set_top_k(&self, value: i64) -> u32 {
        lock(&self.inner.data).settings.set_top_k(value)
    }

    /// Takes effect on the next [`Self::reinitialize`].
    pub fn set_top_p(&self, value: f32) -> f32 {
        lock(&self.inner.data).settings.set_top_p(value)
    }

    /// Copy of the conversation so far.
    pub fn history(&self) -> ConversationHistory {
        lock(&self.inner.data).history.snapshot()
    }

    pub fn clear_history(&self) {
        {
            let _ordered = lock(&self.inner.history_writes);
            lock(&self.inner.data).history.clear();
        }
        let _ = self.inner.events_tx.send(SessionEvent::HistoryCleared);
    }
}

impl Inner {
    /// Move to `state` unless a newer epoch has started.
    fn commit_if_current(&self, epoch: u64, state: SessionState) -> bool {
        let lifecycle = lock(&self.lifecycle);
        if lifecycle.epoch != epoch {
            debug!("dropping stale transition from epoch {epoch}");
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }

    async fn initialize(&self, epoch: u64, token: CancellationToken, params: ModelParameters) {
        let mut slot = tokio::select! {
            _ = token.cancelled() => {
                debug!("initialization {epoch} cancelled before start");
                return;
            }
            slot = self.engine.lock() => slot,
        };
        if let Some(mut previous) = slot.take() {
            previous.release();
        }

        // A construction that has already finished wins over cancellation so
        // its handle goes through the release below instead of being dropped.
        let built = tokio::select! {
            biased;
            built = self.factory.construct(&self.model_path, &params) => built,
            _ = token.cancelled() => {
                debug!("initialization {epoch} cancelled during construction");
                return;
            }
        };

        match built {
            Ok(handle) => {
                *slot = Some(handle);
                let committed = {
                    let mut lifecycle = lock(&self.lifecycle);
                    let current = lifecycle.epoch == epoch && !token.is_cancelled();
                    if current {
                        lifecycle.engine_loaded = true;
                        lifecycle.init_token = None;
                        self.state_tx.send_replace(SessionState::Ready(String::new()));
                    }
                    current
                };
                if committed {
                    info!("engine ready (epoch {epoch})");
                    let _ = self.events_tx.send(SessionEvent::ModelReady);
                } else if let Some(mut stale) = slot.take() {
                    debug!("releasing engine from superseded epoch {epoch}");
                    stale.release();
                }
            }
            Err(e) => {
                let message = format!("Model initialization failed: {e}");
                if self.commit_if_current(epoch, SessionState::Error(message.clone())) {
                    warn!("{message}");
                    let _ = self.events_tx.send(SessionEvent::InitFailed { message });
                }
            }
        }
    }

    async fn generate(self: Arc<Self>, epoch: u64, prompt: String) {
        let (use_web_search, persona, context) = {
            let data = lock(&self.data);
            (
                data.settings.settings().use_web_search,
                data.personalities.active().clone(),
                data.history.recent_context(self.context_turns),
            )
        };

        let search_text = if use_web_search {
            tracing::trace!("web search for prompt: {prompt}");
            let text = self.search.search_text(&prompt).await;
            if !self.commit_if_current(epoch, SessionState::Generating(GENERATING_STATUS.to_owned())) {
                return;
            }
            text
        } else {
            String::new()
        };

        let full_prompt = prompt::compose(&persona, &context, &search_text, use_web_search, &prompt);
        debug!("composed prompt: {} chars", full_prompt.len());

        let result = {
            let slot = self.engine.lock().await;
            match slot.as_ref() {
                Some(engine) => engine.generate(&full_prompt).await,
                None => Err(ChatError::Engine(NO_ENGINE_MESSAGE.to_owned())),
            }
        };

        match result {
            Ok(response) => {
                let turn = ConversationTurn::new(prompt, response.clone(), persona.name);
                let accepted = {
                    let lifecycle = lock(&self.lifecycle);
                    let current = lifecycle.epoch == epoch;
                    if current {
                        lock(&self.data).history.push(turn.clone());
                    }
                    current
                };
                if !accepted {
                    debug!("discarding response from superseded epoch {epoch}");
                    return;
                }

                // The state stays `Generating` until the write lands, so no
                // new turn can start and observers of `Ready` see it on disk.
                let inner = Arc::clone(&self);
                let written = tokio::task::spawn_blocking(move || {
                    let _ordered = lock(&inner.history_writes);
                    let write = lock(&inner.data).history.pending_write();
                    write.save();
                })
                .await;
                if let Err(e) = written {
                    warn!("history write task failed: {e}");
                }

                self.commit_if_current(epoch, SessionState::Ready(response));
                let _ = self.events_tx.send(SessionEvent::TurnCompleted { turn });
            }
            Err(e) => {
                warn!("generation failed: {e}");
                self.commit_if_current(epoch, SessionState::Error(e.to_string()));
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.lifecycle).init_token.take() {
            token.cancel();
        }
        if let Some(mut handle) = self.engine.get_mut().take() {
            handle.release();
        }
    }
}
