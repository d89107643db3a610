//! Scripted collaborators for exercising the session controller without a
//! model file or network access.
//!
//! Shared by the unit tests and the integration tests under `tests/`.

use crate::error::{ChatError, Result};
use crate::llm::{EngineFactory, EngineHandle};
use crate::settings::ModelParameters;
use async_trait::async_trait;
use parley_search::WebSearch;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Fixed(String),
    /// `"engine {n}"`, where `n` counts constructions from 1.
    Numbered,
    Fail(String),
}

type ConstructHook = Box<dyn Fn(usize) + Send + Sync>;

/// Engine factory whose behavior is set up front.
pub struct FakeEngineFactory {
    reply: Reply,
    on_construct: Option<ConstructHook>,
    construct_error: Option<String>,
    construct_delays: Mutex<VecDeque<Duration>>,
    generate_delay: Duration,
    constructed: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
    params: Arc<Mutex<Vec<ModelParameters>>>,
}

impl FakeEngineFactory {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            on_construct: None,
            construct_error: None,
            construct_delays: Mutex::new(VecDeque::new()),
            generate_delay: Duration::ZERO,
            constructed: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            params: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every generation returns `text`.
    pub fn replying(text: &str) -> Self {
        Self::with_reply(Reply::Fixed(text.to_owned()))
    }

    /// Generations return `"engine {n}"` for the n-th constructed engine.
    pub fn numbered() -> Self {
        Self::with_reply(Reply::Numbered)
    }

    /// Construction succeeds, every generation fails with `message`.
    pub fn failing_generation(message: &str) -> Self {
        Self::with_reply(Reply::Fail(message.to_owned()))
    }

    /// Every construction fails with `message`.
    pub fn failing_construction(message: &str) -> Self {
        let mut factory = Self::replying("");
        factory.construct_error = Some(message.to_owned());
        factory
    }

    /// Delay for successive constructions; calls past the list are instant.
    pub fn with_construct_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        *self
            .construct_delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delays.into_iter().collect();
        self
    }

    /// Run `hook` with the construction number just before each construction
    /// returns, with no await point in between.
    pub fn with_construct_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_construct = Some(Box::new(hook));
        self
    }

    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = delay;
        self
    }

    /// Number of constructions started.
    pub fn construct_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.constructed)
    }

    /// Number of engines released (each counted once).
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.released)
    }

    /// Every prompt handed to `generate`, in order.
    pub fn prompt_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }

    /// Parameters passed to each construction, in order.
    pub fn params_log(&self) -> Arc<Mutex<Vec<ModelParameters>>> {
        Arc::clone(&self.params)
    }
}

impl std::fmt::Debug for FakeEngineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeEngineFactory")
            .field("reply", &self.reply)
            .field("constructed", &self.constructed)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EngineFactory for FakeEngineFactory {
    async fn construct(
        &self,
        _model_path: &Path,
        params: &ModelParameters,
    ) -> Result<Box<dyn EngineHandle>> {
        let number = self.constructed.fetch_add(1, Ordering::SeqCst) + 1;
        self.params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*params);
        let delay = self
            .construct_delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(hook) = &self.on_construct {
            hook(number);
        }
        if let Some(message) = &self.construct_error {
            return Err(ChatError::Engine(message.clone()));
        }
        let reply = match &self.reply {
            Reply::Numbered => Reply::Fixed(format!("engine {number}")),
            other => other.clone(),
        };
        Ok(Box::new(FakeEngine {
            reply,
            delay: self.generate_delay,
            released: false,
            release_counter: Arc::clone(&self.released),
            prompts: Arc::clone(&self.prompts),
        }))
    }
}

struct FakeEngine {
    reply: Reply,
    delay: Duration,
    released: bool,
    release_counter: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EngineHandle for FakeEngine {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.released {
            return Err(ChatError::Engine("engine has been released".to_owned()));
        }
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_owned());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Reply::Fixed(text) => Ok(text.clone()),
            Reply::Fail(message) => Err(ChatError::Engine(message.clone())),
            Reply::Numbered => Ok(String::new()),
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.release_counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Search collaborator that always answers with the same text.
#[derive(Debug)]
pub struct FixedSearch {
    text: String,
    calls: Arc<AtomicUsize>,
}

impl FixedSearch {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl WebSearch for FixedSearch {
    async fn search_text(&self, _query: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text.clone()
    }
}
