//! On-device GGUF inference via `mistralrs`, with Metal GPU on Apple Silicon.

use super::{EngineFactory, EngineHandle};
use crate::config::EngineConfig;
use crate::error::{ChatError, Result};
use crate::settings::ModelParameters;
use async_trait::async_trait;
use mistralrs::{
    GgufModelBuilder, MemoryGpuConfig, Model, PagedAttentionMetaBuilder, RequestBuilder, Response,
    TextMessageRole, TextMessages,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Abort generation when a model emits only reasoning deltas for too long.
const REASONING_ONLY_EVENT_LIMIT: usize = 96;
const REASONING_ONLY_DURATION_LIMIT: Duration = Duration::from_secs(12);

/// Incrementally strips `<think>...</think>` blocks across streaming chunks.
#[derive(Debug, Default)]
struct ThinkTagStripper {
    in_think_block: bool,
    carry: String,
}

impl ThinkTagStripper {
    const OPEN: &'static str = "<think>";
    const CLOSE: &'static str = "</think>";

    /// Feed one fragment and return newly visible text.
    fn push(&mut self, fragment: &str) -> String {
        self.carry.push_str(fragment);
        let mut visible = String::new();
        loop {
            let tag = if self.in_think_block {
                Self::CLOSE
            } else {
                Self::OPEN
            };
            if let Some(at) = self.carry.find(tag) {
                if !self.in_think_block {
                    visible.push_str(&self.carry[..at]);
                }
                self.carry.drain(..at + tag.len());
                self.in_think_block = !self.in_think_block;
                continue;
            }
            // Hold back just enough to match a tag split across fragments.
            let cut = tail_start(&self.carry, tag.len() - 1);
            if !self.in_think_block {
                visible.push_str(&self.carry[..cut]);
            }
            self.carry.drain(..cut);
            return visible;
        }
    }

    /// Flush whatever visible text is still held back.
    fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.carry);
        if self.in_think_block {
            String::new()
        } else {
            rest
        }
    }
}

/// Byte offset where the last `keep` bytes of `s` begin, moved forward to a
/// char boundary.
fn tail_start(s: &str, keep: usize) -> usize {
    let mut at = s.len().saturating_sub(keep);
    while !s.is_char_boundary(at) {
        at += 1;
    }
    at
}

fn should_abort_reasoning_only(
    reasoning_only_events: usize,
    has_visible_output: bool,
    elapsed: Duration,
) -> bool {
    !has_visible_output
        && reasoning_only_events >= REASONING_ONLY_EVENT_LIMIT
        && elapsed >= REASONING_ONLY_DURATION_LIMIT
}

/// Builds [`LocalEngine`]s from GGUF files on disk.
#[derive(Debug, Clone, Default)]
pub struct LocalEngineFactory {
    config: EngineConfig,
}

impl LocalEngineFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    async fn load_model(&self, model_path: &Path) -> Result<Model> {
        if !model_path.is_file() {
            return Err(ChatError::Engine(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }
        let dir = model_path
            .parent()
            .and_then(Path::to_str)
            .ok_or_else(|| ChatError::Engine("model directory is not valid UTF-8".to_owned()))?;
        let file = model_path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| ChatError::Engine("model file name is not valid UTF-8".to_owned()))?;
        info!("loading local model: {}", model_path.display());

        let mut builder = GgufModelBuilder::new(dir, vec![file]).with_logging();
        if !self.config.tokenizer_id.is_empty() {
            builder = builder.with_tok_model_id(&self.config.tokenizer_id);
        }

        let context_size = self.config.effective_context_size_tokens();
        if context_size != self.config.context_size_tokens {
            warn!(
                "engine.context_size_tokens={} too small, clamping to {context_size}",
                self.config.context_size_tokens
            );
        }

        let model = builder
            .with_paged_attn(|| {
                PagedAttentionMetaBuilder::default()
                    .with_gpu_memory(MemoryGpuConfig::ContextSize(context_size))
                    .build()
            })
            .map_err(|e| ChatError::Engine(format!("paged attention config failed: {e}")))?
            .build()
            .await
            .map_err(|e| ChatError::Engine(format!("model build failed: {e}")))?;

        info!("local model loaded (context_size_tokens={context_size})");
        Ok(model)
    }
}

#[async_trait]
impl EngineFactory for LocalEngineFactory {
    async fn construct(
        &self,
        model_path: &Path,
        params: &ModelParameters,
    ) -> Result<Box<dyn EngineHandle>> {
        let model = self.load_model(model_path).await?;
        Ok(Box::new(LocalEngine {
            model: Some(Arc::new(model)),
            params: params.clamped(),
            max_tokens: self.config.max_tokens,
            first_token_timeout: Duration::from_secs(self.config.first_token_timeout_secs),
        }))
    }
}

/// A loaded GGUF model with fixed sampling parameters.
pub struct LocalEngine {
    model: Option<Arc<Model>>,
    params: ModelParameters,
    max_tokens: usize,
    first_token_timeout: Duration,
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("loaded", &self.model.is_some())
            .field("params", &self.params)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl LocalEngine {
    fn request(&self, prompt: &str) -> RequestBuilder {
        let messages = TextMessages::new()
            .enable_thinking(false)
            .add_message(TextMessageRole::User, prompt);
        RequestBuilder::from(messages)
            .set_sampler_temperature(f64::from(self.params.temperature))
            .set_sampler_topk(self.params.top_k as usize)
            .set_sampler_topp(f64::from(self.params.top_p))
            .set_sampler_max_len(self.max_tokens)
            .enable_thinking(false)
    }
}

#[async_trait]
impl EngineHandle for LocalEngine {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let model = self
            .model
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| ChatError::Engine("engine has been released".to_owned()))?;

        debug!("generating from {} prompt chars", prompt.len());
        let started = Instant::now();
        let mut stream = model
            .stream_chat_request(self.request(prompt))
            .await
            .map_err(|e| ChatError::Engine(format!("stream request failed: {e}")))?;

        let mut text = String::new();
        let mut stripper = ThinkTagStripper::default();
        let mut token_count: usize = 0;
        let mut reasoning_only_events: usize = 0;
        let mut first_token_received = false;

        loop {
            let next = if first_token_received {
                stream.next().await
            } else {
                match tokio::time::timeout(self.first_token_timeout, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            "no first token after {}s; consider the 'metal' feature for GPU acceleration",
                            self.first_token_timeout.as_secs()
                        );
                        return Err(ChatError::Engine(
                            "first token timeout: model did not produce output in time".to_owned(),
                        ));
                    }
                }
            };
            let Some(response) = next else { break };

            match response {
                Response::Chunk(chunk) => {
                    let Some(choice) = chunk.choices.first() else {
                        continue;
                    };
                    let content = choice.delta.content.as_deref().unwrap_or_default();
                    let reasoning = choice
                        .delta
                        .reasoning_content
                        .as_deref()
                        .unwrap_or_default();
                    if content.is_empty() && reasoning.is_empty() {
                        continue;
                    }
                    if !first_token_received {
                        first_token_received = true;
                        info!(
                            "first token received in {:.1}s",
                            started.elapsed().as_secs_f64()
                        );
                    }
                    token_count += 1;
                    if content.is_empty() {
                        reasoning_only_events += 1;
                        if should_abort_reasoning_only(
                            reasoning_only_events,
                            !text.trim().is_empty(),
                            started.elapsed(),
                        ) {
                            return Err(ChatError::Engine(
                                "model produced reasoning-only output for too long".to_owned(),
                            ));
                        }
                        continue;
                    }
                    text.push_str(&stripper.push(content));
                }
                Response::Done(done) => {
                    if let Some(choice) = done.choices.first() {
                        let content = choice.message.content.as_deref().unwrap_or_default();
                        text.push_str(&stripper.push(content));
                    }
                    break;
                }
                Response::ModelError(msg, _) => {
                    return Err(ChatError::Engine(format!("model error: {msg}")));
                }
                Response::InternalError(e) => {
                    return Err(ChatError::Engine(format!("internal error: {e}")));
                }
                Response::ValidationError(e) => {
                    return Err(ChatError::Engine(format!("validation error: {e}")));
                }
                _ => {}
            }
        }
        text.push_str(&stripper.finish());

        let elapsed = started.elapsed().as_secs_f64();
        info!("generated {token_count} tokens in {elapsed:.1}s");
        Ok(text.trim().to_owned())
    }

    fn release(&mut self) {
        if self.model.take().is_some() {
            info!("local model released");
        }
    }
}
