//! Inference engine abstraction.
//!
//! The session controller only sees two traits: an [`EngineFactory`] that
//! builds a handle from a model file and sampling parameters, and the
//! [`EngineHandle`] it gets back. Sampling parameters are fixed at
//! construction; changing them means building a new handle.
//!
//! [`LocalEngineFactory`] is the production implementation on top of
//! `mistralrs` GGUF inference.

mod local;

pub use local::{LocalEngine, LocalEngineFactory};

use crate::error::Result;
use crate::settings::ModelParameters;
use async_trait::async_trait;
use std::path::Path;

/// A live, resource-owning inference session.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Run one completion over `prompt` and return the visible text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ChatError::Engine`] on any inference fault or when the
    /// handle was already released.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Free the underlying model. Calling it again is a no-op.
    fn release(&mut self);
}

/// Builds engine handles.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Load the model at `model_path` with `params` baked in.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ChatError::Engine`] if the model is missing or cannot
    /// be loaded.
    async fn construct(
        &self,
        model_path: &Path,
        params: &ModelParameters,
    ) -> Result<Box<dyn EngineHandle>>;
}
