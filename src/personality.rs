//! Personality presets and the active selection.
//!
//! Four built-in personalities ship with the crate and can never be removed.
//! Users may add their own; those get a fresh `custom-<uuid>` id at creation
//! and are persisted as a JSON list. The first built-in,
//! [`DEFAULT_PERSONALITY_ID`], is the fallback whenever the active selection
//! stops resolving.

use crate::store::{self, KeyValueStore, keys};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Id of the fallback personality.
pub const DEFAULT_PERSONALITY_ID: &str = "professional_assistant";

/// A named system-prompt preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub is_custom: bool,
}

impl Personality {
    fn builtin(id: &str, name: &str, system_prompt: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            system_prompt: system_prompt.to_owned(),
            is_custom: false,
        }
    }
}

const PROFESSIONAL_PROMPT: &str = "\
You are a professional assistant. Give accurate, well-organized answers in a calm, \
courteous tone. Prefer short paragraphs and concrete steps. Admit uncertainty plainly.";

const FRIENDLY_PROMPT: &str = "\
You are a warm, upbeat companion. Chat casually, show genuine interest in the user, \
and keep answers encouraging and easy to follow.";

const STORYTELLER_PROMPT: &str = "\
You are a creative storyteller. Answer with vivid imagery and narrative flair, \
weaving facts into short scenes while keeping them correct.";

const TUTOR_PROMPT: &str = "\
You are a patient tutor. Explain ideas step by step, check understanding with a \
brief question, and never make the learner feel rushed.";

/// The immutable built-in set, in display order.
pub fn default_personalities() -> Vec<Personality> {
    vec![
        Personality::builtin(
            DEFAULT_PERSONALITY_ID,
            "Professional Assistant",
            PROFESSIONAL_PROMPT,
        ),
        Personality::builtin("friendly_companion", "Friendly Companion", FRIENDLY_PROMPT),
        Personality::builtin(
            "creative_storyteller",
            "Creative Storyteller",
            STORYTELLER_PROMPT,
        ),
        Personality::builtin("patient_tutor", "Patient Tutor", TUTOR_PROMPT),
    ]
}

/// Built-ins plus user-created personalities, and the active selection.
pub struct PersonalityStore {
    store: Arc<dyn KeyValueStore>,
    defaults: Vec<Personality>,
    custom: Vec<Personality>,
    active: Personality,
}

impl std::fmt::Debug for PersonalityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonalityStore")
            .field("custom", &self.custom.len())
            .field("active", &self.active.id)
            .finish_non_exhaustive()
    }
}

impl PersonalityStore {
    /// Restore custom personalities and the selected id.
    ///
    /// A selected id that no longer resolves falls back to the default.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let defaults = default_personalities();
        let custom: Vec<Personality> = store::load_json::<Vec<Personality>>(
            store.as_ref(),
            keys::CUSTOM_PERSONALITIES,
        )
        .unwrap_or_default()
        .into_iter()
        .filter(|p| p.is_custom && !p.id.is_empty())
        .collect();

        let mut this = Self {
            active: defaults[0].clone(),
            store,
            defaults,
            custom,
        };

        if let Some(id) = this.store.get_string(keys::SELECTED_PERSONALITY_ID) {
            match this.find(&id) {
                Some(found) => this.active = found.clone(),
                None => warn!("selected personality {id} no longer exists, using default"),
            }
        }
        this
    }

    /// Snapshot of built-ins followed by customs in creation order.
    pub fn all(&self) -> Vec<Personality> {
        self.defaults.iter().chain(&self.custom).cloned().collect()
    }

    pub fn custom(&self) -> &[Personality] {
        &self.custom
    }

    pub fn find(&self, id: &str) -> Option<&Personality> {
        self.defaults.iter().chain(&self.custom).find(|p| p.id == id)
    }

    pub fn active(&self) -> &Personality {
        &self.active
    }

    /// Make `personality` the active one and persist its id.
    ///
    /// Membership in the current set is not checked here; [`Self::load`]
    /// repairs a dangling id on the next start.
    pub fn select(&mut self, personality: Personality) {
        if let Err(e) = self
            .store
            .set_string(keys::SELECTED_PERSONALITY_ID, &personality.id)
        {
            warn!("failed to persist selected personality: {e}");
        }
        info!("personality selected: {}", personality.id);
        self.active = personality;
    }

    /// Create a custom personality.
    ///
    /// Returns `None` without changing anything when either field is blank.
    pub fn add_custom(&mut self, name: &str, system_prompt: &str) -> Option<Personality> {
        let name = name.trim();
        let system_prompt = system_prompt.trim();
        if name.is_empty() || system_prompt.is_empty() {
            return None;
        }
        let personality = Personality {
            id: format!("custom-{}", uuid::Uuid::new_v4()),
            name: name.to_owned(),
            system_prompt: system_prompt.to_owned(),
            is_custom: true,
        };
        self.custom.push(personality.clone());
        self.persist_custom();
        Some(personality)
    }

    /// Delete a custom personality. Built-ins are ignored.
    ///
    /// Returns `true` if something was removed. Removing the active
    /// personality re-selects the default.
    pub fn remove_custom(&mut self, personality: &Personality) -> bool {
        if !personality.is_custom {
            return false;
        }
        let before = self.custom.len();
        self.custom.retain(|p| p.id != personality.id);
        let removed = self.custom.len() != before;
        if removed {
            self.persist_custom();
        }
        if self.active.id == personality.id {
            let fallback = self.defaults[0].clone();
            self.select(fallback);
        }
        removed
    }

    fn persist_custom(&self) {
        if let Err(e) = store::save_json(self.store.as_ref(), keys::CUSTOM_PERSONALITIES, &self.custom)
        {
            warn!("failed to persist custom personalities: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::store::MemoryStore;

    fn fresh() -> (Arc<MemoryStore>, PersonalityStore) {
        let mem = Arc::new(MemoryStore::new());
        let personalities = PersonalityStore::load(mem.clone());
        (mem, personalities)
    }

    #[test]
    fn builtins_have_stable_unique_ids() {
        let defaults = default_personalities();
        assert_eq!(defaults[0].id, DEFAULT_PERSONALITY_ID);
        assert_eq!(defaults[0].name, "Professional Assistant");
        let mut ids: Vec<_> = defaults.iter().map(|p| p.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), defaults.len());
        assert!(defaults.iter().all(|p| !p.is_custom));
    }

    #[test]
    fn starts_on_default() {
        let (_, p) = fresh();
        assert_eq!(p.active().id, DEFAULT_PERSONALITY_ID);
        assert_eq!(p.all().len(), 4);
    }

    #[test]
    fn add_custom_rejects_blank_fields() {
        let (_, mut p) = fresh();
        assert!(p.add_custom("   ", "prompt").is_none());
        assert!(p.add_custom("Name", "\n\t").is_none());
        assert!(p.custom().is_empty());
    }

    #[test]
    fn add_custom_trims_and_generates_fresh_ids() {
        let (_, mut p) = fresh();
        let a = p.add_custom("  Pirate ", " Talk like a pirate. ").unwrap();
        let b = p.add_custom("Pirate", "Talk like a pirate.").unwrap();
        assert_eq!(a.name, "Pirate");
        assert_eq!(a.system_prompt, "Talk like a pirate.");
        assert!(a.is_custom);
        assert!(a.id.starts_with("custom-"));
        assert_ne!(a.id, b.id);
        assert_eq!(p.all().len(), 6);
        assert_eq!(p.all()[4].id, a.id);
    }

    #[test]
    fn removing_builtin_is_noop() {
        let (_, mut p) = fresh();
        let before = p.all();
        let builtin = before[1].clone();
        p.select(builtin.clone());
        assert!(!p.remove_custom(&builtin));
        assert_eq!(p.all(), before);
        assert_eq!(p.active().id, builtin.id);
    }

    #[test]
    fn removing_active_custom_falls_back_to_default() {
        let (mem, mut p) = fresh();
        let custom = p.add_custom("Haiku", "Answer in haiku.").unwrap();
        p.select(custom.clone());
        assert!(p.remove_custom(&custom));
        assert_eq!(p.active().id, DEFAULT_PERSONALITY_ID);
        assert_eq!(
            mem.get_string(keys::SELECTED_PERSONALITY_ID).as_deref(),
            Some(DEFAULT_PERSONALITY_ID)
        );
    }

    #[test]
    fn customs_and_selection_survive_reload() {
        let (mem, mut p) = fresh();
        let custom = p.add_custom("Haiku", "Answer in haiku.").unwrap();
        p.select(custom.clone());

        let reloaded = PersonalityStore::load(mem);
        assert_eq!(reloaded.custom(), &[custom.clone()]);
        assert_eq!(reloaded.active(), &custom);
    }

    #[test]
    fn dangling_selection_falls_back_on_load() {
        let mem = Arc::new(MemoryStore::new());
        mem.set_string(keys::SELECTED_PERSONALITY_ID, "custom-gone")
            .unwrap();
        let p = PersonalityStore::load(mem);
        assert_eq!(p.active().id, DEFAULT_PERSONALITY_ID);
    }

    #[test]
    fn corrupt_custom_list_is_ignored() {
        let mem = Arc::new(MemoryStore::new());
        mem.set_string(keys::CUSTOM_PERSONALITIES, "{broken").unwrap();
        let p = PersonalityStore::load(mem);
        assert!(p.custom().is_empty());
        assert_eq!(p.all().len(), 4);
    }

    #[test]
    fn select_is_permissive() {
        let (_, mut p) = fresh();
        let stranger = Personality {
            id: "unknown".into(),
            name: "Stranger".into(),
            system_prompt: "Be mysterious.".into(),
            is_custom: true,
        };
        p.select(stranger.clone());
        assert_eq!(p.active(), &stranger);
    }
}
