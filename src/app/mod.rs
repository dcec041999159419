//! Action controller
//!
//! Owns the settings store and the idle/busy state for one invocation. Each
//! action reads settings fresh, runs the pipeline under an abort
//! registration, and returns to idle afterwards whatever the outcome.

use crate::compiler::{Compiler, FixOutcome, ValidationOutcome};
use crate::config::{AppSettings, SettingsStore};
use crate::error::CompilerError;
use crate::llm::{ChatBackend, ChatClient};
use crate::store::KeyValueStore;
use futures::future::{AbortRegistration, Abortable};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Validate,
    ValidateThenFix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Validating,
    Rewriting,
}

impl AppState {
    pub fn label(&self) -> &'static str {
        match self {
            AppState::Idle => "idle",
            AppState::Validating => "validating",
            AppState::Rewriting => "rewriting",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Validated(ValidationOutcome),
    Fixed(FixOutcome),
}

impl ActionOutcome {
    pub fn validation(&self) -> &ValidationOutcome {
        match self {
            ActionOutcome::Validated(validation) => validation,
            ActionOutcome::Fixed(fix) => &fix.validation,
        }
    }

    pub fn rewritten(&self) -> Option<&str> {
        match self {
            ActionOutcome::Validated(_) => None,
            ActionOutcome::Fixed(fix) => Some(&fix.rewritten),
        }
    }
}

/// Settings and credential resolved for a single action
#[derive(Debug, Clone)]
pub struct Session {
    pub settings: AppSettings,
    api_key: String,
}

impl Session {
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn chat_client(&self) -> ChatClient {
        ChatClient::new(self.settings.base_url.trim(), self.api_key.clone())
    }

    pub fn compiler(&self, strict: bool) -> Compiler<ChatClient> {
        Compiler::new(self.chat_client(), &self.settings).strict(strict)
    }
}

/// Field changes for `settings set`; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub base_url: Option<String>,
    pub model_validator: Option<String>,
    pub model_rewriter: Option<String>,
    pub persist_api_key: Option<bool>,
    pub api_key: Option<String>,
    pub system_prompt_validator: Option<String>,
    pub system_prompt_rewriter: Option<String>,
    pub validator_prompt_template: Option<String>,
    pub rewriter_prompt_template: Option<String>,
    /// Applied before the individual prompt fields.
    pub reset_prompts: bool,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        !self.reset_prompts
            && self.base_url.is_none()
            && self.model_validator.is_none()
            && self.model_rewriter.is_none()
            && self.persist_api_key.is_none()
            && self.api_key.is_none()
            && self.system_prompt_validator.is_none()
            && self.system_prompt_rewriter.is_none()
            && self.validator_prompt_template.is_none()
            && self.rewriter_prompt_template.is_none()
    }

    pub fn apply(self, settings: &mut AppSettings) {
        if self.reset_prompts {
            settings.reset_prompts();
        }
        if let Some(v) = self.base_url {
            settings.base_url = v.trim().to_string();
        }
        if let Some(v) = self.model_validator {
            settings.model_validator = v.trim().to_string();
        }
        if let Some(v) = self.model_rewriter {
            settings.model_rewriter = v.trim().to_string();
        }
        if let Some(v) = self.persist_api_key {
            settings.persist_api_key = v;
        }
        if let Some(v) = self.api_key {
            settings.api_key = v.trim().to_string();
        }
        if let Some(v) = self.system_prompt_validator {
            settings.system_prompt_validator = v;
        }
        if let Some(v) = self.system_prompt_rewriter {
            settings.system_prompt_rewriter = v;
        }
        if let Some(v) = self.validator_prompt_template {
            settings.validator_prompt_template = v;
        }
        if let Some(v) = self.rewriter_prompt_template {
            settings.rewriter_prompt_template = v;
        }
    }
}

pub struct App<S> {
    settings: SettingsStore<S>,
    session_api_key: Option<String>,
    state: AppState,
    last_error: Option<String>,
}

impl<S: KeyValueStore> App<S> {
    pub fn new(settings: SettingsStore<S>) -> Self {
        Self {
            settings,
            session_api_key: None,
            state: AppState::Idle,
            last_error: None,
        }
    }

    /// Key used for this process only; it wins over a persisted one.
    pub fn with_session_api_key(mut self, key: Option<String>) -> Self {
        self.session_api_key = key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn settings_store(&self) -> &SettingsStore<S> {
        &self.settings
    }

    pub fn load_settings(&self) -> Result<AppSettings, CompilerError> {
        Ok(self.settings.load()?)
    }

    /// Apply `update` over the stored settings, check them, and save.
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<AppSettings, CompilerError> {
        let mut settings = self.settings.load()?;
        update.apply(&mut settings);
        settings.validate()?;
        self.settings.save(&settings)?;
        Ok(settings)
    }

    /// Fresh settings plus the key to send, or `MissingApiKey`.
    pub fn prepare(&self) -> Result<Session, CompilerError> {
        let settings = self.settings.load()?;
        settings.validate()?;

        let api_key = match &self.session_api_key {
            Some(key) => key.clone(),
            None => settings.api_key.trim().to_string(),
        };
        if api_key.is_empty() {
            return Err(CompilerError::MissingApiKey);
        }

        Ok(Session { settings, api_key })
    }

    /// Run `action` until it finishes or `registration` is aborted.
    pub async fn run<B: ChatBackend>(
        &mut self,
        compiler: &Compiler<B>,
        action: Action,
        text: &str,
        registration: AbortRegistration,
    ) -> Result<ActionOutcome, CompilerError> {
        self.last_error = None;
        let state = &mut self.state;

        let work = async move {
            transition(state, AppState::Validating);
            let validation = compiler.validate(text).await?;
            match action {
                Action::Validate => Ok(ActionOutcome::Validated(validation)),
                Action::ValidateThenFix => {
                    transition(state, AppState::Rewriting);
                    let rewritten = compiler.rewrite(text, &validation.report).await?;
                    Ok(ActionOutcome::Fixed(FixOutcome {
                        validation,
                        rewritten,
                    }))
                }
            }
        };

        let result = match Abortable::new(work, registration).await {
            Ok(result) => result,
            Err(_aborted) => Err(CompilerError::Cancelled),
        };

        transition(&mut self.state, AppState::Idle);
        if let Err(err) = &result {
            self.last_error = Some(err.user_message());
        }
        result
    }
}

fn transition(state: &mut AppState, next: AppState) {
    debug!(from = state.label(), to = next.label(), "state change");
    *state = next;
}
