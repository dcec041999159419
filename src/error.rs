use crate::compiler::parse::ParseError;
use crate::compiler::schema::SchemaError;
use crate::config::SettingsError;
use crate::llm::LlmError;
use thiserror::Error;

/// Everything an action can fail with
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("no API key configured")]
    MissingApiKey,
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("cancelled")]
    Cancelled,
}

impl CompilerError {
    /// One line suitable for the status area.
    pub fn user_message(&self) -> String {
        match self {
            CompilerError::Settings(SettingsError::Invalid(reason)) => {
                format!("Settings are invalid: {}", reason)
            }
            CompilerError::Settings(err) => err.to_string(),
            CompilerError::MissingApiKey => {
                "No API key. Pass --api-key, set GROQ_API_KEY, or save one with `settings set --api-key`."
                    .to_string()
            }
            CompilerError::Llm(err) => err.user_message(),
            CompilerError::Parse(_) => {
                "The validator did not return readable JSON. Try again or adjust the prompt."
                    .to_string()
            }
            CompilerError::Schema(err) => {
                let count = err.issues.len();
                format!(
                    "The validator response did not match the report format ({} problem{}).",
                    count,
                    if count == 1 { "" } else { "s" }
                )
            }
            CompilerError::Encode(err) => format!("Could not encode the report: {}", err),
            CompilerError::Cancelled => "Cancelled.".to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CompilerError::Cancelled)
    }
}
