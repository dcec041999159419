//! Two-stage pipeline: validate, then optionally rewrite against the report.

use super::prompts::{
    self, render_rewriter_prompt, render_validator_prompt, DIAGNOSTICS_PLACEHOLDER,
    ORIGINAL_PLACEHOLDER, TEXT_PLACEHOLDER,
};
use super::schema::{ConsistencyIssue, SchemaError, ValidatorReport};
use super::parse_report;
use crate::config::AppSettings;
use crate::error::CompilerError;
use crate::llm::models::{REWRITER_TEMPERATURE, VALIDATOR_TEMPERATURE};
use crate::llm::{pick_assistant_text, ChatBackend, ChatRequest};
use tracing::{debug, warn};

/// Result of the validator stage
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub report: ValidatorReport,
    /// Aggregate disagreements found in an otherwise well-formed report.
    pub issues: Vec<ConsistencyIssue>,
    /// Assistant text exactly as returned.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixOutcome {
    pub validation: ValidationOutcome,
    pub rewritten: String,
}

/// Prompts, models and backend for one action
pub struct Compiler<B> {
    backend: B,
    model_validator: String,
    model_rewriter: String,
    system_validator: String,
    system_rewriter: String,
    validator_template: String,
    rewriter_template: String,
    strict: bool,
}

impl<B: ChatBackend> Compiler<B> {
    pub fn new(backend: B, settings: &AppSettings) -> Self {
        Self {
            backend,
            model_validator: settings.model_validator.clone(),
            model_rewriter: settings.model_rewriter.clone(),
            system_validator: settings.effective_system_prompt_validator().to_string(),
            system_rewriter: settings.effective_system_prompt_rewriter().to_string(),
            validator_template: settings.effective_validator_template().to_string(),
            rewriter_template: settings.effective_rewriter_template().to_string(),
            strict: false,
        }
    }

    /// Reject reports whose aggregate fields disagree with their diagnostics.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Placeholders the configured templates are missing, as display lines.
    pub fn configuration_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for token in prompts::missing_placeholders(&self.validator_template, &[TEXT_PLACEHOLDER]) {
            warnings.push(format!(
                "validator template has no {}; the input text will not be sent",
                token
            ));
        }
        for token in prompts::missing_placeholders(
            &self.rewriter_template,
            &[ORIGINAL_PLACEHOLDER, DIAGNOSTICS_PLACEHOLDER],
        ) {
            warnings.push(format!("rewriter template has no {}", token));
        }
        warnings
    }

    pub fn validator_request(&self, text: &str) -> ChatRequest {
        ChatRequest::new(
            self.model_validator.clone(),
            VALIDATOR_TEMPERATURE,
            self.system_validator.clone(),
            render_validator_prompt(&self.validator_template, text),
        )
    }

    pub fn rewriter_request(
        &self,
        text: &str,
        report: &ValidatorReport,
    ) -> Result<ChatRequest, CompilerError> {
        let diagnostics_json = report.to_pretty_json()?;
        Ok(ChatRequest::new(
            self.model_rewriter.clone(),
            REWRITER_TEMPERATURE,
            self.system_rewriter.clone(),
            render_rewriter_prompt(&self.rewriter_template, text, &diagnostics_json),
        ))
    }

    /// Run the validator stage and return a schema-checked report.
    pub async fn validate(&self, text: &str) -> Result<ValidationOutcome, CompilerError> {
        let request = self.validator_request(text);
        debug!(model = %request.model, chars = text.chars().count(), "validator stage");

        let response = self.backend.chat_completions(&request).await?;
        let raw = pick_assistant_text(&response)?.to_string();
        let report = parse_report(&raw)?;

        let issues = report.consistency_issues();
        if !issues.is_empty() {
            for issue in &issues {
                warn!(path = %issue.path(), "{}", issue);
            }
            if self.strict {
                return Err(SchemaError::from(issues).into());
            }
        }

        Ok(ValidationOutcome { report, issues, raw })
    }

    /// Run the rewriter stage against an already validated report.
    pub async fn rewrite(
        &self,
        text: &str,
        report: &ValidatorReport,
    ) -> Result<String, CompilerError> {
        let request = self.rewriter_request(text, report)?;
        debug!(
            model = %request.model,
            diagnostics = report.diagnostics.len(),
            "rewriter stage"
        );

        let response = self.backend.chat_completions(&request).await?;
        Ok(pick_assistant_text(&response)?.to_string())
    }

    /// Validate, then rewrite. Any validator failure stops before the rewrite request.
    pub async fn validate_then_fix(&self, text: &str) -> Result<FixOutcome, CompilerError> {
        let validation = self.validate(text).await?;
        let rewritten = self.rewrite(text, &validation.report).await?;
        Ok(FixOutcome {
            validation,
            rewritten,
        })
    }
}
