//! Validator report contract
//!
//! The validator model is told to emit a single JSON object of this shape.
//! `validate_report` checks a parsed value against it and either produces a
//! typed `ValidatorReport` or a `SchemaError` listing every offending field.
//! Extra keys are ignored at every level so newer model output still loads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Version tag the default validator prompt asks for.
pub const REPORT_VERSION: &str = "1.0";

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
    Info,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Error, Level::Warning, Level::Info];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "error" => Some(Level::Error),
            "warning" => Some(Level::Warning),
            "info" => Some(Level::Info),
            _ => None,
        }
    }

    /// Errors and warnings are unresolved links; info items are not.
    pub fn is_unresolved_link(&self) -> bool {
        matches!(self, Level::Error | Level::Warning)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of information a reader is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedSlot {
    Reference,
    Definition,
    Baseline,
    Evidence,
    Relation,
    Subject,
}

impl ExpectedSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectedSlot::Reference => "reference",
            ExpectedSlot::Definition => "definition",
            ExpectedSlot::Baseline => "baseline",
            ExpectedSlot::Evidence => "evidence",
            ExpectedSlot::Relation => "relation",
            ExpectedSlot::Subject => "subject",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "reference" => Some(ExpectedSlot::Reference),
            "definition" => Some(ExpectedSlot::Definition),
            "baseline" => Some(ExpectedSlot::Baseline),
            "evidence" => Some(ExpectedSlot::Evidence),
            "relation" => Some(ExpectedSlot::Relation),
            "subject" => Some(ExpectedSlot::Subject),
            _ => None,
        }
    }
}

impl fmt::Display for ExpectedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Character offsets into the original input (0-based, end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    /// The characters of `text` covered by this span.
    ///
    /// Offsets count `char`s, not bytes. Out-of-range offsets are clamped and
    /// an inverted span yields an empty string.
    pub fn excerpt(&self, text: &str) -> String {
        if self.end <= self.start {
            return String::new();
        }
        let start = usize::try_from(self.start).unwrap_or(usize::MAX);
        let len = usize::try_from(self.end - self.start).unwrap_or(usize::MAX);
        text.chars().skip(start).take(len).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: Level,
    pub rule_id: String,
    pub sentence_index: u64,
    pub span: Span,
    pub evidence: String,
    pub message: String,
    pub expected_slots: Vec<ExpectedSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<String>>,
}

impl Diagnostic {
    /// Category prefix of the rule id (`DEIXIS` for `DEIXIS.AMBIGUOUS`).
    pub fn rule_category(&self) -> &str {
        self.rule_id
            .split_once('.')
            .map(|(category, _)| category)
            .unwrap_or(&self.rule_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub error_count: u64,
    pub warning_count: u64,
    pub info_count: u64,
    pub unresolved_links: u64,
}

impl Summary {
    pub fn count_for(&self, level: Level) -> u64 {
        match level {
            Level::Error => self.error_count,
            Level::Warning => self.warning_count,
            Level::Info => self.info_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorReport {
    pub version: String,
    pub pass: bool,
    pub summary: Summary,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidatorReport {
    /// Number of diagnostics actually present at `level`.
    pub fn tally(&self, level: Level) -> u64 {
        self.diagnostics.iter().filter(|d| d.level == level).count() as u64
    }

    /// Check the aggregation rules the validator prompt asks the model to follow.
    ///
    /// Schema validation never looks at these; an empty result means the
    /// report agrees with itself.
    pub fn consistency_issues(&self) -> Vec<ConsistencyIssue> {
        let mut issues = Vec::new();
        let s = &self.summary;

        let expected_pass = s.error_count == 0 && s.unresolved_links == 0;
        if self.pass != expected_pass {
            issues.push(ConsistencyIssue::PassMismatch {
                pass: self.pass,
                error_count: s.error_count,
                unresolved_links: s.unresolved_links,
            });
        }

        let expected_links = s.error_count.saturating_add(s.warning_count);
        if s.unresolved_links != expected_links {
            issues.push(ConsistencyIssue::UnresolvedLinksMismatch {
                reported: s.unresolved_links,
                expected: expected_links,
            });
        }

        for level in Level::ALL {
            let reported = s.count_for(level);
            let actual = self.tally(level);
            if reported != actual {
                issues.push(ConsistencyIssue::CountMismatch {
                    level,
                    reported,
                    actual,
                });
            }
        }

        issues
    }

    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A disagreement between a report's aggregate fields and its diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyIssue {
    PassMismatch {
        pass: bool,
        error_count: u64,
        unresolved_links: u64,
    },
    UnresolvedLinksMismatch {
        reported: u64,
        expected: u64,
    },
    CountMismatch {
        level: Level,
        reported: u64,
        actual: u64,
    },
}

impl ConsistencyIssue {
    pub fn path(&self) -> String {
        match self {
            ConsistencyIssue::PassMismatch { .. } => "pass".to_string(),
            ConsistencyIssue::UnresolvedLinksMismatch { .. } => {
                "summary.unresolved_links".to_string()
            }
            ConsistencyIssue::CountMismatch { level, .. } => {
                format!("summary.{}_count", level.as_str())
            }
        }
    }
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyIssue::PassMismatch {
                pass,
                error_count,
                unresolved_links,
            } => write!(
                f,
                "pass is {} but error_count={} and unresolved_links={}",
                pass, error_count, unresolved_links
            ),
            ConsistencyIssue::UnresolvedLinksMismatch { reported, expected } => write!(
                f,
                "unresolved_links is {} but error_count + warning_count = {}",
                reported, expected
            ),
            ConsistencyIssue::CountMismatch {
                level,
                reported,
                actual,
            } => write!(
                f,
                "{}_count is {} but {} {} diagnostic(s) were returned",
                level, reported, actual, level
            ),
        }
    }
}

/// One offending field in a validator response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub path: String,
    pub problem: String,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "(root)"
        } else {
            &self.path
        };
        write!(f, "{}: {}", path, self.problem)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validator response does not match the report schema ({}): {}", .issues.len(), join_issues(.issues))]
pub struct SchemaError {
    pub issues: Vec<SchemaIssue>,
}

impl SchemaError {
    pub fn has_issue_at(&self, path: &str) -> bool {
        self.issues.iter().any(|i| i.path == path)
    }
}

impl From<Vec<ConsistencyIssue>> for SchemaError {
    fn from(issues: Vec<ConsistencyIssue>) -> Self {
        Self {
            issues: issues
                .iter()
                .map(|issue| SchemaIssue {
                    path: issue.path(),
                    problem: issue.to_string(),
                })
                .collect(),
        }
    }
}

fn join_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate a parsed JSON value against the report contract.
pub fn validate_report(value: &Value) -> Result<ValidatorReport, SchemaError> {
    let mut checker = Checker::default();
    let report = checker.report(value);
    match report {
        Some(report) if checker.issues.is_empty() => Ok(report),
        _ => Err(SchemaError {
            issues: checker.issues,
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

#[derive(Default)]
struct Checker {
    issues: Vec<SchemaIssue>,
}

impl Checker {
    fn fail(&mut self, path: String, problem: impl Into<String>) {
        self.issues.push(SchemaIssue {
            path,
            problem: problem.into(),
        });
    }

    fn required<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        parent: &str,
        key: &str,
    ) -> Option<&'a Value> {
        let value = obj.get(key);
        if value.is_none() {
            self.fail(child_path(parent, key), "missing required field");
        }
        value
    }

    fn as_object<'a>(&mut self, value: &'a Value, path: String) -> Option<&'a Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            other => {
                self.fail(path, format!("expected object, found {}", json_kind(other)));
                None
            }
        }
    }

    fn as_array<'a>(&mut self, value: &'a Value, path: String) -> Option<&'a Vec<Value>> {
        match value {
            Value::Array(items) => Some(items),
            other => {
                self.fail(path, format!("expected array, found {}", json_kind(other)));
                None
            }
        }
    }

    fn as_string(&mut self, value: &Value, path: String) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            other => {
                self.fail(path, format!("expected string, found {}", json_kind(other)));
                None
            }
        }
    }

    fn as_bool(&mut self, value: &Value, path: String) -> Option<bool> {
        match value {
            Value::Bool(b) => Some(*b),
            other => {
                self.fail(path, format!("expected boolean, found {}", json_kind(other)));
                None
            }
        }
    }

    /// Non-negative integer; `3.0` is accepted as 3, `3.5` and `-1` are not.
    fn as_count(&mut self, value: &Value, path: String) -> Option<u64> {
        let Value::Number(n) = value else {
            self.fail(
                path,
                format!("expected non-negative integer, found {}", json_kind(value)),
            );
            return None;
        };
        if let Some(u) = n.as_u64() {
            return Some(u);
        }
        if n.is_i64() {
            self.fail(path, format!("must be non-negative, found {}", n));
            return None;
        }
        match n.as_f64() {
            Some(f) if f < 0.0 => {
                self.fail(path, format!("must be non-negative, found {}", n));
                None
            }
            Some(f) if f.fract() == 0.0 && f <= u64::MAX as f64 => Some(f as u64),
            _ => {
                self.fail(path, format!("must be an integer, found {}", n));
                None
            }
        }
    }

    fn string_field(&mut self, obj: &Map<String, Value>, parent: &str, key: &str) -> Option<String> {
        let value = self.required(obj, parent, key)?;
        self.as_string(value, child_path(parent, key))
    }

    fn count_field(&mut self, obj: &Map<String, Value>, parent: &str, key: &str) -> Option<u64> {
        let value = self.required(obj, parent, key)?;
        self.as_count(value, child_path(parent, key))
    }

    fn report(&mut self, value: &Value) -> Option<ValidatorReport> {
        let obj = self.as_object(value, String::new())?;

        let version = self.string_field(obj, "", "version");
        let pass = self
            .required(obj, "", "pass")
            .and_then(|v| self.as_bool(v, "pass".to_string()));
        let summary = self
            .required(obj, "", "summary")
            .and_then(|v| self.summary(v));
        let diagnostics = self
            .required(obj, "", "diagnostics")
            .and_then(|v| self.diagnostics(v));

        Some(ValidatorReport {
            version: version?,
            pass: pass?,
            summary: summary?,
            diagnostics: diagnostics?,
        })
    }

    fn summary(&mut self, value: &Value) -> Option<Summary> {
        let obj = self.as_object(value, "summary".to_string())?;
        let error_count = self.count_field(obj, "summary", "error_count");
        let warning_count = self.count_field(obj, "summary", "warning_count");
        let info_count = self.count_field(obj, "summary", "info_count");
        let unresolved_links = self.count_field(obj, "summary", "unresolved_links");
        Some(Summary {
            error_count: error_count?,
            warning_count: warning_count?,
            info_count: info_count?,
            unresolved_links: unresolved_links?,
        })
    }

    fn diagnostics(&mut self, value: &Value) -> Option<Vec<Diagnostic>> {
        let items = self.as_array(value, "diagnostics".to_string())?;
        // Check every element so the error lists all of them, not just the first.
        let checked: Vec<Option<Diagnostic>> = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.diagnostic(item, &format!("diagnostics[{}]", i)))
            .collect();
        checked.into_iter().collect()
    }

    fn diagnostic(&mut self, value: &Value, path: &str) -> Option<Diagnostic> {
        let obj = self.as_object(value, path.to_string())?;

        let level = self.required(obj, path, "level").and_then(|v| {
            let field = child_path(path, "level");
            let raw = self.as_string(v, field.clone())?;
            let level = Level::parse(&raw);
            if level.is_none() {
                self.fail(
                    field,
                    format!("expected one of error|warning|info, found \"{}\"", raw),
                );
            }
            level
        });
        let rule_id = self.string_field(obj, path, "rule_id");
        let sentence_index = self.count_field(obj, path, "sentence_index");
        let span = self
            .required(obj, path, "span")
            .and_then(|v| self.span(v, &child_path(path, "span")));
        let evidence = self.string_field(obj, path, "evidence");
        let message = self.string_field(obj, path, "message");
        let expected_slots = self
            .required(obj, path, "expected_slots")
            .and_then(|v| self.expected_slots(v, &child_path(path, "expected_slots")));
        let candidates = match obj.get("candidates") {
            None => Some(None),
            Some(v) => self
                .candidates(v, &child_path(path, "candidates"))
                .map(Some),
        };

        Some(Diagnostic {
            level: level?,
            rule_id: rule_id?,
            sentence_index: sentence_index?,
            span: span?,
            evidence: evidence?,
            message: message?,
            expected_slots: expected_slots?,
            candidates: candidates?,
        })
    }

    fn span(&mut self, value: &Value, path: &str) -> Option<Span> {
        let obj = self.as_object(value, path.to_string())?;
        let start = self.count_field(obj, path, "start");
        let end = self.count_field(obj, path, "end");
        Some(Span {
            start: start?,
            end: end?,
        })
    }

    fn expected_slots(&mut self, value: &Value, path: &str) -> Option<Vec<ExpectedSlot>> {
        let items = self.as_array(value, path.to_string())?;
        let checked: Vec<Option<ExpectedSlot>> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let item_path = format!("{}[{}]", path, i);
                let raw = self.as_string(item, item_path.clone())?;
                let slot = ExpectedSlot::parse(&raw);
                if slot.is_none() {
                    self.fail(
                        item_path,
                        format!(
                            "expected one of reference|definition|baseline|evidence|relation|subject, found \"{}\"",
                            raw
                        ),
                    );
                }
                slot
            })
            .collect();
        checked.into_iter().collect()
    }

    fn candidates(&mut self, value: &Value, path: &str) -> Option<Vec<String>> {
        let items = self.as_array(value, path.to_string())?;
        let checked: Vec<Option<String>> = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.as_string(item, format!("{}[{}]", path, i)))
            .collect();
        checked.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_report() -> Value {
        json!({
            "version": "1.0",
            "pass": false,
            "summary": {
                "error_count": 1,
                "warning_count": 1,
                "info_count": 1,
                "unresolved_links": 2
            },
            "diagnostics": [
                {
                    "level": "error",
                    "rule_id": "DEIXIS.UNRESOLVED",
                    "sentence_index": 0,
                    "span": { "start": 0, "end": 2 },
                    "evidence": "これは",
                    "message": "「これ」の参照先がありません",
                    "expected_slots": ["reference"]
                },
                {
                    "level": "warning",
                    "rule_id": "BASELINE.MISSING",
                    "sentence_index": 1,
                    "span": { "start": 10, "end": 14 },
                    "evidence": "改善した",
                    "message": "比較基準がありません",
                    "expected_slots": ["baseline"],
                    "candidates": []
                },
                {
                    "level": "info",
                    "rule_id": "DEIXIS.DISTANT",
                    "sentence_index": 3,
                    "span": { "start": 30, "end": 32 },
                    "evidence": "その",
                    "message": "参照先が遠い",
                    "expected_slots": ["reference", "subject"],
                    "candidates": ["新方式", "旧方式"]
                }
            ]
        })
    }

    #[test]
    fn test_valid_report_is_accepted() {
        let report = validate_report(&sample_report()).unwrap();
        assert_eq!(report.version, REPORT_VERSION);
        assert!(!report.pass);
        assert_eq!(report.summary.unresolved_links, 2);
        assert_eq!(report.diagnostics.len(), 3);
        assert_eq!(report.diagnostics[0].level, Level::Error);
        assert_eq!(report.diagnostics[0].candidates, None);
        assert_eq!(report.diagnostics[1].candidates, Some(vec![]));
        assert_eq!(
            report.diagnostics[2].expected_slots,
            vec![ExpectedSlot::Reference, ExpectedSlot::Subject]
        );
    }

    #[test]
    fn test_unknown_fields_are_tolerated() {
        let mut value = sample_report();
        value["model_notes"] = json!("extra");
        value["summary"]["sentences"] = json!(4);
        value["diagnostics"][0]["confidence"] = json!(0.8);
        assert!(validate_report(&value).is_ok());
    }

    #[test]
    fn test_rejects_level_outside_enumeration() {
        let mut value = sample_report();
        value["diagnostics"][0]["level"] = json!("critical");
        let err = validate_report(&value).unwrap_err();
        assert!(err.has_issue_at("diagnostics[0].level"));
        assert!(err.to_string().contains("critical"));
    }

    #[test]
    fn test_rejects_negative_sentence_index() {
        let mut value = sample_report();
        value["diagnostics"][1]["sentence_index"] = json!(-1);
        let err = validate_report(&value).unwrap_err();
        assert!(err.has_issue_at("diagnostics[1].sentence_index"));
    }

    #[test]
    fn test_rejects_non_integral_counts_but_accepts_whole_floats() {
        let mut value = sample_report();
        value["summary"]["error_count"] = json!(1.0);
        assert_eq!(validate_report(&value).unwrap().summary.error_count, 1);

        value["summary"]["error_count"] = json!(1.5);
        let err = validate_report(&value).unwrap_err();
        assert!(err.has_issue_at("summary.error_count"));
    }

    #[test]
    fn test_rejects_unknown_expected_slot() {
        let mut value = sample_report();
        value["diagnostics"][2]["expected_slots"] = json!(["reference", "tone"]);
        let err = validate_report(&value).unwrap_err();
        assert!(err.has_issue_at("diagnostics[2].expected_slots[1]"));
    }

    #[test]
    fn test_null_candidates_are_rejected() {
        let mut value = sample_report();
        value["diagnostics"][0]["candidates"] = Value::Null;
        let err = validate_report(&value).unwrap_err();
        assert!(err.has_issue_at("diagnostics[0].candidates"));
    }

    #[test]
    fn test_lists_every_offending_field() {
        let value = json!({
            "version": 1,
            "summary": { "error_count": -2, "warning_count": 0, "info_count": 0 },
            "diagnostics": [
                { "level": "fatal" },
                "not an object"
            ]
        });
        let err = validate_report(&value).unwrap_err();
        for path in [
            "version",
            "pass",
            "summary.error_count",
            "summary.unresolved_links",
            "diagnostics[0].level",
            "diagnostics[0].rule_id",
            "diagnostics[0].span",
            "diagnostics[1]",
        ] {
            assert!(err.has_issue_at(path), "missing issue for {}: {}", path, err);
        }
    }

    #[test]
    fn test_root_must_be_object() {
        let err = validate_report(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.to_string().contains("(root)"));
    }

    #[test]
    fn test_serialization_omits_absent_candidates() {
        let report = validate_report(&sample_report()).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["diagnostics"][0].get("candidates").is_none());
        assert_eq!(value, sample_report());
    }

    #[test]
    fn test_consistent_report_has_no_issues() {
        let report = validate_report(&sample_report()).unwrap();
        assert!(report.consistency_issues().is_empty());
    }

    #[test]
    fn test_pass_with_errors_is_inconsistent_but_schema_valid() {
        let mut value = sample_report();
        value["pass"] = json!(true);
        value["summary"]["error_count"] = json!(2);
        let report = validate_report(&value).unwrap();
        let issues = report.consistency_issues();
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConsistencyIssue::PassMismatch { .. })));
        assert!(issues.contains(&ConsistencyIssue::UnresolvedLinksMismatch {
            reported: 2,
            expected: 3
        }));
        assert!(issues.contains(&ConsistencyIssue::CountMismatch {
            level: Level::Error,
            reported: 2,
            actual: 1
        }));

        let err = SchemaError::from(issues);
        assert!(err.has_issue_at("pass"));
        assert!(err.has_issue_at("summary.error_count"));
    }

    #[test]
    fn test_info_does_not_count_as_unresolved_link() {
        assert!(Level::Error.is_unresolved_link());
        assert!(Level::Warning.is_unresolved_link());
        assert!(!Level::Info.is_unresolved_link());
    }

    #[test]
    fn test_span_excerpt_uses_char_offsets() {
        let text = "これは新しい方式です。";
        let span = Span { start: 3, end: 6 };
        assert_eq!(span.excerpt(text), "新しい");
        assert_eq!(Span { start: 5, end: 2 }.excerpt(text), "");
        assert_eq!(Span { start: 9, end: 100 }.excerpt(text), "す。");
    }

    #[test]
    fn test_rule_category() {
        let report = validate_report(&sample_report()).unwrap();
        assert_eq!(report.diagnostics[0].rule_category(), "DEIXIS");
        assert_eq!(report.diagnostics[1].rule_category(), "BASELINE");
    }
}
