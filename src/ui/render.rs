//! Text rendering for reports, rewrites and settings

use super::theme::{Painter, Theme};
use crate::compiler::{ConsistencyIssue, Diagnostic, ValidatorReport};
use crate::config::AppSettings;
use crate::util::{pad_to_width, single_line, truncate_to_width};
use unicode_width::UnicodeWidthChar;

/// Wrap width for messages and excerpts.
const BODY_WIDTH: usize = 72;
/// Excerpts longer than this are cut.
const EXCERPT_WIDTH: usize = 48;
const BADGE_WIDTH: usize = 9;

pub fn render_summary(report: &ValidatorReport, painter: Painter) -> String {
    let verdict = if report.pass {
        painter.badge("PASS", Theme::PASS)
    } else {
        painter.badge("FAIL", Theme::FAIL)
    };
    let s = &report.summary;
    format!(
        "{}  {} {}  {} {}  {} {}  {} {}",
        verdict,
        painter.fg("errors", Theme::ERROR),
        s.error_count,
        painter.fg("warnings", Theme::WARNING),
        s.warning_count,
        painter.fg("info", Theme::INFO),
        s.info_count,
        painter.muted("unresolved links"),
        s.unresolved_links,
    )
}

/// Full report: summary line, then one block per diagnostic.
pub fn render_report(report: &ValidatorReport, source: &str, painter: Painter) -> String {
    let mut out = render_summary(report, painter);
    out.push('\n');

    if report.diagnostics.is_empty() {
        out.push('\n');
        out.push_str(&painter.muted("No diagnostics."));
        out.push('\n');
        return out;
    }

    for diagnostic in &report.diagnostics {
        out.push('\n');
        out.push_str(&render_diagnostic(diagnostic, source, painter));
    }
    out
}

fn render_diagnostic(d: &Diagnostic, source: &str, painter: Painter) -> String {
    let color = Theme::level(d.level);
    let label = d.level.as_str().to_uppercase();
    let badge_text = pad_to_width(&label, BADGE_WIDTH - 2);
    let indent = " ".repeat(BADGE_WIDTH + 1);

    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}  {}",
        painter.badge(&badge_text, color),
        painter.bold(&d.rule_id),
        painter.muted(&format!(
            "sentence {} · chars {}..{}",
            d.sentence_index, d.span.start, d.span.end
        )),
    ));

    for line in wrap_to_width(&single_line(&d.message), BODY_WIDTH) {
        lines.push(format!("{}{}", indent, line));
    }

    let evidence = truncate_to_width(&single_line(&d.evidence), EXCERPT_WIDTH);
    lines.push(format!(
        "{}{} {}",
        indent,
        painter.muted("evidence:"),
        painter.fg(&format!("「{}」", evidence), color)
    ));

    let excerpt = d.span.excerpt(source);
    if !excerpt.is_empty() && excerpt != d.evidence {
        lines.push(format!(
            "{}{} 「{}」",
            indent,
            painter.muted("at span:"),
            truncate_to_width(&single_line(&excerpt), EXCERPT_WIDTH)
        ));
    }

    if !d.expected_slots.is_empty() {
        let slots: Vec<&str> = d.expected_slots.iter().map(|s| s.as_str()).collect();
        lines.push(format!(
            "{}{} {}",
            indent,
            painter.muted("expected:"),
            slots.join(", ")
        ));
    }

    if let Some(candidates) = d.candidates.as_ref().filter(|c| !c.is_empty()) {
        lines.push(format!(
            "{}{} {}",
            indent,
            painter.muted("candidates:"),
            candidates.join(" / ")
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn render_consistency_issues(issues: &[ConsistencyIssue], painter: Painter) -> String {
    let mut out = String::new();
    for issue in issues {
        out.push_str(&painter.fg("note:", Theme::WARNING));
        out.push_str(&format!(" report is inconsistent: {}\n", issue));
    }
    out
}

pub fn render_rewrite(rewritten: &str, painter: Painter) -> String {
    format!(
        "{}\n{}\n",
        painter.bold("Rewritten text"),
        rewritten.trim_end()
    )
}

pub fn render_settings(settings: &AppSettings, painter: Painter) -> String {
    let rows = [
        ("baseUrl", settings.base_url.clone()),
        ("modelValidator", settings.model_validator.clone()),
        ("modelRewriter", settings.model_rewriter.clone()),
        ("persistApiKey", settings.persist_api_key.to_string()),
        ("apiKey", settings.masked_api_key()),
        (
            "systemPromptValidator",
            prompt_status(&settings.system_prompt_validator, settings.effective_system_prompt_validator()),
        ),
        (
            "systemPromptRewriter",
            prompt_status(&settings.system_prompt_rewriter, settings.effective_system_prompt_rewriter()),
        ),
        (
            "validatorPromptTemplate",
            prompt_status(&settings.validator_prompt_template, settings.effective_validator_template()),
        ),
        (
            "rewriterPromptTemplate",
            prompt_status(&settings.rewriter_prompt_template, settings.effective_rewriter_template()),
        ),
    ];

    let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (key, value) in rows {
        out.push_str(&painter.muted(&pad_to_width(key, key_width)));
        out.push_str("  ");
        out.push_str(&value);
        out.push('\n');
    }
    out
}

fn prompt_status(stored: &str, effective: &str) -> String {
    let defaults = AppSettings::default();
    let is_builtin = [
        defaults.system_prompt_validator.as_str(),
        defaults.system_prompt_rewriter.as_str(),
        defaults.validator_prompt_template.as_str(),
        defaults.rewriter_prompt_template.as_str(),
    ]
    .contains(&effective);
    let chars = effective.chars().count();
    if stored.trim().is_empty() || is_builtin {
        format!("built-in ({} chars)", chars)
    } else {
        format!("custom ({} chars)", chars)
    }
}

/// Effective prompts, each under a heading.
pub fn render_prompts(settings: &AppSettings, painter: Painter) -> String {
    let sections = [
        ("systemPromptValidator", settings.effective_system_prompt_validator()),
        ("validatorPromptTemplate", settings.effective_validator_template()),
        ("systemPromptRewriter", settings.effective_system_prompt_rewriter()),
        ("rewriterPromptTemplate", settings.effective_rewriter_template()),
    ];
    let mut out = String::new();
    for (name, body) in sections {
        out.push_str(&painter.bold(&format!("== {} ==", name)));
        out.push('\n');
        out.push_str(body.trim_end());
        out.push_str("\n\n");
    }
    out
}

pub fn render_error(message: &str, painter: Painter) -> String {
    format!("{} {}", painter.fg("error:", Theme::ERROR), message)
}

/// Break `text` into lines no wider than `width` columns.
///
/// Breaks at spaces when a line has one, otherwise mid-run (CJK text has no
/// spaces to break at).
fn wrap_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut used = 0usize;
    let mut last_space: Option<usize> = None;

    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width && !current.is_empty() {
            match last_space {
                Some(idx) if idx > 0 => {
                    let rest = current.split_off(idx + 1);
                    lines.push(current.trim_end().to_string());
                    current = rest;
                }
                _ => lines.push(std::mem::take(&mut current)),
            }
            used = unicode_width::UnicodeWidthStr::width(current.as_str());
            last_space = None;
        }
        if ch == ' ' {
            last_space = Some(current.len());
        }
        current.push(ch);
        used += w;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
