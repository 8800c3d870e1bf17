// Triage prompt templates.
// The builder is pure: the same input always produces the same text.

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::context::catalog::ContextOption;
use crate::context::matcher::RuleMatch;
use crate::models::context::ContextRule;

pub const TRIAGE_PREAMBLE: &str = "\
You are an information extraction engine.
Return ONLY a valid JSON object. No markdown, no extra text.
Use RFC3339 timestamps.
";

pub const TRIAGE_OUTPUT_CONTRACT: &str = r#"Output JSON schema:
{"type":"task|reminder|event|shopping|note","title":"string","confidence":0.0,"context":{"flagId":"string","subflagId":"string|null"},"needs_review":true,"payload":{...}}
Payload by type:
- task: {"dueAt": "RFC3339|null"}
- reminder: {"at": "RFC3339"}
- event: {"start": "RFC3339", "end": "RFC3339", "allDay": true}
- shopping: {"items": [{"title": "string", "quantity": "string|null"}]}
- note: {"content": "string"}
Rules:
- Use needs_review=true when unsure.
- If type=event then end must be >= start.
- If type=shopping then items must be non-empty.
- If type=reminder then payload.at must exist.
"#;

/// A pre-computed context guess passed along to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHint {
    pub flag_id: Uuid,
    pub subflag_id: Option<Uuid>,
    pub reason: String,
}

impl From<&RuleMatch> for ContextHint {
    fn from(m: &RuleMatch) -> Self {
        ContextHint {
            flag_id: m.flag_id,
            subflag_id: m.subflag_id,
            reason: format!("keyword:{}", m.keyword),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptInput<'a> {
    pub raw_text: &'a str,
    pub locale: &'a str,
    pub timezone: &'a str,
    pub now: Option<DateTime<Utc>>,
    pub contexts: &'a [ContextOption],
    pub rules: &'a [ContextRule],
    pub hint: Option<ContextHint>,
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let mut out = String::from(TRIAGE_PREAMBLE);

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Locale: {}", input.locale.trim());
    let _ = writeln!(out, "Timezone: {}", input.timezone.trim());
    if let Some(now) = input.now {
        let _ = writeln!(
            out,
            "Now: {}",
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    out.push_str("Raw text:\n");
    let _ = writeln!(out, "{}", quote_block(input.raw_text));

    if !input.contexts.is_empty() {
        out.push_str("Available contexts:\n");
        for ctx in input.contexts {
            let _ = write!(out, "- flagId={} name={}", ctx.flag_id, ctx.flag_name);
            if let (Some(id), Some(name)) = (ctx.subflag_id, ctx.subflag_name.as_deref()) {
                let _ = write!(out, " subflagId={id} name={name}");
            }
            out.push('\n');
        }
    }

    if !input.rules.is_empty() {
        out.push_str("Context rules (keyword -> context):\n");
        for rule in input.rules {
            let _ = write!(out, "- \"{}\" -> flagId={}", rule.keyword, rule.flag_id);
            if let Some(sub) = rule.subflag_id {
                let _ = write!(out, " subflagId={sub}");
            }
            out.push('\n');
        }
    }

    if let Some(hint) = &input.hint {
        let _ = write!(out, "Hinted context: flagId={}", hint.flag_id);
        if let Some(sub) = hint.subflag_id {
            let _ = write!(out, " subflagId={sub}");
        }
        if !hint.reason.is_empty() {
            let _ = write!(out, " (reason: {})", hint.reason);
        }
        out.push('\n');
    }

    out.push_str(TRIAGE_OUTPUT_CONTRACT);
    out
}

/// Trims, escapes double quotes and wraps the text in quotes.
fn quote_block(text: &str) -> String {
    format!("\"{}\"", text.trim().replace('"', "\\\""))
}
