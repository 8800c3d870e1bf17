//! Local keyword heuristic run before the model is ever called.
//!
//! Text and keywords are both normalized (lower-case, every run of
//! non-alphanumeric characters collapsed to one space, ends trimmed) and a
//! keyword only counts when it sits on word boundaries. The longest keyword
//! wins; equal lengths go to the one found earliest in the text, and after
//! that to the first rule in list order.

use uuid::Uuid;

use crate::models::context::ContextRule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule_id: Uuid,
    /// The keyword as the user wrote it, not the normalized form.
    pub keyword: String,
    pub flag_id: Uuid,
    pub subflag_id: Option<Uuid>,
}

pub fn match_rule(text: &str, rules: &[ContextRule]) -> Option<RuleMatch> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return None;
    }

    let mut best: Option<(&ContextRule, usize, usize)> = None;
    for rule in rules {
        let keyword = normalize(&rule.keyword);
        if keyword.is_empty() {
            continue;
        }
        let Some(offset) = word_offset(&normalized, &keyword) else {
            continue;
        };
        let score = keyword.chars().count();
        let better = match best {
            None => true,
            Some((_, best_score, best_offset)) => {
                score > best_score || (score == best_score && offset < best_offset)
            }
        };
        if better {
            best = Some((rule, score, offset));
        }
    }

    best.map(|(rule, _, _)| RuleMatch {
        rule_id: rule.id,
        keyword: rule.keyword.clone(),
        flag_id: rule.flag_id,
        subflag_id: rule.subflag_id,
    })
}

pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.truncate(out.trim_end().len());
    out
}

/// Byte offset of `keyword` as a whole word in `text`; both already normalized.
fn word_offset(text: &str, keyword: &str) -> Option<usize> {
    let padded = format!(" {text} ");
    let needle = format!(" {keyword} ");
    padded.find(&needle)
}
