//! Rule-based memory extraction from user messages.

use async_trait::async_trait;
use hearth_core::error::MemoryError;
use hearth_core::memory::{ExtractionOutcome, MemoryEntry, MemoryExtractor};
use hearth_core::message::{ChatRecord, Role};
use regex::Regex;
use tracing::debug;

struct Rule {
    tag: &'static str,
    pattern: Regex,
    template: &'static str,
}

/// Extracts personal facts with a fixed set of phrase patterns
/// ("my name is", "I like", "remember that", ...).
///
/// Each match becomes one [`MemoryEntry`] tagged with the rule's category
/// and sourced from the message ID.
pub struct PatternExtractor {
    rules: Vec<Rule>,
}

impl PatternExtractor {
    pub fn new() -> Self {
        let rules = [
            ("identity", r"(?i)\bmy name is ([^.,!?\n]+)", "User's name is {}"),
            (
                "preference",
                r"(?i)\bi (like|love|prefer) ([^.,!?\n]+)",
                "User {}s {}",
            ),
            ("note", r"(?i)\bremember that ([^!?\n]+)", "{}"),
            ("location", r"(?i)\bi live in ([^.,!?\n]+)", "User lives in {}"),
            (
                "birthday",
                r"(?i)\bmy birthday is ([^.!?\n]+)",
                "User's birthday is {}",
            ),
        ]
        .into_iter()
        .filter_map(|(tag, pattern, template)| {
            Regex::new(pattern).ok().map(|pattern| Rule {
                tag,
                pattern,
                template,
            })
        })
        .collect();

        Self { rules }
    }

    fn render(template: &str, groups: &[&str]) -> String {
        let mut out = template.to_string();
        for group in groups {
            out = out.replacen("{}", group, 1);
        }
        out
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryExtractor for PatternExtractor {
    async fn extract_from_message(
        &self,
        message: &ChatRecord,
    ) -> Result<ExtractionOutcome, MemoryError> {
        if message.role != Role::User {
            return Ok(ExtractionOutcome::skipped("not a user message"));
        }
        if message.content.trim().is_empty() {
            return Ok(ExtractionOutcome::skipped("empty message"));
        }

        let mut extracted = Vec::new();
        for rule in &self.rules {
            for caps in rule.pattern.captures_iter(&message.content) {
                let groups: Vec<&str> = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str().trim())
                    .collect();
                if groups.iter().any(|g| g.is_empty()) {
                    continue;
                }
                let groups: Vec<String> = if rule.tag == "preference" {
                    vec![groups[0].to_lowercase(), groups[1].to_string()]
                } else {
                    groups.iter().map(|g| g.to_string()).collect()
                };
                let refs: Vec<&str> = groups.iter().map(String::as_str).collect();
                let content = Self::render(rule.template, &refs);
                extracted.push(
                    MemoryEntry::new(&message.user_id, content)
                        .with_tag(rule.tag)
                        .with_source(&message.id),
                );
            }
        }

        if extracted.is_empty() {
            return Ok(ExtractionOutcome::skipped("no memorable facts"));
        }

        debug!(
            message_id = %message.id,
            count = extracted.len(),
            "Extracted memories"
        );
        Ok(ExtractionOutcome {
            extracted,
            skipped: false,
            reason: None,
        })
    }
}
