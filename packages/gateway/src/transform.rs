//! Transform instead of redact.
//!
//! Suspicious text is never marked up with redaction tokens - that would hand
//! an attacker a tuning oracle. Instead the gateway lossily re-extracts what
//! investigation actually needs: indicators and factual sentences, with
//! instruction-shaped sentences dropped. Quarantined text is replaced
//! wholesale with a neutral placeholder.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Neutral replacement for quarantined content. Deliberately content-free.
pub const QUARANTINE_PLACEHOLDER: &str =
    "Content withheld by policy. Proceed with the structured alert fields only.";

static IP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ip regex"));
// MD5 / SHA-1 / SHA-256 lengths
static HASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[a-fA-F0-9]{64}|[a-fA-F0-9]{40}|[a-fA-F0-9]{32})\b").expect("hash regex")
});
static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-zA-Z0-9][a-zA-Z0-9-]{0,62}(?:\.[a-zA-Z0-9][a-zA-Z0-9-]{0,62})+\b")
        .expect("domain regex")
});
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b").expect("email regex")
});

/// Sentence-initial shapes that read as instructions to a model rather than
/// statements about the world.
static INSTRUCTION_SHAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(please\s+)?(ignore|disregard|forget|pretend|act|reveal|show|print|repeat|output|respond|answer|say|write|execute|run|you\s+(are|must|should|will)|do\s+not|don't|always|never|remember\s+to|from\s+now\s+on|new\s+instructions?)\b",
    )
    .expect("instruction shape regex")
});

/// Extracted indicators, deduplicated and ordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub ips: Vec<String>,
    pub hashes: Vec<String>,
    pub domains: Vec<String>,
    pub emails: Vec<String>,
}

/// Pull indicators out of untrusted text.
pub fn extract_entities(text: &str) -> ExtractedEntities {
    let collect = |re: &Regex| -> Vec<String> {
        let set: BTreeSet<String> = re.find_iter(text).map(|m| m.as_str().to_string()).collect();
        set.into_iter().collect()
    };
    let emails = collect(&EMAIL_RE);
    // Domains matched inside an email address are not separate indicators
    let domains: Vec<String> = collect(&DOMAIN_RE)
        .into_iter()
        .filter(|d| !emails.iter().any(|e| e.ends_with(d.as_str())))
        .filter(|d| !IP_RE.is_match(d))
        .collect();
    ExtractedEntities {
        ips: collect(&IP_RE),
        hashes: collect(&HASH_RE),
        domains,
        emails,
    }
}

/// Lossy summary of suspicious text: kept factual sentences plus an
/// indicator digest. Instruction-shaped sentences are dropped outright.
pub fn summarize_untrusted(text: &str) -> String {
    let entities = extract_entities(text);

    let factual: Vec<&str> = text
        .split(['.', '\n', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| !INSTRUCTION_SHAPE_RE.is_match(s))
        .collect();

    let mut out = String::new();
    if !factual.is_empty() {
        out.push_str("Observed facts: ");
        out.push_str(&factual.join(". "));
        out.push('.');
    }
    let mut indicators = Vec::new();
    if !entities.ips.is_empty() {
        indicators.push(format!("ips={}", entities.ips.join(",")));
    }
    if !entities.hashes.is_empty() {
        indicators.push(format!("hashes={}", entities.hashes.join(",")));
    }
    if !entities.domains.is_empty() {
        indicators.push(format!("domains={}", entities.domains.join(",")));
    }
    if !entities.emails.is_empty() {
        indicators.push(format!("emails={}", entities.emails.join(",")));
    }
    if !indicators.is_empty() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str("Indicators: ");
        out.push_str(&indicators.join("; "));
        out.push('.');
    }
    if out.is_empty() {
        QUARANTINE_PLACEHOLDER.to_string()
    } else {
        out
    }
}
