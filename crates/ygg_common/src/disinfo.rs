//! Disinformation filter.
//!
//! Multi-signal scoring for unverified web content. Layers are additive and
//! the total is capped at 100. The filter never sees verified branches; it
//! guards the HUGIN intake path and the watcher's rescans.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Days after which content with present-time language is considered stale.
const STALE_CONTENT_DAYS: i64 = 365;

/// Categories of detected disinformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisinfoType {
    FabricatedContent,
    SatireAsNews,
    ConspiracyTheory,
    EmotionalManipulation,
    ScientificMisinformation,
    MisleadingClaims,
    OutdatedContent,
}

/// Severity of the finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisinfoSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// What the caller should do with the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Accept,
    Review,
    Flag,
    Block,
}

/// Optional context about the content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Full analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisinfoAnalysis {
    /// 0-100, additive across layers.
    pub risk_score: u8,
    pub detected_types: Vec<DisinfoType>,
    pub severity: DisinfoSeverity,
    /// Human-readable indicators, each prefixed with a stable code.
    pub indicators: Vec<String>,
    pub recommendation: Recommendation,
    pub explanation: String,
    /// Confidence in the analysis itself, 50-95.
    pub confidence: u8,
}

static KNOWN_DISINFO_DOMAINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "naturalnews.com",
        "infowars.com",
        "beforeitsnews.com",
        "worldtruth.tv",
        "realfarmacy.com",
        "yournewswire.com",
    ]
    .into_iter()
    .collect()
});

static SATIRE_DOMAINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "theonion.com",
        "babylonbee.com",
        "clickhole.com",
        "thedailymash.co.uk",
        "newsthump.com",
        "waterfordwhispersnews.com",
        "der-postillon.com",
    ]
    .into_iter()
    .collect()
});

static FACT_CHECKER_DOMAINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "snopes.com",
        "factcheck.org",
        "politifact.com",
        "fullfact.org",
        "faktisk.no",
        "apnews.com",
    ]
    .into_iter()
    .collect()
});

static SUSPICIOUS_DOMAIN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(real|true|patriot|freedom)(news|truth|report)").unwrap(),
        Regex::new(r"(?i)news.?24.?7").unwrap(),
        Regex::new(r"(?i)-{1,2}(exposed|uncensored|leaks)\.").unwrap(),
        Regex::new(r"\d{4,}").unwrap(),
    ]
});

static EMOTIONAL_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(shocking|outrageous|terrifying|unbelievable|disgusting|horrifying|devastating|miracle|explosive|bombshell)\b",
    )
    .unwrap()
});

static CONSPIRACY_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(they don'?t want you to know|cover-?up|deep state|wake up,? (sheeple|people)|mainstream media (won'?t|refuses)|hidden agenda|secret (plan|cabal)|the truth about)",
    )
    .unwrap()
});

static VAGUE_ATTRIBUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(experts say|sources say|studies show|scientists claim|it is said|people are saying|reports suggest|insiders reveal)\b",
    )
    .unwrap()
});

static ABSOLUTE_CLAIMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(100% proven|undeniable|irrefutable|everyone knows|no doubt whatsoever|absolutely certain|always works|never fails)\b",
    )
    .unwrap()
});

static URGENCY_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(act now|before it'?s too late|share (this )?before (it'?s )?deleted|time is running out|urgent warning)",
    )
    .unwrap()
});

static PRESENT_TIME_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(right now|today|currently|breaking|just in|happening now)\b").unwrap()
});

/// Claims that contradict settled scientific consensus, each worth +35.
static CONSENSUS_CONTRADICTIONS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("flat earth", Regex::new(r"(?i)earth is (actually )?flat").unwrap()),
        ("vaccines/autism", Regex::new(r"(?i)vaccines? cause autism").unwrap()),
        ("climate denial", Regex::new(r"(?i)climate change is (a )?(hoax|myth|lie)").unwrap()),
        ("5g harm", Regex::new(r"(?i)5g (causes|spreads|created)").unwrap()),
        ("moon landing", Regex::new(r"(?i)moon landing was (faked|staged|a hoax)").unwrap()),
        ("evolution denial", Regex::new(r"(?i)evolution is (just a theory|a lie|false)").unwrap()),
    ]
});

/// Normalize a URL to its bare hostname: scheme, `www.`, port and path
/// stripped, lowercased.
pub fn normalize_hostname(url: &str) -> String {
    let no_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = no_scheme.split(['/', '?', '#']).next().unwrap_or(no_scheme);
    let host = host.split('@').next_back().unwrap_or(host);
    let host = host.split(':').next().unwrap_or(host);
    host.trim_start_matches("www.").to_ascii_lowercase()
}

/// Analyze `(url, content, metadata)` and score the disinformation risk.
pub fn analyze(url: &str, content: &str, metadata: Option<&ContentMetadata>) -> DisinfoAnalysis {
    let host = normalize_hostname(url);
    let mut score: u32 = 0;
    let mut types: Vec<DisinfoType> = Vec::new();
    let mut indicators: Vec<String> = Vec::new();

    let known_disinfo = KNOWN_DISINFO_DOMAINS.contains(host.as_str());
    let fact_checker = FACT_CHECKER_DOMAINS.contains(host.as_str());

    // --- Source layer ---
    if known_disinfo {
        score += 50;
        push_type(&mut types, DisinfoType::FabricatedContent);
        indicators.push(format!("KNOWN_DISINFO_DOMAIN: {}", host));
    }
    if SATIRE_DOMAINS.contains(host.as_str()) {
        score += 30;
        push_type(&mut types, DisinfoType::SatireAsNews);
        indicators.push(format!("SATIRE_SOURCE: {} is a known satire outlet", host));
    }
    if !known_disinfo && !fact_checker && SUSPICIOUS_DOMAIN_PATTERNS.iter().any(|p| p.is_match(&host)) {
        score += 15;
        indicators.push(format!("SUSPICIOUS_DOMAIN_PATTERN: {}", host));
    }

    // --- Content layer ---
    let emotional = EMOTIONAL_WORDS.find_iter(content).count() as u32;
    if emotional > 0 {
        score += (5 * emotional).min(25);
        push_type(&mut types, DisinfoType::EmotionalManipulation);
        indicators.push(format!("EMOTIONAL_LANGUAGE: {} loaded terms", emotional));
    }
    let conspiracy = CONSPIRACY_MARKERS.find_iter(content).count() as u32;
    if conspiracy > 0 {
        score += (10 * conspiracy).min(40);
        push_type(&mut types, DisinfoType::ConspiracyTheory);
        indicators.push(format!("CONSPIRACY_MARKERS: {} phrases", conspiracy));
    }
    let vague = VAGUE_ATTRIBUTION.find_iter(content).count() as u32;
    if vague > 2 {
        score += (3 * vague).min(15);
        indicators.push(format!("VAGUE_ATTRIBUTION: {} unnamed-source phrases", vague));
    }
    let caps = caps_ratio(content);
    if caps > 0.15 {
        score += 10;
        indicators.push(format!("EXCESSIVE_CAPS: ratio {:.2}", caps));
    }
    let excl = exclamation_ratio(content);
    if excl > 0.3 {
        score += 8;
        indicators.push(format!("EXCESSIVE_EXCLAMATION: {:.2} per sentence", excl));
    }

    // --- Claims layer ---
    if ABSOLUTE_CLAIMS.is_match(content) {
        score += 15;
        push_type(&mut types, DisinfoType::MisleadingClaims);
        indicators.push("ABSOLUTE_CLAIMS: certainty language".to_string());
    }
    if URGENCY_MARKERS.is_match(content) {
        score += 12;
        indicators.push("ARTIFICIAL_URGENCY: pressure language".to_string());
    }

    // --- Scientific layer ---
    for (topic, pattern) in CONSENSUS_CONTRADICTIONS.iter() {
        if pattern.is_match(content) {
            score += 35;
            push_type(&mut types, DisinfoType::ScientificMisinformation);
            indicators.push(format!("CONSENSUS_CONTRADICTION: {}", topic));
        }
    }

    // --- Temporal layer ---
    if let Some(published) = metadata.and_then(|m| m.published_at) {
        let age_days = (Utc::now() - published).num_days();
        if age_days > STALE_CONTENT_DAYS && PRESENT_TIME_LANGUAGE.is_match(content) {
            score += 25;
            push_type(&mut types, DisinfoType::OutdatedContent);
            indicators.push(format!("STALE_AS_CURRENT: {} days old", age_days));
        }
    }

    let risk_score = score.min(100) as u8;

    // Fabricated or scientific misinformation forces CRITICAL.
    let severity = if types.contains(&DisinfoType::FabricatedContent)
        || types.contains(&DisinfoType::ScientificMisinformation)
    {
        DisinfoSeverity::Critical
    } else if risk_score >= 70 {
        DisinfoSeverity::Critical
    } else if risk_score >= 45 {
        DisinfoSeverity::High
    } else if risk_score >= 25 {
        DisinfoSeverity::Medium
    } else {
        DisinfoSeverity::Low
    };

    let recommendation = if known_disinfo {
        Recommendation::Block
    } else if fact_checker {
        Recommendation::Accept
    } else {
        match severity {
            DisinfoSeverity::Critical => Recommendation::Block,
            DisinfoSeverity::High => Recommendation::Flag,
            DisinfoSeverity::Medium => Recommendation::Review,
            DisinfoSeverity::Low => Recommendation::Accept,
        }
    };

    let explanation = if indicators.is_empty() {
        format!("No disinformation signals found for {}", host)
    } else {
        format!(
            "{} signal(s) on {}: {}",
            indicators.len(),
            host,
            indicators
                .iter()
                .map(|i| i.split(':').next().unwrap_or(i))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    let confidence = (50 + 10 * indicators.len() as u32).min(95) as u8;

    DisinfoAnalysis {
        risk_score,
        detected_types: types,
        severity,
        indicators,
        recommendation,
        explanation,
        confidence,
    }
}

fn push_type(types: &mut Vec<DisinfoType>, t: DisinfoType) {
    if !types.contains(&t) {
        types.push(t);
    }
}

fn caps_ratio(content: &str) -> f64 {
    let letters: Vec<char> = content.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 20 {
        return 0.0;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64
}

fn exclamation_ratio(content: &str) -> f64 {
    let sentences = content
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let exclamations = content.chars().filter(|c| *c == '!').count();
    exclamations as f64 / sentences as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_normalization() {
        assert_eq!(normalize_hostname("https://www.TheOnion.com/article/123"), "theonion.com");
        assert_eq!(normalize_hostname("http://example.com:8080/x?q=1"), "example.com");
        assert_eq!(normalize_hostname("example.org"), "example.org");
    }

    #[test]
    fn satire_source_is_flagged() {
        let a = analyze(
            "https://theonion.com/article",
            "Local man reports mild satisfaction with weather.",
            None,
        );
        assert!(a.indicators.iter().any(|i| i.starts_with("SATIRE_SOURCE")));
        assert!(a.detected_types.contains(&DisinfoType::SatireAsNews));
        assert_eq!(a.risk_score, 30);
        assert_eq!(a.severity, DisinfoSeverity::Medium);
        assert_ne!(a.recommendation, Recommendation::Accept);
    }

    #[test]
    fn known_disinfo_domain_blocks() {
        let a = analyze("https://infowars.com/post", "Anything at all.", None);
        assert_eq!(a.recommendation, Recommendation::Block);
        assert_eq!(a.severity, DisinfoSeverity::Critical);
        assert!(a.detected_types.contains(&DisinfoType::FabricatedContent));
    }

    #[test]
    fn fact_checker_is_accepted() {
        let a = analyze(
            "https://snopes.com/fact-check/x",
            "SHOCKING!!! Experts say sources say studies show scientists claim it is true!!!",
            None,
        );
        assert_eq!(a.recommendation, Recommendation::Accept);
    }

    #[test]
    fn scientific_misinformation_forces_critical() {
        let a = analyze(
            "https://example.com/science",
            "New study confirms the earth is actually flat.",
            None,
        );
        assert_eq!(a.severity, DisinfoSeverity::Critical);
        assert!(a.detected_types.contains(&DisinfoType::ScientificMisinformation));
        assert_eq!(a.recommendation, Recommendation::Block);
    }

    #[test]
    fn neutral_content_is_low_risk() {
        let a = analyze(
            "https://example.org/notes",
            "The committee met on Tuesday and approved the budget for next year.",
            None,
        );
        assert_eq!(a.risk_score, 0);
        assert_eq!(a.severity, DisinfoSeverity::Low);
        assert_eq!(a.recommendation, Recommendation::Accept);
        assert_eq!(a.confidence, 50);
    }

    #[test]
    fn stale_content_with_present_language() {
        let meta = ContentMetadata {
            published_at: Some(Utc::now() - chrono::Duration::days(500)),
            author: None,
        };
        let a = analyze(
            "https://example.com/old",
            "BREAKING: this is happening right now.",
            Some(&meta),
        );
        assert!(a.detected_types.contains(&DisinfoType::OutdatedContent));
        assert!(a.risk_score >= 25);
    }

    #[test]
    fn bounds_hold() {
        let hostile = "SHOCKING!!! They don't want you to know! The earth is actually flat! \
                       Vaccines cause autism! Climate change is a hoax! Act now before it's too late! \
                       100% proven! Experts say sources say studies show!!!";
        let a = analyze("https://truthnews4477.com/x", hostile, None);
        assert!(a.risk_score <= 100);
        assert!(a.confidence >= 50 && a.confidence <= 95);
    }

    #[test]
    fn emotional_weight_is_capped() {
        let content = "shocking outrageous terrifying unbelievable disgusting horrifying devastating";
        let a = analyze("https://example.com/x", content, None);
        // 7 hits would be 35 uncapped; layer caps at 25.
        assert_eq!(a.risk_score, 25);
    }
}
