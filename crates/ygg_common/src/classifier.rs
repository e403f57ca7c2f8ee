//! Query classifier.
//!
//! Pure function from a raw query to type, domain, complexity, and
//! verification flags. The pattern catalog is bilingual (English and
//! Norwegian). Conversational queries are tested first and short-circuit
//! verification entirely; everything else walks the catalogs in order.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Query type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Factual,
    Research,
    Theoretical,
    Creative,
    CurrentEvents,
    Procedural,
    Conversational,
    Unknown,
}

/// Knowledge domain hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryDomain {
    Science,
    Mathematics,
    History,
    Technology,
    Medicine,
    Law,
    Philosophy,
    Creative,
    Logic,
    General,
    Unknown,
}

/// Structural complexity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Full classification of one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub query_type: QueryType,
    pub domain: QueryDomain,
    pub complexity: Complexity,
    pub requires_verification: bool,
    pub requires_realtime: bool,
    pub requires_multiple_sources: bool,
    pub controversial: bool,
    pub keywords: Vec<String>,
    /// Classifier self-confidence 0-100, from signal count.
    pub confidence: u8,
}

macro_rules! catalog {
    ($($pat:expr),+ $(,)?) => {
        Lazy::new(|| vec![$(Regex::new($pat).unwrap()),+])
    };
}

// Conversational is tested first: greetings, thanks, smalltalk (en/no).
static CONVERSATIONAL: Lazy<Vec<Regex>> = catalog![
    r"(?i)^\s*(hi|hello|hey|good (morning|evening|afternoon))\b",
    r"(?i)^\s*(hei|heisann|hallo|god (morgen|kveld|dag))\b",
    r"(?i)\b(thank you|thanks|takk|tusen takk)\b",
    r"(?i)\bhow are you\b",
    r"(?i)\bhvordan (går det|har du det)\b",
    r"(?i)^\s*(bye|goodbye|ha det|farvel)\b",
];

static CURRENT_EVENTS: Lazy<Vec<Regex>> = catalog![
    r"(?i)\b(today|right now|currently|latest|breaking|this (week|month|year))\b",
    r"(?i)\b(i dag|akkurat nå|nå for tiden|siste nytt|denne (uken|måneden))\b",
    r"(?i)\b(news|headlines|nyheter|nyhetene)\b",
    r"(?i)\bwhat('s| is) happening\b",
    r"(?i)\bhva skjer\b",
];

static PROCEDURAL: Lazy<Vec<Regex>> = catalog![
    r"(?i)\bhow (do|can|to|should) (i|you|we|one)\b",
    r"(?i)\bhvordan (kan|skal|gjør) (jeg|man|vi|du)\b",
    r"(?i)\bstep[- ]by[- ]step\b",
    r"(?i)\b(trinn for trinn|fremgangsmåte|oppskrift på)\b",
    r"(?i)\b(install|configure|set up|sette? opp|installere|konfigurere)\b",
];

static CREATIVE: Lazy<Vec<Regex>> = catalog![
    r"(?i)\b(write|compose|invent) (me )?(a|an|some) (poem|story|song|joke)\b",
    r"(?i)\b(skriv|dikt|lag) (et|en|noen) (dikt|historie|sang|vits)\b",
    r"(?i)\bimagine\b",
    r"(?i)\bforestill deg\b",
];

static THEORETICAL: Lazy<Vec<Regex>> = catalog![
    r"(?i)\bwhat (would|could) happen if\b",
    r"(?i)\bhva (ville|kunne) skje(dd)? (hvis|om|dersom)\b",
    r"(?i)\b(hypothetical|in theory|thought experiment)\b",
    r"(?i)\b(hypotetisk|i teorien|tankeeksperiment)\b",
];

static RESEARCH: Lazy<Vec<Regex>> = catalog![
    r"(?i)\b(compare|contrast|analyze|evaluate|survey)\b",
    r"(?i)\b(sammenlign|analyser|vurder|drøft)\b",
    r"(?i)\b(state of the art|literature|research on|studies (on|about))\b",
    r"(?i)\b(forskning (på|om)|studier (på|om))\b",
    r"(?i)\b(pros and cons|fordeler og ulemper)\b",
];

static FACTUAL: Lazy<Vec<Regex>> = catalog![
    r"(?i)^\s*(what|who|when|where|which)\b",
    r"(?i)^\s*(hva|hvem|når|hvor|hvilke[nt]?)\b",
    r"(?i)\b(define|definition of|definer|definisjonen av)\b",
    r"(?i)\bhow (many|much|old|far|tall|fast)\b",
    r"(?i)\bhvor (mange|mye|gammel|langt|høy|fort)\b",
];

static DOMAIN_CATALOG: Lazy<Vec<(QueryDomain, Vec<Regex>)>> = Lazy::new(|| {
    fn rx(pats: &[&str]) -> Vec<Regex> {
        pats.iter().map(|p| Regex::new(p).unwrap()).collect()
    }
    vec![
        (
            QueryDomain::Mathematics,
            rx(&[
                r"(?i)\b(theorem|equation|integral|derivative|prime|algebra|geometry)\b",
                r"(?i)\b(teorem|ligning|integral|derivert|primtall|algebra|geometri|matematikk)\b",
            ]),
        ),
        (
            QueryDomain::Medicine,
            rx(&[
                r"(?i)\b(disease|symptom|diagnosis|vaccine|medication|cancer|virus)\b",
                r"(?i)\b(sykdom|symptom|diagnose|vaksine|medisin|kreft|virus)\b",
            ]),
        ),
        (
            QueryDomain::Science,
            rx(&[
                r"(?i)\b(physics|chemistry|biology|quantum|molecule|photon|speed of light|gravity|dna)\b",
                r"(?i)\b(fysikk|kjemi|biologi|kvante|molekyl|foton|lyshastighet\w*|tyngdekraft\w*)\b",
            ]),
        ),
        (
            QueryDomain::Technology,
            rx(&[
                r"(?i)\b(software|hardware|programming|algorithm|database|network|server|encryption)\b",
                r"(?i)\b(programvare|maskinvare|programmering|algoritme|database|nettverk|kryptering)\b",
            ]),
        ),
        (
            QueryDomain::History,
            rx(&[
                r"(?i)\b(history|century|ancient|empire|war of|revolution|medieval)\b",
                r"(?i)\b(historie|århundre|antikken|imperium|krigen|revolusjon|middelalder)\b",
            ]),
        ),
        (
            QueryDomain::Law,
            rx(&[
                r"(?i)\b(legal|law|statute|contract|liability|court|regulation)\b",
                r"(?i)\b(juridisk|lov|paragraf|kontrakt|ansvar|domstol|forskrift)\b",
            ]),
        ),
        (
            QueryDomain::Philosophy,
            rx(&[
                r"(?i)\b(philosophy|ethics|morality|consciousness|free will|epistemology)\b",
                r"(?i)\b(filosofi|etikk|moral|bevissthet|fri vilje|erkjennelse)\b",
            ]),
        ),
        (
            QueryDomain::Logic,
            rx(&[
                r"(?i)\b(syllogism|fallacy|premise|deduction|induction|paradox)\b",
                r"(?i)\b(syllogisme|tankefeil|premiss|deduksjon|induksjon|paradoks)\b",
            ]),
        ),
        (
            QueryDomain::Creative,
            rx(&[
                r"(?i)\b(poem|novel|painting|melody|fiction)\b",
                r"(?i)\b(dikt|roman|maleri|melodi|fiksjon)\b",
            ]),
        ),
    ]
});

static CONTROVERSIAL: Lazy<Vec<Regex>> = catalog![
    r"(?i)\b(vaccine (safety|danger)|anti-?vax|climate (hoax|denial)|election fraud)\b",
    r"(?i)\b(abortion|gun control|immigration policy|death penalty)\b",
    r"(?i)\b(vaksinemotstand|klimafornekt|valgfusk|abort|dødsstraff|innvandringspolitikk)\b",
    r"(?i)\b(conspiracy|konspirasjon)\b",
];

// Clause and conditional markers that push complexity upward.
static CLAUSE_MARKERS: Lazy<Vec<Regex>> = catalog![
    r"(?i)\b(if|unless|whereas|although|because|therefore|however|assuming)\b",
    r"(?i)\b(hvis|dersom|med mindre|selv om|fordi|derfor|likevel|forutsatt)\b",
    r"(?i)\b(and then|og deretter|in the case that|i tilfelle)\b",
    r"[;:]",
];

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // English
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
        "one", "our", "out", "has", "have", "what", "when", "where", "which", "who", "why",
        "how", "with", "this", "that", "from", "they", "will", "would", "there", "their",
        "about", "into", "than", "then", "them", "does", "did", "is", "it", "its", "his",
        "she", "him", "were", "been", "being", "much", "many", "some", "any", "most",
        // Norwegian
        "og", "i", "jeg", "det", "at", "en", "et", "den", "til", "er", "som", "på", "de",
        "med", "han", "av", "ikke", "der", "så", "var", "meg", "seg", "men", "ett", "har",
        "om", "vi", "min", "mitt", "ha", "hade", "hun", "nå", "over", "da", "ved", "fra",
        "du", "ut", "sin", "dem", "oss", "opp", "man", "kan", "hans", "hvor", "eller",
        "hva", "skal", "selv", "sjøl", "her", "alle", "vil", "bli", "ble", "blitt",
        "kunne", "inn", "når", "være", "kom", "noen", "noe", "ville", "dere", "deres",
        "kun", "ja", "etter", "ned", "skulle", "denne", "for", "deg", "hvordan", "hvilken",
    ]
    .into_iter()
    .collect()
});

/// Classify a raw query. Pure and deterministic.
pub fn classify(query: &str) -> Classification {
    let trimmed = query.trim();
    let mut signals: u32 = 0;

    // Conversational short-circuits everything, including verification.
    if matches_any(&CONVERSATIONAL, trimmed) {
        return Classification {
            query_type: QueryType::Conversational,
            domain: QueryDomain::General,
            complexity: Complexity::Simple,
            requires_verification: false,
            requires_realtime: false,
            requires_multiple_sources: false,
            controversial: false,
            keywords: extract_keywords(trimmed),
            confidence: 90,
        };
    }

    let query_type = if matches_any(&CURRENT_EVENTS, trimmed) {
        signals += 1;
        QueryType::CurrentEvents
    } else if matches_any(&CREATIVE, trimmed) {
        signals += 1;
        QueryType::Creative
    } else if matches_any(&THEORETICAL, trimmed) {
        signals += 1;
        QueryType::Theoretical
    } else if matches_any(&PROCEDURAL, trimmed) {
        signals += 1;
        QueryType::Procedural
    } else if matches_any(&RESEARCH, trimmed) {
        signals += 1;
        QueryType::Research
    } else if matches_any(&FACTUAL, trimmed) {
        signals += 1;
        QueryType::Factual
    } else if trimmed.is_empty() {
        QueryType::Unknown
    } else {
        // Unmatched but non-empty: treat as factual with low confidence.
        QueryType::Factual
    };

    let domain = DOMAIN_CATALOG
        .iter()
        .find(|(_, pats)| pats.iter().any(|p| p.is_match(trimmed)))
        .map(|(d, _)| *d)
        .unwrap_or(if trimmed.is_empty() {
            QueryDomain::Unknown
        } else {
            QueryDomain::General
        });
    if domain != QueryDomain::General && domain != QueryDomain::Unknown {
        signals += 1;
    }

    let complexity = derive_complexity(trimmed);
    let controversial = matches_any(&CONTROVERSIAL, trimmed);
    if controversial {
        signals += 1;
    }

    let requires_verification = !matches!(
        query_type,
        QueryType::Creative | QueryType::Conversational | QueryType::Unknown
    );
    let requires_realtime = query_type == QueryType::CurrentEvents;
    let requires_multiple_sources =
        controversial || query_type == QueryType::Research || complexity == Complexity::Complex;

    Classification {
        query_type,
        domain,
        complexity,
        requires_verification,
        requires_realtime,
        requires_multiple_sources,
        controversial,
        keywords: extract_keywords(trimmed),
        confidence: (50 + 15 * signals).min(95) as u8,
    }
}

fn matches_any(catalog: &[Regex], text: &str) -> bool {
    catalog.iter().any(|p| p.is_match(text))
}

/// Word count plus clause/conditional markers.
fn derive_complexity(query: &str) -> Complexity {
    let words = query.split_whitespace().count();
    let clause_hits: usize = CLAUSE_MARKERS.iter().map(|p| p.find_iter(query).count()).sum();
    let score = words + 6 * clause_hits;
    if score <= 9 {
        Complexity::Simple
    } else if score <= 24 {
        Complexity::Moderate
    } else {
        Complexity::Complex
    }
}

/// Lowercased alphanumeric tokens, stopwords removed, length > 2.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();
    for raw in query.split(|c: char| !c.is_alphanumeric()) {
        let token = raw.to_lowercase();
        if token.len() > 2 && !STOPWORDS.contains(token.as_str()) && seen.insert(token.clone()) {
            keywords.push(token);
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversational_short_circuits_verification() {
        for q in ["Hello there!", "hei, hvordan går det?", "thanks a lot"] {
            let c = classify(q);
            assert_eq!(c.query_type, QueryType::Conversational, "{}", q);
            assert!(!c.requires_verification, "{}", q);
        }
    }

    #[test]
    fn factual_in_both_languages() {
        let en = classify("What is the speed of light in vacuum?");
        assert_eq!(en.query_type, QueryType::Factual);
        assert_eq!(en.domain, QueryDomain::Science);
        assert!(en.requires_verification);

        let no = classify("Hva er lyshastigheten i vakuum?");
        assert_eq!(no.query_type, QueryType::Factual);
        assert_eq!(no.domain, QueryDomain::Science);
        assert!(no.requires_verification);
    }

    #[test]
    fn current_events_require_realtime() {
        let c = classify("What is happening in the markets today?");
        assert_eq!(c.query_type, QueryType::CurrentEvents);
        assert!(c.requires_realtime);
    }

    #[test]
    fn research_requires_multiple_sources() {
        let c = classify("Compare TCP and QUIC for lossy networks");
        assert_eq!(c.query_type, QueryType::Research);
        assert!(c.requires_multiple_sources);
    }

    #[test]
    fn creative_skips_verification() {
        let c = classify("Write me a poem about rain");
        assert_eq!(c.query_type, QueryType::Creative);
        assert!(!c.requires_verification);
    }

    #[test]
    fn complexity_from_length_and_clauses() {
        assert_eq!(classify("What is DNA?").complexity, Complexity::Simple);
        let moderate = classify("How many moons does Jupiter have and which is the largest one?");
        assert_eq!(moderate.complexity, Complexity::Moderate);
        let complex = classify(
            "If the vaccine rollout had started earlier, and assuming supply chains held, \
             how would hospitalization rates have changed; and because reporting lagged, \
             how should we adjust the baseline?",
        );
        assert_eq!(complex.complexity, Complexity::Complex);
    }

    #[test]
    fn keywords_are_lowercased_and_filtered() {
        let kw = classify("What is the Speed of Light in vacuum?").keywords;
        assert!(kw.contains(&"speed".to_string()));
        assert!(kw.contains(&"light".to_string()));
        assert!(kw.contains(&"vacuum".to_string()));
        assert!(!kw.contains(&"the".to_string()));
        assert!(!kw.contains(&"is".to_string()));
    }

    #[test]
    fn controversial_flag() {
        let c = classify("Is election fraud widespread?");
        assert!(c.controversial);
        assert!(c.requires_multiple_sources);
    }

    #[test]
    fn classification_is_deterministic() {
        let a = classify("What is the speed of light?");
        let b = classify("What is the speed of light?");
        assert_eq!(a.query_type, b.query_type);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.keywords, b.keywords);
    }
}
