//! Parsing of free-text oracle answers
//!
//! Nothing here fails: unparseable tier listings yield no tiers and
//! unrecognizable identifiers are passed through as entity IDs.

use std::sync::LazyLock;

use authorlink_core::Resolution;
use regex::Regex;

/// Identifiers the oracle uses to mean "no matching candidate"
const NIL_SENTINELS: [&str; 4] = ["NIL", "NONE", "NEW_AUTHOR", "NULL"];

/// Characters stripped from around returned identifiers
const QUOTE_CHARS: [char; 6] = ['\'', '"', '`', '[', ']', '*'];

static TIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^,:\s]+)\s*:\s*Level_?(\d)").expect("valid tier pattern")
});

static FIELD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[\s*#>_-]*(best_id|confidence(?:_level)?|reasoning|results)[\s*_]*[:：]\s*(.*)$",
    )
    .expect("valid field pattern")
});

/// Map a raw identifier to an entity or NIL.
///
/// Quotes and brackets are stripped; an empty result or any sentinel
/// (case-insensitive) is NIL. Anything else is returned as-is.
pub fn normalize_identifier(raw: &str) -> Resolution {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !QUOTE_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty()
        || NIL_SENTINELS
            .iter()
            .any(|sentinel| cleaned.eq_ignore_ascii_case(sentinel))
    {
        Resolution::Nil
    } else {
        Resolution::Entity(cleaned.to_string())
    }
}

/// A candidate and its coarse tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierAssignment {
    pub entity_id: String,
    pub tier: u8,
}

/// Parse an `ID:Level_N, ...` listing.
///
/// Keeps assignments with `tier >= min_tier`, highest tier first; equal tiers
/// keep listing order. A repeated ID keeps its first assignment.
pub fn parse_tiers(listing: &str, min_tier: u8) -> Vec<TierAssignment> {
    let mut assignments: Vec<TierAssignment> = Vec::new();

    for caps in TIER_PATTERN.captures_iter(listing) {
        let entity_id: String = caps[1]
            .chars()
            .filter(|c| !QUOTE_CHARS.contains(c))
            .collect();
        let Ok(tier) = caps[2].parse::<u8>() else {
            continue;
        };
        if entity_id.is_empty() || assignments.iter().any(|a| a.entity_id == entity_id) {
            continue;
        }
        assignments.push(TierAssignment { entity_id, tier });
    }

    assignments.retain(|a| a.tier >= min_tier);
    assignments.sort_by(|a, b| b.tier.cmp(&a.tier));
    assignments
}

/// Labeled fields of an oracle answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseFields {
    pub best_id: Option<String>,
    pub confidence: Option<u8>,
    pub reasoning: Option<String>,
    pub results: Option<String>,
}

/// Extract `best_id:`, `confidence:`, `reasoning:` and `results:` lines.
///
/// Field names are case-insensitive and may carry markdown emphasis.
/// Unlabeled lines after `reasoning:` or `results:` continue that field.
pub fn parse_fields(response: &str) -> ResponseFields {
    let mut fields = ResponseFields::default();
    let mut continuing: Option<&'static str> = None;

    for line in response.lines() {
        if let Some(caps) = FIELD_PATTERN.captures(line) {
            let name = caps[1].to_ascii_lowercase();
            let value = caps[2].trim().to_string();
            continuing = None;
            match name.as_str() {
                "best_id" => fields.best_id = Some(value),
                "reasoning" => {
                    fields.reasoning = Some(value);
                    continuing = Some("reasoning");
                }
                "results" => {
                    fields.results = Some(value);
                    continuing = Some("results");
                }
                _ => fields.confidence = first_number(&value),
            }
            continue;
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let target = match continuing {
            Some("reasoning") => fields.reasoning.as_mut(),
            Some("results") => fields.results.as_mut(),
            _ => None,
        };
        if let Some(field) = target {
            if !field.is_empty() {
                field.push(' ');
            }
            field.push_str(text);
        }
    }

    fields
}

fn first_number(text: &str) -> Option<u8> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier_sentinels() {
        for raw in ["NIL", "nil", " 'None' ", "\"new_author\"", "Null", "", "  ''  "] {
            assert_eq!(normalize_identifier(raw), Resolution::Nil, "{raw:?}");
        }
    }

    #[test]
    fn test_normalize_identifier_passes_ids_through() {
        assert_eq!(
            normalize_identifier(" 'aB12x' "),
            Resolution::Entity("aB12x".to_string())
        );
        assert_eq!(
            normalize_identifier("`5f0c3e`"),
            Resolution::Entity("5f0c3e".to_string())
        );
        // Not a candidate, still recorded
        assert_eq!(
            normalize_identifier("nil-ish"),
            Resolution::Entity("nil-ish".to_string())
        );
    }

    #[test]
    fn test_parse_tiers_sorted_and_filtered() {
        let tiers = parse_tiers("1001:Level_3, 1002:Level_5, 1003: Level 1, 1004:Level2", 2);
        let ids: Vec<&str> = tiers.iter().map(|t| t.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["1002", "1001", "1004"]);
        assert_eq!(tiers[0].tier, 5);
    }

    #[test]
    fn test_parse_tiers_tolerates_noise() {
        assert!(parse_tiers("I could not decide.", 2).is_empty());
        assert!(parse_tiers("", 2).is_empty());

        let tiers = parse_tiers("results: 'a1':Level_4\nbogus:LevelX, a2:Level_4, a1:Level_2", 2);
        let ids: Vec<&str> = tiers.iter().map(|t| t.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[test]
    fn test_parse_fields() {
        let response = "best_id: 'a17'\nconfidence: Level 5\nreasoning: Shared co-author\nWei Wang and same institute.";
        let fields = parse_fields(response);
        assert_eq!(fields.best_id.as_deref(), Some("'a17'"));
        assert_eq!(fields.confidence, Some(5));
        assert_eq!(
            fields.reasoning.as_deref(),
            Some("Shared co-author Wei Wang and same institute.")
        );
        assert!(fields.results.is_none());
    }

    #[test]
    fn test_parse_fields_markdown_and_case() {
        let response = "**Best_ID**: new_author\n**Confidence_level**: 2\n";
        let fields = parse_fields(response);
        assert_eq!(fields.best_id.as_deref(), Some("new_author"));
        assert_eq!(fields.confidence, Some(2));
        assert!(fields.reasoning.is_none());
    }

    #[test]
    fn test_parse_fields_missing_best_id() {
        let fields = parse_fields("I think it is probably the first one.");
        assert!(fields.best_id.is_none());
    }
}
