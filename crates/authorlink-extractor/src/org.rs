//! Organization normalizer
//!
//! Reduces free-text affiliation strings to a canonical institution name
//! and merges near-duplicate names with an Indel similarity ratio.

/// Hierarchical sub-unit phrases, stripped wherever they occur.
/// Longer phrases come first so "dept of" wins over "dept".
const NOISE_PHRASES: &[&[&str]] = &[
    &["state", "key", "laboratory", "of"],
    &["key", "laboratory", "of"],
    &["school", "of"],
    &["department", "of"],
    &["dept", "of"],
    &["dept"],
    &["college", "of"],
    &["institute", "of"],
    &["lab", "of"],
    &["laboratory", "of"],
    &["faculty", "of"],
    &["division", "of"],
    &["center", "for"],
    &["centre", "for"],
];

/// Keywords that mark a segment as the institution itself
const CORE_KEYWORDS: &[&str] = &[
    "university",
    "institute",
    "academy",
    "college",
    "center",
    "laboratory",
    "research",
    "school",
];

/// Abbreviations expanded token by token, before noise stripping.
/// No expansion may contain an abbreviation.
const ALIASES: &[(&str, &str)] = &[
    ("mit", "massachusetts institute of technology"),
    ("cas", "chinese academy of sciences"),
    ("ucas", "university of chinese academy of sciences"),
    ("caltech", "california institute of technology"),
    ("cmu", "carnegie mellon university"),
    ("ustc", "university of science and technology of china"),
    ("hust", "huazhong university of science and technology"),
    ("ucla", "university of california los angeles"),
    ("ucb", "university of california berkeley"),
];

/// Default similarity (0-100) at which two affiliations merge
pub const DEFAULT_MERGE_THRESHOLD: u8 = 80;

/// Canonicalize a raw affiliation string.
///
/// Returns an empty string when nothing institutional survives. The result is
/// a fixed point: normalizing it again yields the same string.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();

    let segments: Vec<Vec<String>> = lowered
        .split([';', ','])
        .map(clean_segment)
        .filter(|tokens| !tokens.is_empty())
        .collect();

    let chosen = segments
        .iter()
        .find(|tokens| {
            let text = tokens.join(" ");
            CORE_KEYWORDS.iter().any(|kw| text.contains(kw))
        })
        .or_else(|| segments.last());

    chosen.map(|tokens| title_case(tokens)).unwrap_or_default()
}

/// Alphanumeric tokens of one segment with abbreviations expanded and
/// noise phrases removed
fn clean_segment(segment: &str) -> Vec<String> {
    let alnum: String = segment
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<String> = alnum
        .split_whitespace()
        .flat_map(|token| match ALIASES.iter().find(|(abbr, _)| *abbr == token) {
            Some((_, expansion)) => expansion.split(' ').collect::<Vec<_>>(),
            None => vec![token],
        })
        .map(str::to_string)
        .collect();

    strip_noise(&mut tokens);
    tokens
}

/// Remove noise phrases at any position until none is left
fn strip_noise(tokens: &mut Vec<String>) {
    // A removal can join two halves into a new phrase, so rescan from the start
    while let Some((start, len)) = (0..tokens.len()).find_map(|start| {
        NOISE_PHRASES
            .iter()
            .find(|phrase| starts_with_tokens(&tokens[start..], phrase))
            .map(|phrase| (start, phrase.len()))
    }) {
        tokens.drain(start..start + len);
    }
}

fn starts_with_tokens(tokens: &[String], prefix: &[&str]) -> bool {
    tokens.len() >= prefix.len() && tokens.iter().zip(prefix).all(|(t, p)| t == p)
}

/// Uppercase the first ASCII letter of each token
fn title_case(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => {
                    let mut word = first.to_ascii_uppercase().to_string();
                    word.push_str(chars.as_str());
                    word
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive Indel ratio of two affiliation strings on a 0-100 scale:
/// `2 * LCS / (|a| + |b|)`, with two empty strings fully similar
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    (2 * common_subsequence_len(&a, &b)) as f64 / total as f64 * 100.0
}

/// Longest common subsequence length, one DP row at a time
fn common_subsequence_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Greedily cluster normalized affiliations in input order.
///
/// Each string joins the first cluster whose representative is at least
/// `threshold` similar; a cluster is represented by its longest member.
pub fn merge(orgs: &[String], threshold: u8) -> Vec<String> {
    let threshold = f64::from(threshold);
    let mut merged: Vec<String> = Vec::new();

    for org in orgs.iter().filter(|o| !o.is_empty()) {
        match merged
            .iter_mut()
            .find(|existing| similarity(org, existing) >= threshold)
        {
            Some(existing) => {
                if org.len() > existing.len() {
                    *existing = org.clone();
                }
            }
            None => merged.push(org.clone()),
        }
    }

    merged
}
