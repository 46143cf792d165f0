//! Person-name equivalence
//!
//! Two names denote the same individual when their normalized token
//! sequences are identical, or (for two-token names only) when the tokens are
//! swapped or one token is a single-letter initial of its counterpart.
//! Longer names only match exactly.

use std::fmt;

/// Characters that separate name tokens rather than disappear
const TOKEN_SEPARATORS: [char; 4] = ['.', ',', '-', '_'];

/// A person name reduced to lowercase alphanumeric tokens
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NormalizedName {
    tokens: Vec<String>,
}

impl NormalizedName {
    /// Lowercase, split on separators and whitespace, drop other punctuation
    pub fn parse(raw: &str) -> Self {
        let cleaned: String = raw
            .to_lowercase()
            .chars()
            .map(|c| if TOKEN_SEPARATORS.contains(&c) { ' ' } else { c })
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();

        Self {
            tokens: cleaned.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Comparison key, tokens joined by `_`
    pub fn key(&self) -> String {
        self.tokens.join("_")
    }

    /// Symmetric equivalence under token-order and initials rules
    pub fn equivalent_to(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.tokens == other.tokens {
            return true;
        }

        let (a, b) = (&self.tokens, &other.tokens);
        if a.len() != 2 || b.len() != 2 {
            return false;
        }

        // Surname/given-name inversion
        if a[0] == b[1] && a[1] == b[0] {
            return true;
        }

        // "j li" vs "jian li": one position abbreviated, the other identical
        (0..2).any(|i| {
            let j = 1 - i;
            a[j] == b[j] && (is_initial_of(&a[i], &b[i]) || is_initial_of(&b[i], &a[i]))
        })
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

fn is_initial_of(initial: &str, full: &str) -> bool {
    initial.chars().count() == 1 && full.starts_with(initial)
}

/// Whether two raw name strings denote the same individual
pub fn equivalent(a: &str, b: &str) -> bool {
    NormalizedName::parse(a).equivalent_to(&NormalizedName::parse(b))
}
