//! Paper context rendering
//!
//! Describes the mention's paper from the point of view of the target author:
//! title, the target's affiliation, co-authors, year and venue, an abstract
//! excerpt and keywords.

use authorlink_core::{PaperRecord, Result};

/// Render the paper context for the author at `author_index`.
///
/// Fails with `OutOfRange` when the index is past the author list.
pub fn render_paper_context(
    paper_id: &str,
    paper: &PaperRecord,
    author_index: usize,
    abstract_chars: usize,
) -> Result<String> {
    let target = paper.author(paper_id, author_index)?;

    let affiliation = target
        .affiliation
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("N/A");

    let co_authors: Vec<&str> = paper
        .authors
        .iter()
        .enumerate()
        .filter(|(i, a)| *i != author_index && !a.name.trim().is_empty())
        .map(|(_, a)| a.name.trim())
        .collect();

    let year = paper
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let venue = paper
        .venue
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("N/A");

    let mut out = format!("Title: {}\n", non_empty(&paper.title));
    out.push_str(&format!("Target author: {}\n", non_empty(&target.name)));
    out.push_str(&format!("Target affiliation: {affiliation}\n"));
    out.push_str(&format!(
        "Co-authors (excluding target): {}\n",
        if co_authors.is_empty() {
            "N/A".to_string()
        } else {
            co_authors.join(", ")
        }
    ));
    out.push_str(&format!("Year: {year} | Venue: {venue}\n"));
    out.push_str(&format!(
        "Abstract: {}\n",
        excerpt(paper.abstract_text.as_deref().unwrap_or(""), abstract_chars)
    ));
    if !paper.keywords.is_empty() {
        out.push_str(&format!("Keywords: {}\n", paper.keywords.join(", ")));
    }
    Ok(out)
}

/// Query text for ranking works against this paper
pub fn similarity_query(paper: &PaperRecord) -> String {
    if paper.keywords.is_empty() {
        paper.title.clone()
    } else {
        format!("{} {}", paper.title, paper.keywords.join(" "))
    }
}

fn non_empty(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "N/A"
    } else {
        trimmed
    }
}

/// First `max_chars` characters, never splitting a character
fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "N/A".to_string();
    }
    text.chars().take(max_chars).collect()
}
