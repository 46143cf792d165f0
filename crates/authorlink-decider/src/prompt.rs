//! Prompt construction for the LLM oracle

use std::fmt::{self, Write};

use authorlink_core::{DecisionRequest, GradingRequest};

/// Tagged prompt layout: role, input sections, task, numbered rules.
///
/// Empty parts are omitted from the output.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    role: String,
    sections: Vec<(String, String)>,
    task: String,
    rules: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Append an input section under a `## title` heading
    pub fn section(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.sections.push((title.into(), body.into()));
        self
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn build(self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.render(&mut out);
        out
    }

    fn render(&self, out: &mut String) -> fmt::Result {
        if !self.role.is_empty() {
            writeln!(out, "<role>\n{}\n</role>\n", self.role)?;
        }
        if !self.sections.is_empty() {
            writeln!(out, "<input>")?;
            for (title, body) in &self.sections {
                writeln!(out, "## {title}\n{}\n", body.trim_end())?;
            }
            writeln!(out, "</input>\n")?;
        }
        if !self.task.is_empty() {
            writeln!(out, "<task>\n{}\n</task>\n", self.task)?;
        }
        if !self.rules.is_empty() {
            writeln!(out, "<rules>")?;
            for (n, rule) in self.rules.iter().enumerate() {
                writeln!(out, "{}. {rule}", n + 1)?;
            }
            writeln!(out, "</rules>")?;
        }
        Ok(())
    }
}

const IDENTITY_SYSTEM: &str = "You decide whether the target author of a paper is one of the \
candidate scholars. This is an identity judgment: every piece of positive evidence must come \
from facts stated in the input. Evidence that relies on \"probably\" or \"looks like\" is not \
evidence. Numbers in parentheses are occurrence counts; higher counts are more representative.";

/// Prompt for the coarse tier-grading call
pub fn grading_prompt(request: &GradingRequest) -> String {
    PromptBuilder::new()
        .role(IDENTITY_SYSTEM)
        .section("Paper", &request.paper_context)
        .section("Candidates", &request.candidate_briefs)
        .task(
            "Grade how likely each candidate is to be the target author, using co-authors, \
             keywords and affiliations only.",
        )
        .rule("Level_5: at least one co-author of the paper is a known collaborator.")
        .rule("Level_4: keywords closely match and the affiliation agrees.")
        .rule("Level_3: keywords closely match but the affiliation is missing or differs.")
        .rule("Level_2: keywords overlap only partially, no other evidence.")
        .rule("Level_1: field, affiliation and collaborators are all unrelated.")
        .rule(format!(
            "Grade every candidate ID from this list and no other: {}.",
            request.candidate_ids.join(", ")
        ))
        .rule(
            "Answer with exactly one line: `results: ID:Level_N, ID:Level_N, ...`",
        )
        .build()
}

/// Prompt for a deep (or single-stage) identity decision
pub fn decision_prompt(request: &DecisionRequest) -> String {
    let mut builder = PromptBuilder::new()
        .role(IDENTITY_SYSTEM)
        .section("Paper", &request.paper_context);
    if let Some(stage) = &request.stage_context {
        builder = builder.section("Screening status", stage);
    }
    builder
        .section("Candidate profiles", &request.candidate_profiles)
        .task("Which candidate, if any, is the target author of this paper?")
        .rule(
            "Collaborator overlap is the strongest evidence; only exact name matches \
             (ignoring case and punctuation) count as overlap.",
        )
        .rule(
            "Affiliation agreement and research-field continuity carry equal, high weight. \
             A missing affiliation on the paper is not by itself evidence of a new author.",
        )
        .rule("Publication years and venues are weak supporting evidence only.")
        .rule(format!(
            "Return one ID from this list, or NIL if no candidate is supported: {}.",
            request.candidate_ids.join(", ")
        ))
        .rule(
            "Answer with exactly three lines: `best_id: <ID or NIL>`, \
             `confidence: <1-6>`, `reasoning: <at most 200 words>`.",
        )
        .build()
}
