// src/filter.rs
//! Keyword-group grammar: line-oriented source text compiled once per run,
//! then evaluated against normalized item titles.
//!
//! Grammar: bare words are base terms (OR-matched), `+word` is required (ALL
//! must appear), `!word` is excluded (NONE may appear), `word@N` additionally
//! caps how many matched items the group retains per run. Blank lines separate
//! groups; `#` / `//` lines are comments.

use serde::Serialize;
use thiserror::Error;

use crate::source::normalize_title;
use crate::source::types::TrendItem;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrammarError {
    #[error("keyword group {group} (near line {line}) has no base or required terms")]
    EmptyGroup { group: usize, line: usize },
    #[error("bad count cap in `{token}` on line {line}: cap must be a positive integer")]
    BadCap { token: String, line: usize },
}

/// Tagged clause kinds the DSL compiles into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClauseKind {
    Base,
    Required,
    Exclude,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordGroup {
    base: Vec<String>,
    required: Vec<String>,
    exclude: Vec<String>,
    /// Group-level cap on retained matches per run. When several `@N` suffixes
    /// appear inside one group, the smallest wins.
    cap: Option<usize>,
}

impl KeywordGroup {
    fn is_empty(&self) -> bool {
        self.base.is_empty() && self.required.is_empty() && self.exclude.is_empty()
    }

    fn has_positive_terms(&self) -> bool {
        !self.base.is_empty() || !self.required.is_empty()
    }

    /// Match a normalized (lowercased, whitespace-collapsed) title.
    /// Exclude terms veto first; then every required term must be present;
    /// then at least one base term, unless the group is required-only.
    pub fn matches(&self, normalized_title: &str) -> bool {
        if normalized_title.is_empty() {
            return false;
        }
        if self.exclude.iter().any(|w| normalized_title.contains(w.as_str())) {
            return false;
        }
        if !self.required.iter().all(|w| normalized_title.contains(w.as_str())) {
            return false;
        }
        if self.base.is_empty() {
            // required-only group: all required present is the match
            true
        } else {
            self.base.iter().any(|w| normalized_title.contains(w.as_str()))
        }
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledGrammar {
    groups: Vec<KeywordGroup>,
}

/// Clause counts for the startup log and the status API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GrammarStats {
    pub groups: usize,
    pub base_terms: usize,
    pub required_terms: usize,
    pub exclude_terms: usize,
    pub capped_groups: usize,
}

impl CompiledGrammar {
    /// Compile grammar source text. Fails on a group with no positive terms
    /// and on a malformed `@N` cap; both are fatal before any fetch happens.
    pub fn compile(text: &str) -> Result<Self, GrammarError> {
        let mut groups: Vec<KeywordGroup> = Vec::new();
        let mut current = KeywordGroup::default();
        let mut current_start_line = 0usize;

        let mut close_group = |current: &mut KeywordGroup,
                               groups: &mut Vec<KeywordGroup>,
                               start_line: usize|
         -> Result<(), GrammarError> {
            if current.is_empty() {
                return Ok(());
            }
            if !current.has_positive_terms() {
                return Err(GrammarError::EmptyGroup {
                    group: groups.len() + 1,
                    line: start_line,
                });
            }
            groups.push(std::mem::take(current));
            Ok(())
        };

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();

            if line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            if line.is_empty() {
                close_group(&mut current, &mut groups, current_start_line)?;
                continue;
            }

            if current.is_empty() {
                current_start_line = line_no;
            }

            let (kind, word, cap) = parse_clause(line, line_no)?;
            if word.is_empty() {
                continue;
            }
            match kind {
                ClauseKind::Base => current.base.push(word),
                ClauseKind::Required => current.required.push(word),
                ClauseKind::Exclude => current.exclude.push(word),
            }
            if let Some(n) = cap {
                current.cap = Some(current.cap.map_or(n, |prev| prev.min(n)));
            }
        }
        close_group(&mut current, &mut groups, current_start_line)?;

        Ok(Self { groups })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[KeywordGroup] {
        &self.groups
    }

    pub fn stats(&self) -> GrammarStats {
        GrammarStats {
            groups: self.groups.len(),
            base_terms: self.groups.iter().map(|g| g.base.len()).sum(),
            required_terms: self.groups.iter().map(|g| g.required.len()).sum(),
            exclude_terms: self.groups.iter().map(|g| g.exclude.len()).sum(),
            capped_groups: self.groups.iter().filter(|g| g.cap.is_some()).count(),
        }
    }

    /// Indices of all groups the title matches, in declaration order.
    /// Deterministic and independent of item scan order.
    pub fn match_groups(&self, normalized_title: &str) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.matches(normalized_title))
            .map(|(i, _)| i)
            .collect()
    }
}

/// One clause line: optional `+`/`!` prefix, optional `@N` cap suffix.
/// A suffix after `@` that is not all digits is part of the literal word.
fn parse_clause(line: &str, line_no: usize) -> Result<(ClauseKind, String, Option<usize>), GrammarError> {
    let (kind, rest) = if let Some(r) = line.strip_prefix('+') {
        (ClauseKind::Required, r)
    } else if let Some(r) = line.strip_prefix('!') {
        (ClauseKind::Exclude, r)
    } else {
        (ClauseKind::Base, line)
    };

    let mut word = rest.trim();
    let mut cap = None;
    if let Some(at) = word.rfind('@') {
        let suffix = &word[at + 1..];
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            let n: usize = suffix.parse().map_err(|_| GrammarError::BadCap {
                token: line.to_string(),
                line: line_no,
            })?;
            if n == 0 {
                return Err(GrammarError::BadCap {
                    token: line.to_string(),
                    line: line_no,
                });
            }
            cap = Some(n);
            word = word[..at].trim_end();
        } else if suffix.is_empty() {
            return Err(GrammarError::BadCap {
                token: line.to_string(),
                line: line_no,
            });
        }
    }

    Ok((kind, word.to_lowercase(), cap))
}

/// An item retained by the grammar, attributed to exactly one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched {
    pub item: TrendItem,
    pub group: usize,
}

/// Evaluate the whole batch. Each item surfaces at most once, attributed to
/// the earliest-declared group that retains it: a capped group keeps its top-N
/// candidates by rank ascending (unranked after ranked, ties in fetch order);
/// items it drops stay eligible for later-declared groups.
pub fn filter_items(grammar: &CompiledGrammar, items: &[TrendItem]) -> Vec<Matched> {
    if grammar.is_empty() {
        // no keywords configured: everything passes through
        return items
            .iter()
            .filter(|it| !normalize_title(&it.title).is_empty())
            .map(|it| Matched {
                item: it.clone(),
                group: 0,
            })
            .collect();
    }

    let normalized: Vec<String> = items.iter().map(|it| normalize_title(&it.title)).collect();
    let mut surfaced = vec![false; items.len()];
    let mut out = Vec::new();

    for (g_idx, group) in grammar.groups.iter().enumerate() {
        let mut candidates: Vec<usize> = (0..items.len())
            .filter(|&i| !surfaced[i] && group.matches(&normalized[i]))
            .collect();

        if let Some(cap) = group.cap {
            // stable sort keeps fetch order for equal ranks
            candidates.sort_by_key(|&i| match items[i].rank {
                Some(r) => (0u8, r),
                None => (1u8, 0),
            });
            candidates.truncate(cap);
        }

        for i in candidates {
            surfaced[i] = true;
            out.push(Matched {
                item: items[i].clone(),
                group: g_idx,
            });
        }
    }
    out
}
