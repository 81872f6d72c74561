//! Passage and citation data types.
//!
//! A [`Passage`] is a scored excerpt returned by the Index Store,
//! annotated by the relevance grader. A [`Citation`] is derived from a
//! relevant passage actually referenced by the synthesizer and is the
//! only retrieval artifact that survives the answering cycle.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Maximum grapheme length of a citation excerpt.
const MAX_EXCERPT_GRAPHEMES: usize = 280;

/// Stable identity of a passage: source document plus location within it.
///
/// Two retrievals of the same chunk (e.g. from successive queries) carry
/// the same key, which backs grade caching and retrieval exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassageKey {
    /// Stable identifier of the ingested source document.
    pub document_id: String,
    /// Location within the document (page or section label, e.g. `"p.4"`).
    pub location: String,
}

/// A scored passage returned by the Index Store.
///
/// Immutable apart from the grader's annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Stable identifier of the ingested source document.
    pub document_id: String,
    /// Location within the document (page or section label).
    pub location: String,
    /// The passage text.
    pub text: String,
    /// Relevance score as reported by the Index Store (descending order).
    pub score: f64,
    /// Grader annotation: `Some(true)` relevant, `Some(false)` irrelevant,
    /// `None` not yet graded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graded_relevant: Option<bool>,
}

impl Passage {
    /// Returns the passage's stable identity.
    #[must_use]
    pub fn key(&self) -> PassageKey {
        PassageKey {
            document_id: self.document_id.clone(),
            location: self.location.clone(),
        }
    }

    /// Returns a short excerpt of the passage text, truncated on a
    /// grapheme boundary so multi-byte content is never split.
    #[must_use]
    pub fn excerpt(&self) -> String {
        let mut out: String = self
            .text
            .graphemes(true)
            .take(MAX_EXCERPT_GRAPHEMES)
            .collect();
        if out.len() < self.text.len() {
            out.push('…');
        }
        out
    }
}

/// A citation attached to a final answer.
///
/// Must reference a passage present in the cycle's accumulated relevant
/// set; the synthesizer derives citations from marker positions in the
/// answer text, so this holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Stable identifier of the cited source document.
    pub document_id: String,
    /// Location within the document.
    pub location: String,
    /// Short excerpt of the cited passage.
    pub excerpt: String,
}

impl Citation {
    /// Builds a citation from a relevant passage.
    #[must_use]
    pub fn from_passage(passage: &Passage) -> Self {
        Self {
            document_id: passage.document_id.clone(),
            location: passage.location.clone(),
            excerpt: passage.excerpt(),
        }
    }

    /// Returns the (document, location) pair used for de-duplication.
    #[must_use]
    pub fn key(&self) -> PassageKey {
        PassageKey {
            document_id: self.document_id.clone(),
            location: self.location.clone(),
        }
    }
}

/// Scope restrictions for an Index Store search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchScope {
    /// Restrict search to these ingested documents. Empty means all.
    pub document_ids: Vec<String>,
    /// Passages already graded this cycle; the Index Store should not
    /// return them again.
    pub exclude: Vec<PassageKey>,
}

impl SearchScope {
    /// Creates a scope limited to the given documents.
    #[must_use]
    pub const fn for_documents(document_ids: Vec<String>) -> Self {
        Self {
            document_ids,
            exclude: Vec::new(),
        }
    }

    /// Returns a copy of this scope with the given keys excluded.
    #[must_use]
    pub fn excluding(&self, seen: &HashSet<PassageKey>) -> Self {
        Self {
            document_ids: self.document_ids.clone(),
            exclude: seen.iter().cloned().collect(),
        }
    }
}
