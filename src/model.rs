//! Core domain types shared across ingestion, retrieval, and generation.
//!
//! These are pure data structures with no I/O dependencies; every module
//! in the crate builds, consumes, or serializes them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Document type inferred from a source file's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// A user/owner's manual.
    Manual,
    /// A technical specifications sheet.
    Specifications,
    /// A third-party or editorial review.
    Review,
    /// Anything that doesn't match a known filename pattern.
    Other,
}

impl DocType {
    /// Infers the doc type from a filename using a case-insensitive substring rule.
    ///
    /// Order matters: a filename containing both "manual" and "review" resolves
    /// to whichever substring is checked first (manual, then specifications,
    /// then review), matching the priority a human author would expect from an
    /// ingestion folder named e.g. `user_manual_review_notes.pdf`.
    #[must_use]
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_lowercase();
        if lower.contains("manual") {
            Self::Manual
        } else if lower.contains("spec") {
            Self::Specifications
        } else if lower.contains("review") {
            Self::Review
        } else {
            Self::Other
        }
    }

    /// Returns the lowercase string form used in `chunk_id`s and API payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Specifications => "specifications",
            Self::Review => "review",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer language. Only the two languages the query analyzer's keyword
/// lists and the prompt composer's templates are defined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    En,
    /// German.
    De,
}

impl Default for Language {
    fn default() -> Self {
        Self::En
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::En => "en",
            Self::De => "de",
        })
    }
}

/// One physical page extracted from a source PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Stable product identifier, derived from the enclosing folder.
    pub product_name: String,
    /// Document type inferred from the filename.
    pub doc_type: DocType,
    /// 1-indexed page number.
    pub page_num: u32,
    /// Relative path to the source file within the product folder.
    pub source_file: String,
    /// Optional canonical URL for the source document.
    pub source_url: Option<String>,
    /// Optional human-readable source document name.
    pub source_name: Option<String>,
    /// NFC-normalized page text, prior to tokenization.
    pub text: String,
}

/// A token-bounded slice of a [`Page`], the unit of retrieval.
///
/// All `Page` metadata is denormalized onto the chunk so retrieval and
/// generation never need a join back to the page it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{product_name}_{doc_type}_p{page_num}_c{chunk_index}"`, globally unique.
    pub chunk_id: String,
    /// Denormalized from the source page.
    pub product_name: String,
    /// Denormalized from the source page.
    pub doc_type: DocType,
    /// Denormalized from the source page.
    pub page_num: u32,
    /// Denormalized from the source page.
    pub source_file: String,
    /// Denormalized from the source page.
    pub source_url: Option<String>,
    /// Denormalized from the source page.
    pub source_name: Option<String>,
    /// 0-indexed position within this page's chunk sequence.
    pub chunk_index: u32,
    /// Chunk text; a substring of the page text, overlap permitted with neighbors.
    pub text: String,
}

impl Chunk {
    /// Builds the deterministic chunk id from a page and a chunk index.
    #[must_use]
    pub fn make_id(page: &Page, chunk_index: u32) -> String {
        format!(
            "{}_{}_p{}_c{}",
            page.product_name,
            page.doc_type.as_str(),
            page.page_num,
            chunk_index
        )
    }
}

/// Result of analyzing a raw question against the known product catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryAnalysis {
    /// Known products mentioned in the question (by canonical name).
    pub target_products: BTreeSet<String>,
    /// Whether the question asks to compare products.
    pub is_comparison: bool,
    /// Whether the question is complex (how-to/why, or long).
    pub is_complex: bool,
    /// Retrieval cap selected from complexity.
    pub top_k: usize,
    /// Whether product-diversity enforcement runs during retrieval.
    pub diversity_enabled: bool,
}

/// A retrieved chunk carrying its fused rank score.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Reciprocal Rank Fusion score; higher is better.
    pub fused_score: f64,
}

/// Post-generation projection of a [`Chunk`] referenced by citation number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// The `[n]` referenced in the generated answer; 1-indexed into the context block.
    pub citation_number: usize,
    /// Product the cited chunk belongs to.
    pub product_name: String,
    /// Document type of the cited chunk.
    pub doc_type: DocType,
    /// Page number of the cited chunk.
    pub page_num: u32,
    /// Source file of the cited chunk.
    pub source_file: String,
    /// Optional canonical URL.
    pub source_url: Option<String>,
    /// Optional human-readable source name.
    pub source_name: Option<String>,
}

/// Speaker role of a conversation [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human asking questions.
    User,
    /// The generated answer.
    Assistant,
}

/// One turn's worth of content in a [`Conversation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who said this.
    pub role: Role,
    /// The message text (question or generated answer).
    pub content: String,
    /// When this message was recorded.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Sources cited by an assistant message; absent on user messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    /// Model id used to generate an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Token usage for an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    /// Estimated cost in USD for an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Input/output token counts for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens consumed.
    pub input: u32,
    /// Completion tokens produced.
    pub output: u32,
}

/// An append-only, multi-turn conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Globally unique conversation id.
    pub conversation_id: uuid::Uuid,
    /// Opaque owner identifier, or the sentinel `"anonymous"`.
    pub owner_id: String,
    /// Optional owner email, carried for display purposes only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    /// Answer language for this conversation.
    pub language: Language,
    /// Model id used for generation in this conversation.
    pub model_id: String,
    /// When the conversation was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the conversation was last appended to.
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Messages in insertion order, alternating roles starting with user.
    pub messages: Vec<Message>,
}

/// The sentinel owner id for conversations with no attached identity.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// The verified identity a request carries, as handed in by the external
/// identity provider named out of scope in the purpose statement. The core
/// never validates credentials; it only consumes these already-verified
/// fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    /// Opaque subject identifier, or [`ANONYMOUS_OWNER`] if none was supplied.
    pub subject: String,
    /// Whether this requester may access any conversation regardless of owner.
    pub is_admin: bool,
}

impl RequestIdentity {
    /// The anonymous, non-admin identity used when no identity headers are present.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            subject: ANONYMOUS_OWNER.to_string(),
            is_admin: false,
        }
    }

    /// True iff this identity may access a conversation owned by `owner_id`.
    #[must_use]
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.is_admin || owner_id == ANONYMOUS_OWNER || self.subject == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_type_from_filename() {
        assert_eq!(DocType::from_filename("User_Manual.pdf"), DocType::Manual);
        assert_eq!(
            DocType::from_filename("SPECIFICATIONS.pdf"),
            DocType::Specifications
        );
        assert_eq!(DocType::from_filename("cnet-review.pdf"), DocType::Review);
        assert_eq!(DocType::from_filename("notes.pdf"), DocType::Other);
    }

    #[test]
    fn chunk_id_format() {
        let page = Page {
            product_name: "Garmin Forerunner 970".to_string(),
            doc_type: DocType::Specifications,
            page_num: 167,
            source_file: "specifications_manual.pdf".to_string(),
            source_url: None,
            source_name: None,
            text: String::new(),
        };
        assert_eq!(
            Chunk::make_id(&page, 3),
            "Garmin Forerunner 970_specifications_p167_c3"
        );
    }

    #[test]
    fn identity_access_rules() {
        let owner = RequestIdentity {
            subject: "u1".to_string(),
            is_admin: false,
        };
        assert!(owner.can_access("u1"));
        assert!(!owner.can_access("u2"));
        assert!(owner.can_access(ANONYMOUS_OWNER));

        let admin = RequestIdentity {
            subject: "root".to_string(),
            is_admin: true,
        };
        assert!(admin.can_access("anybody"));

        let anon = RequestIdentity::anonymous();
        assert_eq!(anon.subject, ANONYMOUS_OWNER);
        assert!(!anon.is_admin);
    }
}
