pub mod markup;
pub mod types;
pub mod extractor;

pub use types::*;
pub use markup::*;
pub use extractor::*;

use thiserror::Error;

/// Why a fragment could not be read as markup. Never leaves the extractor as an
/// `Err`: it is recorded as the reason on an `extraction_failed` result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    #[error("fragment contains no markup tags")]
    NoMarkup,

    #[error("unterminated tag starting at byte {0}")]
    UnterminatedTag(usize),

    #[error("unterminated attribute quote in tag starting at byte {0}")]
    UnterminatedAttribute(usize),

    #[error("unterminated comment starting at byte {0}")]
    UnterminatedComment(usize),

    #[error("marker element for '{key}' is never closed")]
    UnclosedMarker { key: String },
}
