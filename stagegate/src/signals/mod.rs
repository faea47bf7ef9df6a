//! Signal extraction from free-form stage output.
//!
//! Stage outputs are unstructured text. Gates only ever look at the
//! structured [`Signal`] a pure parser reads out of that text:
//! - rejection markers, matched case-insensitively with category priority
//!   validity > policy > generic
//! - scores, matched against an ordered list of patterns, most specific first

mod extractor;
mod types;

pub use extractor::{extract_rejection, extract_score, extract_signal, SignalExtractor};
pub use types::{RejectionCategory, ScoreReading, Signal};
