//! Posting intake: turning scraped records into canonical postings and
//! deciding which ones are worth scoring.

pub mod normalizer;
pub mod quality;

pub use normalizer::normalize;
pub use quality::{passes_quality, QualityConfig};
