pub mod composer;
pub mod prompts;

pub use composer::{LetterComposer, LlmLetterComposer};
