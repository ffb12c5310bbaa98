//! Text boundary helpers shared by the commit and reply paths.

pub mod align;
pub mod punctuation;
pub mod splitter;
pub mod word_count;
