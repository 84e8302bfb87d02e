//! Error types for structure parsing

use thiserror::Error;

/// Errors raised while reconstructing the act/chapter hierarchy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    /// A chapter heading (`###`) appeared before any act heading (`##`)
    #[error("Chapter heading '{chapter}' on line {line} appears before any act heading")]
    ChapterWithoutAct {
        /// The chapter heading text
        chapter: String,
        /// 1-based line number of the heading
        line: usize,
    },
}
