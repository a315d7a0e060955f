//! Prompt rendering and output parsing for call classification.

mod analysis;
mod prompt;

pub use analysis::{
    AnalysisError, CallAnalysis, NEXT_FOLLOW_UP_FORMAT, normalize_interest, parse_analysis,
    strip_code_fence,
};
pub use prompt::{DEFAULT_PROMPT_TEMPLATE, PromptContext, PromptError, PromptTemplate};
