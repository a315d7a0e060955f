//! Classifier adapters.

pub mod memory;
pub mod openai_compatible;

pub use memory::ScriptedClassifier;
pub use openai_compatible::OpenAiCompatibleClassifier;
