//! # Prompt Template Modules
//!
//! The text contract between the engine and the fine-tuned model.

pub mod core;
pub mod tasks;
