//! Prompt templates and chat messages.
//!
//! Templates are plain strings with `{placeholder}` slots. A [`ChatPrompt`]
//! is an ordered list of message templates with an optional slot for prior
//! conversation turns. [`library`] holds the prompts the bundled pipelines use.

mod chat;
pub mod library;
mod template;

pub use chat::{transcript, ChatPrompt, Message, Role};
pub use library::ReportType;
pub use template::PromptTemplate;
