//! LLM integration module.
//!
//! Provides an OpenAI-compatible client for chat and vision calls and
//! the prompts used for judging and answering.

mod client;
mod prompts;

pub use client::{ContentPart, LlmClient, LlmResponse, Message, MessageContent, Role};
pub use prompts::Prompts;
