//! Generative service client and prompt construction

mod client;
pub mod prompts;

pub use client::{
    collect_stream, ChatMessage, GenerateOptions, GenerativeClient, HttpGenerativeClient,
    LlmError, TextStream,
};
