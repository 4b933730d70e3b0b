//! Palm reading: capture a photo of a palm, confirm a hand is in it, ask an
//! LLM for a reading, and keep a local gallery of past readings.

pub mod config;
pub mod error;
pub mod gallery;
pub mod image;
pub mod llm;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod workflow;
