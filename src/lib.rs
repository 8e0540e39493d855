//! Ragbot Chat
//!
//! A chat client for a retrieval-augmented question-answering service.
//! Questions go to `GET /chat/ragbot/?q=...`; replies (or errors) are
//! appended to a conversation log.
//!
//! # Architecture
//!
//! - **Widget**: headless controller owning the conversation and the
//!   one-request-at-a-time discipline
//! - **Client**: reqwest-backed answer service behind a trait
//! - **Server**: Axum + HTMX page hosting one widget per browser session
//! - **Terminal**: line-oriented front-end over the same widget
//!
//! # Modules
//!
//! - [`widget`]: conversation state and the submit cycle
//! - [`client`]: answer service trait and HTTP implementation
//! - [`render`]: HTML and plain-text rendering
//! - [`session`]: per-browser widget store

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::unused_async)]

pub mod client;
pub mod config;
pub mod error;
pub mod render;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod terminal;
pub mod widget;

pub use client::{AnswerService, RagbotClient, Reply};
pub use error::ClientError;
pub use widget::{ChatWidget, ConversationState, Message, MessageMeta, Role, SubmitOutcome};
