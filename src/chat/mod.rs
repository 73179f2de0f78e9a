//! Live-chat inbox of the admin dashboard.

mod admin;
mod error;
pub mod inbox;
pub mod timeline;

pub use admin::{AdminChat, ChatState};
pub use error::{ChatError, ChatResult, Fault, FaultKind};
