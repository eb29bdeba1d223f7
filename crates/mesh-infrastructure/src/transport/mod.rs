//! Service transports
//!
//! | Transport | Use |
//! |-----------|-----|
//! | [`HttpTransport`] | Pooled HTTP/HTTPS calls through `reqwest` |
//! | [`ScriptedTransport`] | In-memory backend with scripted replies, for tests and dry runs |

pub mod http;
pub mod scripted;

pub use http::HttpTransport;
pub use scripted::{RecordedCall, ScriptedReply, ScriptedTransport};
