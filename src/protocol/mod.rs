//! Wire format of the protocol.
//!
//! One request line goes in, one status line plus an optional body comes
//! out, then the connection closes.
//!
//! ```text
//! request   <absolute-URI>\r\n                  (at most 1026 bytes)
//! response  <2-digit code><SP><meta>\r\n        (meta at most 1024 bytes)
//!           <body bytes until close>            (Success only)
//! ```
//!
//! # Submodules
//!
//! - **`status`**: status codes and their classes
//! - **`header`**: response header codec, used by the client
//! - **`request`**: request line codec, used by the server
//! - **`writer`**: the server's response writer state machine
//! - **`buffer`**: pooled write buffers backing the response writer
//!
//! # Response Writer State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │    Fresh    │ ← Nothing written yet
//!        └──────┬──────┘
//!               │ write_status / first write / close
//!               ▼
//!        ┌──────────────────┐
//!        │  StatusWritten   │ ← Body bytes are buffered
//!        └──────┬───────────┘
//!               │ close, or a non-success status
//!               ▼
//!        ┌──────────────────┐
//!        │     Closed       │ ← Flushed, stream shut down
//!        └──────────────────┘
//! ```

pub mod buffer;
pub mod header;
pub mod request;
pub mod status;
pub mod writer;
