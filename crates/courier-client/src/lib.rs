//! Client-side reconciliation of live-pushed messages with fetched history.
//!
//! The server surfaces two feeds for a conversation: the authoritative
//! history (on demand, partitioned into sent/received) and best-effort live
//! pushes over the gateway. The same message can show up on both, in either
//! order. [`ChatView`] merges them into one deduplicated, chronologically
//! ordered sequence, and buffers pushes for conversations that are not open
//! so they are not lost.

mod reconcile;

pub use reconcile::{ChatView, ViewState};
