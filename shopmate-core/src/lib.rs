//! Client-side state for the Shopmate chat widget
//!
//! This crate provides:
//! - **Conversation**: the turn list and its `Idle → Sending → Streaming`
//!   phase machine
//! - **StreamDecoder / StreamSession**: stateful UTF-8 decoding of one
//!   in-flight token stream
//! - **ChatEngine**: the background task that calls the relay and feeds
//!   decoded tokens back over an event channel
//! - **WidgetGeometry / DragState**: floating-window placement and
//!   pointer-delta dragging, independent of conversation state
//! - **markdown**: line classification for rendering accumulated reply text

pub mod conversation;
pub mod decode;
pub mod engine;
pub mod geometry;
pub mod markdown;
pub mod session;

pub use conversation::{Conversation, ConversationTurn, Phase, Role, TRANSPORT_ERROR_MESSAGE};
pub use decode::StreamDecoder;
pub use engine::{ChatEngine, EngineEvent};
pub use geometry::{DragState, Point, Size, WidgetGeometry};
pub use session::StreamSession;
