//! QuicNet Haptics
//!
//! Length-prefixed haptic frame protocol on top of a QuicNet stream. A
//! [`HapticStream`] subscribes with an authorization token when its stream
//! starts, and a background consumer turns the inbound byte stream into
//! [`HapticFrame`]s for the application to read.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod queue;
pub mod schema;
pub mod stream;

mod sync;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use codec::{decode, decode_all, decode_frame, encode, FrameSource};
pub use config::HapticStreamConfig;
pub use consumer::FrameConsumer;
pub use error::{HapticError, Result};
pub use frame::{FrameType, HapticFrame, HEADER_LENGTH, MAX_DATA_LENGTH, MAX_FRAME_LENGTH};
pub use queue::FrameQueue;
pub use schema::{Auth, Signal};
pub use stream::HapticStream;
