//! Typed publish/subscribe and request/response over an append-only,
//! subject-addressed message log.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Payload encoding by destination type.
pub mod codec;

/// Per-call configuration and controller options.
pub mod config;

/// The façade tying streams, dispatch and request/response together.
pub mod controller;

/// Mode and integrity resolution.
pub mod delivery;

/// Handler registration and delivery dispatch.
pub mod dispatch;

/// Request/response emulated over plain pub/sub.
pub mod request;

/// Stream creation, extension and teardown.
pub mod stream_manager;

/// Live subscriptions and their error channels.
pub mod subscription;

/// The log transport abstraction.
pub mod transport;

mod error;

pub use codec::{CodecError, Decode, Encode, Json};
pub use config::{ControllerOptions, PubSubConfig};
pub use controller::Controller;
pub use delivery::{Integrity, Mode};
pub use dispatch::{Handler, HandlerArgs, Slot, Target};
pub use error::Error;
pub use subscription::Subscription;
pub use transport::{LogTransport, TransportError};
