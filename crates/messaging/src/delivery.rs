use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::transport::{ConsumerLimit, Replay};

/// Wire value for [`Mode::Broadcast`].
pub const BROADCAST: &str = "broadcast";

/// Wire value for [`Mode::PeerToPeer`].
pub const PEER_TO_PEER: &str = "peer-to-peer";

/// Wire value for [`Integrity::ExactlyOnce`].
pub const EXACTLY_ONCE: &str = "exactly-once";

/// Wire value for [`Integrity::AtLeastOnce`].
pub const AT_LEAST_ONCE: &str = "at-least-once";

/// A mode or integrity value the resolver does not know.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ResolveError {
    /// Unknown mode.
    #[error("illegal pub-sub mode: {0:?}")]
    IllegalMode(String),

    /// Unknown integrity.
    #[error("illegal pub-sub integrity: {0:?}")]
    IllegalIntegrity(String),
}

/// How many subscribers share a topic.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Mode {
    /// Every subscriber receives every message.
    #[default]
    Broadcast,

    /// At most one live subscriber.
    PeerToPeer,
}

impl Mode {
    /// Resolves the textual form; empty means the default.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::IllegalMode`] for unknown values.
    pub fn resolve(raw: &str) -> Result<Self, ResolveError> {
        raw.parse()
    }

    /// The wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Broadcast => BROADCAST,
            Self::PeerToPeer => PEER_TO_PEER,
        }
    }

    /// The consumer limit the topic's stream must carry.
    #[must_use]
    pub const fn consumer_limit(self) -> ConsumerLimit {
        match self {
            Self::Broadcast => ConsumerLimit::Unbounded,
            Self::PeerToPeer => ConsumerLimit::Single,
        }
    }
}

impl FromStr for Mode {
    type Err = ResolveError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "" | BROADCAST => Ok(Self::Broadcast),
            PEER_TO_PEER => Ok(Self::PeerToPeer),
            other => Err(ResolveError::IllegalMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stored messages a new subscriber sees.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Integrity {
    /// Latest value: the last stored message, then new ones.
    ExactlyOnce,

    /// Tail: only messages published after subscribing.
    #[default]
    AtLeastOnce,
}

impl Integrity {
    /// Resolves the textual form; empty means the default.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::IllegalIntegrity`] for unknown values.
    pub fn resolve(raw: &str) -> Result<Self, ResolveError> {
        raw.parse()
    }

    /// The wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExactlyOnce => EXACTLY_ONCE,
            Self::AtLeastOnce => AT_LEAST_ONCE,
        }
    }

    /// The replay variant a subscription should start with.
    #[must_use]
    pub const fn replay(self) -> Replay {
        match self {
            Self::ExactlyOnce => Replay::LastOnly,
            Self::AtLeastOnce => Replay::Tail,
        }
    }
}

impl FromStr for Integrity {
    type Err = ResolveError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "" | AT_LEAST_ONCE => Ok(Self::AtLeastOnce),
            EXACTLY_ONCE => Ok(Self::ExactlyOnce),
            other => Err(ResolveError::IllegalIntegrity(other.to_string())),
        }
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
