mod error;
mod report;
mod slot;

pub use error::{DispatchError, InvalidHandler};
pub use report::{ErrorReceiver, ErrorReporter, error_channel};
pub use slot::Slot;

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::codec::Decode;
use crate::transport::{Delivery, DeliveryHandler};

type ValueFn<T> = Arc<dyn Fn(T) + Send + Sync>;
type SubjectValueFn<T> = Arc<dyn Fn(String, T) + Send + Sync>;
type SubjectReplyValueFn<T> = Arc<dyn Fn(String, Option<String>, T) + Send + Sync>;

/// The argument shapes a handler may have.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HandlerShape {
    /// `(value)`
    ValueOnly,

    /// `(subject, value)`
    SubjectAndValue,

    /// `(subject, reply, value)`
    SubjectReplyAndValue,
}

impl HandlerShape {
    /// Number of arguments the shape takes.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::ValueOnly => 1,
            Self::SubjectAndValue => 2,
            Self::SubjectReplyAndValue => 3,
        }
    }
}

impl TryFrom<usize> for HandlerShape {
    type Error = InvalidHandler;

    fn try_from(arity: usize) -> Result<Self, Self::Error> {
        match arity {
            1 => Ok(Self::ValueOnly),
            2 => Ok(Self::SubjectAndValue),
            3 => Ok(Self::SubjectReplyAndValue),
            other => Err(InvalidHandler::Arity(other)),
        }
    }
}

/// Arguments handed to a handler registered by arity.
///
/// Fields beyond the declared arity are `None`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HandlerArgs<T> {
    /// Subject the message arrived on.
    pub subject: Option<String>,

    /// Reply subject of the message.
    pub reply: Option<String>,

    /// Decoded payload.
    pub value: T,
}

/// A callback that receives decoded messages.
pub enum Handler<T> {
    /// Receives only the value.
    ValueOnly(ValueFn<T>),

    /// Receives the subject and the value.
    SubjectAndValue(SubjectValueFn<T>),

    /// Receives the subject, the reply subject and the value.
    SubjectReplyAndValue(SubjectReplyValueFn<T>),
}

impl<T> Handler<T>
where
    T: 'static,
{
    /// A handler taking only the value.
    pub fn value<F>(f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::ValueOnly(Arc::new(f))
    }

    /// A handler taking the subject and the value.
    pub fn subject_and_value<F>(f: F) -> Self
    where
        F: Fn(String, T) + Send + Sync + 'static,
    {
        Self::SubjectAndValue(Arc::new(f))
    }

    /// A handler taking the subject, the reply subject and the value.
    pub fn subject_reply_and_value<F>(f: F) -> Self
    where
        F: Fn(String, Option<String>, T) + Send + Sync + 'static,
    {
        Self::SubjectReplyAndValue(Arc::new(f))
    }

    /// A handler whose shape is only known at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHandler::Arity`] unless `arity` is 1, 2 or 3.
    pub fn with_arity<F>(arity: usize, f: F) -> Result<Self, InvalidHandler>
    where
        F: Fn(HandlerArgs<T>) + Send + Sync + 'static,
    {
        Ok(match HandlerShape::try_from(arity)? {
            HandlerShape::ValueOnly => Self::value(move |value| {
                f(HandlerArgs {
                    subject: None,
                    reply: None,
                    value,
                });
            }),
            HandlerShape::SubjectAndValue => Self::subject_and_value(move |subject, value| {
                f(HandlerArgs {
                    subject: Some(subject),
                    reply: None,
                    value,
                });
            }),
            HandlerShape::SubjectReplyAndValue => {
                Self::subject_reply_and_value(move |subject, reply, value| {
                    f(HandlerArgs {
                        subject: Some(subject),
                        reply,
                        value,
                    });
                })
            }
        })
    }
}

impl<T> Handler<T> {
    /// The handler's argument shape.
    #[must_use]
    pub const fn shape(&self) -> HandlerShape {
        match self {
            Self::ValueOnly(_) => HandlerShape::ValueOnly,
            Self::SubjectAndValue(_) => HandlerShape::SubjectAndValue,
            Self::SubjectReplyAndValue(_) => HandlerShape::SubjectReplyAndValue,
        }
    }

    fn call(&self, subject: String, reply: Option<String>, value: T) {
        match self {
            Self::ValueOnly(f) => f(value),
            Self::SubjectAndValue(f) => f(subject, value),
            Self::SubjectReplyAndValue(f) => f(subject, reply, value),
        }
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        match self {
            Self::ValueOnly(f) => Self::ValueOnly(Arc::clone(f)),
            Self::SubjectAndValue(f) => Self::SubjectAndValue(Arc::clone(f)),
            Self::SubjectReplyAndValue(f) => Self::SubjectReplyAndValue(Arc::clone(f)),
        }
    }
}

impl<T> Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.shape()).finish()
    }
}

/// Where decoded messages of a subscription go.
#[derive(Debug)]
pub enum Target<T> {
    /// Overwrite a destination slot with each decoded value.
    Slot(Slot<T>),

    /// Call a handler; exactly one must be given.
    Handlers(Vec<Handler<T>>),
}

impl<T> From<Slot<T>> for Target<T> {
    fn from(slot: Slot<T>) -> Self {
        Self::Slot(slot)
    }
}

impl<T> From<Handler<T>> for Target<T> {
    fn from(handler: Handler<T>) -> Self {
        Self::Handlers(vec![handler])
    }
}

impl<T> From<Vec<Handler<T>>> for Target<T> {
    fn from(handlers: Vec<Handler<T>>) -> Self {
        Self::Handlers(handlers)
    }
}

enum Sink<T> {
    Slot(Slot<T>),
    Handler(Handler<T>),
}

/// Decodes deliveries and hands them to a [`Target`].
///
/// Decode failures go to the subscription's error channel.
pub struct Dispatcher<T> {
    sink: Sink<T>,
    errors: ErrorReporter,
}

impl<T> Dispatcher<T>
where
    T: Decode + Send + Sync + 'static,
{
    /// Builds a dispatcher, validating the target.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHandler::Count`] unless the target holds a slot or
    /// exactly one handler.
    pub fn new(
        target: Target<T>,
        errors: ErrorReporter,
    ) -> Result<Self, InvalidHandler> {
        let sink = match target {
            Target::Slot(slot) => Sink::Slot(slot),
            Target::Handlers(mut handlers) => {
                let count = handlers.len();
                match handlers.pop() {
                    Some(handler) if count == 1 => Sink::Handler(handler),
                    _ => return Err(InvalidHandler::Count(count)),
                }
            }
        };

        Ok(Self { sink, errors })
    }
}

impl<T> Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sink = match &self.sink {
            Sink::Slot(_) => "slot",
            Sink::Handler(handler) => match handler.shape() {
                HandlerShape::ValueOnly => "value-only handler",
                HandlerShape::SubjectAndValue => "subject-and-value handler",
                HandlerShape::SubjectReplyAndValue => "subject-reply-and-value handler",
            },
        };

        f.debug_struct("Dispatcher").field("sink", &sink).finish()
    }
}

#[async_trait]
impl<T> DeliveryHandler for Dispatcher<T>
where
    T: Decode + Send + Sync + 'static,
{
    async fn deliver(&self, delivery: Delivery) {
        let Delivery {
            subject,
            reply,
            payload,
            sequence,
        } = delivery;

        match T::decode(payload) {
            Ok(value) => match &self.sink {
                Sink::Slot(slot) => slot.set(value),
                Sink::Handler(handler) => handler.call(subject, reply, value),
            },
            Err(source) => {
                warn!(%subject, sequence, %source, "failed to decode delivered message");

                let failure = DispatchError {
                    subject,
                    sequence,
                    source: Box::new(source),
                };

                self.errors.report(failure);
            }
        }
    }
}
