//! Seam between the session controller and the radio link.
//!
//! Discovery, pairing and characteristic negotiation live outside this crate.
//! The controller only needs to know whether the link can take commands and
//! to hand it frames in order.

use crate::command::Command;

/// Ordered, fire-and-forget command sink.
pub trait Transport {
    /// Returns `true` while a device link exists.
    fn is_connected(&self) -> bool;

    /// Returns `true` once the link can accept commands.
    fn is_ready(&self) -> bool;

    /// Queues a command for delivery after everything sent before it.
    fn send(&mut self, command: Command);
}

/// Inbound link notifications.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkEvent<'a> {
    Disconnected,
    /// The link finished negotiation and accepts commands.
    Ready,
    Notification(&'a [u8]),
}

/// Transport for hosts without a device; never connected.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopTransport;

impl NoopTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transport for NoopTransport {
    fn is_connected(&self) -> bool {
        false
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn send(&mut self, _: Command) {}
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn send(&mut self, command: Command) {
        (**self).send(command);
    }
}
