//! Byte transports.
//!
//! The communication interface only needs to hand whole frames to a transport, and to
//! collect whatever bytes have arrived. [`Channel`] captures exactly that. Concrete
//! transports (serial lines, sockets, in-memory queues) implement it.

mod linked;
mod memory;
mod stream;

pub use linked::{LinkedChannel, linked_pair};
pub use memory::{LoopbackChannel, MemoryChannel};
pub use stream::StreamChannel;

/// A duplex byte transport.
///
/// Each [`send`](Channel::send) call carries exactly one serialized message. The
/// transport isn't required to preserve boundaries between messages: a
/// [`receive`](Channel::receive) call returns everything available, and the interface
/// decodes it as one frame.
pub trait Channel {
    /// Writes the bytes of one frame.
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Returns the bytes that arrived since the last call, or an empty vector if there
    /// are none.
    ///
    /// Must not block.
    fn receive(&mut self) -> std::io::Result<Vec<u8>>;
}

impl<C: Channel + ?Sized> Channel for &mut C {
    #[inline(always)]
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        (**self).send(bytes)
    }

    #[inline(always)]
    fn receive(&mut self) -> std::io::Result<Vec<u8>> {
        (**self).receive()
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    #[inline(always)]
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        (**self).send(bytes)
    }

    #[inline(always)]
    fn receive(&mut self) -> std::io::Result<Vec<u8>> {
        (**self).receive()
    }
}
