use std::collections::VecDeque;

/// An in-memory channel recording what is sent, and replaying what is queued.
///
/// Inbound datagrams are queued with [`push_inbound`](Self::push_inbound) and handed out
/// one per [`receive`](super::Channel::receive) call. Outbound frames are kept, in order,
/// until [`take_sent`](Self::take_sent) is called.
///
/// Mostly useful to drive an interface from tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryChannel {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

impl MemoryChannel {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a datagram to be returned by a future `receive` call.
    #[inline]
    pub fn push_inbound(&mut self, bytes: impl Into<Vec<u8>>) {
        self.inbound.push_back(bytes.into());
    }

    /// Number of datagrams waiting to be received.
    #[inline(always)]
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Frames sent so far, oldest first.
    #[inline(always)]
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Returns and forgets the frames sent so far.
    #[inline(always)]
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.sent)
    }
}

impl super::Channel for MemoryChannel {
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn receive(&mut self) -> std::io::Result<Vec<u8>> {
        Ok(self.inbound.pop_front().unwrap_or_default())
    }
}

/// A channel that receives what it sends.
///
/// Everything sent is buffered, and the whole buffer is handed out by the next
/// `receive` call. Sending twice before receiving yields both frames at once, which the
/// interface will then reject as one malformed datagram.
#[derive(Debug, Default, Clone)]
pub struct LoopbackChannel {
    data: Vec<u8>,
}

impl LoopbackChannel {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl super::Channel for LoopbackChannel {
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn receive(&mut self) -> std::io::Result<Vec<u8>> {
        if !self.data.is_empty() {
            log::trace!("loopback: received {} bytes", self.data.len());
        }
        Ok(core::mem::take(&mut self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;

    #[test]
    fn memory_channel_keeps_datagrams_apart() {
        let mut ch = MemoryChannel::new();
        ch.push_inbound(b"one".as_slice());
        ch.push_inbound(b"two".as_slice());

        assert_eq!(ch.receive().unwrap(), b"one");
        assert_eq!(ch.receive().unwrap(), b"two");
        assert!(ch.receive().unwrap().is_empty());

        ch.send(b"out").unwrap();
        assert_eq!(ch.sent(), [b"out".to_vec()]);
        assert_eq!(ch.take_sent().len(), 1);
        assert!(ch.sent().is_empty());
    }

    #[test]
    fn loopback_returns_everything_sent() {
        let mut ch = LoopbackChannel::new();
        assert!(ch.receive().unwrap().is_empty());

        ch.send(b"ab").unwrap();
        ch.send(b"cd").unwrap();
        assert_eq!(ch.len(), 4);
        assert_eq!(ch.receive().unwrap(), b"abcd");
        assert!(ch.is_empty());
    }
}
