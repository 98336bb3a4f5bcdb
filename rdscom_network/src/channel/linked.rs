use rdscom_utils::queue::{self, rtrb};

/// One end of an in-memory, duplex byte link.
///
/// Created in pairs with [`linked_pair`]: what one end sends, the other receives. Each
/// direction is a bounded, lock-free, single-producer single-consumer ring buffer, so the
/// two ends may live on different threads.
#[derive(Debug)]
pub struct LinkedChannel {
    tx: rtrb::Producer<u8>,
    rx: rtrb::Consumer<u8>,
}

/// Creates two connected channel ends, each direction buffering up to `capacity` bytes.
pub fn linked_pair(capacity: usize) -> (LinkedChannel, LinkedChannel) {
    let (a_tx, b_rx) = rtrb::RingBuffer::new(capacity);
    let (b_tx, a_rx) = rtrb::RingBuffer::new(capacity);

    (
        LinkedChannel { tx: a_tx, rx: a_rx },
        LinkedChannel { tx: b_tx, rx: b_rx },
    )
}

impl super::Channel for LinkedChannel {
    /// Fails without writing anything if the peer's buffer can't hold the whole frame,
    /// or if the peer was dropped.
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if self.tx.is_abandoned() {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        }

        if self.tx.slots() < bytes.len() {
            return Err(std::io::Error::other(format!(
                "linked channel full: {} bytes free, frame is {} bytes",
                self.tx.slots(),
                bytes.len()
            )));
        }

        let n = queue::push_bytes(&mut self.tx, bytes);
        debug_assert_eq!(n, bytes.len());

        Ok(())
    }

    fn receive(&mut self) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        queue::drain_bytes(&mut self.rx, &mut out);
        Ok(out)
    }
}
