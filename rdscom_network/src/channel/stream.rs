use std::io::{self, Read, Write};

/// Size of the scratch buffer used for each read.
const RECV_CHUNK_LEN: usize = 256;

/// Adapts a non-blocking byte stream into a [`Channel`](super::Channel).
///
/// This is meant for serial ports, pipes, or sockets, set to non-blocking mode (or with a
/// short read timeout). [`receive`](super::Channel::receive) reads until the stream
/// reports that no more data is available, treating `WouldBlock` and `TimedOut` as
/// "nothing more for now".
#[derive(Debug)]
pub struct StreamChannel<T> {
    stream: T,
}

impl<T> StreamChannel<T> {
    #[inline(always)]
    pub const fn new(stream: T) -> Self {
        Self { stream }
    }

    #[inline(always)]
    pub const fn get_ref(&self) -> &T {
        &self.stream
    }

    #[inline(always)]
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    #[inline(always)]
    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: Read + Write> super::Channel for StreamChannel<T> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn receive(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0; RECV_CHUNK_LEN];

        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // don't return on timeout errors...
                Err(e) if crate::io_err_is_timeout(e.kind()) => break,
                Err(e) => return Err(e),
            }
        }

        Ok(out)
    }
}
