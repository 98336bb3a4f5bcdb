//! Helpers for moving bytes through `rtrb` ring buffers.

pub use rtrb;

/// Acquires a write chunk covering all available producer slots.
#[inline(always)]
pub fn producer_get_all<T>(tx: &mut rtrb::Producer<T>) -> rtrb::chunks::WriteChunkUninit<'_, T> {
    // requesting exactly `slots()` slots can't fail
    tx.write_chunk_uninit(tx.slots()).unwrap()
}

/// Acquires a read chunk covering all available consumer slots.
#[inline(always)]
pub fn consumer_get_all<T>(rx: &mut rtrb::Consumer<T>) -> rtrb::chunks::ReadChunk<'_, T> {
    // requesting exactly `slots()` slots can't fail
    rx.read_chunk(rx.slots()).unwrap()
}

/// Pushes as many bytes from `bytes` as there is room for.
///
/// Returns the number of bytes pushed. Bytes are pushed in order, so if the return value
/// is `n`, `bytes[n..]` were not pushed.
#[inline]
pub fn push_bytes(tx: &mut rtrb::Producer<u8>, bytes: &[u8]) -> usize {
    producer_get_all(tx).fill_from_iter(bytes.iter().copied())
}

/// Pops every byte currently available, appending them to `out`.
///
/// Returns the number of bytes popped.
#[inline]
pub fn drain_bytes(rx: &mut rtrb::Consumer<u8>, out: &mut Vec<u8>) -> usize {
    let chunk = consumer_get_all(rx);
    let (start, end) = chunk.as_slices();

    out.reserve(chunk.len());
    out.extend_from_slice(start);
    out.extend_from_slice(end);

    let n = chunk.len();
    chunk.commit_all();
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_drain() {
        let (mut tx, mut rx) = rtrb::RingBuffer::new(8);

        assert_eq!(push_bytes(&mut tx, b"hello"), 5);

        let mut out = Vec::new();
        assert_eq!(drain_bytes(&mut rx, &mut out), 5);
        assert_eq!(out, b"hello");

        assert_eq!(drain_bytes(&mut rx, &mut out), 0);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn push_stops_when_full() {
        let (mut tx, mut rx) = rtrb::RingBuffer::new(4);

        assert_eq!(push_bytes(&mut tx, b"abcdef"), 4);
        assert_eq!(push_bytes(&mut tx, b"gh"), 0);

        let mut out = Vec::new();
        drain_bytes(&mut rx, &mut out);
        assert_eq!(out, b"abcd");
    }

    #[test]
    fn drain_across_wraparound() {
        let (mut tx, mut rx) = rtrb::RingBuffer::new(4);
        let mut out = Vec::new();

        push_bytes(&mut tx, b"abc");
        drain_bytes(&mut rx, &mut out);
        out.clear();

        // wraps around the end of the storage
        push_bytes(&mut tx, b"defg");
        drain_bytes(&mut rx, &mut out);
        assert_eq!(out, b"defg");
    }
}
