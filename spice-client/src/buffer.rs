//! A dynamically sized, double-ended byte queue backed by a virtual-memory ring
//! (`slice_deque::SliceDeque`). Data is appended at the tail and consumed from the head, mapping
//! directly onto "read into the buffer from the socket" / "write out of the buffer to the
//! socket" without ever shifting bytes around in place.

use slice_deque::SliceDeque;
use std::io;

type ByteDeque = SliceDeque<u8>;

const BUF_SIZE_INCREMENT: usize = 65536;

pub struct Buffer {
    data: ByteDeque,
    size: usize,
}

impl Buffer {
    #[inline]
    pub fn new(size: usize) -> Buffer {
        if size % BUF_SIZE_INCREMENT != 0 {
            panic!(
                "Buffer size must be divisible by {}, got {}",
                BUF_SIZE_INCREMENT, size
            );
        }

        let mut data = ByteDeque::new();
        data.reserve(size);
        Buffer { data, size }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.data.capacity() - self.data.len()
    }

    #[inline]
    pub fn move_head(&mut self, count: usize) {
        unsafe { self.data.move_head(count as isize) }
    }

    #[inline]
    pub fn move_tail(&mut self, count: usize) {
        unsafe { self.data.move_tail(count as isize) }
    }

    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[inline]
    pub fn clear(&mut self) {
        unsafe { self.data.move_head(self.len() as isize) };
    }

    #[inline]
    pub fn write_slice(&mut self) -> &mut [u8] {
        unsafe { self.data.tail_head_slice() }
    }

    /// Drain the buffer into the writer, advancing the head as bytes leave.
    #[inline]
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.data.len();

        while !self.data.is_empty() {
            let write_count = writer.write(&self.data)?;

            if write_count == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }

            self.move_head(write_count);
        }

        Ok(orig_len - self.data.len())
    }

    /// Fill the buffer from the reader until it blocks or the buffer is full. A zero-length read
    /// means the peer closed its end of the connection and is surfaced as `UnexpectedEof` rather
    /// than folded into a normal return, so callers can tell a closed socket apart from one that
    /// just has nothing to say right now.
    #[inline]
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let orig_capacity = self.free_capacity();

        while self.data.len() < self.size {
            unsafe {
                let read_count = reader.read(self.data.tail_head_slice())?;

                if read_count == 0 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed the connection"));
                }

                self.move_tail(read_count);
            }
        }

        Err(io::Error::new(io::ErrorKind::Other, "Buffer overrun"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::min;
    use std::io::Cursor;

    struct MockChannel {
        data: Vec<u8>,
        cursor: usize,
        chunk: usize,
        max_size: usize,
    }

    impl MockChannel {
        fn new(data: Vec<u8>, chunk: usize, max_size: usize) -> MockChannel {
            MockChannel {
                data,
                cursor: 0,
                chunk,
                max_size,
            }
        }

        fn clear(&mut self) {
            self.data.clear();
            self.cursor = 0;
        }
    }

    impl io::Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cursor == self.data.len() {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let offset = min(min(self.chunk, buf.len()), self.data.len() - self.cursor);
            buf[..offset].copy_from_slice(&self.data[self.cursor..(self.cursor + offset)]);
            self.cursor += offset;
            Ok(offset)
        }
    }

    impl io::Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.data.len() == self.max_size {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let count = min(self.chunk, buf.len());
            self.data.extend(&buf[..count]);

            Ok(count)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_roundtrip() {
        let mock_data: Vec<_> = (0..BUF_SIZE_INCREMENT / 2).map(|item| item as u8).collect();
        let mut channel = MockChannel::new(mock_data.clone(), 500, mock_data.len());

        let mut buffer = Buffer::new(BUF_SIZE_INCREMENT);

        let result = buffer.ingress(&mut channel);

        assert!(result.is_err());
        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::WouldBlock);
        assert_eq!(buffer.len(), mock_data.len());
        assert_eq!(buffer.read_slice(), &mock_data[..]);

        channel.clear();
        let count = buffer.egress(&mut channel).unwrap();

        assert_eq!(count, mock_data.len());
        assert_eq!(buffer.len(), 0);
        assert_eq!(channel.data[..], mock_data[..]);
    }

    #[test]
    fn test_egress_error_on_zero_write() {
        struct ZeroWriter;
        impl io::Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut buffer = Buffer::new(BUF_SIZE_INCREMENT);
        buffer.move_tail(1);

        let result = buffer.egress(ZeroWriter);

        assert!(result.is_err());
        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_ingress_buffer_overrun() {
        let mock_data: Vec<_> = (0..BUF_SIZE_INCREMENT * 2).map(|item| item as u8).collect();

        let mut buffer = Buffer::new(BUF_SIZE_INCREMENT);

        let result = buffer.ingress(&mock_data[..]);

        assert!(result.is_err());

        let err = result.err().unwrap();

        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(err.to_string(), "Buffer overrun")
    }

    #[test]
    fn test_detects_peer_eof() {
        let mut cursor = Cursor::new(vec![1, 2, 3]);
        let mut buffer = Buffer::new(BUF_SIZE_INCREMENT);

        let result = buffer.ingress(&mut cursor);

        assert!(result.is_err());
        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(buffer.read_slice(), &[1, 2, 3], "bytes read before EOF are still in the buffer");
    }

    #[test]
    #[should_panic(expected = "Buffer size must be divisible by 65536, got 100000")]
    fn test_fail_on_incorrect_increment() {
        let _ = Buffer::new(100000);
    }
}
