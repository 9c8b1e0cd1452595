use crate::error::{NetworkError, NetworkResult};
use std::io;

/// Augmented `io::Write` that is aware of the amount of remaining free capacity in the
/// destination. Implementors must never perform a short write that leaves a message half
/// written; `Serialize` impls check `free_capacity` before writing anything.
pub trait SizedWrite: io::Write {
    fn free_capacity(&self) -> usize;
}

/// Augmented `io::Read` that is aware of the amount of remaining data in the source.
pub trait SizedRead: io::Read {
    fn remaining_data(&self) -> usize;
}

impl SizedWrite for io::Cursor<&mut [u8]> {
    #[inline]
    fn free_capacity(&self) -> usize {
        self.get_ref().len() - self.position() as usize
    }
}

impl SizedWrite for io::Cursor<Vec<u8>> {
    #[inline]
    fn free_capacity(&self) -> usize {
        usize::MAX - self.position() as usize
    }
}

impl SizedRead for io::Cursor<&[u8]> {
    #[inline]
    fn remaining_data(&self) -> usize {
        self.get_ref().len() - self.position() as usize
    }
}

impl SizedRead for io::Cursor<&mut [u8]> {
    #[inline]
    fn remaining_data(&self) -> usize {
        self.get_ref().len() - self.position() as usize
    }
}

/// Trait for manually serialized wire messages. Implementors must validate the remaining free
/// capacity in the stream upfront and bail out with `NetworkError::Wait` rather than perform a
/// partial write.
pub trait Serialize {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()>;
}

/// Trait for manually deserialized wire messages.
pub trait Deserialize: Sized {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<Self>;
}

/// Batched payload messages, written or read opportunistically as stream capacity allows.
pub struct PayloadBatch<P> {
    data: Vec<P>,
}

impl<P> PayloadBatch<P> {
    #[inline]
    pub fn new() -> PayloadBatch<P> {
        PayloadBatch { data: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<P: Serialize> PayloadBatch<P> {
    #[inline]
    pub fn push(&mut self, payload: P) {
        self.data.push(payload)
    }

    #[inline]
    pub fn drain(&mut self) -> impl Iterator<Item = P> + '_ {
        self.data.drain(..)
    }

    /// Write as many queued messages as the stream has capacity for, dropping the ones that
    /// were successfully written off the front of the batch.
    #[inline]
    pub fn write<W: SizedWrite>(&mut self, stream: &mut W) -> NetworkResult<()> {
        let mut remaining = self.data.len();

        for payload in self.data.iter_mut() {
            match payload.serialize(stream) {
                Ok(_) => remaining -= 1,
                Err(NetworkError::Wait) => break,
                Err(error) => return Err(error),
            }
        }

        if remaining == self.data.len() {
            return Err(NetworkError::Wait);
        }

        self.data.truncate(remaining);
        Ok(())
    }
}

impl<P: Deserialize> PayloadBatch<P> {
    #[inline]
    pub fn read<R: SizedRead>(&mut self, stream: &mut R) -> NetworkResult<()> {
        while stream.remaining_data() > 0 {
            self.data.push(P::deserialize(stream)?)
        }

        Ok(())
    }
}
