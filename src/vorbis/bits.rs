use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BitReadError {
    #[error("read past the end of the packet")]
    EndOfPacket,
    #[error("cannot read {0} bits in a single call")]
    TooManyBits(u32),
}

/// A little-endian (LSB-first) bit reader over one packet.
///
/// Bytes are pulled into the cache one at a time, each new byte shifted left
/// by the number of bits already cached, so bits always come out of the low
/// end of the cache first.
pub struct BitReader<'a> {
    bytes: &'a [u8],
    index: usize,
    cache: u64,
    left: u32,
}

impl<'a> BitReader<'a> {
    /// Largest width accepted by a single `read_bits` call.
    pub const MAX_READ_BITS: u32 = 32;

    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            index: 0,
            cache: 0,
            left: 0,
        }
    }

    /// Pulls bytes from the packet until at least `n` bits are cached.
    pub fn ensure(&mut self, n: u32) -> Result<(), BitReadError> {
        if n > Self::MAX_READ_BITS {
            return Err(BitReadError::TooManyBits(n));
        }

        while self.left < n {
            let byte = *self
                .bytes
                .get(self.index)
                .ok_or(BitReadError::EndOfPacket)?;

            self.cache |= (byte as u64) << self.left;
            self.index += 1;
            self.left += 8;
        }

        Ok(())
    }

    /// Returns the low `n` cached bits without consuming them.
    ///
    /// The caller must have called `ensure(n)` first.
    pub fn peek(&self, n: u32) -> u32 {
        debug_assert!(n <= self.left);

        (self.cache & ((1u64 << n) - 1)) as u32
    }

    pub fn consume(&mut self, n: u32) {
        debug_assert!(n <= self.left);

        self.cache >>= n;
        self.left -= n;
    }

    pub fn read_bits(&mut self, n: u32) -> Result<u32, BitReadError> {
        if n == 0 {
            return Ok(0);
        }

        self.ensure(n)?;

        let value = self.peek(n);
        self.consume(n);

        Ok(value)
    }

    pub fn read_flag(&mut self) -> Result<bool, BitReadError> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Drops the cached bits that do not complete a byte.
    pub fn align_to_byte(&mut self) {
        self.consume(self.left % 8);
    }

    /// Number of bits taken out of the packet so far.
    pub fn position(&self) -> usize {
        self.index * 8 - self.left as usize
    }

    /// Number of bits still readable, cached or not.
    pub fn remaining(&self) -> usize {
        self.bytes.len() * 8 - self.position()
    }
}

/// Number of bits needed to hold `value`: `ilog(0) == 0`, `ilog(1) == 1`,
/// `ilog(7) == 3`, `ilog(8) == 4`.
pub fn ilog(value: u32) -> u32 {
    u32::BITS - value.leading_zeros()
}
