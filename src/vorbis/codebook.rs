use thiserror::Error;

use super::bits::{BitReadError, BitReader, ilog};

/// "BCV" read LSB-first.
pub const CODEBOOK_SYNC: u32 = 0x564342;

/// Deepest codeword the format can describe (5-bit length field, plus one).
pub const MAX_CODEWORD_LEN: u8 = 32;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodebookError {
    #[error("bad codebook sync pattern {0:#08x}")]
    BadSync(u32),
    #[error("codebook has zero dimensions")]
    ZeroDimensions,
    #[error("ordered codeword lengths overrun the entry count")]
    BadEntryRun,
    #[error("codeword length {0} is longer than 32 bits")]
    CodewordTooLong(u32),
    #[error("codeword lengths do not fit in a prefix code")]
    Underspecified,
    #[error("unsupported lookup type {0}")]
    BadLookupType(u32),
    #[error("vector lookup table is empty")]
    EmptyLookupTable,
    #[error("no codeword matched within 32 bits")]
    DecodeExhausted,
    #[error("codebook has no vector lookup table")]
    NoLookupTable,
    #[error("vector of {needed} values does not fit in {got}")]
    OutputTooShort { needed: usize, got: usize },
    #[error(transparent)]
    BitRead(#[from] BitReadError),
}

/// One used entry of a codebook and the prefix code assigned to it.
///
/// `bits` is MSB aligned: a codeword of length `len` lives in the top `len`
/// bits and the remaining low bits are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codeword {
    pub bits: u32,
    pub len: u8,
    pub entry: u32,
}

impl Codeword {
    /// Whether `self` is a prefix of (or equal to) `other`.
    pub fn is_prefix_of(&self, other: &Codeword) -> bool {
        if self.len > other.len {
            return false;
        }

        let mask = (!0u32).checked_shl(32 - self.len as u32).unwrap_or(0);
        other.bits & mask == self.bits
    }
}

/// Assigns canonical codewords to the used entries (`Some(len)`), in entry
/// order, always taking the leftmost free branch of the code tree.
///
/// `next[depth]` holds the single open codeword at that depth, zero meaning
/// none is open.
pub fn assign_codewords(lengths: &[Option<u8>]) -> Result<Vec<Codeword>, CodebookError> {
    let mut codewords = Vec::with_capacity(lengths.iter().flatten().count());
    let mut next = [0u32; MAX_CODEWORD_LEN as usize + 1];

    for (entry, len) in lengths.iter().enumerate() {
        let Some(len) = *len else {
            continue;
        };

        if len == 0 || len > MAX_CODEWORD_LEN {
            return Err(CodebookError::CodewordTooLong(len as u32));
        }

        if codewords.is_empty() {
            codewords.push(Codeword {
                bits: 0,
                len,
                entry: entry as u32,
            });

            for depth in 1..=len {
                next[depth as usize] = 1 << (32 - depth as u32);
            }

            continue;
        }

        let mut root = len as usize;
        while root > 0 && next[root] == 0 {
            root -= 1;
        }

        if root == 0 {
            return Err(CodebookError::Underspecified);
        }

        let bits = next[root];
        next[root] = 0;

        for depth in (root + 1..=len as usize).rev() {
            next[depth] = bits + (1 << (32 - depth as u32));
        }

        codewords.push(Codeword {
            bits,
            len,
            entry: entry as u32,
        });
    }

    Ok(codewords)
}

/// Largest `v` with `v^dimensions <= entries`.
pub fn lookup1_values(entries: u32, dimensions: u32) -> u32 {
    if dimensions == 0 {
        return 0;
    }

    let mut value = 0u32;
    while (value + 1)
        .checked_pow(dimensions)
        .is_some_and(|pow| pow <= entries)
    {
        value += 1;
    }

    value
}

/// Unpacks the format's 32-bit float: 21-bit mantissa, 10-bit exponent
/// biased by 788, sign in the top bit.
pub fn unpack_float(raw: u32) -> f32 {
    let mantissa = (raw & 0x1f_ffff) as f64;
    let exponent = ((raw & 0x7fe0_0000) >> 21) as i32;
    let value = mantissa * 2f64.powi(exponent - 788);

    if raw & 0x8000_0000 != 0 {
        -value as f32
    } else {
        value as f32
    }
}

fn read_float(reader: &mut BitReader) -> Result<f32, BitReadError> {
    let low = reader.read_bits(16)?;
    let high = reader.read_bits(16)?;

    Ok(unpack_float(high << 16 | low))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupType {
    /// Multiplicands are shared across dimensions and indexed by the digits
    /// of the entry number in base `lookup_values`.
    Lattice,
    /// Every entry owns `dimensions` consecutive multiplicands.
    Tessellated,
}

#[derive(Debug, Clone)]
pub struct VectorLookup {
    pub kind: LookupType,
    pub minimum: f32,
    pub delta: f32,
    pub sequence_p: bool,
    pub lookup_values: u32,
    pub multiplicands: Vec<u16>,
}

#[derive(Debug, Clone)]
pub struct Codebook {
    pub dimensions: usize,
    pub entries: u32,
    /// Sorted by `(len, bits)` for lookup.
    codewords: Vec<Codeword>,
    /// `codewords[offsets[len]..offsets[len + 1]]` are the codewords of
    /// length `len`.
    offsets: [usize; MAX_CODEWORD_LEN as usize + 2],
    pub lookup: Option<VectorLookup>,
}

impl Codebook {
    pub fn decode_setup(reader: &mut BitReader) -> Result<Self, CodebookError> {
        let sync = reader.read_bits(24)?;
        if sync != CODEBOOK_SYNC {
            return Err(CodebookError::BadSync(sync));
        }

        let dimensions = reader.read_bits(16)? as usize;
        let entries = reader.read_bits(24)?;
        if dimensions == 0 {
            return Err(CodebookError::ZeroDimensions);
        }

        let lengths = read_lengths(reader, entries)?;
        let codewords = assign_codewords(&lengths)?;

        let lookup = match reader.read_bits(4)? {
            0 => None,
            kind @ (1 | 2) => {
                let minimum = read_float(reader)?;
                let delta = read_float(reader)?;
                let value_bits = reader.read_bits(4)? + 1;
                let sequence_p = reader.read_flag()?;

                let (kind, lookup_values) = if kind == 1 {
                    (
                        LookupType::Lattice,
                        lookup1_values(entries, dimensions as u32),
                    )
                } else {
                    let count = (entries as u64 * dimensions as u64).min(u32::MAX as u64);
                    (LookupType::Tessellated, count as u32)
                };

                if lookup_values == 0 {
                    return Err(CodebookError::EmptyLookupTable);
                }

                // never reserve more than the packet can still hold
                let capacity = (lookup_values as usize).min(reader.remaining() / value_bits as usize);
                let mut multiplicands = Vec::with_capacity(capacity);
                for _ in 0..lookup_values {
                    multiplicands.push(reader.read_bits(value_bits)? as u16);
                }

                Some(VectorLookup {
                    kind,
                    minimum,
                    delta,
                    sequence_p,
                    lookup_values,
                    multiplicands,
                })
            }
            kind => return Err(CodebookError::BadLookupType(kind)),
        };

        Ok(Self::new(dimensions, entries, codewords, lookup))
    }

    pub fn new(
        dimensions: usize,
        entries: u32,
        mut codewords: Vec<Codeword>,
        lookup: Option<VectorLookup>,
    ) -> Self {
        codewords.sort_unstable_by_key(|c| (c.len, c.bits));

        let mut offsets = [0usize; MAX_CODEWORD_LEN as usize + 2];
        for len in 0..=MAX_CODEWORD_LEN as usize {
            offsets[len + 1] =
                offsets[len] + codewords.iter().filter(|c| c.len as usize == len).count();
        }

        Self {
            dimensions,
            entries,
            codewords,
            offsets,
            lookup,
        }
    }

    pub fn codewords(&self) -> &[Codeword] {
        &self.codewords
    }

    /// Walks the code tree one bit at a time, the first bit read being the
    /// most significant bit of the codeword, and returns the entry number.
    pub fn decode_scalar(&self, reader: &mut BitReader) -> Result<u32, CodebookError> {
        let mut bits = 0u32;

        for len in 1..=MAX_CODEWORD_LEN as usize {
            bits |= reader.read_bits(1)? << (32 - len);

            let candidates = &self.codewords[self.offsets[len]..self.offsets[len + 1]];
            if let Ok(i) = candidates.binary_search_by_key(&bits, |c| c.bits) {
                return Ok(candidates[i].entry);
            }
        }

        Err(CodebookError::DecodeExhausted)
    }

    /// Decodes one entry and writes its `dimensions` vector values to the
    /// front of `out`.
    pub fn decode_vector(
        &self,
        reader: &mut BitReader,
        out: &mut [f32],
    ) -> Result<(), CodebookError> {
        let lookup = self.lookup.as_ref().ok_or(CodebookError::NoLookupTable)?;
        if out.len() < self.dimensions {
            return Err(CodebookError::OutputTooShort {
                needed: self.dimensions,
                got: out.len(),
            });
        }

        let offset = self.decode_scalar(reader)?;

        let mut last = 0.0;
        let mut divisor = 1u32;

        for (i, out) in out[..self.dimensions].iter_mut().enumerate() {
            let index = match lookup.kind {
                LookupType::Lattice => {
                    let index = (offset / divisor) % lookup.lookup_values;
                    divisor = divisor.saturating_mul(lookup.lookup_values);
                    index as usize
                }
                LookupType::Tessellated => offset as usize * self.dimensions + i,
            };

            let value = lookup.multiplicands[index] as f32 * lookup.delta + lookup.minimum + last;
            if lookup.sequence_p {
                last = value;
            }

            *out = value;
        }

        Ok(())
    }
}

/// Reads the per-entry codeword lengths, `None` marking an unused entry.
fn read_lengths(reader: &mut BitReader, entries: u32) -> Result<Vec<Option<u8>>, CodebookError> {
    let capacity = (entries as usize).min(reader.remaining());
    let mut lengths = Vec::with_capacity(capacity);

    let ordered = reader.read_flag()?;
    if !ordered {
        let sparse = reader.read_flag()?;

        for _ in 0..entries {
            if sparse && !reader.read_flag()? {
                lengths.push(None);
                continue;
            }

            lengths.push(Some(reader.read_bits(5)? as u8 + 1));
        }
    } else {
        let mut len = reader.read_bits(5)? + 1;
        let mut entry = 0;

        while entry < entries {
            let run = reader.read_bits(ilog(entries - entry))?;
            if entry + run > entries {
                return Err(CodebookError::BadEntryRun);
            }

            if run > 0 && len > MAX_CODEWORD_LEN as u32 {
                return Err(CodebookError::CodewordTooLong(len));
            }

            lengths.extend((0..run).map(|_| Some(len as u8)));
            entry += run;
            len += 1;
        }
    }

    Ok(lengths)
}
