use thiserror::Error;

use super::{
    MAX_RESIDUE_CLASSIFICATIONS,
    bits::{BitReadError, BitReader},
    codebook::{Codebook, CodebookError},
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResidueError {
    #[error("unsupported residue type {0}")]
    UnsupportedType(u32),
    #[error("residue uses {0} classifications")]
    TooManyClassifications(usize),
    #[error("residue refers to missing codebook {0}")]
    InvalidCodebook(usize),
    #[error(transparent)]
    Codebook(#[from] CodebookError),
    #[error(transparent)]
    BitRead(#[from] BitReadError),
}

impl ResidueError {
    fn is_end_of_packet(&self) -> bool {
        matches!(
            self,
            Self::BitRead(BitReadError::EndOfPacket)
                | Self::Codebook(CodebookError::BitRead(BitReadError::EndOfPacket))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidueType {
    /// Each vector is spread across its partition with a stride.
    Interleaved,
    /// Each vector fills consecutive values of its partition.
    Contiguous,
    /// All channels are interleaved into one vector decoded as `Contiguous`.
    Coupled,
}

impl TryFrom<u32> for ResidueType {
    type Error = ResidueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Interleaved),
            1 => Ok(Self::Contiguous),
            2 => Ok(Self::Coupled),
            kind => Err(ResidueError::UnsupportedType(kind)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Residue {
    pub kind: ResidueType,
    pub begin: usize,
    pub end: usize,
    pub partition_size: usize,
    pub classifications: usize,
    pub classbook: usize,
    /// Bit `pass` set when the classification has a book in that pass.
    pub cascade: Vec<u8>,
    pub books: Vec<[Option<usize>; 8]>,
}

fn check_book(index: u32, codebooks: usize) -> Result<usize, ResidueError> {
    let index = index as usize;
    if index >= codebooks {
        return Err(ResidueError::InvalidCodebook(index));
    }

    Ok(index)
}

impl Residue {
    pub fn decode_setup(
        reader: &mut BitReader,
        kind: ResidueType,
        codebooks: usize,
    ) -> Result<Self, ResidueError> {
        let begin = reader.read_bits(24)? as usize;
        let end = reader.read_bits(24)? as usize;
        let partition_size = reader.read_bits(24)? as usize + 1;
        let classifications = reader.read_bits(6)? as usize + 1;
        let classbook = check_book(reader.read_bits(8)?, codebooks)?;

        if classifications > MAX_RESIDUE_CLASSIFICATIONS {
            return Err(ResidueError::TooManyClassifications(classifications));
        }

        let mut cascade = Vec::with_capacity(classifications);
        for _ in 0..classifications {
            let low = reader.read_bits(3)?;
            let high = if reader.read_flag()? {
                reader.read_bits(5)?
            } else {
                0
            };

            cascade.push((low | high << 3) as u8);
        }

        let mut books = Vec::with_capacity(classifications);
        for &bits in &cascade {
            let mut passes = [None; 8];
            for (pass, book) in passes.iter_mut().enumerate() {
                if bits & (1 << pass) != 0 {
                    *book = Some(check_book(reader.read_bits(8)?, codebooks)?);
                }
            }

            books.push(passes);
        }

        Ok(Self {
            kind,
            begin,
            end,
            partition_size,
            classifications,
            classbook,
            cascade,
            books,
        })
    }

    /// Decodes one residue vector of `n` values per channel. Channels marked
    /// in `do_not_decode` read nothing and come back as zeros.
    ///
    /// A packet that ends early is not an error here: whatever was decoded
    /// before the end is kept.
    pub fn decode_frame(
        &self,
        reader: &mut BitReader,
        codebooks: &[Codebook],
        n: usize,
        do_not_decode: &[bool],
    ) -> Result<Vec<Vec<f32>>, ResidueError> {
        let channels = do_not_decode.len();

        if self.kind != ResidueType::Coupled {
            let mut vectors = vec![vec![0.0; n]; channels];
            tolerate_end_of_packet(self.decode_passes(
                reader,
                codebooks,
                &mut vectors,
                do_not_decode,
            ))?;

            return Ok(vectors);
        }

        let mut vectors = vec![vec![0.0; n]; channels];
        if do_not_decode.iter().all(|&skip| skip) {
            return Ok(vectors);
        }

        let mut interleaved = vec![vec![0.0; n * channels]];
        tolerate_end_of_packet(self.decode_passes(
            reader,
            codebooks,
            &mut interleaved,
            &[false],
        ))?;

        for (i, values) in interleaved[0].chunks_exact(channels).enumerate() {
            for (vector, &value) in vectors.iter_mut().zip(values) {
                vector[i] = value;
            }
        }

        Ok(vectors)
    }

    fn decode_passes(
        &self,
        reader: &mut BitReader,
        codebooks: &[Codebook],
        vectors: &mut [Vec<f32>],
        do_not_decode: &[bool],
    ) -> Result<(), ResidueError> {
        let actual_size = vectors.first().map_or(0, Vec::len);
        let begin = self.begin.min(actual_size);
        let end = self.end.min(actual_size);

        let classbook = &codebooks[self.classbook];
        let classes_per_word = classbook.dimensions;
        let partitions = end.saturating_sub(begin) / self.partition_size;
        if partitions == 0 {
            return Ok(());
        }

        let mut classes = vec![vec![0usize; partitions + classes_per_word]; vectors.len()];
        let mut scratch = Vec::new();

        for pass in 0..8 {
            let mut partition = 0;

            while partition < partitions {
                if pass == 0 {
                    for (classes, _) in classes
                        .iter_mut()
                        .zip(do_not_decode)
                        .filter(|(_, skip)| !**skip)
                    {
                        let word = classbook.decode_scalar(reader)?;
                        split_classes(
                            word,
                            self.classifications,
                            &mut classes[partition..partition + classes_per_word],
                        );
                    }
                }

                for _ in 0..classes_per_word {
                    if partition >= partitions {
                        break;
                    }

                    let offset = begin + partition * self.partition_size;

                    for (ch, vector) in vectors.iter_mut().enumerate() {
                        if do_not_decode[ch] {
                            continue;
                        }

                        let Some(book) = self.books[classes[ch][partition]][pass] else {
                            continue;
                        };

                        let book = &codebooks[book];
                        let out = &mut vector[offset..offset + self.partition_size];
                        scratch.resize(book.dimensions, 0.0);

                        match self.kind {
                            ResidueType::Interleaved => {
                                decode_interleaved(reader, book, &mut scratch, out)?
                            }
                            _ => decode_contiguous(reader, book, &mut scratch, out)?,
                        }
                    }

                    partition += 1;
                }
            }
        }

        Ok(())
    }
}

fn tolerate_end_of_packet(result: Result<(), ResidueError>) -> Result<(), ResidueError> {
    match result {
        Err(e) if e.is_end_of_packet() => {
            log::debug!("residue cut short by the end of the packet");

            Ok(())
        }
        result => result,
    }
}

/// Splits a classbook entry into one classification per partition, most
/// significant digit first.
fn split_classes(mut word: u32, classifications: usize, out: &mut [usize]) {
    for class in out.iter_mut().rev() {
        *class = word as usize % classifications;
        word /= classifications as u32;
    }
}

fn decode_interleaved(
    reader: &mut BitReader,
    book: &Codebook,
    scratch: &mut [f32],
    out: &mut [f32],
) -> Result<(), CodebookError> {
    let step = out.len() / book.dimensions;

    for i in 0..step {
        book.decode_vector(reader, scratch)?;

        for (o, &v) in out[i..].iter_mut().step_by(step).zip(scratch.iter()) {
            *o += v;
        }
    }

    Ok(())
}

fn decode_contiguous(
    reader: &mut BitReader,
    book: &Codebook,
    scratch: &mut [f32],
    out: &mut [f32],
) -> Result<(), CodebookError> {
    for chunk in out.chunks_mut(book.dimensions) {
        book.decode_vector(reader, scratch)?;

        for (o, &v) in chunk.iter_mut().zip(scratch.iter()) {
            *o += v;
        }
    }

    Ok(())
}
