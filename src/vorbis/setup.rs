use thiserror::Error;

use super::{
    bits::{BitReadError, BitReader, ilog},
    codebook::{Codebook, CodebookError},
    floor::{Floor, FloorError},
    mapping::{Mapping, MappingError, Mode, ModeError},
    residue::{Residue, ResidueError, ResidueType},
};
use crate::{CommentHeader, HeaderError, HeaderKind, IdentificationHeader, strip_header_preamble};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("codebook {index}: {source}")]
    Codebook { index: usize, source: CodebookError },
    #[error("floor {index}: {source}")]
    Floor { index: usize, source: FloorError },
    #[error("residue {index}: {source}")]
    Residue { index: usize, source: ResidueError },
    #[error("mapping {index}: {source}")]
    Mapping { index: usize, source: MappingError },
    #[error("mode {index}: {source}")]
    Mode { index: usize, source: ModeError },
    #[error("unsupported time domain transform {0}")]
    UnsupportedTimeDomainTransform(u32),
    #[error("unsupported floor type {0}")]
    UnsupportedFloorType(u32),
    #[error("unsupported mapping type {0}")]
    UnsupportedMappingType(u32),
    #[error("setup header framing bit is not set")]
    MissingFramingBit,
    #[error(transparent)]
    BitRead(#[from] BitReadError),
}

/// Everything the three header packets declare. Read-only once built.
#[derive(Debug, Clone)]
pub struct VorbisSession {
    pub identification: IdentificationHeader,
    pub comments: CommentHeader,
    pub codebooks: Vec<Codebook>,
    pub floors: Vec<Floor>,
    pub residues: Vec<Residue>,
    pub mappings: Vec<Mapping>,
    pub modes: Vec<Mode>,
    /// Width of the mode index at the start of each audio packet.
    pub mode_bits: u32,
}

/// Reads `count` items, tagging a failure with the index of the item.
fn read_table<T, E>(
    count: usize,
    mut read: impl FnMut() -> Result<T, E>,
    wrap: impl Fn(usize, E) -> SetupError,
) -> Result<Vec<T>, SetupError> {
    let mut items = Vec::with_capacity(count);
    for index in 0..count {
        items.push(read().map_err(|e| wrap(index, e))?);
    }

    Ok(items)
}

impl VorbisSession {
    /// Parses the setup header packet against the already parsed
    /// identification and comment headers.
    pub fn new(
        identification: IdentificationHeader,
        comments: CommentHeader,
        packet: &[u8],
    ) -> Result<Self, SetupError> {
        let bytes = strip_header_preamble(packet, HeaderKind::Setup)?;
        let mut reader = BitReader::new(bytes);
        let channels = identification.channels as usize;

        let count = reader.read_bits(8)? as usize + 1;
        let codebooks = read_table(
            count,
            || Codebook::decode_setup(&mut reader),
            |index, source| SetupError::Codebook { index, source },
        )?;

        // time domain transforms are placeholders, all of type 0
        let count = reader.read_bits(6)? + 1;
        for _ in 0..count {
            let kind = reader.read_bits(16)?;
            if kind != 0 {
                return Err(SetupError::UnsupportedTimeDomainTransform(kind));
            }
        }

        let count = reader.read_bits(6)? as usize + 1;
        let mut floors = Vec::with_capacity(count);
        for index in 0..count {
            let kind = reader.read_bits(16)?;
            if kind != 1 {
                return Err(SetupError::UnsupportedFloorType(kind));
            }

            floors.push(
                Floor::decode_setup(&mut reader, codebooks.len())
                    .map_err(|source| SetupError::Floor { index, source })?,
            );
        }

        let count = reader.read_bits(6)? as usize + 1;
        let residues = read_table(
            count,
            || -> Result<Residue, ResidueError> {
                let kind = ResidueType::try_from(reader.read_bits(16)?)?;
                Residue::decode_setup(&mut reader, kind, codebooks.len())
            },
            |index, source| SetupError::Residue { index, source },
        )?;

        let count = reader.read_bits(6)? as usize + 1;
        let mut mappings = Vec::with_capacity(count);
        for index in 0..count {
            let kind = reader.read_bits(16)?;
            if kind != 0 {
                return Err(SetupError::UnsupportedMappingType(kind));
            }

            mappings.push(
                Mapping::decode_setup(&mut reader, channels, floors.len(), residues.len())
                    .map_err(|source| SetupError::Mapping { index, source })?,
            );
        }

        let count = reader.read_bits(6)? as usize + 1;
        let modes = read_table(
            count,
            || Mode::decode_setup(&mut reader, mappings.len()),
            |index, source| SetupError::Mode { index, source },
        )?;

        let mode_bits = ilog(modes.len() as u32 - 1);

        let framing = reader.read_flag()?;
        reader.align_to_byte();
        if !framing {
            return Err(SetupError::MissingFramingBit);
        }

        log::debug!(
            "vorbis setup: codebooks={} floors={} residues={} mappings={} modes={}",
            codebooks.len(),
            floors.len(),
            residues.len(),
            mappings.len(),
            modes.len()
        );

        Ok(Self {
            identification,
            comments,
            codebooks,
            floors,
            residues,
            mappings,
            modes,
            mode_bits,
        })
    }

    pub fn channels(&self) -> usize {
        self.identification.channels as usize
    }

    pub fn sample_rate(&self) -> u32 {
        self.identification.sample_rate
    }

    /// Block size selected by a mode's block flag.
    pub fn block_size(&self, long_block: bool) -> usize {
        self.identification.block_sizes[long_block as usize]
    }
}
