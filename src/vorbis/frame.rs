use thiserror::Error;

use super::{
    bits::{BitReadError, BitReader},
    codebook::CodebookError,
    floor::FloorError,
    residue::ResidueError,
    setup::VorbisSession,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("expected an audio packet, found a header packet")]
    UnexpectedHeaderPacket,
    #[error("packet selects missing mode {0}")]
    InvalidMode(usize),
    #[error(transparent)]
    Floor(#[from] FloorError),
    #[error(transparent)]
    Residue(#[from] ResidueError),
    #[error(transparent)]
    BitRead(#[from] BitReadError),
}

/// Reconstructed spectral data of one channel, `block_size / 2` values each.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpectrum {
    /// Linear floor amplitudes, `None` when the floor is unused this frame.
    pub floor: Option<Vec<f32>>,
    /// Residue after inverse coupling.
    pub residue: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub mode: usize,
    pub block_size: usize,
    pub long_block: bool,
    /// Long blocks only: whether the previous block was long.
    pub previous_window: bool,
    /// Long blocks only: whether the next block is long.
    pub next_window: bool,
    pub channels: Vec<ChannelSpectrum>,
}

fn is_end_of_packet(e: &FloorError) -> bool {
    matches!(
        e,
        FloorError::BitRead(BitReadError::EndOfPacket)
            | FloorError::Codebook(CodebookError::BitRead(BitReadError::EndOfPacket))
    )
}

impl DecodedFrame {
    pub fn decode(session: &VorbisSession, packet: &[u8]) -> Result<Self, FrameError> {
        let mut reader = BitReader::new(packet);

        if reader.read_flag()? {
            return Err(FrameError::UnexpectedHeaderPacket);
        }

        let mode_index = reader.read_bits(session.mode_bits)? as usize;
        let mode = session
            .modes
            .get(mode_index)
            .ok_or(FrameError::InvalidMode(mode_index))?;

        let mapping = &session.mappings[mode.mapping];
        let block_size = session.block_size(mode.long_block);
        let n = block_size / 2;

        let (previous_window, next_window) = if mode.long_block {
            (reader.read_flag()?, reader.read_flag()?)
        } else {
            (false, false)
        };

        let channels = session.channels();

        let mut curves = Vec::with_capacity(channels);
        for ch in 0..channels {
            let floor = &session.floors[mapping.submaps[mapping.mux[ch]].floor];

            curves.push(match floor.decode_frame(&mut reader, &session.codebooks) {
                Ok(curve) => curve,
                Err(e) if is_end_of_packet(&e) => {
                    log::debug!("floor of channel {} cut short by the end of the packet", ch);

                    None
                }
                Err(e) => return Err(e.into()),
            });
        }

        let mut has_energy: Vec<bool> = curves.iter().map(Option::is_some).collect();
        mapping.propagate_energy(&mut has_energy);

        let mut spectra = vec![vec![0.0; n]; channels];
        for (index, submap) in mapping.submaps.iter().enumerate() {
            let members: Vec<usize> = mapping.channels_of(index).collect();
            let do_not_decode: Vec<bool> = members.iter().map(|&ch| !has_energy[ch]).collect();

            let vectors = session.residues[submap.residue].decode_frame(
                &mut reader,
                &session.codebooks,
                n,
                &do_not_decode,
            )?;

            for (ch, vector) in members.into_iter().zip(vectors) {
                spectra[ch] = vector;
            }
        }

        mapping.inverse_couple(&mut spectra);

        log::trace!(
            "vorbis frame: mode={} block size={} energy={:?}",
            mode_index,
            block_size,
            has_energy
        );

        let channels = curves
            .into_iter()
            .zip(spectra)
            .enumerate()
            .map(|(ch, (curve, residue))| -> Result<ChannelSpectrum, FrameError> {
                let floor = &session.floors[mapping.submaps[mapping.mux[ch]].floor];

                Ok(ChannelSpectrum {
                    floor: curve.map(|curve| floor.synthesize(&curve, n)).transpose()?,
                    residue,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            mode: mode_index,
            block_size,
            long_block: mode.long_block,
            previous_window,
            next_window,
            channels,
        })
    }
}
