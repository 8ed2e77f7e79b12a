use thiserror::Error;

use super::{
    MAX_COUPLING_STEPS, MAX_SUBMAPS,
    bits::{BitReadError, BitReader, ilog},
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    #[error("coupling step {0} uses one channel as both magnitude and angle")]
    ChannelConflict(usize),
    #[error("mapping refers to missing channel {0}")]
    InvalidChannel(usize),
    #[error("mapping reserved bits are {0:#b}")]
    ReservedNonzero(u32),
    #[error("channel routed to missing submap {0}")]
    InvalidSubmap(usize),
    #[error("submap refers to missing floor {0}")]
    InvalidFloor(usize),
    #[error("submap refers to missing residue {0}")]
    InvalidResidue(usize),
    #[error("mapping uses {0} submaps")]
    TooManySubmaps(usize),
    #[error("mapping uses {0} coupling steps")]
    TooManyCouplingSteps(usize),
    #[error(transparent)]
    BitRead(#[from] BitReadError),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ModeError {
    #[error("unsupported window type {0}")]
    UnsupportedWindow(u32),
    #[error("unsupported transform type {0}")]
    UnsupportedTransform(u32),
    #[error("mode refers to missing mapping {0}")]
    InvalidMapping(usize),
    #[error(transparent)]
    BitRead(#[from] BitReadError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouplingStep {
    pub magnitude: usize,
    pub angle: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submap {
    pub floor: usize,
    pub residue: usize,
}

#[derive(Debug, Clone)]
pub struct Mapping {
    pub submaps: Vec<Submap>,
    pub coupling: Vec<CouplingStep>,
    /// Submap of each channel.
    pub mux: Vec<usize>,
}

impl Mapping {
    pub fn decode_setup(
        reader: &mut BitReader,
        channels: usize,
        floors: usize,
        residues: usize,
    ) -> Result<Self, MappingError> {
        let submap_count = if reader.read_flag()? {
            reader.read_bits(4)? as usize + 1
        } else {
            1
        };

        if submap_count > MAX_SUBMAPS {
            return Err(MappingError::TooManySubmaps(submap_count));
        }

        let mut coupling = Vec::new();
        if reader.read_flag()? {
            let steps = reader.read_bits(8)? as usize + 1;
            if steps > MAX_COUPLING_STEPS {
                return Err(MappingError::TooManyCouplingSteps(steps));
            }

            let bits = ilog(channels as u32 - 1);
            for step in 0..steps {
                let magnitude = reader.read_bits(bits)? as usize;
                let angle = reader.read_bits(bits)? as usize;

                if magnitude == angle {
                    return Err(MappingError::ChannelConflict(step));
                }

                if let Some(&channel) = [magnitude, angle].iter().find(|&&c| c >= channels) {
                    return Err(MappingError::InvalidChannel(channel));
                }

                coupling.push(CouplingStep { magnitude, angle });
            }
        }

        let reserved = reader.read_bits(2)?;
        if reserved != 0 {
            return Err(MappingError::ReservedNonzero(reserved));
        }

        let mut mux = vec![0; channels];
        if submap_count > 1 {
            for submap in mux.iter_mut() {
                *submap = reader.read_bits(4)? as usize;
                if *submap >= submap_count {
                    return Err(MappingError::InvalidSubmap(*submap));
                }
            }
        }

        let mut submaps = Vec::with_capacity(submap_count);
        for _ in 0..submap_count {
            // unused time configuration
            reader.read_bits(8)?;

            let floor = reader.read_bits(8)? as usize;
            if floor >= floors {
                return Err(MappingError::InvalidFloor(floor));
            }

            let residue = reader.read_bits(8)? as usize;
            if residue >= residues {
                return Err(MappingError::InvalidResidue(residue));
            }

            submaps.push(Submap { floor, residue });
        }

        Ok(Self {
            submaps,
            coupling,
            mux,
        })
    }

    /// Channels routed to `submap`, in channel order.
    pub fn channels_of(&self, submap: usize) -> impl Iterator<Item = usize> + '_ {
        self.mux
            .iter()
            .enumerate()
            .filter(move |(_, s)| **s == submap)
            .map(|(ch, _)| ch)
    }

    /// Marks both channels of a coupling step as carrying energy when either
    /// of them does.
    pub fn propagate_energy(&self, has_energy: &mut [bool]) {
        for step in &self.coupling {
            if has_energy[step.magnitude] || has_energy[step.angle] {
                has_energy[step.magnitude] = true;
                has_energy[step.angle] = true;
            }
        }
    }

    /// Undoes square polar channel coupling, last step first.
    pub fn inverse_couple(&self, spectra: &mut [Vec<f32>]) {
        for step in self.coupling.iter().rev() {
            let (magnitude, angle) = if step.magnitude < step.angle {
                let (low, high) = spectra.split_at_mut(step.angle);
                (&mut low[step.magnitude], &mut high[0])
            } else {
                let (low, high) = spectra.split_at_mut(step.magnitude);
                (&mut high[0], &mut low[step.angle])
            };

            for (m, a) in magnitude.iter_mut().zip(angle.iter_mut()) {
                (*m, *a) = uncouple(*m, *a);
            }
        }
    }
}

fn uncouple(m: f32, a: f32) -> (f32, f32) {
    if m > 0.0 {
        if a > 0.0 { (m, m - a) } else { (m + a, m) }
    } else if a > 0.0 {
        (m, m + a)
    } else {
        (m - a, m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub long_block: bool,
    pub mapping: usize,
}

impl Mode {
    pub fn decode_setup(reader: &mut BitReader, mappings: usize) -> Result<Self, ModeError> {
        let long_block = reader.read_flag()?;

        let window = reader.read_bits(16)?;
        if window != 0 {
            return Err(ModeError::UnsupportedWindow(window));
        }

        let transform = reader.read_bits(16)?;
        if transform != 0 {
            return Err(ModeError::UnsupportedTransform(transform));
        }

        let mapping = reader.read_bits(8)? as usize;
        if mapping >= mappings {
            return Err(ModeError::InvalidMapping(mapping));
        }

        Ok(Self {
            long_block,
            mapping,
        })
    }
}
