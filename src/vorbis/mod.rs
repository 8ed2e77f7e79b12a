pub mod bits;
pub mod codebook;
pub mod floor;
pub mod frame;
pub mod mapping;
pub mod residue;
pub mod setup;

pub const MAX_CHANNELS: usize = 8;
pub const MAX_FLOOR_PARTITIONS: usize = 32;
pub const MAX_FLOOR_CLASSES: usize = 16;
/// Two endpoints plus up to 31 partitions of at most 8 values each.
pub const MAX_FLOOR_VALUES: usize = 32 * 8 + 2;
pub const MAX_RESIDUE_CLASSIFICATIONS: usize = 64;
pub const MAX_COUPLING_STEPS: usize = 256;
pub const MAX_SUBMAPS: usize = 16;
pub const MIN_BLOCK_SIZE: usize = 64;
pub const MAX_BLOCK_SIZE: usize = 8192;
