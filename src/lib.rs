pub mod ogg;
pub mod vorbis;

use std::io::Read;

use bytes::{Buf, Bytes};
use thiserror::Error;

pub use self::{
    ogg::{OggError, OggPacketReader, OggPage},
    vorbis::{
        frame::{ChannelSpectrum, DecodedFrame, FrameError},
        setup::{SetupError, VorbisSession},
    },
};

use self::vorbis::{MAX_BLOCK_SIZE, MAX_CHANNELS, MIN_BLOCK_SIZE};

pub const VORBIS_MAGIC: &[u8; 6] = b"vorbis";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Identification = 1,
    Comment = 3,
    Setup = 5,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header packet is truncated")]
    InvalidData,
    #[error("expected header type {expected:?}, found {found}")]
    WrongHeaderType { expected: HeaderKind, found: u8 },
    #[error("header magic is not \"vorbis\"")]
    CorruptHeaderMagic,
    #[error("unsupported vorbis version {0}")]
    UnsupportedVersion(u32),
    #[error("unsupported channel count {0}")]
    UnsupportedChannelCount(u8),
    #[error("invalid block sizes {0:#04x}")]
    InvalidBlockSize(u8),
    #[error("header framing bit is not set")]
    MissingFramingBit,
}

/// Checks the packet type byte and the magic word shared by all three
/// headers, and returns the rest of the packet.
pub fn strip_header_preamble(bytes: &[u8], kind: HeaderKind) -> Result<&[u8], HeaderError> {
    if bytes.len() < 7 {
        return Err(HeaderError::InvalidData);
    }

    if bytes[0] != kind as u8 {
        return Err(HeaderError::WrongHeaderType {
            expected: kind,
            found: bytes[0],
        });
    }

    if &bytes[1..7] != VORBIS_MAGIC {
        return Err(HeaderError::CorruptHeaderMagic);
    }

    Ok(&bytes[7..])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationHeader {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_maximum: i32,
    pub bitrate_nominal: i32,
    pub bitrate_minimum: i32,
    /// Short and long block sizes, in that order.
    pub block_sizes: [usize; 2],
}

impl TryFrom<&[u8]> for IdentificationHeader {
    type Error = HeaderError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let mut bytes = strip_header_preamble(bytes, HeaderKind::Identification)?;
        if bytes.len() < 23 {
            return Err(HeaderError::InvalidData);
        }

        let version = bytes.get_u32_le();
        if version != 0 {
            return Err(HeaderError::UnsupportedVersion(version));
        }

        let channels = bytes.get_u8();
        if channels == 0 || channels as usize > MAX_CHANNELS {
            return Err(HeaderError::UnsupportedChannelCount(channels));
        }

        let sample_rate = bytes.get_u32_le();
        let bitrate_maximum = bytes.get_i32_le();
        let bitrate_nominal = bytes.get_i32_le();
        let bitrate_minimum = bytes.get_i32_le();

        // low nibble short, high nibble long, both as exponents of two
        let packed = bytes.get_u8();
        let block_sizes = [1usize << (packed & 0x0f), 1usize << (packed >> 4)];
        if block_sizes
            .iter()
            .any(|size| !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(size))
            || block_sizes[0] > block_sizes[1]
        {
            return Err(HeaderError::InvalidBlockSize(packed));
        }

        if bytes.get_u8() & 1 == 0 {
            return Err(HeaderError::MissingFramingBit);
        }

        Ok(Self {
            channels,
            sample_rate,
            bitrate_maximum,
            bitrate_nominal,
            bitrate_minimum,
            block_sizes,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentHeader {
    pub vendor: String,
    pub comments: Vec<String>,
}

fn read_string(bytes: &mut &[u8]) -> Result<String, HeaderError> {
    if bytes.len() < 4 {
        return Err(HeaderError::InvalidData);
    }

    let len = bytes.get_u32_le() as usize;
    if bytes.len() < len {
        return Err(HeaderError::InvalidData);
    }

    let value = String::from_utf8_lossy(&bytes[..len]).into_owned();
    bytes.advance(len);

    Ok(value)
}

impl TryFrom<&[u8]> for CommentHeader {
    type Error = HeaderError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let mut bytes = strip_header_preamble(bytes, HeaderKind::Comment)?;

        let vendor = read_string(&mut bytes)?;

        if bytes.len() < 4 {
            return Err(HeaderError::InvalidData);
        }

        let count = bytes.get_u32_le() as usize;
        let mut comments = Vec::with_capacity(count.min(bytes.len() / 4));
        for _ in 0..count {
            comments.push(read_string(&mut bytes)?);
        }

        if !bytes.has_remaining() || bytes.get_u8() & 1 == 0 {
            return Err(HeaderError::MissingFramingBit);
        }

        Ok(Self { vendor, comments })
    }
}

#[derive(Debug, Error)]
pub enum VorbisError {
    #[error("stream ended before the {0:?} header")]
    MissingHeader(HeaderKind),
    #[error(transparent)]
    Ogg(#[from] OggError),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Decodes a single Ogg/Vorbis stream up to per-channel spectra.
pub struct VorbisDecoder<R> {
    reader: OggPacketReader<R>,
    session: VorbisSession,
}

impl<R: Read> VorbisDecoder<R> {
    /// Reads the three header packets and builds the session tables.
    pub fn new(source: R) -> Result<Self, VorbisError> {
        let mut reader = OggPacketReader::new(source);

        let mut next_header = |kind: HeaderKind| -> Result<Bytes, VorbisError> {
            reader
                .next_packet()?
                .ok_or(VorbisError::MissingHeader(kind))
        };

        let packet = next_header(HeaderKind::Identification)?;
        let identification = IdentificationHeader::try_from(packet.as_ref())?;

        log::debug!(
            "vorbis identification: channels={} rate={} block sizes={:?}",
            identification.channels,
            identification.sample_rate,
            identification.block_sizes
        );

        let packet = next_header(HeaderKind::Comment)?;
        let comments = CommentHeader::try_from(packet.as_ref())?;

        log::debug!(
            "vorbis comments: vendor={:?} count={}",
            comments.vendor,
            comments.comments.len()
        );

        let packet = next_header(HeaderKind::Setup)?;
        let session = VorbisSession::new(identification, comments, packet.as_ref())?;

        Ok(Self { reader, session })
    }

    pub fn session(&self) -> &VorbisSession {
        &self.session
    }

    /// Decodes the next audio packet. Returns `None` at the end of the
    /// stream.
    pub fn next_frame(&mut self) -> Result<Option<DecodedFrame>, VorbisError> {
        let Some(packet) = self.reader.next_packet()? else {
            return Ok(None);
        };

        Ok(Some(DecodedFrame::decode(&self.session, packet.as_ref())?))
    }

    pub fn into_inner(self) -> (OggPacketReader<R>, VorbisSession) {
        (self.reader, self.session)
    }
}
