use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// "OggS" read as a big-endian integer.
pub const PAGE_SIGNATURE: u32 = 0x4f67_6753;
pub const PAGE_HEADER_SIZE: usize = 27;
pub const MAX_SEGMENTS: usize = 255;

#[derive(Debug, Error)]
pub enum OggError {
    #[error("bad page signature {0:#010x}")]
    BadPageSignature(u32),
    #[error("unsupported page version {0}")]
    UnsupportedPageVersion(u8),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct OggPage {
    pub header_type: u8,
    pub granule_position: u64,
    pub serial: u32,
    pub sequence: u32,
    pub checksum: u32,
    /// Lacing values, one per segment.
    pub segments: Vec<u8>,
    pub payload: Bytes,
}

impl OggPage {
    pub const CONTINUED: u8 = 0x01;
    pub const FIRST: u8 = 0x02;
    pub const LAST: u8 = 0x04;

    /// Reads one page. Returns `None` when the source ends exactly where a new
    /// page would start. A source ending inside a page is an
    /// `UnexpectedEof` error.
    pub fn read<R: Read>(source: &mut R) -> Result<Option<Self>, OggError> {
        let mut header = [0u8; PAGE_HEADER_SIZE];
        if fill(source, &mut header)? == 0 {
            return Ok(None);
        }

        let mut bytes = &header[..];

        let signature = bytes.get_u32();
        if signature != PAGE_SIGNATURE {
            return Err(OggError::BadPageSignature(signature));
        }

        let version = bytes.get_u8();
        if version != 0 {
            return Err(OggError::UnsupportedPageVersion(version));
        }

        let header_type = bytes.get_u8();
        let granule_position = bytes.get_u64_le();
        let serial = bytes.get_u32_le();
        let sequence = bytes.get_u32_le();
        let checksum = bytes.get_u32_le();
        let segment_count = bytes.get_u8() as usize;

        let mut segments = vec![0u8; segment_count];
        source.read_exact(&mut segments)?;

        let size = segments.iter().map(|&len| len as usize).sum();
        let mut payload = BytesMut::zeroed(size);
        source.read_exact(&mut payload)?;

        Ok(Some(Self {
            header_type,
            granule_position,
            serial,
            sequence,
            checksum,
            segments,
            payload: payload.freeze(),
        }))
    }

    pub fn is_continued(&self) -> bool {
        self.header_type & Self::CONTINUED != 0
    }

    pub fn is_first(&self) -> bool {
        self.header_type & Self::FIRST != 0
    }

    pub fn is_last(&self) -> bool {
        self.header_type & Self::LAST != 0
    }
}

/// Reads until `buf` is full or the source ends, returning the bytes read.
/// Ending after some but not all bytes fails with `UnexpectedEof`.
fn fill<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    if filled > 0 && filled < buf.len() {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }

    Ok(filled)
}

/// Pulls pages from a byte source and hands out either whole logical packets
/// (`next_packet`) or the raw concatenated page payloads (`Read`).
pub struct OggPacketReader<R> {
    source: R,
    page: Option<OggPage>,
    /// End offset of each segment of the current page within its payload.
    ends: Vec<usize>,
    segment: usize,
    offset: usize,
    partial: BytesMut,
    finished: bool,
}

impl<R: Read> OggPacketReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            page: None,
            ends: Vec::with_capacity(MAX_SEGMENTS),
            segment: 0,
            offset: 0,
            partial: BytesMut::new(),
            finished: false,
        }
    }

    /// Reads the next page straight from the source, bypassing packet
    /// assembly.
    pub fn next_page(&mut self) -> Result<Option<OggPage>, OggError> {
        OggPage::read(&mut self.source)
    }

    /// Replaces the current page with the next one. Returns `false` once the
    /// stream is over.
    fn advance_page(&mut self) -> Result<bool, OggError> {
        if self.finished {
            return Ok(false);
        }

        let Some(page) = self.next_page()? else {
            self.finished = true;
            return Ok(false);
        };

        if !page.is_continued() && !self.partial.is_empty() {
            log::debug!(
                "dropping {} bytes of an unterminated packet at page {}",
                self.partial.len(),
                page.sequence
            );

            self.partial.clear();
        }

        self.ends.clear();
        self.ends.extend(page.segments.iter().scan(0, |end, &len| {
            *end += len as usize;
            Some(*end)
        }));

        self.segment = 0;
        self.offset = 0;
        self.finished = page.is_last();
        self.page = Some(page);

        Ok(true)
    }

    /// Reassembles the next logical packet. A segment shorter than 255 bytes
    /// ends a packet; a packet whose last segment is 255 bytes long goes on
    /// in the next page.
    pub fn next_packet(&mut self) -> Result<Option<Bytes>, OggError> {
        loop {
            if let Some(page) = &self.page {
                while self.segment < self.ends.len() {
                    let end = self.ends[self.segment];
                    let len = page.segments[self.segment];

                    self.partial
                        .extend_from_slice(&page.payload[self.offset..end]);
                    self.offset = end;
                    self.segment += 1;

                    if len < 255 {
                        return Ok(Some(self.partial.split().freeze()));
                    }
                }
            }

            if !self.advance_page()? {
                return Ok(None);
            }
        }
    }
}

impl<R: Read> Read for OggPacketReader<R> {
    /// Copies page payload bytes, pulling new pages as needed and stopping
    /// after the last page of the stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut copied = 0;

        while copied < buf.len() {
            let available = match &self.page {
                Some(page) => &page.payload[self.offset..],
                None => &[][..],
            };

            if available.is_empty() {
                let more = self.advance_page().map_err(|e| match e {
                    OggError::Io(e) => e,
                    e => io::Error::new(io::ErrorKind::InvalidData, e),
                })?;

                if more {
                    continue;
                }

                break;
            }

            let count = available.len().min(buf.len() - copied);
            buf[copied..copied + count].copy_from_slice(&available[..count]);
            copied += count;
            self.offset += count;

            while self.segment < self.ends.len() && self.ends[self.segment] <= self.offset {
                self.segment += 1;
            }
        }

        Ok(copied)
    }
}
