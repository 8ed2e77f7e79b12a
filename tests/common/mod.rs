#![allow(dead_code)]

use ogg::{PacketWriteEndInfo, PacketWriter};

pub const SERIAL: u32 = 0x5eed;

/// Packs values low bit first, the order the decoder reads them.
#[derive(Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, value: u32, bits: u32) -> &mut Self {
        for i in 0..bits {
            if self.bit == 0 {
                self.bytes.push(0);
            }

            let last = self.bytes.len() - 1;
            self.bytes[last] |= (((value >> i) & 1) as u8) << self.bit;
            self.bit = (self.bit + 1) % 8;
        }

        self
    }

    /// Writes a Huffman codeword in the order the decoder reads it.
    pub fn write_code(&mut self, code: &str) -> &mut Self {
        for c in code.chars() {
            self.write((c == '1') as u32, 1);
        }

        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

fn preamble(kind: u8) -> Vec<u8> {
    let mut bytes = vec![kind];
    bytes.extend_from_slice(b"vorbis");
    bytes
}

pub fn identification(channels: u8, sample_rate: u32, block_sizes: u8) -> Vec<u8> {
    let mut bytes = preamble(1);
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.push(channels);
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&96000i32.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.push(block_sizes);
    bytes.push(1);
    bytes
}

pub fn comments(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut bytes = preamble(3);
    bytes.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    bytes.extend_from_slice(vendor.as_bytes());
    bytes.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for comment in comments {
        bytes.extend_from_slice(&(comment.len() as u32).to_le_bytes());
        bytes.extend_from_slice(comment.as_bytes());
    }
    bytes.push(1);
    bytes
}

fn codebook_header(w: &mut BitWriter, dimensions: u32, lengths: &[u32]) {
    w.write(0x564342, 24)
        .write(dimensions, 16)
        .write(lengths.len() as u32, 24);

    // neither ordered nor sparse
    w.write(0, 1).write(0, 1);
    for &len in lengths {
        w.write(len - 1, 5);
    }
}

/// Type fields and flags of the setup header that tests may corrupt.
#[derive(Clone, Copy)]
pub struct SetupFields {
    pub time_type: u32,
    pub floor_type: u32,
    pub mapping_type: u32,
    pub framing: u32,
}

impl Default for SetupFields {
    fn default() -> Self {
        Self {
            time_type: 0,
            floor_type: 1,
            mapping_type: 0,
            framing: 1,
        }
    }
}

pub fn setup(floor_type: u32) -> Vec<u8> {
    setup_with(SetupFields {
        floor_type,
        ..Default::default()
    })
}

/// Setup header of a one channel stream:
///
/// - book 0: two one-bit scalar entries
/// - book 1: two one-bit entries of tessellated pairs `[1, 2]` and `[3, 4]`
/// - floor 0: multiplier 2, points at x = 0, 128 and 64, the middle one
///   coded with book 0
/// - residue 0: type 1 over `0..8` in partitions of 4, classification 1
///   decoding with book 1
/// - mapping 0: one submap, no coupling
/// - modes: short and long, both on mapping 0
pub fn setup_with(fields: SetupFields) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write(5, 8);
    for &byte in b"vorbis" {
        w.write(byte as u32, 8);
    }

    // two codebooks
    w.write(1, 8);

    codebook_header(&mut w, 1, &[1, 1]);
    w.write(0, 4);

    codebook_header(&mut w, 2, &[1, 1]);
    w.write(2, 4);
    // minimum 0.0, delta 1.0, low half first
    w.write(0, 16).write(0, 16);
    w.write(0x0001, 16).write(0x6280, 16);
    // three bit multiplicands, no sequence
    w.write(2, 4).write(0, 1);
    for value in [1, 2, 3, 4] {
        w.write(value, 3);
    }

    // one time domain placeholder
    w.write(0, 6).write(fields.time_type, 16);

    // one floor
    w.write(0, 6).write(fields.floor_type, 16);
    w.write(1, 5).write(0, 4);
    // class 0: one dimension, no subclasses, book 0 stored off by one
    w.write(0, 3).write(0, 2).write(1, 8);
    w.write(1, 2).write(7, 4).write(64, 7);

    // one residue
    w.write(0, 6).write(1, 16);
    w.write(0, 24).write(8, 24).write(3, 24).write(1, 6).write(0, 8);
    w.write(0, 3).write(0, 1);
    w.write(1, 3).write(0, 1);
    w.write(1, 8);

    // one mapping
    w.write(0, 6).write(fields.mapping_type, 16);
    w.write(0, 1).write(0, 1).write(0, 2);
    w.write(0, 8).write(0, 8).write(0, 8);

    // two modes
    w.write(1, 6);
    for long_block in [0, 1] {
        w.write(long_block, 1).write(0, 16).write(0, 16).write(0, 8);
    }

    // framing
    w.write(fields.framing, 1);
    w.finish()
}

/// Lays the packets out as an Ogg stream, each header on its own page.
pub fn ogg_stream(headers: &[Vec<u8>], audio: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = Vec::new();

    {
        let mut writer = PacketWriter::new(&mut bytes);

        for (i, packet) in headers.iter().enumerate() {
            let info = if audio.is_empty() && i + 1 == headers.len() {
                PacketWriteEndInfo::EndStream
            } else {
                PacketWriteEndInfo::EndPage
            };

            writer
                .write_packet(packet.clone(), SERIAL, info, 0)
                .unwrap();
        }

        for (i, packet) in audio.iter().enumerate() {
            let info = if i + 1 == audio.len() {
                PacketWriteEndInfo::EndStream
            } else {
                PacketWriteEndInfo::NormalPacket
            };

            writer
                .write_packet(packet.clone(), SERIAL, info, (i as u64 + 1) * 128)
                .unwrap();
        }
    }

    bytes
}
