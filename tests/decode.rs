mod common;

use common::{BitWriter, SetupFields, comments, identification, ogg_stream, setup, setup_with};
use vorbis_spectra::{
    HeaderError, HeaderKind, OggPacketReader, SetupError, VorbisDecoder, VorbisError,
    vorbis::floor::FLOOR1_INVERSE_DB_TABLE,
};

fn headers() -> Vec<Vec<u8>> {
    vec![
        identification(1, 22050, 0xb8),
        comments("spectra tests", &["TITLE=sweep", "ARTIST=nobody"]),
        setup(1),
    ]
}

fn short_frame() -> Vec<u8> {
    BitWriter::new()
        .write(0, 1)
        .write(0, 1)
        // floor from 20 up to 40, the middle point predicted
        .write(1, 1)
        .write(20, 7)
        .write(40, 7)
        .write_code("0")
        // partition 0 in classification 1, partition 1 silent
        .write_code("1")
        .write_code("1")
        .write_code("0")
        .write_code("0")
        .finish()
}

fn long_frame() -> Vec<u8> {
    BitWriter::new()
        .write(0, 1)
        .write(1, 1)
        .write(1, 1)
        .write(1, 1)
        .write(0, 1)
        .finish()
}

#[test]
fn parses_headers() {
    let stream = ogg_stream(&headers(), &[]);
    let decoder = VorbisDecoder::new(stream.as_slice()).unwrap();
    let session = decoder.session();

    assert_eq!(session.channels(), 1);
    assert_eq!(session.sample_rate(), 22050);
    assert_eq!(session.identification.block_sizes, [256, 2048]);
    assert_eq!(session.identification.bitrate_nominal, 96000);
    assert_eq!(session.comments.vendor, "spectra tests");
    assert_eq!(session.comments.comments, vec!["TITLE=sweep", "ARTIST=nobody"]);

    assert_eq!(session.codebooks.len(), 2);
    assert_eq!(session.floors.len(), 1);
    assert_eq!(session.floors[0].x_list, vec![0, 128, 64]);
    assert_eq!(session.residues.len(), 1);
    assert_eq!(session.mappings.len(), 1);
    assert_eq!(session.modes.len(), 2);
    assert_eq!(session.mode_bits, 1);
}

#[test]
fn decodes_audio_packets() {
    let stream = ogg_stream(&headers(), &[short_frame(), long_frame()]);
    let mut decoder = VorbisDecoder::new(stream.as_slice()).unwrap();

    let frame = decoder.next_frame().unwrap().unwrap();
    assert_eq!(frame.block_size, 256);
    assert!(!frame.long_block);
    assert_eq!(frame.channels.len(), 1);

    let channel = &frame.channels[0];
    let floor = channel.floor.as_ref().unwrap();
    assert_eq!(floor.len(), 128);
    // multiplier 2: the line runs from 40 to 80 over 128 steps
    assert_eq!(floor[0], FLOOR1_INVERSE_DB_TABLE[40]);
    assert_eq!(floor[64], FLOOR1_INVERSE_DB_TABLE[60]);
    assert_eq!(floor[127], FLOOR1_INVERSE_DB_TABLE[79]);

    assert_eq!(channel.residue.len(), 128);
    assert_eq!(&channel.residue[..4], &[3.0, 4.0, 1.0, 2.0]);
    assert!(channel.residue[4..].iter().all(|&v| v == 0.0));

    let frame = decoder.next_frame().unwrap().unwrap();
    assert_eq!(frame.block_size, 2048);
    assert!(frame.long_block);
    assert!(frame.previous_window);
    assert!(frame.next_window);
    assert_eq!(frame.channels[0].floor, None);
    assert_eq!(frame.channels[0].residue, vec![0.0; 1024]);

    assert!(decoder.next_frame().unwrap().is_none());
}

#[test]
fn rejects_corrupt_headers() {
    let mut ident = identification(1, 22050, 0xb8);
    ident[2] = b'O';
    let stream = ogg_stream(&[ident, headers()[1].clone(), setup(1)], &[]);
    assert!(matches!(
        VorbisDecoder::new(stream.as_slice()),
        Err(VorbisError::Header(HeaderError::CorruptHeaderMagic))
    ));

    let stream = ogg_stream(
        &[identification(1, 22050, 0xbf), headers()[1].clone(), setup(1)],
        &[],
    );
    assert!(matches!(
        VorbisDecoder::new(stream.as_slice()),
        Err(VorbisError::Header(HeaderError::InvalidBlockSize(0xbf)))
    ));

    for channels in [0, 9] {
        let stream = ogg_stream(
            &[identification(channels, 22050, 0xb8), headers()[1].clone(), setup(1)],
            &[],
        );
        assert!(matches!(
            VorbisDecoder::new(stream.as_slice()),
            Err(VorbisError::Header(HeaderError::UnsupportedChannelCount(c))) if c == channels
        ));
    }

    let mut headers = headers();
    headers[2] = setup(0);
    let stream = ogg_stream(&headers, &[]);
    assert!(matches!(
        VorbisDecoder::new(stream.as_slice()),
        Err(VorbisError::Setup(SetupError::UnsupportedFloorType(0)))
    ));
}

#[test]
fn rejects_unsupported_setup_fields() {
    let cases = [
        (
            SetupFields { time_type: 1, ..Default::default() },
            SetupError::UnsupportedTimeDomainTransform(1),
        ),
        (
            SetupFields { mapping_type: 1, ..Default::default() },
            SetupError::UnsupportedMappingType(1),
        ),
        (
            SetupFields { framing: 0, ..Default::default() },
            SetupError::MissingFramingBit,
        ),
    ];

    for (fields, expected) in cases {
        let mut headers = headers();
        headers[2] = setup_with(fields);
        let stream = ogg_stream(&headers, &[]);

        match VorbisDecoder::new(stream.as_slice()) {
            Err(VorbisError::Setup(e)) => assert_eq!(e, expected),
            other => panic!("expected {expected:?}, got {:?}", other.err()),
        }
    }
}

#[test]
fn rejects_headers_out_of_order() {
    let headers = headers();

    let stream = ogg_stream(&[headers[0].clone(), headers[2].clone()], &[]);
    assert!(matches!(
        VorbisDecoder::new(stream.as_slice()),
        Err(VorbisError::Header(HeaderError::WrongHeaderType {
            expected: HeaderKind::Comment,
            found: 5
        }))
    ));

    let stream = ogg_stream(&headers[..2], &[]);
    assert!(matches!(
        VorbisDecoder::new(stream.as_slice()),
        Err(VorbisError::MissingHeader(HeaderKind::Setup))
    ));
}

#[test]
fn packet_reader_matches_written_packets() {
    let long_packet: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
    let stream = ogg_stream(&headers(), &[long_packet.clone(), vec![], short_frame()]);

    let mut reader = OggPacketReader::new(stream.as_slice());
    for header in headers() {
        assert_eq!(reader.next_packet().unwrap().unwrap().as_ref(), header.as_slice());
    }

    assert_eq!(reader.next_packet().unwrap().unwrap().as_ref(), long_packet.as_slice());
    assert!(reader.next_packet().unwrap().unwrap().is_empty());
    assert_eq!(reader.next_packet().unwrap().unwrap().as_ref(), short_frame().as_slice());
    assert!(reader.next_packet().unwrap().is_none());
}

#[test]
fn first_page_flags() {
    let stream = ogg_stream(&headers(), &[short_frame()]);
    let mut reader = OggPacketReader::new(stream.as_slice());

    let page = reader.next_page().unwrap().unwrap();
    assert!(page.is_first());
    assert_eq!(page.serial, common::SERIAL);
    assert_eq!(page.sequence, 0);
    assert_eq!(page.payload.as_ref(), headers()[0].as_slice());
}
