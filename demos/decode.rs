use std::{env, fs::File, io::BufReader};

use vorbis_spectra::VorbisDecoder;

fn main() {
    let path = env::args().nth(1).unwrap_or_else(|| "./demo.ogg".to_string());
    let file = File::open(path).unwrap();

    let mut decoder = VorbisDecoder::new(BufReader::new(file)).unwrap();

    let session = decoder.session();
    println!("vorbis identification = {:#?}", session.identification);
    println!("vorbis comments = {:#?}", session.comments);
    println!(
        "vorbis setup = codebooks: {}, floors: {}, residues: {}, mappings: {}, modes: {}",
        session.codebooks.len(),
        session.floors.len(),
        session.residues.len(),
        session.mappings.len(),
        session.modes.len()
    );

    let mut frames = 0;
    while let Some(frame) = decoder.next_frame().unwrap() {
        let floors = frame.channels.iter().filter(|c| c.floor.is_some()).count();
        println!(
            "frame {frames}: mode = {}, block size = {}, channels with floor = {floors}/{}",
            frame.mode,
            frame.block_size,
            frame.channels.len()
        );

        frames += 1;
    }

    println!("decoded {frames} frames");
}
