#![no_main]
use em540_exporter::payload::RegisterBlock;
use em540_exporter::register_map::EM540_POLL_GROUPS;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Big-endian register stream
    let words: Vec<u16> = data
        .chunks_exact(2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .collect();
    let block = RegisterBlock::new(0, words);

    let mut cursor = block.cursor();
    let _ = cursor.decode_i32();
    let _ = cursor.decode_i64();
    let _ = cursor.decode_fixed_string(7);
    let _ = cursor.decode_i16();

    for group in &EM540_POLL_GROUPS {
        let _ = group.decode(&block);
    }
});
