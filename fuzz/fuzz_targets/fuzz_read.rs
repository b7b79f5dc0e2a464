#![no_main]
use libfuzzer_sys::fuzz_target;
use tamloxide::reader::{read_document_from_slice, ReadOptions};

fuzz_target!(|data: &[u8]| {
    let opts = ReadOptions::default().max_depth(256);
    let _ = read_document_from_slice(data, &opts);
});
