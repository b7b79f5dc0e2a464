#![no_main]
use libfuzzer_sys::fuzz_target;
use tamloxide::reader::{read_document_from_slice, ReadOptions};
use tamloxide::writer::{write_document_to_vec, WriteOptions};

fuzz_target!(|data: &[u8]| {
    let ropts = ReadOptions::default().max_depth(256);
    // Anything that decodes must re-encode, and re-encode to the same body.
    if let Ok(doc) = read_document_from_slice(data, &ropts) {
        let wopts = WriteOptions::default()
            .version(doc.header.version)
            .max_depth(256);
        let bytes = write_document_to_vec(&doc.tree, doc.root, &wopts)
            .expect("decoded document should re-encode");
        let again = read_document_from_slice(&bytes, &ropts).expect("re-encoded document should decode");
        let bytes2 = write_document_to_vec(&again.tree, again.root, &wopts)
            .expect("second encode");
        assert_eq!(bytes, bytes2);
    }
});
