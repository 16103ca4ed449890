#![no_main]

mod utils;

use std::io::Write;

use libfuzzer_sys::fuzz_target;
use objcache_result::{Reader, ResultDumper, ResultExtractor, RESULT_MAGIC, RESULT_VERSION};
use objcache_storage::{ContainerWriter, WriteCompression};

fn run_input(input: &[u8]) {
    let mode = input.first().copied().unwrap_or(0);
    let payload = input.get(1..).unwrap_or(&[]);

    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let result_path = dir.path().join("fuzzR");

    if mode & 1 == 0 {
        // Raw bytes: exercises header validation.
        std::fs::write(&result_path, input).expect("failed to write result bytes");
    } else {
        // Valid header and hash around arbitrary payload bytes, so every input
        // gets past the container checks and into entry decoding.
        let mut writer = ContainerWriter::create(
            &result_path,
            RESULT_MAGIC,
            RESULT_VERSION,
            WriteCompression::None,
        )
        .expect("failed to create container");
        writer.write_all(payload).expect("failed to write payload");
        writer.finish().expect("failed to finish container");

        // Give raw references something to point at.
        std::fs::write(dir.path().join("fuzz0W"), payload).expect("failed to write raw file");
    }

    let reader = Reader::new(&result_path);
    let _ = reader.read(&mut ResultDumper::new());
    let _ = reader.read(&mut ResultExtractor::new(dir.path().join("out")));
}

fuzz_target!(|data: &[u8]| {
    run_input(utils::truncate(data));
});
