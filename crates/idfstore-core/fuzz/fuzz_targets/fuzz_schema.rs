#![no_main]
use idfstore_core::catalog::SchemaCatalog;
use libfuzzer_sys::fuzz_target;

// Schema text must either parse or fail with an error; never panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = SchemaCatalog::parse(text);
    }
});
