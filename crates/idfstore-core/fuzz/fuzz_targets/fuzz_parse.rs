#![no_main]
use idfstore_core::config::StoreConfig;
use idfstore_core::store::Store;
use idfstore_core::test_utils::*;
use libfuzzer_sys::fuzz_target;

// Parse arbitrary text as an instance file. Must never panic; anything that
// loads must print to text that loads back to the same rendering.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(store) = Store::parse(text, shared_catalog(), StoreConfig::default()) else {
        return;
    };
    assert!(store.index_violations().is_empty());
    let printed = store.print();
    let again = Store::parse(&printed, shared_catalog(), StoreConfig::default())
        .expect("printed store must parse");
    assert_eq!(again.print(), printed);
});
