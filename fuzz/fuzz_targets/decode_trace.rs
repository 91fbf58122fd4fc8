#![no_main]
use cprval::{CodecConfig, Schema};
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

static SCHEMA: OnceLock<Schema> = OnceLock::new();

const LIMIT: usize = 1 << 24;

fuzz_target!(|data: &[u8]| {
    let schema = SCHEMA.get_or_init(|| {
        Schema::from_json(include_str!("../../tests/data/trace.json")).unwrap()
    });
    let Some((&flags, data)) = data.split_first() else {
        return;
    };
    let config = CodecConfig {
        leb128_enabled: flags & 1 == 0,
        string_pool_enabled: flags & 2 == 0,
    };
    if let Ok(Some(value)) = schema.decode_with_limit(data, &config, LIMIT) {
        // Anything that decodes must survive a round trip
        let enc = schema.encode(&value, &config).unwrap();
        let dec = schema.decode_with_limit(&enc, &config, LIMIT).unwrap();
        assert_eq!(dec, Some(value));
    }
});
