#![no_main]

use herald_commands::{parse_command_manifest, COMMAND_MANIFEST_SCHEMA_VERSION};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(manifest) = parse_command_manifest(&raw) {
        assert_eq!(manifest.schema_version, COMMAND_MANIFEST_SCHEMA_VERSION);
    }
});
