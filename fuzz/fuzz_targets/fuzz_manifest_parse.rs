#![no_main]
use infra_policy::{CompilerConfig, PolicyCompiler, PolicyManifest};
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes must never panic the manifest reader or the rebuild
fuzz_target!(|data: &[u8]| {
    let text = match std::str::from_utf8(data) {
        Ok(t) => t,
        Err(_) => return,
    };

    let manifest = match PolicyManifest::from_json(text) {
        Ok(m) => m,
        Err(_) => return,
    };

    let _ = manifest.fingerprint();
    if let Ok(compiler) = PolicyCompiler::from_manifest(&manifest, CompilerConfig::default()) {
        assert!(compiler.verify().is_ok());
    }
});
