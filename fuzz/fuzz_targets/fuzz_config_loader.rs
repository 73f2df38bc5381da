#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = shuttle_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let _ = shuttle_core::ShuttleConfig::from_config(&cfg, None);
        }
    }
});
