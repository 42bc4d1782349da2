#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary TOML must either fail to parse or validate without panicking.
    if let Ok(cfg) = proxi_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // Accepted configs keep the invariants the core relies on.
            assert!(cfg.calibration.compensation_step > 0);
            assert!(cfg.calibration.compensation_start < cfg.calibration.compensation_end);
            assert!(cfg.wizard.tick_ms >= cfg.wizard.poll_ms);
            assert!(!cfg.store.namespace.is_empty());
        }
        let _ = cfg.presence_policy();
    }
});
