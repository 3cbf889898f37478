#![no_main]

use evtrace_core::config::EvtraceConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(config) = EvtraceConfig::parse(content) {
            let _ = config.validate();
        }
    }
});
