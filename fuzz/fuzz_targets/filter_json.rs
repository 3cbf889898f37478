#![no_main]

use evtrace_search::{Filter, compile, filter::shell_quote};
use libfuzzer_sys::fuzz_target;

// 임의 JSON 필터 정의 -> 컴파일 -> 파이프라인/재검증 경로
fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Ok(filter) = Filter::from_json(&value) else {
        return;
    };
    if let Ok(chain) = compile(&[filter]) {
        let _ = chain.pipeline("/usr/bin/egrep", "/var/log/x.log");
        let _ = chain.accepts(&value);
        for pattern in chain.patterns() {
            let quoted = shell_quote(pattern);
            assert!(quoted.starts_with('\'') && quoted.ends_with('\''));
        }
    }
});
