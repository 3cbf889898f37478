#![no_main]

use evtrace_search::dispatch::record_time;
use evtrace_search::{Hit, JsonLineRenderer, Renderer, TraceEventRenderer};
use libfuzzer_sys::fuzz_target;

// 로그 한 줄 -> 타임스탬프 추출 -> 두 렌더러
fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(record) = serde_json::from_str::<serde_json::Value>(line) else {
        return;
    };
    let Some(time) = record_time(&record, "time") else {
        return;
    };
    let hit = Hit {
        line: line.to_owned(),
        record,
        time,
        source: "fuzz".to_owned(),
        host: "fuzz-host".to_owned(),
    };

    let mut out = Vec::new();
    let mut trace = TraceEventRenderer::new();
    let _ = trace.render(&hit, &mut out);
    let _ = trace.render(&hit, &mut out);
    if trace.finish(&mut out).is_ok() {
        assert!(serde_json::from_slice::<serde_json::Value>(&out).is_ok());
    }

    let mut out = Vec::new();
    let _ = JsonLineRenderer.render(&hit, &mut out);
});
