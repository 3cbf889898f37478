//! 출력 렌더러 -- 히트를 출력 인코딩으로 변환
//!
//! - [`JsonLineRenderer`]: 레코드를 한 줄 JSON으로 그대로 출력
//! - [`TraceEventRenderer`]: 타임라인 시각화 도구용 trace-event JSON 배열
//!
//! 렌더러는 단일 소비자 태스크에서만 사용되며, 레코드 하나씩 순차 처리합니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::dispatch::Hit;
use crate::error::SearchError;

/// 출력 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// 줄 단위 JSON
    #[default]
    Json,
    /// trace-event 배열
    TraceEvent,
}

impl OutputMode {
    /// 이 모드의 렌더러를 생성합니다.
    pub fn renderer(self) -> Box<dyn Renderer> {
        match self {
            Self::Json => Box::new(JsonLineRenderer),
            Self::TraceEvent => Box::new(TraceEventRenderer::new()),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::TraceEvent => write!(f, "trace-event"),
        }
    }
}

impl FromStr for OutputMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "trace-event" => Ok(Self::TraceEvent),
            other => Err(SearchError::Config {
                field: "output".to_owned(),
                reason: format!("unknown output mode '{other}'"),
            }),
        }
    }
}

/// 상태를 가지는 단일 패스 렌더러
pub trait Renderer: Send {
    /// 히트 하나를 렌더링하여 `out`에 추가합니다.
    ///
    /// 렌더링한 레코드면 `true`, 형식이 맞지 않아 건너뛰었으면 `false`를 반환합니다.
    fn render(&mut self, hit: &Hit, out: &mut Vec<u8>) -> Result<bool, SearchError>;

    /// 스트림 끝 처리를 `out`에 추가합니다. 한 번만 호출됩니다.
    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), SearchError>;
}

/// 줄 단위 JSON 렌더러 (상태 없음)
///
/// 파싱된 레코드를 다시 직렬화하지 않고 원본 줄을 그대로 씁니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLineRenderer;

impl Renderer for JsonLineRenderer {
    fn render(&mut self, hit: &Hit, out: &mut Vec<u8>) -> Result<bool, SearchError> {
        out.extend_from_slice(hit.line.as_bytes());
        out.push(b'\n');
        Ok(true)
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> Result<(), SearchError> {
        Ok(())
    }
}

/// trace-event 렌더러 상태
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderState {
    /// 이벤트를 하나 이상 내보냈는지 여부
    pub emitted: bool,
    /// 기준 시각 (마이크로초)
    pub rebase: Option<i64>,
}

/// trace-event 렌더러
///
/// 레코드의 `evt` 객체를 이벤트로 변환합니다. 빈 결과는 `[]`로 출력됩니다.
#[derive(Debug, Default)]
pub struct TraceEventRenderer {
    state: RenderState,
}

impl TraceEventRenderer {
    /// 새 렌더러를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 상태를 반환합니다.
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    fn to_event(&mut self, hit: &Hit) -> Option<Value> {
        let mut ev: Map<String, Value> = hit.record.get("evt")?.as_object()?.clone();
        let rec = &hit.record;

        if let Some(pid) = rec.get("pid") {
            ev.insert("pid".to_owned(), pid.clone());
            ev.insert("tid".to_owned(), pid.clone());
        }

        let id = match rec.get("req_id") {
            Some(id) if !id.is_null() => id.clone(),
            _ => Value::String(format!("(no req_id {})", uuid::Uuid::new_v4())),
        };
        ev.insert("id".to_owned(), id);

        let micros = hit.time.timestamp_micros();
        let base = *self.state.rebase.get_or_insert(micros);
        ev.insert("ts".to_owned(), Value::from(micros - base));

        let origin = rec
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&hit.source)
            .to_owned();
        let name = match ev.get("name") {
            Some(Value::String(name)) => format!("{origin}.{name}"),
            Some(other) => format!("{origin}.{other}"),
            None => origin.clone(),
        };
        ev.insert("name".to_owned(), Value::String(name));

        let cat = match ev.get("cat") {
            Some(Value::String(cat)) if !cat.is_empty() => format!("{origin},{cat}"),
            _ => origin,
        };
        ev.insert("cat".to_owned(), Value::String(cat));

        if ev.get("args").is_none_or(Value::is_null) {
            ev.insert("args".to_owned(), Value::Object(Map::new()));
        }

        Some(Value::Object(ev))
    }
}

impl Renderer for TraceEventRenderer {
    fn render(&mut self, hit: &Hit, out: &mut Vec<u8>) -> Result<bool, SearchError> {
        let Some(event) = self.to_event(hit) else {
            warn!(source = %hit.source, host = %hit.host, "record has no 'evt' object, skipping");
            return Ok(false);
        };

        if self.state.emitted {
            out.extend_from_slice(b",\n");
        } else {
            out.push(b'[');
            self.state.emitted = true;
        }
        serde_json::to_writer(&mut *out, &event)?;
        Ok(true)
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), SearchError> {
        if !self.state.emitted {
            out.push(b'[');
        }
        out.extend_from_slice(b"]\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 2, 13, 20, 15, 3).unwrap()
    }

    fn hit(record: Value, time: DateTime<Utc>) -> Hit {
        Hit {
            line: record.to_string(),
            record,
            time,
            source: "vm-agent".to_owned(),
            host: "cn1".to_owned(),
        }
    }

    fn render_all(renderer: &mut dyn Renderer, hits: &[Hit]) -> String {
        let mut out = Vec::new();
        for h in hits {
            renderer.render(h, &mut out).unwrap();
        }
        renderer.finish(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn json_lines_one_record_per_line() {
        let hits = vec![
            hit(json!({"a": 1}), t0()),
            hit(json!({"b": "x"}), t0()),
        ];
        let out = render_all(&mut JsonLineRenderer, &hits);
        assert_eq!(out, "{\"a\":1}\n{\"b\":\"x\"}\n");
    }

    #[test]
    fn json_lines_keep_original_spelling() {
        let line = r#"{ "size": 1e3, "name": "\u0041" }"#;
        let mut h = hit(serde_json::from_str(line).unwrap(), t0());
        h.line = line.to_owned();
        let out = render_all(&mut JsonLineRenderer, &[h]);
        assert_eq!(out, format!("{line}\n"));
    }

    #[test]
    fn trace_event_frames_and_rebases() {
        let hits = vec![
            hit(
                json!({"name": "vmapi", "pid": 7, "req_id": "R1", "evt": {"name": "start", "ph": "B"}}),
                t0(),
            ),
            hit(
                json!({"name": "vmapi", "pid": 7, "req_id": "R1", "evt": {"name": "end", "ph": "E", "cat": "http"}}),
                t0() + Duration::milliseconds(1500),
            ),
        ];
        let out = render_all(&mut TraceEventRenderer::new(), &hits);
        assert!(out.starts_with('['));
        assert!(out.ends_with("]\n"));

        let events: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["ts"], 0);
        assert_eq!(events[1]["ts"], 1_500_000);
        assert_eq!(events[0]["name"], "vmapi.start");
        assert_eq!(events[0]["cat"], "vmapi");
        assert_eq!(events[1]["cat"], "vmapi,http");
        assert_eq!(events[0]["pid"], 7);
        assert_eq!(events[0]["tid"], 7);
        assert_eq!(events[0]["id"], "R1");
        assert_eq!(events[0]["args"], json!({}));
        assert!(out.contains("},\n{"));
    }

    #[test]
    fn trace_event_synthesizes_missing_req_id() {
        let hits = vec![hit(json!({"evt": {"name": "tick"}}), t0())];
        let out = render_all(&mut TraceEventRenderer::new(), &hits);
        let events: Vec<Value> = serde_json::from_str(&out).unwrap();
        let id = events[0]["id"].as_str().unwrap();
        assert!(id.starts_with("(no req_id "), "{id}");
        // 레코드 이름이 없으면 소스 이름을 사용
        assert_eq!(events[0]["name"], "vm-agent.tick");
    }

    #[test]
    fn trace_event_keeps_existing_args() {
        let hits = vec![hit(json!({"evt": {"name": "x", "args": {"k": 1}}}), t0())];
        let out = render_all(&mut TraceEventRenderer::new(), &hits);
        let events: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(events[0]["args"], json!({"k": 1}));
    }

    #[test]
    fn trace_event_empty_stream_is_valid_array() {
        let out = render_all(&mut TraceEventRenderer::new(), &[]);
        assert_eq!(out, "[]\n");
    }

    #[test]
    fn trace_event_skips_records_without_evt() {
        let mut renderer = TraceEventRenderer::new();
        let mut out = Vec::new();
        let rendered = renderer.render(&hit(json!({"msg": "hi"}), t0()), &mut out).unwrap();
        assert!(!rendered);
        assert!(out.is_empty());
        assert_eq!(renderer.state(), &RenderState::default());
    }

    #[test]
    fn output_mode_parses_names() {
        assert_eq!("json".parse::<OutputMode>().unwrap(), OutputMode::Json);
        assert_eq!("trace-event".parse::<OutputMode>().unwrap(), OutputMode::TraceEvent);
        assert!("xml".parse::<OutputMode>().is_err());
        assert_eq!(OutputMode::TraceEvent.to_string(), "trace-event");
    }
}
