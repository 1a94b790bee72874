use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSONL diagnostics sink. One object per line; counters are folded into a
/// `debug.summary` record on demand.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

/// A value in a debug event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Field<'a> {
    Str(&'a str),
    Num(f64),
    Int(i64),
    Bool(bool),
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: HashMap::new(),
            })),
        })
    }

    pub(crate) fn event(&self, kind: &str, fields: &[(&str, Field<'_>)]) {
        self.log_json(&event_json(kind, fields));
        self.increment(kind, 1);
    }

    pub fn log_json(&self, json: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let counts = counters
                .iter()
                .map(|(key, value)| format!("\"{}\":{}", json_escape(key), value))
                .collect::<Vec<_>>()
                .join(",");
            let json = format!(
                "{{\"type\":\"debug.summary\",\"context\":\"{}\",\"counts\":{{{}}}}}",
                json_escape(context),
                counts
            );
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

fn event_json(kind: &str, fields: &[(&str, Field<'_>)]) -> String {
    let mut out = format!("{{\"type\":\"{}\"", json_escape(kind));
    for (key, value) in fields {
        out.push_str(&format!(",\"{}\":", json_escape(key)));
        match value {
            Field::Str(s) => out.push_str(&format!("\"{}\"", json_escape(s))),
            Field::Num(n) if n.is_finite() => out.push_str(&format!("{:.3}", n)),
            Field::Num(_) => out.push_str("null"),
            Field::Int(i) => out.push_str(&i.to_string()),
            Field::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        }
    }
    out.push('}');
    out
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_control_characters() {
        assert_eq!(json_escape("a\"b\\c\nd\u{1}"), "a\\\"b\\\\c\\nd\\u0001");
    }

    #[test]
    fn events_render_typed_fields() {
        let json = event_json(
            "card.placed",
            &[
                ("title", Field::Str("Pano")),
                ("x", Field::Num(8.0)),
                ("page", Field::Int(2)),
                ("overflow", Field::Bool(false)),
            ],
        );
        assert_eq!(
            json,
            "{\"type\":\"card.placed\",\"title\":\"Pano\",\"x\":8.000,\"page\":2,\"overflow\":false}"
        );
    }

    #[test]
    fn summary_lists_counters_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        logger.event("layout.overflow", &[]);
        logger.increment("card.placed", 3);
        logger.emit_summary("pdf");
        logger.flush();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "{\"type\":\"layout.overflow\"}");
        assert_eq!(
            lines[1],
            "{\"type\":\"debug.summary\",\"context\":\"pdf\",\"counts\":{\"card.placed\":3,\"layout.overflow\":1}}"
        );
    }
}
