//! Run progress reporting.
//!
//! Reports which product code is being processed and how each one ended,
//! so long runs show where they are. Progress goes to **stderr** so the
//! summary on stdout stays parseable for scripts.

use std::io::Write;

use crate::pipeline::Stage;

/// A single progress event for a run.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Processing of code `n` of `total` has started.
    Started { code: String, n: u64, total: u64 },
    /// The code was committed.
    Succeeded { code: String },
    /// The code was rejected or rolled back at `stage`.
    Failed { code: String, stage: Stage },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "run  1,234 / 5,000  3017620422003".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Started { code, n, total } => format!(
                "run  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                code
            ),
            ProgressEvent::Succeeded { code } => format!("run  {}  ok\n", code),
            ProgressEvent::Failed { code, stage } => {
                format!("run  {}  failed at {}\n", code, stage)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Started { code, n, total } => serde_json::json!({
                "event": "progress",
                "code": code,
                "phase": "started",
                "n": n,
                "total": total
            }),
            ProgressEvent::Succeeded { code } => serde_json::json!({
                "event": "progress",
                "code": code,
                "phase": "succeeded"
            }),
            ProgressEvent::Failed { code, stage } => serde_json::json!({
                "event": "progress",
                "code": code,
                "phase": "failed",
                "stage": stage.to_string()
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_mode_parse() {
        assert_eq!(ProgressMode::parse("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::parse("off"), Some(ProgressMode::Off));
        assert_eq!(ProgressMode::parse("loud"), None);
    }
}
