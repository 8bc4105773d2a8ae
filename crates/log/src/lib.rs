//! Process-wide leveled logger for the wallet ledger crates.
//!
//! Records are written to stderr as text or JSON lines and can optionally be
//! captured into a bounded in-memory ring so tests and embedders can inspect
//! what the ledger reported.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Text = 0,
    Json = 1,
}

impl Format {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LogConfig {
    pub level: Level,
    pub format: Format,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Text,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Builds a config from user-facing strings, falling back to the defaults
    /// for anything that does not parse.
    pub fn from_strs(level: Option<&str>, format: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            level: level.and_then(Level::parse).unwrap_or(defaults.level),
            format: format.and_then(Format::parse).unwrap_or(defaults.format),
            timestamps: defaults.timestamps,
        }
    }
}

/// Extra key/value context attached to a record.
pub type Fields<'a> = &'a [(&'static str, String)];

#[derive(Clone, Debug)]
pub struct CapturedLog {
    pub ts_ms: u64,
    pub level: Level,
    pub target: &'static str,
    pub msg: String,
    pub fields: Vec<(&'static str, String)>,
}

impl CapturedLog {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static LOG_FORMAT: AtomicU8 = AtomicU8::new(Format::Text as u8);
static LOG_TIMESTAMPS: AtomicBool = AtomicBool::new(true);
static LOG_STDERR_ENABLED: AtomicBool = AtomicBool::new(true);
static CAPTURE_ENABLED: AtomicBool = AtomicBool::new(false);
static CAPTURE: OnceLock<Mutex<CaptureRing>> = OnceLock::new();

/// Bounded FIFO of the most recent records.
struct CaptureRing {
    capacity: usize,
    entries: VecDeque<CapturedLog>,
}

impl CaptureRing {
    fn push(&mut self, entry: CapturedLog) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn tail(&self, limit: usize) -> Vec<CapturedLog> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

fn with_capture<T>(f: impl FnOnce(&mut CaptureRing) -> T) -> Option<T> {
    let ring = CAPTURE.get()?;
    let mut guard = ring.lock().ok()?;
    Some(f(&mut guard))
}

pub fn init(config: LogConfig) {
    LOG_LEVEL.store(config.level as u8, Ordering::Relaxed);
    LOG_FORMAT.store(config.format as u8, Ordering::Relaxed);
    LOG_TIMESTAMPS.store(config.timestamps, Ordering::Relaxed);
}

pub fn current_level() -> Level {
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn set_stderr_enabled(enabled: bool) {
    LOG_STDERR_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Starts keeping the last `capacity` records in memory. Zero turns capture off.
pub fn enable_capture(capacity: usize) {
    if capacity == 0 {
        disable_capture();
        return;
    }
    CAPTURE.get_or_init(|| {
        Mutex::new(CaptureRing {
            capacity,
            entries: VecDeque::new(),
        })
    });
    with_capture(|ring| ring.capacity = capacity);
    CAPTURE_ENABLED.store(true, Ordering::Relaxed);
}

pub fn disable_capture() {
    CAPTURE_ENABLED.store(false, Ordering::Relaxed);
}

pub fn clear_captured_logs() {
    with_capture(|ring| ring.entries.clear());
}

pub fn capture_snapshot(limit: usize) -> Vec<CapturedLog> {
    with_capture(|ring| ring.tail(limit)).unwrap_or_default()
}

pub fn enabled(level: Level) -> bool {
    level as u8 <= LOG_LEVEL.load(Ordering::Relaxed)
}

pub fn log(
    level: Level,
    target: &'static str,
    file: &'static str,
    line: u32,
    args: fmt::Arguments<'_>,
) {
    log_with_fields(level, target, file, line, args, &[]);
}

pub fn log_with_fields(
    level: Level,
    target: &'static str,
    file: &'static str,
    line: u32,
    args: fmt::Arguments<'_>,
    fields: Fields<'_>,
) {
    if !enabled(level) {
        return;
    }
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let record = CapturedLog {
        ts_ms: since_epoch.as_millis().try_into().unwrap_or(u64::MAX),
        level,
        target,
        msg: args.to_string(),
        fields: fields.to_vec(),
    };

    if LOG_STDERR_ENABLED.load(Ordering::Relaxed) {
        let rendered = match LOG_FORMAT.load(Ordering::Relaxed) {
            1 => render_json(&record, file, line),
            _ => render_text(&record, since_epoch),
        };
        // write errors on stderr are dropped
        let _ = writeln!(io::stderr().lock(), "{rendered}");
    }

    if CAPTURE_ENABLED.load(Ordering::Relaxed) {
        with_capture(|ring| ring.push(record));
    }
}

fn render_text(record: &CapturedLog, since_epoch: Duration) -> String {
    let mut out = String::new();
    if LOG_TIMESTAMPS.load(Ordering::Relaxed) {
        out.push_str(&UtcStamp::from(since_epoch).to_string());
        out.push(' ');
    }
    out.push_str(&format!(
        "{} {}: {}",
        record.level.as_str(),
        record.target,
        record.msg
    ));
    for (key, value) in &record.fields {
        out.push_str(&format!(" {key}={value}"));
    }
    out
}

fn render_json(record: &CapturedLog, file: &'static str, line: u32) -> String {
    let fields: Map<String, Value> = record
        .fields
        .iter()
        .map(|(key, value)| ((*key).to_string(), Value::String(value.clone())))
        .collect();
    json!({
        "ts_ms": record.ts_ms,
        "level": record.level.as_str(),
        "target": record.target,
        "file": file,
        "line": line,
        "msg": record.msg,
        "fields": fields,
    })
    .to_string()
}

#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {{
        if $crate::enabled($level) {
            $crate::log($level, module_path!(), file!(), line!(), format_args!($($arg)*));
        }
    }};
}

/// Logs with structured fields: `log_fields!(Level::Warn, [("height", h.to_string())], "msg {}", x)`.
#[macro_export]
macro_rules! log_fields {
    ($level:expr, $fields:expr, $($arg:tt)*) => {{
        if $crate::enabled($level) {
            $crate::log_with_fields(
                $level,
                module_path!(),
                file!(),
                line!(),
                format_args!($($arg)*),
                &$fields,
            );
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Error, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Warn, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Info, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Debug, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Trace, $($arg)*);
    }};
}

/// Wall-clock instant rendered as RFC 3339 UTC with milliseconds.
struct UtcStamp {
    secs: u64,
    millis: u32,
}

impl From<Duration> for UtcStamp {
    fn from(since_epoch: Duration) -> Self {
        Self {
            secs: since_epoch.as_secs(),
            millis: since_epoch.subsec_millis(),
        }
    }
}

impl fmt::Display for UtcStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (year, month, day) = civil_from_days((self.secs / 86_400) as i64);
        let secs_of_day = self.secs % 86_400;
        write!(
            f,
            "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
            secs_of_day / 3600,
            secs_of_day / 60 % 60,
            secs_of_day % 60,
            self.millis
        )
    }
}

// Howard Hinnant's days-to-civil conversion.
fn civil_from_days(days_since_unix_epoch: i64) -> (i32, u32, u32) {
    let z = days_since_unix_epoch + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = (yoe as i32) + (era as i32) * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = y + if m <= 2 { 1 } else { 0 };
    (year, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level() {
        assert_eq!(Level::parse("info"), Some(Level::Info));
        assert_eq!(Level::parse("WARNING"), Some(Level::Warn));
        assert_eq!(Level::parse("trace"), Some(Level::Trace));
        assert_eq!(Level::parse("nope"), None);
    }

    #[test]
    fn config_from_strs_falls_back() {
        let config = LogConfig::from_strs(Some("debug"), Some("yaml"));
        assert_eq!(config.level, Level::Debug);
        assert_eq!(config.format, Format::Text);
        let config = LogConfig::from_strs(None, Some("json"));
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, Format::Json);
    }

    #[test]
    fn stamp_renders_utc() {
        let stamp = UtcStamp::from(Duration::from_millis(1_704_067_200_250));
        assert_eq!(stamp.to_string(), "2024-01-01T00:00:00.250Z");
        assert_eq!(civil_from_days(0), (1970, 1, 1));
    }

    #[test]
    fn ring_keeps_newest() {
        let mut ring = CaptureRing {
            capacity: 2,
            entries: VecDeque::new(),
        };
        for msg in ["a", "b", "c"] {
            ring.push(CapturedLog {
                ts_ms: 0,
                level: Level::Info,
                target: "ring",
                msg: msg.to_string(),
                fields: Vec::new(),
            });
        }
        let kept: Vec<String> = ring.tail(8).into_iter().map(|entry| entry.msg).collect();
        assert_eq!(kept, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn captures_fields() {
        set_stderr_enabled(false);
        enable_capture(16);
        log_fields!(
            Level::Error,
            [("height", "7".to_string())],
            "capture {}",
            "sample"
        );
        let logs = capture_snapshot(16);
        let entry = logs
            .iter()
            .rev()
            .find(|entry| entry.msg == "capture sample")
            .expect("captured");
        assert_eq!(entry.field("height"), Some("7"));
    }
}
