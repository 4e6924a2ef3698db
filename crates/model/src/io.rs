//! Data source and sink specs plus the runtime traits behind them.
//!
//! A spec is the declarative half (what data, which format); the `Source`
//! and `Sink` traits are the runtime half the engine drives once per fire.
//! Builtin implementations cover the builtin formats: inline token data,
//! line-oriented files, token capture, text files, and the discarding null
//! sink.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fdp_common::{ConfigError, RuntimeError};
use fdp_schema::{Direction, Format, FormatRegistry, Record, Value};
use serde::{Deserialize, Serialize};

fn default_chunk_size() -> u32 {
    1
}

/// Declarative description of one data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceSpec {
    pub name: String,
    /// Input format name, resolved against the format registry.
    pub format: String,
    /// File to read. Mutually exclusive with `data`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Inline tokens. Mutually exclusive with `path`.
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    /// Number of inline tokens bundled into one record. Only meaningful for
    /// inline data; files are always delivered line by line.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
}

impl DataSourceSpec {
    /// Inline token source.
    pub fn tokens(name: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            format: "TokenInputFormat".to_string(),
            path: None,
            data: Some(data),
            chunk_size: 1,
        }
    }

    /// Line-oriented file source.
    pub fn lines(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            format: "LineInputFormat".to_string(),
            path: Some(path.into()),
            data: None,
            chunk_size: 1,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidIoSpec {
            name: self.name.clone(),
            reason,
        };
        let format = resolve_format(&self.name, &self.format, Direction::Input)?;
        if self.chunk_size < 1 {
            return Err(invalid("chunk size must be at least 1".to_string()));
        }
        match (&self.path, &self.data) {
            (Some(_), Some(_)) => {
                return Err(invalid("path and inline data are mutually exclusive".to_string()))
            }
            (None, None) => {
                return Err(invalid("either a path or inline data is required".to_string()))
            }
            (Some(_), None) => {
                if !format.uses_path {
                    return Err(invalid(format!("{} requires inline data", format.name)));
                }
                if self.chunk_size != 1 {
                    return Err(invalid("chunk size must be 1 for file sources".to_string()));
                }
            }
            (None, Some(_)) => {
                if !format.schema_from_data {
                    return Err(invalid(format!(
                        "{} reads from a path, not inline data",
                        format.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the runtime source for a validated spec.
    pub fn build(&self) -> Result<Box<dyn Source>, ConfigError> {
        self.validate()?;
        if let Some(data) = &self.data {
            Ok(Box::new(TokenSource {
                name: self.name.clone(),
                data: data.clone(),
                chunk_size: self.chunk_size,
                buffered: Vec::new(),
            }))
        } else {
            // validate() guarantees the path is present here.
            Ok(Box::new(LineFileSource {
                name: self.name.clone(),
                path: self.path.clone().unwrap_or_default(),
                buffered: Vec::new(),
            }))
        }
    }
}

/// Declarative description of one data sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSinkSpec {
    pub name: String,
    /// Output format name, resolved against the format registry.
    pub format: String,
    /// Output file. Required by file formats, forbidden otherwise.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DataSinkSpec {
    /// In-memory token capture sink.
    pub fn tokens(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: "TokenOutputFormat".to_string(),
            path: None,
        }
    }

    /// Discarding sink.
    pub fn null(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: "NullOutputFormat".to_string(),
            path: None,
        }
    }

    /// Tab-separated text file sink.
    pub fn text(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            format: "TextOutputFormat".to_string(),
            path: Some(path.into()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidIoSpec {
            name: self.name.clone(),
            reason,
        };
        let format = resolve_format(&self.name, &self.format, Direction::Output)?;
        if format.uses_path && self.path.is_none() {
            return Err(invalid(format!("{} requires an output path", format.name)));
        }
        if !format.uses_path && self.path.is_some() {
            return Err(invalid(format!("{} does not write to a path", format.name)));
        }
        Ok(())
    }

    /// Build the runtime sink for a validated spec. Token sinks also return
    /// a capture handle for reading results back after the run.
    pub fn build(&self) -> Result<(Box<dyn Sink>, Option<CaptureHandle>), ConfigError> {
        self.validate()?;
        let format = resolve_format(&self.name, &self.format, Direction::Output)?;
        if format.uses_path {
            return Ok((
                Box::new(TextFileSink {
                    name: self.name.clone(),
                    path: self.path.clone().unwrap_or_default(),
                    pending: Vec::new(),
                }),
                None,
            ));
        }
        if format.schema_from_data {
            let (sink, handle) = TokenSink::new(self.name.clone());
            return Ok((Box::new(sink), Some(handle)));
        }
        Ok((
            Box::new(NullSink {
                name: self.name.clone(),
            }),
            None,
        ))
    }
}

/// Resolve a spec's format name against the builtin registry.
fn resolve_format(spec: &str, format: &str, direction: Direction) -> Result<Format, ConfigError> {
    FormatRegistry::builtin()
        .resolve(format, direction)
        .cloned()
        .ok_or_else(|| ConfigError::InvalidIoSpec {
            name: spec.to_string(),
            reason: format!("unknown {direction:?} format '{format}'"),
        })
}

/// Runtime half of a data source. Driven once per fire: `iterate` produces
/// this fire's records, `take_records` hands them to the engine.
pub trait Source: Send {
    fn name(&self) -> &str;
    /// Produce the records for this fire. `SourceNotReady` aborts the fire.
    fn iterate(&mut self) -> Result<(), RuntimeError>;
    fn take_records(&mut self) -> Vec<Record>;
}

/// Runtime half of a data sink. The engine prefires every sink before
/// submitting the job, delivers result records during execution, and fires
/// plus postfires only when no stop was requested.
pub trait Sink: Send {
    fn name(&self) -> &str;
    /// Returning `false` means "not ready"; the fire is aborted with
    /// `SinkNotReady`.
    fn prefire(&mut self) -> Result<bool, RuntimeError>;
    fn deliver(&mut self, records: Vec<Record>);
    fn fire(&mut self) -> Result<(), RuntimeError>;
    /// Returning `false` asks the orchestrator not to fire again.
    fn postfire(&mut self) -> bool;
}

/// Inline token data, optionally bundled into chunks.
struct TokenSource {
    name: String,
    data: Vec<Value>,
    chunk_size: u32,
    buffered: Vec<Record>,
}

impl Source for TokenSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn iterate(&mut self) -> Result<(), RuntimeError> {
        if self.data.is_empty() {
            return Err(RuntimeError::SourceNotReady(self.name.clone()));
        }
        self.buffered = chunk_records(&self.data, self.chunk_size);
        Ok(())
    }

    fn take_records(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.buffered)
    }
}

/// Bundle inline tokens into wire records.
///
/// With `chunk_size == 1` each token becomes one keyless record. Larger
/// chunk sizes wrap `chunk_size` tokens into a `{data, id}` record so the
/// engine can split work without re-counting tokens.
pub fn chunk_records(data: &[Value], chunk_size: u32) -> Vec<Record> {
    if chunk_size <= 1 {
        return data.iter().cloned().map(Record::keyless).collect();
    }
    data.chunks(chunk_size as usize)
        .enumerate()
        .map(|(id, chunk)| {
            Record::keyless(Value::Record(vec![
                ("data".to_string(), Value::Array(chunk.to_vec())),
                ("id".to_string(), Value::Int(id as i32)),
            ]))
        })
        .collect()
}

/// Line-oriented file input: key is the byte offset of the line, value the
/// line text without its terminator.
struct LineFileSource {
    name: String,
    path: PathBuf,
    buffered: Vec<Record>,
}

impl Source for LineFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn iterate(&mut self) -> Result<(), RuntimeError> {
        let text = fs::read_to_string(&self.path)
            .map_err(|_| RuntimeError::SourceNotReady(self.name.clone()))?;
        let mut offset = 0i64;
        self.buffered = text
            .split_inclusive('\n')
            .map(|raw| {
                let line = raw.trim_end_matches('\n').trim_end_matches('\r');
                let record = Record::new(Value::Long(offset), Value::Str(line.to_string()));
                offset += raw.len() as i64;
                record
            })
            .collect();
        Ok(())
    }

    fn take_records(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.buffered)
    }
}

/// Shared view into a token sink's captured records.
#[derive(Debug, Clone, Default)]
pub struct CaptureHandle {
    records: Arc<Mutex<Vec<Record>>>,
}

impl CaptureHandle {
    /// Snapshot of everything captured so far.
    pub fn records(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drain the capture buffer.
    pub fn take(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    fn publish(&self, records: Vec<Record>) {
        match self.records.lock() {
            Ok(mut guard) => guard.extend(records),
            Err(poisoned) => poisoned.into_inner().extend(records),
        }
    }
}

/// Captures result records in memory; fire publishes them to the handle.
struct TokenSink {
    name: String,
    pending: Vec<Record>,
    handle: CaptureHandle,
}

impl TokenSink {
    fn new(name: String) -> (Self, CaptureHandle) {
        let handle = CaptureHandle::default();
        (
            Self {
                name,
                pending: Vec::new(),
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl Sink for TokenSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn prefire(&mut self) -> Result<bool, RuntimeError> {
        Ok(true)
    }

    fn deliver(&mut self, records: Vec<Record>) {
        self.pending.extend(records);
    }

    fn fire(&mut self) -> Result<(), RuntimeError> {
        self.handle.publish(std::mem::take(&mut self.pending));
        Ok(())
    }

    fn postfire(&mut self) -> bool {
        true
    }
}

/// Writes `key<TAB>value` lines on fire.
struct TextFileSink {
    name: String,
    path: PathBuf,
    pending: Vec<Record>,
}

impl Sink for TextFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn prefire(&mut self) -> Result<bool, RuntimeError> {
        // Not ready until the parent directory exists.
        Ok(self
            .path
            .parent()
            .map(|dir| dir.as_os_str().is_empty() || dir.is_dir())
            .unwrap_or(false))
    }

    fn deliver(&mut self, records: Vec<Record>) {
        self.pending.extend(records);
    }

    fn fire(&mut self) -> Result<(), RuntimeError> {
        let mut file = fs::File::create(&self.path)
            .map_err(|e| RuntimeError::JobFailed(format!("cannot open {}: {e}", self.path.display())))?;
        for record in self.pending.drain(..) {
            writeln!(file, "{}\t{}", display_value(&record.key), display_value(&record.value))
                .map_err(|e| RuntimeError::JobFailed(format!("write failed: {e}")))?;
        }
        Ok(())
    }

    fn postfire(&mut self) -> bool {
        true
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Long(l) => l.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Record(fields) => fields
            .iter()
            .map(|(name, v)| format!("{name}={}", display_value(v)))
            .collect::<Vec<_>>()
            .join(","),
        Value::Opaque(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

/// Discards everything.
struct NullSink {
    name: String,
}

impl Sink for NullSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn prefire(&mut self) -> Result<bool, RuntimeError> {
        Ok(true)
    }

    fn deliver(&mut self, _records: Vec<Record>) {}

    fn fire(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn postfire(&mut self) -> bool {
        true
    }
}
