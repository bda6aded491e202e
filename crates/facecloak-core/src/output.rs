//! JSON / JSONL result writer.
//!
//! Single results (an upload, a connectivity report) are written as one JSON
//! document. Batch results stream either as a JSON array at the end or as
//! one line per record as they arrive.

use serde::Serialize;
use std::io::{self, Write};
use std::str::FromStr;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Single JSON document (arrays for batches)
    Json,
    /// Newline-delimited JSON, one record per line
    JsonLines,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Ok(Self::JsonLines),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Serializes records to a writer.
///
/// In JSON mode, records pushed with [`record`](Self::record) are buffered
/// and emitted as one array by [`finish`](Self::finish); in JSONL mode they
/// are written immediately.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    pending: Vec<serde_json::Value>,
    records: usize,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            pending: Vec::new(),
            records: 0,
        }
    }

    /// Write one standalone document.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        self.emit(item, self.pretty && self.format == OutputFormat::Json)?;
        self.records += 1;
        Ok(())
    }

    /// Add one record of a batch.
    pub fn record<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::JsonLines => self.emit(item, false)?,
            OutputFormat::Json => self
                .pending
                .push(serde_json::to_value(item).map_err(io::Error::other)?),
        }
        self.records += 1;
        Ok(())
    }

    /// Emit anything still buffered and flush.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.format == OutputFormat::Json && !self.pending.is_empty() {
            let batch = std::mem::take(&mut self.pending);
            self.emit(&batch, self.pretty)?;
        }
        self.writer.flush()
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit<T: Serialize + ?Sized>(&mut self, item: &T, pretty: bool) -> io::Result<()> {
        if pretty {
            serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        }
        writeln!(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PipelineResult, StrategyKind};

    #[test]
    fn test_single_document() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::Json, false);
        writer
            .write(&PipelineResult::completed("a".to_string(), "b".to_string()))
            .unwrap();
        let output = String::from_utf8(writer.into_inner()).unwrap();
        assert!(output.contains("\"processedUrl\":\"b\""));
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn test_jsonl_streams_records() {
        let mut writer = OutputWriter::new(Vec::new(), OutputFormat::JsonLines, true);
        writer.record(&StrategyKind::Precision).unwrap();
        writer.record(&StrategyKind::Minimal).unwrap();
        writer.finish().unwrap();

        assert_eq!(writer.records(), 2);
        let output = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(output, "\"precision\"\n\"minimal\"\n");
    }

    #[test]
    fn test_json_batches_into_array() {
        let mut buffer = Vec::new();
        {
            let mut writer = OutputWriter::new(&mut buffer, OutputFormat::Json, false);
            writer.record(&1).unwrap();
            writer.record(&2).unwrap();
            writer.finish().unwrap();
        }
        assert_eq!(String::from_utf8(buffer).unwrap(), "[1,2]\n");
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("json".parse(), Ok(OutputFormat::Json));
        assert_eq!("NDJSON".parse(), Ok(OutputFormat::JsonLines));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
