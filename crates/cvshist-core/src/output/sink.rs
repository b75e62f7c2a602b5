//! Output sinks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::OutputEvent;
use crate::domain::Result;

/// Consumer of the ordered output event stream.
pub trait OutputSink: Send {
    fn emit(&mut self, event: &OutputEvent) -> Result<()>;

    /// Called once after the last event.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: BufWriter<W>,
}

impl JsonLinesSink<File> {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| e.into_error().into())
    }
}

impl<W: Write + Send> OutputSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &OutputEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<OutputEvent>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for MemorySink {
    fn emit(&mut self, event: &OutputEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProjectId, SymbolKind};

    fn event() -> OutputEvent {
        OutputEvent::CreateSymbol {
            project: ProjectId(0),
            name: "REL_1".to_string(),
            kind: SymbolKind::Tag,
            path: "tags/REL_1".to_string(),
            parent_path: "trunk".to_string(),
            timestamp: 10,
            sources: Vec::new(),
        }
    }

    #[test]
    fn test_json_lines_one_event_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit(&event()).unwrap();
        sink.emit(&event()).unwrap();
        sink.finish().unwrap();
        let bytes = sink.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let back: OutputEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(back, event());
        assert!(lines[0].contains("\"type\":\"create_symbol\""));
    }

    #[test]
    fn test_memory_sink_records_finish() {
        let mut sink = MemorySink::new();
        sink.emit(&event()).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.events.len(), 1);
        assert!(sink.finished);
    }
}
