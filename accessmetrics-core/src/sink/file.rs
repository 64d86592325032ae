use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::*;

/// Turns one result into one output line (without the newline).
pub type Encoder = Box<dyn Fn(&AggregateResult<SchoolId>) -> Result<String, String> + Send>;

/// The default encoder: [`WeeklyMetrics`] as a JSON object.
pub fn encode_json(result: &AggregateResult<SchoolId>) -> Result<String, String> {
    let row = WeeklyMetrics::try_from(result).map_err(|e| e.to_string())?;
    serde_json::to_string(&row).map_err(|e| e.to_string())
}

/// Line written in place of a result that could not be encoded.
pub fn placeholder_line(result: &AggregateResult<SchoolId>, reason: &str) -> String {
    serde_json::json!({
        "error": "encode_failed",
        "schoolId": result.key,
        "windowStart": result.window_start,
        "windowEnd": result.window_end,
        "reason": reason,
    })
    .to_string()
}

/// Append-only JSON-lines sink.
///
/// A batch is encoded into one buffer and written with a single `write_all`,
/// then flushed. A result that fails to encode is replaced by a placeholder
/// line so the rest of the batch still lands. Retrying a batch after a
/// partial write can duplicate lines; readers that need exactly-once should
/// use the upsert sink.
pub struct FileSink<W: Write + Send = BufWriter<File>> {
    writer: W,
    encoder: Encoder,
    label: String,
    lines_written: u64,
    placeholders: u64,
}

impl FileSink<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create sink directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open sink file {}", path.display()))?;
        let mut sink = Self::from_writer(BufWriter::new(file));
        sink.label = format!("file:{}", path.display());
        Ok(sink)
    }
}

impl<W: Write + Send> FileSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer,
            encoder: Box::new(encode_json),
            label: "file:<writer>".to_string(),
            lines_written: 0,
            placeholders: 0,
        }
    }

    /// Replace the line encoder.
    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn placeholders(&self) -> u64 {
        self.placeholders
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Sink for FileSink<W> {
    fn write_batch(&mut self, batch: &[AggregateResult<SchoolId>]) -> Result<(), SinkWriteError> {
        let mut buf = String::new();
        let mut placeholders = 0;
        for result in batch {
            match (self.encoder)(result) {
                Ok(line) => buf.push_str(&line),
                Err(reason) => {
                    tracing::warn!(
                        school_id = result.key,
                        window_start = result.window_start,
                        %reason,
                        "failed to encode result, writing placeholder"
                    );
                    buf.push_str(&placeholder_line(result, &reason));
                    placeholders += 1;
                }
            }
            buf.push('\n');
        }

        self.writer.write_all(buf.as_bytes())?;
        self.writer.flush()?;
        self.lines_written += batch.len() as u64;
        self.placeholders += placeholders;
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
