//! Best-effort file enrichment for reports
//!
//! A row can name a file (a log, a failing source file) relative to a project
//! directory. Reports include its content when it can be read and carry on
//! without it when it can't.

use crate::data::Row;

/// Resolves a file from a row column and reads its lines
#[derive(Debug, Clone)]
pub struct FileReader {
    /// Column holding the file name; negative disables the reader
    column: i64,
    /// Prefix joined to the column value by plain concatenation
    base_dir: String,
}

impl FileReader {
    pub fn new(column: i64, base_dir: impl Into<String>) -> Self {
        Self {
            column,
            base_dir: base_dir.into(),
        }
    }

    pub fn column(&self) -> i64 {
        self.column
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// Read the file addressed by `row`, without line terminators
    ///
    /// Returns `None` when the reader is disabled, the column is missing from
    /// the row, or the file can't be read for any reason.
    pub fn read_file(&self, row: &Row) -> Option<Vec<String>> {
        let column = usize::try_from(self.column).ok()?;
        let value = row.get(column)?;
        let path = format!("{}{}", self.base_dir, value);

        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content.lines().map(str::to_string).collect()),
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "File enrichment unavailable");
                None
            }
        }
    }
}

/// Join `lines[start..end]` with newlines
///
/// Bounds follow slice notation: omitted bounds take the whole side, negative
/// bounds count from the end and anything out of range clamps.
pub fn lines_to_string(lines: &[String], start: Option<isize>, end: Option<isize>) -> String {
    let len = lines.len();
    let resolve = |bound: isize| -> usize {
        if bound < 0 {
            len.saturating_sub(bound.unsigned_abs())
        } else {
            (bound as usize).min(len)
        }
    };

    let from = start.map_or(0, resolve);
    let to = end.map_or(len, resolve);
    if from >= to {
        return String::new();
    }
    lines[from..to].join("\n")
}
