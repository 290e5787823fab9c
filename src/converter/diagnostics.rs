//! Line splitting for FFmpeg's error stream.

use std::collections::VecDeque;
use std::io::{self, BufRead};

/// Number of trailing lines kept for failure reports.
pub const TAIL_LINES: usize = 5;

/// Iterator over the non-empty lines of a diagnostic stream.
///
/// FFmpeg redraws its stats line with `\r`, so both `\r` and `\n` end a line.
/// Invalid UTF-8 is replaced rather than rejected.
pub struct DiagnosticLines<R> {
    reader: R,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> DiagnosticLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
            done: false,
        }
    }

    /// Read raw bytes up to the next terminator. Returns `false` at end of stream.
    fn read_segment(&mut self) -> io::Result<bool> {
        self.buf.clear();
        loop {
            let available = match self.reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(!self.buf.is_empty());
            }
            match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(end) => {
                    self.buf.extend_from_slice(&available[..end]);
                    self.reader.consume(end + 1);
                    return Ok(true);
                }
                None => {
                    let len = available.len();
                    self.buf.extend_from_slice(available);
                    self.reader.consume(len);
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for DiagnosticLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.read_segment() {
                Ok(true) => {
                    let line = String::from_utf8_lossy(&self.buf);
                    let line = line.trim();
                    if !line.is_empty() {
                        return Some(Ok(line.to_string()));
                    }
                }
                Ok(false) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Bounded ring of the most recent lines.
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// The kept lines, oldest first, joined with newlines.
    pub fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for DiagnosticTail {
    fn default() -> Self {
        Self::new(TAIL_LINES)
    }
}
