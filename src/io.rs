// ABOUTME: Output/input sink traits connecting the interpreter to its host

use std::io::{self, BufRead, Write};

/// Receives program output: `say` writes (which may be split across several
/// partial, space-separated calls before a final newline) and `WATCH:`
/// diagnostic lines. Kept as a trait rather than a concrete stdout writer so
/// tests can capture output deterministically and the interpreter carries no
/// hidden global state.
pub trait OutputSink {
    /// Writes text without appending a newline.
    fn write_str(&mut self, text: &str);

    /// Writes text followed by a newline.
    fn write_line(&mut self, text: &str) {
        self.write_str(text);
        self.write_str("\n");
    }
}

/// Supplies one line of input per `ask(prompt)` call, after the prompt has
/// already been written to the output sink.
pub trait InputSink {
    fn read_line(&mut self) -> io::Result<String>;
}

/// Captures output into an in-memory buffer; used by tests and by anything
/// embedding the interpreter that wants the transcript as a `String`.
#[derive(Debug, Default)]
pub struct BufferOutputSink {
    buffer: String,
}

impl BufferOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }

    pub fn into_contents(self) -> String {
        self.buffer
    }
}

impl OutputSink for BufferOutputSink {
    fn write_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }
}

/// Feeds input from a preset list of lines, in order; used by tests driving
/// `ask()`.
#[derive(Debug, Default)]
pub struct QueueInputSink {
    lines: std::collections::VecDeque<String>,
}

impl QueueInputSink {
    pub fn new(lines: impl IntoIterator<Item = String>) -> Self {
        QueueInputSink {
            lines: lines.into_iter().collect(),
        }
    }
}

impl InputSink for QueueInputSink {
    fn read_line(&mut self) -> io::Result<String> {
        self.lines
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more input lines"))
    }
}

/// Writes to the process's real stdout, for the CLI entry point.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_str(&mut self, text: &str) {
        print!("{}", text);
        let _ = io::stdout().flush();
    }
}

/// Reads from the process's real stdin, for the CLI entry point.
#[derive(Debug, Default)]
pub struct StdinSink;

impl InputSink for StdinSink {
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sink_accumulates_partial_writes() {
        let mut sink = BufferOutputSink::new();
        sink.write_str("a");
        sink.write_str(" ");
        sink.write_str("b");
        sink.write_str("\n");
        assert_eq!(sink.contents(), "a b\n");
    }

    #[test]
    fn queue_input_sink_returns_lines_in_order() {
        let mut sink = QueueInputSink::new(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(sink.read_line().unwrap(), "first");
        assert_eq!(sink.read_line().unwrap(), "second");
        assert!(sink.read_line().is_err());
    }
}
