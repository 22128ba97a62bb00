use std::io::{BufRead, BufReader, Read};

use elbtail_statsd::metric;

use crate::PublishError;
use crate::statsd::PublisherCounters;

/// Default for the longest line the scanner accepts, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Splits a byte stream into lines.
///
/// Line terminators (`\n` and `\r\n`) are removed and empty lines are skipped. Invalid UTF-8 is
/// replaced rather than rejected. A final line without terminator is still produced.
///
/// Lines longer than the maximum line length are skipped without being buffered in full.
pub struct LineScanner<R> {
    reader: BufReader<R>,
    max_line_length: usize,
}

impl<R: Read> LineScanner<R> {
    /// Creates a scanner over the given reader that accepts lines of up to `max_line_length`
    /// bytes, not counting the terminator.
    pub fn new(reader: R, max_line_length: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            max_line_length,
        }
    }

    /// Sends every line of the input into the channel.
    ///
    /// Returns the number of lines sent once the input is exhausted. Stops at the first read
    /// error. Lines sent before the error stay in the channel.
    pub fn forward(mut self, lines: &flume::Sender<String>) -> Result<u64, PublishError> {
        // Room for the longest accepted line and a `\r\n` terminator.
        let limit = self.max_line_length as u64 + 2;
        let mut buf = Vec::new();
        let mut count = 0;

        loop {
            buf.clear();
            let read = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut buf)
                .map_err(PublishError::Read)?;

            if read == 0 {
                return Ok(count);
            }

            let line = trim_terminator(&buf);
            if line.len() > self.max_line_length {
                let mut length = line.len();
                if !buf.ends_with(b"\n") {
                    length += self
                        .reader
                        .skip_until(b'\n')
                        .map_err(PublishError::Read)?;
                }

                elbtail_log::warn!(
                    length,
                    max_line_length = self.max_line_length,
                    "skipping line that exceeds the maximum line length"
                );
                metric!(counter(PublisherCounters::LinesTooLong) += 1);
                continue;
            }

            if line.is_empty() {
                metric!(counter(PublisherCounters::LinesSkipped) += 1);
                continue;
            }

            let line = String::from_utf8_lossy(line).into_owned();
            lines
                .send(line)
                .map_err(|_| PublishError::PipelineClosed)?;

            metric!(counter(PublisherCounters::LinesScanned) += 1);
            count += 1;
        }
    }
}

fn trim_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
