//! Utility macros and helpers shared by the codec modules.

use bytes::{BufMut, BytesMut};
use std::io;

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
///
/// # Example
///
/// ```ignore
/// ensure!(headers.len() < config.max_header_limit(), ParseError::HeaderLimitExceeded);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Writer adapter so `write!` can target a `BytesMut` directly.
pub(crate) struct FastWrite<'a>(pub(crate) &'a mut BytesMut);

impl io::Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Finds the `\n` that terminates the next line in `buf`.
///
/// `scanned` remembers how far previous calls already looked so a line that
/// arrives one byte at a time is not rescanned from the start. A line may hold
/// at most `max_line_length` bytes before its CRLF; longer lines report
/// `Err(())` and the caller maps it to its own error kind.
pub(crate) fn find_line_end(buf: &[u8], scanned: &mut usize, max_line_length: usize) -> Result<Option<usize>, ()> {
    let limit = max_line_length.saturating_add(2);
    let end = buf.len().min(limit);
    let from = (*scanned).min(end);

    match buf[from..end].iter().position(|b| *b == b'\n') {
        Some(pos) => {
            *scanned = 0;
            Ok(Some(from + pos))
        }
        None if buf.len() >= limit => Err(()),
        None => {
            *scanned = end;
            Ok(None)
        }
    }
}
