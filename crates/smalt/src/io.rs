//! Output handling for `printNl` and friends.
//!
//! Implement [`PrintWriter`] to capture or redirect output from interpreted
//! code. The default writer goes to stdout; tests collect into a string.

use std::fmt::Write as _;

/// Trait for handling print output from interpreted code.
pub trait PrintWriter: std::fmt::Debug {
    /// Called once per printed line, without a trailing newline.
    fn write_line(&mut self, line: &str);

    /// Returns buffered output, for collecting writers. The default (and
    /// any pass-through writer) has nothing to hand back.
    fn take_output(&mut self) -> Option<String> {
        None
    }
}

/// Default writer: one line to stdout per call.
#[derive(Debug)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Discards all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_line(&mut self, _line: &str) {}
}

/// Collects output into a string, for tests and embedding hosts.
#[derive(Debug, Default)]
pub struct CollectStringPrint {
    output: String,
}

impl CollectStringPrint {
    /// Returns the collected output and clears the buffer.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_line(&mut self, line: &str) {
        let _ = writeln!(self.output, "{line}");
    }

    fn take_output(&mut self) -> Option<String> {
        Some(self.take())
    }
}
