//! Status output
//!
//! Operator-facing progress lines ("Distance(m): ...", ranging errors) are
//! written through a [`StatusSink`], separate from diagnostic logging.

use tracing::debug;

/// Line-oriented, fire-and-forget status output.
pub trait StatusSink {
    fn report(&mut self, message: &str);
}

/// Prints each line to stdout and mirrors it to the debug log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn report(&mut self, message: &str) {
        println!("{}", message);
        debug!(target: "uwb_core::status", "{}", message);
    }
}

/// Collects lines in memory.
impl StatusSink for Vec<String> {
    fn report(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

impl<T: StatusSink + ?Sized> StatusSink for &mut T {
    fn report(&mut self, message: &str) {
        (**self).report(message)
    }
}

impl<T: StatusSink + ?Sized> StatusSink for Box<T> {
    fn report(&mut self, message: &str) {
        (**self).report(message)
    }
}
