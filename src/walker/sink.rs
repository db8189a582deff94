//! Destinations for walk output
//!
//! A sink receives names in emission order. Returning `false` from `send`
//! stops the walk, which then reports `Cancelled`.

use crossbeam_channel::Sender;

/// Receiver of walk output
pub trait EntrySink {
    /// Accept the next name; `false` stops the walk
    fn send(&mut self, name: String) -> bool;
}

impl EntrySink for Vec<String> {
    fn send(&mut self, name: String) -> bool {
        self.push(name);
        true
    }
}

/// Stops once the receiving side hangs up
impl EntrySink for Sender<String> {
    fn send(&mut self, name: String) -> bool {
        Sender::send(self, name).is_ok()
    }
}

/// Counts names without keeping them
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingSink {
    pub count: u64,
}

impl EntrySink for CountingSink {
    fn send(&mut self, _name: String) -> bool {
        self.count += 1;
        true
    }
}

/// Adapts a closure into a sink
pub struct FnSink<F>(pub F);

impl<F: FnMut(String) -> bool> EntrySink for FnSink<F> {
    fn send(&mut self, name: String) -> bool {
        (self.0)(name)
    }
}
