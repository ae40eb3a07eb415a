mod fingerprint;
mod gate;

pub use fingerprint::config_fingerprint;
pub use gate::{ThrottleGate, ThrottleOutcome, ThrottleVerdict};

#[cfg(test)]
mod tests;
