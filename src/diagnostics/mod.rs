// Pipeline diagnostics.

pub mod stats;
