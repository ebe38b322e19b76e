pub mod capture_loop;

pub use capture_loop::{residual_sleep, CaptureLoop, LoopStats, TickOutcome};
