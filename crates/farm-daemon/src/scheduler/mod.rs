//! Scheduler: the poll loop and the reconciler it drives

mod clock;
mod poll_loop;
mod reconciler;

pub use clock::{Clock, TokioClock};
pub use poll_loop::{CycleOutcome, PollLoop};
pub use reconciler::Reconciler;
