//! Queue dispatchers.
//!
//! One task per queue (or per replica) repeatedly claims the oldest waiting
//! ticket and publishes the reservation:
//! - **Idle**: waiting for the next tick
//! - **Draining**: reserving until the queue is empty
//! - **Stopped**: cancelled

mod config;
mod runner;
mod supervisor;
mod types;

pub use config::DispatcherConfig;
pub use runner::QueueDispatcher;
pub use supervisor::{DispatcherHandle, DispatcherSupervisor};
pub use types::{DispatcherError, DispatcherState, DispatcherStats, DispatcherStatus};
