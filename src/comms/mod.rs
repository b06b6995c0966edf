//! Plumbing shared by every worker: the bounded event queue and the
//! cancellation signal.

pub mod queue;
pub mod shutdown;

pub use queue::{EventPublisher, EventReceiver, PublishError};
pub use shutdown::{Shutdown, ShutdownTrigger};
