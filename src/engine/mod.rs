mod dispatcher;
mod error;
mod instance;
pub mod retry;

pub use dispatcher::{send, Dispatcher, ReplySink};
pub use error::CommandError;
pub use instance::{CommandInstance, CommandResult, InstanceError, InstanceState};
pub use retry::{run_bounded, Disposition, RetryOutcome, RetryPolicy, MAX_ATTEMPTS};
