mod capability;
mod command;
mod fragment;
mod session_key;

pub use capability::Capability;
pub use command::{CommandKind, CommandSpec, ExecutionMode, DEFAULT_TERMINATOR};
pub use fragment::{ExtractedFragment, FragmentKind};
pub use session_key::{SessionKey, SessionKeyError};
