pub mod relay;
pub mod supervisor;

pub use relay::{LogLine, LogRelay, LogSender, LogStream, DEFAULT_RELAY_CAPACITY};
pub use supervisor::{RunnerError, Supervisor, SupervisorConfig, DEFAULT_GRACE};
