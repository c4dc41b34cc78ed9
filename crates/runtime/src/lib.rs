//! Runtime: the activity scheduler and its supporting pieces.
//!
//! One logical agent loop, one turn in flight at a time. Stdin reading,
//! desire ticking, and the turn itself interleave cooperatively.

pub mod chat_log;
pub mod scheduler;

pub use chat_log::ChatLog;
pub use scheduler::{
    format_action, input_channel, spawn_stdin_reader, ConsoleUi, Input, InputRx, Scheduler, Ui,
    DESIRE_COOLDOWN, IDLE_CHECK_INTERVAL,
};
