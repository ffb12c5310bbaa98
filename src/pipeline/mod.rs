//! Turn intake, incremental commits and reply streaming.

pub mod clock;
pub mod commit;
pub mod dispatcher;
pub mod messages;
pub mod session;
