//! Control-channel vocabulary: requests in, replies and notifications out

pub mod command;
pub mod decode;
pub mod reply;

pub use command::{Command, CommandTag, ObjectRef};
pub use decode::decode_command;
pub use reply::{LogLevel, Notification, Reply};
