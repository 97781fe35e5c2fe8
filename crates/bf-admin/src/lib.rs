//! Admin mute/unmute control and out-of-band log notification.

pub mod admin_channel;
pub mod mute;
pub mod notify;

pub use admin_channel::AdminChannel;
pub use mute::MuteFlag;
pub use notify::{parse_level, NotificationConfig, NotificationLayer};
