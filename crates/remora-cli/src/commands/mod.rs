//! Command handlers grouped by concern.

pub(crate) mod session;
pub(crate) mod torrents;
pub(crate) mod watch;
