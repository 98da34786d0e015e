//! Remote control for a local live-streaming application.
//!
//! Start a [`Remote`] from a [`Config`], register event handlers, then issue
//! status, start, stop, quality and exit requests. The session reconnects on
//! its own whenever the application goes away.

pub mod config;
pub mod presence;
pub mod session;

mod error;

pub use config::Config;
pub use error::{Error, Result};
pub use presence::{AlwaysPresent, ProcessPresence};
pub use session::{
    ConnectHandler, DisconnectHandler, ErrorHandler, Remote, SessionState, StartEventHandler,
    StatusHandler, StopEventHandler, SuccessHandler,
};

pub use streamctl_rpc::Presence;
pub use streamctl_types::*;
