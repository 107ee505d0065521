//! Runs the lodestar platform inside a host
//!
//! [`Platform`] assembles the event bus, module registry and command
//! processor in a fixed order. [`HostAdapter`] is what the host calls into
//! each tick, frame and for every piece of input or traffic.

mod builtin_commands;
pub mod control;
pub mod host_adapter;
pub mod logging;
pub mod platform;

pub use control::{ControlMessage, PlatformClosed, RemoteHandle};
pub use host_adapter::{ChannelInterceptor, ChannelSpec, HostAdapter};
pub use platform::{BuildError, Platform, PlatformBuilder};
