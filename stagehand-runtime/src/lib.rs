//! # stagehand-runtime
//!
//! Everything that talks to the outside world: the [`process`] runner, the
//! compose-backed [`lifecycle`] and [`containers`] capabilities, the
//! [`dispatch`] layer that gates restarts on sync results, and the [`watch`]
//! loop.

pub mod compose;
pub mod containers;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod process;
pub mod watch;

pub use containers::{ComposeContainers, ContainerRuntime};
pub use dispatch::{Dispatcher, ServiceSync, SyncOptions};
pub use error::{DispatchError, RuntimeError};
pub use lifecycle::{ComposeLifecycle, LifecycleManager};
pub use process::{ProcessOutput, ProcessRunner, ProcessSpec, SystemRunner};
