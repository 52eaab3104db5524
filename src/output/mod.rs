//! Key output: backends, failover and the privileged daemon client

#[cfg(unix)]
pub mod daemon;
mod dispatcher;
mod health;
pub mod hid;
#[cfg(unix)]
mod monitor;
mod software;

pub use dispatcher::{BackendSelector, DispatchStats, OutputDispatcher};
pub use health::{
    select_backend, BackendKind, BackendPreference, BackendStatus, HealthEvent, HealthState,
};
#[cfg(unix)]
pub use monitor::{DaemonConnector, HealthMonitor, PrivilegedConnector};
pub use software::SoftwareBackend;

use crate::error::DispatchError;
use crate::keyboard::{KeyCode, ModifierFlags};

/// Where the classifier sends key actions
pub trait KeySink: Send + Sync {
    fn post_key(&self, code: KeyCode, flags: ModifierFlags, down: bool)
        -> Result<(), DispatchError>;

    /// Key-down immediately followed by key-up
    fn post_key_stroke(&self, code: KeyCode, flags: ModifierFlags) -> Result<(), DispatchError> {
        self.post_key(code, flags, true)?;
        self.post_key(code, flags, false)
    }
}

/// One concrete output channel
pub trait KeyBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn post_key(&self, code: KeyCode, flags: ModifierFlags, down: bool)
        -> Result<(), DispatchError>;

    /// Release every key this backend may still hold down
    fn release_all(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}
