//! Error types shared across the frame pipeline and output backends

use crate::keyboard::KeyCode;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A sensor callback that could not be turned into a frame.
///
/// These are never fatal: the frame is dropped, counted and debug-logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    /// The platform handle did not yield a stable device identifier
    #[error("device handle could not be resolved to a device id")]
    UnresolvedDevice,
    /// The source is paused
    #[error("frame source is not listening")]
    NotListening,
    /// The device is not part of the active device set
    #[error("device {0:#x} is not in the active device set")]
    InactiveDevice(u64),
}

/// Failure to deliver a key action through a backend
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The backend cannot accept events right now
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The key has no representation in the backend's key space
    #[error("unsupported key code {0:?}")]
    UnsupportedKeyCode(KeyCode),
    /// The datagram could not be sent to the daemon
    #[error("socket send failed: {0}")]
    SocketSendFailed(#[source] io::Error),
    /// The daemon speaks a different protocol version
    #[error("daemon protocol version mismatch")]
    ProtocolVersionMismatch,
    /// The OS refused access to the output channel
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl DispatchError {
    /// Whether this error says something about the backend's health.
    ///
    /// An unsupported key code only fails the one binding involved.
    pub fn is_backend_failure(&self) -> bool {
        !matches!(self, DispatchError::UnsupportedKeyCode(_))
    }

    /// Map an io error from a send into the right dispatch error kind
    pub fn from_send(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            DispatchError::PermissionDenied(error.to_string())
        } else {
            DispatchError::SocketSendFailed(error)
        }
    }
}

/// Failure to set up a connection to the privileged daemon
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The server socket directory does not exist or cannot be read
    #[error("server directory {0} is missing")]
    MissingServerDirectory(PathBuf),
    /// No server socket matching the suffix was found
    #[error("no server socket found in {0}")]
    NoServerSocket(PathBuf),
    /// The client socket could not be created or bound
    #[error("failed to bind client socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Access to a socket or directory was refused
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The initialize request could not be sent
    #[error("handshake failed: {0}")]
    Handshake(#[source] DispatchError),
}

/// Failure to turn a layout description into key bindings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unknown key label {0:?}")]
    UnknownLabel(String),
    #[error("layout region for {0:?} is empty")]
    EmptyRegion(String),
}

/// Failure to open platform touch devices
#[derive(Debug, Error)]
pub enum PlatformError {
    /// No input device exposes multitouch position axes
    #[error("no multitouch devices found")]
    NoDevices,
    /// Devices exist but none could be opened
    #[error("permission denied accessing {0}; add the user to the 'input' group")]
    PermissionDenied(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_key_is_not_a_backend_failure() {
        assert!(!DispatchError::UnsupportedKeyCode(KeyCode(999)).is_backend_failure());
        assert!(DispatchError::ProtocolVersionMismatch.is_backend_failure());
        assert!(DispatchError::BackendUnavailable("gone".into()).is_backend_failure());
    }

    #[test]
    fn permission_denied_send_maps_to_permission_error() {
        let err = DispatchError::from_send(io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert!(matches!(err, DispatchError::PermissionDenied(_)));

        let err = DispatchError::from_send(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, DispatchError::SocketSendFailed(_)));
    }

    #[test]
    fn acquisition_error_display() {
        let err = AcquisitionError::InactiveDevice(0x2a);
        assert_eq!(err.to_string(), "device 0x2a is not in the active device set");
    }
}
