//! Backend health state machine

use crate::error::DispatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of the privileged backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HealthState {
    #[default]
    Unknown = 0,
    Checking = 1,
    Healthy = 2,
    Unreachable = 3,
    ConnectFailed = 4,
    HandshakeFailed = 5,
    PermissionDenied = 6,
}

/// Inputs to the health state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    /// A check began
    CheckStarted,
    /// Connected, initialized and the daemon reported ready
    CheckPassed,
    /// The daemon's server directory does not exist
    NotInstalled,
    /// No server socket, or the daemon went away
    ServerUnreachable,
    /// The client socket could not be created or bound
    ConnectFailed,
    /// Initialize was not acknowledged as ready
    HandshakeFailed,
    /// The daemon reported a protocol version mismatch
    VersionMismatch,
    /// The OS refused access
    PermissionDenied,
    /// A datagram could not be delivered
    SendFailed,
}

impl HealthState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Checking,
            2 => Self::Healthy,
            3 => Self::Unreachable,
            4 => Self::ConnectFailed,
            5 => Self::HandshakeFailed,
            6 => Self::PermissionDenied,
            _ => Self::Unknown,
        }
    }

    /// Transition function
    pub fn on(self, event: HealthEvent) -> HealthState {
        match event {
            HealthEvent::CheckStarted => Self::Checking,
            HealthEvent::CheckPassed => Self::Healthy,
            HealthEvent::NotInstalled | HealthEvent::ServerUnreachable | HealthEvent::SendFailed => {
                Self::Unreachable
            }
            HealthEvent::ConnectFailed => Self::ConnectFailed,
            HealthEvent::HandshakeFailed | HealthEvent::VersionMismatch => Self::HandshakeFailed,
            HealthEvent::PermissionDenied => Self::PermissionDenied,
        }
    }

    pub fn is_healthy(self) -> bool {
        self == Self::Healthy
    }

    /// A terminal failure state (as opposed to unknown/checking/healthy)
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Unreachable | Self::ConnectFailed | Self::HandshakeFailed | Self::PermissionDenied
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Checking => "checking",
            Self::Healthy => "healthy",
            Self::Unreachable => "unreachable",
            Self::ConnectFailed => "connect failed",
            Self::HandshakeFailed => "handshake failed",
            Self::PermissionDenied => "permission denied",
        }
    }
}

impl HealthEvent {
    /// Health event implied by a failed dispatch
    pub fn for_error(error: &DispatchError) -> Self {
        match error {
            DispatchError::PermissionDenied(_) => Self::PermissionDenied,
            DispatchError::ProtocolVersionMismatch => Self::VersionMismatch,
            DispatchError::SocketSendFailed(_)
            | DispatchError::BackendUnavailable(_)
            | DispatchError::UnsupportedKeyCode(_) => Self::SendFailed,
        }
    }
}

/// Which backend carries key actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BackendKind {
    Software = 0,
    Privileged = 1,
}

impl BackendKind {
    pub fn from_u8(value: u8) -> Self {
        if value == 1 {
            Self::Privileged
        } else {
            Self::Software
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Privileged => "privileged",
        }
    }
}

/// The user's backend preference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    #[default]
    Software,
    Privileged,
}

impl BackendPreference {
    pub fn toggled(self) -> Self {
        match self {
            Self::Software => Self::Privileged,
            Self::Privileged => Self::Software,
        }
    }
}

/// Backend selection policy: privileged only when preferred and healthy
pub fn select_backend(preference: BackendPreference, health: HealthState) -> BackendKind {
    if preference == BackendPreference::Privileged && health.is_healthy() {
        BackendKind::Privileged
    } else {
        BackendKind::Software
    }
}

/// User-visible backend status readout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub installed: bool,
    pub reachable: bool,
    pub health: HealthState,
    pub preference: BackendPreference,
    pub active_backend: BackendKind,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn check_cycle_transitions() {
        let state = HealthState::Unknown.on(HealthEvent::CheckStarted);
        assert_eq!(state, HealthState::Checking);
        assert_eq!(state.on(HealthEvent::CheckPassed), HealthState::Healthy);
        assert_eq!(state.on(HealthEvent::NotInstalled), HealthState::Unreachable);
    }

    #[test]
    fn failures_leave_healthy() {
        let healthy = HealthState::Healthy;
        assert_eq!(healthy.on(HealthEvent::SendFailed), HealthState::Unreachable);
        assert_eq!(healthy.on(HealthEvent::VersionMismatch), HealthState::HandshakeFailed);
        assert_eq!(healthy.on(HealthEvent::PermissionDenied), HealthState::PermissionDenied);
        assert!(healthy.on(HealthEvent::ConnectFailed).is_failure());
    }

    #[test]
    fn dispatch_errors_map_to_events() {
        let err = DispatchError::SocketSendFailed(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(HealthEvent::for_error(&err), HealthEvent::SendFailed);
        assert_eq!(
            HealthEvent::for_error(&DispatchError::ProtocolVersionMismatch),
            HealthEvent::VersionMismatch
        );
    }

    #[test]
    fn selection_requires_preference_and_health() {
        use BackendPreference::*;
        assert_eq!(select_backend(Privileged, HealthState::Healthy), BackendKind::Privileged);
        assert_eq!(select_backend(Privileged, HealthState::Checking), BackendKind::Software);
        assert_eq!(select_backend(Software, HealthState::Healthy), BackendKind::Software);
    }

    #[test]
    fn states_round_trip_through_u8() {
        for state in [
            HealthState::Unknown,
            HealthState::Checking,
            HealthState::Healthy,
            HealthState::Unreachable,
            HealthState::ConnectFailed,
            HealthState::HandshakeFailed,
            HealthState::PermissionDenied,
        ] {
            assert_eq!(HealthState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn preference_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: BackendPreference,
        }
        let parsed: Wrapper = toml::from_str("backend = \"privileged\"").unwrap();
        assert_eq!(parsed.backend, BackendPreference::Privileged);
    }

    #[test]
    fn status_serializes_error_timestamp() {
        let at = "2026-10-18T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let status = BackendStatus {
            installed: true,
            reachable: false,
            health: HealthState::Unreachable,
            preference: BackendPreference::Privileged,
            active_backend: BackendKind::Software,
            last_error: Some("socket gone".into()),
            last_error_at: Some(at),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["last_error_at"], "2026-10-18T12:00:00Z");
        assert_eq!(value["active_backend"], "Software");
    }
}
