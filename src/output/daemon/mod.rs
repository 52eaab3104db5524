//! Privileged backend: a virtual HID keyboard owned by a root daemon

mod client;
pub mod protocol;
pub mod report;

pub use client::{find_server_socket, DaemonProtocolClient, DaemonSettings, DriverStatus};
pub use protocol::{KeyboardParameters, RequestType, Response, ResponseType};
pub use report::KeyboardReport;
