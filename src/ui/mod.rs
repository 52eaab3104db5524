//! Terminal User Interface components

mod app;
pub mod theme;
mod widgets;

pub use app::{backend_rows, pipeline_rows, App, AppState, AppView};
pub use theme::ThemeColors;
pub use widgets::*;
