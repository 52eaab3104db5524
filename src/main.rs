//! Touchpad Keyboard - split keyboard on two trackpads
//!
//! Runs the frame pipeline and renders a status readout.

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode as CtKeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use std::io::stdout;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use touchpad_keyboard::{
    config::Config,
    keyboard::LayoutSet,
    output::{OutputDispatcher, SoftwareBackend},
    pipeline::Pipeline,
    platform,
    ui::{App, AppState, AppView, HelpPanel, StatusBar, StatusPanel, TabBar},
};

#[cfg(unix)]
use touchpad_keyboard::output::{DaemonConnector, HealthMonitor};

#[cfg(target_os = "linux")]
use touchpad_keyboard::platform::EvdevTouchSource;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = Config::load().unwrap_or_else(|err| {
        log::warn!("using default config: {}", err);
        Config::default()
    });
    let layouts = config.load_layouts().unwrap_or_else(|err| {
        log::warn!("using built-in layout: {}", err);
        LayoutSet::default()
    });

    if !SoftwareBackend::is_live() {
        log::info!("built without virtual-send; software output is a dry run");
    }
    let dispatcher = Arc::new(OutputDispatcher::new(
        Arc::new(SoftwareBackend::new()),
        config.output.preferred_backend,
    ));
    let pipeline = Pipeline::start(
        config.classifier.to_params(),
        &layouts,
        Arc::clone(&dispatcher),
        config.pipeline_options(),
    )
    .context("failed to start classifier")?;

    #[cfg(target_os = "linux")]
    let mut touch_source = match EvdevTouchSource::start(Arc::clone(pipeline.source())) {
        Ok(source) => Some(source),
        Err(err) => {
            log::warn!("no touch input: {}", err);
            None
        }
    };

    let mut app = App::new(config.clone(), pipeline);
    app.set_status(platform::touch_status());

    #[cfg(unix)]
    {
        let monitor = HealthMonitor::spawn(
            dispatcher,
            DaemonConnector::new(config.output.daemon_settings()),
            config.output.health_check_interval(),
        )
        .context("failed to start health monitor")?;
        app = app.with_monitor(monitor);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("failed to install signal handler")?;
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = config.refresh_interval();

    loop {
        let stats = app.stats();
        let rows = app.current_rows();

        terminal.draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1), // Tab bar
                    Constraint::Min(10),   // Main content
                    Constraint::Length(1), // Status bar
                ])
                .split(frame.area());

            let tab_names: Vec<&str> = AppView::all().iter().map(|v| v.name()).collect();
            frame.render_widget(
                TabBar::new(&tab_names, app.view.index(), app.colors),
                chunks[0],
            );

            match app.view {
                AppView::Help => frame.render_widget(HelpPanel::new(app.colors), chunks[1]),
                view => frame.render_widget(
                    StatusPanel::new(&rows, view.name(), app.colors),
                    chunks[1],
                ),
            }

            let state_str = match app.state {
                AppState::Running => "LISTENING",
                AppState::Paused => "PAUSED",
                AppState::Quitting => "QUITTING",
            };
            let elapsed = app.elapsed_formatted();
            let status = StatusBar::new(
                state_str,
                stats.backend.active_backend.name(),
                &elapsed,
                stats.frames_published,
                app.colors,
            )
            .message(app.get_status());
            frame.render_widget(status, chunks[2]);
        })?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    CtKeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.quit()
                    }
                    CtKeyCode::Char('q') | CtKeyCode::Esc => app.quit(),
                    CtKeyCode::BackTab => app.prev_view(),
                    CtKeyCode::Tab if key.modifiers.contains(KeyModifiers::SHIFT) => {
                        app.prev_view()
                    }
                    CtKeyCode::Tab => app.next_view(),
                    CtKeyCode::Char('?') => app.view = AppView::Help,
                    CtKeyCode::Char(' ') => app.toggle_pause(),
                    CtKeyCode::Char('b') => app.toggle_backend(),
                    CtKeyCode::Char('c') => app.request_check(),
                    CtKeyCode::Char('e') => {
                        if let Err(err) = app.export_report(Path::new(".")) {
                            app.set_status(format!("Export failed: {}", err));
                        }
                    }
                    _ => {}
                }
            }
        }

        if interrupted.load(Ordering::SeqCst) {
            app.quit();
        }
        if app.state == AppState::Quitting {
            break;
        }
    }

    // Stop input first so no frame arrives after modifiers are released
    #[cfg(target_os = "linux")]
    {
        if let Some(source) = touch_source.as_mut() {
            source.stop();
        }
    }
    app.shutdown();

    // Cleanup terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let stats = app.stats();
    println!("\nTouchpad Keyboard session complete.");
    println!(
        "Frames: {}  Taps: {}  Holds: {}",
        stats.frames_published, stats.classifier.taps, stats.classifier.holds
    );
    println!("Session duration: {}", app.elapsed_formatted());

    Ok(())
}
