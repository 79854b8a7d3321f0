use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use ratatui::DefaultTerminal;

use hexmark::app::App;
use hexmark::config::Config;
use hexmark::export::FileSink;
use hexmark::persist::{Backend, HttpBackend};
use hexmark::ui;

fn main() -> Result<()> {
    // logs go to stderr; redirect with 2>hexmark.log to keep the
    // alternate screen clean
    env_logger::init();

    let config = Config::load(Path::new("hexmark.json"))?;
    let map_name = std::env::args()
        .nth(1)
        .or_else(|| config.maps.first().map(|m| m.name.clone()))
        .ok_or_else(|| anyhow::anyhow!("no maps configured"))?;

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&config.backend_url)?);
    let sink = Box::new(FileSink::new(std::env::current_dir()?));

    // Initialize terminal
    let mut terminal = ratatui::init();
    terminal.clear()?;

    // Enable mouse capture
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let result = run(&mut terminal, config, &map_name, backend, sink);

    // Disable mouse capture and restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    result
}

/// Handle mouse events for marking, panning and zooming
fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        // Scroll wheel zooms towards the mouse position
        MouseEventKind::ScrollUp => app.zoom_at_cell(mouse.column, mouse.row, true),
        MouseEventKind::ScrollDown => app.zoom_at_cell(mouse.column, mouse.row, false),
        // Left click toggles the nearest location
        MouseEventKind::Down(MouseButton::Left) => {
            app.handle_click(mouse.column, mouse.row);
        }
        // Right or middle drag pans
        MouseEventKind::Down(MouseButton::Right) | MouseEventKind::Down(MouseButton::Middle) => {
            app.last_mouse = Some((mouse.column, mouse.row));
        }
        MouseEventKind::Drag(MouseButton::Right) | MouseEventKind::Drag(MouseButton::Middle) => {
            app.handle_drag(mouse.column, mouse.row);
        }
        MouseEventKind::Up(MouseButton::Right) | MouseEventKind::Up(MouseButton::Middle) => {
            app.end_drag();
        }
        _ => {}
    }
}

fn run(
    terminal: &mut DefaultTerminal,
    config: Config,
    map_name: &str,
    backend: Arc<dyn Backend>,
    sink: Box<FileSink>,
) -> Result<()> {
    let size = terminal.size()?;
    let mut app = App::new(config, map_name, backend, sink, size.width, size.height)?;

    // Main loop
    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;

        // Handle events with ~60fps target
        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                Event::Key(key) => {
                    // Only handle key press events (not release)
                    if key.kind == KeyEventKind::Press {
                        match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => app.quit(),

                            // Pan with hjkl or arrow keys
                            KeyCode::Left | KeyCode::Char('h') => app.pan(-10.0, 0.0),
                            KeyCode::Right | KeyCode::Char('l') => app.pan(10.0, 0.0),
                            KeyCode::Up | KeyCode::Char('k') => app.pan(0.0, -6.0),
                            KeyCode::Down | KeyCode::Char('j') => app.pan(0.0, 6.0),

                            // Zoom
                            KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_center(true),
                            KeyCode::Char('-') | KeyCode::Char('_') => app.zoom_center(false),
                            KeyCode::Char('0') | KeyCode::Char('f') => app.fit_view(),

                            // Marker controls
                            KeyCode::Char('m') => app.cycle_mode(),
                            KeyCode::Char('c') => app.cycle_color(),
                            KeyCode::Char('t') => app.toggle_overlay(),
                            KeyCode::Char('R') => app.reset_markers(),

                            KeyCode::Char('e') => app.start_export(),

                            _ => {}
                        }
                    }
                }
                Event::Mouse(mouse) => {
                    handle_mouse(&mut app, mouse);
                }
                Event::Resize(width, height) => {
                    app.resize(width, height);
                }
                _ => {}
            }
        }

        app.tick();

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
