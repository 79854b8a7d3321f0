use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame,
};

use crate::app::App;
use crate::markers::icon;
use crate::view::surface::Surface;

/// Render the UI
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Split into map area and status bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Map
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_map(frame, app, chunks[0]);
    render_status_bar(frame, app, chunks[1]);
}

fn render_map(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            format!(" {} ", app.profile.name),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    frame.render_widget(FrameWidget { frame: &app.frame }, inner);
}

/// Renders the flattened view frame with half-block cells: each
/// terminal cell shows two vertically stacked pixels ('▀' with the top
/// pixel as foreground and the bottom as background).
struct FrameWidget<'a> {
    frame: &'a Surface,
}

impl Widget for FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let w = (self.frame.width()).min(area.width as u32);
        let rows = (self.frame.height() / 2).min(area.height as u32);

        for cy in 0..rows {
            let y = area.y + cy as u16;
            for cx in 0..w {
                let x = area.x + cx as u16;
                let top = self.frame.get_pixel(cx, cy * 2);
                let bottom = self.frame.get_pixel(cx, cy * 2 + 1);
                if top[3] == 0 && bottom[3] == 0 {
                    continue;
                }
                buf[(x, y)]
                    .set_char('▀')
                    .set_fg(Color::Rgb(top[0], top[1], top[2]))
                    .set_bg(Color::Rgb(bottom[0], bottom[1], bottom[2]));
            }
        }
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let color = app.current_color();
    let [r, g, b, _] = icon::parse_color(color);

    let mut spans = vec![
        Span::styled(" res ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{:.2}", app.view.state().resolution),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled("██", Style::default().fg(Color::Rgb(r, g, b))),
        Span::styled(format!(" {color} "), Style::default().fg(Color::Gray)),
        Span::styled("| ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.mode.label(), Style::default().fg(Color::Magenta)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{} marked", app.store.len()),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            if app.view.overlay_visible() {
                "[T]overlay "
            } else {
                "[t]overlay "
            },
            Style::default().fg(if app.view.overlay_visible() {
                Color::Green
            } else {
                Color::DarkGray
            }),
        ),
    ];

    if app.export.is_busy() {
        spans.push(Span::styled(
            "| EXPORTING… ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::SLOW_BLINK),
        ));
    }

    spans.push(Span::styled(
        "| click:mark m:mode c:color e:export R:reset q:quit",
        Style::default().fg(Color::DarkGray),
    ));

    let paragraph = Paragraph::new(Line::from(spans));
    frame.render_widget(paragraph, area);
}
