use crate::app::App;
use plib_core::Align;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::{Alignment, Color, Line, Style, Stylize};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap};
use ratatui::Frame;

pub fn draw(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(10),
            Constraint::Length(8),
        ])
        .split(frame.area());

    draw_header(frame, root[0], app);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(root[1]);

    draw_item(frame, middle[0], app);
    draw_message(frame, middle[1], app);
    draw_events(frame, root[2], app);

    if app.show_help {
        draw_help_popup(frame);
    }
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let title = if app.screen.title.is_empty() {
        "plib".to_string()
    } else {
        format!("plib | {}", app.screen.title)
    };
    let lines = vec![
        Line::from(title.bold()),
        Line::from(format!(
            "Mode: {} (depth {}) | Seed {} | ? help",
            app.mode_name(),
            app.depth(),
            app.session.rng.seed()
        )),
    ];
    let block = Block::default().borders(Borders::ALL).title(app.status_line.as_str());
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true }).block(block);
    frame.render_widget(paragraph, area);
}

fn draw_item(frame: &mut Frame, area: Rect, app: &App) {
    let lines = match &app.screen.item {
        Some(item) => {
            let summary = if item.summary.is_empty() {
                "-".to_string()
            } else {
                item.summary.clone()
            };
            vec![
                Line::from(format!("#{}", item.id).bold()),
                Line::from(item.path.display().to_string()),
                Line::from(""),
                Line::from(summary),
            ]
        }
        None => vec![Line::from("nothing shown")],
    };
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(pane_block("Item")),
        area,
    );
}

fn draw_message(frame: &mut Frame, area: Rect, app: &App) {
    let alignment = match app.screen.align {
        Align::Left => Alignment::Left,
        Align::Center => Alignment::Center,
    };
    let lines: Vec<Line> = app
        .screen
        .message
        .iter()
        .map(|line| Line::from(line.as_str()))
        .collect();
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(alignment)
            .wrap(Wrap { trim: false })
            .block(pane_block("Message")),
        area,
    );
}

fn draw_events(frame: &mut Frame, area: Rect, app: &App) {
    let visible = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .event_log
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|line| ListItem::new(line.as_str()))
        .collect();
    frame.render_widget(List::new(items).block(pane_block("Events")), area);
}

fn draw_help_popup(frame: &mut Frame) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);
    let lines = vec![
        Line::from("q quit (from browse) | ? help | ctrl+c abandon everything"),
        Line::from("space/n next item | p choose pickers | m mood picker"),
        Line::from("t auto-advance | d mark for deletion | s status"),
        Line::from("a ask permission | g best-of match"),
        Line::from("c claim for us | C claim for you"),
        Line::from("picker list: up/down or j/k, space select, +/- weight, enter apply"),
        Line::from("esc leaves the current screen"),
    ];
    let block = Block::default()
        .title("Help")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn pane_block(title: &str) -> Block<'_> {
    Block::default().title(title).borders(Borders::ALL)
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
