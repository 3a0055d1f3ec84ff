use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
        MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};
use shopmate_core::{
    ChatEngine, Conversation, DragState, EngineEvent, Phase, Point, Role, Size,
    TRANSPORT_ERROR_MESSAGE, WidgetGeometry,
    markdown::{self, LineKind},
};
use std::io;
use std::path::PathBuf;

#[cfg(not(debug_assertions))]
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};
use tui_input::Input;
use tui_input::backend::crossterm::EventHandler;

#[derive(Parser, Debug)]
#[command(name = "shopmate", about = "Shopmate storefront with floating AI assistant")]
struct Args {
    /// Chat relay endpoint
    #[arg(long, default_value = "http://127.0.0.1:8787/api/chat")]
    relay_url: String,
}

/// Width of the close ("×") hot zone at the right end of the title bar.
const CLOSE_ZONE: u16 = 4;

const LAUNCHER_WIDTH: u16 = 12;
const LAUNCHER_HEIGHT: u16 = 3;

struct App {
    input: Input,
    conversation: Conversation,
    engine: ChatEngine,
    current_response: String,
    open: bool,
    geometry: WidgetGeometry,
    drag: DragState,
    thinking_frame: usize,
    scroll_offset: usize,
}

impl App {
    fn new(relay_url: String, viewport: Size) -> Self {
        App {
            input: Input::default(),
            conversation: Conversation::new(),
            engine: ChatEngine::new(relay_url),
            current_response: String::new(),
            open: false,
            // Anchored once at mount; afterwards only dragging moves it.
            geometry: WidgetGeometry::anchored(viewport),
            drag: DragState::new(),
            thinking_frame: 0,
            scroll_offset: 0,
        }
    }

    // Rejected submissions (blank input, request in flight) are silent
    // no-ops: the input keeps its text and nothing is displayed.
    fn submit(&mut self) {
        let Some(message) = self.conversation.submit(self.input.value()) else {
            return;
        };
        // Input clears immediately so the user can keep typing while waiting.
        self.input.reset();
        self.current_response.clear();
        self.engine.send_message(message);
    }

    fn close_widget(&mut self) {
        self.open = false;
        self.drag.end();
        // Abort the in-flight stream; whatever accumulated stays committed.
        self.engine.cancel_in_flight();
    }

    fn check_engine_events(&mut self) {
        while let Some(event) = self.engine.try_recv() {
            match event {
                EngineEvent::Token(delta) => {
                    if self.conversation.phase() == Phase::Sending {
                        self.conversation.begin_streaming();
                    }
                    self.current_response.push_str(&delta);
                    self.conversation.set_tail(self.current_response.clone());
                }
                EngineEvent::MessageComplete => {
                    self.conversation.complete();
                    self.current_response.clear();
                }
                EngineEvent::Error(err) => {
                    tracing::error!("chat stream failed: {}", err);
                    self.conversation.fail(TRANSPORT_ERROR_MESSAGE);
                    self.current_response.clear();
                }
            }
        }
    }

    fn get_thinking_indicator(&self) -> &'static str {
        const BRAILLE_FRAMES: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];
        BRAILLE_FRAMES[self.thinking_frame % BRAILLE_FRAMES.len()]
    }

    fn advance_thinking_animation(&mut self) {
        self.thinking_frame = self.thinking_frame.wrapping_add(1);
    }

    fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Where the widget actually draws: geometry clamped into the viewport.
    /// Clamping happens here only; the stored position stays signed so drag
    /// deltas accumulate correctly past the edges.
    fn widget_rect(&self, area: Rect) -> Rect {
        let width = self.geometry.size.width.min(area.width);
        let height = self.geometry.size.height.min(area.height);
        let max_x = area.width.saturating_sub(width) as i32;
        let max_y = area.height.saturating_sub(height) as i32;
        Rect {
            x: self.geometry.position.x.clamp(0, max_x) as u16,
            y: self.geometry.position.y.clamp(0, max_y) as u16,
            width,
            height,
        }
    }

    fn launcher_rect(&self, area: Rect) -> Rect {
        Rect {
            x: area.width.saturating_sub(LAUNCHER_WIDTH + 2),
            y: area.height.saturating_sub(LAUNCHER_HEIGHT + 1),
            width: LAUNCHER_WIDTH.min(area.width),
            height: LAUNCHER_HEIGHT.min(area.height),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent, area: Rect) {
        let at = Position::new(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if !self.open {
                    if self.launcher_rect(area).contains(at) {
                        self.open = true;
                    }
                    return;
                }

                let rect = self.widget_rect(area);
                if mouse.row == rect.y && rect.contains(at) {
                    if mouse.column >= rect.right().saturating_sub(CLOSE_ZONE) {
                        self.close_widget();
                    } else {
                        // Title bar: start tracking pointer deltas.
                        self.drag.begin(Point {
                            x: mouse.column as i32,
                            y: mouse.row as i32,
                        });
                    }
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                self.drag.update(
                    &mut self.geometry,
                    Point {
                        x: mouse.column as i32,
                        y: mouse.row as i32,
                    },
                );
            }
            // Released unconditionally, wherever the pointer ended up.
            MouseEventKind::Up(MouseButton::Left) => {
                self.drag.end();
            }
            MouseEventKind::ScrollUp => {
                if self.open {
                    self.scroll_up(3);
                }
            }
            MouseEventKind::ScrollDown => {
                if self.open {
                    self.scroll_down(3);
                }
            }
            _ => {}
        }
    }

    /// Handle a key event - returns false if should quit
    fn handle_key_event(&mut self, key: crossterm::event::KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return true;
        }

        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL)
            | (KeyCode::Char('d'), KeyModifiers::CONTROL) => false,
            (KeyCode::Char('q'), _) if !self.open => false,
            (KeyCode::Char('a'), _) if !self.open => {
                self.open = true;
                true
            }
            (KeyCode::Esc, _) if self.open => {
                self.close_widget();
                true
            }
            (KeyCode::Enter, _) if self.open => {
                self.submit();
                true
            }
            _ => {
                if self.open {
                    self.input.handle_event(&Event::Key(key));
                }
                true
            }
        }
    }
}

fn markdown_style(kind: LineKind) -> Style {
    match kind {
        LineKind::CodeFence => Style::default().fg(Color::DarkGray),
        LineKind::Heading1 => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        LineKind::Heading2 => Style::default().fg(Color::Yellow),
        LineKind::Bullet => Style::default().fg(Color::Cyan),
        LineKind::InlineCode => Style::default().fg(Color::Magenta),
        LineKind::Plain => Style::default(),
    }
}

fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let mut all_lines: Vec<Line> = Vec::new();

    for turn in app.conversation.turns() {
        match turn.role {
            Role::User => {
                all_lines.push(Line::from(vec![
                    Span::styled("🧑 ", Style::default().fg(Color::Cyan)),
                    Span::styled(
                        turn.content.clone(),
                        Style::default().fg(Color::Cyan),
                    ),
                ]));
            }
            Role::Assistant => {
                all_lines.push(Line::from(Span::styled(
                    "🤖",
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                )));
                for rendered in markdown::render(&turn.content) {
                    all_lines.push(Line::from(Span::styled(
                        rendered.text,
                        markdown_style(rendered.kind),
                    )));
                }
            }
        }
        all_lines.push(Line::from(""));
    }

    all_lines
}

fn ui(f: &mut Frame, app: &mut App) {
    let area = f.area();

    // Storefront backdrop. The real product screens are plain REST views in
    // the web client; the terminal build only hosts the assistant.
    let backdrop = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(
            "  Shopmate Storefront",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "  a — 打开AI助手    q — 退出",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .block(Block::default().borders(Borders::ALL).title("Shopmate"));
    f.render_widget(backdrop, area);

    if !app.open {
        let launcher = Paragraph::new(Line::from(" AI助手 ").centered())
            .block(Block::default().borders(Borders::ALL))
            .style(Style::default().bg(Color::Blue).fg(Color::White));
        f.render_widget(launcher, app.launcher_rect(area));
        return;
    }

    let rect = app.widget_rect(area);
    f.render_widget(Clear, rect);

    let busy = app.conversation.is_busy();
    let mut widget_block = Block::default()
        .borders(Borders::ALL)
        .title(" AI助手 ")
        .title_top(Line::from(" × ").right_aligned());
    if busy {
        widget_block = widget_block.title_bottom(
            Line::from(format!(" {} 正在输入中... ", app.get_thinking_indicator()))
                .right_aligned(),
        );
    }
    let inner = widget_block.inner(rect);
    f.render_widget(widget_block, rect);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Messages
            Constraint::Length(3), // Input
        ])
        .split(inner);

    let all_lines = chat_lines(app);
    let total_lines = all_lines.len();
    let visible_height = chunks[0].height as usize;
    let max_scroll = total_lines.saturating_sub(visible_height);

    if app.scroll_offset > max_scroll {
        app.scroll_offset = max_scroll;
    }
    // scroll_offset=0 pins to the bottom; larger values scroll back up.
    let effective_scroll = max_scroll.saturating_sub(app.scroll_offset);

    let messages = Paragraph::new(all_lines).scroll((effective_scroll as u16, 0));
    f.render_widget(messages, chunks[0]);

    let input_title = if app.input.value().is_empty() {
        " 请输入问题... "
    } else {
        " 消息 "
    };
    let input_widget = Paragraph::new(app.input.value())
        .style(Style::default().fg(Color::White))
        .block(Block::default().borders(Borders::ALL).title(input_title));
    f.render_widget(input_widget, chunks[1]);

    f.set_cursor_position((
        chunks[1].x + app.input.visual_cursor() as u16 + 1,
        chunks[1].y + 1,
    ));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // File-based logging: stdout belongs to the terminal UI.
    // In dev mode, use a local log file that gets recreated on each run.
    // In release mode, use the data directory with daily rotation.
    #[cfg(debug_assertions)]
    let log_file = {
        let path = PathBuf::from("./shopmate.log");
        let _ = std::fs::remove_file(&path);
        std::fs::File::create(&path)?
    };
    #[cfg(debug_assertions)]
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    #[cfg(not(debug_assertions))]
    let (non_blocking, _guard) = {
        let log_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shopmate")
            .join("logs");
        std::fs::create_dir_all(&log_dir)?;
        let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "shopmate.log");
        tracing_appender::non_blocking(file_appender)
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    tracing::info!("Starting Shopmate TUI, relay at {}", args.relay_url);

    config::load_env_file();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let viewport = terminal.size()?;
    let mut app = App::new(
        args.relay_url,
        Size {
            width: viewport.width,
            height: viewport.height,
        },
    );

    let mut should_quit = false;

    while !should_quit {
        terminal.draw(|f| ui(f, &mut app))?;

        app.check_engine_events();

        if app.conversation.is_busy() {
            app.advance_thinking_animation();
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) => {
                    should_quit = !app.handle_key_event(key);
                }
                Event::Mouse(mouse) => {
                    let area = terminal.size()?;
                    app.handle_mouse(
                        mouse,
                        Rect {
                            x: 0,
                            y: 0,
                            width: area.width,
                            height: area.height,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app() -> App {
        App::new(
            "http://127.0.0.1:9/api/chat".to_string(),
            Size {
                width: 120,
                height: 40,
            },
        )
    }

    #[tokio::test]
    async fn submission_while_busy_is_a_silent_no_op() {
        let mut app = test_app();
        app.input = Input::new("first question".to_string());
        app.submit();
        assert!(app.conversation.is_busy());
        assert_eq!(app.input.value(), "");

        app.input = Input::new("second question".to_string());
        app.submit();
        // Rejected: nothing appended, nothing displayed, input retained.
        assert_eq!(app.conversation.turns().len(), 2);
        assert_eq!(app.input.value(), "second question");
    }

    #[tokio::test]
    async fn blank_submission_is_a_silent_no_op() {
        let mut app = test_app();
        app.input = Input::new("   ".to_string());
        app.submit();
        assert!(app.conversation.turns().is_empty());
        assert!(!app.conversation.is_busy());
        assert_eq!(app.input.value(), "   ");
    }
}
