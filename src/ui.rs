use crate::{
    client::PortalView,
    gateway::{
        self,
        GATE_TITLE,
        GATE_UNLOCKED,
        GUARDIAN_TITLE,
    },
    notices::NoticeLevel,
    session::PortalState,
    sketchpad::{
        self,
        GRID_SIZE,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::event::{
    Event,
    EventStream,
    KeyCode,
    KeyEventKind,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use futures::StreamExt;
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::io::stdout;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Enter,
    Unlock,
    PassphraseChar(char),
    PassphraseBackspace,
    SketchMove(sketchpad::Direction),
    SketchTogglePen,
    SketchClear,
    SubmitDrawing,
    NewDrawing,
    BackToReality,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    Hints,
    Guardian,
    Passphrase,
    QuitModal,
}

pub type InputEventReceiver = EventStream;

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // One persistent Terminal keeps buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, view: &PortalView<'_>) -> Result<()> {
    settle_mode(state, view);
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, view))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Drops modals that no longer make sense, e.g. after a forced logout.
fn settle_mode(state: &mut UiState, view: &PortalView<'_>) {
    let in_main = view.state.is_main();
    state.mode = match state.mode {
        Mode::Hints | Mode::Guardian if !in_main => Mode::Normal,
        Mode::Passphrase if !in_main || !view.gate_visible() || view.gate_unlocked() => {
            Mode::Normal
        }
        mode => mode,
    };
}

/// Maps one terminal event to a portal action, updating local modal state.
pub fn interpret_event(
    state: &mut UiState,
    view: &PortalView<'_>,
    event: Event,
) -> Option<UserEvent> {
    let Event::Key(k) = event else {
        return match event {
            Event::Resize(..) => Some(UserEvent::Redraw),
            _ => None,
        };
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }
    settle_mode(state, view);

    match state.mode {
        Mode::QuitModal => match k.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Hints => match k.code {
            KeyCode::Esc | KeyCode::Char('h') => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Passphrase => match k.code {
            KeyCode::Esc | KeyCode::Tab => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => Some(UserEvent::Unlock),
            KeyCode::Backspace => Some(UserEvent::PassphraseBackspace),
            KeyCode::Char(c) if !c.is_control() => Some(UserEvent::PassphraseChar(c)),
            _ => None,
        },
        Mode::Guardian => match k.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Up => Some(UserEvent::SketchMove(sketchpad::Direction::Up)),
            KeyCode::Down => Some(UserEvent::SketchMove(sketchpad::Direction::Down)),
            KeyCode::Left => Some(UserEvent::SketchMove(sketchpad::Direction::Left)),
            KeyCode::Right => Some(UserEvent::SketchMove(sketchpad::Direction::Right)),
            KeyCode::Char(' ') => Some(UserEvent::SketchTogglePen),
            KeyCode::Char('c') => Some(UserEvent::SketchClear),
            KeyCode::Enter | KeyCode::Char('s') => Some(UserEvent::SubmitDrawing),
            KeyCode::Char('n') => Some(UserEvent::NewDrawing),
            _ => None,
        },
        Mode::Normal => match (view.state, k.code) {
            (_, KeyCode::Char('q')) | (_, KeyCode::Esc) => {
                state.mode = Mode::QuitModal;
                Some(UserEvent::Redraw)
            }
            (PortalState::Welcome, KeyCode::Enter) => Some(UserEvent::Enter),
            (PortalState::Completed, KeyCode::Enter | KeyCode::Char('b')) => {
                Some(UserEvent::BackToReality)
            }
            (PortalState::Main { .. }, KeyCode::Char('h')) => {
                state.mode = Mode::Hints;
                Some(UserEvent::Redraw)
            }
            (PortalState::Main { .. }, KeyCode::Char('g')) => {
                state.mode = Mode::Guardian;
                Some(UserEvent::Redraw)
            }
            (PortalState::Main { .. }, KeyCode::Enter | KeyCode::Char('u'))
                if view.gate_unlocked() =>
            {
                Some(UserEvent::Unlock)
            }
            (PortalState::Main { .. }, KeyCode::Tab | KeyCode::Char('p'))
                if view.gate_visible() && !view.gate_unlocked() =>
            {
                state.mode = Mode::Passphrase;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
    }
}

fn ui(f: &mut Frame, state: &UiState, view: &PortalView<'_>) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),   // screen
            Constraint::Length(5), // notices
            Constraint::Length(3), // help
        ])
        .split(f.area());

    match view.state {
        PortalState::Welcome => draw_welcome(f, chunks[0], view),
        PortalState::Main { .. } => draw_main(f, chunks[0], state, view),
        PortalState::Completed => draw_completed(f, chunks[0]),
    }
    draw_notices(f, chunks[1], view);
    draw_help(f, chunks[2], state, view);
    draw_modals(f, state, view);
}

fn draw_welcome(f: &mut Frame, area: Rect, view: &PortalView<'_>) {
    let prompt = if view.entering {
        "Opening the portal..."
    } else {
        "Press Enter to step through the portal"
    };
    let lines = vec![
        Line::from("Welcome, traveller.").bold(),
        Line::from(""),
        Line::from("Beyond this portal the sands of the Hourglass are already falling."),
        Line::from("Earn the guardian's PINs and speak the passphrase before time runs out."),
        Line::from(""),
        Line::from(prompt).fg(Color::Yellow),
    ];
    let p = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("The Hourglass Realm"));
    f.render_widget(p, area);
}

fn draw_main(f: &mut Frame, area: Rect, state: &UiState, view: &PortalView<'_>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(7)])
        .split(area);

    let hint_count = view.snapshot.map(|s| s.hints.len()).unwrap_or(0);
    let timer = Paragraph::new(Line::from(vec![
        Span::raw("Time remaining  "),
        Span::styled(
            view.countdown.to_string(),
            Style::default().fg(Color::Yellow).bold(),
        ),
        Span::raw(format!("    Hints: {hint_count}")),
    ]))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL).title("Hourglass"));
    f.render_widget(timer, rows[0]);

    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[1]);
    draw_guardian_panel(f, panels[0], view);
    draw_gate_panel(f, panels[1], state, view);
}

fn draw_guardian_panel(f: &mut Frame, area: Rect, view: &PortalView<'_>) {
    let progress = view.progress();
    let slots: String = gateway::progress_slots(&progress)
        .iter()
        .map(|filled| if *filled { "● " } else { "○ " })
        .collect();

    let mut lines = vec![
        Line::from(gateway::stage_message(&progress)),
        Line::from(""),
        Line::from(format!("Drawings  {slots}")),
    ];
    for pin in gateway::pin_views(&progress) {
        let style = if pin.expired {
            Style::default().fg(Color::DarkGray).crossed_out()
        } else {
            Style::default().fg(Color::Green).bold()
        };
        lines.push(Line::from(vec![
            Span::raw(format!("{}: ", pin.label)),
            Span::styled(pin.pin, style),
        ]));
    }
    if let Some(reply) = view.guardian.reply() {
        lines.push(Line::from(""));
        lines.push(Line::from(format!("Guardian: {reply}")).italic());
    }
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(GUARDIAN_TITLE));
    f.render_widget(p, area);
}

fn draw_gate_panel(f: &mut Frame, area: Rect, state: &UiState, view: &PortalView<'_>) {
    let block = Block::default().borders(Borders::ALL).title(GATE_TITLE);
    let lines = if view.gate_unlocked() {
        vec![
            Line::from(GATE_UNLOCKED).fg(Color::Green).bold(),
            Line::from(""),
            Line::from("Enter to pass through").fg(Color::DarkGray),
        ]
    } else if view.gate_visible() {
        let focused = state.mode == Mode::Passphrase;
        let cursor = if focused { "_" } else { "" };
        let status = if view.gate.in_flight() {
            "Checking..."
        } else if focused {
            "Enter to unlock, Esc to leave"
        } else {
            "Tab to type the passphrase"
        };
        vec![
            Line::from("Speak the passphrase:"),
            Line::from(format!("> {}{cursor}", view.gate.input())).fg(Color::Yellow),
            Line::from(""),
            Line::from(status).fg(Color::DarkGray),
        ]
    } else {
        vec![Line::from("The gateway stays sealed until both PINs are revealed.").fg(Color::DarkGray)]
    };
    let p = Paragraph::new(lines).wrap(Wrap { trim: true }).block(block);
    f.render_widget(p, area);
}

fn draw_completed(f: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from("The hourglass is still.").bold(),
        Line::from(""),
        Line::from("You spoke the passphrase and the realm lets you go."),
        Line::from(""),
        Line::from("Back to reality (Enter)").fg(Color::Yellow),
    ];
    let p = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Gateway Open"));
    f.render_widget(p, area);
}

fn draw_notices(f: &mut Frame, area: Rect, view: &PortalView<'_>) {
    let lines: Vec<Line> = view
        .notices
        .iter()
        .rev()
        .take(3)
        .map(|n| {
            let color = match n.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Warning => Color::Yellow,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(n.text.clone()).fg(color)
        })
        .collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Notices"));
    f.render_widget(p, area);
}

fn draw_help(f: &mut Frame, area: Rect, state: &UiState, view: &PortalView<'_>) {
    let text = match (state.mode, view.state) {
        (Mode::Guardian, _) => {
            "arrows move | space pen up/down | c clear | Enter submit | n new drawing | Esc close"
        }
        (Mode::Hints, _) => "h/Esc close",
        (Mode::Passphrase, _) => "type passphrase | Enter unlock | Esc leave",
        (_, PortalState::Welcome) => "Enter enter the realm | q/Esc quit",
        (_, PortalState::Main { .. }) if view.gate_unlocked() => {
            "g guardian | h hints | Enter/u pass the gateway | q/Esc quit"
        }
        (_, PortalState::Main { .. }) => "g guardian | h hints | Tab passphrase | q/Esc quit",
        (_, PortalState::Completed) => "Enter back to reality | q/Esc quit",
    };
    let help = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, view: &PortalView<'_>) {
    match state.mode {
        Mode::Hints => {
            let area = centered_rect(60, 60, f.area());
            let block = Block::default().borders(Borders::ALL).title("Hints");
            let hints = view.snapshot.map(|s| s.hints.as_slice()).unwrap_or_default();
            let lines: Vec<Line> = if hints.is_empty() {
                vec![Line::from("No hints yet...")]
            } else {
                hints
                    .iter()
                    .enumerate()
                    .map(|(i, h)| Line::from(format!("{}. {h}", i + 1)))
                    .collect()
            };
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(
                Paragraph::new(lines).wrap(Wrap { trim: true }),
                block.inner(area),
            );
        }
        Mode::Guardian => {
            let area = centered_rect(80, 90, f.area());
            let block = Block::default().borders(Borders::ALL).title(GUARDIAN_TITLE);
            let mut lines = sketch_lines(view);
            lines.push(Line::from(""));
            lines.push(guardian_status(view));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Leave the portal? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal | Mode::Passphrase => {}
    }
}

fn sketch_lines(view: &PortalView<'_>) -> Vec<Line<'static>> {
    let pad = view.sketchpad;
    let (cx, cy) = pad.cursor();
    let cursor_style = if pad.pen_down() {
        Style::default().fg(Color::Black).bg(Color::Yellow)
    } else {
        Style::default().fg(Color::Black).bg(Color::Gray)
    };
    (0..GRID_SIZE)
        .map(|y| {
            let spans: Vec<Span> = (0..GRID_SIZE)
                .map(|x| {
                    if (x, y) == (cx, cy) {
                        Span::styled("[]", cursor_style)
                    } else if pad.is_set(x, y) {
                        Span::styled("██", Style::default().fg(Color::Yellow))
                    } else {
                        Span::styled("··", Style::default().fg(Color::DarkGray))
                    }
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn guardian_status(view: &PortalView<'_>) -> Line<'static> {
    let progress = view.progress();
    let guardian = view.guardian;
    if guardian.in_flight() {
        return Line::from("The guardian is studying your drawing...").fg(Color::Yellow);
    }
    if progress.is_exhausted() {
        return Line::from("The guardian has nothing more to give.").fg(Color::DarkGray);
    }
    if let Some(reply) = guardian.reply() {
        return Line::from(format!("Guardian: {reply}  (n for a new drawing)")).italic();
    }
    if guardian.has_staged_image() {
        Line::from("Drawing ready. Enter to show it to the guardian.").fg(Color::Green)
    } else {
        Line::from("Draw with the pen down, lift it to finish the stroke.").fg(Color::DarkGray)
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
