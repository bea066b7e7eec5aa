//! TUI application state and event loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use parley_core::{Backend, ConversationId, ProviderKind};
use parley_render::{DiagramBackend, DiagramWorker};

use crate::controller::{ChatController, SessionEvent};
use crate::settings::SettingsDraft;
use crate::tui::events::{key_to_action, InputAction};
use crate::tui::ui;

const TICK: Duration = Duration::from_millis(33);

/// Slash commands typed into the input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    New,
    Conversations,
    Open(i64),
    Settings,
    Provider(String),
    Help,
}

/// Parse a slash command. `None` means the input is a chat message.
pub fn parse_command(input: &str) -> Option<Command> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let mut parts = trimmed.split_whitespace();
    match parts.next()? {
        "/quit" | "/exit" | "/q" => Some(Command::Quit),
        "/new" | "/n" => Some(Command::New),
        "/conversations" | "/list" | "/ls" => Some(Command::Conversations),
        "/open" | "/o" => parts.next().and_then(|id| id.parse().ok()).map(Command::Open),
        "/settings" => Some(Command::Settings),
        "/provider" => parts.next().map(|p| Command::Provider(p.to_string())),
        "/help" | "/?" => Some(Command::Help),
        _ => Some(Command::Help),
    }
}

fn provider_from_str(name: &str) -> Option<ProviderKind> {
    match name {
        "local" => Some(ProviderKind::Local),
        "openai" => Some(ProviderKind::OpenAI),
        "gemini" => Some(ProviderKind::Gemini),
        "anthropic" => Some(ProviderKind::Anthropic),
        _ => None,
    }
}

pub struct App {
    pub controller: ChatController,
    backend: Arc<dyn Backend>,
    pub input: Input,
    pub diagrams: DiagramWorker,
    pub scroll: u16,
    /// Stick to the bottom of the transcript while a reply streams in.
    pub follow: bool,
    pub status: Option<String>,
    /// Full-screen text overlay (help, conversation list). Any key closes.
    pub overlay: Option<String>,
    pub should_quit: bool,
    pub viewport_height: u16,
    pub content_height: u16,

    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: mpsc::Receiver<SessionEvent>,
}

impl App {
    pub fn new(backend: Arc<dyn Backend>, diagram_backend: Arc<dyn DiagramBackend>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(100);
        Self {
            controller: ChatController::new(Arc::clone(&backend)),
            backend,
            input: Input::default(),
            diagrams: DiagramWorker::new(diagram_backend),
            scroll: 0,
            follow: true,
            status: None,
            overlay: None,
            should_quit: false,
            viewport_height: 0,
            content_height: 0,
            event_tx,
            event_rx,
        }
    }

    /// Apply all session events that have arrived since the last tick.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            if let Err(e) = self.controller.apply(event) {
                self.status = Some(e.to_string());
            }
        }
    }

    /// Open a conversation by id, resolving its title from the backend list.
    pub async fn open_by_id(&mut self, id: i64) {
        let id = ConversationId(id);
        match self.backend.list_conversations().await {
            Ok(summaries) => match summaries.into_iter().find(|s| s.id == id) {
                Some(summary) => {
                    let title = summary.title.clone();
                    self.diagrams.clear();
                    self.controller.switch_to(summary, self.event_tx.clone());
                    self.follow = true;
                    self.status = Some(format!("opened: {title}"));
                }
                None => {
                    self.status = Some(format!("no conversation with id {id}"));
                }
            },
            Err(e) => {
                self.status = Some(format!("could not list conversations: {e}"));
            }
        }
    }

    /// Handle a submitted input line: either a slash command or a message.
    pub async fn submit(&mut self) {
        let line = self.input.value().trim().to_string();
        self.input.reset();
        if line.is_empty() {
            return;
        }

        if let Some(command) = parse_command(&line) {
            self.run_command(command).await;
            return;
        }

        match self.controller.send(&line, self.event_tx.clone()) {
            Ok(()) => {
                self.follow = true;
                self.status = None;
            }
            Err(e) => {
                self.status = Some(e.to_string());
            }
        }
    }

    async fn run_command(&mut self, command: Command) {
        match command {
            Command::Quit => {
                self.should_quit = true;
            }
            Command::New => {
                self.diagrams.clear();
                self.controller.new_chat();
                self.status = Some("new conversation".to_string());
            }
            Command::Conversations => match self.backend.list_conversations().await {
                Ok(summaries) if summaries.is_empty() => {
                    self.overlay = Some("No conversations yet.".to_string());
                }
                Ok(summaries) => {
                    let mut text = String::from("Conversations (open with /open <id>):\n\n");
                    for summary in summaries {
                        text.push_str(&format!("  {:>4}  {}\n", summary.id, summary.title));
                    }
                    self.overlay = Some(text);
                }
                Err(e) => {
                    self.status = Some(format!("could not list conversations: {e}"));
                }
            },
            Command::Open(id) => self.open_by_id(id).await,
            Command::Settings => match SettingsDraft::load(self.backend.as_ref()).await {
                Ok(draft) => {
                    self.overlay = Some(format!("Settings\n\n{}", draft.summary()));
                }
                Err(e) => {
                    self.status = Some(format!("could not load settings: {e}"));
                }
            },
            Command::Provider(name) => {
                let Some(provider) = provider_from_str(&name) else {
                    self.status =
                        Some(format!("unknown provider '{name}' (local, openai, gemini, anthropic)"));
                    return;
                };
                let result = async {
                    let mut draft = SettingsDraft::load(self.backend.as_ref()).await?;
                    draft.set_provider(provider);
                    draft.save(self.backend.as_ref()).await
                }
                .await;
                self.status = Some(match result {
                    Ok(()) => format!("provider set to {provider}"),
                    Err(e) => format!("could not update provider: {e}"),
                });
            }
            Command::Help => {
                self.overlay = Some(HELP.to_string());
            }
        }
    }

    pub fn handle_action(&mut self, action: InputAction) {
        match action {
            InputAction::Quit => self.should_quit = true,
            InputAction::Stop => {
                self.controller.stop();
                self.status = Some("stopping".to_string());
            }
            InputAction::NewChat => {
                self.diagrams.clear();
                self.controller.new_chat();
            }
            InputAction::ScrollUp => self.scroll_by(-1),
            InputAction::ScrollDown => self.scroll_by(1),
            InputAction::PageUp => self.scroll_by(-(self.viewport_height.max(1) as i32)),
            InputAction::PageDown => self.scroll_by(self.viewport_height.max(1) as i32),
            InputAction::Submit => {}
        }
    }

    fn scroll_by(&mut self, delta: i32) {
        self.follow = false;
        let max = self.content_height.saturating_sub(self.viewport_height);
        let next = (self.scroll as i32 + delta).clamp(0, max as i32);
        self.scroll = next as u16;
        if self.scroll == max {
            self.follow = true;
        }
    }

    /// Terminal event loop. Draws at the tick rate, drains session events
    /// every frame, and forwards unhandled keys to the line editor.
    pub async fn run(mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    ) -> Result<()> {
        loop {
            self.drain_events();
            if self.follow {
                self.scroll = self.content_height.saturating_sub(self.viewport_height);
            }

            terminal.draw(|frame| ui::render(self, frame))?;

            if event::poll(TICK)? {
                if let Event::Key(key) = event::read()? {
                    if self.overlay.is_some() {
                        self.overlay = None;
                        continue;
                    }
                    match key_to_action(key, self.controller.is_busy()) {
                        Some(InputAction::Submit) => self.submit().await,
                        Some(action) => self.handle_action(action),
                        None => {
                            self.input.handle_event(&Event::Key(key));
                        }
                    }
                }
            }

            if self.should_quit {
                return Ok(());
            }
        }
    }
}

const HELP: &str = "\
Commands:
  /new             start a fresh conversation
  /conversations   list conversations
  /open <id>       open a conversation
  /settings        show backend settings
  /provider <p>    switch provider (local, openai, gemini, anthropic)
  /quit            exit

Keys:
  Enter            send message
  Esc / Ctrl+C     stop the streaming reply
  Ctrl+N           new conversation
  Up/Down, PgUp/PgDn  scroll transcript
  Ctrl+C / Ctrl+D  quit (when idle)";

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::testing::{MockBackend, MockChat};
    use parley_core::{ConversationSummary, Role, Turn, TurnState};

    struct NoDiagrams;
    #[async_trait]
    impl DiagramBackend for NoDiagrams {
        async fn compile(&self, _source: &str) -> Result<String, parley_core::Error> {
            Ok(String::new())
        }
    }

    fn app_with(backend: Arc<MockBackend>) -> App {
        App::new(backend as Arc<dyn Backend>, Arc::new(NoDiagrams))
    }

    async fn settle(app: &mut App) {
        for _ in 0..200 {
            app.drain_events();
            if !app.controller.is_busy() {
                // One more pass for anything still queued.
                tokio::time::sleep(Duration::from_millis(5)).await;
                app.drain_events();
                if !app.controller.is_busy() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("app never settled");
    }

    fn type_line(app: &mut App, line: &str) {
        app.input = Input::new(line.to_string());
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/quit"), Some(Command::Quit));
        assert_eq!(parse_command("/open 12"), Some(Command::Open(12)));
        assert_eq!(parse_command("/open nope"), None);
        assert_eq!(
            parse_command("/provider openai"),
            Some(Command::Provider("openai".into()))
        );
        assert_eq!(parse_command("/bogus"), Some(Command::Help));
        assert_eq!(parse_command("hello there"), None);
    }

    #[tokio::test]
    async fn test_submit_sends_and_streams_reply() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_chat(MockChat::fragments(&["Hi ", "there"]));
        let mut app = app_with(backend.clone());

        type_line(&mut app, "Hello");
        app.submit().await;
        assert_eq!(app.input.value(), "");
        settle(&mut app).await;

        let snap = app.controller.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[1].turn.content, "Hi there");
        assert_eq!(backend.created_titles.lock().unwrap().as_slice(), ["Hello"]);
    }

    #[tokio::test]
    async fn test_submit_while_streaming_sets_status() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_chat(MockChat::Script(vec![
            parley_core::testing::ScriptItem::Fragment("...".into()),
            parley_core::testing::ScriptItem::HoldUntilCancelled,
        ]));
        let mut app = app_with(backend.clone());

        type_line(&mut app, "first");
        app.submit().await;
        // Wait for the stream to open.
        for _ in 0..200 {
            app.drain_events();
            if app.controller.is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        type_line(&mut app, "second");
        app.submit().await;
        assert!(app.status.is_some());
        assert_eq!(backend.chat_request_count(), 1);

        app.handle_action(InputAction::Stop);
        settle(&mut app).await;
        let last = app.controller.snapshot();
        assert_eq!(last.last().unwrap().state, TurnState::Aborted);
    }

    #[tokio::test]
    async fn test_open_command_switches_conversation() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_conversations(vec![ConversationSummary {
            id: ConversationId(3),
            title: "Earlier".into(),
        }]);
        backend.queue_history(ConversationId(3), vec![Turn::user("q"), Turn::assistant("a")]);
        let mut app = app_with(backend);

        type_line(&mut app, "/open 3");
        app.submit().await;
        for _ in 0..200 {
            app.drain_events();
            if app.controller.snapshot().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let snap = app.controller.snapshot();
        assert_eq!(snap[1].turn.role, Role::Assistant);
        assert_eq!(app.controller.conversation().unwrap().id, ConversationId(3));
    }

    #[tokio::test]
    async fn test_open_unknown_id_reports_status() {
        let backend = Arc::new(MockBackend::new());
        let mut app = app_with(backend);
        type_line(&mut app, "/open 99");
        app.submit().await;
        assert!(app.status.as_deref().unwrap().contains("99"));
    }

    #[tokio::test]
    async fn test_provider_command_saves_settings() {
        let backend = Arc::new(MockBackend::new());
        let mut app = app_with(backend.clone());

        type_line(&mut app, "/provider anthropic");
        app.submit().await;

        let stored = backend.stored_configs.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].provider, ProviderKind::Anthropic);
    }

    #[tokio::test]
    async fn test_conversations_command_fills_overlay() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_conversations(vec![ConversationSummary {
            id: ConversationId(1),
            title: "About fences".into(),
        }]);
        let mut app = app_with(backend);

        type_line(&mut app, "/conversations");
        app.submit().await;
        assert!(app.overlay.as_deref().unwrap().contains("About fences"));
    }

    #[tokio::test]
    async fn test_scrolling_clamps_and_restores_follow() {
        let backend = Arc::new(MockBackend::new());
        let mut app = app_with(backend);
        app.viewport_height = 10;
        app.content_height = 25;
        app.scroll = 15;

        app.handle_action(InputAction::ScrollUp);
        assert_eq!(app.scroll, 14);
        assert!(!app.follow);

        app.handle_action(InputAction::PageDown);
        assert_eq!(app.scroll, 15);
        assert!(app.follow);

        app.handle_action(InputAction::PageUp);
        app.handle_action(InputAction::PageUp);
        assert_eq!(app.scroll, 0);
    }
}
