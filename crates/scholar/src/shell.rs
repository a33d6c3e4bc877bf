//! The terminal chat loop.

use std::io::{self, Write};
use std::pin::pin;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{OwoColorize, Style};
use scholar_core::conversation::{Message, Role};
use scholar_core::tool::Observation;
use scholar_core::{EventSink, TurnError, TurnEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::select;
use tokio::time::sleep;

use crate::{Session, SessionBuilder};

/// Shown before the first prompt. It is never part of the transcript.
pub const GREETING: &str =
    "Hi, I'm a chatbot who can search the web. How can I help you?";

/// The example prompt shown with the greeting.
pub const PLACEHOLDER_PROMPT: &str = "What is machine learning?";

const TITLE: &str = "🔎 Scholar - Chat with Search";
const BAR_CHAR: &str = "▎";
const OBSERVATION_PREVIEW_CHARS: usize = 160;

/// Reads one utterance per line from `input`, runs it through a session and
/// renders the turn to `output`.
///
/// The session is created when the first utterance arrives and dropped with
/// the shell. Run with `interactive` set on a terminal to get colors and a
/// spinner.
pub struct ChatShell<R, W> {
    input: R,
    output: W,
    builder: SessionBuilder,
    session: Option<Session>,
    model: Option<String>,
    interactive: bool,
}

impl<R: AsyncBufRead + Unpin, W: Write> ChatShell<R, W> {
    /// Creates a shell that builds its session from `builder`.
    pub fn new(builder: SessionBuilder, input: R, output: W) -> Self {
        Self {
            input,
            output,
            builder,
            session: None,
            model: None,
            interactive: false,
        }
    }

    /// Sets the model name shown in the header.
    #[inline]
    pub fn with_model_name<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Enables colors and the spinner.
    #[inline]
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Returns the session, once the first utterance created it.
    #[inline]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Consumes the shell and returns its output.
    #[inline]
    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs until `/quit`, `/exit` or the end of the input.
    pub async fn run(&mut self) -> io::Result<()> {
        self.render_header()?;
        loop {
            write!(self.output, "> ")?;
            self.output.flush()?;

            let mut buf = vec![];
            if self.input.read_until(b'\n', &mut buf).await? == 0 {
                writeln!(self.output)?;
                break;
            }
            let Ok(line) = String::from_utf8(buf) else {
                warn!("skipped an input line that is not valid UTF-8");
                writeln!(self.output, "(the input is not valid UTF-8, try again)")?;
                continue;
            };
            let line = line.trim();
            match line {
                "" => continue,
                "/quit" | "/exit" => break,
                "/history" => self.render_history()?,
                _ => self.run_turn(line).await?,
            }
        }
        if let Some(session) = &self.session {
            info!("leaving session {}", session.id());
        }
        Ok(())
    }

    async fn run_turn(&mut self, input: &str) -> io::Result<()> {
        let session = self
            .session
            .get_or_insert_with(|| self.builder.clone().build());
        let mut renderer = TurnRenderer::new(&mut self.output, self.interactive);

        let (sink, mut events) = EventSink::channel();
        let mut turn = pin!(session.send_message(input, &sink));
        let result = loop {
            renderer.tick();
            select! {
                biased;
                Some(event) = events.recv() => renderer.render(event)?,
                result = &mut turn => break result,
                _ = sleep(Duration::from_millis(100)) => {}
            }
        };
        while let Ok(event) = events.try_recv() {
            renderer.render(event)?;
        }

        match result {
            Ok(answer) => renderer.finish(answer.content()),
            Err(err) => renderer.fail(&err),
        }
    }

    fn render_header(&mut self) -> io::Result<()> {
        let bold = self.paint(Style::new().bold());
        let dimmed = self.paint(Style::new().dimmed());
        writeln!(self.output, "{}", TITLE.style(bold))?;
        if let Some(model) = &self.model {
            writeln!(self.output, "{}", format!("model: {model}").style(dimmed))?;
        }
        writeln!(self.output)?;
        let bar = self.bar(Role::Assistant);
        writeln!(self.output, "{bar}🤖 {GREETING}")?;
        writeln!(
            self.output,
            "{}",
            format!("   Try asking: {PLACEHOLDER_PROMPT}").style(dimmed)
        )?;
        writeln!(self.output)
    }

    fn render_history(&mut self) -> io::Result<()> {
        let transcript = self.session.as_ref().map(Session::transcript);
        let Some(transcript) = transcript.filter(|t| !t.is_empty()) else {
            return writeln!(self.output, "(no messages yet)");
        };
        let lines: Vec<_> = transcript.iter().map(|msg| self.history_line(msg)).collect();
        for line in lines {
            writeln!(self.output, "{line}")?;
        }
        Ok(())
    }

    fn history_line(&self, msg: &Message) -> String {
        let icon = match msg.role() {
            Role::User => "🧑",
            Role::Assistant => "🤖",
        };
        format!("{}{icon} {}", self.bar(msg.role()), msg.content())
    }

    fn bar(&self, role: Role) -> String {
        let style = match role {
            Role::User => Style::new().bright_green(),
            Role::Assistant => Style::new().bright_cyan(),
        };
        BAR_CHAR.style(self.paint(style)).to_string()
    }

    fn paint(&self, style: Style) -> Style {
        if self.interactive { style } else { Style::new() }
    }
}

/// Renders the events of one turn.
struct TurnRenderer<'a, W: Write> {
    output: &'a mut W,
    interactive: bool,
    spinner: Option<ProgressBar>,
    // Text streamed during the current iteration, and whether a line of it
    // is still open.
    streamed: String,
    line_open: bool,
}

impl<'a, W: Write> TurnRenderer<'a, W> {
    fn new(output: &'a mut W, interactive: bool) -> Self {
        Self {
            output,
            interactive,
            spinner: None,
            streamed: String::new(),
            line_open: false,
        }
    }

    fn paint(&self, style: Style) -> Style {
        if self.interactive { style } else { Style::new() }
    }

    fn bar(&self, style: Style) -> String {
        BAR_CHAR.style(self.paint(style)).to_string()
    }

    fn tick(&mut self) {
        if let Some(spinner) = &self.spinner {
            spinner.inc(1);
        }
    }

    fn start_spinner(&mut self) {
        if !self.interactive || self.spinner.is_some() {
            return;
        }
        let style = ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.set_message("🤔 Thinking...");
        self.spinner = Some(spinner);
    }

    // Finish the spinner before printing anything else.
    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn close_line(&mut self) -> io::Result<()> {
        if self.line_open {
            self.line_open = false;
            writeln!(self.output)?;
        }
        Ok(())
    }

    fn render(&mut self, event: TurnEvent) -> io::Result<()> {
        if !matches!(event, TurnEvent::Thinking { .. }) {
            self.stop_spinner();
        }
        match event {
            TurnEvent::Thinking { .. } => {
                self.close_line()?;
                self.streamed.clear();
                self.start_spinner();
            }
            TurnEvent::Token(token) => {
                if !self.line_open {
                    let bar = self.bar(Style::new().bright_cyan());
                    write!(self.output, "{bar}🤖 ")?;
                    self.line_open = true;
                }
                let styled = token.style(self.paint(Style::new().bright_white())).to_string();
                write!(self.output, "{styled}")?;
                self.output.flush()?;
                self.streamed.push_str(&token);
            }
            TurnEvent::Action { tool, query } => {
                self.close_line()?;
                let bar = self.bar(Style::new().bright_yellow());
                let label = format!("{}:", tool.name());
                let label = label.style(self.paint(Style::new().bold())).to_string();
                writeln!(self.output, "{bar}🔧 {label} {query}")?;
            }
            TurnEvent::Observation { tool, observation } => {
                let bar = self.bar(Style::new().bright_yellow());
                let text = match &observation {
                    Observation::Found(text) => preview(text),
                    Observation::Failed(_) => {
                        format!("{} lookup unavailable", tool.title())
                    }
                };
                let text = text.style(self.paint(Style::new().dimmed())).to_string();
                writeln!(self.output, "{bar}📄 {text}")?;
            }
            TurnEvent::Correction { reason } => {
                self.close_line()?;
                let bar = self.bar(Style::new().bright_magenta());
                let reason = reason.style(self.paint(Style::new().dimmed())).to_string();
                writeln!(self.output, "{bar}↩️  {reason}")?;
            }
            TurnEvent::IterationLimit { iterations } => {
                self.close_line()?;
                self.streamed.clear();
                let bar = self.bar(Style::new().bright_magenta());
                let unit = if iterations == 1 { "iteration" } else { "iterations" };
                writeln!(self.output, "{bar}⏱️  Stopped after {iterations} {unit}")?;
            }
        }
        Ok(())
    }

    fn finish(mut self, answer: &str) -> io::Result<()> {
        self.stop_spinner();
        // The answer was already streamed unless it was substituted.
        if self.line_open && self.streamed.trim() == answer {
            self.close_line()?;
        } else {
            self.close_line()?;
            let bar = self.bar(Style::new().bright_cyan());
            let answer = answer.style(self.paint(Style::new().bright_white())).to_string();
            writeln!(self.output, "{bar}🤖 {answer}")?;
        }
        writeln!(self.output)
    }

    fn fail(mut self, err: &TurnError) -> io::Result<()> {
        self.stop_spinner();
        self.close_line()?;
        let bar = self.bar(Style::new().bright_red());
        let text = format!("Error: {err}");
        let text = text.style(self.paint(Style::new().red())).to_string();
        writeln!(self.output, "{bar}❌ {text}")?;
        writeln!(self.output)
    }
}

impl<W: Write> Drop for TurnRenderer<'_, W> {
    fn drop(&mut self) {
        self.stop_spinner();
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = scholar_core::tool::truncate_chars(&flat, OBSERVATION_PREVIEW_CHARS);
    if cut.len() < flat.len() {
        format!("{cut}…")
    } else {
        flat
    }
}
