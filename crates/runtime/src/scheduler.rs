//! Activity scheduler: decides, moment to moment, whether the next turn is
//! user-driven, desire-driven, or nothing at all.
//!
//! A background task reads stdin into an unbounded queue so typed lines are
//! captured even while a turn is in flight. Queued input always wins over
//! autonomy; desires only fire after a cooldown from the last interaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::warn;

use familiar_agent::EmbodiedAgent;
use familiar_config::locale::{tr, try_tr, Lang};
use familiar_desires::{Desire, Desires};

use crate::chat_log::ChatLog;

/// Seconds between desire checks when idle.
pub const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(10);
/// Seconds after the last user interaction before desires can fire.
pub const DESIRE_COOLDOWN: Duration = Duration::from_secs(90);

/// One item from the input reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Eof,
}

pub type InputRx = Arc<Mutex<UnboundedReceiver<Input>>>;

pub fn input_channel() -> (UnboundedSender<Input>, InputRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Arc::new(Mutex::new(rx)))
}

/// Read stdin continuously into the queue until EOF.
pub fn spawn_stdin_reader(tx: UnboundedSender<Input>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(Input::Line(line.trim().to_string())).is_err() {
                        return;
                    }
                }
                Ok(None) | Err(_) => {
                    let _ = tx.send(Input::Eof);
                    return;
                }
            }
        }
    })
}

/// Where scheduler output goes. The binary prints to the terminal; tests
/// record.
pub trait Ui: Send + Sync {
    /// Streamed assistant text chunk.
    fn text(&self, chunk: &str);
    /// A tool invocation, for progress display.
    fn action(&self, name: &str, input: &Value);
    /// A whole line (murmurs, command feedback).
    fn line(&self, text: &str);
}

/// Terminal UI with localized action labels.
pub struct ConsoleUi {
    lang: Lang,
}

impl ConsoleUi {
    pub fn new(lang: Lang) -> Self {
        Self { lang }
    }
}

impl Ui for ConsoleUi {
    fn text(&self, chunk: &str) {
        use std::io::Write;
        print!("{chunk}");
        let _ = std::io::stdout().flush();
    }

    fn action(&self, name: &str, input: &Value) {
        println!("  {}", format_action(self.lang, name, input));
    }

    fn line(&self, text: &str) {
        println!("{text}");
    }
}

/// Human-readable one-liner for a tool call.
pub fn format_action(lang: Lang, name: &str, input: &Value) -> String {
    match name {
        "look" => {
            let key = match input.get("direction").and_then(Value::as_str) {
                Some("left") => "look_left",
                Some("right") => "look_right",
                Some("up") => "look_up",
                Some("down") => "look_down",
                _ => "look_around",
            };
            format!("↩️  {}...", tr(lang, key))
        }
        "walk" => {
            let direction = input.get("direction").and_then(Value::as_str).unwrap_or("?");
            match input.get("duration").and_then(Value::as_f64) {
                Some(duration) => format!("🚶 {direction} {duration}s..."),
                None => format!("🚶 {direction}..."),
            }
        }
        "say" => {
            let text = input.get("text").and_then(Value::as_str).unwrap_or("");
            let head: String = text.chars().take(40).collect();
            format!("💬 「{head}...」")
        }
        other => match try_tr(lang, &format!("action_{other}")) {
            Some(label) => label.to_string(),
            None => format!("⚙  {other}..."),
        },
    }
}

/// Fold a line typed during the decision window into the impulse prompt,
/// rather than treating it as a separate turn.
fn fold_note(note: &str, prompt: &str) -> String {
    format!("（{note}）{prompt}")
}

#[derive(Debug, PartialEq, Eq)]
enum Handled {
    Continue,
    Quit,
}

pub struct Scheduler {
    agent: EmbodiedAgent,
    desires: Desires,
    lang: Lang,
    companion: String,
    debug: bool,
    ui: Arc<dyn Ui>,
    chat_log: ChatLog,
    rx: InputRx,
    eof: Arc<AtomicBool>,
    last_interaction: Instant,
    idle_interval: Duration,
    cooldown: Duration,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: EmbodiedAgent,
        desires: Desires,
        lang: Lang,
        companion: String,
        debug: bool,
        ui: Arc<dyn Ui>,
        chat_log: ChatLog,
        rx: InputRx,
    ) -> Self {
        Self {
            agent,
            desires,
            lang,
            companion,
            debug,
            ui,
            chat_log,
            rx,
            eof: Arc::new(AtomicBool::new(false)),
            last_interaction: Instant::now(),
            idle_interval: IDLE_CHECK_INTERVAL,
            cooldown: DESIRE_COOLDOWN,
        }
    }

    /// Shrink the waiting periods, for tests.
    pub fn with_timing(mut self, idle_interval: Duration, cooldown: Duration) -> Self {
        self.idle_interval = idle_interval;
        self.cooldown = cooldown;
        self
    }

    /// Interrupt poll handed to the turn engine: a line typed mid-turn.
    fn interrupt_poll(&self) -> impl Fn() -> Option<String> + Send + Sync {
        let rx = Arc::clone(&self.rx);
        let eof = Arc::clone(&self.eof);
        move || {
            let mut guard = rx.try_lock().ok()?;
            match guard.try_recv() {
                Ok(Input::Line(line)) if !line.is_empty() => Some(line),
                Ok(Input::Eof) => {
                    eof.store(true, Ordering::SeqCst);
                    None
                }
                _ => None,
            }
        }
    }

    /// Pull everything currently queued, without waiting.
    async fn drain(&self) -> Vec<String> {
        let mut pending = Vec::new();
        let mut guard = self.rx.lock().await;
        while let Ok(input) = guard.try_recv() {
            match input {
                Input::Line(line) if !line.is_empty() => pending.push(line),
                Input::Line(_) => {}
                Input::Eof => self.eof.store(true, Ordering::SeqCst),
            }
        }
        pending
    }

    /// The scheduler loop. Returns when the user quits or stdin closes.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            // Buffered user input always comes first.
            let pending = self.drain().await;
            let mut quit = false;
            for line in pending {
                if self.handle_user(&line).await == Handled::Quit {
                    quit = true;
                    break;
                }
            }
            if quit || self.eof.load(Ordering::SeqCst) {
                break;
            }

            // Nothing pending: wait briefly for input.
            let waited = {
                let rx = Arc::clone(&self.rx);
                tokio::time::timeout(self.idle_interval, async move {
                    rx.lock().await.recv().await
                })
                .await
            };

            match waited {
                Ok(Some(Input::Line(line))) => {
                    if !line.is_empty() && self.handle_user(&line).await == Handled::Quit {
                        break;
                    }
                }
                Ok(Some(Input::Eof)) | Ok(None) => break,
                Err(_) => {
                    // Genuine idle. Respect the post-conversation cooldown,
                    // then let the strongest desire drive a turn.
                    if self.last_interaction.elapsed() < self.cooldown {
                        continue;
                    }
                    self.maybe_desire_turn().await;
                    if self.eof.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }

        self.agent.close().await;
        self.ui.line(tr(self.lang, "repl_goodbye"));
        Ok(())
    }

    async fn maybe_desire_turn(&mut self) {
        let Some((desire, mut prompt)) =
            self.desires.dominant_as_prompt(self.lang, &self.companion)
        else {
            return;
        };

        let murmur_key = format!("desire_{}", desire.as_str());
        let murmur = try_tr(self.lang, &murmur_key)
            .unwrap_or_else(|| tr(self.lang, "desire_default"));
        self.ui.line("");
        self.ui.line(murmur);

        // The user may have typed while we were deciding. Weave their words
        // into the impulse so the agent knows who it is talking to.
        if let Some(note) = self.pop_one_line().await {
            prompt = fold_note(&note, &prompt);
        }

        self.chat_log.note(&format!("impulse: {prompt}"));
        let reply = self.run_turn("", &prompt).await;
        if let Some(reply) = reply {
            self.chat_log.agent(&reply);
        }

        self.desires.satisfy(desire);
        self.desires.set_curiosity_target(None);

        // Process anything typed during the desire turn, in arrival order.
        let buffered = self.drain().await;
        for line in buffered {
            if self.handle_user(&line).await == Handled::Quit {
                self.eof.store(true, Ordering::SeqCst);
                return;
            }
        }
    }

    async fn pop_one_line(&self) -> Option<String> {
        let mut guard = self.rx.lock().await;
        match guard.try_recv() {
            Ok(Input::Line(line)) if !line.is_empty() => Some(line),
            Ok(Input::Eof) => {
                self.eof.store(true, Ordering::SeqCst);
                None
            }
            _ => None,
        }
    }

    async fn handle_user(&mut self, line: &str) -> Handled {
        self.last_interaction = Instant::now();
        match line {
            "/quit" => return Handled::Quit,
            "/clear" => {
                self.agent.clear_history();
                self.ui.line(tr(self.lang, "repl_history_cleared"));
                self.chat_log.note("history cleared");
            }
            "/desires" if self.debug => {
                self.ui.line("[debug] desires:");
                for (desire, level) in self.desires.snapshot() {
                    let bar = "█".repeat((level * 20.0) as usize);
                    self.ui.line(&format!("  {:20} {level:.2} {bar}", desire.as_str()));
                }
            }
            _ => {
                self.chat_log.user(line);
                self.ui.line("");
                if let Some(reply) = self.run_turn(line, "").await {
                    self.chat_log.agent(&reply);
                }
                if let Some(target) = self.desires.curiosity_target() {
                    self.ui.line(&format!("\n  [{target}]"));
                }
                self.desires.satisfy(Desire::GreetCompanion);
            }
        }
        Handled::Continue
    }

    /// One engine invocation with UI callbacks and the interrupt channel.
    async fn run_turn(&mut self, user_input: &str, inner_voice: &str) -> Option<String> {
        let ui_for_action = Arc::clone(&self.ui);
        let ui_for_text = Arc::clone(&self.ui);
        let on_action =
            move |name: &str, input: &Value| ui_for_action.action(name, input);
        let on_text = move |chunk: &str| ui_for_text.text(chunk);
        let poll = self.interrupt_poll();

        match self
            .agent
            .run(user_input, &on_action, &on_text, inner_voice, Some(&poll))
            .await
        {
            Ok(reply) => {
                self.ui.line("");
                Some(reply)
            }
            Err(e) => {
                warn!(error = %e, "turn failed");
                self.ui.line(&format!("[backend error: {e}]"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fold_note_wraps_parenthetically() {
        assert_eq!(fold_note("コウタだよ", "周りが気になる。"), "（コウタだよ）周りが気になる。");
    }

    #[test]
    fn format_action_look_directions() {
        let out = format_action(Lang::En, "look", &json!({"direction": "left"}));
        assert!(out.contains("looked left"));
        let out = format_action(Lang::Ja, "look", &json!({"direction": "up"}));
        assert!(out.contains("上を向いた"));
    }

    #[test]
    fn format_action_walk_with_and_without_duration() {
        let timed = format_action(Lang::En, "walk", &json!({"direction": "forward", "duration": 2.0}));
        assert!(timed.contains("forward 2s"));
        let untimed = format_action(Lang::En, "walk", &json!({"direction": "left"}));
        assert!(untimed.contains("left..."));
    }

    #[test]
    fn format_action_say_truncates() {
        let text = "あ".repeat(100);
        let out = format_action(Lang::Ja, "say", &json!({"text": text}));
        assert!(out.chars().count() < 60);
    }

    #[test]
    fn format_action_unknown_tool_falls_back() {
        let out = format_action(Lang::En, "mystery_tool", &json!({}));
        assert_eq!(out, "⚙  mystery_tool...");
        // Known action keys resolve through the table.
        let out = format_action(Lang::En, "see", &json!({}));
        assert!(out.contains("looking"));
    }
}
