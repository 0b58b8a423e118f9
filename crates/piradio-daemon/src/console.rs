//! Terminal output.  The keyboard task puts the terminal in raw mode, so every
//! line written here ends in `\r\n`.
use std::io::Write;

use tracing::Level;

/// Print user-facing text on the console, one terminal line per text line.
pub fn say(text: &str) {
    let mut out = std::io::stdout().lock();
    for line in text.lines() {
        let _ = write!(out, "{}\r\n", line);
    }
    let _ = out.flush();
}

/// A tracing layer that echoes log events on the console.
///
/// Only WARN and ERROR are echoed unless `verbose` is set; the file layer
/// keeps everything the filter lets through.
pub struct ConsoleLayer {
    verbose: bool,
}

impl ConsoleLayer {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn echoes(&self, level: &Level) -> bool {
        self.verbose || matches!(*level, Level::WARN | Level::ERROR)
    }
}

impl<S> tracing_subscriber::Layer<S> for ConsoleLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !self.echoes(level) {
            return;
        }
        let mut line = format_prefix(level);
        let mut visitor = MessageVisitor(&mut line);
        event.record(&mut visitor);
        say(&line);
    }
}

fn format_prefix(level: &Level) -> String {
    format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level)
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}
