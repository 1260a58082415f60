// src/system/logger.rs

use colored::Colorize;

use crate::models::Script;

/// One captured line of process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub text: String,
    pub is_err: bool,
}

/// Observer hooks for execution lifecycle events.
///
/// The executor guarantees that calls arrive in dispatch order; beyond that
/// any implementation is acceptable.
pub trait ExecutionLogger {
    fn start_script(&mut self, script: &Script);
    fn finish_script(&mut self, script: &Script);
    /// Announces one command before it runs. `kind` is a short label such as
    /// `"running"`, `"deferred"` or `"template"`.
    fn log_start(
        &mut self,
        kind: &str,
        payload: &str,
        line: usize,
        ignores_error: bool,
        index: usize,
        total: usize,
    );
    fn log(&mut self, message: LogMessage);
    fn log_wait(&mut self);
    fn log_success(&mut self);
    fn log_failure(&mut self);
    fn warn(&mut self, message: &str);
}

/// Colored terminal logger used by the CLI.
#[derive(Debug, Default)]
pub struct ConsoleLogger;

impl ExecutionLogger for ConsoleLogger {
    fn start_script(&mut self, script: &Script) {
        println!("\n▶️  Running script '{}'...", script.name().cyan());
    }

    fn finish_script(&mut self, script: &Script) {
        println!(
            "\n✅ {} Script '{}' completed successfully.",
            "Success:".green().bold(),
            script.name().cyan()
        );
    }

    fn log_start(
        &mut self,
        kind: &str,
        payload: &str,
        line: usize,
        ignores_error: bool,
        index: usize,
        total: usize,
    ) {
        let marker = if ignores_error { "(ignoring errors) " } else { "" };
        println!(
            "{} [{}/{}] {} {}{}",
            "→".blue(),
            index,
            total,
            format!("{} (line {})", kind, line).dimmed(),
            marker.yellow(),
            payload.green()
        );
    }

    fn log(&mut self, message: LogMessage) {
        if message.is_err {
            eprintln!("{}", message.text.red());
        } else {
            println!("{}", message.text);
        }
    }

    fn log_wait(&mut self) {
        println!("{}", "… waiting for background commands".dimmed());
    }

    fn log_success(&mut self) {
        println!("{}", "✔ done".green());
    }

    fn log_failure(&mut self) {
        eprintln!("{}", "✖ failed".red().bold());
    }

    fn warn(&mut self, message: &str) {
        eprintln!("{}: {}", "Warning".yellow().bold(), message);
    }
}

/// Records every event in memory; used by tests asserting call order.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    pub events: Vec<String>,
}

impl ExecutionLogger for RecordingLogger {
    fn start_script(&mut self, script: &Script) {
        self.events.push(format!("start:{}", script.name()));
    }

    fn finish_script(&mut self, script: &Script) {
        self.events.push(format!("finish:{}", script.name()));
    }

    fn log_start(
        &mut self,
        kind: &str,
        payload: &str,
        _line: usize,
        _ignores_error: bool,
        index: usize,
        total: usize,
    ) {
        self.events
            .push(format!("begin[{}/{}]:{}:{}", index, total, kind, payload));
    }

    fn log(&mut self, message: LogMessage) {
        let stream = if message.is_err { "err" } else { "out" };
        self.events.push(format!("{}:{}", stream, message.text));
    }

    fn log_wait(&mut self) {
        self.events.push("wait".to_string());
    }

    fn log_success(&mut self) {
        self.events.push("success".to_string());
    }

    fn log_failure(&mut self) {
        self.events.push("failure".to_string());
    }

    fn warn(&mut self, message: &str) {
        self.events.push(format!("warn:{}", message));
    }
}
