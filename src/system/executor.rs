//! # Process Executor
//!
//! Drives a parsed [`Command`] stream against the operating system. The
//! executor is single-threaded and cooperative: it owns the deferred queue
//! exclusively, and concurrency only ever comes from deferred OS child
//! processes running alongside it.
//!
//! Ordering guarantees: commands run in parse order; a synchronous command
//! fully completes before the next command starts; deferred commands start
//! in parse order and are drained (logs replayed, statuses collected) in
//! insertion order at the next `WAIT` barrier or at the end of the script.
//! The end-of-script drain runs on every exit path, including errors, so no
//! child process is ever orphaned.

use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use thiserror::Error;

use crate::core::template::{self, Template};
use crate::models::{Command, Script};
use crate::system::logger::{ExecutionLogger, LogMessage};
use crate::system::process_env::ProcessEnvironment;

/// Errors raised while executing a command stream.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command '{command}' exited with status {status}")]
    NonZeroExit { command: String, status: i32 },
    #[error("{count} background command(s) exited with a non-zero status")]
    DeferredFailed { count: usize },
    #[error("Failed to spawn command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// One backgrounded child process awaiting the next drain.
struct DeferredProcess {
    command: String,
    ignore_error: bool,
    child: Child,
}

/// Executes command streams within one process environment.
pub struct ProcessExecutor<'a> {
    environment: &'a ProcessEnvironment,
    logger: &'a mut dyn ExecutionLogger,
    working_dir: PathBuf,
    deferred: Vec<DeferredProcess>,
}

impl<'a> ProcessExecutor<'a> {
    /// `working_dir` is the application directory every child process runs in.
    pub fn new(
        environment: &'a ProcessEnvironment,
        logger: &'a mut dyn ExecutionLogger,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            environment,
            logger,
            working_dir,
            deferred: Vec::new(),
        }
    }

    /// Runs the full stream for `script`.
    ///
    /// Environment-level templates are rendered before the first command so
    /// that later commands can read the generated files. The deferred queue
    /// is drained unconditionally before returning; a failure during the
    /// stream takes precedence over failures collected by that final drain.
    pub fn execute(&mut self, script: &Script, commands: &[Command]) -> Result<()> {
        self.logger.start_script(script);

        let run_result = self
            .render_environment_templates()
            .and_then(|_| self.run_commands(commands));
        let drain_result = self.drain_deferred();

        run_result?;
        drain_result?;

        self.logger.finish_script(script);
        Ok(())
    }

    fn render_environment_templates(&mut self) -> Result<()> {
        let templates = self.environment.templates().to_vec();
        for tpl in &templates {
            log::debug!("Rendering template '{}'", tpl.source.display());
            self.render_template(tpl)?;
        }
        Ok(())
    }

    fn run_commands(&mut self, commands: &[Command]) -> Result<()> {
        let total = commands.len();
        for (position, command) in commands.iter().enumerate() {
            let index = position + 1;
            match command {
                Command::Process {
                    shell,
                    line,
                    ignore_error,
                    tty,
                    deferred,
                } => {
                    let rendered = template::render(shell, self.environment.all_values())?;
                    let kind = if *deferred { "deferred" } else { "running" };
                    self.logger
                        .log_start(kind, &rendered, *line, *ignore_error, index, total);
                    if *deferred {
                        self.start_deferred(rendered, *ignore_error)?;
                    } else {
                        self.run_synchronous(&rendered, *ignore_error, *tty)?;
                    }
                }
                Command::Template {
                    source,
                    destination,
                    line,
                } => {
                    self.logger.log_start(
                        "template",
                        &format!("{} -> {}", source.display(), destination.display()),
                        *line,
                        false,
                        index,
                        total,
                    );
                    self.render_template(&Template {
                        source: source.clone(),
                        destination: destination.clone(),
                    })?;
                }
                Command::Wait { .. } => {
                    self.logger.log_wait();
                    self.drain_deferred()?;
                }
                Command::BashScript { path, line } => {
                    self.logger.log_start(
                        "bash",
                        &path.display().to_string(),
                        *line,
                        false,
                        index,
                        total,
                    );
                    self.run_bash_script(path)?;
                }
            }
        }
        Ok(())
    }

    /// Renders a template and writes the result to its destination. The
    /// destination path itself may contain placeholders.
    fn render_template(&mut self, tpl: &Template) -> Result<()> {
        let values = self.environment.all_values();
        let destination_str = template::render(&tpl.destination.to_string_lossy(), values)?;
        let content = tpl.content()?;
        let rendered = template::render(&content, values)?;

        let destination = PathBuf::from(destination_str);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create template directory '{}'", parent.display())
            })?;
        }
        fs::write(&destination, rendered)
            .with_context(|| format!("Failed to write template '{}'", destination.display()))?;
        Ok(())
    }

    fn run_synchronous(&mut self, command_line: &str, ignore_error: bool, tty: bool) -> Result<()> {
        let mut command = self.environment.create_process(command_line)?;
        command.current_dir(&self.working_dir);

        let status = if tty {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(|source| ExecutionError::Spawn {
                    command: command_line.to_string(),
                    source,
                })?
        } else {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
                command: command_line.to_string(),
                source,
            })?;

            if let Some(stdout) = child.stdout.take() {
                for line in BufReader::new(stdout).lines() {
                    let Ok(text) = line else { break };
                    self.logger.log(LogMessage {
                        text,
                        is_err: false,
                    });
                }
            }
            let status = child.wait().map_err(|source| ExecutionError::Spawn {
                command: command_line.to_string(),
                source,
            })?;
            // stderr is drained after exit; interleaving with stdout is not
            // preserved.
            if let Some(mut stderr) = child.stderr.take() {
                let mut buffer = String::new();
                if stderr.read_to_string(&mut buffer).is_ok() {
                    for text in buffer.lines() {
                        self.logger.log(LogMessage {
                            text: text.to_string(),
                            is_err: true,
                        });
                    }
                }
            }
            status
        };

        if status.success() {
            self.logger.log_success();
        } else if ignore_error {
            self.logger
                .warn(&format!("Ignoring failing command '{}'", command_line));
        } else {
            self.logger.log_failure();
            return Err(ExecutionError::NonZeroExit {
                command: command_line.to_string(),
                status: status.code().unwrap_or(-1),
            }
            .into());
        }
        Ok(())
    }

    fn start_deferred(&mut self, command_line: String, ignore_error: bool) -> Result<()> {
        let mut command = self.environment.create_process(&command_line)?;
        command
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = command.spawn().map_err(|source| ExecutionError::Spawn {
            command: command_line.clone(),
            source,
        })?;
        self.deferred.push(DeferredProcess {
            command: command_line,
            ignore_error,
            child,
        });
        Ok(())
    }

    /// Waits for every deferred process in insertion order, replays its
    /// buffered output through the logger and collects exit statuses. The
    /// queue is empty afterwards.
    fn drain_deferred(&mut self) -> Result<()> {
        if self.deferred.is_empty() {
            return Ok(());
        }

        let mut failed = 0usize;
        for process in std::mem::take(&mut self.deferred) {
            let output = process
                .child
                .wait_with_output()
                .map_err(|source| ExecutionError::Spawn {
                    command: process.command.clone(),
                    source,
                })?;

            for text in String::from_utf8_lossy(&output.stdout).lines() {
                self.logger.log(LogMessage {
                    text: text.to_string(),
                    is_err: false,
                });
            }
            for text in String::from_utf8_lossy(&output.stderr).lines() {
                self.logger.log(LogMessage {
                    text: text.to_string(),
                    is_err: true,
                });
            }

            if output.status.success() {
                self.logger.log_success();
            } else if process.ignore_error {
                self.logger
                    .warn(&format!("Ignoring failing command '{}'", process.command));
            } else {
                self.logger.log_failure();
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(ExecutionError::DeferredFailed { count: failed }.into());
        }
        Ok(())
    }

    /// Executes a whole script file through a rendered temporary copy. The
    /// temp file is unlinked on every exit path by its RAII guard.
    fn run_bash_script(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read script '{}'", path.display()))?;
        let rendered = template::render(&content, self.environment.all_values())?;

        let temp = tempfile::Builder::new()
            .prefix("maestro-")
            .suffix(".sh")
            .tempfile()
            .context("Failed to create temporary script file")?;
        fs::write(temp.path(), rendered).with_context(|| {
            format!(
                "Failed to write temporary script '{}'",
                temp.path().display()
            )
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o700))
                .context("Failed to mark temporary script as executable")?;
        }
        // Closing the open file handle before exec avoids ETXTBSY on Linux,
        // which refuses to run a file that still has a writable fd open.
        let temp = temp.into_temp_path();

        self.run_synchronous(&temp.display().to_string(), false, false)
    }

    /// Number of deferred processes still queued. Always zero after
    /// [`execute`](Self::execute) returns.
    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::Value;
    use crate::system::logger::RecordingLogger;
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn environment(constants: &[(&str, &str)]) -> ProcessEnvironment {
        ProcessEnvironment::new(
            constants
                .iter()
                .map(|(k, v)| (k.to_string(), Arc::new(Value::constant(*v))))
                .collect(),
            IndexMap::new(),
            Vec::new(),
            IndexMap::new(),
        )
    }

    fn script() -> Script {
        Script {
            directory: PathBuf::from("/tmp"),
            filename: "test.sh".to_string(),
            hidden: false,
            namespace: None,
            description: None,
        }
    }

    fn process(shell: &str, ignore_error: bool, deferred: bool) -> Command {
        Command::Process {
            shell: shell.to_string(),
            line: 1,
            ignore_error,
            tty: false,
            deferred,
        }
    }

    fn run(
        env: &ProcessEnvironment,
        logger: &mut RecordingLogger,
        commands: &[Command],
    ) -> Result<()> {
        let working_dir = std::env::temp_dir();
        let mut executor = ProcessExecutor::new(env, logger, working_dir);
        let result = executor.execute(&script(), commands);
        assert_eq!(executor.pending_deferred(), 0);
        result
    }

    #[test]
    fn runs_a_single_synchronous_command() {
        let env = environment(&[]);
        let mut logger = RecordingLogger::default();
        run(&env, &mut logger, &[process("echo hi", false, false)]).unwrap();

        assert!(logger.events.contains(&"out:hi".to_string()));
        assert!(logger.events.contains(&"success".to_string()));
        assert_eq!(logger.events.first().unwrap(), "start:test");
        assert_eq!(logger.events.last().unwrap(), "finish:test");
    }

    #[test]
    fn failing_command_aborts_the_stream() {
        let env = environment(&[]);
        let mut logger = RecordingLogger::default();
        let err = run(
            &env,
            &mut logger,
            &[process("false", false, false), process("echo after", false, false)],
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ExecutionError>(),
            Some(ExecutionError::NonZeroExit { .. })
        ));
        assert!(!logger.events.iter().any(|e| e == "out:after"));
    }

    #[test]
    fn ignored_failure_lets_the_stream_continue() {
        let env = environment(&[]);
        let mut logger = RecordingLogger::default();
        run(
            &env,
            &mut logger,
            &[process("false", true, false), process("echo after", false, false)],
        )
        .unwrap();

        assert!(logger.events.iter().any(|e| e.starts_with("warn:")));
        assert!(logger.events.contains(&"out:after".to_string()));
    }

    #[test]
    fn command_lines_are_rendered_before_execution() {
        let env = environment(&[("NAME", "world")]);
        let mut logger = RecordingLogger::default();
        run(&env, &mut logger, &[process("echo __NAME__", false, false)]).unwrap();
        assert!(logger.events.contains(&"out:world".to_string()));
    }

    #[test]
    fn wait_drains_deferred_processes_in_insertion_order() {
        let env = environment(&[]);
        let mut logger = RecordingLogger::default();
        run(
            &env,
            &mut logger,
            &[
                process("sleep 0.1 && echo a", false, true),
                process("echo b", false, true),
                Command::Wait { line: 3 },
                process("echo c", false, false),
            ],
        )
        .unwrap();

        let a = logger.events.iter().position(|e| e == "out:a").unwrap();
        let b = logger.events.iter().position(|e| e == "out:b").unwrap();
        let c = logger.events.iter().position(|e| e == "out:c").unwrap();
        let wait = logger.events.iter().position(|e| e == "wait").unwrap();
        assert!(wait < a, "deferred logs are replayed after the barrier");
        assert!(a < b, "deferred logs replay in insertion order");
        assert!(b < c, "synchronous command runs after the drain");
    }

    #[test]
    fn end_of_script_drain_collects_deferred_failures() {
        let env = environment(&[]);
        let mut logger = RecordingLogger::default();
        let err = run(&env, &mut logger, &[process("false", false, true)]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExecutionError>(),
            Some(ExecutionError::DeferredFailed { count: 1 })
        ));
    }

    #[test]
    fn ignored_deferred_failures_do_not_fail_the_script() {
        let env = environment(&[]);
        let mut logger = RecordingLogger::default();
        run(&env, &mut logger, &[process("false", true, true)]).unwrap();
        assert!(logger.events.iter().any(|e| e.starts_with("warn:")));
    }

    #[test]
    fn deferred_queue_is_drained_even_when_a_synchronous_command_fails() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let env = environment(&[]);
        let mut logger = RecordingLogger::default();
        let err = run(
            &env,
            &mut logger,
            &[
                process(&format!("touch {}", marker.display()), false, true),
                process("false", false, false),
            ],
        )
        .unwrap_err();

        // The original failure wins over anything the drain reports.
        assert!(matches!(
            err.downcast_ref::<ExecutionError>(),
            Some(ExecutionError::NonZeroExit { .. })
        ));
        assert!(marker.exists(), "deferred child was awaited");
    }

    #[test]
    fn inline_template_commands_render_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("conf.tpl");
        let destination = dir.path().join("out/conf.ini");
        fs::write(&source, "host=__HOST__\n").unwrap();

        let env = environment(&[("HOST", "db.local")]);
        let mut logger = RecordingLogger::default();
        run(
            &env,
            &mut logger,
            &[Command::Template {
                source,
                destination: destination.clone(),
                line: 1,
            }],
        )
        .unwrap();

        assert_eq!(fs::read_to_string(destination).unwrap(), "host=db.local\n");
    }

    #[test]
    fn environment_templates_render_before_the_first_command() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("conf.tpl");
        let destination = dir.path().join("conf.out");
        fs::write(&source, "value=__V__").unwrap();

        let env = ProcessEnvironment::new(
            [("V".to_string(), Arc::new(Value::constant("42")))]
                .into_iter()
                .collect(),
            IndexMap::new(),
            vec![crate::core::template::Template {
                source,
                destination: destination.clone(),
            }],
            IndexMap::new(),
        );
        let mut logger = RecordingLogger::default();
        run(
            &env,
            &mut logger,
            &[process(&format!("cat {}", destination.display()), false, false)],
        )
        .unwrap();

        assert!(logger.events.contains(&"out:value=42".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn bash_scripts_run_through_a_rendered_temporary_copy() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("whole.sh");
        fs::write(&script_path, "#!/bin/sh\necho rendered __WHO__\n").unwrap();

        let env = environment(&[("WHO", "copy")]);
        let mut logger = RecordingLogger::default();
        run(
            &env,
            &mut logger,
            &[Command::BashScript {
                path: script_path,
                line: 1,
            }],
        )
        .unwrap();

        assert!(logger.events.contains(&"out:rendered copy".to_string()));
    }

    #[test]
    fn stderr_lines_are_replayed_as_error_messages() {
        let env = environment(&[]);
        let mut logger = RecordingLogger::default();
        run(
            &env,
            &mut logger,
            &[process("echo oops 1>&2", false, false)],
        )
        .unwrap();
        assert!(logger.events.contains(&"err:oops".to_string()));
    }
}
