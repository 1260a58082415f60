//! # Script Parser
//!
//! Turns script content into the typed [`Command`] stream. The parser is
//! line-based: trailing whitespace is stripped, empty and `#`-comment lines
//! are skipped, and lines indented by three or more spaces are concatenated
//! onto the previous line. Each resulting line is dispatched against a fixed
//! token vocabulary (`ACTION:`, `INCLUDE:`, `TEMPLATE:`, `WAIT:` and the
//! modifiers `I:`, `TTY:`, `D:`); anything else is an executable shell
//! command.
//!
//! Modifier tokens accumulate on a per-line state record and are consumed by
//! exactly the next process command. `ACTION:` and `INCLUDE:` re-enter the
//! loader, which guards against cyclic inclusion with a visited set of
//! canonicalised script paths.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::script_finder::{ScriptError, ScriptFinder};
use crate::models::{Command, Script};

const TOKEN_ACTION: &str = "ACTION:";
const TOKEN_INCLUDE: &str = "INCLUDE:";
const TOKEN_TEMPLATE: &str = "TEMPLATE:";
const TOKEN_WAIT: &str = "WAIT:";
const TOKEN_IGNORE_ERROR: &str = "I:";
const TOKEN_TTY: &str = "TTY:";
const TOKEN_DEFERRED: &str = "D:";

/// Errors raised while parsing a script.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Line {line}: include path '{path}' could not be resolved")]
    UnresolvedInclude { path: String, line: usize },
    #[error(
        "Line {line}: malformed directive '{directive}', expected 'TEMPLATE: source:destination'"
    )]
    MalformedTemplate { directive: String, line: usize },
    #[error("Line {line}: duplicate modifier '{modifier}'")]
    DuplicateModifier { modifier: &'static str, line: usize },
    #[error("Line {line}: modifier '{modifier}' is not followed by a command")]
    DanglingModifier { modifier: &'static str, line: usize },
    #[error("Line {line}: referenced script '{name}' not found")]
    ActionNotFound { name: String, line: usize },
    #[error("Cyclic script inclusion involving '{0}'")]
    CyclicInclusion(PathBuf),
    #[error("Failed to read script '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Re-entrant script loading, as used by `ACTION:` and `INCLUDE:`.
pub trait ScriptLoader {
    /// Loads a script by logical name (the `ACTION:` form).
    fn load_by_name(&self, name: &str, line: usize) -> Result<Vec<Command>, ParseError>;
    /// Loads a script file by path (the `INCLUDE:` form).
    fn load_file(&self, path: &Path, line: usize) -> Result<Vec<Command>, ParseError>;
}

/// Parses script content into a command stream.
///
/// A script whose first line is a shebang is not parsed line by line; it is
/// emitted as a single whole-file command executed through a rendered
/// temporary copy.
pub fn parse(
    content: &str,
    script: &Script,
    loader: &dyn ScriptLoader,
) -> Result<Vec<Command>, ParseError> {
    if content.starts_with("#!") {
        return Ok(vec![Command::BashScript {
            path: script.path(),
            line: 1,
        }]);
    }

    let mut commands = Vec::new();
    for line in concatenate_lines(content) {
        dispatch_line(&line, &script.directory, loader, &mut commands)?;
    }
    Ok(commands)
}

struct SourceLine {
    number: usize,
    text: String,
}

/// Preprocesses raw content into logical lines: strips trailing whitespace,
/// drops blanks and comments, and folds continuation lines (three or more
/// leading spaces) onto their predecessor with a single joining space.
fn concatenate_lines(content: &str) -> Vec<SourceLine> {
    let mut lines: Vec<SourceLine> = Vec::new();
    for (index, raw) in content.split('\n').enumerate() {
        let line = raw.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with("   ") {
            if let Some(previous) = lines.last_mut() {
                previous.text.push(' ');
                previous.text.push_str(line.trim_start());
                continue;
            }
        }
        lines.push(SourceLine {
            number: index + 1,
            text: line.to_string(),
        });
    }
    lines
}

#[derive(Debug, Default)]
struct ModifierState {
    ignore_error: bool,
    tty: bool,
    deferred: bool,
}

/// Dispatches one logical line, appending the commands it produces.
///
/// Modifier tokens loop back into the dispatcher so they compose in any
/// order; the terminal token (or bare shell command) ends the loop.
fn dispatch_line(
    line: &SourceLine,
    script_dir: &Path,
    loader: &dyn ScriptLoader,
    commands: &mut Vec<Command>,
) -> Result<(), ParseError> {
    let mut state = ModifierState::default();
    let mut rest: &str = line.text.trim_start();

    loop {
        if let Some(name) = rest.strip_prefix(TOKEN_ACTION) {
            let spliced = loader.load_by_name(name.trim(), line.number)?;
            commands.extend(spliced);
            return Ok(());
        }

        if let Some(raw_path) = rest.strip_prefix(TOKEN_INCLUDE) {
            let raw_path = raw_path.trim();
            let path = resolve_relative(raw_path, script_dir);
            if !path.is_file() {
                return Err(ParseError::UnresolvedInclude {
                    path: raw_path.to_string(),
                    line: line.number,
                });
            }
            let spliced = loader.load_file(&path, line.number)?;
            commands.extend(spliced);
            return Ok(());
        }

        if let Some(spec) = rest.strip_prefix(TOKEN_TEMPLATE) {
            let Some((source, destination)) = spec.trim().split_once(':') else {
                return Err(ParseError::MalformedTemplate {
                    directive: rest.to_string(),
                    line: line.number,
                });
            };
            let (source, destination) = (source.trim(), destination.trim());
            if source.is_empty() || destination.is_empty() {
                return Err(ParseError::MalformedTemplate {
                    directive: rest.to_string(),
                    line: line.number,
                });
            }
            commands.push(Command::Template {
                source: resolve_relative(source, script_dir),
                destination: resolve_relative(destination, script_dir),
                line: line.number,
            });
            return Ok(());
        }

        if rest == TOKEN_WAIT {
            commands.push(Command::Wait { line: line.number });
            return Ok(());
        }

        if let Some(remainder) = rest.strip_prefix(TOKEN_IGNORE_ERROR) {
            if state.ignore_error {
                return Err(ParseError::DuplicateModifier {
                    modifier: TOKEN_IGNORE_ERROR,
                    line: line.number,
                });
            }
            state.ignore_error = true;
            rest = dangling_check(remainder, TOKEN_IGNORE_ERROR, line.number)?;
            continue;
        }

        if let Some(remainder) = rest.strip_prefix(TOKEN_TTY) {
            if state.tty {
                return Err(ParseError::DuplicateModifier {
                    modifier: TOKEN_TTY,
                    line: line.number,
                });
            }
            state.tty = true;
            rest = dangling_check(remainder, TOKEN_TTY, line.number)?;
            continue;
        }

        if let Some(remainder) = rest.strip_prefix(TOKEN_DEFERRED) {
            if state.deferred {
                return Err(ParseError::DuplicateModifier {
                    modifier: TOKEN_DEFERRED,
                    line: line.number,
                });
            }
            state.deferred = true;
            rest = dangling_check(remainder, TOKEN_DEFERRED, line.number)?;
            continue;
        }

        // Terminal position: an executable shell command. The accumulated
        // modifier state is consumed here and implicitly reset, since the
        // state record is local to this line.
        commands.push(Command::Process {
            shell: rest.to_string(),
            line: line.number,
            ignore_error: state.ignore_error,
            tty: state.tty,
            deferred: state.deferred,
        });
        return Ok(());
    }
}

fn dangling_check<'a>(
    remainder: &'a str,
    modifier: &'static str,
    line: usize,
) -> Result<&'a str, ParseError> {
    let remainder = remainder.trim_start();
    if remainder.is_empty() {
        return Err(ParseError::DanglingModifier { modifier, line });
    }
    Ok(remainder)
}

fn resolve_relative(raw: &str, base_dir: &Path) -> PathBuf {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    }
}

/// The default [`ScriptLoader`]: resolves `ACTION:` names through a
/// [`ScriptFinder`] and reads files from disk, tracking visited paths to
/// reject cyclic inclusion.
pub struct FileScriptLoader<'a> {
    finder: &'a ScriptFinder,
    visited: RefCell<HashSet<PathBuf>>,
}

impl<'a> FileScriptLoader<'a> {
    pub fn new(finder: &'a ScriptFinder) -> Self {
        Self {
            finder,
            visited: RefCell::new(HashSet::new()),
        }
    }

    /// Loads and parses a script, marking it visited first.
    pub fn load(&self, script: &Script) -> Result<Vec<Command>, ParseError> {
        let path = script.path();
        self.mark_visited(&path)?;
        let content = fs::read_to_string(&path).map_err(|source| ParseError::Io {
            path: path.clone(),
            source,
        })?;
        parse(&content, script, self)
    }

    fn mark_visited(&self, path: &Path) -> Result<(), ParseError> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.visited.borrow_mut().insert(canonical) {
            return Err(ParseError::CyclicInclusion(path.to_path_buf()));
        }
        Ok(())
    }
}

impl ScriptLoader for FileScriptLoader<'_> {
    fn load_by_name(&self, name: &str, line: usize) -> Result<Vec<Command>, ParseError> {
        let script = match self.finder.find_by_name(name) {
            Ok(script) => script,
            Err(ScriptError::NotFound(name)) => {
                return Err(ParseError::ActionNotFound { name, line });
            }
            Err(other) => return Err(other.into()),
        };
        self.load(&script)
    }

    fn load_file(&self, path: &Path, _line: usize) -> Result<Vec<Command>, ParseError> {
        let directory = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script = Script {
            directory,
            filename,
            hidden: false,
            namespace: None,
            description: None,
        };
        self.load(&script)
    }
}
