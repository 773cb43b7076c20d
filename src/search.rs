//! The grep subprocess: spawn, stream, cap, cancel, reap.
//!
//! One child per request. Output is consumed line by line so a huge result
//! set never lands in memory; once the cap is hit the child gets SIGTERM and
//! the remaining output is discarded. The child is always waited on.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use tracing::{debug, warn};

use crate::heuristics;

/// Extensions grep is restricted to in directory scans.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx"];

/// One parsed `path:line:text` row from grep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrepMatch {
    /// Path exactly as grep printed it (may be relative to the scan root).
    pub path: String,
    /// One-based line number.
    pub line: u32,
    /// Zero-based column of the first unquoted occurrence on the line, or
    /// `None` for comment-only or string-only lines.
    pub column: Option<u32>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum SearchScope {
    /// Recursive scan of a workspace root, restricted to source extensions.
    Directory(PathBuf),
    /// Explicit file list, searched as-is.
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone)]
pub struct SearchInvocation {
    pub needle: String,
    pub scope: SearchScope,
    /// Stop reading and terminate the child after this many parsed matches.
    pub max_results: usize,
}

/// Shared between the request task and the `$/cancelRequest` handler. The
/// handler flips `cancelled` and kills whatever child pid is registered;
/// `register_child` re-checks the flag to close the race where cancellation
/// lands before the spawn finished.
#[derive(Debug, Default)]
pub struct CancelHandle {
    cancelled: AtomicBool,
    child_pid: AtomicI32,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.kill_child();
    }

    fn register_child(&self, pid: i32) {
        self.child_pid.store(pid, Ordering::SeqCst);
        if self.is_cancelled() {
            self.kill_child();
        }
    }

    fn clear_child(&self) {
        self.child_pid.store(0, Ordering::SeqCst);
    }

    fn kill_child(&self) {
        let pid = self.child_pid.load(Ordering::SeqCst);
        if pid > 0 {
            // Best effort; the child may already be gone.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

/// Full-text search over the workspace. The server only depends on this
/// trait, so tests can substitute canned results for the real subprocess.
pub trait TextSearch: Send + Sync {
    fn search(&self, invocation: &SearchInvocation, cancel: &CancelHandle) -> Vec<GrepMatch>;
}

/// `TextSearch` backed by the system `grep` binary.
pub struct GrepSearch {
    program: String,
}

impl GrepSearch {
    pub fn new() -> Self {
        Self {
            program: "grep".to_string(),
        }
    }

    #[cfg(test)]
    fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn build_command(&self, invocation: &SearchInvocation) -> Command {
        let mut cmd = Command::new(&self.program);
        match &invocation.scope {
            SearchScope::Directory(root) => {
                cmd.arg("-RIn")
                    .arg("--binary-files=without-match")
                    .arg("--color=never")
                    .arg("--exclude-dir=build")
                    .arg("--exclude-dir=.git");
                for ext in SOURCE_EXTENSIONS {
                    cmd.arg(format!("--include=*.{ext}"));
                }
                cmd.arg("-F").arg("--").arg(&invocation.needle).arg(root);
            }
            SearchScope::Files(files) => {
                cmd.arg("-nH")
                    .arg("--binary-files=without-match")
                    .arg("--color=never")
                    .arg("-F")
                    .arg("--")
                    .arg(&invocation.needle);
                for file in files {
                    cmd.arg(file);
                }
            }
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }
}

impl Default for GrepSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl TextSearch for GrepSearch {
    fn search(&self, invocation: &SearchInvocation, cancel: &CancelHandle) -> Vec<GrepMatch> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        let mut cmd = self.build_command(invocation);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(program = %self.program, %err, "failed to spawn search process");
                return Vec::new();
            }
        };
        cancel.register_child(child.id() as i32);

        let matches = read_matches(&mut child, invocation, cancel);

        // Terminate unconditionally: harmless if already exited, necessary
        // if we stopped reading early. Then reap so no zombie is left.
        terminate(&child);
        let _ = child.wait();
        cancel.clear_child();

        debug!(
            needle = %invocation.needle,
            count = matches.len(),
            "search finished"
        );
        if cancel.is_cancelled() {
            Vec::new()
        } else {
            matches
        }
    }
}

fn read_matches(
    child: &mut Child,
    invocation: &SearchInvocation,
    cancel: &CancelHandle,
) -> Vec<GrepMatch> {
    let Some(stdout) = child.stdout.take() else {
        return Vec::new();
    };
    let mut matches = Vec::new();
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else {
            break;
        };
        if cancel.is_cancelled() {
            break;
        }
        let Some(m) = parse_match_line(&line, &invocation.needle) else {
            continue;
        };
        matches.push(m);
        if matches.len() >= invocation.max_results {
            break;
        }
    }
    matches
}

fn terminate(child: &Child) {
    unsafe {
        libc::kill(child.id() as i32, libc::SIGTERM);
    }
}

/// Parses one `path:line:text` output row. Splits on the first two colons
/// only, so colons in the matched text survive. Malformed rows are dropped.
fn parse_match_line(raw: &str, needle: &str) -> Option<GrepMatch> {
    let (path, rest) = raw.split_once(':')?;
    let (line, text) = rest.split_once(':')?;
    let line: u32 = line.parse().ok()?;
    if path.is_empty() || line == 0 {
        return None;
    }
    Some(GrepMatch {
        path: path.to_string(),
        line,
        column: heuristics::find_match_column(text, needle),
        text: text.to_string(),
    })
}
