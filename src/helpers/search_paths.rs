use std::{
    env,
    io::Read,
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, warn};

const SYS_PATH_QUERY: &str = "import sys; print('\\n'.join(sys.path))";

/// How long the interpreter gets to answer before the environment is used.
pub const INTERPRETER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Directories searched for imported modules.
///
/// Gathered once on first use by asking the interpreter for `sys.path`,
/// falling back to `PYTHONPATH`. [`SearchPaths::reset`] drops the cached
/// list so the next call gathers it again. Project paths set with
/// [`SearchPaths::with_project_paths`] always come first.
#[derive(Debug)]
pub struct SearchPaths {
    interpreter: Option<String>,
    project: Vec<PathBuf>,
    fixed: bool,
    cached: Mutex<Option<Vec<PathBuf>>>,
}

impl SearchPaths {
    /// Paths gathered from `interpreter` when first needed.
    pub fn from_interpreter(interpreter: impl Into<String>) -> Self {
        SearchPaths {
            interpreter: Some(interpreter.into()),
            project: vec![],
            fixed: false,
            cached: Mutex::new(None),
        }
    }

    /// Paths gathered from `PYTHONPATH` only.
    pub fn from_environment() -> Self {
        SearchPaths {
            interpreter: None,
            project: vec![],
            fixed: false,
            cached: Mutex::new(None),
        }
    }

    /// A fixed list that is never gathered.
    pub fn fixed(paths: Vec<PathBuf>) -> Self {
        SearchPaths {
            interpreter: None,
            project: vec![],
            fixed: true,
            cached: Mutex::new(Some(paths)),
        }
    }

    pub fn with_project_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.project = paths;
        self
    }

    pub fn get(&self) -> Vec<PathBuf> {
        let cached = self.cached.lock().clone();
        // Not gathered under the lock.
        let gathered = match cached {
            Some(paths) => paths,
            None => {
                let paths = self.gather();
                debug!("gathered {} search paths", paths.len());
                *self.cached.lock() = Some(paths.clone());
                paths
            }
        };

        self.project.iter().cloned().chain(gathered).collect()
    }

    pub fn reset(&self) {
        if !self.fixed {
            *self.cached.lock() = None;
        }
    }

    fn gather(&self) -> Vec<PathBuf> {
        if let Some(interpreter) = &self.interpreter {
            match query_interpreter(interpreter) {
                Ok(paths) => return paths,
                Err(error) => warn!("could not query {} for search paths: {}", interpreter, error),
            }
        }

        env::var_os("PYTHONPATH")
            .map(|value| env::split_paths(&value).collect())
            .unwrap_or_default()
    }
}

fn query_interpreter(interpreter: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut child = Command::new(interpreter)
        .args(["-c", SYS_PATH_QUERY])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let Some(status) = wait_with_timeout(&mut child, INTERPRETER_TIMEOUT)? else {
        // Best effort; the child may have exited in the meantime.
        let _ = child.kill();
        let _ = child.wait();
        return Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no answer within {} ms", INTERPRETER_TIMEOUT.as_millis()),
        ));
    };
    if !status.success() {
        return Err(std::io::Error::other(format!("interpreter exited with {}", status)));
    }

    let mut stdout = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_string(&mut stdout)?;
    }

    Ok(stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Polls `child` until it exits or `timeout` passes; `None` means it is still running.
pub(crate) fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(10));
    }
}
