//! Process confinement for submitted programs.
//!
//! Every step is launched from an argument vector (never a shell string),
//! with a cleared environment, the run's scratch directory as both cwd and
//! `HOME`, its own process group, and POSIX resource limits applied between
//! `fork` and `exec`. An optional launcher prefix (for example a
//! bubblewrap or firejail invocation) provides the restricted filesystem
//! view on hosts that have one.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::language::Step;

/// Resource policy applied to every external process.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    /// Wall-clock budget for the whole pipeline (compile + run).
    pub wall_clock: Duration,
    /// `RLIMIT_CPU`, seconds of CPU per process.
    pub cpu_seconds: u64,
    /// `RLIMIT_AS`, only for steps that tolerate it.
    pub memory_bytes: Option<u64>,
    /// `RLIMIT_FSIZE`, largest file a process may write.
    pub max_file_bytes: u64,
    /// `RLIMIT_NPROC`. Counts every process of the server's user, so it is
    /// off unless the server runs under a dedicated account.
    pub max_processes: Option<u64>,
    /// Captured bytes kept per stream; the rest is drained and dropped.
    pub max_output_bytes: usize,
    /// Argument-vector prefix the step is launched through.
    pub launcher: Option<Vec<OsString>>,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            wall_clock: Duration::from_secs(15),
            cpu_seconds: 30,
            memory_bytes: Some(1 << 30),
            max_file_bytes: 16 << 20,
            max_processes: None,
            max_output_bytes: 1 << 20,
            launcher: None,
        }
    }
}

impl SandboxPolicy {
    /// Build the command for `step`, wrapped in the launcher if configured.
    pub fn command(&self, step: &Step) -> Command {
        let argv = self.argv(step);
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd
    }

    /// Full argument vector for `step`: launcher prefix, program, args.
    pub fn argv(&self, step: &Step) -> Vec<OsString> {
        let mut argv: Vec<OsString> = self
            .launcher
            .iter()
            .flatten()
            .cloned()
            .collect();
        argv.push(step.program.clone());
        argv.extend(step.args.iter().cloned());
        argv
    }

    /// Apply isolation and limits to `cmd`.
    pub fn confine(&self, cmd: &mut Command, step: &Step, workdir: &Path, env: &[(OsString, OsString)]) {
        cmd.current_dir(workdir)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k, v)))
            .env("HOME", workdir)
            .env("TMPDIR", workdir)
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            let limits = ProcessLimits {
                cpu_seconds: self.cpu_seconds,
                memory_bytes: self.memory_bytes.filter(|_| step.cap_address_space),
                max_file_bytes: self.max_file_bytes,
                max_processes: self.max_processes,
            };
            cmd.process_group(0);
            // SAFETY: the closure only calls async-signal-safe setrlimit(2).
            unsafe {
                cmd.pre_exec(move || limits.apply());
            }
        }
    }
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
struct ProcessLimits {
    cpu_seconds: u64,
    memory_bytes: Option<u64>,
    max_file_bytes: u64,
    max_processes: Option<u64>,
}

#[cfg(unix)]
macro_rules! set_rlimit {
    ($resource:expr, $value:expr) => {{
        let limit = libc::rlimit {
            rlim_cur: $value as libc::rlim_t,
            rlim_max: $value as libc::rlim_t,
        };
        if unsafe { libc::setrlimit($resource, &limit) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }};
}

#[cfg(unix)]
impl ProcessLimits {
    fn apply(&self) -> std::io::Result<()> {
        set_rlimit!(libc::RLIMIT_CPU, self.cpu_seconds);
        set_rlimit!(libc::RLIMIT_FSIZE, self.max_file_bytes);
        set_rlimit!(libc::RLIMIT_CORE, 0u64);
        if let Some(bytes) = self.memory_bytes {
            set_rlimit!(libc::RLIMIT_AS, bytes);
        }
        if let Some(procs) = self.max_processes {
            set_rlimit!(libc::RLIMIT_NPROC, procs);
        }
        Ok(())
    }
}

/// SIGKILL the whole process group led by `pid`.
///
/// Steps are spawned with `process_group(0)`, so the group id equals the
/// child's pid and grandchildren (compiler drivers, forked user code) die
/// with it.
pub(crate) fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
            return;
        };
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// Reduce a user-supplied identifier to `[A-Za-z0-9_-]`.
///
/// Room ids and base names end up in file names; nothing else may reach
/// the filesystem.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .take(64)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
