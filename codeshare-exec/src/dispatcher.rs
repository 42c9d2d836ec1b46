//! The execution dispatcher.
//!
//! ```text
//! run(room, lang, base, src)
//!   │
//!   ├── resolve   <scratch>/<base><room>-<uuid>/<base><room>.<ext>
//!   ├── write     source verbatim
//!   ├── pipeline  [compile] → run      (argv, sandboxed, deadline)
//!   └── cleanup   remove the run directory, always
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::ExecError;
use crate::language::{Language, RunPaths, StepKind};
use crate::runner::{self, StepOutput};
use crate::sandbox::{sanitize_component, SandboxPolicy};

/// Something that can run a room's buffer and hand back its output.
///
/// Implemented by [`ExecutionDispatcher`]; rooms hold it as a trait object
/// so tests can substitute a fake.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(
        &self,
        room_tag: &str,
        language: &str,
        base_name: &str,
        source: &str,
    ) -> Result<ExecutionOutput, ExecError>;
}

/// Output of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    /// Stdout then stderr of the user program.
    pub output: String,
    /// Exit code of the user program (`None` if killed by a signal).
    pub exit_code: Option<i32>,
    /// Whether either stream hit the capture limit.
    pub truncated: bool,
    pub duration: Duration,
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Root under which per-run directories are created.
    pub scratch_dir: PathBuf,
    pub sandbox: SandboxPolicy,
    /// Variables copied from the server's environment into the child's.
    pub passthrough_env: Vec<String>,
    /// Entry class for Java submissions.
    pub java_main_class: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("codeshare-scratch"),
            sandbox: SandboxPolicy::default(),
            passthrough_env: ["PATH", "LANG", "GOCACHE", "GOPATH", "JAVA_HOME", "DOTNET_ROOT"]
                .into_iter()
                .map(String::from)
                .collect(),
            java_main_class: "Main".to_string(),
        }
    }
}

/// Materialises sources, runs the language pipeline, removes artifacts.
#[derive(Debug, Clone, Default)]
pub struct ExecutionDispatcher {
    config: DispatcherConfig,
}

impl ExecutionDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Dispatcher rooted at `scratch_dir` with default limits.
    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self::new(DispatcherConfig {
            scratch_dir: scratch_dir.into(),
            ..DispatcherConfig::default()
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.config.scratch_dir
    }

    /// Resolve the per-run layout. The uuid suffix keeps concurrent runs
    /// for the same room apart.
    fn resolve(&self, language: Language, room_tag: &str, base_name: &str) -> RunPaths {
        let stem = format!(
            "{}{}",
            sanitize_component(base_name),
            sanitize_component(room_tag)
        );
        let dir = self
            .config
            .scratch_dir
            .join(format!("{stem}-{}", Uuid::new_v4().simple()));
        let source_name = language.source_file_name(&stem, &self.config.java_main_class);
        RunPaths::new(&dir, &source_name, &stem)
    }

    fn child_env(&self) -> Vec<(OsString, OsString)> {
        self.config
            .passthrough_env
            .iter()
            .filter_map(|key| std::env::var_os(key).map(|value| (OsString::from(key), value)))
            .collect()
    }

    async fn materialise(&self, paths: &RunPaths, source: &str) -> Result<(), ExecError> {
        tokio::fs::create_dir_all(&paths.dir)
            .await
            .map_err(|source| ExecError::Write {
                path: paths.dir.clone(),
                source,
            })?;
        tokio::fs::write(&paths.source, source)
            .await
            .map_err(|source| ExecError::Write {
                path: paths.source.clone(),
                source,
            })
    }

    async fn execute(
        &self,
        language: Language,
        paths: &RunPaths,
        source: &str,
    ) -> Result<ExecutionOutput, ExecError> {
        self.materialise(paths, source).await?;

        let started = Instant::now();
        let deadline = started + self.config.sandbox.wall_clock;
        let env = self.child_env();
        let mut last: Option<StepOutput> = None;

        for step in language.pipeline(paths, &self.config.java_main_class) {
            let out =
                runner::run_step(&step, &paths.dir, &env, &self.config.sandbox, deadline).await?;
            if step.kind == StepKind::Compile && !out.status.success() {
                return Err(ExecError::Compile {
                    output: out.combined(),
                });
            }
            last = Some(out);
        }

        // Every pipeline ends with a run step.
        let Some(out) = last else {
            return Err(ExecError::UnsupportedLanguage(language.tag().to_string()));
        };
        Ok(ExecutionOutput {
            output: out.combined(),
            exit_code: out.status.code(),
            truncated: out.truncated,
            duration: started.elapsed(),
        })
    }

    async fn cleanup(&self, paths: &RunPaths) {
        match tokio::fs::remove_dir_all(&paths.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove scratch dir {}: {e}", paths.dir.display()),
        }
    }
}

#[async_trait]
impl Executor for ExecutionDispatcher {
    async fn run(
        &self,
        room_tag: &str,
        language: &str,
        base_name: &str,
        source: &str,
    ) -> Result<ExecutionOutput, ExecError> {
        let language: Language = language.parse()?;
        let paths = self.resolve(language, room_tag, base_name);

        // The run owns its scratch dir until cleanup, even if the caller
        // stops waiting; the wall-clock deadline still bounds it.
        let dispatcher = self.clone();
        let room_tag = room_tag.to_owned();
        let source = source.to_owned();
        let task = tokio::spawn(async move {
            log::info!("Running {language} for room {room_tag} in {}", paths.dir.display());
            let result = dispatcher.execute(language, &paths, &source).await;
            dispatcher.cleanup(&paths).await;

            match &result {
                Ok(out) => log::info!(
                    "{language} run for room {room_tag} finished in {:?} (exit {:?})",
                    out.duration,
                    out.exit_code
                ),
                Err(e) => log::info!("{language} run for room {room_tag} failed: {}", e.stage()),
            }
            result
        });

        task.await.map_err(|e| ExecError::Io(std::io::Error::other(e)))?
    }
}
