//! Supported languages and their build/run pipelines.
//!
//! ```text
//! Interpreted   : <interp> <src>
//! Compiled      : <compiler> <src> -o <bin>   →  <bin>
//! Two runtimes  : <transpiler/compiler> <src> →  <runtime> <artifact>
//! ```

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

const NO_ARGS: [&OsStr; 0] = [];

/// Languages a room can submit its buffer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    C,
    Python,
    Java,
    #[serde(rename = "C++")]
    Cpp,
    JavaScript,
    TypeScript,
    Go,
    Rust,
    #[serde(rename = "PHP")]
    Php,
    #[serde(rename = "C#")]
    CSharp,
}

impl Language {
    pub const ALL: [Language; 10] = [
        Language::C,
        Language::Python,
        Language::Java,
        Language::Cpp,
        Language::JavaScript,
        Language::TypeScript,
        Language::Go,
        Language::Rust,
        Language::Php,
        Language::CSharp,
    ];

    /// Wire tag, as sent by clients.
    pub fn tag(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::Python => "Python",
            Self::Java => "Java",
            Self::Cpp => "C++",
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
            Self::Go => "Go",
            Self::Rust => "Rust",
            Self::Php => "PHP",
            Self::CSharp => "C#",
        }
    }

    /// Source file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Python => "py",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::JavaScript => "js",
            Self::TypeScript => "ts",
            Self::Go => "go",
            Self::Rust => "rs",
            Self::Php => "php",
            Self::CSharp => "cs",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.tag() == tag)
    }

    /// Whether the run step may be placed under an address-space cap.
    ///
    /// JVM, CLR, V8 and the Go runtime reserve large virtual ranges up
    /// front and fail to start under `RLIMIT_AS`.
    pub fn tolerates_address_space_cap(self) -> bool {
        matches!(
            self,
            Self::C | Self::Cpp | Self::Rust | Self::Python | Self::Php
        )
    }

    /// File name for the materialised source.
    ///
    /// Java requires the file to be named after its public class, so the
    /// configured entry class wins over the room-derived stem.
    pub fn source_file_name(self, stem: &str, java_main_class: &str) -> String {
        match self {
            Self::Java => format!("{java_main_class}.java"),
            _ => format!("{stem}.{}", self.extension()),
        }
    }

    /// Build the steps that compile (if needed) and run `paths.source`.
    pub fn pipeline(self, paths: &RunPaths, java_main_class: &str) -> Vec<Step> {
        let src = paths.source.as_os_str();
        let bin = paths.artifact.as_os_str();
        let cap = self.tolerates_address_space_cap();

        match self {
            Self::Python => vec![Step::run("python3", [src], cap)],
            Self::Php => vec![Step::run("php", [src], cap)],
            Self::JavaScript => vec![Step::run("node", [src], cap)],
            Self::C => vec![
                Step::compile("gcc", [src, OsStr::new("-o"), bin]),
                Step::run(bin, NO_ARGS, cap),
            ],
            Self::Cpp => vec![
                Step::compile("g++", [src, OsStr::new("-o"), bin]),
                Step::run(bin, NO_ARGS, cap),
            ],
            Self::Rust => vec![
                Step::compile("rustc", [src, OsStr::new("-o"), bin]),
                Step::run(bin, NO_ARGS, cap),
            ],
            Self::Go => vec![
                Step::compile("go", [OsStr::new("build"), OsStr::new("-o"), bin, src]),
                Step::run(bin, NO_ARGS, cap),
            ],
            Self::Java => vec![
                Step::compile("javac", [OsStr::new("-d"), paths.dir.as_os_str(), src]),
                Step::run(
                    "java",
                    [
                        OsStr::new("-cp"),
                        paths.dir.as_os_str(),
                        OsStr::new(java_main_class),
                    ],
                    cap,
                ),
            ],
            Self::TypeScript => {
                let js = paths.artifact.with_extension("js");
                vec![
                    Step::compile("tsc", [OsStr::new("--outDir"), paths.dir.as_os_str(), src]),
                    Step::run("node", [js.as_os_str()], cap),
                ]
            }
            Self::CSharp => {
                let exe = paths.artifact.with_extension("exe");
                let mut out = OsString::from("-out:");
                out.push(&exe);
                vec![
                    Step::compile("mcs", [out.as_os_str(), src]),
                    Step::run("mono", [exe.as_os_str()], cap),
                ]
            }
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| ExecError::UnsupportedLanguage(s.to_string()))
    }
}

/// Filesystem layout of one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    /// Per-run scratch subdirectory; removed wholesale after the run.
    pub dir: PathBuf,
    /// Materialised source file.
    pub source: PathBuf,
    /// Compiled artifact path (extension added per language where needed).
    pub artifact: PathBuf,
}

impl RunPaths {
    pub fn new(dir: &Path, source_name: &str, stem: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            source: dir.join(source_name),
            artifact: dir.join(stem),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Compile,
    Run,
}

/// One external process invocation, as an argument vector.
#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Apply the sandbox's address-space limit to this step.
    pub cap_address_space: bool,
}

impl Step {
    fn compile<P, I, A>(program: P, args: I) -> Self
    where
        P: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        Self {
            kind: StepKind::Compile,
            program: program.as_ref().to_os_string(),
            args: args.into_iter().map(|a| a.as_ref().to_os_string()).collect(),
            cap_address_space: false,
        }
    }

    fn run<P, I, A>(program: P, args: I, cap_address_space: bool) -> Self
    where
        P: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        Self {
            kind: StepKind::Run,
            program: program.as_ref().to_os_string(),
            args: args.into_iter().map(|a| a.as_ref().to_os_string()).collect(),
            cap_address_space,
        }
    }

    pub fn display_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}
