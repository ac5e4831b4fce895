use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Run-wide settings. Built once at startup and handed to every component;
/// nothing below reads the process environment on its own.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Directory holding `test_*.c` / `test_*.cpp`. Defaults to `<root>/tests`.
    #[serde(default)]
    pub tests_dir: Option<PathBuf>,
    /// Defaults to `<root>/test_results`.
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    /// Where the pass plugin is searched for. Defaults to `<root>/build`.
    #[serde(default)]
    pub build_dir: Option<PathBuf>,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Render workers; the host's parallelism when unset.
    #[serde(default)]
    pub render_jobs: Option<usize>,
    /// Graph descriptions whose name contains one of these are not rendered.
    #[serde(default = "default_render_skip")]
    pub render_skip: Vec<String>,
}

/// Explicit tool locations. Anything left unset is looked up on the search path.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Tools {
    pub clang: Option<PathBuf>,
    pub clangxx: Option<PathBuf>,
    pub opt: Option<PathBuf>,
    pub dot: Option<PathBuf>,
    pub plugin: Option<PathBuf>,
}

/// Per-stage time budgets in seconds; `0` waits forever.
#[derive(Deserialize, Debug, Clone)]
pub struct Timeouts {
    #[serde(default = "default_compile_secs")]
    pub compile_secs: u64,
    #[serde(default = "default_transform_secs")]
    pub transform_secs: u64,
    #[serde(default = "default_run_secs")]
    pub run_secs: u64,
    #[serde(default = "default_render_secs")]
    pub render_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            compile_secs: default_compile_secs(),
            transform_secs: default_transform_secs(),
            run_secs: default_run_secs(),
            render_secs: default_render_secs(),
        }
    }
}

impl Timeouts {
    pub fn compile(&self) -> Option<Duration> {
        budget(self.compile_secs)
    }

    pub fn transform(&self) -> Option<Duration> {
        budget(self.transform_secs)
    }

    pub fn run(&self) -> Option<Duration> {
        budget(self.run_secs)
    }

    pub fn render(&self) -> Option<Duration> {
        budget(self.render_secs)
    }
}

fn budget(secs: u64) -> Option<Duration> {
    if secs == 0 { None } else { Some(Duration::from_secs(secs)) }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_root(default_project_root())
    }
}

impl Config {
    pub fn with_root(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            tests_dir: None,
            results_dir: None,
            build_dir: None,
            tools: Tools::default(),
            timeouts: Timeouts::default(),
            render_jobs: None,
            render_skip: default_render_skip(),
        }
    }

    pub fn from_json(path: &Path) -> Result<Self> {
        let json_str = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&json_str).map_err(|source| Error::Config { path: path.to_path_buf(), source })
    }

    /// Reads `path` when given, otherwise uses the defaults rooted at the
    /// current directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_json(path),
            None => Ok(Self::default()),
        }
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.resolve(self.tests_dir.as_deref(), "tests")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.resolve(self.results_dir.as_deref(), "test_results")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve(self.build_dir.as_deref(), "build")
    }

    fn resolve(&self, configured: Option<&Path>, default: &str) -> PathBuf {
        match configured {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => self.project_root.join(p),
            None => self.project_root.join(default),
        }
    }
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

// Helper functions synthesized by the string-encryption pass have no
// counterpart in the original program.
fn default_render_skip() -> Vec<String> {
    vec!["chakravyuha_".to_string(), "dispatch_".to_string()]
}

fn default_compile_secs() -> u64 {
    120
}

fn default_transform_secs() -> u64 {
    300
}

fn default_run_secs() -> u64 {
    60
}

fn default_render_secs() -> u64 {
    120
}
