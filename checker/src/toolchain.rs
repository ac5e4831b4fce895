//! Locating external tools and the environment they are run with.
//!
//! Host quirks are folded into a computed environment that is handed to each
//! child process. The harness's own environment is never modified.

use crate::process::Invocation;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use vyuha::config::Config;

pub const PLUGIN_STEM: &str = "ChakravyuhaPasses";

/// Subdirectories of the build directory searched for the plugin, in order.
pub const PLUGIN_DIRS: [&str; 4] = ["lib", ".", "Debug", "Release"];

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("required tool `{tool}` was not found ({hint})")]
    ToolNotFound { tool: String, hint: String },
    #[error("pass plugin ChakravyuhaPasses not found; searched {}", display_paths(.searched))]
    PluginNotFound { searched: Vec<PathBuf> },
    #[error("could not open {path} in a viewer: {reason}")]
    ViewerFailed { path: PathBuf, reason: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Linux,
    Wsl,
    MacOs,
    Windows,
}

impl HostPlatform {
    pub fn detect() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else if cfg!(target_os = "macos") {
            HostPlatform::MacOs
        } else if is_wsl() {
            HostPlatform::Wsl
        } else {
            HostPlatform::Linux
        }
    }
}

fn is_wsl() -> bool {
    fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.to_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

/// Environment overrides for every child process.
#[derive(Debug, Clone, Default)]
pub struct ToolEnv {
    /// Effective search path, in lookup order.
    pub path: Vec<PathBuf>,
    pub vars: Vec<(String, String)>,
}

impl ToolEnv {
    /// The search path as seen by the host, after platform filtering.
    pub fn from_search_path(platform: HostPlatform, raw: Option<OsString>, brew_llvm: Option<PathBuf>) -> Self {
        let mut path: Vec<PathBuf> = raw.map(|p| env::split_paths(&p).collect()).unwrap_or_default();
        if platform == HostPlatform::Wsl {
            // Windows-mounted entries shadow Linux tools with .exe variants.
            path.retain(|p| p.is_absolute() && !p.starts_with("/mnt/"));
        }
        if let Some(prefix) = brew_llvm {
            let bin = prefix.join("bin");
            if bin.is_dir() {
                path.insert(0, bin);
            }
        }
        Self { path, vars: Vec::new() }
    }

    fn prepend(&mut self, dir: &Path) {
        if !self.path.iter().any(|p| p == dir) {
            self.path.insert(0, dir.to_path_buf());
        }
    }

    fn finish(mut self) -> Self {
        if self.path.is_empty() {
            return self;
        }
        if let Ok(joined) = env::join_paths(&self.path) {
            self.vars.push(("PATH".to_string(), joined.to_string_lossy().into_owned()));
        }
        self
    }

    pub fn apply(&self, invocation: Invocation) -> Invocation {
        invocation.envs(&self.vars)
    }
}

/// Looks `name` up in `dirs`, honouring the platform's executable suffix.
pub fn find_on_path(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let file = format!("{}{}", name, env::consts::EXE_SUFFIX);
    dirs.iter().map(|d| d.join(&file)).find(|p| p.is_file())
}

/// A configured path made absolute against the project root. Tools are run
/// from scratch directories, so a relative program path would not resolve.
fn anchored(root: &Path, configured: &Path) -> PathBuf {
    let joined = if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    };
    fs::canonicalize(&joined).unwrap_or(joined)
}

fn resolve_tool(name: &str, configured: Option<&Path>, root: &Path, env: &ToolEnv, hint: &str) -> Result<PathBuf, ToolchainError> {
    let found = match configured.map(|p| anchored(root, p)) {
        Some(p) if p.is_file() => Some(p),
        Some(p) => {
            warn!(tool = name, path = %p.display(), "configured tool path does not exist");
            None
        }
        None => find_on_path(name, &env.path),
    };
    found.ok_or_else(|| ToolchainError::ToolNotFound {
        tool: name.to_string(),
        hint: hint.to_string(),
    })
}

/// Candidate plugin locations under `build_dir`, in search order.
pub fn plugin_candidates(build_dir: &Path) -> Vec<PathBuf> {
    let file = format!("{}.{}", PLUGIN_STEM, env::consts::DLL_EXTENSION);
    PLUGIN_DIRS.iter().map(|d| build_dir.join(d).join(&file)).collect()
}

fn resolve_plugin(config: &Config) -> Result<PathBuf, ToolchainError> {
    let searched = match &config.tools.plugin {
        Some(p) => vec![anchored(&config.project_root, p)],
        None => plugin_candidates(&config.build_dir()),
    };
    match searched.iter().find(|p| p.is_file()) {
        Some(p) => Ok(p.clone()),
        None => Err(ToolchainError::PluginNotFound { searched }),
    }
}

fn brew_llvm_prefix() -> Option<PathBuf> {
    let out = Invocation::new("brew")
        .args(["--prefix", "llvm"])
        .run(Some(Duration::from_secs(20)))
        .ok()?;
    if !out.success() {
        return None;
    }
    let prefix = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if prefix.is_empty() { None } else { Some(PathBuf::from(prefix)) }
}

fn host_env(platform: HostPlatform) -> ToolEnv {
    let brew = if platform == HostPlatform::MacOs { brew_llvm_prefix() } else { None };
    ToolEnv::from_search_path(platform, env::var_os("PATH"), brew)
}

/// Settles the environment once `opt` is known.
fn finish_env(platform: HostPlatform, mut env: ToolEnv, opt: &Path) -> ToolEnv {
    let bin_dir = opt.parent().map(Path::to_path_buf);
    match (platform, bin_dir) {
        (HostPlatform::Windows, Some(dir)) => env.prepend(&dir),
        (HostPlatform::MacOs, Some(dir)) => {
            let lib = dir.parent().map(|p| p.join("lib"));
            if let Some(lib) = lib.filter(|l| l.is_dir()) {
                env.vars.push(("DYLD_LIBRARY_PATH".to_string(), lib.display().to_string()));
            }
        }
        _ => {}
    }
    env.finish()
}

/// Tools needed by the test runner.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub platform: HostPlatform,
    pub clang: PathBuf,
    /// Only resolved when a C++ test case exists.
    pub clangxx: Option<PathBuf>,
    pub opt: PathBuf,
    pub plugin: PathBuf,
    pub env: ToolEnv,
}

impl Toolchain {
    pub fn for_suite(config: &Config, needs_cxx: bool) -> Result<Self, ToolchainError> {
        let platform = HostPlatform::detect();
        Self::resolve(config, needs_cxx, platform, host_env(platform))
    }

    pub fn resolve(config: &Config, needs_cxx: bool, platform: HostPlatform, env: ToolEnv) -> Result<Self, ToolchainError> {
        let tools = &config.tools;
        let root = config.project_root.as_path();
        let clang = resolve_tool("clang", tools.clang.as_deref(), root, &env, "install clang or set tools.clang")?;
        let clangxx = if needs_cxx {
            Some(resolve_tool("clang++", tools.clangxx.as_deref(), root, &env, "install clang++ or set tools.clangxx")?)
        } else {
            None
        };
        let opt = resolve_tool("opt", tools.opt.as_deref(), root, &env, "install LLVM opt or set tools.opt")?;
        let plugin = resolve_plugin(config)?;
        let env = finish_env(platform, env, &opt);
        debug!(clang = %clang.display(), opt = %opt.display(), plugin = %plugin.display(), "toolchain resolved");
        Ok(Self {
            platform,
            clang,
            clangxx,
            opt,
            plugin,
            env,
        })
    }
}

/// Tools needed by the report generator.
#[derive(Debug, Clone)]
pub struct ReportTools {
    pub platform: HostPlatform,
    pub opt: PathBuf,
    pub dot: PathBuf,
    pub env: ToolEnv,
}

impl ReportTools {
    pub fn for_report(config: &Config) -> Result<Self, ToolchainError> {
        let platform = HostPlatform::detect();
        Self::resolve(config, platform, host_env(platform))
    }

    pub fn resolve(config: &Config, platform: HostPlatform, env: ToolEnv) -> Result<Self, ToolchainError> {
        let root = config.project_root.as_path();
        let opt = resolve_tool("opt", config.tools.opt.as_deref(), root, &env, "install LLVM opt or set tools.opt")?;
        let dot = resolve_tool("dot", config.tools.dot.as_deref(), root, &env, "install Graphviz or set tools.dot")?;
        let env = finish_env(platform, env, &opt);
        Ok(Self { platform, opt, dot, env })
    }
}

/// Hands `path` to the host's default viewer.
pub fn open_in_viewer(platform: HostPlatform, path: &Path) -> Result<(), ToolchainError> {
    let invocation = match platform {
        HostPlatform::Linux | HostPlatform::Wsl => Invocation::new("xdg-open").arg(path),
        HostPlatform::MacOs => Invocation::new("open").arg(path),
        HostPlatform::Windows => Invocation::new("cmd").args(["/C", "start", ""]).arg(path),
    };
    let failed = |reason: String| ToolchainError::ViewerFailed {
        path: path.to_path_buf(),
        reason,
    };
    let out = invocation.run(Some(Duration::from_secs(30))).map_err(|e| failed(e.to_string()))?;
    if out.success() { Ok(()) } else { Err(failed(out.diagnostic())) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn wsl_drops_windows_entries() {
        let raw = env::join_paths(["/usr/bin", "/mnt/c/Windows", "relative/bin", "/usr/local/bin"]).unwrap();
        let wsl = ToolEnv::from_search_path(HostPlatform::Wsl, Some(raw.clone()), None);
        assert_eq!(wsl.path, vec![PathBuf::from("/usr/bin"), PathBuf::from("/usr/local/bin")]);
        let linux = ToolEnv::from_search_path(HostPlatform::Linux, Some(raw), None);
        assert_eq!(linux.path.len(), 4);
    }

    #[test]
    fn brew_prefix_is_prepended_when_present() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        let raw = env::join_paths(["/usr/bin"]).unwrap();
        let env = ToolEnv::from_search_path(HostPlatform::MacOs, Some(raw), Some(dir.path().to_path_buf()));
        assert_eq!(env.path[0], dir.path().join("bin"));
    }

    #[test]
    fn first_match_on_path_wins() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let name = format!("opt{}", env::consts::EXE_SUFFIX);
        touch(&b.path().join(&name));
        let dirs = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        assert_eq!(find_on_path("opt", &dirs), Some(b.path().join(&name)));
        assert_eq!(find_on_path("dot", &dirs), None);
    }

    #[test]
    fn plugin_search_order() {
        let build = tempfile::tempdir().unwrap();
        let candidates = plugin_candidates(build.path());
        touch(&candidates[3]);
        touch(&candidates[1]);
        let mut config = Config::with_root(build.path());
        config.build_dir = Some(build.path().to_path_buf());
        assert_eq!(resolve_plugin(&config).unwrap(), candidates[1]);
        assert!(candidates[0].starts_with(build.path().join("lib")));
    }

    #[test]
    fn missing_tools_are_reported_before_anything_runs() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::with_root(root.path());
        let env = ToolEnv::default();
        match Toolchain::resolve(&config, false, HostPlatform::Linux, env.clone()) {
            Err(ToolchainError::ToolNotFound { tool, .. }) => assert_eq!(tool, "clang"),
            other => panic!("unexpected {:?}", other),
        }
        match ReportTools::resolve(&config, HostPlatform::Linux, env) {
            Err(ToolchainError::ToolNotFound { tool, .. }) => assert_eq!(tool, "opt"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn configured_paths_take_precedence() {
        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("bin");
        for tool in ["clang", "opt"] {
            touch(&bin.join(tool));
        }
        let mut config = Config::with_root(root.path());
        config.tools.clang = Some(bin.join("clang"));
        config.tools.opt = Some(bin.join("opt"));
        config.tools.plugin = Some(bin.join("plugin"));
        touch(&bin.join("plugin"));
        let tools = Toolchain::resolve(&config, false, HostPlatform::Windows, ToolEnv::default()).unwrap();
        let bin = fs::canonicalize(&bin).unwrap();
        assert_eq!(tools.opt, bin.join("opt"));
        assert!(tools.clangxx.is_none());
        assert_eq!(tools.env.path[0], bin);
        assert!(tools.env.vars.iter().any(|(k, _)| k == "PATH"));
    }

    #[test]
    fn relative_tool_paths_are_anchored_at_the_project_root() {
        let root = tempfile::tempdir().unwrap();
        for tool in ["tools/opt", "tools/dot"] {
            touch(&root.path().join(tool));
        }
        let mut config = Config::with_root(root.path());
        config.tools.opt = Some(PathBuf::from("tools/opt"));
        config.tools.dot = Some(PathBuf::from("tools/dot"));
        let tools = ReportTools::resolve(&config, HostPlatform::Linux, ToolEnv::default()).unwrap();
        assert!(tools.opt.is_absolute());
        assert_eq!(tools.dot, fs::canonicalize(root.path().join("tools/dot")).unwrap());

        config.tools.dot = Some(PathBuf::from("tools/missing"));
        assert!(ReportTools::resolve(&config, HostPlatform::Linux, ToolEnv::default()).is_err());
    }
}
