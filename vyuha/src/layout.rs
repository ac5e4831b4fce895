//! The results tree. Stages never hand each other anything but paths, so
//! every path in the run is produced here from `(test, variant[, key])`.

use crate::pipeline::PipelineId;
use serde::{Serialize, Serializer};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Which side of the transformation an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variant {
    Original,
    Transformed(PipelineId),
}

impl Variant {
    /// Directory and filename tag: `original` or the pipeline id.
    pub fn tag(&self) -> &'static str {
        match self {
            Variant::Original => "original",
            Variant::Transformed(p) => p.as_str(),
        }
    }

    pub fn pipeline(&self) -> Option<PipelineId> {
        match self {
            Variant::Original => None,
            Variant::Transformed(p) => Some(*p),
        }
    }

    pub fn is_original(&self) -> bool {
        matches!(self, Variant::Original)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for Variant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

/// An intermediate-representation file for one `(test, variant)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrArtifact {
    pub test_name: String,
    pub variant: Variant,
    pub path: PathBuf,
}

pub const LL_FILES: &str = "ll_files";
pub const BINARIES: &str = "binaries";
pub const REPORTS: &str = "reports";
pub const LOGS: &str = "logs";
pub const OUTPUTS: &str = "outputs";
pub const DOT_FILES: &str = "dot_files";
pub const VISUALIZATIONS: &str = "visualizations";
pub const COMPARISON: &str = "comparison";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the fixed subdirectories the test runner writes into.
    pub fn create_dirs(&self) -> io::Result<()> {
        for sub in [LL_FILES, BINARIES, REPORTS, LOGS, OUTPUTS] {
            fs::create_dir_all(self.root.join(sub))?;
        }
        Ok(())
    }

    pub fn ll_dir(&self) -> PathBuf {
        self.root.join(LL_FILES)
    }

    /// `<test>.ll` for the original, `<test>_<variant>.ll` otherwise.
    pub fn ll_file(&self, test: &str, variant: Variant) -> PathBuf {
        let name = match variant {
            Variant::Original => format!("{}.ll", test),
            Variant::Transformed(p) => format!("{}_{}.ll", test, p),
        };
        self.ll_dir().join(name)
    }

    pub fn ir_artifact(&self, test: &str, variant: Variant) -> IrArtifact {
        IrArtifact {
            test_name: test.to_string(),
            variant,
            path: self.ll_file(test, variant),
        }
    }

    pub fn binary(&self, test: &str, variant: Variant) -> PathBuf {
        let name = format!("{}_{}{}", test, variant.tag(), std::env::consts::EXE_SUFFIX);
        self.root.join(BINARIES).join(name)
    }

    pub fn report(&self, test: &str, pipeline: PipelineId) -> PathBuf {
        self.root.join(REPORTS).join(format!("{}_{}.json", test, pipeline))
    }

    pub fn log(&self, test: &str, pipeline: PipelineId) -> PathBuf {
        self.root.join(LOGS).join(format!("{}_{}.log", test, pipeline))
    }

    pub fn output(&self, test: &str, variant: Variant) -> PathBuf {
        self.root.join(OUTPUTS).join(format!("{}_{}.out", test, variant.tag()))
    }

    pub fn summary(&self, pipeline: PipelineId) -> PathBuf {
        self.root.join(format!("summary_{}.json", pipeline))
    }

    pub fn dot_dir(&self, variant: Variant, test: &str) -> PathBuf {
        self.root.join(DOT_FILES).join(variant.tag()).join(test)
    }

    pub fn dot_file(&self, variant: Variant, test: &str, key: &str) -> PathBuf {
        self.dot_dir(variant, test).join(format!("{}.dot", key))
    }

    /// Working directory for one graph-extraction run; the extractor drops
    /// its files into the current directory.
    pub fn scratch_dir(&self, ir_stem: &str) -> PathBuf {
        self.root.join(DOT_FILES).join(".scratch").join(ir_stem)
    }

    pub fn image_dir(&self, variant: Variant, test: &str) -> PathBuf {
        self.root.join(VISUALIZATIONS).join(variant.tag()).join(test)
    }

    pub fn image_file(&self, variant: Variant, test: &str, key: &str) -> PathBuf {
        self.image_dir(variant, test).join(format!("{}.png", key))
    }

    /// Maps `dot_files/<side>/<test>/<key>.dot` to its image path.
    pub fn image_for_dot(&self, dot: &Path) -> Option<PathBuf> {
        let rel = dot.strip_prefix(self.root.join(DOT_FILES)).ok()?;
        Some(self.root.join(VISUALIZATIONS).join(rel).with_extension("png"))
    }

    pub fn comparison_dir(&self) -> PathBuf {
        self.root.join(VISUALIZATIONS).join(COMPARISON)
    }

    pub fn report_document(&self) -> PathBuf {
        self.comparison_dir().join("index.html")
    }

    /// Image reference as seen from the report document.
    pub fn image_href(&self, variant: Variant, test: &str, key: &str) -> String {
        format!("../{}/{}/{}.png", variant.tag(), href_segment(test), href_segment(key))
    }
}

/// Escapes the characters a file name may keep but a relative URL may not.
fn href_segment(name: &str) -> String {
    name.replace('%', "%25").replace('#', "%23")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_keyed_by_test_and_variant() {
        let layout = Layout::new("/r");
        let full = Variant::Transformed(PipelineId::Full);
        assert_eq!(layout.ll_file("test_a", Variant::Original), PathBuf::from("/r/ll_files/test_a.ll"));
        assert_eq!(layout.ll_file("test_a", full), PathBuf::from("/r/ll_files/test_a_full.ll"));
        assert_eq!(layout.report("test_a", PipelineId::Cff), PathBuf::from("/r/reports/test_a_cff.json"));
        assert_eq!(layout.log("test_a", PipelineId::Cff), PathBuf::from("/r/logs/test_a_cff.log"));
        assert_eq!(layout.output("test_a", Variant::Original), PathBuf::from("/r/outputs/test_a_original.out"));
        assert_eq!(layout.output("test_a", full), PathBuf::from("/r/outputs/test_a_full.out"));
        assert_ne!(layout.binary("test_a", Variant::Original), layout.binary("test_a", full));
    }

    #[test]
    fn distinct_tests_never_share_paths() {
        let layout = Layout::new("/r");
        let v = Variant::Transformed(PipelineId::String);
        assert_ne!(layout.ll_file("test_a", v), layout.ll_file("test_b", v));
        assert_ne!(layout.dot_file(v, "test_a", "main"), layout.dot_file(v, "test_b", "main"));
        assert_ne!(layout.image_file(v, "test_a", "main"), layout.image_file(v, "test_b", "main"));
    }

    #[test]
    fn image_is_derived_from_dot_path() {
        let layout = Layout::new("/r");
        let v = Variant::Transformed(PipelineId::Full);
        let dot = layout.dot_file(v, "test_a", "main");
        assert_eq!(layout.image_for_dot(&dot), Some(layout.image_file(v, "test_a", "main")));
        assert_eq!(layout.image_for_dot(Path::new("/elsewhere/x.dot")), None);
        assert_eq!(layout.image_href(v, "test_a", "main"), "../full/test_a/main.png");
    }

    #[test]
    fn hrefs_escape_url_delimiters() {
        let layout = Layout::new("/r");
        let full = Variant::Transformed(PipelineId::Full);
        assert_eq!(layout.image_href(full, "test_a", "main"), "../full/test_a/main.png");
        assert_eq!(layout.image_href(Variant::Original, "test_a", "f#1%2"), "../original/test_a/f%231%252.png");
    }
}
