//! Whole-pipeline runs against stand-in tools.
//!
//! The fake compiler copies its input and marks it executable, so a "test
//! program" is a shell script whose `#fn NAME` lines name its functions.
#![cfg(unix)]

use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use vyuha::config::Config;
use vyuha::layout::Layout;
use vyuha::outcome::{FailureKind, SuiteSummary};
use vyuha::pipeline::PipelineId;
use vyuha::report::AggregatedReport;
use vyuha::test_case::discover;
use vyuhac::aggregate::{aggregate, write_document};
use vyuhac::orchestrator::run_suite;
use vyuhac::render::{plan, render_all};
use vyuhac::stages::Context;
use vyuhac::toolchain::{HostPlatform, ReportTools, ToolEnv, Toolchain};
use vyuhac::visualize::{extract_all, list_ir};

const FAKE_CLANG: &str = r##"#!/bin/sh
out=""; in=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2;;
    -*) shift;;
    *) in="$1"; shift;;
  esac
done
cp "$in" "$out" && chmod +x "$out"
"##;

const FAKE_OPT: &str = r##"#!/bin/sh
passes=""; in=""
while [ $# -gt 0 ]; do
  case "$1" in
    -passes=*) passes="${1#-passes=}"; shift;;
    -o) shift 2;;
    -*) shift;;
    *) in="$1"; shift;;
  esac
done
case "$passes" in
  dot-cfg)
    grep '^#fn ' "$in" | while read -r _ name; do
      printf 'digraph "CFG for '\''%s'\'' function" {\n  Node0 [shape=record,label="{entry:\\l}"];\n  Node0 -> Node1;\n  Node1 [shape=record,label="{exit:\\l}"];\n}\n' "$name" > ".$name.dot"
    done;;
  *chakravyuha-emit-report)
    if grep -q '^#report-fails$' "$in"; then echo "emit-report: internal error" >&2; exit 1; fi
    if grep -q '^#report-garbage$' "$in"; then echo 'statistics unavailable'; exit 0; fi
    printf '{"obfuscationMetrics":{"cyclesCompleted":1,"passesRun":["StringEncrypt","ControlFlowFlattening","FakeCodeInsertion"],"controlFlowFlattening":{"flattenedFunctions":1}}}\n';;
  *)
    echo "running $passes on $in" >&2
    if grep -q '^#transform-fails$' "$in"; then echo "pass aborted" >&2; exit 1; fi
    sed 's/^#crash-if-transformed$/exit 3/' "$in"
    echo '#fn chakravyuha_decrypt_0';;
esac
"##;

const FAKE_DOT: &str = r##"#!/bin/sh
out=""; in=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2;;
    -*) shift;;
    *) in="$1"; shift;;
  esac
done
if grep -q BROKEN "$in"; then
  echo "syntax error in $in" >&2
  exit 1
fi
if grep -q SLOW "$in"; then
  printf 'PART' > "$out"
  exec sleep 5
fi
printf 'PNG' > "$out"
"##;

struct Fixture {
    dir: TempDir,
    config: Config,
}

fn script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn fixture(sources: &[(&str, &str)]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let tools = root.join("tools");
    fs::create_dir_all(&tools).unwrap();
    script(&tools.join("clang"), FAKE_CLANG);
    script(&tools.join("opt"), FAKE_OPT);
    script(&tools.join("dot"), FAKE_DOT);
    fs::write(tools.join("ChakravyuhaPasses.so"), b"").unwrap();

    let tests = root.join("tests");
    fs::create_dir_all(&tests).unwrap();
    for (name, body) in sources {
        fs::write(tests.join(name), body).unwrap();
    }

    let mut config = Config::with_root(root);
    config.tools.clang = Some(tools.join("clang"));
    config.tools.opt = Some(tools.join("opt"));
    config.tools.dot = Some(tools.join("dot"));
    config.tools.plugin = Some(tools.join("ChakravyuhaPasses.so"));
    Fixture { dir, config }
}

fn host_env() -> ToolEnv {
    ToolEnv::from_search_path(HostPlatform::Linux, std::env::var_os("PATH"), None)
}

impl Fixture {
    fn layout(&self) -> Layout {
        Layout::new(self.config.results_dir())
    }

    fn suite(&self, pipeline: PipelineId) -> SuiteSummary {
        let cases = discover(&self.config.tests_dir()).unwrap();
        let tools = Toolchain::resolve(&self.config, false, HostPlatform::Linux, host_env()).unwrap();
        let layout = self.layout();
        layout.create_dirs().unwrap();
        let ctx = Context::new(&self.config, &layout, &tools);
        run_suite(&ctx, &cases, &pipeline.spec())
    }

    fn report(&self) -> AggregatedReport {
        self.report_within(None)
    }

    fn report_within(&self, render_budget: Option<Duration>) -> AggregatedReport {
        let tools = ReportTools::resolve(&self.config, HostPlatform::Linux, host_env()).unwrap();
        let layout = self.layout();
        let irs = list_ir(&layout, &BTreeSet::new()).unwrap();
        let extractions = extract_all(&tools, &layout, &irs, None);
        let tasks = plan(&layout, extractions.iter().flat_map(|e| e.graphs.iter()), &self.config.render_skip);
        render_all(&tools, &tasks, Some(2), render_budget).unwrap();
        let tests = irs.into_iter().map(|ir| ir.test_name).collect();
        let report = aggregate(&layout, &tests);
        write_document(&layout, &report).unwrap();
        report
    }

    fn rewrite(&self, name: &str, body: &str) {
        fs::write(self.config.tests_dir().join(name), body).unwrap();
    }

    fn files_under(&self, sub: &str) -> BTreeSet<PathBuf> {
        let base = self.layout().root().join(sub);
        let mut found = BTreeSet::new();
        walk(&base, &base, &mut found);
        found
    }
}

fn walk(base: &Path, dir: &Path, found: &mut BTreeSet<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            walk(base, &path, found);
        } else {
            found.insert(path.strip_prefix(base).unwrap().to_path_buf());
        }
    }
}

const HELLO: &str = "#!/bin/sh\necho hello\n#fn main\n";

#[test]
fn single_function_passes_full_pipeline() {
    let fx = fixture(&[("test_hello.c", HELLO)]);
    let summary = fx.suite(PipelineId::Full);
    assert_eq!((summary.passed, summary.failed), (1, 0));
    let outcome = &summary.outcomes[0];
    assert!(outcome.equivalence.as_ref().unwrap().passed);
    let metrics = outcome.metrics.as_ref().unwrap();
    assert!(!metrics.passes_run.is_empty());
    assert_eq!(metrics.counter("controlFlowFlattening", "flattenedFunctions"), 1);
    assert!(metrics.binary_size.is_known());

    let log = fs::read_to_string(fx.layout().log("test_hello", PipelineId::Full)).unwrap();
    assert!(log.contains("running chakravyuha-string-encrypt"));

    let report = fx.report();
    let test = &report.per_test["test_hello"];
    assert_eq!(test.comparisons.keys().collect::<Vec<_>>(), vec!["main"]);
    assert_eq!(test.metrics.as_ref().unwrap().variant, PipelineId::Full);
    let shape = test.comparisons["main"].transformed_shape.unwrap();
    assert_eq!((shape.blocks, shape.edges), (2, 1));
}

#[test]
fn crashing_transformed_program_is_a_run_failure() {
    let crash = "#!/bin/sh\n#crash-if-transformed\necho hello\n#fn main\n";
    let fx = fixture(&[("test_crash.c", crash), ("test_hello.c", HELLO)]);
    let summary = fx.suite(PipelineId::Cff);
    assert_eq!((summary.passed, summary.failed), (1, 1));

    let crashed = summary.outcomes.iter().find(|o| o.test_name == "test_crash").unwrap();
    let failure = crashed.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::RunFailure);
    assert_eq!(failure.stage, "run(cff)");
    assert!(crashed.equivalence.is_none());
    assert!(!crashed.passed());

    let other = summary.outcomes.iter().find(|o| o.test_name == "test_hello").unwrap();
    assert!(other.passed());
}

#[test]
fn render_failure_hides_only_that_function() {
    let source = "#!/bin/sh\necho hi\n#fn main\n#fn helper_BROKEN\n#fn util\n";
    let fx = fixture(&[("test_multi.c", source)]);
    assert!(fx.suite(PipelineId::Full).all_passed());

    let report = fx.report();
    let keys: Vec<&String> = report.per_test["test_multi"].comparisons.keys().collect();
    assert_eq!(keys, vec!["main", "util"]);
    let images = fx.files_under("visualizations");
    assert!(!images.iter().any(|p| p.to_string_lossy().contains("BROKEN")));
    assert!(fx.files_under("dot_files").iter().any(|p| p.ends_with("helper_BROKEN.dot")));
}

#[test]
fn rerunning_produces_the_same_files() {
    let source = "#!/bin/sh\necho hi\n#fn main\n#fn _Z3addii\n";
    let fx = fixture(&[("test_twice.c", source)]);
    let snapshot = || {
        assert!(fx.suite(PipelineId::String).all_passed());
        fx.report();
        (fx.files_under("dot_files"), fx.files_under("visualizations"), fx.files_under("ll_files"))
    };
    let first = snapshot();
    let second = snapshot();
    assert_eq!(first, second);
    assert!(first.0.contains(&PathBuf::from("string/test_twice/_Z3addii.dot")));
    assert!(!first.0.iter().any(|p| p.starts_with(".scratch")));
    assert!(first.1.contains(&PathBuf::from("comparison/index.html")));
}

#[test]
fn failed_rerun_hides_earlier_results() {
    let fx = fixture(&[("test_flaky.c", HELLO)]);
    assert!(fx.suite(PipelineId::Full).all_passed());
    let before = fx.report();
    assert_eq!(before.per_test["test_flaky"].comparisons.len(), 1);

    fx.rewrite("test_flaky.c", "#!/bin/sh\n#transform-fails\necho hello\n#fn main\n");
    let summary = fx.suite(PipelineId::Full);
    let failure = summary.outcomes[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::TransformFailure);
    assert!(failure.diagnostic.as_deref().unwrap().ends_with("pass aborted"));

    let after = fx.report();
    let test = &after.per_test["test_flaky"];
    assert!(test.metrics.is_none());
    assert!(test.comparisons.is_empty());
    assert!(fx.files_under("ll_files").iter().all(|p| p == Path::new("test_flaky.ll")));
}

#[test]
fn timed_out_render_leaves_no_image() {
    let source = "#!/bin/sh\necho hi\n#fn main\n#fn wait_SLOW\n";
    let fx = fixture(&[("test_slow.c", source)]);
    assert!(fx.suite(PipelineId::Full).all_passed());

    let report = fx.report_within(Some(Duration::from_millis(500)));
    let keys: Vec<&String> = report.per_test["test_slow"].comparisons.keys().collect();
    assert_eq!(keys, vec!["main"]);
    assert!(!fx.files_under("visualizations").iter().any(|p| p.to_string_lossy().contains("SLOW")));
}

#[test]
fn unreadable_statistics_keep_the_case_passing() {
    let source = "#!/bin/sh\n#report-garbage\necho hello\n#fn main\n";
    let fx = fixture(&[("test_quiet.c", source)]);
    let summary = fx.suite(PipelineId::Fake);
    assert_eq!((summary.passed, summary.failed), (1, 0));
    let metrics = summary.outcomes[0].metrics.as_ref().unwrap();
    assert!(metrics.is_empty());
    assert!(metrics.binary_size.is_known());
}

#[test]
fn failing_reporting_pass_is_a_report_failure() {
    let source = "#!/bin/sh\n#report-fails\necho hello\n#fn main\n";
    let fx = fixture(&[("test_noisy.c", source), ("test_hello.c", HELLO)]);
    let summary = fx.suite(PipelineId::Cff);
    assert_eq!((summary.passed, summary.failed), (1, 1));
    let noisy = summary.outcomes.iter().find(|o| o.test_name == "test_noisy").unwrap();
    let failure = noisy.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::ReportFailure);
    assert_eq!(failure.stage, "report");
    assert!(failure.diagnostic.as_deref().unwrap().contains("emit-report: internal error"));
    assert!(noisy.equivalence.is_none());
}
