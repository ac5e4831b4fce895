use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "c" => Some(Language::C),
            "cpp" => Some(Language::Cxx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub name: String,
    pub source: PathBuf,
    pub language: Language,
}

impl TestCase {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_stem()?.to_str()?;
        if !name.starts_with("test_") {
            return None;
        }
        let language = Language::from_extension(path.extension()?.to_str()?)?;
        Some(Self {
            name: name.to_string(),
            source: path.to_path_buf(),
            language,
        })
    }
}

/// Collects every `test_*.c` and `test_*.cpp` under `dir`, sorted by name.
///
/// Two sources sharing a stem would write to the same artifact paths, so
/// that is rejected rather than letting one silently shadow the other.
pub fn discover(dir: &Path) -> Result<Vec<TestCase>> {
    if !dir.is_dir() {
        return Err(Error::MissingTestsDir(dir.to_path_buf()));
    }
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut cases: BTreeMap<String, TestCase> = BTreeMap::new();
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();
    for path in paths {
        if !path.is_file() {
            continue;
        }
        let case = match TestCase::from_path(&path) {
            Some(case) => case,
            None => continue,
        };
        if let Some(prev) = cases.get(&case.name) {
            return Err(Error::DuplicateTestName {
                name: case.name.clone(),
                first: prev.source.clone(),
                second: case.source,
            });
        }
        cases.insert(case.name.clone(), case);
    }
    Ok(cases.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "int main(void) { return 0; }\n").unwrap();
    }

    #[test]
    fn discover_sorted_c_and_cpp() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "test_switch.c");
        touch(dir.path(), "test_lambda-cpp.cpp");
        touch(dir.path(), "test_a.c");
        touch(dir.path(), "helper.c");
        touch(dir.path(), "test_notes.txt");
        fs::create_dir(dir.path().join("test_dir.c")).unwrap();

        let cases = discover(dir.path()).unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["test_a", "test_lambda-cpp", "test_switch"]);
        assert_eq!(cases[1].language, Language::Cxx);
        assert_eq!(cases[2].language, Language::C);
    }

    #[test]
    fn duplicate_stems_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "test_loops.c");
        touch(dir.path(), "test_loops.cpp");
        match discover(dir.path()) {
            Err(Error::DuplicateTestName { name, .. }) => assert_eq!(name, "test_loops"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(discover(&dir.path().join("nope")), Err(Error::MissingTestsDir(_))));
    }
}
