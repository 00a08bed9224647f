//! File Predictor
//!
//! Estimates which files each task will touch. Predictions deliberately lean
//! towards claiming too many files: a false positive only costs parallelism,
//! a false negative can cost a merge conflict.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::analysis::text;
use crate::models::{FilePrediction, Task};

/// Directory names never scanned
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", ".parallel-engine"];

/// Source roots whose immediate children also count as module directories
const SOURCE_ROOTS: &[&str] = &["src", "lib", "app", "packages", "crates"];

/// Snapshot of the repository's file tree, captured once per run
#[derive(Debug, Clone, Default)]
pub struct RepoSnapshot {
    /// Repository-relative paths with '/' separators, sorted
    files: Vec<String>,
    /// Module directories (relative path) keyed by lowercased directory name
    module_dirs: BTreeMap<String, Vec<String>>,
}

impl RepoSnapshot {
    /// Walk the repository, skipping VCS/build directories and anything under `excluded`
    pub fn scan(root: &Path, excluded: &[PathBuf]) -> Self {
        let files = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let skipped_name = entry.depth() > 0
                    && entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| SKIPPED_DIRS.contains(&name));
                !skipped_name && !excluded.iter().any(|ex| entry.path().starts_with(ex))
            })
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(root).ok()?;
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect();
                Some(parts.join("/"))
            });

        let snapshot = Self::from_files(files);
        log::debug!(
            "[FilePredictor] Scanned {} files, {} module directories under {:?}",
            snapshot.files.len(),
            snapshot.module_dirs.len(),
            root
        );
        snapshot
    }

    /// Build a snapshot from a list of relative paths
    pub fn from_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut files: Vec<String> = files.into_iter().map(Into::into).collect();
        files.sort();
        files.dedup();

        let mut module_dirs: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for file in &files {
            let segments: Vec<&str> = file.split('/').collect();
            if segments.len() < 2 {
                continue;
            }

            let mut add = |dir: String, name: &str| {
                let entry = module_dirs.entry(name.to_lowercase()).or_default();
                if !entry.contains(&dir) {
                    entry.push(dir);
                }
            };

            add(segments[0].to_string(), segments[0]);
            if segments.len() > 2 && SOURCE_ROOTS.contains(&segments[0]) {
                add(format!("{}/{}", segments[0], segments[1]), segments[1]);
            }
        }

        Self { files, module_dirs }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.binary_search_by(|f| f.as_str().cmp(path)).is_ok()
    }

    /// Every file below a repository-relative directory
    pub fn files_under<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.files.iter().filter(move |f| f.starts_with(&prefix))
    }

    /// Module directories whose name equals `name` (case-insensitive)
    pub fn module_dirs_named(&self, name: &str) -> &[String] {
        self.module_dirs
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn module_dir_names(&self) -> impl Iterator<Item = &String> {
        self.module_dirs.keys()
    }
}

/// One predicted file from a single method
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionHit {
    pub path: String,
    pub confidence: f64,
}

impl PredictionHit {
    fn new(path: impl Into<String>, confidence: f64) -> Self {
        Self {
            path: path.into(),
            confidence,
        }
    }
}

/// A heuristic mapping a task to files it is likely to touch
pub trait PredictionMethod: Send + Sync {
    /// Name recorded in `FilePrediction::method`
    fn name(&self) -> &'static str;

    fn predict(&self, task: &Task, repo: &RepoSnapshot) -> Vec<PredictionHit>;
}

/// Paths quoted verbatim in the description
#[derive(Debug, Default)]
pub struct ExplicitPathMethod;

impl PredictionMethod for ExplicitPathMethod {
    fn name(&self) -> &'static str {
        "explicit_path"
    }

    fn predict(&self, task: &Task, repo: &RepoSnapshot) -> Vec<PredictionHit> {
        let mut hits = Vec::new();

        for path in text::extract_paths(&task.description) {
            let under: Vec<&String> = repo.files_under(&path).collect();
            if !under.is_empty() {
                hits.extend(under.into_iter().map(|f| PredictionHit::new(f.clone(), 1.0)));
                continue;
            }

            if repo.contains(&path) {
                hits.push(PredictionHit::new(path, 1.0));
                continue;
            }

            // Bare file names resolve to every file with that name
            let suffix = format!("/{}", path);
            let resolved: Vec<&String> = repo.files().iter().filter(|f| f.ends_with(&suffix)).collect();
            if !resolved.is_empty() {
                hits.extend(resolved.into_iter().map(|f| PredictionHit::new(f.clone(), 1.0)));
            } else if has_extension(&path) {
                // A file the task is going to create
                hits.push(PredictionHit::new(path, 1.0));
            }
        }

        hits
    }
}

fn has_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}

/// Domain keywords mapped to module directories present in the repository
pub struct KeywordDirectoryMethod {
    /// Directory name -> keywords that refer to it
    synonyms: Vec<(&'static str, &'static [&'static str])>,
}

impl Default for KeywordDirectoryMethod {
    fn default() -> Self {
        Self {
            synonyms: vec![
                ("tests", &["test", "testing", "spec", "specs", "coverage"]),
                ("test", &["tests", "testing", "spec", "specs", "coverage"]),
                ("docs", &["documentation", "doc", "readme", "guide", "manual"]),
                ("api", &["endpoint", "endpoints", "rest", "route", "routes", "http"]),
                ("routes", &["route", "endpoint", "endpoints", "url", "urls"]),
                ("components", &["component", "button", "widget", "form", "modal", "layout"]),
                ("ui", &["interface", "button", "widget", "form", "modal", "layout", "style"]),
                ("styles", &["style", "css", "theme", "colors", "colour", "color"]),
                ("db", &["database", "schema", "migration", "migrations", "table", "sql", "query"]),
                ("database", &["db", "schema", "migration", "migrations", "table", "sql", "query"]),
                ("migrations", &["migration", "schema", "table"]),
                ("models", &["model", "entity", "entities", "schema"]),
                ("auth", &["login", "logout", "authentication", "authorization", "password", "session", "oauth", "signin", "signup"]),
                ("config", &["configuration", "settings", "setting", "env", "environment"]),
                ("scripts", &["script", "automation", "tooling"]),
                ("utils", &["util", "utility", "utilities", "helper", "helpers"]),
                ("helpers", &["helper", "util", "utils", "utility", "utilities"]),
                (".github", &["pipeline", "workflow", "workflows", "github", "actions"]),
                ("cli", &["command", "commands", "flag", "flags", "argument", "arguments"]),
                ("i18n", &["translation", "translations", "locale", "locales", "localization"]),
                ("locales", &["translation", "translations", "locale", "localization", "i18n"]),
            ],
        }
    }
}

impl PredictionMethod for KeywordDirectoryMethod {
    fn name(&self) -> &'static str {
        "keyword_directory"
    }

    fn predict(&self, task: &Task, repo: &RepoSnapshot) -> Vec<PredictionHit> {
        let tokens: HashSet<String> = text::prose_tokens(&task.description).into_iter().collect();
        let mut best: BTreeMap<String, f64> = BTreeMap::new();

        for name in repo.module_dir_names() {
            let exact = tokens.iter().any(|t| same_word(t, name));
            let synonym = self
                .synonyms
                .iter()
                .filter(|(dir, _)| *dir == name.as_str())
                .any(|(_, words)| words.iter().any(|w| tokens.contains(*w)));

            let confidence = if exact {
                0.7
            } else if synonym {
                0.5
            } else {
                continue;
            };

            for dir in repo.module_dirs_named(name) {
                for file in repo.files_under(dir) {
                    let entry = best.entry(file.clone()).or_insert(0.0);
                    *entry = entry.max(confidence);
                }
            }
        }

        best.into_iter()
            .map(|(path, confidence)| PredictionHit::new(path, confidence))
            .collect()
    }
}

/// Singular/plural-insensitive comparison of a token and a directory name
fn same_word(token: &str, name: &str) -> bool {
    token == name || token.trim_end_matches('s') == name.trim_end_matches('s')
}

/// Description tokens matched against file stems and directory segments
#[derive(Debug, Default)]
pub struct StructureMatchMethod;

impl PredictionMethod for StructureMatchMethod {
    fn name(&self) -> &'static str {
        "structure_match"
    }

    fn predict(&self, task: &Task, repo: &RepoSnapshot) -> Vec<PredictionHit> {
        let mut tokens: HashSet<String> =
            text::prose_tokens(&task.description).into_iter().collect();
        if let Some(action) = &task.action {
            for word in action.split_whitespace() {
                tokens.remove(word);
            }
        }
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for file in repo.files() {
            let mut segments: Vec<&str> = file.split('/').collect();
            let Some(name) = segments.pop() else {
                continue;
            };
            let stem = name.split('.').next().unwrap_or(name).to_lowercase();

            if stem.len() >= 3 && tokens.iter().any(|t| same_word(t, &stem)) {
                hits.push(PredictionHit::new(file.clone(), 0.4));
            } else if segments
                .iter()
                .any(|s| s.len() >= 3 && tokens.iter().any(|t| same_word(t, &s.to_lowercase())))
            {
                hits.push(PredictionHit::new(file.clone(), 0.2));
            }
        }

        hits
    }
}

/// Runs every prediction method against a task and combines the hits
pub struct FilePredictor {
    snapshot: RepoSnapshot,
    methods: Vec<Box<dyn PredictionMethod>>,
}

impl FilePredictor {
    /// Predictor with the built-in methods
    pub fn new(snapshot: RepoSnapshot) -> Self {
        Self::with_methods(
            snapshot,
            vec![
                Box::new(ExplicitPathMethod),
                Box::new(KeywordDirectoryMethod::default()),
                Box::new(StructureMatchMethod),
            ],
        )
    }

    pub fn with_methods(snapshot: RepoSnapshot, methods: Vec<Box<dyn PredictionMethod>>) -> Self {
        Self { snapshot, methods }
    }

    pub fn snapshot(&self) -> &RepoSnapshot {
        &self.snapshot
    }

    /// Predict files for one task. Confidence is the mean over contributing
    /// methods of each method's mean hit confidence. Never fails.
    pub fn predict(&self, task: &Task) -> FilePrediction {
        let mut files = BTreeSet::new();
        let mut method_scores = Vec::new();
        let mut method_names = Vec::new();

        for method in &self.methods {
            let hits = method.predict(task, &self.snapshot);
            if hits.is_empty() {
                continue;
            }

            let mean = hits.iter().map(|h| h.confidence).sum::<f64>() / hits.len() as f64;
            method_scores.push(mean);
            method_names.push(method.name());
            files.extend(hits.into_iter().map(|h| h.path));
        }

        if files.is_empty() {
            log::debug!("[FilePredictor] No files predicted for {}", task.id);
            return FilePrediction::empty(task.id);
        }

        let confidence = method_scores.iter().sum::<f64>() / method_scores.len() as f64;

        FilePrediction {
            task_id: task.id,
            predicted_files: files,
            confidence: confidence.clamp(0.0, 1.0),
            method: method_names.join("+"),
        }
    }

    pub fn predict_all(&self, tasks: &[Task]) -> Vec<FilePrediction> {
        tasks.iter().map(|task| self.predict(task)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot() -> RepoSnapshot {
        RepoSnapshot::from_files([
            "README.md",
            "Cargo.toml",
            "src/main.rs",
            "src/auth/login.rs",
            "src/auth/session.rs",
            "src/billing/invoice.rs",
            "docs/guide.md",
            "tests/billing_test.rs",
        ])
    }

    fn task(description: &str) -> Task {
        let mut task = Task::new(1, description);
        task.action = description
            .split_whitespace()
            .next()
            .map(|w| w.to_lowercase());
        task
    }

    #[test]
    fn test_explicit_path_has_full_confidence() {
        let predictor = FilePredictor::with_methods(snapshot(), vec![Box::new(ExplicitPathMethod)]);
        let prediction = predictor.predict(&task("Fix crash in src/main.rs"));

        assert_eq!(prediction.method, "explicit_path");
        assert!((prediction.confidence - 1.0).abs() < f64::EPSILON);
        assert!(prediction.predicted_files.contains("src/main.rs"));
    }

    #[test]
    fn test_explicit_path_resolves_bare_names_and_new_files() {
        let method = ExplicitPathMethod;
        let hits = method.predict(&task("Update session.rs and add src/auth/token.rs"), &snapshot());
        let paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();

        assert!(paths.contains(&"src/auth/session.rs"));
        assert!(paths.contains(&"src/auth/token.rs"));
    }

    #[test]
    fn test_keyword_directory_exact_and_synonym() {
        let method = KeywordDirectoryMethod::default();

        let exact = method.predict(&task("Rework billing rules"), &snapshot());
        assert!(exact.iter().all(|h| (h.confidence - 0.7).abs() < f64::EPSILON));
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].path, "src/billing/invoice.rs");

        let synonym = method.predict(&task("Harden the login flow"), &snapshot());
        assert_eq!(synonym.len(), 2);
        assert!(synonym.iter().all(|h| (h.confidence - 0.5).abs() < f64::EPSILON));
    }

    #[test]
    fn test_structure_match_scores() {
        let method = StructureMatchMethod;
        let hits = method.predict(&task("Refactor invoice rounding"), &snapshot());
        assert_eq!(hits, vec![PredictionHit::new("src/billing/invoice.rs", 0.4)]);

        let hits = method.predict(&task("Refactor auth flows"), &snapshot());
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| (h.confidence - 0.2).abs() < f64::EPSILON));
    }

    #[test]
    fn test_combined_confidence_is_mean_of_method_means() {
        let predictor = FilePredictor::new(snapshot());
        let prediction = predictor.predict(&task("Fix invoice totals in src/billing/invoice.rs"));

        assert_eq!(prediction.method, "explicit_path+structure_match");
        assert!((prediction.confidence - 0.7).abs() < 1e-9);
        assert_eq!(prediction.predicted_files.len(), 1);
    }

    #[test]
    fn test_no_match_is_empty_prediction() {
        let predictor = FilePredictor::new(snapshot());
        let prediction = predictor.predict(&task("Think harder"));

        assert!(prediction.predicted_files.is_empty());
        assert_eq!(prediction.confidence, 0.0);
        assert_eq!(prediction.method, "none");
    }

    #[test]
    fn test_scan_skips_git_and_excluded_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("src/api")).unwrap();
        fs::create_dir_all(root.join("scratch")).unwrap();
        fs::write(root.join(".git/objects/blob"), "x").unwrap();
        fs::write(root.join("src/api/routes.rs"), "x").unwrap();
        fs::write(root.join("scratch/tmp.txt"), "x").unwrap();

        let snapshot = RepoSnapshot::scan(root, &[root.join("scratch")]);
        assert_eq!(snapshot.files(), &["src/api/routes.rs".to_string()]);
        assert_eq!(snapshot.module_dirs_named("api"), &["src/api".to_string()]);
    }
}
