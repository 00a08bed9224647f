// File overlap detection and safe-group partitioning for parallel task execution

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{FilePrediction, OverlapResult, SafeGroup, Severity, TaskId, TaskOverlapPair};

/// Source code: concurrent edits almost always conflict
const CRITICAL_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "kt", "kts", "c", "h", "cc",
    "cpp", "hpp", "cs", "rb", "php", "swift", "scala", "vue", "svelte", "sh", "bash", "zsh", "ps1",
    "lua", "dart", "ex", "exs", "erl", "hs", "ml", "clj", "r", "m", "mm", "css", "scss", "sass",
    "less", "html", "graphql", "proto",
];

/// Configuration and data files
const WARNING_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "xml", "csv", "tsv", "lock", "sql",
    "properties", "plist", "gradle",
];

/// Extension-less file names treated as configuration
const WARNING_FILE_NAMES: &[&str] = &["Dockerfile", "Makefile", "Procfile", "Justfile", ".env"];

/// Severity of two tasks sharing `path`; a pure function of the path
pub fn classify_severity(path: &str) -> Severity {
    let name = path.rsplit('/').next().unwrap_or(path);

    if WARNING_FILE_NAMES.contains(&name) {
        return Severity::Warning;
    }

    let extension = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => return Severity::Info,
    };

    if CRITICAL_EXTENSIONS.contains(&extension.as_str()) {
        Severity::Critical
    } else if WARNING_EXTENSIONS.contains(&extension.as_str()) {
        Severity::Warning
    } else {
        Severity::Info
    }
}

/// Answer to "may these two tasks run at the same time?"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParallelCheck {
    pub can_parallelize: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlapping_files: Option<BTreeSet<String>>,
}

/// Partitions tasks into groups with no critical pair inside a group
pub trait GroupingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `critical` holds normalized `(smaller, larger)` pairs.
    /// Must return a partition of `tasks`.
    fn partition(
        &self,
        tasks: &[TaskId],
        critical: &BTreeSet<(TaskId, TaskId)>,
    ) -> Vec<Vec<TaskId>>;
}

/// Greedy first-fit colouring in input order. Deterministic, not optimal.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyFirstFit;

impl GroupingStrategy for GreedyFirstFit {
    fn name(&self) -> &'static str {
        "greedy_first_fit"
    }

    fn partition(
        &self,
        tasks: &[TaskId],
        critical: &BTreeSet<(TaskId, TaskId)>,
    ) -> Vec<Vec<TaskId>> {
        let conflicts = |a: TaskId, b: TaskId| critical.contains(&(a.min(b), a.max(b)));
        let mut assigned = vec![false; tasks.len()];
        let mut groups = Vec::new();

        for (i, &task) in tasks.iter().enumerate() {
            if assigned[i] {
                continue;
            }
            assigned[i] = true;
            let mut group = vec![task];

            for (j, &candidate) in tasks.iter().enumerate().skip(i + 1) {
                if assigned[j] {
                    continue;
                }
                if group.iter().all(|&member| !conflicts(member, candidate)) {
                    assigned[j] = true;
                    group.push(candidate);
                }
            }

            groups.push(group);
        }

        groups
    }
}

/// Builds the conflict graph from file predictions
pub struct OverlapDetector {
    strategy: Box<dyn GroupingStrategy>,
}

impl Default for OverlapDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlapDetector {
    pub fn new() -> Self {
        Self::with_strategy(Box::new(GreedyFirstFit))
    }

    pub fn with_strategy(strategy: Box<dyn GroupingStrategy>) -> Self {
        Self { strategy }
    }

    /// Compute overlapping pairs and the safe-group partition for `predictions`
    pub fn detect(&self, predictions: &[FilePrediction]) -> OverlapResult {
        // Inverted index: file -> claimants in input order
        let mut claimants: BTreeMap<&str, Vec<TaskId>> = BTreeMap::new();
        for prediction in predictions {
            for file in &prediction.predicted_files {
                let entry = claimants.entry(file.as_str()).or_default();
                if !entry.contains(&prediction.task_id) {
                    entry.push(prediction.task_id);
                }
            }
        }

        let mut shared: BTreeMap<(TaskId, TaskId), BTreeSet<String>> = BTreeMap::new();
        let mut overlapping_files = BTreeSet::new();

        for (file, tasks) in &claimants {
            if tasks.len() < 2 {
                continue;
            }
            overlapping_files.insert(file.to_string());

            for (i, &a) in tasks.iter().enumerate() {
                for &b in &tasks[i + 1..] {
                    shared
                        .entry((a.min(b), a.max(b)))
                        .or_default()
                        .insert(file.to_string());
                }
            }
        }

        let task_pairs: Vec<TaskOverlapPair> = shared
            .into_iter()
            .map(|((task1, task2), files)| {
                let severity = files
                    .iter()
                    .map(|f| classify_severity(f))
                    .max()
                    .unwrap_or(Severity::Info);
                TaskOverlapPair {
                    task1,
                    task2,
                    overlapping_files: files,
                    severity,
                }
            })
            .collect();

        let critical: BTreeSet<(TaskId, TaskId)> = task_pairs
            .iter()
            .filter(|p| p.severity == Severity::Critical)
            .map(|p| (p.task1, p.task2))
            .collect();

        let order: Vec<TaskId> = predictions.iter().map(|p| p.task_id).collect();
        let files_of: BTreeMap<TaskId, &BTreeSet<String>> = predictions
            .iter()
            .map(|p| (p.task_id, &p.predicted_files))
            .collect();

        let safe_groups: Vec<SafeGroup> = self
            .strategy
            .partition(&order, &critical)
            .into_iter()
            .enumerate()
            .map(|(index, task_ids)| {
                let files = task_ids
                    .iter()
                    .filter_map(|id| files_of.get(id))
                    .flat_map(|files| files.iter().cloned())
                    .collect();
                SafeGroup {
                    id: index + 1,
                    can_run_in_parallel: task_ids.len() > 1,
                    task_ids,
                    files,
                }
            })
            .collect();

        log::debug!(
            "[OverlapDetector] {} tasks, {} overlapping files, {} pairs ({} critical), {} groups via {}",
            predictions.len(),
            overlapping_files.len(),
            task_pairs.len(),
            critical.len(),
            safe_groups.len(),
            self.strategy.name()
        );

        OverlapResult {
            has_overlap: !overlapping_files.is_empty(),
            overlapping_files,
            task_pairs,
            safe_groups,
        }
    }

    /// Pairwise check: only a shared critical file forbids concurrency
    pub fn can_run_in_parallel(&self, p1: &FilePrediction, p2: &FilePrediction) -> ParallelCheck {
        let overlapping: BTreeSet<String> = p1
            .predicted_files
            .intersection(&p2.predicted_files)
            .cloned()
            .collect();

        if overlapping.is_empty() {
            return ParallelCheck {
                can_parallelize: true,
                reason: None,
                overlapping_files: None,
            };
        }

        let critical: Vec<&String> = overlapping
            .iter()
            .filter(|f| classify_severity(f) == Severity::Critical)
            .collect();

        if critical.is_empty() {
            ParallelCheck {
                can_parallelize: true,
                reason: Some(format!(
                    "{} and {} share {} non-critical file(s)",
                    p1.task_id,
                    p2.task_id,
                    overlapping.len()
                )),
                overlapping_files: Some(overlapping),
            }
        } else {
            ParallelCheck {
                can_parallelize: false,
                reason: Some(format!(
                    "{} and {} both modify source file(s): {}",
                    p1.task_id,
                    p2.task_id,
                    critical
                        .iter()
                        .map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
                overlapping_files: Some(overlapping),
            }
        }
    }

    pub fn is_conflict_free(&self, predictions: &[FilePrediction]) -> bool {
        self.detect(predictions)
            .task_pairs
            .iter()
            .all(|p| p.severity != Severity::Critical)
    }

    /// Size of the largest safe group, at least 1
    pub fn get_max_parallelization(&self, predictions: &[FilePrediction]) -> usize {
        self.detect(predictions)
            .safe_groups
            .iter()
            .map(|g| g.task_ids.len())
            .max()
            .unwrap_or(1)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn prediction(id: usize, files: &[&str]) -> FilePrediction {
        FilePrediction::with_files(TaskId(id), files.iter().copied())
    }

    fn assert_partition(result: &OverlapResult, predictions: &[FilePrediction]) {
        let mut seen = HashSet::new();
        for group in &result.safe_groups {
            for id in &group.task_ids {
                assert!(seen.insert(*id), "{} appears twice", id);
            }
        }
        let expected: HashSet<TaskId> = predictions.iter().map(|p| p.task_id).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_classify_severity() {
        assert_eq!(classify_severity("src/app.ts"), Severity::Critical);
        assert_eq!(classify_severity("lib/Main.RS"), Severity::Critical);
        assert_eq!(classify_severity("package.json"), Severity::Warning);
        assert_eq!(classify_severity("deploy/Dockerfile"), Severity::Warning);
        assert_eq!(classify_severity("README.md"), Severity::Info);
        assert_eq!(classify_severity(".gitignore"), Severity::Info);
        assert_eq!(classify_severity("LICENSE"), Severity::Info);
    }

    #[test]
    fn test_no_overlap_single_group() {
        let detector = OverlapDetector::new();
        let predictions = vec![
            prediction(1, &["a.ts"]),
            prediction(2, &["b.ts"]),
            prediction(3, &["c.ts"]),
        ];

        let result = detector.detect(&predictions);
        assert!(!result.has_overlap);
        assert!(result.task_pairs.is_empty());
        assert_eq!(result.safe_groups.len(), 1);
        assert_eq!(result.safe_groups[0].task_ids, vec![TaskId(1), TaskId(2), TaskId(3)]);
        assert!(result.safe_groups[0].can_run_in_parallel);
        assert!(detector.is_conflict_free(&predictions));
        assert_eq!(detector.get_max_parallelization(&predictions), 3);
        assert_partition(&result, &predictions);
    }

    #[test]
    fn test_critical_overlap_splits_groups() {
        let detector = OverlapDetector::new();
        let predictions = vec![prediction(1, &["shared.ts"]), prediction(2, &["shared.ts"])];

        let result = detector.detect(&predictions);
        assert!(result.has_overlap);
        assert_eq!(result.task_pairs.len(), 1);
        assert_eq!(result.task_pairs[0].severity, Severity::Critical);
        assert_eq!(result.safe_groups.len(), 2);
        assert!(result.safe_groups.iter().all(|g| g.task_ids.len() == 1));
        assert!(result.safe_groups.iter().all(|g| !g.can_run_in_parallel));
        assert!(!detector.is_conflict_free(&predictions));
        assert_eq!(detector.get_max_parallelization(&predictions), 1);
    }

    #[test]
    fn test_non_critical_overlap_stays_together() {
        let detector = OverlapDetector::new();
        let predictions = vec![
            prediction(1, &["a.ts", "package.json"]),
            prediction(2, &["b.ts", "package.json", "README.md"]),
            prediction(3, &["README.md"]),
        ];

        let result = detector.detect(&predictions);
        assert!(result.has_overlap);
        assert_eq!(result.overlapping_files.len(), 2);
        assert_eq!(result.task_pairs.len(), 2);
        assert_eq!(result.task_pairs[0].severity, Severity::Warning);
        assert_eq!(result.task_pairs[1].severity, Severity::Info);
        assert_eq!(result.safe_groups.len(), 1);
        assert!(detector.is_conflict_free(&predictions));
    }

    #[test]
    fn test_pair_symmetry_and_max_severity() {
        let detector = OverlapDetector::new();
        let predictions = vec![
            prediction(3, &["x.rs", "config.toml"]),
            prediction(1, &["config.toml", "x.rs"]),
        ];

        let result = detector.detect(&predictions);
        assert_eq!(result.task_pairs.len(), 1);
        let pair = &result.task_pairs[0];
        assert_eq!((pair.task1, pair.task2), (TaskId(1), TaskId(3)));
        assert_eq!(pair.overlapping_files.len(), 2);
        assert_eq!(pair.severity, Severity::Critical);
    }

    #[test]
    fn test_greedy_partition_is_first_fit() {
        let detector = OverlapDetector::new();
        // 1-2 and 2-3 conflict; 1 and 3 do not
        let predictions = vec![
            prediction(1, &["a.rs"]),
            prediction(2, &["a.rs", "b.rs"]),
            prediction(3, &["b.rs"]),
            prediction(4, &[]),
        ];

        let result = detector.detect(&predictions);
        let groups: Vec<Vec<TaskId>> = result.safe_groups.iter().map(|g| g.task_ids.clone()).collect();
        assert_eq!(
            groups,
            vec![vec![TaskId(1), TaskId(3), TaskId(4)], vec![TaskId(2)]]
        );
        assert_eq!(result.safe_groups[1].id, 2);
        assert_partition(&result, &predictions);
        assert_eq!(detector.get_max_parallelization(&predictions), 3);
    }

    #[test]
    fn test_can_run_in_parallel() {
        let detector = OverlapDetector::new();

        let check = detector.can_run_in_parallel(&prediction(1, &["a.rs"]), &prediction(2, &["b.rs"]));
        assert!(check.can_parallelize);
        assert!(check.reason.is_none());

        let check = detector.can_run_in_parallel(
            &prediction(1, &["a.rs", "Cargo.toml"]),
            &prediction(2, &["Cargo.toml"]),
        );
        assert!(check.can_parallelize);
        assert!(check.reason.is_some());
        assert_eq!(check.overlapping_files.unwrap().len(), 1);

        let check = detector.can_run_in_parallel(&prediction(1, &["a.rs"]), &prediction(2, &["a.rs"]));
        assert!(!check.can_parallelize);
        assert!(check.reason.unwrap().contains("a.rs"));
    }

    #[test]
    fn test_empty_predictions() {
        let detector = OverlapDetector::new();
        let result = detector.detect(&[]);
        assert!(result.safe_groups.is_empty());
        assert!(detector.is_conflict_free(&[]));
        assert_eq!(detector.get_max_parallelization(&[]), 1);
    }

    /// Small deterministic generator for building many prediction sets
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: usize) -> usize {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 33) as usize) % bound
        }
    }

    #[test]
    fn test_generated_prediction_sets_keep_invariants() {
        const POOL: &[&str] = &[
            "src/a.rs", "src/b.ts", "lib/c.py", "Cargo.toml", "config.json", "Dockerfile",
            "README.md", "docs/guide.txt",
        ];
        let detector = OverlapDetector::new();

        for seed in 0..300u64 {
            let mut rng = Lcg(seed);
            let count = 1 + rng.next(8);

            let mut ids: Vec<usize> = (1..=count).collect();
            for i in (1..ids.len()).rev() {
                ids.swap(i, rng.next(i + 1));
            }
            let predictions: Vec<FilePrediction> = ids
                .iter()
                .map(|&id| {
                    let files: Vec<&str> = (0..rng.next(4)).map(|_| POOL[rng.next(POOL.len())]).collect();
                    prediction(id, &files)
                })
                .collect();

            let result = detector.detect(&predictions);
            assert_partition(&result, &predictions);

            let mut expected = BTreeMap::new();
            for (i, a) in predictions.iter().enumerate() {
                for b in &predictions[i + 1..] {
                    let shared: BTreeSet<String> =
                        a.predicted_files.intersection(&b.predicted_files).cloned().collect();
                    if !shared.is_empty() {
                        let key = (a.task_id.min(b.task_id), a.task_id.max(b.task_id));
                        expected.insert(key, shared);
                    }
                }
            }

            assert_eq!(result.task_pairs.len(), expected.len(), "seed {}", seed);
            for pair in &result.task_pairs {
                assert!(pair.task1 < pair.task2, "seed {}", seed);
                assert_eq!(
                    expected.get(&(pair.task1, pair.task2)),
                    Some(&pair.overlapping_files),
                    "seed {}",
                    seed
                );
                let worst = pair.overlapping_files.iter().map(|f| classify_severity(f)).max();
                assert_eq!(Some(pair.severity), worst, "seed {}", seed);
            }
            assert_eq!(result.has_overlap, !expected.is_empty(), "seed {}", seed);

            let by_id: BTreeMap<TaskId, &FilePrediction> =
                predictions.iter().map(|p| (p.task_id, p)).collect();
            for group in &result.safe_groups {
                for (i, a) in group.task_ids.iter().enumerate() {
                    for b in &group.task_ids[i + 1..] {
                        assert!(
                            detector.can_run_in_parallel(by_id[a], by_id[b]).can_parallelize,
                            "seed {}: {} and {} grouped despite a critical file",
                            seed,
                            a,
                            b
                        );
                    }
                }
            }

            let any_critical = result.task_pairs.iter().any(|p| p.severity == Severity::Critical);
            assert_eq!(detector.is_conflict_free(&predictions), !any_critical, "seed {}", seed);

            let largest = result.safe_groups.iter().map(|g| g.task_ids.len()).max().unwrap_or(1);
            assert_eq!(detector.get_max_parallelization(&predictions), largest, "seed {}", seed);
        }
    }
}
