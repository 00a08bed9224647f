// Task analysis: parsing descriptions, inferring dependencies and predicting touched files

pub mod analyzer;
pub mod graph;
pub mod predictor;
pub mod text;

pub use analyzer::{AnalysisOutcome, TaskAnalysis, TaskAnalyzer};
pub use graph::DependencyGraph;
pub use predictor::{
    ExplicitPathMethod, FilePredictor, KeywordDirectoryMethod, PredictionHit, PredictionMethod,
    RepoSnapshot, StructureMatchMethod,
};
