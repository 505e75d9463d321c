//! Pipeline module - feature building, fitting, tuning and bootstrap inference

pub mod bootstrap;
pub mod dataset;
pub mod design;
pub mod encoding;
pub mod error;
pub mod lasso;
pub mod loader;
pub mod logistic;
pub mod metrics;
pub mod model;
pub mod network;
pub mod penalty;
pub mod split;
pub mod stats;
pub mod tuning;
pub mod vif;

pub use bootstrap::{
    bootstrap_auc, bootstrap_coefficients, classification_summary, BootstrapConfig,
    ClassificationSummary, CoefficientRow, CoefficientTable, OptimismCorrectedAuc,
};
pub use dataset::{CategoricalField, Dataset, DatasetSchema};
pub use design::DesignMatrix;
pub use encoding::{build, build_full, CategoricalEncoding, FeatureEncoding, TrainTest};
pub use error::{PipelineError, Result};
pub use lasso::{
    cross_validate, evaluate, fit_at, fit_lasso, fit_path, penalty_grid, rank_predictions,
    CrossValidation, LassoConfig, LassoFit, LinearModel, PathPoint, SelectionRule,
};
pub use loader::{load_dataset, load_frame};
pub use logistic::{fit_logistic, ClassifierSpec, LogisticModel};
pub use metrics::{Evaluation, Prediction};
pub use model::{load_model, save_model, FittedModel};
pub use network::{NetworkConfig, NetworkModel, TrainingSettings};
pub use penalty::{Penalty, PenaltyGrid};
pub use split::{SplitIndices, TemporalSplit, TimeWindow};
pub use tuning::{
    fit_final, tune, tune_observed, tune_until, BestConfig, HyperparameterGrid, Run, RunStatus,
    TuningConfig, TuningOutcome,
};
pub use vif::{variance_inflation_factors, VifEntry, VIF_THRESHOLD};
