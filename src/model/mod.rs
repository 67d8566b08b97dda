//! Random forest classifier, data partitioning, grid search and metrics.

pub mod forest;
pub mod grid;
pub mod metrics;
pub mod split;
pub mod tree;

pub use forest::{ClassWeight, ForestParams, RandomForest};
pub use grid::{GridSearchResult, ParamGrid, grid_search};
pub use metrics::{ClassificationReport, ConfusionMatrix};
