pub mod align;
pub mod config;
pub mod error;
pub mod label;
pub mod loaders;
pub mod model;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod risk;
pub mod risk_model;
pub mod stats;
pub mod training;
