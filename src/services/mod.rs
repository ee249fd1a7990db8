pub mod collaborators;
pub mod dataset;
pub mod features;
pub mod forest;
pub mod inference;
pub mod metrics;
pub mod model;
pub mod predictor;
pub mod trainer;

pub use predictor::PredictionService;
