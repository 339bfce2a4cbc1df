pub mod dataset;
pub mod error;
pub mod features;
pub mod logistic;
pub mod model;
pub mod report;

pub use error::ModelError;
pub use model::DelayModel;
