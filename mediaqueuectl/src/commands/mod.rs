pub mod run;

pub use run::{OnMissing, RunArgs};
