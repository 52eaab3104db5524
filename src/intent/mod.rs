//! Touch-to-key intent classification

mod classifier;
mod params;
mod worker;

pub use classifier::{ClassifierStats, IntentClassifier};
pub use params::{ClassifierParams, Disqualifier, MotionThresholds, NoDisqualifier};
pub use worker::{ClassifierWorker, WorkerSnapshot};
