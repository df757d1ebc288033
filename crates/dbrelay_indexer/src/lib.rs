pub mod worker;

pub use worker::{IndexingWorker, Stats};
