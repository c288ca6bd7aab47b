pub mod pipeline;

pub use pipeline::{MergePipeline, ShardSet};
