pub mod error;
pub mod types;

pub use error::{MergeError, Result};
pub use types::{ColumnDef, ShardClassification, TableSignature};
