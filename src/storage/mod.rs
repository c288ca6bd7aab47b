pub mod catalog;
pub mod rebuild;

pub use catalog::{Catalog, column_list, quote_ident};
pub use rebuild::ShadowTable;
