//! flotilla-catalog — the operator allow-list of launchable instance
//! types and the best-fit selector over it.

pub mod catalog;
pub mod error;
pub mod selector;

pub use catalog::InstanceCatalog;
pub use error::{CatalogError, CatalogResult};
pub use selector::select_type;
