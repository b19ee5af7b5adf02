//! Process variables: typed values, their definitions, and the store that
//! publishes them.

pub mod definition;
pub mod store;
pub mod value;

pub use definition::PvDefinition;
pub use store::{PvStore, PvUpdate, Waiters};
pub use value::{PvType, PvValue, MAX_STRING_LEN};
