pub mod error;
pub mod key;
pub mod types;

pub use error::{EntityError, Result};
pub use key::EntityKey;
pub use types::ConfigBlob;
