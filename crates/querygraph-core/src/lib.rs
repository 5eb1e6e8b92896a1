pub mod config_manager;
pub mod error;
pub mod traits;
pub mod types;
pub mod validation;

pub use config_manager::*;
pub use error::*;
pub use traits::*;
pub use types::*;
pub use validation::*;
