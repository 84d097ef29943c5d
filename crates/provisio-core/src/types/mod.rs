//! Type definitions for Provisio

mod feature_types;
mod repository_types;
mod state_types;

pub use feature_types::*;
pub use repository_types::*;
pub use state_types::*;
