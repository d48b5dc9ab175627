// Re-export all model types
pub use self::errors::*;
pub use self::identity::*;
pub use self::pet::*;
pub use self::validation::*;

mod errors;
mod identity;
mod pet;
mod validation;
