pub mod error;
pub mod health;
pub mod middleware;
pub mod pets;

pub use error::*;
pub use health::*;
pub use middleware::*;
pub use pets::*;
