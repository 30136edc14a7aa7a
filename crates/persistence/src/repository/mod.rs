//! Repository implementations for database operations

pub mod audit;
pub mod badges;
pub mod notifications;
pub mod predictions;
pub mod users;

pub use audit::*;
pub use badges::*;
pub use notifications::*;
pub use predictions::*;
pub use users::*;
