//! Row types and store operations, one module per aggregate.

pub mod franchise;
pub mod menu;
pub mod order;
pub mod session;
pub mod user;

pub use franchise::*;
pub use menu::*;
pub use order::*;
pub use session::*;
pub use user::*;
