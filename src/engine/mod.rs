//! Business logic behind the HTTP surface: sessions, orders and franchises.
//!
//! Each engine is constructed once at startup with the pool (and, for
//! orders, the factory client) it works against, then shared through
//! [`crate::AppState`].

mod error;
pub mod franchises;
pub mod orders;
pub mod session;
pub mod token;

pub use error::{EngineError, EngineResult};
pub use franchises::{
    CreateFranchiseRequest, CreateStoreRequest, FranchiseList, FranchiseManager, FranchiseQuery,
};
pub use orders::{OrderHistory, OrderPlacement, OrderWorkflow, PlaceOrderRequest};
pub use session::{
    authorize, has_role, AuthResponse, AuthState, Identity, SessionManager,
};
pub use token::{token_signature, TokenKeys};
