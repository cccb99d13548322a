pub mod error;
pub mod handlers;
pub mod inventory_handlers;
pub mod router;
pub mod types;

pub use error::ApiError;
pub use router::{create_inventory_router, create_loan_router, create_router};
pub use types::*;
