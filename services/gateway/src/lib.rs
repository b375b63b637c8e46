pub mod error;
pub mod fallback;
pub mod router;


pub use error::ApiError;
pub use router::{create_router, AppState};
