pub mod engine;
pub mod errors;
pub mod factory;
pub mod trends;

pub use engine::{SearchEngine, SearchOutcome, TextQuery};
pub use errors::AppError;
pub use factory::AppFactory;
