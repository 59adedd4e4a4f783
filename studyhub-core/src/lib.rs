pub mod config;
pub mod errors;
pub mod events;
pub mod exam;
pub mod filters;
pub mod models;
pub mod repo;
pub mod retry;
pub mod review;
pub mod scheduler;
pub mod selector;

pub use config::*;
pub use errors::*;
pub use events::*;
pub use exam::*;
pub use filters::*;
pub use models::*;
pub use repo::*;
pub use review::*;
pub use scheduler::*;
pub use selector::*;
