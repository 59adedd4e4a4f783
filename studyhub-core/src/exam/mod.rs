pub mod engine;
pub mod question;
pub mod scoring;
pub mod selection;
pub mod session;

pub use engine::*;
pub use question::*;
pub use scoring::*;
pub use selection::*;
pub use session::*;
