pub mod wbs;
pub mod cell;
pub mod period;
pub mod row;
pub mod status;
pub mod filter;
pub mod edit;
pub mod insight;
pub mod config;
pub mod baseline;
pub mod project;

pub use wbs::*;
pub use cell::*;
pub use period::*;
pub use row::*;
pub use status::*;
pub use filter::*;
pub use edit::*;
pub use config::*;
pub use baseline::*;
pub use project::*;
