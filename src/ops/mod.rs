pub mod aggregate;
pub mod assemble;
pub mod check;
pub mod coalesce;
pub mod filter;
pub mod metrics;
pub mod numbering;
pub mod pipeline;
pub mod session;
pub mod summary;
pub mod tree;
