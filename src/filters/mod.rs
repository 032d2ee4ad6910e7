//! Request filters
//!
//! Parsing of raw request parameters into typed filters, and compilation of
//! those filters into query predicates.

pub mod compiler;
pub mod date_range;
pub mod referral;
pub mod request;
pub mod spec;

pub use compiler::{compile, CompileOptions, Fragment};
pub use date_range::DateRange;
pub use request::{ListingParams, MetricsRequest, Pagination, RequestParams, SortField};
pub use spec::{EvalChoice, FilterSpec, Selection, UserType};
