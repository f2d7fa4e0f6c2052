pub mod classes;
pub mod compliance;
pub mod core;
pub mod overview;
pub mod plans;
pub mod policy;
pub mod setup;
pub mod teachers;
