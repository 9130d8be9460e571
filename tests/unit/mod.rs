pub mod common;

// Graph propagation and program lifecycle
pub mod pipeline_test;

// Temporal relational join
pub mod join_test;

// Group-by reduction over marks, epochs, and windows
pub mod reduce_test;
