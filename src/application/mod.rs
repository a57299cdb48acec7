// Application layer - Scheduling, merging and chart shaping
pub mod aggregator;
pub mod chart_transformer;
pub mod scheduler;
pub mod source_adapter;
