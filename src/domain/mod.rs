// Domain layer - Sources, fragments and the merged view model
pub mod chart;
pub mod fragment;
pub mod payload;
pub mod source;
pub mod timeframe;
pub mod units;
pub mod view_model;
