//! Request URI templates for the asynchronous data endpoints.
//!
//! Each template is a validated configuration that expands into one
//! [`Request`](crate::Request) per product and location or date split.

mod gridded;
mod time_series;

use thiserror::Error;

pub use gridded::{GridFormat, GriddedDataRequest};
pub use time_series::{AvgWindowDirection, TimeSeriesFormat, TimeSeriesRequest};

/// Invalid request configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// End date before start date.
    #[error("end date {end} is before start date {start}")]
    InvalidDateRange {
        /// Requested start.
        start: String,
        /// Requested end.
        end: String,
    },

    /// No products configured.
    #[error("at least one product is required")]
    NoProducts,

    /// Neither points nor ROIs configured for a time series.
    #[error("set either lat/lon points or rois")]
    MissingLocations,

    /// Bounding box with min above max.
    #[error("invalid {axis} range: {min} > {max}")]
    InvalidRange {
        /// `lat` or `lon`.
        axis: &'static str,
        /// Lower bound as given.
        min: String,
        /// Upper bound as given.
        max: String,
    },

    /// Unparsable choice value.
    #[error("invalid {field} '{value}', choose from {{{choices}}}")]
    InvalidChoice {
        /// Option name.
        field: &'static str,
        /// Value given.
        value: String,
        /// Accepted values.
        choices: &'static str,
    },
}
