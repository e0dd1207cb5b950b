//! `point-time-series` and `roi-time-series` requests.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use tracing::debug;

use super::RequestError;
use crate::api::Request;
use crate::session::Session;

/// Time series output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeSeriesFormat {
    /// Comma separated values.
    #[default]
    Csv,
    /// JSON document.
    Json,
}

impl fmt::Display for TimeSeriesFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Json => "json",
        })
    }
}

impl FromStr for TimeSeriesFormat {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(RequestError::InvalidChoice {
                field: "format",
                value: s.to_string(),
                choices: "csv, json",
            }),
        }
    }
}

/// Where the averaging window sits relative to each date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvgWindowDirection {
    /// Window centred on the date.
    #[default]
    Center,
    /// Window ending on the date.
    Backward,
}

impl fmt::Display for AvgWindowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Center => "center",
            Self::Backward => "backward",
        })
    }
}

/// Time series for points and/or ROIs.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRequest {
    /// Canonical product api names.
    pub products: Vec<String>,
    /// First day, inclusive.
    pub start_time: NaiveDate,
    /// Last day, inclusive.
    pub end_time: NaiveDate,
    /// `(lat, lon)` points.
    pub points: Vec<(f64, f64)>,
    /// ROI ids.
    pub rois: Vec<u64>,
    /// Output format.
    pub format: TimeSeriesFormat,
    /// Averaging window in days, 0 disables it.
    pub avg_window_days: u32,
    /// Averaging window placement.
    pub avg_window_direction: AvgWindowDirection,
    /// Include masked values.
    pub masked: bool,
    /// Include the climatology column.
    pub climatology: bool,
    /// Root zone exponential filter parameter (days).
    pub exp_filter_t: Option<u32>,
    /// Add the coverage column to ROI series.
    pub provide_coverage: bool,
}

impl TimeSeriesRequest {
    /// Creates a csv request without locations.
    #[must_use]
    pub fn new(products: Vec<String>, start_time: NaiveDate, end_time: NaiveDate) -> Self {
        Self {
            products,
            start_time,
            end_time,
            points: Vec::new(),
            rois: Vec::new(),
            format: TimeSeriesFormat::default(),
            avg_window_days: 0,
            avg_window_direction: AvgWindowDirection::default(),
            masked: false,
            climatology: false,
            exp_filter_t: None,
            provide_coverage: false,
        }
    }

    /// Adds a point.
    #[must_use]
    pub fn with_point(mut self, lat: f64, lon: f64) -> Self {
        self.points.push((lat, lon));
        self
    }

    /// Adds a ROI id.
    #[must_use]
    pub fn with_roi(mut self, roi_id: u64) -> Self {
        self.rois.push(roi_id);
        self
    }

    /// Expands into one request per product per location.
    ///
    /// Point series come before ROI series for each product.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for missing products, missing locations or an
    /// inverted date range.
    pub fn build(&self, session: &Session) -> Result<Vec<Request>, RequestError> {
        if self.products.is_empty() {
            return Err(RequestError::NoProducts);
        }
        if self.points.is_empty() && self.rois.is_empty() {
            return Err(RequestError::MissingLocations);
        }
        if self.end_time < self.start_time {
            return Err(RequestError::InvalidDateRange {
                start: self.start_time.to_string(),
                end: self.end_time.to_string(),
            });
        }

        let points = self
            .points
            .iter()
            .map(|(lat, lon)| ("point-time-series", format!("lat={lat}&lon={lon}")));
        let rois = self
            .rois
            .iter()
            .map(|id| ("roi-time-series", format!("roi_id={id}")));
        let locations: Vec<(&str, String)> = points.chain(rois).collect();

        let mut requests = Vec::with_capacity(self.products.len() * locations.len());
        for product in &self.products {
            for (endpoint, location) in &locations {
                let mut uri = session.url(&format!(
                    "/api/v2/products/{product}/{endpoint}?\
                     start_time={}&end_time={}&{location}&format={}\
                     &avg_window_days={}&avg_window_direction={}\
                     &include_masked_data={}&climatology={}",
                    self.start_time.format("%Y-%m-%d"),
                    self.end_time.format("%Y-%m-%d"),
                    self.format,
                    self.avg_window_days,
                    self.avg_window_direction,
                    self.masked,
                    self.climatology,
                ));
                if let Some(t) = self.exp_filter_t {
                    uri.push_str(&format!("&exp_filter_t={t}"));
                }
                if *endpoint == "roi-time-series" && self.provide_coverage {
                    uri.push_str("&provide_coverage=true");
                }
                debug!(product, uri, "generated request");
                requests.push(Request::new(uri));
            }
        }
        Ok(requests)
    }
}
