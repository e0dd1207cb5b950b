//! `gridded-data` requests over a bounding box and date range.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use super::RequestError;
use crate::api::Request;
use crate::session::Session;

/// Raster output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridFormat {
    /// GeoTIFF.
    #[default]
    Gtiff,
    /// NetCDF4.
    Netcdf4,
}

impl fmt::Display for GridFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gtiff => "gtiff",
            Self::Netcdf4 => "netcdf4",
        })
    }
}

impl FromStr for GridFormat {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gtiff" => Ok(Self::Gtiff),
            "netcdf4" => Ok(Self::Netcdf4),
            _ => Err(RequestError::InvalidChoice {
                field: "format",
                value: s.to_string(),
                choices: "gtiff, netcdf4",
            }),
        }
    }
}

/// Gridded data over a bounding box, optionally split in time.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedDataRequest {
    /// Canonical product api names.
    pub products: Vec<String>,
    /// First day, inclusive.
    pub start_date: NaiveDate,
    /// Last day, inclusive.
    pub end_date: NaiveDate,
    /// Southern bound.
    pub lat_min: f64,
    /// Northern bound.
    pub lat_max: f64,
    /// Western bound.
    pub lon_min: f64,
    /// Eastern bound.
    pub lon_max: f64,
    /// Output format.
    pub format: GridFormat,
    /// Ask for a zip archive.
    pub zipped: bool,
    /// Number of date splits per product.
    pub nrequests: usize,
    /// Minimum days per split before the range is divided.
    pub min_days_per_split: i64,
}

impl GriddedDataRequest {
    /// Creates a request with gtiff output, unzipped, no splitting.
    #[must_use]
    pub fn new(
        products: Vec<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        (lon_min, lon_max): (f64, f64),
        (lat_min, lat_max): (f64, f64),
    ) -> Self {
        Self {
            products,
            start_date,
            end_date,
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            format: GridFormat::default(),
            zipped: false,
            nrequests: 1,
            min_days_per_split: 1,
        }
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: GridFormat) -> Self {
        self.format = format;
        self
    }

    /// Requests zipped output.
    #[must_use]
    pub fn with_zipped(mut self, zipped: bool) -> Self {
        self.zipped = zipped;
        self
    }

    /// Splits the date range into `nrequests` requests where large enough.
    #[must_use]
    pub fn with_nrequests(mut self, nrequests: usize) -> Self {
        self.nrequests = nrequests.max(1);
        self
    }

    /// Sets the minimum split length in days.
    #[must_use]
    pub fn with_min_days_per_split(mut self, days: i64) -> Self {
        self.min_days_per_split = days.max(1);
        self
    }

    /// Date sub-ranges, inclusive on both ends.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidDateRange`] when the end precedes the start.
    pub fn splits(&self) -> Result<Vec<(NaiveDate, NaiveDate)>, RequestError> {
        if self.end_date < self.start_date {
            return Err(RequestError::InvalidDateRange {
                start: self.start_date.to_string(),
                end: self.end_date.to_string(),
            });
        }

        let span = (self.end_date - self.start_date).num_days();
        let n = i64::try_from(self.nrequests.max(1)).unwrap_or(i64::MAX);
        let min_days = self.min_days_per_split.max(1);

        if n == 1 || span < n.saturating_mul(min_days) {
            if n > 1 {
                info!(span_days = span, nrequests = n, "range too short to split, making 1 request");
            }
            return Ok(vec![(self.start_date, self.end_date)]);
        }

        let diff = span / n;
        let mut splits: Vec<(NaiveDate, NaiveDate)> = (0..n - 1)
            .map(|i| {
                (
                    self.start_date + Duration::days(i * diff),
                    self.start_date + Duration::days((i + 1) * diff - 1),
                )
            })
            .collect();
        splits.push((self.start_date + Duration::days((n - 1) * diff), self.end_date));
        Ok(splits)
    }

    /// Expands into one request per product per date split.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for missing products, an inverted bounding
    /// box or an inverted date range.
    pub fn build(&self, session: &Session) -> Result<Vec<Request>, RequestError> {
        if self.products.is_empty() {
            return Err(RequestError::NoProducts);
        }
        check_range("lat", self.lat_min, self.lat_max)?;
        check_range("lon", self.lon_min, self.lon_max)?;

        let splits = self.splits()?;
        let mut requests = Vec::with_capacity(self.products.len() * splits.len());
        for product in &self.products {
            for (start, end) in &splits {
                let uri = session.url(&format!(
                    "/api/v2/products/{product}/gridded-data?\
                     lat_min={}&lat_max={}&lon_min={}&lon_max={}&\
                     start_date={}&end_date={}&format={}&zipped={}",
                    self.lat_min,
                    self.lat_max,
                    self.lon_min,
                    self.lon_max,
                    start.format("%Y-%m-%d"),
                    end.format("%Y-%m-%d"),
                    self.format,
                    self.zipped,
                ));
                debug!(product, %start, %end, uri, "generated request");
                requests.push(Request::new(uri));
            }
        }
        Ok(requests)
    }
}

fn check_range(axis: &'static str, min: f64, max: f64) -> Result<(), RequestError> {
    if min > max {
        return Err(RequestError::InvalidRange {
            axis,
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}
