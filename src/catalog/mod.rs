//! Product and region-of-interest lookup tables.
//!
//! Both collections are fetched once per session and used to validate the
//! names a user passes on the command line before any job is submitted.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::api::{ApiClient, ApiError};

/// Validation failures against the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// One or more product names are not offered by the backend.
    #[error("unknown products: {}; choose from {}", .unknown.join(", "), .available.join(", "))]
    UnknownProducts {
        /// Names that did not match.
        unknown: Vec<String>,
        /// Valid api names.
        available: Vec<String>,
    },

    /// One or more ROI references do not exist in the account.
    #[error("unknown rois: {}", .unknown.join(", "))]
    UnknownRois {
        /// References that did not match.
        unknown: Vec<String>,
    },
}

/// A single data product.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    /// Name used in request URIs.
    pub api_name: String,
    /// Human readable name.
    #[serde(default)]
    pub name: Option<String>,
    /// Short label.
    #[serde(default)]
    pub abbreviation: Option<String>,
    /// Physical unit.
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Lower bound of valid values.
    #[serde(default)]
    pub min_val: Option<f64>,
    /// Upper bound of valid values.
    #[serde(default)]
    pub max_val: Option<f64>,
    /// Whether area requests are allowed.
    #[serde(default)]
    pub area_allowed: Option<bool>,
}

fn default_unit() -> String {
    "-".to_string()
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref() {
            Some(name) if name != self.api_name => {
                write!(f, "{}, ({}) [{}]", self.api_name, name, self.unit)
            }
            _ => write!(f, "{} [{}]", self.api_name, self.unit),
        }
    }
}

/// Products sorted by api name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Products(Vec<Product>);

impl Products {
    /// Builds the collection, sorting by api name.
    #[must_use]
    pub fn new(mut products: Vec<Product>) -> Self {
        products.sort_by(|a, b| a.api_name.cmp(&b.api_name));
        Self(products)
    }

    /// Finds a product by api name or display name, case-insensitive.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Product> {
        self.0.iter().find(|product| {
            product.api_name.eq_ignore_ascii_case(name)
                || product
                    .name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
    }

    /// Iterates products in api name order.
    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.0.iter()
    }

    /// Number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no products are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Maps `names` to canonical api names.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownProducts`] listing every unknown name.
    pub fn validate(&self, names: &[String]) -> Result<Vec<String>, CatalogError> {
        let mut canonical = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match self.get(name) {
                Some(product) => canonical.push(product.api_name.clone()),
                None => unknown.push(name.clone()),
            }
        }
        if unknown.is_empty() {
            Ok(canonical)
        } else {
            Err(CatalogError::UnknownProducts {
                unknown,
                available: self.0.iter().map(|p| p.api_name.clone()).collect(),
            })
        }
    }
}

/// A region of interest stored in the user's account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Roi {
    /// Numeric id.
    pub id: u64,
    /// Name, unique per account.
    pub name: String,
    /// Free text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Area in square metres.
    #[serde(default)]
    pub area: f64,
    /// Creation timestamp as sent by the backend.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Shown in the web viewer.
    #[serde(default)]
    pub display: Option<bool>,
}

impl Roi {
    /// Parsed creation timestamp.
    #[must_use]
    pub fn created(&self) -> Option<NaiveDateTime> {
        let raw = self.created_at.as_deref()?;
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }
}

/// ROIs sorted by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rois(Vec<Roi>);

impl Rois {
    /// Builds the collection, sorting by id.
    #[must_use]
    pub fn new(mut rois: Vec<Roi>) -> Self {
        rois.sort_by_key(|roi| roi.id);
        Self(rois)
    }

    /// Finds a ROI by name (case-insensitive) or by numeric id.
    #[must_use]
    pub fn get(&self, reference: &str) -> Option<&Roi> {
        let reference = reference.trim();
        self.0
            .iter()
            .find(|roi| roi.name.eq_ignore_ascii_case(reference))
            .or_else(|| {
                let id: u64 = reference.parse().ok()?;
                self.by_id(id)
            })
    }

    /// Finds a ROI by id.
    #[must_use]
    pub fn by_id(&self, id: u64) -> Option<&Roi> {
        self.0.iter().find(|roi| roi.id == id)
    }

    /// Iterates ROIs in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Roi> {
        self.0.iter()
    }

    /// Number of ROIs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the account has no ROIs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Maps names or ids to ROI ids.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownRois`] listing every unknown reference.
    pub fn validate(&self, references: &[String]) -> Result<Vec<u64>, CatalogError> {
        let mut ids = Vec::with_capacity(references.len());
        let mut unknown = Vec::new();
        for reference in references {
            match self.get(reference) {
                Some(roi) => ids.push(roi.id),
                None => unknown.push(reference.clone()),
            }
        }
        if unknown.is_empty() {
            Ok(ids)
        } else {
            Err(CatalogError::UnknownRois { unknown })
        }
    }
}

#[derive(Deserialize)]
struct ProductsResponse {
    products: Vec<Product>,
}

#[derive(Deserialize)]
struct RoisResponse {
    rois: Vec<Roi>,
}

/// Products and ROIs available to the session's user.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Available products.
    pub products: Products,
    /// ROIs in the account.
    pub rois: Rois,
}

impl Catalog {
    /// Loads products and ROIs from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if either listing cannot be fetched or decoded.
    #[instrument(skip(api))]
    pub async fn fetch(api: &ApiClient) -> Result<Self, ApiError> {
        let session = api.session();
        let products: ProductsResponse = api.get_json(&session.url("/api/v2/products/")).await?;
        let rois: RoisResponse = api.get_json(&session.url("/api/v2/rois")).await?;
        debug!(
            products = products.products.len(),
            rois = rois.rois.len(),
            "catalog loaded"
        );
        Ok(Self {
            products: Products::new(products.products),
            rois: Rois::new(rois.rois),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn products() -> Products {
        let raw = r#"[
            {"api_name": "TEMP-AMSR2-DESC_V001_100", "name": "Land surface temperature", "unit": "K"},
            {"api_name": "SM-SMAP-L-DESC_V4.0_100", "name": "SM-SMAP-L-DESC_V4.0_100", "unit": "m3/m3"}
        ]"#;
        Products::new(serde_json::from_str(raw).unwrap())
    }

    fn rois() -> Rois {
        let raw = r#"[
            {"id": 42, "name": "Field A", "area": 1.5, "created_at": "2020-01-02T03:04:05.123456"},
            {"id": 7, "name": "Field B", "area": 2.0}
        ]"#;
        Rois::new(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn test_products_sorted_by_api_name() {
        let products = products();
        let names: Vec<&str> = products.iter().map(|p| p.api_name.as_str()).collect();
        assert_eq!(names, vec!["SM-SMAP-L-DESC_V4.0_100", "TEMP-AMSR2-DESC_V001_100"]);
    }

    #[test]
    fn test_product_lookup_by_display_name_is_case_insensitive() {
        let products = products();
        let product = products.get("land SURFACE temperature").unwrap();
        assert_eq!(product.api_name, "TEMP-AMSR2-DESC_V001_100");
    }

    #[test]
    fn test_validate_products_returns_canonical_names() {
        let names = vec!["sm-smap-l-desc_v4.0_100".to_string()];
        assert_eq!(
            products().validate(&names).unwrap(),
            vec!["SM-SMAP-L-DESC_V4.0_100".to_string()]
        );
    }

    #[test]
    fn test_validate_products_lists_all_unknown() {
        let names = vec!["nope".to_string(), "TEMP-AMSR2-DESC_V001_100".to_string(), "also-nope".to_string()];
        let err = products().validate(&names).unwrap_err();
        match err {
            CatalogError::UnknownProducts { unknown, available } => {
                assert_eq!(unknown, vec!["nope".to_string(), "also-nope".to_string()]);
                assert_eq!(available.len(), 2);
            }
            CatalogError::UnknownRois { .. } => panic!("wrong error"),
        }
    }

    #[test]
    fn test_product_display() {
        let products = products();
        assert_eq!(
            products.get("TEMP-AMSR2-DESC_V001_100").unwrap().to_string(),
            "TEMP-AMSR2-DESC_V001_100, (Land surface temperature) [K]"
        );
        assert_eq!(
            products.get("SM-SMAP-L-DESC_V4.0_100").unwrap().to_string(),
            "SM-SMAP-L-DESC_V4.0_100 [m3/m3]"
        );
    }

    #[test]
    fn test_roi_lookup_by_name_or_id() {
        let rois = rois();
        assert_eq!(rois.get("field a").unwrap().id, 42);
        assert_eq!(rois.get("7").unwrap().name, "Field B");
        assert!(rois.get("99").is_none());
    }

    #[test]
    fn test_roi_validate() {
        let rois = rois();
        let ids = rois.validate(&["Field B".to_string(), "42".to_string()]).unwrap();
        assert_eq!(ids, vec![7, 42]);
        assert!(matches!(
            rois.validate(&["missing".to_string()]),
            Err(CatalogError::UnknownRois { .. })
        ));
    }

    #[test]
    fn test_roi_created_timestamp() {
        let rois = rois();
        let created = rois.by_id(42).unwrap().created().unwrap();
        assert_eq!(created.format("%Y-%m-%d").to_string(), "2020-01-02");
        assert!(rois.by_id(7).unwrap().created().is_none());
    }
}
