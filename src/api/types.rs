//! Wire and domain types for the asynchronous job API.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// A templated request URI that starts a backend processing job when fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request(String);

impl Request {
    /// Wraps a request URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Request {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Request {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque identifier the backend assigns to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wraps a handle string.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Returns the handle string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body returned by the submission endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(alias = "handle")]
    pub(crate) uuid: JobHandle,
}

/// Backend readiness of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Still processing (or any state other than ready).
    NotReady,
    /// Results are available.
    Ready,
}

/// Snapshot of a job's processing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    /// Completion percentage, clamped to 0..=100.
    pub percentage: u8,
    /// Backend readiness.
    pub readiness: Readiness,
    /// Resource locations, absent until the backend publishes them.
    pub resources: Option<Vec<String>>,
}

impl JobStatus {
    /// True once the job is at 100%, reported ready and has resources attached.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.percentage >= 100 && self.readiness == Readiness::Ready && self.resources.is_some()
    }
}

/// Body returned by the status endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    percentage: f64,
    processing_status: String,
    #[serde(default)]
    data: Option<Vec<String>>,
}

impl From<StatusResponse> for JobStatus {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from(raw: StatusResponse) -> Self {
        let readiness = if raw.processing_status.eq_ignore_ascii_case("ready") {
            Readiness::Ready
        } else {
            Readiness::NotReady
        };
        Self {
            percentage: raw.percentage.clamp(0.0, 100.0) as u8,
            readiness,
            resources: raw.data,
        }
    }
}

/// Body of the service status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendStatus {
    /// Version string of the deployed backend.
    #[serde(deserialize_with = "plain_string")]
    pub backend_version: String,
}

/// Account details of the authenticated (or impersonated) user.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserInfo {
    /// Numeric account id.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Login e-mail address.
    #[serde(default)]
    pub email: Option<String>,
    /// Assigned roles, as sent by the backend.
    #[serde(default)]
    pub roles: Vec<Value>,
    /// Number of logins.
    #[serde(default)]
    pub login_count: Option<u64>,
    /// Timestamp of the last login.
    #[serde(default)]
    pub last_login_at: Option<String>,
    /// GeoJSON geometry the account may request data in.
    #[serde(default)]
    pub geojson_area_allowed: Option<AllowedArea>,
}

/// GeoJSON geometry limiting where an account may request data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AllowedArea {
    /// GeoJSON geometry type, e.g. `Polygon`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Raw GeoJSON coordinates.
    #[serde(default)]
    pub coordinates: Value,
}

/// Bounding box of an allowed area: `(min, max)` per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaExtent {
    /// Longitude range.
    pub lon: (f64, f64),
    /// Latitude range.
    pub lat: (f64, f64),
}

impl UserInfo {
    /// Extent of the allowed area's outer ring.
    ///
    /// Only `Polygon` geometries have an extent; anything else gives `None`.
    #[must_use]
    pub fn area_extent(&self) -> Option<AreaExtent> {
        let area = self.geojson_area_allowed.as_ref()?;
        if area.kind != "Polygon" {
            return None;
        }
        let rings: Vec<Vec<Vec<f64>>> = serde_json::from_value(area.coordinates.clone()).ok()?;
        let outer = rings.first()?;

        let mut points = outer.iter().filter_map(|p| Some((*p.first()?, *p.get(1)?)));
        let (lon, lat) = points.next()?;
        let mut extent = AreaExtent {
            lon: (lon, lon),
            lat: (lat, lat),
        };
        for (lon, lat) in points {
            extent.lon = (extent.lon.0.min(lon), extent.lon.1.max(lon));
            extent.lat = (extent.lat.0.min(lat), extent.lat.1.max(lat));
        }
        Some(extent)
    }

    /// Roles joined for display.
    #[must_use]
    pub fn roles_display(&self) -> String {
        self.roles.iter().map(plain).collect::<Vec<_>>().join(", ")
    }
}

/// Renders a JSON value without quotes around strings.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn plain_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| plain(&value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_response_accepts_uuid_and_handle_keys() {
        let a: SubmitResponse = serde_json::from_str(r#"{"uuid": "abc"}"#).unwrap();
        let b: SubmitResponse = serde_json::from_str(r#"{"handle": "abc"}"#).unwrap();
        assert_eq!(a.uuid, b.uuid);
        assert_eq!(a.uuid.as_str(), "abc");
    }

    #[test]
    fn test_status_ready_with_data_is_complete() {
        let raw: StatusResponse = serde_json::from_str(
            r#"{"percentage": 100, "processing_status": "Ready", "data": ["/a/b.tif"]}"#,
        )
        .unwrap();
        let status = JobStatus::from(raw);
        assert!(status.is_complete());
        assert_eq!(status.resources.unwrap(), vec!["/a/b.tif".to_string()]);
    }

    #[test]
    fn test_status_without_data_is_not_complete() {
        let raw: StatusResponse =
            serde_json::from_str(r#"{"percentage": 100, "processing_status": "Ready"}"#).unwrap();
        let status = JobStatus::from(raw);
        assert!(!status.is_complete());
        assert!(status.resources.is_none());
    }

    #[test]
    fn test_status_processing_is_not_ready() {
        let raw: StatusResponse = serde_json::from_str(
            r#"{"percentage": 42.5, "processing_status": "Processing", "data": null}"#,
        )
        .unwrap();
        let status = JobStatus::from(raw);
        assert_eq!(status.percentage, 42);
        assert_eq!(status.readiness, Readiness::NotReady);
    }

    #[test]
    fn test_status_wrong_type_fails_to_decode() {
        let result: Result<StatusResponse, _> =
            serde_json::from_str(r#"{"percentage": "half", "processing_status": "Ready"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_status_accepts_string_or_number() {
        let a: BackendStatus = serde_json::from_str(r#"{"backend_version": "4.2.1"}"#).unwrap();
        let b: BackendStatus = serde_json::from_str(r#"{"backend_version": 7}"#).unwrap();
        assert_eq!(a.backend_version, "4.2.1");
        assert_eq!(b.backend_version, "7");
    }

    #[test]
    fn test_user_info_polygon_extent() {
        let user: UserInfo = serde_json::from_str(
            r#"{
                "id": 12,
                "name": "Jane",
                "email": "jane@example.com",
                "roles": ["user", {"name": "admin"}],
                "login_count": 3,
                "geojson_area_allowed": {
                    "type": "Polygon",
                    "coordinates": [[[3.0, 50.0], [7.5, 50.0], [7.5, 53.5], [3.0, 53.5], [3.0, 50.0]]]
                }
            }"#,
        )
        .unwrap();

        let extent = user.area_extent().unwrap();
        assert_eq!(extent.lon, (3.0, 7.5));
        assert_eq!(extent.lat, (50.0, 53.5));
        assert_eq!(user.roles_display(), r#"user, {"name":"admin"}"#);
        assert!(user.last_login_at.is_none());
    }

    #[test]
    fn test_user_info_without_polygon_has_no_extent() {
        let user: UserInfo = serde_json::from_str(
            r#"{"id": 1, "geojson_area_allowed": {"type": "MultiPolygon", "coordinates": []}}"#,
        )
        .unwrap();
        assert!(user.area_extent().is_none());

        let user: UserInfo = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert!(user.area_extent().is_none());
    }
}
