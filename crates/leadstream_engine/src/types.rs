use std::fmt;

use leadstream_core::SearchParameters;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Text suitable for showing to the person who ran the search.
    ///
    /// HTTP failures already carry the server's own explanation (or a generic
    /// line), so they are shown as-is.
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::HttpStatus(_) => self.message.clone(),
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    InvalidRequest,
    InvalidResponse,
    HttpStatus(u16),
    Timeout,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::InvalidRequest => write!(f, "invalid request"),
            FailureKind::InvalidResponse => write!(f, "invalid response"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// JSON body of the streaming search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub category: String,
    pub bbox: String,
    pub merge: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub location: LocationPayload,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationPayload {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
}

impl From<&SearchParameters> for SearchRequest {
    fn from(parameters: &SearchParameters) -> Self {
        Self {
            category: parameters.category.clone(),
            bbox: parameters.bbox.clone(),
            merge: parameters.merge,
            filter: parameters
                .filter
                .as_deref()
                .map(str::trim)
                .filter(|filter| !filter.is_empty())
                .map(ToOwned::to_owned),
            location: LocationPayload {
                name: parameters.location_name.clone(),
                lat: parameters.center.lat,
                lng: parameters.center.lng,
                radius_km: parameters.radius_km,
            },
            user_id: parameters.user_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TranscriptionResponse {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadstream_core::GeoPoint;
    use serde_json::json;

    #[test]
    fn request_body_matches_wire_shape() {
        let parameters = SearchParameters {
            category: "dentist".to_string(),
            bbox: "1,2,3,4".to_string(),
            center: GeoPoint { lat: 2.0, lng: 3.0 },
            radius_km: 5.0,
            location_name: "Midtown".to_string(),
            filter: Some("   ".to_string()),
            merge: true,
            user_id: "u-9".to_string(),
        };

        let body = serde_json::to_value(SearchRequest::from(&parameters)).unwrap();
        assert_eq!(
            body,
            json!({
                "category": "dentist",
                "bbox": "1,2,3,4",
                "merge": true,
                "location": {"name": "Midtown", "lat": 2.0, "lng": 3.0, "radius_km": 5.0},
                "user_id": "u-9"
            })
        );
    }

    #[test]
    fn http_failures_show_server_text_only() {
        let http = TransportError::new(FailureKind::HttpStatus(429), "Quota exceeded");
        assert_eq!(http.user_message(), "Quota exceeded");

        let network = TransportError::new(FailureKind::Network, "connection refused");
        assert_eq!(network.user_message(), "network error: connection refused");
    }
}
