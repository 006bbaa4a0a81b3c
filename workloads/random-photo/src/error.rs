//! Error types and their HTTP mapping.

use edge_sdk::edge_data::FetchError;
use http::StatusCode;
use serde::Serialize;

/// Client message for a collection with nothing to serve.
const EMPTY_COLLECTION: &str = "Collection is empty or invalid";

/// Missing required configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("PEXELS_API_KEY is missing")]
    MissingApiKey,

    #[error("Collection ID is missing")]
    MissingCollectionId,
}

/// Failure to resolve a collection's media list.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("PEXELS_API_KEY is missing")]
    MissingApiKey,

    #[error("collection request returned {status}")]
    Upstream { status: u16 },

    #[error("collection request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("unexpected collection response: {0}")]
    Malformed(String),

    #[error("collection is empty")]
    Empty,
}

/// Any failure while serving a request.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    /// Only non-photos in the collection and photos are required.
    #[error("no servable photos in collection")]
    NoPhotos,

    #[error("media {id} has no image source")]
    NoImage { id: String },

    #[error("image fetch failed for {url}")]
    UpstreamImage {
        url: String,
        status: Option<u16>,
        reason: Option<String>,
    },

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            status: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl ServeError {
    /// Response status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Collection(e) => match e {
                CollectionError::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
                CollectionError::Upstream { .. }
                | CollectionError::Fetch(_)
                | CollectionError::Malformed(_) => StatusCode::BAD_GATEWAY,
                CollectionError::Empty => StatusCode::NOT_FOUND,
            },
            Self::NoPhotos => StatusCode::NOT_FOUND,
            Self::NoImage { .. } | Self::UpstreamImage { .. } => StatusCode::BAD_GATEWAY,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Envelope shown to the client.
    pub fn body(&self) -> ErrorBody {
        match self {
            Self::Config(e) => ErrorBody::new(e.to_string()),
            Self::Collection(e) => match e {
                CollectionError::MissingApiKey => ErrorBody::new(e.to_string()),
                CollectionError::Upstream { status } => {
                    ErrorBody::new("Failed to fetch collection").with_status(*status)
                }
                CollectionError::Fetch(inner) => {
                    ErrorBody::new("Failed to fetch collection").with_details(inner.to_string())
                }
                CollectionError::Malformed(details) => {
                    ErrorBody::new("Unexpected collection response").with_details(details.clone())
                }
                CollectionError::Empty => ErrorBody::new(EMPTY_COLLECTION),
            },
            Self::NoPhotos => ErrorBody::new(EMPTY_COLLECTION),
            Self::NoImage { id } => {
                ErrorBody::new("No usable image URL found").with_details(format!("media {}", id))
            }
            Self::UpstreamImage { status, reason, .. } => {
                let mut body = ErrorBody::new("Failed to fetch image");
                body.status = *status;
                body.details = reason.clone();
                body
            }
            Self::MethodNotAllowed => ErrorBody::new("Method not allowed"),
            Self::Internal(message) => {
                ErrorBody::new("Internal Server Error").with_details(message.clone())
            }
        }
    }
}
