use std::sync::Arc;

use axum::{extract::rejection::FormRejection, http::StatusCode, response::Html};
use handlebars::Handlebars;
use url::Url;

use crate::{
    accounts::{PasswordError, PasswordHasher},
    db::{Database, DbError},
    mux::{MuxClient, MuxError},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to parse form: {0}")]
    InvalidForm(#[from] FormRejection),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Unable to render page: {0}")]
    Render(#[from] handlebars::RenderError),
    #[error("Unable to update session: {0}")]
    Session(#[from] serde_json::Error),
    #[error("Unable to check password: {0}")]
    Password(#[from] PasswordError),
    #[error("Error creating live stream: {0}")]
    CreateLiveStream(MuxError),
    #[error("Error fetching live streams: {0}")]
    ListLiveStreams(MuxError),
    #[error("No live streams available")]
    NoLiveStreams,
    #[error("Internal error: {0}.")]
    Internal(String),
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let r = match self {
            Error::InvalidForm(e) => {
                tracing::warn!("Invalid request. Failed to parse form: {e}");
                (StatusCode::BAD_REQUEST, format!("Invalid form data: {e}"))
            }
            e @ (Error::CreateLiveStream(_) | Error::ListLiveStreams(_)) => {
                tracing::error!("Mux API request failed: {e}");
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            Error::NoLiveStreams => {
                tracing::info!("No live streams to show.");
                (StatusCode::NOT_FOUND, Error::NoLiveStreams.to_string())
            }
            e @ (Error::Database(_)
            | Error::Render(_)
            | Error::Session(_)
            | Error::Password(_)
            | Error::Internal(_)) => {
                tracing::error!("Internal error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error.".to_string())
            }
        };
        r.into_response()
    }
}

#[derive(Clone)]
pub struct State {
    pub db: Arc<dyn Database>,
    pub mux: MuxClient,
    pub handlebars: Arc<Handlebars<'static>>,
    pub hasher: PasswordHasher,
    pub playback_base_url: Arc<Url>,
}

impl State {
    pub fn render<T: serde::Serialize>(&self, page: &str, data: &T) -> Result<Html<String>, Error> {
        Ok(Html(self.handlebars.render(page, data)?))
    }
}
