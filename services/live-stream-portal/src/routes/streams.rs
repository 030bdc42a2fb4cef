use axum::{routing::get, Router};
use axum_sessions::extractors::{ReadableSession, WritableSession};
use serde::Serialize;

use crate::{
    model::{Error, State},
    mux::{self, CreateLiveStreamRequest, ListLiveStreams, MuxError},
    routes::auth::CurrentUser,
    templates,
};

pub const SESSION_PLAYBACK_ID: &str = "playback_id";

/// Live stream router. Every page requires a logged in user.
pub fn streams_router(state: State) -> anyhow::Result<Router> {
    Ok(Router::new()
        .route(
            "/create_stream/",
            get(create_live_stream_page).post(create_live_stream),
        )
        .route("/view-streams/", get(view_streams))
        .with_state(state))
}

#[derive(Serialize)]
struct CreatePage<'a> {
    user: &'a str,
    stream_key: Option<&'a str>,
}

#[derive(Serialize)]
struct CreatedPage<'a> {
    user: &'a str,
    rtmp_endpoint: &'a str,
    stream_key: &'a str,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
struct StreamEntry {
    id: String,
    playback_url: String,
}

#[derive(Serialize)]
struct ViewPage<'a> {
    user: &'a str,
    stream_data: &'a [StreamEntry],
    first_stream_id: &'a str,
    first_playback_url: &'a str,
}

#[tracing::instrument(level = "debug", skip_all, fields(user_id = user.id))]
async fn create_live_stream_page(
    axum::extract::State(state): axum::extract::State<State>,
    CurrentUser(user): CurrentUser,
) -> Result<axum::response::Html<String>, Error> {
    let profile = state.db.get_profile(user.id).await?;
    let page = CreatePage {
        user: user.display_name(),
        stream_key: profile
            .as_ref()
            .map(|p| p.stream_key.as_str())
            .filter(|k| !k.is_empty()),
    };
    state.render(templates::CREATE_LIVE_STREAM, &page)
}

/// Create a public live stream, remember its stream key in the user's
/// profile and its playback id in the session.
#[tracing::instrument(level = "info", skip_all, fields(user_id = user.id))]
async fn create_live_stream(
    axum::extract::State(state): axum::extract::State<State>,
    CurrentUser(user): CurrentUser,
    mut session: WritableSession,
) -> Result<axum::response::Html<String>, Error> {
    let stream = state
        .mux
        .create_live_stream(&CreateLiveStreamRequest::public())
        .await
        .map_err(Error::CreateLiveStream)?;
    let Some(stream_key) = stream.stream_key.as_deref() else {
        return Err(Error::CreateLiveStream(MuxError::MissingStreamKey(
            stream.id.clone(),
        )));
    };
    let Some(playback_id) = stream.first_playback_id() else {
        return Err(Error::CreateLiveStream(MuxError::MissingPlaybackId(
            stream.id.clone(),
        )));
    };

    if let Err(e) = state.db.set_stream_key(user.id, stream_key).await {
        tracing::warn!(stream_id = %stream.id, "Live stream created but its key was not stored: {e}");
        return Err(e.into());
    }
    session.insert(SESSION_PLAYBACK_ID, playback_id)?;

    let rtmp_endpoint = mux::playback_url(&state.playback_base_url, playback_id);
    let page = CreatedPage {
        user: user.display_name(),
        rtmp_endpoint: &rtmp_endpoint,
        stream_key,
    };
    state.render(templates::STREAM_CREATED, &page)
}

/// Show the stream created in this session, or else the first stream of the
/// account.
#[tracing::instrument(level = "info", skip_all, fields(user_id = user.id))]
async fn view_streams(
    axum::extract::State(state): axum::extract::State<State>,
    CurrentUser(user): CurrentUser,
    session: ReadableSession,
) -> Result<axum::response::Html<String>, Error> {
    let session_playback_id: Option<String> = session.get(SESSION_PLAYBACK_ID);
    drop(session);

    let playback_id = match session_playback_id {
        Some(id) => id,
        None => {
            let streams = state
                .mux
                .list_live_streams(ListLiveStreams::default())
                .await
                .map_err(Error::ListLiveStreams)?;
            let first = streams.first().ok_or(Error::NoLiveStreams)?;
            first
                .first_playback_id()
                .unwrap_or(first.id.as_str())
                .to_string()
        }
    };

    let stream_data = [StreamEntry {
        playback_url: mux::playback_url(&state.playback_base_url, &playback_id),
        id: playback_id,
    }];
    let page = ViewPage {
        user: user.display_name(),
        stream_data: &stream_data,
        first_stream_id: &stream_data[0].id,
        first_playback_url: &stream_data[0].playback_url,
    };
    state.render(templates::VIEW_STREAMS, &page)
}
