use axum::{
    extract::{rejection::FormRejection, FromRequestParts, Query},
    http::{request::Parts, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use axum_sessions::extractors::{ReadableSession, WritableSession};
use serde::{Deserialize, Serialize};

use crate::{
    accounts::SignupForm,
    db::{DbError, NewUser, User},
    model::{Error, State},
    templates,
};

pub const SESSION_USER_ID: &str = "user_id";

pub const LOGIN_PATH: &str = "/";
pub const AFTER_LOGIN_PATH: &str = "/create_stream/";

/// Authentication router: login, signup and logout.
pub fn auth_router(state: State) -> anyhow::Result<Router> {
    Ok(Router::new()
        .route(LOGIN_PATH, get(login_page).post(login))
        .route("/signup/", get(signup_page).post(signup))
        .route("/logout/", get(logout).post(logout))
        .with_state(state))
}

/// The logged in user. Extracting it from a request without a valid
/// session redirects to the login page, remembering where the user was
/// going.
///
/// Must be extracted before any [`WritableSession`] of the same handler,
/// otherwise the session lock is never released.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<State> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &State) -> Result<Self, Self::Rejection> {
        let user_id: Option<i64> = {
            let session = ReadableSession::from_request_parts(parts, state)
                .await
                .map_err(IntoResponse::into_response)?;
            session.get(SESSION_USER_ID)
        };
        let Some(user_id) = user_id else {
            return Err(login_redirect(&parts.uri));
        };
        match state.db.get_user(user_id).await {
            Ok(Some(user)) if user.is_active => Ok(CurrentUser(user)),
            Ok(_) => {
                tracing::debug!(user_id, "Session refers to a missing or inactive user.");
                Err(login_redirect(&parts.uri))
            }
            Err(e) => Err(Error::from(e).into_response()),
        }
    }
}

fn login_redirect(uri: &Uri) -> Response {
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let next: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    Redirect::to(&format!("{LOGIN_PATH}?next={next}")).into_response()
}

/// Only local absolute paths are accepted as redirect targets.
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| {
        n.starts_with('/')
            && !n.starts_with("//")
            && !n.contains('\\')
            && !n.chars().any(char::is_control)
    })
}

#[derive(Deserialize, Debug, Default)]
struct LoginQuery {
    next: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    next: Option<String>,
}

#[derive(Serialize)]
struct LoginPage<'a> {
    username: &'a str,
    next: Option<&'a str>,
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct SignupPage<'a> {
    form: &'a SignupForm,
    errors: &'a [String],
}

#[tracing::instrument(level = "debug", skip_all)]
async fn login_page(
    axum::extract::State(state): axum::extract::State<State>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, Error> {
    let page = LoginPage {
        username: "",
        next: safe_next(query.next.as_deref()),
        error: None,
    };
    Ok(state.render(templates::LOGIN, &page)?.into_response())
}

#[tracing::instrument(level = "info", skip_all)]
async fn login(
    axum::extract::State(state): axum::extract::State<State>,
    mut session: WritableSession,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, Error> {
    let Form(form) = form?;
    let username = form.username.trim();
    let next = safe_next(form.next.as_deref());

    let user = if username.is_empty() || form.password.is_empty() {
        None
    } else {
        authenticate(&state, username, &form.password).await?
    };

    let Some(user) = user else {
        tracing::info!("Failed login attempt.");
        let page = LoginPage {
            username,
            next,
            error: Some("Invalid username or password"),
        };
        return Ok(state.render(templates::LOGIN, &page)?.into_response());
    };

    start_session(&state, &mut session, &user).await?;
    Ok(Redirect::to(next.unwrap_or(AFTER_LOGIN_PATH)).into_response())
}

/// Look the user up and check the password. Inactive users and wrong
/// passwords both yield `None`.
async fn authenticate(state: &State, username: &str, password: &str) -> Result<Option<User>, Error> {
    let user = state.db.find_user_by_username(username).await?;
    let hasher = state.hasher;
    let password = password.to_string();
    let checked = tokio::task::spawn_blocking(move || match user {
        Some(user) => hasher
            .verify(&password, &user.password_hash)
            .map(|valid| (valid && user.is_active).then_some(user)),
        None => {
            hasher.dummy_verify(&password);
            Ok(None)
        }
    })
    .await
    .map_err(|e| Error::Internal(format!("password check task failed: {e}")))??;
    Ok(checked)
}

/// Log `user` in on this session. Data left behind by a different (or no)
/// user is dropped so that it cannot leak into the new login.
async fn start_session(state: &State, session: &mut WritableSession, user: &User) -> Result<(), Error> {
    if session.get::<i64>(SESSION_USER_ID) != Some(user.id) {
        session.clear();
    }
    session.regenerate();
    session.insert(SESSION_USER_ID, user.id)?;
    state.db.record_login(user.id, chrono::Utc::now()).await?;
    tracing::info!(user_id = user.id, "User logged in.");
    Ok(())
}

#[tracing::instrument(level = "debug", skip_all)]
async fn signup_page(
    axum::extract::State(state): axum::extract::State<State>,
) -> Result<Response, Error> {
    let page = SignupPage {
        form: &SignupForm::default(),
        errors: &[],
    };
    Ok(state.render(templates::SIGNUP, &page)?.into_response())
}

#[tracing::instrument(level = "info", skip_all)]
async fn signup(
    axum::extract::State(state): axum::extract::State<State>,
    mut session: WritableSession,
    form: Result<Form<SignupForm>, FormRejection>,
) -> Result<Response, Error> {
    let Form(form) = form?;
    let form = form.trimmed();

    let mut errors = form.validate();
    if !form.username.is_empty()
        && state
            .db
            .find_user_by_username(&form.username)
            .await?
            .is_some()
    {
        errors.insert(0, DbError::UsernameTaken.to_string());
    }

    if errors.is_empty() {
        let hasher = state.hasher;
        let password = form.password1.clone();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| Error::Internal(format!("password hashing task failed: {e}")))?;
        let new_user = NewUser {
            username: form.username.clone(),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            email: form.email.clone(),
            password_hash,
        };
        match state.db.create_user(new_user).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, "Created user account.");
                start_session(&state, &mut session, &user).await?;
                return Ok(Redirect::to(LOGIN_PATH).into_response());
            }
            // Lost a race with a concurrent signup.
            Err(DbError::UsernameTaken) => errors.push(DbError::UsernameTaken.to_string()),
            Err(e) => return Err(e.into()),
        }
    }

    let page = SignupPage {
        form: &form,
        errors: &errors,
    };
    Ok(state.render(templates::SIGNUP, &page)?.into_response())
}

#[tracing::instrument(level = "debug", skip_all)]
async fn logout(mut session: WritableSession) -> Redirect {
    if let Some(user_id) = session.get::<i64>(SESSION_USER_ID) {
        tracing::info!(user_id, "User logged out.");
    }
    session.destroy();
    Redirect::to(LOGIN_PATH)
}
