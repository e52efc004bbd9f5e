use axum::{extract::State, routing::post, Router};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthenticateRequest, PublicUser, RegisterRequest},
        password::PasswordHasher,
        repo::{verify_blocking, StoreError},
        repo_types::{canonical_email, NewUser},
    },
    envelope::{success_json, JsonBody, JsonResponse},
    error::ApiError,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the email is unknown, so both rejection paths
    // spend the same hashing time.
    static ref DECOY_HASH: Option<String> = PasswordHasher::new().hash("decoy-password").ok();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    lazy_static::initialize(&DECOY_HASH);
    Router::new()
        .route("/authenticate", post(authenticate))
        .route("/register", post(register))
}

#[instrument(skip(state, payload))]
pub async fn authenticate(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<AuthenticateRequest>,
) -> Result<JsonResponse<PublicUser>, ApiError> {
    let email = canonical_email(&payload.email);

    let user = match state.users.get_by_email(&email).await {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            if let Some(decoy) = DECOY_HASH.as_deref() {
                let _ = verify_blocking(&state.hasher, decoy, &payload.password).await;
            }
            warn!(email = %email, "authenticate unknown email");
            state
                .audit
                .emit("authentication-failure", format!("{email} failed to log in"));
            return Err(ApiError::InvalidCredentials);
        }
        Err(e) => return Err(e.into()),
    };

    if !verify_blocking(&state.hasher, &user.password, &payload.password).await? {
        warn!(email = %email, user_id = user.id, "authenticate invalid password");
        state
            .audit
            .emit("authentication-failure", format!("{email} failed to log in"));
        return Err(ApiError::InvalidCredentials);
    }

    info!(user_id = user.id, email = %user.email, "user logged in");
    state
        .audit
        .emit("authentication", format!("{} logged in", user.email));

    let message = format!("Logged in user {}", user.email);
    Ok(success_json(message, Some(PublicUser::from(user))))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<JsonResponse<i64>, ApiError> {
    let email = canonical_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::Validation("invalid email".into()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let id = state
        .users
        .insert(NewUser {
            email: email.clone(),
            first_name: payload.first_name,
            last_name: payload.last_name,
            password: payload.password,
        })
        .await?;

    info!(user_id = id, email = %email, "user registered");
    state
        .audit
        .emit("registration", format!("{email} registered as user {id}"));

    Ok(success_json("user created", Some(id)))
}
