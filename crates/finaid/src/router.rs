use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::applications::{Application, ApplicationId, ApplicationPatch, StatusFilter, Verdict};
use crate::desk::{AidDesk, Dashboard, DeskError, LoginOutcome, NewUser};
use crate::identity::{SessionManager, User, UserId, UserPatch};

type DeskState<S> = State<Arc<AidDesk<S>>>;
type ApiResult<T> = Result<T, DeskError>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateApplicationRequest {
    pub student_name: String,
    pub amount: f64,
    pub purpose: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewRequest {
    pub decision: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<StatusFilter>,
}

/// HTTP surface over a shared desk.
pub fn api_router<S>(desk: Arc<AidDesk<S>>) -> Router
where
    S: SessionManager + 'static,
{
    Router::new()
        .route("/api/auth/login", post(login_handler::<S>))
        .route("/api/auth/logout", post(logout_handler::<S>))
        .route("/api/auth/change-password", post(change_password_handler::<S>))
        .route(
            "/api/users",
            get(list_users_handler::<S>).post(create_user_handler::<S>),
        )
        .route(
            "/api/users/:id",
            put(update_user_handler::<S>).delete(delete_user_handler::<S>),
        )
        .route(
            "/api/applications",
            get(list_applications_handler::<S>).post(create_application_handler::<S>),
        )
        .route("/api/applications/pending", get(pending_handler::<S>))
        .route("/api/applications/reviewed", get(reviewed_handler::<S>))
        .route(
            "/api/applications/:id",
            get(get_application_handler::<S>).put(update_application_handler::<S>),
        )
        .route("/api/applications/:id/review", post(review_handler::<S>))
        .route("/api/dashboard", get(dashboard_handler::<S>))
        .with_state(desk)
}

fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(DeskError::Unauthenticated)
}

/// Any authenticated account, including one that still has to change its credential.
fn principal<S>(desk: &AidDesk<S>, headers: &HeaderMap) -> ApiResult<User>
where
    S: SessionManager + 'static,
{
    desk.authenticate(bearer_token(headers)?)
}

/// Authenticated account that has completed its first-login credential change.
fn settled_principal<S>(desk: &AidDesk<S>, headers: &HeaderMap) -> ApiResult<User>
where
    S: SessionManager + 'static,
{
    let user = principal(desk, headers)?;
    if user.is_first_login {
        return Err(DeskError::CredentialChangeRequired);
    }
    Ok(user)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| DeskError::invalid_input(rejection.body_text()))
}

pub(crate) async fn login_handler<S>(
    State(desk): DeskState<S>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginOutcome>>
where
    S: SessionManager + 'static,
{
    let request = body(payload)?;
    desk.login(&request.email, &request.password).map(Json)
}

pub(crate) async fn logout_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>>
where
    S: SessionManager + 'static,
{
    let token = bearer_token(&headers)?;
    if desk.logout(token) {
        Ok(Json(json!({ "status": "logged_out" })))
    } else {
        Err(DeskError::Unauthenticated)
    }
}

pub(crate) async fn change_password_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<Json<User>>
where
    S: SessionManager + 'static,
{
    let user = principal(&desk, &headers)?;
    let request = body(payload)?;
    desk.change_credential(&user, &request.current_password, &request.new_password)
        .map(Json)
}

pub(crate) async fn list_users_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<User>>>
where
    S: SessionManager + 'static,
{
    let admin = settled_principal(&desk, &headers)?;
    desk.list_users(&admin).map(Json)
}

pub(crate) async fn create_user_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)>
where
    S: SessionManager + 'static,
{
    let admin = settled_principal(&desk, &headers)?;
    let request = body(payload)?;
    let user = desk.create_user(&admin, request)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub(crate) async fn update_user_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> ApiResult<Json<User>>
where
    S: SessionManager + 'static,
{
    let admin = settled_principal(&desk, &headers)?;
    let patch = body(payload)?;
    desk.update_user(&admin, &UserId(user_id), patch).map(Json)
}

pub(crate) async fn delete_user_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>>
where
    S: SessionManager + 'static,
{
    let admin = settled_principal(&desk, &headers)?;
    desk.delete_user(&admin, &UserId(user_id.clone()))?;
    Ok(Json(json!({ "id": user_id, "status": "deleted" })))
}

pub(crate) async fn list_applications_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Application>>>
where
    S: SessionManager + 'static,
{
    let user = settled_principal(&desk, &headers)?;
    let Query(query) =
        query.map_err(|rejection| DeskError::invalid_input(rejection.body_text()))?;
    desk.applications(&user, query.status.unwrap_or_default())
        .map(Json)
}

pub(crate) async fn pending_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Application>>>
where
    S: SessionManager + 'static,
{
    let user = settled_principal(&desk, &headers)?;
    desk.applications(&user, StatusFilter::Pending).map(Json)
}

pub(crate) async fn reviewed_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Application>>>
where
    S: SessionManager + 'static,
{
    let user = settled_principal(&desk, &headers)?;
    desk.applications(&user, StatusFilter::Reviewed).map(Json)
}

pub(crate) async fn create_application_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
    payload: Result<Json<CreateApplicationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Application>)>
where
    S: SessionManager + 'static,
{
    let counselor = settled_principal(&desk, &headers)?;
    let request = body(payload)?;
    let application = desk.create_application(
        &counselor,
        &request.student_name,
        request.amount,
        &request.purpose,
    )?;
    Ok((StatusCode::CREATED, Json(application)))
}

pub(crate) async fn get_application_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> ApiResult<Json<Application>>
where
    S: SessionManager + 'static,
{
    let user = settled_principal(&desk, &headers)?;
    desk.application(&user, &ApplicationId(application_id))
        .map(Json)
}

pub(crate) async fn update_application_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    payload: Result<Json<ApplicationPatch>, JsonRejection>,
) -> ApiResult<Json<Application>>
where
    S: SessionManager + 'static,
{
    let counselor = settled_principal(&desk, &headers)?;
    let patch = body(payload)?;
    desk.update_application(&counselor, &ApplicationId(application_id), patch)
        .map(Json)
}

pub(crate) async fn review_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult<Json<Application>>
where
    S: SessionManager + 'static,
{
    let approver = settled_principal(&desk, &headers)?;
    let request = body(payload)?;
    let verdict = Verdict::parse(&request.decision)?;
    desk.review(
        &approver,
        &ApplicationId(application_id),
        verdict,
        &request.reason,
    )
    .map(Json)
}

pub(crate) async fn dashboard_handler<S>(
    State(desk): DeskState<S>,
    headers: HeaderMap,
) -> ApiResult<Json<Dashboard>>
where
    S: SessionManager + 'static,
{
    let user = settled_principal(&desk, &headers)?;
    desk.dashboard(&user).map(Json)
}
