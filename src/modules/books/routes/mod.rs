//! HTTP handlers for book listings and the requests filed against them.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, put},
    Json, Router,
};
use bookloop_http::error::AppError;
use serde::{Deserialize, Serialize};

use super::catalog::Catalog;
use super::models::{Book, BookRequest, NewBook};
use crate::modules::auth::{authenticate, IdentityProvider};
use crate::outcome::Outcome;
use crate::workflow::{StatusChange, SubmittedRequest, Workflow};

#[derive(Clone)]
pub struct BooksState {
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Catalog,
    pub workflow: Workflow,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityBody {
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

/// Latest request of the caller on a book, if any.
#[derive(Debug, Serialize)]
pub struct MyRequest {
    pub request: Option<BookRequest>,
}

pub fn router(state: BooksState) -> Router {
    Router::new()
        .route("/", get(list_books).post(publish_book))
        .route("/{id}", get(get_book).delete(delete_book))
        .route("/{id}/availability", put(change_availability))
        .route("/{id}/requests", get(list_requests).post(submit_request))
        .route("/{id}/requests/mine", get(my_request))
        .route("/{id}/requests/{rid}/status", put(set_request_status))
        .with_state(state)
}

async fn list_books(State(state): State<BooksState>) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(state.catalog.list().await?))
}

async fn publish_book(
    State(state): State<BooksState>,
    headers: HeaderMap,
    Json(body): Json<NewBook>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let owner = authenticate(state.identity.as_ref(), &headers).await?;
    let book = state.catalog.publish(&owner, body).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn get_book(
    State(state): State<BooksState>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    Ok(Json(state.catalog.require(&id).await?))
}

async fn delete_book(
    State(state): State<BooksState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let actor = authenticate(state.identity.as_ref(), &headers).await?;
    state.catalog.delete(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_availability(
    State(state): State<BooksState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AvailabilityBody>,
) -> Result<Json<Book>, AppError> {
    let actor = authenticate(state.identity.as_ref(), &headers).await?;
    Ok(Json(
        state
            .catalog
            .change_availability(&actor, &id, body.available)
            .await?,
    ))
}

async fn list_requests(
    State(state): State<BooksState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<BookRequest>>, AppError> {
    let actor = authenticate(state.identity.as_ref(), &headers).await?;
    Ok(Json(state.workflow.requests_for_book(&actor, &id).await?))
}

async fn submit_request(
    State(state): State<BooksState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Outcome<SubmittedRequest>>), AppError> {
    let actor = authenticate(state.identity.as_ref(), &headers).await?;
    let outcome = state.workflow.submit_request(&id, &actor).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn my_request(
    State(state): State<BooksState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<MyRequest>, AppError> {
    let actor = authenticate(state.identity.as_ref(), &headers).await?;
    let request = state
        .workflow
        .latest_request_for_user(&id, &actor.uid)
        .await?;
    Ok(Json(MyRequest { request }))
}

async fn set_request_status(
    State(state): State<BooksState>,
    headers: HeaderMap,
    Path((id, rid)): Path<(String, String)>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Outcome<StatusChange>>, AppError> {
    let actor = authenticate(state.identity.as_ref(), &headers).await?;
    let context = state.workflow.status_context(&id, &rid, &actor).await?;
    let outcome = state
        .workflow
        .set_request_status(&id, &rid, &body.status, &context)
        .await?;
    Ok(Json(outcome))
}
