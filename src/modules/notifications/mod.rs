pub mod mailbox;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bookloop_http::error::AppError;
use bookloop_kernel::{InitCtx, Module};
use serde_json::json;

use crate::modules::auth::{authenticate, IdentityProvider};
use mailbox::Mailbox;
use models::Notification;

#[derive(Clone)]
pub struct NotificationsState {
    pub identity: Arc<dyn IdentityProvider>,
    pub mailbox: Mailbox,
}

/// The signed-in user's mailbox
pub struct NotificationsModule {
    state: NotificationsState,
}

impl NotificationsModule {
    pub fn new(state: NotificationsState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for NotificationsModule {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            mailbox_capacity = ctx.settings.notifications.mailbox_capacity,
            "notifications module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(list_notifications))
            .route("/{id}/read", post(mark_read))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "Caller's notifications, newest first",
                        "tags": ["Notifications"],
                        "security": [{ "session": [] }],
                        "responses": {
                            "200": {
                                "description": "At most the newest entries kept by retention",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Notification" }
                                        }
                                    }
                                }
                            },
                            "401": {
                                "description": "Not signed in",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                },
                "/{id}/read": {
                    "post": {
                        "summary": "Mark a notification as read",
                        "tags": ["Notifications"],
                        "security": [{ "session": [] }],
                        "parameters": [
                            { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }
                        ],
                        "responses": {
                            "204": { "description": "Marked as read" },
                            "404": {
                                "description": "Notification not found",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Notification": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "message": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "accepted", "rejected"] },
                            "bookId": { "type": "string" },
                            "requestId": { "type": "string", "nullable": true },
                            "requesterUid": { "type": "string", "nullable": true },
                            "requesterEmail": { "type": "string", "nullable": true },
                            "publisherEmail": { "type": "string", "nullable": true },
                            "createdAt": { "type": "integer" },
                            "read": { "type": "boolean" }
                        },
                        "required": ["id", "message", "status", "bookId", "read"]
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "notifications module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "notifications module stopped");
        Ok(())
    }
}

async fn list_notifications(
    State(state): State<NotificationsState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Notification>>, AppError> {
    let recipient = authenticate(state.identity.as_ref(), &headers).await?;
    Ok(Json(state.mailbox.list(&recipient.uid).await?))
}

async fn mark_read(
    State(state): State<NotificationsState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let recipient = authenticate(state.identity.as_ref(), &headers).await?;
    state.mailbox.mark_read(&recipient.uid, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a new instance of the notifications module
pub fn create_module(state: NotificationsState) -> Arc<dyn Module> {
    Arc::new(NotificationsModule::new(state))
}
