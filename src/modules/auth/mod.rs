pub mod identity;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bookloop_http::error::AppError;
use bookloop_kernel::{InitCtx, Module};
use serde::Deserialize;
use serde_json::json;

pub use identity::{
    FederatedCredential, IdentityError, IdentityProvider, Principal, Session, SignUp,
};
pub use memory::MemoryIdentityProvider;

use crate::error::ServiceResult;
use crate::utils;

/// Resolve the caller of a protected endpoint from its bearer token.
pub async fn authenticate(
    identity: &dyn IdentityProvider,
    headers: &HeaderMap,
) -> ServiceResult<Principal> {
    Ok(identity.require_user(utils::bearer_token(headers)).await?)
}

/// Sign-up, sign-in and session endpoints backed by the identity provider
pub struct AuthModule {
    identity: Arc<dyn IdentityProvider>,
}

impl AuthModule {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl Module for AuthModule {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            min_password_length = ctx.settings.auth.min_password_length,
            "auth module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/sign-up", post(sign_up))
            .route("/sign-in", post(sign_in))
            .route("/federated", post(sign_in_federated))
            .route("/sign-out", post(sign_out))
            .route("/password-reset", post(password_reset))
            .route("/password-reset/confirm", post(confirm_password_reset))
            .route("/verify-email", post(verify_email))
            .route("/me", get(me))
            .with_state(self.identity.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let session_response = json!({
            "description": "Signed-in session",
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/Session" }
                }
            }
        });
        let error_response = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                    }
                }
            })
        };

        Some(json!({
            "paths": {
                "/sign-up": {
                    "post": {
                        "summary": "Create an account and send a verification email",
                        "tags": ["Auth"],
                        "responses": {
                            "201": session_response,
                            "400": error_response("Missing field, invalid email or weak password"),
                            "409": error_response("Email already in use")
                        }
                    }
                },
                "/sign-in": {
                    "post": {
                        "summary": "Sign in with email and password",
                        "tags": ["Auth"],
                        "responses": {
                            "200": session_response,
                            "401": error_response("Invalid email or password")
                        }
                    }
                },
                "/federated": {
                    "post": {
                        "summary": "Sign in with an external identity provider",
                        "tags": ["Auth"],
                        "responses": {
                            "200": session_response,
                            "400": error_response("Provider not enabled")
                        }
                    }
                },
                "/sign-out": {
                    "post": {
                        "summary": "End the current session",
                        "tags": ["Auth"],
                        "security": [{ "session": [] }],
                        "responses": { "204": { "description": "Signed out" } }
                    }
                },
                "/password-reset": {
                    "post": {
                        "summary": "Send a password reset email",
                        "tags": ["Auth"],
                        "responses": { "202": { "description": "Reset email dispatched if the account exists" } }
                    }
                },
                "/password-reset/confirm": {
                    "post": {
                        "summary": "Set a new password with the token from a reset email",
                        "tags": ["Auth"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "token": { "type": "string" },
                                            "password": { "type": "string" }
                                        },
                                        "required": ["token", "password"]
                                    }
                                }
                            }
                        },
                        "responses": {
                            "204": { "description": "Password changed" },
                            "400": error_response("Invalid or used token, or weak password")
                        }
                    }
                },
                "/verify-email": {
                    "post": {
                        "summary": "Confirm an email address with the token from a verification email",
                        "tags": ["Auth"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": { "token": { "type": "string" } },
                                        "required": ["token"]
                                    }
                                }
                            }
                        },
                        "responses": {
                            "204": { "description": "Email verified" },
                            "400": error_response("Invalid or used token")
                        }
                    }
                },
                "/me": {
                    "get": {
                        "summary": "Current principal",
                        "tags": ["Auth"],
                        "security": [{ "session": [] }],
                        "responses": {
                            "200": {
                                "description": "Signed-in user",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Principal" }
                                    }
                                }
                            },
                            "401": error_response("Not signed in")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Principal": {
                        "type": "object",
                        "properties": {
                            "uid": { "type": "string" },
                            "displayName": { "type": "string", "nullable": true },
                            "email": { "type": "string", "format": "email" },
                            "emailVerified": { "type": "boolean" }
                        },
                        "required": ["uid", "email", "emailVerified"]
                    },
                    "Session": {
                        "type": "object",
                        "properties": {
                            "token": { "type": "string" },
                            "principal": { "$ref": "#/components/schemas/Principal" }
                        },
                        "required": ["token", "principal"]
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "auth module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "auth module stopped");
        Ok(())
    }
}

type Identity = State<Arc<dyn IdentityProvider>>;

#[derive(Debug, Deserialize)]
struct SignInBody {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PasswordResetBody {
    email: String,
}

#[derive(Debug, Deserialize)]
struct ActionCodeBody {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmResetBody {
    token: String,
    password: String,
}

async fn sign_up(
    State(identity): Identity,
    Json(body): Json<SignUp>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = identity
        .sign_up(body)
        .await
        .map_err(crate::error::ServiceError::from)?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn sign_in(
    State(identity): Identity,
    Json(body): Json<SignInBody>,
) -> Result<Json<Session>, AppError> {
    let session = identity
        .sign_in(&body.email, &body.password)
        .await
        .map_err(crate::error::ServiceError::from)?;
    Ok(Json(session))
}

async fn sign_in_federated(
    State(identity): Identity,
    Json(body): Json<FederatedCredential>,
) -> Result<Json<Session>, AppError> {
    let session = identity
        .sign_in_federated(body)
        .await
        .map_err(crate::error::ServiceError::from)?;
    Ok(Json(session))
}

async fn sign_out(State(identity): Identity, headers: HeaderMap) -> Result<StatusCode, AppError> {
    let token = utils::bearer_token(&headers)
        .ok_or_else(|| AppError::unauthorized(IdentityError::Unauthenticated.to_string()))?;
    identity
        .sign_out(token)
        .await
        .map_err(crate::error::ServiceError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn password_reset(
    State(identity): Identity,
    Json(body): Json<PasswordResetBody>,
) -> Result<StatusCode, AppError> {
    identity
        .send_password_reset(&body.email)
        .await
        .map_err(crate::error::ServiceError::from)?;
    Ok(StatusCode::ACCEPTED)
}

async fn confirm_password_reset(
    State(identity): Identity,
    Json(body): Json<ConfirmResetBody>,
) -> Result<StatusCode, AppError> {
    identity
        .confirm_password_reset(&body.token, &body.password)
        .await
        .map_err(crate::error::ServiceError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn verify_email(
    State(identity): Identity,
    Json(body): Json<ActionCodeBody>,
) -> Result<StatusCode, AppError> {
    identity
        .verify_email(&body.token)
        .await
        .map_err(crate::error::ServiceError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(identity): Identity, headers: HeaderMap) -> Result<Json<Principal>, AppError> {
    Ok(Json(authenticate(identity.as_ref(), &headers).await?))
}

/// Create a new instance of the auth module
pub fn create_module(identity: Arc<dyn IdentityProvider>) -> Arc<dyn Module> {
    Arc::new(AuthModule::new(identity))
}
