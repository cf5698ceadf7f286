pub mod catalog;
pub mod models;
pub mod routes;

use async_trait::async_trait;
use axum::Router;
use bookloop_kernel::{InitCtx, Module};
use serde_json::json;

use routes::BooksState;

/// Book listings and the request workflow behind them
pub struct BooksModule {
    state: BooksState,
}

impl BooksModule {
    pub fn new(state: BooksState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
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
        let json_body = |schema: &str| {
            json!({
                "required": true,
                "content": {
                    "application/json": {
                        "schema": { "$ref": format!("#/components/schemas/{schema}") }
                    }
                }
            })
        };
        let json_response = |description: &str, schema: &serde_json::Value| {
            json!({
                "description": description,
                "content": { "application/json": { "schema": schema } }
            })
        };
        let book_ref = json!({ "$ref": "#/components/schemas/Book" });
        let outcome_ref = json!({ "$ref": "#/components/schemas/Outcome" });
        let id_param = json!({ "name": "id", "in": "path", "required": true, "schema": { "type": "string" } });
        let rid_param = json!({ "name": "rid", "in": "path", "required": true, "schema": { "type": "string" } });

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books, newest first",
                        "tags": ["Books"],
                        "responses": {
                            "200": json_response("Books", &json!({ "type": "array", "items": book_ref })),
                            "502": error_response("Document store unavailable")
                        }
                    },
                    "post": {
                        "summary": "Publish a book",
                        "tags": ["Books"],
                        "security": [{ "session": [] }],
                        "requestBody": json_body("NewBook"),
                        "responses": {
                            "201": json_response("Published book", &book_ref),
                            "400": error_response("Missing title or author, or invalid price"),
                            "401": error_response("Not signed in")
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a book",
                        "tags": ["Books"],
                        "parameters": [id_param],
                        "responses": {
                            "200": json_response("Book", &book_ref),
                            "404": error_response("Book not found")
                        }
                    },
                    "delete": {
                        "summary": "Delete a book",
                        "tags": ["Books"],
                        "security": [{ "session": [] }],
                        "parameters": [id_param],
                        "responses": {
                            "204": { "description": "Deleted" },
                            "403": error_response("Not the owner"),
                            "404": error_response("Book not found")
                        }
                    }
                },
                "/{id}/availability": {
                    "put": {
                        "summary": "Change a book's availability",
                        "tags": ["Books"],
                        "security": [{ "session": [] }],
                        "parameters": [id_param],
                        "requestBody": json_body("Availability"),
                        "responses": {
                            "200": json_response("Updated book", &book_ref),
                            "403": error_response("Not the owner")
                        }
                    }
                },
                "/{id}/requests": {
                    "get": {
                        "summary": "List requests for a book",
                        "tags": ["Requests"],
                        "security": [{ "session": [] }],
                        "parameters": [id_param],
                        "responses": {
                            "200": json_response("Requests, newest first", &json!({
                                "type": "array",
                                "items": { "$ref": "#/components/schemas/BookRequest" }
                            })),
                            "403": error_response("Not the owner")
                        }
                    },
                    "post": {
                        "summary": "Request a book",
                        "tags": ["Requests"],
                        "security": [{ "session": [] }],
                        "parameters": [id_param],
                        "responses": {
                            "201": json_response("Request filed", &outcome_ref),
                            "403": error_response("Own book"),
                            "404": error_response("Book not found"),
                            "409": error_response("Already pending or accepted")
                        }
                    }
                },
                "/{id}/requests/mine": {
                    "get": {
                        "summary": "Caller's latest request for a book",
                        "tags": ["Requests"],
                        "security": [{ "session": [] }],
                        "parameters": [id_param],
                        "responses": {
                            "200": json_response("Latest request or null", &json!({
                                "type": "object",
                                "properties": {
                                    "request": { "$ref": "#/components/schemas/BookRequest" }
                                }
                            }))
                        }
                    }
                },
                "/{id}/requests/{rid}/status": {
                    "put": {
                        "summary": "Accept or reject a request",
                        "tags": ["Requests"],
                        "security": [{ "session": [] }],
                        "parameters": [id_param, rid_param],
                        "requestBody": json_body("RequestDecision"),
                        "responses": {
                            "200": json_response("Request answered", &outcome_ref),
                            "400": error_response("Status is neither accepted nor rejected"),
                            "403": error_response("Not the owner"),
                            "404": error_response("Book or request not found"),
                            "409": error_response("Request already answered")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "edition": { "type": "string" },
                            "condition": { "type": "string" },
                            "price": { "type": "number", "minimum": 0 },
                            "isFree": { "type": "boolean" },
                            "description": { "type": "string" },
                            "ownerUid": { "type": "string" },
                            "ownerName": { "type": "string" },
                            "ownerEmail": { "type": "string" },
                            "ownerPhone": { "type": "string" },
                            "createdAt": { "type": "integer", "description": "Microseconds since the Unix epoch" },
                            "available": { "type": "boolean" }
                        },
                        "required": ["id", "title", "author", "ownerUid", "available"]
                    },
                    "NewBook": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "edition": { "type": "string" },
                            "condition": { "type": "string" },
                            "price": { "type": "number" },
                            "isFree": { "type": "boolean" },
                            "description": { "type": "string" },
                            "ownerPhone": { "type": "string" }
                        },
                        "required": ["title", "author"]
                    },
                    "Availability": {
                        "type": "object",
                        "properties": { "available": { "type": "boolean" } },
                        "required": ["available"]
                    },
                    "BookRequest": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "requesterUid": { "type": "string" },
                            "requesterName": { "type": "string" },
                            "requesterEmail": { "type": "string" },
                            "requestedAt": { "type": "integer" },
                            "status": { "type": "string", "enum": ["pending", "accepted", "rejected"] }
                        },
                        "required": ["id", "requesterUid", "status"]
                    },
                    "RequestDecision": {
                        "type": "object",
                        "properties": {
                            "status": { "type": "string", "enum": ["accepted", "rejected"] }
                        },
                        "required": ["status"]
                    },
                    "Outcome": {
                        "type": "object",
                        "properties": {
                            "value": { "type": "object" },
                            "advisories": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "step": { "type": "string" },
                                        "error": { "type": "string" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(state: BooksState) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(BooksModule::new(state))
}
