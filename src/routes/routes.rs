//! Defines routes for account, container and object operations.
//!
//! ## Structure
//! - **Account-level endpoints**
//!   - `GET    /v1` account names, `POST /v1` refreshes every account
//!   - `PUT | GET | PATCH | DELETE | POST /v1/{account}`
//!
//! - **Container-level endpoints**
//!   - `PUT    /v1/{account}/{container}` create
//!   - `GET    /v1/{account}/{container}` list objects
//!   - `PATCH  /v1/{account}/{container}` properties
//!   - `DELETE /v1/{account}/{container}` delete
//!   - `POST   /v1/{account}/{container}?action=show|snapshot|purge|refresh|touch|delete_many`
//!
//! - **Object-level endpoints**
//!   - `PUT | GET | HEAD | PATCH | DELETE | POST /v1/{account}/{container}/{*object}`
//!
//! The wildcard `*object` allows nested names like `photos/2025/img.jpg`.

use crate::handlers::{
    AppState,
    account_handlers::{
        create_account, delete_account, list_accounts, patch_account, post_account, refresh_all,
        show_account,
    },
    container_handlers::{
        create_container, delete_container, list_objects, patch_container, post_container,
    },
    health_handlers::{healthz, readyz},
    object_handlers::{
        delete_object, get_object, head_object, patch_object, post_object, put_object,
    },
};
use axum::{
    Router,
    routing::{get, put},
};

/// Build the router; handlers share `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1", get(list_accounts).post(refresh_all))
        .route(
            "/v1/{account}",
            put(create_account)
                .get(show_account)
                .patch(patch_account)
                .delete(delete_account)
                .post(post_account),
        )
        .route(
            "/v1/{account}/{container}",
            put(create_container)
                .get(list_objects)
                .patch(patch_container)
                .delete(delete_container)
                .post(post_container),
        )
        .route(
            "/v1/{account}/{container}/{*object}",
            put(put_object)
                .get(get_object)
                .head(head_object)
                .patch(patch_object)
                .delete(delete_object)
                .post(post_object),
        )
}
