use axum::extract::{FromRequest, FromRequestParts};

use crate::response::ServerError;

/// `axum::Json` whose rejection is a `validation` error in the usual
/// `{"error"}` envelope instead of axum's plain-text 4xx.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct Json<T>(pub T);

/// `axum::extract::Query` with the same rejection mapping.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServerError))]
pub struct Query<T>(pub T);
