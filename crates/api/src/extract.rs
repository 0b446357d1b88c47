//! Extractors whose rejections use the `AppError` JSON envelope.

use axum::extract::{FromRequest, FromRequestParts};

use crm_common::error::AppError;

/// `axum::Json` that rejects malformed bodies with a validation error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);
