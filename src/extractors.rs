//! Request extractors for the payments API.
//!
//! Storefront and admin clients branch on the `{"error": ...}` body, so a
//! malformed order body or a bad `?status=` filter has to come back in that
//! shape rather than as axum's plain-text rejection.

use axum::{
    extract::{
        FromRequest, FromRequestParts, Path as AxumPath, Query as AxumQuery, Request,
    },
    http::request::Parts,
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::AppError;

/// Request body, also used for response bodies so handlers import one `Json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Json(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

macro_rules! parts_extractor {
    ($(#[$doc:meta])* $name:ident => $inner:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name<T>(pub T);

        impl<S, T> FromRequestParts<S> for $name<T>
        where
            S: Send + Sync,
            T: DeserializeOwned + Send,
        {
            type Rejection = AppError;

            async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
                let extracted = $inner::<T>::from_request_parts(parts, state).await?;
                Ok($name(extracted.0))
            }
        }
    };
}

parts_extractor!(
    /// Admin list filters and pagination.
    Query => AxumQuery
);

parts_extractor!(
    /// Order ids in `/transactions/by-order/{order_id}`.
    Path => AxumPath
);
