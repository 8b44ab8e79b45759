// SPDX-License-Identifier: Apache-2.0

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

const INDEX_HTML: &str = include_str!("../static/index.html");

pub(crate) async fn root_handler() -> Response {
    Redirect::temporary("/ui/").into_response()
}

pub(crate) async fn index_handler() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        INDEX_HTML,
    )
        .into_response()
}
