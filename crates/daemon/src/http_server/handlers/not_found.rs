use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::http_server::envelope::ApiResponse;

pub async fn not_found_handler() -> impl IntoResponse {
    ApiResponse::<()> {
        code: StatusCode::NOT_FOUND.as_u16(),
        message: "no such route".to_string(),
        data: None,
        success: false,
        error_id: None,
    }
}
