use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::session::{CancelError, LoadError, SearchError};
use crate::source::FetchError;

const PUBLISH_HINT: &str =
    "Make sure the sheet is published to the web (File → Share → Publish to web)";
const LOAD_HINT: &str =
    "يرجى التأكد من أن الجدول منشور للعامة، وأن معرف الجدول صحيح، وأن الجدول يحتوي على بيانات";
const UNAVAILABLE_HINT: &str = "يرجى الانتظار حتى يتم تحميل البيانات.";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Cancel(#[from] CancelError),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidParam { field: &'static str, value: String },

    #[error(transparent)]
    Proxy(#[from] FetchError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            Self::Load(LoadError::Busy) => {
                (StatusCode::CONFLICT, "جاري تحميل البيانات بالفعل", None)
            }
            Self::Load(LoadError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, "الخادم قيد الإيقاف", None)
            }
            Self::Load(_) => (StatusCode::BAD_GATEWAY, "خطأ في تحميل البيانات", Some(LOAD_HINT)),
            Self::Search(SearchError::Unavailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "البيانات غير متاحة. يرجى تحديث البيانات أولاً.",
                Some(UNAVAILABLE_HINT),
            ),
            Self::Search(SearchError::Query(_)) => (StatusCode::BAD_REQUEST, "خطأ في البحث", None),
            Self::Cancel(CancelError::BlankName) => {
                (StatusCode::BAD_REQUEST, "اسم السجل مطلوب", None)
            }
            Self::Cancel(CancelError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "تعذر حفظ الإلغاء", None)
            }
            Self::InvalidParam { .. } => (StatusCode::BAD_REQUEST, "قيمة غير صالحة", None),
            Self::Proxy(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch Google Sheets data",
                Some(PUBLISH_HINT),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, hint) = self.parts();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }

        let body = ErrorBody {
            error: error.to_string(),
            details: Some(self.to_string()),
            hint,
        };
        (status, Json(body)).into_response()
    }
}
