//! Prediction endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// Base64 image, optionally as a `data:` URL
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    /// "NORMAL" or "PNEUMONIA"
    pub prediction: String,
    /// P(PNEUMONIA)
    pub probability: f32,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// POST /predict - Classify a single base64-encoded X-ray
pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| error(StatusCode::BAD_REQUEST, e.body_text()))?;

    let image = match request.image {
        Some(image) if !image.trim().is_empty() => image,
        _ => return Err(error(StatusCode::BAD_REQUEST, "No image")),
    };

    let prediction = tokio::task::spawn_blocking(move || state.predictor.predict_base64(&image))
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, format!("Inference task failed: {}", e)))?
        .map_err(|e| {
            warn!("Prediction failed: {}", e);
            error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        })?;

    info!(
        "Predicted {} (p={:.4})",
        prediction.label, prediction.probability
    );

    Ok(Json(PredictResponse {
        prediction: prediction.label.name().to_string(),
        probability: prediction.probability,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use base64::Engine;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn encoded_jpeg() -> String {
        let img = RgbImage::from_fn(96, 96, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, 90]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn request(image: Option<String>) -> Result<Json<PredictRequest>, JsonRejection> {
        Ok(Json(PredictRequest { image }))
    }

    #[tokio::test]
    async fn test_predict_valid_image() {
        let Json(response) = predict(State(test_state()), request(Some(encoded_jpeg())))
            .await
            .unwrap();
        assert!(response.prediction == "NORMAL" || response.prediction == "PNEUMONIA");
        assert!((0.0..=1.0).contains(&response.probability));
    }

    #[tokio::test]
    async fn test_predict_missing_image() {
        let (status, Json(body)) = predict(State(test_state()), request(None))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "No image");
    }

    #[tokio::test]
    async fn test_predict_undecodable_image() {
        let garbage = base64::engine::general_purpose::STANDARD.encode(b"not an x-ray");
        let (status, Json(body)) = predict(State(test_state()), request(Some(garbage)))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!body.error.is_empty());
    }
}
