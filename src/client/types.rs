//! Wire types for the image-generation endpoints.
//!
//! Requests go to `POST /generate`; the response lists generated images,
//! each of which is then fetched from `GET /images/{filename}`.

use serde::{Deserialize, Serialize};

use crate::job::{GenerationParams, Timings};

/// Body of `POST /generate`.
///
/// `seed` is always sent (as `null` when unset); `image` and `strength`
/// only accompany a reference image.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub prompt: &'a str,
    pub orientation: &'a str,
    pub size: &'a str,
    pub steps: u32,
    pub seed: Option<u64>,
    pub batch: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
}

impl<'a> GenerateRequest<'a> {
    pub fn new(prompt: &'a str, params: &'a GenerationParams) -> Self {
        let reference = params.reference.as_ref();
        Self {
            prompt,
            orientation: &params.orientation,
            size: &params.size,
            steps: params.steps,
            seed: params.seed,
            batch: params.batch,
            image: reference.map(|r| r.data_base64.as_str()),
            strength: reference.map(|r| r.strength),
        }
    }
}

/// Body returned by `POST /generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageInfo>,
}

/// One generated image as described by the endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInfo {
    pub filename: String,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Some servers send `"timings": null` instead of leaving it out.
    #[serde(default)]
    pub timings: Option<Timings>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ReferenceImage;

    #[test]
    fn request_without_reference_omits_image_fields() {
        let params = GenerationParams::default();
        let json = serde_json::to_value(GenerateRequest::new("a red kite", &params)).unwrap();
        assert_eq!(json["prompt"], "a red kite");
        assert_eq!(json["orientation"], "landscape");
        assert_eq!(json["size"], "1mp");
        assert_eq!(json["steps"], 25);
        assert_eq!(json["batch"], 1);
        assert!(json["seed"].is_null());
        assert!(json.get("image").is_none());
        assert!(json.get("strength").is_none());
    }

    #[test]
    fn request_with_reference_carries_image_and_strength() {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&[0u8; 10]);
        let params = GenerationParams {
            seed: Some(42),
            reference: Some(ReferenceImage::from_bytes(&data, 0.5).unwrap()),
            ..Default::default()
        };
        let json = serde_json::to_value(GenerateRequest::new("x", &params)).unwrap();
        assert_eq!(json["seed"], 42);
        assert_eq!(json["strength"], 0.5);
        assert_eq!(
            json["image"],
            params.reference.as_ref().unwrap().data_base64.as_str()
        );
    }

    #[test]
    fn response_deserialize_from_endpoint_format() {
        let body = r#"{
            "success": true,
            "images": [{
                "filename": "img_0001.png",
                "seed": 1234,
                "timings": {"encode": 0.4, "diffuse": 11.2, "save": 0.1, "total": 11.7}
            }]
        }"#;
        let resp: GenerateResponse = serde_json::from_str(body).unwrap();
        assert!(resp.success);
        assert_eq!(resp.images[0].filename, "img_0001.png");
        assert_eq!(resp.images[0].seed, Some(1234));
        assert_eq!(resp.images[0].timings.as_ref().unwrap().total, Some(11.7));
    }

    #[test]
    fn response_tolerates_missing_optional_fields() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"success": true, "images": [{"filename": "a.png"}]}"#)
                .unwrap();
        assert_eq!(resp.images[0].seed, None);
        assert_eq!(resp.images[0].timings, None);

        let failed: GenerateResponse =
            serde_json::from_str(r#"{"success": false, "error": "queue full"}"#).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("queue full"));
        assert!(failed.images.is_empty());
    }

    #[test]
    fn response_accepts_null_timings_and_seed() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"success": true, "error": null, "images": [{"filename": "a.png", "seed": null, "timings": null}]}"#,
        )
        .unwrap();
        assert_eq!(resp.images[0].filename, "a.png");
        assert_eq!(resp.images[0].seed, None);
        assert_eq!(resp.images[0].timings, None);
    }
}
