//! # Background removal
//!
//! Downloaded product photos are sent to a hosted background-removal model
//! and the transparent result is stored next to the originals, under a
//! separate directory.
//!
//! ## Flow
//!
//! 1. Decode the local image and re-encode it as RGBA PNG into a temporary
//!    file (the model needs a format with an alpha channel).
//! 2. Create a prediction with the PNG as a base64 data URI.
//! 3. Poll the prediction until it succeeds, fails or is canceled.
//! 4. Download the output URL to the processed path.
//!
//! The temporary PNG is a [`tempfile::NamedTempFile`], removed when it goes
//! out of scope on every path out of [`BackgroundRemover::remove_background`].
//!
//! ## Failures
//!
//! Every failure is an [`ItemError`] for that record only: bad input path,
//! conversion failure, service error (non-2xx, failed prediction, polling
//! exhausted), transport error, invalid output URL, or write failure.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ImageFormat, ImageReader};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use tracing::debug;
use url::Url;

use crate::config::EnrichSettings;
use crate::error::ItemError;

/// Removes the background from a local image, writing the result to `output`
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove_background(&self, input: &Path, output: &Path) -> Result<(), ItemError>;
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

impl Prediction {
    fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

/// Client for the Replicate predictions API
pub struct ReplicateRemover {
    client: Client,
    settings: EnrichSettings,
}

impl ReplicateRemover {
    pub fn new(client: Client, settings: EnrichSettings) -> Self {
        Self { client, settings }
    }

    async fn create_prediction(&self, image_data_uri: String) -> Result<Prediction, ItemError> {
        let url = format!("{}/predictions", self.settings.api_base);
        let body = json!({
            "version": self.settings.model_version,
            "input": { "image": image_data_uri },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ItemError::transport(&url, &e))?;

        Self::parse_prediction(&url, response).await
    }

    async fn get_prediction(&self, url: &str) -> Result<Prediction, ItemError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.settings.api_token)
            .send()
            .await
            .map_err(|e| ItemError::transport(url, &e))?;

        Self::parse_prediction(url, response).await
    }

    async fn parse_prediction(
        url: &str,
        response: reqwest::Response,
    ) -> Result<Prediction, ItemError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ItemError::transport(url, &e))?;

        if !status.is_success() {
            return Err(ItemError::Service(format!("HTTP {status}: {}", text.trim())));
        }

        serde_json::from_str(&text)
            .map_err(|e| ItemError::Service(format!("unexpected prediction payload: {e}")))
    }

    /// Poll until the prediction settles; returns the output URL.
    async fn await_output(&self, mut prediction: Prediction) -> Result<String, ItemError> {
        let mut polls = 0;

        loop {
            match prediction.status.as_str() {
                "succeeded" => {
                    return prediction.output_url().ok_or_else(|| {
                        ItemError::Service(format!("prediction {} has no output", prediction.id))
                    });
                }
                "failed" | "canceled" => {
                    let reason = prediction
                        .error
                        .as_ref()
                        .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
                        .unwrap_or_else(|| "no error message".to_string());
                    return Err(ItemError::Service(format!(
                        "prediction {} {}: {}",
                        prediction.id, prediction.status, reason
                    )));
                }
                _ => {}
            }

            if polls >= self.settings.max_polls {
                return Err(ItemError::Service(format!(
                    "prediction {} still '{}' after {} polls",
                    prediction.id, prediction.status, polls
                )));
            }

            let get_url = prediction
                .urls
                .as_ref()
                .map(|u| u.get.clone())
                .ok_or_else(|| ItemError::Service("prediction has no polling URL".to_string()))?;

            tokio::time::sleep(self.settings.poll_interval).await;
            polls += 1;
            debug!("Polling prediction {} ({})", prediction.id, polls);
            prediction = self.get_prediction(&get_url).await?;
        }
    }

    async fn save_output(&self, output_url: &str, output: &Path) -> Result<(), ItemError> {
        if !is_valid_url(output_url) {
            return Err(ItemError::InvalidUrl {
                url: output_url.to_string(),
                reason: "missing scheme or host".to_string(),
            });
        }

        let response = self
            .client
            .get(output_url)
            .send()
            .await
            .map_err(|e| ItemError::transport(output_url, &e))?;

        if !response.status().is_success() {
            return Err(ItemError::HttpStatus {
                url: output_url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ItemError::transport(output_url, &e))?;

        tokio::fs::write(output, &bytes)
            .await
            .map_err(|e| ItemError::Write {
                path: output.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl BackgroundRemover for ReplicateRemover {
    async fn remove_background(&self, input: &Path, output: &Path) -> Result<(), ItemError> {
        if !input.is_file() {
            return Err(ItemError::InvalidInput {
                path: input.to_path_buf(),
                reason: "not a readable file".to_string(),
            });
        }

        let scratch_dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(std::env::temp_dir, Path::to_path_buf);
        let (temp_png, png_bytes) = convert_to_png(input.to_path_buf(), scratch_dir).await?;
        debug!(
            "Converted {} to PNG ({} bytes) at {}",
            input.display(),
            png_bytes.len(),
            temp_png.path().display()
        );

        let data_uri = format!("data:image/png;base64,{}", STANDARD.encode(&png_bytes));
        drop(png_bytes);

        let prediction = self.create_prediction(data_uri).await?;
        let output_url = self.await_output(prediction).await?;
        self.save_output(&output_url, output).await?;

        if let Err(e) = temp_png.close() {
            debug!("Failed to remove temporary PNG: {}", e);
        }
        Ok(())
    }
}

/// Validate URL format: needs both a scheme and a host.
pub fn is_valid_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| !u.scheme().is_empty() && u.has_host())
}

/// Re-encode `input` as RGBA PNG into a temporary file inside `dir`.
async fn convert_to_png(
    input: PathBuf,
    dir: PathBuf,
) -> Result<(NamedTempFile, Vec<u8>), ItemError> {
    let conversion_failed = |path: &Path, reason: String| ItemError::ImageConversion {
        path: path.to_path_buf(),
        reason,
    };
    let input_for_error = input.clone();

    tokio::task::spawn_blocking(move || {
        // The file extension is not trusted; CDNs serve PNG and WebP under any name
        let rgba = ImageReader::open(&input)
            .and_then(ImageReader::with_guessed_format)
            .map_err(|e| conversion_failed(&input, e.to_string()))?
            .decode()
            .map_err(|e| conversion_failed(&input, e.to_string()))?
            .to_rgba8();

        let mut bytes = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| conversion_failed(&input, e.to_string()))?;

        let mut temp = tempfile::Builder::new()
            .prefix("harvest-")
            .suffix(".png")
            .tempfile_in(&dir)
            .map_err(|e| conversion_failed(&input, format!("temp file: {e}")))?;
        temp.as_file_mut()
            .write_all(&bytes)
            .map_err(|e| conversion_failed(&input, format!("temp file: {e}")))?;

        Ok::<_, ItemError>((temp, bytes))
    })
    .await
    .map_err(|e| conversion_failed(&input_for_error, e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubResponse, serve};
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::time::Duration;
    use tempfile::TempDir;

    const STARTING: &str =
        r#"{"id":"p1","status":"starting","output":null,"urls":{"get":"{base}/predictions/p1"}}"#;

    fn remover(api_base: &str) -> ReplicateRemover {
        ReplicateRemover::new(
            Client::new(),
            EnrichSettings {
                api_token: "r8_test".to_string(),
                api_base: api_base.to_string(),
                model_version: "abc123".to_string(),
                poll_interval: Duration::ZERO,
                max_polls: 3,
            },
        )
    }

    /// images/1.jpg and an empty no_bg_images/ directory
    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::create_dir(dir.path().join("no_bg_images")).unwrap();
        let input = dir.path().join("images").join("1.jpg");
        RgbImage::from_pixel(4, 4, Rgb([200, 10, 10])).save(&input).unwrap();
        let output = dir.path().join("no_bg_images").join("no_bg_1.png");
        (dir, input, output)
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn polls_until_succeeded_and_saves_output() {
        let base = serve(vec![
            ("/predictions", StubResponse::json(201, STARTING)),
            (
                "/predictions/p1",
                StubResponse::json(200, r#"{"id":"p1","status":"succeeded","output":"{base}/out/p1.png"}"#),
            ),
            ("/out/p1.png", StubResponse::bytes(200, "image/png", b"\x89PNG-result".to_vec())),
        ])
        .await;
        let (dir, input, output) = fixture();

        remover(&base).remove_background(&input, &output).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"\x89PNG-result");
        assert_eq!(entries(&dir.path().join("no_bg_images")), vec!["no_bg_1.png"]);
    }

    #[tokio::test]
    async fn failed_prediction_is_service_error_and_cleans_up() {
        let base = serve(vec![
            ("/predictions", StubResponse::json(201, STARTING)),
            (
                "/predictions/p1",
                StubResponse::json(200, r#"{"id":"p1","status":"failed","error":"model crashed"}"#),
            ),
        ])
        .await;
        let (dir, input, output) = fixture();

        let err = remover(&base).remove_background(&input, &output).await.unwrap_err();

        assert!(matches!(err, ItemError::Service(ref msg) if msg.contains("model crashed")), "got {err:?}");
        assert!(entries(&dir.path().join("no_bg_images")).is_empty());
    }

    #[tokio::test]
    async fn api_rejection_is_service_error() {
        let base = serve(vec![(
            "/predictions",
            StubResponse::json(401, r#"{"detail":"Invalid token."}"#),
        )])
        .await;
        let (_dir, input, output) = fixture();

        let err = remover(&base).remove_background(&input, &output).await.unwrap_err();

        assert!(matches!(err, ItemError::Service(ref msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn polling_gives_up_after_limit() {
        let base = serve(vec![
            ("/predictions", StubResponse::json(201, STARTING)),
            ("/predictions/p1", StubResponse::json(200, STARTING)),
        ])
        .await;
        let (_dir, input, output) = fixture();

        let err = remover(&base).remove_background(&input, &output).await.unwrap_err();

        assert!(matches!(err, ItemError::Service(ref msg) if msg.contains("after 3 polls")));
    }

    #[tokio::test]
    async fn missing_input_is_rejected_before_any_request() {
        let dir = TempDir::new().unwrap();

        let err = remover("http://127.0.0.1:9")
            .remove_background(&dir.path().join("nope.jpg"), &dir.path().join("out.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ItemError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn format_is_detected_from_content_not_extension() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("1.jpg");
        let mut png = Vec::new();
        RgbaImage::from_pixel(3, 2, Rgba([0, 128, 255, 40]))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        std::fs::write(&input, &png).unwrap();

        let (temp, bytes) = convert_to_png(input, dir.path().to_path_buf()).await.unwrap();

        assert!(bytes.starts_with(b"\x89PNG"));
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(decoded.color().has_alpha());
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
        assert!(temp.path().is_file());
    }

    #[tokio::test]
    async fn undecodable_input_is_conversion_error() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("broken.jpg");
        std::fs::write(&input, b"not an image").unwrap();

        let err = remover("http://127.0.0.1:9")
            .remove_background(&input, &dir.path().join("out.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ItemError::ImageConversion { .. }));
        assert_eq!(entries(dir.path()), vec!["broken.jpg"]);
    }

    #[test]
    fn url_validation() {
        assert!(is_valid_url("https://replicate.delivery/x/out.png"));
        assert!(!is_valid_url("/relative/out.png"));
        assert!(!is_valid_url("data:image/png;base64,AAAA"));
    }
}
