use reqwest::{multipart, Client};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::config::CONFIG;
use crate::error::DrowsewatchError;

/// One detection as returned by the detector sidecar.
///
/// The sidecar reports floats; the wire boundary maps them onto the integer
/// representation used everywhere else (pixel coordinates, percent
/// confidence).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    /// Bounding box as x1, y1, x2, y2 in pixels.
    #[serde(deserialize_with = "deserialize_box")]
    pub r#box: [u32; 4],
    #[serde(deserialize_with = "float_to_u8")]
    pub cls: u8,
    pub cls_name: String,
    /// Confidence in percent.
    #[serde(deserialize_with = "deserialize_conf")]
    pub conf: u8,
}

fn float_to_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let f = f32::deserialize(deserializer)?;
    Ok(f as u8)
}

fn deserialize_box<'de, D>(deserializer: D) -> Result<[u32; 4], D::Error>
where
    D: Deserializer<'de>,
{
    let vec: Vec<f32> = Vec::deserialize(deserializer)?;
    if vec.len() != 4 {
        return Err(serde::de::Error::invalid_length(vec.len(), &"4 box coordinates"));
    }
    Ok([vec[0] as u32, vec[1] as u32, vec[2] as u32, vec[3] as u32])
}

fn deserialize_conf<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let f = f32::deserialize(deserializer)?;
    Ok((f * 100.0) as u8)
}

/// True when any detection carries the monitored label at or above the
/// confidence floor.
pub fn target_present(detections: &[DetectionResult], label: &str, minimum_confidence: u8) -> bool {
    detections
        .iter()
        .any(|detection| detection.cls_name == label && detection.conf >= minimum_confidence)
}

/// Client for the object-detection sidecar. The model itself lives behind
/// an HTTP endpoint; this service uploads one encoded frame and parses the
/// detection list.
#[derive(Debug, Clone, Default)]
pub struct DetectionService {
    client: Client,
}

impl DetectionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn do_detection(&self, jpeg: &[u8]) -> Result<Vec<DetectionResult>, DrowsewatchError> {
        let part = multipart::Part::bytes(jpeg.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&CONFIG.detection.api_url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let detections: Vec<DetectionResult> = response.json().await?;
        debug!("Detector returned {} detections", detections.len());
        Ok(detections)
    }
}

/// Test stand-in for the sidecar. Clones share state, so a test can keep a
/// handle and change the reported detections while an actor holds a copy.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockDetectionService {
    detections: std::sync::Arc<std::sync::Mutex<Vec<DetectionResult>>>,
    should_fail: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl MockDetectionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mock_detections(self, detections: Vec<DetectionResult>) -> Self {
        self.set_detections(detections);
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        self.set_failure(should_fail);
        self
    }

    pub fn set_detections(&self, detections: Vec<DetectionResult>) {
        *self.detections.lock().unwrap() = detections;
    }

    pub fn set_failure(&self, should_fail: bool) {
        self.should_fail
            .store(should_fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn do_detection(&self, _jpeg: &[u8]) -> Result<Vec<DetectionResult>, DrowsewatchError> {
        if self.should_fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(DrowsewatchError::Other("Mock detection failure".to_string()));
        }
        Ok(self.detections.lock().unwrap().clone())
    }
}
