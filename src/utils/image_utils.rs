use ab_glyph::{FontVec, PxScale};
use chrono::{DateTime, Local};
use image::{DynamicImage, ImageFormat, Rgba, RgbImage};
use lazy_static::lazy_static;
use std::io::Cursor;
use tracing::warn;

use crate::config::CONFIG;
use crate::error::DrowsewatchError;
use crate::utils::detection_utils::DetectionResult;

const LABEL_SCALE: PxScale = PxScale { x: 25.0, y: 25.0 };

lazy_static! {
    /// Label font, loaded once from the configured path. Annotation must
    /// never fail a tick, so a missing font only disables text labels.
    static ref FONT: Option<FontVec> = load_font();
}

fn load_font() -> Option<FontVec> {
    let path = &CONFIG.output.font_path;
    match std::fs::read(path) {
        Ok(bytes) => match FontVec::try_from_vec(bytes) {
            Ok(font) => Some(font),
            Err(err) => {
                warn!("Invalid font file {}: {}, drawing boxes without labels", path, err);
                None
            }
        },
        Err(err) => {
            warn!("Could not read font {}: {}, drawing boxes without labels", path, err);
            None
        }
    }
}

/// Builds an owned image from one packed RGB24 capture buffer.
pub fn frame_to_image(data: &[u8], width: u32, height: u32) -> Result<DynamicImage, DrowsewatchError> {
    let buffer = RgbImage::from_raw(width, height, data.to_vec()).ok_or_else(|| {
        DrowsewatchError::Other(format!(
            "Frame buffer of {} bytes does not match {}x{}",
            data.len(),
            width,
            height
        ))
    })?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

/// Draws every detection's bounding box and label onto the frame. The
/// monitored label gets the target color, everything else the secondary
/// color.
pub fn draw_detections(image: &mut DynamicImage, detections: &[DetectionResult]) {
    for detection in detections {
        let color = if detection.cls_name == CONFIG.detection.target_label {
            Rgba(CONFIG.output.target_color)
        } else {
            Rgba(CONFIG.output.other_color)
        };

        let [x1, y1, x2, y2] = detection.r#box;
        let (x1, y1) = (x1.min(image.width()), y1.min(image.height()));
        let (x2, y2) = (x2.min(image.width()), y2.min(image.height()));
        let box_width = x2.saturating_sub(x1);
        let box_height = y2.saturating_sub(y1);
        if box_width == 0 || box_height == 0 {
            continue;
        }

        for i in 0..CONFIG.output.line_thickness.min(box_width / 2).max(1) {
            if box_width <= 2 * i || box_height <= 2 * i {
                break;
            }
            imageproc::drawing::draw_hollow_rect_mut(
                image,
                imageproc::rect::Rect::at((x1 + i) as i32, (y1 + i) as i32)
                    .of_size(box_width - 2 * i, box_height - 2 * i),
                color,
            );
        }

        let label = format!("{} ({}%)", detection.cls_name, detection.conf);
        draw_label(image, &label, x1, y1, color);
    }
}

fn draw_label(image: &mut DynamicImage, label: &str, box_x: u32, box_y: u32, color: Rgba<u8>) {
    let Some(font) = FONT.as_ref() else {
        return;
    };

    let (text_width, text_height) = imageproc::drawing::text_size(LABEL_SCALE, font, label);
    let padding_x = 4;
    let padding_y = 2;
    let tag_width = text_width + 2 * padding_x;
    let tag_height = text_height + 2 * padding_y;

    // Prefer the tag above the box; fall back to inside the top edge when
    // the detection touches the top of the frame.
    let tag_y = box_y.saturating_sub(tag_height);
    let tag_x = box_x.min(image.width().saturating_sub(tag_width));

    imageproc::drawing::draw_filled_rect_mut(
        image,
        imageproc::rect::Rect::at(tag_x as i32, tag_y as i32).of_size(tag_width, tag_height),
        color,
    );
    imageproc::drawing::draw_text_mut(
        image,
        Rgba(CONFIG.output.text_color),
        (tag_x + padding_x) as i32,
        (tag_y + padding_y) as i32,
        LABEL_SCALE,
        font,
        label,
    );
}

/// Stamps the capture time onto a streamed frame, top-left corner.
pub fn draw_timestamp(image: &mut DynamicImage, timestamp: DateTime<Local>) {
    let Some(font) = FONT.as_ref() else {
        return;
    };
    let text = timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
    imageproc::drawing::draw_text_mut(
        image,
        Rgba(CONFIG.output.text_color),
        10,
        10,
        LABEL_SCALE,
        font,
        &text,
    );
}

/// Encodes a frame for the MJPEG stream and for snapshot upload.
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, DrowsewatchError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Jpeg)?;
    Ok(buffer.into_inner())
}
