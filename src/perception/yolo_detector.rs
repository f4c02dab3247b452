/// ONNX YOLOv8 inference for UI element detection.
///
/// Loads a YOLOv8 ONNX model and runs detection on screen captures. Boxes are
/// returned in the capture's interaction coordinate space, in proposal order
/// after per-class NMS.
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use crate::errors::{SeeTapError, SeeTapResult};
use crate::perception::traits::PerceptionProvider;
use crate::perception::types::{BoundingBox, Detection, ScreenCapture};

const INPUT_SIZE: u32 = 640;

/// Raw detection in source-image pixels, before NMS.
#[derive(Debug, Clone)]
struct RawDetection {
    bbox: BoundingBox,
    confidence: f32,
    class_id: usize,
}

/// Letterbox geometry needed to undo preprocessing.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    pad_x: f32,
    pad_y: f32,
    scale: f32,
}

pub struct YoloDetector {
    session: Arc<Mutex<Session>>,
    conf_threshold: f32,
    iou_threshold: f32,
    class_names: Vec<String>,
}

impl YoloDetector {
    pub fn new(
        model_path: &str,
        conf_threshold: f32,
        iou_threshold: f32,
        class_names: Vec<String>,
    ) -> SeeTapResult<Self> {
        if !Path::new(model_path).exists() {
            return Err(SeeTapError::Config(format!("YOLO model not found at '{model_path}'")));
        }
        let session = Session::builder()
            .map_err(|e| SeeTapError::Perception(format!("ort session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SeeTapError::Perception(format!("ort opt-level: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| SeeTapError::Perception(format!("ort load model: {e}")))?;

        tracing::info!(path = %model_path, classes = class_names.len(), "YOLO detector loaded");
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            conf_threshold,
            iou_threshold,
            class_names,
        })
    }

    fn detect_blocking(
        session: &Mutex<Session>,
        image_bytes: &[u8],
        conf_threshold: f32,
    ) -> SeeTapResult<(Vec<RawDetection>, u32, u32)> {
        let img = image::load_from_memory(image_bytes)?;
        let (orig_w, orig_h) = (img.width(), img.height());
        let (input, letterbox) = preprocess(&img);

        let input_value = Tensor::from_array(input)
            .map_err(|e| SeeTapError::Perception(format!("ort tensor: {e}")))?;

        let output = {
            let mut session = session
                .lock()
                .map_err(|_| SeeTapError::Perception("detector session poisoned".into()))?;
            let outputs = session
                .run(ort::inputs![input_value])
                .map_err(|e| SeeTapError::Perception(format!("ort run: {e}")))?;
            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| SeeTapError::Perception(format!("extract tensor: {e}")))?
                .to_owned()
        };

        let raw = decode_output(&output.view(), letterbox, orig_w, orig_h, conf_threshold)?;
        Ok((raw, orig_w, orig_h))
    }

    fn label_for(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("Element {class_id}"))
    }
}

#[async_trait]
impl PerceptionProvider for YoloDetector {
    fn name(&self) -> &str {
        "yolo"
    }

    async fn detect(&self, capture: &ScreenCapture) -> SeeTapResult<Vec<Detection>> {
        let session = self.session.clone();
        let bytes = capture.image_bytes.clone();
        let conf = self.conf_threshold;

        // Inference is CPU-bound.
        let (raw, img_w, img_h) =
            tokio::task::spawn_blocking(move || Self::detect_blocking(&session, &bytes, conf))
                .await
                .map_err(|e| SeeTapError::Perception(format!("join: {e}")))??;

        let kept = nms(&raw, self.iou_threshold);
        let sx = capture.width as f32 / img_w.max(1) as f32;
        let sy = capture.height as f32 / img_h.max(1) as f32;

        let detections: Vec<Detection> = kept
            .into_iter()
            .map(|i| {
                let r = &raw[i];
                Detection::new(
                    BoundingBox::new(r.bbox.x1 * sx, r.bbox.y1 * sy, r.bbox.x2 * sx, r.bbox.y2 * sy),
                    self.label_for(r.class_id),
                    r.confidence,
                )
            })
            .collect();

        tracing::debug!(count = detections.len(), "YOLO detections");
        Ok(detections)
    }
}

// ── Pre-processing ──────────────────────────────────────────────────────────

/// Resize + letterbox + normalise → NCHW f32 tensor.
fn preprocess(img: &image::DynamicImage) -> (Array4<f32>, Letterbox) {
    let sz = INPUT_SIZE;
    let (ow, oh) = (img.width() as f32, img.height() as f32);
    let scale = (sz as f32 / ow).min(sz as f32 / oh);
    let nw = ((ow * scale).round() as u32).clamp(1, sz);
    let nh = ((oh * scale).round() as u32).clamp(1, sz);
    let pad_x = (sz - nw) as f32 / 2.0;
    let pad_y = (sz - nh) as f32 / 2.0;

    let rgb = img
        .resize_exact(nw, nh, image::imageops::FilterType::CatmullRom)
        .to_rgb8();

    let mut canvas = image::RgbImage::from_pixel(sz, sz, image::Rgb([114, 114, 114]));
    image::imageops::overlay(&mut canvas, &rgb, pad_x.round() as i64, pad_y.round() as i64);

    let mut tensor = Array4::<f32>::zeros((1, 3, sz as usize, sz as usize));
    for (x, y, p) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = p[c] as f32 / 255.0;
        }
    }

    (tensor, Letterbox { pad_x, pad_y, scale })
}

// ── Post-processing ─────────────────────────────────────────────────────────

/// YOLOv8 output is `[1, 4 + num_classes, num_proposals]`.
fn decode_output(
    output: &ndarray::ArrayViewD<f32>,
    lb: Letterbox,
    orig_w: u32,
    orig_h: u32,
    conf_threshold: f32,
) -> SeeTapResult<Vec<RawDetection>> {
    let shape = output.shape();
    if shape.len() < 3 || shape[1] < 5 {
        return Err(SeeTapError::Perception(format!("unexpected output shape: {shape:?}")));
    }
    let num_classes = shape[1] - 4;
    let num_preds = shape[2];

    let mut detections = Vec::new();
    for i in 0..num_preds {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, output[[0, 4 + c, i]]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < conf_threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        let unpad = |v: f32, pad: f32, max: u32| ((v - pad) / lb.scale).clamp(0.0, max as f32);
        detections.push(RawDetection {
            bbox: BoundingBox::new(
                unpad(cx - w / 2.0, lb.pad_x, orig_w),
                unpad(cy - h / 2.0, lb.pad_y, orig_h),
                unpad(cx + w / 2.0, lb.pad_x, orig_w),
                unpad(cy + h / 2.0, lb.pad_y, orig_h),
            ),
            confidence: score,
            class_id,
        });
    }
    Ok(detections)
}

/// Greedy per-class NMS. Returned indices keep proposal order.
fn nms(dets: &[RawDetection], iou_threshold: f32) -> Vec<usize> {
    let mut by_conf: Vec<usize> = (0..dets.len()).collect();
    by_conf.sort_by(|&a, &b| {
        dets[b]
            .confidence
            .partial_cmp(&dets[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut suppressed = vec![false; dets.len()];
    for (rank, &i) in by_conf.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        for &j in &by_conf[rank + 1..] {
            if !suppressed[j]
                && dets[i].class_id == dets[j].class_id
                && dets[i].bbox.iou(&dets[j].bbox) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }

    (0..dets.len()).filter(|&i| !suppressed[i]).collect()
}
