/// Helpers for pulling structured payloads out of free-form model replies.
use base64::Engine as _;

/// Remove a surrounding Markdown code fence (```json … ```) and trim.
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string ("json", "JSON", …) up to the first newline.
        s = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    }
    if let Some(body) = s.trim_end().strip_suffix("```") {
        s = body;
    }
    s.trim()
}

/// PNG/JPEG bytes → `data:` URL for an `image_url` content part.
pub fn image_data_url(image_bytes: &[u8]) -> String {
    let mime = match image::guess_format(image_bytes) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        _ => "image/png",
    };
    let b64 = base64::engine::general_purpose::STANDARD.encode(image_bytes);
    format!("data:{mime};base64,{b64}")
}
