//! Image payload helpers shared by the client, the backend and popup rendering.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Error decoding a base64 or `data:` URL image payload.
#[derive(Debug)]
pub struct ImageDecodeError {
    pub message: String,
}

impl std::fmt::Display for ImageDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ImageDecodeError {}

pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes plain base64 or a `data:<mime>;base64,<payload>` URL.
pub fn decode_image(data: &str) -> Result<Vec<u8>, ImageDecodeError> {
    let payload = match data.trim().strip_prefix("data:") {
        Some(rest) => {
            let Some((meta, body)) = rest.split_once(',') else {
                return Err(ImageDecodeError {
                    message: "data URL has no payload".to_string(),
                });
            };
            if !meta.ends_with(";base64") {
                return Err(ImageDecodeError {
                    message: "data URL is not base64 encoded".to_string(),
                });
            }
            body
        }
        None => data.trim(),
    };

    STANDARD.decode(payload).map_err(|e| ImageDecodeError {
        message: format!("invalid base64 image: {e}"),
    })
}

/// Best-effort content type from the leading magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "application/octet-stream",
    }
}

/// `data:` URL suitable for an `<img src>` attribute.
pub fn data_url(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", sniff_mime(bytes), encode_image(bytes))
}
