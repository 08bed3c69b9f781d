use anyhow::{Result, anyhow};
use std::path::Path;

/// Image types accepted as avatars
pub const ALLOWED_IMAGE_MIMES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<()> {
    if size == 0 {
        return Err(anyhow!(ValidationError {
            code: "EMPTY_FILE",
            message: "File appears to be empty".to_string(),
        }));
    }

    if size > max_size {
        return Err(anyhow!(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "File size {} bytes exceeds maximum allowed {} bytes ({} MB)",
                size,
                max_size,
                max_size / 1024 / 1024
            ),
        }));
    }
    Ok(())
}

/// Normalizes a declared content type down to its essence (`image/jpeg`),
/// folding the common browser aliases.
pub fn normalize_mime(content_type: &str) -> Option<String> {
    let parsed: mime::Mime = content_type.trim().parse().ok()?;
    let essence = parsed.essence_str().to_lowercase();

    Some(match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => essence,
    })
}

/// Checks the declared type and the magic bytes of an avatar upload.
///
/// Returns the MIME type to record: the sniffed one when the bytes disagree
/// with what the client claimed, since the preview data URL must match the
/// actual content.
pub fn validate_avatar_image(content_type: Option<&str>, data: &[u8]) -> Result<String> {
    let declared = content_type.and_then(normalize_mime);

    if let Some(declared) = &declared {
        let is_image = declared
            .parse::<mime::Mime>()
            .map(|m| m.type_() == mime::IMAGE)
            .unwrap_or(false);
        if !is_image {
            return Err(anyhow!(ValidationError {
                code: "INVALID_MIME_TYPE",
                message: format!("MIME type '{}' is not an image", declared),
            }));
        }
    }

    let detected = infer::get(data).map(|kind| kind.mime_type().to_string());

    let effective = match (declared, detected) {
        (_, Some(detected)) => detected,
        (Some(_), None) | (None, None) => {
            return Err(anyhow!(ValidationError {
                code: "UNRECOGNIZED_IMAGE",
                message: "File content is not a recognized image".to_string(),
            }));
        }
    };

    if !ALLOWED_IMAGE_MIMES.contains(&effective.as_str()) {
        return Err(anyhow!(ValidationError {
            code: "INVALID_MIME_TYPE",
            message: format!(
                "Image type '{}' is not allowed. Use JPEG, PNG, GIF or WebP.",
                effective
            ),
        }));
    }

    Ok(effective)
}

/// Strips any path components and reserved characters from a client file name.
pub fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.').to_string();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.is_empty() {
        "avatar".to_string()
    } else {
        sanitized
    }
}

/// Extension to keep on the staged copy. Only short ASCII alphanumeric
/// extensions survive so the staged name can never escape the staging dir.
pub fn staged_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

    #[test]
    fn test_file_size_limits() {
        assert!(validate_file_size(1024, 2048).is_ok());
        assert!(validate_file_size(2048, 2048).is_ok());

        let err = validate_file_size(4096, 2048).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>().unwrap().code,
            "FILE_TOO_LARGE"
        );

        let err = validate_file_size(0, 2048).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>().unwrap().code,
            "EMPTY_FILE"
        );
    }

    #[test]
    fn test_normalize_mime() {
        assert_eq!(normalize_mime("image/jpg").as_deref(), Some("image/jpeg"));
        assert_eq!(
            normalize_mime("Image/PNG; charset=binary").as_deref(),
            Some("image/png")
        );
        assert_eq!(normalize_mime("not a mime"), None);
    }

    #[test]
    fn test_accepts_real_images() {
        assert_eq!(
            validate_avatar_image(Some("image/jpeg"), JPEG_HEADER).unwrap(),
            "image/jpeg"
        );
        assert_eq!(validate_avatar_image(None, PNG_HEADER).unwrap(), "image/png");
    }

    #[test]
    fn test_sniffed_type_wins_over_declared() {
        assert_eq!(
            validate_avatar_image(Some("image/gif"), PNG_HEADER).unwrap(),
            "image/png"
        );
    }

    #[test]
    fn test_rejects_non_images() {
        let err = validate_avatar_image(Some("application/pdf"), b"%PDF-1.7 ...").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>().unwrap().code,
            "INVALID_MIME_TYPE"
        );

        let err = validate_avatar_image(Some("image/png"), b"just some text").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>().unwrap().code,
            "UNRECOGNIZED_IMAGE"
        );

        // PDF bytes dressed up as an image
        let err = validate_avatar_image(Some("image/png"), b"%PDF-1.7 ...").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>().unwrap().code,
            "INVALID_MIME_TYPE"
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("a:b*c?.png"), "a_b_c_.png");
        assert_eq!(sanitize_filename(".hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename(""), "avatar");
    }

    #[test]
    fn test_staged_extension() {
        assert_eq!(staged_extension("me.JPG").as_deref(), Some("jpg"));
        assert_eq!(staged_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(staged_extension("noext"), None);
        assert_eq!(staged_extension("weird.p/ng"), None);
        assert_eq!(staged_extension("x.verylongextension"), None);
    }
}
