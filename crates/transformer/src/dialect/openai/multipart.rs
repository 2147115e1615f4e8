//! `multipart/form-data` handling for the image edit and variation endpoints.
//!
//! Inbound bodies are parsed with `multer`; outbound bodies are assembled
//! directly, since the upstream form layout is fixed and small.

use bytes::Bytes;
use futures::stream;
use std::convert::Infallible;

use crate::error::Error;
use crate::messages::unified::{ImageFile, ImageOperation, ImageRequest};

/// Accepted upload MIME types.
pub(crate) const ALLOWED_MIME_TYPES: [&str; 4] =
    ["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Per-file size cap.
pub(crate) const MAX_FILE_BYTES: usize = 4 * 1024 * 1024;

/// Whole-request size cap.
pub(crate) const MAX_REQUEST_BYTES: usize = 20 * 1024 * 1024;

/// Maximum number of source images.
pub(crate) const MAX_IMAGES: usize = 10;

/// Parsed form: the model name travels beside the image payload.
#[derive(Debug)]
pub(crate) struct ImageForm {
    pub model: Option<String>,
    pub image: ImageRequest,
}

fn validate_file(file: &ImageFile) -> crate::Result<()> {
    if !ALLOWED_MIME_TYPES.contains(&file.media_type.as_str()) {
        return Err(Error::InvalidRequest(format!(
            "unsupported image type '{}'",
            file.media_type
        )));
    }

    if file.data.len() > MAX_FILE_BYTES {
        return Err(Error::InvalidRequest(format!(
            "file '{}' exceeds the 4 MiB limit",
            file.filename
        )));
    }

    Ok(())
}

/// Parse an inbound edit/variation body.
pub(crate) async fn parse_image_form(
    content_type: &str,
    body: Vec<u8>,
    operation: ImageOperation,
) -> crate::Result<ImageForm> {
    if body.len() > MAX_REQUEST_BYTES {
        return Err(Error::InvalidRequest(
            "request exceeds the 20 MiB limit".into(),
        ));
    }

    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| Error::InvalidRequest(format!("invalid multipart content type: {e}")))?;

    let body_stream = stream::once(async move { Ok::<Bytes, Infallible>(Bytes::from(body)) });
    let mut multipart = multer::Multipart::new(body_stream, boundary);

    let mut form = ImageForm {
        model: None,
        image: ImageRequest {
            operation,
            ..Default::default()
        },
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "image" | "image[]" => {
                let file = read_file(field).await?;
                validate_file(&file)?;

                if form.image.images.len() == MAX_IMAGES {
                    return Err(Error::InvalidRequest(format!(
                        "at most {MAX_IMAGES} images are accepted"
                    )));
                }
                form.image.images.push(file);
            }
            "mask" => {
                let file = read_file(field).await?;
                validate_file(&file)?;
                form.image.mask = Some(file);
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidRequest(format!("malformed field '{name}': {e}")))?;
                assign_text_field(&mut form, &name, value)?;
            }
        }
    }

    Ok(form)
}

async fn read_file(field: multer::Field<'_>) -> crate::Result<ImageFile> {
    let filename = field.file_name().unwrap_or("upload").to_string();
    let media_type = field
        .content_type()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_default();

    let data = field
        .bytes()
        .await
        .map_err(|e| Error::InvalidRequest(format!("failed reading file '{filename}': {e}")))?;

    Ok(ImageFile {
        filename,
        media_type,
        data: data.to_vec(),
    })
}

fn assign_text_field(form: &mut ImageForm, name: &str, value: String) -> crate::Result<()> {
    let image = &mut form.image;

    match name {
        "model" => form.model = Some(value),
        "prompt" => image.prompt = Some(value),
        "n" => image.n = Some(parse_number(name, &value)?),
        "size" => image.size = Some(value),
        "quality" => image.quality = Some(value),
        "style" => image.style = Some(value),
        "background" => image.background = Some(value),
        "moderation" => image.moderation = Some(value),
        "output_format" => image.output_format = Some(value),
        "output_compression" => image.output_compression = Some(parse_number(name, &value)?),
        "partial_images" => image.partial_images = Some(parse_number(name, &value)?),
        "response_format" => image.response_format = Some(value),
        "input_fidelity" => image.input_fidelity = Some(value),
        "user" => image.user = Some(value),
        other => {
            log::debug!("ignoring unknown image form field '{other}'");
        }
    }

    Ok(())
}

fn parse_number(name: &str, value: &str) -> crate::Result<u32> {
    value
        .parse()
        .map_err(|_| Error::InvalidRequest(format!("field '{name}' must be a number")))
}

/// Assemble an outbound edit/variation body. Returns the `Content-Type`
/// header value and the body bytes.
pub(crate) fn build_image_form(model: &str, image: &ImageRequest) -> (String, Vec<u8>) {
    let boundary = format!("relay-{}", uuid::Uuid::new_v4().simple());
    let mut body: Vec<u8> = Vec::new();

    let mut text_field = |name: &str, value: &str| {
        write_text_field(&mut body, &boundary, name, value);
    };

    if !model.is_empty() {
        text_field("model", model);
    }
    if let Some(prompt) = &image.prompt {
        text_field("prompt", prompt);
    }
    if let Some(n) = image.n {
        text_field("n", &n.to_string());
    }
    if let Some(size) = &image.size {
        text_field("size", size);
    }
    if let Some(quality) = &image.quality {
        text_field("quality", quality);
    }
    if let Some(background) = &image.background {
        text_field("background", background);
    }
    if let Some(output_format) = &image.output_format {
        text_field("output_format", output_format);
    }
    if let Some(output_compression) = image.output_compression {
        text_field("output_compression", &output_compression.to_string());
    }
    if let Some(response_format) = &image.response_format {
        text_field("response_format", response_format);
    }
    if let Some(input_fidelity) = &image.input_fidelity {
        text_field("input_fidelity", input_fidelity);
    }
    if let Some(user) = &image.user {
        text_field("user", user);
    }

    let image_field_name = if image.images.len() > 1 { "image[]" } else { "image" };
    for file in &image.images {
        write_file_field(&mut body, &boundary, image_field_name, file);
    }

    if let Some(mask) = &image.mask {
        write_file_field(&mut body, &boundary, "mask", mask);
    }

    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let content_type = format!("multipart/form-data; boundary={boundary}");
    (content_type, body)
}

fn write_text_field(body: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
            .as_bytes(),
    );
}

fn write_file_field(body: &mut Vec<u8>, boundary: &str, name: &str, file: &ImageFile) {
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            file.filename, file.media_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(&file.data);
    body.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(filename: &str, bytes: usize) -> ImageFile {
        ImageFile {
            filename: filename.into(),
            media_type: "image/png".into(),
            data: vec![0u8; bytes],
        }
    }

    #[tokio::test]
    async fn form_round_trips_through_parser() {
        let image = ImageRequest {
            operation: ImageOperation::Edit,
            prompt: Some("add a hat".into()),
            n: Some(2),
            size: Some("1024x1024".into()),
            images: vec![png("cat.png", 16)],
            mask: Some(png("mask.png", 8)),
            ..Default::default()
        };

        let (content_type, body) = build_image_form("gpt-image-1", &image);
        let form = parse_image_form(&content_type, body, ImageOperation::Edit)
            .await
            .unwrap();

        assert_eq!(form.model.as_deref(), Some("gpt-image-1"));
        assert_eq!(form.image.prompt.as_deref(), Some("add a hat"));
        assert_eq!(form.image.n, Some(2));
        assert_eq!(form.image.images.len(), 1);
        assert_eq!(form.image.images[0].filename, "cat.png");
        assert_eq!(form.image.mask.as_ref().unwrap().data.len(), 8);
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let image = ImageRequest {
            operation: ImageOperation::Edit,
            images: vec![png("big.png", MAX_FILE_BYTES + 1)],
            ..Default::default()
        };

        let (content_type, body) = build_image_form("", &image);
        let err = parse_image_form(&content_type, body, ImageOperation::Edit)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn disallowed_mime_type_is_rejected() {
        let image = ImageRequest {
            operation: ImageOperation::Edit,
            images: vec![ImageFile {
                filename: "doc.tiff".into(),
                media_type: "image/tiff".into(),
                data: vec![0u8; 4],
            }],
            ..Default::default()
        };

        let (content_type, body) = build_image_form("", &image);
        let err = parse_image_form(&content_type, body, ImageOperation::Edit)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
