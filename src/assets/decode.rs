use std::sync::Arc;

use crate::{
    assets::SlideImage,
    foundation::{
        error::{SlidecastError, SlidecastResult},
        math::premultiply_rgba8_in_place,
    },
    model::ImageInput,
};

/// Decode encoded bytes, sniffing the container format.
pub fn decode_image(bytes: &[u8]) -> SlidecastResult<SlideImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| SlidecastError::image_decode(format!("unrecognized image data: {e}")))?;
    into_slide_image(decoded)
}

/// Decode an uploaded image, trusting its MIME type when `image` knows it.
pub fn decode_input(input: &ImageInput) -> SlidecastResult<SlideImage> {
    if !input.is_image() {
        return Err(SlidecastError::image_decode(format!(
            "unsupported mime type '{}'",
            input.mime_type
        )));
    }
    match image::ImageFormat::from_mime_type(&input.mime_type) {
        Some(format) => {
            let decoded = image::load_from_memory_with_format(&input.bytes, format)
                .map_err(|e| {
                    SlidecastError::image_decode(format!("{} payload: {e}", input.mime_type))
                })?;
            into_slide_image(decoded)
        }
        None => decode_image(&input.bytes),
    }
}

fn into_slide_image(decoded: image::DynamicImage) -> SlidecastResult<SlideImage> {
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(SlidecastError::image_decode("image has no pixels"));
    }
    // vello_cpu pixmaps are addressed with u16 sides.
    if u16::try_from(width).is_err() || u16::try_from(height).is_err() {
        return Err(SlidecastError::image_decode(format!(
            "image {width}x{height} is too large to draw"
        )));
    }

    let mut pixels = decoded.into_rgba8().into_raw();
    premultiply_rgba8_in_place(&mut pixels);
    Ok(SlideImage {
        width,
        height,
        rgba8_premul: Arc::new(pixels),
    })
}
