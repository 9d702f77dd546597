use std::borrow::Cow;
use std::io::Cursor;

use anyhow::anyhow;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::processor::ImageKind;

/// Decodes an image, guessing the format from its contents.
pub fn decode(data: &[u8]) -> anyhow::Result<DynamicImage> {
    Ok(image::load_from_memory(data)?)
}

/// Encodes an image as `kind`.
///
/// `quality` ranges from 0.0 to 100.0 and is ignored by lossless formats.
pub fn encode(img: &DynamicImage, kind: ImageKind, quality: f32) -> anyhow::Result<Bytes> {
    match kind {
        ImageKind::Webp => encode_webp(img, quality),
        ImageKind::Jpeg => {
            let mut buff = Vec::new();
            let quality = quality.clamp(1.0, 100.0) as u8;
            JpegEncoder::new_with_quality(&mut buff, quality).encode_image(&img.to_rgb8())?;
            Ok(Bytes::from(buff))
        },
        ImageKind::Png => {
            let mut buff = Cursor::new(Vec::new());
            img.write_to(&mut buff, image::ImageFormat::from(kind))?;
            Ok(Bytes::from(buff.into_inner()))
        },
    }
}

fn encode_webp(img: &DynamicImage, quality: f32) -> anyhow::Result<Bytes> {
    // libwebp only takes 8 bit RGB(A) buffers.
    let img: Cow<DynamicImage> = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(img),
        other if other.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(other.to_rgba8())),
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    };

    let encoder = webp::Encoder::from_image(&img).map_err(|e| anyhow!("{}", e))?;
    let encoded = encoder.encode(quality);

    Ok(Bytes::copy_from_slice(&encoded))
}
