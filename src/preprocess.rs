use anyhow::{bail, Context};
use base64::{prelude::BASE64_STANDARD, Engine};
use burn::prelude::*;
use image::{imageops, imageops::FilterType, DynamicImage};

use crate::dataset::IMG_SIZE;

/// Sigma of the denoising blur applied before normalization.
const BLUR_SIGMA: f32 = 0.8;

/// Decode a base64 image payload, tolerating a browser `data:` URI prefix.
pub fn decode_image(payload: &str) -> anyhow::Result<DynamicImage> {
    let encoded = strip_data_uri(payload);
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .context("invalid base64 image payload")?;

    image::load_from_memory(&bytes).context("unsupported image data")
}

fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        payload
            .split_once(',')
            .map(|(_, encoded)| encoded)
            .unwrap_or(payload)
    } else {
        payload
    }
}

/// Turn a decoded image into the `[1, 1, 28, 28]` tensor the model expects.
///
/// Grayscale, invert to MNIST polarity (white digit on black), blur,
/// scale to `[0, 1]`, then standardize by the image's own statistics.
pub fn to_input_tensor<B: Backend>(
    image: &DynamicImage,
    device: &B::Device,
) -> anyhow::Result<Tensor<B, 4>> {
    let size = IMG_SIZE as u32;
    let mut gray = image
        .resize_exact(size, size, FilterType::Triangle)
        .to_luma8();
    imageops::invert(&mut gray);
    let gray = imageops::blur(&gray, BLUR_SIGMA);

    let pixels: Vec<f32> = gray.pixels().map(|p| f32::from(p.0[0]) / 255.0).collect();

    let mean = pixels.iter().sum::<f32>() / pixels.len() as f32;
    let variance =
        pixels.iter().map(|p| (p - mean) * (p - mean)).sum::<f32>() / pixels.len() as f32;
    let std = variance.sqrt();
    if std <= f32::EPSILON {
        bail!("image has no contrast");
    }

    let standardized: Vec<f32> = pixels.iter().map(|p| (p - mean) / std).collect();

    Ok(
        Tensor::<B, 1>::from_data(standardized.as_slice(), device).reshape([
            1,
            1,
            IMG_SIZE,
            IMG_SIZE,
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    type TestBackend = burn::backend::NdArray<f32>;

    fn png_base64(pixel: impl Fn(u32, u32) -> u8) -> String {
        let image = GrayImage::from_fn(28, 28, |x, y| Luma([pixel(x, y)]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();

        BASE64_STANDARD.encode(buffer.into_inner())
    }

    fn gradient() -> String {
        png_base64(|x, y| ((x * 7 + y * 3) % 256) as u8)
    }

    #[test]
    fn data_uri_prefix_is_stripped() {
        let bare = gradient();
        let prefixed = format!("data:image/png;base64,{bare}");

        let from_bare = decode_image(&bare).unwrap();
        let from_prefixed = decode_image(&prefixed).unwrap();

        assert_eq!(from_bare.to_luma8(), from_prefixed.to_luma8());
    }

    #[test]
    fn preprocessing_is_deterministic() {
        let device = Default::default();
        let image = decode_image(&gradient()).unwrap();

        let first = to_input_tensor::<TestBackend>(&image, &device).unwrap();
        let second = to_input_tensor::<TestBackend>(&image, &device).unwrap();

        first.into_data().assert_approx_eq(&second.into_data(), 5);
    }

    #[test]
    fn input_tensor_has_model_shape_and_zero_mean() {
        let device = Default::default();
        let image = decode_image(&gradient()).unwrap();

        let tensor = to_input_tensor::<TestBackend>(&image, &device).unwrap();

        assert_eq!(tensor.dims(), [1, 1, 28, 28]);
        let mean = tensor.mean().into_scalar();
        assert!(mean.abs() < 1.0e-4);
    }

    #[test]
    fn uniform_image_is_rejected() {
        let device = Default::default();
        let image = decode_image(&png_base64(|_, _| 128)).unwrap();

        let result = to_input_tensor::<TestBackend>(&image, &device);

        assert!(result.is_err());
    }

    #[test]
    fn malformed_base64_is_rejected() {
        assert!(decode_image("not-valid-base64!!!").is_err());
    }

    #[test]
    fn undecodable_image_bytes_are_rejected() {
        let payload = BASE64_STANDARD.encode(b"these bytes are not an image");

        assert!(decode_image(&payload).is_err());
    }
}
