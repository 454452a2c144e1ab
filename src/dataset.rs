use burn::{
    data::{dataloader::batcher::Batcher, dataset::vision::MnistItem},
    prelude::*,
    tensor::ElementConversion,
};
use rand::Rng;

pub const IMG_SIZE: usize = 28;

// MNIST training-set statistics.
const MEAN: f32 = 0.1307;
const STD: f32 = 0.3081;

/// Randomized geometric perturbation applied to training images only.
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Maximum rotation in degrees, sampled symmetrically around zero.
    #[config(default = 10.0)]
    pub max_rotation: f64,
    /// Maximum shift as a fraction of the image size.
    #[config(default = 0.1)]
    pub max_shift: f64,
    /// Maximum zoom deviation from 1.0.
    #[config(default = 0.1)]
    pub max_zoom: f64,
}

impl AugmentationConfig {
    pub fn init(&self) -> Augmentation {
        Augmentation {
            max_rotation: self.max_rotation,
            max_shift: self.max_shift,
            max_zoom: self.max_zoom,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Augmentation {
    max_rotation: f64,
    max_shift: f64,
    max_zoom: f64,
}

impl Augmentation {
    /// Rotation, shift and zoom realized as a single affine warp.
    pub fn apply(
        &self,
        image: &[[f32; IMG_SIZE]; IMG_SIZE],
        rng: &mut impl Rng,
    ) -> [[f32; IMG_SIZE]; IMG_SIZE] {
        let angle = rng
            .gen_range(-self.max_rotation..=self.max_rotation)
            .to_radians();
        let zoom = 1.0 + rng.gen_range(-self.max_zoom..=self.max_zoom);
        let shift = IMG_SIZE as f64 * self.max_shift;
        let dx = rng.gen_range(-shift..=shift);
        let dy = rng.gen_range(-shift..=shift);

        warp(image, angle, zoom, dx, dy)
    }
}

fn warp(
    image: &[[f32; IMG_SIZE]; IMG_SIZE],
    angle: f64,
    zoom: f64,
    dx: f64,
    dy: f64,
) -> [[f32; IMG_SIZE]; IMG_SIZE] {
    let center = (IMG_SIZE as f64 - 1.0) / 2.0;
    let (sin, cos) = angle.sin_cos();
    let mut out = [[0f32; IMG_SIZE]; IMG_SIZE];

    for (y, row) in out.iter_mut().enumerate() {
        for (x, pixel) in row.iter_mut().enumerate() {
            // Map the output pixel back to its source location.
            let u = (x as f64 - center - dx) / zoom;
            let v = (y as f64 - center - dy) / zoom;
            let src_x = u * cos + v * sin + center;
            let src_y = v * cos - u * sin + center;
            *pixel = sample(image, src_x, src_y);
        }
    }

    out
}

/// Bilinear sample with zero fill outside the image.
fn sample(image: &[[f32; IMG_SIZE]; IMG_SIZE], x: f64, y: f64) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let tx = (x - x0) as f32;
    let ty = (y - y0) as f32;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let at = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x >= IMG_SIZE as i64 || y >= IMG_SIZE as i64 {
            0.0
        } else {
            image[y as usize][x as usize]
        }
    };

    let top = at(x0, y0) * (1.0 - tx) + at(x0 + 1, y0) * tx;
    let bottom = at(x0, y0 + 1) * (1.0 - tx) + at(x0 + 1, y0 + 1) * tx;
    top * (1.0 - ty) + bottom * ty
}

#[derive(Clone)]
pub struct MnistBatcher<B: Backend> {
    device: B::Device,
    augmentation: Option<Augmentation>,
}

#[derive(Debug, Clone)]
pub struct MnistBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> MnistBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            augmentation: None,
        }
    }

    pub fn with_augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = Some(augmentation);
        self
    }
}

impl<B: Backend> Batcher<MnistItem, MnistBatch<B>> for MnistBatcher<B> {
    fn batch(&self, items: Vec<MnistItem>) -> MnistBatch<B> {
        let mut rng = rand::thread_rng();
        let mut images = Vec::with_capacity(items.len());
        let mut targets = Vec::with_capacity(items.len());

        for item in items {
            let pixels = match &self.augmentation {
                Some(augmentation) => augmentation.apply(&item.image, &mut rng),
                None => item.image,
            };

            let image = Tensor::<B, 2>::from_data(
                TensorData::from(pixels).convert::<B::FloatElem>(),
                &self.device,
            )
            .reshape([1, 1, IMG_SIZE, IMG_SIZE]);
            images.push(((image / 255) - MEAN) / STD);

            targets.push(Tensor::<B, 1, Int>::from_data(
                [(item.label as i64).elem::<B::IntElem>()],
                &self.device,
            ));
        }

        let images = Tensor::cat(images, 0);
        let targets = Tensor::cat(targets, 0);

        MnistBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    fn item(label: u8) -> MnistItem {
        let mut image = [[0f32; IMG_SIZE]; IMG_SIZE];
        for (y, row) in image.iter_mut().enumerate() {
            for (x, pixel) in row.iter_mut().enumerate() {
                *pixel = ((x + y * IMG_SIZE) % 256) as f32;
            }
        }
        MnistItem { image, label }
    }

    #[test]
    fn batcher_stacks_images_and_targets() {
        let batcher = MnistBatcher::<TestBackend>::new(Default::default());

        let batch = batcher.batch(vec![item(3), item(7)]);

        assert_eq!(batch.images.dims(), [2, 1, IMG_SIZE, IMG_SIZE]);
        assert_eq!(batch.targets.dims(), [2]);
        let targets = batch.targets.into_data();
        assert_eq!(targets.as_slice::<i64>().unwrap(), &[3, 7]);
    }

    #[test]
    fn batching_is_deterministic_without_augmentation() {
        let batcher = MnistBatcher::<TestBackend>::new(Default::default());

        let first = batcher.batch(vec![item(1)]);
        let second = batcher.batch(vec![item(1)]);

        first
            .images
            .into_data()
            .assert_approx_eq(&second.images.into_data(), 5);
    }

    #[test]
    fn zeroed_augmentation_is_the_identity() {
        let augmentation = AugmentationConfig::new()
            .with_max_rotation(0.0)
            .with_max_shift(0.0)
            .with_max_zoom(0.0)
            .init();
        let mut rng = rand::thread_rng();

        let image = item(0).image;
        let warped = augmentation.apply(&image, &mut rng);

        assert_eq!(warped, image);
    }

    #[test]
    fn augmentation_preserves_shape_and_value_range() {
        let augmentation = AugmentationConfig::new().init();
        let mut rng = rand::thread_rng();

        let warped = augmentation.apply(&item(0).image, &mut rng);

        assert!(warped
            .iter()
            .flatten()
            .all(|pixel| (0.0..=255.0).contains(pixel) && pixel.is_finite()));
    }
}
