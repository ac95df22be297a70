use image::{GenericImageView, GrayImage, ImageBuffer, Pixel, RgbaImage};

use crate::calibration::Rect;

/// Crops `rect` out of `img`, clamped to the image bounds.
///
/// Returns `None` when the clamped rectangle is empty, so callers can treat a
/// region that falls entirely off-frame the same as a zero-sized one.
pub fn crop_rect<I>(img: &I, rect: Rect) -> Option<ImageBuffer<I::Pixel, Vec<<I::Pixel as Pixel>::Subpixel>>>
where
    I: GenericImageView + 'static,
    I::Pixel: 'static,
{
    let (w, h) = img.dimensions();
    let clipped = rect.clip(w, h)?;
    Some(
        image::imageops::crop_imm(
            img,
            clipped.x as u32,
            clipped.y as u32,
            clipped.w as u32,
            clipped.h as u32,
        )
        .to_image(),
    )
}

/// Grayscale copy of a captured frame or region.
pub fn to_gray(img: &RgbaImage) -> GrayImage {
    image::imageops::grayscale(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        ImageBuffer::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn test_crop_rect() {
        let img = gradient(100, 200);
        let cropped = crop_rect(&img, Rect::new(10, 50, 50, 20)).unwrap();

        assert_eq!(cropped.dimensions(), (50, 20));
        // Top-left pixel should be (10, 50) from original
        assert_eq!(cropped.get_pixel(0, 0)[0], 10);
        assert_eq!(cropped.get_pixel(0, 0)[1], 50);
    }

    #[test]
    fn test_crop_rect_clamps() {
        let img = gradient(100, 100);
        let cropped = crop_rect(&img, Rect::new(80, -10, 50, 30)).unwrap();

        assert_eq!(cropped.dimensions(), (20, 20));
        assert_eq!(cropped.get_pixel(0, 0)[0], 80);
        assert_eq!(cropped.get_pixel(0, 0)[1], 0);
    }

    #[test]
    fn test_crop_rect_off_frame() {
        let img = gradient(100, 100);
        assert!(crop_rect(&img, Rect::new(150, 150, 10, 10)).is_none());
        assert!(crop_rect(&img, Rect::new(10, 10, 0, 10)).is_none());
    }

    #[test]
    fn test_crop_gray() {
        let img = to_gray(&gradient(40, 40));
        let cropped = crop_rect(&img, Rect::new(5, 5, 10, 10)).unwrap();
        assert_eq!(cropped.dimensions(), (10, 10));
    }
}
