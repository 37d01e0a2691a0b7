//! Image preprocessing.

use image::GrayImage;

/// Global histogram equalization.
///
/// Maps each intensity through the normalized cumulative histogram so the
/// output spans the full `0..=255` range. Constant images are returned
/// unchanged.
pub fn equalize_histogram(image: &GrayImage) -> GrayImage {
    let mut hist = [0u64; 256];
    for p in image.pixels() {
        hist[p.0[0] as usize] += 1;
    }

    let total: u64 = hist.iter().sum();
    let mut cdf = [0u64; 256];
    let mut acc = 0;
    for (c, h) in cdf.iter_mut().zip(hist.iter()) {
        acc += h;
        *c = acc;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        return image.clone();
    }

    let denom = (total - cdf_min) as f64;
    let lut: Vec<u8> = cdf
        .iter()
        .map(|&c| {
            let v = (c.saturating_sub(cdf_min)) as f64 / denom * 255.0;
            v.round().clamp(0.0, 255.0) as u8
        })
        .collect();

    let mut out = image.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn stretches_narrow_range() {
        let img = GrayImage::from_fn(4, 4, |x, _| Luma([100 + x as u8]));
        let eq = equalize_histogram(&img);
        let values: Vec<u8> = eq.pixels().map(|p| p.0[0]).collect();
        assert_eq!(*values.iter().min().unwrap(), 0);
        assert_eq!(*values.iter().max().unwrap(), 255);
        assert_eq!(eq.get_pixel(1, 0).0[0], 85);
    }

    #[test]
    fn constant_image_is_unchanged() {
        let img = GrayImage::from_pixel(3, 2, Luma([42]));
        assert_eq!(equalize_histogram(&img), img);
    }
}
