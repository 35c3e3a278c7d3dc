use ndarray::ArrayView3;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Value of the voxel closest to the continuous index `(i, j, k)`, or `None`
    /// outside the half-voxel padded extent.
    #[inline]
    pub(crate) fn nearest(volume: &ArrayView3<'_, f32>, i: f64, j: f64, k: f64) -> Option<f32> {
        let (depth, height, width) = volume.dim();
        let index = |x: f64, n: usize| -> Option<usize> {
            let r = x.round();
            (r >= 0.0 && r < n as f64).then_some(r as usize)
        };
        let (i, j, k) = (index(i, width)?, index(j, height)?, index(k, depth)?);
        Some(volume[[k, j, i]])
    }

    /// Trilinear interpolation at the continuous index `(i, j, k)`. Samples
    /// within half a voxel of the border are clamped to the edge; anything
    /// farther out is `None`.
    #[inline]
    pub(crate) fn trilinear(volume: &ArrayView3<'_, f32>, i: f64, j: f64, k: f64) -> Option<f32> {
        let (depth, height, width) = volume.dim();
        let inside = |x: f64, n: usize| n > 0 && x >= -0.5 && x <= n as f64 - 0.5;
        if !(inside(i, width) && inside(j, height) && inside(k, depth)) {
            return None;
        }
        let clamp = |x: f64, n: usize| x.clamp(0.0, (n - 1) as f64);
        let (x, y, z) = (clamp(i, width), clamp(j, height), clamp(k, depth));

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let z0 = z.floor() as usize;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let z1 = (z0 + 1).min(depth - 1);

        let dx = (x - x0 as f64) as f32;
        let dy = (y - y0 as f64) as f32;
        let dz = (z - z0 as f64) as f32;

        let lerp = |a: f32, b: f32, t: f32| a.mul_add(1.0 - t, b * t);

        let c00 = lerp(volume[[z0, y0, x0]], volume[[z0, y0, x1]], dx);
        let c01 = lerp(volume[[z0, y1, x0]], volume[[z0, y1, x1]], dx);
        let c10 = lerp(volume[[z1, y0, x0]], volume[[z1, y0, x1]], dx);
        let c11 = lerp(volume[[z1, y1, x0]], volume[[z1, y1, x1]], dx);

        let c0 = lerp(c00, c01, dy);
        let c1 = lerp(c10, c11, dy);
        Some(lerp(c0, c1, dz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp() -> Array3<f32> {
        // value = i + 10 j + 100 k
        Array3::from_shape_fn((3, 3, 3), |(k, j, i)| (i + 10 * j + 100 * k) as f32)
    }

    #[test]
    fn trilinear_is_exact_on_linear_field() {
        let data = ramp();
        let value = Interpolator::trilinear(&data.view(), 0.5, 1.25, 1.5).expect("inside");
        assert!((value - (0.5 + 12.5 + 150.0)).abs() < 1e-4);
    }

    #[test]
    fn trilinear_clamps_half_voxel_border() {
        let data = ramp();
        let value = Interpolator::trilinear(&data.view(), -0.4, 0.0, 0.0).expect("inside margin");
        assert_eq!(value, 0.0);
        assert!(Interpolator::trilinear(&data.view(), -0.6, 0.0, 0.0).is_none());
    }

    #[test]
    fn nearest_rounds_to_closest_voxel() {
        let data = ramp();
        assert_eq!(Interpolator::nearest(&data.view(), 1.4, 0.6, 2.2), Some(211.0));
        assert_eq!(Interpolator::nearest(&data.view(), 3.0, 0.0, 0.0), None);
    }
}
