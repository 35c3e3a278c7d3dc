//! Polyline curves in world space: arc-length resampling and
//! rotation-minimizing (parallel transport) frames.

use crate::math::{self, Plane};

use nalgebra::Vector3;

/// Local orthonormal frame at a curve point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveFrame {
    pub point: Vector3<f64>,
    pub tangent: Vector3<f64>,
    pub normal: Vector3<f64>,
    pub binormal: Vector3<f64>,
}

/// Ordered sequence of world-space points joined by straight segments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Curve {
    points: Vec<Vector3<f64>>,
}

impl Curve {
    pub fn new(points: Vec<Vector3<f64>>) -> Self {
        Self { points }
    }

    pub fn from_arrays(points: &[[f64; 3]]) -> Self {
        Self::new(points.iter().map(|p| Vector3::from(*p)).collect())
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&Vector3<f64>> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&Vector3<f64>> {
        self.points.last()
    }

    /// Total polyline length.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// Points placed every `spacing` millimetres along the polyline, starting
    /// at the first point.
    ///
    /// The leftover after the last full step is absorbed at the end: if it is
    /// at most half a step the last sample is moved onto the curve end,
    /// otherwise the curve end is appended as an extra sample. A curve shorter
    /// than one step keeps both of its ends. Returns `None` for a non-positive
    /// spacing.
    pub fn resample(&self, spacing: f64) -> Option<Self> {
        if spacing.is_nan() || spacing <= 0.0 {
            return None;
        }
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return Some(self.clone());
        };
        if self.points.len() < 2 {
            return Some(self.clone());
        }

        let mut sampled = vec![*first];
        let mut since_last_sample = 0.0;
        let mut previous = *first;
        for current in &self.points[1..] {
            let segment = current - previous;
            let segment_length = segment.norm();
            if segment_length <= 0.0 {
                continue;
            }
            let mut remaining = since_last_sample + segment_length;
            if remaining >= spacing {
                let direction = segment / segment_length;
                let mut along = spacing - since_last_sample;
                while remaining >= spacing {
                    sampled.push(previous + direction * along);
                    along += spacing;
                    remaining -= spacing;
                }
                since_last_sample = remaining;
            } else {
                since_last_sample += segment_length;
            }
            previous = *current;
        }

        let only_start = sampled.len() == 1 && since_last_sample > 0.0;
        if since_last_sample > 0.5 * spacing || only_start {
            sampled.push(*last);
        } else if sampled.len() > 1 {
            let end = sampled.len() - 1;
            sampled[end] = *last;
        }
        Some(Self::new(sampled))
    }

    /// Unit tangents: central differences inside, one-sided at the ends.
    pub fn tangents(&self) -> Vec<Vector3<f64>> {
        let n = self.points.len();
        let mut tangents = Vec::with_capacity(n);
        for i in 0..n {
            let before = self.points[i.saturating_sub(1)];
            let after = self.points[(i + 1).min(n - 1)];
            tangents.push(math::try_normalize(&(after - before)).unwrap_or_else(Vector3::zeros));
        }
        // Duplicate points leave holes; borrow the nearest valid tangent.
        for i in 1..n {
            if tangents[i] == Vector3::zeros() {
                tangents[i] = tangents[i - 1];
            }
        }
        for i in (0..n.saturating_sub(1)).rev() {
            if tangents[i] == Vector3::zeros() {
                tangents[i] = tangents[i + 1];
            }
        }
        tangents
    }

    /// Parallel-transport frames. The first normal is `preferred_normal` made
    /// orthogonal to the first tangent; each following normal is the previous
    /// one rotated by the minimal rotation between consecutive tangents.
    /// `binormal = tangent × normal`.
    pub fn parallel_transport_frames(&self, preferred_normal: &Vector3<f64>) -> Vec<CurveFrame> {
        let tangents = self.tangents();
        let Some(first_tangent) = tangents.first() else {
            return Vec::new();
        };
        let mut normal = initial_normal(first_tangent, preferred_normal);

        let mut frames = Vec::with_capacity(tangents.len());
        for (index, (point, tangent)) in self.points.iter().zip(&tangents).enumerate() {
            if index > 0 {
                let previous = tangents[index - 1];
                let axis = previous.cross(tangent);
                let sin = axis.norm();
                if sin > 1e-12 {
                    let angle = sin.atan2(previous.dot(tangent));
                    normal = math::rotate_about(&normal, &axis, angle);
                }
                // Remove drift so the frame stays orthonormal.
                normal = math::try_normalize(&(normal - tangent * normal.dot(tangent)))
                    .unwrap_or_else(|| initial_normal(tangent, &normal));
            }
            frames.push(CurveFrame {
                point: *point,
                tangent: *tangent,
                normal,
                binormal: tangent.cross(&normal),
            });
        }
        frames
    }

    /// Transport frames seeded with the world axis least aligned with the first tangent.
    pub fn default_frames(&self) -> Vec<CurveFrame> {
        let tangents = self.tangents();
        let Some(first) = tangents.first() else {
            return Vec::new();
        };
        self.parallel_transport_frames(&least_aligned_axis(first))
    }

    /// Curve with every point orthogonally projected onto `plane`.
    pub fn project_to_plane(&self, plane: &Plane) -> Self {
        Self::new(self.points.iter().map(|p| plane.project(p)).collect())
    }
}

fn least_aligned_axis(direction: &Vector3<f64>) -> Vector3<f64> {
    let mut out = Vector3::zeros();
    out[direction.iamin()] = 1.0;
    out
}

fn initial_normal(tangent: &Vector3<f64>, preferred: &Vector3<f64>) -> Vector3<f64> {
    math::try_normalize(&(preferred - tangent * preferred.dot(tangent))).unwrap_or_else(|| {
        let fallback = least_aligned_axis(tangent);
        (fallback - tangent * fallback.dot(tangent)).normalize()
    })
}
