//! Regular-grid terrain data.
//!
//! The grid lies in the geom's local XZ plane with heights along local Y and
//! is centered on the geom origin. Internally sample `(x, z)` sits at
//! `(x * sample_width, h, z * sample_depth)` measured from the grid corner.

use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use tracing::warn;

use crate::config::HeightfieldConfig;
use crate::error::ShapeError;
use crate::math::{Aabb, Pose};

/// Height lookup for sample `(x, z)`, before scale and offset.
pub type HeightCallback = dyn Fn(i32, i32) -> f32 + Send + Sync;

/// Where raw sample heights come from.
#[derive(Clone)]
pub enum HeightSource {
    /// Row-major samples, `x + z * width_samples`.
    Samples(Vec<f32>),
    /// Heights produced on demand. `min` and `max` bound the raw values and may
    /// be infinite.
    Callback {
        func: Arc<HeightCallback>,
        min: f32,
        max: f32,
    },
}

impl fmt::Debug for HeightSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeightSource::Samples(samples) => {
                f.debug_tuple("Samples").field(&samples.len()).finish()
            }
            HeightSource::Callback { min, max, .. } => f
                .debug_struct("Callback")
                .field("min", min)
                .field("max", max)
                .finish_non_exhaustive(),
        }
    }
}

/// Grid dimensions and height mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightfieldDesc {
    /// World extent along local X. Default: 1.
    pub width: f32,
    /// World extent along local Z. Default: 1.
    pub depth: f32,
    /// Samples along X. Default: 2.
    pub width_samples: u32,
    /// Samples along Z. Default: 2.
    pub depth_samples: u32,
    /// Multiplier applied to raw heights. Default: 1.
    pub scale: f32,
    /// Added to scaled heights. Default: 0.
    pub offset: f32,
    /// Extends the lower bound of the AABB downward. Default: 0.
    pub thickness: f32,
    /// Tile the grid infinitely in X and Z. Default: false.
    pub wrap: bool,
    pub config: HeightfieldConfig,
}

impl Default for HeightfieldDesc {
    fn default() -> Self {
        Self {
            width: 1.0,
            depth: 1.0,
            width_samples: 2,
            depth_samples: 2,
            scale: 1.0,
            offset: 0.0,
            thickness: 0.0,
            wrap: false,
            config: HeightfieldConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Heightfield {
    desc: HeightfieldDesc,
    source: HeightSource,
    sample_width: f32,
    sample_depth: f32,
    min_height: f32,
    max_height: f32,
}

impl Heightfield {
    pub fn new(desc: HeightfieldDesc, source: HeightSource) -> Result<Self, ShapeError> {
        if desc.width_samples < 2 || desc.depth_samples < 2 {
            return Err(ShapeError::TooFewSamples {
                width: desc.width_samples,
                depth: desc.depth_samples,
            });
        }
        if !(desc.width > 0.0 && desc.depth > 0.0) {
            return Err(ShapeError::InvalidExtent {
                width: desc.width,
                depth: desc.depth,
            });
        }

        let (raw_min, raw_max) = match &source {
            HeightSource::Samples(samples) => {
                let expected = desc.width_samples as usize * desc.depth_samples as usize;
                if samples.len() != expected {
                    return Err(ShapeError::SampleCountMismatch {
                        expected,
                        actual: samples.len(),
                    });
                }
                let non_finite = samples.iter().filter(|h| !h.is_finite()).count();
                if non_finite > 0 {
                    warn!(non_finite, "heightfield samples contain non-finite heights");
                }
                samples
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                        (lo.min(h), hi.max(h))
                    })
            }
            HeightSource::Callback { min, max, .. } => {
                if min > max {
                    warn!(min, max, "heightfield callback bounds are inverted");
                }
                (*min, *max)
            }
        };

        let (min_height, max_height) = if desc.scale >= 0.0 {
            (raw_min * desc.scale, raw_max * desc.scale)
        } else {
            (raw_max * desc.scale, raw_min * desc.scale)
        };

        Ok(Self {
            sample_width: desc.width / (desc.width_samples - 1) as f32,
            sample_depth: desc.depth / (desc.depth_samples - 1) as f32,
            min_height: min_height + desc.offset - desc.thickness,
            max_height: max_height + desc.offset,
            desc,
            source,
        })
    }

    /// Convenience constructor for a sample buffer.
    pub fn from_samples(desc: HeightfieldDesc, samples: Vec<f32>) -> Result<Self, ShapeError> {
        Self::new(desc, HeightSource::Samples(samples))
    }

    pub fn desc(&self) -> &HeightfieldDesc {
        &self.desc
    }

    pub fn config(&self) -> &HeightfieldConfig {
        &self.desc.config
    }

    pub fn sample_width(&self) -> f32 {
        self.sample_width
    }

    pub fn sample_depth(&self) -> f32 {
        self.sample_depth
    }

    /// Ratio of cell depth to cell width.
    pub fn aspect(&self) -> f32 {
        self.sample_depth / self.sample_width
    }

    /// Lowest possible height, thickness included.
    pub fn min_height(&self) -> f32 {
        self.min_height
    }

    pub fn max_height(&self) -> f32 {
        self.max_height
    }

    pub fn is_wrapped(&self) -> bool {
        self.desc.wrap
    }

    /// Scaled height of sample `(x, z)`. Out-of-range indices clamp to the
    /// border, or repeat when wrapped.
    pub fn sample(&self, x: i32, z: i32) -> f32 {
        let nx = self.desc.width_samples as i32;
        let nz = self.desc.depth_samples as i32;
        let (x, z) = if self.desc.wrap {
            (x.rem_euclid(nx - 1), z.rem_euclid(nz - 1))
        } else {
            (x.clamp(0, nx - 1), z.clamp(0, nz - 1))
        };
        let raw = match &self.source {
            HeightSource::Samples(samples) => samples
                .get((x + z * nx) as usize)
                .copied()
                .unwrap_or(0.0),
            HeightSource::Callback { func, .. } => func(x, z),
        };
        raw * self.desc.scale + self.desc.offset
    }

    /// Height at corner-origin coordinates, interpolated over the cell
    /// triangle containing the point.
    pub(crate) fn height_at_corner(&self, x: f32, z: f32) -> f32 {
        let fx = (x / self.sample_width).floor();
        let fz = (z / self.sample_depth).floor();
        let dx = (x - fx * self.sample_width) / self.sample_width;
        let dz = (z - fz * self.sample_depth) / self.sample_depth;
        let (nx, nz) = (fx as i32, fz as i32);

        if dx + dz <= 1.0 {
            let y0 = self.sample(nx, nz);
            y0 + (self.sample(nx + 1, nz) - y0) * dx + (self.sample(nx, nz + 1) - y0) * dz
        } else {
            let y0 = self.sample(nx + 1, nz + 1);
            y0 + (self.sample(nx + 1, nz) - y0) * (1.0 - dz)
                + (self.sample(nx, nz + 1) - y0) * (1.0 - dx)
        }
    }

    /// Interpolated height at geom-local `(x, z)`.
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.height_at_corner(x + self.desc.width * 0.5, z + self.desc.depth * 0.5)
    }

    pub fn aabb(&self, pose: &Pose) -> Aabb {
        let (hw, hd) = if self.desc.wrap {
            (f32::INFINITY, f32::INFINITY)
        } else {
            (self.desc.width * 0.5, self.desc.depth * 0.5)
        };
        Aabb::from_local_bounds(
            pose,
            Vec3::new(-hw, self.min_height, -hd),
            Vec3::new(hw, self.max_height, hd),
        )
    }
}
