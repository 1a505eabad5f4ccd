//! Precomputed pattern triples and the cycle that hands them out.
//!
//! [`generate_triples`] builds three deterministic raw/gain/corrected sets.
//! [`FramePatternCycle`] owns them and returns them in order, wrapping
//! forever: call number `3k + r` yields triple `r`.

use ndarray::Array2;
use piper_core::limits::PATTERN_CYCLE_LEN;
use piper_core::PatternTriple;
use std::sync::Arc;

/// Relative gain of each gain stage; `corrected = raw * factor[stage]`.
pub const GAIN_STAGE_FACTORS: [f32; 3] = [1.0, 10.0, 100.0];

/// Raw-count thresholds between gain stages 0/1 and 1/2.
pub const GAIN_STAGE_THRESHOLDS: [u32; 2] = [16_384, 49_152];

const FULL_SCALE: u32 = 65_535;

/// Simple pseudo-random number generator (LCG) for reproducible noise.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

/// Generates a square diagnostic raw image.
///
/// Layers, bottom to top:
/// - checkerboard background with per-pixel noise seeded by `frame_num`
/// - horizontal gradient bands across the top and bottom tenth
/// - a bright crosshair through the centre
/// - a saturated marker in the top-left corner (orientation)
/// - a Gaussian hotspot whose position depends on `frame_num`
///
/// Images smaller than 16 pixels get a plain diagonal gradient.
pub fn generate_raw_pattern(size: usize, frame_num: u64) -> Array2<u32> {
    if size < 16 {
        return Array2::from_shape_fn((size, size), |(y, x)| {
            ((x + y) as u32 * FULL_SCALE) / (2 * size).max(1) as u32
        });
    }

    let checker = (size / 32).max(1);
    let band = (size / 10).max(1);
    let corner = (size / 8).max(1);
    let half_arm = size / 6;
    let centre = size / 2;

    let orbit = size as f64 / 5.0;
    let angle = frame_num as f64 * 2.0 * std::f64::consts::PI / PATTERN_CYCLE_LEN as f64;
    let hot_x = centre as f64 + orbit * angle.cos();
    let hot_y = centre as f64 + orbit * angle.sin();
    let sigma = (size as f64 / 16.0).max(1.0);

    let frame_seed = frame_num.wrapping_mul(2654435761);

    Array2::from_shape_fn((size, size), |(y, x)| {
        let idx = (y * size + x) as u64;
        let noise = (prng(frame_seed ^ idx) & 0xFFF) as i64 - 2048;

        let base: i64 = if ((x / checker) + (y / checker)).is_multiple_of(2) {
            16_384
        } else {
            19_660
        };
        let mut value = (base + noise).clamp(0, FULL_SCALE as i64) as u32;

        if y < band {
            value = (x as u32 * FULL_SCALE) / size as u32;
        } else if y >= size - band {
            value = ((size - 1 - x) as u32 * FULL_SCALE) / size as u32;
        }

        let on_horizontal = y.abs_diff(centre) <= 1 && x.abs_diff(centre) <= half_arm;
        let on_vertical = x.abs_diff(centre) <= 1 && y.abs_diff(centre) <= half_arm;
        if on_horizontal || on_vertical {
            value = FULL_SCALE;
        }

        if x + y < corner {
            value = FULL_SCALE;
        }

        let dx = x as f64 - hot_x;
        let dy = y as f64 - hot_y;
        let gaussian = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
        (value + (gaussian * 32_768.0) as u32).min(FULL_SCALE)
    })
}

/// Gain stage a raw value would have been read out with.
pub fn gain_stage(raw: u32) -> u8 {
    if raw < GAIN_STAGE_THRESHOLDS[0] {
        0
    } else if raw < GAIN_STAGE_THRESHOLDS[1] {
        1
    } else {
        2
    }
}

/// Derive a consistent triple from a raw image.
pub fn triple_from_raw(raw: Array2<u32>) -> PatternTriple {
    let gain = raw.mapv(gain_stage);
    let mut corrected = raw.mapv(|v| v as f32);
    ndarray::Zip::from(&mut corrected)
        .and(&gain)
        .for_each(|c, &g| *c *= GAIN_STAGE_FACTORS[g as usize]);
    PatternTriple {
        raw,
        gain,
        corrected,
    }
}

/// Build the three triples of the cycle for `size × size` images.
pub fn generate_triples(size: usize) -> [PatternTriple; PATTERN_CYCLE_LEN] {
    std::array::from_fn(|k| triple_from_raw(generate_raw_pattern(size, k as u64)))
}

// =============================================================================
// FramePatternCycle
// =============================================================================

/// Fixed ring of triples with a wrapping cursor.
#[derive(Debug, Clone)]
pub struct FramePatternCycle {
    triples: [Arc<PatternTriple>; PATTERN_CYCLE_LEN],
    cursor: usize,
}

impl FramePatternCycle {
    /// Cycle over the given triples, starting at the first.
    pub fn new(triples: [PatternTriple; PATTERN_CYCLE_LEN]) -> Self {
        Self {
            triples: triples.map(Arc::new),
            cursor: 0,
        }
    }

    /// Cycle over freshly generated `size × size` triples.
    pub fn generate(size: usize) -> Self {
        Self::new(generate_triples(size))
    }

    /// Return the triple under the cursor and advance it.
    pub fn next_triple(&mut self) -> Arc<PatternTriple> {
        let triple = self.triples[self.cursor].clone();
        self.cursor = (self.cursor + 1) % PATTERN_CYCLE_LEN;
        triple
    }

    /// Index the next call to [`next_triple`](Self::next_triple) returns.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Iterator for FramePatternCycle {
    type Item = Arc<PatternTriple>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_triple())
    }
}
