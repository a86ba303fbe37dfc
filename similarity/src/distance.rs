use pulp::{Arch, Simd, WithSimd};

struct Magnitude<'a> {
    first: &'a [f32],
    second: &'a [f32],
}

impl WithSimd for Magnitude<'_> {
    type Output = f32;

    #[inline(always)]
    fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
        let (first_head, first_tail) = S::as_simd_f32s(self.first);
        let (second_head, second_tail) = S::as_simd_f32s(self.second);

        let mut mag_first = simd.splat_f32s(0.0);
        let mut mag_second = simd.splat_f32s(0.0);

        for (&chunk_first, &chunk_second) in first_head.iter().zip(second_head) {
            mag_first = simd.mul_add_f32s(chunk_first, chunk_first, mag_first);
            mag_second = simd.mul_add_f32s(chunk_second, chunk_second, mag_second);
        }

        let mag_first = simd.reduce_sum_f32s(mag_first);
        let mag_second = simd.reduce_sum_f32s(mag_second);

        let mut scalar_mag_first = 0.0;
        let mut scalar_mag_second = 0.0;

        for (&x, &y) in first_tail.iter().zip(second_tail) {
            scalar_mag_first += x * x;
            scalar_mag_second += y * y;
        }
        let mag_first = mag_first + scalar_mag_first;
        let mag_second = mag_second + scalar_mag_second;

        mag_first.sqrt() * mag_second.sqrt()
    }
}

/// Cosine of the angle between two vectors, in `[-1, 1]`; 1 means identical
/// direction, 0 orthogonal, -1 opposite. Scale-invariant.
#[tracing::instrument(skip_all)]
pub fn cosine_similarity(first: &[f32], second: &[f32]) -> f32 {
    assert_eq!(
        first.len(),
        second.len(),
        "vectors must have the same length"
    );

    let dot = dot_product(first, second);
    let arch = Arch::new();
    let magnitude = arch.dispatch(Magnitude { first, second });

    dot / magnitude
}

struct DotProduct<'a> {
    first: &'a [f32],
    second: &'a [f32],
}

impl WithSimd for DotProduct<'_> {
    type Output = f32;

    #[inline(always)]
    fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
        let (first_head, first_tail) = S::as_simd_f32s(self.first);
        let (second_head, second_tail) = S::as_simd_f32s(self.second);

        let mut sum_of_points = simd.splat_f32s(0.0);

        for (&chunk_first, &chunk_second) in first_head.iter().zip(second_head) {
            sum_of_points = simd.mul_add_f32s(chunk_first, chunk_second, sum_of_points);
        }

        let mut dot_product = simd.reduce_sum_f32s(sum_of_points);

        dot_product += first_tail
            .iter()
            .zip(second_tail)
            .map(|(&x, &y)| x * y)
            .sum::<f32>();
        dot_product
    }
}

/// Scalar (dot) product. Larger means more similar; unbounded range.
#[tracing::instrument(skip_all)]
pub fn dot_product(first: &[f32], second: &[f32]) -> f32 {
    assert_eq!(
        first.len(),
        second.len(),
        "vectors must have the same length"
    );

    let arch = Arch::new();
    arch.dispatch(DotProduct { first, second })
}

struct EuclideanDistance<'a> {
    first: &'a [f32],
    second: &'a [f32],
}

impl WithSimd for EuclideanDistance<'_> {
    type Output = f32;

    #[inline(always)]
    fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
        let (first_head, first_tail) = S::as_simd_f32s(self.first);
        let (second_head, second_tail) = S::as_simd_f32s(self.second);

        let mut sum_of_squares = simd.splat_f32s(0.0);

        for (&cord_first, &cord_second) in first_head.iter().zip(second_head) {
            let diff = simd.sub_f32s(cord_first, cord_second);
            sum_of_squares = simd.mul_add_f32s(diff, diff, sum_of_squares);
        }

        let mut total = simd.reduce_sum_f32s(sum_of_squares);

        total += first_tail
            .iter()
            .zip(second_tail)
            .map(|(&x, &y)| {
                let diff = x - y;
                diff * diff
            })
            .sum::<f32>();

        total.sqrt()
    }
}

/// Straight-line distance between two vectors. Smaller means more similar.
/// Sensitive to differences in scale; callers should normalise first.
#[tracing::instrument(skip_all)]
pub fn euclidean_distance(first: &[f32], second: &[f32]) -> f32 {
    assert_eq!(
        first.len(),
        second.len(),
        "vectors must have the same length"
    );

    let arch = Arch::new();
    arch.dispatch(EuclideanDistance { first, second })
}

struct ManhattanDistance<'a> {
    first: &'a [f32],
    second: &'a [f32],
}

impl WithSimd for ManhattanDistance<'_> {
    type Output = f32;

    #[inline(always)]
    fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
        let (first_head, first_tail) = S::as_simd_f32s(self.first);
        let (second_head, second_tail) = S::as_simd_f32s(self.second);

        let mut sum_of_abs = simd.splat_f32s(0.0);

        for (&cord_first, &cord_second) in first_head.iter().zip(second_head) {
            let diff = simd.sub_f32s(cord_first, cord_second);
            sum_of_abs = simd.add_f32s(sum_of_abs, simd.abs_f32s(diff));
        }

        let mut total = simd.reduce_sum_f32s(sum_of_abs);

        total += first_tail
            .iter()
            .zip(second_tail)
            .map(|(&x, &y)| (x - y).abs())
            .sum::<f32>();

        total
    }
}

/// Sum of absolute coordinate differences between two vectors (L1/taxicab
/// distance). Smaller means more similar; less sensitive to large
/// per-coordinate outliers than euclidean distance.
#[tracing::instrument(skip_all)]
pub fn manhattan_distance(first: &[f32], second: &[f32]) -> f32 {
    assert_eq!(
        first.len(),
        second.len(),
        "vectors must have the same length"
    );

    let arch = Arch::new();
    arch.dispatch(ManhattanDistance { first, second })
}

/// Squared euclidean distance, skipping the final `sqrt`. Useful wherever
/// only relative ordering matters, since it preserves rank order more
/// cheaply.
#[tracing::instrument(skip_all)]
pub fn squared_euclidean_distance(first: &[f32], second: &[f32]) -> f32 {
    assert_eq!(
        first.len(),
        second.len(),
        "vectors must have the same length"
    );

    first
        .iter()
        .zip(second.iter())
        .map(|(a, b)| {
            let diff = a - b;
            diff * diff
        })
        .sum()
}
