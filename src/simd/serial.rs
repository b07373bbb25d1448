//! Pure-Rust scalar kernels.
//!
//! This tier works on all platforms, is always registered, and is the fallback
//! every accelerated kernel drops to when its instruction set is missing.
//! Floating-point kernels accumulate in `f32` (in `f64` for `f64` inputs).

use half::f16;

use super::{Accumulator, Distance, cosine_from_parts};

// ---------------------------------------------------------------------------
// Shared loops, parameterized over the accumulator width
// ---------------------------------------------------------------------------

#[inline]
pub(crate) fn dot<T: Copy, A: Accumulator>(a: &[T], b: &[T], load: impl Fn(T) -> A) -> A {
    let mut ab = A::ZERO;
    for (&x, &y) in a.iter().zip(b) {
        ab += load(x) * load(y);
    }
    ab
}

#[inline]
pub(crate) fn cos<T: Copy, A: Accumulator>(a: &[T], b: &[T], load: impl Fn(T) -> A) -> Distance {
    let (mut ab, mut a2, mut b2) = (A::ZERO, A::ZERO, A::ZERO);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (load(x), load(y));
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    cosine_from_parts(ab, a2, b2)
}

#[inline]
pub(crate) fn l2sq<T: Copy, A: Accumulator>(a: &[T], b: &[T], load: impl Fn(T) -> A) -> A {
    let mut d2 = A::ZERO;
    for (&x, &y) in a.iter().zip(b) {
        let d = load(x) - load(y);
        d2 += d * d;
    }
    d2
}

#[inline]
pub(crate) fn kl<T: Copy, A: Accumulator>(a: &[T], b: &[T], load: impl Fn(T) -> A) -> A {
    let mut d = A::ZERO;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (load(x), load(y));
        d += x * ((x + A::EPSILON) / (y + A::EPSILON)).ln();
    }
    d
}

#[inline]
pub(crate) fn js<T: Copy, A: Accumulator>(a: &[T], b: &[T], load: impl Fn(T) -> A) -> A {
    let mut d = A::ZERO;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (load(x), load(y));
        let m = (x + y) * A::HALF;
        d += x * ((x + A::EPSILON) / (m + A::EPSILON)).ln();
        d += y * ((y + A::EPSILON) / (m + A::EPSILON)).ln();
    }
    d * A::HALF
}

/// Interleaved complex dot product: `(re, im)` pairs, `n` counts scalars.
#[inline]
pub(crate) fn complex_dot<T: Copy, A: Accumulator>(
    a: &[T],
    b: &[T],
    load: impl Fn(T) -> A,
) -> (A, A) {
    let (mut re, mut im) = (A::ZERO, A::ZERO);
    for (x, y) in a.chunks_exact(2).zip(b.chunks_exact(2)) {
        let (ar, ai) = (load(x[0]), load(x[1]));
        let (br, bi) = (load(y[0]), load(y[1]));
        re += ar * br - ai * bi;
        im += ar * bi + ai * br;
    }
    (re, im)
}

#[inline]
pub(crate) fn cos_i8_parts(a: &[i8], b: &[i8]) -> (i64, i64, i64) {
    let (mut ab, mut a2, mut b2) = (0i64, 0i64, 0i64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as i64, y as i64);
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    (ab, a2, b2)
}

#[inline]
pub(crate) fn l2sq_i8_sum(a: &[i8], b: &[i8]) -> i64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as i64 - y as i64;
            d * d
        })
        .sum()
}

/// Jaccard distance from set-bit counts. Two empty sets are identical.
#[inline]
pub(crate) fn jaccard_from_counts(intersection: u32, union: u32) -> Distance {
    if union == 0 {
        0.0
    } else {
        1.0 - intersection as Distance / union as Distance
    }
}

// ---------------------------------------------------------------------------
// f16
// ---------------------------------------------------------------------------

pub fn dot_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = dot(&a[..n], &b[..n], f16::to_f32).to_distance();
}

pub fn cos_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = cos(&a[..n], &b[..n], f16::to_f32);
}

pub fn l2sq_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = l2sq(&a[..n], &b[..n], f16::to_f32).to_distance();
}

pub fn kl_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = kl(&a[..n], &b[..n], f16::to_f32).to_distance();
}

pub fn js_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = js(&a[..n], &b[..n], f16::to_f32).to_distance();
}

pub fn dot_f16c(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (re, im) = complex_dot(&a[..n], &b[..n], f16::to_f32);
    out[0] = re.to_distance();
    out[1] = im.to_distance();
}

// ---------------------------------------------------------------------------
// f32
// ---------------------------------------------------------------------------

fn load_f32(x: f32) -> f32 {
    x
}

pub fn dot_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = dot(&a[..n], &b[..n], load_f32).to_distance();
}

pub fn cos_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = cos(&a[..n], &b[..n], load_f32);
}

pub fn l2sq_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = l2sq(&a[..n], &b[..n], load_f32).to_distance();
}

pub fn kl_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = kl(&a[..n], &b[..n], load_f32).to_distance();
}

pub fn js_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = js(&a[..n], &b[..n], load_f32).to_distance();
}

pub fn dot_f32c(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (re, im) = complex_dot(&a[..n], &b[..n], load_f32);
    out[0] = re.to_distance();
    out[1] = im.to_distance();
}

// ---------------------------------------------------------------------------
// f64
// ---------------------------------------------------------------------------

fn load_f64(x: f64) -> f64 {
    x
}

pub fn dot_f64(a: &[f64], b: &[f64], n: usize, out: &mut [Distance; 2]) {
    out[0] = dot(&a[..n], &b[..n], load_f64);
}

pub fn cos_f64(a: &[f64], b: &[f64], n: usize, out: &mut [Distance; 2]) {
    out[0] = cos(&a[..n], &b[..n], load_f64);
}

pub fn l2sq_f64(a: &[f64], b: &[f64], n: usize, out: &mut [Distance; 2]) {
    out[0] = l2sq(&a[..n], &b[..n], load_f64);
}

// ---------------------------------------------------------------------------
// i8
// ---------------------------------------------------------------------------

pub fn cos_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    let (ab, a2, b2) = cos_i8_parts(&a[..n], &b[..n]);
    out[0] = cosine_from_parts(ab as f32, a2 as f32, b2 as f32);
}

pub fn l2sq_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    out[0] = l2sq_i8_sum(&a[..n], &b[..n]) as Distance;
}

// ---------------------------------------------------------------------------
// b8 (packed bits, `n` counts bytes)
// ---------------------------------------------------------------------------

pub fn hamming_b8(a: &[u8], b: &[u8], n: usize, out: &mut [Distance; 2]) {
    let differing: u32 = a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(&x, &y)| (x ^ y).count_ones())
        .sum();
    out[0] = differing as Distance;
}

pub fn jaccard_b8(a: &[u8], b: &[u8], n: usize, out: &mut [Distance; 2]) {
    let (mut intersection, mut union) = (0u32, 0u32);
    for (&x, &y) in a[..n].iter().zip(&b[..n]) {
        intersection += (x & y).count_ones();
        union += (x | y).count_ones();
    }
    out[0] = jaccard_from_counts(intersection, union);
}
