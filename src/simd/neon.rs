//! Arm NEON (128-bit) kernels for `f16`, `f32`, `i8`, complex `f32` and
//! packed bit-sets.
//!
//! `f16` inputs are widened block by block into stack buffers with `half`'s
//! slice conversion, then reduced with the `f32` loops.

use std::arch::aarch64::*;

use half::f16;
use half::slice::HalfFloatSliceExt;

use super::serial;
use super::{DIVISION_EPSILON, Distance, cosine_from_parts, neon_detected};

/// `f16` elements widened per block.
const F16_BLOCK: usize = 256;

/// Chunks of 16 `i8` lanes summed into `i32` before widening to `i64`.
const I8_BLOCK_CHUNKS: usize = 4096;

// ---------------------------------------------------------------------------
// f16
// ---------------------------------------------------------------------------

/// Call `f` on consecutive widened blocks of `a` and `b`.
fn for_each_f32_block(a: &[f16], b: &[f16], mut f: impl FnMut(&[f32], &[f32])) {
    let (mut wa, mut wb) = ([0f32; F16_BLOCK], [0f32; F16_BLOCK]);
    for (ca, cb) in a.chunks(F16_BLOCK).zip(b.chunks(F16_BLOCK)) {
        let (wa, wb) = (&mut wa[..ca.len()], &mut wb[..cb.len()]);
        ca.convert_to_f32_slice(wa);
        cb.convert_to_f32_slice(wb);
        f(wa, wb);
    }
}

pub fn dot_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        let mut ab = 0f32;
        // Safety: NEON confirmed at runtime.
        for_each_f32_block(a, b, |a, b| ab += unsafe { parts_f32(a, b, false) }.0);
        out[0] = ab as Distance;
    } else {
        serial::dot_f16(a, b, n, out);
    }
}

pub fn cos_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        let (mut ab, mut a2, mut b2) = (0f32, 0f32, 0f32);
        for_each_f32_block(a, b, |a, b| {
            let parts = unsafe { parts_f32(a, b, true) };
            ab += parts.0;
            a2 += parts.1;
            b2 += parts.2;
        });
        out[0] = cosine_from_parts(ab, a2, b2);
    } else {
        serial::cos_f16(a, b, n, out);
    }
}

pub fn l2sq_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        let mut d2 = 0f32;
        for_each_f32_block(a, b, |a, b| d2 += unsafe { l2sq_f32_neon(a, b) });
        out[0] = d2 as Distance;
    } else {
        serial::l2sq_f16(a, b, n, out);
    }
}

pub fn kl_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        let mut d = 0f32;
        for_each_f32_block(a, b, |a, b| d += unsafe { kl_f32_neon(a, b) });
        out[0] = d as Distance;
    } else {
        serial::kl_f16(a, b, n, out);
    }
}

pub fn js_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        let mut d = 0f32;
        for_each_f32_block(a, b, |a, b| d += unsafe { js_f32_neon(a, b) });
        out[0] = d as Distance;
    } else {
        serial::js_f16(a, b, n, out);
    }
}

// ---------------------------------------------------------------------------
// f32
// ---------------------------------------------------------------------------

pub fn dot_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        // Safety: NEON confirmed at runtime.
        out[0] = unsafe { parts_f32(a, b, false) }.0 as Distance;
    } else {
        serial::dot_f32(a, b, n, out);
    }
}

pub fn cos_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        let (ab, a2, b2) = unsafe { parts_f32(a, b, true) };
        out[0] = cosine_from_parts(ab, a2, b2);
    } else {
        serial::cos_f32(a, b, n, out);
    }
}

pub fn l2sq_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        out[0] = unsafe { l2sq_f32_neon(a, b) } as Distance;
    } else {
        serial::l2sq_f32(a, b, n, out);
    }
}

pub fn kl_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        out[0] = unsafe { kl_f32_neon(a, b) } as Distance;
    } else {
        serial::kl_f32(a, b, n, out);
    }
}

pub fn js_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        out[0] = unsafe { js_f32_neon(a, b) } as Distance;
    } else {
        serial::js_f32(a, b, n, out);
    }
}

/// Interleaved complex dot product; `n` counts scalars.
pub fn dot_f32c(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        let (re, im) = unsafe { complex_dot_f32_neon(a, b) };
        out[0] = re as Distance;
        out[1] = im as Distance;
    } else {
        serial::dot_f32c(a, b, n, out);
    }
}

// ---------------------------------------------------------------------------
// i8
// ---------------------------------------------------------------------------

pub fn cos_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        let (ab, a2, b2) = unsafe { cos_i8_neon(a, b) };
        out[0] = cosine_from_parts(ab as f32, a2 as f32, b2 as f32);
    } else {
        serial::cos_i8(a, b, n, out);
    }
}

pub fn l2sq_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        out[0] = unsafe { l2sq_i8_neon(a, b) } as Distance;
    } else {
        serial::l2sq_i8(a, b, n, out);
    }
}

// ---------------------------------------------------------------------------
// b8
// ---------------------------------------------------------------------------

pub fn hamming_b8(a: &[u8], b: &[u8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        out[0] = unsafe { hamming_b8_neon(a, b) } as Distance;
    } else {
        serial::hamming_b8(a, b, n, out);
    }
}

pub fn jaccard_b8(a: &[u8], b: &[u8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if neon_detected() {
        let (intersection, union) = unsafe { jaccard_counts_neon(a, b) };
        out[0] = serial::jaccard_from_counts(intersection, union);
    } else {
        serial::jaccard_b8(a, b, n, out);
    }
}

#[target_feature(enable = "neon")]
unsafe fn parts_f32(a: &[f32], b: &[f32], norms: bool) -> (f32, f32, f32) {
    let chunks = a.len() / 4;

    let (mut ab, mut a2, mut b2) = unsafe {
        let (mut vab, mut va2, mut vb2) = (vdupq_n_f32(0.0), vdupq_n_f32(0.0), vdupq_n_f32(0.0));
        for i in 0..chunks {
            let va = vld1q_f32(a.as_ptr().add(i * 4));
            let vb = vld1q_f32(b.as_ptr().add(i * 4));
            vab = vfmaq_f32(vab, va, vb);
            if norms {
                va2 = vfmaq_f32(va2, va, va);
                vb2 = vfmaq_f32(vb2, vb, vb);
            }
        }
        (vaddvq_f32(vab), vaddvq_f32(va2), vaddvq_f32(vb2))
    };

    for (&x, &y) in a[chunks * 4..].iter().zip(&b[chunks * 4..]) {
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    (ab, a2, b2)
}

#[target_feature(enable = "neon")]
unsafe fn l2sq_f32_neon(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 4;

    let mut d2 = unsafe {
        let mut sum = vdupq_n_f32(0.0);
        for i in 0..chunks {
            let d = vsubq_f32(vld1q_f32(a.as_ptr().add(i * 4)), vld1q_f32(b.as_ptr().add(i * 4)));
            sum = vfmaq_f32(sum, d, d);
        }
        vaddvq_f32(sum)
    };

    for (&x, &y) in a[chunks * 4..].iter().zip(&b[chunks * 4..]) {
        let d = x - y;
        d2 += d * d;
    }
    d2
}

#[target_feature(enable = "neon")]
unsafe fn kl_f32_neon(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 4;
    let eps = DIVISION_EPSILON as f32;

    let mut d = unsafe {
        let veps = vdupq_n_f32(eps);
        let mut sum = vdupq_n_f32(0.0);
        for i in 0..chunks {
            let va = vld1q_f32(a.as_ptr().add(i * 4));
            let vb = vld1q_f32(b.as_ptr().add(i * 4));
            let ratio = vdivq_f32(vaddq_f32(va, veps), vaddq_f32(vb, veps));
            sum = vfmaq_f32(sum, va, ln_f32x4(ratio));
        }
        vaddvq_f32(sum)
    };

    for (&x, &y) in a[chunks * 4..].iter().zip(&b[chunks * 4..]) {
        d += x * ((x + eps) / (y + eps)).ln();
    }
    d
}

#[target_feature(enable = "neon")]
unsafe fn js_f32_neon(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 4;
    let eps = DIVISION_EPSILON as f32;

    let mut d = unsafe {
        let veps = vdupq_n_f32(eps);
        let mut sum = vdupq_n_f32(0.0);
        for i in 0..chunks {
            let va = vld1q_f32(a.as_ptr().add(i * 4));
            let vb = vld1q_f32(b.as_ptr().add(i * 4));
            let vm = vaddq_f32(vmulq_n_f32(vaddq_f32(va, vb), 0.5), veps);
            sum = vfmaq_f32(sum, va, ln_f32x4(vdivq_f32(vaddq_f32(va, veps), vm)));
            sum = vfmaq_f32(sum, vb, ln_f32x4(vdivq_f32(vaddq_f32(vb, veps), vm)));
        }
        vaddvq_f32(sum)
    };

    for (&x, &y) in a[chunks * 4..].iter().zip(&b[chunks * 4..]) {
        let m = (x + y) * 0.5;
        d += x * ((x + eps) / (m + eps)).ln();
        d += y * ((y + eps) / (m + eps)).ln();
    }
    d * 0.5
}

/// Natural logarithm of 4 positive, normal f32 lanes.
///
/// `x = 2^e * m` with `m` in `[1, 2)`; `ln(m) = 2 * atanh(t)` with
/// `t = (m - 1) / (m + 1)`, truncated after `t^9`.
#[target_feature(enable = "neon")]
unsafe fn ln_f32x4(x: float32x4_t) -> float32x4_t {
    unsafe {
        let bits = vreinterpretq_u32_f32(x);
        let exponent = vsubq_s32(
            vreinterpretq_s32_u32(vshrq_n_u32::<23>(bits)),
            vdupq_n_s32(127),
        );
        let mantissa = vreinterpretq_f32_u32(vorrq_u32(
            vandq_u32(bits, vdupq_n_u32(0x007F_FFFF)),
            vdupq_n_u32(0x3F80_0000),
        ));

        let one = vdupq_n_f32(1.0);
        let t = vdivq_f32(vsubq_f32(mantissa, one), vaddq_f32(mantissa, one));
        let t2 = vmulq_f32(t, t);
        let mut series = vdupq_n_f32(1.0 / 9.0);
        series = vfmaq_f32(vdupq_n_f32(1.0 / 7.0), series, t2);
        series = vfmaq_f32(vdupq_n_f32(1.0 / 5.0), series, t2);
        series = vfmaq_f32(vdupq_n_f32(1.0 / 3.0), series, t2);
        series = vfmaq_f32(one, series, t2);
        let ln_mantissa = vmulq_n_f32(vmulq_f32(t, series), 2.0);

        vfmaq_n_f32(ln_mantissa, vcvtq_f32_s32(exponent), std::f32::consts::LN_2)
    }
}

#[target_feature(enable = "neon")]
unsafe fn complex_dot_f32_neon(a: &[f32], b: &[f32]) -> (f32, f32) {
    let chunks = a.len() / 8;

    let (mut re, mut im) = unsafe {
        let (mut vre, mut vim) = (vdupq_n_f32(0.0), vdupq_n_f32(0.0));
        for i in 0..chunks {
            // Deinterleave four (re, im) pairs per operand.
            let va = vld2q_f32(a.as_ptr().add(i * 8));
            let vb = vld2q_f32(b.as_ptr().add(i * 8));
            vre = vfmaq_f32(vre, va.0, vb.0);
            vre = vfmsq_f32(vre, va.1, vb.1);
            vim = vfmaq_f32(vim, va.0, vb.1);
            vim = vfmaq_f32(vim, va.1, vb.0);
        }
        (vaddvq_f32(vre), vaddvq_f32(vim))
    };

    for (x, y) in a[chunks * 8..].chunks_exact(2).zip(b[chunks * 8..].chunks_exact(2)) {
        re += x[0] * y[0] - x[1] * y[1];
        im += x[0] * y[1] + x[1] * y[0];
    }
    (re, im)
}

#[target_feature(enable = "neon")]
unsafe fn cos_i8_neon(a: &[i8], b: &[i8]) -> (i64, i64, i64) {
    let chunks = a.len() / 16;
    let (mut ab, mut a2, mut b2) = (0i64, 0i64, 0i64);

    let mut start = 0;
    while start < chunks {
        let end = (start + I8_BLOCK_CHUNKS).min(chunks);
        unsafe {
            let (mut vab, mut va2, mut vb2) = (vdupq_n_s32(0), vdupq_n_s32(0), vdupq_n_s32(0));
            for i in start..end {
                let va = vld1q_s8(a.as_ptr().add(i * 16));
                let vb = vld1q_s8(b.as_ptr().add(i * 16));
                let (al, ah) = (vmovl_s8(vget_low_s8(va)), vmovl_high_s8(va));
                let (bl, bh) = (vmovl_s8(vget_low_s8(vb)), vmovl_high_s8(vb));
                vab = multiply_accumulate(vab, al, ah, bl, bh);
                va2 = multiply_accumulate(va2, al, ah, al, ah);
                vb2 = multiply_accumulate(vb2, bl, bh, bl, bh);
            }
            ab += vaddlvq_s32(vab);
            a2 += vaddlvq_s32(va2);
            b2 += vaddlvq_s32(vb2);
        }
        start = end;
    }

    let (tab, ta2, tb2) = serial::cos_i8_parts(&a[chunks * 16..], &b[chunks * 16..]);
    (ab + tab, a2 + ta2, b2 + tb2)
}

#[target_feature(enable = "neon")]
unsafe fn l2sq_i8_neon(a: &[i8], b: &[i8]) -> i64 {
    let chunks = a.len() / 16;
    let mut d2 = 0i64;

    let mut start = 0;
    while start < chunks {
        let end = (start + I8_BLOCK_CHUNKS).min(chunks);
        unsafe {
            let mut sum = vdupq_n_s32(0);
            for i in start..end {
                let va = vld1q_s8(a.as_ptr().add(i * 16));
                let vb = vld1q_s8(b.as_ptr().add(i * 16));
                let dl = vsubl_s8(vget_low_s8(va), vget_low_s8(vb));
                let dh = vsubl_high_s8(va, vb);
                sum = multiply_accumulate(sum, dl, dh, dl, dh);
            }
            d2 += vaddlvq_s32(sum);
        }
        start = end;
    }

    d2 + serial::l2sq_i8_sum(&a[chunks * 16..], &b[chunks * 16..])
}

/// `acc += xl * yl + xh * yh`, widening the 16-bit products to 32 bits.
#[target_feature(enable = "neon")]
unsafe fn multiply_accumulate(
    acc: int32x4_t,
    xl: int16x8_t,
    xh: int16x8_t,
    yl: int16x8_t,
    yh: int16x8_t,
) -> int32x4_t {
    unsafe {
        let acc = vmlal_s16(acc, vget_low_s16(xl), vget_low_s16(yl));
        let acc = vmlal_high_s16(acc, xl, yl);
        let acc = vmlal_s16(acc, vget_low_s16(xh), vget_low_s16(yh));
        vmlal_high_s16(acc, xh, yh)
    }
}

// 16 bytes hold at most 128 set bits, so a per-register `u8` sum never overflows.

#[target_feature(enable = "neon")]
unsafe fn hamming_b8_neon(a: &[u8], b: &[u8]) -> u32 {
    let chunks = a.len() / 16;
    let mut differing = 0u32;

    for i in 0..chunks {
        unsafe {
            let va = vld1q_u8(a.as_ptr().add(i * 16));
            let vb = vld1q_u8(b.as_ptr().add(i * 16));
            differing += vaddvq_u8(vcntq_u8(veorq_u8(va, vb))) as u32;
        }
    }
    for (&x, &y) in a[chunks * 16..].iter().zip(&b[chunks * 16..]) {
        differing += (x ^ y).count_ones();
    }
    differing
}

#[target_feature(enable = "neon")]
unsafe fn jaccard_counts_neon(a: &[u8], b: &[u8]) -> (u32, u32) {
    let chunks = a.len() / 16;
    let (mut intersection, mut union) = (0u32, 0u32);

    for i in 0..chunks {
        unsafe {
            let va = vld1q_u8(a.as_ptr().add(i * 16));
            let vb = vld1q_u8(b.as_ptr().add(i * 16));
            intersection += vaddvq_u8(vcntq_u8(vandq_u8(va, vb))) as u32;
            union += vaddvq_u8(vcntq_u8(vorrq_u8(va, vb))) as u32;
        }
    }
    for (&x, &y) in a[chunks * 16..].iter().zip(&b[chunks * 16..]) {
        intersection += (x & y).count_ones();
        union += (x | y).count_ones();
    }
    (intersection, union)
}

#[cfg(test)]
mod tests {
    use super::super::{MetricFn, accurate};
    use super::*;
    use crate::pair::{Scalar, VectorPair};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn float_kernels_match_reference() {
        for dims in [3, 4, 9, 1536] {
            let mut pair = VectorPair::<f32>::new(dims);
            pair.randomize(&mut StdRng::seed_from_u64(42));
            let kernels: [(MetricFn<f32>, MetricFn<f32>); 3] = [
                (dot_f32, accurate::dot_f32),
                (cos_f32, accurate::cos_f32),
                (l2sq_f32, accurate::l2sq_f32),
            ];
            for (contender, reference) in kernels {
                let (mut c, mut r) = ([0.0; 2], [0.0; 2]);
                contender(pair.a(), pair.b(), dims, &mut c);
                reference(pair.a(), pair.b(), dims, &mut r);
                assert!((c[0] - r[0]).abs() < 1e-5, "{dims}: {} vs {}", c[0], r[0]);
            }
        }
    }

    fn agree<T: Scalar>(contender: MetricFn<T>, reference: MetricFn<T>, dims: usize, tolerance: f64) {
        let mut pair = VectorPair::<T>::new(dims);
        pair.randomize(&mut StdRng::seed_from_u64(42));
        let (mut c, mut r) = ([0.0; 2], [0.0; 2]);
        contender(pair.a(), pair.b(), dims, &mut c);
        reference(pair.a(), pair.b(), dims, &mut r);
        let scale = r[0].abs().max(r[1].abs()).max(1.0);
        for slot in 0..2 {
            assert!(
                (c[slot] - r[slot]).abs() <= tolerance * scale,
                "{} x {dims} slot {slot}: {} vs {}",
                T::KIND,
                c[slot],
                r[slot]
            );
        }
    }

    #[test]
    fn half_precision_kernels_match_reference() {
        for dims in [3, 8, 255, 257, 1536] {
            agree::<f16>(dot_f16, accurate::dot_f16, dims, 1e-5);
            agree::<f16>(cos_f16, accurate::cos_f16, dims, 1e-5);
            agree::<f16>(l2sq_f16, accurate::l2sq_f16, dims, 1e-5);
            agree::<f16>(kl_f16, accurate::kl_f16, dims, 1e-4);
            agree::<f16>(js_f16, accurate::js_f16, dims, 1e-4);
        }
    }

    #[test]
    fn divergence_and_complex_kernels_match_reference() {
        for dims in [2, 9, 16, 1536] {
            agree::<f32>(kl_f32, accurate::kl_f32, dims, 1e-4);
            agree::<f32>(js_f32, accurate::js_f32, dims, 1e-4);
            agree::<f32>(dot_f32c, accurate::dot_f32c, dims, 1e-5);
        }
    }

    #[test]
    fn integer_kernels_match_reference() {
        for dims in [5, 16, 45, 1536] {
            agree::<i8>(l2sq_i8, accurate::l2sq_i8, dims, 0.0);
            agree::<i8>(cos_i8, accurate::cos_i8, dims, 1e-5);
        }
        let a = vec![-128i8; 4099 * 16];
        let b = vec![127i8; 4099 * 16];
        let (mut c, mut r) = ([0.0; 2], [0.0; 2]);
        l2sq_i8(&a, &b, a.len(), &mut c);
        serial::l2sq_i8(&a, &b, a.len(), &mut r);
        assert_eq!(c, r);
    }

    #[test]
    fn bit_kernels_are_exact() {
        for dims in [7, 16, 100] {
            let mut pair = VectorPair::<u8>::new(dims);
            pair.randomize(&mut StdRng::seed_from_u64(9));
            let (mut c, mut r) = ([0.0; 2], [0.0; 2]);
            hamming_b8(pair.a(), pair.b(), dims, &mut c);
            serial::hamming_b8(pair.a(), pair.b(), dims, &mut r);
            assert_eq!(c, r);
            jaccard_b8(pair.a(), pair.b(), dims, &mut c);
            serial::jaccard_b8(pair.a(), pair.b(), dims, &mut r);
            assert_eq!(c, r);
        }
    }
}
