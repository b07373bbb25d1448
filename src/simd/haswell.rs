//! AVX2 (256-bit) kernels for x86_64 Haswell and newer.
//!
//! Each public kernel checks for AVX2 + FMA + F16C at runtime and drops to the
//! serial tier when they are missing, so the functions are safe to call on any
//! x86_64 machine. Elements that don't fill a full register are handled by a
//! scalar tail.

use std::arch::x86_64::*;

use half::f16;

use super::serial;
use super::{DIVISION_EPSILON, Distance, cosine_from_parts, haswell_detected};

/// Chunks of 16 `i8` lanes summed into `i32` before widening to `i64`.
const I8_BLOCK_CHUNKS: usize = 4096;

// ---------------------------------------------------------------------------
// f16
// ---------------------------------------------------------------------------

pub fn dot_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        // Safety: AVX2, FMA and F16C confirmed at runtime.
        let (ab, _, _) = unsafe { parts_f16(a, b, false) };
        out[0] = ab as Distance;
    } else {
        serial::dot_f16(a, b, n, out);
    }
}

pub fn cos_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        let (ab, a2, b2) = unsafe { parts_f16(a, b, true) };
        out[0] = cosine_from_parts(ab, a2, b2);
    } else {
        serial::cos_f16(a, b, n, out);
    }
}

pub fn l2sq_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        out[0] = unsafe { l2sq_f16_avx2(a, b) } as Distance;
    } else {
        serial::l2sq_f16(a, b, n, out);
    }
}

pub fn kl_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        out[0] = unsafe { kl_f16_avx2(a, b) } as Distance;
    } else {
        serial::kl_f16(a, b, n, out);
    }
}

pub fn js_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        out[0] = unsafe { js_f16_avx2(a, b) } as Distance;
    } else {
        serial::js_f16(a, b, n, out);
    }
}

#[target_feature(enable = "avx2", enable = "fma", enable = "f16c")]
unsafe fn load_ph(ptr: *const f16) -> __m256 {
    unsafe { _mm256_cvtph_ps(_mm_loadu_si128(ptr as *const __m128i)) }
}

/// Dot product and, when `norms` is set, both squared norms.
#[target_feature(enable = "avx2", enable = "fma", enable = "f16c")]
unsafe fn parts_f16(a: &[f16], b: &[f16], norms: bool) -> (f32, f32, f32) {
    let len = a.len();
    let chunks = len / 8;

    let (mut ab, mut a2, mut b2) = unsafe {
        let (mut vab, mut va2, mut vb2) = (_mm256_setzero_ps(), _mm256_setzero_ps(), _mm256_setzero_ps());
        for i in 0..chunks {
            let offset = i * 8;
            let va = load_ph(a.as_ptr().add(offset));
            let vb = load_ph(b.as_ptr().add(offset));
            vab = _mm256_fmadd_ps(va, vb, vab);
            if norms {
                va2 = _mm256_fmadd_ps(va, va, va2);
                vb2 = _mm256_fmadd_ps(vb, vb, vb2);
            }
        }
        (hsum256_ps(vab), hsum256_ps(va2), hsum256_ps(vb2))
    };

    for i in chunks * 8..len {
        let (x, y) = (a[i].to_f32(), b[i].to_f32());
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    (ab, a2, b2)
}

#[target_feature(enable = "avx2", enable = "fma", enable = "f16c")]
unsafe fn l2sq_f16_avx2(a: &[f16], b: &[f16]) -> f32 {
    let len = a.len();
    let chunks = len / 8;

    let mut d2 = unsafe {
        let mut sum = _mm256_setzero_ps();
        for i in 0..chunks {
            let offset = i * 8;
            let d = _mm256_sub_ps(load_ph(a.as_ptr().add(offset)), load_ph(b.as_ptr().add(offset)));
            sum = _mm256_fmadd_ps(d, d, sum);
        }
        hsum256_ps(sum)
    };

    for i in chunks * 8..len {
        let d = a[i].to_f32() - b[i].to_f32();
        d2 += d * d;
    }
    d2
}

#[target_feature(enable = "avx2", enable = "fma", enable = "f16c")]
unsafe fn kl_f16_avx2(a: &[f16], b: &[f16]) -> f32 {
    let len = a.len();
    let chunks = len / 8;
    let eps = DIVISION_EPSILON as f32;

    let mut d = unsafe {
        let veps = _mm256_set1_ps(eps);
        let mut sum = _mm256_setzero_ps();
        for i in 0..chunks {
            let offset = i * 8;
            let va = load_ph(a.as_ptr().add(offset));
            let vb = load_ph(b.as_ptr().add(offset));
            let ratio = _mm256_div_ps(_mm256_add_ps(va, veps), _mm256_add_ps(vb, veps));
            sum = _mm256_fmadd_ps(va, ln_ps(ratio), sum);
        }
        hsum256_ps(sum)
    };

    for i in chunks * 8..len {
        let (x, y) = (a[i].to_f32(), b[i].to_f32());
        d += x * ((x + eps) / (y + eps)).ln();
    }
    d
}

#[target_feature(enable = "avx2", enable = "fma", enable = "f16c")]
unsafe fn js_f16_avx2(a: &[f16], b: &[f16]) -> f32 {
    let len = a.len();
    let chunks = len / 8;
    let eps = DIVISION_EPSILON as f32;

    let mut d = unsafe {
        let (veps, vhalf) = (_mm256_set1_ps(eps), _mm256_set1_ps(0.5));
        let mut sum = _mm256_setzero_ps();
        for i in 0..chunks {
            let offset = i * 8;
            let va = load_ph(a.as_ptr().add(offset));
            let vb = load_ph(b.as_ptr().add(offset));
            let vm = _mm256_add_ps(_mm256_mul_ps(_mm256_add_ps(va, vb), vhalf), veps);
            let ratio_a = _mm256_div_ps(_mm256_add_ps(va, veps), vm);
            let ratio_b = _mm256_div_ps(_mm256_add_ps(vb, veps), vm);
            sum = _mm256_fmadd_ps(va, ln_ps(ratio_a), sum);
            sum = _mm256_fmadd_ps(vb, ln_ps(ratio_b), sum);
        }
        hsum256_ps(sum)
    };

    for i in chunks * 8..len {
        let (x, y) = (a[i].to_f32(), b[i].to_f32());
        let m = (x + y) * 0.5;
        d += x * ((x + eps) / (m + eps)).ln();
        d += y * ((y + eps) / (m + eps)).ln();
    }
    d * 0.5
}

/// Natural logarithm of 8 positive, normal f32 lanes.
///
/// `x = 2^e * m` with `m` in `[1, 2)`; `ln(m)` comes from the series
/// `2 * atanh(t)` with `t = (m - 1) / (m + 1)`, truncated after `t^9`.
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn ln_ps(x: __m256) -> __m256 {
    unsafe {
        let bits = _mm256_castps_si256(x);
        let exponent = _mm256_sub_epi32(_mm256_srli_epi32(bits, 23), _mm256_set1_epi32(127));
        let mantissa = _mm256_castsi256_ps(_mm256_or_si256(
            _mm256_and_si256(bits, _mm256_set1_epi32(0x007F_FFFF)),
            _mm256_set1_epi32(0x3F80_0000),
        ));

        let one = _mm256_set1_ps(1.0);
        let t = _mm256_div_ps(_mm256_sub_ps(mantissa, one), _mm256_add_ps(mantissa, one));
        let t2 = _mm256_mul_ps(t, t);
        let mut series = _mm256_set1_ps(1.0 / 9.0);
        series = _mm256_fmadd_ps(series, t2, _mm256_set1_ps(1.0 / 7.0));
        series = _mm256_fmadd_ps(series, t2, _mm256_set1_ps(1.0 / 5.0));
        series = _mm256_fmadd_ps(series, t2, _mm256_set1_ps(1.0 / 3.0));
        series = _mm256_fmadd_ps(series, t2, one);
        let ln_mantissa = _mm256_mul_ps(_mm256_mul_ps(t, series), _mm256_set1_ps(2.0));

        _mm256_fmadd_ps(
            _mm256_cvtepi32_ps(exponent),
            _mm256_set1_ps(std::f32::consts::LN_2),
            ln_mantissa,
        )
    }
}

// ---------------------------------------------------------------------------
// f32
// ---------------------------------------------------------------------------

pub fn dot_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        let (ab, _, _) = unsafe { parts_f32(a, b, false) };
        out[0] = ab as Distance;
    } else {
        serial::dot_f32(a, b, n, out);
    }
}

pub fn cos_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        let (ab, a2, b2) = unsafe { parts_f32(a, b, true) };
        out[0] = cosine_from_parts(ab, a2, b2);
    } else {
        serial::cos_f32(a, b, n, out);
    }
}

pub fn l2sq_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        out[0] = unsafe { l2sq_f32_avx2(a, b) } as Distance;
    } else {
        serial::l2sq_f32(a, b, n, out);
    }
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn parts_f32(a: &[f32], b: &[f32], norms: bool) -> (f32, f32, f32) {
    let len = a.len();
    let chunks = len / 8;

    let (mut ab, mut a2, mut b2) = unsafe {
        let (mut vab, mut va2, mut vb2) = (_mm256_setzero_ps(), _mm256_setzero_ps(), _mm256_setzero_ps());
        for i in 0..chunks {
            let offset = i * 8;
            let va = _mm256_loadu_ps(a.as_ptr().add(offset));
            let vb = _mm256_loadu_ps(b.as_ptr().add(offset));
            vab = _mm256_fmadd_ps(va, vb, vab);
            if norms {
                va2 = _mm256_fmadd_ps(va, va, va2);
                vb2 = _mm256_fmadd_ps(vb, vb, vb2);
            }
        }
        (hsum256_ps(vab), hsum256_ps(va2), hsum256_ps(vb2))
    };

    for i in chunks * 8..len {
        let (x, y) = (a[i], b[i]);
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    (ab, a2, b2)
}

#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn l2sq_f32_avx2(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len();
    let chunks = len / 8;

    let mut d2 = unsafe {
        let mut sum = _mm256_setzero_ps();
        for i in 0..chunks {
            let offset = i * 8;
            let va = _mm256_loadu_ps(a.as_ptr().add(offset));
            let vb = _mm256_loadu_ps(b.as_ptr().add(offset));
            let d = _mm256_sub_ps(va, vb);
            sum = _mm256_fmadd_ps(d, d, sum);
        }
        hsum256_ps(sum)
    };

    for i in chunks * 8..len {
        let d = a[i] - b[i];
        d2 += d * d;
    }
    d2
}

/// Horizontal sum of 8 f32 lanes.
#[target_feature(enable = "avx2")]
unsafe fn hsum256_ps(v: __m256) -> f32 {
    unsafe {
        let sum128 = _mm_add_ps(_mm256_extractf128_ps(v, 1), _mm256_castps256_ps128(v));
        let sums = _mm_add_ps(sum128, _mm_movehdup_ps(sum128));
        let sums = _mm_add_ss(sums, _mm_movehl_ps(sums, sums));
        _mm_cvtss_f32(sums)
    }
}

// ---------------------------------------------------------------------------
// i8
// ---------------------------------------------------------------------------

pub fn cos_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        let (ab, a2, b2) = unsafe { cos_i8_avx2(a, b) };
        out[0] = cosine_from_parts(ab as f32, a2 as f32, b2 as f32);
    } else {
        serial::cos_i8(a, b, n, out);
    }
}

pub fn l2sq_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        out[0] = unsafe { l2sq_i8_avx2(a, b) } as Distance;
    } else {
        serial::l2sq_i8(a, b, n, out);
    }
}

#[target_feature(enable = "avx2")]
unsafe fn load_epi8_as_epi16(ptr: *const i8) -> __m256i {
    unsafe { _mm256_cvtepi8_epi16(_mm_loadu_si128(ptr as *const __m128i)) }
}

#[target_feature(enable = "avx2")]
unsafe fn cos_i8_avx2(a: &[i8], b: &[i8]) -> (i64, i64, i64) {
    let len = a.len();
    let chunks = len / 16;
    let (mut ab, mut a2, mut b2) = (0i64, 0i64, 0i64);

    let mut start = 0;
    while start < chunks {
        let end = (start + I8_BLOCK_CHUNKS).min(chunks);
        unsafe {
            let (mut vab, mut va2, mut vb2) =
                (_mm256_setzero_si256(), _mm256_setzero_si256(), _mm256_setzero_si256());
            for i in start..end {
                let offset = i * 16;
                let va = load_epi8_as_epi16(a.as_ptr().add(offset));
                let vb = load_epi8_as_epi16(b.as_ptr().add(offset));
                vab = _mm256_add_epi32(vab, _mm256_madd_epi16(va, vb));
                va2 = _mm256_add_epi32(va2, _mm256_madd_epi16(va, va));
                vb2 = _mm256_add_epi32(vb2, _mm256_madd_epi16(vb, vb));
            }
            ab += hsum256_epi32(vab);
            a2 += hsum256_epi32(va2);
            b2 += hsum256_epi32(vb2);
        }
        start = end;
    }

    let (tab, ta2, tb2) = serial::cos_i8_parts(&a[chunks * 16..], &b[chunks * 16..]);
    (ab + tab, a2 + ta2, b2 + tb2)
}

#[target_feature(enable = "avx2")]
unsafe fn l2sq_i8_avx2(a: &[i8], b: &[i8]) -> i64 {
    let len = a.len();
    let chunks = len / 16;
    let mut d2 = 0i64;

    let mut start = 0;
    while start < chunks {
        let end = (start + I8_BLOCK_CHUNKS).min(chunks);
        unsafe {
            let mut sum = _mm256_setzero_si256();
            for i in start..end {
                let offset = i * 16;
                let d = _mm256_sub_epi16(
                    load_epi8_as_epi16(a.as_ptr().add(offset)),
                    load_epi8_as_epi16(b.as_ptr().add(offset)),
                );
                sum = _mm256_add_epi32(sum, _mm256_madd_epi16(d, d));
            }
            d2 += hsum256_epi32(sum);
        }
        start = end;
    }

    d2 + serial::l2sq_i8_sum(&a[chunks * 16..], &b[chunks * 16..])
}

/// Horizontal sum of 8 i32 lanes, widened to i64.
#[target_feature(enable = "avx2")]
unsafe fn hsum256_epi32(v: __m256i) -> i64 {
    let mut lanes = [0i32; 8];
    unsafe { _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, v) };
    lanes.iter().map(|&x| x as i64).sum()
}

// ---------------------------------------------------------------------------
// b8
// ---------------------------------------------------------------------------

pub fn hamming_b8(a: &[u8], b: &[u8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        out[0] = unsafe { hamming_b8_popcnt(a, b) } as Distance;
    } else {
        serial::hamming_b8(a, b, n, out);
    }
}

pub fn jaccard_b8(a: &[u8], b: &[u8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if haswell_detected() {
        let (intersection, union) = unsafe { jaccard_counts_popcnt(a, b) };
        out[0] = serial::jaccard_from_counts(intersection, union);
    } else {
        serial::jaccard_b8(a, b, n, out);
    }
}

fn words(bytes: &[u8]) -> impl Iterator<Item = u64> + '_ {
    bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
}

#[target_feature(enable = "popcnt")]
unsafe fn hamming_b8_popcnt(a: &[u8], b: &[u8]) -> u32 {
    let mut differing: u32 = words(a).zip(words(b)).map(|(x, y)| (x ^ y).count_ones()).sum();
    let tail = a.len() / 8 * 8;
    for (&x, &y) in a[tail..].iter().zip(&b[tail..]) {
        differing += (x ^ y).count_ones();
    }
    differing
}

#[target_feature(enable = "popcnt")]
unsafe fn jaccard_counts_popcnt(a: &[u8], b: &[u8]) -> (u32, u32) {
    let (mut intersection, mut union) = (0u32, 0u32);
    for (x, y) in words(a).zip(words(b)) {
        intersection += (x & y).count_ones();
        union += (x | y).count_ones();
    }
    let tail = a.len() / 8 * 8;
    for (&x, &y) in a[tail..].iter().zip(&b[tail..]) {
        intersection += (x & y).count_ones();
        union += (x | y).count_ones();
    }
    (intersection, union)
}
