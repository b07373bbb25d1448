//! AVX-512F (512-bit) kernels for `f32` and `f64`.
//!
//! Compiled only with the `avx512` cargo feature. Kernels drop to the serial
//! tier when AVX-512F is missing at runtime.

use std::arch::x86_64::*;

use super::serial;
use super::{DIVISION_EPSILON, Distance, cosine_from_parts, skylake_detected};

pub fn dot_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if skylake_detected() {
        // Safety: AVX-512F confirmed at runtime.
        out[0] = unsafe { parts_f32(a, b, false) }.0 as Distance;
    } else {
        serial::dot_f32(a, b, n, out);
    }
}

pub fn cos_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if skylake_detected() {
        let (ab, a2, b2) = unsafe { parts_f32(a, b, true) };
        out[0] = cosine_from_parts(ab, a2, b2);
    } else {
        serial::cos_f32(a, b, n, out);
    }
}

pub fn l2sq_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if skylake_detected() {
        out[0] = unsafe { l2sq_f32_avx512(a, b) } as Distance;
    } else {
        serial::l2sq_f32(a, b, n, out);
    }
}

pub fn kl_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if skylake_detected() {
        out[0] = unsafe { kl_f32_avx512(a, b) } as Distance;
    } else {
        serial::kl_f32(a, b, n, out);
    }
}

pub fn js_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if skylake_detected() {
        out[0] = unsafe { js_f32_avx512(a, b) } as Distance;
    } else {
        serial::js_f32(a, b, n, out);
    }
}

pub fn dot_f64(a: &[f64], b: &[f64], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if skylake_detected() {
        out[0] = unsafe { parts_f64(a, b, false) }.0;
    } else {
        serial::dot_f64(a, b, n, out);
    }
}

pub fn cos_f64(a: &[f64], b: &[f64], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if skylake_detected() {
        let (ab, a2, b2) = unsafe { parts_f64(a, b, true) };
        out[0] = cosine_from_parts(ab, a2, b2);
    } else {
        serial::cos_f64(a, b, n, out);
    }
}

pub fn l2sq_f64(a: &[f64], b: &[f64], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if skylake_detected() {
        out[0] = unsafe { l2sq_f64_avx512(a, b) };
    } else {
        serial::l2sq_f64(a, b, n, out);
    }
}

#[target_feature(enable = "avx512f")]
unsafe fn parts_f32(a: &[f32], b: &[f32], norms: bool) -> (f32, f32, f32) {
    let chunks = a.len() / 16;

    let (mut ab, mut a2, mut b2) = unsafe {
        let (mut vab, mut va2, mut vb2) = (_mm512_setzero_ps(), _mm512_setzero_ps(), _mm512_setzero_ps());
        for i in 0..chunks {
            let va = _mm512_loadu_ps(a.as_ptr().add(i * 16));
            let vb = _mm512_loadu_ps(b.as_ptr().add(i * 16));
            vab = _mm512_fmadd_ps(va, vb, vab);
            if norms {
                va2 = _mm512_fmadd_ps(va, va, va2);
                vb2 = _mm512_fmadd_ps(vb, vb, vb2);
            }
        }
        (_mm512_reduce_add_ps(vab), _mm512_reduce_add_ps(va2), _mm512_reduce_add_ps(vb2))
    };

    for (&x, &y) in a[chunks * 16..].iter().zip(&b[chunks * 16..]) {
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    (ab, a2, b2)
}

#[target_feature(enable = "avx512f")]
unsafe fn l2sq_f32_avx512(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 16;

    let mut d2 = unsafe {
        let mut sum = _mm512_setzero_ps();
        for i in 0..chunks {
            let va = _mm512_loadu_ps(a.as_ptr().add(i * 16));
            let vb = _mm512_loadu_ps(b.as_ptr().add(i * 16));
            let d = _mm512_sub_ps(va, vb);
            sum = _mm512_fmadd_ps(d, d, sum);
        }
        _mm512_reduce_add_ps(sum)
    };

    for (&x, &y) in a[chunks * 16..].iter().zip(&b[chunks * 16..]) {
        let d = x - y;
        d2 += d * d;
    }
    d2
}

#[target_feature(enable = "avx512f")]
unsafe fn kl_f32_avx512(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 16;
    let eps = DIVISION_EPSILON as f32;

    let mut d = unsafe {
        let veps = _mm512_set1_ps(eps);
        let mut sum = _mm512_setzero_ps();
        for i in 0..chunks {
            let va = _mm512_loadu_ps(a.as_ptr().add(i * 16));
            let vb = _mm512_loadu_ps(b.as_ptr().add(i * 16));
            let ratio = _mm512_div_ps(_mm512_add_ps(va, veps), _mm512_add_ps(vb, veps));
            sum = _mm512_fmadd_ps(va, ln_ps(ratio), sum);
        }
        _mm512_reduce_add_ps(sum)
    };

    for (&x, &y) in a[chunks * 16..].iter().zip(&b[chunks * 16..]) {
        d += x * ((x + eps) / (y + eps)).ln();
    }
    d
}

#[target_feature(enable = "avx512f")]
unsafe fn js_f32_avx512(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 16;
    let eps = DIVISION_EPSILON as f32;

    let mut d = unsafe {
        let (veps, vhalf) = (_mm512_set1_ps(eps), _mm512_set1_ps(0.5));
        let mut sum = _mm512_setzero_ps();
        for i in 0..chunks {
            let va = _mm512_loadu_ps(a.as_ptr().add(i * 16));
            let vb = _mm512_loadu_ps(b.as_ptr().add(i * 16));
            let vm = _mm512_add_ps(_mm512_mul_ps(_mm512_add_ps(va, vb), vhalf), veps);
            sum = _mm512_fmadd_ps(va, ln_ps(_mm512_div_ps(_mm512_add_ps(va, veps), vm)), sum);
            sum = _mm512_fmadd_ps(vb, ln_ps(_mm512_div_ps(_mm512_add_ps(vb, veps), vm)), sum);
        }
        _mm512_reduce_add_ps(sum)
    };

    for (&x, &y) in a[chunks * 16..].iter().zip(&b[chunks * 16..]) {
        let m = (x + y) * 0.5;
        d += x * ((x + eps) / (m + eps)).ln();
        d += y * ((y + eps) / (m + eps)).ln();
    }
    d * 0.5
}

/// Natural logarithm of 16 positive f32 lanes: `getexp`/`getmant` split the
/// input into `2^e * m`, then `ln(m) = 2 * atanh((m - 1) / (m + 1))`.
#[target_feature(enable = "avx512f")]
unsafe fn ln_ps(x: __m512) -> __m512 {
    unsafe {
        let exponent = _mm512_getexp_ps(x);
        let mantissa = _mm512_getmant_ps::<_MM_MANT_NORM_1_2, _MM_MANT_SIGN_SRC>(x);

        let one = _mm512_set1_ps(1.0);
        let t = _mm512_div_ps(_mm512_sub_ps(mantissa, one), _mm512_add_ps(mantissa, one));
        let t2 = _mm512_mul_ps(t, t);
        let mut series = _mm512_set1_ps(1.0 / 9.0);
        series = _mm512_fmadd_ps(series, t2, _mm512_set1_ps(1.0 / 7.0));
        series = _mm512_fmadd_ps(series, t2, _mm512_set1_ps(1.0 / 5.0));
        series = _mm512_fmadd_ps(series, t2, _mm512_set1_ps(1.0 / 3.0));
        series = _mm512_fmadd_ps(series, t2, one);
        let ln_mantissa = _mm512_mul_ps(_mm512_mul_ps(t, series), _mm512_set1_ps(2.0));

        _mm512_fmadd_ps(exponent, _mm512_set1_ps(std::f32::consts::LN_2), ln_mantissa)
    }
}

#[target_feature(enable = "avx512f")]
unsafe fn parts_f64(a: &[f64], b: &[f64], norms: bool) -> (f64, f64, f64) {
    let chunks = a.len() / 8;

    let (mut ab, mut a2, mut b2) = unsafe {
        let (mut vab, mut va2, mut vb2) = (_mm512_setzero_pd(), _mm512_setzero_pd(), _mm512_setzero_pd());
        for i in 0..chunks {
            let va = _mm512_loadu_pd(a.as_ptr().add(i * 8));
            let vb = _mm512_loadu_pd(b.as_ptr().add(i * 8));
            vab = _mm512_fmadd_pd(va, vb, vab);
            if norms {
                va2 = _mm512_fmadd_pd(va, va, va2);
                vb2 = _mm512_fmadd_pd(vb, vb, vb2);
            }
        }
        (_mm512_reduce_add_pd(vab), _mm512_reduce_add_pd(va2), _mm512_reduce_add_pd(vb2))
    };

    for (&x, &y) in a[chunks * 8..].iter().zip(&b[chunks * 8..]) {
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    (ab, a2, b2)
}

#[target_feature(enable = "avx512f")]
unsafe fn l2sq_f64_avx512(a: &[f64], b: &[f64]) -> f64 {
    let chunks = a.len() / 8;

    let mut d2 = unsafe {
        let mut sum = _mm512_setzero_pd();
        for i in 0..chunks {
            let va = _mm512_loadu_pd(a.as_ptr().add(i * 8));
            let vb = _mm512_loadu_pd(b.as_ptr().add(i * 8));
            let d = _mm512_sub_pd(va, vb);
            sum = _mm512_fmadd_pd(d, d, sum);
        }
        _mm512_reduce_add_pd(sum)
    };

    for (&x, &y) in a[chunks * 8..].iter().zip(&b[chunks * 8..]) {
        let d = x - y;
        d2 += d * d;
    }
    d2
}
