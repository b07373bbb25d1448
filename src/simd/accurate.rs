//! Reference kernels accumulating in `f64`.
//!
//! These are the baselines for `f16`, `f32`, `i8` and complex inputs: same loops
//! as [`super::serial`], with every product and sum carried out in double precision.

use half::f16;

use super::serial::{complex_dot, cos, cos_i8_parts, dot, js, kl, l2sq, l2sq_i8_sum};
use super::{Distance, cosine_from_parts};

fn widen_f32(x: f32) -> f64 {
    x as f64
}

pub fn dot_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = dot(&a[..n], &b[..n], f16::to_f64);
}

pub fn cos_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = cos(&a[..n], &b[..n], f16::to_f64);
}

pub fn l2sq_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = l2sq(&a[..n], &b[..n], f16::to_f64);
}

pub fn kl_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = kl(&a[..n], &b[..n], f16::to_f64);
}

pub fn js_f16(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    out[0] = js(&a[..n], &b[..n], f16::to_f64);
}

pub fn dot_f16c(a: &[f16], b: &[f16], n: usize, out: &mut [Distance; 2]) {
    (out[0], out[1]) = complex_dot(&a[..n], &b[..n], f16::to_f64);
}

pub fn dot_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = dot(&a[..n], &b[..n], widen_f32);
}

pub fn cos_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = cos(&a[..n], &b[..n], widen_f32);
}

pub fn l2sq_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = l2sq(&a[..n], &b[..n], widen_f32);
}

pub fn kl_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = kl(&a[..n], &b[..n], widen_f32);
}

pub fn js_f32(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    out[0] = js(&a[..n], &b[..n], widen_f32);
}

pub fn dot_f32c(a: &[f32], b: &[f32], n: usize, out: &mut [Distance; 2]) {
    (out[0], out[1]) = complex_dot(&a[..n], &b[..n], widen_f32);
}

pub fn cos_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    let (ab, a2, b2) = cos_i8_parts(&a[..n], &b[..n]);
    out[0] = cosine_from_parts(ab as f64, a2 as f64, b2 as f64);
}

pub fn l2sq_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    out[0] = l2sq_i8_sum(&a[..n], &b[..n]) as Distance;
}
