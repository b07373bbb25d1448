//! AVX-512 BW + VNNI kernels for `i8`, and VPOPCNTDQ kernels for bit-sets.
//!
//! Compiled only with the `avx512` cargo feature. Bytes are sign-extended to
//! 16-bit lanes and accumulated with `vpdpwssd`. Bit-set kernels count set
//! bits 64 bits at a time with `vpopcntq`.

use std::arch::x86_64::*;

use super::serial;
use super::{Distance, cosine_from_parts, ice_detected};

/// Chunks of 32 `i8` lanes summed into `i32` before widening to `i64`.
const BLOCK_CHUNKS: usize = 2048;

pub fn cos_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if ice_detected() {
        // Safety: AVX-512F, BW and VNNI confirmed at runtime.
        let (ab, a2, b2) = unsafe { cos_i8_vnni(a, b) };
        out[0] = cosine_from_parts(ab as f32, a2 as f32, b2 as f32);
    } else {
        serial::cos_i8(a, b, n, out);
    }
}

pub fn l2sq_i8(a: &[i8], b: &[i8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if ice_detected() {
        out[0] = unsafe { l2sq_i8_vnni(a, b) } as Distance;
    } else {
        serial::l2sq_i8(a, b, n, out);
    }
}

pub fn hamming_b8(a: &[u8], b: &[u8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if popcnt_detected() {
        // Safety: AVX-512F and VPOPCNTDQ confirmed at runtime.
        out[0] = unsafe { hamming_b8_vpopcnt(a, b) } as Distance;
    } else {
        serial::hamming_b8(a, b, n, out);
    }
}

pub fn jaccard_b8(a: &[u8], b: &[u8], n: usize, out: &mut [Distance; 2]) {
    let (a, b) = (&a[..n], &b[..n]);
    if popcnt_detected() {
        let (intersection, union) = unsafe { jaccard_counts_vpopcnt(a, b) };
        out[0] = serial::jaccard_from_counts(intersection, union);
    } else {
        serial::jaccard_b8(a, b, n, out);
    }
}

fn popcnt_detected() -> bool {
    ice_detected() && is_x86_feature_detected!("avx512vpopcntdq")
}

#[target_feature(enable = "avx512f", enable = "avx512bw")]
unsafe fn load_epi8_as_epi16(ptr: *const i8) -> __m512i {
    unsafe { _mm512_cvtepi8_epi16(_mm256_loadu_si256(ptr as *const __m256i)) }
}

#[target_feature(enable = "avx512f", enable = "avx512bw", enable = "avx512vnni")]
unsafe fn cos_i8_vnni(a: &[i8], b: &[i8]) -> (i64, i64, i64) {
    let chunks = a.len() / 32;
    let (mut ab, mut a2, mut b2) = (0i64, 0i64, 0i64);

    let mut start = 0;
    while start < chunks {
        let end = (start + BLOCK_CHUNKS).min(chunks);
        unsafe {
            let (mut vab, mut va2, mut vb2) =
                (_mm512_setzero_si512(), _mm512_setzero_si512(), _mm512_setzero_si512());
            for i in start..end {
                let va = load_epi8_as_epi16(a.as_ptr().add(i * 32));
                let vb = load_epi8_as_epi16(b.as_ptr().add(i * 32));
                vab = _mm512_dpwssd_epi32(vab, va, vb);
                va2 = _mm512_dpwssd_epi32(va2, va, va);
                vb2 = _mm512_dpwssd_epi32(vb2, vb, vb);
            }
            ab += _mm512_reduce_add_epi32(vab) as i64;
            a2 += _mm512_reduce_add_epi32(va2) as i64;
            b2 += _mm512_reduce_add_epi32(vb2) as i64;
        }
        start = end;
    }

    let (tab, ta2, tb2) = serial::cos_i8_parts(&a[chunks * 32..], &b[chunks * 32..]);
    (ab + tab, a2 + ta2, b2 + tb2)
}

#[target_feature(enable = "avx512f", enable = "avx512bw", enable = "avx512vnni")]
unsafe fn l2sq_i8_vnni(a: &[i8], b: &[i8]) -> i64 {
    let chunks = a.len() / 32;
    let mut d2 = 0i64;

    let mut start = 0;
    while start < chunks {
        let end = (start + BLOCK_CHUNKS).min(chunks);
        unsafe {
            let mut sum = _mm512_setzero_si512();
            for i in start..end {
                let d = _mm512_sub_epi16(
                    load_epi8_as_epi16(a.as_ptr().add(i * 32)),
                    load_epi8_as_epi16(b.as_ptr().add(i * 32)),
                );
                sum = _mm512_dpwssd_epi32(sum, d, d);
            }
            // Lane sums stay below 2^31 within a block, their total may not.
            let mut lanes = [0i32; 16];
            _mm512_storeu_si512(lanes.as_mut_ptr() as *mut _, sum);
            d2 += lanes.iter().map(|&x| x as i64).sum::<i64>();
        }
        start = end;
    }

    d2 + serial::l2sq_i8_sum(&a[chunks * 32..], &b[chunks * 32..])
}

#[target_feature(enable = "avx512f", enable = "avx512vpopcntdq")]
unsafe fn hamming_b8_vpopcnt(a: &[u8], b: &[u8]) -> u32 {
    let chunks = a.len() / 64;

    let mut differing = unsafe {
        let mut sum = _mm512_setzero_si512();
        for i in 0..chunks {
            let va = _mm512_loadu_si512(a.as_ptr().add(i * 64) as *const _);
            let vb = _mm512_loadu_si512(b.as_ptr().add(i * 64) as *const _);
            sum = _mm512_add_epi64(sum, _mm512_popcnt_epi64(_mm512_xor_si512(va, vb)));
        }
        _mm512_reduce_add_epi64(sum) as u32
    };

    for (&x, &y) in a[chunks * 64..].iter().zip(&b[chunks * 64..]) {
        differing += (x ^ y).count_ones();
    }
    differing
}

#[target_feature(enable = "avx512f", enable = "avx512vpopcntdq")]
unsafe fn jaccard_counts_vpopcnt(a: &[u8], b: &[u8]) -> (u32, u32) {
    let chunks = a.len() / 64;

    let (mut intersection, mut union) = unsafe {
        let (mut and, mut or) = (_mm512_setzero_si512(), _mm512_setzero_si512());
        for i in 0..chunks {
            let va = _mm512_loadu_si512(a.as_ptr().add(i * 64) as *const _);
            let vb = _mm512_loadu_si512(b.as_ptr().add(i * 64) as *const _);
            and = _mm512_add_epi64(and, _mm512_popcnt_epi64(_mm512_and_si512(va, vb)));
            or = _mm512_add_epi64(or, _mm512_popcnt_epi64(_mm512_or_si512(va, vb)));
        }
        (_mm512_reduce_add_epi64(and) as u32, _mm512_reduce_add_epi64(or) as u32)
    };

    for (&x, &y) in a[chunks * 64..].iter().zip(&b[chunks * 64..]) {
        intersection += (x & y).count_ones();
        union += (x | y).count_ones();
    }
    (intersection, union)
}
