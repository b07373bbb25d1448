//! Similarity kernels, grouped by hardware tier.
//!
//! Every kernel shares the [`MetricFn`] signature so that a contender and its
//! baseline are interchangeable. At runtime, [`available_tiers`] determines which
//! instruction sets are both compiled in and supported by the CPU, and
//! [`Capabilities`] prints that summary at startup.
//!
//! # Tiers
//!
//! - **Serial**: pure-Rust scalar kernels, works everywhere
//! - **Accurate**: scalar kernels accumulating in `f64`, used as baselines
//! - **Haswell**: x86_64 AVX2 + FMA + F16C
//! - **Skylake**: x86_64 AVX-512F (`avx512` feature)
//! - **Ice**: x86_64 AVX-512BW + VNNI (`avx512` feature)
//! - **Neon**: aarch64 Advanced SIMD
//!
//! Sapphire (AVX-512 FP16) and SVE are listed for reporting, but cannot be
//! built with stable intrinsics and never register anything.

pub mod accurate;
#[cfg(target_arch = "x86_64")]
pub mod haswell;
#[cfg(all(target_arch = "x86_64", feature = "avx512"))]
pub mod ice;
#[cfg(target_arch = "aarch64")]
pub mod neon;
pub mod serial;
#[cfg(all(target_arch = "x86_64", feature = "avx512"))]
pub mod skylake;

use std::io::Write;
use std::ops::{Add, AddAssign, Div, Mul, Sub};

/// Scalar type of kernel outputs.
pub type Distance = f64;

/// Uniform kernel signature: `(a, b, element count, output slots)`.
///
/// Real and bit-set metrics write slot 0; complex metrics write the real part
/// to slot 0 and the imaginary part to slot 1.
pub type MetricFn<T> = fn(a: &[T], b: &[T], n: usize, out: &mut [Distance; 2]);

/// Epsilon guarding divisions and logarithms in the divergence kernels.
pub const DIVISION_EPSILON: f64 = 1e-7;

/// Hardware tier a kernel is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// x86_64 AVX-512 FP16.
    Sapphire,
    /// x86_64 AVX-512 BW + VNNI.
    Ice,
    /// x86_64 AVX-512F.
    Skylake,
    /// x86_64 AVX2 + FMA + F16C.
    Haswell,
    /// aarch64 Scalable Vector Extension.
    Sve,
    /// aarch64 Advanced SIMD (128-bit).
    Neon,
    /// Portable scalar code.
    Serial,
}

impl Tier {
    /// All tiers, widest first.
    pub const ALL: [Tier; 7] = [
        Tier::Sapphire,
        Tier::Ice,
        Tier::Skylake,
        Tier::Haswell,
        Tier::Sve,
        Tier::Neon,
        Tier::Serial,
    ];

    /// Prefix used in benchmark names.
    pub fn prefix(self) -> &'static str {
        match self {
            Tier::Sapphire | Tier::Ice | Tier::Skylake => "avx512",
            Tier::Haswell => "avx2",
            Tier::Sve => "sve",
            Tier::Neon => "neon",
            Tier::Serial => "serial",
        }
    }

    /// Whether kernels for this tier are part of the binary.
    pub fn is_compiled(self) -> bool {
        match self {
            Tier::Sapphire | Tier::Sve => false,
            Tier::Ice | Tier::Skylake => {
                cfg!(all(target_arch = "x86_64", feature = "avx512"))
            }
            Tier::Haswell => cfg!(target_arch = "x86_64"),
            Tier::Neon => cfg!(target_arch = "aarch64"),
            Tier::Serial => true,
        }
    }

    /// Whether the running CPU supports this tier.
    pub fn is_detected(self) -> bool {
        match self {
            Tier::Sapphire => false,
            Tier::Ice => ice_detected(),
            Tier::Skylake => skylake_detected(),
            Tier::Haswell => haswell_detected(),
            Tier::Sve => sve_detected(),
            Tier::Neon => neon_detected(),
            Tier::Serial => true,
        }
    }

    /// Compiled in and supported at runtime.
    pub fn is_enabled(self) -> bool {
        self.is_compiled() && self.is_detected()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Sapphire => write!(f, "Sapphire (AVX-512 FP16)"),
            Tier::Ice => write!(f, "Ice (AVX-512 BW/VNNI)"),
            Tier::Skylake => write!(f, "Skylake (AVX-512F)"),
            Tier::Haswell => write!(f, "Haswell (AVX2)"),
            Tier::Sve => write!(f, "SVE"),
            Tier::Neon => write!(f, "NEON (128-bit)"),
            Tier::Serial => write!(f, "Serial (scalar)"),
        }
    }
}

/// Enabled tiers, widest first. Always ends with [`Tier::Serial`].
pub fn available_tiers() -> Vec<Tier> {
    Tier::ALL.into_iter().filter(|t| t.is_enabled()).collect()
}

#[cfg(target_arch = "x86_64")]
pub fn haswell_detected() -> bool {
    is_x86_feature_detected!("avx2")
        && is_x86_feature_detected!("fma")
        && is_x86_feature_detected!("f16c")
        && is_x86_feature_detected!("popcnt")
}

#[cfg(not(target_arch = "x86_64"))]
pub fn haswell_detected() -> bool {
    false
}

#[cfg(target_arch = "x86_64")]
pub fn skylake_detected() -> bool {
    is_x86_feature_detected!("avx512f")
}

#[cfg(not(target_arch = "x86_64"))]
pub fn skylake_detected() -> bool {
    false
}

#[cfg(target_arch = "x86_64")]
pub fn ice_detected() -> bool {
    is_x86_feature_detected!("avx512f")
        && is_x86_feature_detected!("avx512bw")
        && is_x86_feature_detected!("avx512vnni")
}

#[cfg(not(target_arch = "x86_64"))]
pub fn ice_detected() -> bool {
    false
}

#[cfg(target_arch = "aarch64")]
pub fn neon_detected() -> bool {
    std::arch::is_aarch64_feature_detected!("neon")
}

#[cfg(not(target_arch = "aarch64"))]
pub fn neon_detected() -> bool {
    false
}

#[cfg(target_arch = "aarch64")]
pub fn sve_detected() -> bool {
    std::arch::is_aarch64_feature_detected!("sve")
}

#[cfg(not(target_arch = "aarch64"))]
pub fn sve_detected() -> bool {
    false
}

/// Snapshot of which acceleration paths this binary can use.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Capabilities {
    pub neon: bool,
    pub sve: bool,
    pub haswell: bool,
    pub skylake: bool,
    pub ice: bool,
    pub sapphire: bool,
    /// Hardware half-precision conversion enabled at compile time.
    pub native_f16: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            neon: Tier::Neon.is_enabled(),
            sve: Tier::Sve.is_enabled(),
            haswell: Tier::Haswell.is_enabled(),
            skylake: Tier::Skylake.is_enabled(),
            ice: Tier::Ice.is_enabled(),
            sapphire: Tier::Sapphire.is_enabled(),
            native_f16: cfg!(any(
                all(target_arch = "x86_64", target_feature = "f16c"),
                all(target_arch = "aarch64", target_feature = "fp16")
            )),
        }
    }

    /// Print the startup summary.
    pub fn report(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "Benchmarking Similarity Measures")?;
        writeln!(out)?;
        writeln!(out, "- Arm NEON support enabled: {}", self.neon)?;
        writeln!(out, "- Arm SVE support enabled: {}", self.sve)?;
        writeln!(out, "- x86 HASWELL support enabled: {}", self.haswell)?;
        writeln!(out, "- x86 SKYLAKE support enabled: {}", self.skylake)?;
        writeln!(out, "- x86 ICE support enabled: {}", self.ice)?;
        writeln!(out, "- x86 SAPPHIRE support enabled: {}", self.sapphire)?;
        writeln!(out, "- Compiler supports F16: {}", self.native_f16)?;
        writeln!(out)
    }
}

/// Floating-point accumulator shared by the scalar kernels.
///
/// `serial` kernels accumulate in `f32` (or the input width for `f64`),
/// `accurate` kernels always in `f64`.
pub trait Accumulator:
    Copy
    + PartialEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + AddAssign
{
    const ZERO: Self;
    const ONE: Self;
    const HALF: Self;
    const EPSILON: Self;

    fn sqrt(self) -> Self;
    fn ln(self) -> Self;
    fn to_distance(self) -> Distance;
}

impl Accumulator for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const HALF: Self = 0.5;
    const EPSILON: Self = DIVISION_EPSILON as f32;

    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }

    fn ln(self) -> Self {
        f32::ln(self)
    }

    fn to_distance(self) -> Distance {
        self as Distance
    }
}

impl Accumulator for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const HALF: Self = 0.5;
    const EPSILON: Self = DIVISION_EPSILON;

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn to_distance(self) -> Distance {
        self
    }
}

/// Cosine distance from a dot product and two squared norms.
///
/// Two zero vectors are identical (0); a zero dot product is orthogonal (1).
#[inline]
pub fn cosine_from_parts<A: Accumulator>(ab: A, a2: A, b2: A) -> Distance {
    if a2 == A::ZERO && b2 == A::ZERO {
        0.0
    } else if ab == A::ZERO {
        1.0
    } else {
        (A::ONE - ab / (a2.sqrt() * b2.sqrt())).to_distance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_tier_is_always_available() {
        let tiers = available_tiers();
        assert_eq!(tiers.last(), Some(&Tier::Serial));
        assert!(Tier::Serial.is_enabled());
    }

    #[test]
    fn tiers_are_listed_widest_first() {
        let tiers = available_tiers();
        let mut sorted = tiers.clone();
        sorted.sort();
        assert_eq!(tiers, sorted);
    }

    #[test]
    fn unbuildable_tiers_are_never_enabled() {
        assert!(!Tier::Sapphire.is_enabled());
        assert!(!Tier::Sve.is_enabled());
    }

    #[test]
    fn capability_report_lists_every_flag() {
        let caps = Capabilities::detect();
        let mut out = Vec::new();
        caps.report(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Benchmarking Similarity Measures\n\n"));
        for flag in ["NEON", "SVE", "HASWELL", "SKYLAKE", "ICE", "SAPPHIRE"] {
            assert!(text.contains(&format!("{flag} support enabled: ")), "missing {flag}");
        }
        assert!(text.contains(&format!("- Compiler supports F16: {}", caps.native_f16)));
        assert_eq!(text.lines().count(), 10);
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_from_parts(0.0f32, 0.0, 0.0), 0.0);
        assert_eq!(cosine_from_parts(0.0f64, 1.0, 1.0), 1.0);
        assert!(cosine_from_parts(1.0f64, 1.0, 1.0).abs() < 1e-12);
    }
}
