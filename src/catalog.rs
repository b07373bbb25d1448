//! The registration table: which kernels are benchmarked against which baselines.
//!
//! Every enabled tier contributes its contenders; `serial` is always
//! registered last. Baselines are fixed per scalar type and metric: the
//! `accurate` kernels for `f16`, `f32`, `i8` and complex inputs, the `serial`
//! kernels for `f64` and bit-sets.

use std::time::Duration;

use half::f16;

use crate::bench::{Registry, State};
use crate::measure::{FunctionKind, measure};
use crate::pair::{InputFill, Scalar, VectorPair};
use crate::simd::{self, MetricFn, Tier, accurate, serial};

/// Settings applied to every registered case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSettings {
    pub dimensions: usize,
    pub min_time: Duration,
    pub threads: usize,
    pub iterations: Option<u64>,
    pub fill: InputFill,
    pub seed: u64,
}

impl Default for CaseSettings {
    fn default() -> Self {
        Self {
            dimensions: 1536,
            min_time: Duration::from_secs(10),
            threads: num_cpus::get(),
            iterations: None,
            fill: InputFill::Random,
            seed: 42,
        }
    }
}

/// Register one contender/baseline pair as `{name}_{dimensions}d`.
///
/// Each thread builds its own pair from its seeded RNG before measuring.
pub fn register<T: Scalar>(
    registry: &mut Registry,
    settings: &CaseSettings,
    name: &str,
    kind: FunctionKind,
    contender: MetricFn<T>,
    baseline: MetricFn<T>,
) {
    let fill = settings.fill;
    registry
        .register(
            format!("{name}_{}d", settings.dimensions),
            T::KIND,
            kind,
            move |state: &mut State| {
                let dimensions = state.dimensions();
                let pair = VectorPair::<T>::generate(dimensions, fill, state.rng());
                measure(state, &pair, kind, contender, baseline);
            },
        )
        .dimensions(settings.dimensions)
        .min_time(settings.min_time)
        .threads(settings.threads)
        .iterations(settings.iterations)
        .seed(settings.seed);
}

fn distance<T: Scalar>(
    registry: &mut Registry,
    settings: &CaseSettings,
    name: &str,
    contender: MetricFn<T>,
    baseline: MetricFn<T>,
) {
    register(registry, settings, name, FunctionKind::Distance, contender, baseline);
}

/// Register every enabled tier's kernels, then the serial tier.
pub fn register_all(registry: &mut Registry, settings: &CaseSettings, tiers: &[Tier]) {
    for &tier in tiers {
        if tier == Tier::Serial {
            continue;
        }
        let before = registry.len();
        register_tier(registry, settings, tier);
        tracing::info!(%tier, cases = registry.len() - before, "registered tier");
    }
    let before = registry.len();
    register_serial(registry, settings);
    tracing::info!(tier = %Tier::Serial, cases = registry.len() - before, "registered tier");
}

/// Register every tier this machine can run.
pub fn register_available(registry: &mut Registry, settings: &CaseSettings) {
    register_all(registry, settings, &simd::available_tiers());
}

fn register_tier(registry: &mut Registry, settings: &CaseSettings, tier: Tier) {
    match tier {
        #[cfg(target_arch = "x86_64")]
        Tier::Haswell => register_haswell(registry, settings),
        #[cfg(all(target_arch = "x86_64", feature = "avx512"))]
        Tier::Skylake => register_skylake(registry, settings),
        #[cfg(all(target_arch = "x86_64", feature = "avx512"))]
        Tier::Ice => register_ice(registry, settings),
        #[cfg(target_arch = "aarch64")]
        Tier::Neon => register_neon(registry, settings),
        Tier::Serial => register_serial(registry, settings),
        other => tracing::warn!(tier = %other, "tier not compiled into this binary, skipping"),
    }
}

#[cfg(target_arch = "x86_64")]
fn register_haswell(r: &mut Registry, s: &CaseSettings) {
    use crate::simd::haswell;

    distance::<f16>(r, s, "avx2_f16_dot", haswell::dot_f16, accurate::dot_f16);
    distance::<f16>(r, s, "avx2_f16_cos", haswell::cos_f16, accurate::cos_f16);
    distance::<f16>(r, s, "avx2_f16_l2sq", haswell::l2sq_f16, accurate::l2sq_f16);
    distance::<f16>(r, s, "avx2_f16_kl", haswell::kl_f16, accurate::kl_f16);
    distance::<f16>(r, s, "avx2_f16_js", haswell::js_f16, accurate::js_f16);

    distance::<f32>(r, s, "avx2_f32_dot", haswell::dot_f32, accurate::dot_f32);
    distance::<f32>(r, s, "avx2_f32_cos", haswell::cos_f32, accurate::cos_f32);
    distance::<f32>(r, s, "avx2_f32_l2sq", haswell::l2sq_f32, accurate::l2sq_f32);

    distance::<i8>(r, s, "avx2_i8_cos", haswell::cos_i8, accurate::cos_i8);
    distance::<i8>(r, s, "avx2_i8_l2sq", haswell::l2sq_i8, accurate::l2sq_i8);

    distance::<u8>(r, s, "avx2_b8_hamming", haswell::hamming_b8, serial::hamming_b8);
    distance::<u8>(r, s, "avx2_b8_jaccard", haswell::jaccard_b8, serial::jaccard_b8);
}

#[cfg(all(target_arch = "x86_64", feature = "avx512"))]
fn register_skylake(r: &mut Registry, s: &CaseSettings) {
    use crate::simd::skylake;

    distance::<f32>(r, s, "avx512_f32_dot", skylake::dot_f32, accurate::dot_f32);
    distance::<f32>(r, s, "avx512_f32_cos", skylake::cos_f32, accurate::cos_f32);
    distance::<f32>(r, s, "avx512_f32_l2sq", skylake::l2sq_f32, accurate::l2sq_f32);
    distance::<f32>(r, s, "avx512_f32_kl", skylake::kl_f32, accurate::kl_f32);
    distance::<f32>(r, s, "avx512_f32_js", skylake::js_f32, accurate::js_f32);

    distance::<f64>(r, s, "avx512_f64_dot", skylake::dot_f64, serial::dot_f64);
    distance::<f64>(r, s, "avx512_f64_cos", skylake::cos_f64, serial::cos_f64);
    distance::<f64>(r, s, "avx512_f64_l2sq", skylake::l2sq_f64, serial::l2sq_f64);
}

#[cfg(all(target_arch = "x86_64", feature = "avx512"))]
fn register_ice(r: &mut Registry, s: &CaseSettings) {
    use crate::simd::ice;

    distance::<i8>(r, s, "avx512_i8_cos", ice::cos_i8, accurate::cos_i8);
    distance::<i8>(r, s, "avx512_i8_l2sq", ice::l2sq_i8, accurate::l2sq_i8);

    distance::<u8>(r, s, "avx512_b8_hamming", ice::hamming_b8, serial::hamming_b8);
    distance::<u8>(r, s, "avx512_b8_jaccard", ice::jaccard_b8, serial::jaccard_b8);
}

#[cfg(target_arch = "aarch64")]
fn register_neon(r: &mut Registry, s: &CaseSettings) {
    use crate::simd::neon;

    distance::<f16>(r, s, "neon_f16_dot", neon::dot_f16, accurate::dot_f16);
    distance::<f16>(r, s, "neon_f16_cos", neon::cos_f16, accurate::cos_f16);
    distance::<f16>(r, s, "neon_f16_l2sq", neon::l2sq_f16, accurate::l2sq_f16);
    distance::<f16>(r, s, "neon_f16_kl", neon::kl_f16, accurate::kl_f16);
    distance::<f16>(r, s, "neon_f16_js", neon::js_f16, accurate::js_f16);

    distance::<f32>(r, s, "neon_f32_dot", neon::dot_f32, accurate::dot_f32);
    distance::<f32>(r, s, "neon_f32_cos", neon::cos_f32, accurate::cos_f32);
    distance::<f32>(r, s, "neon_f32_l2sq", neon::l2sq_f32, accurate::l2sq_f32);
    distance::<f32>(r, s, "neon_f32_kl", neon::kl_f32, accurate::kl_f32);
    distance::<f32>(r, s, "neon_f32_js", neon::js_f32, accurate::js_f32);

    distance::<i8>(r, s, "neon_i8_cos", neon::cos_i8, accurate::cos_i8);
    distance::<i8>(r, s, "neon_i8_l2sq", neon::l2sq_i8, accurate::l2sq_i8);

    distance::<u8>(r, s, "neon_b8_hamming", neon::hamming_b8, serial::hamming_b8);
    distance::<u8>(r, s, "neon_b8_jaccard", neon::jaccard_b8, serial::jaccard_b8);

    register::<f32>(r, s, "neon_f32c_dot", FunctionKind::ComplexDot, neon::dot_f32c, accurate::dot_f32c);
}

fn register_serial(r: &mut Registry, s: &CaseSettings) {
    distance::<f16>(r, s, "serial_f16_dot", serial::dot_f16, accurate::dot_f16);
    distance::<f16>(r, s, "serial_f16_cos", serial::cos_f16, accurate::cos_f16);
    distance::<f16>(r, s, "serial_f16_l2sq", serial::l2sq_f16, accurate::l2sq_f16);
    distance::<f16>(r, s, "serial_f16_kl", serial::kl_f16, accurate::kl_f16);
    distance::<f16>(r, s, "serial_f16_js", serial::js_f16, accurate::js_f16);

    distance::<f32>(r, s, "serial_f32_dot", serial::dot_f32, accurate::dot_f32);
    distance::<f32>(r, s, "serial_f32_cos", serial::cos_f32, accurate::cos_f32);
    distance::<f32>(r, s, "serial_f32_l2sq", serial::l2sq_f32, accurate::l2sq_f32);
    distance::<f32>(r, s, "serial_f32_kl", serial::kl_f32, accurate::kl_f32);
    distance::<f32>(r, s, "serial_f32_js", serial::js_f32, accurate::js_f32);

    distance::<f64>(r, s, "serial_f64_dot", serial::dot_f64, serial::dot_f64);
    distance::<f64>(r, s, "serial_f64_cos", serial::cos_f64, serial::cos_f64);
    distance::<f64>(r, s, "serial_f64_l2sq", serial::l2sq_f64, serial::l2sq_f64);

    distance::<i8>(r, s, "serial_i8_cos", serial::cos_i8, accurate::cos_i8);
    distance::<i8>(r, s, "serial_i8_l2sq", serial::l2sq_i8, accurate::l2sq_i8);

    register::<f32>(r, s, "serial_f32c_dot", FunctionKind::ComplexDot, serial::dot_f32c, accurate::dot_f32c);
    register::<f16>(r, s, "serial_f16c_dot", FunctionKind::ComplexDot, serial::dot_f16c, accurate::dot_f16c);

    distance::<u8>(r, s, "serial_b8_hamming", serial::hamming_b8, serial::hamming_b8);
    distance::<u8>(r, s, "serial_b8_jaccard", serial::jaccard_b8, serial::jaccard_b8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::ScalarKind;
    use std::collections::HashSet;

    fn settings() -> CaseSettings {
        CaseSettings {
            dimensions: 1536,
            min_time: Duration::from_millis(1),
            threads: 2,
            iterations: Some(1),
            fill: InputFill::Random,
            seed: 7,
        }
    }

    #[test]
    fn serial_tier_alone_registers_nineteen_cases() {
        let mut registry = Registry::new();
        register_all(&mut registry, &settings(), &[]);
        assert_eq!(registry.len(), 19);
        assert!(registry.get("serial_f32_dot_1536d").is_some());
        assert_eq!(
            registry.cases().last().map(|c| c.name()),
            Some("serial_b8_jaccard_1536d")
        );
    }

    #[test]
    fn names_are_unique_and_serial_comes_last() {
        let mut registry = Registry::new();
        register_available(&mut registry, &settings());
        let names: HashSet<_> = registry.cases().iter().map(|c| c.name()).collect();
        assert_eq!(names.len(), registry.len());

        let first_serial = registry
            .cases()
            .iter()
            .position(|c| c.name().starts_with("serial_"))
            .unwrap();
        assert!(registry.cases()[first_serial..].iter().all(|c| c.name().starts_with("serial_")));
    }

    #[test]
    fn settings_reach_every_case() {
        let mut registry = Registry::new();
        register_all(&mut registry, &settings(), &[Tier::Serial]);
        for case in registry.cases() {
            assert_eq!(case.dimensions(), 1536);
            assert_eq!(case.threads(), 2);
            assert_eq!(case.fixed_iterations(), Some(1));
            assert_eq!(case.seed(), 7);
            assert!(case.name().ends_with("_1536d"));
        }
        assert_eq!(registry.len(), 19);
    }

    #[test]
    fn scalar_and_kind_metadata() {
        let mut registry = Registry::new();
        register_all(&mut registry, &settings(), &[]);
        let complex = registry.get("serial_f32c_dot_1536d").unwrap();
        assert_eq!(complex.kind(), FunctionKind::ComplexDot);
        assert_eq!(complex.scalar(), ScalarKind::F32);
        assert_eq!(registry.get("serial_b8_hamming_1536d").unwrap().scalar(), ScalarKind::B8);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn haswell_table_uses_avx2_prefix() {
        let mut registry = Registry::new();
        register_tier(&mut registry, &settings(), Tier::Haswell);
        assert_eq!(registry.len(), 12);
        assert!(registry.cases().iter().all(|c| c.name().starts_with("avx2_")));
        assert!(registry.get("avx2_f16_kl_1536d").is_some());
        assert!(registry.get("avx2_f16_js_1536d").is_some());
    }

    #[cfg(all(target_arch = "x86_64", feature = "avx512"))]
    #[test]
    fn avx512_tables_cover_divergences_and_bit_sets() {
        let mut registry = Registry::new();
        register_tier(&mut registry, &settings(), Tier::Skylake);
        assert_eq!(registry.len(), 8);
        register_tier(&mut registry, &settings(), Tier::Ice);
        assert_eq!(registry.len(), 12);
        for name in ["avx512_f32_kl", "avx512_f32_js", "avx512_b8_hamming", "avx512_b8_jaccard"] {
            assert!(registry.get(&format!("{name}_1536d")).is_some(), "missing {name}");
        }
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn neon_table_covers_every_scalar_type() {
        let mut registry = Registry::new();
        register_tier(&mut registry, &settings(), Tier::Neon);
        assert_eq!(registry.len(), 15);
        assert!(registry.cases().iter().all(|c| c.name().starts_with("neon_")));
        let complex = registry.get("neon_f32c_dot_1536d").unwrap();
        assert_eq!(complex.kind(), FunctionKind::ComplexDot);
        for scalar in [ScalarKind::F16, ScalarKind::F32, ScalarKind::I8, ScalarKind::B8] {
            assert!(registry.cases().iter().any(|c| c.scalar() == scalar), "no {scalar} case");
        }
    }

    #[test]
    fn unbuildable_tiers_register_nothing() {
        let mut registry = Registry::new();
        register_tier(&mut registry, &settings(), Tier::Sapphire);
        register_tier(&mut registry, &settings(), Tier::Sve);
        assert!(registry.is_empty());
    }
}
