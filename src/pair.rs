//! Synthetic inputs for the benchmarks.
//!
//! A [`VectorPair`] holds the two operands every kernel call receives. Pairs are
//! generated once per benchmark thread and stay fixed for the whole timed loop,
//! so every contender call sees exactly the same bytes.

use half::f16;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Closed set of element types the harness knows how to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// IEEE 754 binary16.
    F16,
    F32,
    F64,
    /// Signed 8-bit integer.
    I8,
    /// One byte of a packed bit-set.
    B8,
}

impl ScalarKind {
    /// Short code used in benchmark names.
    pub fn code(self) -> &'static str {
        match self {
            ScalarKind::F16 => "f16",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::I8 => "i8",
            ScalarKind::B8 => "b8",
        }
    }

    /// Size of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            ScalarKind::F16 => 2,
            ScalarKind::F32 => 4,
            ScalarKind::F64 => 8,
            ScalarKind::I8 | ScalarKind::B8 => 1,
        }
    }

    /// Integral types are drawn over their full range and never normalized.
    pub fn is_integral(self) -> bool {
        matches!(self, ScalarKind::I8 | ScalarKind::B8)
    }
}

impl std::fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Element type of a [`VectorPair`].
pub trait Scalar: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// The enum tag for this type.
    const KIND: ScalarKind;

    /// Draw one random element.
    ///
    /// Integral types sample their whole representable range, floating-point
    /// types sample `[0, 1)`.
    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// Lossy conversion from `f64` (saturating for integers).
    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;
}

impl Scalar for f16 {
    const KIND: ScalarKind = ScalarKind::F16;

    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        f16::from_f64(rng.r#gen::<f64>())
    }

    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }

    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
}

impl Scalar for f32 {
    const KIND: ScalarKind = ScalarKind::F32;

    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.r#gen::<f64>() as f32
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::F64;

    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.r#gen::<f64>()
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl Scalar for i8 {
    const KIND: ScalarKind = ScalarKind::I8;

    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.r#gen::<i8>()
    }

    fn from_f64(value: f64) -> Self {
        value as i8
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for u8 {
    const KIND: ScalarKind = ScalarKind::B8;

    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.r#gen::<u8>()
    }

    fn from_f64(value: f64) -> Self {
        value as u8
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

/// How a pair is filled before measuring.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFill {
    /// Independent random vectors, L2-normalized for floating-point types.
    #[default]
    Random,
    /// Both vectors set to the same constant.
    Constant(f64),
}

/// Two equally sized operand vectors of the same scalar type.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPair<T: Scalar> {
    a: Vec<T>,
    b: Vec<T>,
}

impl<T: Scalar> VectorPair<T> {
    /// Zero-filled pair of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self {
            a: vec![T::default(); dimensions],
            b: vec![T::default(); dimensions],
        }
    }

    /// Build a pair filled according to `fill`.
    pub fn generate<R: Rng + ?Sized>(dimensions: usize, fill: InputFill, rng: &mut R) -> Self {
        let mut pair = Self::new(dimensions);
        match fill {
            InputFill::Random => pair.randomize(rng),
            InputFill::Constant(value) => pair.set(T::from_f64(value)),
        }
        pair
    }

    pub fn a(&self) -> &[T] {
        &self.a
    }

    pub fn b(&self) -> &[T] {
        &self.b
    }

    /// Number of elements in each vector.
    pub fn dimensions(&self) -> usize {
        self.a.len()
    }

    /// Size of one vector in bytes.
    pub fn size_bytes(&self) -> usize {
        self.a.len() * T::KIND.size_bytes()
    }

    /// Fill both vectors with the same constant.
    pub fn set(&mut self, value: T) {
        self.a.fill(value);
        self.b.fill(value);
    }

    /// Fill both vectors with independent random values.
    ///
    /// Floating-point vectors are scaled to unit L2 norm afterwards.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for (a, b) in self.a.iter_mut().zip(self.b.iter_mut()) {
            *a = T::sample(rng);
            *b = T::sample(rng);
        }
        if !T::KIND.is_integral() {
            normalize(&mut self.a);
            normalize(&mut self.b);
        }
    }
}

fn normalize<T: Scalar>(vector: &mut [T]) {
    let norm = vector
        .iter()
        .map(|x| {
            let x = x.to_f64();
            x * x
        })
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 {
        return;
    }
    for x in vector.iter_mut() {
        *x = T::from_f64(x.to_f64() / norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn l2_norm<T: Scalar>(v: &[T]) -> f64 {
        v.iter().map(|x| x.to_f64() * x.to_f64()).sum::<f64>().sqrt()
    }

    fn assert_unit_norms<T: Scalar>() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pair = VectorPair::<T>::new(1536);
        pair.randomize(&mut rng);
        let (na, nb) = (l2_norm(pair.a()), l2_norm(pair.b()));
        assert!((na - 1.0).abs() < 1e-3, "{}: |a| = {na}", T::KIND);
        assert!((nb - 1.0).abs() < 1e-3, "{}: |b| = {nb}", T::KIND);
    }

    #[test]
    fn float_pairs_are_unit_normalized() {
        assert_unit_norms::<f16>();
        assert_unit_norms::<f32>();
        assert_unit_norms::<f64>();
    }

    #[test]
    fn float_elements_are_non_negative() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pair = VectorPair::<f32>::new(256);
        pair.randomize(&mut rng);
        assert!(pair.a().iter().chain(pair.b()).all(|&x| (0.0..=1.0).contains(&x)));
    }

    #[test]
    fn integral_pairs_are_not_normalized() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pair = VectorPair::<i8>::new(1536);
        pair.randomize(&mut rng);
        assert!(pair.a().iter().any(|&x| x.unsigned_abs() > 1));
        assert!(pair.a().iter().any(|&x| x < 0));
        assert!(pair.b().iter().any(|&x| x > 1));

        let mut bits = VectorPair::<u8>::new(1536);
        bits.randomize(&mut rng);
        assert!(bits.a().iter().any(|&x| x > 1));
        assert_ne!(bits.a(), bits.b());
    }

    #[test]
    fn set_fills_both_vectors_identically() {
        let mut pair = VectorPair::<f32>::new(16);
        pair.set(0.25);
        assert_eq!(pair.a(), pair.b());
        assert!(pair.a().iter().all(|&x| x == 0.25));
    }

    #[test]
    fn same_seed_same_pair() {
        let p1 = VectorPair::<f32>::generate(64, InputFill::Random, &mut StdRng::seed_from_u64(3));
        let p2 = VectorPair::<f32>::generate(64, InputFill::Random, &mut StdRng::seed_from_u64(3));
        let p3 = VectorPair::<f32>::generate(64, InputFill::Random, &mut StdRng::seed_from_u64(4));
        assert_eq!(p1, p2);
        assert_ne!(p1, p3);
    }

    #[test]
    fn constant_fill_uses_set() {
        let mut rng = StdRng::seed_from_u64(0);
        let pair = VectorPair::<i8>::generate(8, InputFill::Constant(3.0), &mut rng);
        assert_eq!(pair.a(), &[3i8; 8]);
        assert_eq!(pair.b(), &[3i8; 8]);
    }

    #[test]
    fn sizes_follow_scalar_width() {
        assert_eq!(VectorPair::<f16>::new(1536).size_bytes(), 3072);
        assert_eq!(VectorPair::<f64>::new(1536).size_bytes(), 12288);
        assert_eq!(VectorPair::<u8>::new(1536).size_bytes(), 1536);
        assert_eq!(VectorPair::<f32>::new(4).dimensions(), 4);
        assert_eq!(ScalarKind::F64.size_bytes(), std::mem::size_of::<f64>());
        assert!(ScalarKind::B8.is_integral());
        assert!(!ScalarKind::F16.is_integral());
    }
}
