use crate::error::{PlannerError, Result};
use num_traits::Float;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, Div, Index, IndexMut, Mul, Neg, Sub};

/// A point in an N-dimensional real vector space.
///
/// Used both for configurations and for directions between configurations.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RealVectorState<F: Float, const N: usize> {
    values: [F; N],
}

impl<F: Float, const N: usize> RealVectorState<F, N> {
    pub fn new(values: [F; N]) -> Self {
        Self { values }
    }

    /// The origin of the space.
    pub fn zeros() -> Self {
        Self {
            values: [F::zero(); N],
        }
    }

    /// Builds a state from a slice, failing when the slice length is not N.
    pub fn try_from_slice(values: &[F]) -> Result<Self> {
        if values.len() != N {
            return Err(PlannerError::Dimension {
                expected: N,
                actual: values.len(),
            });
        }
        let mut state = Self::zeros();
        state.values.copy_from_slice(values);
        Ok(state)
    }

    pub fn values(&self) -> &[F; N] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        N
    }

    pub fn dot(&self, other: &Self) -> F {
        self.values
            .iter()
            .zip(other.values.iter())
            .fold(F::zero(), |acc, (&a, &b)| acc + a * b)
    }

    pub fn norm_squared(&self) -> F {
        self.dot(self)
    }

    pub fn norm(&self) -> F {
        self.norm_squared().sqrt()
    }

    /// Returns the unit vector in the same direction, or None for a zero vector.
    pub fn normalized(&self) -> Option<Self> {
        let norm = self.norm();
        if norm <= F::epsilon() {
            None
        } else {
            Some(*self / norm)
        }
    }

    pub fn euclidean_distance_squared(&self, other: &Self) -> F {
        (self - other).norm_squared()
    }

    pub fn euclidean_distance(&self, other: &Self) -> F {
        self.euclidean_distance_squared(other).sqrt()
    }

    /// Linear interpolation: `self + t * (other - self)`.
    pub fn interpolate(&self, other: &Self, t: F) -> Self {
        self + &((other - self) * t)
    }
}

impl<F: Float, const N: usize> Index<usize> for RealVectorState<F, N> {
    type Output = F;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl<F: Float, const N: usize> IndexMut<usize> for RealVectorState<F, N> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.values[index]
    }
}

impl<F: Float, const N: usize> Add for RealVectorState<F, N> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        &self + &rhs
    }
}

impl<'a, F: Float, const N: usize> Add<&'a RealVectorState<F, N>> for &'a RealVectorState<F, N> {
    type Output = RealVectorState<F, N>;

    fn add(self, rhs: &'a RealVectorState<F, N>) -> Self::Output {
        let mut values = self.values;
        for (v, r) in values.iter_mut().zip(rhs.values.iter()) {
            *v = *v + *r;
        }
        RealVectorState { values }
    }
}

impl<F: Float, const N: usize> Sub for RealVectorState<F, N> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        &self - &rhs
    }
}

impl<'a, F: Float, const N: usize> Sub<&'a RealVectorState<F, N>> for &'a RealVectorState<F, N> {
    type Output = RealVectorState<F, N>;

    fn sub(self, rhs: &'a RealVectorState<F, N>) -> Self::Output {
        let mut values = self.values;
        for (v, r) in values.iter_mut().zip(rhs.values.iter()) {
            *v = *v - *r;
        }
        RealVectorState { values }
    }
}

impl<F: Float, const N: usize> Mul<F> for RealVectorState<F, N> {
    type Output = Self;

    fn mul(self, rhs: F) -> Self::Output {
        let mut values = self.values;
        values.iter_mut().for_each(|v| *v = *v * rhs);
        Self { values }
    }
}

impl<F: Float, const N: usize> Div<F> for RealVectorState<F, N> {
    type Output = Self;

    fn div(self, rhs: F) -> Self::Output {
        let mut values = self.values;
        values.iter_mut().for_each(|v| *v = *v / rhs);
        Self { values }
    }
}

impl<F: Float, const N: usize> Neg for RealVectorState<F, N> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self * -F::one()
    }
}

// serde has no impls for const-generic arrays, so states are written as fixed-size tuples.
impl<F: Float + Serialize, const N: usize> Serialize for RealVectorState<F, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(N)?;
        for value in self.values.iter() {
            tuple.serialize_element(value)?;
        }
        tuple.end()
    }
}

struct StateVisitor<F, const N: usize>(PhantomData<F>);

impl<'de, F: Float + Deserialize<'de>, const N: usize> Visitor<'de> for StateVisitor<F, N> {
    type Value = RealVectorState<F, N>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a sequence of {} floats", N)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut values = [F::zero(); N];
        for (i, value) in values.iter_mut().enumerate() {
            *value = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(RealVectorState::new(values))
    }
}

impl<'de, F: Float + Deserialize<'de>, const N: usize> Deserialize<'de> for RealVectorState<F, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_tuple(N, StateVisitor(PhantomData))
    }
}
