use num_traits::Float;
use std::cmp::Ordering;

/// A float wrapper with a total order, for sorting and min/max by key.
///
/// NaN is rejected at construction, which is what makes the `Ord` impl sound.
#[derive(Debug, Copy, Clone)]
pub struct OrderedFloat<T: PartialOrd>(pub T);

impl<F: Float> From<F> for OrderedFloat<F> {
    fn from(float: F) -> Self {
        assert!(!float.is_nan(), "Cannot create OrderedFloat from NaN");
        OrderedFloat(float)
    }
}

impl<T: PartialOrd> PartialEq for OrderedFloat<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: PartialOrd> Eq for OrderedFloat<T> {}

impl<T: PartialOrd> PartialOrd for OrderedFloat<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: PartialOrd> Ord for OrderedFloat<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .expect("Cannot compare NaN values")
    }
}
