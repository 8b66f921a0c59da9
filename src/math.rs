
//! Simple math utilities.

use std::fmt::Debug;

/// Simple two-dimensional vector of any numerical type.
/// Used for pixel coordinates, region sizes and tile indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Vec2<T>(pub T, pub T);

impl<T> Vec2<T> {
    /// Seeing this vector as a dimension or size (width and height),
    /// this returns the area that this dimensions contains (`width * height`).
    #[inline]
    pub fn area(self) -> T
    where
        T: std::ops::Mul<T, Output = T>,
    {
        self.0 * self.1
    }

    /// The first component of this 2D vector.
    #[inline]
    pub fn x(self) -> T
    where
        T: Copy,
    {
        self.0
    }

    /// The second component of this 2D vector.
    #[inline]
    pub fn y(self) -> T
    where
        T: Copy,
    {
        self.1
    }

    /// The first component of this 2D vector.
    #[inline]
    pub fn width(self) -> T
    where
        T: Copy,
    {
        self.0
    }

    /// The second component of this 2D vector.
    #[inline]
    pub fn height(self) -> T
    where
        T: Copy,
    {
        self.1
    }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self {
        Vec2(x, y)
    }
}

impl<T> From<Vec2<T>> for (T, T) {
    fn from(vec2: Vec2<T>) -> Self {
        (vec2.0, vec2.1)
    }
}

impl<T: std::ops::Add<T>> std::ops::Add<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn add(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 + other.0, self.1 + other.1)
    }
}

impl<T: std::ops::Sub<T>> std::ops::Sub<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn sub(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 - other.0, self.1 - other.1)
    }
}

/// Divides two positive integers and takes the ceiling of the result as
/// if they were divided as real numbers. The divisor must not be zero.
#[inline]
pub(crate) fn ceil_div(dividend: usize, divisor: usize) -> usize {
    debug_assert_ne!(divisor, 0, "ceiling division by zero");
    (dividend + divisor - 1) / divisor
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ceiling_division() {
        assert_eq!(ceil_div(10, 4), 3);
        assert_eq!(ceil_div(8, 4), 2);
        assert_eq!(ceil_div(1, 4), 1);
        assert_eq!(ceil_div(0, 4), 0);
    }

    #[test]
    fn vector_accessors() {
        let size = Vec2(10_usize, 4);
        assert_eq!(size.width(), 10);
        assert_eq!(size.height(), 4);
        assert_eq!(size.area(), 40);
    }
}
