/// A value paired with a flag recording whether a rewrite changed it.
///
/// Passes return `Transformed` so the driver can run cheap fixed-point
/// loops without comparing trees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transformed<T> {
    pub data: T,
    pub transformed: bool,
}

impl<T> Transformed<T> {
    /// Wraps `data`, marking it changed.
    pub fn yes(data: T) -> Self {
        Self {
            data,
            transformed: true,
        }
    }

    /// Wraps `data`, marking it unchanged.
    pub fn no(data: T) -> Self {
        Self {
            data,
            transformed: false,
        }
    }

    pub fn new(data: T, transformed: bool) -> Self {
        Self { data, transformed }
    }

    /// Maps the payload, keeping the flag.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transformed<U> {
        Transformed {
            data: f(self.data),
            transformed: self.transformed,
        }
    }

    /// Combines with a later step: the result is marked changed when either
    /// step changed.
    pub fn and(self, later: Transformed<T>) -> Transformed<T> {
        Transformed {
            data: later.data,
            transformed: self.transformed || later.transformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_accumulates_the_flag() {
        let first = Transformed::yes(1);
        let second = Transformed::no(2);
        let combined = first.and(second);
        assert_eq!(combined.data, 2);
        assert!(combined.transformed);
    }

    #[test]
    fn map_keeps_the_flag() {
        assert!(Transformed::yes(1).map(|v| v + 1).transformed);
        assert!(!Transformed::no(1).map(|v| v + 1).transformed);
    }
}
