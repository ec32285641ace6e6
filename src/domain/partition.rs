use crate::util::*;

/// One contiguous owned slice of the field, ghosts included.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<S: FieldState> {
    values: Vec<S>,
    /// Previous iteration snapshot for Jacobi ordered host steps,
    /// allocated up front so stepping never allocates.
    scratch: Vec<S>,
    global_offset: usize,
}

impl<S: FieldState> Partition<S> {
    /// Partition with `interior` points, every slot set to `fill`.
    /// `global_offset` is the global index of the first interior point.
    pub fn new(interior: usize, fill: S, global_offset: usize) -> Self {
        let values = vec![fill; interior + 2];
        let scratch = values.clone();
        Partition {
            values,
            scratch,
            global_offset,
        }
    }

    /// Interior point `k` (1 based) gets `f(global index)`,
    /// ghosts get `f` of the index just outside the partition,
    /// clamped at zero on the far left.
    pub fn from_fn<F: Fn(usize) -> S>(
        interior: usize,
        global_offset: usize,
        f: F,
    ) -> Self {
        let values: Vec<S> = (0..interior + 2)
            .map(|k| f((global_offset + k).saturating_sub(1)))
            .collect();
        let scratch = values.clone();
        Partition {
            values,
            scratch,
            global_offset,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.interior_len() == 0
    }

    #[inline]
    pub fn interior_len(&self) -> usize {
        self.values.len() - 2
    }

    pub fn global_offset(&self) -> usize {
        self.global_offset
    }

    /// Global index of local slot `k`, only meaningful for interior slots.
    pub fn global_position(&self, k: usize) -> usize {
        debug_assert!(k >= 1 && k <= self.interior_len());
        self.global_offset + k - 1
    }

    pub fn as_slice(&self) -> &[S] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [S] {
        &mut self.values
    }

    pub fn interior(&self) -> &[S] {
        let n = self.values.len();
        &self.values[1..n - 1]
    }

    pub fn interior_mut(&mut self) -> &mut [S] {
        let n = self.values.len();
        &mut self.values[1..n - 1]
    }

    pub(crate) fn values_and_scratch(&mut self) -> (&mut [S], &mut [S]) {
        (&mut self.values, &mut self.scratch)
    }

    #[inline]
    pub fn left_ghost(&self) -> S {
        self.values[0]
    }

    #[inline]
    pub fn right_ghost(&self) -> S {
        self.values[self.values.len() - 1]
    }

    #[inline]
    pub fn set_left_ghost(&mut self, value: S) {
        self.values[0] = value;
    }

    #[inline]
    pub fn set_right_ghost(&mut self, value: S) {
        let n = self.values.len();
        self.values[n - 1] = value;
    }

    #[inline]
    pub fn first_interior(&self) -> S {
        self.values[1]
    }

    #[inline]
    pub fn last_interior(&self) -> S {
        self.values[self.values.len() - 2]
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn ghost_layout() {
        let mut p = Partition::new(4, 0.0f64, 10);
        assert_eq!(p.len(), 6);
        assert_eq!(p.interior_len(), 4);
        p.interior_mut()
            .iter_mut()
            .enumerate()
            .for_each(|(i, v)| *v = i as f64 + 1.0);
        assert_eq!(p.first_interior(), 1.0);
        assert_eq!(p.last_interior(), 4.0);
        assert_eq!(p.left_ghost(), 0.0);
        assert_eq!(p.right_ghost(), 0.0);

        p.set_left_ghost(-1.0);
        p.set_right_ghost(-2.0);
        assert_eq!(p.as_slice(), &[-1.0, 1.0, 2.0, 3.0, 4.0, -2.0]);
        assert_eq!(p.global_position(1), 10);
        assert_eq!(p.global_position(4), 13);
    }

    #[test]
    fn from_fn_positions() {
        let p = Partition::from_fn(3, 5, |g| g as f64);
        assert_eq!(p.as_slice(), &[4.0, 5.0, 6.0, 7.0, 8.0]);

        let p = Partition::from_fn(2, 0, |g| g as f64);
        assert_eq!(p.as_slice(), &[0.0, 0.0, 1.0, 2.0]);
    }
}
