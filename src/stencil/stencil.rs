use crate::util::*;

/// Computes the next value of one interior point from its 1-neighborhood.
/// `neighborhood` is (left, center, right) as visible to the executor,
/// `iteration` is the global iteration counter so multi-stage schemes
/// can tell their stages apart.
///
/// Implementations must be pure, the same rule runs as a sequential
/// host scan and as a data-parallel device kernel.
pub trait UpdateRule<S: FieldState>: Send + Sync {
    fn update(&self, neighborhood: &[S; 3], iteration: usize) -> S;
}

/// Update rule made from a closure.
pub struct Stencil<F> {
    operation: F,
}

impl<F> Stencil<F> {
    pub fn new<S>(operation: F) -> Self
    where
        S: FieldState,
        F: Fn(&[S; 3], usize) -> S + Send + Sync,
    {
        Stencil { operation }
    }
}

impl<S, F> UpdateRule<S> for Stencil<F>
where
    S: FieldState,
    F: Fn(&[S; 3], usize) -> S + Send + Sync,
{
    #[inline]
    fn update(&self, neighborhood: &[S; 3], iteration: usize) -> S {
        (self.operation)(neighborhood, iteration)
    }
}

impl<S: FieldState, R: UpdateRule<S> + ?Sized> UpdateRule<S> for std::sync::Arc<R> {
    #[inline]
    fn update(&self, neighborhood: &[S; 3], iteration: usize) -> S {
        (**self).update(neighborhood, iteration)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn closure_rule() {
        let s = Stencil::new(|args: &[f64; 3], _| (args[0] + args[1] + args[2]) / 3.0);
        assert_approx_eq!(f64, s.update(&[1.0, 2.0, 3.0], 0), 2.0);
    }

    #[test]
    fn iteration_is_forwarded() {
        let s = Stencil::new(|args: &[f64; 3], i| args[1] + i as f64);
        assert_approx_eq!(f64, s.update(&[0.0, 1.0, 0.0], 4), 5.0);

        let shared = std::sync::Arc::new(s);
        assert_approx_eq!(f64, shared.update(&[0.0, 1.0, 0.0], 2), 3.0);
    }
}
