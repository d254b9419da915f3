use std::io::Write;

use rootgrad::{jacobian, Dual, Float};

use crate::functor::SystemFunctor;
use crate::system::{AlgebraSystem, SystemData};

/// Which argument of the system is the free variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrt {
    /// Free vector is the unknowns `x`; the parameters are fixed.
    Unknowns,
    /// Free vector is the parameters `y`; the unknowns are fixed.
    Parameters,
}

/// Adapts an [`AlgebraSystem`] plus fixed arguments into a function of a
/// single free vector, with exact forward-mode Jacobians.
///
/// Counts residual evaluations (`nfev`) and Jacobian evaluations (`njev`).
pub struct ResidualEvaluator<'a, F: Float, S> {
    system: &'a S,
    fixed: &'a [F],
    data: SystemData<'a, F>,
    wrt: Wrt,
    msgs: &'a mut dyn Write,
    nfev: usize,
    njev: usize,
}

impl<'a, F: Float, S: AlgebraSystem<F>> ResidualEvaluator<'a, F, S> {
    /// Residual as a function of the unknowns, with parameters `y` fixed.
    pub fn unknowns(
        system: &'a S,
        y: &'a [F],
        data: SystemData<'a, F>,
        msgs: &'a mut dyn Write,
    ) -> Self {
        Self::new(system, y, data, Wrt::Unknowns, msgs)
    }

    /// Residual as a function of the parameters, with unknowns `x` fixed.
    pub fn parameters(
        system: &'a S,
        x: &'a [F],
        data: SystemData<'a, F>,
        msgs: &'a mut dyn Write,
    ) -> Self {
        Self::new(system, x, data, Wrt::Parameters, msgs)
    }

    fn new(
        system: &'a S,
        fixed: &'a [F],
        data: SystemData<'a, F>,
        wrt: Wrt,
        msgs: &'a mut dyn Write,
    ) -> Self {
        ResidualEvaluator {
            system,
            fixed,
            data,
            wrt,
            msgs,
            nfev: 0,
            njev: 0,
        }
    }

    pub fn wrt(&self) -> Wrt {
        self.wrt
    }

    pub fn nfev(&self) -> usize {
        self.nfev
    }

    pub fn njev(&self) -> usize {
        self.njev
    }

    fn call<T: rootgrad::Scalar<Float = F>>(&mut self, free: &[T], fixed: &[T]) -> Vec<T> {
        let (x, y) = match self.wrt {
            Wrt::Unknowns => (free, fixed),
            Wrt::Parameters => (fixed, free),
        };
        self.system
            .residual(x, y, self.data.real, self.data.int, &mut *self.msgs)
    }
}

impl<F: Float, S: AlgebraSystem<F>> SystemFunctor<F> for ResidualEvaluator<'_, F, S> {
    fn value(&mut self, v: &[F]) -> Vec<F> {
        self.nfev += 1;
        // Unseeded duals: same arithmetic as a plain evaluation, generic over F.
        let free: Vec<Dual<F>> = v.iter().map(|&c| Dual::constant(c)).collect();
        let fixed: Vec<Dual<F>> = self.fixed.iter().map(|&c| Dual::constant(c)).collect();
        self.call(&free, &fixed).iter().map(|d| d.re).collect()
    }

    /// The Jacobian is `m × v.len()`, where `m` is the residual length.
    fn jacobian(&mut self, v: &[F]) -> Vec<Vec<F>> {
        self.njev += 1;
        let fixed: Vec<Dual<F>> = self.fixed.iter().map(|&c| Dual::constant(c)).collect();
        let (_, jac) = jacobian(|free| self.call(free, &fixed), v);
        jac
    }
}
