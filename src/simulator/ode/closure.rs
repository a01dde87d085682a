use std::sync::Arc;

use diffsol::{
    ConstantOp, LinearOp, NonLinearOp, NonLinearOpJacobian, OdeEquations, OdeEquationsRef, Op,
};

use crate::signal::InputSignal;
use crate::simulator::{DiffEq, M, T, V};

pub struct SignalRhs<'a> {
    nstates: usize,
    nparams: usize,
    p: &'a V,
    input: &'a dyn InputSignal,
    func: DiffEq,
}

impl SignalRhs<'_> {
    #[inline(always)]
    fn derivative(&self, x: &V, t: T, y: &mut V) {
        y.fill(0.0);
        (self.func)(x, self.p, t, y, self.input);
    }
}

impl Op for SignalRhs<'_> {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

pub struct SignalMass {
    nstates: usize,
    nparams: usize,
}

impl Op for SignalMass {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

pub struct SignalInit {
    nstates: usize,
    nparams: usize,
    init: V,
}

impl Op for SignalInit {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

pub struct SignalRoot {
    nstates: usize,
    nparams: usize,
}

impl Op for SignalRoot {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        0
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

pub struct SignalOut {
    nstates: usize,
    nparams: usize,
}

impl Op for SignalOut {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl NonLinearOp for SignalRhs<'_> {
    fn call_inplace(&self, x: &Self::V, t: Self::T, y: &mut Self::V) {
        self.derivative(x, t, y);
    }
}

impl NonLinearOpJacobian for SignalRhs<'_> {
    /// Forward-difference Jacobian-vector product; models only provide the RHS
    fn jac_mul_inplace(&self, x: &Self::V, t: Self::T, v: &Self::V, y: &mut Self::V) {
        let v_norm = v.iter().map(|vi| vi * vi).sum::<f64>().sqrt();
        if v_norm == 0.0 {
            y.fill(0.0);
            return;
        }
        let x_norm = x.iter().map(|xi| xi * xi).sum::<f64>().sqrt();
        let eps = f64::EPSILON.sqrt() * (1.0 + x_norm) / v_norm;

        let mut shifted = x.clone();
        for (si, vi) in shifted.iter_mut().zip(v.iter()) {
            *si += eps * vi;
        }
        let mut f_base = V::zeros(self.nstates);
        let mut f_shifted = V::zeros(self.nstates);
        self.derivative(x, t, &mut f_base);
        self.derivative(&shifted, t, &mut f_shifted);

        for i in 0..self.nstates {
            y[i] = (f_shifted[i] - f_base[i]) / eps;
        }
    }
}

impl LinearOp for SignalMass {
    fn gemv_inplace(&self, _x: &Self::V, _t: Self::T, _beta: Self::T, _y: &mut Self::V) {}
}

impl ConstantOp for SignalInit {
    fn call_inplace(&self, _t: Self::T, y: &mut Self::V) {
        y.copy_from(&self.init);
    }
}

impl NonLinearOp for SignalRoot {
    fn call_inplace(&self, _x: &Self::V, _t: Self::T, _y: &mut Self::V) {}
}

impl NonLinearOp for SignalOut {
    fn call_inplace(&self, _x: &Self::V, _t: Self::T, _y: &mut Self::V) {}
}

/// A user model forced by an input signal, in the shape diffsol solves.
///
/// Owns its parameters, initial state and a handle on the signal, so one
/// problem can be built per evaluation without borrowing from the caller.
pub struct SignalProblem {
    func: DiffEq,
    nstates: usize,
    nparams: usize,
    init: V,
    p: V,
    input: Arc<dyn InputSignal>,
}

impl SignalProblem {
    pub fn new(func: DiffEq, params: &[f64], init: &[f64], input: Arc<dyn InputSignal>) -> Self {
        Self {
            func,
            nstates: init.len(),
            nparams: params.len(),
            init: V::from_column_slice(init),
            p: V::from_column_slice(params),
            input,
        }
    }
}

impl Op for SignalProblem {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl<'b> OdeEquationsRef<'b> for SignalProblem {
    type Rhs = SignalRhs<'b>;
    type Mass = SignalMass;
    type Init = SignalInit;
    type Root = SignalRoot;
    type Out = SignalOut;
}

impl OdeEquations for SignalProblem {
    fn rhs(&self) -> SignalRhs<'_> {
        SignalRhs {
            nstates: self.nstates,
            nparams: self.nparams,
            p: &self.p,
            input: self.input.as_ref(),
            func: self.func,
        }
    }

    fn mass(&self) -> Option<SignalMass> {
        None
    }

    fn init(&self) -> SignalInit {
        SignalInit {
            nstates: self.nstates,
            nparams: self.nparams,
            init: self.init.clone(),
        }
    }

    fn get_params(&self, p: &mut V) {
        p.copy_from(&self.p);
    }

    fn root(&self) -> Option<SignalRoot> {
        None
    }

    fn out(&self) -> Option<SignalOut> {
        None
    }

    fn set_params(&mut self, p: &V) {
        self.p.copy_from(p);
    }
}
