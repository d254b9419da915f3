//! Implicit nodes: multi-output tape entries whose local Jacobian is known
//! up front instead of being recorded elementwise.
//!
//! A node is built once with its sensitivity matrix (`d outputs / d params`)
//! and pushed with [`Tape::push_implicit`](crate::tape::Tape::push_implicit).
//! The tape then owns it; during the reverse sweep it only reads the stored
//! matrix.

use crate::tape::CONSTANT;
use crate::Float;

/// A tape node producing `num_outputs` contiguous variables from `params`.
///
/// Output `0` is the primary variable: the tape keys the node's statement on
/// it. Outputs `1..num_outputs` are auxiliary and carry no chain logic of
/// their own; their adjoints are consumed by the same joint step.
#[derive(Clone, Debug)]
pub struct ImplicitNode<F: Float> {
    params: Vec<u32>,
    sensitivity: Vec<Vec<F>>,
    first_output: u32,
}

impl<F: Float> ImplicitNode<F> {
    /// Build a node from parameter tape indices and the `outputs × params`
    /// sensitivity matrix.
    ///
    /// Parameter indices may be [`CONSTANT`]; those columns are skipped on
    /// the reverse sweep.
    ///
    /// # Panics
    ///
    /// Panics if the matrix has no rows or if any row length differs from
    /// `params.len()`.
    pub fn new(params: Vec<u32>, sensitivity: Vec<Vec<F>>) -> Self {
        assert!(
            !sensitivity.is_empty(),
            "implicit node must have at least one output"
        );
        for (i, row) in sensitivity.iter().enumerate() {
            assert_eq!(
                row.len(),
                params.len(),
                "sensitivity row {} has length {}, expected {} (one per parameter)",
                i,
                row.len(),
                params.len()
            );
        }
        ImplicitNode {
            params,
            sensitivity,
            first_output: CONSTANT,
        }
    }

    pub fn num_outputs(&self) -> usize {
        self.sensitivity.len()
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// Tape indices of the parameters this node depends on.
    pub fn params(&self) -> &[u32] {
        &self.params
    }

    /// The stored `outputs × params` sensitivity matrix.
    pub fn sensitivity(&self) -> &[Vec<F>] {
        &self.sensitivity
    }

    /// Tape index of the primary output, or [`CONSTANT`] before the node is pushed.
    pub fn first_output(&self) -> u32 {
        self.first_output
    }

    pub(crate) fn set_first_output(&mut self, index: u32) {
        self.first_output = index;
    }

    /// Reverse step: `adj[param_j] += adj[output_i] * S[i][j]`, then clear
    /// the output adjoints.
    pub(crate) fn propagate(&self, adjoints: &mut [F]) {
        let first = self.first_output as usize;
        let outputs = first..first + self.num_outputs();
        if adjoints[outputs.clone()].iter().all(|&a| a == F::zero()) {
            return;
        }

        for (i, row) in self.sensitivity.iter().enumerate() {
            let a = adjoints[first + i];
            if a == F::zero() {
                continue;
            }
            for (&p, &s) in self.params.iter().zip(row) {
                if p != CONSTANT {
                    adjoints[p as usize] = adjoints[p as usize] + a * s;
                }
            }
        }

        for adj in &mut adjoints[outputs] {
            *adj = F::zero();
        }
    }
}
