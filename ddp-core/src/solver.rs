//! Solver strategy contract.

use crate::context::Cddp;
use crate::error::CddpError;
use crate::solution::Solution;

/// A solver strategy operating on a [`Cddp`] context.
///
/// Strategies are created per `solve()` call from the registry, given a
/// chance to initialize (or warm-start) their internal state against the
/// context, and then run to a terminal status. Implementations must not
/// mutate the accepted trajectory except through accepted forward passes.
pub trait SolverAlgorithm {
    /// Registered name of this strategy.
    fn name(&self) -> &str;

    /// Prepare internal state for the given context. Raises only
    /// configuration errors.
    fn initialize(&mut self, ctx: &mut Cddp) -> Result<(), CddpError>;

    /// Run the iteration loop; always returns a well-formed solution.
    fn solve(&mut self, ctx: &mut Cddp) -> Solution;
}
