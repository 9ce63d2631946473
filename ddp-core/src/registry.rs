//! Plug-in solver registry.
//!
//! Process-wide name -> factory table. The intended discipline is
//! "register once at program start, read-only during solve": registration
//! takes a write lock, solver creation a read lock. Built-in strategies
//! are resolved after the external table so a driver may shadow them.

use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

use crate::ipddp::IpddpSolver;
use crate::solver::SolverAlgorithm;

/// Factory producing a fresh solver strategy.
pub type SolverFactory = Box<dyn Fn() -> Box<dyn SolverAlgorithm> + Send + Sync>;

fn external_registry() -> &'static RwLock<BTreeMap<String, SolverFactory>> {
    static REGISTRY: OnceLock<RwLock<BTreeMap<String, SolverFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(BTreeMap::new()))
}

/// Register an external solver factory under `name`, replacing any
/// previous registration with the same name.
pub fn register_solver(name: impl Into<String>, factory: SolverFactory) {
    external_registry()
        .write()
        .expect("solver registry poisoned")
        .insert(name.into(), factory);
}

/// Whether an external factory is registered under `name`.
pub fn is_solver_registered(name: &str) -> bool {
    external_registry()
        .read()
        .expect("solver registry poisoned")
        .contains_key(name)
}

/// Names of all externally registered solvers, in sorted order.
pub fn registered_solvers() -> Vec<String> {
    external_registry()
        .read()
        .expect("solver registry poisoned")
        .keys()
        .cloned()
        .collect()
}

/// Resolve a solver by name: external registrations first, then the
/// built-in strategies. Returns `None` for an unknown name.
pub(crate) fn create_solver(name: &str) -> Option<Box<dyn SolverAlgorithm>> {
    if let Some(factory) = external_registry()
        .read()
        .expect("solver registry poisoned")
        .get(name)
    {
        return Some(factory());
    }

    match name {
        "IPDDP" => Some(Box::new(IpddpSolver::new())),
        _ => None,
    }
}
