pub mod config;
pub mod error;
pub mod killer;
pub mod mutants;
pub mod output;
pub mod reduce;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod tree;

pub use error::{KillerError, TreeError};
pub use killer::{Harness, MutantKiller};
pub use mutants::{ExecutionStatus, MutantId, ProgramBaseline};
pub use reduce::Reducer;
pub use tree::MutationTree;
