//! # Error Types for Structural Verification
//!
//! The trees themselves never fail: every operation is total and absence
//! is reported as `None`. What can fail is [`verify`](crate::U32Tree::verify),
//! the diagnostic walk that re-checks the structural invariants after the
//! fact. Its errors are collected here.
//!
//! ## Why verification can fail
//!
//! The hot paths perform no runtime validation (see the library's error
//! handling contract), so a node freed while linked, linked into two trees
//! at once, or whose key memory was modified in place will silently
//! corrupt the link structure. `verify` exists so tests and debugging
//! sessions can pin down such corruption:
//!
//! - the divergence between the two branches of every fork must shrink
//!   strictly along any downward path, otherwise role recovery breaks;
//! - an in-order walk over the leaves must produce strictly increasing
//!   keys with no duplicates;
//! - no linked branch may be null (null is the detached-node marker).

use thiserror::Error;

/// Structural inconsistencies detectable by a full verification walk.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// A linked node carries a null branch. Null branches only exist on
	/// detached nodes, so one inside the tree means a node was handed
	/// back to the caller (or never initialized) while still reachable.
	#[error("null branch on a linked node at depth {depth}")]
	NullBranch {
		/// Depth at which the offending node was reached.
		depth: usize,
	},

	/// The in-order walk produced keys out of order or a duplicate. The
	/// branch divergences no longer describe the keys below them.
	#[error("keys out of order during in-order walk at depth {depth}")]
	OutOfOrder {
		/// Depth of the leaf that broke the ordering.
		depth: usize,
	},

	/// The same node was visited twice in its fork role, which means the
	/// links loop instead of descending.
	#[error("node visited twice in fork role at depth {depth}")]
	ForkCycle {
		/// Depth of the second visit.
		depth: usize,
	},
}

/// A `Result` type alias using the verification [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
