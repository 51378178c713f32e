//! Implementation of a family of compact binary trees: ordered intrusive
//! sets whose nodes carry exactly two branch pointers and nothing else.
//!
//! No parent pointer, no balance or color field, no stored bit position.
//! The bit at which two subtrees part ways is re-derived during the walk
//! from the keys themselves, and the same physical node serves both as an
//! internal fork and as the carrier of its own key. The trees therefore
//! impose the minimum possible overhead (two words) on the stored payload,
//! at the price of a slightly unusual descent described in [`Node`].
//!
//! One tree type is provided per key flavor: [`U32Tree`]/[`U64Tree`] for
//! scalars, [`AddrTree`] for address-keyed nodes, [`BlockTree`] and
//! [`RefBlockTree`] for fixed-size byte blocks (direct and indirect
//! storage), and [`StrTree`]/[`RefStrTree`] for NUL-terminated strings.
//!
//! Nodes are owned by the caller and only borrowed by the tree, so the
//! linking operations are `unsafe` and carry the usual intrusive-container
//! contract: a node must stay put and stay alive from insertion until the
//! tree hands it back.
//!
//! The hot paths never validate anything. Debug builds, and release
//! builds with the `strict-checks` feature, re-verify on removal that the
//! reached entry really carries the removed key, turning silent link
//! corruption into a panic; [`verify`](U32Tree::verify) offers the full
//! diagnostic walk.
//!
//! ```
//! use std::ptr::NonNull;
//! use twigtree::{U32Node, U32Tree};
//!
//! let mut tree = U32Tree::new();
//! let mut node = Box::new(U32Node::new(42));
//! let handle = NonNull::from(node.as_mut());
//!
//! let ret = unsafe { tree.insert(handle) };
//! assert_eq!(ret, handle, "no other node carried this key");
//! assert_eq!(tree.lookup(42), Some(handle));
//!
//! let removed = unsafe { tree.delete(handle) };
//! assert_eq!(removed, Some(handle));
//! assert!(tree.lookup(42).is_none());
//! ```

use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::marker::PhantomPinned;
use std::ptr;

use smallvec::SmallVec;

pub mod addr;
pub mod alloc;
pub mod block;
pub mod error;
pub mod string;
pub mod uint;

mod dump;
mod key;

pub use addr::{AddrNode, AddrTree};
pub use block::{BlockNode, BlockTree, RefBlockNode, RefBlockTree};
pub use string::{RefStrNode, RefStrTree, StrNode, StrTree};
pub use uint::{U32Node, U32Tree, U64Node, U64Tree};

use error::{Error, Result};
use key::Flavor;

/// Intrusive links of one tree entry: two branch slots, nothing more.
///
/// A node is reached twice on the path from the root: first in its *node*
/// role, where it forks the key space on one bit, and later in its *leaf*
/// role, where it stands for its own key. Both roles share this single
/// allocation. The role a visitor is acting in is never recorded; it is
/// recovered from the fact that the divergence between the two branches
/// shrinks strictly along any downward path, so the first time it grows
/// again the walk knows it is looking back up at a leaf.
///
/// The flavored node types of this crate embed `Node` as their first
/// field. A detached node has a null left branch, which is what makes
/// [`delete`](U32Tree::delete) idempotent; a tree holding a single entry
/// has both branches of that entry pointing at the entry itself.
#[repr(C)]
pub struct Node {
	b: UnsafeCell<[*mut Node; 2]>,
	_pin: PhantomPinned,
}

impl Node {
	/// A fresh, detached node.
	pub const fn new() -> Node {
		Node {
			b: UnsafeCell::new([ptr::null_mut(), ptr::null_mut()]),
			_pin: PhantomPinned,
		}
	}

	/// Whether this node is currently linked into a tree.
	///
	/// Only meaningful between tree operations: a node that was never
	/// inserted, or that a delete has handed back, reports `false`.
	pub fn is_linked(&self) -> bool {
		unsafe { !(*self.b.get())[0].is_null() }
	}

	#[inline]
	pub(crate) unsafe fn branch(node: *const Node, side: usize) -> *mut Node {
		(*(*node).b.get())[side]
	}

	#[inline]
	pub(crate) unsafe fn set_branch(node: *mut Node, side: usize, to: *mut Node) {
		(*(*node).b.get())[side] = to;
	}

	/// Address of one branch slot, usable like the root slot of a tree.
	#[inline]
	pub(crate) unsafe fn branch_slot(node: *mut Node, side: usize) -> *mut *mut Node {
		(*node).b.get().cast::<*mut Node>().add(side)
	}
}

impl Default for Node {
	fn default() -> Node {
		Node::new()
	}
}

/// Tree walk method: where a descent is headed and what it remembers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Walk {
	/// Leftmost entry: walk left only.
	First,
	/// Rightmost entry: walk right only.
	Last,
	/// One step right, then left all the way (restart below a fork).
	Next,
	/// One step left, then right all the way (restart below a fork).
	Prev,
	/// Locate the entry equal to the key.
	Eq,
	/// Smallest entry greater than or equal to the key.
	Ge,
	/// Smallest entry strictly greater than the key.
	Gt,
	/// Greatest entry lower than or equal to the key.
	Le,
	/// Greatest entry strictly lower than the key.
	Lt,
	/// Locate the key, remembering the last left turn for a later `Next`.
	SeekNext,
	/// Locate the key, remembering the last right turn for a later `Prev`.
	SeekPrev,
}

impl Walk {
	/// Whether this walk is steered by a key.
	#[inline]
	fn keyed(self) -> bool {
		!matches!(self, Walk::First | Walk::Last | Walk::Next | Walk::Prev)
	}
}

/// Everything one descent can report. Callers read the fields they asked
/// the walk to produce and ignore the rest.
pub(crate) struct Descent {
	/// The reached node when the walk's predicate accepted it, else null.
	/// Keyless walks always accept.
	pub(crate) hit: *mut Node,
	/// Side a new leaf carrying the key would occupy at its own node.
	pub(crate) nside: usize,
	/// The slot holding the reached node, i.e. where a new leaf would be
	/// written. May be the tree's root slot.
	pub(crate) slot: *mut *mut Node,
	/// Node owning `slot`; null when `slot` is the root slot itself.
	pub(crate) lparent: *mut Node,
	/// Side of `slot` within `lparent`.
	pub(crate) lpside: usize,
	/// The slot referencing `lparent`, needed to lift the sibling over it.
	pub(crate) lslot: *mut *mut Node,
	/// The slot referencing the reached node in its *node* role, when the
	/// walk was asked to track it and the key matched on the way down.
	pub(crate) nslot: *mut *mut Node,
	/// Last fork where the walk turned away from its eventual direction;
	/// range lookups restart from here with [`Walk::Next`]/[`Walk::Prev`].
	pub(crate) back: *mut Node,
}

/// The shared descent engine. One traversal serves lookups, insertions,
/// deletions and range queries; the walk method selects the steering and
/// which structural side-outputs get recorded.
///
/// Must not be called on an empty tree.
///
/// # Safety
///
/// `slot` must reference a well-formed tree of `F`-flavored nodes, and
/// `key` must be valid for `F` for the duration of the call.
pub(crate) unsafe fn descend<F: Flavor>(
	mut slot: *mut *mut Node,
	walk: Walk,
	key: F::Key,
	track_node_role: bool,
) -> Descent {
	let keyed = walk.keyed();

	// Keyless walks fix their first step here; Next/Prev flip it once.
	let mut side = match walk {
		Walk::Last | Walk::Next => 1,
		_ => 0,
	};

	// Divergence of the previously visited pair of branches. Seeded so
	// that no real pair can look like a leaf on the first test.
	let mut pdiv = F::START;

	let mut lparent: *mut Node = ptr::null_mut();
	let mut lpside = 0usize;
	let mut lslot: *mut *mut Node = ptr::null_mut();
	let mut nslot: *mut *mut Node = ptr::null_mut();
	let mut back: *mut Node = ptr::null_mut();

	// Key-vs-branch divergences of the last examined pair, and whether one
	// of them already proved an exact match.
	let mut dl = F::START;
	let mut dr = F::START;
	let mut exact = false;

	let p = loop {
		let p = *slot;
		let l = Node::branch(p, 0);
		let r = Node::branch(p, 1);

		// Two equal branches identify the nodeless leaf.
		if l == r {
			break p;
		}

		if keyed {
			dl = F::div(key, F::key_of(l));
			dr = F::div(key, F::key_of(r));
			// Follow the branch agreeing with the key on more high bits.
			side = usize::from(F::later_eq(dr, dl));
			exact |= F::branch_hit(key, dl, dr);
		}

		let cur = F::div(F::key_of(l), F::key_of(r));

		// A pair diverging higher than the previous one belongs to an
		// upper node: we are looking at a leaf role, not a node role.
		if F::earlier(cur, pdiv) {
			break p;
		}

		if keyed {
			// The key cannot live below a pair it diverges from on a
			// higher bit than their own split bit.
			if F::earlier(dl, cur) && F::earlier(dr, cur) {
				break p;
			}

			if track_node_role && F::matches_node(key, F::key_of(p), dl, dr, cur) {
				nslot = slot;
			}
		}

		// Shift the sliding window one level down.
		lslot = slot;
		lparent = p;
		lpside = side;
		if side == 1 {
			if matches!(walk, Walk::SeekPrev | Walk::Le | Walk::Lt) {
				back = p;
			}
			slot = Node::branch_slot(p, 1);
			if walk == Walk::Next {
				side = 0;
			}
		} else {
			if matches!(walk, Walk::SeekNext | Walk::Ge | Walk::Gt) {
				back = p;
			}
			slot = Node::branch_slot(p, 0);
			if walk == Walk::Prev {
				side = 1;
			}
		}

		pdiv = cur;

		// A branch looping back onto its own node is that node's leaf.
		if *slot == p {
			break p;
		}
	};

	// The walk stopped on the closest node to the requested value, which
	// may still sit on either side of it; one last compare settles it.
	// String lookups that did not prove an exact match restart the
	// compare from the longest key-vs-branch prefix, because the key may
	// be shorter than the inter-branch prefix measured in the tree.
	let mut skip = pdiv;
	if keyed && F::RESCAN_TAIL && !exact {
		skip = F::later_of(dl, dr);
	}

	let (hit, nside) = if keyed {
		let pk = F::key_of(p);
		let nside = usize::from(F::cmp_suffix(key, pk, skip, exact) != Ordering::Less);
		let diff = F::cmp_suffix(pk, key, skip, exact);
		let accept = match walk {
			Walk::Eq | Walk::SeekNext | Walk::SeekPrev => diff == Ordering::Equal,
			Walk::Ge => diff != Ordering::Less,
			Walk::Gt => diff == Ordering::Greater,
			Walk::Le => diff != Ordering::Greater,
			Walk::Lt => diff == Ordering::Less,
			_ => unreachable!(),
		};
		(if accept { p } else { ptr::null_mut() }, nside)
	} else {
		(p, 0)
	};

	Descent {
		hit,
		nside,
		slot,
		lparent,
		lpside,
		lslot,
		nslot,
		back,
	}
}

/// Generic unique-key insertion: one [`Walk::Eq`] descent, then the new
/// node takes over the displaced slot as a fork and references itself on
/// the side its key sorts to. Returns the pre-existing node instead when
/// the key is already present.
pub(crate) unsafe fn insert_generic<F: Flavor>(
	root: *mut *mut Node,
	node: *mut Node,
	key: F::Key,
) -> *mut Node {
	if (*root).is_null() {
		// Empty tree: the first entry is its own leaf on both sides.
		Node::set_branch(node, 0, node);
		Node::set_branch(node, 1, node);
		*root = node;
		return node;
	}

	let d = descend::<F>(root, Walk::Eq, key, false);
	if !d.hit.is_null() {
		return d.hit;
	}

	let displaced = *d.slot;
	if d.nside == 1 {
		Node::set_branch(node, 1, node);
		Node::set_branch(node, 0, displaced);
	} else {
		Node::set_branch(node, 0, node);
		Node::set_branch(node, 1, displaced);
	}
	*d.slot = node;
	node
}

/// Generic removal, by key or by node identity.
///
/// When `node` is non-null the reached entry is unlinked only if it is
/// that very allocation; a key that resolves elsewhere leaves the tree
/// untouched and reports null. A node already detached (null left branch)
/// also reports null, which makes removal idempotent.
pub(crate) unsafe fn delete_generic<F: Flavor>(
	root: *mut *mut Node,
	node: *mut Node,
	key: F::Key,
) -> *mut Node {
	if !node.is_null() && Node::branch(node, 0).is_null() {
		// A null branch means the node is not in any tree.
		return ptr::null_mut();
	}

	if (*root).is_null() {
		return ptr::null_mut();
	}

	let d = descend::<F>(root, Walk::Eq, key, true);
	let ret = d.hit;
	if ret.is_null() {
		return ptr::null_mut();
	}

	if !node.is_null() && ret != node {
		return ptr::null_mut();
	}

	// The descent classified this entry as carrying the requested key; a
	// disagreement here means the links were corrupted from outside.
	#[cfg(any(debug_assertions, feature = "strict-checks"))]
	{
		assert!(
			F::cmp_suffix(F::key_of(ret), key, F::START, false) == Ordering::Equal,
			"reached entry does not carry the removed key: tree links are corrupted"
		);
	}

	if d.slot == root {
		// Single-entry tree: removing the nodeless leaf empties it.
		*root = ptr::null_mut();
	} else {
		// Lift the sibling over the leaf's parent.
		let sibling = Node::branch(d.lparent, d.lpside ^ 1);
		*d.lslot = sibling;

		if d.lparent != ret {
			if Node::branch(ret, 0) == Node::branch(ret, 1) {
				// The nodeless leaf goes away; its parent inherits the
				// role and becomes its own leaf on both sides.
				Node::set_branch(d.lparent, 0, d.lparent);
				Node::set_branch(d.lparent, 1, d.lparent);
			} else {
				// The node role lives higher up. The leaf's parent slot
				// is free now, so it is recycled to stand in for it.
				Node::set_branch(d.lparent, 0, Node::branch(ret, 0));
				Node::set_branch(d.lparent, 1, Node::branch(ret, 1));
				*d.nslot = d.lparent;
			}
		}
		// else: node and leaf roles collapsed on the same visit, the
		// sibling lift above already took care of everything.
	}

	// Mark detached.
	Node::set_branch(ret, 0, ptr::null_mut());
	ret
}

pub(crate) unsafe fn lookup_generic<F: Flavor>(root: *mut *mut Node, key: F::Key) -> *mut Node {
	if (*root).is_null() {
		return ptr::null_mut();
	}
	descend::<F>(root, Walk::Eq, key, false).hit
}

pub(crate) unsafe fn first_generic<F: Flavor>(root: *mut *mut Node) -> *mut Node {
	if (*root).is_null() {
		return ptr::null_mut();
	}
	descend::<F>(root, Walk::First, F::NIL_KEY, false).hit
}

pub(crate) unsafe fn last_generic<F: Flavor>(root: *mut *mut Node) -> *mut Node {
	if (*root).is_null() {
		return ptr::null_mut();
	}
	descend::<F>(root, Walk::Last, F::NIL_KEY, false).hit
}

/// In-order successor of the entry carrying `key`: locate it while
/// remembering the last left turn, then take the leftmost path below the
/// right branch of that fork.
pub(crate) unsafe fn next_generic<F: Flavor>(root: *mut *mut Node, key: F::Key) -> *mut Node {
	if (*root).is_null() {
		return ptr::null_mut();
	}
	let d = descend::<F>(root, Walk::SeekNext, key, false);
	if d.hit.is_null() || d.back.is_null() {
		return ptr::null_mut();
	}
	let mut fork: *mut Node = d.back;
	descend::<F>(&mut fork, Walk::Next, F::NIL_KEY, false).hit
}

/// In-order predecessor, symmetric to [`next_generic`].
pub(crate) unsafe fn prev_generic<F: Flavor>(root: *mut *mut Node, key: F::Key) -> *mut Node {
	if (*root).is_null() {
		return ptr::null_mut();
	}
	let d = descend::<F>(root, Walk::SeekPrev, key, false);
	if d.hit.is_null() || d.back.is_null() {
		return ptr::null_mut();
	}
	let mut fork: *mut Node = d.back;
	descend::<F>(&mut fork, Walk::Prev, F::NIL_KEY, false).hit
}

/// Range lookup: try the ranged walk first, and on a miss resume from the
/// recorded fork in the wanted direction.
pub(crate) unsafe fn range_generic<F: Flavor>(
	root: *mut *mut Node,
	walk: Walk,
	key: F::Key,
) -> *mut Node {
	if (*root).is_null() {
		return ptr::null_mut();
	}
	let d = descend::<F>(root, walk, key, false);
	if !d.hit.is_null() {
		return d.hit;
	}
	if d.back.is_null() {
		return ptr::null_mut();
	}
	let restart = match walk {
		Walk::Ge | Walk::Gt => Walk::Next,
		Walk::Le | Walk::Lt => Walk::Prev,
		_ => unreachable!(),
	};
	let mut fork: *mut Node = d.back;
	descend::<F>(&mut fork, restart, F::NIL_KEY, false).hit
}

/// Walks the whole structure, re-deriving node and leaf roles the same way
/// the descent does, and checks the structural invariants: branches are
/// non-null, no node forks twice on one path, and the in-order leaf walk
/// yields strictly increasing keys. Returns the number of entries.
pub(crate) unsafe fn verify_generic<F: Flavor>(root: *const *mut Node) -> Result<usize> {
	let top = *root;
	if top.is_null() {
		return Ok(0);
	}

	// (node, divergence of the parent pair, depth); `None` marks the root.
	let mut stack: SmallVec<[(*mut Node, Option<F::Div>, usize); 16]> = SmallVec::new();
	let mut forks: HashSet<*mut Node> = HashSet::new();
	let mut prev: Option<F::Key> = None;
	let mut count = 0usize;

	stack.push((top, None, 0));

	while let Some((node, pdiv, depth)) = stack.pop() {
		let l = Node::branch(node, 0);
		let r = Node::branch(node, 1);

		if l.is_null() || r.is_null() {
			return Err(Error::NullBranch { depth });
		}

		let leaf = if l == r {
			true
		} else {
			let cur = F::div(F::key_of(l), F::key_of(r));
			match pdiv {
				// Diverging at or above the parent pair: leaf role.
				Some(pd) => F::later_eq(pd, cur),
				None => false,
			}
		};

		if leaf {
			let k = F::key_of(node);
			if let Some(pk) = prev {
				if F::cmp_suffix(pk, k, F::START, false) != Ordering::Less {
					return Err(Error::OutOfOrder { depth });
				}
			}
			prev = Some(k);
			count += 1;
			continue;
		}

		if !forks.insert(node) {
			return Err(Error::ForkCycle { depth });
		}

		let cur = F::div(F::key_of(l), F::key_of(r));
		// Right first so the left child is processed first (in-order).
		stack.push((r, Some(cur), depth + 1));
		stack.push((l, Some(cur), depth + 1));
	}

	Ok(count)
}
