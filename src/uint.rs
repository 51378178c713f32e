//! Trees keyed by fixed-width unsigned integers.
//!
//! The key sits right behind the two links, the divergence measure is the
//! plain xor of two keys, and everything else is the shared machinery of
//! the crate root. Two widths are provided, [`U32Tree`] and [`U64Tree`];
//! they only differ in the embedded key type.

use std::cmp::Ordering;
use std::fmt;
use std::ptr::{self, NonNull};

use crate::error::Result;
use crate::key::Flavor;
use crate::{dump, Node, Walk};

/// Intrusive node carrying a `u32` key.
///
/// Embed it in a caller-owned allocation and hand a [`NonNull`] to the
/// tree. The key cannot change while the node is linked.
#[repr(C)]
pub struct U32Node {
	node: Node,
	key: u32,
}

impl U32Node {
	/// A detached node carrying `key`.
	pub const fn new(key: u32) -> U32Node {
		U32Node {
			node: Node::new(),
			key,
		}
	}

	/// The embedded key.
	#[inline]
	pub fn key(&self) -> u32 {
		self.key
	}

	/// Whether the node is currently linked into a tree.
	#[inline]
	pub fn is_linked(&self) -> bool {
		self.node.is_linked()
	}
}

/// Intrusive node carrying a `u64` key.
#[repr(C)]
pub struct U64Node {
	node: Node,
	key: u64,
}

impl U64Node {
	/// A detached node carrying `key`.
	pub const fn new(key: u64) -> U64Node {
		U64Node {
			node: Node::new(),
			key,
		}
	}

	/// The embedded key.
	#[inline]
	pub fn key(&self) -> u64 {
		self.key
	}

	/// Whether the node is currently linked into a tree.
	#[inline]
	pub fn is_linked(&self) -> bool {
		self.node.is_linked()
	}
}

pub(crate) struct U32Flavor;

unsafe impl Flavor for U32Flavor {
	type Key = u32;
	type Div = u32;

	const START: u32 = u32::MAX;
	const NIL_KEY: u32 = 0;
	const RESCAN_TAIL: bool = false;

	#[inline]
	unsafe fn key_of(node: *const Node) -> u32 {
		(*node.cast::<U32Node>()).key
	}

	#[inline]
	unsafe fn div(a: u32, b: u32) -> u32 {
		a ^ b
	}

	#[inline]
	fn later_eq(a: u32, b: u32) -> bool {
		a <= b
	}

	#[inline]
	fn later_of(a: u32, b: u32) -> u32 {
		a.min(b)
	}

	#[inline]
	fn branch_hit(_key: u32, _dl: u32, _dr: u32) -> bool {
		// Scalar exit compares are a single instruction, nothing to save.
		false
	}

	#[inline]
	unsafe fn matches_node(key: u32, pk: u32, _dl: u32, _dr: u32, _cur: u32) -> bool {
		key == pk
	}

	#[inline]
	unsafe fn cmp_suffix(a: u32, b: u32, _skip: u32, _exact: bool) -> Ordering {
		a.cmp(&b)
	}

	#[inline]
	fn split_label(d: u32) -> u64 {
		u64::from(31u32.saturating_sub(d.leading_zeros()))
	}

	unsafe fn fmt_key(w: &mut dyn fmt::Write, key: u32) -> fmt::Result {
		write!(w, "{}", key)
	}
}

pub(crate) struct U64Flavor;

unsafe impl Flavor for U64Flavor {
	type Key = u64;
	type Div = u64;

	const START: u64 = u64::MAX;
	const NIL_KEY: u64 = 0;
	const RESCAN_TAIL: bool = false;

	#[inline]
	unsafe fn key_of(node: *const Node) -> u64 {
		(*node.cast::<U64Node>()).key
	}

	#[inline]
	unsafe fn div(a: u64, b: u64) -> u64 {
		a ^ b
	}

	#[inline]
	fn later_eq(a: u64, b: u64) -> bool {
		a <= b
	}

	#[inline]
	fn later_of(a: u64, b: u64) -> u64 {
		a.min(b)
	}

	#[inline]
	fn branch_hit(_key: u64, _dl: u64, _dr: u64) -> bool {
		false
	}

	#[inline]
	unsafe fn matches_node(key: u64, pk: u64, _dl: u64, _dr: u64, _cur: u64) -> bool {
		key == pk
	}

	#[inline]
	unsafe fn cmp_suffix(a: u64, b: u64, _skip: u64, _exact: bool) -> Ordering {
		a.cmp(&b)
	}

	#[inline]
	fn split_label(d: u64) -> u64 {
		u64::from(63u32.saturating_sub(d.leading_zeros()))
	}

	unsafe fn fmt_key(w: &mut dyn fmt::Write, key: u64) -> fmt::Result {
		write!(w, "{}", key)
	}
}

macro_rules! uint_tree {
	($tree:ident, $node:ident, $flavor:ident, $key:ty, $doc_width:literal) => {
		#[doc = concat!("Unique-key tree over ", $doc_width, " keys.")]
		///
		/// The tree owns nothing but its root slot; every entry lives in a
		/// caller-owned allocation embedding the matching node type.
		pub struct $tree {
			root: *mut Node,
		}

		impl $tree {
			/// An empty tree.
			pub const fn new() -> $tree {
				$tree {
					root: ptr::null_mut(),
				}
			}

			/// Whether the tree holds no entry.
			#[inline]
			pub fn is_empty(&self) -> bool {
				self.root.is_null()
			}

			#[inline]
			fn root_slot(&self) -> *mut *mut Node {
				&self.root as *const *mut Node as *mut *mut Node
			}

			/// Inserts `node` keyed by its embedded key. Returns `node`
			/// itself on success, or the node already carrying that key,
			/// in which case the tree is left untouched.
			///
			/// # Safety
			///
			/// `node` must not be linked into any tree, and its allocation
			/// must neither move nor be dropped, nor be accessed mutably,
			/// until the tree hands it back through
			/// [`delete`](Self::delete) or [`pick`](Self::pick).
			pub unsafe fn insert(&mut self, node: NonNull<$node>) -> NonNull<$node> {
				let key = (*node.as_ptr()).key;
				let ret =
					crate::insert_generic::<$flavor>(&mut self.root, node.as_ptr().cast(), key);
				NonNull::new_unchecked(ret.cast())
			}

			/// The entry carrying `key`, if present.
			pub fn lookup(&self, key: $key) -> Option<NonNull<$node>> {
				let p = unsafe { crate::lookup_generic::<$flavor>(self.root_slot(), key) };
				NonNull::new(p.cast())
			}

			/// The entry carrying `key`, or the greatest one below it.
			pub fn lookup_le(&self, key: $key) -> Option<NonNull<$node>> {
				let p =
					unsafe { crate::range_generic::<$flavor>(self.root_slot(), Walk::Le, key) };
				NonNull::new(p.cast())
			}

			/// The greatest entry strictly below `key`.
			pub fn lookup_lt(&self, key: $key) -> Option<NonNull<$node>> {
				let p =
					unsafe { crate::range_generic::<$flavor>(self.root_slot(), Walk::Lt, key) };
				NonNull::new(p.cast())
			}

			/// The entry carrying `key`, or the smallest one above it.
			pub fn lookup_ge(&self, key: $key) -> Option<NonNull<$node>> {
				let p =
					unsafe { crate::range_generic::<$flavor>(self.root_slot(), Walk::Ge, key) };
				NonNull::new(p.cast())
			}

			/// The smallest entry strictly above `key`.
			pub fn lookup_gt(&self, key: $key) -> Option<NonNull<$node>> {
				let p =
					unsafe { crate::range_generic::<$flavor>(self.root_slot(), Walk::Gt, key) };
				NonNull::new(p.cast())
			}

			/// The entry with the smallest key.
			pub fn first(&self) -> Option<NonNull<$node>> {
				let p = unsafe { crate::first_generic::<$flavor>(self.root_slot()) };
				NonNull::new(p.cast())
			}

			/// The entry with the greatest key.
			pub fn last(&self) -> Option<NonNull<$node>> {
				let p = unsafe { crate::last_generic::<$flavor>(self.root_slot()) };
				NonNull::new(p.cast())
			}

			/// The in-order successor of `node`.
			///
			/// # Safety
			///
			/// `node` must be linked into this tree.
			pub unsafe fn next(&self, node: NonNull<$node>) -> Option<NonNull<$node>> {
				let key = (*node.as_ptr()).key;
				let p = crate::next_generic::<$flavor>(self.root_slot(), key);
				NonNull::new(p.cast())
			}

			/// The in-order predecessor of `node`.
			///
			/// # Safety
			///
			/// `node` must be linked into this tree.
			pub unsafe fn prev(&self, node: NonNull<$node>) -> Option<NonNull<$node>> {
				let key = (*node.as_ptr()).key;
				let p = crate::prev_generic::<$flavor>(self.root_slot(), key);
				NonNull::new(p.cast())
			}

			/// Unlinks `node` and returns it, or `None` when the node is
			/// already detached or its key resolves to a different
			/// allocation. Removal is idempotent.
			///
			/// # Safety
			///
			/// `node` must either be linked into this tree or detached; a
			/// node linked into another tree is corruption on both.
			pub unsafe fn delete(&mut self, node: NonNull<$node>) -> Option<NonNull<$node>> {
				let key = (*node.as_ptr()).key;
				let p = crate::delete_generic::<$flavor>(
					&mut self.root,
					node.as_ptr().cast(),
					key,
				);
				NonNull::new(p.cast())
			}

			/// Unlinks and returns the entry carrying `key`, if present.
			/// The caller regains full ownership of the returned node.
			pub fn pick(&mut self, key: $key) -> Option<NonNull<$node>> {
				let p = unsafe {
					crate::delete_generic::<$flavor>(&mut self.root, ptr::null_mut(), key)
				};
				NonNull::new(p.cast())
			}

			/// Re-checks the structural invariants and returns the number
			/// of entries. Intended for tests and debugging; the regular
			/// operations never validate anything.
			pub fn verify(&self) -> Result<usize> {
				unsafe { crate::verify_generic::<$flavor>(&self.root) }
			}

			/// Panics when [`verify`](Self::verify) reports corruption.
			pub fn assert_invariants(&self) {
				if let Err(err) = self.verify() {
					panic!("tree invariants violated: {}", err);
				}
			}

			/// Writes the tree as a Graphviz `digraph`, optionally
			/// highlighting one node in red.
			pub fn dump_dot(
				&self,
				w: &mut impl fmt::Write,
				label: &str,
				highlight: Option<NonNull<$node>>,
			) -> fmt::Result {
				let hl = highlight.map_or(ptr::null(), |h| h.as_ptr().cast_const().cast());
				unsafe { dump::dump_generic::<$flavor>(w, &self.root, label, hl) }
			}
		}

		impl Default for $tree {
			fn default() -> $tree {
				$tree::new()
			}
		}
	};
}

uint_tree!(U32Tree, U32Node, U32Flavor, u32, "32-bit unsigned");
uint_tree!(U64Tree, U64Node, U64Flavor, u64, "64-bit unsigned");
