//! Trees keyed by NUL-terminated strings.
//!
//! The divergence measure is the bit length of the common prefix, with
//! the terminating NUL taking part in the compare; that is what keeps
//! "1", "10" and "100" apart even though each is a prefix of the next.
//! Two strings matching through their terminator report a divergence
//! beyond any real prefix length, which tells the descent the key is an
//! exact match while still letting it run down to the leaf.
//!
//! [`StrNode`] owns its key as a [`CString`]; [`RefStrNode`] references
//! caller-owned bytes, for keys that already live in another structure.

use std::cmp::Ordering;
use std::ffi::{CStr, CString};
use std::fmt;
use std::ptr::{self, NonNull};

use crate::error::Result;
use crate::key::{string_cmp_from, string_prefix_bits, Flavor, PREFIX_EQUAL};
use crate::{dump, Node, Walk};

/// Intrusive node owning its NUL-terminated key.
#[repr(C)]
pub struct StrNode {
	node: Node,
	key: CString,
}

impl StrNode {
	/// A detached node carrying `key`.
	pub fn new(key: CString) -> StrNode {
		StrNode {
			node: Node::new(),
			key,
		}
	}

	/// The embedded key.
	#[inline]
	pub fn key(&self) -> &CStr {
		self.key.as_c_str()
	}

	/// Whether the node is currently linked into a tree.
	#[inline]
	pub fn is_linked(&self) -> bool {
		self.node.is_linked()
	}

	#[inline]
	pub(crate) fn raw_key(&self) -> *const u8 {
		self.key.as_ptr().cast()
	}
}

/// Intrusive node referencing a caller-owned NUL-terminated key.
#[repr(C)]
pub struct RefStrNode {
	node: Node,
	key: *const u8,
}

impl RefStrNode {
	/// A detached node referencing `key`.
	///
	/// The bytes are borrowed without a lifetime; see
	/// [`RefStrTree::insert`] for the obligations this creates.
	pub fn new(key: &CStr) -> RefStrNode {
		RefStrNode {
			node: Node::new(),
			key: key.as_ptr().cast(),
		}
	}

	/// The referenced key.
	///
	/// # Safety
	///
	/// The bytes passed to [`new`](Self::new) must still be live.
	pub unsafe fn key(&self) -> &CStr {
		CStr::from_ptr(self.key.cast())
	}

	/// Whether the node is currently linked into a tree.
	#[inline]
	pub fn is_linked(&self) -> bool {
		self.node.is_linked()
	}

	#[inline]
	pub(crate) fn raw_key(&self) -> *const u8 {
		self.key
	}
}

/// Shared logic of the two string flavors; only key retrieval differs.
macro_rules! string_flavor {
	($flavor:ident, $node:ident) => {
		pub(crate) struct $flavor;

		unsafe impl Flavor for $flavor {
			type Key = *const u8;
			type Div = u64;

			const START: u64 = 0;
			const NIL_KEY: *const u8 = ptr::null();
			const RESCAN_TAIL: bool = true;

			#[inline]
			unsafe fn key_of(node: *const Node) -> *const u8 {
				(*node.cast::<$node>()).raw_key()
			}

			#[inline]
			unsafe fn div(a: *const u8, b: *const u8) -> u64 {
				string_prefix_bits(a, b)
			}

			#[inline]
			fn later_eq(a: u64, b: u64) -> bool {
				a >= b
			}

			#[inline]
			fn later_of(a: u64, b: u64) -> u64 {
				a.max(b)
			}

			#[inline]
			fn branch_hit(_key: *const u8, dl: u64, dr: u64) -> bool {
				// A branch matching through the terminator is the key.
				dl == PREFIX_EQUAL || dr == PREFIX_EQUAL
			}

			#[inline]
			unsafe fn matches_node(
				key: *const u8,
				pk: *const u8,
				dl: u64,
				dr: u64,
				cur: u64,
			) -> bool {
				// Both sides share min(max(dl, dr), cur) bits with the
				// node's key, the compare may start there. The full
				// compare is still needed: the prefix alone misleads on
				// sequences like 1 2 3 4 10 11 followed by removals.
				let mlen = dl.max(dr).min(cur);
				string_cmp_from(key, pk, (mlen / 8) as usize) == Ordering::Equal
			}

			#[inline]
			unsafe fn cmp_suffix(a: *const u8, b: *const u8, skip: u64, exact: bool) -> Ordering {
				if exact || skip == PREFIX_EQUAL {
					return Ordering::Equal;
				}
				string_cmp_from(a, b, (skip / 8) as usize)
			}

			#[inline]
			fn split_label(d: u64) -> u64 {
				d
			}

			unsafe fn fmt_key(w: &mut dyn fmt::Write, key: *const u8) -> fmt::Result {
				let s = CStr::from_ptr(key.cast());
				write!(w, "{}", s.to_string_lossy())
			}
		}
	};
}

string_flavor!(StFlavor, StrNode);
string_flavor!(IsFlavor, RefStrNode);

macro_rules! string_tree {
	($tree:ident, $node:ident, $flavor:ident, $own:literal) => {
		#[doc = concat!("Unique-key tree over NUL-terminated strings ", $own, " the nodes.")]
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

			/// Inserts `node` keyed by its string. Returns `node` itself
			/// on success, or the node already carrying an equal string.
			///
			/// # Safety
			///
			/// `node` must not be linked into any tree, and its
			/// allocation (plus the key bytes, where the node only
			/// references them) must stay put, alive and unmodified
			/// until the tree hands the node back.
			pub unsafe fn insert(&mut self, node: NonNull<$node>) -> NonNull<$node> {
				let key = $flavor::key_of(node.as_ptr().cast_const().cast());
				let ret =
					crate::insert_generic::<$flavor>(&mut self.root, node.as_ptr().cast(), key);
				NonNull::new_unchecked(ret.cast())
			}

			/// The entry carrying `key`, if present.
			pub fn lookup(&self, key: &CStr) -> Option<NonNull<$node>> {
				let p = unsafe {
					crate::lookup_generic::<$flavor>(self.root_slot(), key.as_ptr().cast())
				};
				NonNull::new(p.cast())
			}

			/// The entry carrying `key`, or the greatest one below it.
			pub fn lookup_le(&self, key: &CStr) -> Option<NonNull<$node>> {
				let p = unsafe {
					crate::range_generic::<$flavor>(self.root_slot(), Walk::Le, key.as_ptr().cast())
				};
				NonNull::new(p.cast())
			}

			/// The greatest entry strictly below `key`.
			pub fn lookup_lt(&self, key: &CStr) -> Option<NonNull<$node>> {
				let p = unsafe {
					crate::range_generic::<$flavor>(self.root_slot(), Walk::Lt, key.as_ptr().cast())
				};
				NonNull::new(p.cast())
			}

			/// The entry carrying `key`, or the smallest one above it.
			pub fn lookup_ge(&self, key: &CStr) -> Option<NonNull<$node>> {
				let p = unsafe {
					crate::range_generic::<$flavor>(self.root_slot(), Walk::Ge, key.as_ptr().cast())
				};
				NonNull::new(p.cast())
			}

			/// The smallest entry strictly above `key`.
			pub fn lookup_gt(&self, key: &CStr) -> Option<NonNull<$node>> {
				let p = unsafe {
					crate::range_generic::<$flavor>(self.root_slot(), Walk::Gt, key.as_ptr().cast())
				};
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
				let key = $flavor::key_of(node.as_ptr().cast_const().cast());
				let p = crate::next_generic::<$flavor>(self.root_slot(), key);
				NonNull::new(p.cast())
			}

			/// The in-order predecessor of `node`.
			///
			/// # Safety
			///
			/// `node` must be linked into this tree.
			pub unsafe fn prev(&self, node: NonNull<$node>) -> Option<NonNull<$node>> {
				let key = $flavor::key_of(node.as_ptr().cast_const().cast());
				let p = crate::prev_generic::<$flavor>(self.root_slot(), key);
				NonNull::new(p.cast())
			}

			/// Unlinks `node` and returns it, or `None` when it is
			/// detached or its key resolves to a different allocation.
			///
			/// # Safety
			///
			/// `node` must either be linked into this tree or detached.
			pub unsafe fn delete(&mut self, node: NonNull<$node>) -> Option<NonNull<$node>> {
				let key = $flavor::key_of(node.as_ptr().cast_const().cast());
				let p = crate::delete_generic::<$flavor>(
					&mut self.root,
					node.as_ptr().cast(),
					key,
				);
				NonNull::new(p.cast())
			}

			/// Unlinks and returns the entry carrying `key`, if present.
			pub fn pick(&mut self, key: &CStr) -> Option<NonNull<$node>> {
				let p = unsafe {
					crate::delete_generic::<$flavor>(
						&mut self.root,
						ptr::null_mut(),
						key.as_ptr().cast(),
					)
				};
				NonNull::new(p.cast())
			}

			/// Re-checks the structural invariants and returns the
			/// number of entries.
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

string_tree!(StrTree, StrNode, StFlavor, "owned by");
string_tree!(RefStrTree, RefStrNode, IsFlavor, "referenced by");
