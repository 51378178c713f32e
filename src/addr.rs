//! Trees keyed by the node's own address.
//!
//! No key is stored at all: the allocation address of each entry is the
//! key, which makes this the cheapest possible way to keep track of a set
//! of allocations and walk them in address order, e.g. to find the
//! neighbors of a block inside an allocator.

use std::cmp::Ordering;
use std::fmt;
use std::ptr::{self, NonNull};

use crate::error::Result;
use crate::key::Flavor;
use crate::{dump, Node, Walk};

/// Intrusive node whose address serves as its key.
#[repr(C)]
pub struct AddrNode {
	node: Node,
}

impl AddrNode {
	/// A detached node.
	pub const fn new() -> AddrNode {
		AddrNode { node: Node::new() }
	}

	/// Whether the node is currently linked into a tree.
	#[inline]
	pub fn is_linked(&self) -> bool {
		self.node.is_linked()
	}
}

impl Default for AddrNode {
	fn default() -> AddrNode {
		AddrNode::new()
	}
}

pub(crate) struct AddrFlavor;

unsafe impl Flavor for AddrFlavor {
	type Key = usize;
	type Div = usize;

	const START: usize = usize::MAX;
	const NIL_KEY: usize = 0;
	const RESCAN_TAIL: bool = false;

	#[inline]
	unsafe fn key_of(node: *const Node) -> usize {
		node as usize
	}

	#[inline]
	unsafe fn div(a: usize, b: usize) -> usize {
		a ^ b
	}

	#[inline]
	fn later_eq(a: usize, b: usize) -> bool {
		a <= b
	}

	#[inline]
	fn later_of(a: usize, b: usize) -> usize {
		a.min(b)
	}

	#[inline]
	fn branch_hit(_key: usize, _dl: usize, _dr: usize) -> bool {
		false
	}

	#[inline]
	unsafe fn matches_node(key: usize, pk: usize, _dl: usize, _dr: usize, _cur: usize) -> bool {
		key == pk
	}

	#[inline]
	unsafe fn cmp_suffix(a: usize, b: usize, _skip: usize, _exact: bool) -> Ordering {
		a.cmp(&b)
	}

	#[inline]
	fn split_label(d: usize) -> u64 {
		u64::from((usize::BITS - 1).saturating_sub(d.leading_zeros()))
	}

	unsafe fn fmt_key(w: &mut dyn fmt::Write, key: usize) -> fmt::Result {
		write!(w, "{:#x}", key)
	}
}

/// Unique tree over node addresses.
///
/// Since the address is the key, there is no separate lookup-by-value:
/// all queries take a node pointer and resolve against the addresses of
/// the linked entries.
pub struct AddrTree {
	root: *mut Node,
}

impl AddrTree {
	/// An empty tree.
	pub const fn new() -> AddrTree {
		AddrTree {
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

	/// Links `node`, keyed by its own address. Always returns `node`:
	/// an address cannot collide with another live allocation.
	///
	/// # Safety
	///
	/// `node` must not be linked into any tree, and its allocation must
	/// neither move nor be dropped, nor be accessed mutably, until the
	/// tree hands it back.
	pub unsafe fn insert(&mut self, node: NonNull<AddrNode>) -> NonNull<AddrNode> {
		let key = node.as_ptr() as usize;
		let ret = crate::insert_generic::<AddrFlavor>(&mut self.root, node.as_ptr().cast(), key);
		NonNull::new_unchecked(ret.cast())
	}

	/// The entry at address `addr`, if linked here.
	pub fn lookup(&self, addr: *const AddrNode) -> Option<NonNull<AddrNode>> {
		let p = unsafe { crate::lookup_generic::<AddrFlavor>(self.root_slot(), addr as usize) };
		NonNull::new(p.cast())
	}

	/// The entry at `addr`, or the one with the greatest lower address.
	pub fn lookup_le(&self, addr: *const AddrNode) -> Option<NonNull<AddrNode>> {
		let p =
			unsafe { crate::range_generic::<AddrFlavor>(self.root_slot(), Walk::Le, addr as usize) };
		NonNull::new(p.cast())
	}

	/// The entry with the greatest address strictly below `addr`.
	pub fn lookup_lt(&self, addr: *const AddrNode) -> Option<NonNull<AddrNode>> {
		let p =
			unsafe { crate::range_generic::<AddrFlavor>(self.root_slot(), Walk::Lt, addr as usize) };
		NonNull::new(p.cast())
	}

	/// The entry at `addr`, or the one with the smallest higher address.
	pub fn lookup_ge(&self, addr: *const AddrNode) -> Option<NonNull<AddrNode>> {
		let p =
			unsafe { crate::range_generic::<AddrFlavor>(self.root_slot(), Walk::Ge, addr as usize) };
		NonNull::new(p.cast())
	}

	/// The entry with the smallest address strictly above `addr`.
	pub fn lookup_gt(&self, addr: *const AddrNode) -> Option<NonNull<AddrNode>> {
		let p =
			unsafe { crate::range_generic::<AddrFlavor>(self.root_slot(), Walk::Gt, addr as usize) };
		NonNull::new(p.cast())
	}

	/// The entry with the lowest address.
	pub fn first(&self) -> Option<NonNull<AddrNode>> {
		let p = unsafe { crate::first_generic::<AddrFlavor>(self.root_slot()) };
		NonNull::new(p.cast())
	}

	/// The entry with the highest address.
	pub fn last(&self) -> Option<NonNull<AddrNode>> {
		let p = unsafe { crate::last_generic::<AddrFlavor>(self.root_slot()) };
		NonNull::new(p.cast())
	}

	/// The linked entry with the smallest address above `node`.
	///
	/// # Safety
	///
	/// `node` must be linked into this tree.
	pub unsafe fn next(&self, node: NonNull<AddrNode>) -> Option<NonNull<AddrNode>> {
		let p = crate::next_generic::<AddrFlavor>(self.root_slot(), node.as_ptr() as usize);
		NonNull::new(p.cast())
	}

	/// The linked entry with the greatest address below `node`.
	///
	/// # Safety
	///
	/// `node` must be linked into this tree.
	pub unsafe fn prev(&self, node: NonNull<AddrNode>) -> Option<NonNull<AddrNode>> {
		let p = crate::prev_generic::<AddrFlavor>(self.root_slot(), node.as_ptr() as usize);
		NonNull::new(p.cast())
	}

	/// Unlinks `node` and returns it, or `None` when it was already
	/// detached. Removal is idempotent.
	///
	/// # Safety
	///
	/// `node` must either be linked into this tree or detached.
	pub unsafe fn delete(&mut self, node: NonNull<AddrNode>) -> Option<NonNull<AddrNode>> {
		let p = crate::delete_generic::<AddrFlavor>(
			&mut self.root,
			node.as_ptr().cast(),
			node.as_ptr() as usize,
		);
		NonNull::new(p.cast())
	}

	/// Unlinks and returns the entry at address `addr`, if linked here.
	pub fn pick(&mut self, addr: *const AddrNode) -> Option<NonNull<AddrNode>> {
		let p = unsafe {
			crate::delete_generic::<AddrFlavor>(&mut self.root, ptr::null_mut(), addr as usize)
		};
		NonNull::new(p.cast())
	}

	/// Re-checks the structural invariants and returns the number of
	/// entries.
	pub fn verify(&self) -> Result<usize> {
		unsafe { crate::verify_generic::<AddrFlavor>(&self.root) }
	}

	/// Panics when [`verify`](Self::verify) reports corruption.
	pub fn assert_invariants(&self) {
		if let Err(err) = self.verify() {
			panic!("tree invariants violated: {}", err);
		}
	}

	/// Writes the tree as a Graphviz `digraph`, optionally highlighting
	/// one node in red.
	pub fn dump_dot(
		&self,
		w: &mut impl fmt::Write,
		label: &str,
		highlight: Option<NonNull<AddrNode>>,
	) -> fmt::Result {
		let hl = highlight.map_or(ptr::null(), |h| h.as_ptr().cast_const().cast());
		unsafe { dump::dump_generic::<AddrFlavor>(w, &self.root, label, hl) }
	}
}

impl Default for AddrTree {
	fn default() -> AddrTree {
		AddrTree::new()
	}
}
