//! Trees keyed by fixed-size byte blocks.
//!
//! Every key in one tree has the same length; the divergence measure is
//! the bit length of the common prefix of two blocks. Two storage modes
//! exist, matching the two ways callers hold such keys:
//!
//! - [`BlockNode<N>`] embeds the `N` bytes right behind the links (direct
//!   storage), with the uniform length carried by the type;
//! - [`RefBlockNode`] references caller-owned bytes living elsewhere
//!   (indirect storage), for keys shared with other structures.

use std::cmp::Ordering;
use std::fmt;
use std::ptr::{self, NonNull};

use crate::error::Result;
use crate::key::{block_cmp_from, block_prefix_bits, Flavor};
use crate::{dump, Node, Walk};

/// Intrusive node embedding an `N`-byte key.
#[repr(C)]
pub struct BlockNode<const N: usize> {
	node: Node,
	key: [u8; N],
}

impl<const N: usize> BlockNode<N> {
	/// A detached node carrying `key`.
	pub const fn new(key: [u8; N]) -> BlockNode<N> {
		BlockNode {
			node: Node::new(),
			key,
		}
	}

	/// The embedded key bytes.
	#[inline]
	pub fn key(&self) -> &[u8; N] {
		&self.key
	}

	/// Whether the node is currently linked into a tree.
	#[inline]
	pub fn is_linked(&self) -> bool {
		self.node.is_linked()
	}
}

/// Intrusive node referencing a caller-owned key block.
///
/// The node records the address and length of the key bytes but does not
/// own them; they must outlive the node's tenure in a tree.
#[repr(C)]
pub struct RefBlockNode {
	node: Node,
	key: *const u8,
	len: usize,
}

impl RefBlockNode {
	/// A detached node referencing `key`.
	///
	/// The bytes are borrowed without a lifetime; see
	/// [`RefBlockTree::insert`] for the obligations this creates.
	pub fn new(key: &[u8]) -> RefBlockNode {
		RefBlockNode {
			node: Node::new(),
			key: key.as_ptr(),
			len: key.len(),
		}
	}

	/// The referenced key bytes.
	///
	/// # Safety
	///
	/// The bytes passed to [`new`](Self::new) must still be live.
	pub unsafe fn key(&self) -> &[u8] {
		std::slice::from_raw_parts(self.key, self.len)
	}

	/// Whether the node is currently linked into a tree.
	#[inline]
	pub fn is_linked(&self) -> bool {
		self.node.is_linked()
	}
}

pub(crate) struct MbFlavor<const N: usize>;

unsafe impl<const N: usize> Flavor for MbFlavor<N> {
	type Key = *const u8;
	type Div = u64;

	const START: u64 = 0;
	const NIL_KEY: *const u8 = ptr::null();
	const RESCAN_TAIL: bool = false;

	#[inline]
	unsafe fn key_of(node: *const Node) -> *const u8 {
		(*node.cast::<BlockNode<N>>()).key.as_ptr()
	}

	#[inline]
	unsafe fn div(a: *const u8, b: *const u8) -> u64 {
		block_prefix_bits(a, b, N)
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
		dl == dr && dl == (N as u64) * 8
	}

	#[inline]
	unsafe fn matches_node(key: *const u8, pk: *const u8, dl: u64, dr: u64, cur: u64) -> bool {
		// Both sides already share min(max(dl, dr), cur) bits with the
		// node's key, so the compare may start there.
		let mlen = dl.max(dr).min(cur);
		cur == (N as u64) * 8
			|| block_cmp_from(key, pk, N, (mlen / 8) as usize) == Ordering::Equal
	}

	#[inline]
	unsafe fn cmp_suffix(a: *const u8, b: *const u8, skip: u64, exact: bool) -> Ordering {
		if exact || (skip / 8) as usize >= N {
			return Ordering::Equal;
		}
		block_cmp_from(a, b, N, (skip / 8) as usize)
	}

	#[inline]
	fn split_label(d: u64) -> u64 {
		d
	}

	unsafe fn fmt_key(w: &mut dyn fmt::Write, key: *const u8) -> fmt::Result {
		for i in 0..N {
			write!(w, "{:02x}", *key.add(i))?;
		}
		Ok(())
	}
}

pub(crate) struct ImFlavor;

unsafe impl Flavor for ImFlavor {
	/// Address and length of the key bytes. All keys met during one
	/// descent have the tree's uniform length.
	type Key = (*const u8, usize);
	type Div = u64;

	const START: u64 = 0;
	const NIL_KEY: (*const u8, usize) = (ptr::null(), 0);
	const RESCAN_TAIL: bool = false;

	#[inline]
	unsafe fn key_of(node: *const Node) -> (*const u8, usize) {
		let n = node.cast::<RefBlockNode>();
		((*n).key, (*n).len)
	}

	#[inline]
	unsafe fn div(a: (*const u8, usize), b: (*const u8, usize)) -> u64 {
		debug_assert_eq!(a.1, b.1, "key lengths must be uniform per tree");
		block_prefix_bits(a.0, b.0, a.1.min(b.1))
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
	fn branch_hit(key: (*const u8, usize), dl: u64, dr: u64) -> bool {
		dl == dr && dl == (key.1 as u64) * 8
	}

	#[inline]
	unsafe fn matches_node(
		key: (*const u8, usize),
		pk: (*const u8, usize),
		dl: u64,
		dr: u64,
		cur: u64,
	) -> bool {
		let len = key.1.min(pk.1);
		let mlen = dl.max(dr).min(cur);
		cur == (len as u64) * 8
			|| block_cmp_from(key.0, pk.0, len, (mlen / 8) as usize) == Ordering::Equal
	}

	#[inline]
	unsafe fn cmp_suffix(
		a: (*const u8, usize),
		b: (*const u8, usize),
		skip: u64,
		exact: bool,
	) -> Ordering {
		let len = a.1.min(b.1);
		if exact || (skip / 8) as usize >= len {
			return Ordering::Equal;
		}
		block_cmp_from(a.0, b.0, len, (skip / 8) as usize)
	}

	#[inline]
	fn split_label(d: u64) -> u64 {
		d
	}

	unsafe fn fmt_key(w: &mut dyn fmt::Write, key: (*const u8, usize)) -> fmt::Result {
		for i in 0..key.1 {
			write!(w, "{:02x}", *key.0.add(i))?;
		}
		Ok(())
	}
}

/// Unique-key tree over `N`-byte blocks stored inside the nodes.
pub struct BlockTree<const N: usize> {
	root: *mut Node,
}

impl<const N: usize> BlockTree<N> {
	/// An empty tree.
	pub const fn new() -> BlockTree<N> {
		BlockTree {
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

	/// Inserts `node` keyed by its embedded block. Returns `node` itself
	/// on success, or the node already carrying an equal block.
	///
	/// # Safety
	///
	/// `node` must not be linked into any tree, and its allocation must
	/// neither move nor be dropped, nor be accessed mutably, until the
	/// tree hands it back.
	pub unsafe fn insert(&mut self, node: NonNull<BlockNode<N>>) -> NonNull<BlockNode<N>> {
		let key = (*node.as_ptr()).key.as_ptr();
		let ret = crate::insert_generic::<MbFlavor<N>>(&mut self.root, node.as_ptr().cast(), key);
		NonNull::new_unchecked(ret.cast())
	}

	/// The entry carrying `key`, if present.
	pub fn lookup(&self, key: &[u8; N]) -> Option<NonNull<BlockNode<N>>> {
		let p = unsafe { crate::lookup_generic::<MbFlavor<N>>(self.root_slot(), key.as_ptr()) };
		NonNull::new(p.cast())
	}

	/// The entry carrying `key`, or the greatest one below it.
	pub fn lookup_le(&self, key: &[u8; N]) -> Option<NonNull<BlockNode<N>>> {
		let p = unsafe {
			crate::range_generic::<MbFlavor<N>>(self.root_slot(), Walk::Le, key.as_ptr())
		};
		NonNull::new(p.cast())
	}

	/// The greatest entry strictly below `key`.
	pub fn lookup_lt(&self, key: &[u8; N]) -> Option<NonNull<BlockNode<N>>> {
		let p = unsafe {
			crate::range_generic::<MbFlavor<N>>(self.root_slot(), Walk::Lt, key.as_ptr())
		};
		NonNull::new(p.cast())
	}

	/// The entry carrying `key`, or the smallest one above it.
	pub fn lookup_ge(&self, key: &[u8; N]) -> Option<NonNull<BlockNode<N>>> {
		let p = unsafe {
			crate::range_generic::<MbFlavor<N>>(self.root_slot(), Walk::Ge, key.as_ptr())
		};
		NonNull::new(p.cast())
	}

	/// The smallest entry strictly above `key`.
	pub fn lookup_gt(&self, key: &[u8; N]) -> Option<NonNull<BlockNode<N>>> {
		let p = unsafe {
			crate::range_generic::<MbFlavor<N>>(self.root_slot(), Walk::Gt, key.as_ptr())
		};
		NonNull::new(p.cast())
	}

	/// The entry with the smallest key.
	pub fn first(&self) -> Option<NonNull<BlockNode<N>>> {
		let p = unsafe { crate::first_generic::<MbFlavor<N>>(self.root_slot()) };
		NonNull::new(p.cast())
	}

	/// The entry with the greatest key.
	pub fn last(&self) -> Option<NonNull<BlockNode<N>>> {
		let p = unsafe { crate::last_generic::<MbFlavor<N>>(self.root_slot()) };
		NonNull::new(p.cast())
	}

	/// The in-order successor of `node`.
	///
	/// # Safety
	///
	/// `node` must be linked into this tree.
	pub unsafe fn next(&self, node: NonNull<BlockNode<N>>) -> Option<NonNull<BlockNode<N>>> {
		let key = (*node.as_ptr()).key.as_ptr();
		let p = crate::next_generic::<MbFlavor<N>>(self.root_slot(), key);
		NonNull::new(p.cast())
	}

	/// The in-order predecessor of `node`.
	///
	/// # Safety
	///
	/// `node` must be linked into this tree.
	pub unsafe fn prev(&self, node: NonNull<BlockNode<N>>) -> Option<NonNull<BlockNode<N>>> {
		let key = (*node.as_ptr()).key.as_ptr();
		let p = crate::prev_generic::<MbFlavor<N>>(self.root_slot(), key);
		NonNull::new(p.cast())
	}

	/// Unlinks `node` and returns it, or `None` when it is detached or
	/// its key resolves to a different allocation.
	///
	/// # Safety
	///
	/// `node` must either be linked into this tree or detached.
	pub unsafe fn delete(&mut self, node: NonNull<BlockNode<N>>) -> Option<NonNull<BlockNode<N>>> {
		let key = (*node.as_ptr()).key.as_ptr();
		let p = crate::delete_generic::<MbFlavor<N>>(&mut self.root, node.as_ptr().cast(), key);
		NonNull::new(p.cast())
	}

	/// Unlinks and returns the entry carrying `key`, if present.
	pub fn pick(&mut self, key: &[u8; N]) -> Option<NonNull<BlockNode<N>>> {
		let p = unsafe {
			crate::delete_generic::<MbFlavor<N>>(&mut self.root, ptr::null_mut(), key.as_ptr())
		};
		NonNull::new(p.cast())
	}

	/// Re-checks the structural invariants and returns the number of
	/// entries.
	pub fn verify(&self) -> Result<usize> {
		unsafe { crate::verify_generic::<MbFlavor<N>>(&self.root) }
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
		highlight: Option<NonNull<BlockNode<N>>>,
	) -> fmt::Result {
		let hl = highlight.map_or(ptr::null(), |h| h.as_ptr().cast_const().cast());
		unsafe { dump::dump_generic::<MbFlavor<N>>(w, &self.root, label, hl) }
	}
}

impl<const N: usize> Default for BlockTree<N> {
	fn default() -> BlockTree<N> {
		BlockTree::new()
	}
}

/// Unique-key tree over equal-length blocks referenced by the nodes.
///
/// All keys linked into one tree must have the same length; mixing
/// lengths breaks the divergence measure and with it the whole structure.
pub struct RefBlockTree {
	root: *mut Node,
}

impl RefBlockTree {
	/// An empty tree.
	pub const fn new() -> RefBlockTree {
		RefBlockTree {
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

	/// Inserts `node` keyed by its referenced block. Returns `node`
	/// itself on success, or the node already carrying an equal block.
	///
	/// # Safety
	///
	/// `node` must not be linked into any tree; its allocation and the
	/// key bytes it references must stay put, alive and unmodified until
	/// the tree hands the node back; and the key must have the same
	/// length as every other key in this tree.
	pub unsafe fn insert(&mut self, node: NonNull<RefBlockNode>) -> NonNull<RefBlockNode> {
		let key = ((*node.as_ptr()).key, (*node.as_ptr()).len);
		let ret = crate::insert_generic::<ImFlavor>(&mut self.root, node.as_ptr().cast(), key);
		NonNull::new_unchecked(ret.cast())
	}

	/// The entry carrying `key`, if present. `key` must have the tree's
	/// uniform length.
	pub fn lookup(&self, key: &[u8]) -> Option<NonNull<RefBlockNode>> {
		let p = unsafe {
			crate::lookup_generic::<ImFlavor>(self.root_slot(), (key.as_ptr(), key.len()))
		};
		NonNull::new(p.cast())
	}

	/// The entry carrying `key`, or the greatest one below it.
	pub fn lookup_le(&self, key: &[u8]) -> Option<NonNull<RefBlockNode>> {
		let p = unsafe {
			crate::range_generic::<ImFlavor>(self.root_slot(), Walk::Le, (key.as_ptr(), key.len()))
		};
		NonNull::new(p.cast())
	}

	/// The greatest entry strictly below `key`.
	pub fn lookup_lt(&self, key: &[u8]) -> Option<NonNull<RefBlockNode>> {
		let p = unsafe {
			crate::range_generic::<ImFlavor>(self.root_slot(), Walk::Lt, (key.as_ptr(), key.len()))
		};
		NonNull::new(p.cast())
	}

	/// The entry carrying `key`, or the smallest one above it.
	pub fn lookup_ge(&self, key: &[u8]) -> Option<NonNull<RefBlockNode>> {
		let p = unsafe {
			crate::range_generic::<ImFlavor>(self.root_slot(), Walk::Ge, (key.as_ptr(), key.len()))
		};
		NonNull::new(p.cast())
	}

	/// The smallest entry strictly above `key`.
	pub fn lookup_gt(&self, key: &[u8]) -> Option<NonNull<RefBlockNode>> {
		let p = unsafe {
			crate::range_generic::<ImFlavor>(self.root_slot(), Walk::Gt, (key.as_ptr(), key.len()))
		};
		NonNull::new(p.cast())
	}

	/// The entry with the smallest key.
	pub fn first(&self) -> Option<NonNull<RefBlockNode>> {
		let p = unsafe { crate::first_generic::<ImFlavor>(self.root_slot()) };
		NonNull::new(p.cast())
	}

	/// The entry with the greatest key.
	pub fn last(&self) -> Option<NonNull<RefBlockNode>> {
		let p = unsafe { crate::last_generic::<ImFlavor>(self.root_slot()) };
		NonNull::new(p.cast())
	}

	/// The in-order successor of `node`.
	///
	/// # Safety
	///
	/// `node` must be linked into this tree.
	pub unsafe fn next(&self, node: NonNull<RefBlockNode>) -> Option<NonNull<RefBlockNode>> {
		let key = ((*node.as_ptr()).key, (*node.as_ptr()).len);
		let p = crate::next_generic::<ImFlavor>(self.root_slot(), key);
		NonNull::new(p.cast())
	}

	/// The in-order predecessor of `node`.
	///
	/// # Safety
	///
	/// `node` must be linked into this tree.
	pub unsafe fn prev(&self, node: NonNull<RefBlockNode>) -> Option<NonNull<RefBlockNode>> {
		let key = ((*node.as_ptr()).key, (*node.as_ptr()).len);
		let p = crate::prev_generic::<ImFlavor>(self.root_slot(), key);
		NonNull::new(p.cast())
	}

	/// Unlinks `node` and returns it, or `None` when it is detached or
	/// its key resolves to a different allocation.
	///
	/// # Safety
	///
	/// `node` must either be linked into this tree or detached.
	pub unsafe fn delete(&mut self, node: NonNull<RefBlockNode>) -> Option<NonNull<RefBlockNode>> {
		let key = ((*node.as_ptr()).key, (*node.as_ptr()).len);
		let p = crate::delete_generic::<ImFlavor>(&mut self.root, node.as_ptr().cast(), key);
		NonNull::new(p.cast())
	}

	/// Unlinks and returns the entry carrying `key`, if present.
	pub fn pick(&mut self, key: &[u8]) -> Option<NonNull<RefBlockNode>> {
		let p = unsafe {
			crate::delete_generic::<ImFlavor>(
				&mut self.root,
				ptr::null_mut(),
				(key.as_ptr(), key.len()),
			)
		};
		NonNull::new(p.cast())
	}

	/// Re-checks the structural invariants and returns the number of
	/// entries.
	pub fn verify(&self) -> Result<usize> {
		unsafe { crate::verify_generic::<ImFlavor>(&self.root) }
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
		highlight: Option<NonNull<RefBlockNode>>,
	) -> fmt::Result {
		let hl = highlight.map_or(ptr::null(), |h| h.as_ptr().cast_const().cast());
		unsafe { dump::dump_generic::<ImFlavor>(w, &self.root, label, hl) }
	}
}

impl Default for RefBlockTree {
	fn default() -> RefBlockTree {
		RefBlockTree::new()
	}
}
