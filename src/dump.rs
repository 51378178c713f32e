//! Graphviz rendering of a tree, for debugging descent problems.
//!
//! The dumper never trusts a role: like the descent itself, it re-derives
//! whether a branch target acts as a fork or as a leaf by comparing
//! divergences, so a corrupted structure shows up visually as arrows
//! pointing at the wrong kind of box. Forks render light blue with their
//! split bit, leaves yellow, the nodeless leaf green, and an optional
//! highlight node red.

use std::fmt::{self, Write};

use smallvec::SmallVec;

use crate::key::Flavor;
use crate::Node;

/// Whether `node`, reached from a parent pair diverging at `pdiv`, acts
/// as a leaf there. `None` marks the tree root, which is always a fork
/// unless it is the nodeless leaf.
unsafe fn is_leaf_at<F: Flavor>(node: *mut Node, pdiv: Option<F::Div>) -> bool {
	let l = Node::branch(node, 0);
	let r = Node::branch(node, 1);
	if l == r {
		return true;
	}
	match pdiv {
		Some(pd) => F::later_eq(pd, F::div(F::key_of(l), F::key_of(r))),
		None => false,
	}
}

unsafe fn write_node<F: Flavor>(
	w: &mut dyn Write,
	node: *mut Node,
	level: usize,
	highlight: *const Node,
) -> fmt::Result {
	let l = Node::branch(node, 0);
	let r = Node::branch(node, 1);
	let cur = F::div(F::key_of(l), F::key_of(r));

	write!(
		w,
		"  \"{:x}_n\" [label=\"{:x}\\nlev={} bit={}\\nkey=",
		node as usize, node as usize, level, F::split_label(cur)
	)?;
	F::fmt_key(w, F::key_of(node))?;
	writeln!(
		w,
		"\" fillcolor=\"lightskyblue1\"{}];",
		if std::ptr::eq(node, highlight) { " color=red" } else { "" }
	)?;

	for (side, tag) in [(0usize, "L"), (1usize, "R")] {
		let child = Node::branch(node, side);
		let role = if is_leaf_at::<F>(child, Some(cur)) { 'l' } else { 'n' };
		writeln!(
			w,
			"  \"{:x}_n\" -> \"{:x}_{}\" [label=\"{}\" arrowsize=0.66{}];",
			node as usize,
			child as usize,
			role,
			tag,
			if child == node { " dir=both" } else { "" }
		)?;
	}
	Ok(())
}

unsafe fn write_leaf<F: Flavor>(
	w: &mut dyn Write,
	node: *mut Node,
	level: usize,
	highlight: *const Node,
) -> fmt::Result {
	let l = Node::branch(node, 0);
	let r = Node::branch(node, 1);
	let hl = if std::ptr::eq(node, highlight) { " color=red" } else { "" };

	if l == r {
		// The nodeless leaf has no split bit of its own.
		write!(w, "  \"{:x}_l\" [label=\"{:x}\\nlev={}\\nkey=", node as usize, node as usize, level)?;
		F::fmt_key(w, F::key_of(node))?;
		writeln!(w, "\\n\" fillcolor=\"green\"{}];", hl)
	} else {
		let cur = F::div(F::key_of(l), F::key_of(r));
		write!(
			w,
			"  \"{:x}_l\" [label=\"{:x}\\nlev={} bit={}\\nkey=",
			node as usize, node as usize, level, F::split_label(cur)
		)?;
		F::fmt_key(w, F::key_of(node))?;
		writeln!(w, "\\n\" fillcolor=\"yellow\"{}];", hl)
	}
}

/// Writes the whole tree under `root` as a Graphviz `digraph`.
///
/// # Safety
///
/// `root` must reference a well-formed tree of `F`-flavored nodes, and
/// `highlight` may be any pointer (it is only compared, never read).
pub(crate) unsafe fn dump_generic<F: Flavor>(
	w: &mut dyn Write,
	root: *const *mut Node,
	label: &str,
	highlight: *const Node,
) -> fmt::Result {
	writeln!(w, "digraph twigtree {{")?;
	writeln!(w, "  fontname=\"fixed\";")?;
	writeln!(w, "  fontsize=8")?;
	writeln!(w, "  label=\"{}\"", label)?;
	writeln!(
		w,
		"  node [fontname=\"fixed\" fontsize=8 shape=\"box\" style=\"filled\" color=\"black\" fillcolor=\"white\"];"
	)?;
	writeln!(
		w,
		"  edge [fontname=\"fixed\" fontsize=8 style=\"solid\" color=\"magenta\" dir=\"forward\"];"
	)?;

	let top = *root;
	writeln!(
		w,
		"  \"{:x}_n\" [label=\"root\\n{:x}\"]",
		root as usize, root as usize
	)?;

	if !top.is_null() {
		let role = if is_leaf_at::<F>(top, None) { 'l' } else { 'n' };
		writeln!(
			w,
			"  \"{:x}_n\" -> \"{:x}_{}\" [label=\"B\" arrowsize=0.66];",
			root as usize, top as usize, role
		)?;

		let mut stack: SmallVec<[(*mut Node, Option<F::Div>, usize); 16]> = SmallVec::new();
		stack.push((top, None, 0));

		while let Some((node, pdiv, level)) = stack.pop() {
			if is_leaf_at::<F>(node, pdiv) {
				write_leaf::<F>(w, node, level, highlight)?;
				continue;
			}

			write_node::<F>(w, node, level, highlight)?;

			let cur = F::div(F::key_of(Node::branch(node, 0)), F::key_of(Node::branch(node, 1)));
			stack.push((Node::branch(node, 1), Some(cur), level + 1));
			stack.push((Node::branch(node, 0), Some(cur), level + 1));
		}
	}

	writeln!(w, "}}")
}
