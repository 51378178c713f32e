//! Criterion benchmarks comparing the compact binary tree against other
//! ordered and unordered map implementations.
//!
//! This benchmark suite compares:
//! - `twigtree::U64Tree` - intrusive compact binary tree
//! - `std::collections::BTreeMap` - standard library B-tree
//! - `std::collections::HashMap` - standard library hash map (no ordering)
//!
//! The intrusive tree never allocates, so its node storage is built in
//! the setup phase of each batched iteration; the std maps allocate as
//! part of the measured insert, which is part of the comparison.

use std::collections::{BTreeMap, HashMap};
use std::hint::black_box;
use std::ptr::NonNull;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};
use twigtree::{U64Node, U64Tree};

const SEED: u64 = 42;

// ============================================================================
// Helper Functions
// ============================================================================

/// Generate sequential keys from 0 to count-1
fn sequential_keys(count: usize) -> Vec<u64> {
	(0..count as u64).collect()
}

/// Generate random keys using a seeded RNG
fn random_keys(count: usize) -> Vec<u64> {
	let mut rng = StdRng::seed_from_u64(SEED);
	(0..count).map(|_| rng.random()).collect()
}

/// Preallocated node storage for one batched tree build.
fn make_nodes(keys: &[u64]) -> Vec<Box<U64Node>> {
	keys.iter().map(|k| Box::new(U64Node::new(*k))).collect()
}

fn build_tree(nodes: &mut [Box<U64Node>]) -> U64Tree {
	let mut tree = U64Tree::new();
	for node in nodes.iter_mut() {
		unsafe {
			tree.insert(NonNull::from(node.as_mut()));
		}
	}
	tree
}

// ============================================================================
// Insert Benchmarks
// ============================================================================

fn bench_insert(c: &mut Criterion) {
	for (name, keygen) in [
		("insert_sequential", sequential_keys as fn(usize) -> Vec<u64>),
		("insert_random", random_keys as fn(usize) -> Vec<u64>),
	] {
		let mut group = c.benchmark_group(name);

		for count in [1_000, 10_000, 100_000] {
			let keys = keygen(count);
			group.throughput(Throughput::Elements(count as u64));

			// twigtree: nodes are prebuilt, the measured part is linking.
			group.bench_with_input(BenchmarkId::new("twigtree", count), &keys, |b, keys| {
				b.iter_batched(
					|| make_nodes(keys),
					|mut nodes| {
						let tree = build_tree(&mut nodes);
						black_box(tree.is_empty());
						(tree, nodes)
					},
					criterion::BatchSize::SmallInput,
				)
			});

			// BTreeMap
			group.bench_with_input(BenchmarkId::new("btreemap", count), &keys, |b, keys| {
				b.iter_batched(
					BTreeMap::new,
					|mut map| {
						for &k in keys {
							black_box(map.insert(k, k));
						}
						map
					},
					criterion::BatchSize::SmallInput,
				)
			});

			// HashMap
			group.bench_with_input(BenchmarkId::new("hashmap", count), &keys, |b, keys| {
				b.iter_batched(
					HashMap::new,
					|mut map| {
						for &k in keys {
							black_box(map.insert(k, k));
						}
						map
					},
					criterion::BatchSize::SmallInput,
				)
			});
		}
		group.finish();
	}
}

// ============================================================================
// Lookup Benchmarks
// ============================================================================

fn bench_lookup(c: &mut Criterion) {
	let mut group = c.benchmark_group("lookup_random");

	for count in [1_000, 10_000, 100_000] {
		let keys = random_keys(count);
		group.throughput(Throughput::Elements(count as u64));

		let mut nodes = make_nodes(&keys);
		let tree = build_tree(&mut nodes);

		group.bench_with_input(BenchmarkId::new("twigtree", count), &keys, |b, keys| {
			b.iter(|| {
				for &k in keys {
					black_box(tree.lookup(k));
				}
			})
		});

		let btree: BTreeMap<u64, u64> = keys.iter().map(|&k| (k, k)).collect();
		group.bench_with_input(BenchmarkId::new("btreemap", count), &keys, |b, keys| {
			b.iter(|| {
				for &k in keys {
					black_box(btree.get(&k));
				}
			})
		});

		let hash: HashMap<u64, u64> = keys.iter().map(|&k| (k, k)).collect();
		group.bench_with_input(BenchmarkId::new("hashmap", count), &keys, |b, keys| {
			b.iter(|| {
				for &k in keys {
					black_box(hash.get(&k));
				}
			})
		});

		drop(tree);
	}
	group.finish();
}

// ============================================================================
// Ordered Walk Benchmarks
// ============================================================================

fn bench_walk(c: &mut Criterion) {
	let mut group = c.benchmark_group("ordered_walk");

	for count in [1_000, 10_000, 100_000] {
		let keys = random_keys(count);
		group.throughput(Throughput::Elements(count as u64));

		let mut nodes = make_nodes(&keys);
		let tree = build_tree(&mut nodes);

		group.bench_with_input(BenchmarkId::new("twigtree", count), &count, |b, _| {
			b.iter(|| {
				let mut cur = tree.first();
				let mut n = 0usize;
				while let Some(h) = cur {
					n += 1;
					cur = unsafe { tree.next(h) };
				}
				black_box(n)
			})
		});

		let btree: BTreeMap<u64, u64> = keys.iter().map(|&k| (k, k)).collect();
		group.bench_with_input(BenchmarkId::new("btreemap", count), &count, |b, _| {
			b.iter(|| black_box(btree.iter().count()))
		});

		drop(tree);
	}
	group.finish();
}

// ============================================================================
// Range Lookup Benchmarks
// ============================================================================

fn bench_range_lookup(c: &mut Criterion) {
	let mut group = c.benchmark_group("lookup_ge");

	for count in [1_000, 10_000, 100_000] {
		let keys = random_keys(count);
		let queries = {
			let mut rng = StdRng::seed_from_u64(SEED + 1);
			(0..count).map(|_| rng.random()).collect::<Vec<u64>>()
		};
		group.throughput(Throughput::Elements(count as u64));

		let mut nodes = make_nodes(&keys);
		let tree = build_tree(&mut nodes);

		group.bench_with_input(BenchmarkId::new("twigtree", count), &queries, |b, queries| {
			b.iter(|| {
				for &q in queries {
					black_box(tree.lookup_ge(q));
				}
			})
		});

		let btree: BTreeMap<u64, u64> = keys.iter().map(|&k| (k, k)).collect();
		group.bench_with_input(BenchmarkId::new("btreemap", count), &queries, |b, queries| {
			b.iter(|| {
				for &q in queries {
					black_box(btree.range(q..).next());
				}
			})
		});

		drop(tree);
	}
	group.finish();
}

// ============================================================================
// Remove Benchmarks
// ============================================================================

fn bench_remove(c: &mut Criterion) {
	let mut group = c.benchmark_group("remove_random");

	for count in [1_000, 10_000] {
		let keys = random_keys(count);
		group.throughput(Throughput::Elements(count as u64));

		group.bench_with_input(BenchmarkId::new("twigtree", count), &keys, |b, keys| {
			b.iter_batched(
				|| {
					let mut nodes = make_nodes(keys);
					let tree = build_tree(&mut nodes);
					(tree, nodes)
				},
				|(mut tree, nodes)| {
					for k in nodes.iter().map(|n| n.key()) {
						black_box(tree.pick(k));
					}
					(tree, nodes)
				},
				criterion::BatchSize::SmallInput,
			)
		});

		group.bench_with_input(BenchmarkId::new("btreemap", count), &keys, |b, keys| {
			b.iter_batched(
				|| keys.iter().map(|&k| (k, k)).collect::<BTreeMap<u64, u64>>(),
				|mut map| {
					for &k in keys {
						black_box(map.remove(&k));
					}
					map
				},
				criterion::BatchSize::SmallInput,
			)
		});
	}
	group.finish();
}

criterion_group!(
	benches,
	bench_insert,
	bench_lookup,
	bench_walk,
	bench_range_lookup,
	bench_remove
);
criterion_main!(benches);
