//! The call graph of a program.
//!
//! The graph is built in parallel: every worker thread scans the bodies of
//! methods it takes from a shared queue, resolves the call sites it finds and
//! summarizes their arguments. No method body is modified while this happens,
//! so the workers only share the resolver and the per-store counters.
use crate::mir::{BlockId, Instruction, InvokeKind, Mir};
use crate::resolver::Resolve;
use crate::state::State;
use crate::summary::CallSiteSummary;
use fnv::FnvHashMap;
use std::cmp::min;
use std::panic::resume_unwind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::scope;
use types::{Database, MethodId, MethodRefId};

/// A single invoke instruction in a method body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub caller: MethodId,

    /// The block containing the invoke instruction.
    pub block: BlockId,

    /// The index of the invoke instruction in its block.
    pub instruction: usize,

    pub kind: InvokeKind,
    pub reference: MethodRefId,

    /// The method called, or `None` if the reference couldn't be resolved.
    pub callee: Option<MethodId>,

    pub summary: CallSiteSummary,
}

/// The progress of the inliner for a method.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Nothing is inlined into the method yet.
    Pending,

    /// Callees are being inlined into the method or into other methods of its
    /// strongly connected component.
    InProgress,

    /// All call sites of the method are processed, and its body won't change
    /// anymore.
    Finalized,
}

#[derive(Debug)]
pub struct Node {
    pub method: MethodId,

    /// The indexes of the call sites in this method, in the order they occur
    /// in the method body.
    pub calls: Vec<usize>,

    /// The graph indexes of the methods called by this method, without
    /// duplicates.
    pub callees: Vec<usize>,

    /// A flag indicating the method calls itself, either directly or through
    /// other methods.
    pub recursive: bool,

    /// The index of the strongly connected component the method belongs to.
    pub component: usize,

    pub state: NodeState,
}

/// A directed graph of the methods with a body and the calls between them.
///
/// The nodes are stored in the same order as the methods in the `Mir` the
/// graph is built from, such that a node index is also the index of its
/// method in the `Mir`.
pub struct CallGraph {
    pub nodes: Vec<Node>,
    pub sites: Vec<CallSite>,

    /// The strongly connected components of the graph, with callees ordered
    /// before their callers.
    pub components: Vec<Vec<usize>>,

    /// The number of call sites found in the methods of each store.
    pub sites_per_store: Vec<usize>,

    indexes: FnvHashMap<MethodId, usize>,

    /// The call sites of every resolved callee.
    callers: FnvHashMap<MethodId, Vec<usize>>,
}

impl CallGraph {
    pub fn build(state: &State, mir: &Mir, resolver: &dyn Resolve) -> Self {
        // Just like the queue, the counters are indexed using plain integers
        // such that workers don't need a lock to update them.
        let counters: Vec<AtomicUsize> = (0..state.db.number_of_stores())
            .map(|_| AtomicUsize::new(0))
            .collect();
        let queue = AtomicUsize::new(0);
        let shared = SharedState {
            db: &state.db,
            mir,
            resolver,
            queue: &queue,
            counters: &counters,
        };
        let mut found = Vec::with_capacity(mir.methods.len());

        scope(|s| {
            let handles: Vec<_> = (0..state.config.threads)
                .map(|_| {
                    let shared = &shared;

                    s.spawn(move || Worker { shared }.run())
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(mut res) => found.append(&mut res),
                    Err(err) => resume_unwind(err),
                }
            }
        });

        // Workers finish in a random order, so we sort the results to make
        // the graph the same for every run.
        found.sort_by_key(|(index, _)| *index);

        let indexes: FnvHashMap<_, _> =
            mir.methods.keys().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut nodes: Vec<_> = mir
            .methods
            .keys()
            .map(|&method| Node {
                method,
                calls: Vec::new(),
                callees: Vec::new(),
                recursive: false,
                component: 0,
                state: NodeState::Pending,
            })
            .collect();
        let mut sites = Vec::new();
        let mut callers: FnvHashMap<MethodId, Vec<usize>> =
            FnvHashMap::default();

        for (index, method_sites) in found {
            for site in method_sites {
                let site_idx = sites.len();

                if let Some(callee) = site.callee {
                    callers.entry(callee).or_default().push(site_idx);

                    if let Some(&callee_idx) = indexes.get(&callee) {
                        // Tarjan's algorithm doesn't detect self recursive
                        // methods, so we flag those here.
                        if callee_idx == index {
                            nodes[index].recursive = true;
                        } else if !nodes[index].callees.contains(&callee_idx) {
                            nodes[index].callees.push(callee_idx);
                        }
                    }
                }

                nodes[index].calls.push(site_idx);
                sites.push(site);
            }
        }

        let mut graph = CallGraph {
            nodes,
            sites,
            components: Vec::new(),
            sites_per_store: counters
                .into_iter()
                .map(|v| v.into_inner())
                .collect(),
            indexes,
            callers,
        };

        graph.components = graph.strongly_connected_components();
        graph
    }

    pub fn index_of(&self, method: MethodId) -> Option<usize> {
        self.indexes.get(&method).cloned()
    }

    pub fn node(&self, method: MethodId) -> Option<&Node> {
        self.index_of(method).map(|i| &self.nodes[i])
    }

    pub fn is_recursive(&self, method: MethodId) -> bool {
        self.node(method).map_or(false, |n| n.recursive)
    }

    /// Returns `true` if both methods are part of the same cycle of calls.
    pub fn same_cycle(&self, caller: MethodId, callee: MethodId) -> bool {
        match (self.node(caller), self.node(callee)) {
            (Some(a), Some(b)) => {
                a.recursive && b.recursive && a.component == b.component
            }
            _ => false,
        }
    }

    pub fn state(&self, method: MethodId) -> Option<NodeState> {
        self.node(method).map(|n| n.state)
    }

    pub fn set_state(&mut self, index: usize, state: NodeState) {
        self.nodes[index].state = state;
    }

    /// Returns the call sites that call the given method.
    pub fn call_sites_of(&self, callee: MethodId) -> &[usize] {
        self.callers.get(&callee).map_or(&[], |v| v.as_slice())
    }

    /// Returns the strongly connected components of the graph, ordered such
    /// that the methods called by a component come before it, and flags the
    /// methods that are part of a cycle as recursive.
    ///
    /// This is an iterative implementation of Tarjan's algorithm, as found at
    /// pages 9-10 of the thesis "Verification of an iterative implementation
    /// of Tarjan's algorithm for Strongly Connected Components using Dafny".
    fn strongly_connected_components(&mut self) -> Vec<Vec<usize>> {
        let size = self.nodes.len();
        let mut result = Vec::new();
        let mut stack = Vec::new();
        let mut on_stack = vec![false; size];
        let mut low = vec![0_usize; size];
        let mut ids = vec![0_usize; size];
        let mut id = 0;

        for root in 0..size {
            if low[root] > 0 {
                continue;
            }

            let mut work = vec![(root, 0)];

            while let Some((node, edge_idx)) = work.pop() {
                if edge_idx == 0 {
                    // Increment first since we use 0 to signal a lack of a
                    // value in the low and ID maps.
                    id += 1;

                    ids[node] = id;
                    low[node] = id;
                    stack.push(node);
                    on_stack[node] = true;
                }

                let mut recurse = false;
                let edges = &self.nodes[node].callees;

                for next_edge_idx in edge_idx..edges.len() {
                    let next_edge = edges[next_edge_idx];

                    if low[next_edge] == 0 {
                        work.push((node, next_edge_idx + 1));
                        work.push((next_edge, 0));
                        recurse = true;
                        break;
                    } else if on_stack[next_edge] {
                        low[node] = min(low[node], ids[next_edge]);
                    }
                }

                if recurse {
                    continue;
                }

                if low[node] == ids[node] {
                    let mut component = Vec::new();

                    while let Some(connected) = stack.pop() {
                        on_stack[connected] = false;
                        component.push(connected);

                        if connected == node {
                            break;
                        }
                    }

                    // Members are popped in reverse discovery order, so the
                    // innermost callee comes first.
                    component.reverse();

                    let index = result.len();
                    let cyclic = component.len() > 1;

                    for &member in &component {
                        let node = &mut self.nodes[member];

                        node.component = index;
                        node.recursive |= cyclic;
                    }

                    result.push(component);
                }

                if let Some((last, _)) = work.last().cloned() {
                    low[last] = min(low[last], low[node]);
                }
            }
        }

        result
    }
}

/// The state shared between worker threads.
struct SharedState<'a> {
    db: &'a Database,
    mir: &'a Mir,
    resolver: &'a dyn Resolve,
    queue: &'a AtomicUsize,
    counters: &'a [AtomicUsize],
}

/// A worker thread for finding the call sites of methods.
struct Worker<'a> {
    shared: &'a SharedState<'a>,
}

impl<'a> Worker<'a> {
    fn run(self) -> Vec<(usize, Vec<CallSite>)> {
        let mut found = Vec::new();
        let max = self.shared.mir.methods.len();

        loop {
            let index = self.shared.queue.fetch_add(1, Ordering::AcqRel);

            if index >= max {
                break;
            }

            found.push((index, self.call_sites(index)));
        }

        found
    }

    fn call_sites(&self, index: usize) -> Vec<CallSite> {
        let db = self.shared.db;
        let Some((&caller, method)) = self.shared.mir.methods.get_index(index)
        else {
            return Vec::new();
        };
        let mut sites = Vec::new();

        for (block_idx, block) in method.body.blocks.iter().enumerate() {
            let block_id = BlockId(block_idx);

            for (ins_idx, ins) in block.instructions.iter().enumerate() {
                let Instruction::Invoke(call) = ins else { continue };
                let callee = self.shared.resolver.resolve(
                    db,
                    call.method,
                    call.kind.search(),
                );
                let summary =
                    CallSiteSummary::for_call_site(method, block_id, ins_idx)
                        .unwrap_or_else(|| {
                            CallSiteSummary::unknown(
                                call.arguments.len(),
                                call.result.is_some(),
                            )
                        });

                sites.push(CallSite {
                    caller,
                    block: block_id,
                    instruction: ins_idx,
                    kind: call.kind,
                    reference: call.method,
                    callee,
                    summary,
                });
            }
        }

        if let Some(store) = db.store_of(caller.class(db)) {
            self.shared.counters[store.0]
                .fetch_add(sites.len(), Ordering::AcqRel);
        }

        sites
    }
}
