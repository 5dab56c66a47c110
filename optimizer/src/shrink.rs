//! Shrinking of method bodies.
//!
//! The inliner only depends on the `Shrinker` trait. `LocalShrinker` is a
//! shrinker that only looks at a single method at a time, which is enough to
//! remove the code made redundant by inlining.
use crate::config::ShrinkerConfig;
use crate::mir::{BlockId, Const, Goto, Instruction, Method, RegisterId};
use crate::summary::ArgumentValue;
use std::ops::AddAssign;

/// Statistics about the changes made by a shrinker.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShrinkStats {
    pub const_prop: usize,
    pub cse: usize,
    pub copy_prop: usize,
    pub dce: usize,
    pub dedup_blocks: usize,
}

impl ShrinkStats {
    pub fn changed(&self) -> bool {
        *self != ShrinkStats::default()
    }
}

impl AddAssign for ShrinkStats {
    fn add_assign(&mut self, rhs: ShrinkStats) {
        self.const_prop += rhs.const_prop;
        self.cse += rhs.cse;
        self.copy_prop += rhs.copy_prop;
        self.dce += rhs.dce;
        self.dedup_blocks += rhs.dedup_blocks;
    }
}

/// A type that removes redundant code from a method.
///
/// Shrinking must preserve the behaviour of the method.
pub trait Shrinker: Sync {
    fn shrink(&self, method: &mut Method) -> ShrinkStats;

    /// Shrinks a method as if it's only called with the given arguments.
    ///
    /// The result is only valid for call sites passing these arguments. The
    /// default implementation ignores the arguments.
    fn shrink_for_call_site(
        &self,
        method: &mut Method,
        _arguments: &[ArgumentValue],
    ) -> ShrinkStats {
        self.shrink(method)
    }
}

/// A fact known about the value of a register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Fact {
    Constant(i64),
    NonNull,
}

/// A shrinker that optimizes methods in isolation.
pub struct LocalShrinker {
    config: ShrinkerConfig,
}

impl LocalShrinker {
    pub fn new(config: ShrinkerConfig) -> Self {
        Self { config }
    }

    fn run(
        &self,
        method: &mut Method,
        arguments: &[ArgumentValue],
    ) -> ShrinkStats {
        let mut stats = ShrinkStats::default();

        // Each pass may expose more work for the other passes, so we repeat
        // them until nothing changes.
        loop {
            let mut round = ShrinkStats::default();

            if self.config.run_const_prop {
                round.const_prop = fold_constants(method, arguments);
            }

            if self.config.run_copy_prop {
                round.copy_prop = propagate_copies(method);
            }

            if self.config.run_local_dce {
                round.dce = remove_unused_instructions(method);
            }

            if self.config.run_dedup_blocks {
                round.dedup_blocks = deduplicate_blocks(method);
            }

            if !round.changed() {
                break;
            }

            stats += round;
        }

        stats
    }
}

impl Shrinker for LocalShrinker {
    fn shrink(&self, method: &mut Method) -> ShrinkStats {
        self.run(method, &[])
    }

    fn shrink_for_call_site(
        &self,
        method: &mut Method,
        arguments: &[ArgumentValue],
    ) -> ShrinkStats {
        self.run(method, arguments)
    }
}

/// Returns the facts known about every register.
///
/// Facts are only derived for registers written to exactly once. Since a
/// register is always written to before it's read, such a write reaches every
/// read of the register.
fn facts(method: &Method, arguments: &[ArgumentValue]) -> Vec<Option<Fact>> {
    let defs = method.register_definition_counts();
    let mut facts = vec![None; method.registers.len()];

    for (reg, arg) in method.arguments.iter().zip(arguments) {
        if defs[reg.0] != 1 {
            continue;
        }

        facts[reg.0] = match arg {
            ArgumentValue::Constant(val) => Some(Fact::Constant(*val)),
            ArgumentValue::Instance(_) => Some(Fact::NonNull),
            ArgumentValue::Unknown => None,
        };
    }

    let mut changed = true;

    while changed {
        changed = false;

        for ins in method.instructions() {
            let (reg, fact) = match ins {
                Instruction::Const(v) => (v.register, Fact::Constant(v.value)),
                Instruction::String(v) => (v.register, Fact::NonNull),
                Instruction::NewInstance(v) => (v.register, Fact::NonNull),
                Instruction::AddLiteral(v) => match facts[v.source.0] {
                    Some(Fact::Constant(val)) => {
                        (v.register, Fact::Constant(val.wrapping_add(v.value)))
                    }
                    _ => continue,
                },
                Instruction::Move(v) => match facts[v.source.0] {
                    Some(fact) => (v.target, fact),
                    None => continue,
                },
                _ => continue,
            };

            if defs[reg.0] == 1 && facts[reg.0].is_none() {
                facts[reg.0] = Some(fact);
                changed = true;
            }
        }
    }

    facts
}

/// Folds instructions that operate on known values, returning the number of
/// instructions changed.
fn fold_constants(method: &mut Method, arguments: &[ArgumentValue]) -> usize {
    let facts = facts(method, arguments);
    let mut folded = 0;
    let mut removed_edges = Vec::new();

    for (idx, block) in method.body.blocks.iter_mut().enumerate() {
        block.instructions.retain(|ins| match ins {
            Instruction::CheckNull(v)
                if facts[v.register.0] == Some(Fact::NonNull) =>
            {
                folded += 1;
                false
            }
            _ => true,
        });

        for ins in &mut block.instructions {
            let new_ins = match ins {
                Instruction::AddLiteral(v) => match facts[v.source.0] {
                    Some(Fact::Constant(val)) => {
                        Instruction::Const(Box::new(Const {
                            register: v.register,
                            value: val.wrapping_add(v.value),
                            position: v.position,
                        }))
                    }
                    _ => continue,
                },
                Instruction::Branch(v) => {
                    let taken = match facts[v.condition.0] {
                        Some(Fact::Constant(0)) => v.if_false,
                        Some(_) => v.if_true,
                        None => continue,
                    };
                    let skipped =
                        if taken == v.if_true { v.if_false } else { v.if_true };

                    if skipped != taken {
                        removed_edges.push((BlockId(idx), skipped));
                    }

                    Instruction::Goto(Box::new(Goto {
                        block: taken,
                        position: v.position,
                    }))
                }
                _ => continue,
            };

            *ins = new_ins;
            folded += 1;
        }
    }

    if !removed_edges.is_empty() {
        for (source, target) in removed_edges {
            method.body.remove_edge(source, target);
        }

        method.remove_unreachable_blocks();
    }

    folded
}

/// Replaces reads of registers that are copies of other registers with reads
/// of the original registers.
fn propagate_copies(method: &mut Method) -> usize {
    let defs = method.register_definition_counts();
    let mut copies: Vec<Option<RegisterId>> =
        vec![None; method.registers.len()];

    for ins in method.instructions() {
        if let Instruction::Move(v) = ins {
            if v.target != v.source
                && defs[v.target.0] == 1
                && defs[v.source.0] <= 1
            {
                copies[v.target.0] = Some(v.source);
            }
        }
    }

    let resolve = |mut reg: RegisterId| {
        // The limit guards against cycles of moves, which can only exist in
        // code that reads registers before writing to them.
        for _ in 0..copies.len() {
            match copies[reg.0] {
                Some(src) => reg = src,
                None => break,
            }
        }

        reg
    };

    let mut changed = 0;

    for block in &mut method.body.blocks {
        for ins in &mut block.instructions {
            let mut hits = 0;

            ins.each_use(|r| {
                if copies[r.0].is_some() {
                    hits += 1;
                }
            });

            if hits > 0 {
                ins.map_uses(&resolve);
                changed += hits;
            }
        }
    }

    changed
}

/// Removes instructions that write to registers that are never read.
fn remove_unused_instructions(method: &mut Method) -> usize {
    let mut uses = method.register_use_counts();
    let mut removed = 0;
    let mut repeat = true;

    // Removing an instruction may result in other instructions becoming
    // unused, so we repeat this until we run out of instructions to remove.
    while repeat {
        repeat = false;

        for block in &mut method.body.blocks {
            block.instructions.retain(|ins| {
                if !ins.is_pure() {
                    return true;
                }

                match ins.defines() {
                    Some(reg) if uses[reg.0] == 0 => {}
                    _ => return true,
                }

                ins.each_use(|r| uses[r.0] -= 1);
                removed += 1;
                repeat = true;
                false
            });
        }
    }

    removed
}

/// Merges blocks that leave the method in exactly the same way.
fn deduplicate_blocks(method: &mut Method) -> usize {
    let handlers: Vec<BlockId> = method
        .body
        .regions
        .iter()
        .flat_map(|r| r.handlers.iter().map(|h| h.block))
        .collect();
    let candidates: Vec<BlockId> = (0..method.body.blocks.len())
        .map(BlockId)
        .filter(|&id| {
            let block = method.body.block(id);

            id != method.body.start_id
                && !handlers.contains(&id)
                && block.successors.is_empty()
                && !block.predecessors.is_empty()
        })
        .collect();
    let mut merged = 0;

    for (idx, &keep) in candidates.iter().enumerate() {
        for &dup in &candidates[idx + 1..] {
            let (a, b) = (method.body.block(keep), method.body.block(dup));

            if a.predecessors.is_empty()
                || b.predecessors.is_empty()
                || a.try_region != b.try_region
                || a.instructions != b.instructions
            {
                continue;
            }

            for pred in method.body.block(dup).predecessors.clone() {
                if let Some(ins) =
                    method.body.block_mut(pred).instructions.last_mut()
                {
                    ins.map_blocks(|b| if b == dup { keep } else { b });
                }

                method.body.remove_edge(pred, dup);
                method.body.add_edge(pred, keep);
            }

            merged += 1;
        }
    }

    if merged > 0 {
        method.remove_unreachable_blocks();
    }

    merged
}
