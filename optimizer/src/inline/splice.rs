//! Copying the body of a callee into a caller.
use crate::error::InlineError;
use crate::mir::{
    BlockId, Handler, Instruction, Method, Move, PositionId, RegisterId,
    TryRegion,
};
use types::{Database, ValueKind};

/// The maximum number of registers a method may use.
pub const MAX_REGISTERS: usize = 65_536;

/// Replaces the invoke instruction at the given location with the body of
/// `callee`.
///
/// The registers of the callee are renumbered to start at `register_offset`,
/// which must be at least the number of registers the caller used before
/// anything was inlined into it.
///
/// The instructions following the call are moved into a new block, and every
/// return of the callee is turned into a jump to this block.
pub(crate) fn splice(
    db: &Database,
    caller: &mut Method,
    block: BlockId,
    instruction: usize,
    callee: &Method,
    register_offset: usize,
) -> Result<(), InlineError> {
    let call = match caller.body.block(block).instructions.get(instruction) {
        Some(Instruction::Invoke(ins)) => ins.clone(),
        _ => {
            return Err(InlineError::MissingCallSite {
                method: caller.id.qualified_name(db),
                block: block.0,
                instruction,
            })
        }
    };

    let registers = register_offset + callee.registers.len();

    if registers > MAX_REGISTERS {
        return Err(InlineError::RegisterOverflow {
            method: caller.id.qualified_name(db),
            callee: callee.id.qualified_name(db),
            block: block.0,
            instruction,
            registers,
            limit: MAX_REGISTERS,
        });
    }

    let position = call.position;
    let outer_region = caller.body.block(block).try_region;
    let blk_start = caller.body.blocks.len();
    let region_start = caller.body.regions.len();

    caller.registers.merge_at(register_offset, &callee.registers);

    let pos_offset = caller.positions.merge(&callee.positions, position);

    // Code following the inlined body maps to the call site, but as a
    // position of its own.
    let resume = position.map(|id| {
        let pos = caller.positions.get(id).clone();

        caller.positions.add(pos)
    });

    for region in &callee.body.regions {
        let mut handlers: Vec<_> = region
            .handlers
            .iter()
            .map(|h| Handler { class: h.class, block: h.block + blk_start })
            .collect();

        // Exceptions not caught by the callee propagate to the handlers of
        // the call site.
        if !region.has_catch_all() {
            if let Some(outer) = outer_region {
                handlers.extend(caller.body.region(outer).handlers.clone());
            }
        }

        caller.body.add_region(handlers);
    }

    let after_call = BlockId(blk_start + callee.body.blocks.len());
    let mut returns = Vec::new();

    for (index, source) in callee.body.blocks.iter().enumerate() {
        let mut new_block = source.clone();

        new_block.map_edges(|b| b + blk_start);
        new_block.try_region = match new_block.try_region {
            Some(id) => Some(TryRegion(id.0 + region_start)),
            None => outer_region,
        };

        for ins in &mut new_block.instructions {
            let pos = ins.position().map(|p| PositionId(p.0 + pos_offset));

            ins.set_position(pos.or(position));
            ins.map_registers(|r| r + register_offset);
            ins.map_blocks(|b| b + blk_start);
        }

        if let Some(Instruction::Return(ret)) = new_block.instructions.last() {
            let value = ret.register;

            new_block.instructions.pop();

            if let (Some(target), Some(source)) = (call.result, value) {
                new_block.instructions.push(Instruction::Move(Box::new(Move {
                    target,
                    source,
                    kind: caller.registers.kind(target),
                    position: resume,
                })));
            }

            new_block.goto(after_call, resume);
            returns.push(BlockId(blk_start + index));
        }

        caller.body.blocks.push(new_block);
    }

    let after = caller.body.add_block();
    let tail = caller
        .body
        .block_mut(block)
        .instructions
        .split_off(instruction + 1);

    caller.body.block_mut(after).instructions = tail;
    caller.body.block_mut(after).try_region = outer_region;

    for id in returns {
        caller.body.add_edge(id, after);
    }

    let succ = caller.body.block_mut(block).take_successors();

    for id in succ {
        caller.body.block_mut(id).predecessors.shift_remove(&block);
        caller.body.add_edge(after, id);
    }

    let kinds = callee.id.argument_kinds(db);
    let inline_start = callee.body.start_id + blk_start;
    let call_block = caller.body.block_mut(block);

    // The invoke is the last instruction now that the code following it is
    // moved into the new block.
    call_block.instructions.pop();

    if !callee.id.is_static(db) {
        if let Some(&receiver) = call.arguments.first() {
            call_block.check_null(receiver, position);
        }
    }

    for ((&from, &to), &kind) in
        call.arguments.iter().zip(&callee.arguments).zip(&kinds)
    {
        call_block.move_register(to + register_offset, from, kind, position);
    }

    call_block.goto(inline_start, position);
    caller.body.add_edge(block, inline_start);

    caller.verify().map_err(|reason| InlineError::MalformedGraph {
        method: caller.id.qualified_name(db),
        callee: callee.id.qualified_name(db),
        reason,
    })
}

/// Ends the block containing a call to a method that never returns.
///
/// The call is kept, but everything after it is replaced by a throw, as the
/// code following the call is never executed. The `register` argument is the
/// object register to throw.
///
/// The return value is the number of instructions removed.
pub(crate) fn throw_after(
    db: &Database,
    caller: &mut Method,
    block: BlockId,
    instruction: usize,
    register: RegisterId,
) -> Result<usize, InlineError> {
    let position = match caller.body.block(block).instructions.get(instruction)
    {
        Some(Instruction::Invoke(ins)) => ins.position,
        _ => {
            return Err(InlineError::MissingCallSite {
                method: caller.id.qualified_name(db),
                block: block.0,
                instruction,
            })
        }
    };

    debug_assert_eq!(caller.registers.kind(register), ValueKind::Object);

    let call_block = caller.body.block_mut(block);
    let removed = call_block.instructions.len() - (instruction + 1);

    call_block.instructions.truncate(instruction + 1);
    call_block.int_literal(register, 0, position);
    call_block.throw(register, position);
    caller.body.clear_successors(block);
    Ok(removed)
}
