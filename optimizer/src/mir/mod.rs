//! Method bodies as control-flow graphs.
//!
//! A method body is a graph of basic blocks, stored in a `Vec` and addressed
//! using `BlockId` values. Registers, try regions and debug positions are
//! stored in the same way, such that inlining a method is a matter of copying
//! these arenas and shifting the IDs.
pub mod printer;

use indexmap::{IndexMap, IndexSet};
use std::mem::swap;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use types::resolve::MethodSearch;
use types::{ClassId, FieldId, MethodId, MethodRefId, ValueKind};

/// The ID/index of a register within a method.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct RegisterId(pub usize);

impl Add<usize> for RegisterId {
    type Output = RegisterId;

    fn add(self, rhs: usize) -> Self::Output {
        RegisterId(self.0 + rhs)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Register {
    pub kind: ValueKind,
}

/// The registers of a method.
///
/// The number of registers is always at least one higher than the highest
/// register index used by the method's instructions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registers {
    values: Vec<Register>,
}

impl Registers {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn alloc(&mut self, kind: ValueKind) -> RegisterId {
        let id = self.values.len();

        self.values.push(Register { kind });
        RegisterId(id)
    }

    pub fn get(&self, register: RegisterId) -> &Register {
        &self.values[register.0]
    }

    pub fn kind(&self, register: RegisterId) -> ValueKind {
        self.get(register).kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Copies the registers of `other` into the range starting at `offset`,
    /// growing the list of registers if necessary.
    pub fn merge_at(&mut self, offset: usize, other: &Registers) {
        let end = offset + other.len();

        if end > self.values.len() {
            // Inlining may add many registers, so we only allocate what we
            // actually need.
            self.values.reserve_exact(end - self.values.len());
            self.values
                .resize(end, Register { kind: ValueKind::Primitive });
        }

        self.values[offset..end].copy_from_slice(&other.values);
    }
}

/// The ID/index of a debug position within a method.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct PositionId(pub usize);

/// A source position, optionally nested in the position of the call site it
/// was inlined into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Position {
    /// The method the source code position belongs to.
    pub method: MethodId,
    pub file: String,
    pub line: u32,

    /// The position of the call site this position was inlined into.
    ///
    /// A parent always has a lower index than its children, so chains of
    /// parents are finite.
    pub parent: Option<PositionId>,
}

impl Position {
    pub fn new(method: MethodId, file: &str, line: u32) -> Self {
        Self { method, file: file.to_string(), line, parent: None }
    }
}

/// An append-only table of debug positions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Positions {
    values: Vec<Position>,
}

impl Positions {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn add(&mut self, position: Position) -> PositionId {
        let id = self.values.len();

        self.values.push(position);
        PositionId(id)
    }

    pub fn get(&self, id: PositionId) -> &Position {
        &self.values[id.0]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns the parents of a position, starting with the closest one.
    pub fn parents(&self, id: PositionId) -> Vec<PositionId> {
        let mut chain = Vec::new();
        let mut current = self.get(id).parent;

        while let Some(parent) = current {
            chain.push(parent);
            current = self.get(parent).parent;
        }

        chain
    }

    /// Returns the number of call sites a position is nested in.
    pub fn depth(&self, id: PositionId) -> usize {
        self.parents(id).len()
    }

    /// Appends the positions of `other`, returning the offset to apply to
    /// their IDs.
    ///
    /// Positions without a parent are nested in `root`.
    pub fn merge(
        &mut self,
        other: &Positions,
        root: Option<PositionId>,
    ) -> usize {
        let offset = self.values.len();

        self.values.reserve_exact(other.values.len());

        for pos in &other.values {
            let parent = match pos.parent {
                Some(id) => Some(PositionId(id.0 + offset)),
                None => root,
            };

            self.values.push(Position { parent, ..pos.clone() });
        }

        offset
    }
}

/// An exception handler of a try region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handler {
    /// The type of exception caught, or `None` for a catch-all handler.
    pub class: Option<ClassId>,
    pub block: BlockId,
}

/// The ID/index of a try region within a method.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct TryRegion(pub usize);

/// The exception handlers shared by the blocks in a try region.
///
/// The list of handlers is never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryRegionData {
    pub handlers: Vec<Handler>,
}

impl TryRegionData {
    pub fn has_catch_all(&self) -> bool {
        self.handlers.iter().any(|h| h.class.is_none())
    }
}

/// A directed control-flow graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Graph {
    pub blocks: Vec<Block>,
    pub start_id: BlockId,
    pub regions: Vec<TryRegionData>,
}

impl Graph {
    pub fn new() -> Self {
        Self { blocks: Vec::new(), start_id: BlockId(0), regions: Vec::new() }
    }

    pub fn add_start_block(&mut self) -> BlockId {
        let id = self.add_block();

        self.start_id = id;
        id
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());

        self.blocks.reserve_exact(1);
        self.blocks.push(Block::new());
        id
    }

    pub fn block_mut(&mut self, index: BlockId) -> &mut Block {
        &mut self.blocks[index.0]
    }

    pub fn block(&self, index: BlockId) -> &Block {
        &self.blocks[index.0]
    }

    pub fn add_edge(&mut self, source: BlockId, target: BlockId) {
        let target_block = &mut self.blocks[target.0];

        target_block.predecessors.reserve_exact(1);
        target_block.predecessors.insert(source);

        let source_block = &mut self.blocks[source.0];

        source_block.successors.reserve_exact(1);
        source_block.successors.insert(target);
    }

    pub fn remove_edge(&mut self, source: BlockId, target: BlockId) {
        self.blocks[source.0].successors.shift_remove(&target);
        self.blocks[target.0].predecessors.shift_remove(&source);
    }

    /// Removes all outgoing edges of a block.
    pub fn clear_successors(&mut self, block: BlockId) {
        for succ in self.blocks[block.0].take_successors() {
            self.blocks[succ.0].predecessors.shift_remove(&block);
        }
    }

    pub fn add_region(&mut self, handlers: Vec<Handler>) -> TryRegion {
        let id = TryRegion(self.regions.len());

        self.regions.push(TryRegionData { handlers });
        id
    }

    pub fn region(&self, id: TryRegion) -> &TryRegionData {
        &self.regions[id.0]
    }

    /// Returns the try region covering a block, if any.
    pub fn region_of(&self, block: BlockId) -> Option<&TryRegionData> {
        self.blocks[block.0].try_region.map(|id| self.region(id))
    }

    /// Returns a flag for every block indicating if it's reachable from the
    /// start block, either through regular edges or by throwing to a handler.
    pub fn reachable(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.blocks.len()];
        let mut queue = vec![self.start_id];

        // We don't care about the order in which we visit blocks, so a Vec is
        // good enough here.
        while let Some(id) = queue.pop() {
            if reachable[id.0] {
                continue;
            }

            reachable[id.0] = true;

            let block = self.block(id);

            for &edge in &block.successors {
                if !reachable[edge.0] {
                    queue.push(edge);
                }
            }

            if let Some(region) = block.try_region {
                for handler in &self.regions[region.0].handlers {
                    if !reachable[handler.block.0] {
                        queue.push(handler.block);
                    }
                }
            }
        }

        reachable
    }
}

/// The ID/index to a basic block within a method.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl Add<usize> for BlockId {
    type Output = BlockId;

    fn add(self, rhs: usize) -> Self::Output {
        BlockId(self.0 + rhs)
    }
}

impl AddAssign<usize> for BlockId {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}

impl Sub<usize> for BlockId {
    type Output = BlockId;

    fn sub(self, rhs: usize) -> Self::Output {
        BlockId(self.0 - rhs)
    }
}

impl SubAssign<usize> for BlockId {
    fn sub_assign(&mut self, rhs: usize) {
        self.0 -= rhs;
    }
}

/// A basic block in a control flow graph.
///
/// The last instruction of a block is its only terminator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub instructions: Vec<Instruction>,
    pub successors: IndexSet<BlockId>,
    pub predecessors: IndexSet<BlockId>,

    /// The try region that covers this block.
    pub try_region: Option<TryRegion>,
}

impl Block {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            successors: IndexSet::new(),
            predecessors: IndexSet::new(),
            try_region: None,
        }
    }

    pub fn map_edges<F: Fn(BlockId) -> BlockId>(&mut self, func: F) {
        for id in self.take_successors() {
            self.successors.insert(func(id));
        }

        for id in self.take_predecessors() {
            self.predecessors.insert(func(id));
        }
    }

    pub fn take_successors(&mut self) -> IndexSet<BlockId> {
        let mut vals = IndexSet::new();

        swap(&mut vals, &mut self.successors);
        vals
    }

    pub fn take_predecessors(&mut self) -> IndexSet<BlockId> {
        let mut vals = IndexSet::new();

        swap(&mut vals, &mut self.predecessors);
        vals
    }

    pub fn goto(&mut self, block: BlockId, position: Option<PositionId>) {
        self.instructions
            .push(Instruction::Goto(Box::new(Goto { block, position })));
    }

    pub fn branch(
        &mut self,
        condition: RegisterId,
        if_true: BlockId,
        if_false: BlockId,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::Branch(Box::new(Branch {
            condition,
            if_true,
            if_false,
            position,
        })));
    }

    pub fn return_value(
        &mut self,
        register: Option<RegisterId>,
        position: Option<PositionId>,
    ) {
        self.instructions
            .push(Instruction::Return(Box::new(Return { register, position })));
    }

    pub fn throw(
        &mut self,
        register: RegisterId,
        position: Option<PositionId>,
    ) {
        self.instructions
            .push(Instruction::Throw(Box::new(Throw { register, position })));
    }

    pub fn int_literal(
        &mut self,
        register: RegisterId,
        value: i64,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::Const(Box::new(Const {
            register,
            value,
            position,
        })));
    }

    pub fn string_literal(
        &mut self,
        register: RegisterId,
        value: String,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::String(Box::new(StringLiteral {
            register,
            value,
            position,
        })));
    }

    pub fn move_register(
        &mut self,
        target: RegisterId,
        source: RegisterId,
        kind: ValueKind,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::Move(Box::new(Move {
            target,
            source,
            kind,
            position,
        })));
    }

    pub fn add_literal(
        &mut self,
        register: RegisterId,
        source: RegisterId,
        value: i64,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::AddLiteral(Box::new(AddLiteral {
            register,
            source,
            value,
            position,
        })));
    }

    pub fn invoke(
        &mut self,
        kind: InvokeKind,
        method: MethodRefId,
        arguments: Vec<RegisterId>,
        result: Option<RegisterId>,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::Invoke(Box::new(Invoke {
            kind,
            method,
            arguments,
            result,
            position,
        })));
    }

    pub fn new_instance(
        &mut self,
        register: RegisterId,
        class: ClassId,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::NewInstance(Box::new(
            NewInstance { register, class, position },
        )));
    }

    pub fn check_null(
        &mut self,
        register: RegisterId,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::CheckNull(Box::new(CheckNull {
            register,
            position,
        })));
    }

    pub fn get_field(
        &mut self,
        register: RegisterId,
        receiver: Option<RegisterId>,
        field: FieldId,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::GetField(Box::new(GetField {
            register,
            receiver,
            field,
            position,
        })));
    }

    pub fn set_field(
        &mut self,
        value: RegisterId,
        receiver: Option<RegisterId>,
        field: FieldId,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::SetField(Box::new(SetField {
            value,
            receiver,
            field,
            position,
        })));
    }

    pub fn monitor_enter(
        &mut self,
        register: RegisterId,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::MonitorEnter(Box::new(Monitor {
            register,
            position,
        })));
    }

    pub fn monitor_exit(
        &mut self,
        register: RegisterId,
        position: Option<PositionId>,
    ) {
        self.instructions.push(Instruction::MonitorExit(Box::new(Monitor {
            register,
            position,
        })));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Const {
    pub register: RegisterId,
    pub value: i64,
    pub position: Option<PositionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringLiteral {
    pub register: RegisterId,
    pub value: String,
    pub position: Option<PositionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Move {
    pub target: RegisterId,
    pub source: RegisterId,
    pub kind: ValueKind,
    pub position: Option<PositionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddLiteral {
    pub register: RegisterId,
    pub source: RegisterId,
    pub value: i64,
    pub position: Option<PositionId>,
}

/// Jumps to `if_true` if the condition isn't zero, and to `if_false`
/// otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    pub condition: RegisterId,
    pub if_true: BlockId,
    pub if_false: BlockId,
    pub position: Option<PositionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Goto {
    pub block: BlockId,
    pub position: Option<PositionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Return {
    pub register: Option<RegisterId>,
    pub position: Option<PositionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Throw {
    pub register: RegisterId,
    pub position: Option<PositionId>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Static,
    Direct,
    Virtual,
    Super,
    Interface,
}

impl InvokeKind {
    pub fn search(self) -> MethodSearch {
        match self {
            InvokeKind::Static => MethodSearch::Static,
            InvokeKind::Direct => MethodSearch::Direct,
            InvokeKind::Virtual => MethodSearch::Virtual,
            InvokeKind::Super => MethodSearch::Super,
            InvokeKind::Interface => MethodSearch::Interface,
        }
    }

    pub fn is_dynamic(self) -> bool {
        matches!(self, InvokeKind::Virtual | InvokeKind::Interface)
    }

    pub fn name(self) -> &'static str {
        match self {
            InvokeKind::Static => "invoke-static",
            InvokeKind::Direct => "invoke-direct",
            InvokeKind::Virtual => "invoke-virtual",
            InvokeKind::Super => "invoke-super",
            InvokeKind::Interface => "invoke-interface",
        }
    }
}

/// A method call.
///
/// The receiver of instance methods is the first argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invoke {
    pub kind: InvokeKind,
    pub method: MethodRefId,
    pub arguments: Vec<RegisterId>,
    pub result: Option<RegisterId>,
    pub position: Option<PositionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewInstance {
    pub register: RegisterId,
    pub class: ClassId,
    pub position: Option<PositionId>,
}

/// Throws a null pointer exception if the register contains null.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckNull {
    pub register: RegisterId,
    pub position: Option<PositionId>,
}

/// Reads a field, or a static field if there's no receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetField {
    pub register: RegisterId,
    pub receiver: Option<RegisterId>,
    pub field: FieldId,
    pub position: Option<PositionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetField {
    pub value: RegisterId,
    pub receiver: Option<RegisterId>,
    pub field: FieldId,
    pub position: Option<PositionId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Monitor {
    pub register: RegisterId,
    pub position: Option<PositionId>,
}

/// A MIR instruction.
///
/// The variants are boxed so that the size of this type stays small.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Const(Box<Const>),
    String(Box<StringLiteral>),
    Move(Box<Move>),
    AddLiteral(Box<AddLiteral>),
    Branch(Box<Branch>),
    Goto(Box<Goto>),
    Return(Box<Return>),
    Throw(Box<Throw>),
    Invoke(Box<Invoke>),
    NewInstance(Box<NewInstance>),
    CheckNull(Box<CheckNull>),
    GetField(Box<GetField>),
    SetField(Box<SetField>),
    MonitorEnter(Box<Monitor>),
    MonitorExit(Box<Monitor>),
}

impl Instruction {
    pub fn position(&self) -> Option<PositionId> {
        match self {
            Instruction::Const(v) => v.position,
            Instruction::String(v) => v.position,
            Instruction::Move(v) => v.position,
            Instruction::AddLiteral(v) => v.position,
            Instruction::Branch(v) => v.position,
            Instruction::Goto(v) => v.position,
            Instruction::Return(v) => v.position,
            Instruction::Throw(v) => v.position,
            Instruction::Invoke(v) => v.position,
            Instruction::NewInstance(v) => v.position,
            Instruction::CheckNull(v) => v.position,
            Instruction::GetField(v) => v.position,
            Instruction::SetField(v) => v.position,
            Instruction::MonitorEnter(v) => v.position,
            Instruction::MonitorExit(v) => v.position,
        }
    }

    pub fn set_position(&mut self, position: Option<PositionId>) {
        let slot = match self {
            Instruction::Const(v) => &mut v.position,
            Instruction::String(v) => &mut v.position,
            Instruction::Move(v) => &mut v.position,
            Instruction::AddLiteral(v) => &mut v.position,
            Instruction::Branch(v) => &mut v.position,
            Instruction::Goto(v) => &mut v.position,
            Instruction::Return(v) => &mut v.position,
            Instruction::Throw(v) => &mut v.position,
            Instruction::Invoke(v) => &mut v.position,
            Instruction::NewInstance(v) => &mut v.position,
            Instruction::CheckNull(v) => &mut v.position,
            Instruction::GetField(v) => &mut v.position,
            Instruction::SetField(v) => &mut v.position,
            Instruction::MonitorEnter(v) => &mut v.position,
            Instruction::MonitorExit(v) => &mut v.position,
        };

        *slot = position;
    }

    /// Returns the register written to by this instruction, if any.
    pub fn defines(&self) -> Option<RegisterId> {
        match self {
            Instruction::Const(v) => Some(v.register),
            Instruction::String(v) => Some(v.register),
            Instruction::Move(v) => Some(v.target),
            Instruction::AddLiteral(v) => Some(v.register),
            Instruction::Invoke(v) => v.result,
            Instruction::NewInstance(v) => Some(v.register),
            Instruction::GetField(v) => Some(v.register),
            _ => None,
        }
    }

    /// Calls the closure for every register read by this instruction.
    pub fn each_use<F: FnMut(RegisterId)>(&self, mut func: F) {
        match self {
            Instruction::Move(v) => func(v.source),
            Instruction::AddLiteral(v) => func(v.source),
            Instruction::Branch(v) => func(v.condition),
            Instruction::Return(v) => v.register.into_iter().for_each(func),
            Instruction::Throw(v) => func(v.register),
            Instruction::Invoke(v) => {
                v.arguments.iter().cloned().for_each(func)
            }
            Instruction::CheckNull(v) => func(v.register),
            Instruction::GetField(v) => v.receiver.into_iter().for_each(func),
            Instruction::SetField(v) => {
                func(v.value);
                v.receiver.into_iter().for_each(func);
            }
            Instruction::MonitorEnter(v) | Instruction::MonitorExit(v) => {
                func(v.register)
            }
            Instruction::Const(_)
            | Instruction::String(_)
            | Instruction::Goto(_)
            | Instruction::NewInstance(_) => {}
        }
    }

    /// Replaces every register read by this instruction.
    pub fn map_uses<F: Fn(RegisterId) -> RegisterId>(&mut self, func: F) {
        match self {
            Instruction::Move(v) => v.source = func(v.source),
            Instruction::AddLiteral(v) => v.source = func(v.source),
            Instruction::Branch(v) => v.condition = func(v.condition),
            Instruction::Return(v) => v.register = v.register.map(func),
            Instruction::Throw(v) => v.register = func(v.register),
            Instruction::Invoke(v) => {
                v.arguments.iter_mut().for_each(|r| *r = func(*r))
            }
            Instruction::CheckNull(v) => v.register = func(v.register),
            Instruction::GetField(v) => v.receiver = v.receiver.map(func),
            Instruction::SetField(v) => {
                v.value = func(v.value);
                v.receiver = v.receiver.map(func);
            }
            Instruction::MonitorEnter(v) | Instruction::MonitorExit(v) => {
                v.register = func(v.register)
            }
            Instruction::Const(_)
            | Instruction::String(_)
            | Instruction::Goto(_)
            | Instruction::NewInstance(_) => {}
        }
    }

    /// Replaces every register read or written by this instruction.
    pub fn map_registers<F: Fn(RegisterId) -> RegisterId>(&mut self, func: F) {
        self.map_uses(&func);

        match self {
            Instruction::Const(v) => v.register = func(v.register),
            Instruction::String(v) => v.register = func(v.register),
            Instruction::Move(v) => v.target = func(v.target),
            Instruction::AddLiteral(v) => v.register = func(v.register),
            Instruction::Invoke(v) => v.result = v.result.map(&func),
            Instruction::NewInstance(v) => v.register = func(v.register),
            Instruction::GetField(v) => v.register = func(v.register),
            _ => {}
        }
    }

    /// Replaces the blocks this instruction jumps to.
    pub fn map_blocks<F: Fn(BlockId) -> BlockId>(&mut self, func: F) {
        match self {
            Instruction::Goto(v) => v.block = func(v.block),
            Instruction::Branch(v) => {
                v.if_true = func(v.if_true);
                v.if_false = func(v.if_false);
            }
            _ => {}
        }
    }

    /// Returns the blocks this instruction jumps to.
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Instruction::Goto(v) => vec![v.block],
            Instruction::Branch(v) => vec![v.if_true, v.if_false],
            _ => Vec::new(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Goto(_)
                | Instruction::Branch(_)
                | Instruction::Return(_)
                | Instruction::Throw(_)
        )
    }

    /// Returns `true` if executing this instruction may raise an exception.
    pub fn may_throw(&self) -> bool {
        matches!(
            self,
            Instruction::Throw(_)
                | Instruction::Invoke(_)
                | Instruction::NewInstance(_)
                | Instruction::CheckNull(_)
                | Instruction::GetField(_)
                | Instruction::SetField(_)
                | Instruction::MonitorEnter(_)
                | Instruction::MonitorExit(_)
        )
    }

    /// Returns `true` if the only effect of this instruction is writing to its
    /// register.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Instruction::Const(_)
                | Instruction::String(_)
                | Instruction::Move(_)
                | Instruction::AddLiteral(_)
        )
    }

    /// Returns the contribution of this instruction to the size of a method.
    ///
    /// Jumps and returns don't count, as inlining turns returns into jumps and
    /// jumps disappear when blocks are laid out.
    pub fn size(&self) -> usize {
        match self {
            Instruction::Goto(_) | Instruction::Return(_) => 0,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Method {
    pub id: MethodId,
    pub registers: Registers,
    pub body: Graph,

    /// The registers the arguments are stored in, including the receiver for
    /// instance methods.
    pub arguments: Vec<RegisterId>,
    pub positions: Positions,
}

impl Method {
    pub fn new(id: MethodId) -> Self {
        Self {
            id,
            registers: Registers::new(),
            body: Graph::new(),
            arguments: Vec::new(),
            positions: Positions::new(),
        }
    }

    /// Returns the size of the method, used for making inlining decisions.
    pub fn code_size(&self) -> usize {
        self.instructions().map(|ins| ins.size()).sum()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.body.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Returns `true` if any reachable block returns to the caller.
    pub fn returns(&self) -> bool {
        let reachable = self.body.reachable();

        self.body.blocks.iter().enumerate().any(|(idx, block)| {
            reachable[idx]
                && matches!(
                    block.instructions.last(),
                    Some(Instruction::Return(_))
                )
        })
    }

    pub fn register_use_counts(&self) -> Vec<usize> {
        let mut uses = vec![0_usize; self.registers.len()];

        for ins in self.instructions() {
            ins.each_use(|r| uses[r.0] += 1);
        }

        uses
    }

    /// Returns the number of times each register is written to.
    ///
    /// Argument registers count as being written to once upon entry.
    pub fn register_definition_counts(&self) -> Vec<usize> {
        let mut defs = vec![0_usize; self.registers.len()];

        for reg in &self.arguments {
            defs[reg.0] += 1;
        }

        for ins in self.instructions() {
            if let Some(reg) = ins.defines() {
                defs[reg.0] += 1;
            }
        }

        defs
    }

    /// Removes blocks that can't be reached, returning the number of
    /// instructions removed.
    pub fn remove_unreachable_blocks(&mut self) -> usize {
        let reachable = self.body.reachable();

        if reachable.iter().all(|&v| v) {
            return 0;
        }

        // This Vec maps block IDs to the value to subtract from the ID in
        // order to derive the ID to use after unreachable blocks are removed.
        let mut shift_map = vec![0; self.body.blocks.len()];
        let mut shift = reachable.iter().filter(|v| !**v).count();

        for index in (0..self.body.blocks.len()).rev() {
            if !reachable[index] {
                shift -= 1;
            }

            shift_map[index] += shift;
        }

        let mut removed = 0;
        let mut blocks = Vec::new();

        swap(&mut blocks, &mut self.body.blocks);

        // Edges from unreachable blocks into reachable blocks must go too.
        for block in blocks.iter_mut() {
            block.predecessors.retain(|p| reachable[p.0]);
        }

        let mut region_map = vec![None; self.body.regions.len()];
        let mut regions = Vec::new();

        for (idx, mut block) in blocks.into_iter().enumerate() {
            if !reachable[idx] {
                removed += block.instructions.len();
                continue;
            }

            block.map_edges(|b| b - shift_map[b.0]);

            if let Some(ins) = block.instructions.last_mut() {
                ins.map_blocks(|b| b - shift_map[b.0]);
            }

            if let Some(old) = block.try_region {
                let new = *region_map[old.0].get_or_insert_with(|| {
                    let mut data = self.body.regions[old.0].clone();

                    for handler in &mut data.handlers {
                        handler.block -= shift_map[handler.block.0];
                    }

                    regions.push(data);
                    TryRegion(regions.len() - 1)
                });

                block.try_region = Some(new);
            }

            self.body.blocks.push(block);
        }

        self.body.regions = regions;
        self.body.start_id -= shift_map[self.body.start_id.0];
        removed
    }

    /// Checks the structural invariants of this method.
    pub fn verify(&self) -> Result<(), String> {
        let blocks = self.body.blocks.len();
        let registers = self.registers.len();

        if self.body.start_id.0 >= blocks {
            return Err(format!(
                "start block b{} doesn't exist",
                self.body.start_id.0
            ));
        }

        for reg in &self.arguments {
            if reg.0 >= registers {
                return Err(format!("argument r{} isn't allocated", reg.0));
            }
        }

        for (idx, pos) in self.positions.values.iter().enumerate() {
            if pos.parent.map_or(false, |p| p.0 >= idx) {
                return Err(format!("position {} has an invalid parent", idx));
            }
        }

        for region in &self.body.regions {
            if region.handlers.is_empty() {
                return Err("a try region has no handlers".to_string());
            }

            if let Some(h) =
                region.handlers.iter().find(|h| h.block.0 >= blocks)
            {
                return Err(format!("handler b{} doesn't exist", h.block.0));
            }
        }

        for (idx, block) in self.body.blocks.iter().enumerate() {
            let id = BlockId(idx);
            let last = block.instructions.len().saturating_sub(1);

            match block.instructions.last() {
                Some(ins) if ins.is_terminator() => {}
                _ => return Err(format!("b{} isn't terminated", idx)),
            }

            for (index, ins) in block.instructions.iter().enumerate() {
                if index < last && ins.is_terminator() {
                    return Err(format!(
                        "b{} has a terminator before its end",
                        idx
                    ));
                }

                let mut invalid = None;

                ins.each_use(|r| {
                    if r.0 >= registers {
                        invalid = Some(r);
                    }
                });

                if let Some(r) = ins.defines().filter(|r| r.0 >= registers) {
                    invalid = Some(r);
                }

                if let Some(r) = invalid {
                    return Err(format!(
                        "b{} uses unallocated register r{}",
                        idx, r.0
                    ));
                }

                if ins.position().map_or(false, |p| p.0 >= self.positions.len())
                {
                    return Err(format!(
                        "b{} refers to a missing position",
                        idx
                    ));
                }
            }

            let targets: IndexSet<BlockId> = block
                .instructions
                .last()
                .map(|i| i.targets().into_iter().collect())
                .unwrap_or_default();

            if targets.iter().any(|b| b.0 >= blocks) {
                return Err(format!("b{} jumps to a missing block", idx));
            }

            if targets.len() != block.successors.len()
                || !targets.iter().all(|t| block.successors.contains(t))
            {
                return Err(format!(
                    "the successors of b{} don't match its terminator",
                    idx
                ));
            }

            for succ in &block.successors {
                if !self.body.block(*succ).predecessors.contains(&id) {
                    return Err(format!(
                        "b{} isn't a predecessor of b{}",
                        idx, succ.0
                    ));
                }
            }

            for pred in &block.predecessors {
                if pred.0 >= blocks
                    || !self.body.block(*pred).successors.contains(&id)
                {
                    return Err(format!(
                        "b{} isn't a successor of b{}",
                        idx, pred.0
                    ));
                }
            }

            if block
                .try_region
                .map_or(false, |r| r.0 >= self.body.regions.len())
            {
                return Err(format!("b{} refers to a missing try region", idx));
            }
        }

        Ok(())
    }
}

/// The method bodies of a program.
pub struct Mir {
    pub methods: IndexMap<MethodId, Method>,
}

impl Mir {
    pub fn new() -> Self {
        Self { methods: IndexMap::new() }
    }

    pub fn add_method(&mut self, method: Method) {
        self.methods.insert(method.id, method);
    }
}
