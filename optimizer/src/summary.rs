//! Summaries of the arguments passed at call sites.
use crate::mir::{BlockId, Instruction, Method};
use types::ClassId;

/// What is known about an argument at a call site.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgumentValue {
    Unknown,

    /// The argument is a known integer.
    Constant(i64),

    /// The argument is a newly allocated instance of the given class, meaning
    /// it's never null.
    Instance(ClassId),
}

/// The arguments of a call site and whether its result is used.
///
/// Call sites with the same summary produce the same code when the callee is
/// specialized to their arguments, so the specialized callee only needs to be
/// produced once per summary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallSiteSummary {
    pub arguments: Vec<ArgumentValue>,
    pub result_used: bool,
}

impl CallSiteSummary {
    pub fn unknown(arguments: usize, result_used: bool) -> Self {
        Self { arguments: vec![ArgumentValue::Unknown; arguments], result_used }
    }

    /// Summarizes the invoke instruction at the given location.
    ///
    /// Only definitions that precede the call in the same block are
    /// considered, as they're guaranteed to reach the call.
    pub fn for_call_site(
        method: &Method,
        block: BlockId,
        instruction: usize,
    ) -> Option<Self> {
        let instructions = &method.body.block(block).instructions;
        let Some(Instruction::Invoke(ins)) = instructions.get(instruction)
        else {
            return None;
        };

        let arguments = ins
            .arguments
            .iter()
            .map(|&reg| {
                let def = instructions[..instruction]
                    .iter()
                    .rev()
                    .find(|i| i.defines() == Some(reg));

                match def {
                    Some(Instruction::Const(v)) => {
                        ArgumentValue::Constant(v.value)
                    }
                    Some(Instruction::NewInstance(v)) => {
                        ArgumentValue::Instance(v.class)
                    }
                    _ => ArgumentValue::Unknown,
                }
            })
            .collect();

        Some(Self { arguments, result_used: ins.result.is_some() })
    }
}
