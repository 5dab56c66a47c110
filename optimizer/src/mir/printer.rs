//! Pretty-printing of MIR for debugging purposes.
use crate::mir::{Instruction, Method};
use std::fmt::Write;
use types::{Database, ValueKind};

fn format_instruction(db: &Database, instruction: &Instruction) -> String {
    match instruction {
        Instruction::Const(v) => {
            format!("r{} = const {}", v.register.0, v.value)
        }
        Instruction::String(v) => {
            format!("r{} = const-string {:?}", v.register.0, v.value)
        }
        Instruction::Move(v) => {
            let op = match v.kind {
                ValueKind::Primitive => "move",
                ValueKind::Object => "move-object",
            };

            format!("r{} = {} r{}", v.target.0, op, v.source.0)
        }
        Instruction::AddLiteral(v) => {
            format!("r{} = add r{}, {}", v.register.0, v.source.0, v.value)
        }
        Instruction::Branch(v) => format!(
            "branch r{}, true = b{}, false = b{}",
            v.condition.0, v.if_true.0, v.if_false.0
        ),
        Instruction::Goto(v) => format!("goto b{}", v.block.0),
        Instruction::Return(v) => match v.register {
            Some(reg) => format!("return r{}", reg.0),
            None => "return".to_string(),
        },
        Instruction::Throw(v) => format!("throw r{}", v.register.0),
        Instruction::Invoke(v) => {
            let args = v
                .arguments
                .iter()
                .map(|r| format!("r{}", r.0))
                .collect::<Vec<_>>()
                .join(", ");
            let call = format!(
                "{} {}({})",
                v.kind.name(),
                v.method.qualified_name(db),
                args
            );

            match v.result {
                Some(reg) => format!("r{} = {}", reg.0, call),
                None => call,
            }
        }
        Instruction::NewInstance(v) => {
            format!("r{} = new-instance {}", v.register.0, v.class.name(db))
        }
        Instruction::CheckNull(v) => format!("check-null r{}", v.register.0),
        Instruction::GetField(v) => {
            let name = format!(
                "{}.{}",
                v.field.class(db).name(db),
                v.field.name(db)
            );

            match v.receiver {
                Some(rec) => {
                    format!("r{} = get r{}.{}", v.register.0, rec.0, name)
                }
                None => format!("r{} = get-static {}", v.register.0, name),
            }
        }
        Instruction::SetField(v) => {
            let name = format!(
                "{}.{}",
                v.field.class(db).name(db),
                v.field.name(db)
            );

            match v.receiver {
                Some(rec) => format!("set r{}.{}, r{}", rec.0, name, v.value.0),
                None => format!("set-static {}, r{}", name, v.value.0),
            }
        }
        Instruction::MonitorEnter(v) => {
            format!("monitor-enter r{}", v.register.0)
        }
        Instruction::MonitorExit(v) => {
            format!("monitor-exit r{}", v.register.0)
        }
    }
}

/// Returns a String containing a textual version of a method's body.
pub fn to_text(db: &Database, method: &Method) -> String {
    let mut buffer = String::new();
    let reachable = method.body.reachable();

    let _ = writeln!(
        buffer,
        "{} (registers = {}, size = {})",
        method.id.qualified_name(db),
        method.registers.len(),
        method.code_size()
    );

    for (index, block) in method.body.blocks.iter().enumerate() {
        let _ = write!(buffer, "b{}", index);

        if index == method.body.start_id.0 {
            buffer.push_str(" (start)");
        }

        if let Some(region) = block.try_region {
            let _ = write!(buffer, " (try {})", region.0);
        }

        if !reachable[index] {
            buffer.push_str(" (unreachable)");
        }

        buffer.push_str(":\n");

        for ins in &block.instructions {
            let _ = writeln!(buffer, "  {}", format_instruction(db, ins));
        }
    }

    for (index, region) in method.body.regions.iter().enumerate() {
        let handlers = region
            .handlers
            .iter()
            .map(|h| match h.class {
                Some(class) => format!("{} -> b{}", class.name(db), h.block.0),
                None => format!("* -> b{}", h.block.0),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let _ = writeln!(buffer, "try {}: {}", index, handlers);
    }

    buffer
}
