// This module implements the native x86-64 emission backend. The lowered program is turned
// into a System V dispatch routine: the routine receives a context pointer whose first
// quadword is the address of a host-provided kernel entry point, and calls that entry once per
// step with the context and the step index, in program order. The code is encoded with the
// iced-x86 CodeAssembler and wrapped in an ELF relocatable object together with a read-only
// table holding the opcode of every step, so a host runtime can link the object, bind its
// kernels and drive the program without an interpreter loop.

//! x86-64 dispatch routine encoding and ELF object emission.

use crate::core::{CompileError, CompileResult};
use crate::ir::ComputeGraph;
use crate::pipeline::artifact::Artifact;
use crate::pipeline::pass::{Pass, PassContext, PassOutcome};
use crate::pipeline::program::Program;
use iced_x86::code_asm::*;
use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};

fn emission(err: impl std::fmt::Display) -> CompileError {
    CompileError::Emission {
        reason: err.to_string(),
    }
}

/// Symbol-safe form of a graph name.
pub fn symbol_prefix(name: &str) -> String {
    let mut prefix: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if prefix.is_empty() || prefix.starts_with(|c: char| c.is_ascii_digit()) {
        prefix.insert(0, '_');
    }
    prefix
}

/// Encode the dispatch routine for `program`.
///
/// `void run(ctx)`, where `ctx[0]` is `void kernel(ctx, uint32_t step)`.
pub fn encode_dispatch(program: &Program) -> CompileResult<Vec<u8>> {
    let mut a = CodeAssembler::new(64).map_err(emission)?;

    // rbx is callee-saved; the push also realigns the stack for the calls.
    a.push(rbx).map_err(emission)?;
    a.mov(rbx, rdi).map_err(emission)?;
    for index in 0..program.steps.len() {
        let index = u32::try_from(index).map_err(emission)?;
        a.mov(rdi, rbx).map_err(emission)?;
        a.mov(esi, index).map_err(emission)?;
        a.call(qword_ptr(rbx)).map_err(emission)?;
    }
    a.pop(rbx).map_err(emission)?;
    a.ret().map_err(emission)?;

    a.assemble(0).map_err(emission)
}

/// Opcode table, one little-endian `u32` per step.
pub fn step_table(program: &Program) -> Vec<u8> {
    program
        .steps
        .iter()
        .flat_map(|step| step.kernel.opcode().to_le_bytes())
        .collect()
}

/// Build an ELF relocatable object exporting `<graph>_run` and `<graph>_steps`.
pub fn emit_object(program: &Program) -> CompileResult<Vec<u8>> {
    let code = encode_dispatch(program)?;
    let table = step_table(program);
    let prefix = symbol_prefix(&program.name);

    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);

    let text = obj.section_id(StandardSection::Text);
    let code_offset = obj.append_section_data(text, &code, 16);
    obj.add_symbol(Symbol {
        name: format!("{prefix}_run").into_bytes(),
        value: code_offset,
        size: code.len() as u64,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(text),
        flags: SymbolFlags::None,
    });

    let rodata = obj.section_id(StandardSection::ReadOnlyData);
    let table_offset = obj.append_section_data(rodata, &table, 4);
    obj.add_symbol(Symbol {
        name: format!("{prefix}_steps").into_bytes(),
        value: table_offset,
        size: table.len() as u64,
        kind: SymbolKind::Data,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(rodata),
        flags: SymbolFlags::None,
    });

    let bytes = obj.write().map_err(emission)?;
    log::debug!(
        "Emitted x86-64 object for {}: {} code bytes, {} steps",
        program.name,
        code.len(),
        program.steps.len()
    );
    Ok(bytes)
}

/// Emits the lowered program as an x86-64 ELF object.
#[derive(Debug, Default)]
pub struct EmitX64;

impl Pass for EmitX64 {
    fn name(&self) -> &'static str {
        "emit-x64"
    }

    fn run(&self, _graph: &mut ComputeGraph, ctx: &mut PassContext<'_, '_>) -> PassOutcome {
        let Some(program) = ctx.program.as_ref() else {
            return PassOutcome::Failed(CompileError::Emission {
                reason: "no lowered program to emit".to_string(),
            });
        };
        match emit_object(program) {
            Ok(bytes) => {
                ctx.session.record_code_size(bytes.len());
                ctx.artifact = Some(Artifact::Object {
                    bytes,
                    program: program.clone(),
                });
                PassOutcome::Unchanged
            }
            Err(err) => PassOutcome::Failed(err),
        }
    }
}
