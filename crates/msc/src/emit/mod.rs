//! Image emission
//!
//! Turns an error-free analysis into an [`Image`]:
//! - one `TypeDef` per source class, in declaration order
//! - method bodies lowered to [`ir::Inst`] lists, then assembled
//! - static field initializers collected into a `.cctor` method
//!
//! Method indices in the image match the symbol table, so local call
//! tokens can be computed before every body is emitted.

mod assembler;
mod ir;
mod lower;

pub use assembler::AssemblyError;

use log::{debug, trace};
use msvm::image::{flags, FieldDef, LocalToken, MethodDef, TypeDef};
use msvm::{Image, ImageBuilder, ImageKind, TypeSig};

use self::assembler::Assembler;
use self::lower::{LoweredBody, Lowering};
use crate::sema::symbols::Access;
use crate::sema::types::Ty;
use crate::sema::Analysis;

/// Name of the generated static initializer
pub const INITIALIZER_NAME: &str = ".cctor";

fn access_flags(access: Access) -> u8 {
    if access == Access::Public { flags::PUBLIC } else { 0 }
}

fn static_flag(is_static: bool) -> u8 {
    if is_static { flags::STATIC } else { 0 }
}

/// Build the image for an analyzed compilation
pub(crate) fn emit_image(analysis: &Analysis, name: &str, kind: ImageKind) -> Result<Image, AssemblyError> {
    build(analysis, name, kind, None)
}

/// Lowered instructions of every method, before assembly
pub(crate) fn ir_listing(analysis: &Analysis, name: &str) -> Result<String, AssemblyError> {
    let mut out = String::new();
    build(analysis, name, ImageKind::Library, Some(&mut out))?;
    Ok(out)
}

fn build(
    analysis: &Analysis,
    name: &str,
    kind: ImageKind,
    mut dump: Option<&mut String>,
) -> Result<Image, AssemblyError> {
    let table = &analysis.table;
    let mut builder = ImageBuilder::new(name, kind);

    for (_, symbol) in table.source_types() {
        let mut def = TypeDef::new(symbol.full_name.clone(), access_flags(symbol.access));
        def.fields = symbol
            .fields
            .iter()
            .map(|field| FieldDef {
                name: field.name.clone(),
                flags: access_flags(field.access) | static_flag(field.is_static),
                ty: table.sig(&field.ty),
            })
            .collect();
        def.methods = symbol
            .methods
            .iter()
            .map(|method| MethodDef {
                name: method.name.clone(),
                flags: access_flags(method.access) | static_flag(method.is_static),
                params: method.params.iter().map(|p| table.sig(&p.ty)).collect(),
                ret: table.sig(&method.ret),
                locals: Vec::new(),
                max_stack: 0,
                code_offset: 0,
                code_len: 0,
            })
            .collect();
        builder.add_type(def);
    }

    let mut assembler = Assembler::new();
    for bound in &analysis.program.types {
        let Some(type_index) = table.image_index(bound.id) else {
            continue;
        };
        let symbol = table.get(bound.id);
        for method in &bound.methods {
            let signature = &symbol.methods[method.method.index];
            let lowered = Lowering::new(table, &mut builder, signature.is_static, &method.locals)
                .method(&method.body, signature.ret == Ty::Void);
            let display = table.method_display(bound.id, method.method.index);
            trace!("{}:\n{}", display, listing(&lowered));
            if let Some(out) = dump.as_deref_mut() {
                out.push_str(&format!("{}:\n{}\n", display, listing(&lowered)));
            }
            let def = assemble(&mut assembler, &mut builder, lowered, |def| def)?;
            install(&mut builder, type_index, method.method.index, def);
        }

        if !bound.static_inits.is_empty() {
            let lowered = Lowering::new(table, &mut builder, true, &[]).initializer(&bound.static_inits);
            if let Some(out) = dump.as_deref_mut() {
                out.push_str(&format!("{}.{}:\n{}\n", symbol.full_name, INITIALIZER_NAME, listing(&lowered)));
            }
            let def = assemble(&mut assembler, &mut builder, lowered, |def| MethodDef {
                name: INITIALIZER_NAME.to_string(),
                flags: flags::STATIC,
                ..def
            })?;
            if let Some(ty) = builder.type_mut(type_index) {
                ty.methods.push(def);
                ty.initializer = Some((ty.methods.len() - 1) as u16);
            }
        }
    }

    if let Some(entry) = analysis.entry_point {
        if let Some(type_index) = table.image_index(entry.ty) {
            builder.set_entry_point(LocalToken::new(type_index, entry.index as u16));
        }
    }

    let image = builder.finish();
    debug!(
        "emitted image '{}': {} types, {} bytes of code",
        image.name,
        image.types.len(),
        image.code.len()
    );
    Ok(image)
}

/// Assemble a body into the code blob; `shape` fills in the definition
fn assemble(
    assembler: &mut Assembler,
    builder: &mut ImageBuilder,
    lowered: LoweredBody,
    shape: impl FnOnce(MethodDef) -> MethodDef,
) -> Result<MethodDef, AssemblyError> {
    let assembled = assembler.assemble(&lowered.code)?;
    let code_offset = builder.append_code(&assembled.code);
    Ok(shape(MethodDef {
        name: String::new(),
        flags: 0,
        params: Vec::new(),
        ret: TypeSig::Void,
        locals: lowered.locals,
        max_stack: assembled.max_stack,
        code_offset,
        code_len: assembled.code.len() as u32,
    }))
}

/// Copy body layout into the declared method
fn install(builder: &mut ImageBuilder, type_index: u16, method_index: usize, body: MethodDef) {
    if let Some(def) = builder
        .type_mut(type_index)
        .and_then(|ty| ty.methods.get_mut(method_index))
    {
        def.locals = body.locals;
        def.max_stack = body.max_stack;
        def.code_offset = body.code_offset;
        def.code_len = body.code_len;
    }
}

fn listing(body: &LoweredBody) -> String {
    body.code.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::analyze;
    use crate::syntax::SyntaxTree;
    use msvm::Module;
    use pretty_assertions::assert_eq;

    fn emit(source: &str, kind: ImageKind) -> Image {
        let trees = [SyntaxTree::parse(source)];
        let analysis = analyze(&trees, &[msvm::corlib::image()], kind == ImageKind::Executable, None);
        assert!(analysis.declaration_diagnostics.iter().all(|d| !d.is_error()));
        assert!(analysis.body_diagnostics.iter().all(|d| !d.is_error()));
        emit_image(&analysis, "test", kind).unwrap()
    }

    #[test]
    fn test_type_layout() {
        let image = emit(
            "namespace Demo { public class Counter { static int count = 5; public static int Next() { count++; return count; } } }",
            ImageKind::Library,
        );
        assert_eq!(image.types.len(), 1);
        let ty = &image.types[0];
        assert_eq!(ty.name, "Demo.Counter");
        assert!(ty.is_public());
        assert_eq!(ty.fields[0].flags, flags::STATIC);
        assert_eq!(ty.methods[0].name, "Next");
        assert_eq!(ty.methods[0].flags, flags::PUBLIC | flags::STATIC);
        assert_eq!(ty.initializer, Some(1));
        assert_eq!(ty.methods[1].name, INITIALIZER_NAME);
    }

    #[test]
    fn test_external_calls_become_member_refs() {
        let image = emit(
            "class P { static void Main() { System.Console.WriteLine(\"hi\"); } }",
            ImageKind::Executable,
        );
        assert_eq!(image.entry_point, Some(LocalToken::new(0, 0)));
        assert_eq!(image.references, vec![msvm::corlib::CORLIB_NAME.to_string()]);
        assert_eq!(image.member_refs[0].name, "WriteLine");
        assert_eq!(image.member_refs[0].params, vec![TypeSig::String]);
        assert_eq!(image.strings, vec!["hi".to_string()]);
    }

    #[test]
    fn test_emitted_library_runs() {
        let image = emit(
            "public class Calculator { public static object Evaluate() { return 6 * 7; } }",
            ImageKind::Library,
        );
        let host = msvm::Host::capturing();
        let assembly = host.load(&image.to_bytes()).unwrap();
        let evaluate = assembly.get_member("Calculator", "Evaluate").unwrap();
        let result = evaluate.invoke(&[]).unwrap();
        assert_eq!(result.to_string(), "42");
    }

    #[test]
    fn test_ir_listing_names_methods() {
        let trees = [SyntaxTree::parse("class A { static int F(bool b) { if (b) return 1; return 2; } }")];
        let analysis = analyze(&trees, &[msvm::corlib::image()], false, None);
        let text = ir_listing(&analysis, "a").unwrap();
        assert!(text.starts_with("A.F(bool):\n"));
        assert!(text.contains("brfalse .L"));
    }
}
