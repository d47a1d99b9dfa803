//! End-to-end use of the compilation API: parse, check, emit, load, invoke

use std::sync::Arc;
use std::thread;

use minisharp::{
    Compilation, CompilationOptions, Culture, Diagnostic, Location, MetadataReference, OutputKind,
    Severity, SyntaxTree,
};
use msvm::{Host, Module, RuntimeError, Value, MAX_CALL_DEPTH};
use pretty_assertions::assert_eq;

const CALCULATOR: &str = "\
public class Calculator
{
    public static object Evaluate()
    {
        return 6 * 7;
    }
}
";

const MISSING_RETURN: &str = "class Program\n{\n    static int Main(string[] args)\n    {\n    }\n}";

fn corlib() -> MetadataReference {
    MetadataReference::core_library()
}

fn ids(diagnostics: &[Diagnostic]) -> Vec<&'static str> {
    diagnostics.iter().map(Diagnostic::id).collect()
}

fn emit_bytes(compilation: &Compilation) -> Vec<u8> {
    let mut image = Vec::new();
    let result = compilation.emit(&mut image);
    assert!(result.success(), "{:?}", result.diagnostics());
    image
}

#[test]
fn test_emit_and_invoke_library() {
    let tree = SyntaxTree::parse(CALCULATOR);
    let compilation = Compilation::new(
        "calc.dll",
        [tree],
        [corlib()],
        CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
    );
    let image = emit_bytes(&compilation);

    let host = Host::capturing();
    let assembly = host.load(&image).unwrap();
    assert_eq!(assembly.exported_types(), vec!["Calculator".to_string()]);
    let evaluate = assembly.get_member("Calculator", "Evaluate").unwrap();
    let answer = evaluate.invoke(&[]).unwrap();
    assert_eq!(answer.to_string(), "42");
}

#[test]
fn test_missing_return_diagnostic() {
    let tree = SyntaxTree::parse(MISSING_RETURN);
    let compilation = Compilation::create("program.exe")
        .add_syntax_trees([tree.clone()])
        .add_references([corlib()]);

    let diagnostics = compilation.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.id(), "CS0161");
    assert_eq!(diagnostic.severity(), Severity::Error);
    assert_eq!(
        diagnostic.message(Culture::Invariant),
        "'Program.Main(string[])': not all code paths return a value"
    );

    let span = diagnostic.location().source_span();
    assert_eq!(span.len(), 4);
    assert_eq!(tree.text().slice(span), "Main");

    let line_span = diagnostic.location().line_span();
    assert_eq!(line_span.start_line_position().line, 2);
    assert_eq!(line_span.start_line_position().character, 15);
    assert_eq!(diagnostic.to_string(), "(3,16): error CS0161: 'Program.Main(string[])': not all code paths return a value");
}

#[test]
fn test_german_message_keeps_location() {
    let tree = SyntaxTree::parse(MISSING_RETURN);
    let compilation = Compilation::create("program.exe")
        .add_syntax_trees([tree])
        .add_references([corlib()]);
    let diagnostic = compilation.diagnostics().remove(0);
    assert_eq!(
        diagnostic.message(Culture::from_name("de-DE")),
        "\"Program.Main(string[])\": Nicht alle Codepfade geben einen Wert zurück."
    );
    assert_eq!(diagnostic.message(Culture::from_name("fr-FR")), diagnostic.message(Culture::Invariant));
    assert_eq!(diagnostic.location().line_span().start_line_position().line, 2);
}

#[test]
fn test_failed_emit_writes_zero_bytes() {
    let compilation = Compilation::create("program.exe")
        .add_syntax_trees([SyntaxTree::parse(MISSING_RETURN)])
        .add_references([corlib()]);
    let mut sink = Vec::new();
    let result = compilation.emit(&mut sink);
    assert!(!result.success());
    assert_eq!(ids(result.diagnostics()), vec!["CS0161"]);
    assert!(sink.is_empty());
}

#[test]
fn test_emit_is_deterministic() {
    let compilation = Compilation::create("calc.dll")
        .add_syntax_trees([SyntaxTree::parse(CALCULATOR)])
        .add_references([corlib()]);
    let first = emit_bytes(&compilation);
    let second = emit_bytes(&compilation);
    let rebuilt = emit_bytes(&compilation.with_assembly_name("calc.dll"));
    assert_eq!(first, second);
    assert_eq!(first, rebuilt);
}

#[test]
fn test_library_referenced_by_executable() {
    let library = Compilation::create("mathlib.dll")
        .add_syntax_trees([SyntaxTree::parse(
            "namespace MathLib { public class Ops { public static int Square(int x) { return x * x; } } }",
        )])
        .add_references([corlib()]);
    let library_image = emit_bytes(&library);

    let program = Compilation::create("app.exe")
        .add_syntax_trees([SyntaxTree::parse(
            "using MathLib;\nclass App { static int Main() { System.Console.WriteLine(Ops.Square(7)); return Ops.Square(3); } }",
        )])
        .add_references([corlib(), MetadataReference::from_image(library_image.clone(), "mathlib.dll")]);
    let program_image = emit_bytes(&program);

    let host = Host::capturing();
    host.load(&library_image).unwrap();
    let exit_code = host.run(&program_image, &[]).unwrap();
    assert_eq!(exit_code, 9);
    assert_eq!(host.take_output(), "49\n");
}

#[test]
fn test_private_members_of_references_are_inaccessible() {
    let library = Compilation::create("hidden.dll")
        .add_syntax_trees([SyntaxTree::parse(
            "public class Vault { static int Secret() { return 1; } }",
        )])
        .add_references([corlib()]);
    let image = emit_bytes(&library);

    let user = Compilation::create("user.dll")
        .add_syntax_trees([SyntaxTree::parse("class U { static int F() { return Vault.Secret(); } }")])
        .add_references([corlib(), MetadataReference::from_image(image, "hidden.dll")]);
    assert_eq!(ids(&user.diagnostics()), vec!["CS0122"]);
}

#[test]
fn test_missing_reference_is_a_diagnostic() {
    let compilation = Compilation::create("a.dll")
        .add_syntax_trees([SyntaxTree::parse("class A { }")])
        .add_references([corlib(), MetadataReference::from_file("does/not/exist.dll")]);
    let diagnostics = compilation.diagnostics();
    assert_eq!(ids(&diagnostics), vec!["CS0006"]);
    assert_eq!(diagnostics[0].location(), &Location::None);
    assert_eq!(
        diagnostics[0].message(Culture::Invariant),
        "Metadata file 'does/not/exist.dll' could not be found"
    );
}

#[test]
fn test_concurrent_diagnostics_agree() {
    let compilation = Arc::new(
        Compilation::create("program.exe")
            .add_syntax_trees([SyntaxTree::parse(MISSING_RETURN)])
            .add_references([corlib()]),
    );
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let compilation = Arc::clone(&compilation);
            thread::spawn(move || {
                compilation
                    .diagnostics()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let results: Vec<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for result in &results[1..] {
        assert_eq!(result, &results[0]);
    }
    assert_eq!(results[0].len(), 1);
}

#[test]
fn test_diagnostics_ordered_across_trees() {
    let first = SyntaxTree::parse_with_path("class A { static int F() { return y; } }", "a.cs");
    let second = SyntaxTree::parse_with_path("class B { static void G() { int x = ; } }", "b.cs");
    let compilation = Compilation::create("two.dll")
        .add_syntax_trees([first, second])
        .add_references([corlib()]);
    let rendered: Vec<String> = compilation.diagnostics().iter().map(ToString::to_string).collect();
    assert_eq!(rendered[0], "a.cs(1,35): error CS0103: The name 'y' does not exist in the current context");
    assert!(rendered[1..].iter().all(|d| d.starts_with("b.cs(")));
    assert!(rendered.iter().any(|d| d.starts_with("b.cs(1,37): error CS1525")));
}

#[test]
fn test_executable_without_main() {
    let compilation = Compilation::create("tool.exe")
        .add_syntax_trees([SyntaxTree::parse("class Tool { static void Run() { } }")])
        .add_references([corlib()]);
    assert_eq!(ids(&compilation.diagnostics()), vec!["CS5001"]);

    let as_library = compilation.with_options(CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary));
    assert!(as_library.diagnostics().is_empty());
}

#[test]
fn test_warning_options() {
    let source = "class W { static void F() { int unused; } }";
    let compilation = Compilation::create("w.dll")
        .add_syntax_trees([SyntaxTree::parse(source)])
        .add_references([corlib()]);
    let warnings = compilation.diagnostics();
    assert_eq!(ids(&warnings), vec!["CS0168"]);
    assert_eq!(warnings[0].severity(), Severity::Warning);
    assert!(compilation.emit(&mut Vec::new()).success());

    let strict = compilation.with_options(CompilationOptions::default().with_warnings_as_errors(true));
    assert_eq!(strict.diagnostics()[0].severity(), Severity::Error);
    assert!(!strict.emit(&mut Vec::new()).success());

    let quiet = compilation.with_options(CompilationOptions::default().with_suppressed(["CS0168"]));
    assert!(quiet.diagnostics().is_empty());
}

#[test]
fn test_program_output() {
    let source = r#"
class Program
{
    static int counter = 10;

    static int Fib(int n)
    {
        if (n < 2) return n;
        return Fib(n - 1) + Fib(n - 2);
    }

    static void Main()
    {
        int total = 0;
        for (int i = 0; i < 5; i++)
        {
            if (i == 3) continue;
            total += i;
        }
        int[] values = new int[3];
        values[1] = Fib(10);
        System.Console.WriteLine("total " + total);
        System.Console.WriteLine(values[1] + counter);
        System.Console.WriteLine(values.Length > 2 && total != 0);
    }
}
"#;
    let compilation = Compilation::create("program.exe")
        .add_syntax_trees([SyntaxTree::parse(source)])
        .add_references([corlib()]);
    let image = emit_bytes(&compilation);
    let host = Host::capturing();
    assert_eq!(host.run(&image, &[]).unwrap(), 0);
    assert_eq!(host.take_output(), "total 7\n65\nTrue\n");
}

#[test]
fn test_deep_nesting_is_a_diagnostic() {
    let depth = 10_000;
    let source = format!(
        "class Deep {{ static int F() {{ return {}1{}; }} }}",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    let compilation = Compilation::create("deep.dll")
        .add_syntax_trees([SyntaxTree::parse(source)])
        .add_references([corlib()]);
    let diagnostics = compilation.diagnostics();
    assert_eq!(ids(&diagnostics), vec!["CS8078"]);
    assert_eq!(
        diagnostics[0].message(Culture::Invariant),
        "An expression is too long or complex to compile"
    );
    assert!(!compilation.emit(&mut Vec::new()).success());
}

#[test]
fn test_long_operator_chain_compiles_and_runs() {
    let source = format!(
        "public class Chain {{ public static int Sum(int x) {{ return x{}; }} }}",
        " + x".repeat(2_999)
    );
    let compilation = Compilation::create("chain.dll")
        .add_syntax_trees([SyntaxTree::parse(source)])
        .add_references([corlib()]);
    let image = emit_bytes(&compilation);
    let host = Host::capturing();
    let assembly = host.load(&image).unwrap();
    let sum = assembly.get_member("Chain", "Sum").unwrap();
    assert_eq!(sum.invoke(&[Value::Int(2)]), Ok(Value::Int(6_000)));
}

#[test]
fn test_runaway_recursion_is_a_runtime_error() {
    let compilation = Compilation::create("runaway.dll")
        .add_syntax_trees([SyntaxTree::parse(
            "public class Runaway { public static int F(int n) { return F(n + 1); } }",
        )])
        .add_references([corlib()]);
    let image = emit_bytes(&compilation);
    let host = Host::capturing();
    let assembly = host.load(&image).unwrap();
    let f = assembly.get_member("Runaway", "F").unwrap();
    assert_eq!(
        f.invoke(&[Value::Int(0)]),
        Err(RuntimeError::StackOverflow(MAX_CALL_DEPTH))
    );
}
