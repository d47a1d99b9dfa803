//! Command-line pipeline: read sources, compile, write and optionally run

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::common::{CompileError, CompileResult, DiagnosticReporter};
use crate::compilation::{Compilation, CompilationOptions, MetadataReference, OutputKind};
use crate::diagnostics::{Culture, Diagnostic};
use crate::syntax::lexer::Lexer;
use crate::syntax::SyntaxTree;

/// What the driver should do
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub inputs: Vec<PathBuf>,
    /// Defaults to the first input with `.exe`/`.dll`
    pub output: Option<PathBuf>,
    pub output_kind: OutputKind,
    pub references: Vec<PathBuf>,
    pub no_corlib: bool,
    pub main_type: Option<String>,
    pub warnings_as_errors: bool,
    pub suppressed: Vec<String>,
    pub culture: Culture,
    /// Run the entry point after a successful build
    pub run: bool,
    pub run_args: Vec<String>,
    pub dump_tokens: bool,
    pub dump_ast: bool,
    pub dump_ir: bool,
}

impl DriverConfig {
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            output: None,
            output_kind: OutputKind::Executable,
            references: Vec::new(),
            no_corlib: false,
            main_type: None,
            warnings_as_errors: false,
            suppressed: Vec::new(),
            culture: Culture::Invariant,
            run: false,
            run_args: Vec::new(),
            dump_tokens: false,
            dump_ast: false,
            dump_ir: false,
        }
    }

    /// Output path, derived from the first input when not given
    pub fn output_path(&self) -> Option<PathBuf> {
        self.output.clone().or_else(|| {
            let extension = match self.output_kind {
                OutputKind::Executable => "exe",
                OutputKind::DynamicallyLinkedLibrary => "dll",
            };
            self.inputs.first().map(|input| input.with_extension(extension))
        })
    }
}

/// Result of a driver run
#[derive(Debug)]
pub struct Outcome {
    pub diagnostics: Vec<Diagnostic>,
    /// Written image, if the build succeeded
    pub output: Option<PathBuf>,
    /// Exit code of the program when it was run
    pub exit_code: Option<i32>,
}

impl Outcome {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }
}

pub struct Driver {
    config: DriverConfig,
    reporter: DiagnosticReporter,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        let reporter = DiagnosticReporter::new().with_culture(config.culture);
        Self { config, reporter }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn reporter(&self) -> &DiagnosticReporter {
        &self.reporter
    }

    /// Parse every input file
    pub fn parse_inputs(&mut self) -> CompileResult<Vec<SyntaxTree>> {
        if self.config.inputs.is_empty() {
            return Err(CompileError::invalid_argument("no input files"));
        }
        let mut trees = Vec::with_capacity(self.config.inputs.len());
        for input in &self.config.inputs {
            let text = fs::read_to_string(input)?;
            let tree = SyntaxTree::parse_with_path(text, input.display().to_string());
            self.reporter.add_tree(&tree);
            trees.push(tree);
        }
        Ok(trees)
    }

    /// Build the compilation for the parsed inputs
    pub fn compilation(&self, trees: Vec<SyntaxTree>) -> Compilation {
        let name = self
            .config
            .output_path()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "a.exe".to_string());

        let mut references = Vec::new();
        if !self.config.no_corlib {
            references.push(MetadataReference::core_library());
        }
        references.extend(self.config.references.iter().map(MetadataReference::from_file));

        let mut options = CompilationOptions::new(self.config.output_kind)
            .with_warnings_as_errors(self.config.warnings_as_errors)
            .with_suppressed(self.config.suppressed.iter().cloned());
        if let Some(main_type) = &self.config.main_type {
            options = options.with_main_type_name(main_type.clone());
        }
        Compilation::new(name, trees, references, options)
    }

    /// Run the whole pipeline; debug dumps go to `dump`
    pub fn run(&mut self, dump: &mut dyn Write) -> CompileResult<Outcome> {
        let trees = self.parse_inputs()?;
        if self.config.dump_tokens {
            dump_tokens(&trees, dump)?;
        }
        if self.config.dump_ast {
            for tree in &trees {
                writeln!(dump, "=== AST: {} ===\n{:#?}", tree.path(), tree.root())?;
            }
        }

        let compilation = self.compilation(trees);
        let mut image = Vec::new();
        let result = compilation.emit(&mut image);
        let diagnostics = result.into_diagnostics();

        if self.config.dump_ir {
            if let Some(listing) = compilation.ir_listing() {
                writeln!(dump, "=== IR ===\n{}=== End IR ===", listing)?;
            }
        }

        if image.is_empty() {
            return Ok(Outcome {
                diagnostics,
                output: None,
                exit_code: None,
            });
        }

        let output = self
            .config
            .output_path()
            .ok_or_else(|| CompileError::invalid_argument("no output path"))?;
        fs::write(&output, &image)?;
        info!("wrote {} ({} bytes)", output.display(), image.len());

        let exit_code = if self.config.run {
            Some(self.execute(&image)?)
        } else {
            None
        };

        Ok(Outcome {
            diagnostics,
            output: Some(output),
            exit_code,
        })
    }

    /// Load the referenced images and the built one, then call `Main`
    fn execute(&self, image: &[u8]) -> CompileResult<i32> {
        if self.config.output_kind != OutputKind::Executable {
            return Err(CompileError::invalid_argument("--run needs an executable"));
        }
        let host = msvm::Host::new();
        for path in &self.config.references {
            load_reference(&host, path)?;
        }
        debug!("running {}", self.config.output_path().unwrap_or_default().display());
        Ok(host.run(image, &self.config.run_args)?)
    }
}

fn load_reference(host: &msvm::Host, path: &Path) -> CompileResult<()> {
    let bytes = fs::read(path)?;
    let name = msvm::Image::from_bytes(&bytes)
        .map_err(msvm::LoadError::from)?
        .name;
    if host.assembly(&name).is_none() {
        host.load(&bytes)?;
    }
    Ok(())
}

fn dump_tokens(trees: &[SyntaxTree], out: &mut dyn Write) -> CompileResult<()> {
    for tree in trees {
        writeln!(out, "=== Tokens: {} ===", tree.path())?;
        let (tokens, _) = Lexer::new(tree.text().as_str()).tokenize_all();
        for token in tokens {
            writeln!(out, "{:?} @ {}", token.kind, tree.text().line_position(token.span.start))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_output_path() {
        let mut config = DriverConfig::new(vec![PathBuf::from("src/hello.cs")]);
        assert_eq!(config.output_path(), Some(PathBuf::from("src/hello.exe")));
        config.output_kind = OutputKind::DynamicallyLinkedLibrary;
        assert_eq!(config.output_path(), Some(PathBuf::from("src/hello.dll")));
    }

    #[test]
    fn test_compilation_settings() {
        let mut config = DriverConfig::new(vec![PathBuf::from("p.cs")]);
        config.no_corlib = true;
        config.references.push(PathBuf::from("lib.dll"));
        config.suppressed.push("CS0168".to_string());
        let driver = Driver::new(config);
        let compilation = driver.compilation(Vec::new());
        assert_eq!(compilation.assembly_name(), "p.exe");
        assert_eq!(compilation.references().len(), 1);
        assert_eq!(compilation.references()[0].display(), "lib.dll");
        assert_eq!(compilation.options().suppressed, vec!["CS0168".to_string()]);
    }

    #[test]
    fn test_no_inputs_is_invalid() {
        let mut driver = Driver::new(DriverConfig::new(Vec::new()));
        let err = driver.run(&mut Vec::<u8>::new()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidArgument { .. }));
    }
}
