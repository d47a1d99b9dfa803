//! Host runtime
//!
//! A [`Host`] loads images into memory, links their member references
//! against assemblies it already holds, and exposes reflection-style
//! lookup so callers can invoke methods by name.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, info};

use crate::corlib::{self, Console, Intrinsic, CORLIB_NAME};
use crate::image::{FieldDef, Image, ImageKind, LocalToken, MethodDef, TypeSig};
use crate::interp;
use crate::value::ArrayRef;
use crate::{LoadError, RunError, RuntimeError, RuntimeResult, Value};

/// Resolved target of a member reference
#[derive(Clone)]
pub(crate) enum CallTarget {
    Managed {
        assembly: Arc<Assembly>,
        token: LocalToken,
    },
    Native {
        intrinsic: Intrinsic,
        arity: usize,
        returns_value: bool,
    },
}

/// A loaded, linked assembly
pub struct Assembly {
    image: Image,
    strings: Vec<Arc<str>>,
    calls: Vec<CallTarget>,
    /// Native bodies of intrinsic methods, per type then method
    intrinsics: Vec<Vec<Option<Intrinsic>>>,
    statics: Mutex<Vec<Vec<Value>>>,
    console: Arc<Console>,
}

impl fmt::Debug for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field("name", &self.image.name)
            .field("kind", &self.image.kind)
            .field("types", &self.image.types.len())
            .finish()
    }
}

impl Assembly {
    fn new(image: Image, calls: Vec<CallTarget>, console: Arc<Console>) -> Self {
        let strings = image.strings.iter().map(|s| Arc::from(s.as_str())).collect();
        let intrinsics = image
            .types
            .iter()
            .map(|ty| {
                ty.methods
                    .iter()
                    .map(|m| {
                        m.is_intrinsic()
                            .then(|| corlib::lookup(&ty.name, &m.name, &m.params))
                            .flatten()
                    })
                    .collect()
            })
            .collect();
        let statics = image
            .types
            .iter()
            .map(|ty| {
                ty.fields
                    .iter()
                    .map(|f| Value::default_for(&f.ty))
                    .collect()
            })
            .collect();

        Self {
            image,
            strings,
            calls,
            intrinsics,
            statics: Mutex::new(statics),
            console,
        }
    }

    pub fn name(&self) -> &str {
        &self.image.name
    }

    pub fn kind(&self) -> ImageKind {
        self.image.kind
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub(crate) fn console(&self) -> &Console {
        &self.console
    }

    pub(crate) fn string(&self, index: usize) -> Option<Arc<str>> {
        self.strings.get(index).cloned()
    }

    pub(crate) fn call_target(&self, index: usize) -> Option<&CallTarget> {
        self.calls.get(index)
    }

    pub(crate) fn intrinsic(&self, token: LocalToken) -> Option<Intrinsic> {
        *self
            .intrinsics
            .get(token.type_index as usize)?
            .get(token.member_index as usize)?
    }

    fn statics(&self) -> MutexGuard<'_, Vec<Vec<Value>>> {
        self.statics.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn load_static(&self, token: LocalToken) -> Option<Value> {
        self.statics()
            .get(token.type_index as usize)?
            .get(token.member_index as usize)
            .cloned()
    }

    pub(crate) fn store_static(&self, token: LocalToken, value: Value) -> bool {
        match self
            .statics()
            .get_mut(token.type_index as usize)
            .and_then(|fields| fields.get_mut(token.member_index as usize))
        {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Entry point of an executable
    pub fn entry_point(self: &Arc<Self>) -> Option<MethodInfo> {
        self.image.entry_point.map(|token| MethodInfo {
            assembly: Arc::clone(self),
            token,
        })
    }

    /// Run the entry point with command-line arguments
    ///
    /// Returns the exit code: the value returned by an `int` entry point,
    /// zero otherwise.
    pub fn run_main(self: &Arc<Self>, args: &[String]) -> RuntimeResult<i32> {
        let entry = self
            .entry_point()
            .ok_or_else(|| RuntimeError::invalid(format!("'{}' has no entry point", self.name())))?;

        let mut values = Vec::new();
        if !entry.parameters().is_empty() {
            let items = args.iter().map(|a| Value::from(a.as_str())).collect();
            values.push(Value::Array(ArrayRef::from_values(TypeSig::String, items)));
        }

        Ok(entry.invoke(&values)?.as_int().unwrap_or(0))
    }

    /// Look up a type by full name, public or not
    pub fn get_type(self: &Arc<Self>, name: &str) -> Option<TypeInfo> {
        self.image.find_type(name).map(|index| TypeInfo {
            assembly: Arc::clone(self),
            index,
        })
    }

    /// All types, in definition order
    pub fn types(self: &Arc<Self>) -> Vec<TypeInfo> {
        (0..self.image.types.len())
            .map(|index| TypeInfo {
                assembly: Arc::clone(self),
                index,
            })
            .collect()
    }

    fn run_initializers(self: &Arc<Self>) -> Result<(), LoadError> {
        for (index, ty) in self.image.types.iter().enumerate() {
            let Some(init) = ty.initializer else {
                continue;
            };
            debug!("running initializer of {}", ty.name);
            let token = LocalToken::new(index as u16, init);
            interp::call(self, token, Vec::new()).map_err(|source| LoadError::Initializer {
                type_name: ty.name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Reflection view over a loaded module
pub trait Module {
    fn name(&self) -> &str;

    /// Full names of the public types
    fn exported_types(&self) -> Vec<String>;

    fn get_type(&self, name: &str) -> Option<TypeInfo>;

    /// Public method `member` of public type `type_name`
    fn get_member(&self, type_name: &str, member: &str) -> Option<MethodInfo> {
        self.get_type(type_name)
            .filter(TypeInfo::is_public)
            .and_then(|ty| ty.get_method(member))
    }
}

impl Module for Arc<Assembly> {
    fn name(&self) -> &str {
        &self.image.name
    }

    fn exported_types(&self) -> Vec<String> {
        self.image
            .types
            .iter()
            .filter(|ty| ty.is_public())
            .map(|ty| ty.name.clone())
            .collect()
    }

    fn get_type(&self, name: &str) -> Option<TypeInfo> {
        Assembly::get_type(self, name)
    }
}

/// A type inside a loaded assembly
#[derive(Debug, Clone)]
pub struct TypeInfo {
    assembly: Arc<Assembly>,
    index: usize,
}

impl TypeInfo {
    fn def(&self) -> &crate::image::TypeDef {
        &self.assembly.image.types[self.index]
    }

    pub fn full_name(&self) -> &str {
        &self.def().name
    }

    pub fn name(&self) -> &str {
        self.def().simple_name()
    }

    pub fn namespace(&self) -> &str {
        self.def().namespace()
    }

    pub fn is_public(&self) -> bool {
        self.def().is_public()
    }

    fn method_info(&self, member_index: usize) -> MethodInfo {
        MethodInfo {
            assembly: Arc::clone(&self.assembly),
            token: LocalToken::new(self.index as u16, member_index as u16),
        }
    }

    /// Declared methods, excluding the static initializer
    pub fn methods(&self) -> Vec<MethodInfo> {
        let init = self.def().initializer.map(usize::from);
        (0..self.def().methods.len())
            .filter(|&i| Some(i) != init)
            .map(|i| self.method_info(i))
            .collect()
    }

    /// First public method with this name
    pub fn get_method(&self, name: &str) -> Option<MethodInfo> {
        self.methods()
            .into_iter()
            .find(|m| m.name() == name && m.is_public())
    }

    /// Method with this name and exact parameter list, any visibility
    pub fn get_declared_method(&self, name: &str, params: &[TypeSig]) -> Option<MethodInfo> {
        let init = self.def().initializer.map(usize::from);
        self.def()
            .find_method(name, params)
            .filter(|&i| Some(i) != init)
            .map(|i| self.method_info(i))
    }

    pub fn get_field(&self, name: &str) -> Option<FieldInfo> {
        self.def()
            .fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| FieldInfo {
                assembly: Arc::clone(&self.assembly),
                token: LocalToken::new(self.index as u16, i as u16),
            })
    }
}

/// A method inside a loaded assembly
#[derive(Debug, Clone)]
pub struct MethodInfo {
    assembly: Arc<Assembly>,
    token: LocalToken,
}

impl MethodInfo {
    fn def(&self) -> &MethodDef {
        &self.assembly.image.types[self.token.type_index as usize].methods
            [self.token.member_index as usize]
    }

    pub fn name(&self) -> &str {
        &self.def().name
    }

    pub fn parameters(&self) -> &[TypeSig] {
        &self.def().params
    }

    pub fn return_type(&self) -> &TypeSig {
        &self.def().ret
    }

    pub fn is_public(&self) -> bool {
        self.def().is_public()
    }

    pub fn is_static(&self) -> bool {
        self.def().is_static()
    }

    /// `Type.Name(params)` form
    pub fn signature(&self) -> String {
        let ty = &self.assembly.image.types[self.token.type_index as usize];
        format!("{}.{}", ty.name, self.def().signature())
    }

    /// Invoke a static method
    ///
    /// Void methods return [`Value::Null`].
    pub fn invoke(&self, args: &[Value]) -> RuntimeResult<Value> {
        let method = self.def();
        if !method.is_static() {
            return Err(RuntimeError::NotStatic(self.signature()));
        }
        if args.len() != method.params.len() {
            return Err(RuntimeError::ArgumentCount {
                expected: method.params.len(),
                found: args.len(),
            });
        }
        for (index, (arg, param)) in args.iter().zip(&method.params).enumerate() {
            if !arg.conforms_to(param) {
                return Err(RuntimeError::ArgumentType {
                    index,
                    expected: param.to_string(),
                });
            }
        }

        debug!("invoke {}", self.signature());
        interp::call(&self.assembly, self.token, args.to_vec())
    }
}

/// A static field inside a loaded assembly
#[derive(Debug, Clone)]
pub struct FieldInfo {
    assembly: Arc<Assembly>,
    token: LocalToken,
}

impl FieldInfo {
    fn def(&self) -> &FieldDef {
        &self.assembly.image.types[self.token.type_index as usize].fields
            [self.token.member_index as usize]
    }

    pub fn name(&self) -> &str {
        &self.def().name
    }

    pub fn field_type(&self) -> &TypeSig {
        &self.def().ty
    }

    pub fn get_value(&self) -> Value {
        self.assembly.load_static(self.token).unwrap_or_default()
    }
}

/// Loads and links images
///
/// The core library is always present. Loading is thread safe; each
/// assembly name may be loaded once.
pub struct Host {
    assemblies: RwLock<Vec<Arc<Assembly>>>,
    console: Arc<Console>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Host {
    /// Host whose console writes to stdout
    pub fn new() -> Self {
        Self::with_console(Console::stdout())
    }

    /// Host that captures console output, see [`Host::take_output`]
    pub fn capturing() -> Self {
        Self::with_console(Console::capture())
    }

    fn with_console(console: Console) -> Self {
        let console = Arc::new(console);
        let corlib = Arc::new(Assembly::new(corlib::image(), Vec::new(), Arc::clone(&console)));
        Self {
            assemblies: RwLock::new(vec![corlib]),
            console,
        }
    }

    /// Captured console output since the last call
    pub fn take_output(&self) -> String {
        self.console.take_output()
    }

    pub fn assembly(&self, name: &str) -> Option<Arc<Assembly>> {
        self.assemblies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|a| a.name() == name)
            .cloned()
    }

    pub fn assemblies(&self) -> Vec<Arc<Assembly>> {
        self.assemblies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Decode, link and initialize an image
    pub fn load(&self, bytes: &[u8]) -> Result<Arc<Assembly>, LoadError> {
        let image = Image::from_bytes(bytes)?;
        info!("loading assembly '{}' ({} bytes)", image.name, bytes.len());

        // Hold the write lock so two loads of one name cannot both succeed.
        let mut assemblies = self.assemblies.write().unwrap_or_else(|e| e.into_inner());
        if assemblies.iter().any(|a| a.name() == image.name) {
            return Err(LoadError::AlreadyLoaded(image.name));
        }

        let calls = link(&image, &assemblies)?;
        let assembly = Arc::new(Assembly::new(image, calls, Arc::clone(&self.console)));
        assembly.run_initializers()?;

        assemblies.push(Arc::clone(&assembly));
        Ok(assembly)
    }

    /// Load an executable and run its entry point
    pub fn run(&self, bytes: &[u8], args: &[String]) -> Result<i32, RunError> {
        let assembly = self.load(bytes)?;
        Ok(assembly.run_main(args)?)
    }
}

/// Resolve every member reference of `image` against loaded assemblies
fn link(image: &Image, loaded: &[Arc<Assembly>]) -> Result<Vec<CallTarget>, LoadError> {
    for reference in &image.references {
        if !loaded.iter().any(|a| a.name() == reference) {
            return Err(LoadError::UnresolvedAssembly(reference.clone()));
        }
    }

    image
        .member_refs
        .iter()
        .map(|member| {
            let missing = || LoadError::MissingMember(member.to_string());
            let target = loaded
                .iter()
                .find(|a| a.name() == member.assembly)
                .ok_or_else(|| LoadError::UnresolvedAssembly(member.assembly.clone()))?;
            let type_index = target.image.find_type(&member.type_name).ok_or_else(missing)?;
            let ty = &target.image.types[type_index];
            let method_index = ty
                .find_method(&member.name, &member.params)
                .ok_or_else(missing)?;
            let method = &ty.methods[method_index];
            if !ty.is_public() || !method.is_public() || !method.is_static() {
                return Err(missing());
            }

            debug!("linked {}", member);
            if method.is_intrinsic() {
                let intrinsic = corlib::lookup(&ty.name, &method.name, &method.params)
                    .filter(|_| target.name() == CORLIB_NAME)
                    .ok_or_else(missing)?;
                Ok(CallTarget::Native {
                    intrinsic,
                    arity: method.params.len(),
                    returns_value: method.ret != TypeSig::Void,
                })
            } else {
                Ok(CallTarget::Managed {
                    assembly: Arc::clone(target),
                    token: LocalToken::new(type_index as u16, method_index as u16),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{flags, ImageBuilder, MemberRef, TypeDef};
    use crate::interp::MAX_CALL_DEPTH;
    use crate::OpCode;

    fn method(name: &str, flags: u8, params: Vec<TypeSig>, ret: TypeSig) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            flags,
            params,
            ret,
            locals: Vec::new(),
            max_stack: 4,
            code_offset: 0,
            code_len: 0,
        }
    }

    fn with_body(builder: &mut ImageBuilder, mut def: MethodDef, body: &[u8]) -> MethodDef {
        def.code_offset = builder.append_code(body);
        def.code_len = body.len() as u32;
        def
    }

    fn i4(op: OpCode, operand: u32) -> Vec<u8> {
        let mut bytes = vec![op as u8];
        bytes.extend_from_slice(&operand.to_le_bytes());
        bytes
    }

    /// `public class Calculator { public static object Evaluate() => 6 * 7; }`
    fn calculator() -> Vec<u8> {
        let mut builder = ImageBuilder::new("calc", ImageKind::Library);
        let mut body = i4(OpCode::LdcI4, 6);
        body.extend(i4(OpCode::LdcI4, 7));
        body.push(OpCode::Mul as u8);
        body.push(OpCode::Ret as u8);
        let evaluate = with_body(
            &mut builder,
            method("Evaluate", flags::PUBLIC | flags::STATIC, vec![], TypeSig::Object),
            &body,
        );
        let mut ty = TypeDef::new("Calculator", flags::PUBLIC);
        ty.methods.push(evaluate);
        builder.add_type(ty);
        builder.finish().to_bytes()
    }

    #[test]
    fn test_load_and_invoke_by_name() {
        let host = Host::capturing();
        let assembly = host.load(&calculator()).unwrap();
        assert_eq!(assembly.exported_types(), vec!["Calculator".to_string()]);

        let evaluate = assembly.get_member("Calculator", "Evaluate").unwrap();
        assert_eq!(evaluate.invoke(&[]).unwrap().to_string(), "42");
        assert_eq!(
            evaluate.invoke(&[Value::Int(1)]),
            Err(RuntimeError::ArgumentCount {
                expected: 0,
                found: 1
            })
        );
    }

    #[test]
    fn test_duplicate_load_is_rejected() {
        let host = Host::capturing();
        host.load(&calculator()).unwrap();
        assert!(matches!(
            host.load(&calculator()),
            Err(LoadError::AlreadyLoaded(name)) if name == "calc"
        ));
    }

    #[test]
    fn test_corlib_calls_are_linked() {
        let mut builder = ImageBuilder::new("hello", ImageKind::Executable);
        let text = builder.intern("hi");
        let write = builder.member_ref(MemberRef {
            assembly: CORLIB_NAME.to_string(),
            type_name: "System.Console".to_string(),
            name: "WriteLine".to_string(),
            params: vec![TypeSig::String],
        });
        let mut body = i4(OpCode::LdStr, text);
        body.extend(i4(OpCode::Call, write));
        body.push(OpCode::Ret as u8);
        let main = with_body(
            &mut builder,
            method("Main", flags::STATIC, vec![], TypeSig::Void),
            &body,
        );
        let mut ty = TypeDef::new("Program", 0);
        ty.methods.push(main);
        let index = builder.add_type(ty);
        builder.set_entry_point(LocalToken::new(index, 0));

        let host = Host::capturing();
        assert_eq!(host.run(&builder.finish().to_bytes(), &[]).unwrap(), 0);
        assert_eq!(host.take_output(), "hi\n");
    }

    #[test]
    fn test_unresolved_reference_fails_load() {
        let mut builder = ImageBuilder::new("app", ImageKind::Library);
        builder.member_ref(MemberRef {
            assembly: "missing".to_string(),
            type_name: "Lib".to_string(),
            name: "F".to_string(),
            params: vec![],
        });
        let host = Host::capturing();
        assert!(matches!(
            host.load(&builder.finish().to_bytes()),
            Err(LoadError::UnresolvedAssembly(name)) if name == "missing"
        ));
        assert!(host.assembly("app").is_none());
    }

    #[test]
    fn test_unbounded_recursion_overflows() {
        let mut builder = ImageBuilder::new("loop", ImageKind::Library);
        let mut body = i4(OpCode::Call, LocalToken::new(0, 0).encode());
        body.push(OpCode::Ret as u8);
        let spin = with_body(
            &mut builder,
            method("Spin", flags::PUBLIC | flags::STATIC, vec![], TypeSig::Void),
            &body,
        );
        let mut ty = TypeDef::new("Loop", flags::PUBLIC);
        ty.methods.push(spin);
        builder.add_type(ty);

        let host = Host::capturing();
        let assembly = host.load(&builder.finish().to_bytes()).unwrap();
        let spin = assembly.get_member("Loop", "Spin").unwrap();
        assert_eq!(
            spin.invoke(&[]),
            Err(RuntimeError::StackOverflow(MAX_CALL_DEPTH))
        );
    }

    /// `static int Down(int n) { if (n > 0) return Down(n - 1) + 1; return 0; }`
    fn countdown() -> Vec<u8> {
        let mut builder = ImageBuilder::new("down", ImageKind::Library);
        let load_n = [OpCode::LdArg as u8, 0, 0];
        let mut body = load_n.to_vec();
        body.extend(i4(OpCode::LdcI4, 0));
        body.push(OpCode::Cgt as u8);
        body.extend(i4(OpCode::BrTrue, 20));
        body.extend(i4(OpCode::LdcI4, 0));
        body.push(OpCode::Ret as u8);
        body.extend(load_n);
        body.extend(i4(OpCode::LdcI4, 1));
        body.push(OpCode::Sub as u8);
        body.extend(i4(OpCode::Call, LocalToken::new(0, 0).encode()));
        body.extend(i4(OpCode::LdcI4, 1));
        body.push(OpCode::Add as u8);
        body.push(OpCode::Ret as u8);
        let down = with_body(
            &mut builder,
            method(
                "Down",
                flags::PUBLIC | flags::STATIC,
                vec![TypeSig::Int32],
                TypeSig::Int32,
            ),
            &body,
        );
        let mut ty = TypeDef::new("Counter", flags::PUBLIC);
        ty.methods.push(down);
        builder.add_type(ty);
        builder.finish().to_bytes()
    }

    #[test]
    fn test_nested_calls_up_to_the_depth_limit() {
        let host = Host::capturing();
        let assembly = host.load(&countdown()).unwrap();
        let down = assembly.get_member("Counter", "Down").unwrap();
        let deepest = MAX_CALL_DEPTH as i32 - 1;
        assert_eq!(down.invoke(&[Value::Int(deepest)]), Ok(Value::Int(deepest)));
        assert_eq!(
            down.invoke(&[Value::Int(deepest + 1)]),
            Err(RuntimeError::StackOverflow(MAX_CALL_DEPTH))
        );
    }

    #[test]
    fn test_overflow_on_a_small_thread_stack() {
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024)
            .spawn(|| {
                let host = Host::capturing();
                let assembly = host.load(&countdown()).unwrap();
                let down = assembly.get_member("Counter", "Down").unwrap();
                down.invoke(&[Value::Int(100_000)])
            })
            .unwrap();
        assert_eq!(
            handle.join().unwrap(),
            Err(RuntimeError::StackOverflow(MAX_CALL_DEPTH))
        );
    }

    #[test]
    fn test_static_initializer_runs_at_load() {
        let mut builder = ImageBuilder::new("stat", ImageKind::Library);
        let field = LocalToken::new(0, 0).encode();
        let mut init = i4(OpCode::LdcI4, 5);
        init.extend(i4(OpCode::StSFld, field));
        init.push(OpCode::Ret as u8);
        let cctor = with_body(
            &mut builder,
            method(".cctor", flags::STATIC, vec![], TypeSig::Void),
            &init,
        );
        let mut ty = TypeDef::new("Counter", flags::PUBLIC);
        ty.fields.push(FieldDef {
            name: "count".to_string(),
            flags: flags::PUBLIC | flags::STATIC,
            ty: TypeSig::Int32,
        });
        ty.methods.push(cctor);
        ty.initializer = Some(0);
        builder.add_type(ty);

        let host = Host::capturing();
        let assembly = host.load(&builder.finish().to_bytes()).unwrap();
        let counter = Assembly::get_type(&assembly, "Counter").unwrap();
        assert_eq!(counter.get_field("count").unwrap().get_value(), Value::Int(5));
        assert!(counter.methods().is_empty());
    }

    #[test]
    fn test_division_by_zero_faults() {
        let mut builder = ImageBuilder::new("div", ImageKind::Library);
        let mut body = vec![OpCode::LdArg as u8, 0, 0, OpCode::LdArg as u8, 1, 0];
        body.push(OpCode::Div as u8);
        body.push(OpCode::Ret as u8);
        let div = with_body(
            &mut builder,
            method(
                "Div",
                flags::PUBLIC | flags::STATIC,
                vec![TypeSig::Int32, TypeSig::Int32],
                TypeSig::Int32,
            ),
            &body,
        );
        let mut ty = TypeDef::new("Ops", flags::PUBLIC);
        ty.methods.push(div);
        builder.add_type(ty);

        let host = Host::capturing();
        let assembly = host.load(&builder.finish().to_bytes()).unwrap();
        let div = assembly.get_member("Ops", "Div").unwrap();
        assert_eq!(div.invoke(&[Value::Int(9), Value::Int(2)]), Ok(Value::Int(4)));
        assert_eq!(
            div.invoke(&[Value::Int(1), Value::Int(0)]),
            Err(RuntimeError::DivideByZero)
        );
        assert_eq!(
            div.invoke(&[Value::Int(i32::MIN), Value::Int(-1)]),
            Err(RuntimeError::Overflow)
        );
        assert!(matches!(
            div.invoke(&[Value::str("x"), Value::Int(1)]),
            Err(RuntimeError::ArgumentType { index: 0, .. })
        ));
    }
}
