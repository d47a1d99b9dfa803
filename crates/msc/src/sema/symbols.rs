//! Symbol table: types and their members, from source and metadata

use std::collections::{HashMap, HashSet};

use msvm::image::TypeDef;
use msvm::{Image, TypeSig};

use super::types::{Ty, TypeId};
use crate::common::Span;
use crate::syntax::ast::PredefinedType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Internal,
    Private,
}

/// Where a symbol was declared in source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDecl {
    /// Index of the tree in the compilation
    pub tree: usize,
    pub name_span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSymbol {
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSymbol {
    pub name: String,
    pub params: Vec<ParamSymbol>,
    pub ret: Ty,
    pub is_static: bool,
    pub access: Access,
    pub decl: Option<SourceDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSymbol {
    pub name: String,
    pub ty: Ty,
    pub is_static: bool,
    pub access: Access,
    pub decl: Option<SourceDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeOrigin {
    Source(SourceDecl),
    /// Imported from the named assembly
    Metadata(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSymbol {
    pub full_name: String,
    pub access: Access,
    pub origin: TypeOrigin,
    pub methods: Vec<MethodSymbol>,
    pub fields: Vec<FieldSymbol>,
    /// Set for core library types that keywords alias
    pub special: Option<Ty>,
}

impl TypeSymbol {
    pub fn new(full_name: impl Into<String>, access: Access, origin: TypeOrigin) -> Self {
        let full_name = full_name.into();
        let special = special_type(&full_name);
        Self {
            full_name,
            access,
            origin,
            methods: Vec::new(),
            fields: Vec::new(),
            special,
        }
    }

    pub fn namespace(&self) -> &str {
        self.full_name.rsplit_once('.').map_or("", |(ns, _)| ns)
    }

    pub fn is_source(&self) -> bool {
        matches!(self.origin, TypeOrigin::Source(_))
    }

    pub fn methods_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = (usize, &'s MethodSymbol)> + 's {
        self.methods.iter().enumerate().filter(move |(_, m)| m.name == name)
    }

    pub fn field_named(&self, name: &str) -> Option<(usize, &FieldSymbol)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }
}

fn special_type(full_name: &str) -> Option<Ty> {
    Some(match full_name {
        "System.Void" => Ty::Void,
        "System.Boolean" => Ty::Bool,
        "System.Int32" => Ty::Int,
        "System.String" => Ty::String,
        "System.Object" => Ty::Object,
        _ => return None,
    })
}

/// All types visible to a compilation
#[derive(Debug, Default)]
pub struct SymbolTable {
    types: Vec<TypeSymbol>,
    by_name: HashMap<String, TypeId>,
    namespaces: HashSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type; `None` if the full name is taken
    pub fn add_type(&mut self, symbol: TypeSymbol) -> Option<TypeId> {
        if self.by_name.contains_key(&symbol.full_name) {
            return None;
        }
        let mut namespace = symbol.namespace();
        while !namespace.is_empty() {
            self.namespaces.insert(namespace.to_string());
            namespace = namespace.rsplit_once('.').map_or("", |(outer, _)| outer);
        }
        let id = TypeId(self.types.len() as u32);
        self.by_name.insert(symbol.full_name.clone(), id);
        self.types.push(symbol);
        Some(id)
    }

    pub fn get(&self, id: TypeId) -> &TypeSymbol {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeSymbol {
        &mut self.types[id.0 as usize]
    }

    pub fn lookup(&self, full_name: &str) -> Option<TypeId> {
        self.by_name.get(full_name).copied()
    }

    pub fn is_namespace(&self, name: &str) -> bool {
        self.namespaces.contains(name)
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len() as u32).map(TypeId)
    }

    /// Source types in declaration order; their position is the image type index
    pub fn source_types(&self) -> impl Iterator<Item = (TypeId, &TypeSymbol)> {
        self.ids()
            .map(|id| (id, self.get(id)))
            .filter(|(_, t)| t.is_source())
    }

    /// Image type index of a source type
    pub fn image_index(&self, id: TypeId) -> Option<u16> {
        self.source_types()
            .position(|(source, _)| source == id)
            .map(|index| index as u16)
    }

    pub fn predefined(&self, predefined: PredefinedType) -> Option<TypeId> {
        self.lookup(predefined.metadata_name())
    }

    /// Type id backing a semantic type, for member lookup
    pub fn type_of(&self, ty: &Ty) -> Option<TypeId> {
        match ty {
            Ty::Class(id) => Some(*id),
            Ty::Int => self.predefined(PredefinedType::Int),
            Ty::Bool => self.predefined(PredefinedType::Bool),
            Ty::String => self.predefined(PredefinedType::String),
            Ty::Object => self.predefined(PredefinedType::Object),
            _ => None,
        }
    }

    /// Semantic type denoted by a type symbol
    pub fn ty_of(&self, id: TypeId) -> Ty {
        self.get(id).special.clone().unwrap_or(Ty::Class(id))
    }

    /// C# spelling of a type, as used in messages
    pub fn display(&self, ty: &Ty) -> String {
        match ty {
            Ty::Void => "void".to_string(),
            Ty::Bool => "bool".to_string(),
            Ty::Int => "int".to_string(),
            Ty::String => "string".to_string(),
            Ty::Object => "object".to_string(),
            Ty::Null => "<null>".to_string(),
            Ty::Array(element) => format!("{}[]", self.display(element)),
            Ty::Class(id) => self.get(*id).full_name.clone(),
            Ty::Error => "?".to_string(),
        }
    }

    /// `Type.Method(int, string)`
    pub fn method_display(&self, id: TypeId, index: usize) -> String {
        let ty = self.get(id);
        let method = &ty.methods[index];
        let params: Vec<String> = method.params.iter().map(|p| self.display(&p.ty)).collect();
        format!("{}.{}({})", ty.full_name, method.name, params.join(", "))
    }

    pub fn field_display(&self, id: TypeId, index: usize) -> String {
        let ty = self.get(id);
        format!("{}.{}", ty.full_name, ty.fields[index].name)
    }

    pub fn sig(&self, ty: &Ty) -> TypeSig {
        ty.to_sig(&|id| self.get(id).full_name.clone())
    }

    fn ty_from_sig(&self, sig: &TypeSig) -> Ty {
        match sig {
            TypeSig::Void => Ty::Void,
            TypeSig::Bool => Ty::Bool,
            TypeSig::Int32 => Ty::Int,
            TypeSig::String => Ty::String,
            TypeSig::Object => Ty::Object,
            TypeSig::Array(element) => Ty::Array(Box::new(self.ty_from_sig(element))),
            TypeSig::Class(name) => self.lookup(name).map_or(Ty::Error, |id| self.ty_of(id)),
        }
    }

    /// Register the public types of a referenced image
    pub fn import_types(&mut self, image: &Image) {
        for def in image.types.iter().filter(|t| t.is_public()) {
            let symbol = TypeSymbol::new(
                def.name.clone(),
                Access::Public,
                TypeOrigin::Metadata(image.name.clone()),
            );
            self.add_type(symbol);
        }
    }

    /// Import method signatures once all referenced types are registered
    pub fn import_members(&mut self, image: &Image) {
        for def in image.types.iter().filter(|t| t.is_public()) {
            let Some(id) = self.lookup(&def.name) else {
                continue;
            };
            if self.get(id).origin != TypeOrigin::Metadata(image.name.clone()) {
                continue;
            }
            let methods = self.import_methods(def);
            self.get_mut(id).methods = methods;
        }
    }

    fn import_methods(&self, def: &TypeDef) -> Vec<MethodSymbol> {
        def.methods
            .iter()
            .enumerate()
            .filter(|(index, _)| def.initializer != Some(*index as u16))
            .map(|(_, m)| MethodSymbol {
                name: m.name.clone(),
                params: m
                    .params
                    .iter()
                    .enumerate()
                    .map(|(i, p)| ParamSymbol {
                        name: format!("arg{}", i),
                        ty: self.ty_from_sig(p),
                    })
                    .collect(),
                ret: self.ty_from_sig(&m.ret),
                is_static: m.is_static(),
                access: if m.is_public() { Access::Public } else { Access::Internal },
                decl: None,
            })
            .collect()
    }
}

/// Namespace context used to resolve type names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupContext {
    /// Enclosing namespace, dotted; empty for the global namespace
    pub namespace: String,
    /// Namespaces imported by using directives in scope
    pub usings: Vec<String>,
}

/// Outcome of resolving a possibly dotted name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameLookup {
    Type(TypeId),
    Namespace(String),
    NotFound,
}

impl LookupContext {
    /// Resolve a simple name: enclosing namespaces innermost first, then usings
    pub fn lookup_simple(&self, table: &SymbolTable, name: &str) -> NameLookup {
        let mut namespace = self.namespace.as_str();
        loop {
            let candidate = qualify(namespace, name);
            if let Some(id) = table.lookup(&candidate) {
                return NameLookup::Type(id);
            }
            if table.is_namespace(&candidate) {
                return NameLookup::Namespace(candidate);
            }
            if namespace.is_empty() {
                break;
            }
            namespace = namespace.rsplit_once('.').map_or("", |(outer, _)| outer);
        }
        self.usings
            .iter()
            .find_map(|using| table.lookup(&qualify(using, name)))
            .map_or(NameLookup::NotFound, NameLookup::Type)
    }

    /// Resolve `name` inside namespace `namespace`
    pub fn lookup_in(table: &SymbolTable, namespace: &str, name: &str) -> NameLookup {
        let candidate = qualify(namespace, name);
        if let Some(id) = table.lookup(&candidate) {
            NameLookup::Type(id)
        } else if table.is_namespace(&candidate) {
            NameLookup::Namespace(candidate)
        } else {
            NameLookup::NotFound
        }
    }
}

pub fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table_with_corlib() -> SymbolTable {
        let image = msvm::corlib::image();
        let mut table = SymbolTable::new();
        table.import_types(&image);
        table.import_members(&image);
        table
    }

    #[test]
    fn test_corlib_types_are_special() {
        let table = table_with_corlib();
        let int = table.predefined(PredefinedType::Int).unwrap();
        assert_eq!(table.ty_of(int), Ty::Int);
        assert_eq!(table.type_of(&Ty::Int), Some(int));
        assert!(table.is_namespace("System"));
    }

    #[test]
    fn test_corlib_methods_are_imported() {
        let table = table_with_corlib();
        let console = table.lookup("System.Console").unwrap();
        let overloads = table.get(console).methods_named("WriteLine").count();
        assert!(overloads >= 2);
    }

    #[test]
    fn test_lookup_walks_namespaces_then_usings() {
        let mut table = table_with_corlib();
        let origin = TypeOrigin::Source(SourceDecl {
            tree: 0,
            name_span: Span::default(),
        });
        let inner = table
            .add_type(TypeSymbol::new("A.B.Widget", Access::Internal, origin.clone()))
            .unwrap();
        let context = LookupContext {
            namespace: "A.B.C".to_string(),
            usings: vec!["System".to_string()],
        };
        assert_eq!(context.lookup_simple(&table, "Widget"), NameLookup::Type(inner));
        assert_eq!(
            context.lookup_simple(&table, "Console"),
            NameLookup::Type(table.lookup("System.Console").unwrap())
        );
        assert_eq!(
            context.lookup_simple(&table, "System"),
            NameLookup::Namespace("System".to_string())
        );
        assert_eq!(context.lookup_simple(&table, "Missing"), NameLookup::NotFound);
        assert!(table.add_type(TypeSymbol::new("A.B.Widget", Access::Public, origin)).is_none());
    }

    #[test]
    fn test_display() {
        let table = table_with_corlib();
        assert_eq!(table.display(&Ty::Array(Box::new(Ty::String))), "string[]");
        assert_eq!(table.display(&Ty::Null), "<null>");
    }
}
