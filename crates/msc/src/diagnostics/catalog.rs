//! Diagnostic codes and their localized message templates
//!
//! Templates use `{0}`, `{1}`... placeholders filled from the diagnostic's
//! arguments at render time.

use super::Severity;

/// Culture used to render diagnostic messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Culture {
    #[default]
    Invariant,
    German,
}

impl Culture {
    /// Resolve a culture name such as `de-DE`; unknown names fall back to
    /// the invariant culture
    pub fn from_name(name: &str) -> Self {
        let language = name.split(['-', '_']).next().unwrap_or("");
        if language.eq_ignore_ascii_case("de") {
            Culture::German
        } else {
            Culture::Invariant
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Culture::Invariant => "",
            Culture::German => "de-DE",
        }
    }
}

macro_rules! error_codes {
    ($($name:ident = $id:literal, $severity:ident, $en:literal, $de:literal;)*) => {
        /// Every diagnostic the compiler can report
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum ErrorCode {
            $($name,)*
        }

        impl ErrorCode {
            /// Stable identifier, e.g. `CS0161`
            pub fn id(self) -> &'static str {
                match self {
                    $(ErrorCode::$name => $id,)*
                }
            }

            pub fn default_severity(self) -> Severity {
                match self {
                    $(ErrorCode::$name => Severity::$severity,)*
                }
            }

            pub fn template(self, culture: Culture) -> &'static str {
                match culture {
                    Culture::Invariant => match self {
                        $(ErrorCode::$name => $en,)*
                    },
                    Culture::German => match self {
                        $(ErrorCode::$name => $de,)*
                    },
                }
            }

            pub fn from_id(id: &str) -> Option<Self> {
                match id {
                    $($id => Some(ErrorCode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

error_codes! {
    // Lexical and syntax
    UnexpectedCharacter = "CS1056", Error,
        "Unexpected character '{0}'",
        "Unerwartetes Zeichen \"{0}\"";
    NewlineInConstant = "CS1010", Error,
        "Newline in constant",
        "Zeilenumbruch in Konstante";
    UnrecognizedEscape = "CS1009", Error,
        "Unrecognized escape sequence",
        "Unbekannte Escapesequenz";
    UnterminatedComment = "CS1035", Error,
        "End-of-file found, '*/' expected",
        "Dateiende gefunden, \"*/\" erwartet.";
    IntegralConstantTooLarge = "CS1021", Error,
        "Integral constant is too large",
        "Die integrale Konstante ist zu groß.";
    SemicolonExpected = "CS1002", Error,
        "; expected",
        "; erwartet.";
    SyntaxErrorExpected = "CS1003", Error,
        "Syntax error, '{0}' expected",
        "Syntaxfehler, \"{0}\" erwartet.";
    CloseParenExpected = "CS1026", Error,
        ") expected",
        ") erwartet.";
    CloseBraceExpected = "CS1513", Error,
        "} expected",
        "} erwartet.";
    OpenBraceExpected = "CS1514", Error,
        "{ expected",
        "{ erwartet.";
    IdentifierExpected = "CS1001", Error,
        "Identifier expected",
        "Bezeichner erwartet.";
    TypeExpected = "CS1031", Error,
        "Type expected",
        "Typ erwartet.";
    InvalidExprTerm = "CS1525", Error,
        "Invalid expression term '{0}'",
        "Ungültiger Ausdruckausdruck \"{0}\".";
    InvalidMemberDecl = "CS1519", Error,
        "Invalid token '{0}' in class, record, struct, or interface member declaration",
        "Ungültiges Token \"{0}\" in Klassen-, Datensatz-, Struktur- oder Schnittstellenmemberdeklaration.";
    NamespaceMemberExpected = "CS1022", Error,
        "Type or namespace definition, or end-of-file expected",
        "Typ- oder Namespacedefinition oder Dateiende erwartet.";
    DuplicateModifier = "CS1004", Error,
        "Duplicate '{0}' modifier",
        "Doppelter {0}-Modifizierer.";
    TooComplex = "CS8078", Error,
        "An expression is too long or complex to compile",
        "Ein Ausdruck ist zu lang oder zu komplex für die Kompilierung.";

    // Declarations
    DuplicateNameInNamespace = "CS0101", Error,
        "The namespace '{0}' already contains a definition for '{1}'",
        "Der Namespace \"{0}\" enthält bereits eine Definition für \"{1}\".";
    DuplicateNameInType = "CS0102", Error,
        "The type '{0}' already contains a definition for '{1}'",
        "Der Typ \"{0}\" enthält bereits eine Definition für \"{1}\".";
    MemberAlreadyExists = "CS0111", Error,
        "Type '{0}' already defines a member called '{1}' with the same parameter types",
        "Der Typ \"{0}\" definiert bereits einen Member namens \"{1}\" mit denselben Parametertypen.";
    MemberNameSameAsType = "CS0542", Error,
        "'{0}': member names cannot be the same as their enclosing type",
        "\"{0}\": Membernamen dürfen nicht mit dem sie einschließenden Typ identisch sein.";
    DuplicateParamName = "CS0100", Error,
        "The parameter name '{0}' is a duplicate",
        "Der Parametername \"{0}\" ist ein Duplikat.";
    VoidField = "CS0670", Error,
        "Field cannot have void type",
        "Feld kann keinen void-Typ haben.";
    VoidParameter = "CS1536", Error,
        "Invalid parameter type 'void'",
        "Ungültiger Parametertyp \"void\".";

    // Binding
    NotAllCodePathsReturn = "CS0161", Error,
        "'{0}': not all code paths return a value",
        "\"{0}\": Nicht alle Codepfade geben einen Wert zurück.";
    NameNotInContext = "CS0103", Error,
        "The name '{0}' does not exist in the current context",
        "Der Name \"{0}\" ist im aktuellen Kontext nicht vorhanden.";
    TypeNotFound = "CS0246", Error,
        "The type or namespace name '{0}' could not be found (are you missing a using directive or an assembly reference?)",
        "Der Typ- oder Namespacename \"{0}\" wurde nicht gefunden (möglicherweise fehlt eine using-Direktive oder ein Assemblyverweis).";
    PredefinedTypeNotFound = "CS0518", Error,
        "Predefined type '{0}' is not defined or imported",
        "Der vordefinierte Typ \"{0}\" ist nicht definiert oder importiert.";
    NoImplicitConversion = "CS0029", Error,
        "Cannot implicitly convert type '{0}' to '{1}'",
        "Der Typ \"{0}\" kann nicht implizit in \"{1}\" konvertiert werden.";
    NullToValueType = "CS0037", Error,
        "Cannot convert null to '{0}' because it is a non-nullable value type",
        "NULL kann nicht in \"{0}\" konvertiert werden, da dieser Werttyp nicht auf NULL festgelegt werden kann.";
    BadBinaryOps = "CS0019", Error,
        "Operator '{0}' cannot be applied to operands of type '{1}' and '{2}'",
        "Der {0}-Operator kann nicht auf Operanden vom Typ \"{1}\" und \"{2}\" angewendet werden.";
    BadUnaryOp = "CS0023", Error,
        "Operator '{0}' cannot be applied to operand of type '{1}'",
        "Der {0}-Operator kann nicht auf einen Operanden vom Typ \"{1}\" angewendet werden.";
    NoSuchMember = "CS0117", Error,
        "'{0}' does not contain a definition for '{1}'",
        "\"{0}\" enthält keine Definition für \"{1}\".";
    NoSuchMemberOrExtension = "CS1061", Error,
        "'{0}' does not contain a definition for '{1}' and no accessible extension method '{1}' accepting a first argument of type '{0}' could be found (are you missing a using directive or an assembly reference?)",
        "\"{0}\" enthält keine Definition für \"{1}\", und es konnte keine zugängliche {1}-Erweiterungsmethode gefunden werden, die ein erstes Argument vom Typ \"{0}\" akzeptiert (möglicherweise fehlt eine using-Direktive oder ein Assemblyverweis).";
    BadArgCount = "CS1501", Error,
        "No overload for method '{0}' takes {1} arguments",
        "Keine Überladung für die {0}-Methode nimmt {1} Argumente an.";
    BadArgType = "CS1503", Error,
        "Argument {0}: cannot convert from '{1}' to '{2}'",
        "Argument {0}: Konvertierung von \"{1}\" in \"{2}\" nicht möglich.";
    BadAccess = "CS0122", Error,
        "'{0}' is inaccessible due to its protection level",
        "Der Zugriff auf \"{0}\" ist aufgrund des Schutzgrads nicht möglich.";
    ObjectRequired = "CS0120", Error,
        "An object reference is required for the non-static field, method, or property '{0}'",
        "Für das nicht statische Feld, die Methode oder die Eigenschaft \"{0}\" ist ein Objektverweis erforderlich.";
    RetObjectRequired = "CS0126", Error,
        "An object of a type convertible to '{0}' is required",
        "Ein Objekt eines Typs, der in \"{0}\" konvertiert werden kann, ist erforderlich.";
    RetNoObjectRequired = "CS0127", Error,
        "Since '{0}' returns void, a return keyword must not be followed by an object expression",
        "Da \"{0}\" \"void\" zurückgibt, darf auf ein return-Schlüsselwort kein Objektausdruck folgen.";
    LocalDuplicate = "CS0128", Error,
        "A local variable or function named '{0}' is already defined in this scope",
        "Eine lokale Variable oder Funktion namens \"{0}\" ist bereits in diesem Bereich definiert.";
    LocalShadowsOuter = "CS0136", Error,
        "A local or parameter named '{0}' cannot be declared in this scope because that name is used in an enclosing local scope to define a local or parameter",
        "Eine lokale Variable oder ein Parameter namens \"{0}\" kann in diesem Bereich nicht deklariert werden, weil dieser Name in einem einschließenden lokalen Bereich verwendet wird, um eine lokale Variable oder einen Parameter zu definieren.";
    AssgLvalueExpected = "CS0131", Error,
        "The left-hand side of an assignment must be a variable, property or indexer",
        "Die linke Seite einer Zuweisung muss eine Variable, eine Eigenschaft oder ein Indexer sein.";
    IncrementLvalueExpected = "CS1059", Error,
        "The operand of an increment or decrement operator must be a variable, property or indexer",
        "Der Operand eines Inkrement- oder Dekrementoperators muss eine Variable, eine Eigenschaft oder ein Indexer sein.";
    AssgReadonlyProp = "CS0200", Error,
        "Property or indexer '{0}' cannot be assigned to -- it is read only",
        "Für die Eigenschaft oder den Indexer \"{0}\" ist eine Zuweisung nicht möglich. Sie sind schreibgeschützt.";
    IllegalStatement = "CS0201", Error,
        "Only assignment, call, increment, decrement, await, and new object expressions can be used as a statement",
        "Nur Zuweisungs-, Aufruf-, Inkrement-, Dekrement-, await- und new-Objektausdrücke können als Anweisung verwendet werden.";
    NoBreakOrContinue = "CS0139", Error,
        "No enclosing loop out of which to break or continue",
        "Keine einschließende Schleife, aus der der Vorgang unterbrochen oder fortgesetzt werden kann.";
    DivideByZero = "CS0020", Error,
        "Division by constant zero",
        "Division durch die Konstante 0 (null).";
    CheckedOverflow = "CS0220", Error,
        "The operation overflows at compile time in checked mode",
        "Der Vorgang verursacht einen Überlauf während der Kompilierung im geprüften Modus.";
    BadIndexLhs = "CS0021", Error,
        "Cannot apply indexing with [] to an expression of type '{0}'",
        "Eine Indizierung mit [] kann nicht auf einen Ausdruck vom Typ \"{0}\" angewendet werden.";
    MethodNameExpected = "CS0149", Error,
        "Method name expected",
        "Methodenname erwartet.";
    BadSkKnown = "CS0119", Error,
        "'{0}' is a {1}, which is not valid in the given context",
        "\"{0}\" ist ein {1} und im angegebenen Kontext nicht gültig.";
    StaticViaInstance = "CS0176", Error,
        "Member '{0}' cannot be accessed with an instance reference; qualify it with a type name instead",
        "Auf den Member \"{0}\" kann nicht mit einem Instanzverweis zugegriffen werden. Qualifizieren Sie ihn stattdessen mit einem Typnamen.";
    TypeNotInNamespace = "CS0234", Error,
        "The type or namespace name '{0}' does not exist in the namespace '{1}' (are you missing an assembly reference?)",
        "Der Typ- oder Namespacename \"{0}\" ist im Namespace \"{1}\" nicht vorhanden. (Möglicherweise fehlt ein Assemblyverweis.)";
    ImplicitlyTypedNoInit = "CS0818", Error,
        "Implicitly-typed variables must be initialized",
        "Implizit typisierte Variablen müssen initialisiert werden.";
    ImplicitlyTypedBadValue = "CS0815", Error,
        "Cannot assign {0} to an implicitly-typed variable",
        "{0} kann keiner implizit typisierten Variablen zugewiesen werden.";
    VoidLocal = "CS1547", Error,
        "Keyword 'void' cannot be used in this context",
        "Das Schlüsselwort \"void\" kann in diesem Kontext nicht verwendet werden.";

    // Entry point
    NoEntryPoint = "CS5001", Error,
        "Program does not contain a static 'Main' method suitable for an entry point",
        "Das Programm enthält keine als Einstiegspunkt geeignete statische Main-Methode.";
    MultipleEntryPoints = "CS0017", Error,
        "Program has more than one entry point defined. Compile with /main to specify the type that contains the entry point.",
        "Für das Programm wurde mehr als ein Einstiegspunkt definiert. Kompilieren Sie mit /main, um den Typ anzugeben, der den Einstiegspunkt enthält.";
    MainTypeNotFound = "CS1555", Error,
        "Could not find '{0}' specified for Main method",
        "\"{0}\", angegeben für Main-Methode, wurde nicht gefunden.";
    MainTypeNoMain = "CS1558", Error,
        "'{0}' does not have a suitable static 'Main' method",
        "\"{0}\" weist keine geeignete statische Main-Methode auf.";

    // Warnings
    UnreachableCode = "CS0162", Warning,
        "Unreachable code detected",
        "Unerreichbarer Code wurde entdeckt.";
    UnusedLocal = "CS0168", Warning,
        "The variable '{0}' is declared but never used",
        "Die Variable \"{0}\" ist deklariert, wird aber nie verwendet.";
    UnusedAssignedLocal = "CS0219", Warning,
        "The variable '{0}' is assigned but its value is never used",
        "Die Variable \"{0}\" ist zugewiesen, ihr Wert wird aber nie verwendet.";
    InvalidMainSig = "CS0028", Warning,
        "'{0}' has the wrong signature to be an entry point",
        "\"{0}\" weist die falsche Signatur für einen Einstiegspunkt auf.";

    // References and output
    MetadataFileNotFound = "CS0006", Error,
        "Metadata file '{0}' could not be found",
        "Die Metadatendatei \"{0}\" wurde nicht gefunden.";
    MetadataFileUnreadable = "CS0009", Error,
        "Metadata file '{0}' could not be opened -- {1}",
        "Die Metadatendatei \"{0}\" konnte nicht geöffnet werden -- {1}";
    DuplicateImport = "CS1704", Error,
        "An assembly with the same simple name '{0}' has already been imported. Try removing one of the references or sign them to enable side-by-side.",
        "Eine Assembly mit dem gleichen einfachen Namen \"{0}\" wurde bereits importiert. Entfernen Sie einen der Verweise, oder signieren Sie die Verweise, um eine parallele Verwendung zu ermöglichen.";
    CantWriteOutput = "CS0016", Error,
        "Could not write to output file '{0}' -- '{1}'",
        "In die Ausgabedatei \"{0}\" konnte nicht geschrieben werden -- \"{1}\"";
}

impl ErrorCode {
    /// Render the template with positional arguments
    pub fn format(self, culture: Culture, args: &[String]) -> String {
        let template = self.template(culture);
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let hole = after
                .find('}')
                .and_then(|close| after[..close].parse::<usize>().ok().map(|i| (i, close)));
            match hole {
                Some((index, close)) => {
                    out.push_str(args.get(index).map_or("", String::as_str));
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_fills_placeholders() {
        let message = ErrorCode::NotAllCodePathsReturn
            .format(Culture::Invariant, &["Program.Main(string[])".to_string()]);
        assert_eq!(message, "'Program.Main(string[])': not all code paths return a value");
    }

    #[test]
    fn test_literal_braces_survive() {
        assert_eq!(ErrorCode::OpenBraceExpected.format(Culture::Invariant, &[]), "{ expected");
        assert_eq!(ErrorCode::CloseBraceExpected.format(Culture::Invariant, &[]), "} expected");
    }

    #[test]
    fn test_ids_round_trip() {
        assert_eq!(ErrorCode::from_id("CS0161"), Some(ErrorCode::NotAllCodePathsReturn));
        assert_eq!(ErrorCode::UnreachableCode.id(), "CS0162");
        assert_eq!(ErrorCode::from_id("CS9999"), None);
    }

    #[test]
    fn test_culture_names() {
        assert_eq!(Culture::from_name("de-DE"), Culture::German);
        assert_eq!(Culture::from_name("de"), Culture::German);
        assert_eq!(Culture::from_name("fr-FR"), Culture::Invariant);
        assert_eq!(Culture::from_name(""), Culture::Invariant);
    }
}
