//! Análisis sintáctico.
//!
//! Parser descendente recursivo con un token de lookahead. Los tokens se
//! piden al lexer de manera perezosa porque cada declaración reconocida
//! modifica la [`SymbolTable`], y esa modificación debe ser visible para
//! el siguiente término que el lexer clasifique. Por la misma razón, el
//! nombre de una declaración se registra inmediatamente después de
//! consumir su último token y antes de observar el siguiente.

use thiserror::Error;

use crate::{
    ir::*,
    lex::{Identifier, Keyword, Lexer, LexerError, Token},
    source::{InputStream, Located, Location},
    symbol::{Class, SymbolTable},
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {expected}, found {found} instead")]
    UnexpectedToken { expected: Token, found: Token },

    #[error("Expected {what}, found {found} instead")]
    Expected { what: &'static str, found: Token },

    #[error("`{0}` is already declared")]
    Redeclared(Identifier),

    #[error("Abrupt end of input")]
    UnexpectedEof,
}

/// Motivo por el cual no se obtuvo IR.
#[derive(Debug)]
pub enum ParseFailure {
    /// Hubo al menos un error léxico. Estos tienen precedencia sobre
    /// cualquier error sintáctico, el cual podría ser consecuencia de ellos.
    Lexical(Vec<Located<LexerError>>),

    /// Primer error sintáctico.
    Syntax(Located<ParserError>),
}

/// Resultado de un parsing exitoso.
#[derive(Debug)]
pub struct Parsed {
    pub declarations: Vec<Declaration>,
    pub symbols: SymbolTable,
}

/// Consume un lexer completo y construye la lista de declaraciones.
pub fn parse<S: InputStream>(lexer: Lexer<S>) -> Result<Parsed, ParseFailure> {
    let last_known = lexer.location().clone();
    let mut parser = Parser {
        lexer,
        peeked: None,
        last_known,
        lexical: Vec::new(),
    };

    let result = parser.statements();
    if result.is_err() {
        // Se buscan más errores léxicos, los cuales tendrían precedencia
        while parser.pull().is_some() {}
    }

    let Parser { lexer, lexical, .. } = parser;
    match result {
        _ if !lexical.is_empty() => Err(ParseFailure::Lexical(lexical)),
        Err(error) => Err(ParseFailure::Syntax(error)),
        Ok(declarations) => Ok(Parsed {
            declarations,
            symbols: lexer.into_symbols(),
        }),
    }
}

struct Parser<S: Iterator> {
    lexer: Lexer<S>,
    peeked: Option<Located<Token>>,
    last_known: Location,
    lexical: Vec<Located<LexerError>>,
}

type Parse<T> = Result<T, Located<ParserError>>;

impl<S: InputStream> Parser<S> {
    fn statements(&mut self) -> Parse<Vec<Declaration>> {
        let mut declarations = Vec::new();
        loop {
            declarations.push(self.statement()?);
            self.expect(Token::Semicolon)?;

            if self.peek().is_none() {
                break Ok(declarations);
            }
        }
    }

    fn statement(&mut self) -> Parse<Declaration> {
        let token = self.next()?.into_inner();
        match token {
            Token::Keyword(Keyword::Const) => self.defconst().map(Declaration::Const),
            Token::Keyword(Keyword::Enum) => self.defenum().map(Declaration::Enum),
            Token::Keyword(Keyword::Struct) => self.defstruct().map(Declaration::Struct),
            Token::Keyword(Keyword::Union) => self.union().map(Declaration::Union),
            Token::Keyword(Keyword::Typedef) => self.typedef().map(Declaration::Typedef),
            Token::Keyword(Keyword::Program) => self.program().map(Declaration::Program),

            found => self.fail(ParserError::Expected {
                what: "a declaration",
                found,
            }),
        }
    }

    fn defconst(&mut self) -> Parse<Const> {
        let name = self.declared_name()?;
        self.expect(Token::Assign)?;
        let value = self.value()?;

        let text = value.to_string();
        if self.lexer.symbols_mut().define_constant(name.val().as_str(), &text).is_err() {
            return Err(redeclared(name));
        }

        tracing::debug!(name = %name.val(), %value, "const");
        Ok(Const {
            name: name.into_inner(),
            value,
        })
    }

    fn defenum(&mut self) -> Parse<Enum> {
        let name = self.declared_name()?;
        self.expect(Token::OpenCurly)?;

        let mut values = Vec::new();
        loop {
            let member = self.declared_name()?.into_inner();
            self.expect(Token::Assign)?;
            let value = self.value()?;

            values.push(EnumMember {
                name: member,
                value,
            });

            if !self.eat(&Token::Comma) {
                self.expect(Token::CloseCurly)?;
                break;
            }
        }

        let name = self.register(name, Class::Type)?;
        tracing::debug!(%name, members = values.len(), "enum");

        Ok(Enum { name, values })
    }

    fn defstruct(&mut self) -> Parse<Struct> {
        let name = self.declared_name()?;
        self.expect(Token::OpenCurly)?;

        let mut entries = Vec::new();
        loop {
            entries.push(self.field()?);
            self.expect(Token::Semicolon)?;

            if self.eat(&Token::CloseCurly) {
                break;
            }
        }

        let name = self.register(name, Class::Type)?;
        tracing::debug!(%name, fields = entries.len(), "struct");

        Ok(Struct { name, entries })
    }

    fn typedef(&mut self) -> Parse<Typedef> {
        let ty = self.typ()?;

        // `typedef struct A *B` y `typedef T *B`
        let (name, note) = if self.eat(&Token::Times) {
            (self.declared_name()?, Note::Pointer)
        } else {
            let name = self.declared_name()?;
            (name, self.suffix()?)
        };

        let name = self.register(name, Class::Type)?;
        tracing::debug!(%name, %ty, ?note, "typedef");

        Ok(Typedef { name, ty, note })
    }

    fn union(&mut self) -> Parse<Union> {
        let name = self.declared_name()?;
        self.keyword(Keyword::Switch)?;
        self.expect(Token::OpenParen)?;
        let ty = self.typ()?;
        let discriminant_name = self.field_name()?;
        self.expect(Token::CloseParen)?;
        self.expect(Token::OpenCurly)?;

        let mut cases = Vec::new();
        loop {
            cases.push(self.case()?);

            // El `;` final es opcional antes de `}`
            self.eat(&Token::Semicolon);
            if self.eat(&Token::CloseCurly) {
                break;
            }
        }

        let name = self.register(name, Class::Type)?;
        tracing::debug!(%name, cases = cases.len(), "union");

        Ok(Union {
            name,
            discriminant: Discriminant {
                ty,
                name: discriminant_name,
            },
            cases,
        })
    }

    fn case(&mut self) -> Parse<Case> {
        let label = match self.next()?.into_inner() {
            Token::Keyword(Keyword::Case) => Label::Value(self.value()?),
            Token::Keyword(Keyword::Default) => Label::Default,
            found => {
                return self.fail(ParserError::Expected {
                    what: "`case` or `default`",
                    found,
                })
            }
        };

        self.expect(Token::Colon)?;

        let bare = Case {
            label,
            ty: None,
            name: None,
            note: Note::Raw,
        };

        // Etiqueta sin brazo, como en `case 1:` seguido de otro caso
        match self.peek() {
            None => return Ok(bare),
            Some(token) if ends_arm(token) => return Ok(bare),
            Some(_) => (),
        }

        // Tipo sin nombre, típicamente `void`
        let ty = self.typ()?;
        match self.peek() {
            Some(Token::Semicolon | Token::CloseCurly) => {
                return Ok(Case {
                    ty: Some(ty),
                    ..bare
                })
            }

            _ => (),
        }

        let field = self.field_rest(ty)?;
        Ok(Case {
            ty: Some(field.ty),
            name: Some(field.name),
            note: field.note,
            ..bare
        })
    }

    fn program(&mut self) -> Parse<Program> {
        let name = self.field_name()?;
        self.expect(Token::OpenCurly)?;

        let mut versions = Vec::new();
        loop {
            versions.push(self.version()?);
            if self.eat(&Token::CloseCurly) {
                break;
            }
        }

        self.expect(Token::Assign)?;
        let num = self.value()?;

        tracing::debug!(%name, %num, versions = versions.len(), "program");
        Ok(Program {
            name,
            num,
            versions,
        })
    }

    fn version(&mut self) -> Parse<Version> {
        self.keyword(Keyword::Version)?;
        let name = self.field_name()?;
        self.expect(Token::OpenCurly)?;

        let mut procs = Vec::new();
        loop {
            procs.push(self.procedure()?);
            if self.eat(&Token::CloseCurly) {
                break;
            }
        }

        self.expect(Token::Assign)?;
        let num = self.value()?;
        self.expect(Token::Semicolon)?;

        tracing::debug!(%name, %num, procs = procs.len(), "version");
        Ok(Version { name, num, procs })
    }

    fn procedure(&mut self) -> Parse<Procedure> {
        let res = self.typ()?;
        let name = self.field_name()?;

        self.expect(Token::OpenParen)?;
        let arg = self.typ()?;
        self.expect(Token::CloseParen)?;

        self.expect(Token::Assign)?;
        let id = self.value()?;
        self.expect(Token::Semicolon)?;

        tracing::debug!(%name, %id, %arg, %res, "procedure");
        Ok(Procedure { id, name, arg, res })
    }

    /// Declaración de campo: simple, arreglo o puntero.
    fn field(&mut self) -> Parse<Field> {
        let ty = self.typ()?;
        self.field_rest(ty)
    }

    fn field_rest(&mut self, ty: Type) -> Parse<Field> {
        if self.eat(&Token::Times) {
            let name = self.field_name()?;
            return Ok(Field {
                name,
                ty,
                note: Note::Pointer,
            });
        }

        let name = self.field_name()?;
        let note = self.suffix()?;

        Ok(Field { name, ty, note })
    }

    /// Sufijo de arreglo opcional: `[N]`, `[]`, `<N>` o `<>`.
    fn suffix(&mut self) -> Parse<Note> {
        let (fixed, close) = if self.eat(&Token::OpenSquare) {
            (true, Token::CloseSquare)
        } else if self.eat(&Token::Less) {
            (false, Token::Greater)
        } else {
            return Ok(Note::Raw);
        };

        let length = if self.eat(&close) {
            None
        } else {
            let length = self.value()?;
            self.expect(close)?;
            Some(length)
        };

        Ok(Note::Array { length, fixed })
    }

    fn typ(&mut self) -> Parse<Type> {
        use Keyword::*;

        let ty = match self.next()?.into_inner() {
            Token::TypeId(name) | Token::Id(name) => Type::Named(name),

            Token::Keyword(Int | Long) => Type::Int,
            Token::Keyword(Hyper) => Type::Hyper,
            Token::Keyword(Float) => Type::Float,
            Token::Keyword(Double) => Type::Double,
            Token::Keyword(Bool) => Type::Bool,
            Token::Keyword(String) => Type::String,
            Token::Keyword(Opaque) => Type::Opaque,
            Token::Keyword(Netobj) => Type::Netobj,
            Token::Keyword(Void) => Type::Void,

            Token::Keyword(Unsigned) => {
                if self.eat(&Token::Keyword(Hyper)) {
                    Type::UnsignedHyper
                } else {
                    if !self.eat(&Token::Keyword(Int)) {
                        self.eat(&Token::Keyword(Long));
                    }
                    Type::UnsignedInt
                }
            }

            Token::Keyword(Struct) => match self.next()?.into_inner() {
                Token::TypeId(name) | Token::Id(name) => Type::Named(name),
                found => self.fail(ParserError::Expected {
                    what: "a struct name",
                    found,
                })?,
            },

            found => self.fail(ParserError::Expected {
                what: "a type",
                found,
            })?,
        };

        Ok(ty)
    }

    /// Valor entero: literal, constante o miembro de enum.
    fn value(&mut self) -> Parse<Value> {
        match self.next()?.into_inner() {
            Token::Int(value) => Ok(value),
            Token::Id(name) => Ok(Value::Name(name)),
            found => self.fail(ParserError::Expected {
                what: "an integer or constant",
                found,
            }),
        }
    }

    /// Nombre de una declaración nueva, que aún no puede estar en la tabla.
    fn declared_name(&mut self) -> Parse<Located<Identifier>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(name) => Ok(Located::at(name, location)),
            Token::TypeId(name) | Token::Int(Value::Name(name)) => {
                Err(Located::at(ParserError::Redeclared(name), location))
            }

            found => self.fail(ParserError::Expected {
                what: "an identifier",
                found,
            }),
        }
    }

    /// Nombre de campo, discriminante, programa, versión o procedimiento.
    fn field_name(&mut self) -> Parse<Identifier> {
        match self.next()?.into_inner() {
            Token::Id(name) | Token::TypeId(name) => Ok(name),
            found => self.fail(ParserError::Expected {
                what: "an identifier",
                found,
            }),
        }
    }

    fn register(&mut self, name: Located<Identifier>, class: Class) -> Parse<Identifier> {
        match self.lexer.symbols_mut().declare(name.val().as_str(), class) {
            Ok(()) => Ok(name.into_inner()),
            Err(_) => Err(redeclared(name)),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        match self.next()?.into_inner() {
            found if found == token => Ok(()),
            found => self.fail(ParserError::UnexpectedToken {
                expected: token,
                found,
            }),
        }
    }

    /// Consume el siguiente token solo si es igual a `token`.
    fn eat(&mut self, token: &Token) -> bool {
        match self.peek() {
            Some(found) if found == token => (),
            _ => return false,
        }

        if let Some(found) = self.peeked.take() {
            self.last_known = found.location().clone();
        }

        true
    }

    fn peek(&mut self) -> Option<&Token> {
        if self.peeked.is_none() {
            self.peeked = self.pull();
        }

        self.peeked.as_ref().map(Located::val)
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        let token = match self.peeked.take() {
            Some(token) => Some(token),
            None => self.pull(),
        };

        match token {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token)
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    /// Obtiene un token del lexer, apartando los errores léxicos.
    fn pull(&mut self) -> Option<Located<Token>> {
        loop {
            match self.lexer.next()? {
                Ok(token) => break Some(token),
                Err(error) => self.lexical.push(error),
            }
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Located::at(error, self.last_known.clone()))
    }
}

fn redeclared(name: Located<Identifier>) -> Located<ParserError> {
    name.map(ParserError::Redeclared)
}

/// Tokens que cierran un caso sin brazo.
fn ends_arm(token: &Token) -> bool {
    matches!(
        token,
        Token::Semicolon
            | Token::CloseCurly
            | Token::Keyword(Keyword::Case)
            | Token::Keyword(Keyword::Default)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::consume;
    use pretty_assertions::assert_eq;

    fn parse_text(text: &str) -> Result<Parsed, ParseFailure> {
        let (start, stream) = consume(text.as_bytes(), "test.x");
        parse(Lexer::new(start, stream, SymbolTable::new()))
    }

    fn declarations(text: &str) -> Vec<Declaration> {
        parse_text(text).unwrap().declarations
    }

    fn syntax_error(text: &str) -> (String, String) {
        match parse_text(text) {
            Err(ParseFailure::Syntax(error)) => {
                (error.location().to_string(), error.val().to_string())
            }

            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    fn name(name: &str) -> Identifier {
        Identifier::from(name)
    }

    fn literal(text: &str) -> Value {
        Value::Literal(text.to_owned())
    }

    #[test]
    fn constants_and_structs() {
        let parsed = parse_text("const MAX = 10;\nstruct Point { int x; int y; };").unwrap();

        assert_eq!(
            parsed.declarations,
            vec![
                Declaration::Const(Const {
                    name: name("MAX"),
                    value: literal("10"),
                }),
                Declaration::Struct(Struct {
                    name: name("Point"),
                    entries: vec![
                        Field {
                            name: name("x"),
                            ty: Type::Int,
                            note: Note::Raw,
                        },
                        Field {
                            name: name("y"),
                            ty: Type::Int,
                            note: Note::Raw,
                        },
                    ],
                }),
            ]
        );

        assert_eq!(parsed.symbols.class_of("Point"), Some(Class::Type));
        assert_eq!(parsed.symbols.constants()["MAX"], "10");
    }

    #[test]
    fn field_shapes() {
        let text = "const N = 4;
            struct S {
                opaque id[N];
                string name<>;
                int values<16>;
                hyper pad[];
                unsigned long count;
                S *next;
            };";

        let entries = match &declarations(text)[1] {
            Declaration::Struct(decl) => decl.entries.clone(),
            other => panic!("not a struct: {:?}", other),
        };

        let notes: Vec<_> = entries.iter().map(|field| field.note.clone()).collect();
        assert_eq!(
            notes,
            vec![
                Note::Array {
                    length: Some(Value::Name(name("N"))),
                    fixed: true,
                },
                Note::Array {
                    length: None,
                    fixed: false,
                },
                Note::Array {
                    length: Some(literal("16")),
                    fixed: false,
                },
                Note::Array {
                    length: None,
                    fixed: true,
                },
                Note::Raw,
                Note::Pointer,
            ]
        );

        assert_eq!(entries[4].ty, Type::UnsignedInt);
        assert_eq!(entries[5].ty, Type::Named(name("S")));
    }

    #[test]
    fn enums_keep_member_order() {
        let decls = declarations("enum Color { RED = 0, GREEN = 1, BLUE = 2 };");
        let members: Vec<_> = match &decls[0] {
            Declaration::Enum(decl) => decl
                .values
                .iter()
                .map(|member| (member.name.to_string(), member.value.to_string()))
                .collect(),

            other => panic!("not an enum: {:?}", other),
        };

        assert_eq!(
            members,
            vec![
                ("RED".to_owned(), "0".to_owned()),
                ("GREEN".to_owned(), "1".to_owned()),
                ("BLUE".to_owned(), "2".to_owned()),
            ]
        );
    }

    #[test]
    fn union_cases() {
        let decls = declarations(
            "union Msg switch (int kind) {
                case 0: int ival;
                case 1: string sval<>;
                case 2:
                case 3: void;
                default: void
            };",
        );

        let union = match &decls[0] {
            Declaration::Union(decl) => decl.clone(),
            other => panic!("not a union: {:?}", other),
        };

        assert_eq!(union.discriminant.name, name("kind"));
        assert_eq!(union.cases.len(), 5);
        assert_eq!(union.cases[0].name, Some(name("ival")));
        assert_eq!(union.cases[2].ty, None);
        assert_eq!(union.cases[3].ty, Some(Type::Void));
        assert_eq!(union.cases[4].label, Label::Default);
    }

    #[test]
    fn typedef_forms() {
        let decls = declarations(
            "struct node { int v; };
            typedef struct node *list;
            typedef opaque hash[32];
            typedef list chain;",
        );

        assert_eq!(
            decls[1],
            Declaration::Typedef(Typedef {
                name: name("list"),
                ty: Type::Named(name("node")),
                note: Note::Pointer,
            })
        );

        assert_eq!(decls[3].name(), &name("chain"));
    }

    #[test]
    fn programs() {
        let decls = declarations(
            "program CALC { version CALCV1 { int add(int) = 1; void ping(void) = 2; } = 1; } = 100;",
        );

        let program = match &decls[0] {
            Declaration::Program(program) => program.clone(),
            other => panic!("not a program: {:?}", other),
        };

        assert_eq!(program.num, literal("100"));
        assert_eq!(program.versions[0].name, name("CALCV1"));
        assert_eq!(
            program.versions[0].procs[0],
            Procedure {
                id: literal("1"),
                name: name("add"),
                arg: Type::Int,
                res: Type::Int,
            }
        );
    }

    #[test]
    fn redeclaration_is_an_error() {
        let (location, message) = syntax_error("struct A { int x; };\nenum A { X = 1 };");
        assert_eq!(location, "test.x:2:6");
        assert_eq!(message, "`A` is already declared");

        let (_, message) = syntax_error("const A = 1;\nconst A = 2;");
        assert_eq!(message, "`A` is already declared");
    }

    #[test]
    fn empty_input_is_an_error() {
        let (location, message) = syntax_error("");
        assert_eq!(location, "test.x:1:1");
        assert_eq!(message, "Abrupt end of input");
    }

    #[test]
    fn unsigned_forms() {
        let text = "struct U { unsigned a; unsigned int b; unsigned long c; unsigned hyper d; };";
        let types: Vec<_> = match &declarations(text)[0] {
            Declaration::Struct(decl) => decl.entries.iter().map(|field| field.ty.clone()).collect(),
            other => panic!("not a struct: {:?}", other),
        };

        assert_eq!(
            types,
            vec![Type::UnsignedInt, Type::UnsignedInt, Type::UnsignedInt, Type::UnsignedHyper]
        );
    }

    #[test]
    fn syntax_errors_name_the_token() {
        let (location, message) = syntax_error("struct S { int x };");
        assert_eq!(location, "test.x:1:18");
        assert_eq!(message, "Expected `;`, found `}` instead");
    }

    #[test]
    fn lexical_errors_take_precedence() {
        match parse_text("const X = 1 $;\nstruct {") {
            Err(ParseFailure::Lexical(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected lexical errors, got {:?}", other),
        }
    }
}
