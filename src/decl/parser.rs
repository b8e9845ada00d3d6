use crate::model::Literal;

use super::lexer::{Spanned, Token, tokenize};
use super::{Decl, DeclError, Keyword, Member, Param, ReturnType, TypeExpr, TypeParam};

/// Parse a whole declaration file.
pub fn parse_file(src: &str) -> Result<Vec<Decl>, DeclError> {
    let mut parser = Parser::new(src)?;
    let mut decls = Vec::new();
    while !parser.at_end() {
        if parser.eat(&Token::Semicolon) {
            continue;
        }
        decls.push(parser.parse_decl()?);
    }
    Ok(decls)
}

/// Parse a single type expression, e.g. a call-site type argument.
pub fn parse_type(src: &str) -> Result<TypeExpr, DeclError> {
    let mut parser = Parser::new(src)?;
    let ty = parser.parse_type()?;
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(ty)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, DeclError> {
        Ok(Self { tokens: tokenize(src)?, pos: 0, end: src.len() })
    }

    // ——— cursor ———

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, span)| span.start)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), DeclError> {
        if self.eat(token) { Ok(()) } else { Err(self.error(format!("expected {what}"))) }
    }

    fn is_word(&self, n: usize, word: &str) -> bool {
        matches!(self.peek_at(n), Some(Token::Word(w)) if w == word)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.is_word(0, word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, what: &str) -> Result<String, DeclError> {
        match self.peek() {
            Some(Token::Word(w)) => {
                let w = w.clone();
                self.pos += 1;
                Ok(w)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    // identifiers, quoted names and numeric names
    fn expect_name(&mut self, what: &str) -> Result<String, DeclError> {
        let name = match self.peek() {
            Some(Token::Word(w) | Token::Str(w)) => w.clone(),
            Some(Token::Number(n)) => crate::model::format_number(*n),
            _ => return Err(self.error(format!("expected {what}"))),
        };
        self.pos += 1;
        Ok(name)
    }

    fn error(&self, message: impl Into<String>) -> DeclError {
        let found = match self.peek() {
            Some(token) => format!("{token:?}"),
            None => "end of input".to_string(),
        };
        DeclError::new(format!("{}, found {found}", message.into()), self.offset())
    }

    // ——— declarations ———

    fn parse_decl(&mut self) -> Result<Decl, DeclError> {
        while self.eat_word("export") || self.eat_word("declare") {}

        if self.eat_word("type") {
            let name = self.expect_word("type alias name")?;
            let params = self.parse_type_params()?;
            self.expect(&Token::Assign, "`=`")?;
            let body = self.parse_type()?;
            self.eat(&Token::Semicolon);
            return Ok(Decl::Alias { name, params, body });
        }
        if self.eat_word("interface") {
            let name = self.expect_word("interface name")?;
            let params = self.parse_type_params()?;
            let mut extends = Vec::new();
            if self.eat_word("extends") {
                loop {
                    extends.push(self.parse_reference()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            let members = self.parse_members()?;
            return Ok(Decl::Interface { name, params, extends, members });
        }
        if self.is_word(0, "enum") || (self.is_word(0, "const") && self.is_word(1, "enum")) {
            self.eat_word("const");
            self.eat_word("enum");
            return self.parse_enum();
        }
        if self.eat_word("function") {
            let name = self.expect_word("function name")?;
            // generic predicates are accepted, their parameters are not tracked
            self.parse_type_params()?;
            let params = self.parse_params()?;
            self.expect(&Token::Colon, "`:` before return type")?;
            let returns = if matches!(self.peek(), Some(Token::Word(_))) && self.is_word(1, "is") {
                let param = self.expect_word("parameter name")?;
                self.eat_word("is");
                ReturnType::Predicate { param, ty: self.parse_type()? }
            } else {
                ReturnType::Type(self.parse_type()?)
            };
            self.eat(&Token::Semicolon);
            return Ok(Decl::Function { name, params, returns });
        }
        Err(self.error("expected a declaration"))
    }

    fn parse_type_params(&mut self) -> Result<Vec<TypeParam>, DeclError> {
        let mut params = Vec::new();
        if !self.eat(&Token::Less) {
            return Ok(params);
        }
        loop {
            let name = self.expect_word("type parameter")?;
            if self.eat_word("extends") {
                // constraints do not affect the structural model
                self.parse_type()?;
            }
            let default = if self.eat(&Token::Assign) { Some(self.parse_type()?) } else { None };
            params.push(TypeParam { name, default });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Greater, "`>`")?;
        Ok(params)
    }

    fn parse_enum(&mut self) -> Result<Decl, DeclError> {
        let name = self.expect_word("enum name")?;
        self.expect(&Token::LBrace, "`{`")?;
        let mut members = Vec::new();
        let mut next = Some(0.0);
        while !self.eat(&Token::RBrace) {
            let member = self.expect_name("enum member")?;
            let value = if self.eat(&Token::Assign) {
                match self.parse_literal()? {
                    Some(lit @ Literal::Number(_)) => lit,
                    Some(lit @ Literal::String(_)) => lit,
                    _ => return Err(self.error("enum initializer must be a number or string")),
                }
            } else {
                match next {
                    Some(n) => Literal::number(n),
                    None => return Err(self.error(format!("enum member `{member}` needs an initializer"))),
                }
            };
            next = match &value {
                Literal::Number(n) => Some(n.0 + 1.0),
                _ => None,
            };
            members.push((member, value));
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBrace, "`,` or `}`")?;
                break;
            }
        }
        Ok(Decl::Enum { name, members })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, DeclError> {
        self.expect(&Token::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.eat(&Token::RParen) {
            let rest = self.eat(&Token::Ellipsis);
            let name = self.expect_word("parameter name")?;
            let optional = self.eat(&Token::Question);
            let ty = if self.eat(&Token::Colon) { self.parse_type()? } else { TypeExpr::Keyword(Keyword::Any) };
            params.push(Param { name, ty, optional, rest });
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen, "`,` or `)`")?;
                break;
            }
        }
        Ok(params)
    }

    // `{ a: T; b?: U, [k: string]: V; m(x: T): U }`
    fn parse_members(&mut self) -> Result<Vec<Member>, DeclError> {
        self.expect(&Token::LBrace, "`{`")?;
        let mut members = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.eat(&Token::Semicolon) || self.eat(&Token::Comma) {
                continue;
            }
            let readonly = self.is_word(0, "readonly")
                && !matches!(self.peek_at(1), Some(Token::Colon | Token::Question | Token::LParen));
            if readonly {
                self.pos += 1;
            }

            if self.eat(&Token::LBracket) {
                let param = self.expect_word("index parameter")?;
                self.expect(&Token::Colon, "`:`")?;
                let key = self.parse_type()?;
                self.expect(&Token::RBracket, "`]`")?;
                self.expect(&Token::Colon, "`:`")?;
                let value = self.parse_type()?;
                members.push(Member::Index { param, key, value });
                continue;
            }

            let name = self.expect_name("property name")?;
            let optional = self.eat(&Token::Question);
            let ty = if self.peek() == Some(&Token::LParen) {
                let params = self.parse_params()?;
                self.expect(&Token::Colon, "`:`")?;
                TypeExpr::Function { params, ret: Box::new(self.parse_type()?) }
            } else {
                self.expect(&Token::Colon, "`:`")?;
                self.parse_type()?
            };
            members.push(Member::Property { name, ty, optional, readonly });
        }
        Ok(members)
    }

    // ——— types ———

    fn parse_type(&mut self) -> Result<TypeExpr, DeclError> {
        let check = self.parse_union()?;
        if !self.eat_word("extends") {
            return Ok(check);
        }
        let extends = self.parse_union()?;
        self.expect(&Token::Question, "`?`")?;
        let then = self.parse_type()?;
        self.expect(&Token::Colon, "`:`")?;
        let otherwise = self.parse_type()?;
        Ok(TypeExpr::Conditional {
            check: Box::new(check),
            extends: Box::new(extends),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_union(&mut self) -> Result<TypeExpr, DeclError> {
        self.eat(&Token::Pipe);
        let mut alts = vec![self.parse_intersection()?];
        while self.eat(&Token::Pipe) {
            alts.push(self.parse_intersection()?);
        }
        Ok(if alts.len() == 1 { alts.remove(0) } else { TypeExpr::Union(alts) })
    }

    fn parse_intersection(&mut self) -> Result<TypeExpr, DeclError> {
        self.eat(&Token::Amp);
        let mut members = vec![self.parse_postfix()?];
        while self.eat(&Token::Amp) {
            members.push(self.parse_postfix()?);
        }
        Ok(if members.len() == 1 { members.remove(0) } else { TypeExpr::Intersection(members) })
    }

    fn parse_postfix(&mut self) -> Result<TypeExpr, DeclError> {
        let mut ty = self.parse_primary()?;
        while self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            if self.eat(&Token::RBracket) {
                ty = TypeExpr::Array(Box::new(ty));
            } else {
                let index = self.parse_type()?;
                self.expect(&Token::RBracket, "`]`")?;
                ty = TypeExpr::IndexedAccess { object: Box::new(ty), index: Box::new(index) };
            }
        }
        Ok(ty)
    }

    fn parse_primary(&mut self) -> Result<TypeExpr, DeclError> {
        if let Some(lit) = self.parse_literal()? {
            return Ok(TypeExpr::Literal(lit));
        }
        match self.peek() {
            Some(Token::BigInt(digits)) => {
                let digits = digits.clone();
                self.pos += 1;
                Ok(TypeExpr::BigInt(digits))
            }
            Some(Token::LParen) if self.at_function_type() => {
                let params = self.parse_params()?;
                self.expect(&Token::FatArrow, "`=>`")?;
                Ok(TypeExpr::Function { params, ret: Box::new(self.parse_type()?) })
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_type()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            Some(Token::LBrace) => Ok(TypeExpr::Object(self.parse_members()?)),
            Some(Token::LBracket) => {
                self.pos += 1;
                let mut elems = Vec::new();
                while !self.eat(&Token::RBracket) {
                    elems.push(self.parse_type()?);
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBracket, "`,` or `]`")?;
                        break;
                    }
                }
                Ok(TypeExpr::Tuple(elems))
            }
            Some(Token::Word(word)) => {
                let word = word.clone();
                if word == "unique" && self.is_word(1, "symbol") {
                    self.pos += 2;
                    return Ok(TypeExpr::UniqueSymbol);
                }
                if word == "readonly" && !matches!(self.peek_at(1), Some(Token::Dot | Token::Less)) {
                    // `readonly T[]` has the same runtime shape as `T[]`
                    self.pos += 1;
                    return self.parse_postfix();
                }
                if word == "keyof" || word == "typeof" || word == "infer" {
                    return Err(self.error(format!("`{word}` types are not supported")));
                }
                if let Some(keyword) = Keyword::from_word(&word) {
                    self.pos += 1;
                    return Ok(TypeExpr::Keyword(keyword));
                }
                self.parse_reference()
            }
            _ => Err(self.error("expected a type")),
        }
    }

    fn parse_literal(&mut self) -> Result<Option<Literal>, DeclError> {
        let lit = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Str(s)), _) => Literal::String(s.clone()),
            (Some(Token::Number(n)), _) => Literal::number(*n),
            (Some(Token::Minus), Some(Token::Number(n))) => {
                let lit = Literal::number(-n);
                self.pos += 2;
                return Ok(Some(lit));
            }
            (Some(Token::Minus), _) => return Err(self.error("expected a number after `-`")),
            (Some(Token::Word(w)), _) if w == "true" || w == "false" => Literal::Boolean(w == "true"),
            _ => return Ok(None),
        };
        self.pos += 1;
        Ok(Some(lit))
    }

    fn parse_reference(&mut self) -> Result<TypeExpr, DeclError> {
        let mut name = self.expect_word("type name")?;
        while self.eat(&Token::Dot) {
            name.push('.');
            name.push_str(&self.expect_word("member name")?);
        }
        let mut args = Vec::new();
        if self.eat(&Token::Less) {
            loop {
                args.push(self.parse_type()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::Greater, "`>`")?;
        }
        Ok(TypeExpr::Ref { name, args })
    }

    // `()` `=>`, `(x:`, `(x?`, `(x,`, `(...`, `(x) =>`
    fn at_function_type(&self) -> bool {
        match (self.peek_at(1), self.peek_at(2), self.peek_at(3)) {
            (Some(Token::RParen), Some(Token::FatArrow), _) => true,
            (Some(Token::Ellipsis), _, _) => true,
            (Some(Token::Word(_)), Some(Token::Colon | Token::Question | Token::Comma), _) => true,
            (Some(Token::Word(_)), Some(Token::RParen), Some(Token::FatArrow)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(name: &str) -> TypeExpr {
        TypeExpr::Ref { name: name.into(), args: vec![] }
    }

    #[test]
    fn parses_each_declaration_form() {
        let decls = parse_file(
            r#"
            export type Pair<T = string> = [T, T];
            interface Named extends Base { name: string; nick?: string }
            const enum Dir { Up = 1, Down, Left = "L" }
            declare function isUuid(x: unknown): x is Uuid;
            "#,
        )
        .unwrap();
        let names: Vec<_> = decls.iter().map(Decl::name).collect();
        assert_eq!(names, ["Pair", "Named", "Dir", "isUuid"]);

        let Decl::Alias { params, .. } = &decls[0] else { panic!() };
        assert_eq!(params[0].default, Some(TypeExpr::Keyword(Keyword::String)));

        let Decl::Interface { extends, members, .. } = &decls[1] else { panic!() };
        assert_eq!(extends, &vec![r("Base")]);
        assert_eq!(members.len(), 2);

        let Decl::Enum { members, .. } = &decls[2] else { panic!() };
        assert_eq!(
            members,
            &vec![
                ("Up".to_string(), Literal::number(1.0)),
                ("Down".to_string(), Literal::number(2.0)),
                ("Left".to_string(), Literal::String("L".into())),
            ]
        );

        let Decl::Function { returns, .. } = &decls[3] else { panic!() };
        assert_eq!(returns, &ReturnType::Predicate { param: "x".into(), ty: r("Uuid") });
    }

    #[test]
    fn enum_members_default_from_zero() {
        let decls = parse_file("enum E { A, B, C }").unwrap();
        let Decl::Enum { members, .. } = &decls[0] else { panic!() };
        let values: Vec<_> = members.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(values, vec![Literal::number(0.0), Literal::number(1.0), Literal::number(2.0)]);
    }

    #[test]
    fn enum_member_after_string_needs_initializer() {
        assert!(parse_file(r#"enum E { A = "a", B }"#).is_err());
    }

    #[test]
    fn keywords_are_fine_property_names() {
        let ty = parse_type("{ type: string; readonly: boolean; readonly enum?: number }").unwrap();
        let TypeExpr::Object(members) = ty else { panic!() };
        let names: Vec<_> = members
            .iter()
            .map(|m| match m {
                Member::Property { name, readonly, .. } => (name.as_str(), *readonly),
                Member::Index { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(names, [("type", false), ("readonly", false), ("enum", true)]);
    }

    #[test]
    fn postfix_and_special_forms() {
        assert!(matches!(parse_type("string[][]").unwrap(), TypeExpr::Array(inner) if matches!(*inner, TypeExpr::Array(_))));
        assert!(matches!(parse_type(r#"T["k"]"#).unwrap(), TypeExpr::IndexedAccess { .. }));
        assert!(matches!(parse_type("T extends string ? 1 : 2").unwrap(), TypeExpr::Conditional { .. }));
        assert!(matches!(parse_type("(a: string) => void").unwrap(), TypeExpr::Function { .. }));
        assert!(matches!(parse_type("(string)").unwrap(), TypeExpr::Keyword(Keyword::String)));
        assert_eq!(parse_type("unique symbol").unwrap(), TypeExpr::UniqueSymbol);
        assert_eq!(parse_type("10n").unwrap(), TypeExpr::BigInt("10".into()));
        assert_eq!(parse_type("E.A").unwrap(), r("E.A"));
    }

    #[test]
    fn nested_generic_closers() {
        let ty = parse_type("Array<Array<string>>").unwrap();
        assert_eq!(ty.to_string(), "Array<Array<string>>");
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert!(parse_type("string string").is_err());
        assert!(parse_type("").is_err());
    }
}
