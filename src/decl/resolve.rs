use std::collections::HashMap;

use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::{debug, trace};

use crate::error::CompileError;
use crate::model::{Erased, IndexSignature, Kind, Literal, OriginId, Property, TypeModel, UnsupportedShape};
use crate::provider::{PredicateSignature, Returns, TypeProvider, TypeRef};

use super::{Decl, DeclError, Keyword, Member, ReturnType, TypeExpr, TypeParam, parse_file, parse_type};

/// Named declarations plus the identity each one hands out.
///
/// Intrinsic keywords take the first origins, declarations follow in source
/// order. A type alias whose body is a bare reference shares its target's
/// origin; every other alias, interface and enum is its own identity.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    decls: IndexMap<String, Decl>,
}

type Env = HashMap<String, TypeModel>;

impl TypeTable {
    pub fn parse(src: &str) -> Result<Self, DeclError> {
        Self::from_decls(parse_file(src)?)
    }

    /// Interfaces declared more than once merge their members; any other
    /// repeated name is an error.
    pub fn from_decls(decls: impl IntoIterator<Item = Decl>) -> Result<Self, DeclError> {
        let mut table = Self::default();
        for decl in decls {
            table.insert(decl)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, decl: Decl) -> Result<(), DeclError> {
        match self.decls.entry(decl.name().to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(decl);
                Ok(())
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), decl) {
                (
                    Decl::Interface { extends, members, .. },
                    Decl::Interface { extends: more_extends, members: more_members, .. },
                ) => {
                    extends.extend(more_extends);
                    members.extend(more_members);
                    Ok(())
                }
                (_, decl) => Err(DeclError::new(format!("duplicate declaration `{}`", decl.name()), 0)),
            },
        }
    }

    pub fn len(&self) -> usize { self.decls.len() }
    pub fn is_empty(&self) -> bool { self.decls.is_empty() }

    pub fn get(&self, name: &str) -> Option<&Decl> {
        self.decls.get(name)
    }

    pub fn origin_of(&self, name: &str) -> Option<OriginId> {
        let index = self.decls.get_index_of(name)?;
        Some(OriginId::new((Keyword::ALL.len() + index) as u32))
    }

    pub fn resolve(&self, expr: &TypeExpr) -> Result<TypeModel, CompileError> {
        Resolver { table: self, stack: Vec::new() }.resolve(expr, &Env::new())
    }
}

fn intrinsic_origin(keyword: Keyword) -> OriginId {
    OriginId::new(keyword as u32)
}

fn parse_reference(reference: &TypeRef) -> Result<TypeExpr, CompileError> {
    parse_type(reference.as_str()).map_err(|err| CompileError::InvalidTypeArgument {
        text: reference.to_string(),
        reason: err.to_string(),
    })
}

impl TypeProvider for TypeTable {
    fn resolve_type(&self, reference: &TypeRef) -> Result<TypeModel, CompileError> {
        let expr = parse_reference(reference)?;
        self.resolve(&expr)
    }

    fn print_type(&self, reference: &TypeRef) -> Result<String, CompileError> {
        Ok(parse_reference(reference)?.to_string())
    }

    fn predicate_signature(&self, name: &str) -> Option<PredicateSignature> {
        let Some(Decl::Function { params, returns, .. }) = self.decls.get(name) else {
            return None;
        };
        let returns = match returns {
            ReturnType::Predicate { param, ty } => match self.resolve(ty) {
                Ok(narrowed) => Returns::TypePredicate { param: param.clone(), narrowed },
                Err(err) => {
                    debug!(name, %err, "narrowed type does not resolve");
                    Returns::Other
                }
            },
            ReturnType::Type(_) => Returns::Other,
        };
        Some(PredicateSignature { params: params.iter().map(|p| p.name.clone()).collect(), returns })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RESOLUTION
// ————————————————————————————————————————————————————————————————————————————

struct Resolver<'t> {
    table: &'t TypeTable,
    stack: Vec<String>, // declarations being expanded
}

impl Resolver<'_> {
    fn resolve(&mut self, expr: &TypeExpr, env: &Env) -> Result<TypeModel, CompileError> {
        let model = match expr {
            TypeExpr::Keyword(keyword) => keyword_model(*keyword),
            TypeExpr::UniqueSymbol => TypeModel::erased(Erased::UniqueSymbol),
            TypeExpr::Literal(lit) => TypeModel::literal(lit.clone()),
            TypeExpr::BigInt(_) => TypeModel::erased(Erased::BigIntLiteral),
            TypeExpr::Function { .. } => TypeModel::erased(Erased::Callable),
            TypeExpr::IndexedAccess { .. } => TypeModel::unsupported(UnsupportedShape::IndexedAccess),
            TypeExpr::Conditional { .. } => TypeModel::unsupported(UnsupportedShape::Conditional),
            TypeExpr::Object(members) => self.object(Vec::new(), None, members, env)?,
            TypeExpr::Array(item) => TypeModel::array(self.resolve(item, env)?),
            TypeExpr::Tuple(elems) => TypeModel::tuple(self.resolve_all(elems, env)?),
            TypeExpr::Union(alts) => TypeModel::union(self.resolve_all(alts, env)?),
            TypeExpr::Intersection(members) => TypeModel::intersection(self.resolve_all(members, env)?),
            TypeExpr::Ref { name, args } => self.reference(name, args, env)?,
        };
        Ok(model)
    }

    fn resolve_all(&mut self, exprs: &[TypeExpr], env: &Env) -> Result<Vec<TypeModel>, CompileError> {
        exprs.iter().map(|e| self.resolve(e, env)).collect()
    }

    fn reference(&mut self, name: &str, args: &[TypeExpr], env: &Env) -> Result<TypeModel, CompileError> {
        if args.is_empty() {
            if let Some(bound) = env.get(name) {
                return Ok(bound.clone());
            }
        }
        if let Some((enum_name, member)) = name.split_once('.') {
            return self.enum_member(enum_name, member);
        }
        let table = self.table;
        let Some(decl) = table.decls.get(name) else {
            let args = self.resolve_all(args, env)?;
            return builtin(name, args);
        };
        if self.stack.iter().any(|open| open == name) {
            trace!(name, "recursive reference");
            return Ok(TypeModel::unsupported(UnsupportedShape::Recursive(name.to_string())));
        }
        let args = self.resolve_all(args, env)?;
        let origin = table.origin_of(name);

        let model = match decl {
            Decl::Alias { params, body, .. } => {
                let scope = self.bind_params(name, params, args)?;
                let model = self.expanding(name, |this| this.resolve(body, &scope))?;
                let forwards = matches!(body, TypeExpr::Ref { .. });
                match origin {
                    Some(origin) if params.is_empty() && !forwards => model.with_origin(origin),
                    _ => model,
                }
            }
            Decl::Interface { params, extends, members, .. } => {
                let scope = self.bind_params(name, params, args)?;
                let model = self.expanding(name, |this| this.interface(extends, members, &scope))?;
                match origin {
                    Some(origin) if params.is_empty() => model.with_origin(origin),
                    _ => model,
                }
            }
            Decl::Enum { members, .. } => {
                let model = TypeModel::enumeration(members.iter().map(|(_, value)| value.clone()).collect());
                match origin {
                    Some(origin) => model.with_origin(origin),
                    None => model,
                }
            }
            Decl::Function { .. } => {
                return Err(CompileError::UnresolvedType { name: format!("{name} (a function, not a type)") });
            }
        };
        Ok(model)
    }

    fn expanding<T>(&mut self, name: &str, f: impl FnOnce(&mut Self) -> T) -> T {
        self.stack.push(name.to_string());
        let out = f(self);
        self.stack.pop();
        out
    }

    // missing arguments fall back to the default, then to an erased parameter
    fn bind_params(&mut self, name: &str, params: &[TypeParam], args: Vec<TypeModel>) -> Result<Env, CompileError> {
        if args.len() > params.len() {
            return Err(CompileError::InvalidTypeArgument {
                text: name.to_string(),
                reason: format!("expected at most {} type arguments, found {}", params.len(), args.len()),
            });
        }
        let mut scope = Env::new();
        let mut args = args.into_iter();
        for param in params {
            let model = match (args.next(), &param.default) {
                (Some(arg), _) => arg,
                (None, Some(default)) => self.resolve(default, &scope)?,
                (None, None) => TypeModel::erased(Erased::TypeParameter),
            };
            scope.insert(param.name.clone(), model);
        }
        Ok(scope)
    }

    fn interface(&mut self, extends: &[TypeExpr], members: &[Member], env: &Env) -> Result<TypeModel, CompileError> {
        let mut props = Vec::new();
        let mut index = None;
        for base in extends {
            let model = self.resolve(base, env)?;
            match model.kind {
                Kind::Object(base_props) => merge_props(&mut props, base_props),
                Kind::ObjectWithIndex { props: base_props, index: base_index } => {
                    merge_props(&mut props, base_props);
                    index = Some(base_index);
                }
                Kind::Index(base_index) => index = Some(base_index),
                Kind::Unsupported(shape) => return Err(CompileError::unsupported(shape)),
                _ => {
                    return Err(CompileError::UnresolvedType { name: format!("{base} (not an object type)") });
                }
            }
        }
        self.object(props, index, members, env)
    }

    fn object(
        &mut self,
        mut props: Vec<Property>,
        mut index: Option<IndexSignature>,
        members: &[Member],
        env: &Env,
    ) -> Result<TypeModel, CompileError> {
        let mut own = Vec::new();
        for member in members {
            match member {
                Member::Property { name, ty, optional, .. } => {
                    let ty = self.resolve(ty, env)?;
                    own.push(Property { name: name.clone(), ty, optional: *optional });
                }
                Member::Index { key, value, .. } => {
                    let sig = IndexSignature::new(self.resolve(key, env)?, self.resolve(value, env)?);
                    // a string index constrains more than a numeric one
                    index = match index {
                        Some(existing) if !existing.key.is_number() && sig.key.is_number() => Some(existing),
                        _ => Some(sig),
                    };
                }
            }
        }
        merge_props(&mut props, own);

        Ok(match index {
            None => TypeModel::object(props),
            Some(index) if props.is_empty() => TypeModel::new(Kind::Index(index)),
            Some(index) => TypeModel::object_with_index(props, index),
        })
    }

    fn enum_member(&self, enum_name: &str, member: &str) -> Result<TypeModel, CompileError> {
        let unresolved = || CompileError::UnresolvedType { name: format!("{enum_name}.{member}") };
        let Some(Decl::Enum { members, .. }) = self.table.decls.get(enum_name) else {
            return Err(unresolved());
        };
        members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| TypeModel::literal(value.clone()))
            .ok_or_else(unresolved)
    }
}

// later properties replace earlier ones of the same name, in place
fn merge_props(props: &mut Vec<Property>, more: Vec<Property>) {
    for prop in more {
        match props.iter_mut().find(|p| p.name == prop.name) {
            Some(slot) => *slot = prop,
            None => props.push(prop),
        }
    }
}

fn keyword_model(keyword: Keyword) -> TypeModel {
    let model = match keyword {
        Keyword::String => TypeModel::string(),
        Keyword::Number => TypeModel::number(),
        Keyword::Boolean => TypeModel::boolean(),
        Keyword::Null => TypeModel::null(),
        Keyword::Undefined => TypeModel::undefined(),
        Keyword::Any => TypeModel::erased(Erased::Any),
        Keyword::Unknown => TypeModel::erased(Erased::Unknown),
        Keyword::Never => TypeModel::erased(Erased::Never),
        Keyword::Void => TypeModel::erased(Erased::Void),
        Keyword::Symbol => TypeModel::erased(Erased::Symbol),
        Keyword::BigInt => TypeModel::erased(Erased::BigInt),
        Keyword::Object => return TypeModel::unsupported(UnsupportedShape::NonPrimitive),
    };
    model.with_origin(intrinsic_origin(keyword))
}

fn builtin(name: &str, mut args: Vec<TypeModel>) -> Result<TypeModel, CompileError> {
    let arity = |expected: usize, found: usize| CompileError::InvalidTypeArgument {
        text: name.to_string(),
        reason: format!("expected {expected} type argument(s), found {found}"),
    };
    match name {
        "Array" | "ReadonlyArray" => match args.pop() {
            Some(item) if args.is_empty() => Ok(TypeModel::array(item)),
            popped => Err(arity(1, args.len() + usize::from(popped.is_some()))),
        },
        "Record" if args.len() == 2 => {
            let value = args.pop().unwrap_or_else(TypeModel::undefined);
            let key = args.pop().unwrap_or_else(TypeModel::string);
            Ok(record(key, value))
        }
        "Record" => Err(arity(2, args.len())),
        "Function" => Ok(TypeModel::erased(Erased::Callable)),
        _ => Err(CompileError::UnresolvedType { name: name.to_string() }),
    }
}

// `Record<"a" | "b", V>` is an object with exactly those keys
fn record(key: TypeModel, value: TypeModel) -> TypeModel {
    match literal_keys(&key) {
        Some(keys) => TypeModel::object(keys.into_iter().map(|k| Property::required(k, value.clone())).collect()),
        None => TypeModel::index(key, value),
    }
}

fn literal_keys(key: &TypeModel) -> Option<Vec<String>> {
    let as_key = |lit: &Literal| match lit {
        Literal::String(s) => Some(s.clone()),
        Literal::Number(_) => Some(lit.to_string()),
        Literal::Boolean(_) => None,
    };
    match &key.kind {
        Kind::Literal(lit) => Some(vec![as_key(lit)?]),
        Kind::Enum(variants) => variants.iter().map(as_key).collect(),
        Kind::Union(alts) => {
            let mut keys = Vec::new();
            for alt in alts {
                keys.extend(literal_keys(alt)?);
            }
            Some(keys)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Primitive;

    fn table(src: &str) -> TypeTable {
        TypeTable::parse(src).unwrap()
    }

    fn resolve(table: &TypeTable, text: &str) -> Result<TypeModel, CompileError> {
        table.resolve_type(&TypeRef::new(text))
    }

    fn props(model: &TypeModel) -> &[Property] {
        match &model.kind {
            Kind::Object(props) | Kind::ObjectWithIndex { props, .. } => props,
            other => panic!("object expected, got {other:?}"),
        }
    }

    #[test]
    fn aliases_carry_their_own_identity() {
        let t = table("type Uuid = string; type Id = Uuid; type A = { id: Id; name: string };");
        let a = resolve(&t, "A").unwrap();
        assert_eq!(a.origin, t.origin_of("A"));
        let fields = props(&a);
        assert_eq!(fields[0].ty.origin, t.origin_of("Uuid"));
        assert_eq!(fields[0].ty.kind, Kind::Primitive(Primitive::String));
        assert_eq!(fields[1].ty.origin, Some(intrinsic_origin(Keyword::String)));
        assert_ne!(t.origin_of("Uuid"), Some(intrinsic_origin(Keyword::String)));
    }

    #[test]
    fn interfaces_extend_and_override() {
        let t = table(
            "interface Base { id: number; tag: string }
             interface Item extends Base { tag: 'item'; extra?: boolean }",
        );
        let item = resolve(&t, "Item").unwrap();
        let names: Vec<_> = props(&item).iter().map(|p| (p.name.as_str(), p.optional)).collect();
        assert_eq!(names, [("id", false), ("tag", false), ("extra", true)]);
        assert_eq!(props(&item)[1].ty.kind, Kind::Literal(Literal::String("item".into())));
    }

    #[test]
    fn repeated_interfaces_merge() {
        let t = table("interface A { x: string } interface A { y: number }");
        assert_eq!(props(&resolve(&t, "A").unwrap()).len(), 2);
        assert!(TypeTable::parse("type A = string; type A = number;").is_err());
    }

    #[test]
    fn generics_substitute_without_identity() {
        let t = table("type Box<T, U = number> = { value: T; other: U };");
        let boxed = resolve(&t, "Box<string>").unwrap();
        assert_eq!(boxed.origin, None);
        assert_eq!(props(&boxed)[0].ty, keyword_model(Keyword::String));
        assert_eq!(props(&boxed)[1].ty, keyword_model(Keyword::Number));

        let bare = resolve(&t, "Box").unwrap();
        assert_eq!(props(&bare)[0].ty, TypeModel::erased(Erased::TypeParameter));
        assert!(resolve(&t, "Box<string, number, boolean>").is_err());
    }

    #[test]
    fn enums_and_members() {
        let t = table("enum Level { Low = 1, Mid = 4, High = 9 }");
        let level = resolve(&t, "Level").unwrap();
        assert_eq!(
            level.kind,
            Kind::Enum(vec![Literal::number(1.0), Literal::number(4.0), Literal::number(9.0)])
        );
        assert_eq!(resolve(&t, "Level.Mid").unwrap(), TypeModel::literal(Literal::number(4.0)));
        assert!(matches!(resolve(&t, "Level.Nope"), Err(CompileError::UnresolvedType { .. })));
    }

    #[test]
    fn index_signatures() {
        let t = table(
            "type Dict = { [key: string]: number };
             type Mixed = { fieldNumber: number; [key: string]: number };",
        );
        assert!(matches!(resolve(&t, "Dict").unwrap().kind, Kind::Index(_)));
        assert!(matches!(resolve(&t, "Mixed").unwrap().kind, Kind::ObjectWithIndex { .. }));
    }

    #[test]
    fn builtins() {
        let t = TypeTable::default();
        assert_eq!(resolve(&t, "Array<string>").unwrap(), resolve(&t, "string[]").unwrap());
        assert!(matches!(resolve(&t, "Record<string, number>").unwrap().kind, Kind::Index(_)));
        let keyed = resolve(&t, "Record<'a' | 'b', number>").unwrap();
        assert_eq!(props(&keyed).len(), 2);
        assert_eq!(resolve(&t, "Function").unwrap(), TypeModel::erased(Erased::Callable));
        assert!(matches!(resolve(&t, "Date"), Err(CompileError::UnresolvedType { .. })));
    }

    #[test]
    fn recursion_is_reported_as_unsupported() {
        let t = table("type List = { value: number; next: List | null };");
        let list = resolve(&t, "List").unwrap();
        let Kind::Union(alts) = &props(&list)[1].ty.kind else { panic!() };
        assert_eq!(alts[0].kind, Kind::Unsupported(UnsupportedShape::Recursive("List".into())));
    }

    #[test]
    fn erased_and_unsupported_shapes() {
        let t = table("type T = { a: string };");
        assert_eq!(resolve(&t, "() => void").unwrap().kind, TypeModel::erased(Erased::Callable).kind);
        assert_eq!(resolve(&t, "10n").unwrap().kind, TypeModel::erased(Erased::BigIntLiteral).kind);
        assert_eq!(
            resolve(&t, "T['a']").unwrap().kind,
            Kind::Unsupported(UnsupportedShape::IndexedAccess)
        );
        assert_eq!(resolve(&t, "object").unwrap().kind, Kind::Unsupported(UnsupportedShape::NonPrimitive));
    }

    #[test]
    fn predicate_signatures() {
        let t = table(
            "type Uuid = string;
             declare function isUuid(x: unknown): x is Uuid;
             declare function count(x: unknown): number;",
        );
        let sig = t.predicate_signature("isUuid").unwrap();
        assert_eq!(sig.narrowed_type().and_then(|m| m.origin), t.origin_of("Uuid"));
        assert_eq!(t.predicate_signature("count").unwrap().returns, Returns::Other);
        assert!(t.predicate_signature("Uuid").is_none());
        assert!(resolve(&t, "isUuid").is_err());
    }

    #[test]
    fn printing_is_canonical() {
        let t = TypeTable::default();
        let a = t.print_type(&TypeRef::new("{name:string}")).unwrap();
        let b = t.print_type(&TypeRef::new("{ name: string; }")).unwrap();
        assert_eq!(a, b);
        assert!(matches!(
            t.print_type(&TypeRef::new("{ name: ")),
            Err(CompileError::InvalidTypeArgument { .. })
        ));
    }
}
