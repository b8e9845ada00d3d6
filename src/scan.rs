//! Call-site scanner and deduplicator.
//!
//! Finds `validate<T>(data, customValidators?)` calls in a unit, compiles one
//! validator per distinct type signature, rewrites each call to invoke its
//! generated validator directly, and swaps the entry-module import for the
//! concrete runtime import.
use std::collections::HashSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, trace};

use crate::bind::{Bindings, bind};
use crate::compile::compile;
use crate::config::Options;
use crate::error::CompileError;
use crate::model::TypeModel;
use crate::module_format::runtime_import;
use crate::provider::TypeProvider;
use crate::schema::Schema;
use crate::unit::{Call, Expr, Stmt, Unit, ValidatorFn};

/// Parameter name of every generated validator function.
pub const VALIDATOR_PARAM: &str = "data";

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedValidator {
    pub name: String,
    pub signature: String,
    pub model: TypeModel,
    pub strict_null: bool,
    pub bindings: Bindings,
    pub schema: Schema,
}

/// Per-unit compiler state. Each [`UnitCompiler::compile`] starts from empty
/// state, so one instance can serve several units in turn.
pub struct UnitCompiler<'a, P: ?Sized> {
    provider: &'a P,
    options: &'a Options,
    validators: IndexMap<String, GeneratedValidator>, // by signature, registration order
    taken: HashSet<String>,
}

impl<'a, P: TypeProvider + ?Sized> UnitCompiler<'a, P> {
    pub fn new(provider: &'a P, options: &'a Options) -> Self {
        Self { provider, options, validators: IndexMap::new(), taken: HashSet::new() }
    }

    /// Validators of the last unit compiled successfully.
    pub fn validators(&self) -> impl Iterator<Item = &GeneratedValidator> {
        self.validators.values()
    }

    /// Compile every eligible call site in `unit`. On error nothing of the
    /// unit is kept; the caller still owns its original copy.
    pub fn compile(&mut self, unit: Unit) -> Result<Unit, CompileError> {
        self.validators.clear();
        self.taken.clear();
        let compiled = self.compile_fresh(unit);
        if compiled.is_err() {
            self.validators.clear();
        }
        compiled
    }

    fn compile_fresh(&mut self, mut unit: Unit) -> Result<Unit, CompileError> {
        let Some((at, local)) = self.entry_import(&unit) else {
            debug!(unit = %unit.name, "no entry import; unit left unchanged");
            return Ok(unit);
        };
        let import = runtime_import(self.options.module, &self.options.runtime_module, &self.options.runtime_binding)?;
        unit.body[at] = import;
        self.taken = unit.bound_names();

        unit.visit_calls_mut(&mut |call: &mut Call| self.rewrite(call, &local))?;

        unit.body.extend(self.validators.values().map(|generated| {
            Stmt::Validator(ValidatorFn {
                name: generated.name.clone(),
                param: VALIDATOR_PARAM.to_string(),
                schema: generated.schema.clone(),
            })
        }));
        debug!(unit = %unit.name, validators = self.validators.len(), "unit compiled");
        Ok(unit)
    }

    // statement index of the entry import and the local name `validate` is bound to
    fn entry_import(&self, unit: &Unit) -> Option<(usize, String)> {
        unit.body.iter().enumerate().find_map(|(at, stmt)| match stmt {
            Stmt::Import(decl) if decl.module == self.options.entry_module => decl
                .named
                .iter()
                .find(|spec| spec.imported == self.options.entry_name)
                .map(|spec| (at, spec.local_name().to_string())),
            _ => None,
        })
    }

    fn rewrite(&mut self, call: &mut Call, local: &str) -> Result<(), CompileError> {
        let eligible = call.callee.as_ident() == Some(local) && call.type_args.len() == 1 && !call.args.is_empty();
        if !eligible {
            return Ok(());
        }
        let type_arg = &call.type_args[0];
        let signature = self.provider.print_type(type_arg)?;

        let name = match self.validators.get(&signature) {
            Some(existing) => {
                trace!(%signature, name = %existing.name, "reusing validator");
                existing.name.clone()
            }
            None => {
                let model = self.provider.resolve_type(type_arg)?;
                let bindings = bind(self.provider, call.args.get(1));
                let strict_null = self.options.strict_null_checks;
                let schema = compile(&model, false, strict_null, &bindings)?;
                let name = self.fresh_name(local, &signature);
                debug!(%signature, %name, %schema, "validator registered");
                self.validators.insert(
                    signature.clone(),
                    GeneratedValidator { name: name.clone(), signature, model, strict_null, bindings, schema },
                );
                name
            }
        };

        let data = call.args.swap_remove(0);
        call.callee = Box::new(Expr::ident(name));
        call.type_args.clear();
        call.args = vec![data];
        Ok(())
    }

    fn fresh_name(&mut self, local: &str, signature: &str) -> String {
        let base = format!("{local}_{}", sanitize(signature));
        let mut name = base.clone();
        let mut n = 2;
        while self.taken.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        self.taken.insert(name.clone());
        name
    }
}

static NOT_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9$]+").expect("static pattern"));

/// Identifier-safe spelling of a type signature: `string[]` →
/// `stringARRAY_ENDARRAY`, `{ name: string }` → `name_string`.
pub fn sanitize(signature: &str) -> String {
    let spelled = signature
        .replace('[', "ARRAY_")
        .replace(']', "_ENDARRAY")
        .replace(',', "");
    let cleaned = NOT_IDENT.replace_all(&spelled, "_");
    match cleaned.trim_matches('_') {
        "" => "type".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Compile one unit with a fresh [`UnitCompiler`].
pub fn compile_unit<P: TypeProvider + ?Sized>(provider: &P, options: &Options, unit: Unit) -> Result<Unit, CompileError> {
    UnitCompiler::new(provider, options).compile(unit)
}

/// Independent units in parallel; results come back in input order.
pub fn compile_units<P: TypeProvider + Sync + ?Sized>(
    provider: &P,
    options: &Options,
    units: Vec<Unit>,
) -> Vec<Result<Unit, CompileError>> {
    units.into_par_iter().map(|unit| compile_unit(provider, options, unit)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::TypeTable;
    use crate::module_format::ModuleFormat;
    use crate::provider::TypeRef;
    use crate::unit::{ImportDecl, ImportSpecifier};
    use serde_json::json;

    const TYPES: &str = r#"
        type Uuid = string;
        interface TestType { name: string }
        interface User { id: Uuid; email?: string }
        interface Broken { pick: TestType["name"] }
        declare function isUuid(x: unknown): x is Uuid;
    "#;

    fn types() -> TypeTable {
        TypeTable::parse(TYPES).unwrap()
    }

    fn entry(local: Option<&str>) -> Stmt {
        Stmt::Import(ImportDecl {
            default: None,
            named: vec![ImportSpecifier { imported: "validate".into(), local: local.map(String::from) }],
            module: "guardgen".into(),
        })
    }

    fn check(callee: &str, ty: &str, args: Vec<Expr>) -> Expr {
        Expr::call(Expr::ident(callee), vec![TypeRef::new(ty)], args)
    }

    fn data() -> Expr {
        Expr::json(json!({"name": "Me"}))
    }

    fn callee_of(stmt: &Stmt) -> &str {
        match stmt {
            Stmt::Const { init: Expr::Call(call), .. } | Stmt::Expr { expr: Expr::Call(call) } => {
                call.callee.as_ident().unwrap_or_default()
            }
            other => panic!("call expected, got {other:?}"),
        }
    }

    #[test]
    fn rewrites_calls_and_replaces_entry_import() {
        let unit = Unit::new("main")
            .with(entry(None))
            .with(Stmt::Const { name: "obj".into(), init: check("validate", "TestType", vec![data()]) });
        let out = compile_unit(&types(), &Options::default(), unit).unwrap();

        assert_eq!(
            out.body[0],
            Stmt::Require(crate::unit::RequireDecl { local: "superstruct".into(), module: "superstruct".into() })
        );
        let Stmt::Const { init: Expr::Call(call), .. } = &out.body[1] else { panic!() };
        assert_eq!(call.callee.as_ident(), Some("validate_TestType"));
        assert!(call.type_args.is_empty());
        assert_eq!(call.args, vec![data()]);

        let generated = out.validator("validate_TestType").unwrap();
        assert_eq!(generated.param, VALIDATOR_PARAM);
        assert_eq!(generated.schema.to_string(), "union(null, object{name: union(null, string)})");
    }

    #[test]
    fn same_signature_is_compiled_once() {
        let unit = Unit::new("main")
            .with(entry(None))
            .with(Stmt::Const { name: "a".into(), init: check("validate", "{ name: string }", vec![data()]) })
            .with(Stmt::Const { name: "b".into(), init: check("validate", "{name:string}", vec![data()]) });
        let table = types();
        let options = Options::default();
        let mut compiler = UnitCompiler::new(&table, &options);
        let out = compiler.compile(unit).unwrap();

        assert_eq!(compiler.validators().count(), 1);
        assert_eq!(out.validators().count(), 1);
        assert_eq!(callee_of(&out.body[1]), "validate_name_string");
        assert_eq!(callee_of(&out.body[2]), "validate_name_string");
    }

    #[test]
    fn reused_compiler_starts_each_unit_empty() {
        let table = types();
        let options = Options::default();
        let mut compiler = UnitCompiler::new(&table, &options);

        let one = Unit::new("one")
            .with(entry(None))
            .with(Stmt::Expr { expr: check("validate", "TestType", vec![data()]) });
        compiler.compile(one).unwrap();

        let two = Unit::new("two")
            .with(entry(None))
            .with(Stmt::Expr { expr: check("validate", "User", vec![data()]) });
        let out = compiler.compile(two).unwrap();
        let names: Vec<_> = out.validators().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["validate_User"]);
        assert_eq!(compiler.validators().count(), 1);

        let broken = Unit::new("three")
            .with(entry(None))
            .with(Stmt::Expr { expr: check("validate", "TestType", vec![data()]) })
            .with(Stmt::Expr { expr: check("validate", "Broken", vec![data()]) });
        assert!(compiler.compile(broken).is_err());
        assert_eq!(compiler.validators().count(), 0);
    }

    #[test]
    fn follows_renamed_import_and_skips_ineligible_calls() {
        let unit = Unit::new("main")
            .with(entry(Some("check")))
            .with(Stmt::Expr { expr: check("check", "TestType", vec![data()]) })
            .with(Stmt::Expr { expr: check("validate", "TestType", vec![data()]) })
            .with(Stmt::Expr { expr: check("check", "TestType", vec![]) })
            .with(Stmt::Expr { expr: Expr::call(Expr::ident("check"), vec![], vec![data()]) });
        let out = compile_unit(&types(), &Options::default(), unit).unwrap();

        assert_eq!(callee_of(&out.body[1]), "check_TestType");
        assert_eq!(callee_of(&out.body[2]), "validate");
        assert_eq!(callee_of(&out.body[3]), "check");
        assert_eq!(callee_of(&out.body[4]), "check");
    }

    #[test]
    fn nested_calls_are_rewritten() {
        let inner = check("validate", "TestType", vec![data()]);
        let outer = check("validate", "TestType[]", vec![Expr::array(vec![inner])]);
        let unit = Unit::new("main").with(entry(None)).with(Stmt::Expr { expr: outer });
        let out = compile_unit(&types(), &Options::default(), unit).unwrap();

        let Stmt::Expr { expr: Expr::Call(call) } = &out.body[1] else { panic!() };
        assert_eq!(call.callee.as_ident(), Some("validate_TestTypeARRAY_ENDARRAY"));
        let Expr::Array { items } = &call.args[0] else { panic!() };
        assert!(matches!(&items[0], Expr::Call(c) if c.callee.as_ident() == Some("validate_TestType")));
        // children register first
        let names: Vec<_> = out.validators().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["validate_TestType", "validate_TestTypeARRAY_ENDARRAY"]);
    }

    #[test]
    fn custom_validators_override_and_are_dropped_from_call() {
        let preds = Expr::array(vec![Expr::ident("isUuid")]);
        let unit = Unit::new("main")
            .with(entry(None))
            .with(Stmt::Expr { expr: check("validate", "User", vec![data(), preds]) });
        let options = Options { strict_null_checks: true, ..Options::default() };
        let out = compile_unit(&types(), &options, unit).unwrap();

        let Stmt::Expr { expr: Expr::Call(call) } = &out.body[1] else { panic!() };
        assert_eq!(call.args.len(), 1);
        let generated = out.validator("validate_User").unwrap();
        assert_eq!(generated.schema.to_string(), "object{id: custom(isUuid), email: optional(string)}");
    }

    #[test]
    fn fresh_names_avoid_bound_identifiers() {
        let unit = Unit::new("main")
            .with(entry(None))
            .with(Stmt::Const { name: "validate_TestType".into(), init: Expr::json(json!(1)) })
            .with(Stmt::Expr { expr: check("validate", "TestType", vec![data()]) });
        let out = compile_unit(&types(), &Options::default(), unit).unwrap();
        assert_eq!(callee_of(&out.body[2]), "validate_TestType_2");
    }

    #[test]
    fn unsupported_shape_aborts_the_unit() {
        let unit = Unit::new("main")
            .with(entry(None))
            .with(Stmt::Expr { expr: check("validate", "TestType", vec![data()]) })
            .with(Stmt::Expr { expr: check("validate", "Broken", vec![data()]) });
        let err = compile_unit(&types(), &Options::default(), unit).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedTypeShape { .. }));
    }

    #[test]
    fn module_format_is_checked_only_with_an_entry_import() {
        let options = Options { module: ModuleFormat::Amd, ..Options::default() };
        let untouched = Unit::new("plain").with(Stmt::Expr { expr: check("validate", "TestType", vec![data()]) });
        assert_eq!(compile_unit(&types(), &options, untouched.clone()).unwrap(), untouched);

        let unit = Unit::new("main").with(entry(None));
        let err = compile_unit(&types(), &options, unit).unwrap_err();
        assert_eq!(err, CompileError::UnsupportedModuleFormat { format: ModuleFormat::Amd });
    }

    #[test]
    fn esm_targets_get_default_import() {
        let options = Options { module: ModuleFormat::EsNext, ..Options::default() };
        let out = compile_unit(&types(), &options, Unit::new("main").with(entry(None))).unwrap();
        let Stmt::Import(decl) = &out.body[0] else { panic!() };
        assert_eq!(decl.default.as_deref(), Some("superstruct"));
        assert_eq!(decl.module, "superstruct");
    }

    #[test]
    fn units_compile_independently_in_parallel() {
        let good = Unit::new("good")
            .with(entry(None))
            .with(Stmt::Expr { expr: check("validate", "TestType", vec![data()]) });
        let bad = Unit::new("bad")
            .with(entry(None))
            .with(Stmt::Expr { expr: check("validate", "Missing", vec![data()]) });
        let results = compile_units(&types(), &Options::default(), vec![good.clone(), bad, good]);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(CompileError::UnresolvedType { .. })));
        // no names leak between units
        assert_eq!(callee_of(&results[2].as_ref().unwrap().body[1]), "validate_TestType");
    }

    #[test]
    fn sanitizes_signatures() {
        assert_eq!(sanitize("TestType"), "TestType");
        assert_eq!(sanitize("string[]"), "stringARRAY_ENDARRAY");
        assert_eq!(sanitize("{ name: string }"), "name_string");
        assert_eq!(sanitize("[string, number]"), "ARRAY_string_number_ENDARRAY");
        assert_eq!(sanitize("{}"), "type");
    }
}
