//! Runs every fixture in `fixtures/` end to end: declarations are parsed, a
//! unit with one `validate<T>(input)` call per case is compiled, and each case
//! is evaluated against the generated validator.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail, ensure};
use colored::Colorize;
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use guardgen::config::Options;
use guardgen::decl::TypeTable;
use guardgen::provider::TypeRef;
use guardgen::runtime::{self, RunError};
use guardgen::schema::Predicates;
use guardgen::unit::{Expr, ImportDecl, ImportSpecifier, Stmt, Unit};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Fixture {
    name: String,
    types: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    strict_null_checks: bool,
    #[serde(default)]
    custom_validators: Vec<String>,
    /// predicate name → regex the runtime implementation matches strings against
    #[serde(default)]
    predicates: IndexMap<String, String>,
    #[serde(default)]
    schema: Option<String>,
    /// substring of the expected compile error; the fixture must not compile
    #[serde(default)]
    compile_error: Option<String>,
    #[serde(default)]
    cases: Vec<Case>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Case {
    input: Value,
    valid: bool,
}

fn main() -> ExitCode {
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../fixtures")));

    let paths = match fixture_paths(&dir) {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let mut failed = 0usize;
    for path in &paths {
        let label = path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string());
        match load(path).and_then(|fixture| run_fixture(&fixture).map(|()| fixture.name)) {
            Ok(name) => println!("{} {label} ({name})", "ok".green()),
            Err(error) => {
                failed += 1;
                println!("{} {label}: {error:#}", "FAIL".red().bold());
            }
        }
    }

    let summary = format!("{} fixtures, {failed} failed", paths.len());
    if failed == 0 {
        println!("{}", summary.green());
        ExitCode::SUCCESS
    } else {
        println!("{}", summary.red());
        ExitCode::FAILURE
    }
}

fn fixture_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn load(path: &Path) -> Result<Fixture> {
    let src = std::fs::read_to_string(path)?;
    guardgen::path_de::from_str_with_path(&src)
}

fn run_fixture(fixture: &Fixture) -> Result<()> {
    let table = TypeTable::parse(&fixture.types).context("declarations")?;
    let options = Options { strict_null_checks: fixture.strict_null_checks, ..Options::default() };

    let custom = (!fixture.custom_validators.is_empty())
        .then(|| Expr::array(fixture.custom_validators.iter().map(|name| Expr::ident(name.as_str())).collect()));
    let mut unit = Unit::new(fixture.name.clone()).with(Stmt::Import(ImportDecl {
        default: None,
        named: vec![ImportSpecifier { imported: options.entry_name.clone(), local: None }],
        module: options.entry_module.clone(),
    }));
    for (i, case) in fixture.cases.iter().enumerate() {
        let mut args = vec![Expr::json(case.input.clone())];
        args.extend(custom.clone());
        let call = Expr::call(Expr::ident(options.entry_name.as_str()), vec![TypeRef::new(fixture.ty.as_str())], args);
        unit.body.push(Stmt::Const { name: format!("case{i}"), init: call });
    }

    let compiled = match (guardgen::compile_unit(&table, &options, unit), &fixture.compile_error) {
        (Ok(_), Some(expected)) => bail!("compiled, but expected an error containing `{expected}`"),
        (Ok(compiled), None) => compiled,
        (Err(error), Some(expected)) if error.to_string().contains(expected.as_str()) => return Ok(()),
        (Err(error), _) => bail!("compile error: {error}"),
    };

    let validators: Vec<_> = compiled.validators().cloned().collect();
    ensure!(validators.len() == 1, "expected one generated validator, got {}", validators.len());
    let validator = &validators[0];
    if let Some(expected) = &fixture.schema {
        let actual = validator.schema.to_string();
        ensure!(actual == *expected, "schema mismatch:\n  expected {expected}\n  actual   {actual}");
    }

    let mut predicates = Predicates::new();
    for (name, pattern) in &fixture.predicates {
        predicates.insert_pattern(name.clone(), Regex::new(pattern).with_context(|| format!("predicate {name}"))?);
    }

    let calls = compiled.body.iter().filter(|stmt| matches!(stmt, Stmt::Const { .. }));
    for ((i, case), call) in fixture.cases.iter().enumerate().zip(calls) {
        let single = Unit::new(format!("case{i}")).with(Stmt::Validator(validator.clone())).with(call.clone());
        match (runtime::run(&single, &predicates), case.valid) {
            (Ok(_), true) | (Err(RunError::Validation(_)), false) => {}
            (Ok(_), false) => bail!("case {i}: accepted {}", case.input),
            (Err(RunError::Validation(failure)), true) => bail!("case {i}: {failure}"),
            (Err(error), _) => bail!("case {i}: {error}"),
        }
    }
    Ok(())
}
