//! CLI: compile units, check documents against a type, print schemas, run units.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::bind::{Bindings, bind};
use crate::compile::compile;
use crate::config::Options;
use crate::decl::{self, TypeTable};
use crate::emit::Emitter;
use crate::module_format::ModuleFormat;
use crate::path_de;
use crate::provider::{TypeProvider, TypeRef};
use crate::schema::{Predicates, Schema};
use crate::unit::{Expr, Unit};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile `validate<T>(data)` call sites into concrete runtime validators
#[derive(Parser, Debug)]
#[command(name = "guardgen", version)]
pub struct CommandLineInterface {
    /// more output; repeat for more (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile units and emit JavaScript (or the rewritten unit as JSON)
    Compile(CompileOut),
    /// validate JSON documents against a declared type
    Check(CheckOut),
    /// print the schema compiled for a declared type
    Schema(SchemaOut),
    /// compile a unit and evaluate it, printing its const bindings
    Run(RunOut),
}

#[derive(Args, Debug, Clone)]
struct TypeSettings {
    /// type declaration files; literal paths or quoted glob patterns
    #[arg(long, short = 't', num_args = 1.., required = true)]
    types: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct OptionSettings {
    /// options file (JSON; flat or under `compilerOptions`)
    #[arg(long)]
    config: Option<PathBuf>,

    /// fields are not implicitly nullable
    #[arg(long, default_value_t = false)]
    strict_null_checks: bool,

    /// module format of the emitted runtime import
    #[arg(long)]
    module: Option<ModuleFormat>,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct PredicateSettings {
    /// custom validator as `name=regex`; `name` must be a declared type predicate
    #[arg(long = "predicate", value_parser = parse_predicate)]
    predicates: Vec<(String, Regex)>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Emit {
    Js,
    Json,
}

#[derive(clap::Parser, Debug)]
struct CompileOut {
    #[command(flatten)]
    types: TypeSettings,

    #[command(flatten)]
    options: OptionSettings,

    /// compilation units (JSON); literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// output directory, one file per unit (stdout if omitted)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Emit::Js)]
    emit: Emit,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    types: TypeSettings,

    #[command(flatten)]
    options: OptionSettings,

    /// type every document must satisfy
    #[arg(long = "type")]
    ty: String,

    #[command(flatten)]
    predicates: PredicateSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// only report failures
    #[arg(long, short)]
    quiet: bool,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    types: TypeSettings,

    #[command(flatten)]
    options: OptionSettings,

    #[arg(long = "type")]
    ty: String,

    /// declared type predicates to substitute for their narrowed types
    #[arg(long = "bind")]
    bind: Vec<String>,

    /// print the schema expression instead of JSON Schema
    #[arg(long)]
    expr: bool,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct RunOut {
    #[command(flatten)]
    types: TypeSettings,

    #[command(flatten)]
    options: OptionSettings,

    #[command(flatten)]
    predicates: PredicateSettings,

    /// compilation unit (JSON)
    #[arg(long)]
    unit: PathBuf,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl TypeSettings {
    fn load(&self) -> Result<TypeTable> {
        let mut decls = Vec::new();
        for path in resolve_file_path_patterns(&self.types)? {
            let src = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let parsed = decl::parse_file(&src).map_err(|err| {
                let (line, col) = err.line_col(&src);
                anyhow!("{}:{line}:{col}: {}", path.display(), err.message)
            })?;
            debug!(path = %path.display(), decls = parsed.len(), "loaded declarations");
            decls.extend(parsed);
        }
        Ok(TypeTable::from_decls(decls)?)
    }
}

impl OptionSettings {
    fn resolve(&self) -> Result<Options> {
        let mut options = match &self.config {
            Some(path) => Options::load(path)?,
            None => Options::default(),
        };
        if self.strict_null_checks {
            options.strict_null_checks = true;
        }
        if let Some(module) = self.module {
            options.module = module;
        }
        Ok(options)
    }
}

impl PredicateSettings {
    fn names(&self) -> Vec<&str> {
        self.predicates.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn runtime(&self) -> Predicates {
        let mut predicates = Predicates::new();
        for (name, pattern) in &self.predicates {
            predicates.insert_pattern(name.clone(), pattern.clone());
        }
        predicates
    }
}

impl InputSettings {
    /// Feed every selected document to `apply` along with a label naming
    /// where it came from.
    fn load_process(&self, mut apply: impl FnMut(&str, Value)) -> Result<()> {
        let source_paths = resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")?;
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {source_path_str}"))?;

            let mut documents = Vec::new();
            if self.ndjson {
                for (n, line) in source.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                    let label = format!("{source_path_str}:{}", n + 1);
                    let value = serde_json::from_str::<Value>(line)
                        .with_context(|| format!("failed to parse JSON line ({label})"))?;
                    documents.push((label, value));
                }
            } else {
                let value = serde_json::from_str::<Value>(&source)
                    .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
                documents.push((source_path_str.clone(), value));
            }

            for (label, value) in documents {
                let value = match self.json_pointer.as_deref() {
                    None => value,
                    Some(pointer) => match value.pointer(pointer) {
                        Some(node) => node.clone(),
                        None => bail!("JSON pointer {pointer} selects nothing in {label}"),
                    },
                };
                match self.jq_expr.as_ref() {
                    None => apply(&label, value),
                    Some(jq_expr) => {
                        let outputs = crate::jq_exec::run_jaq(jq_expr, &value)
                            .with_context(|| format!("failed to apply jq expression to {label}"))?;
                        for (i, output) in outputs.into_iter().enumerate() {
                            apply(&format!("{label}#{i}"), output);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn init_tracing(&self) {
        let filter = match self.verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn run(&self) -> Result<ExitCode> {
        match &self.cmd {
            Command::Compile(target) => target.run(),
            Command::Check(target) => target.run(),
            Command::Schema(target) => target.run(),
            Command::Run(target) => target.run(),
        }
    }
}

impl CompileOut {
    fn run(&self) -> Result<ExitCode> {
        let table = self.types.load()?;
        let options = self.options.resolve()?;

        let mut units = Vec::new();
        for path in resolve_file_path_patterns(&self.input)? {
            let src = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let unit: Unit = path_de::from_str_with_path(&src).with_context(|| format!("invalid unit {}", path.display()))?;
            units.push(unit);
        }
        let names: Vec<String> = units.iter().map(|u| u.name.clone()).collect();

        let emitter = Emitter { runtime_binding: &options.runtime_binding };
        let mut failures = 0usize;
        for (name, result) in names.iter().zip(crate::scan::compile_units(&table, &options, units)) {
            let unit = match result {
                Ok(unit) => unit,
                Err(error) => {
                    failures += 1;
                    eprintln!("{} {name}: {error}", "error:".red().bold());
                    continue;
                }
            };
            info!(unit = %name, validators = unit.validators().count(), "compiled");
            let (text, ext) = match self.emit {
                Emit::Js => (emitter.render(&unit), "js"),
                Emit::Json => (serde_json::to_string_pretty(&unit)?, "json"),
            };
            let out = self.out_dir.as_ref().map(|dir| dir.join(format!("{name}.{ext}")));
            write_output(out.as_deref(), &text)?;
        }
        info!(units = names.len(), failures, "done");
        Ok(exit_code(failures))
    }
}

impl CheckOut {
    fn run(&self) -> Result<ExitCode> {
        let table = self.types.load()?;
        let options = self.options.resolve()?;
        let schema = compile_type(&table, &self.ty, &self.predicates.names(), options.strict_null_checks)?;
        let predicates = self.predicates.runtime();
        let validator = schema.instantiate(&predicates)?;

        let (mut passed, mut failed) = (0usize, 0usize);
        self.input_settings.load_process(|label, value| match validator.validate(&value) {
            Ok(_) => {
                passed += 1;
                if !self.quiet {
                    println!("{} {label}", "ok".green());
                }
            }
            Err(failure) => {
                failed += 1;
                println!("{} {label}: {failure}", "FAIL".red().bold());
            }
        })?;

        let summary = format!("{passed} passed, {failed} failed");
        println!("{}", if failed == 0 { summary.green() } else { summary.red() });
        Ok(exit_code(failed))
    }
}

impl SchemaOut {
    fn run(&self) -> Result<ExitCode> {
        let table = self.types.load()?;
        let options = self.options.resolve()?;
        let names: Vec<&str> = self.bind.iter().map(String::as_str).collect();
        let schema = compile_type(&table, &self.ty, &names, options.strict_null_checks)?;
        let text = if self.expr {
            schema.to_string()
        } else {
            serde_json::to_string_pretty(&schema.to_json_schema())?
        };
        write_output(self.out.as_deref(), &text)?;
        Ok(ExitCode::SUCCESS)
    }
}

impl RunOut {
    fn run(&self) -> Result<ExitCode> {
        let table = self.types.load()?;
        let options = self.options.resolve()?;
        let src = std::fs::read_to_string(&self.unit).with_context(|| format!("failed to read {}", self.unit.display()))?;
        let unit: Unit = path_de::from_str_with_path(&src).with_context(|| format!("invalid unit {}", self.unit.display()))?;

        let compiled = crate::scan::compile_unit(&table, &options, unit)?;
        let bindings = crate::runtime::run(&compiled, &self.predicates.runtime())?;
        println!("{}", serde_json::to_string_pretty(&bindings)?);
        Ok(ExitCode::SUCCESS)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn compile_type(table: &TypeTable, ty: &str, predicate_names: &[&str], strict_null: bool) -> Result<Schema> {
    let model = table.resolve_type(&TypeRef::new(ty))?;
    let bindings = if predicate_names.is_empty() {
        Bindings::default()
    } else {
        let refs = Expr::array(predicate_names.iter().map(|name| Expr::ident(*name)).collect());
        bind(table, Some(&refs))
    };
    for name in predicate_names {
        if !bindings.iter().any(|(_, bound)| bound == *name) {
            warn!(name, "not a declared type predicate; ignored");
        }
    }
    Ok(compile(&model, false, strict_null, &bindings)?)
}

fn parse_predicate(raw: &str) -> Result<(String, Regex), String> {
    let (name, pattern) = raw.split_once('=').ok_or_else(|| format!("expected name=regex, got `{raw}`"))?;
    let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
    Ok((name.trim().to_string(), regex))
}

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, text).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn exit_code(failures: usize) -> ExitCode {
    if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{' ))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // an explicit glob that matches nothing is a mistake, not an empty input
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        CommandLineInterface::command().debug_assert();
    }

    #[test]
    fn verbosity_counts() {
        let cli = CommandLineInterface::try_parse_from(["guardgen", "-vv", "schema", "-t", "a.d.ts", "--type", "T"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn flags_override_config_defaults() {
        let cli = CommandLineInterface::try_parse_from([
            "guardgen", "compile", "-t", "types.d.ts", "-i", "unit.json", "--strict-null-checks", "--module", "esnext",
        ])
        .unwrap();
        let Command::Compile(target) = cli.cmd else { panic!() };
        let options = target.options.resolve().unwrap();
        assert!(options.strict_null_checks);
        assert_eq!(options.module, ModuleFormat::EsNext);
        assert_eq!(target.emit, Emit::Js);
    }

    #[test]
    fn predicates_parse_as_name_and_pattern() {
        let (name, re) = parse_predicate("isUuid=^[0-9a-f-]{36}$").unwrap();
        assert_eq!(name, "isUuid");
        assert!(re.is_match("0b5e1c0e-2f7a-4c1e-9d3b-6a7f8e9d0c1b"));
        assert!(parse_predicate("isUuid").is_err());
        assert!(parse_predicate("bad=(").is_err());
    }

    #[test]
    fn compiles_named_type_with_bound_predicate() {
        let table = TypeTable::parse(
            "type Uuid = string; interface User { id: Uuid } declare function isUuid(x: unknown): x is Uuid;",
        )
        .unwrap();
        let schema = compile_type(&table, "User", &["isUuid", "unknownName"], true).unwrap();
        assert_eq!(schema.to_string(), "object{id: custom(isUuid)}");
    }

    #[test]
    fn literal_paths_pass_through() {
        let paths = resolve_file_path_patterns(["a.json", "b/c.json"]).unwrap();
        assert_eq!(paths, vec![PathBuf::from("a.json"), PathBuf::from("b/c.json")]);
        assert!(resolve_file_path_patterns(["/definitely/not/here/*.json"]).is_err());
    }
}
