//! JavaScript rendering of a compiled unit, in the shape superstruct expects.
use crate::schema::Schema;
use crate::unit::{Expr, ImportDecl, Stmt, Unit, ValidatorFn};

const INDENT: &str = "    ";

/// Render the runtime binding every validator builds its `struct` from.
#[derive(Debug, Clone, Copy)]
pub struct Emitter<'a> {
    pub runtime_binding: &'a str,
}

impl Default for Emitter<'_> {
    fn default() -> Self {
        Self { runtime_binding: "superstruct" }
    }
}

/// Render with the default runtime binding.
pub fn render(unit: &Unit) -> String {
    Emitter::default().render(unit)
}

impl Emitter<'_> {
    pub fn render(&self, unit: &Unit) -> String {
        let mut out = String::new();
        for stmt in &unit.body {
            out.push_str(&self.statement(stmt));
            out.push('\n');
        }
        out
    }

    fn statement(&self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Import(decl) => import(decl),
            Stmt::Require(decl) => format!("const {} = require({});", decl.local, quote(&decl.module)),
            Stmt::Const { name, init } => format!("const {name} = {};", expr(init)),
            Stmt::Expr { expr: e } => format!("{};", expr(e)),
            Stmt::Validator(func) => format!("\n{}", self.validator(func)),
        }
    }

    fn validator(&self, func: &ValidatorFn) -> String {
        let rt = self.runtime_binding;
        let names = func.schema.predicate_names();
        let factory = if names.is_empty() {
            format!("{rt}.struct")
        } else {
            format!("{rt}.superstruct({{ types: {{ {} }} }})", names.join(", "))
        };
        let param = &func.param;
        [
            format!("function {}({param}) {{", func.name),
            format!("{INDENT}const struct = {factory};"),
            format!("{INDENT}const validator = struct({});", schema_js(&func.schema)),
            format!("{INDENT}return validator({param});"),
            "}".to_string(),
        ]
        .join("\n")
    }
}

fn import(decl: &ImportDecl) -> String {
    let mut clauses = Vec::new();
    if let Some(default) = &decl.default {
        clauses.push(default.clone());
    }
    if !decl.named.is_empty() {
        let specs: Vec<String> = decl
            .named
            .iter()
            .map(|spec| match &spec.local {
                Some(local) if *local != spec.imported => format!("{} as {local}", spec.imported),
                _ => spec.imported.clone(),
            })
            .collect();
        clauses.push(format!("{{ {} }}", specs.join(", ")));
    }
    if clauses.is_empty() {
        format!("import {};", quote(&decl.module))
    } else {
        format!("import {} from {};", clauses.join(", "), quote(&decl.module))
    }
}

pub fn expr(e: &Expr) -> String {
    match e {
        Expr::Ident { name } => name.clone(),
        Expr::Json { value } => {
            let text = value.to_string().replace('\\', "\\\\").replace('\'', "\\'");
            format!("JSON.parse('{text}')")
        }
        Expr::Array { items } => format!("[{}]", join(items.iter().map(expr))),
        Expr::Member { object, property } => format!("{}.{property}", expr(object)),
        Expr::Call(call) => {
            let type_args = if call.type_args.is_empty() {
                String::new()
            } else {
                format!("<{}>", join(call.type_args.iter().map(|t| t.to_string())))
            };
            format!("{}{type_args}({})", expr(&call.callee), join(call.args.iter().map(expr)))
        }
    }
}

/// The superstruct schema expression for `schema`.
pub fn schema_js(schema: &Schema) -> String {
    match schema {
        Schema::Any => quote("any"),
        Schema::String => quote("string"),
        Schema::Number => quote("number"),
        Schema::Boolean => quote("boolean"),
        Schema::Null => quote("null"),
        Schema::Undefined => quote("undefined"),
        Schema::Custom(name) => quote(name),
        Schema::Literal(lit) => format!("struct.literal({})", lit.to_json()),
        Schema::OneOf(xs) => format!("struct.union([{}])", join(xs.iter().map(schema_js))),
        Schema::AllOf(xs) => format!("struct.intersection([{}])", join(xs.iter().map(schema_js))),
        Schema::Tuple(xs) => format!("struct.tuple([{}])", join(xs.iter().map(schema_js))),
        Schema::Optional(x) => format!("struct.optional({})", schema_js(x)),
        Schema::List(x) => format!("[{}]", schema_js(x)),
        Schema::Dict { key, value } => format!("struct.dict([{}, {}])", schema_js(key), schema_js(value)),
        Schema::Record { fields, exact } => {
            let body = if fields.is_empty() {
                "{}".to_string()
            } else {
                let fields = fields.iter().map(|(k, v)| format!("{}: {}", property_key(k), schema_js(v)));
                format!("{{ {} }}", join(fields))
            };
            if *exact { body } else { format!("struct.interface({body})") }
        }
    }
}

fn property_key(name: &str) -> String {
    let mut chars = name.chars();
    let ident = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if ident { name.to_string() } else { quote(name) }
}

fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}
