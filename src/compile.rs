//! Type model → schema expression.
use indexmap::IndexMap;

use crate::bind::Bindings;
use crate::error::CompileError;
use crate::model::{IndexSignature, Kind, Primitive, Property, TypeModel};
use crate::schema::Schema;

/// Compile `model` into the schema its values must satisfy.
///
/// - A node whose origin is bound to a custom predicate compiles to that
///   predicate, at any depth, with no further decomposition or wrapping.
/// - Without strict null checks every resolved expression also admits `null`.
/// - `optional` wraps the (possibly null-widened) expression last.
pub fn compile(model: &TypeModel, optional: bool, strict_null: bool, bindings: &Bindings) -> Result<Schema, CompileError> {
    if let Some(name) = model.origin.and_then(|origin| bindings.get(origin)) {
        return Ok(Schema::Custom(name.to_string()));
    }

    let core = match &model.kind {
        Kind::Primitive(Primitive::Unconstrained(_)) => return Ok(Schema::Any),
        Kind::Primitive(Primitive::String) => Schema::String,
        Kind::Primitive(Primitive::Number) => Schema::Number,
        Kind::Primitive(Primitive::Boolean) => Schema::Boolean,
        Kind::Primitive(Primitive::Null) => Schema::Null,
        Kind::Primitive(Primitive::Undefined) => Schema::Undefined,
        Kind::Literal(lit) => Schema::Literal(lit.clone()),
        Kind::Enum(variants) => {
            Schema::OneOf(variants.iter().cloned().map(Schema::Literal).collect())
        }
        Kind::Object(props) => Schema::Record {
            fields: compile_props(props, strict_null, bindings)?,
            exact: true,
        },
        Kind::ObjectWithIndex { props, index } => {
            let record = Schema::Record {
                fields: compile_props(props, strict_null, bindings)?,
                exact: false,
            };
            match compile_index(index, strict_null, bindings)? {
                Some(dict) => Schema::AllOf(vec![record, wrap(dict, false, strict_null)]),
                // numeric keys: the index half accepts anything
                None => Schema::AllOf(vec![record, Schema::Any]),
            }
        }
        Kind::Index(index) => match compile_index(index, strict_null, bindings)? {
            Some(dict) => dict,
            None => return Ok(Schema::Any),
        },
        Kind::Array(item) => Schema::list(compile(item, false, strict_null, bindings)?),
        Kind::Tuple(elems) => Schema::Tuple(compile_all(elems, strict_null, bindings)?),
        Kind::Union(alts) => Schema::OneOf(compile_all(alts, strict_null, bindings)?),
        Kind::Intersection(members) => Schema::AllOf(
            members
                .iter()
                .map(|m| compile_member(m, strict_null, bindings))
                .collect::<Result<_, _>>()?,
        ),
        Kind::Unsupported(shape) => return Err(CompileError::unsupported(shape.clone())),
    };

    Ok(wrap(core, optional, strict_null))
}

// null-widening first, then optional
fn wrap(core: Schema, optional: bool, strict_null: bool) -> Schema {
    let widened = if strict_null { core } else { Schema::nullable(core) };
    if optional { Schema::optional(widened) } else { widened }
}

fn compile_props(props: &[Property], strict_null: bool, bindings: &Bindings) -> Result<IndexMap<String, Schema>, CompileError> {
    props
        .iter()
        .map(|p| Ok((p.name.clone(), compile(&p.ty, p.optional, strict_null, bindings)?)))
        .collect()
}

fn compile_all(models: &[TypeModel], strict_null: bool, bindings: &Bindings) -> Result<Vec<Schema>, CompileError> {
    models.iter().map(|m| compile(m, false, strict_null, bindings)).collect()
}

// each intersection member describes only part of the object, so its keys
// cannot be exhaustive
fn compile_member(model: &TypeModel, strict_null: bool, bindings: &Bindings) -> Result<Schema, CompileError> {
    let bound = model.origin.and_then(|origin| bindings.get(origin)).is_some();
    match &model.kind {
        Kind::Object(props) if !bound => {
            let record = Schema::Record { fields: compile_props(props, strict_null, bindings)?, exact: false };
            Ok(wrap(record, false, strict_null))
        }
        _ => compile(model, false, strict_null, bindings),
    }
}

/// `None` when the key type is numeric: number keys have no stable JSON form.
fn compile_index(index: &IndexSignature, strict_null: bool, bindings: &Bindings) -> Result<Option<Schema>, CompileError> {
    if index.key.is_number() {
        return Ok(None);
    }
    let key = compile(&index.key, false, true, bindings)?;
    let value = compile(&index.value, false, strict_null, bindings)?;
    Ok(Some(Schema::dict(key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Erased, Literal, OriginId, UnsupportedShape};

    fn strict(model: &TypeModel) -> Schema {
        compile(model, false, true, &Bindings::default()).unwrap()
    }

    fn loose(model: &TypeModel) -> Schema {
        compile(model, false, false, &Bindings::default()).unwrap()
    }

    #[test]
    fn strict_object_is_plain_record() {
        let model = TypeModel::object(vec![Property::required("name", TypeModel::string())]);
        assert_eq!(strict(&model).to_string(), "object{name: string}");
    }

    #[test]
    fn null_widening_precedes_optional_wrapping() {
        let model = TypeModel::object(vec![Property::optional("name", TypeModel::string())]);
        assert_eq!(
            loose(&model).to_string(),
            "union(null, object{name: optional(union(null, string))})"
        );
    }

    #[test]
    fn strict_optional_field_is_only_optional() {
        let model = TypeModel::object(vec![Property::optional("n", TypeModel::number())]);
        assert_eq!(strict(&model).to_string(), "object{n: optional(number)}");
    }

    #[test]
    fn numeric_index_degrades_to_any() {
        for value in [TypeModel::string(), TypeModel::array(TypeModel::boolean()), TypeModel::null()] {
            let model = TypeModel::index(TypeModel::number(), value);
            assert_eq!(strict(&model), Schema::Any);
            assert_eq!(loose(&model), Schema::Any);
        }
    }

    #[test]
    fn string_index_key_is_always_strict() {
        let model = TypeModel::index(TypeModel::string(), TypeModel::number());
        assert_eq!(
            loose(&model).to_string(),
            "union(null, dict(string, union(null, number)))"
        );
        assert_eq!(strict(&model).to_string(), "dict(string, number)");
    }

    #[test]
    fn object_with_index_is_open_record_and_dict() {
        let model = TypeModel::object_with_index(
            vec![Property::required("fieldNumber", TypeModel::number())],
            IndexSignature::new(TypeModel::string(), TypeModel::number()),
        );
        assert_eq!(
            strict(&model).to_string(),
            "intersection(interface{fieldNumber: number}, dict(string, number))"
        );
    }

    #[test]
    fn intersection_members_are_open_records() {
        let model = TypeModel::intersection(vec![
            TypeModel::object(vec![Property::required("a", TypeModel::string())]),
            TypeModel::object(vec![Property::required("b", TypeModel::number())]),
        ]);
        assert_eq!(strict(&model).to_string(), "intersection(interface{a: string}, interface{b: number})");
        assert_eq!(
            loose(&model).to_string(),
            "union(null, intersection(union(null, interface{a: union(null, string)}), union(null, interface{b: union(null, number)})))"
        );
    }

    #[test]
    fn enum_compiles_to_one_of_literals() {
        let model = TypeModel::enumeration(vec![Literal::number(1.0), Literal::number(4.0), Literal::number(9.0)]);
        assert_eq!(strict(&model).to_string(), "union(literal(1), literal(4), literal(9))");
    }

    #[test]
    fn composites_recurse() {
        let model = TypeModel::tuple(vec![
            TypeModel::array(TypeModel::string()),
            TypeModel::union(vec![TypeModel::number(), TypeModel::undefined()]),
            TypeModel::intersection(vec![TypeModel::literal(Literal::Boolean(true))]),
        ]);
        assert_eq!(
            strict(&model).to_string(),
            "tuple(list(string), union(number, undefined), intersection(literal(true)))"
        );
    }

    #[test]
    fn erased_shapes_accept_anything_unwrapped() {
        for why in [Erased::Any, Erased::Unknown, Erased::Symbol, Erased::BigInt, Erased::TypeParameter, Erased::Callable] {
            let model = TypeModel::object(vec![Property::optional("x", TypeModel::erased(why))]);
            assert_eq!(loose(&model).to_string(), "union(null, object{x: any})");
        }
    }

    #[test]
    fn unsupported_shapes_are_fatal_even_when_nested() {
        let model = TypeModel::object(vec![Property::required(
            "inner",
            TypeModel::array(TypeModel::unsupported(UnsupportedShape::IndexedAccess)),
        )]);
        let err = compile(&model, false, true, &Bindings::default()).unwrap_err();
        assert_eq!(err, CompileError::UnsupportedTypeShape { shape: UnsupportedShape::IndexedAccess });
    }

    #[test]
    fn bound_origin_wins_at_any_depth() {
        let uuid = OriginId::new(42);
        let mut bindings = Bindings::default();
        bindings.insert(uuid, "isUuid");
        let branded = TypeModel::string().with_origin(uuid);
        let model = TypeModel::object(vec![Property::optional(
            "ids",
            TypeModel::union(vec![
                TypeModel::array(branded.clone()),
                TypeModel::object(vec![Property::required("deep", branded)]),
            ]),
        )]);
        let schema = compile(&model, false, false, &bindings).unwrap();
        let text = schema.to_string();
        assert!(text.contains("list(custom(isUuid))"), "{text}");
        assert!(text.contains("deep: custom(isUuid)"), "{text}");
        assert!(!text.contains("string"), "{text}");
    }

    #[test]
    fn bound_composite_skips_decomposition_and_wrapping() {
        let origin = OriginId::new(3);
        let mut bindings = Bindings::default();
        bindings.insert(origin, "isPoint");
        let point = TypeModel::object(vec![Property::required(
            "bad",
            TypeModel::unsupported(UnsupportedShape::Conditional),
        )])
        .with_origin(origin);
        let schema = compile(&point, true, false, &bindings).unwrap();
        assert_eq!(schema, Schema::Custom("isPoint".into()));
    }

    #[test]
    fn same_shape_different_origin_is_not_overridden() {
        let mut bindings = Bindings::default();
        bindings.insert(OriginId::new(1), "isUuid");
        let other = TypeModel::string().with_origin(OriginId::new(2));
        assert_eq!(compile(&other, false, true, &bindings).unwrap(), Schema::String);
    }
}
