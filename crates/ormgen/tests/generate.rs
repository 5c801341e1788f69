mod common;

use common::{customer_decls, generate_customers};
use ormgen::prelude::*;
use ormgen::{ConversionErrorKind, SchemaErrorKind, TableSource, declarations_from_json};

#[test]
fn generates_one_table_and_module_per_entity() {
    let generated = generate_customers(Dialect::Postgres);

    let names: Vec<&str> = generated.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["customers", "phones", "orders"]);
    assert_eq!(generated.modules().count(), 3);

    let phones = generated.table("Phone").unwrap();
    assert_eq!(phones.primary_key, ["id"]);
    assert_eq!(phones.foreign_keys.len(), 1);
    assert_eq!(phones.foreign_keys[0].columns, ["customer_id"]);
    assert_eq!(phones.foreign_keys[0].referenced_table, "customers");

    let module = generated.module("Phone").unwrap();
    assert_eq!(module.descriptor().table, "phones");
    assert_eq!(module.table().name, "phones");
    assert!(generated.module("Invoice").is_none());
}

#[test]
fn required_foreign_key_cycle_is_rejected() {
    let decls = vec![
        EntityDecl::new("Employee")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .association(AssociationDecl::many_to_one("department", "Department")),
        EntityDecl::new("Department")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .association(AssociationDecl::many_to_one("head", "Employee")),
    ];
    let err = generate(&decls, &ConverterRegistry::new(), &GeneratorConfig::default())
        .unwrap_err();
    assert_eq!(err.schema_kind(), Some(SchemaErrorKind::RequiredForeignKeyCycle));
    assert!(err.is_generation_error());
    assert!(
        err.to_string().contains("Employee -> Department -> Employee"),
        "{err}"
    );
}

#[test]
fn nullable_cycle_is_broken_with_deferred_constraint() {
    let decls = vec![
        EntityDecl::new("Employee")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .association(AssociationDecl::many_to_one("department", "Department").optional()),
        EntityDecl::new("Department")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .association(AssociationDecl::many_to_one("head", "Employee")),
    ];
    let generated =
        generate(&decls, &ConverterRegistry::new(), &GeneratorConfig::default()).unwrap();
    assert_eq!(generated.creation_order().deferred.len(), 1);
    let deferred: Vec<&str> = generated
        .tables()
        .iter()
        .flat_map(|t| &t.foreign_keys)
        .filter(|fk| fk.deferred)
        .map(|fk| fk.referenced_table.as_str())
        .collect();
    assert_eq!(deferred, ["departments"]);

    let statements = generated.create_statements();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with("CREATE TABLE \"employees\""));
    assert!(statements[1].starts_with("CREATE TABLE \"departments\""));
    assert!(statements[2].starts_with("ALTER TABLE \"employees\" ADD CONSTRAINT"));
    assert!(statements[2].contains("REFERENCES \"departments\""));

    let sqlite = generate(
        &decls,
        &ConverterRegistry::new(),
        &GeneratorConfig::default().dialect(Dialect::Sqlite),
    )
    .unwrap();
    assert_eq!(sqlite.create_statements().len(), 2);
}

fn cents_encode(v: &Value) -> Result<Value> {
    let amount = v.as_f64().ok_or_else(|| Error::Custom("not a number".into()))?;
    Ok(Value::BigInt((amount * 100.0).round() as i64))
}

#[test]
fn asymmetric_converter_is_rejected() {
    let registry = ConverterRegistry::new()
        .with(ConverterDef::new("cents").encode(SqlType::Double, SqlType::BigInt, cents_encode));
    let decls = vec![
        EntityDecl::new("Invoice")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .field(FieldDecl::new("amount", SqlType::Double).converter("cents")),
    ];
    let err = generate(&decls, &registry, &GeneratorConfig::default()).unwrap_err();
    assert_eq!(err.conversion_kind(), Some(ConversionErrorKind::AsymmetricConverter));
    assert_eq!(err.entity(), Some("Invoice"));
    assert_eq!(err.field(), Some("amount"));
}

#[test]
fn naming_follows_configuration() {
    let config = GeneratorConfig::from_json(
        r#"{"dialect": "mysql", "pluralise_tables": false, "fk_separator": "__", "if_not_exists": true}"#,
    )
    .unwrap();
    let generated =
        generate(&customer_decls(), &ConverterRegistry::with_builtins(), &config).unwrap();

    let phone = generated.table("Phone").unwrap();
    assert_eq!(phone.name, "phone");
    assert!(phone.column("customer__id").is_some());

    let statements = generated.create_statements();
    assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS `customer`"));
}

#[test]
fn many_to_many_join_table_comes_last() {
    let decls = vec![
        EntityDecl::new("Student")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .association(AssociationDecl::many_to_many("courses", "Course")),
        EntityDecl::new("Course")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .association(AssociationDecl::many_to_many("students", "Student").mapped_by("courses")),
    ];
    let generated =
        generate(&decls, &ConverterRegistry::new(), &GeneratorConfig::default()).unwrap();

    let last = generated.tables().last().unwrap();
    assert_eq!(last.source, TableSource::JoinTable);
    assert_eq!(last.name, "students_courses");
    assert_eq!(last.primary_key, ["student_id", "course_id"]);

    let drops = generated.drop_statements();
    assert!(drops[0].contains("\"students_courses\""));
}

#[test]
fn declarations_load_from_json() {
    let json = r#"[
        {
            "name": "Customer",
            "identifier": {"generated": {"name": "id", "sql_type": "BigInt"}},
            "fields": [{"name": "name", "sql_type": "Text"}]
        },
        {
            "name": "Phone",
            "identifier": {"generated": {"name": "id", "sql_type": "BigInt"}},
            "associations": [{"field": "customer", "kind": "many_to_one", "target": "Customer"}]
        }
    ]"#;
    let decls = declarations_from_json(json).unwrap();
    let generated = generate(&decls, &ConverterRegistry::new(), &GeneratorConfig::default())
        .unwrap();
    assert_eq!(generated.tables().len(), 2);
    assert!(generated.table("Phone").unwrap().column("customer_id").is_some());
}
