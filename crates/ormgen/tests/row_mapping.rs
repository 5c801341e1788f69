mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{MockConnection, generate_customers, unwrap_outcome};
use ormgen::prelude::*;
use ormgen::{IdentityKey, PreconditionErrorKind};

fn customer_phone_row(customer: i64, name: &str, phone: i64, number: &str) -> Row {
    Row::from_pairs([
        ("t0__id", Value::BigInt(customer)),
        ("t0__name", Value::from(name)),
        ("t1__id", Value::BigInt(phone)),
        ("t1__number", Value::from(number)),
        ("t1__customer_id", Value::BigInt(customer)),
    ])
}

#[test]
fn customer_with_two_phones_coalesces_into_one_entity() {
    let generated = generate_customers(Dialect::Postgres);
    let customers = generated.module("Customer").unwrap();
    let query = customers
        .select_eager(&EagerLoader::new().include("phones"))
        .unwrap();
    assert!(
        query
            .sql
            .contains("LEFT JOIN \"phones\" \"t1\" ON \"t1\".\"customer_id\" = \"t0\".\"id\"")
    );

    let rows = vec![
        customer_phone_row(1, "Ada", 10, "555-0100"),
        customer_phone_row(1, "Ada", 11, "555-0101"),
    ];
    let loaded: Vec<Entity> = customers.from_eager_rows(&query, &rows).unwrap().collect();

    assert_eq!(loaded.len(), 1);
    let ada = &loaded[0];
    assert_eq!(ada.value("name"), &Value::from("Ada"));
    let phones = ada.collection("phones");
    assert_eq!(phones.len(), 2);
    assert_eq!(phones[0].value("number"), &Value::from("555-0100"));
    assert_eq!(phones[1].value("number"), &Value::from("555-0101"));
    for phone in phones {
        assert_eq!(phone.related("customer"), &Related::Unset);
    }
}

#[test]
fn two_joined_collections_do_not_multiply() {
    let generated = generate_customers(Dialect::Postgres);
    let customers = generated.module("Customer").unwrap();
    let query = customers
        .select_eager(&EagerLoader::new().include("phones").include("orders"))
        .unwrap();

    let mut rows = Vec::new();
    for phone in [10_i64, 11] {
        for order in [100_i64, 101, 102] {
            rows.push(Row::from_pairs([
                ("t0__id", Value::BigInt(1)),
                ("t0__name", Value::from("Ada")),
                ("t1__id", Value::BigInt(phone)),
                ("t1__number", Value::from(format!("555-{phone}"))),
                ("t1__customer_id", Value::BigInt(1)),
                ("t2__id", Value::BigInt(order)),
                ("t2__total", Value::Double(9.5)),
                ("t2__customer_id", Value::BigInt(1)),
            ]));
        }
    }
    assert_eq!(rows.len(), 6);

    let loaded: Vec<Entity> = customers.from_eager_rows(&query, rows).unwrap().collect();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].collection("phones").len(), 2);
    assert_eq!(loaded[0].collection("orders").len(), 3);
}

#[test]
fn parents_without_children_keep_an_empty_collection() {
    let generated = generate_customers(Dialect::Postgres);
    let customers = generated.module("Customer").unwrap();
    let query = customers
        .select_eager(&EagerLoader::new().include("phones"))
        .unwrap();
    let rows = vec![
        customer_phone_row(1, "Ada", 10, "555-0100"),
        Row::from_pairs([
            ("t0__id", Value::BigInt(2)),
            ("t0__name", Value::from("Grace")),
            ("t1__id", Value::Null),
            ("t1__number", Value::Null),
            ("t1__customer_id", Value::Null),
        ]),
        customer_phone_row(1, "Ada", 11, "555-0101"),
    ];
    let loaded: Vec<Entity> = customers.from_eager_rows(&query, &rows).unwrap().collect();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].collection("phones").len(), 2);
    assert!(loaded[1].collection("phones").is_empty());
}

#[test]
fn eager_rows_must_match_the_module() {
    let generated = generate_customers(Dialect::Postgres);
    let query = generated
        .module("Customer")
        .unwrap()
        .select_eager(&EagerLoader::new().include("phones"))
        .unwrap();
    let phones = generated.module("Phone").unwrap();
    let err = phones.from_eager_rows(&query, Vec::<Row>::new()).unwrap_err();
    assert_eq!(err.entity(), Some("Phone"));
}

#[test]
fn phone_loads_its_customer() {
    let generated = generate_customers(Dialect::Sqlite);
    let phones = generated.module("Phone").unwrap();
    let query = phones
        .select_eager(&EagerLoader::new().include("customer"))
        .unwrap();
    let row = Row::from_pairs([
        ("t0__id", Value::BigInt(10)),
        ("t0__number", Value::from("555-0100")),
        ("t0__customer_id", Value::BigInt(1)),
        ("t1__id", Value::BigInt(1)),
        ("t1__name", Value::from("Ada")),
    ]);
    let loaded: Vec<Entity> = phones.from_eager_rows(&query, [row]).unwrap().collect();
    let customer = loaded[0].loaded("customer").unwrap();
    assert_eq!(customer.value("name"), &Value::from("Ada"));
    // back-pointer to the phone being loaded
    assert_eq!(customer.related("phones"), &Related::Unset);
}

#[test]
fn from_rows_coalesces_plain_rows() {
    let generated = generate_customers(Dialect::Postgres);
    let customers = generated.module("Customer").unwrap();
    let row = |id: i64, name: &str| {
        Row::from_pairs([("id", Value::BigInt(id)), ("name", Value::from(name))])
    };
    let rows = [row(1, "Ada"), row(2, "Grace"), row(1, "Ada")];
    let loaded: Vec<Entity> = customers.from_rows(&rows).unwrap().collect();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[1].value("name"), &Value::from("Grace"));
}

fn account_decls() -> Vec<EntityDecl> {
    vec![
        EntityDecl::new("Account")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .field(FieldDecl::new("name", SqlType::Text))
            .field(FieldDecl::new("external_ref", SqlType::Uuid).converter("uuid_text"))
            .field(FieldDecl::new("balance", SqlType::Double).nullable()),
    ]
}

const REF: [u8; 16] = [
    0x67, 0xe5, 0x50, 0x44, 0x10, 0xb1, 0x42, 0x6f, 0x92, 0x47, 0xbb, 0x68, 0x0e, 0x5f, 0xe0, 0xc8,
];

#[test]
fn insert_then_from_row_round_trips() {
    let generated = generate(
        &account_decls(),
        &ConverterRegistry::with_builtins(),
        &GeneratorConfig::default().dialect(Dialect::Sqlite),
    )
    .unwrap();
    let accounts = generated.module("Account").unwrap();

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new(Dialect::Sqlite);
    conn.set_next_id(7);

    let account = Entity::new("Account")
        .with("name", "savings")
        .with("external_ref", Value::Uuid(REF))
        .with("balance", Value::Null);
    let inserted = rt.block_on(async { unwrap_outcome(accounts.insert(&cx, &conn, &account).await) });

    assert_eq!(inserted.value("id"), &Value::BigInt(7));
    assert_eq!(account.get("id"), None);

    let statements = conn.statements();
    assert_eq!(statements.len(), 1);
    let (sql, params) = &statements[0];
    assert_eq!(
        sql,
        "INSERT INTO \"accounts\" (\"name\", \"external_ref\", \"balance\") VALUES (?1, ?2, ?3)"
    );
    assert_eq!(
        params[1],
        Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8")
    );

    // the physical row the database now holds
    let mut assignments = vec![("id".to_string(), Value::BigInt(7))];
    assignments.extend(sql_columns(&statements[0].0).into_iter().zip(params.iter().cloned()));
    let row = Row::from_pairs(assignments);
    assert_eq!(accounts.from_row(&row).unwrap(), inserted);
    assert_eq!(accounts.to_column_assignments(&inserted).unwrap()[0].1, Value::BigInt(7));
}

fn sql_columns(insert: &str) -> Vec<String> {
    let start = insert.find('(').unwrap() + 1;
    let end = insert.find(')').unwrap();
    insert[start..end]
        .split(", ")
        .map(|c| c.trim_matches('"').to_string())
        .collect()
}

#[test]
fn postgres_insert_returns_generated_key() {
    let generated = generate(
        &account_decls(),
        &ConverterRegistry::with_builtins(),
        &GeneratorConfig::default(),
    )
    .unwrap();
    let accounts = generated.module("Account").unwrap();
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new(Dialect::Postgres);
    conn.set_next_id(42);

    let account = Entity::new("Account")
        .with("name", "checking")
        .with("external_ref", Value::Uuid(REF));
    let inserted = rt.block_on(async { unwrap_outcome(accounts.insert(&cx, &conn, &account).await) });
    assert_eq!(accounts.identity_of(&inserted), IdentityKey::single(42_i64));

    let (sql, _) = &conn.statements()[0];
    assert!(sql.ends_with("RETURNING \"id\""), "{sql}");
    assert!(sql.contains("$3"));
}

#[test]
fn update_by_identity_sets_non_key_columns() {
    let generated = generate(
        &account_decls(),
        &ConverterRegistry::with_builtins(),
        &GeneratorConfig::default(),
    )
    .unwrap();
    let accounts = generated.module("Account").unwrap();
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new(Dialect::Postgres);
    conn.set_affected(1);

    let account = Entity::new("Account")
        .with("id", 3_i64)
        .with("name", "renamed")
        .with("external_ref", Value::Uuid(REF))
        .with("balance", 12.5);
    let affected =
        rt.block_on(async { unwrap_outcome(accounts.update_by_identity(&cx, &conn, &account).await) });
    assert_eq!(affected, 1);

    let (sql, params) = &conn.statements()[0];
    assert_eq!(
        sql,
        "UPDATE \"accounts\" SET \"name\" = $1, \"external_ref\" = $2, \"balance\" = $3 WHERE \"id\" = $4"
    );
    assert_eq!(params[3], Value::BigInt(3));

    let unsaved = Entity::new("Account").with("name", "new");
    let outcome = rt.block_on(async { accounts.update_by_identity(&cx, &conn, &unsaved).await });
    match outcome {
        Outcome::Err(e) => {
            assert_eq!(e.precondition_kind(), Some(PreconditionErrorKind::MissingIdentifier));
        }
        other => panic!("expected missing identifier, got {other:?}"),
    }
}

#[test]
fn update_with_explicit_predicate() {
    let generated = generate_customers(Dialect::Sqlite);
    let customers = generated.module("Customer").unwrap();
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new(Dialect::Sqlite);

    let predicate = Predicate::new().column_eq("name", "Ada");
    let customer = Entity::new("Customer").with("name", "Ada Lovelace");
    rt.block_on(async {
        unwrap_outcome(customers.update(&cx, &conn, &predicate, &customer).await);
    });
    let (sql, params) = &conn.statements()[0];
    assert_eq!(sql, "UPDATE \"customers\" SET \"name\" = ?1 WHERE \"name\" = ?2");
    assert_eq!(params, &[Value::from("Ada Lovelace"), Value::from("Ada")]);
}

#[test]
fn phone_insert_requires_a_persisted_customer() {
    let generated = generate_customers(Dialect::Postgres);
    let phones = generated.module("Phone").unwrap();
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new(Dialect::Postgres);

    let orphan = Entity::new("Phone").with("number", "555-0100");
    let outcome = rt.block_on(async { phones.insert(&cx, &conn, &orphan).await });
    match outcome {
        Outcome::Err(e) => {
            assert_eq!(e.precondition_kind(), Some(PreconditionErrorKind::UnpersistedReference));
            assert_eq!(e.field(), Some("customer"));
        }
        other => panic!("expected unpersisted reference, got {other:?}"),
    }
    assert!(conn.statements().is_empty());

    let owned = orphan.with_reference("customer", IdentityKey::single(1_i64));
    let assignments = phones.to_column_assignments(&owned).unwrap();
    assert!(assignments.contains(&("customer_id".to_string(), Value::BigInt(1))));
}

#[test]
fn fetch_eager_queries_and_groups() {
    let generated = generate_customers(Dialect::Postgres);
    let customers = generated.module("Customer").unwrap();
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new(Dialect::Postgres);
    conn.push_result(vec![
        customer_phone_row(1, "Ada", 10, "555-0100"),
        customer_phone_row(1, "Ada", 11, "555-0101"),
    ]);

    let loader = EagerLoader::new()
        .include("phones")
        .filter(Predicate::new().column_eq("name", "Ada"));
    let loaded = rt.block_on(async {
        unwrap_outcome(customers.fetch_eager(&cx, &conn, &loader).await)
    });
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].collection("phones").len(), 2);

    let (sql, params) = &conn.statements()[0];
    assert!(sql.ends_with("WHERE \"t0\".\"name\" = $1"), "{sql}");
    assert_eq!(params, &[Value::from("Ada")]);
}

#[test]
fn create_all_runs_generated_ddl() {
    let generated = generate(
        &common::customer_decls(),
        &ConverterRegistry::new(),
        &GeneratorConfig::default().if_not_exists(true),
    )
    .unwrap();
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new(Dialect::Sqlite);

    rt.block_on(async { unwrap_outcome(generated.create_all(&cx, &conn).await) });
    let executed: Vec<String> = conn.statements().into_iter().map(|(sql, _)| sql).collect();
    assert_eq!(executed.len(), 3);
    assert!(executed[0].starts_with("CREATE TABLE IF NOT EXISTS \"customers\""));
    assert!(executed[0].contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));

    rt.block_on(async { unwrap_outcome(generated.drop_all(&cx, &conn).await) });
    let executed = conn.statements();
    assert_eq!(executed[3].0, "DROP TABLE IF EXISTS \"orders\"");
}
