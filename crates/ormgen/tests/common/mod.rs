#![allow(dead_code)]

use ormgen::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    /// Every statement seen, with its bound parameters.
    pub statements: Vec<(String, Vec<Value>)>,
    /// Rows handed back by the next `query` call.
    pub results: VecDeque<Vec<Row>>,
    pub next_id: i64,
    pub affected: u64,
}

/// In-memory connection recording statements.
pub struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
    pub dialect: Dialect,
}

impl MockConnection {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            dialect,
        }
    }

    pub fn push_result(&self, rows: Vec<Row>) {
        self.state.lock().expect("lock poisoned").results.push_back(rows);
    }

    pub fn set_next_id(&self, id: i64) {
        self.state.lock().expect("lock poisoned").next_id = id;
    }

    pub fn set_affected(&self, rows: u64) {
        self.state.lock().expect("lock poisoned").affected = rows;
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().expect("lock poisoned").statements.clone()
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.state
            .lock()
            .expect("lock poisoned")
            .statements
            .push((sql.to_string(), params.to_vec()));
    }
}

impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.record(sql, params);
        let rows = self
            .state
            .lock()
            .expect("lock poisoned")
            .results
            .pop_front()
            .unwrap_or_default();
        async move { Outcome::Ok(rows) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record(sql, params);
        let affected = self.state.lock().expect("lock poisoned").affected;
        async move { Outcome::Ok(affected) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        self.record(sql, params);
        let id = self.state.lock().expect("lock poisoned").next_id;
        async move { Outcome::Ok(id) }
    }
}

/// Customer ↔ Phone, the canonical bidirectional pair, plus orders so two
/// collections can be joined at once.
pub fn customer_decls() -> Vec<EntityDecl> {
    vec![
        EntityDecl::new("Customer")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .field(FieldDecl::new("name", SqlType::Text))
            .association(AssociationDecl::one_to_many("phones", "Phone").mapped_by("customer"))
            .association(AssociationDecl::one_to_many("orders", "Order").mapped_by("customer")),
        EntityDecl::new("Phone")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .field(FieldDecl::new("number", SqlType::Text))
            .association(AssociationDecl::many_to_one("customer", "Customer")),
        EntityDecl::new("Order")
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .field(FieldDecl::new("total", SqlType::Double))
            .association(AssociationDecl::many_to_one("customer", "Customer")),
    ]
}

pub fn generate_customers(dialect: Dialect) -> Generated {
    generate(
        &customer_decls(),
        &ConverterRegistry::with_builtins(),
        &GeneratorConfig::default().dialect(dialect),
    )
    .expect("customer model generates")
}
