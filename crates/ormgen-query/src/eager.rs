//! Eager loading: include paths, fetch plans and the joined SELECT.
//!
//! An [`EagerLoader`] names the associations to fetch alongside the root
//! entity (`"phones"`, `"orders.lines"`). Compiling it against a metamodel
//! yields one [`FetchNode`] per distinct path, each with its own table alias,
//! and a single SELECT whose columns are aliased `<alias>__<column>` so the
//! grouping pass can slice every row per node.

use crate::builder::Predicate;
use ormgen_core::{
    AssociationDescriptor, AssociationId, AssociationKind, Dialect, EntityId, Error, Metamodel,
    Result, SchemaError, SchemaErrorKind, Value, row::ALIAS_SEPARATOR,
};
use tracing::{debug, trace};

/// Builder for eager loading configuration.
///
/// # Example
///
/// ```ignore
/// let query = customers.select_eager(&EagerLoader::new().include("phones"))?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EagerLoader {
    includes: Vec<String>,
    filter: Option<Predicate>,
}

impl EagerLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include an association path, dot separated for nesting.
    #[must_use]
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Restrict the root entity.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(predicate);
        self
    }

    /// Resolve include paths into a fetch plan rooted at `root`.
    ///
    /// Paths sharing a prefix share its nodes.
    ///
    /// # Errors
    ///
    /// `InvalidIncludePath` for an empty segment, an unknown association, or
    /// a step that walks back across the association just traversed.
    #[allow(clippy::result_large_err)]
    pub fn plan(&self, model: &Metamodel, root: EntityId) -> Result<FetchPlan> {
        let mut nodes = vec![FetchNode {
            alias: "t0".to_string(),
            entity: root,
            association: None,
            parent: None,
            path: String::new(),
            skip: None,
        }];

        for include in &self.includes {
            let mut current = 0;
            for segment in include.split('.') {
                let entity = model.entity(nodes[current].entity);
                if segment.is_empty() {
                    return Err(invalid_path(&entity.name, None, format!("empty segment in '{include}'")));
                }
                let Some(assoc) = entity.association(segment) else {
                    return Err(invalid_path(
                        &entity.name,
                        Some(segment),
                        format!("no association named '{segment}' (in '{include}')"),
                    ));
                };
                if let Some(via) = nodes[current].association {
                    if model.association(via).inverse == Some(assoc.id) {
                        return Err(invalid_path(
                            &entity.name,
                            Some(segment),
                            format!("'{include}' walks back across the association it came through"),
                        ));
                    }
                }

                if let Some(existing) = nodes
                    .iter()
                    .position(|n| n.parent == Some(current) && n.association == Some(assoc.id))
                {
                    current = existing;
                    continue;
                }

                let path = if nodes[current].path.is_empty() {
                    segment.to_string()
                } else {
                    format!("{}.{}", nodes[current].path, segment)
                };
                trace!(path = %path, alias = nodes.len(), "Planned eager node");
                nodes.push(FetchNode {
                    alias: format!("t{}", nodes.len()),
                    entity: assoc.target,
                    association: Some(assoc.id),
                    parent: Some(current),
                    path,
                    skip: assoc.inverse.map(|inv| model.association(inv).field.clone()),
                });
                current = nodes.len() - 1;
            }
        }

        Ok(FetchPlan { nodes })
    }

    /// Compile to a SELECT with LEFT JOINs for every planned node.
    ///
    /// # Errors
    ///
    /// Propagates [`EagerLoader::plan`] failures.
    #[tracing::instrument(level = "debug", skip_all, fields(includes = self.includes.len()))]
    #[allow(clippy::result_large_err)]
    pub fn build(&self, model: &Metamodel, root: EntityId, dialect: Dialect) -> Result<EagerQuery> {
        let plan = self.plan(model, root)?;
        let q = |name: &str| dialect.quote(name);

        let mut columns = Vec::new();
        for node in &plan.nodes {
            for col in model.entity(node.entity).table_columns() {
                columns.push(format!(
                    "{}.{} AS {}",
                    q(&node.alias),
                    q(&col.column),
                    q(&format!("{}{}{}", node.alias, ALIAS_SEPARATOR, col.column))
                ));
            }
        }

        let root_entity = model.entity(root);
        let mut sql = format!(
            "SELECT {} FROM {} {}",
            columns.join(", "),
            q(&root_entity.table),
            q(&plan.nodes[0].alias)
        );

        for (i, node) in plan.nodes.iter().enumerate().skip(1) {
            let (Some(parent), Some(via)) = (node.parent, node.association) else {
                continue;
            };
            let assoc = model.association(via);
            let parent_alias = &plan.nodes[parent].alias;
            let target_table = &model.entity(node.entity).table;
            sql.push_str(&join_clause(assoc, parent_alias, &node.alias, target_table, i, dialect));
        }

        let mut params: Vec<Value> = Vec::new();
        if let Some(filter) = self.filter.as_ref().filter(|f| !f.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.render(dialect, Some(&plan.nodes[0].alias), &mut params));
        }

        debug!(
            root = %root_entity.name,
            nodes = plan.nodes.len(),
            "Built eager SELECT"
        );
        Ok(EagerQuery { sql, params, plan })
    }
}

fn invalid_path(entity: &str, field: Option<&str>, message: String) -> Error {
    let mut err = SchemaError::new(SchemaErrorKind::InvalidIncludePath, message).entity(entity);
    if let Some(field) = field {
        err = err.field(field);
    }
    err.into()
}

fn on_clause(dialect: Dialect, left: &str, right: &str, pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(l, r)| {
            format!(
                "{}.{} = {}.{}",
                dialect.quote(left),
                dialect.quote(l),
                dialect.quote(right),
                dialect.quote(r)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// LEFT JOIN(s) bringing in `alias` from `parent`.
fn join_clause(
    assoc: &AssociationDescriptor,
    parent: &str,
    alias: &str,
    table: &str,
    index: usize,
    dialect: Dialect,
) -> String {
    let q = |name: &str| dialect.quote(name);
    match (assoc.kind, assoc.foreign_key(), assoc.join_sides()) {
        (AssociationKind::ManyToOne, Some(fk), _) => {
            // parent holds the key columns
            let pairs: Vec<_> = fk.column_names().zip(fk.referenced_columns()).collect();
            format!(
                " LEFT JOIN {} {} ON {}",
                q(table),
                q(alias),
                on_clause(dialect, parent, alias, &pairs)
            )
        }
        (AssociationKind::OneToMany, Some(fk), _) => {
            let pairs: Vec<_> = fk.column_names().zip(fk.referenced_columns()).collect();
            format!(
                " LEFT JOIN {} {} ON {}",
                q(table),
                q(alias),
                on_clause(dialect, alias, parent, &pairs)
            )
        }
        (AssociationKind::ManyToMany, _, Some((this, other))) => {
            let link = format!("j{index}");
            let this_pairs: Vec<_> = this.column_names().zip(this.referenced_columns()).collect();
            let other_pairs: Vec<_> = other.column_names().zip(other.referenced_columns()).collect();
            format!(
                " LEFT JOIN {} {} ON {} LEFT JOIN {} {} ON {}",
                q(&this.table),
                q(&link),
                on_clause(dialect, &link, parent, &this_pairs),
                q(table),
                q(alias),
                on_clause(dialect, &link, alias, &other_pairs)
            )
        }
        _ => String::new(),
    }
}

/// One association path of an eager fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchNode {
    /// Table alias; also the column prefix in result rows. Empty for
    /// unaliased rows.
    pub alias: String,
    pub entity: EntityId,
    /// Association reaching this node; `None` for the root.
    pub association: Option<AssociationId>,
    /// Index of the parent node.
    pub parent: Option<usize>,
    /// Dotted include path; empty for the root.
    pub path: String,
    /// Back-pointer field left unset on entities at this node.
    pub skip: Option<String>,
}

/// Resolved eager fetch: nodes in parent-before-child order, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    nodes: Vec<FetchNode>,
}

impl FetchPlan {
    /// Plan for plain rows of one entity's table: a root with no alias and
    /// no includes.
    pub fn flat(entity: EntityId) -> Self {
        Self {
            nodes: vec![FetchNode {
                alias: String::new(),
                entity,
                association: None,
                parent: None,
                path: String::new(),
                skip: None,
            }],
        }
    }

    pub fn root(&self) -> &FetchNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[FetchNode] {
        &self.nodes
    }

    /// Node for a dotted include path.
    pub fn node(&self, path: &str) -> Option<&FetchNode> {
        self.nodes.iter().find(|n| n.path == path)
    }
}

/// A compiled eager SELECT with its fetch plan.
#[derive(Debug, Clone)]
pub struct EagerQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub plan: FetchPlan,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormgen_core::{
        AssociationDecl, ConverterRegistry, EntityDecl, FieldDecl, IdentifierDecl, NamingOptions,
        SqlType,
    };

    fn model() -> Metamodel {
        let decls = vec![
            EntityDecl::new("Customer")
                .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
                .field(FieldDecl::new("name", SqlType::Text))
                .association(AssociationDecl::one_to_many("phones", "Phone"))
                .association(AssociationDecl::one_to_many("orders", "Order"))
                .association(AssociationDecl::many_to_many("tags", "Tag")),
            EntityDecl::new("Phone")
                .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
                .field(FieldDecl::new("number", SqlType::Text))
                .association(AssociationDecl::many_to_one("customer", "Customer")),
            EntityDecl::new("Order")
                .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
                .association(AssociationDecl::many_to_one("customer", "Customer"))
                .association(AssociationDecl::one_to_many("lines", "Line")),
            EntityDecl::new("Line")
                .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
                .field(FieldDecl::new("qty", SqlType::Integer))
                .association(AssociationDecl::many_to_one("order", "Order")),
            EntityDecl::new("Tag").identifier(IdentifierDecl::natural("label", SqlType::Text)),
        ];
        Metamodel::analyze(&decls, &ConverterRegistry::new(), &NamingOptions::default()).unwrap()
    }

    fn customer(model: &Metamodel) -> EntityId {
        model.entity_by_name("Customer").unwrap().id
    }

    #[test]
    fn test_plan_shares_prefixes() {
        let model = model();
        let plan = EagerLoader::new()
            .include("orders")
            .include("orders.lines")
            .include("phones")
            .plan(&model, customer(&model))
            .unwrap();
        let paths: Vec<_> = plan.nodes().iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, ["", "orders", "orders.lines", "phones"]);
        let lines = plan.node("orders.lines").unwrap();
        assert_eq!(lines.alias, "t2");
        assert_eq!(lines.parent, Some(1));
        assert_eq!(lines.skip.as_deref(), Some("order"));
    }

    #[test]
    fn test_plan_rejects_unknown_path() {
        let model = model();
        let err = EagerLoader::new()
            .include("orders.widgets")
            .plan(&model, customer(&model))
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(SchemaErrorKind::InvalidIncludePath));
        assert_eq!(err.entity(), Some("Order"));
        assert_eq!(err.field(), Some("widgets"));
    }

    #[test]
    fn test_plan_rejects_walking_back_across_inverse() {
        let model = model();
        let err = EagerLoader::new()
            .include("phones.customer")
            .plan(&model, customer(&model))
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(SchemaErrorKind::InvalidIncludePath));
        assert!(err.to_string().contains("walks back"), "{err}");
    }

    #[test]
    fn test_build_one_to_many_select() {
        let model = model();
        let query = EagerLoader::new()
            .include("phones")
            .filter(Predicate::new().column_eq("name", "Ada"))
            .build(&model, customer(&model), Dialect::Postgres)
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT \"t0\".\"id\" AS \"t0__id\", \"t0\".\"name\" AS \"t0__name\", \
             \"t1\".\"id\" AS \"t1__id\", \"t1\".\"number\" AS \"t1__number\", \
             \"t1\".\"customer_id\" AS \"t1__customer_id\" \
             FROM \"customers\" \"t0\" \
             LEFT JOIN \"phones\" \"t1\" ON \"t1\".\"customer_id\" = \"t0\".\"id\" \
             WHERE \"t0\".\"name\" = $1"
        );
        assert_eq!(query.params, vec![Value::from("Ada")]);
    }

    #[test]
    fn test_build_many_to_one_and_many_to_many_joins() {
        let model = model();
        let phone = model.entity_by_name("Phone").unwrap().id;
        let query = EagerLoader::new()
            .include("customer.tags")
            .build(&model, phone, Dialect::Sqlite)
            .unwrap();
        assert!(query.sql.contains(
            " LEFT JOIN \"customers\" \"t1\" ON \"t0\".\"customer_id\" = \"t1\".\"id\""
        ));
        assert!(query.sql.contains(
            " LEFT JOIN \"customers_tags\" \"j2\" ON \"j2\".\"customer_id\" = \"t1\".\"id\" \
             LEFT JOIN \"tags\" \"t2\" ON \"j2\".\"tag_label\" = \"t2\".\"label\""
        ));
        assert!(query.params.is_empty());
    }
}
