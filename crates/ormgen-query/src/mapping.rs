//! Row to entity mapping and back.
//!
//! [`EntityMapper`] projects one row (or one aliased slice of a joined row)
//! onto an [`Entity`], decoding identifier and scalar columns through their
//! converters, and flattens an entity back into ordered column assignments.

use ormgen_core::{
    AssociationDescriptor, ColumnDescriptor, ConversionError, ConversionErrorKind, Entity,
    EntityDescriptor, EntityId, Error, IdentifierDescriptor, IdentityKey, Metamodel, Related,
    Result, Row, RowView, TypeError, Value,
};

/// Maps rows of one entity's table.
#[derive(Debug, Clone, Copy)]
pub struct EntityMapper<'m> {
    model: &'m Metamodel,
    entity: &'m EntityDescriptor,
}

impl<'m> EntityMapper<'m> {
    pub fn new(model: &'m Metamodel, id: EntityId) -> Self {
        Self {
            model,
            entity: model.entity(id),
        }
    }

    pub fn descriptor(&self) -> &'m EntityDescriptor {
        self.entity
    }

    pub fn model(&self) -> &'m Metamodel {
        self.model
    }

    /// Project a row with plain column names onto a new entity.
    ///
    /// Many-to-one foreign keys become [`Related::Reference`]s; collection
    /// slots start empty.
    ///
    /// # Errors
    ///
    /// `MissingColumn` when a non-nullable column is absent or NULL, a type
    /// error when a value does not fit its column, `DecodeFailed` when a
    /// converter rejects a value.
    #[allow(clippy::result_large_err)]
    pub fn from_row(&self, row: &Row) -> Result<Entity> {
        self.map_view(row.plain(), None)
    }

    /// Project one aliased slice of a row, leaving `skip` (the back-pointer
    /// of a child reached through its parent) unset.
    #[allow(clippy::result_large_err)]
    pub(crate) fn map_view(&self, view: RowView<'_>, skip: Option<&str>) -> Result<Entity> {
        let mut entity = Entity::new(&self.entity.name);

        for col in self.entity.identifier.own_columns() {
            entity.set(&col.field, self.read_column(view, col, false)?);
        }
        for col in &self.entity.columns {
            entity.set(&col.field, self.read_column(view, col, col.is_nullable())?);
        }

        for assoc in &self.entity.associations {
            if skip == Some(assoc.field.as_str()) {
                continue;
            }
            if assoc.is_collection() {
                entity.set_related(&assoc.field, Related::Collection(Vec::new()));
                continue;
            }
            let Some(fk) = assoc.foreign_key() else {
                continue;
            };
            let values = fk
                .columns
                .iter()
                .map(|c| self.read_column(view, &c.column, fk.nullable))
                .collect::<Result<Vec<_>>>()?;
            let key = IdentityKey::new(values);
            let related = if key.has_null() {
                Related::Unset
            } else {
                Related::Reference(key)
            };
            entity.set_related(&assoc.field, related);
        }

        Ok(entity)
    }

    /// Decoded identifier of the entity in `view`; components are NULL when
    /// an outer join found no match.
    #[allow(clippy::result_large_err)]
    pub(crate) fn decode_identity(&self, view: RowView<'_>) -> Result<IdentityKey> {
        self.entity
            .key_columns()
            .into_iter()
            .map(|col| self.read_column(view, col, true))
            .collect::<Result<Vec<_>>>()
            .map(IdentityKey::new)
    }

    #[allow(clippy::result_large_err)]
    fn read_column(&self, view: RowView<'_>, col: &ColumnDescriptor, nullable: bool) -> Result<Value> {
        let raw = match view.get(&col.column) {
            Some(value) => value,
            None if nullable => return Ok(Value::Null),
            None => return Err(self.missing(col, "column absent from row")),
        };
        if raw.is_null() {
            if nullable {
                return Ok(Value::Null);
            }
            return Err(self.missing(col, "NULL in non-nullable column"));
        }
        let sql_type = col.sql_type();
        let stored = sql_type
            .accepts(raw)
            .then(|| sql_type.coerce(raw))
            .flatten()
            .ok_or_else(|| {
                Error::Type(TypeError {
                    expected: sql_type.kind_name(),
                    actual: raw.type_name().to_string(),
                    column: Some(col.column.clone()),
                })
            })?;
        col.decode(&stored)
            .map_err(|e| e.scoped(&self.entity.name, Some(&col.field)))
    }

    fn missing(&self, col: &ColumnDescriptor, message: &str) -> Error {
        ConversionError::new(ConversionErrorKind::MissingColumn, message)
            .entity(&self.entity.name)
            .field(&col.field)
            .column(&col.column)
            .into()
    }

    /// Ordered `(column, value)` pairs for every table column, converters
    /// applied and many-to-one references flattened to their key columns.
    ///
    /// Order matches the table: identifier, scalar columns, then remaining
    /// foreign keys. Unset references yield NULLs.
    ///
    /// # Errors
    ///
    /// `EncodeFailed` when a converter rejects a value.
    #[allow(clippy::result_large_err)]
    pub fn to_column_assignments(&self, entity: &Entity) -> Result<Vec<(String, Value)>> {
        let mut out = Vec::new();
        for col in self.entity.identifier.own_columns() {
            out.push(self.encode_column(col, entity.value(&col.field))?);
        }
        for assoc in self
            .entity
            .many_to_ones()
            .filter(|a| self.entity.is_key_association(&a.field))
        {
            self.push_reference(assoc, entity, &mut out)?;
        }
        for col in &self.entity.columns {
            out.push(self.encode_column(col, entity.value(&col.field))?);
        }
        for assoc in self
            .entity
            .many_to_ones()
            .filter(|a| !self.entity.is_key_association(&a.field))
        {
            self.push_reference(assoc, entity, &mut out)?;
        }
        Ok(out)
    }

    #[allow(clippy::result_large_err)]
    fn encode_column(&self, col: &ColumnDescriptor, value: &Value) -> Result<(String, Value)> {
        let encoded = col
            .encode(value)
            .map_err(|e| e.scoped(&self.entity.name, Some(&col.field)))?;
        Ok((col.column.clone(), encoded))
    }

    #[allow(clippy::result_large_err)]
    fn push_reference(
        &self,
        assoc: &AssociationDescriptor,
        entity: &Entity,
        out: &mut Vec<(String, Value)>,
    ) -> Result<()> {
        let Some(fk) = assoc.foreign_key() else {
            return Ok(());
        };
        let key = reference_values(self.model, assoc, entity);
        for (i, c) in fk.columns.iter().enumerate() {
            let value = key.get(i).unwrap_or(&Value::Null);
            let encoded = c
                .column
                .encode(value)
                .map_err(|e| e.scoped(&self.entity.name, Some(&assoc.field)))?;
            out.push((c.column.column.clone(), encoded));
        }
        Ok(())
    }

    /// Domain identifier of an entity instance of this mapper's entity.
    ///
    /// Unconverted integer components are brought to their column's declared
    /// width, so the key equals the one decoded from a stored row.
    pub fn identity_of(&self, entity: &Entity) -> IdentityKey {
        IdentityKey::new(identity_values(self.model, self.entity, entity))
    }

    /// Key values the many-to-one `assoc` of `entity` points at, or `None`
    /// when the slot is unset.
    pub(crate) fn referenced_key(
        &self,
        assoc: &AssociationDescriptor,
        entity: &Entity,
    ) -> Option<Vec<Value>> {
        match entity.related(&assoc.field) {
            Related::Unset | Related::Collection(_) => None,
            _ => Some(reference_values(self.model, assoc, entity)),
        }
    }
}

/// Domain value at its column's declared width; converted values are left
/// as the converter produced them.
fn canonical(col: &ColumnDescriptor, value: &Value) -> Value {
    if col.converter().is_some() {
        return value.clone();
    }
    col.sql_type()
        .coerce(value)
        .unwrap_or_else(|| value.clone())
}

/// Identifier components of `entity`, in key order.
fn identity_values(model: &Metamodel, desc: &EntityDescriptor, entity: &Entity) -> Vec<Value> {
    match &desc.identifier {
        IdentifierDescriptor::AssociationKey(fields) => fields
            .iter()
            .filter_map(|f| desc.association(f))
            .flat_map(|assoc| reference_values(model, assoc, entity))
            .collect(),
        other => other
            .own_columns()
            .iter()
            .map(|c| canonical(c, entity.value(&c.field)))
            .collect(),
    }
}

/// Key values a many-to-one slot points at; NULLs when unset.
fn reference_values(model: &Metamodel, assoc: &AssociationDescriptor, entity: &Entity) -> Vec<Value> {
    let Some(fk) = assoc.foreign_key() else {
        return Vec::new();
    };
    let values = match entity.related(&assoc.field) {
        Related::Reference(key) => key.values().to_vec(),
        Related::Loaded(target) => identity_values(model, model.entity(assoc.target), target),
        Related::Unset | Related::Collection(_) => return vec![Value::Null; fk.columns.len()],
    };
    values
        .iter()
        .zip(&fk.columns)
        .map(|(value, c)| canonical(&c.column, value))
        .chain(values.iter().skip(fk.columns.len()).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormgen_core::{
        AssociationDecl, ConverterRegistry, EntityDecl, FieldDecl, IdentifierDecl, NamingOptions,
        SqlType,
    };

    const TOKEN: [u8; 16] = [
        0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde,
        0xf0,
    ];
    const TOKEN_TEXT: &str = "12345678-9abc-def0-1234-56789abcdef0";

    fn model() -> Metamodel {
        let decls = vec![
            EntityDecl::new("Customer")
                .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
                .field(FieldDecl::new("name", SqlType::Text))
                .field(FieldDecl::new("token", SqlType::Uuid).converter("uuid_text").nullable())
                .association(AssociationDecl::one_to_many("phones", "Phone")),
            EntityDecl::new("Phone")
                .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
                .field(FieldDecl::new("number", SqlType::Text))
                .association(AssociationDecl::many_to_one("customer", "Customer"))
                .association(AssociationDecl::many_to_one("backup", "Phone").optional()),
            EntityDecl::new("Device")
                .identifier(IdentifierDecl::converted("serial", SqlType::Uuid, "uuid_text")),
            EntityDecl::new("Enrollment")
                .association_container()
                .association(AssociationDecl::many_to_one("device", "Device"))
                .association(AssociationDecl::many_to_one("customer", "Customer")),
        ];
        Metamodel::analyze(&decls, &ConverterRegistry::with_builtins(), &NamingOptions::default())
            .unwrap()
    }

    fn mapper<'m>(model: &'m Metamodel, name: &str) -> EntityMapper<'m> {
        EntityMapper::new(model, model.entity_by_name(name).unwrap().id)
    }

    #[test]
    fn test_from_row_decodes_converters() {
        let model = model();
        let row = Row::from_pairs([
            ("id", Value::BigInt(7)),
            ("name", Value::from("Ada")),
            ("token", Value::from(TOKEN_TEXT)),
        ]);
        let customer = mapper(&model, "Customer").from_row(&row).unwrap();
        assert_eq!(customer.name(), "Customer");
        assert_eq!(customer.value("id"), &Value::BigInt(7));
        assert_eq!(customer.value("token"), &Value::Uuid(TOKEN));
        assert_eq!(customer.related("phones"), &Related::Collection(Vec::new()));
    }

    #[test]
    fn test_from_row_nullable_column_may_be_absent() {
        let model = model();
        let row = Row::from_pairs([("id", Value::BigInt(7)), ("name", Value::from("Ada"))]);
        let customer = mapper(&model, "Customer").from_row(&row).unwrap();
        assert_eq!(customer.value("token"), &Value::Null);
    }

    #[test]
    fn test_from_row_foreign_keys_become_references() {
        let model = model();
        let row = Row::from_pairs([
            ("id", Value::BigInt(10)),
            ("number", Value::from("555-0100")),
            ("customer_id", Value::BigInt(7)),
            ("backup_id", Value::Null),
        ]);
        let phone = mapper(&model, "Phone").from_row(&row).unwrap();
        assert_eq!(
            phone.related("customer"),
            &Related::Reference(IdentityKey::single(7_i64))
        );
        assert_eq!(phone.related("backup"), &Related::Unset);
    }

    #[test]
    fn test_from_row_missing_column() {
        let model = model();
        let row = Row::from_pairs([("id", Value::BigInt(7))]);
        let err = mapper(&model, "Customer").from_row(&row).unwrap_err();
        assert_eq!(err.conversion_kind(), Some(ConversionErrorKind::MissingColumn));
        assert_eq!(err.entity(), Some("Customer"));
        assert!(err.to_string().contains("'name'"), "{err}");
    }

    #[test]
    fn test_from_row_null_in_required_column() {
        let model = model();
        let row = Row::from_pairs([
            ("id", Value::BigInt(10)),
            ("number", Value::from("555-0100")),
            ("customer_id", Value::Null),
        ]);
        let err = mapper(&model, "Phone").from_row(&row).unwrap_err();
        assert_eq!(err.conversion_kind(), Some(ConversionErrorKind::MissingColumn));
        assert!(err.to_string().contains("customer_id"), "{err}");
    }

    #[test]
    fn test_from_row_type_mismatch() {
        let model = model();
        let row = Row::from_pairs([("id", Value::from("seven")), ("name", Value::from("Ada"))]);
        let err = mapper(&model, "Customer").from_row(&row).unwrap_err();
        match err {
            Error::Type(e) => {
                assert_eq!(e.expected, "integer");
                assert_eq!(e.actual, "TEXT");
                assert_eq!(e.column.as_deref(), Some("id"));
            }
            other => panic!("expected type error, got {other:?}"),
        }
    }

    #[test]
    fn test_column_assignments_order_and_encoding() {
        let model = model();
        let phone = Entity::new("Phone")
            .with("number", "555-0100")
            .with_loaded("customer", Entity::new("Customer").with("id", 7_i64));
        let cols = mapper(&model, "Phone").to_column_assignments(&phone).unwrap();
        assert_eq!(
            cols,
            vec![
                ("id".to_string(), Value::Null),
                ("number".to_string(), Value::from("555-0100")),
                ("customer_id".to_string(), Value::BigInt(7)),
                ("backup_id".to_string(), Value::Null),
            ]
        );

        let customer = Entity::new("Customer")
            .with("id", 7_i64)
            .with("name", "Ada")
            .with("token", Value::Uuid(TOKEN));
        let cols = mapper(&model, "Customer").to_column_assignments(&customer).unwrap();
        assert_eq!(cols[2], ("token".to_string(), Value::from(TOKEN_TEXT)));
    }

    #[test]
    fn test_association_key_round_trip() {
        let model = model();
        let enrollment = Entity::new("Enrollment")
            .with_reference("device", IdentityKey::single(Value::Uuid(TOKEN)))
            .with_reference("customer", IdentityKey::single(7_i64));
        let m = mapper(&model, "Enrollment");
        let cols = m.to_column_assignments(&enrollment).unwrap();
        assert_eq!(
            cols,
            vec![
                ("device_serial".to_string(), Value::from(TOKEN_TEXT)),
                ("customer_id".to_string(), Value::BigInt(7)),
            ]
        );
        assert_eq!(
            m.identity_of(&enrollment),
            IdentityKey::new(vec![Value::Uuid(TOKEN), Value::BigInt(7)])
        );

        let row = Row::new(
            cols.iter().map(|(c, _)| c.clone()).collect(),
            cols.into_iter().map(|(_, v)| v).collect(),
        );
        let back = m.from_row(&row).unwrap();
        assert_eq!(back.related("device"), enrollment.related("device"));
        assert_eq!(back.related("customer"), enrollment.related("customer"));
    }

    fn integer_keyed() -> Metamodel {
        let decls = vec![
            EntityDecl::new("Account")
                .identifier(IdentifierDecl::generated("id", SqlType::Integer))
                .field(FieldDecl::new("login", SqlType::Text)),
            EntityDecl::new("Session")
                .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
                .association(AssociationDecl::many_to_one("account", "Account")),
        ];
        Metamodel::analyze(&decls, &ConverterRegistry::new(), &NamingOptions::default()).unwrap()
    }

    #[test]
    fn test_integer_widths_decode_to_one_identity() {
        let model = integer_keyed();
        let account = mapper(&model, "Account")
            .from_row(&Row::from_pairs([
                ("id", Value::Int(7)),
                ("login", Value::from("ada")),
            ]))
            .unwrap();
        let session = mapper(&model, "Session")
            .from_row(&Row::from_pairs([
                ("id", Value::Int(1)),
                ("account_id", Value::BigInt(7)),
            ]))
            .unwrap();

        let identity = mapper(&model, "Account").identity_of(&account);
        assert_eq!(identity, IdentityKey::single(Value::Int(7)));
        assert_eq!(session.related("account"), &Related::Reference(identity));
        assert_eq!(session.value("id"), &Value::BigInt(1));

        let built = Entity::new("Account").with("id", 7_i64);
        assert_eq!(
            mapper(&model, "Account").identity_of(&built),
            IdentityKey::single(Value::Int(7))
        );
    }

    #[test]
    fn test_integer_out_of_declared_range() {
        let model = integer_keyed();
        let row = Row::from_pairs([
            ("id", Value::BigInt(i64::from(i32::MAX) + 1)),
            ("login", Value::from("ada")),
        ]);
        let err = mapper(&model, "Account").from_row(&row).unwrap_err();
        match err {
            Error::Type(e) => {
                assert_eq!(e.expected, "integer");
                assert_eq!(e.column.as_deref(), Some("id"));
            }
            other => panic!("expected type error, got {other:?}"),
        }
    }
}
