//! Declarative relation tables.
//!
//! Each entity type lists its relation fields once, as a static table of
//! `RelationInfo` values built with `const fn` constructors. The schema
//! compiler validates and resolves these against the `ServiceRegistry`.

use relmodel_core::EntityMeta;
use std::sync::Arc;

/// The shape of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Master id references a single slave record.
    OneToOne,
    /// Master id references a slave record reduced to `{id, name}`.
    Dict,
    /// Master id is looked up in an in-memory id → name table.
    ConstDict,
    /// Scalar aggregate over slave rows pointing at the master.
    OneToManyAggregation,
    /// Scalar aggregate over slave rows reached through a join table.
    ManyToManyAggregation,
    /// Raw join-table rows of the master.
    ManyToMany,
}

impl RelationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationKind::OneToOne => "one_to_one",
            RelationKind::Dict => "dict",
            RelationKind::ConstDict => "const_dict",
            RelationKind::OneToManyAggregation => "one_to_many_aggregation",
            RelationKind::ManyToManyAggregation => "many_to_many_aggregation",
            RelationKind::ManyToMany => "many_to_many",
        }
    }
}

/// Where the slave side of a relation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveSource {
    /// A local service registered under the slave model's name.
    Local,
    /// A remote client registered under this name.
    Remote(&'static str),
    /// A constant dictionary registered under this name.
    Const(&'static str),
}

/// Join table of a many-to-many relation. The join table is always local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    /// Model name of the join table
    pub relation_model: &'static str,
    /// Join-table field holding the master id
    pub relation_master_id_field: &'static str,
    /// Join-table field holding the slave id
    pub relation_slave_id_field: &'static str,
}

impl LinkInfo {
    pub const fn new(
        relation_model: &'static str,
        relation_master_id_field: &'static str,
        relation_slave_id_field: &'static str,
    ) -> Self {
        Self {
            relation_model,
            relation_master_id_field,
            relation_slave_id_field,
        }
    }
}

/// Declaration of one relation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationInfo {
    /// Name of the relation field on the master entity.
    pub field: &'static str,

    pub kind: RelationKind,

    pub source: SlaveSource,

    /// Master field whose value identifies the related slave rows.
    pub master_id_field: &'static str,

    /// Slave model name; empty for constant dictionaries.
    pub slave_model: &'static str,

    /// Slave field matched against the master id.
    pub slave_id_field: &'static str,

    /// Slave field providing the display name of a dictionary entry.
    pub slave_name_field: Option<&'static str>,

    /// For dictionaries: a one-to-one field on the same entity holding the same
    /// slave record. When that one-to-one was built in the same call, the
    /// dictionary is derived from it instead of fetched.
    pub equal_one_to_one_field: Option<&'static str>,

    /// For one-to-one: also resolve the slave record's own dictionaries when
    /// built "with dictionary".
    pub load_slave_dict: bool,

    /// Aggregation type code, SUM=0 COUNT=1 AVG=2 MIN=3 MAX=4.
    pub aggregation_type: Option<i32>,

    /// Model holding the aggregated field: the slave, or the join table.
    pub aggregation_model: Option<&'static str>,

    pub aggregation_field: Option<&'static str>,

    pub link: Option<LinkInfo>,
}

impl RelationInfo {
    const fn base(
        field: &'static str,
        kind: RelationKind,
        source: SlaveSource,
        master_id_field: &'static str,
        slave_model: &'static str,
        slave_id_field: &'static str,
    ) -> Self {
        Self {
            field,
            kind,
            source,
            master_id_field,
            slave_model,
            slave_id_field,
            slave_name_field: None,
            equal_one_to_one_field: None,
            load_slave_dict: false,
            aggregation_type: None,
            aggregation_model: None,
            aggregation_field: None,
            link: None,
        }
    }

    /// `master.master_id_field` references `slave.slave_id_field`.
    pub const fn one_to_one(
        field: &'static str,
        master_id_field: &'static str,
        source: SlaveSource,
        slave_model: &'static str,
        slave_id_field: &'static str,
    ) -> Self {
        Self::base(
            field,
            RelationKind::OneToOne,
            source,
            master_id_field,
            slave_model,
            slave_id_field,
        )
    }

    /// Like `one_to_one`, attaching `{id, name}` taken from `slave_name_field`.
    pub const fn dict(
        field: &'static str,
        master_id_field: &'static str,
        source: SlaveSource,
        slave_model: &'static str,
        slave_id_field: &'static str,
        slave_name_field: &'static str,
    ) -> Self {
        let mut info = Self::base(
            field,
            RelationKind::Dict,
            source,
            master_id_field,
            slave_model,
            slave_id_field,
        );
        info.slave_name_field = Some(slave_name_field);
        info
    }

    /// Look `master_id_field` up in the constant dictionary `dict_name`.
    pub const fn const_dict(
        field: &'static str,
        master_id_field: &'static str,
        dict_name: &'static str,
    ) -> Self {
        Self::base(
            field,
            RelationKind::ConstDict,
            SlaveSource::Const(dict_name),
            master_id_field,
            "",
            "",
        )
    }

    /// Aggregate `slave.aggregation_field` over slave rows whose
    /// `slave_id_field` equals the master id.
    pub const fn one_to_many_aggregation(
        field: &'static str,
        master_id_field: &'static str,
        source: SlaveSource,
        slave_model: &'static str,
        slave_id_field: &'static str,
        aggregation_type: i32,
        aggregation_field: &'static str,
    ) -> Self {
        let mut info = Self::base(
            field,
            RelationKind::OneToManyAggregation,
            source,
            master_id_field,
            slave_model,
            slave_id_field,
        );
        info.aggregation_type = Some(aggregation_type);
        info.aggregation_model = Some(slave_model);
        info.aggregation_field = Some(aggregation_field);
        info
    }

    /// Aggregate over slaves reached through `link`; `aggregation_model` is
    /// either the join-table model or the slave model.
    #[allow(clippy::too_many_arguments)]
    pub const fn many_to_many_aggregation(
        field: &'static str,
        master_id_field: &'static str,
        source: SlaveSource,
        slave_model: &'static str,
        slave_id_field: &'static str,
        link: LinkInfo,
        aggregation_model: &'static str,
        aggregation_type: i32,
        aggregation_field: &'static str,
    ) -> Self {
        let mut info = Self::base(
            field,
            RelationKind::ManyToManyAggregation,
            source,
            master_id_field,
            slave_model,
            slave_id_field,
        );
        info.link = Some(link);
        info.aggregation_type = Some(aggregation_type);
        info.aggregation_model = Some(aggregation_model);
        info.aggregation_field = Some(aggregation_field);
        info
    }

    /// Attach the raw join-table rows whose master column equals the master id.
    pub const fn many_to_many(field: &'static str, master_id_field: &'static str, link: LinkInfo) -> Self {
        let mut info = Self::base(
            field,
            RelationKind::ManyToMany,
            SlaveSource::Local,
            master_id_field,
            link.relation_model,
            link.relation_master_id_field,
        );
        info.link = Some(link);
        info
    }

    pub const fn equal_one_to_one(mut self, field: &'static str) -> Self {
        self.equal_one_to_one_field = Some(field);
        self
    }

    pub const fn load_slave_dict(mut self, value: bool) -> Self {
        self.load_slave_dict = value;
        self
    }

    pub const fn is_remote(&self) -> bool {
        matches!(self.source, SlaveSource::Remote(_))
    }
}

/// An entity type with its relation table.
#[derive(Debug, Clone)]
pub struct EntityDeclaration {
    pub meta: Arc<EntityMeta>,
    pub relations: Vec<RelationInfo>,
}

impl EntityDeclaration {
    pub fn new(meta: EntityMeta) -> Self {
        Self {
            meta: Arc::new(meta),
            relations: Vec::new(),
        }
    }

    pub fn relation(mut self, info: RelationInfo) -> Self {
        self.relations.push(info);
        self
    }

    pub fn relations(mut self, infos: &[RelationInfo]) -> Self {
        self.relations.extend_from_slice(infos);
        self
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }
}
