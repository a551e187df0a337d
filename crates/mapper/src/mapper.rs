//! Mapper - the full read/write pipeline for registered models
//!
//! `Mapper` holds the frozen schema, the statement executor and the SQL
//! compiler. `ModelMapper` binds it to one model and exposes the operations
//! callers use: compile, list with pagination, find, persist, update, remove
//! and relation accessors.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::assembly::RelationAssembler;
use crate::backends::{DatabasePool, DatabaseValue, StatementOutcome};
use crate::config::MapperConfig;
use crate::error::{ModelError, ModelResult};
use crate::execution::StatementExecutor;
use crate::hydration::ResultHydrator;
use crate::model::{Model, ModelDefinition, ModelInstance};
use crate::query::{
    map_columns, map_select_columns, CompiledStatement, IncludedRelation, MySqlCompiler,
    NormalizedQuery, QueryAst, QueryDescriptor, QueryNormalizer, QueryType, RelationExpander,
    SqlCompiler, WhereCondition,
};
use crate::relationships::{RelationDefinition, RelationKind};
use crate::schema::Schema;

/// One page of a collection query
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub data: Vec<ModelInstance>,
    pub limit: i64,
    pub offset: i64,
    /// Matching records across all pages
    pub total: i64,
}

impl Page {
    /// Convert every instance into a typed model
    pub fn models<M: DeserializeOwned>(&self) -> ModelResult<Vec<M>> {
        self.data.iter().map(ModelInstance::to_model).collect()
    }
}

/// What a single-result lookup searches by
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Primary key value
    Key(DatabaseValue),
    Query(QueryDescriptor),
}

impl From<DatabaseValue> for Lookup {
    fn from(value: DatabaseValue) -> Self {
        Lookup::Key(value)
    }
}

impl From<i64> for Lookup {
    fn from(value: i64) -> Self {
        Lookup::Key(value.into())
    }
}

impl From<i32> for Lookup {
    fn from(value: i32) -> Self {
        Lookup::Key(value.into())
    }
}

impl From<&str> for Lookup {
    fn from(value: &str) -> Self {
        Lookup::Key(value.into())
    }
}

impl From<String> for Lookup {
    fn from(value: String) -> Self {
        Lookup::Key(value.into())
    }
}

impl From<QueryDescriptor> for Lookup {
    fn from(descriptor: QueryDescriptor) -> Self {
        Lookup::Query(descriptor)
    }
}

/// A compiled read, with everything needed to turn its rows into instances
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub statement: CompiledStatement,
    /// Count over the same filters (selects only)
    pub count: Option<CompiledStatement>,
    pub included: Vec<IncludedRelation>,
    pub base_alias: String,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub struct Mapper {
    schema: Arc<Schema>,
    executor: StatementExecutor,
    compiler: Arc<dyn SqlCompiler>,
    normalizer: QueryNormalizer,
    config: MapperConfig,
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("compiler", &self.compiler)
            .field("config", &self.config)
            .finish()
    }
}

impl Mapper {
    /// Mapper over `schema`, issuing statements through `pool`
    pub fn new(
        schema: Arc<Schema>,
        pool: Arc<dyn DatabasePool>,
        config: MapperConfig,
    ) -> ModelResult<Self> {
        config.validate()?;
        Ok(Self {
            executor: StatementExecutor::new(pool, config.max_conflict_retries),
            normalizer: QueryNormalizer::new(&config),
            compiler: Arc::new(MySqlCompiler::new()),
            schema,
            config,
        })
    }

    /// Use a different SQL dialect
    pub fn with_compiler(mut self, compiler: Arc<dyn SqlCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn executor(&self) -> &StatementExecutor {
        &self.executor
    }

    /// Operations for the model registered as `name`
    pub fn model(&self, name: &str) -> ModelResult<ModelMapper<'_>> {
        let definition = Arc::clone(self.schema.definition(name)?);
        Ok(ModelMapper {
            mapper: self,
            definition,
        })
    }

    /// Operations for a typed model
    pub fn for_model<M: Model>(&self) -> ModelResult<ModelMapper<'_>> {
        self.model(&M::model_name())
    }

    fn compile(&self, mut ast: QueryAst) -> ModelResult<CompiledStatement> {
        map_columns(&mut ast, &self.schema);
        self.compiler.compile(&ast)
    }

    async fn run(&self, statement: &CompiledStatement) -> ModelResult<StatementOutcome> {
        self.executor.execute(statement).await
    }
}

/// A `Mapper` bound to one model
#[derive(Debug, Clone)]
pub struct ModelMapper<'m> {
    mapper: &'m Mapper,
    definition: Arc<ModelDefinition>,
}

impl<'m> ModelMapper<'m> {
    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    /// New unsaved instance of this model
    pub fn new_instance<I, K, V>(&self, attrs: I) -> ModelInstance
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        ModelInstance::new(Arc::clone(&self.definition), attrs)
    }

    /// Descriptor to statement, without touching the database
    pub fn compile_query(&self, descriptor: QueryDescriptor) -> ModelResult<CompiledStatement> {
        let query = self.mapper.normalizer.normalize(descriptor)?;
        Ok(self.prepare_normalized(query)?.statement)
    }

    /// Normalize, expand and compile a descriptor
    pub fn prepare(&self, descriptor: QueryDescriptor) -> ModelResult<PreparedQuery> {
        let query = self.mapper.normalizer.normalize(descriptor)?;
        self.prepare_normalized(query)
    }

    fn prepare_normalized(&self, query: NormalizedQuery) -> ModelResult<PreparedQuery> {
        let (limit, offset) = (query.limit, query.offset);
        let expanded = RelationExpander::new(&self.mapper.schema, self.mapper.config.date_storage)
            .expand(&self.definition, query)?;

        let count = match expanded.count {
            Some(mut count) => {
                map_select_columns(&mut count, &self.mapper.schema);
                Some(self.mapper.compiler.compile(&QueryAst::Select(count))?)
            }
            None => None,
        };

        Ok(PreparedQuery {
            statement: self.mapper.compile(expanded.ast)?,
            count,
            included: expanded.included,
            base_alias: expanded.base_alias,
            limit,
            offset,
        })
    }

    /// Execute a prepared read and build instances with their relations
    async fn fetch(&self, prepared: &PreparedQuery) -> ModelResult<Vec<ModelInstance>> {
        let outcome = self.mapper.run(&prepared.statement).await?;
        if prepared.included.is_empty() {
            let hydrator = ResultHydrator::plain(Arc::clone(&self.definition));
            return hydrator.hydrate_instances(&outcome.rows);
        }

        let hydrator = ResultHydrator::nested(
            Arc::clone(&self.definition),
            prepared.base_alias.as_str(),
            &prepared.included,
        );
        let rows = hydrator.hydrate(&outcome.rows)?;
        Ok(RelationAssembler::new().assemble(rows, &prepared.included))
    }

    async fn page(&self, prepared: PreparedQuery) -> ModelResult<Page> {
        let total = match &prepared.count {
            Some(count) => {
                let outcome = self.mapper.run(count).await?;
                outcome
                    .rows
                    .first()
                    .and_then(|row| row.get("total"))
                    .and_then(DatabaseValue::as_i64)
                    .unwrap_or(0)
            }
            None => 0,
        };
        let data = self.fetch(&prepared).await?;

        Ok(Page {
            data,
            limit: prepared.limit.unwrap_or(self.mapper.config.default_limit),
            offset: prepared.offset.unwrap_or(0),
            total,
        })
    }

    /// Collection query: count, then the requested page
    pub async fn all(&self, descriptor: QueryDescriptor) -> ModelResult<Page> {
        let prepared = self.prepare(descriptor)?;
        self.page(prepared).await
    }

    /// Alias of `all`, for descriptors that arrive as JSON
    pub async fn run_query(&self, descriptor: serde_json::Value) -> ModelResult<Page> {
        self.all(QueryDescriptor::from_json(descriptor)?).await
    }

    /// Single result by primary key or descriptor; no rows is `NotFound`
    pub async fn find(&self, lookup: impl Into<Lookup>) -> ModelResult<ModelInstance> {
        let lookup = lookup.into();
        let (mut query, key) = match lookup {
            Lookup::Key(value) => {
                let mut query = self.mapper.normalizer.normalize(QueryDescriptor::new())?;
                query.conditions.push(WhereCondition::equal(
                    self.definition.primary_key_name(),
                    value.clone(),
                ));
                (query, value.to_string())
            }
            Lookup::Query(descriptor) => {
                let key = serde_json::Value::Object(descriptor.as_map().clone()).to_string();
                (self.mapper.normalizer.normalize(descriptor)?, key)
            }
        };

        // with includes the limit applies to parent keys, not joined rows
        query.limit = Some(1);

        let prepared = self.prepare_normalized(query)?;
        self.fetch(&prepared)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::not_found(&self.definition.table_name(), key))
    }

    /// Typed `find`
    pub async fn find_model<M: Model>(&self, lookup: impl Into<Lookup>) -> ModelResult<M> {
        M::from_instance(&self.find(lookup).await?)
    }

    fn check_instance(&self, instance: &ModelInstance) -> ModelResult<()> {
        if instance.definition().name() == self.definition.name() {
            Ok(())
        } else {
            Err(ModelError::Query(format!(
                "{} instance passed to the {} mapper",
                instance.definition().name(),
                self.definition.name()
            )))
        }
    }

    /// Insert the instance; adopts the generated key and returns the stored attributes
    pub async fn persist(
        &self,
        instance: &mut ModelInstance,
    ) -> ModelResult<Vec<(String, DatabaseValue)>> {
        self.check_instance(instance)?;

        let mut query = NormalizedQuery::new(QueryType::Insert);
        query.values = instance
            .attributes()
            .into_iter()
            .map(|(name, value)| (name.to_string(), Some(value.clone())))
            .collect();

        let statement = self.prepare_normalized(query)?.statement;
        let outcome = self.mapper.run(&statement).await?;

        if let Some(id) = outcome.last_insert_id {
            let id = DatabaseValue::from(id);
            debug!(model = %self.definition.name(), id = %id, "inserted record");
            instance.set_primary_key(id);
        }
        instance.clear_changes();

        Ok(instance
            .attributes()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect())
    }

    /// Write changed attributes; returns affected rows (0 when nothing changed)
    pub async fn apply_update(&self, instance: &mut ModelInstance) -> ModelResult<u64> {
        self.check_instance(instance)?;
        let key = instance.primary_key().cloned().ok_or(ModelError::MissingPrimaryKey)?;
        let pk_name = self.definition.primary_key_name();

        let mut query = NormalizedQuery::new(QueryType::Update);
        query.values = instance
            .changed()
            .into_iter()
            .filter(|(name, _)| *name != pk_name)
            .map(|(name, value)| (name.to_string(), Some(value.clone())))
            .collect();
        if query.values.is_empty() {
            debug!(model = %self.definition.name(), "no changes to write");
            return Ok(0);
        }
        query.conditions.push(WhereCondition::equal(pk_name, key));

        let statement = self.prepare_normalized(query)?.statement;
        let outcome = self.mapper.run(&statement).await?;
        instance.clear_changes();
        Ok(outcome.rows_affected)
    }

    /// Delete the instance's row by primary key
    pub async fn remove(&self, instance: &ModelInstance) -> ModelResult<u64> {
        self.check_instance(instance)?;
        let key = instance.primary_key().cloned().ok_or(ModelError::MissingPrimaryKey)?;

        let mut query = NormalizedQuery::new(QueryType::Delete);
        query
            .conditions
            .push(WhereCondition::equal(self.definition.primary_key_name(), key));

        let statement = self.prepare_normalized(query)?.statement;
        Ok(self.mapper.run(&statement).await?.rows_affected)
    }

    /// Accessor for the relation declared on this model under `alias`
    pub fn relation(&self, alias: &str) -> ModelResult<RelationAccessor<'m>> {
        let relation = self
            .mapper
            .schema
            .relation(self.definition.name(), alias)
            .cloned()
            .ok_or_else(|| {
                ModelError::Relationship(format!(
                    "{} has no relation named '{}'",
                    self.definition.name(),
                    alias
                ))
            })?;
        Ok(RelationAccessor {
            target: self.mapper.model(&relation.target)?,
            relation,
        })
    }
}

/// Resolves one relation for instances of its owning model
#[derive(Debug, Clone)]
pub struct RelationAccessor<'m> {
    relation: RelationDefinition,
    target: ModelMapper<'m>,
}

impl<'m> RelationAccessor<'m> {
    pub fn relation(&self) -> &RelationDefinition {
        &self.relation
    }

    /// Target query restricted to what `owner` relates to
    fn scoped_query(
        &self,
        owner: &ModelInstance,
        query: Option<QueryDescriptor>,
    ) -> ModelResult<NormalizedQuery> {
        let mut normalized = self
            .target
            .mapper
            .normalizer
            .normalize(query.unwrap_or_default())?;

        let condition = match self.relation.kind {
            RelationKind::BelongsTo => {
                let key = owner
                    .get(&self.relation.foreign_key)
                    .filter(|value| !value.is_null())
                    .cloned()
                    .ok_or_else(|| {
                        ModelError::not_found(&self.target.definition.table_name(), "NULL")
                    })?;
                WhereCondition::equal(self.target.definition.primary_key_name(), key)
            }
            RelationKind::HasMany | RelationKind::ManyToMany => {
                let key = owner.primary_key().cloned().ok_or(ModelError::MissingPrimaryKey)?;
                WhereCondition::equal(self.relation.foreign_key.as_str(), key)
            }
        };
        normalized.conditions.push(condition);
        Ok(normalized)
    }

    /// Statement the accessor would run for `owner`
    pub fn compile(
        &self,
        owner: &ModelInstance,
        query: Option<QueryDescriptor>,
    ) -> ModelResult<CompiledStatement> {
        let normalized = self.scoped_query(owner, query)?;
        Ok(self.target.prepare_normalized(normalized)?.statement)
    }

    /// Related collection for `owner`
    pub async fn all(
        &self,
        owner: &ModelInstance,
        query: Option<QueryDescriptor>,
    ) -> ModelResult<Page> {
        let normalized = self.scoped_query(owner, query)?;
        let prepared = self.target.prepare_normalized(normalized)?;
        self.target.page(prepared).await
    }

    /// The parent of a belongs-to relation
    pub async fn get(&self, owner: &ModelInstance) -> ModelResult<ModelInstance> {
        if self.relation.kind != RelationKind::BelongsTo {
            return Err(ModelError::Relationship(format!(
                "'{}' is a collection; use `all`",
                self.relation.alias
            )));
        }
        let key = owner
            .get(&self.relation.foreign_key)
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| ModelError::not_found(&self.target.definition.table_name(), "NULL"))?;
        self.target.find(Lookup::Key(key)).await
    }

    /// Unsaved target instance with the foreign key pointing at `owner`
    pub fn create<I, K, V>(&self, owner: &ModelInstance, attrs: I) -> ModelResult<ModelInstance>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        if self.relation.kind == RelationKind::BelongsTo || self.relation.through.is_some() {
            return Err(ModelError::Relationship(format!(
                "'{}' cannot create related records directly",
                self.relation.alias
            )));
        }
        let key = owner.primary_key().cloned().ok_or(ModelError::MissingPrimaryKey)?;
        let mut instance = self.target.new_instance(attrs);
        instance.set(self.relation.foreign_key.as_str(), key);
        Ok(instance)
    }
}
