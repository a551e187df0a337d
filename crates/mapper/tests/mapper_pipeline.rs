use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use elif_mapper::{
    AttributeDefinition, AttributeType, BelongsToOptions, DatabasePool, DatabaseValue,
    HasManyOptions, ManyToManyOptions, Mapper, MapperConfig, Model, ModelDefinition, ModelError,
    OrmResult, QueryDescriptor, ResultRow, Schema, StatementOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Pool that records statements and replays queued outcomes
#[derive(Default)]
struct RecordingPool {
    responses: Mutex<VecDeque<OrmResult<StatementOutcome>>>,
    statements: Mutex<Vec<(String, Vec<DatabaseValue>)>>,
}

impl RecordingPool {
    fn queue(&self, outcome: OrmResult<StatementOutcome>) -> &Self {
        self.responses.lock().unwrap().push_back(outcome);
        self
    }

    fn rows(&self, rows: Vec<ResultRow>) -> &Self {
        self.queue(Ok(StatementOutcome::with_rows(rows)))
    }

    fn sql(&self, index: usize) -> String {
        self.statements.lock().unwrap()[index].0.clone()
    }

    fn params(&self, index: usize) -> Vec<DatabaseValue> {
        self.statements.lock().unwrap()[index].1.clone()
    }

    fn count(&self) -> usize {
        self.statements.lock().unwrap().len()
    }
}

#[async_trait]
impl DatabasePool for RecordingPool {
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<StatementOutcome> {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatementOutcome::default()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: Option<i64>,
    fullname: String,
    #[serde(default)]
    active: bool,
}

impl Model for User {
    fn definition() -> ModelDefinition {
        ModelDefinition::new("User")
            .table("users")
            .attr("id", AttributeType::Number)
            .attribute(AttributeDefinition::new("fullname", AttributeType::String).column("name"))
            .attr("active", AttributeType::Boolean)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup(config: MapperConfig) -> (Arc<RecordingPool>, Mapper) {
    init_tracing();
    let mut builder = Schema::builder();
    builder.register_model::<User>().unwrap();
    builder
        .register(
            ModelDefinition::new("Post")
                .table("posts")
                .attr("id", AttributeType::Number)
                .attr("title", AttributeType::String)
                .attr("user_id", AttributeType::Number),
        )
        .unwrap()
        .register(
            ModelDefinition::new("Tag")
                .table("tags")
                .attr("id", AttributeType::Number)
                .attr("label", AttributeType::String),
        )
        .unwrap()
        .has_many("User", "Post", HasManyOptions::new("user_id"))
        .unwrap()
        .belongs_to("Post", "User", BelongsToOptions::new("user_id").alias("author"))
        .unwrap()
        .many_to_many("Post", "Tag", ManyToManyOptions::new())
        .unwrap();

    let pool = Arc::new(RecordingPool::default());
    let mapper = Mapper::new(Arc::new(builder.build()), pool.clone(), config).unwrap();
    (pool, mapper)
}

#[tokio::test]
async fn typed_model_persists_and_reads_back() {
    let (pool, mapper) = setup(MapperConfig::default());
    pool.queue(Ok(StatementOutcome::inserted(9)))
        .rows(vec![ResultRow::new()
            .with("id", 9i64)
            .with("name", "alex")
            .with("active", 1i64)]);
    let users = mapper.for_model::<User>().unwrap();

    let user = User { id: None, fullname: "alex".to_string(), active: true };
    let mut instance = user.to_instance(Arc::clone(users.definition())).unwrap();
    users.persist(&mut instance).await.unwrap();

    assert_eq!(pool.sql(0), "INSERT INTO `users` (`name`, `active`) VALUES (?, ?)");
    assert_eq!(pool.params(0), vec![DatabaseValue::from("alex"), DatabaseValue::Int64(1)]);

    let found: User = users.find_model(9).await.unwrap();
    assert_eq!(found, User { id: Some(9), fullname: "alex".to_string(), active: true });
}

#[tokio::test]
async fn false_boolean_filter_matches_null_storage() {
    let (_pool, mapper) = setup(MapperConfig::default());
    let statement = mapper
        .model("User")
        .unwrap()
        .compile_query(QueryDescriptor::from_json(json!({"active": false})).unwrap())
        .unwrap();

    assert_eq!(
        statement.sql,
        "SELECT `users`.* FROM `users` WHERE `users`.`active` IS NULL LIMIT 50 OFFSET 0"
    );
    assert!(statement.params.is_empty());
}

#[tokio::test]
async fn relation_key_filter_joins_the_related_table() {
    let (pool, mapper) = setup(MapperConfig::default());
    pool.rows(vec![ResultRow::new().with("total", 1i64)])
        .rows(vec![ResultRow::new().with("id", 7i64).with("name", "alex")]);

    let page = mapper
        .model("User")
        .unwrap()
        .run_query(json!({"where": {"posts": 3}}))
        .await
        .unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.data.len(), 1);
    assert_eq!(
        pool.sql(0),
        "SELECT COUNT(DISTINCT `users`.`id`) AS `total` FROM `users` \
         INNER JOIN `posts` ON `posts`.`user_id` = `users`.`id` WHERE `posts`.`id` = ?"
    );
    assert!(pool.sql(1).starts_with(
        "SELECT `users`.* FROM `users` INNER JOIN `posts` ON `posts`.`user_id` = `users`.`id`"
    ));
}

#[tokio::test]
async fn nested_include_builds_parent_with_both_relations() {
    let (pool, mapper) = setup(MapperConfig::default());
    let row = |tag: i64, label: &str| {
        ResultRow::new()
            .with("posts_id", 1i64)
            .with("posts_title", "hello")
            .with("posts_user_id", 7i64)
            .with("author_id", 7i64)
            .with("author_name", "alex")
            .with("author__fk", 7i64)
            .with("tags_id", tag)
            .with("tags_label", label)
            .with("tags__fk", 1i64)
    };
    pool.rows(vec![ResultRow::new().with("total", 1i64)])
        .rows(vec![row(1, "rust"), row(2, "sql")]);

    let page = mapper
        .model("Post")
        .unwrap()
        .all(QueryDescriptor::new().include("author").include("tags"))
        .await
        .unwrap();

    assert_eq!(page.data.len(), 1);
    let post = &page.data[0];
    let author = post.relation("author").unwrap();
    assert_eq!(author.len(), 1);
    assert_eq!(author[0].get("fullname"), Some(&DatabaseValue::from("alex")));
    assert_eq!(post.relation("tags").unwrap().len(), 2);

    let sql = pool.sql(1);
    assert!(sql.contains("LEFT JOIN `users` AS `author` ON `author`.`id` = `posts`.`user_id`"));
    assert!(sql.contains(
        "LEFT JOIN `post_tag` AS `tags_through` ON `tags_through`.`post_id` = `posts`.`id`"
    ));
    assert!(sql.contains("INNER JOIN (SELECT DISTINCT `posts`.`id` FROM `posts` LIMIT 50 OFFSET 0)"));
    assert!(sql.contains("LEFT JOIN `tags` ON `tags`.`id` = `tags_through`.`tag_id`"));
}

#[tokio::test]
async fn deadlocks_past_the_cap_surface_to_the_caller() {
    let (pool, mapper) = setup(MapperConfig::default().with_max_conflict_retries(1));
    for _ in 0..3 {
        pool.queue(Err(ModelError::Database(
            "1213 (40001): Deadlock found when trying to get lock".to_string(),
        )));
    }

    let err = mapper.model("User").unwrap().find(1).await.unwrap_err();
    assert!(matches!(err, ModelError::Database(_)));
    assert_eq!(pool.count(), 2);
}

#[tokio::test]
async fn unknown_include_alias_is_ignored() {
    let (_pool, mapper) = setup(MapperConfig::default());
    let statement = mapper
        .model("User")
        .unwrap()
        .compile_query(QueryDescriptor::new().include("nonexistent"))
        .unwrap();
    assert!(!statement.sql.contains("JOIN"));
}

#[test]
fn invalid_config_is_rejected() {
    let mut builder = Schema::builder();
    builder.register_model::<User>().unwrap();
    let config = MapperConfig::default().with_default_limit(500);
    let result = Mapper::new(
        Arc::new(builder.build()),
        Arc::new(RecordingPool::default()),
        config,
    );
    assert!(matches!(result, Err(ModelError::Configuration(_))));
}
