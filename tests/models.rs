use firestore_connection::firestore::api::{DocumentBacked, LifecycleHooks};
use firestore_connection::firestore::model::FieldPath;
use firestore_connection::firestore::{
    FirestoreConnection, FirestoreValue, MapValue, ModelRepository,
};

/// Hand-written entity with its own id field.
#[derive(Default)]
struct Article {
    slug: Option<String>,
    exists: bool,
    attributes: MapValue,
    original: MapValue,
}

impl Article {
    fn titled(title: &str) -> Self {
        let mut article = Self::default();
        article.attributes.set(
            &FieldPath::from_dot_separated("title").unwrap(),
            FirestoreValue::from_string(title),
        );
        article
    }

    fn field(&self, name: &str) -> Option<&FirestoreValue> {
        self.attributes
            .get(&FieldPath::from_dot_separated(name).unwrap())
    }
}

impl DocumentBacked for Article {
    fn collection(&self) -> &str {
        "articles"
    }

    fn key_name(&self) -> &str {
        "slug"
    }

    fn document_id(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn exists(&self) -> bool {
        self.exists
    }

    fn attributes(&self) -> &MapValue {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut MapValue {
        &mut self.attributes
    }

    fn original(&self) -> &MapValue {
        &self.original
    }

    fn mark_persisted(&mut self, id: String) {
        self.slug = Some(id);
        self.exists = true;
        self.original = self.attributes.clone();
    }

    fn mark_deleted(&mut self) {
        self.exists = false;
    }
}

fn revision_hooks() -> LifecycleHooks<Article> {
    LifecycleHooks::new()
        .before_create(|article: &mut Article| {
            article.attributes_mut().set(
                &FieldPath::from_dot_separated("revision").unwrap(),
                FirestoreValue::from_integer(1),
            );
        })
        .before_update(|article: &mut Article| {
            let next = match article.field("revision").map(FirestoreValue::kind) {
                Some(firestore_connection::firestore::value::ValueKind::Integer(n)) => n + 1,
                _ => 1,
            };
            article.attributes_mut().set(
                &FieldPath::from_dot_separated("revision").unwrap(),
                FirestoreValue::from_integer(next),
            );
        })
}

#[tokio::test]
async fn custom_entities_round_trip_through_the_repository() {
    let connection = FirestoreConnection::in_memory("models");
    let repository = ModelRepository::new(connection.clone()).with_hooks(revision_hooks());

    let mut article = Article::titled("Hello");
    assert!(repository.save(&mut article).await.unwrap());
    let slug = article.document_id().unwrap().to_string();
    assert_eq!(article.field("slug"), Some(&FirestoreValue::from_string(slug.clone())));

    article.attributes_mut().set(
        &FieldPath::from_dot_separated("title").unwrap(),
        FirestoreValue::from_string("Hello again"),
    );
    assert!(repository.save(&mut article).await.unwrap());

    let stored = connection
        .document(&format!("articles/{slug}"))
        .unwrap()
        .snapshot()
        .await
        .unwrap();
    assert_eq!(stored.get("title"), Some(FirestoreValue::from_string("Hello again")));
    assert_eq!(stored.get("revision"), Some(FirestoreValue::from_integer(2)));

    assert!(repository.delete(&mut article).await.unwrap());
    assert!(!article.exists());
    assert_eq!(connection.table("articles").count().await.unwrap(), 0);
}

#[tokio::test]
async fn saved_models_scope_collection_group_queries() {
    let connection = FirestoreConnection::in_memory("models");
    let repository = ModelRepository::new(connection.clone());

    let mut article = Article::titled("Scoped");
    repository.save(&mut article).await.unwrap();
    let parent = article.document_path().unwrap();
    connection
        .table(&format!("{parent}/comments"))
        .insert(vec![MapValue::default(), MapValue::default()])
        .await
        .unwrap();
    connection
        .table("articles/other/comments")
        .insert(MapValue::default())
        .await
        .unwrap();

    let scoped = connection
        .table("comments")
        .in_document(article.document_scope())
        .unwrap();
    assert_eq!(scoped.count().await.unwrap(), 2);
    assert_eq!(connection.collection_group("comments").unwrap().count().await.unwrap(), 3);
}
