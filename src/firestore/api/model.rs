use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use chrono::Utc;

use crate::firestore::error::{invalid_argument, invalid_collection_path, FirestoreResult};
use crate::firestore::model::FieldPath;
use crate::firestore::mutation::DirtyFieldDiffer;
use crate::firestore::value::{FirestoreValue, MapValue};

use super::builder::QueryBuilder;
use super::connection::FirestoreConnection;
use super::reference::DocumentScope;
use super::snapshot::DocumentSnapshot;

/// Capability of an entity that is stored as one document.
///
/// The repository only talks to entities through this trait. `original` is the
/// last state known to be in the store and drives dirty tracking.
pub trait DocumentBacked: Send + Sync {
    fn collection(&self) -> &str;

    /// Field that mirrors the document id inside the stored data.
    fn key_name(&self) -> &str {
        "id"
    }

    fn document_id(&self) -> Option<&str>;

    fn exists(&self) -> bool;

    fn attributes(&self) -> &MapValue;

    fn attributes_mut(&mut self) -> &mut MapValue;

    fn original(&self) -> &MapValue;

    /// Called after a successful write: the entity now lives at `id` and its
    /// current attributes are the stored state.
    fn mark_persisted(&mut self, id: String);

    fn mark_deleted(&mut self);

    fn document_path(&self) -> Option<String> {
        self.document_id()
            .map(|id| format!("{}/{id}", self.collection().trim_matches('/')))
    }

    fn document_scope(&self) -> DocumentScope {
        DocumentScope::Model(self.document_path())
    }
}

type Hook<M> = Arc<dyn Fn(&mut M) + Send + Sync>;

/// Callbacks the repository runs right before writing an entity.
pub struct LifecycleHooks<M> {
    before_create: Vec<Hook<M>>,
    before_update: Vec<Hook<M>>,
}

impl<M> Default for LifecycleHooks<M> {
    fn default() -> Self {
        Self {
            before_create: Vec::new(),
            before_update: Vec::new(),
        }
    }
}

impl<M> Clone for LifecycleHooks<M> {
    fn clone(&self) -> Self {
        Self {
            before_create: self.before_create.clone(),
            before_update: self.before_update.clone(),
        }
    }
}

impl<M> Debug for LifecycleHooks<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("before_create", &self.before_create.len())
            .field("before_update", &self.before_update.len())
            .finish()
    }
}

impl<M> LifecycleHooks<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_create(mut self, hook: impl Fn(&mut M) + Send + Sync + 'static) -> Self {
        self.before_create.push(Arc::new(hook));
        self
    }

    pub fn before_update(mut self, hook: impl Fn(&mut M) + Send + Sync + 'static) -> Self {
        self.before_update.push(Arc::new(hook));
        self
    }

    fn run_before_create(&self, model: &mut M) {
        for hook in &self.before_create {
            hook(model);
        }
    }

    fn run_before_update(&self, model: &mut M) {
        for hook in &self.before_update {
            hook(model);
        }
    }
}

impl<M: DocumentBacked> LifecycleHooks<M> {
    /// Stamps `created_at` and `updated_at` on create, `updated_at` on update.
    pub fn timestamps() -> Self {
        Self::new()
            .before_create(|model: &mut M| {
                let now = FirestoreValue::from(Utc::now());
                stamp(model.attributes_mut(), CREATED_AT, now.clone());
                stamp(model.attributes_mut(), UPDATED_AT, now);
            })
            .before_update(|model: &mut M| {
                stamp(model.attributes_mut(), UPDATED_AT, FirestoreValue::from(Utc::now()));
            })
    }
}

const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

fn stamp(attributes: &mut MapValue, field: &str, value: FirestoreValue) {
    if let Ok(path) = FieldPath::from_dot_separated(field) {
        attributes.set(&path, value);
    }
}

/// Persists [`DocumentBacked`] entities through the query builder.
pub struct ModelRepository<M> {
    connection: FirestoreConnection,
    hooks: LifecycleHooks<M>,
    differ: DirtyFieldDiffer,
}

impl<M> Clone for ModelRepository<M> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            hooks: self.hooks.clone(),
            differ: self.differ,
        }
    }
}

impl<M: DocumentBacked> ModelRepository<M> {
    pub fn new(connection: FirestoreConnection) -> Self {
        Self {
            connection,
            hooks: LifecycleHooks::default(),
            differ: DirtyFieldDiffer::strict(),
        }
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks<M>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Compares floats loosely when detecting dirty fields.
    pub fn with_loose_comparison(mut self) -> Self {
        self.differ = DirtyFieldDiffer::loose();
        self
    }

    pub fn connection(&self) -> &FirestoreConnection {
        &self.connection
    }

    /// Query builder over the entity's collection.
    pub fn query(&self, model: &M) -> QueryBuilder {
        self.connection.table(model.collection())
    }

    /// Query builder over the collection `name` directly under the entity's
    /// document, e.g. `users/ann/posts`. The entity must have been saved.
    pub fn sub_collection(&self, model: &M, name: &str) -> FirestoreResult<QueryBuilder> {
        let name = name.trim_matches('/');
        if name.is_empty() || name.contains('/') {
            return Err(invalid_collection_path(format!(
                "Subcollection name '{name}' must be a single path segment"
            )));
        }
        let parent = model.document_scope().resolve()?;
        Ok(self.connection.table(&format!("{parent}/{name}")))
    }

    /// Creates the document on first save, afterwards writes only the dirty
    /// fields. Returns whether anything was written.
    pub async fn save(&self, model: &mut M) -> FirestoreResult<bool> {
        if model.exists() {
            self.update(model).await
        } else {
            self.create(model).await
        }
    }

    /// Deletes the document and all of its subcollections.
    pub async fn delete(&self, model: &mut M) -> FirestoreResult<bool> {
        if !model.exists() {
            return Ok(false);
        }
        let id = self.persisted_id(model)?;
        let deleted = self.query(model).where_key(&id).delete().await?;
        model.mark_deleted();
        Ok(deleted > 0)
    }

    /// Reloads the attributes from the store. Returns `false` when the document
    /// no longer exists, in which case the entity is marked deleted.
    pub async fn refresh(&self, model: &mut M) -> FirestoreResult<bool> {
        let id = self.persisted_id(model)?;
        let snapshot = self.connection.document(&format!(
            "{}/{id}",
            model.collection().trim_matches('/')
        ))?
        .snapshot()
        .await?;
        match snapshot.into_map_value() {
            Some(data) => {
                *model.attributes_mut() = data;
                model.mark_persisted(id);
                Ok(true)
            }
            None => {
                model.mark_deleted();
                Ok(false)
            }
        }
    }

    async fn create(&self, model: &mut M) -> FirestoreResult<bool> {
        self.hooks.run_before_create(model);
        let mut record = model.attributes().clone();
        if let Some(id) = model.document_id() {
            record.set(&FieldPath::document_id(), FirestoreValue::from_string(id));
        }
        let key_name = model.key_name().to_string();
        let reference = self
            .query(model)
            .insert_get_id(record, Some(&key_name))
            .await?;
        let id = reference.id().to_string();
        model.attributes_mut().set(
            &FieldPath::from_dot_separated(&key_name)?,
            FirestoreValue::from_string(id.clone()),
        );
        model.mark_persisted(id);
        Ok(true)
    }

    async fn update(&self, model: &mut M) -> FirestoreResult<bool> {
        if !self.differ.is_dirty(model.original(), model.attributes()) {
            return Ok(false);
        }
        self.hooks.run_before_update(model);
        let dirty = self.differ.diff(model.original(), model.attributes());
        let id = self.persisted_id(model)?;
        let updated = self.query(model).where_key(&id).update(dirty).await?;
        model.mark_persisted(id);
        Ok(updated > 0)
    }

    fn persisted_id(&self, model: &M) -> FirestoreResult<String> {
        model
            .document_id()
            .map(str::to_string)
            .ok_or_else(|| invalid_argument("The model has not been saved yet"))
    }
}

/// Schema-less entity: a collection name plus a bag of attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentModel {
    collection: String,
    key_name: String,
    id: Option<String>,
    exists: bool,
    attributes: MapValue,
    original: MapValue,
}

impl DocumentModel {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key_name: "id".to_string(),
            id: None,
            exists: false,
            attributes: MapValue::default(),
            original: MapValue::default(),
        }
    }

    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    /// Uses `id` as the document id on first save instead of generating one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn from_snapshot(collection: impl Into<String>, snapshot: &DocumentSnapshot) -> Self {
        let mut model = Self::new(collection).with_id(snapshot.id());
        if let Some(data) = snapshot.map_value() {
            model.attributes = data.clone();
            model.original = data.clone();
            model.exists = true;
        }
        model
    }

    pub fn get(&self, field: &str) -> Option<&FirestoreValue> {
        let path = FieldPath::from_dot_separated(field).ok()?;
        self.attributes.get(&path)
    }

    pub fn set(
        &mut self,
        field: &str,
        value: impl Into<FirestoreValue>,
    ) -> FirestoreResult<&mut Self> {
        self.attributes
            .set(&FieldPath::from_dot_separated(field)?, value.into());
        Ok(self)
    }

    pub fn remove(&mut self, field: &str) -> FirestoreResult<bool> {
        Ok(self.attributes.remove(&FieldPath::from_dot_separated(field)?))
    }

    pub fn is_dirty(&self) -> bool {
        DirtyFieldDiffer::strict().is_dirty(&self.original, &self.attributes)
    }
}

impl DocumentBacked for DocumentModel {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn document_id(&self) -> Option<&str> {
        self.id.as_deref()
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
        self.id = Some(id);
        self.exists = true;
        self.original = self.attributes.clone();
    }

    fn mark_deleted(&mut self) {
        self.exists = false;
    }
}
