//! The live object store.
//!
//! Objects are addressed by generational [`ObjectHandle`]s. The store keeps
//! a name index, a type index and a bidirectional [`ReferenceGraph`] in step
//! with every mutation:
//!
//! - **add**: reference fields are resolved by name among the types each
//!   field may target; misses are filed as unresolved and picked up when a
//!   matching object is added or renamed later.
//! - **set_field**: a changed reference field is re-resolved; a changed name
//!   field rewrites every field that pointed at the object.
//! - **remove**: referencing fields keep the stale text and are re-resolved
//!   against what is left ([`RemovalPolicy::Detach`]), or objects left with a
//!   dangling required reference are removed too ([`RemovalPolicy::Cascade`]).
//!
//! ```rust,ignore
//! let zone = store.add(zone_instance)?;
//! let wall = store.add(wall_instance)?;          // wall's zone field says "Z1"
//! assert_eq!(store.resolve(wall, 1).map(|o| o.handle()), Some(zone));
//! store.set_field(zone, 0, "Z1b")?;              // wall's field now reads "Z1b"
//! ```

use crate::catalog::{CatalogError, SchemaCatalog};
use crate::collection::{InstanceCollection, Record};
use crate::config::{RemovalPolicy, StoreConfig};
use crate::event::{EventBus, EventFilter, Listener, StoreEvent, SubscriberPriority};
use crate::field::FieldSpec;
use crate::id::{ObjectHandle, ObjectTypeId, SubscriptionId};
use crate::instance::Instance;
use crate::naming;
use crate::refs::{InboundRef, OutboundRef, ReferenceGraph};
use crate::schema::ObjectSchema;
use crate::text::{self, ParseError, RawRecord};
use crate::validity::{self, Strictness, ValidityReport};
use slotmap::SlotMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0:?}")]
    ObjectNotFound(ObjectHandle),
    #[error("field {field} is out of range for {type_name}")]
    FieldOutOfRange { type_name: String, field: usize },
    #[error("value '{0}' contains a grammar delimiter")]
    InvalidValue(String),
    #[error("{0} is not extensible")]
    NotExtensible(String),
    #[error("{type_name} has no extensible group {group}")]
    NoSuchGroup { type_name: String, group: usize },
    #[error("{type_name} groups hold {size} values, got {given}")]
    GroupTooLarge {
        type_name: String,
        size: usize,
        given: usize,
    },
    #[error("custom order is not a permutation of the live objects")]
    InvalidOrder,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// Iteration order for [`Store::objects`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Order {
    /// Load / insertion order.
    #[default]
    Declaration,
    /// The order set by [`Store::set_custom_order`], or declaration order
    /// when none is set.
    Custom,
    /// By type id, then declaration order.
    ByType,
}

/// An object held by a [`Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    handle: ObjectHandle,
    instance: Instance,
    name_field: Option<usize>,
}

impl StoredObject {
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn type_id(&self) -> ObjectTypeId {
        self.instance.type_id()
    }

    pub fn name(&self) -> Option<&str> {
        self.name_field.and_then(|i| self.instance.get(i))
    }

    pub fn get(&self, field: usize) -> Option<&str> {
        self.instance.get(field)
    }
}

#[derive(Debug)]
pub struct Store {
    catalog: Arc<SchemaCatalog>,
    config: StoreConfig,
    objects: SlotMap<ObjectHandle, StoredObject>,
    declaration: Vec<ObjectHandle>,
    custom: Option<Vec<ObjectHandle>>,
    /// Lower-cased name -> objects carrying it, in the order they took it.
    by_name: HashMap<String, Vec<ObjectHandle>>,
    by_type: HashMap<ObjectTypeId, Vec<ObjectHandle>>,
    refs: ReferenceGraph,
    header: Option<String>,
    trailing_comment: Option<String>,
    /// Catchall records, printed after the objects.
    unrecognized: Vec<RawRecord>,
    events: EventBus,
}

impl Store {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self::with_config(catalog, StoreConfig::default())
    }

    pub fn with_config(catalog: Arc<SchemaCatalog>, config: StoreConfig) -> Self {
        Self {
            catalog,
            config,
            objects: SlotMap::with_key(),
            declaration: Vec::new(),
            custom: None,
            by_name: HashMap::new(),
            by_type: HashMap::new(),
            refs: ReferenceGraph::new(),
            header: None,
            trailing_comment: None,
            unrecognized: Vec::new(),
            events: EventBus::new(),
        }
    }

    /// Parse instance text straight into a store.
    pub fn parse(input: &str, catalog: Arc<SchemaCatalog>, config: StoreConfig) -> Result<Self, ParseError> {
        let collection = InstanceCollection::parse(input, &catalog, config.unknown_types)?;
        Ok(Self::from_collection(catalog, collection, config))
    }

    /// Promote a parsed collection. Comment-only blocks are folded into the
    /// record comment of the record that follows them.
    pub fn from_collection(
        catalog: Arc<SchemaCatalog>,
        collection: InstanceCollection,
        config: StoreConfig,
    ) -> Self {
        let mut store = Self::with_config(catalog, config);
        let (header, records) = collection.into_records();
        store.header = header;

        let mut pending: Vec<String> = Vec::new();
        for record in records {
            match record {
                Record::Comment(text) => pending.push(text),
                Record::Object(mut instance) => {
                    if !pending.is_empty() {
                        pending.extend(instance.record_comment().map(str::to_string));
                        instance.set_record_comment(Some(&pending.join("\n")));
                        pending.clear();
                    }
                    if let Err(err) = store.insert(instance) {
                        debug!(target: "idfstore::store", error = %err, "skipped object of unknown type");
                    }
                }
                Record::Unknown(mut raw) => {
                    if !pending.is_empty() {
                        pending.extend(raw.record_comment.take());
                        raw.record_comment = Some(pending.join("\n"));
                        pending.clear();
                    }
                    store.unrecognized.push(raw);
                }
            }
        }
        if !pending.is_empty() {
            store.trailing_comment = Some(pending.join("\n"));
        }
        debug!(
            target: "idfstore::store",
            objects = store.objects.len(),
            unresolved = store.refs.unresolved_count(),
            "store built from collection"
        );
        store
    }

    // -----------------------------------------------------------------------
    // Adding
    // -----------------------------------------------------------------------

    /// Add an object. Unresolvable references are not an error.
    pub fn add(&mut self, instance: Instance) -> Result<ObjectHandle, StoreError> {
        let type_id = instance.type_id();
        let handle = self.insert(instance)?;
        self.emit(StoreEvent::ObjectAdded { handle, type_id });
        Ok(handle)
    }

    /// Add several objects. References among them resolve whatever their
    /// order. Nothing is added if any type is unknown.
    pub fn add_all(&mut self, instances: impl IntoIterator<Item = Instance>) -> Result<Vec<ObjectHandle>, StoreError> {
        let instances: Vec<Instance> = instances.into_iter().collect();
        for instance in &instances {
            self.catalog.object_schema(instance.type_id())?;
        }
        instances.into_iter().map(|i| self.add(i)).collect()
    }

    /// Add a default-filled object of `type_id`, named with
    /// [`next_name`](Self::next_name) when the type is nameable.
    pub fn new_object(&mut self, type_id: ObjectTypeId) -> Result<ObjectHandle, StoreError> {
        let catalog = Arc::clone(&self.catalog);
        let schema = catalog.object_schema(type_id)?;
        let mut instance = Instance::with_defaults(schema);
        if let Some(field) = schema.name_field() {
            let name = self.next_name(&schema.name);
            instance.set(schema, field, &name);
        }
        self.add(instance)
    }

    /// `"{base} {n}"` with the smallest suffix no object uses yet.
    pub fn next_name(&self, base: &str) -> String {
        naming::next_name(base, self.by_name.keys().map(String::as_str))
    }

    fn insert(&mut self, instance: Instance) -> Result<ObjectHandle, StoreError> {
        let catalog = Arc::clone(&self.catalog);
        let type_id = instance.type_id();
        let schema = catalog.object_schema(type_id)?;
        let name_field = schema.name_field();
        let name_key = name_field
            .and_then(|i| instance.get(i))
            .map(str::to_ascii_lowercase);

        let handle = self.objects.insert_with_key(|handle| StoredObject {
            handle,
            instance,
            name_field,
        });
        self.declaration.push(handle);
        if let Some(custom) = self.custom.as_mut() {
            custom.push(handle);
        }
        self.by_type.entry(type_id).or_default().push(handle);
        if let Some(key) = &name_key {
            self.by_name.entry(key.clone()).or_default().push(handle);
        }

        self.index_references(handle);
        if let Some(key) = &name_key {
            self.resolve_waiting(key);
        }
        Ok(handle)
    }

    /// Add `instance` unless an equivalent object is already present, and
    /// return whichever handle holds it.
    ///
    /// A unique type's existing object is always the equivalent. Otherwise
    /// candidates share the type and, when `instance` is named, the name;
    /// they match when every value agrees.
    pub fn insert_object(&mut self, instance: Instance) -> Result<ObjectHandle, StoreError> {
        let catalog = Arc::clone(&self.catalog);
        let schema = catalog.object_schema(instance.type_id())?;
        if let Some(existing) = self.equivalent_object(schema, &instance) {
            debug!(
                target: "idfstore::store",
                object = ?existing,
                type_name = %schema.name,
                "insert matched an existing object"
            );
            return Ok(existing);
        }
        self.add(instance)
    }

    fn equivalent_object(&self, schema: &ObjectSchema, instance: &Instance) -> Option<ObjectHandle> {
        let type_id = instance.type_id();
        if schema.unique {
            return self.by_type.get(&type_id).and_then(|list| list.first().copied());
        }
        let candidates: Vec<&StoredObject> = match instance.name(schema) {
            Some(name) => self.object_by_type_and_name(type_id, name).into_iter().collect(),
            None => self.objects_of_type(type_id),
        };
        candidates
            .into_iter()
            .find(|candidate| same_values(schema, candidate.instance(), instance))
            .map(StoredObject::handle)
    }

    // -----------------------------------------------------------------------
    // Copying
    // -----------------------------------------------------------------------

    /// A copy sharing the catalog and keeping every handle. Subscribers are
    /// not carried over.
    pub fn duplicate(&self) -> Store {
        Store {
            catalog: Arc::clone(&self.catalog),
            config: self.config,
            objects: self.objects.clone(),
            declaration: self.declaration.clone(),
            custom: self.custom.clone(),
            by_name: self.by_name.clone(),
            by_type: self.by_type.clone(),
            refs: self.refs.clone(),
            header: self.header.clone(),
            trailing_comment: self.trailing_comment.clone(),
            unrecognized: self.unrecognized.clone(),
            events: EventBus::new(),
        }
    }

    /// A new store holding copies of `handles`, added in the order given.
    /// References to objects left behind come out unresolved. Returns the
    /// copy and, for each entry of `handles`, its handle in the copy.
    pub fn clone_subset(&self, handles: &[ObjectHandle]) -> Result<(Store, Vec<ObjectHandle>), StoreError> {
        let mut subset = Store::with_config(Arc::clone(&self.catalog), self.config);
        subset.header = self.header.clone();
        let mut copied: HashMap<ObjectHandle, ObjectHandle> = HashMap::new();
        let mut mapped = Vec::with_capacity(handles.len());
        for &handle in handles {
            let object = self
                .objects
                .get(handle)
                .ok_or(StoreError::ObjectNotFound(handle))?;
            let target = match copied.get(&handle) {
                Some(&target) => target,
                None => {
                    let target = subset.insert(object.instance.clone())?;
                    copied.insert(handle, target);
                    target
                }
            };
            mapped.push(target);
        }
        debug!(
            target: "idfstore::store",
            objects = subset.len(),
            unresolved = subset.refs.unresolved_count(),
            "cloned subset"
        );
        Ok((subset, mapped))
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Set one field. Empty text clears it.
    ///
    /// Changing a reference field re-resolves it. Changing the name field
    /// rewrites every field that referenced the object; clearing it leaves
    /// those fields holding the old name, re-resolved like after a removal.
    pub fn set_field(&mut self, handle: ObjectHandle, field: usize, value: &str) -> Result<(), StoreError> {
        if !text::is_storable(value) {
            return Err(StoreError::InvalidValue(value.to_string()));
        }
        let catalog = Arc::clone(&self.catalog);
        let object = self
            .objects
            .get_mut(handle)
            .ok_or(StoreError::ObjectNotFound(handle))?;
        let schema = catalog.object_schema(object.type_id())?;
        let old = object.instance.get(field).map(str::to_string);
        let old_groups = object.instance.extensible_group_count(schema);
        if !object.instance.set(schema, field, value) {
            return Err(StoreError::FieldOutOfRange {
                type_name: schema.name.clone(),
                field,
            });
        }
        let new = object.instance.get(field).map(str::to_string);
        let groups = object.instance.extensible_group_count(schema);
        if groups != old_groups {
            self.emit(StoreEvent::ExtensibleGroupsChanged { handle, groups });
        }
        if old == new {
            return Ok(());
        }

        if schema.field_spec(field).is_some_and(FieldSpec::is_reference) {
            self.refs.unlink(handle, field);
            if let Some(text) = &new {
                self.link_field(handle, field, &text.to_ascii_lowercase());
            }
        }
        self.emit(StoreEvent::FieldChanged {
            handle,
            field,
            old: old.clone(),
            new: new.clone(),
        });
        if schema.name_field() == Some(field) {
            self.rename(handle, old.as_deref(), new.as_deref());
            self.emit(StoreEvent::ObjectRenamed { handle, old, new });
        }
        Ok(())
    }

    fn rename(&mut self, handle: ObjectHandle, old: Option<&str>, new: Option<&str>) {
        if let Some(old) = old {
            self.unindex_name(handle, &old.to_ascii_lowercase());
        }
        let Some(new) = new else {
            // Nameless objects cannot be targeted; their referrers keep the
            // old text.
            for entry in self.refs.detach_inbound(handle) {
                self.relink_from_text(entry);
            }
            return;
        };

        let key = new.to_ascii_lowercase();
        self.by_name.entry(key.clone()).or_default().push(handle);
        let catalog = Arc::clone(&self.catalog);
        let inbound: Vec<InboundRef> = self.refs.inbound(handle).collect();
        for entry in &inbound {
            let Some(source) = self.objects.get_mut(entry.source) else {
                continue;
            };
            if let Ok(schema) = catalog.object_schema(source.type_id()) {
                source.instance.set(schema, entry.field, new);
            }
        }
        debug!(
            target: "idfstore::store",
            object = ?handle,
            new_name = %new,
            rewritten = inbound.len(),
            "rename propagated to referencing fields"
        );
        for entry in inbound {
            self.emit(StoreEvent::ReferenceRewritten {
                source: entry.source,
                field: entry.field,
                target: handle,
            });
        }
        self.resolve_waiting(&key);
    }

    /// Append an extensible group to an object.
    pub fn push_extensible_group(&mut self, handle: ObjectHandle, values: &[&str]) -> Result<usize, StoreError> {
        if let Some(bad) = values.iter().find(|v| !text::is_storable(v)) {
            return Err(StoreError::InvalidValue(bad.to_string()));
        }
        let catalog = Arc::clone(&self.catalog);
        let object = self
            .objects
            .get_mut(handle)
            .ok_or(StoreError::ObjectNotFound(handle))?;
        let schema = catalog.object_schema(object.type_id())?;
        if !schema.is_extensible() {
            return Err(StoreError::NotExtensible(schema.name.clone()));
        }
        let group = object
            .instance
            .push_extensible_group(schema, values)
            .ok_or_else(|| StoreError::GroupTooLarge {
                type_name: schema.name.clone(),
                size: schema.group_size(),
                given: values.len(),
            })?;
        self.reindex_references(handle);
        self.emit(StoreEvent::ExtensibleGroupsChanged {
            handle,
            groups: group + 1,
        });
        Ok(group)
    }

    /// Remove extensible group `group`, shifting later groups down.
    pub fn remove_extensible_group(
        &mut self,
        handle: ObjectHandle,
        group: usize,
    ) -> Result<Vec<Option<String>>, StoreError> {
        let catalog = Arc::clone(&self.catalog);
        let object = self
            .objects
            .get_mut(handle)
            .ok_or(StoreError::ObjectNotFound(handle))?;
        let schema = catalog.object_schema(object.type_id())?;
        if !schema.is_extensible() {
            return Err(StoreError::NotExtensible(schema.name.clone()));
        }
        let removed = object
            .instance
            .remove_extensible_group(schema, group)
            .ok_or_else(|| StoreError::NoSuchGroup {
                type_name: schema.name.clone(),
                group,
            })?;
        let groups = object.instance.extensible_group_count(schema);
        self.reindex_references(handle);
        self.emit(StoreEvent::ExtensibleGroupsChanged { handle, groups });
        Ok(removed)
    }

    /// Set or clear the comment printed above an object.
    pub fn set_record_comment(&mut self, handle: ObjectHandle, comment: Option<&str>) -> Result<(), StoreError> {
        let object = self
            .objects
            .get_mut(handle)
            .ok_or(StoreError::ObjectNotFound(handle))?;
        object.instance.set_record_comment(comment);
        Ok(())
    }

    /// Set or clear the inline comment of one field.
    pub fn set_field_comment(
        &mut self,
        handle: ObjectHandle,
        field: usize,
        comment: Option<&str>,
    ) -> Result<(), StoreError> {
        let object = self
            .objects
            .get_mut(handle)
            .ok_or(StoreError::ObjectNotFound(handle))?;
        if !object.instance.set_field_comment(field, comment) {
            return Err(StoreError::InvalidValue(comment.unwrap_or_default().to_string()));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Removing
    // -----------------------------------------------------------------------

    /// Remove an object under `policy`. Returns every removed handle, the
    /// requested one first.
    pub fn remove(&mut self, handle: ObjectHandle, policy: RemovalPolicy) -> Result<Vec<ObjectHandle>, StoreError> {
        if !self.objects.contains_key(handle) {
            return Err(StoreError::ObjectNotFound(handle));
        }
        let catalog = Arc::clone(&self.catalog);
        let mut removed = Vec::new();
        let mut queue = VecDeque::from([(handle, false)]);
        while let Some((next, cascaded)) = queue.pop_front() {
            let Some((object, dangling)) = self.detach_object(next) else {
                continue;
            };
            removed.push(next);
            self.emit(StoreEvent::ObjectRemoved {
                handle: next,
                type_id: object.type_id(),
                cascaded,
            });
            if policy != RemovalPolicy::Cascade {
                continue;
            }
            for entry in dangling {
                let required = self
                    .objects
                    .get(entry.source)
                    .and_then(|source| catalog.object_schema(source.type_id()).ok())
                    .and_then(|schema| schema.field_spec(entry.field))
                    .is_some_and(|spec| spec.required);
                if required {
                    debug!(
                        target: "idfstore::store",
                        removed = ?next,
                        source = ?entry.source,
                        field = entry.field,
                        "cascading removal to dangling referrer"
                    );
                    queue.push_back((entry.source, true));
                }
            }
        }
        Ok(removed)
    }

    /// Remove under the configured [`RemovalPolicy`].
    pub fn remove_default(&mut self, handle: ObjectHandle) -> Result<Vec<ObjectHandle>, StoreError> {
        self.remove(handle, self.config.removal_policy)
    }

    /// Take an object out of every index. Its referrers are re-resolved;
    /// those left unresolved are returned.
    fn detach_object(&mut self, handle: ObjectHandle) -> Option<(StoredObject, Vec<InboundRef>)> {
        let object = self.objects.remove(handle)?;
        self.declaration.retain(|&h| h != handle);
        if let Some(custom) = self.custom.as_mut() {
            custom.retain(|&h| h != handle);
        }
        if let Some(list) = self.by_type.get_mut(&object.type_id()) {
            list.retain(|&h| h != handle);
        }
        if let Some(name) = object.name() {
            self.unindex_name(handle, &name.to_ascii_lowercase());
        }

        let mut dangling = Vec::new();
        for entry in self.refs.remove_object(handle) {
            if entry.source == handle {
                continue;
            }
            self.relink_from_text(entry);
            if self.refs.target(entry.source, entry.field).is_none() {
                dangling.push(entry);
            }
        }
        Some((object, dangling))
    }

    // -----------------------------------------------------------------------
    // Reference indexing
    // -----------------------------------------------------------------------

    /// First object named `key` that `source.field` may target, in the
    /// order objects took the name.
    fn find_target(&self, source: ObjectHandle, field: usize, key: &str) -> Option<ObjectHandle> {
        let source = self.objects.get(source)?;
        let schema = self.catalog.object_schema(source.type_id()).ok()?;
        let spec = schema.field_spec(field)?;
        self.by_name.get(key)?.iter().copied().find(|&candidate| {
            self.objects
                .get(candidate)
                .is_some_and(|target| self.catalog.can_target(spec, target.type_id()))
        })
    }

    fn link_field(&mut self, source: ObjectHandle, field: usize, key: &str) {
        let target = self.find_target(source, field, key);
        self.refs.link(source, field, target, key);
    }

    /// Re-resolve a referencing field from its current text.
    fn relink_from_text(&mut self, entry: InboundRef) {
        let key = self
            .objects
            .get(entry.source)
            .and_then(|o| o.get(entry.field))
            .map(str::to_ascii_lowercase);
        match key {
            Some(key) => self.link_field(entry.source, entry.field, &key),
            None => {
                self.refs.unlink(entry.source, entry.field);
            }
        }
    }

    fn index_references(&mut self, handle: ObjectHandle) {
        let catalog = Arc::clone(&self.catalog);
        let Some(object) = self.objects.get(handle) else {
            return;
        };
        let Ok(schema) = catalog.object_schema(object.type_id()) else {
            return;
        };
        let fields: Vec<(usize, String)> = schema
            .reference_indices(object.instance.field_count())
            .filter_map(|i| object.get(i).map(|text| (i, text.to_ascii_lowercase())))
            .collect();
        for (field, key) in fields {
            self.link_field(handle, field, &key);
        }
    }

    fn reindex_references(&mut self, handle: ObjectHandle) {
        self.refs.unlink_all(handle);
        self.index_references(handle);
    }

    /// Retry every reference waiting on `key`.
    fn resolve_waiting(&mut self, key: &str) {
        for entry in self.refs.take_unresolved(key) {
            self.link_field(entry.source, entry.field, key);
        }
    }

    fn unindex_name(&mut self, handle: ObjectHandle, key: &str) {
        if let Some(list) = self.by_name.get_mut(key) {
            list.retain(|&h| h != handle);
            if list.is_empty() {
                self.by_name.remove(key);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, handle: ObjectHandle) -> Option<&StoredObject> {
        self.objects.get(handle)
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.objects.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredObject> {
        self.declaration.iter().filter_map(|&h| self.objects.get(h))
    }

    pub fn objects(&self, order: Order) -> Vec<&StoredObject> {
        match order {
            Order::Declaration => self.iter().collect(),
            Order::Custom => self
                .custom
                .as_deref()
                .unwrap_or(&self.declaration)
                .iter()
                .filter_map(|&h| self.objects.get(h))
                .collect(),
            Order::ByType => {
                let mut objects: Vec<&StoredObject> = self.iter().collect();
                objects.sort_by_key(|o| o.type_id());
                objects
            }
        }
    }

    /// Install an explicit order. Must be a permutation of the live handles.
    pub fn set_custom_order(&mut self, order: Vec<ObjectHandle>) -> Result<(), StoreError> {
        let distinct: HashSet<ObjectHandle> = order.iter().copied().collect();
        if order.len() != self.objects.len()
            || distinct.len() != order.len()
            || !order.iter().all(|&h| self.objects.contains_key(h))
        {
            return Err(StoreError::InvalidOrder);
        }
        self.custom = Some(order);
        self.emit(StoreEvent::OrderChanged);
        Ok(())
    }

    pub fn clear_custom_order(&mut self) {
        if self.custom.take().is_some() {
            self.emit(StoreEvent::OrderChanged);
        }
    }

    pub fn custom_order(&self) -> Option<&[ObjectHandle]> {
        self.custom.as_deref()
    }

    /// The object `handle.field` resolves to.
    pub fn resolve(&self, handle: ObjectHandle, field: usize) -> Option<&StoredObject> {
        self.refs
            .target(handle, field)
            .and_then(|target| self.objects.get(target))
    }

    /// Objects with at least one field resolving to `handle`, optionally
    /// restricted to one type.
    pub fn sources_of(&self, handle: ObjectHandle, type_filter: Option<ObjectTypeId>) -> Vec<&StoredObject> {
        let mut seen = HashSet::new();
        self.refs
            .inbound(handle)
            .filter(|entry| seen.insert(entry.source))
            .filter_map(|entry| self.objects.get(entry.source))
            .filter(|o| type_filter.is_none_or(|t| o.type_id() == t))
            .collect()
    }

    /// Distinct objects `handle` resolves to, in field order.
    pub fn targets(&self, handle: ObjectHandle) -> Vec<&StoredObject> {
        let mut seen = HashSet::new();
        self.refs
            .outbound(handle)
            .into_iter()
            .filter_map(|r| r.target)
            .filter(|&t| seen.insert(t))
            .filter_map(|t| self.objects.get(t))
            .collect()
    }

    pub fn outbound_refs(&self, handle: ObjectHandle) -> Vec<OutboundRef> {
        self.refs.outbound(handle)
    }

    pub fn inbound_refs(&self, handle: ObjectHandle) -> Vec<InboundRef> {
        self.refs.inbound(handle).collect()
    }

    pub fn objects_of_type(&self, type_id: ObjectTypeId) -> Vec<&StoredObject> {
        self.by_type
            .get(&type_id)
            .into_iter()
            .flatten()
            .filter_map(|&h| self.objects.get(h))
            .collect()
    }

    pub fn num_objects_of_type(&self, type_id: ObjectTypeId) -> usize {
        self.by_type.get(&type_id).map_or(0, Vec::len)
    }

    /// Case-insensitive name lookup across all types.
    pub fn objects_by_name(&self, name: &str) -> Vec<&StoredObject> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .into_iter()
            .flatten()
            .filter_map(|&h| self.objects.get(h))
            .collect()
    }

    pub fn object_by_type_and_name(&self, type_id: ObjectTypeId, name: &str) -> Option<&StoredObject> {
        self.objects_by_name(name)
            .into_iter()
            .find(|o| o.type_id() == type_id)
    }

    /// Objects that can be targeted under a group tag, in declaration order.
    pub fn objects_in_group(&self, tag: &str) -> Vec<&StoredObject> {
        let Some(types) = self.catalog.group_targets(tag) else {
            return Vec::new();
        };
        self.iter().filter(|o| types.contains(&o.type_id())).collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self, strictness: Strictness) -> ValidityReport {
        validity::validate(self, strictness)
    }

    pub fn is_valid(&self, strictness: Strictness) -> bool {
        self.validate(strictness).is_valid()
    }

    /// Validate at the configured default strictness.
    pub fn report(&self) -> ValidityReport {
        self.validate(self.config.default_strictness)
    }

    /// Audit every index against the objects. Empty when consistent.
    pub fn index_violations(&self) -> Vec<String> {
        let mut problems = self.refs.audit();

        for object in self.objects.values() {
            let handle = object.handle;
            let Ok(schema) = self.catalog.object_schema(object.type_id()) else {
                problems.push(format!("{handle:?}: type not in catalog"));
                continue;
            };
            let outbound = self.refs.outbound(handle);
            let reference_fields: Vec<usize> = schema
                .reference_indices(object.instance.field_count())
                .filter(|&i| object.get(i).is_some())
                .collect();
            let linked: Vec<usize> = outbound.iter().map(|r| r.field).collect();
            if linked != reference_fields {
                problems.push(format!(
                    "{handle:?}: outbound fields {linked:?} != reference fields {reference_fields:?}"
                ));
            }
            for reference in &outbound {
                let text = object.get(reference.field).map(str::to_ascii_lowercase);
                match reference.target {
                    Some(target) => match self.objects.get(target) {
                        None => problems.push(format!("{handle:?}.{}: target removed", reference.field)),
                        Some(target) => {
                            if target.name().map(str::to_ascii_lowercase) != text {
                                problems.push(format!(
                                    "{handle:?}.{}: text does not name its target",
                                    reference.field
                                ));
                            }
                        }
                    },
                    None => {
                        let key = text.unwrap_or_default();
                        if self.refs.unresolved_key(handle, reference.field) != Some(key.as_str()) {
                            problems.push(format!(
                                "{handle:?}.{}: unresolved under the wrong text",
                                reference.field
                            ));
                        }
                        if self.find_target(handle, reference.field, &key).is_some() {
                            problems.push(format!(
                                "{handle:?}.{}: unresolved although a target exists",
                                reference.field
                            ));
                        }
                    }
                }
            }
            if let Some(name) = object.name() {
                let listed = self
                    .by_name
                    .get(&name.to_ascii_lowercase())
                    .map_or(0, |list| list.iter().filter(|&&h| h == handle).count());
                if listed != 1 {
                    problems.push(format!("{handle:?}: listed {listed} times under its name"));
                }
            }
        }

        let named: usize = self.by_name.values().map(Vec::len).sum();
        let expected = self.objects.values().filter(|o| o.name().is_some()).count();
        if named != expected {
            problems.push(format!("name index holds {named} entries for {expected} named objects"));
        }
        let typed: usize = self.by_type.values().map(Vec::len).sum();
        if typed != self.objects.len() {
            problems.push(format!("type index holds {typed} entries for {} objects", self.objects.len()));
        }
        if self.declaration.len() != self.objects.len()
            || !self.declaration.iter().all(|&h| self.objects.contains_key(h))
        {
            problems.push("declaration order out of step with objects".to_string());
        }
        if let Some(custom) = &self.custom {
            let distinct: HashSet<&ObjectHandle> = custom.iter().collect();
            if custom.len() != self.objects.len() || distinct.len() != custom.len() {
                problems.push("custom order is not a permutation".to_string());
            }
        }
        problems
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// Flatten in save order: the custom order when set, declaration order
    /// otherwise.
    pub fn to_collection(&self) -> InstanceCollection {
        let mut collection = InstanceCollection::new();
        collection.set_header(self.header.clone());
        for object in self.objects(Order::Custom) {
            collection.push(Record::Object(object.instance.clone()));
        }
        for raw in &self.unrecognized {
            collection.push(Record::Unknown(raw.clone()));
        }
        if let Some(comment) = &self.trailing_comment {
            collection.push(Record::Comment(comment.clone()));
        }
        collection
    }

    pub fn print(&self) -> String {
        self.to_collection()
            .print_with_column(&self.catalog, self.config.comment_column)
    }

    // -----------------------------------------------------------------------
    // Notification
    // -----------------------------------------------------------------------

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn subscribe_filtered(
        &mut self,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) -> SubscriptionId {
        self.events.subscribe_filtered(priority, filter, listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn emit(&mut self, event: StoreEvent) {
        self.events.dispatch(&event);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn shared_catalog(&self) -> Arc<SchemaCatalog> {
        Arc::clone(&self.catalog)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    pub fn set_header(&mut self, header: Option<String>) {
        self.header = header;
    }

    pub fn trailing_comment(&self) -> Option<&str> {
        self.trailing_comment.as_deref()
    }

    /// Catchall records kept from the source file.
    pub fn unrecognized(&self) -> &[RawRecord] {
        &self.unrecognized
    }
}

/// Field-by-field equality; trailing absent values are ignored. Names and
/// reference text compare without case.
fn same_values(schema: &ObjectSchema, a: &Instance, b: &Instance) -> bool {
    let len = a.field_count().max(b.field_count());
    (0..len).all(|i| match (a.get(i), b.get(i)) {
        (Some(x), Some(y))
            if schema.name_field() == Some(i)
                || schema.field_spec(i).is_some_and(FieldSpec::is_reference) =>
        {
            x.eq_ignore_ascii_case(y)
        }
        (x, y) => x == y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{self, instance};
    use crate::validity::ErrorKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store() -> Store {
        Store::new(test_utils::shared_catalog())
    }

    fn zone_and_wall(store: &mut Store) -> (ObjectHandle, ObjectHandle) {
        let zone = instance(store, "Zone", &["Z1"]);
        let wall = instance(store, "Wall", &["W1", "Z1"]);
        (store.add(zone).unwrap(), store.add(wall).unwrap())
    }

    // -----------------------------------------------------------------------
    // Adding and resolution
    // -----------------------------------------------------------------------

    #[test]
    fn add_resolves_references() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        assert_eq!(store.resolve(wall, 1).map(StoredObject::handle), Some(zone));
        assert_eq!(store.sources_of(zone, None).len(), 1);
        assert_eq!(store.targets(wall)[0].handle(), zone);
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn forward_reference_resolves_when_target_arrives() {
        let mut store = store();
        let wall = store.add(instance(&store, "Wall", &["W1", "z1"])).unwrap();
        assert!(store.resolve(wall, 1).is_none());
        assert_eq!(store.outbound_refs(wall)[0].target, None);
        let zone = store.add(instance(&store, "Zone", &["Z1"])).unwrap();
        assert_eq!(store.resolve(wall, 1).map(StoredObject::handle), Some(zone));
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn resolution_ignores_types_outside_the_group() {
        let mut store = store();
        store.add(instance(&store, "Window", &["Z1"])).unwrap();
        let wall = store.add(instance(&store, "Wall", &["W1", "Z1"])).unwrap();
        assert!(store.resolve(wall, 1).is_none());
        let zone = store.add(instance(&store, "Zone", &["Z1"])).unwrap();
        assert_eq!(store.resolve(wall, 1).map(StoredObject::handle), Some(zone));
    }

    #[test]
    fn add_all_resolves_in_any_order() {
        let mut store = store();
        let wall = instance(&store, "Wall", &["W1", "Z1"]);
        let zone = instance(&store, "Zone", &["Z1"]);
        let handles = store.add_all([wall, zone]).unwrap();
        assert_eq!(
            store.resolve(handles[0], 1).map(StoredObject::handle),
            Some(handles[1])
        );
    }

    #[test]
    fn add_unknown_type_fails() {
        let mut store = store();
        let result = store.add(Instance::new(ObjectTypeId(999)));
        assert!(matches!(result, Err(StoreError::Catalog(CatalogError::UnknownType(_)))));
        assert!(store.is_empty());
    }

    #[test]
    fn new_object_gets_defaults_and_a_fresh_name() {
        let mut store = store();
        let zone_type = store.catalog().type_id("Zone").unwrap();
        let first = store.new_object(zone_type).unwrap();
        let second = store.new_object(zone_type).unwrap();
        assert_eq!(store.get(first).unwrap().name(), Some("Zone 1"));
        assert_eq!(store.get(second).unwrap().name(), Some("Zone 2"));
        assert_eq!(store.get(first).unwrap().get(2), Some("1"));
        assert_eq!(store.next_name("Zone"), "Zone 3");
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    #[test]
    fn rename_propagates_to_referrers() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        store.set_field(zone, 0, "Z1b").unwrap();
        assert_eq!(store.get(wall).unwrap().get(1), Some("Z1b"));
        assert_eq!(store.resolve(wall, 1).map(StoredObject::handle), Some(zone));
        assert!(store.objects_by_name("z1").is_empty());
        assert_eq!(store.objects_by_name("Z1B").len(), 1);
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn rename_picks_up_waiting_references() {
        let mut store = store();
        let zone = store.add(instance(&store, "Zone", &["Z1"])).unwrap();
        let wall = store.add(instance(&store, "Wall", &["W1", "Z2"])).unwrap();
        store.set_field(zone, 0, "Z2").unwrap();
        assert_eq!(store.resolve(wall, 1).map(StoredObject::handle), Some(zone));
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn renaming_onto_a_taken_name_keeps_the_first_taker() {
        let mut store = store();
        let (z1, w1) = zone_and_wall(&mut store);
        let z2 = store.add(instance(&store, "Zone", &["Z2"])).unwrap();
        let w2 = store.add(instance(&store, "Wall", &["W2", "Z2"])).unwrap();
        store.set_field(z2, 0, "Z1").unwrap();

        // Existing referrers follow the renamed object.
        assert_eq!(store.get(w2).unwrap().get(1), Some("Z1"));
        assert_eq!(store.resolve(w2, 1).map(StoredObject::handle), Some(z2));
        assert_eq!(store.resolve(w1, 1).map(StoredObject::handle), Some(z1));
        // New references with that text go to the object that held it first.
        let w3 = store.add(instance(&store, "Wall", &["W3", "Z1"])).unwrap();
        assert_eq!(store.resolve(w3, 1).map(StoredObject::handle), Some(z1));
        let named: Vec<ObjectHandle> = store.objects_by_name("Z1").iter().map(|o| o.handle()).collect();
        assert_eq!(named, vec![z1, z2]);
        let report = store.validate(Strictness::Draft);
        assert_eq!(report.count(ErrorKind::NameConflict), 2);
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn clearing_the_name_detaches_referrers() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        store.set_field(zone, 0, "").unwrap();
        assert_eq!(store.get(wall).unwrap().get(1), Some("Z1"));
        assert!(store.resolve(wall, 1).is_none());
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn retargeting_a_reference_field() {
        let mut store = store();
        let (z1, wall) = zone_and_wall(&mut store);
        let z2 = store.add(instance(&store, "Zone", &["Z2"])).unwrap();
        store.set_field(wall, 1, "Z2").unwrap();
        assert_eq!(store.resolve(wall, 1).map(StoredObject::handle), Some(z2));
        assert!(store.sources_of(z1, None).is_empty());
        store.set_field(wall, 1, "").unwrap();
        assert!(store.outbound_refs(wall).is_empty());
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn set_field_errors() {
        let mut store = store();
        let (zone, _) = zone_and_wall(&mut store);
        assert!(matches!(
            store.set_field(zone, 0, "a;b"),
            Err(StoreError::InvalidValue(_))
        ));
        assert!(matches!(
            store.set_field(zone, 9, "x"),
            Err(StoreError::FieldOutOfRange { field: 9, .. })
        ));
        store.remove(zone, RemovalPolicy::Detach).unwrap();
        assert!(matches!(
            store.set_field(zone, 0, "x"),
            Err(StoreError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn extensible_groups_are_reindexed() {
        let mut store = store();
        let z1 = store.add(instance(&store, "Zone", &["Z1"])).unwrap();
        let z2 = store.add(instance(&store, "Zone", &["Z2"])).unwrap();
        let list = store
            .add(instance(&store, "ZoneList", &["All", "Z1", "Z2"]))
            .unwrap();
        assert_eq!(store.targets(list).len(), 2);

        store.remove_extensible_group(list, 0).unwrap();
        assert_eq!(store.resolve(list, 1).map(StoredObject::handle), Some(z2));
        assert!(store.sources_of(z1, None).is_empty());

        assert_eq!(store.push_extensible_group(list, &["Z1"]).unwrap(), 1);
        assert_eq!(store.resolve(list, 2).map(StoredObject::handle), Some(z1));
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn extensible_errors() {
        let mut store = store();
        let (zone, _) = zone_and_wall(&mut store);
        assert!(matches!(
            store.push_extensible_group(zone, &["x"]),
            Err(StoreError::NotExtensible(_))
        ));
        let list = store.add(instance(&store, "ZoneList", &["L"])).unwrap();
        assert!(matches!(
            store.remove_extensible_group(list, 0),
            Err(StoreError::NoSuchGroup { group: 0, .. })
        ));
        assert!(matches!(
            store.push_extensible_group(list, &["a", "b"]),
            Err(StoreError::GroupTooLarge { size: 1, given: 2, .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Removing
    // -----------------------------------------------------------------------

    #[test]
    fn detach_keeps_stale_text() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        let removed = store.remove(zone, RemovalPolicy::Detach).unwrap();
        assert_eq!(removed, vec![zone]);
        assert_eq!(store.get(wall).unwrap().get(1), Some("Z1"));
        assert!(store.resolve(wall, 1).is_none());
        assert!(!store.contains(zone));
        let report = store.validate(Strictness::Final);
        assert_eq!(report.count(ErrorKind::UnresolvedReference), 1);
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn detach_falls_back_to_a_namesake() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        let twin = store.add(instance(&store, "Zone", &["Z1"])).unwrap();
        store.remove(zone, RemovalPolicy::Detach).unwrap();
        assert_eq!(store.resolve(wall, 1).map(StoredObject::handle), Some(twin));
    }

    #[test]
    fn cascade_is_transitive() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        let window = store
            .add(instance(&store, "Window", &["Win1", "W1"]))
            .unwrap();
        let removed = store.remove(zone, RemovalPolicy::Cascade).unwrap();
        assert_eq!(removed, vec![zone, wall, window]);
        assert!(store.is_empty());
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn cascade_spares_optional_references() {
        let mut store = store();
        let zone = store.add(instance(&store, "Zone", &["Z1"])).unwrap();
        let list = store
            .add(instance(&store, "ZoneList", &["All", "Z1"]))
            .unwrap();
        store.remove(zone, RemovalPolicy::Cascade).unwrap();
        assert!(store.contains(list));
    }

    #[test]
    fn handles_are_never_reused() {
        let mut store = store();
        let (zone, _) = zone_and_wall(&mut store);
        store.remove(zone, RemovalPolicy::Detach).unwrap();
        let again = store.add(instance(&store, "Zone", &["Z1"])).unwrap();
        assert_ne!(zone, again);
        assert!(store.get(zone).is_none());
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn custom_order_tracks_adds_and_removes() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        store.set_custom_order(vec![wall, zone]).unwrap();
        let extra = store.add(instance(&store, "Zone", &["Z2"])).unwrap();
        let order: Vec<ObjectHandle> = store
            .objects(Order::Custom)
            .iter()
            .map(|o| o.handle())
            .collect();
        assert_eq!(order, vec![wall, zone, extra]);
        store.remove(zone, RemovalPolicy::Detach).unwrap();
        assert_eq!(store.custom_order(), Some(&[wall, extra][..]));
        let declared: Vec<ObjectHandle> = store
            .objects(Order::Declaration)
            .iter()
            .map(|o| o.handle())
            .collect();
        assert_eq!(declared, vec![wall, extra]);
    }

    #[test]
    fn custom_order_must_be_a_permutation() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        assert!(matches!(
            store.set_custom_order(vec![zone]),
            Err(StoreError::InvalidOrder)
        ));
        assert!(matches!(
            store.set_custom_order(vec![zone, zone]),
            Err(StoreError::InvalidOrder)
        ));
        assert!(store.set_custom_order(vec![wall, zone]).is_ok());
    }

    #[test]
    fn by_type_order() {
        let mut store = store();
        let wall = store.add(instance(&store, "Wall", &["W1", "Z1"])).unwrap();
        let zone = store.add(instance(&store, "Zone", &["Z1"])).unwrap();
        let order: Vec<ObjectHandle> = store
            .objects(Order::ByType)
            .iter()
            .map(|o| o.handle())
            .collect();
        assert_eq!(order, vec![zone, wall]);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    #[test]
    fn lookups_by_type_name_and_group() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        let zone_type = store.catalog().type_id("Zone").unwrap();
        let wall_type = store.catalog().type_id("Wall").unwrap();
        assert_eq!(store.num_objects_of_type(zone_type), 1);
        assert_eq!(store.objects_of_type(wall_type)[0].handle(), wall);
        assert_eq!(
            store.object_by_type_and_name(zone_type, "z1").map(StoredObject::handle),
            Some(zone)
        );
        assert!(store.object_by_type_and_name(wall_type, "Z1").is_none());
        assert_eq!(store.objects_in_group("ZoneNames").len(), 1);
        assert_eq!(store.sources_of(zone, Some(zone_type)).len(), 0);
        assert_eq!(store.sources_of(zone, Some(wall_type)).len(), 1);
    }

    // -----------------------------------------------------------------------
    // Notification
    // -----------------------------------------------------------------------

    #[test]
    fn events_follow_mutations() {
        let mut store = store();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        store.subscribe(Box::new(move |e| sink.borrow_mut().push(e.kind())));
        let (zone, _) = zone_and_wall(&mut store);
        store.set_field(zone, 0, "Z9").unwrap();
        use crate::event::StoreEventKind as K;
        assert_eq!(
            *log.borrow(),
            vec![
                K::ObjectAdded,
                K::ObjectAdded,
                K::FieldChanged,
                K::ReferenceRewritten,
                K::ObjectRenamed
            ]
        );
    }

    #[test]
    fn unsubscribed_listener_is_silent() {
        let mut store = store();
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        let id = store.subscribe(Box::new(move |_| *sink.borrow_mut() += 1));
        store.add(instance(&store, "Zone", &["Z1"])).unwrap();
        assert!(store.unsubscribe(id));
        store.add(instance(&store, "Zone", &["Z2"])).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    // -----------------------------------------------------------------------
    // Copying and inserting
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_keeps_handles_and_indexes() {
        let mut store = store();
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        store.subscribe(Box::new(move |_| *sink.borrow_mut() += 1));
        let (zone, wall) = zone_and_wall(&mut store);
        store.set_custom_order(vec![wall, zone]).unwrap();

        let mut copy = store.duplicate();
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.resolve(wall, 1).map(StoredObject::handle), Some(zone));
        assert_eq!(copy.custom_order(), Some(&[wall, zone][..]));
        assert!(copy.index_violations().is_empty());

        let seen = *count.borrow();
        copy.set_field(zone, 0, "Z9").unwrap();
        assert_eq!(copy.get(wall).unwrap().get(1), Some("Z9"));
        assert_eq!(store.get(wall).unwrap().get(1), Some("Z1"));
        assert_eq!(*count.borrow(), seen);
        assert!(copy.index_violations().is_empty());
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn clone_subset_drops_outside_targets() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);

        let (mut subset, mapped) = store.clone_subset(&[wall, wall]).unwrap();
        assert_eq!(subset.len(), 1);
        assert_eq!(mapped[0], mapped[1]);
        assert_eq!(subset.get(mapped[0]).unwrap().get(1), Some("Z1"));
        assert!(subset.resolve(mapped[0], 1).is_none());
        assert!(subset.index_violations().is_empty());

        // The reference waits for a matching object.
        let twin = subset.add(instance(&subset, "Zone", &["Z1"])).unwrap();
        assert_eq!(subset.resolve(mapped[0], 1).map(StoredObject::handle), Some(twin));
        assert!(subset.index_violations().is_empty());

        let (both, mapped) = store.clone_subset(&[wall, zone]).unwrap();
        assert_eq!(both.resolve(mapped[0], 1).map(StoredObject::handle), Some(mapped[1]));
        assert_eq!(both.sources_of(mapped[1], None).len(), 1);
        assert!(both.index_violations().is_empty());

        store.remove(zone, RemovalPolicy::Detach).unwrap();
        assert!(matches!(
            store.clone_subset(&[zone]),
            Err(StoreError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn insert_object_reuses_equivalents() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        assert_eq!(store.insert_object(instance(&store, "Zone", &["z1"])).unwrap(), zone);
        assert_eq!(store.insert_object(instance(&store, "Wall", &["W1", "z1"])).unwrap(), wall);
        assert_eq!(store.len(), 2);

        let other = store.insert_object(instance(&store, "Zone", &["Z1", "90"])).unwrap();
        assert_ne!(other, zone);
        assert_eq!(store.len(), 3);

        let version = store.add(instance(&store, "Version", &["1.2"])).unwrap();
        assert_eq!(store.insert_object(instance(&store, "Version", &["9.9"])).unwrap(), version);
        assert_eq!(store.len(), 4);
        assert!(store.index_violations().is_empty());
    }

    // -----------------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------------

    #[test]
    fn parse_and_print_round_trip() {
        let store = Store::parse(
            test_utils::SAMPLE_FILE,
            test_utils::shared_catalog(),
            StoreConfig::default(),
        )
        .unwrap();
        assert_eq!(
            text::normalize(&store.print()),
            text::normalize(test_utils::SAMPLE_FILE)
        );
        assert!(store.index_violations().is_empty());
    }

    #[test]
    fn print_follows_custom_order() {
        let mut store = store();
        let (zone, wall) = zone_and_wall(&mut store);
        store.set_custom_order(vec![wall, zone]).unwrap();
        let printed = store.print();
        assert!(printed.starts_with("Wall,"));
    }

    #[test]
    fn comments_are_printed() {
        let mut store = store();
        let (zone, _) = zone_and_wall(&mut store);
        store.set_record_comment(zone, Some("main hall")).unwrap();
        store.set_field_comment(zone, 0, Some("Name")).unwrap();
        assert!(matches!(
            store.set_field_comment(zone, 0, Some("two\nlines")),
            Err(StoreError::InvalidValue(_))
        ));
        let printed = store.print();
        assert!(printed.starts_with("! main hall\nZone,\n  Z1;"));
        assert!(printed.contains("!- Name"));
    }
}
