//! Ordered object store owned by each routed device

use std::collections::BTreeMap;

use super::{ObjectType, RoutedObject};

/// Objects keyed by instance, iterated in ascending instance order
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjectStore {
    objects: BTreeMap<u32, RoutedObject>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects of `kind`
    pub fn count(&self, kind: ObjectType) -> usize {
        self.of_kind(kind).count()
    }

    /// Instance of the `index`-th object of `kind`, in ascending instance order
    pub fn nth(&self, kind: ObjectType, index: usize) -> Option<u32> {
        self.of_kind(kind).nth(index).map(RoutedObject::instance)
    }

    pub fn get(&self, instance: u32) -> Option<&RoutedObject> {
        self.objects.get(&instance)
    }

    pub fn get_mut(&mut self, instance: u32) -> Option<&mut RoutedObject> {
        self.objects.get_mut(&instance)
    }

    /// Look up an instance, but only if it is of `kind`
    pub fn get_kind(&self, kind: ObjectType, instance: u32) -> Option<&RoutedObject> {
        self.get(instance).filter(|object| object.object_type() == kind)
    }

    pub fn get_kind_mut(&mut self, kind: ObjectType, instance: u32) -> Option<&mut RoutedObject> {
        self.get_mut(instance).filter(|object| object.object_type() == kind)
    }

    pub fn contains(&self, instance: u32) -> bool {
        self.objects.contains_key(&instance)
    }

    /// Insert the object built by `make` unless `instance` is already taken;
    /// either way returns the object now stored under `instance`
    pub fn insert_if_absent(&mut self, instance: u32, make: impl FnOnce() -> RoutedObject) -> &mut RoutedObject {
        self.objects.entry(instance).or_insert_with(make)
    }

    pub fn remove(&mut self, instance: u32) -> Option<RoutedObject> {
        self.objects.remove(&instance)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutedObject> {
        self.objects.values()
    }

    fn of_kind(&self, kind: ObjectType) -> impl Iterator<Item = &RoutedObject> {
        self.objects.values().filter(move |object| object.object_type() == kind)
    }
}
