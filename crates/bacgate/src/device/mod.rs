//! Routed devices
//!
//! Position 0 of the [`Registry`] is the gateway, which answers on the
//! physical link address. Every other device sits behind it on a virtual
//! network and is addressed by a 3-byte MAC derived from its instance.

mod registry;

pub use registry::{Registry, RegistrySettings, SharedRegistry};

use crate::error::ObjectError;
use crate::object::{
    self, ArrayIndex, ObjectId, ObjectStore, ObjectType, PropertyError, PropertyId, PropertyLists,
    PropertyValue, RoutedObject, WriteOutcome, MAX_INSTANCE,
};

/// Text length ceiling for device name, description, model and firmware, exclusive
pub const MAX_DEVICE_TEXT_LEN: usize = 255;

/// Largest APDU this gateway accepts
pub const MAX_APDU: u32 = 1476;

const PROTOCOL_VERSION: u32 = 1;
const PROTOCOL_REVISION: u32 = 14;
const SEGMENTATION_NONE: u32 = 3;
const SYSTEM_STATUS_OPERATIONAL: u32 = 0;

static DEVICE_PROPERTY_LISTS: PropertyLists = PropertyLists {
    required: &[
        PropertyId::ObjectIdentifier,
        PropertyId::ObjectName,
        PropertyId::ObjectType,
        PropertyId::SystemStatus,
        PropertyId::VendorName,
        PropertyId::VendorIdentifier,
        PropertyId::ModelName,
        PropertyId::FirmwareRevision,
        PropertyId::ApplicationSoftwareVersion,
        PropertyId::ProtocolVersion,
        PropertyId::ProtocolRevision,
        PropertyId::ObjectList,
        PropertyId::MaxApduLengthAccepted,
        PropertyId::SegmentationSupported,
        PropertyId::DatabaseRevision,
    ],
    optional: &[PropertyId::Description],
    proprietary: &[],
};

/// Property lists for any kind a routed device can answer for
pub fn property_lists(kind: ObjectType) -> Option<&'static PropertyLists> {
    match kind {
        ObjectType::Device => Some(&DEVICE_PROPERTY_LISTS),
        other => object::property_lists(other),
    }
}

/// Network address of a device: network number plus MAC
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceAddress {
    /// 0 for the local network
    pub net: u16,
    pub mac: Vec<u8>,
}

impl DeviceAddress {
    /// Synthetic address of a routed device: instance as a 24-bit MAC
    pub fn virtual_for(instance: u32, net: u16) -> Self {
        Self {
            net,
            mac: instance.to_be_bytes()[1..].to_vec(),
        }
    }
}

/// Identity fields of a device as carried by the create commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub instance: u32,
    pub name: String,
    pub description: String,
    pub model: String,
    pub firmware_version: String,
}

/// A command object accepted a field write; the supervisor must be told
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEffect {
    pub device_id: u32,
    pub object_id: u32,
    pub value: u32,
}

#[derive(Debug, Clone)]
pub struct RoutedDevice {
    spec: DeviceSpec,
    address: DeviceAddress,
    vendor_name: String,
    vendor_id: u16,
    database_revision: u32,
    objects: ObjectStore,
}

impl RoutedDevice {
    pub(crate) fn new(spec: DeviceSpec, address: DeviceAddress, settings: &RegistrySettings) -> Self {
        Self {
            spec,
            address,
            vendor_name: settings.vendor_name.clone(),
            vendor_id: settings.vendor_id,
            database_revision: 0,
            objects: ObjectStore::new(),
        }
    }

    pub fn instance(&self) -> u32 {
        self.spec.instance
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn database_revision(&self) -> u32 {
        self.database_revision
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectStore {
        &mut self.objects
    }

    /// Run a create against this device's store, bumping the database
    /// revision when an object was actually added
    pub fn create_object<F>(&mut self, create: F) -> Result<u32, ObjectError>
    where
        F: FnOnce(&mut ObjectStore) -> Result<u32, ObjectError>,
    {
        let before = self.objects.len();
        let instance = create(&mut self.objects)?;
        if self.objects.len() != before {
            self.database_revision = self.database_revision.wrapping_add(1);
        }
        Ok(instance)
    }

    /// Device object first, then every data point grouped by kind
    pub fn object_list(&self) -> Vec<ObjectId> {
        let mut list = vec![ObjectId::new(ObjectType::Device, self.instance())];
        for kind in ObjectType::POINT_KINDS {
            list.extend(
                (0..self.objects.count(kind))
                    .filter_map(|i| self.objects.nth(kind, i))
                    .map(|instance| ObjectId::new(kind, instance)),
            );
        }
        list
    }

    pub fn count(&self, kind: ObjectType) -> usize {
        match kind {
            ObjectType::Device => 1,
            other => self.objects.count(other),
        }
    }

    pub fn index_to_instance(&self, kind: ObjectType, index: usize) -> Option<u32> {
        match kind {
            ObjectType::Device => (index == 0).then_some(self.instance()),
            other => self.objects.nth(other, index),
        }
    }

    pub fn valid_instance(&self, kind: ObjectType, instance: u32) -> bool {
        match kind {
            ObjectType::Device => instance == self.instance(),
            other => self.objects.get_kind(other, instance).is_some(),
        }
    }

    pub fn object_name(&self, kind: ObjectType, instance: u32) -> Option<String> {
        match kind {
            ObjectType::Device if instance == self.instance() => Some(self.spec.name.clone()),
            ObjectType::Device => None,
            other => self
                .objects
                .get_kind(other, instance)
                .map(|object| object.point().object_name().into_owned()),
        }
    }

    /// First object, the device object included, whose name is `name`
    pub fn object_named(&self, name: &str) -> Option<ObjectId> {
        std::iter::once(ObjectType::Device)
            .chain(ObjectType::POINT_KINDS)
            .flat_map(|kind| {
                (0..self.count(kind))
                    .filter_map(move |index| self.index_to_instance(kind, index))
                    .map(move |instance| ObjectId::new(kind, instance))
            })
            .find(|id| self.object_name(id.object_type, id.instance).as_deref() == Some(name))
    }

    /// Whether the device object itself is addressed; the max instance is a wildcard
    fn is_self(&self, id: ObjectId) -> bool {
        id.object_type == ObjectType::Device && (id.instance == self.instance() || id.instance == MAX_INSTANCE)
    }

    pub fn read_property(
        &self,
        id: ObjectId,
        property: PropertyId,
        index: ArrayIndex,
    ) -> Result<PropertyValue, PropertyError> {
        if self.is_self(id) {
            return self.read_device_property(property, index);
        }
        if property_lists(id.object_type).is_none() {
            return Err(PropertyError::unsupported_object_type());
        }
        self.objects
            .get_kind(id.object_type, id.instance)
            .ok_or(PropertyError::unknown_object())?
            .point()
            .read_property(property, index)
    }

    /// Apply a field write; a started command yields the effect to publish
    pub fn write_property(
        &mut self,
        id: ObjectId,
        property: PropertyId,
        index: ArrayIndex,
        value: &PropertyValue,
    ) -> Result<Option<CommandEffect>, PropertyError> {
        if self.is_self(id) {
            return Err(if DEVICE_PROPERTY_LISTS.contains(property) {
                PropertyError::write_access_denied()
            } else {
                PropertyError::unknown_property()
            });
        }
        if property_lists(id.object_type).is_none() {
            return Err(PropertyError::unsupported_object_type());
        }

        let device_id = self.instance();
        let object = self
            .objects
            .get_kind_mut(id.object_type, id.instance)
            .ok_or(PropertyError::unknown_object())?;
        match object.point_mut().write_property(property, index, value)? {
            WriteOutcome::Stored => Ok(None),
            WriteOutcome::CommandStarted(value) => Ok(Some(CommandEffect {
                device_id,
                object_id: id.instance,
                value,
            })),
        }
    }

    pub fn change_of_value(&self, kind: ObjectType, instance: u32) -> bool {
        self.objects
            .get_kind(kind, instance)
            .is_some_and(RoutedObject::is_changed)
    }

    pub fn clear_change_of_value(&mut self, kind: ObjectType, instance: u32) {
        if let Some(object) = self.objects.get_kind_mut(kind, instance) {
            object.clear_changed();
        }
    }

    pub fn value_list(&self, kind: ObjectType, instance: u32) -> Option<Vec<(PropertyId, PropertyValue)>> {
        self.objects.get_kind(kind, instance)?.point().value_list()
    }

    fn read_device_property(&self, property: PropertyId, index: ArrayIndex) -> Result<PropertyValue, PropertyError> {
        if !DEVICE_PROPERTY_LISTS.contains(property) {
            return Err(PropertyError::unknown_property());
        }
        if index != ArrayIndex::All && property != PropertyId::ObjectList {
            return Err(PropertyError::not_an_array());
        }

        let text = |s: &str| -> Result<PropertyValue, PropertyError> {
            Ok(PropertyValue::CharacterString(s.to_string()))
        };
        match property {
            PropertyId::ObjectIdentifier => Ok(PropertyValue::ObjectIdentifier(ObjectId::new(
                ObjectType::Device,
                self.instance(),
            ))),
            PropertyId::ObjectName => text(&self.spec.name),
            PropertyId::ObjectType => Ok(PropertyValue::Enumerated(ObjectType::Device.code().into())),
            PropertyId::Description => text(&self.spec.description),
            PropertyId::SystemStatus => Ok(PropertyValue::Enumerated(SYSTEM_STATUS_OPERATIONAL)),
            PropertyId::VendorName => text(&self.vendor_name),
            PropertyId::VendorIdentifier => Ok(PropertyValue::Unsigned(self.vendor_id.into())),
            PropertyId::ModelName => text(&self.spec.model),
            PropertyId::FirmwareRevision | PropertyId::ApplicationSoftwareVersion => {
                text(&self.spec.firmware_version)
            }
            PropertyId::ProtocolVersion => Ok(PropertyValue::Unsigned(PROTOCOL_VERSION)),
            PropertyId::ProtocolRevision => Ok(PropertyValue::Unsigned(PROTOCOL_REVISION)),
            PropertyId::MaxApduLengthAccepted => Ok(PropertyValue::Unsigned(MAX_APDU)),
            PropertyId::SegmentationSupported => Ok(PropertyValue::Enumerated(SEGMENTATION_NONE)),
            PropertyId::DatabaseRevision => Ok(PropertyValue::Unsigned(self.database_revision)),
            PropertyId::ObjectList => {
                let list = self
                    .object_list()
                    .into_iter()
                    .map(PropertyValue::ObjectIdentifier)
                    .collect();
                object::property::read_array(list, index)
            }
            _ => Err(PropertyError::unknown_property()),
        }
    }
}
