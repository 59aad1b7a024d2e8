//! CharacterString value

use super::{
    check_instance, created, require_text, ArrayIndex, DataPoint, ObjectCommon, ObjectStore, ObjectType,
    PropertyError, PropertyId, PropertyLists, PropertyValue, RoutedObject,
};
use crate::error::ObjectError;

pub(crate) static PROPERTY_LISTS: PropertyLists = PropertyLists {
    required: &[
        PropertyId::ObjectIdentifier,
        PropertyId::ObjectName,
        PropertyId::ObjectType,
        PropertyId::PresentValue,
        PropertyId::StatusFlags,
    ],
    optional: &[PropertyId::EventState, PropertyId::OutOfService, PropertyId::Description],
    proprietary: &[],
};

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterStringValue {
    common: ObjectCommon,
    present_value: String,
}

impl CharacterStringValue {
    /// Text length ceiling (name, description, value), exclusive
    pub const MAX_TEXT_LEN: usize = 128;

    pub fn new(instance: u32, name: &str, description: &str, value: &str) -> Self {
        Self {
            common: ObjectCommon::new(instance, name, description),
            present_value: value.to_string(),
        }
    }

    pub fn create(
        store: &mut ObjectStore,
        instance: u32,
        name: &str,
        description: &str,
        value: &str,
    ) -> Result<u32, ObjectError> {
        check_instance(instance)?;
        require_text("name", name)?;
        let object = store.insert_if_absent(instance, || {
            RoutedObject::CharacterStringValue(Self::new(instance, name, description, value))
        });
        created(object, ObjectType::CharacterStringValue)
    }

    pub fn present_value(&self) -> &str {
        &self.present_value
    }
}

impl DataPoint for CharacterStringValue {
    fn object_type(&self) -> ObjectType {
        ObjectType::CharacterStringValue
    }

    fn common(&self) -> &ObjectCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut ObjectCommon {
        &mut self.common
    }

    fn property_lists(&self) -> &'static PropertyLists {
        &PROPERTY_LISTS
    }

    fn read_specific(&self, property: PropertyId, _index: ArrayIndex) -> Result<PropertyValue, PropertyError> {
        match property {
            PropertyId::PresentValue => Ok(PropertyValue::CharacterString(self.present_value.clone())),
            _ => Err(PropertyError::unknown_property()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read() {
        let mut store = ObjectStore::new();
        assert_eq!(
            CharacterStringValue::create(&mut store, 3, "Site", "Site label", "Building 7"),
            Ok(3)
        );
        let object = store.get(3).unwrap().point();
        assert_eq!(
            object.read_property(PropertyId::PresentValue, ArrayIndex::All),
            Ok(PropertyValue::CharacterString("Building 7".into()))
        );
        assert_eq!(
            object.read_property(PropertyId::Description, ArrayIndex::All),
            Ok(PropertyValue::CharacterString("Site label".into()))
        );
        assert_eq!(
            object.read_property(PropertyId::Reliability, ArrayIndex::All),
            Err(PropertyError::unknown_property())
        );
    }

    #[test]
    fn test_create_requires_name() {
        let mut store = ObjectStore::new();
        assert_eq!(
            CharacterStringValue::create(&mut store, 3, "", "", "x"),
            Err(ObjectError::MissingField("name"))
        );
    }

    #[test]
    fn test_instance_taken_by_other_kind() {
        let mut store = ObjectStore::new();
        crate::object::AnalogInput::create(&mut store, 3, "", Default::default()).unwrap();
        assert_eq!(
            CharacterStringValue::create(&mut store, 3, "Site", "", ""),
            Err(ObjectError::InstanceTaken {
                instance: 3,
                existing: ObjectType::AnalogInput,
            })
        );
    }

    #[test]
    fn test_no_cov_tracking() {
        let value = CharacterStringValue::new(1, "Site", "", "x");
        assert!(value.value_list().is_none());
    }
}
