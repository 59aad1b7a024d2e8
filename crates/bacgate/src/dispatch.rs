//! Applies decoded commands to the device registry

use crate::device::{Registry, RoutedDevice, SharedRegistry};
use crate::error::DispatchError;
use crate::object::{
    AnalogInput, BinaryInput, CharacterStringValue, CommandObject, MultistateInput, ObjectType, RoutedObject,
};
use crate::protocol::{Command, ObjectRef};

/// Command dispatcher bound to a shared registry
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: SharedRegistry,
}

impl Dispatcher {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Apply one command. Every lookup happens before anything is mutated,
    /// so a failed command leaves the registry as it was.
    pub fn dispatch(&self, command: Command) -> Result<(), DispatchError> {
        let tag = command.tag();
        let device = match &command {
            Command::CreateGateway(spec) | Command::CreateRoutedDevice(spec) => Some(spec.instance),
            _ => None,
        };
        // The guard is released before anything is logged
        let result = apply(&mut self.registry.lock(), command);

        match (&result, device) {
            (Ok(()), Some(instance)) => tracing::info!("Device {} ready ({})", instance, tag.as_str()),
            (Ok(()), None) => tracing::debug!("Applied {}", tag.as_str()),
            (Err(e), _) => tracing::warn!("Failed to apply {}: {}", tag.as_str(), e),
        }
        result
    }
}

fn apply(registry: &mut Registry, command: Command) -> Result<(), DispatchError> {
    match command {
        Command::CreateGateway(spec) => registry.create_gateway(spec).map(|_| ()),
        Command::CreateRoutedDevice(spec) => registry.add_device(spec).map(|_| ()),
        Command::CreateRoutedAnalogInput(create) => {
            let device = device_mut(registry, create.target.device_id)?;
            device
                .create_object(|store| AnalogInput::create(store, create.target.object_id, &create.name, create.units))?;
            Ok(())
        }
        Command::SetRoutedAnalogInputValue { target, value } => {
            let device = device_mut(registry, target.device_id)?;
            if let RoutedObject::AnalogInput(input) = object_mut(device, target, ObjectType::AnalogInput)? {
                input.set_present_value(value);
            }
            Ok(())
        }
        Command::CreateRoutedMultistateInput(create) => {
            let device = device_mut(registry, create.target.device_id)?;
            device.create_object(|store| {
                MultistateInput::create(store, create.target.object_id, &create.name, create.states)
            })?;
            Ok(())
        }
        Command::SetRoutedMultistateInputValue { target, value } => {
            let device = device_mut(registry, target.device_id)?;
            if let RoutedObject::MultistateInput(input) = object_mut(device, target, ObjectType::MultistateInput)? {
                input.set_present_value(value);
            }
            Ok(())
        }
        Command::CreateRoutedCommand(create) => {
            let device = device_mut(registry, create.target.device_id)?;
            device.create_object(|store| {
                CommandObject::create(store, create.target.object_id, &create.name, &create.description, create.value)
            })?;
            Ok(())
        }
        Command::SetRoutedCommandStatus { target, succeeded } => {
            let device = device_mut(registry, target.device_id)?;
            if let RoutedObject::Command(command) = object_mut(device, target, ObjectType::Command)? {
                command.update_status(succeeded);
            }
            Ok(())
        }
        Command::CreateCharacterStringValue(create) => {
            let device = device_mut(registry, create.target.device_id)?;
            device.create_object(|store| {
                CharacterStringValue::create(
                    store,
                    create.target.object_id,
                    &create.name,
                    &create.description,
                    &create.value,
                )
            })?;
            Ok(())
        }
        Command::CreateBinaryInput(create) => {
            let device = device_mut(registry, create.target.device_id)?;
            device.create_object(|store| BinaryInput::create(store, create.target.object_id, create.spec))?;
            Ok(())
        }
        Command::SetBinaryInputValue { target, value } => {
            let device = device_mut(registry, target.device_id)?;
            if let RoutedObject::BinaryInput(input) = object_mut(device, target, ObjectType::BinaryInput)? {
                input.set_present_value(value);
            }
            Ok(())
        }
    }
}

fn device_mut(registry: &mut Registry, device_id: u32) -> Result<&mut RoutedDevice, DispatchError> {
    registry
        .by_instance_mut(device_id)
        .ok_or(DispatchError::UnknownDevice(device_id))
}

/// Resolve an existing object of the expected kind
fn object_mut(
    device: &mut RoutedDevice,
    target: ObjectRef,
    expected: ObjectType,
) -> Result<&mut RoutedObject, DispatchError> {
    let object = device
        .objects_mut()
        .get_mut(target.object_id)
        .ok_or(DispatchError::UnknownObject {
            device: target.device_id,
            object: target.object_id,
        })?;
    if object.object_type() != expected {
        return Err(DispatchError::WrongObjectType {
            device: target.device_id,
            object: target.object_id,
            expected,
        });
    }
    Ok(object)
}
