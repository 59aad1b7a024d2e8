//! Commands accepted on the control channel

use crate::device::DeviceSpec;
use crate::object::binary_input::BinaryInputSpec;
use crate::object::EngineeringUnits;

/// Wire tag of every command, in the order the supervisor numbers them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTag {
    CreateGateway,
    CreateRoutedDevice,
    CreateRoutedAnalogInput,
    SetRoutedAnalogInputValue,
    CreateRoutedMultistateInput,
    SetRoutedMultistateInputValue,
    CreateRoutedCommand,
    SetRoutedCommandStatus,
    CreateCharacterStringValue,
    CreateBinaryInput,
    SetBinaryInputValue,
}

impl CommandTag {
    pub const ALL: [CommandTag; 11] = [
        CommandTag::CreateGateway,
        CommandTag::CreateRoutedDevice,
        CommandTag::CreateRoutedAnalogInput,
        CommandTag::SetRoutedAnalogInputValue,
        CommandTag::CreateRoutedMultistateInput,
        CommandTag::SetRoutedMultistateInputValue,
        CommandTag::CreateRoutedCommand,
        CommandTag::SetRoutedCommandStatus,
        CommandTag::CreateCharacterStringValue,
        CommandTag::CreateBinaryInput,
        CommandTag::SetBinaryInputValue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandTag::CreateGateway => "create_gateway",
            CommandTag::CreateRoutedDevice => "create_routed_device",
            CommandTag::CreateRoutedAnalogInput => "create_routed_analog_input",
            CommandTag::SetRoutedAnalogInputValue => "set_routed_analog_input_value",
            CommandTag::CreateRoutedMultistateInput => "create_routed_multistate_input",
            CommandTag::SetRoutedMultistateInputValue => "set_routed_multistate_input_value",
            CommandTag::CreateRoutedCommand => "create_routed_command",
            CommandTag::SetRoutedCommandStatus => "set_routed_command_status",
            CommandTag::CreateCharacterStringValue => "create_characterstring_value",
            CommandTag::CreateBinaryInput => "create_binary_input",
            CommandTag::SetBinaryInputValue => "set_binary_input_value",
        }
    }

    pub fn from_atom(atom: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == atom)
    }
}

/// Target of an object-level command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRef {
    pub device_id: u32,
    pub object_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateAnalogInput {
    pub target: ObjectRef,
    pub name: String,
    pub units: EngineeringUnits,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateMultistateInput {
    pub target: ObjectRef,
    pub name: String,
    pub states: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCommand {
    pub target: ObjectRef,
    pub name: String,
    pub description: String,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCharacterStringValue {
    pub target: ObjectRef,
    pub name: String,
    pub description: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateBinaryInput {
    pub target: ObjectRef,
    pub spec: BinaryInputSpec,
}

/// A decoded control-channel command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateGateway(DeviceSpec),
    CreateRoutedDevice(DeviceSpec),
    CreateRoutedAnalogInput(CreateAnalogInput),
    SetRoutedAnalogInputValue { target: ObjectRef, value: f32 },
    CreateRoutedMultistateInput(CreateMultistateInput),
    SetRoutedMultistateInputValue { target: ObjectRef, value: u32 },
    CreateRoutedCommand(CreateCommand),
    SetRoutedCommandStatus { target: ObjectRef, succeeded: bool },
    CreateCharacterStringValue(CreateCharacterStringValue),
    CreateBinaryInput(CreateBinaryInput),
    SetBinaryInputValue { target: ObjectRef, value: bool },
}

impl Command {
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::CreateGateway(_) => CommandTag::CreateGateway,
            Command::CreateRoutedDevice(_) => CommandTag::CreateRoutedDevice,
            Command::CreateRoutedAnalogInput(_) => CommandTag::CreateRoutedAnalogInput,
            Command::SetRoutedAnalogInputValue { .. } => CommandTag::SetRoutedAnalogInputValue,
            Command::CreateRoutedMultistateInput(_) => CommandTag::CreateRoutedMultistateInput,
            Command::SetRoutedMultistateInputValue { .. } => CommandTag::SetRoutedMultistateInputValue,
            Command::CreateRoutedCommand(_) => CommandTag::CreateRoutedCommand,
            Command::SetRoutedCommandStatus { .. } => CommandTag::SetRoutedCommandStatus,
            Command::CreateCharacterStringValue(_) => CommandTag::CreateCharacterStringValue,
            Command::CreateBinaryInput(_) => CommandTag::CreateBinaryInput,
            Command::SetBinaryInputValue { .. } => CommandTag::SetBinaryInputValue,
        }
    }

    /// Device the command addresses
    pub fn device_id(&self) -> u32 {
        match self {
            Command::CreateGateway(spec) | Command::CreateRoutedDevice(spec) => spec.instance,
            Command::CreateRoutedAnalogInput(c) => c.target.device_id,
            Command::CreateRoutedMultistateInput(c) => c.target.device_id,
            Command::CreateRoutedCommand(c) => c.target.device_id,
            Command::CreateCharacterStringValue(c) => c.target.device_id,
            Command::CreateBinaryInput(c) => c.target.device_id,
            Command::SetRoutedAnalogInputValue { target, .. }
            | Command::SetRoutedMultistateInputValue { target, .. }
            | Command::SetRoutedCommandStatus { target, .. }
            | Command::SetBinaryInputValue { target, .. } => target.device_id,
        }
    }
}
