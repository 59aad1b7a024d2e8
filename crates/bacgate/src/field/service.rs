//! BACnet service handling for the routed devices
//!
//! A [`FieldService`] turns one received datagram into the datagrams to
//! send back and the command effects to publish. The registry lock is
//! taken for the duration of a single datagram; anything worth logging is
//! collected while it is held and written out once it is released.
//!
//! COV subscriptions live here rather than on the devices: the listener
//! calls [`FieldService::poll_cov`] between receives to expire them and to
//! notify subscribers of changed objects.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bacnet_rs::BACNET_MAX_APDU;
use bacnet_rs::app::Apdu;

use super::codec::{
    self, CovNotification, NpduHeader, PropertyResult, ReadAccessResult, ReadPropertyMultipleRequest,
    ReadPropertyRequest, SubscribeCovRequest, WhoHas, WhoHasObject, WritePropertyRequest, bvlc, network_message,
    service,
};
use crate::device::{self, CommandEffect, DeviceAddress, MAX_APDU, Registry, RoutedDevice, SharedRegistry};
use crate::error::CodecError;
use crate::object::{ArrayIndex, MAX_INSTANCE, ObjectId, ObjectType, PropertyError, PropertyId};

/// Active subscriptions across all devices
pub const MAX_COV_SUBSCRIPTIONS: usize = 128;

/// Where a response goes on the local link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Unicast(SocketAddr),
    Broadcast,
}

/// A datagram ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub destination: Destination,
    pub bytes: Vec<u8>,
}

/// Everything one datagram produced
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub packets: Vec<Outgoing>,
    /// Command objects started by field writes
    pub effects: Vec<CommandEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Subscription {
    subscriber: SocketAddr,
    /// Network address of a subscriber behind another router
    route: Option<DeviceAddress>,
    process_id: u32,
    device: u32,
    object: ObjectId,
    confirmed: bool,
    /// Unset for an indefinite subscription
    expires: Option<Instant>,
}

impl Subscription {
    fn same_subscriber(&self, other: &Subscription) -> bool {
        self.subscriber == other.subscriber
            && self.route == other.route
            && self.process_id == other.process_id
            && self.device == other.device
            && self.object == other.object
    }
}

/// State of one exchange while the registry is locked
#[derive(Debug, Default)]
struct Exchange {
    outcome: Outcome,
    notes: Vec<String>,
}

impl Exchange {
    fn note(&mut self, note: String) {
        self.notes.push(note);
    }

    /// Release point: log what was noted and hand back the packets
    fn finish(self) -> Outcome {
        for note in &self.notes {
            tracing::debug!("{}", note);
        }
        self.outcome
    }
}

#[derive(Debug)]
pub struct FieldService {
    registry: SharedRegistry,
    subscriptions: Vec<Subscription>,
    invoke_id: u8,
}

impl FieldService {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            subscriptions: Vec::new(),
            invoke_id: 0,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn handle(&mut self, data: &[u8], peer: SocketAddr) -> Result<Outcome, CodecError> {
        let frame = codec::decode_bvlc(data)?;
        let reply_to = frame.origin.unwrap_or(peer);
        let (header, apdu) = codec::decode_npdu(frame.npdu)?;

        let registry = self.registry.clone();
        let mut exchange = Exchange::default();
        let served = self.serve(&mut registry.lock(), &header, apdu, reply_to, &mut exchange);
        let outcome = exchange.finish();
        served.map(|()| outcome)
    }

    /// Drop expired subscriptions and notify subscribers of changed objects
    pub fn poll_cov(&mut self, now: Instant) -> Outcome {
        if self.subscriptions.is_empty() {
            return Outcome::default();
        }

        let registry = self.registry.clone();
        let mut exchange = Exchange::default();
        self.notify_changes(&mut registry.lock(), now, &mut exchange);
        exchange.finish()
    }

    fn serve(
        &mut self,
        registry: &mut Registry,
        header: &NpduHeader,
        apdu: &[u8],
        reply_to: SocketAddr,
        exchange: &mut Exchange,
    ) -> Result<(), CodecError> {
        if registry.is_empty() {
            return Ok(());
        }

        if let Some(message) = header.network_message {
            if message == network_message::WHO_IS_ROUTER_TO_NETWORK {
                who_is_router(registry, apdu, exchange);
            }
            return Ok(());
        }

        let targets = route(registry, header.destination.as_ref());
        if targets.is_empty() {
            return Ok(());
        }

        match codec::decode_apdu(apdu)? {
            Apdu::UnconfirmedRequest {
                service_choice,
                service_data,
            } => match service_choice {
                service::WHO_IS => {
                    let who_is = codec::decode_who_is(&service_data)?;
                    for index in targets {
                        if let Some(device) = registry.device_at(index)
                            && who_is.matches(device.instance())
                        {
                            let apdu = codec::i_am(device.instance(), MAX_APDU, registry.settings().vendor_id)?;
                            broadcast(registry, index, header, apdu, exchange);
                        }
                    }
                }
                service::WHO_HAS => {
                    let who_has = WhoHas::decode(&service_data)?;
                    for index in targets {
                        if let Some(apdu) = registry.device_at(index).and_then(|device| i_have(device, &who_has)) {
                            broadcast(registry, index, header, apdu, exchange);
                        }
                    }
                }
                _ => {}
            },
            Apdu::ConfirmedRequest {
                segmented,
                invoke_id,
                service_choice,
                service_data,
                ..
            } if targets.len() == 1 => {
                let index = targets[0];
                let subscriber = Subscriber {
                    address: reply_to,
                    route: header.source.clone(),
                };
                let mut initial = None;
                let response = if segmented {
                    codec::abort(invoke_id, codec::ABORT_SEGMENTATION_NOT_SUPPORTED)
                } else {
                    let request = Request {
                        invoke_id,
                        service: service_choice,
                        data: &service_data,
                    };
                    let response = self.confirmed(registry, index, request, &subscriber, &mut initial, exchange);
                    let limit = codec::max_apdu_accepted(apdu).min(BACNET_MAX_APDU);
                    if response.len() > limit {
                        exchange.note(format!(
                            "Aborting service {} invoke {}: {} byte response exceeds {}",
                            service_choice,
                            invoke_id,
                            response.len(),
                            limit
                        ));
                        codec::abort(invoke_id, codec::ABORT_SEGMENTATION_NOT_SUPPORTED)
                    } else {
                        response
                    }
                };

                let reply = NpduHeader::reply_to(header, routed_source(registry, index));
                exchange.outcome.packets.push(Outgoing {
                    destination: Destination::Unicast(reply_to),
                    bytes: packet(bvlc::ORIGINAL_UNICAST, &reply, &response),
                });

                if let Some(subscription) = initial {
                    self.initial_notification(registry, &subscription, exchange);
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Answer one confirmed request addressed to the device at `index`
    fn confirmed(
        &mut self,
        registry: &mut Registry,
        index: usize,
        request: Request<'_>,
        subscriber: &Subscriber,
        initial: &mut Option<Subscription>,
        exchange: &mut Exchange,
    ) -> Vec<u8> {
        let Request {
            invoke_id,
            service: choice,
            data,
        } = request;
        let Some(device) = registry.device_at_mut(index) else {
            return codec::reject(invoke_id, codec::REJECT_UNRECOGNIZED_SERVICE);
        };

        match choice {
            service::READ_PROPERTY => {
                let request = match ReadPropertyRequest::decode(data) {
                    Ok(request) => request,
                    Err(e) => return codec::reject(invoke_id, reject_reason(&e)),
                };
                match device.read_property(request.object, request.property, request.index) {
                    Ok(value) => codec::complex_ack(invoke_id, choice, codec::encode_read_property_ack(&request, &value)),
                    Err(e) => {
                        exchange.note(format!(
                            "ReadProperty {} {:?} on device {}: {}",
                            request.object,
                            request.property,
                            device.instance(),
                            e
                        ));
                        codec::error(invoke_id, choice, e)
                    }
                }
            }
            service::READ_PROPERTY_MULTIPLE => {
                let request = match ReadPropertyMultipleRequest::decode(data) {
                    Ok(request) => request,
                    Err(e) => return codec::reject(invoke_id, reject_reason(&e)),
                };
                let results = read_property_multiple(device, &request);
                codec::complex_ack(invoke_id, choice, codec::encode_read_property_multiple_ack(&results))
            }
            service::WRITE_PROPERTY => {
                let request = match WritePropertyRequest::decode(data) {
                    Ok(request) => request,
                    Err(e) => return codec::reject(invoke_id, reject_reason(&e)),
                };
                match device.write_property(request.object, request.property, request.index, &request.value) {
                    Ok(effect) => {
                        exchange.outcome.effects.extend(effect);
                        codec::simple_ack(invoke_id, choice)
                    }
                    Err(e) => {
                        exchange.note(format!(
                            "WriteProperty {} {:?} on device {}: {}",
                            request.object,
                            request.property,
                            device.instance(),
                            e
                        ));
                        codec::error(invoke_id, choice, e)
                    }
                }
            }
            service::SUBSCRIBE_COV => {
                let request = match SubscribeCovRequest::decode(data) {
                    Ok(request) => request,
                    Err(e) => return codec::reject(invoke_id, reject_reason(&e)),
                };
                match self.subscribe(device, &request, subscriber, Instant::now()) {
                    Ok(subscription) => {
                        *initial = subscription;
                        codec::simple_ack(invoke_id, choice)
                    }
                    Err(e) => {
                        exchange.note(format!(
                            "SubscribeCOV {} on device {}: {}",
                            request.object,
                            device.instance(),
                            e
                        ));
                        codec::error(invoke_id, choice, e)
                    }
                }
            }
            other => {
                exchange.note(format!("Rejecting confirmed service {}", other));
                codec::reject(invoke_id, codec::REJECT_UNRECOGNIZED_SERVICE)
            }
        }
    }

    /// Add, renew or cancel a subscription; returns the one to notify now
    fn subscribe(
        &mut self,
        device: &RoutedDevice,
        request: &SubscribeCovRequest,
        subscriber: &Subscriber,
        now: Instant,
    ) -> Result<Option<Subscription>, PropertyError> {
        let object = request.object;
        if !device.valid_instance(object.object_type, object.instance) {
            return Err(PropertyError::unknown_object());
        }
        if device.value_list(object.object_type, object.instance).is_none() {
            return Err(PropertyError::not_supported());
        }

        let subscription = Subscription {
            subscriber: subscriber.address,
            route: subscriber.route.clone(),
            process_id: request.process_id,
            device: device.instance(),
            object,
            confirmed: request.confirmed.unwrap_or(false),
            expires: match request.lifetime {
                None | Some(0) => None,
                Some(seconds) => Some(now + Duration::from_secs(seconds.into())),
            },
        };

        if request.is_cancellation() {
            self.subscriptions.retain(|s| !s.same_subscriber(&subscription));
            return Ok(None);
        }
        let count = self.subscriptions.len();
        match self.subscriptions.iter_mut().find(|s| s.same_subscriber(&subscription)) {
            Some(existing) => *existing = subscription.clone(),
            None if count >= MAX_COV_SUBSCRIPTIONS => return Err(PropertyError::no_space()),
            None => self.subscriptions.push(subscription.clone()),
        }
        Ok(Some(subscription))
    }

    fn initial_notification(&mut self, registry: &mut Registry, subscription: &Subscription, exchange: &mut Exchange) {
        let packet = notification(registry, subscription, Instant::now(), &mut self.invoke_id);
        exchange.outcome.packets.extend(packet);
        if let Some(device) = registry.by_instance_mut(subscription.device) {
            device.clear_change_of_value(subscription.object.object_type, subscription.object.instance);
        }
    }

    fn notify_changes(&mut self, registry: &mut Registry, now: Instant, exchange: &mut Exchange) {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| {
            s.expires.is_none_or(|expires| expires > now)
                && registry
                    .by_instance(s.device)
                    .is_some_and(|device| device.valid_instance(s.object.object_type, s.object.instance))
        });
        if self.subscriptions.len() < before {
            exchange.note(format!(
                "Dropped {} COV subscriptions",
                before - self.subscriptions.len()
            ));
        }

        let mut changed = Vec::new();
        for subscription in &self.subscriptions {
            let object = subscription.object;
            let is_changed = registry
                .by_instance(subscription.device)
                .is_some_and(|device| device.change_of_value(object.object_type, object.instance));
            if !is_changed {
                continue;
            }
            exchange
                .outcome
                .packets
                .extend(notification(registry, subscription, now, &mut self.invoke_id));
            changed.push((subscription.device, object));
        }

        for (instance, object) in changed {
            if let Some(device) = registry.by_instance_mut(instance) {
                device.clear_change_of_value(object.object_type, object.instance);
            }
        }
    }
}

/// Header fields of a confirmed request
#[derive(Debug, Clone, Copy)]
struct Request<'a> {
    invoke_id: u8,
    service: u8,
    data: &'a [u8],
}

/// Where a requester can be reached again
#[derive(Debug, Clone)]
struct Subscriber {
    address: SocketAddr,
    route: Option<DeviceAddress>,
}

/// Registry positions a destination address selects
fn route(registry: &Registry, destination: Option<&DeviceAddress>) -> Vec<usize> {
    match destination {
        None => vec![0],
        Some(address) if address.net == codec::BROADCAST_NET => (0..registry.len()).collect(),
        Some(address) if address.net == registry.network_id() => {
            if address.mac.is_empty() {
                (1..registry.len()).collect()
            } else {
                registry.by_virtual_mac(&address.mac).into_iter().collect()
            }
        }
        Some(_) => Vec::new(),
    }
}

/// Source address stamped on responses from a routed device
fn routed_source(registry: &Registry, index: usize) -> Option<DeviceAddress> {
    if index == 0 {
        return None;
    }
    registry.device_at(index).map(|device| device.address().clone())
}

fn packet(function: u8, header: &NpduHeader, apdu: &[u8]) -> Vec<u8> {
    let mut npdu = codec::encode_npdu(header);
    npdu.extend_from_slice(apdu);
    codec::encode_bvlc(function, &npdu)
}

fn broadcast(registry: &Registry, index: usize, request: &NpduHeader, apdu: Vec<u8>, exchange: &mut Exchange) {
    let header = NpduHeader::reply_to(request, routed_source(registry, index));
    exchange.outcome.packets.push(Outgoing {
        destination: Destination::Broadcast,
        bytes: packet(bvlc::ORIGINAL_BROADCAST, &header, &apdu),
    });
}

fn who_is_router(registry: &Registry, data: &[u8], exchange: &mut Exchange) {
    let network_id = registry.network_id();
    if let [hi, lo, ..] = data
        && u16::from_be_bytes([*hi, *lo]) != network_id
    {
        return;
    }

    let header = NpduHeader {
        network_message: Some(network_message::I_AM_ROUTER_TO_NETWORK),
        ..Default::default()
    };
    exchange.note(format!("Announcing route to network {}", network_id));
    exchange.outcome.packets.push(Outgoing {
        destination: Destination::Broadcast,
        bytes: packet(bvlc::ORIGINAL_BROADCAST, &header, &network_id.to_be_bytes()),
    });
}

/// I-Have from `device` when it holds the object a Who-Has asks for
fn i_have(device: &RoutedDevice, who_has: &WhoHas) -> Option<Vec<u8>> {
    if !who_has.matches(device.instance()) {
        return None;
    }
    let object = match &who_has.object {
        WhoHasObject::Id(id) => {
            let id = resolve_device_wildcard(device, *id);
            device.valid_instance(id.object_type, id.instance).then_some(id)?
        }
        WhoHasObject::Name(name) => device.object_named(name)?,
    };
    let name = device.object_name(object.object_type, object.instance)?;
    let body = codec::encode_i_have(ObjectId::new(ObjectType::Device, device.instance()), object, &name);
    Some(codec::unconfirmed(service::I_HAVE, body))
}

/// The device object named by the wildcard instance is the device itself
fn resolve_device_wildcard(device: &RoutedDevice, id: ObjectId) -> ObjectId {
    if id.object_type == ObjectType::Device && id.instance == MAX_INSTANCE {
        ObjectId::new(ObjectType::Device, device.instance())
    } else {
        id
    }
}

fn read_property_multiple(device: &RoutedDevice, request: &ReadPropertyMultipleRequest) -> Vec<ReadAccessResult> {
    request
        .specs
        .iter()
        .map(|spec| {
            let object = resolve_device_wildcard(device, spec.object);
            let mut results = Vec::new();
            for &(property, index) in &spec.properties {
                let expanded = device::property_lists(object.object_type).and_then(|lists| lists.expand(property));
                let selector = matches!(property, PropertyId::All | PropertyId::Required | PropertyId::Optional);
                match expanded {
                    Some(properties) if device.valid_instance(object.object_type, object.instance) => {
                        results.extend(properties.into_iter().map(|property| PropertyResult {
                            property,
                            index: ArrayIndex::All,
                            value: device.read_property(object, property, ArrayIndex::All),
                        }));
                    }
                    Some(_) => results.push(PropertyResult {
                        property,
                        index,
                        value: Err(PropertyError::unknown_object()),
                    }),
                    None if selector => results.push(PropertyResult {
                        property,
                        index,
                        value: Err(PropertyError::unsupported_object_type()),
                    }),
                    None => results.push(PropertyResult {
                        property,
                        index,
                        value: device.read_property(object, property, index),
                    }),
                }
            }
            ReadAccessResult { object, results }
        })
        .collect()
}

/// Notification of the current values of a subscribed object
fn notification(registry: &Registry, subscription: &Subscription, now: Instant, invoke_id: &mut u8) -> Option<Outgoing> {
    let index = registry.instance_to_index(subscription.device)?;
    let device = registry.device_at(index)?;
    let object = subscription.object;
    let values = device.value_list(object.object_type, object.instance)?;

    let time_remaining = subscription.expires.map_or(0, |expires| {
        u32::try_from(expires.saturating_duration_since(now).as_secs()).unwrap_or(u32::MAX)
    });
    let body = CovNotification {
        process_id: subscription.process_id,
        device: ObjectId::new(ObjectType::Device, device.instance()),
        object,
        time_remaining,
        values: &values,
    }
    .encode();

    let apdu = if subscription.confirmed {
        // Notifications are not retried, so the ack is never correlated
        *invoke_id = invoke_id.wrapping_add(1);
        codec::confirmed_request(*invoke_id, service::CONFIRMED_COV_NOTIFICATION, body)
    } else {
        codec::unconfirmed(service::UNCONFIRMED_COV_NOTIFICATION, body)
    };
    let header = NpduHeader {
        expecting_reply: subscription.confirmed,
        destination: subscription.route.clone(),
        source: routed_source(registry, index),
        ..Default::default()
    };
    Some(Outgoing {
        destination: Destination::Unicast(subscription.subscriber),
        bytes: packet(bvlc::ORIGINAL_UNICAST, &header, &apdu),
    })
}

fn reject_reason(error: &CodecError) -> u8 {
    match error {
        CodecError::Truncated => codec::REJECT_MISSING_REQUIRED_PARAMETER,
        _ => codec::REJECT_INVALID_TAG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bacnet_rs::service::IAmRequest;

    use crate::device::{DeviceSpec, RegistrySettings};
    use crate::object::{AnalogInput, CommandObject, EngineeringUnits, RoutedObject};

    const PEER: &str = "192.168.1.50:47808";

    fn spec(instance: u32) -> DeviceSpec {
        DeviceSpec {
            instance,
            name: format!("Device {}", instance),
            description: String::new(),
            model: "GW".to_string(),
            firmware_version: "0.1".to_string(),
        }
    }

    fn registry() -> SharedRegistry {
        let mut registry = Registry::new(RegistrySettings::default());
        registry.create_gateway(spec(1)).unwrap();
        registry.add_device(spec(5)).unwrap();
        let device = registry.by_instance_mut(5).unwrap();
        device
            .create_object(|store| AnalogInput::create(store, 3, "OAT", EngineeringUnits::DEGREES_CELSIUS))
            .unwrap();
        device
            .create_object(|store| CommandObject::create(store, 7, "Purge", "", 0))
            .unwrap();
        registry.into_shared()
    }

    fn service() -> FieldService {
        FieldService::new(registry())
    }

    fn peer() -> SocketAddr {
        PEER.parse().unwrap()
    }

    fn request(destination: Option<DeviceAddress>, source: Option<DeviceAddress>, apdu: &[u8]) -> Vec<u8> {
        let header = NpduHeader {
            expecting_reply: true,
            destination,
            source,
            ..Default::default()
        };
        packet(bvlc::ORIGINAL_UNICAST, &header, apdu)
    }

    fn routed(instance: u32) -> Option<DeviceAddress> {
        Some(DeviceAddress::virtual_for(instance, 1000))
    }

    fn global() -> Option<DeviceAddress> {
        Some(DeviceAddress {
            net: codec::BROADCAST_NET,
            mac: Vec::new(),
        })
    }

    /// Split a response into its NPDU header and APDU bytes
    fn response(packet: &Outgoing) -> (NpduHeader, Vec<u8>) {
        let frame = codec::decode_bvlc(&packet.bytes).unwrap();
        let (header, apdu) = codec::decode_npdu(frame.npdu).unwrap();
        (header, apdu.to_vec())
    }

    fn ack_data(apdu: &[u8]) -> (u8, u8, Vec<u8>) {
        let Apdu::ComplexAck {
            invoke_id,
            service_choice,
            service_data,
            ..
        } = Apdu::decode(apdu).unwrap()
        else {
            panic!("expected a complex ack, got {:02X?}", apdu);
        };
        (invoke_id, service_choice, service_data)
    }

    fn unconfirmed_data(apdu: &[u8]) -> (u8, Vec<u8>) {
        let Apdu::UnconfirmedRequest {
            service_choice,
            service_data,
        } = Apdu::decode(apdu).unwrap()
        else {
            panic!("expected an unconfirmed request, got {:02X?}", apdu);
        };
        (service_choice, service_data)
    }

    fn i_am_instance(packet: &Outgoing) -> u32 {
        let (choice, data) = unconfirmed_data(&response(packet).1);
        assert_eq!(choice, service::I_AM);
        IAmRequest::decode(&data).unwrap().device_identifier.instance
    }

    fn read_request(invoke_id: u8, object: [u8; 4], property: u8) -> Vec<u8> {
        let mut apdu = vec![0x00, 0x05, invoke_id, service::READ_PROPERTY, 0x0C];
        apdu.extend_from_slice(&object);
        apdu.extend_from_slice(&[0x19, property]);
        apdu
    }

    #[test]
    fn test_who_is_local_answers_gateway_only() {
        let outcome = service().handle(&request(None, None, &[0x10, 0x08]), peer()).unwrap();
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.packets[0].destination, Destination::Broadcast);
        assert_eq!(response(&outcome.packets[0]).0.source, None);
        assert_eq!(i_am_instance(&outcome.packets[0]), 1);
    }

    #[test]
    fn test_who_is_global_answers_every_device() {
        let outcome = service().handle(&request(global(), None, &[0x10, 0x08]), peer()).unwrap();
        assert_eq!(outcome.packets.len(), 2);
        assert_eq!(response(&outcome.packets[1]).0.source, routed(5));
        assert_eq!(i_am_instance(&outcome.packets[1]), 5);
    }

    #[test]
    fn test_who_is_range_filters_devices() {
        let who_is = [0x10, 0x08, 0x09, 0x05, 0x19, 0x05];
        let outcome = service().handle(&request(global(), None, &who_is), peer()).unwrap();
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(response(&outcome.packets[0]).0.source, routed(5));
    }

    #[test]
    fn test_read_present_value_from_routed_device() {
        let read = read_request(0x11, [0x00, 0x00, 0x00, 0x03], 0x55);
        let outcome = service().handle(&request(routed(5), None, &read), peer()).unwrap();

        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.packets[0].destination, Destination::Unicast(peer()));
        let (header, apdu) = response(&outcome.packets[0]);
        assert_eq!(header.source, routed(5));
        assert_eq!(header.destination, None);
        assert_eq!(
            ack_data(&apdu),
            (
                0x11,
                service::READ_PROPERTY,
                vec![0x0C, 0x00, 0x00, 0x00, 0x03, 0x19, 0x55, 0x3E, 0x44, 0x00, 0x00, 0x00, 0x00, 0x3F]
            )
        );
        assert!(outcome.effects.is_empty());
    }

    #[test]
    fn test_read_unknown_object_returns_error() {
        let read = read_request(0x12, [0x00, 0x00, 0x00, 0x09], 0x55);
        let outcome = service().handle(&request(routed(5), None, &read), peer()).unwrap();
        let (_, apdu) = response(&outcome.packets[0]);
        let Apdu::Error {
            invoke_id, error_code, ..
        } = Apdu::decode(&apdu).unwrap()
        else {
            panic!("expected an error PDU");
        };
        assert_eq!(invoke_id, 0x12);
        assert_eq!(u32::from(error_code), PropertyError::unknown_object().code as u32);
    }

    #[test]
    fn test_reply_routed_back_to_remote_source() {
        let remote = Some(DeviceAddress { net: 7, mac: vec![0x2A] });
        let read = read_request(0x13, [0x02, 0x00, 0x00, 0x01], 0x4D);
        let outcome = service().handle(&request(None, remote.clone(), &read), peer()).unwrap();
        let (header, apdu) = response(&outcome.packets[0]);
        assert_eq!(header.destination, remote);
        assert_eq!(header.source, None);
        assert_eq!(apdu[0], 0x30);
    }

    #[test]
    fn test_write_command_yields_effect() {
        let write = [
            0x00, 0x05, 0x21, 0x0F, 0x0C, 0x01, 0xC0, 0x00, 0x07, 0x19, 0x55, 0x3E, 0x21, 0x02, 0x3F,
        ];
        let mut service = service();
        let outcome = service.handle(&request(routed(5), None, &write), peer()).unwrap();
        let (_, apdu) = response(&outcome.packets[0]);
        assert_eq!(apdu, vec![0x20, 0x21, 0x0F]);
        assert_eq!(
            outcome.effects,
            vec![CommandEffect {
                device_id: 5,
                object_id: 7,
                value: 2,
            }]
        );

        // Still in progress
        let outcome = service.handle(&request(routed(5), None, &write), peer()).unwrap();
        let (_, apdu) = response(&outcome.packets[0]);
        assert_eq!(apdu[0], 0x50);
        assert!(outcome.effects.is_empty());
    }

    #[test]
    fn test_unsupported_confirmed_service_rejected() {
        // ReinitializeDevice
        let reinitialize = [0x00, 0x05, 0x31, 0x14, 0x09, 0x00];
        let outcome = service().handle(&request(routed(5), None, &reinitialize), peer()).unwrap();
        let (_, apdu) = response(&outcome.packets[0]);
        assert_eq!(apdu, vec![0x60, 0x31, codec::REJECT_UNRECOGNIZED_SERVICE]);
    }

    #[test]
    fn test_segmented_request_aborted() {
        let segmented = [0x08, 0x05, 0x32, 0x00, 0x04, 0x0C, 0x0C, 0x00, 0x00, 0x00, 0x03];
        let outcome = service().handle(&request(routed(5), None, &segmented), peer()).unwrap();
        let (_, apdu) = response(&outcome.packets[0]);
        assert_eq!(apdu, vec![0x71, 0x32, codec::ABORT_SEGMENTATION_NOT_SUPPORTED]);
    }

    #[test]
    fn test_oversized_object_list_aborted() {
        let registry = registry();
        {
            let mut registry = registry.lock();
            let device = registry.by_instance_mut(5).unwrap();
            for instance in 100..500 {
                device
                    .create_object(|store| {
                        AnalogInput::create(store, instance, "AI", EngineeringUnits::DEGREES_CELSIUS)
                    })
                    .unwrap();
            }
        }
        let mut service = FieldService::new(registry);

        // Whole object list of device 5: 403 identifiers do not fit in 1476 bytes
        let read = read_request(0x40, [0x02, 0x00, 0x00, 0x05], 0x4C);
        let outcome = service.handle(&request(routed(5), None, &read), peer()).unwrap();
        let (_, apdu) = response(&outcome.packets[0]);
        assert_eq!(apdu, vec![0x71, 0x40, 0x04]);

        // One element still fits
        let mut indexed = read_request(0x41, [0x02, 0x00, 0x00, 0x05], 0x4C);
        indexed.extend_from_slice(&[0x29, 0x00]);
        let outcome = service.handle(&request(routed(5), None, &indexed), peer()).unwrap();
        let (_, apdu) = response(&outcome.packets[0]);
        assert_eq!(ack_data(&apdu).0, 0x41);
    }

    #[test]
    fn test_response_limited_by_requester_max_apdu() {
        // Max APDU code 0: the requester accepts 50 bytes
        let mut read = read_request(0x42, [0x02, 0x00, 0x00, 0x05], 0x4D);
        read[1] = 0x00;
        let mut service = service();
        let outcome = service.handle(&request(routed(5), None, &read), peer()).unwrap();
        assert_eq!(ack_data(&response(&outcome.packets[0]).1).0, 0x42);

        let mut read = read_request(0x43, [0x02, 0x00, 0x00, 0x05], 0x4C);
        read[1] = 0x00;
        let registry = service.registry.clone();
        {
            let mut registry = registry.lock();
            let device = registry.by_instance_mut(5).unwrap();
            for instance in 10..20 {
                device
                    .create_object(|store| {
                        AnalogInput::create(store, instance, "AI", EngineeringUnits::DEGREES_CELSIUS)
                    })
                    .unwrap();
            }
        }
        let outcome = service.handle(&request(routed(5), None, &read), peer()).unwrap();
        assert_eq!(response(&outcome.packets[0]).1, vec![0x71, 0x43, 0x04]);
    }

    #[test]
    fn test_read_property_multiple() {
        // analog-input 3 {present-value, units}, analog-input 9 {present-value}
        let rpm = [
            0x00, 0x05, 0x50, 0x0E, 0x0C, 0x00, 0x00, 0x00, 0x03, 0x1E, 0x09, 0x55, 0x09, 0x75, 0x1F, 0x0C, 0x00, 0x00,
            0x00, 0x09, 0x1E, 0x09, 0x55, 0x1F,
        ];
        let outcome = service().handle(&request(routed(5), None, &rpm), peer()).unwrap();
        let (invoke_id, choice, data) = ack_data(&response(&outcome.packets[0]).1);
        assert_eq!(invoke_id, 0x50);
        assert_eq!(choice, service::READ_PROPERTY_MULTIPLE);
        assert_eq!(
            data,
            vec![
                0x0C, 0x00, 0x00, 0x00, 0x03, 0x1E, 0x29, 0x55, 0x4E, 0x44, 0x00, 0x00, 0x00, 0x00, 0x4F, 0x29, 0x75,
                0x4E, 0x91, 0x3E, 0x4F, 0x1F, 0x0C, 0x00, 0x00, 0x00, 0x09, 0x1E, 0x29, 0x55, 0x5E, 0x91, 0x01, 0x91,
                0x1F, 0x5F, 0x1F,
            ]
        );
    }

    #[test]
    fn test_read_property_multiple_all_on_device_wildcard() {
        let device = registry().lock().by_instance(5).unwrap().clone();
        let request = ReadPropertyMultipleRequest {
            specs: vec![codec::ReadAccess {
                object: ObjectId::new(ObjectType::Device, MAX_INSTANCE),
                properties: vec![(PropertyId::All, ArrayIndex::All)],
            }],
        };
        let results = read_property_multiple(&device, &request);
        assert_eq!(results[0].object, ObjectId::new(ObjectType::Device, 5));

        let lists = device::property_lists(ObjectType::Device).unwrap();
        let properties: Vec<PropertyId> = results[0].results.iter().map(|r| r.property).collect();
        assert_eq!(properties, lists.expand(PropertyId::All).unwrap());
        assert!(results[0].results.iter().all(|r| r.value.is_ok()));
    }

    #[test]
    fn test_who_has_answers_with_i_have() {
        // Who-Has object name "OAT"
        let by_name = [0x10, 0x07, 0x3C, 0x00, b'O', b'A', b'T'];
        let outcome = service().handle(&request(global(), None, &by_name), peer()).unwrap();
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.packets[0].destination, Destination::Broadcast);
        let (header, apdu) = response(&outcome.packets[0]);
        assert_eq!(header.source, routed(5));
        assert_eq!(
            unconfirmed_data(&apdu),
            (
                service::I_HAVE,
                vec![0xC4, 0x02, 0x00, 0x00, 0x05, 0xC4, 0x00, 0x00, 0x00, 0x03, 0x74, 0x00, b'O', b'A', b'T']
            )
        );

        // Who-Has command 7, range excluding device 5
        let by_id = [0x10, 0x07, 0x09, 0x06, 0x19, 0x09, 0x2C, 0x01, 0xC0, 0x00, 0x07];
        let outcome = service().handle(&request(global(), None, &by_id), peer()).unwrap();
        assert!(outcome.packets.is_empty());

        let missing = [0x10, 0x07, 0x2C, 0x00, 0x00, 0x00, 0x63];
        let outcome = service().handle(&request(global(), None, &missing), peer()).unwrap();
        assert!(outcome.packets.is_empty());
    }

    #[test]
    fn test_subscribe_cov_acks_then_notifies() {
        let mut service = service();
        // process 18, analog-input 3, unconfirmed, 60 s
        let subscribe = [
            0x00, 0x05, 0x60, 0x05, 0x09, 0x12, 0x1C, 0x00, 0x00, 0x00, 0x03, 0x29, 0x00, 0x39, 0x3C,
        ];
        let outcome = service.handle(&request(routed(5), None, &subscribe), peer()).unwrap();
        assert_eq!(outcome.packets.len(), 2);
        assert_eq!(response(&outcome.packets[0]).1, vec![0x20, 0x60, service::SUBSCRIBE_COV]);

        let (header, apdu) = response(&outcome.packets[1]);
        assert_eq!(outcome.packets[1].destination, Destination::Unicast(peer()));
        assert_eq!(header.source, routed(5));
        let (choice, data) = unconfirmed_data(&apdu);
        assert_eq!(choice, service::UNCONFIRMED_COV_NOTIFICATION);
        assert_eq!(&data[..12], &[0x09, 0x12, 0x1C, 0x02, 0x00, 0x00, 0x05, 0x2C, 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(service.subscription_count(), 1);

        // Nothing changed since the initial notification
        assert_eq!(service.poll_cov(Instant::now()), Outcome::default());

        {
            let mut registry = service.registry.lock();
            let device = registry.by_instance_mut(5).unwrap();
            let Some(RoutedObject::AnalogInput(input)) = device.objects_mut().get_mut(3) else {
                panic!("analog input missing");
            };
            input.set_present_value(21.5);
        }
        let outcome = service.poll_cov(Instant::now());
        assert_eq!(outcome.packets.len(), 1);
        let (_, data) = unconfirmed_data(&response(&outcome.packets[0]).1);
        assert!(data.windows(5).any(|w| w == [0x44, 0x41, 0xAC, 0x00, 0x00]));
        assert_eq!(service.poll_cov(Instant::now()), Outcome::default());
    }

    #[test]
    fn test_cov_subscription_expires_and_cancels() {
        let mut service = service();
        let subscribe = [
            0x00, 0x05, 0x61, 0x05, 0x09, 0x12, 0x1C, 0x00, 0x00, 0x00, 0x03, 0x29, 0x01, 0x39, 0x3C,
        ];
        service.handle(&request(routed(5), None, &subscribe), peer()).unwrap();
        assert_eq!(service.subscription_count(), 1);
        service.poll_cov(Instant::now() + Duration::from_secs(61));
        assert_eq!(service.subscription_count(), 0);

        service.handle(&request(routed(5), None, &subscribe), peer()).unwrap();
        let cancel = [0x00, 0x05, 0x62, 0x05, 0x09, 0x12, 0x1C, 0x00, 0x00, 0x00, 0x03];
        let outcome = service.handle(&request(routed(5), None, &cancel), peer()).unwrap();
        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(response(&outcome.packets[0]).1, vec![0x20, 0x62, service::SUBSCRIBE_COV]);
        assert_eq!(service.subscription_count(), 0);
    }

    #[test]
    fn test_confirmed_notification_on_change() {
        let mut service = service();
        let subscribe = [
            0x00, 0x05, 0x63, 0x05, 0x09, 0x12, 0x1C, 0x00, 0x00, 0x00, 0x03, 0x29, 0x01, 0x39, 0x00,
        ];
        let outcome = service.handle(&request(routed(5), None, &subscribe), peer()).unwrap();
        let (header, apdu) = response(&outcome.packets[1]);
        assert!(header.expecting_reply);
        let Apdu::ConfirmedRequest { service_choice, .. } = Apdu::decode(&apdu).unwrap() else {
            panic!("expected a confirmed notification");
        };
        assert_eq!(service_choice, service::CONFIRMED_COV_NOTIFICATION);

        // Lifetime 0 never expires
        service.poll_cov(Instant::now() + Duration::from_secs(86_400));
        assert_eq!(service.subscription_count(), 1);
    }

    #[test]
    fn test_subscribe_cov_errors() {
        let mut service = service();
        // Command objects do not report changes
        let command = [
            0x00, 0x05, 0x64, 0x05, 0x09, 0x12, 0x1C, 0x01, 0xC0, 0x00, 0x07, 0x29, 0x00, 0x39, 0x3C,
        ];
        let outcome = service.handle(&request(routed(5), None, &command), peer()).unwrap();
        let (_, apdu) = response(&outcome.packets[0]);
        let Apdu::Error { error_code, .. } = Apdu::decode(&apdu).unwrap() else {
            panic!("expected an error PDU");
        };
        assert_eq!(u32::from(error_code), PropertyError::not_supported().code as u32);

        let missing = [
            0x00, 0x05, 0x65, 0x05, 0x09, 0x12, 0x1C, 0x00, 0x00, 0x00, 0x63, 0x29, 0x00, 0x39, 0x3C,
        ];
        let outcome = service.handle(&request(routed(5), None, &missing), peer()).unwrap();
        assert_eq!(response(&outcome.packets[0]).1[0], 0x50);
        assert_eq!(service.subscription_count(), 0);
    }

    #[test]
    fn test_confirmed_broadcast_and_unknown_network_ignored() {
        let read = read_request(0x14, [0x00, 0x00, 0x00, 0x03], 0x55);
        let mut service = service();
        assert_eq!(
            service.handle(&request(global(), None, &read), peer()).unwrap(),
            Outcome::default()
        );
        let elsewhere = Some(DeviceAddress {
            net: 42,
            mac: vec![0, 0, 5],
        });
        assert_eq!(
            service.handle(&request(elsewhere, None, &read), peer()).unwrap(),
            Outcome::default()
        );
        assert_eq!(
            service.handle(&request(routed(99), None, &read), peer()).unwrap(),
            Outcome::default()
        );
    }

    #[test]
    fn test_who_is_router_announces_virtual_network() {
        let header = NpduHeader {
            network_message: Some(network_message::WHO_IS_ROUTER_TO_NETWORK),
            ..Default::default()
        };
        let mut service = service();
        let outcome = service
            .handle(&packet(bvlc::ORIGINAL_BROADCAST, &header, &[]), peer())
            .unwrap();
        assert_eq!(outcome.packets.len(), 1);
        let (reply, payload) = response(&outcome.packets[0]);
        assert_eq!(reply.network_message, Some(network_message::I_AM_ROUTER_TO_NETWORK));
        assert_eq!(payload, vec![0x03, 0xE8]);

        let other = service
            .handle(&packet(bvlc::ORIGINAL_BROADCAST, &header, &[0x00, 0x07]), peer())
            .unwrap();
        assert!(other.packets.is_empty());
    }

    #[test]
    fn test_empty_registry_stays_silent() {
        let mut service = FieldService::new(Registry::new(RegistrySettings::default()).into_shared());
        assert_eq!(
            service.handle(&request(None, None, &[0x10, 0x08]), peer()).unwrap(),
            Outcome::default()
        );
        assert!(service.handle(&[0x81, 0x0A, 0x00], peer()).is_err());
    }
}
