//! Custom commands the demo device answers.
//!
//! - `ping()` acknowledges.
//! - `testEvents()` sends a measurement, a location and an alert.
//! - `changeBackground(color)` updates the background and acknowledges.
//!
//! Replies carry the invocation's originator when it has one.

use sitewhere_client::{
    CommandCall, CommandRegistry, DeviceMessaging, DispatchError, RegistryError, Signature,
    Transport,
};
use sitewhere_protocol::ArgKind;
use tracing::info;

use crate::device::Device;

/// Builds the registry for the demo device.
pub fn registry() -> Result<CommandRegistry<Device>, RegistryError> {
    let mut registry = CommandRegistry::new();
    registry
        .register("ping", Signature::empty(), ping)?
        .register("ping", Signature::empty().with_originator(), ping)?
        .register("testEvents", Signature::empty(), test_events)?
        .register(
            "testEvents",
            Signature::empty().with_originator(),
            test_events,
        )?
        .register(
            "changeBackground",
            Signature::new([ArgKind::Text]),
            change_background,
        )?
        .register(
            "changeBackground",
            Signature::new([ArgKind::Text]).with_originator(),
            change_background,
        )?;
    Ok(registry)
}

fn ping(
    device: &mut Device,
    transport: &mut dyn Transport,
    call: CommandCall<'_>,
) -> Result<(), DispatchError> {
    transport
        .send_ack(device.hardware_id(), call.originator, Some("Acknowledged."))
        .map_err(|e| DispatchError::handler(call.name, e))?;
    info!("answered ping");
    Ok(())
}

fn test_events(
    device: &mut Device,
    transport: &mut dyn Transport,
    call: CommandCall<'_>,
) -> Result<(), DispatchError> {
    device
        .send_test_events(transport, call.originator)
        .map_err(|e| DispatchError::handler(call.name, e))?;
    info!("answered testEvents");
    Ok(())
}

fn change_background(
    device: &mut Device,
    transport: &mut dyn Transport,
    call: CommandCall<'_>,
) -> Result<(), DispatchError> {
    let color: String = call.arg(0)?;
    if !is_color(&color) {
        return Err(DispatchError::handler(
            call.name,
            format!("not a color: {:?}", color),
        ));
    }
    device.set_background(color);
    transport
        .send_ack(
            device.hardware_id(),
            call.originator,
            Some("Updated background color."),
        )
        .map_err(|e| DispatchError::handler(call.name, e))
}

/// Accepts `#rgb`, `#rrggbb` and `#aarrggbb` hex colors, or a plain
/// color name.
fn is_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => {
            matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => !color.is_empty() && color.chars().all(|c| c.is_ascii_alphabetic()),
    }
}

#[cfg(test)]
mod tests {
    use sitewhere_protocol::{Invocation, OutboundCommand, Payload};

    use super::*;
    use crate::device::tests::{Recorded, device};

    fn dispatch(
        device: &mut Device,
        invocation: Invocation,
    ) -> (Result<(), DispatchError>, Recorded) {
        let mut registry = registry().unwrap();
        let mut transport = Recorded::default();
        let result = registry.dispatch(device, &mut transport, &invocation);
        (result, transport)
    }

    #[test]
    fn ping_acknowledges_originator() {
        let mut device = device();
        let invocation = Invocation::new("ping").with_originator("evt-1");
        let (result, transport) = dispatch(&mut device, invocation);
        result.unwrap();

        let sent = transport.decoded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, OutboundCommand::SendAcknowledgement);
        assert_eq!(sent[0].1.as_deref(), Some("evt-1"));
        let Payload::Acknowledge(ack) = &sent[0].2 else {
            panic!("expected an ack");
        };
        assert_eq!(ack.message.as_deref(), Some("Acknowledged."));
    }

    #[test]
    fn ping_without_originator() {
        let mut device = device();
        let (result, transport) = dispatch(&mut device, Invocation::new("ping"));
        result.unwrap();
        assert_eq!(transport.decoded()[0].1, None);
    }

    #[test]
    fn test_events_sends_three_events() {
        let mut device = device();
        let (result, transport) =
            dispatch(&mut device, Invocation::new("testEvents").with_originator("evt-2"));
        result.unwrap();

        let sent = transport.decoded();
        let commands: Vec<_> = sent.iter().map(|s| s.0).collect();
        assert_eq!(
            commands,
            vec![
                OutboundCommand::SendDeviceMeasurements,
                OutboundCommand::SendDeviceLocation,
                OutboundCommand::SendDeviceAlert,
            ]
        );
        assert!(sent.iter().all(|s| s.1.as_deref() == Some("evt-2")));
    }

    #[test]
    fn change_background_updates_and_acks() {
        let mut device = device();
        let invocation = Invocation::new("changeBackground")
            .arg("#0033cc")
            .with_originator("evt-3");
        let (result, transport) = dispatch(&mut device, invocation);
        result.unwrap();

        assert_eq!(device.background(), "#0033cc");
        let sent = transport.decoded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.as_deref(), Some("evt-3"));
    }

    #[test]
    fn change_background_rejects_bad_color() {
        let mut device = device();
        let invocation = Invocation::new("changeBackground").arg("#12");
        let (result, transport) = dispatch(&mut device, invocation);

        let err = result.unwrap_err();
        assert!(matches!(err, DispatchError::Handler { .. }));
        assert_eq!(device.background(), "#ffffff");
        assert!(transport.0.is_empty());
    }

    #[test]
    fn change_background_requires_text() {
        let mut device = device();
        let invocation = Invocation::new("changeBackground").arg(7_i64);
        let (result, _) = dispatch(&mut device, invocation);
        assert!(matches!(
            result.unwrap_err(),
            DispatchError::ArgumentType { index: 0, .. }
        ));
    }

    #[test]
    fn colors() {
        assert!(is_color("#fff"));
        assert!(is_color("#0033cc"));
        assert!(is_color("#ff0033cc"));
        assert!(is_color("red"));
        assert!(!is_color("#ggg"));
        assert!(!is_color(""));
        assert!(!is_color("#"));
        assert!(!is_color("light blue"));
    }
}
