//! The answering side.

use super::*;

/// Creates the server. Every car request is answered with a person response.
pub fn start<C: Channel, T: TimeSource>(
    channel: C,
    clock: T,
    options: InterfaceOptions,
) -> Result<CommunicationInterface<C, T>, UsageError> {
    let mut iface = interface(channel, clock, options)?;

    iface.add_callback(CAR, MessageType::Request, |request, cx| {
        log::info!(
            "received car request {}, year {}\n{request}",
            request.sequence_number(),
            request.get::<u16>("year")?,
        );

        let mut response = cx.response_to_prototype(request, PERSON)?;
        response.set_field("id", 1i8)?;
        response.set_field("age", 30u8)?;

        // responses are never acknowledged
        cx.send(response, false);

        Ok(())
    });

    Ok(iface)
}
