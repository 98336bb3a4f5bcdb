//! The asking side.

use super::*;

/// Creates the client, and sends the first car request.
///
/// Every person response received bumps `exchanges` and triggers a new car request,
/// with acknowledgment.
pub fn start<C: Channel, T: TimeSource>(
    channel: C,
    clock: T,
    options: InterfaceOptions,
    exchanges: Exchanges,
) -> Result<CommunicationInterface<C, T>, Box<dyn std::error::Error>> {
    let mut iface = interface(channel, clock, options)?;

    iface.add_callback(PERSON, MessageType::Response, move |response, cx| {
        exchanges.bump();

        log::info!(
            "received person {} (age {})\n{response}",
            response.get::<i8>("id")?,
            response.get::<u8>("age")?,
        );

        let mut request = cx.new_message(MessageType::Request, CAR)?;
        fill_car(&mut request)?;

        cx.send_with_failure(request, |r| {
            log::error!("car request {} was never answered", r.sequence_number())
        });

        Ok(())
    });

    let mut request = iface.new_message(MessageType::Request, CAR)?;
    fill_car(&mut request)?;

    iface.send_message_with_failure(request, |r| {
        log::error!("car request {} was never answered", r.sequence_number())
    })?;

    Ok(iface)
}
