use rdscom_demo::{
    Exchanges, client,
    network::{InterfaceOptions, channel::linked_pair},
    server, tick_both,
    utils::MonotonicClock,
};

const NUM_RETRIES: u8 = 3;
const RETRY_DELAY_MS: u64 = 2000;

const TICK_PERIOD: core::time::Duration = core::time::Duration::from_millis(100);
/// The server answers every request, so the client should never stay silent this long.
const SILENCE_LIMIT_MS: u64 = 2000;

const NUM_EXCHANGES: u32 = 5;
const CHANNEL_CAPACITY: usize = 1024;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let (client_end, server_end) = linked_pair(CHANNEL_CAPACITY);
    let clock = MonotonicClock::new();
    let options = InterfaceOptions::new(NUM_RETRIES, RETRY_DELAY_MS);

    let exchanges = Exchanges::default();
    let mut client = client::start(client_end, clock, options, exchanges.clone())?;
    let mut server = server::start(server_end, clock, options)?;

    while exchanges.get() < NUM_EXCHANGES {
        tick_both(&mut client, &mut server)?;

        std::thread::sleep(TICK_PERIOD);

        if client.time_since_last_received() > SILENCE_LIMIT_MS {
            return Err(format!("no message received in {SILENCE_LIMIT_MS} ms").into());
        }
    }

    log::info!("done after {} exchanges", exchanges.get());

    Ok(())
}
