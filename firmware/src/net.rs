//! WiFi join and IPv4 bring-up.

use airtag_relay::config::{WIFI_PASSWORD, WIFI_RETRIES, WIFI_SSID};
use cyw43::JoinOptions;
use defmt::{info, unwrap, warn, Debug2Format};
use embassy_executor::Spawner;
use embassy_net::{Config, Stack, StackResources};
use embassy_time::{with_timeout, Duration, Instant, Timer};
use static_cell::StaticCell;

use crate::Fatal;

const DHCP_TIMEOUT: Duration = Duration::from_secs(10);
const JOIN_BACKOFF: Duration = Duration::from_secs(1);
/// Only seeds TCP sequence numbers and DNS query ids.
const NET_SEED: u64 = 0x1357_9bdf_2468_abcd;

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Join the configured access point and wait for a DHCP lease.
pub async fn connect(
    spawner: Spawner,
    control: &mut cyw43::Control<'_>,
    net_device: cyw43::NetDriver<'static>,
) -> Result<Stack<'static>, Fatal> {
    join(control).await?;

    // DHCP (1) + DNS (1) + signalling TCP socket (1) = 3
    static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        net_device,
        Config::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        NET_SEED,
    );
    spawner.spawn(unwrap!(net_task(runner)));

    if with_timeout(DHCP_TIMEOUT, stack.wait_config_up()).await.is_err() {
        return Err(Fatal::Dhcp);
    }
    if let Some(config) = stack.config_v4() {
        info!("net: address {}", Debug2Format(&config.address));
    }
    Ok(stack)
}

async fn join(control: &mut cyw43::Control<'_>) -> Result<(), Fatal> {
    for attempt in 1..=WIFI_RETRIES {
        info!("net: joining '{}' ({}/{})", WIFI_SSID, attempt, WIFI_RETRIES);
        let t0 = Instant::now();
        match control.join(WIFI_SSID, join_options()).await {
            Ok(()) => {
                info!("net: joined in {} ms", (Instant::now() - t0).as_millis());
                return Ok(());
            }
            Err(err) => {
                warn!("net: join failed: {}", Debug2Format(&err));
                Timer::after(JOIN_BACKOFF).await;
            }
        }
    }
    Err(Fatal::WifiJoin)
}

fn join_options() -> JoinOptions<'static> {
    if WIFI_PASSWORD.is_empty() {
        JoinOptions::new_open()
    } else {
        JoinOptions::new(WIFI_PASSWORD.as_bytes())
    }
}
