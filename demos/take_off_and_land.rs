extern crate tello_flix;

use std::time::Duration;

use tello_flix::Tello;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut drone = Tello::new();
    drone.connect().await?;

    drone.take_off().await?;
    sleep(Duration::from_secs(5)).await;
    drone.land().await?;

    drone.disconnect();
    Ok(())
}
