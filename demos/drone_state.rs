extern crate tello_flix;

use tello_flix::Tello;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut drone = Tello::new();
    drone.connect().await?;

    let mut telemetry = drone.observe_telemetry();
    loop {
        telemetry.changed().await?;
        let state = telemetry.borrow_and_update().clone();
        println!(
            "battery {}% height {}dm | pitch {}° roll {}° yaw {}° | baro {}",
            state.battery, state.height, state.pitch, state.roll, state.yaw, state.barometer
        );
    }
}
